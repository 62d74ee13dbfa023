//! Quote Service
//!
//! Thin pricing client over the backend quote endpoint plus the sequencing
//! primitive callers use to keep only the latest-issued quote.

use crate::backend::types::{QuoteKind, QuoteRequest};
use crate::backend::{BackendError, BackendResult, QuoteBackend};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

// ============================================================================
// Quote Types
// ============================================================================

/// Priced conversion between two assets. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quote {
    pub source_asset: String,
    pub source_amount: Decimal,
    pub destination_asset: String,
    pub destination_amount: Decimal,
    pub kind: QuoteKind,
    pub fees: Decimal,
    pub fetched_at: DateTime<Utc>,
}

impl Quote {
    /// Destination units per source unit.
    pub fn rate(&self) -> Option<Decimal> {
        if self.source_amount.is_zero() {
            return None;
        }
        self.destination_amount.checked_div(self.source_amount)
    }

    /// What the payer is debited: source amount plus fees.
    pub fn total_source_cost(&self) -> Decimal {
        self.source_amount + self.fees
    }

    /// Same pair, amounts and kind, ignoring when it was fetched.
    pub fn same_terms(&self, other: &Quote) -> bool {
        self.source_asset == other.source_asset
            && self.destination_asset == other.destination_asset
            && self.source_amount == other.source_amount
            && self.destination_amount == other.destination_amount
            && self.fees == other.fees
            && self.kind == other.kind
    }
}

/// `NoRoute` is a legitimate answer, not an error: the UI shows the pair as
/// unavailable and submission stays disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteResult {
    Quote(Quote),
    NoRoute,
}

impl QuoteResult {
    pub fn quote(&self) -> Option<&Quote> {
        match self {
            QuoteResult::Quote(quote) => Some(quote),
            QuoteResult::NoRoute => None,
        }
    }

    pub fn into_quote(self) -> Option<Quote> {
        match self {
            QuoteResult::Quote(quote) => Some(quote),
            QuoteResult::NoRoute => None,
        }
    }

    pub fn is_no_route(&self) -> bool {
        matches!(self, QuoteResult::NoRoute)
    }
}

// ============================================================================
// Latest-wins sequencing
// ============================================================================

/// Ticket handed out when a quote request is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct QuoteTicket(u64);

impl QuoteTicket {
    pub fn sequence(&self) -> u64 {
        self.0
    }
}

/// Monotonic request counter. A response is applied only if its ticket is
/// still the latest issued.
#[derive(Debug, Default)]
pub struct QuoteSequencer {
    latest: AtomicU64,
}

impl QuoteSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> QuoteTicket {
        QuoteTicket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_latest(&self, ticket: QuoteTicket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }

    /// Supersede every outstanding ticket without issuing a request.
    pub fn invalidate(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Quote Service
// ============================================================================

pub struct QuoteService {
    backend: Arc<dyn QuoteBackend>,
}

impl QuoteService {
    pub fn new(backend: Arc<dyn QuoteBackend>) -> Self {
        Self { backend }
    }

    /// Price `amount` of `from` into `to`. No caching: every call reaches
    /// the backend, except non-positive amounts which have no route.
    pub async fn get_quote(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
        kind: QuoteKind,
    ) -> BackendResult<QuoteResult> {
        if amount <= Decimal::ZERO {
            debug!(from, to, %amount, "non-positive amount, no route");
            return Ok(QuoteResult::NoRoute);
        }

        let request = QuoteRequest {
            from: from.to_string(),
            to: to.to_string(),
            amount,
            kind,
        };

        let Some(response) = self.backend.fetch_quote(request).await? else {
            info!(from, to, %amount, kind = kind.as_str(), "no quote route");
            return Ok(QuoteResult::NoRoute);
        };

        if response.source_amount <= Decimal::ZERO || response.destination_amount <= Decimal::ZERO
        {
            return Err(BackendError::invalid_response(format!(
                "quote {}->{} has non-positive amounts",
                from, to
            )));
        }
        if response.fees.is_sign_negative() {
            return Err(BackendError::invalid_response(format!(
                "quote {}->{} has negative fees",
                from, to
            )));
        }

        let quote = Quote {
            source_asset: from.to_string(),
            source_amount: response.source_amount,
            destination_asset: to.to_string(),
            destination_amount: response.destination_amount,
            kind,
            fees: response.fees,
            fetched_at: Utc::now(),
        };

        debug!(
            from,
            to,
            source_amount = %quote.source_amount,
            destination_amount = %quote.destination_amount,
            fees = %quote.fees,
            "quote received"
        );

        Ok(QuoteResult::Quote(quote))
    }
}
