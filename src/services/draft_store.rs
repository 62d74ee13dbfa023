//! Transaction Draft Store
//!
//! Holds the single pending transaction intent of a flow and derives the
//! backend submission payload from it. The idempotency key is minted the
//! first time an intent is finalised for submission and then reused by every
//! retry of that intent.

use crate::backend::types::{Party, SubmissionPayload, SubmissionShape};
use crate::error::FlowError;
use crate::logging::mask_identifier;
use crate::payment_code::PaymentDraft;
use crate::services::quote::Quote;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

/// What the user confirmed: who pays what to whom, at which rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionIntent {
    pub from: Party,
    pub to: Party,
    /// `to.value / from.value`, taken from the quote that priced the intent.
    pub rate: Decimal,
    pub fees: Decimal,
    pub shape: SubmissionShape,
    idempotency_key: Option<String>,
}

impl TransactionIntent {
    pub fn new(
        from: Party,
        to: Party,
        rate: Decimal,
        fees: Decimal,
        shape: SubmissionShape,
    ) -> Self {
        Self {
            from,
            to,
            rate,
            fees,
            shape,
            idempotency_key: None,
        }
    }

    /// Build an intent from a live quote. Fails when the quote cannot yield a
    /// rate, so an intent never exists without a usable quote behind it.
    pub fn from_quote(
        quote: &Quote,
        payer_wallet: &str,
        recipient_id: &str,
        shape: SubmissionShape,
    ) -> Result<Self, FlowError> {
        let rate = quote.rate().ok_or(FlowError::QuoteUnavailable)?;
        Ok(Self::new(
            Party {
                wallet_id: payer_wallet.to_string(),
                asset: quote.source_asset.clone(),
                value: quote.source_amount,
            },
            Party {
                wallet_id: recipient_id.to_string(),
                asset: quote.destination_asset.clone(),
                value: quote.destination_amount,
            },
            rate,
            quote.fees,
            shape,
        ))
    }

    /// Merchant-code payment shape for a parsed draft.
    pub fn merchant_shape(draft: &PaymentDraft) -> SubmissionShape {
        SubmissionShape::MerchantPayment {
            merchant_name: draft.merchant_name.clone(),
            payment_code: draft.raw_code.clone(),
            routing_key: draft.routing_key.clone(),
            tax_id: draft.tax_id.clone(),
            reference: draft.reference.clone(),
        }
    }

    pub fn idempotency_key(&self) -> Option<&str> {
        self.idempotency_key.as_deref()
    }
}

/// Hex SHA-256 over the intent's legs and a random nonce.
pub fn mint_idempotency_key(intent: &TransactionIntent) -> String {
    let raw_key = format!(
        "{}:{}:{}:{}:{}:{}:{}:{}",
        intent.shape.as_str(),
        intent.from.wallet_id,
        intent.from.asset,
        intent.from.value,
        intent.to.wallet_id,
        intent.to.asset,
        intent.to.value,
        Uuid::new_v4()
    );

    let mut hasher = Sha256::new();
    hasher.update(raw_key.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Default)]
pub struct TransactionDraftStore {
    intent: Option<TransactionIntent>,
}

impl TransactionDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever intent was held before.
    pub fn set_intent(&mut self, intent: TransactionIntent) {
        if self.intent.is_some() {
            debug!("replacing previous transaction intent");
        }
        self.intent = Some(intent);
    }

    pub fn intent(&self) -> Option<&TransactionIntent> {
        self.intent.as_ref()
    }

    pub fn clear(&mut self) -> Option<TransactionIntent> {
        self.intent.take()
    }

    /// Backend payload for the current intent, minting its idempotency key
    /// on first use. Returns `None` when no intent is held.
    pub fn build_submission_payload(&mut self) -> Option<SubmissionPayload> {
        let intent = self.intent.as_mut()?;

        let key = match intent.idempotency_key.clone() {
            Some(key) => key,
            None => {
                let key = mint_idempotency_key(intent);
                info!(
                    idempotency_key = %mask_identifier(&key),
                    shape = intent.shape.as_str(),
                    "minted idempotency key"
                );
                intent.idempotency_key = Some(key.clone());
                key
            }
        };

        Some(SubmissionPayload {
            idempotency_key: key,
            from: intent.from.clone(),
            to: intent.to.clone(),
            rate: intent.rate,
            fees: intent.fees,
            shape: intent.shape.clone(),
        })
    }
}
