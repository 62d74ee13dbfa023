//! Confirmation Flow
//!
//! Orchestrates one payment from a parsed draft to a terminal outcome:
//! quote -> PIN gate -> submission -> status polling. The flow owns its
//! session state (selected asset, requested amount, live quote, pending
//! intent) and receives every collaborator explicitly.
//!
//! State machine:
//!
//! ```text
//! Idle -> QuoteLoading -> QuoteReady <-> QuoteLoading
//!                      -> QuoteUnavailable
//! QuoteReady -> PinGate -> Processing -> Success | Failure | SoftTimeout
//! any non-terminal state -> Abandoned
//! Failure (submission error, intent kept) -> Abandoned
//! ```

use crate::backend::types::{QuoteKind, TransactionStatus};
use crate::config::FlowConfig;
use crate::error::{FlowError, FlowResult, InsufficientBalanceError, InvalidCodeError};
use crate::payment_code::PaymentDraft;
use crate::services::draft_store::{TransactionDraftStore, TransactionIntent};
use crate::services::pin_gate::{PinAttemptOutcome, PinGate, PinGateConfig, PinVerifier};
use crate::services::quote::{Quote, QuoteResult, QuoteSequencer, QuoteService};
use crate::services::submission::SubmissionGateway;
use crate::workers::status_poller::{PollCancel, PollError, TransactionStatusPoller};
use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const SOFT_TIMEOUT_MESSAGE: &str = "Your payment is still being processed and may complete \
shortly. Please check your balance before trying again";

// ============================================================================
// Flow Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    Idle,
    QuoteLoading,
    QuoteReady,
    QuoteUnavailable,
    PinGate,
    Processing,
    Success,
    Failure,
    SoftTimeout,
    Abandoned,
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowState::Success | FlowState::Failure | FlowState::SoftTimeout | FlowState::Abandoned
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowState::Idle => "idle",
            FlowState::QuoteLoading => "quote_loading",
            FlowState::QuoteReady => "quote_ready",
            FlowState::QuoteUnavailable => "quote_unavailable",
            FlowState::PinGate => "pin_gate",
            FlowState::Processing => "processing",
            FlowState::Success => "success",
            FlowState::Failure => "failure",
            FlowState::SoftTimeout => "soft_timeout",
            FlowState::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the user ends up seeing.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowOutcome {
    Success(TransactionStatus),
    Failure(FlowError),
    /// Polling ran out while the transaction was still pending. It may still
    /// complete, so this is a caution rather than a failure.
    SoftTimeout(TransactionStatus),
}

impl FlowOutcome {
    pub fn state(&self) -> FlowState {
        match self {
            FlowOutcome::Success(_) => FlowState::Success,
            FlowOutcome::Failure(_) => FlowState::Failure,
            FlowOutcome::SoftTimeout(_) => FlowState::SoftTimeout,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            FlowOutcome::Success(_) => "Payment completed".to_string(),
            FlowOutcome::Failure(err) => err.user_message(),
            FlowOutcome::SoftTimeout(_) => SOFT_TIMEOUT_MESSAGE.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FlowOutcome::Success(_))
    }
}

/// Result of a quote refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteUpdate {
    Ready(QuoteView),
    Unavailable,
    /// A newer request was issued while this one was in flight; its response
    /// was dropped.
    Superseded,
}

/// Display-ready quote, amounts rounded to two decimals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuoteView {
    pub source_asset: String,
    pub source_amount: String,
    pub destination_asset: String,
    pub destination_amount: String,
    pub fees: String,
    pub total: String,
    pub rate: String,
}

fn two_places(value: Decimal) -> String {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}

impl From<&Quote> for QuoteView {
    fn from(quote: &Quote) -> Self {
        Self {
            source_asset: quote.source_asset.clone(),
            source_amount: two_places(quote.source_amount),
            destination_asset: quote.destination_asset.clone(),
            destination_amount: two_places(quote.destination_amount),
            fees: two_places(quote.fees),
            total: two_places(quote.total_source_cost()),
            rate: quote
                .rate()
                .map(|r| r.normalize().to_string())
                .unwrap_or_default(),
        }
    }
}

/// The paying wallet and its spendable balances per asset.
#[derive(Debug, Clone, Default)]
pub struct Payer {
    pub wallet_id: String,
    balances: HashMap<String, Decimal>,
}

impl Payer {
    pub fn new(wallet_id: impl Into<String>) -> Self {
        Self {
            wallet_id: wallet_id.into(),
            balances: HashMap::new(),
        }
    }

    pub fn with_balance(mut self, asset: &str, amount: Decimal) -> Self {
        self.balances.insert(asset.to_uppercase(), amount);
        self
    }

    pub fn balance(&self, asset: &str) -> Decimal {
        self.balances
            .get(&asset.to_uppercase())
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}

/// Context handed to the PIN prompt before each attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinPromptContext {
    pub attempt: u32,
    pub remaining_attempts: u32,
    pub pin_length: usize,
    /// Feedback from the previous attempt, e.g. "Incorrect PIN".
    pub message: Option<String>,
}

/// UI collaborator that collects a PIN from the user.
#[async_trait]
pub trait PinPrompt: Send + Sync {
    /// `None` when the user dismisses the keypad.
    async fn request_pin(&self, context: &PinPromptContext) -> Option<String>;
}

/// Collaborators a flow needs.
#[derive(Clone)]
pub struct FlowDependencies {
    pub quotes: Arc<QuoteService>,
    pub gateway: Arc<SubmissionGateway>,
    pub poller: Arc<TransactionStatusPoller>,
    pub verifier: Arc<dyn PinVerifier>,
    pub prompt: Arc<dyn PinPrompt>,
}

// ============================================================================
// Session
// ============================================================================

struct Session {
    state: FlowState,
    selected_asset: Option<String>,
    requested_amount: Decimal,
    quote: Option<Quote>,
    store: TransactionDraftStore,
    outcome: Option<FlowOutcome>,
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// Confirmation Flow
// ============================================================================

pub struct ConfirmationFlow {
    draft: PaymentDraft,
    payer: Payer,
    config: FlowConfig,
    deps: FlowDependencies,
    sequencer: QuoteSequencer,
    busy: AtomicBool,
    cancel: PollCancel,
    session: Mutex<Session>,
}

impl ConfirmationFlow {
    pub fn new(draft: PaymentDraft, payer: Payer, config: FlowConfig, deps: FlowDependencies) -> Self {
        let requested_amount = draft.requested_amount;
        info!(
            merchant = %draft.merchant_name,
            asset = %draft.asset_code,
            amount = %requested_amount,
            open_amount = draft.allows_open_amount(),
            "confirmation flow started"
        );

        Self {
            draft,
            payer,
            config,
            deps,
            sequencer: QuoteSequencer::new(),
            busy: AtomicBool::new(false),
            cancel: PollCancel::new(),
            session: Mutex::new(Session {
                state: FlowState::Idle,
                selected_asset: None,
                requested_amount,
                quote: None,
                store: TransactionDraftStore::new(),
                outcome: None,
            }),
        }
    }

    pub fn draft(&self) -> &PaymentDraft {
        &self.draft
    }

    pub async fn state(&self) -> FlowState {
        self.session.lock().await.state
    }

    pub async fn outcome(&self) -> Option<FlowOutcome> {
        self.session.lock().await.outcome.clone()
    }

    pub async fn requested_amount(&self) -> Decimal {
        self.session.lock().await.requested_amount
    }

    pub async fn quote(&self) -> Option<Quote> {
        self.session.lock().await.quote.clone()
    }

    pub async fn quote_view(&self) -> Option<QuoteView> {
        self.session.lock().await.quote.as_ref().map(QuoteView::from)
    }

    pub async fn intent(&self) -> Option<TransactionIntent> {
        self.session.lock().await.store.intent().cloned()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Quote handling
    // =========================================================================

    pub async fn select_source_asset(&self, asset: &str) -> FlowResult<QuoteUpdate> {
        {
            let mut session = self.session.lock().await;
            self.ensure_editable(&session)?;
            session.selected_asset = Some(asset.trim().to_uppercase());
        }
        self.refresh_quote().await
    }

    /// Only open-amount drafts accept a new amount.
    pub async fn set_requested_amount(&self, amount: Decimal) -> FlowResult<QuoteUpdate> {
        if !self.draft.allows_open_amount() {
            return Err(FlowError::AmountLocked);
        }
        if amount.is_sign_negative() {
            return Err(FlowError::InvalidAmount { amount });
        }
        {
            let mut session = self.session.lock().await;
            self.ensure_editable(&session)?;
            session.requested_amount = amount;
        }
        self.refresh_quote().await
    }

    /// Fetch a quote for the current asset and amount. Only the response to
    /// the most recently issued request is applied.
    pub async fn refresh_quote(&self) -> FlowResult<QuoteUpdate> {
        let (ticket, from, amount) = {
            let mut session = self.session.lock().await;
            self.ensure_editable(&session)?;
            let Some(from) = session.selected_asset.clone() else {
                return Ok(QuoteUpdate::Unavailable);
            };
            session.state = FlowState::QuoteLoading;
            session.quote = None;
            (self.sequencer.issue(), from, session.requested_amount)
        };

        debug!(
            sequence = ticket.sequence(),
            from = %from,
            to = %self.draft.asset_code,
            %amount,
            "requesting quote"
        );
        let result = self
            .deps
            .quotes
            .get_quote(&from, &self.draft.asset_code, amount, QuoteKind::FixedDestination)
            .await;

        let mut session = self.session.lock().await;
        if !self.sequencer.is_latest(ticket) || session.state != FlowState::QuoteLoading {
            debug!(sequence = ticket.sequence(), from = %from, "discarding superseded quote");
            return Ok(QuoteUpdate::Superseded);
        }

        match result {
            Ok(QuoteResult::Quote(quote)) => {
                let view = QuoteView::from(&quote);
                info!(
                    from = %quote.source_asset,
                    to = %quote.destination_asset,
                    source_amount = %quote.source_amount,
                    destination_amount = %quote.destination_amount,
                    "quote ready"
                );
                session.quote = Some(quote);
                session.state = FlowState::QuoteReady;
                Ok(QuoteUpdate::Ready(view))
            }
            Ok(QuoteResult::NoRoute) => {
                session.state = FlowState::QuoteUnavailable;
                Ok(QuoteUpdate::Unavailable)
            }
            Err(err) => {
                warn!(from = %from, error = %err, "quote request failed");
                session.state = FlowState::QuoteUnavailable;
                Err(FlowError::QuoteUnavailable)
            }
        }
    }

    fn ensure_editable(&self, session: &Session) -> FlowResult<()> {
        if session.state.is_terminal() {
            return Err(FlowError::FlowFinished);
        }
        if self.is_busy()
            || matches!(session.state, FlowState::PinGate | FlowState::Processing)
        {
            return Err(FlowError::InProgress);
        }
        Ok(())
    }

    // =========================================================================
    // Submission guard
    // =========================================================================

    /// False while no quote is ready, the priced amount exceeds the payer's
    /// balance, or a submission is in progress.
    pub async fn can_submit(&self) -> bool {
        if self.is_busy() {
            return false;
        }
        let session = self.session.lock().await;
        self.check_submittable(&session).is_ok()
    }

    fn check_submittable<'a>(&self, session: &'a Session) -> FlowResult<&'a Quote> {
        if session.state.is_terminal() {
            return Err(FlowError::FlowFinished);
        }
        let quote = match (&session.state, session.quote.as_ref()) {
            (FlowState::QuoteReady, Some(quote)) => quote,
            _ => return Err(FlowError::QuoteUnavailable),
        };

        let required = quote.total_source_cost();
        let available = self.payer.balance(&quote.source_asset);
        if required > available {
            return Err(InsufficientBalanceError {
                asset: quote.source_asset.clone(),
                available,
                required,
            }
            .into());
        }

        Ok(quote)
    }

    fn acquire(&self) -> FlowResult<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| FlowError::InProgress)?;
        Ok(BusyGuard(&self.busy))
    }

    // =========================================================================
    // Confirmation
    // =========================================================================

    /// Run the PIN gate, submit and track the transaction.
    ///
    /// `Err` means nothing was sent: the flow was not submittable or the user
    /// backed out of the PIN prompt. Everything after that is reported as a
    /// [`FlowOutcome`].
    pub async fn confirm(&self) -> FlowResult<FlowOutcome> {
        let _busy = self.acquire()?;
        {
            let mut session = self.session.lock().await;
            let quote = self.check_submittable(&session)?;
            let recipient = self
                .draft
                .routing_key
                .as_deref()
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .ok_or_else(|| InvalidCodeError::missing("routing key"))?;
            let intent = TransactionIntent::from_quote(
                quote,
                &self.payer.wallet_id,
                recipient,
                TransactionIntent::merchant_shape(&self.draft),
            )?;

            // Freeze the priced quote: late quote responses are dropped from here on.
            self.sequencer.invalidate();
            session.store.set_intent(intent);
            session.state = FlowState::PinGate;
        }

        match self.run_pin_gate().await {
            Ok(()) => {}
            Err(FlowError::PinCancelled) => {
                let mut session = self.session.lock().await;
                session.store.clear();
                if session.state == FlowState::PinGate {
                    session.state = FlowState::QuoteReady;
                }
                info!("PIN entry cancelled, returning to quote");
                return Err(FlowError::PinCancelled);
            }
            Err(FlowError::Abandoned) => return Err(FlowError::Abandoned),
            Err(err) => return self.finish(FlowOutcome::Failure(err)).await,
        }

        self.submit_and_track().await
    }

    /// Retry the same confirmed intent after a submission error. The PIN gate
    /// is not re-run and the idempotency key is unchanged.
    pub async fn resubmit(&self) -> FlowResult<FlowOutcome> {
        let _busy = self.acquire()?;
        {
            let session = self.session.lock().await;
            if self.cancel.is_cancelled() || session.state == FlowState::Abandoned {
                return Err(FlowError::Abandoned);
            }
            let retryable = matches!(
                session.outcome,
                Some(FlowOutcome::Failure(FlowError::Submission(_)))
            );
            if !retryable || session.store.intent().is_none() {
                return Err(FlowError::NoActiveIntent);
            }
        }

        info!("resubmitting transaction intent");
        self.submit_and_track().await
    }

    /// Stop the flow: cancel polling, drop late quotes and the intent.
    ///
    /// A failed submission that could still be resubmitted is abandoned too;
    /// settled outcomes are left as they are.
    pub async fn abandon(&self) {
        self.cancel.cancel();
        self.sequencer.invalidate();

        let mut session = self.session.lock().await;
        let awaiting_resubmit = matches!(
            session.outcome,
            Some(FlowOutcome::Failure(FlowError::Submission(_)))
        );
        if !session.state.is_terminal() || awaiting_resubmit {
            info!(from_state = %session.state, "confirmation flow abandoned");
            session.state = FlowState::Abandoned;
            session.quote = None;
        }
        if session.store.clear().is_some() {
            debug!("transaction intent dropped on abandon");
        }
    }

    async fn run_pin_gate(&self) -> FlowResult<()> {
        let mut gate = PinGate::new(
            PinGateConfig::from(&self.config),
            Arc::clone(&self.deps.verifier),
        );

        loop {
            let context = PinPromptContext {
                attempt: gate.attempts() + 1,
                remaining_attempts: gate.remaining_attempts(),
                pin_length: gate.pin_length(),
                message: gate.message().map(str::to_string),
            };

            let Some(pin) = self.deps.prompt.request_pin(&context).await else {
                return Err(FlowError::PinCancelled);
            };
            if self.cancel.is_cancelled() {
                return Err(FlowError::Abandoned);
            }

            match gate.enter_pin(&pin).await {
                Ok(PinAttemptOutcome::Accepted) => return Ok(()),
                Ok(PinAttemptOutcome::Incorrect { .. }) => continue,
                Ok(PinAttemptOutcome::Exhausted) => {
                    return Err(FlowError::PinAttemptsExhausted {
                        attempts: gate.attempts(),
                    })
                }
                Ok(PinAttemptOutcome::Fatal(err)) => {
                    return Err(FlowError::PinVerification {
                        message: err.to_string(),
                    })
                }
                Err(err) => {
                    warn!(error = %err, "malformed PIN entry from prompt");
                    return Err(FlowError::PinCancelled);
                }
            }
        }
    }

    async fn submit_and_track(&self) -> FlowResult<FlowOutcome> {
        let payload = {
            let mut session = self.session.lock().await;
            let payload = session
                .store
                .build_submission_payload()
                .ok_or(FlowError::NoActiveIntent)?;
            session.state = FlowState::Processing;
            payload
        };

        let outcome = match self.deps.gateway.submit(payload).await {
            Ok(initial) => self.track(initial).await,
            Err(err) => FlowOutcome::Failure(FlowError::Submission(err)),
        };

        self.finish(outcome).await
    }

    async fn track(&self, initial: TransactionStatus) -> FlowOutcome {
        if !initial.is_non_terminal() || initial.is_settled() {
            return classify(initial);
        }

        match self
            .deps
            .poller
            .poll(&initial.id, self.cancel.subscribe())
            .await
        {
            Ok(status) => classify(status),
            Err(PollError::Cancelled) => FlowOutcome::Failure(FlowError::Abandoned),
            Err(PollError::Fetch(err)) => FlowOutcome::Failure(FlowError::StatusCheck(err)),
        }
    }

    async fn finish(&self, outcome: FlowOutcome) -> FlowResult<FlowOutcome> {
        let mut session = self.session.lock().await;

        if session.state != FlowState::Abandoned {
            session.state = outcome.state();
        }
        // Keep the intent only where a resubmit may follow.
        if !matches!(outcome, FlowOutcome::Failure(FlowError::Submission(_))) {
            session.store.clear();
        }
        session.outcome = Some(outcome.clone());

        match &outcome {
            FlowOutcome::Success(status) => info!(
                transaction_id = %status.id,
                status = %status.status,
                "payment succeeded"
            ),
            FlowOutcome::SoftTimeout(status) => warn!(
                transaction_id = %status.id,
                status = %status.status,
                "payment still pending after polling"
            ),
            FlowOutcome::Failure(err) => warn!(
                error_code = ?err.error_code(),
                error = %err,
                "payment failed"
            ),
        }

        Ok(outcome)
    }
}

/// Map a status to the outcome the user sees.
fn classify(status: TransactionStatus) -> FlowOutcome {
    if status.is_settled() {
        FlowOutcome::Success(status)
    } else if status.is_non_terminal() {
        FlowOutcome::SoftTimeout(status)
    } else {
        FlowOutcome::Failure(FlowError::TransactionFailed {
            transaction_id: status.id.clone(),
            status: status.status.to_string(),
            message: status.message.clone(),
        })
    }
}

impl Drop for ConfirmationFlow {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
