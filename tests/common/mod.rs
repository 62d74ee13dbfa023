//! Shared in-memory collaborators for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use payflow::backend::types::{
    CodePreviewResponse, QuoteKind, QuoteRequest, QuoteResponse, SubmissionPayload,
    TransactionStatus, TransactionStatusCode,
};
use payflow::backend::{
    BackendResult, CodePreviewBackend, QuoteBackend, TransactionBackend,
};
use payflow::config::FlowConfig;
use payflow::payment_code::emv::checksum_hex;
use payflow::payment_code::{CodeKind, PaymentDraft};
use payflow::services::pin_gate::{PinVerifier, PinVerifierError};
use payflow::services::quote::QuoteService;
use payflow::services::submission::SubmissionGateway;
use payflow::services::{ConfirmationFlow, FlowDependencies, Payer, PinPrompt, PinPromptContext};
use payflow::workers::status_poller::{PollerConfig, TransactionStatusPoller};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEST_PIN: &str = "1357";

// ---------------------------------------------------------------------------
// Payment codes
// ---------------------------------------------------------------------------

pub fn tlv(id: u8, value: &str) -> String {
    format!("{:02}{:02}{}", id, value.chars().count(), value)
}

/// Assemble a code from records and append a valid checksum.
pub fn build_code(records: &[(u8, String)]) -> String {
    let mut code: String = records.iter().map(|(id, v)| tlv(*id, v)).collect();
    code.push_str("6304");
    let crc = checksum_hex(&code);
    code + &crc
}

pub fn merchant_draft(amount: Decimal) -> PaymentDraft {
    PaymentDraft {
        kind: CodeKind::Static,
        merchant_name: "PADARIA CENTRAL".to_string(),
        merchant_city: Some("SAO PAULO".to_string()),
        requested_amount: amount,
        asset_code: "BRL".to_string(),
        merchant_category: "5812".to_string(),
        country_code: Some("BR".to_string()),
        routing_key: Some("padaria@example.com".to_string()),
        tax_id: None,
        reference: None,
        raw_code: "000201...".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Scripted backend. Quotes use a per-source-asset rate (destination units
/// per source unit); submissions and statuses replay queued answers, the
/// last status repeating forever.
pub struct StubBackend {
    rates: HashMap<String, Decimal>,
    quote_delays: HashMap<String, Duration>,
    fees: Decimal,
    submit_results: Mutex<VecDeque<BackendResult<TransactionStatus>>>,
    statuses: Mutex<VecDeque<TransactionStatusCode>>,
    preview: Option<CodePreviewResponse>,
    pub quote_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub submitted: Mutex<Vec<SubmissionPayload>>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            rates: HashMap::new(),
            quote_delays: HashMap::new(),
            fees: Decimal::ZERO,
            submit_results: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(VecDeque::new()),
            preview: None,
            quote_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_rate(mut self, asset: &str, rate: Decimal) -> Self {
        self.rates.insert(asset.to_string(), rate);
        self
    }

    pub fn with_quote_delay(mut self, asset: &str, delay: Duration) -> Self {
        self.quote_delays.insert(asset.to_string(), delay);
        self
    }

    pub fn with_fees(mut self, fees: Decimal) -> Self {
        self.fees = fees;
        self
    }

    pub fn with_submit_results(self, results: Vec<BackendResult<TransactionStatus>>) -> Self {
        *self.submit_results.lock().unwrap() = results.into();
        self
    }

    pub fn with_statuses(self, statuses: &[&str]) -> Self {
        *self.statuses.lock().unwrap() = statuses
            .iter()
            .map(|s| TransactionStatusCode::parse(s))
            .collect();
        self
    }

    pub fn with_preview(mut self, preview: CodePreviewResponse) -> Self {
        self.preview = Some(preview);
        self
    }

    pub fn submitted_keys(&self) -> Vec<String> {
        self.submitted
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.idempotency_key.clone())
            .collect()
    }

    pub fn submission_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

#[async_trait]
impl QuoteBackend for StubBackend {
    async fn fetch_quote(&self, request: QuoteRequest) -> BackendResult<Option<QuoteResponse>> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.quote_delays.get(&request.from) {
            tokio::time::sleep(*delay).await;
        }

        let Some(rate) = self.rates.get(&request.from).copied() else {
            return Ok(None);
        };
        let (source_amount, destination_amount) = match request.kind {
            QuoteKind::FixedSource => (request.amount, request.amount * rate),
            QuoteKind::FixedDestination => (request.amount / rate, request.amount),
        };
        Ok(Some(QuoteResponse {
            source_amount,
            destination_amount,
            fees: self.fees,
        }))
    }
}

#[async_trait]
impl CodePreviewBackend for StubBackend {
    async fn preview_code(&self, _code: &str) -> BackendResult<CodePreviewResponse> {
        Ok(self.preview.clone().unwrap_or_default())
    }
}

#[async_trait]
impl TransactionBackend for StubBackend {
    async fn submit_transaction(
        &self,
        payload: SubmissionPayload,
    ) -> BackendResult<TransactionStatus> {
        self.submitted.lock().unwrap().push(payload);
        self.submit_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(TransactionStatus::new("tx_1", TransactionStatusCode::Created)))
    }

    async fn fetch_status(&self, transaction_id: &str) -> BackendResult<TransactionStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let mut statuses = self.statuses.lock().unwrap();
        let next = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        let status = next.unwrap_or(TransactionStatusCode::Completed);
        Ok(TransactionStatus::new(transaction_id, status))
    }
}

// ---------------------------------------------------------------------------
// PIN collaborators
// ---------------------------------------------------------------------------

pub struct FixedPinVerifier {
    pub calls: AtomicUsize,
}

impl FixedPinVerifier {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PinVerifier for FixedPinVerifier {
    async fn verify(&self, pin: &str) -> Result<bool, PinVerifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(pin == TEST_PIN)
    }
}

/// Replays queued PINs; dismisses the keypad once the queue is empty.
pub struct ScriptedPrompt {
    pins: Mutex<VecDeque<String>>,
    pub contexts: Mutex<Vec<PinPromptContext>>,
}

impl ScriptedPrompt {
    pub fn new(pins: &[&str]) -> Self {
        Self {
            pins: Mutex::new(pins.iter().map(|p| p.to_string()).collect()),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }
}

#[async_trait]
impl PinPrompt for ScriptedPrompt {
    async fn request_pin(&self, context: &PinPromptContext) -> Option<String> {
        self.contexts.lock().unwrap().push(context.clone());
        self.pins.lock().unwrap().pop_front()
    }
}

// ---------------------------------------------------------------------------
// Flow wiring
// ---------------------------------------------------------------------------

pub fn fast_flow_config() -> FlowConfig {
    FlowConfig {
        poll_initial_delay: Duration::from_millis(5),
        poll_interval: Duration::from_millis(5),
        poll_max_attempts: 3,
        ..FlowConfig::default()
    }
}

pub struct FlowHarness {
    pub flow: Arc<ConfirmationFlow>,
    pub backend: Arc<StubBackend>,
    pub prompt: Arc<ScriptedPrompt>,
    pub verifier: Arc<FixedPinVerifier>,
}

pub fn harness(
    draft: PaymentDraft,
    payer: Payer,
    backend: StubBackend,
    pins: &[&str],
    config: FlowConfig,
) -> FlowHarness {
    let backend = Arc::new(backend);
    let prompt = Arc::new(ScriptedPrompt::new(pins));
    let verifier = Arc::new(FixedPinVerifier::new());

    let deps = FlowDependencies {
        quotes: Arc::new(QuoteService::new(backend.clone())),
        gateway: Arc::new(SubmissionGateway::new(backend.clone())),
        poller: Arc::new(TransactionStatusPoller::new(
            backend.clone(),
            PollerConfig::from(&config),
        )),
        verifier: verifier.clone(),
        prompt: prompt.clone(),
    };

    FlowHarness {
        flow: Arc::new(ConfirmationFlow::new(draft, payer, config, deps)),
        backend,
        prompt,
        verifier,
    }
}
