use async_trait::async_trait;
use payflow::backend::types::{
    CodePreviewResponse, QuoteRequest, QuoteResponse, SubmissionPayload, TransactionStatus,
    TransactionStatusCode,
};
use payflow::backend::{BackendResult, CodePreviewBackend, QuoteBackend, TransactionBackend};
use payflow::config::{FlowConfig, InterpreterConfig};
use payflow::payment_code::PaymentCodeInterpreter;
use payflow::services::pin_gate::{PinVerifier, PinVerifierError};
use payflow::services::quote::QuoteService;
use payflow::services::submission::SubmissionGateway;
use payflow::services::{
    ConfirmationFlow, FlowDependencies, Payer, PinPrompt, PinPromptContext, QuoteUpdate,
};
use payflow::workers::status_poller::{PollerConfig, TransactionStatusPoller};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

const CODE: &str = "00020101021126410014br.gov.bcb.pix0119padaria@example.com5204581253039865406100.005802BR5915PADARIA CENTRAL6009SAO PAULO62100506PED12363049B81";

/// Prices USDC at 5.5 BRL and settles every transaction on the second poll.
struct InMemoryBackend {
    polls: AtomicU32,
}

#[async_trait]
impl QuoteBackend for InMemoryBackend {
    async fn fetch_quote(&self, request: QuoteRequest) -> BackendResult<Option<QuoteResponse>> {
        if request.from != "USDC" {
            return Ok(None);
        }
        let rate = dec!(5.5);
        Ok(Some(QuoteResponse {
            source_amount: (request.amount / rate).round_dp(7),
            destination_amount: request.amount,
            fees: dec!(0.05),
        }))
    }
}

#[async_trait]
impl CodePreviewBackend for InMemoryBackend {
    async fn preview_code(&self, _code: &str) -> BackendResult<CodePreviewResponse> {
        Ok(CodePreviewResponse::default())
    }
}

#[async_trait]
impl TransactionBackend for InMemoryBackend {
    async fn submit_transaction(
        &self,
        payload: SubmissionPayload,
    ) -> BackendResult<TransactionStatus> {
        println!("📤 Submitted with idempotency key {}", payload.idempotency_key);
        Ok(TransactionStatus::new("tx_demo", TransactionStatusCode::Created))
    }

    async fn fetch_status(&self, transaction_id: &str) -> BackendResult<TransactionStatus> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        let status = if poll < 2 { "pending_external" } else { "paid" };
        println!("🔄 Poll {}: {}", poll, status);
        Ok(TransactionStatus::new(
            transaction_id,
            TransactionStatusCode::parse(status),
        ))
    }
}

struct DemoVerifier;

#[async_trait]
impl PinVerifier for DemoVerifier {
    async fn verify(&self, pin: &str) -> Result<bool, PinVerifierError> {
        Ok(pin == "2468")
    }
}

/// Types a wrong PIN first, then the right one.
struct DemoPrompt;

#[async_trait]
impl PinPrompt for DemoPrompt {
    async fn request_pin(&self, context: &PinPromptContext) -> Option<String> {
        if let Some(message) = &context.message {
            println!("🔐 {}", message);
        }
        let pin = if context.attempt == 1 { "1111" } else { "2468" };
        println!("🔐 Attempt {} with PIN ****", context.attempt);
        Some(pin.to_string())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("🚀 Confirmation Flow Demo\n");

    let backend = Arc::new(InMemoryBackend {
        polls: AtomicU32::new(0),
    });

    let interpreter = PaymentCodeInterpreter::new(InterpreterConfig::default(), backend.clone());
    let draft = interpreter.parse(CODE).await?;
    println!(
        "🧾 {} ({}) asks for {} {}\n",
        draft.merchant_name,
        draft.merchant_category,
        draft.requested_amount,
        draft.asset_code
    );

    let config = FlowConfig {
        poll_initial_delay: Duration::from_millis(200),
        poll_interval: Duration::from_millis(200),
        ..FlowConfig::default()
    };
    let deps = FlowDependencies {
        quotes: Arc::new(QuoteService::new(backend.clone())),
        gateway: Arc::new(SubmissionGateway::new(backend.clone())),
        poller: Arc::new(TransactionStatusPoller::new(
            backend.clone(),
            PollerConfig::from(&config),
        )),
        verifier: Arc::new(DemoVerifier),
        prompt: Arc::new(DemoPrompt),
    };
    let payer = Payer::new("wallet-demo").with_balance("USDC", Decimal::from(50));
    let flow = ConfirmationFlow::new(draft, payer, config, deps);

    match flow.select_source_asset("XLM").await? {
        QuoteUpdate::Ready(view) => println!("💱 XLM quote: {}", view.total),
        _ => println!("❌ XLM cannot pay this merchant"),
    }

    match flow.select_source_asset("USDC").await? {
        QuoteUpdate::Ready(view) => println!(
            "💱 Pay {} {} (fees {}) for {} {} at {}\n",
            view.total,
            view.source_asset,
            view.fees,
            view.destination_amount,
            view.destination_asset,
            view.rate
        ),
        other => println!("❌ No USDC quote: {:?}", other),
    }

    println!("✅ Can submit: {}\n", flow.can_submit().await);

    let outcome = flow.confirm().await?;
    println!("\n🏁 {} ({})", outcome.user_message(), outcome.state());

    Ok(())
}
