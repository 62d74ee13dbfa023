//! End-to-end confirmation flow scenarios against in-memory collaborators.

mod common;

use common::{fast_flow_config, harness, merchant_draft, StubBackend, TEST_PIN};
use payflow::backend::types::{SubmissionShape, TransactionStatus, TransactionStatusCode};
use payflow::backend::BackendError;
use payflow::error::{ErrorCode, FlowError, InvalidCodeError};
use payflow::services::{FlowOutcome, FlowState, Payer, QuoteUpdate};
use rust_decimal_macros::dec;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn payer() -> Payer {
    Payer::new("wallet-123").with_balance("USDC", dec!(500))
}

#[tokio::test]
async fn quote_of_100_for_120_renders_120_00_and_prices_the_intent() {
    let h = harness(
        merchant_draft(dec!(120)),
        payer(),
        StubBackend::new().with_rate("USDC", dec!(1.2)),
        &[TEST_PIN],
        fast_flow_config(),
    );

    let update = h.flow.select_source_asset("usdc").await.unwrap();
    let QuoteUpdate::Ready(view) = update else {
        panic!("expected a ready quote, got {:?}", update);
    };
    assert_eq!(view.source_amount, "100.00");
    assert_eq!(view.destination_amount, "120.00");
    assert_eq!(view.rate, "1.2");
    assert_eq!(h.flow.state().await, FlowState::QuoteReady);
    assert!(h.flow.can_submit().await);

    let outcome = h.flow.confirm().await.unwrap();
    assert!(outcome.is_success(), "unexpected outcome {:?}", outcome);
    assert_eq!(h.flow.state().await, FlowState::Success);

    let submitted = h.backend.submitted.lock().unwrap().clone();
    assert_eq!(submitted.len(), 1);
    let payload = &submitted[0];
    assert_eq!(payload.rate, dec!(1.2));
    assert_eq!(payload.from.value, dec!(100));
    assert_eq!(payload.from.asset, "USDC");
    assert_eq!(payload.from.wallet_id, "wallet-123");
    assert_eq!(payload.to.value, dec!(120));
    assert_eq!(payload.to.wallet_id, "padaria@example.com");
    assert!(matches!(
        payload.shape,
        SubmissionShape::MerchantPayment { .. }
    ));
    assert!(h.flow.intent().await.is_none());
}

#[tokio::test]
async fn latest_selected_asset_wins_over_slower_earlier_response() {
    let h = harness(
        merchant_draft(dec!(120)),
        payer(),
        StubBackend::new()
            .with_rate("SLOW", dec!(2))
            .with_rate("USDC", dec!(1.2))
            .with_quote_delay("SLOW", Duration::from_millis(150)),
        &[],
        fast_flow_config(),
    );

    let flow = h.flow.clone();
    let earlier = tokio::spawn(async move { flow.select_source_asset("SLOW").await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let latest = h.flow.select_source_asset("USDC").await.unwrap();
    assert!(matches!(latest, QuoteUpdate::Ready(ref v) if v.source_asset == "USDC"));

    let earlier = earlier.await.unwrap().unwrap();
    assert_eq!(earlier, QuoteUpdate::Superseded);

    let view = h.flow.quote_view().await.unwrap();
    assert_eq!(view.source_asset, "USDC");
    assert_eq!(view.source_amount, "100.00");
    assert_eq!(h.flow.state().await, FlowState::QuoteReady);
}

#[tokio::test]
async fn insufficient_balance_blocks_submission_without_network() {
    let h = harness(
        merchant_draft(dec!(120)),
        Payer::new("wallet-123").with_balance("USDC", dec!(99.99)),
        StubBackend::new().with_rate("USDC", dec!(1.2)),
        &[TEST_PIN],
        fast_flow_config(),
    );

    h.flow.select_source_asset("USDC").await.unwrap();
    assert!(!h.flow.can_submit().await);

    let err = h.flow.confirm().await.unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InsufficientBalance);
    assert_eq!(h.prompt.request_count(), 0);
    assert_eq!(h.backend.submission_count(), 0);
    assert_eq!(h.flow.state().await, FlowState::QuoteReady);
}

#[tokio::test]
async fn fees_count_towards_the_balance_check() {
    let h = harness(
        merchant_draft(dec!(120)),
        Payer::new("wallet-123").with_balance("USDC", dec!(100)),
        StubBackend::new()
            .with_rate("USDC", dec!(1.2))
            .with_fees(dec!(0.50)),
        &[TEST_PIN],
        fast_flow_config(),
    );

    h.flow.select_source_asset("USDC").await.unwrap();
    assert!(!h.flow.can_submit().await);
}

#[tokio::test]
async fn no_route_disables_submission() {
    let h = harness(
        merchant_draft(dec!(120)),
        payer(),
        StubBackend::new(),
        &[TEST_PIN],
        fast_flow_config(),
    );

    assert_eq!(
        h.flow.select_source_asset("XLM").await.unwrap(),
        QuoteUpdate::Unavailable
    );
    assert_eq!(h.flow.state().await, FlowState::QuoteUnavailable);
    assert!(!h.flow.can_submit().await);
    assert!(matches!(
        h.flow.confirm().await,
        Err(FlowError::QuoteUnavailable)
    ));
}

#[tokio::test]
async fn resubmit_reuses_the_idempotency_key_and_skips_the_pin() {
    let h = harness(
        merchant_draft(dec!(120)),
        payer(),
        StubBackend::new()
            .with_rate("USDC", dec!(1.2))
            .with_submit_results(vec![
                Err(BackendError::Timeout { seconds: 15 }),
                Ok(TransactionStatus::new("tx_9", TransactionStatusCode::Completed)),
            ]),
        &[TEST_PIN],
        fast_flow_config(),
    );

    h.flow.select_source_asset("USDC").await.unwrap();

    let first = h.flow.confirm().await.unwrap();
    assert!(matches!(first, FlowOutcome::Failure(FlowError::Submission(_))));
    assert!(first.user_message().contains("couldn't submit"));
    assert_eq!(h.flow.state().await, FlowState::Failure);

    let second = h.flow.resubmit().await.unwrap();
    assert!(second.is_success());

    let keys = h.backend.submitted_keys();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0], keys[1]);
    assert_eq!(h.prompt.request_count(), 1);
    assert_eq!(h.verifier.calls.load(Ordering::SeqCst), 1);

    // Nothing left to retry once the intent settled.
    assert!(matches!(
        h.flow.resubmit().await,
        Err(FlowError::NoActiveIntent)
    ));
}

#[tokio::test]
async fn abandoning_after_a_submission_error_blocks_resubmit() {
    let h = harness(
        merchant_draft(dec!(120)),
        payer(),
        StubBackend::new()
            .with_rate("USDC", dec!(1.2))
            .with_submit_results(vec![Err(BackendError::Timeout { seconds: 15 })]),
        &[TEST_PIN],
        fast_flow_config(),
    );

    h.flow.select_source_asset("USDC").await.unwrap();
    let first = h.flow.confirm().await.unwrap();
    assert!(matches!(first, FlowOutcome::Failure(FlowError::Submission(_))));
    assert!(h.flow.intent().await.is_some());

    h.flow.abandon().await;
    assert_eq!(h.flow.state().await, FlowState::Abandoned);
    assert!(h.flow.intent().await.is_none());

    assert!(matches!(
        h.flow.resubmit().await,
        Err(FlowError::Abandoned)
    ));
    assert_eq!(h.backend.submission_count(), 1);
    assert_eq!(h.flow.state().await, FlowState::Abandoned);
}

#[tokio::test]
async fn draft_without_routing_key_is_never_submitted() {
    let mut draft = merchant_draft(dec!(120));
    draft.routing_key = None;
    let h = harness(
        draft,
        payer(),
        StubBackend::new().with_rate("USDC", dec!(1.2)),
        &[TEST_PIN],
        fast_flow_config(),
    );

    h.flow.select_source_asset("USDC").await.unwrap();
    let err = h.flow.confirm().await.unwrap_err();

    assert_eq!(
        err,
        FlowError::InvalidCode(InvalidCodeError::MissingField {
            field: "routing key".to_string()
        })
    );
    assert_eq!(err.error_code(), ErrorCode::InvalidPaymentCode);
    assert_eq!(h.prompt.request_count(), 0);
    assert_eq!(h.backend.submission_count(), 0);
    assert!(h.flow.intent().await.is_none());
}

#[tokio::test]
async fn exhausted_pin_aborts_without_submitting() {
    let h = harness(
        merchant_draft(dec!(120)),
        payer(),
        StubBackend::new().with_rate("USDC", dec!(1.2)),
        &["0000", "1111", "2222", TEST_PIN],
        fast_flow_config(),
    );

    h.flow.select_source_asset("USDC").await.unwrap();
    let outcome = h.flow.confirm().await.unwrap();

    assert_eq!(
        outcome,
        FlowOutcome::Failure(FlowError::PinAttemptsExhausted { attempts: 3 })
    );
    assert_eq!(h.flow.state().await, FlowState::Failure);
    assert_eq!(h.backend.submission_count(), 0);
    assert_eq!(h.prompt.request_count(), 3);

    let contexts = h.prompt.contexts.lock().unwrap().clone();
    assert_eq!(contexts[0].message, None);
    assert_eq!(contexts[1].remaining_attempts, 2);
    assert!(contexts[1]
        .message
        .as_deref()
        .is_some_and(|m| m.starts_with("Incorrect PIN")));
}

#[tokio::test]
async fn dismissed_pin_prompt_returns_to_the_quote() {
    let h = harness(
        merchant_draft(dec!(120)),
        payer(),
        StubBackend::new().with_rate("USDC", dec!(1.2)),
        &[],
        fast_flow_config(),
    );

    h.flow.select_source_asset("USDC").await.unwrap();
    assert!(matches!(
        h.flow.confirm().await,
        Err(FlowError::PinCancelled)
    ));
    assert_eq!(h.flow.state().await, FlowState::QuoteReady);
    assert!(h.flow.intent().await.is_none());
    assert!(h.flow.can_submit().await);
}

#[tokio::test]
async fn polling_exhaustion_is_a_soft_timeout() {
    let h = harness(
        merchant_draft(dec!(120)),
        payer(),
        StubBackend::new()
            .with_rate("USDC", dec!(1.2))
            .with_statuses(&["pending_external"]),
        &[TEST_PIN],
        fast_flow_config(),
    );

    h.flow.select_source_asset("USDC").await.unwrap();
    let outcome = h.flow.confirm().await.unwrap();

    assert_eq!(outcome.state(), FlowState::SoftTimeout);
    assert!(outcome.user_message().contains("check your balance"));
    assert_eq!(h.backend.status_calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.flow.state().await, FlowState::SoftTimeout);
}

#[tokio::test]
async fn failed_status_is_a_failure() {
    let h = harness(
        merchant_draft(dec!(120)),
        payer(),
        StubBackend::new()
            .with_rate("USDC", dec!(1.2))
            .with_statuses(&["pending", "failed"]),
        &[TEST_PIN],
        fast_flow_config(),
    );

    h.flow.select_source_asset("USDC").await.unwrap();
    let outcome = h.flow.confirm().await.unwrap();

    assert!(matches!(
        outcome,
        FlowOutcome::Failure(FlowError::TransactionFailed { .. })
    ));
    assert_eq!(h.backend.status_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn settled_submission_skips_polling() {
    let h = harness(
        merchant_draft(dec!(120)),
        payer(),
        StubBackend::new()
            .with_rate("USDC", dec!(1.2))
            .with_submit_results(vec![Ok(TransactionStatus::new(
                "tx_2",
                TransactionStatusCode::Paid,
            ))]),
        &[TEST_PIN],
        fast_flow_config(),
    );

    h.flow.select_source_asset("USDC").await.unwrap();
    assert!(h.flow.confirm().await.unwrap().is_success());
    assert_eq!(h.backend.status_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn abandoning_stops_the_poll() {
    let mut config = fast_flow_config();
    config.poll_interval = Duration::from_millis(30);
    config.poll_max_attempts = 50;

    let h = harness(
        merchant_draft(dec!(120)),
        payer(),
        StubBackend::new()
            .with_rate("USDC", dec!(1.2))
            .with_statuses(&["pending"]),
        &[TEST_PIN],
        config,
    );

    h.flow.select_source_asset("USDC").await.unwrap();
    let flow = h.flow.clone();
    let confirm = tokio::spawn(async move { flow.confirm().await });

    tokio::time::sleep(Duration::from_millis(80)).await;
    h.flow.abandon().await;

    let outcome = confirm.await.unwrap().unwrap();
    assert_eq!(outcome, FlowOutcome::Failure(FlowError::Abandoned));
    assert_eq!(h.flow.state().await, FlowState::Abandoned);

    let polls = h.backend.status_calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.backend.status_calls.load(Ordering::SeqCst), polls);
    assert!(polls < 50);
}

#[tokio::test]
async fn amount_is_locked_for_fixed_drafts_and_editable_for_open_ones() {
    let fixed = harness(
        merchant_draft(dec!(120)),
        payer(),
        StubBackend::new().with_rate("USDC", dec!(1.2)),
        &[],
        fast_flow_config(),
    );
    assert_eq!(
        fixed.flow.set_requested_amount(dec!(50)).await,
        Err(FlowError::AmountLocked)
    );
    assert_eq!(fixed.backend.quote_calls.load(Ordering::SeqCst), 0);

    let open = harness(
        merchant_draft(dec!(0)),
        payer(),
        StubBackend::new().with_rate("USDC", dec!(1.2)),
        &[],
        fast_flow_config(),
    );
    assert_eq!(
        open.flow.select_source_asset("USDC").await.unwrap(),
        QuoteUpdate::Unavailable
    );
    assert_eq!(open.backend.quote_calls.load(Ordering::SeqCst), 0);

    let update = open.flow.set_requested_amount(dec!(60)).await.unwrap();
    let QuoteUpdate::Ready(view) = update else {
        panic!("expected a ready quote, got {:?}", update);
    };
    assert_eq!(view.destination_amount, "60.00");
    assert_eq!(view.source_amount, "50.00");
    assert_eq!(open.flow.requested_amount().await, dec!(60));
}

#[tokio::test]
async fn concurrent_confirm_is_rejected() {
    let mut config = fast_flow_config();
    config.poll_initial_delay = Duration::from_millis(100);

    let h = harness(
        merchant_draft(dec!(120)),
        payer(),
        StubBackend::new()
            .with_rate("USDC", dec!(1.2))
            .with_statuses(&["completed"]),
        &[TEST_PIN, TEST_PIN],
        config,
    );

    h.flow.select_source_asset("USDC").await.unwrap();
    let flow = h.flow.clone();
    let first = tokio::spawn(async move { flow.confirm().await });
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert!(h.flow.is_busy());
    assert!(!h.flow.can_submit().await);
    assert!(matches!(h.flow.confirm().await, Err(FlowError::InProgress)));
    assert!(matches!(
        h.flow.select_source_asset("USDC").await,
        Err(FlowError::InProgress)
    ));

    assert!(first.await.unwrap().unwrap().is_success());
    assert_eq!(h.backend.submission_count(), 1);
    assert!(matches!(h.flow.confirm().await, Err(FlowError::FlowFinished)));
}
