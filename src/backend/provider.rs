use crate::backend::error::BackendResult;
use crate::backend::types::{
    CodePreviewResponse, QuoteRequest, QuoteResponse, SubmissionPayload, TransactionStatus,
};
use async_trait::async_trait;

/// `POST /quote`. `Ok(None)` is the backend saying there is no tradeable
/// route for the pair and amount.
#[async_trait]
pub trait QuoteBackend: Send + Sync {
    async fn fetch_quote(&self, request: QuoteRequest) -> BackendResult<Option<QuoteResponse>>;
}

/// `POST /code-preview`, used to resolve dynamic payment codes.
#[async_trait]
pub trait CodePreviewBackend: Send + Sync {
    async fn preview_code(&self, code: &str) -> BackendResult<CodePreviewResponse>;
}

/// `POST /transaction` and `GET /transaction/{id}`.
#[async_trait]
pub trait TransactionBackend: Send + Sync {
    async fn submit_transaction(
        &self,
        payload: SubmissionPayload,
    ) -> BackendResult<TransactionStatus>;

    async fn fetch_status(&self, transaction_id: &str) -> BackendResult<TransactionStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::{Party, QuoteKind, SubmissionShape, TransactionStatusCode};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    struct MockBackend;

    #[async_trait]
    impl QuoteBackend for MockBackend {
        async fn fetch_quote(
            &self,
            request: QuoteRequest,
        ) -> BackendResult<Option<QuoteResponse>> {
            if request.from == request.to {
                return Ok(None);
            }
            Ok(Some(QuoteResponse {
                source_amount: request.amount,
                destination_amount: request.amount * dec!(2),
                fees: dec!(0),
            }))
        }
    }

    #[async_trait]
    impl TransactionBackend for MockBackend {
        async fn submit_transaction(
            &self,
            payload: SubmissionPayload,
        ) -> BackendResult<TransactionStatus> {
            Ok(TransactionStatus::new(
                format!("tx_{}", payload.idempotency_key),
                TransactionStatusCode::Created,
            ))
        }

        async fn fetch_status(&self, transaction_id: &str) -> BackendResult<TransactionStatus> {
            Ok(TransactionStatus::new(
                transaction_id,
                TransactionStatusCode::Completed,
            ))
        }
    }

    #[tokio::test]
    async fn traits_can_be_implemented_by_mock_backend() {
        let quotes: Arc<dyn QuoteBackend> = Arc::new(MockBackend);
        let quote = quotes
            .fetch_quote(QuoteRequest {
                from: "USDC".to_string(),
                to: "BRL".to_string(),
                amount: dec!(10),
                kind: QuoteKind::FixedSource,
            })
            .await
            .expect("quote should succeed")
            .expect("route should exist");
        assert_eq!(quote.destination_amount, dec!(20));

        let transactions: Arc<dyn TransactionBackend> = Arc::new(MockBackend);
        let party = Party {
            wallet_id: "w".to_string(),
            asset: "USDC".to_string(),
            value: dec!(10),
        };
        let status = transactions
            .submit_transaction(SubmissionPayload {
                idempotency_key: "abc".to_string(),
                from: party.clone(),
                to: party,
                rate: dec!(1),
                fees: dec!(0),
                shape: SubmissionShape::Transfer,
            })
            .await
            .expect("submission should succeed");
        assert_eq!(status.id, "tx_abc");

        let polled = transactions.fetch_status(&status.id).await.unwrap();
        assert!(polled.is_settled());
    }
}
