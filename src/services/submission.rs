//! Submission Gateway
//!
//! Sends a transaction to the backend with at most one outstanding call per
//! idempotency key. Concurrent callers holding the same key await the same
//! shared future instead of issuing a second request.

use crate::backend::types::{SubmissionPayload, TransactionStatus};
use crate::backend::TransactionBackend;
use crate::error::TransactionSubmissionError;
use crate::logging::mask_identifier;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub type SubmissionResult = Result<TransactionStatus, TransactionSubmissionError>;

type InFlightSubmission = Shared<BoxFuture<'static, SubmissionResult>>;

pub struct SubmissionGateway {
    backend: Arc<dyn TransactionBackend>,
    in_flight: Mutex<HashMap<String, InFlightSubmission>>,
}

impl SubmissionGateway {
    pub fn new(backend: Arc<dyn TransactionBackend>) -> Self {
        Self {
            backend,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub async fn submit(&self, payload: SubmissionPayload) -> SubmissionResult {
        let key = payload.idempotency_key.clone();
        let masked_key = mask_identifier(&key);

        let submission = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(&key) {
                Some(existing) => {
                    debug!(idempotency_key = %masked_key, "joining in-flight submission");
                    existing.clone()
                }
                None => {
                    let backend = Arc::clone(&self.backend);
                    let submission = async move {
                        backend
                            .submit_transaction(payload)
                            .await
                            .map_err(TransactionSubmissionError::from)
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(key.clone(), submission.clone());
                    submission
                }
            }
        };

        let result = submission.clone().await;

        {
            let mut in_flight = self.in_flight.lock().await;
            if in_flight
                .get(&key)
                .is_some_and(|current| current.ptr_eq(&submission))
            {
                in_flight.remove(&key);
            }
        }

        match &result {
            Ok(status) => info!(
                transaction_id = %status.id,
                status = %status.status,
                idempotency_key = %masked_key,
                "transaction submitted"
            ),
            Err(err) => warn!(
                idempotency_key = %masked_key,
                retryable = err.retryable,
                error = %err,
                "transaction submission failed"
            ),
        }

        result
    }

    /// Number of submissions currently awaiting the backend.
    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}
