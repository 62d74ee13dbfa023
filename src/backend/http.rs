//! HTTP adapter for the payment backend.
//!
//! Implements every backend trait over a single `reqwest` client. Idempotent
//! reads (quote, code preview, status) are retried with exponential backoff
//! on 429/5xx and transport failures; the submission call is sent once and
//! left to the caller to retry with the same idempotency key.

use crate::backend::error::{BackendError, BackendResult};
use crate::backend::provider::{CodePreviewBackend, QuoteBackend, TransactionBackend};
use crate::backend::types::{
    CodePreviewRequest, CodePreviewResponse, QuoteRequest, QuoteResponse, SubmissionPayload,
    TransactionStatus,
};
use crate::config::BackendConfig;
use crate::logging::mask_identifier;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Whether a request may be re-sent automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryPolicy {
    Backoff,
    Once,
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    config: BackendConfig,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> BackendResult<Self> {
        config
            .validate()
            .map_err(|e| BackendError::ConfigError {
                message: e.to_string(),
            })?;

        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("payflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackendError::ConfigError {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;

        info!(
            base_url = %config.base_url,
            timeout_secs = config.timeout_secs,
            max_retries = config.max_retries,
            "payment backend client initialized"
        );

        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn request_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        headers: &[(&str, &str)],
        policy: RetryPolicy,
    ) -> BackendResult<T> {
        let url = self.endpoint(path);
        let max_retries = match policy {
            RetryPolicy::Backoff => self.config.max_retries,
            RetryPolicy::Once => 0,
        };

        let mut last_error = None;
        for attempt in 0..=max_retries {
            let mut request = self.client.request(method.clone(), &url);
            if let Some(token) = self.config.api_token.as_deref() {
                request = request.bearer_auth(token);
            }
            for (k, v) in headers {
                request = request.header(*k, *v);
            }
            if let Some(payload) = body {
                request = request.json(payload);
            }

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    let err = if e.is_timeout() {
                        BackendError::Timeout {
                            seconds: self.config.timeout_secs,
                        }
                    } else {
                        BackendError::network(format!("backend request failed: {}", e))
                    };
                    last_error = Some(err);
                    if attempt < max_retries {
                        tokio::time::sleep(backoff(attempt)).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            debug!(%url, status = status.as_u16(), attempt = attempt + 1, "backend response");

            if status.is_success() {
                let body = if text.trim().is_empty() { "null" } else { text.as_str() };
                return serde_json::from_str::<T>(body).map_err(|e| {
                    BackendError::invalid_response(format!("invalid JSON from {}: {}", path, e))
                });
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt < max_retries {
                    tokio::time::sleep(backoff(attempt)).await;
                    continue;
                }
                return Err(BackendError::RateLimitError {
                    message: "backend rate limit exceeded".to_string(),
                    retry_after_seconds: None,
                });
            }

            if status.is_server_error() && attempt < max_retries {
                warn!(
                    status = %status,
                    attempt = attempt + 1,
                    path,
                    "backend server error, retrying"
                );
                tokio::time::sleep(backoff(attempt)).await;
                continue;
            }

            return Err(BackendError::Rejected {
                status: status.as_u16(),
                message: extract_error_message(&text),
                retryable: status.is_server_error(),
            });
        }

        Err(last_error.unwrap_or_else(|| BackendError::network("backend request failed")))
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(250 * (1 << attempt.min(5)))
}

/// Pulls a human-readable message out of an error body. Accepts
/// `{"message": ..}`, `{"error": ..}`, `{"error": {"message": ..}}` or a
/// plain-text body.
pub fn extract_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<JsonValue>(trimmed) {
        Ok(json) => {
            let candidate = json
                .get("message")
                .and_then(|v| v.as_str())
                .or_else(|| json.get("error").and_then(|v| v.as_str()))
                .or_else(|| {
                    json.get("error")
                        .and_then(|e| e.get("message"))
                        .and_then(|v| v.as_str())
                })
                .or_else(|| json.get("detail").and_then(|v| v.as_str()));
            candidate
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
        }
        Err(_) if trimmed.starts_with('<') => None,
        Err(_) => Some(trimmed.to_string()),
    }
}

#[async_trait]
impl QuoteBackend for HttpBackend {
    async fn fetch_quote(&self, request: QuoteRequest) -> BackendResult<Option<QuoteResponse>> {
        self.request_json(Method::POST, "/quote", Some(&request), &[], RetryPolicy::Backoff)
            .await
    }
}

#[async_trait]
impl CodePreviewBackend for HttpBackend {
    async fn preview_code(&self, code: &str) -> BackendResult<CodePreviewResponse> {
        let request = CodePreviewRequest {
            code: code.to_string(),
        };
        let result: BackendResult<CodePreviewResponse> = self
            .request_json(
                Method::POST,
                "/code-preview",
                Some(&request),
                &[],
                RetryPolicy::Backoff,
            )
            .await;

        match result {
            // The backend signals an unknown or expired code with a 4xx.
            Err(BackendError::Rejected {
                status: 400 | 404 | 410 | 422,
                message,
                ..
            }) => Ok(CodePreviewResponse {
                valid: false,
                message,
                ..CodePreviewResponse::default()
            }),
            other => other,
        }
    }
}

#[async_trait]
impl TransactionBackend for HttpBackend {
    async fn submit_transaction(
        &self,
        payload: SubmissionPayload,
    ) -> BackendResult<TransactionStatus> {
        info!(
            idempotency_key = %mask_identifier(&payload.idempotency_key),
            shape = payload.shape.as_str(),
            from_asset = %payload.from.asset,
            to_asset = %payload.to.asset,
            "submitting transaction"
        );
        let key = payload.idempotency_key.clone();
        self.request_json(
            Method::POST,
            "/transaction",
            Some(&payload),
            &[(IDEMPOTENCY_HEADER, key.as_str())],
            RetryPolicy::Once,
        )
        .await
    }

    async fn fetch_status(&self, transaction_id: &str) -> BackendResult<TransactionStatus> {
        self.request_json::<(), _>(
            Method::GET,
            &format!("/transaction/{}", transaction_id),
            None,
            &[],
            RetryPolicy::Backoff,
        )
        .await
    }
}
