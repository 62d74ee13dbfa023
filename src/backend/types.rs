use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Quotes
// ---------------------------------------------------------------------------

/// Which leg of a conversion the requested amount is pinned to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuoteKind {
    /// The payer spends exactly `amount` of the source asset.
    FixedSource,
    /// The recipient receives exactly `amount` of the destination asset.
    FixedDestination,
}

impl QuoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteKind::FixedSource => "fixed_source",
            QuoteKind::FixedDestination => "fixed_destination",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuoteRequest {
    pub from: String,
    pub to: String,
    pub amount: Decimal,
    pub kind: QuoteKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuoteResponse {
    pub source_amount: Decimal,
    pub destination_amount: Decimal,
    #[serde(default)]
    pub fees: Decimal,
}

// ---------------------------------------------------------------------------
// Code preview
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodePreviewRequest {
    pub code: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodePreviewResponse {
    pub valid: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub merchant_name: Option<String>,
    #[serde(default)]
    pub merchant_city: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub asset_code: Option<String>,
    #[serde(default)]
    pub routing_key: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// One side of a transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Party {
    pub wallet_id: String,
    pub asset: String,
    pub value: Decimal,
}

/// Asset-specific part of a submission. Both shapes share the
/// from/to/rate/fees/idempotency-key envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubmissionShape {
    Transfer,
    MerchantPayment {
        merchant_name: String,
        payment_code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        routing_key: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tax_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reference: Option<String>,
    },
}

impl SubmissionShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionShape::Transfer => "transfer",
            SubmissionShape::MerchantPayment { .. } => "merchant_payment",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmissionPayload {
    pub idempotency_key: String,
    pub from: Party,
    pub to: Party,
    pub rate: Decimal,
    pub fees: Decimal,
    #[serde(flatten)]
    pub shape: SubmissionShape,
}

// ---------------------------------------------------------------------------
// Transaction status
// ---------------------------------------------------------------------------

/// Status vocabulary reported by the transaction endpoints.
///
/// Every scheme-specific pending variant (`pending_external`,
/// `pending_anchor`, ...) collapses into [`TransactionStatusCode::Pending`]
/// with the raw value kept as `detail`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransactionStatusCode {
    Created,
    Pending { detail: Option<String> },
    Paid,
    Completed,
    Failed { detail: Option<String> },
    Unrecognized(String),
}

impl TransactionStatusCode {
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase();
        match normalized.as_str() {
            "created" => TransactionStatusCode::Created,
            "pending" => TransactionStatusCode::Pending { detail: None },
            "incomplete" | "processing" => TransactionStatusCode::Pending {
                detail: Some(normalized),
            },
            s if s.starts_with("pending") => TransactionStatusCode::Pending {
                detail: Some(normalized),
            },
            "paid" => TransactionStatusCode::Paid,
            "completed" | "success" | "successful" => TransactionStatusCode::Completed,
            "failed" => TransactionStatusCode::Failed { detail: None },
            "error" | "expired" | "refunded" | "cancelled" | "rejected" => {
                TransactionStatusCode::Failed {
                    detail: Some(normalized),
                }
            }
            _ => TransactionStatusCode::Unrecognized(raw.trim().to_string()),
        }
    }

    /// Membership in the set that still warrants polling.
    pub fn is_non_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatusCode::Created | TransactionStatusCode::Pending { .. }
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            TransactionStatusCode::Paid | TransactionStatusCode::Completed
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TransactionStatusCode::Failed { .. })
    }

    pub fn as_str(&self) -> &str {
        match self {
            TransactionStatusCode::Created => "created",
            TransactionStatusCode::Pending { detail } => detail.as_deref().unwrap_or("pending"),
            TransactionStatusCode::Paid => "paid",
            TransactionStatusCode::Completed => "completed",
            TransactionStatusCode::Failed { detail } => detail.as_deref().unwrap_or("failed"),
            TransactionStatusCode::Unrecognized(raw) => raw.as_str(),
        }
    }
}

impl From<String> for TransactionStatusCode {
    fn from(value: String) -> Self {
        TransactionStatusCode::parse(&value)
    }
}

impl From<TransactionStatusCode> for String {
    fn from(value: TransactionStatusCode) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for TransactionStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatus {
    pub id: String,
    pub status: TransactionStatusCode,
    #[serde(default, alias = "settlementRef")]
    pub settlement_ref: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl TransactionStatus {
    pub fn new(id: impl Into<String>, status: TransactionStatusCode) -> Self {
        Self {
            id: id.into(),
            status,
            settlement_ref: None,
            message: None,
        }
    }

    pub fn with_settlement_ref(mut self, settlement_ref: impl Into<String>) -> Self {
        self.settlement_ref = Some(settlement_ref.into());
        self
    }

    pub fn is_non_terminal(&self) -> bool {
        self.status.is_non_terminal()
    }

    /// Paid/completed, or any status that already carries a settlement
    /// reference.
    pub fn is_settled(&self) -> bool {
        self.status.is_success()
            || self
                .settlement_ref
                .as_deref()
                .is_some_and(|r| !r.trim().is_empty())
    }
}
