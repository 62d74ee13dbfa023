use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CodeKind {
    /// Every field is embedded in the code.
    Static,
    /// The code only points at a backend record that holds the details.
    Dynamic,
}

impl CodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeKind::Static => "static",
            CodeKind::Dynamic => "dynamic",
        }
    }
}

/// Normalised payment request produced from a payment code.
///
/// Immutable once built. The confirmation flow keeps its own editable copy
/// of the requested amount for open-amount drafts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentDraft {
    pub kind: CodeKind,
    pub merchant_name: String,
    pub merchant_city: Option<String>,
    /// Zero means the payer chooses the amount.
    pub requested_amount: Decimal,
    /// Destination asset, e.g. `BRL`.
    pub asset_code: String,
    pub merchant_category: String,
    pub country_code: Option<String>,
    pub routing_key: Option<String>,
    pub tax_id: Option<String>,
    pub reference: Option<String>,
    /// The code exactly as scanned, forwarded on merchant payments.
    pub raw_code: String,
}

impl PaymentDraft {
    pub fn allows_open_amount(&self) -> bool {
        self.requested_amount.is_zero()
    }
}
