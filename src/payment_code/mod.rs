//! Payment code interpretation
//!
//! Turns a scanned or pasted payment code into a [`PaymentDraft`]. Static
//! codes are decoded locally and gated on the merchant-category allow-list;
//! dynamic codes are resolved through the backend preview endpoint. A draft
//! is either fully populated or not returned at all.

pub mod emv;
pub mod types;

pub use types::{CodeKind, PaymentDraft};

use crate::backend::{BackendError, CodePreviewBackend};
use crate::config::InterpreterConfig;
use crate::error::InvalidCodeError;
use crate::logging::mask_identifier;
use emv::{EmvPayload, MerchantAccount};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error(transparent)]
    Invalid(#[from] InvalidCodeError),

    #[error("payment code preview failed: {0}")]
    Preview(BackendError),
}

impl ParseError {
    pub fn user_message(&self) -> String {
        match self {
            ParseError::Invalid(err) => err.user_message(),
            ParseError::Preview(err) => err.user_message(),
        }
    }
}

/// Fields read straight out of the code, before any backend lookup.
#[derive(Debug, Clone)]
struct EmbeddedFields {
    merchant_name: String,
    merchant_city: Option<String>,
    amount: Decimal,
    asset_code: String,
    category: String,
    country_code: Option<String>,
    reference: Option<String>,
}

impl EmbeddedFields {
    fn extract(payload: &EmvPayload) -> Result<Self, InvalidCodeError> {
        let merchant_name = payload
            .get(emv::ID_MERCHANT_NAME)
            .ok_or_else(|| InvalidCodeError::missing("merchant name (59)"))?
            .to_string();

        let category = payload
            .get(emv::ID_MERCHANT_CATEGORY)
            .ok_or_else(|| InvalidCodeError::missing("merchant category (52)"))?;
        if !emv::is_valid_category(category) {
            return Err(InvalidCodeError::malformed(format!(
                "merchant category '{}' must be four digits",
                category
            )));
        }

        let currency = payload
            .get(emv::ID_CURRENCY)
            .ok_or_else(|| InvalidCodeError::missing("currency (53)"))?;
        let asset_code = emv::asset_code_for_currency(currency).ok_or_else(|| {
            InvalidCodeError::UnsupportedCurrency {
                currency: currency.to_string(),
            }
        })?;

        let amount = match payload.get(emv::ID_AMOUNT) {
            Some(raw) => parse_amount(raw)?,
            None => Decimal::ZERO,
        };

        Ok(Self {
            merchant_name,
            merchant_city: payload.get(emv::ID_MERCHANT_CITY).map(str::to_string),
            amount,
            asset_code: asset_code.to_string(),
            category: category.to_string(),
            country_code: payload.get(emv::ID_COUNTRY).map(str::to_string),
            reference: payload.reference()?,
        })
    }
}

fn parse_amount(raw: &str) -> Result<Decimal, InvalidCodeError> {
    if !emv::is_valid_amount(raw) {
        return Err(InvalidCodeError::InvalidAmount {
            amount: raw.to_string(),
        });
    }
    Decimal::from_str(raw).map_err(|_| InvalidCodeError::InvalidAmount {
        amount: raw.to_string(),
    })
}

fn kind_of(account: &MerchantAccount) -> CodeKind {
    if account.routing_key.is_some() {
        CodeKind::Static
    } else {
        CodeKind::Dynamic
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub struct PaymentCodeInterpreter {
    config: InterpreterConfig,
    preview: Arc<dyn CodePreviewBackend>,
}

impl PaymentCodeInterpreter {
    pub fn new(config: InterpreterConfig, preview: Arc<dyn CodePreviewBackend>) -> Self {
        Self { config, preview }
    }

    /// Structural classification only; never touches the network.
    pub fn classify(&self, code: &str) -> Result<CodeKind, InvalidCodeError> {
        let payload = EmvPayload::decode(code)?;
        let account = payload
            .merchant_account()?
            .ok_or(InvalidCodeError::UnknownScheme)?;
        Ok(kind_of(&account))
    }

    pub async fn parse(&self, code: &str) -> Result<PaymentDraft, ParseError> {
        let code = code.trim();
        let payload = EmvPayload::decode(code)?;
        let account = payload
            .merchant_account()?
            .ok_or(InvalidCodeError::UnknownScheme)?;
        let embedded = EmbeddedFields::extract(&payload)?;

        let draft = match kind_of(&account) {
            CodeKind::Static => self.static_draft(code, account, embedded)?,
            CodeKind::Dynamic => self.dynamic_draft(code, embedded).await?,
        };

        info!(
            kind = draft.kind.as_str(),
            category = %draft.merchant_category,
            asset = %draft.asset_code,
            amount = %draft.requested_amount,
            open_amount = draft.allows_open_amount(),
            "payment code parsed"
        );

        Ok(draft)
    }

    fn static_draft(
        &self,
        code: &str,
        account: MerchantAccount,
        embedded: EmbeddedFields,
    ) -> Result<PaymentDraft, InvalidCodeError> {
        if !self.config.is_category_allowed(&embedded.category) {
            warn!(category = %embedded.category, "merchant category not allowed");
            return Err(InvalidCodeError::CategoryNotAllowed {
                category: embedded.category,
            });
        }

        if let Some(key) = account.routing_key.as_deref() {
            debug!(routing_key = %mask_identifier(key), "static payment code");
        }

        Ok(PaymentDraft {
            kind: CodeKind::Static,
            merchant_name: embedded.merchant_name,
            merchant_city: embedded.merchant_city,
            requested_amount: embedded.amount,
            asset_code: embedded.asset_code,
            merchant_category: embedded.category,
            country_code: embedded.country_code,
            routing_key: account.routing_key,
            tax_id: None,
            reference: embedded.reference,
            raw_code: code.to_string(),
        })
    }

    async fn dynamic_draft(
        &self,
        code: &str,
        embedded: EmbeddedFields,
    ) -> Result<PaymentDraft, ParseError> {
        debug!("resolving dynamic payment code via preview");
        let preview = self
            .preview
            .preview_code(code)
            .await
            .map_err(ParseError::Preview)?;

        if !preview.valid {
            warn!(
                message = preview.message.as_deref().unwrap_or(""),
                "payment code rejected by preview"
            );
            return Err(InvalidCodeError::RejectedByPreview {
                message: non_empty(preview.message),
            }
            .into());
        }

        let routing_key = non_empty(preview.routing_key).ok_or_else(|| {
            warn!("preview accepted the code without a routing key");
            InvalidCodeError::missing("routing key")
        })?;

        let requested_amount = match preview.amount {
            Some(amount) if amount.is_sign_negative() => {
                return Err(InvalidCodeError::InvalidAmount {
                    amount: amount.to_string(),
                }
                .into())
            }
            Some(amount) => amount,
            None => embedded.amount,
        };

        Ok(PaymentDraft {
            kind: CodeKind::Dynamic,
            merchant_name: non_empty(preview.merchant_name).unwrap_or(embedded.merchant_name),
            merchant_city: non_empty(preview.merchant_city).or(embedded.merchant_city),
            requested_amount,
            asset_code: non_empty(preview.asset_code)
                .map(|a| a.to_uppercase())
                .unwrap_or(embedded.asset_code),
            merchant_category: embedded.category,
            country_code: embedded.country_code,
            routing_key: Some(routing_key),
            tax_id: non_empty(preview.tax_id),
            reference: non_empty(preview.reference).or(embedded.reference),
            raw_code: code.to_string(),
        })
    }
}
