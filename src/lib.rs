//! payflow: orchestration core for paying a scanned payment code.
//!
//! Parses the code, keeps a conversion quote fresh, gates the payment behind
//! a PIN, submits it once per intent and polls the backend until the
//! transaction reaches a terminal state.

pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod payment_code;
pub mod services;
pub mod workers;

pub use config::AppConfig;
pub use error::{FlowError, FlowResult};
pub use payment_code::{PaymentCodeInterpreter, PaymentDraft};
pub use services::{ConfirmationFlow, FlowOutcome, FlowState};
