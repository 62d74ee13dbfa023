//! Services module for the confirmation core

pub mod confirmation_flow;
pub mod draft_store;
pub mod pin_gate;
pub mod quote;
pub mod submission;

// Re-export the types a caller wires together
pub use confirmation_flow::{
    ConfirmationFlow, FlowDependencies, FlowOutcome, FlowState, Payer, PinPrompt,
    PinPromptContext, QuoteUpdate, QuoteView,
};
pub use draft_store::{TransactionDraftStore, TransactionIntent};
pub use pin_gate::{PinAttemptOutcome, PinGate, PinGateConfig, PinVerifier, PinVerifierError};
pub use quote::{Quote, QuoteResult, QuoteSequencer, QuoteService};
pub use submission::SubmissionGateway;
