//! Backend collaborators consumed by the confirmation core: quote pricing,
//! dynamic code preview, transaction submission and status lookup.

pub mod error;
pub mod http;
pub mod provider;
pub mod types;

pub use error::{BackendError, BackendResult};
pub use provider::{CodePreviewBackend, QuoteBackend, TransactionBackend};
