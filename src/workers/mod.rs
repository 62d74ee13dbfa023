pub mod status_poller;

pub use status_poller::{wait_for_terminal, PollCancel, PollError, PollerConfig, TransactionStatusPoller};
