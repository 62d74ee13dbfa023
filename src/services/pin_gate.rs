//! PIN Gate
//!
//! Collects a fixed-length PIN, checks it through an injected verifier and
//! bounds the number of incorrect attempts. Incorrect entries stay inside
//! the gate; only exhaustion or a verifier failure escalates, through the
//! fatal callback and a terminal state.
//!
//! Every verification also returns a [`PinAttemptOutcome`]. Callers that
//! drive the gate in a loop, like the confirmation flow, act on that value;
//! the callbacks are for keypad-style callers that only push digits.
//!
//! PIN digits are never logged.

use crate::config::FlowConfig;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

// ============================================================================
// Verifier
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PinVerifierError {
    #[error("PIN verification unavailable: {0}")]
    Unavailable(String),

    #[error("PIN verification failed: {0}")]
    Internal(String),
}

/// `Ok(false)` means the PIN is wrong; `Err` means the check itself failed.
#[async_trait]
pub trait PinVerifier: Send + Sync {
    async fn verify(&self, pin: &str) -> Result<bool, PinVerifierError>;
}

// ============================================================================
// Gate Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinGateConfig {
    pub pin_length: usize,
    pub max_attempts: u32,
    /// Verify as soon as the last digit is entered.
    pub auto_submit: bool,
}

impl Default for PinGateConfig {
    fn default() -> Self {
        Self {
            pin_length: 4,
            max_attempts: 3,
            auto_submit: true,
        }
    }
}

impl From<&FlowConfig> for PinGateConfig {
    fn from(config: &FlowConfig) -> Self {
        Self {
            pin_length: config.pin_length,
            max_attempts: config.pin_max_attempts,
            auto_submit: config.pin_auto_submit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinGateState {
    AwaitingInput,
    Verifying,
    Success,
    Exhausted,
    /// The verifier itself failed.
    Failed,
}

impl PinGateState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PinGateState::Success | PinGateState::Exhausted | PinGateState::Failed
        )
    }
}

impl fmt::Display for PinGateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PinGateState::AwaitingInput => "awaiting_input",
            PinGateState::Verifying => "verifying",
            PinGateState::Success => "success",
            PinGateState::Exhausted => "exhausted",
            PinGateState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Result of one verification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinAttemptOutcome {
    Accepted,
    /// Wrong PIN; the gate is ready for another try.
    Incorrect { remaining: u32 },
    /// Wrong PIN and no attempts left.
    Exhausted,
    /// The verifier failed. The attempt counter is untouched.
    Fatal(PinVerifierError),
}

impl PinAttemptOutcome {
    pub fn is_fatal(&self) -> bool {
        matches!(self, PinAttemptOutcome::Exhausted | PinAttemptOutcome::Fatal(_))
    }
}

/// What happened to a single key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigitOutcome {
    Collected { entered: usize },
    Ignored,
    Verified(PinAttemptOutcome),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PinGateError {
    #[error("PIN gate is not accepting input (state: {state})")]
    NotAwaitingInput { state: PinGateState },

    #[error("PIN is incomplete: {entered} of {expected} digits")]
    Incomplete { entered: usize, expected: usize },

    #[error("PIN must contain only digits")]
    InvalidInput,
}

pub type SuccessCallback = Box<dyn FnMut() + Send>;
pub type FatalCallback = Box<dyn FnMut(&PinAttemptOutcome) + Send>;

// ============================================================================
// Gate
// ============================================================================

pub struct PinGate {
    config: PinGateConfig,
    verifier: Arc<dyn PinVerifier>,
    digits: String,
    attempts: u32,
    state: PinGateState,
    message: Option<String>,
    on_success: Option<SuccessCallback>,
    on_fatal: Option<FatalCallback>,
}

impl PinGate {
    pub fn new(config: PinGateConfig, verifier: Arc<dyn PinVerifier>) -> Self {
        Self {
            config: PinGateConfig {
                pin_length: config.pin_length.max(1),
                max_attempts: config.max_attempts.max(1),
                auto_submit: config.auto_submit,
            },
            verifier,
            digits: String::new(),
            attempts: 0,
            state: PinGateState::AwaitingInput,
            message: None,
            on_success: None,
            on_fatal: None,
        }
    }

    pub fn on_success(mut self, callback: impl FnMut() + Send + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    /// Invoked once with `Exhausted` or `Fatal` when the gate gives up.
    pub fn on_fatal(mut self, callback: impl FnMut(&PinAttemptOutcome) + Send + 'static) -> Self {
        self.on_fatal = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> PinGateState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    pub fn remaining_attempts(&self) -> u32 {
        self.config.max_attempts.saturating_sub(self.attempts)
    }

    pub fn pin_length(&self) -> usize {
        self.config.pin_length
    }

    pub fn entered_len(&self) -> usize {
        self.digits.len()
    }

    pub fn is_complete(&self) -> bool {
        self.digits.len() == self.config.pin_length
    }

    /// Message to show next to the keypad, e.g. after an incorrect PIN.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub async fn push_digit(&mut self, digit: char) -> DigitOutcome {
        if self.state != PinGateState::AwaitingInput
            || !digit.is_ascii_digit()
            || self.is_complete()
        {
            return DigitOutcome::Ignored;
        }

        self.digits.push(digit);
        if self.is_complete() && self.config.auto_submit {
            return DigitOutcome::Verified(self.verify_entry().await);
        }

        DigitOutcome::Collected {
            entered: self.digits.len(),
        }
    }

    pub fn pop_digit(&mut self) -> bool {
        if self.state != PinGateState::AwaitingInput {
            return false;
        }
        self.digits.pop().is_some()
    }

    pub fn clear(&mut self) {
        self.digits.clear();
    }

    /// Fresh gate for a new entry into the flow. Callbacks are kept.
    pub fn reset(&mut self) {
        self.digits.clear();
        self.attempts = 0;
        self.message = None;
        self.state = PinGateState::AwaitingInput;
    }

    /// Manual submit of the digits entered so far.
    pub async fn submit(&mut self) -> Result<PinAttemptOutcome, PinGateError> {
        if self.state != PinGateState::AwaitingInput {
            return Err(PinGateError::NotAwaitingInput { state: self.state });
        }
        if !self.is_complete() {
            return Err(PinGateError::Incomplete {
                entered: self.digits.len(),
                expected: self.config.pin_length,
            });
        }
        Ok(self.verify_entry().await)
    }

    /// Replace the current entry with `pin` and verify it.
    pub async fn enter_pin(&mut self, pin: &str) -> Result<PinAttemptOutcome, PinGateError> {
        if self.state != PinGateState::AwaitingInput {
            return Err(PinGateError::NotAwaitingInput { state: self.state });
        }
        if !pin.chars().all(|c| c.is_ascii_digit()) {
            return Err(PinGateError::InvalidInput);
        }
        if pin.len() != self.config.pin_length {
            return Err(PinGateError::Incomplete {
                entered: pin.len(),
                expected: self.config.pin_length,
            });
        }

        self.digits.clear();
        self.digits.push_str(pin);
        Ok(self.verify_entry().await)
    }

    async fn verify_entry(&mut self) -> PinAttemptOutcome {
        self.state = PinGateState::Verifying;
        let pin = std::mem::take(&mut self.digits);
        let result = self.verifier.verify(&pin).await;
        drop(pin);

        match result {
            Ok(true) => {
                self.state = PinGateState::Success;
                self.message = None;
                info!(attempts = self.attempts + 1, "PIN accepted");
                if let Some(callback) = self.on_success.as_mut() {
                    callback();
                }
                PinAttemptOutcome::Accepted
            }
            Ok(false) => {
                self.attempts += 1;
                if self.attempts >= self.config.max_attempts {
                    self.state = PinGateState::Exhausted;
                    self.message = Some("Too many incorrect attempts".to_string());
                    warn!(attempts = self.attempts, "PIN attempts exhausted");
                    self.fire_fatal(PinAttemptOutcome::Exhausted)
                } else {
                    let remaining = self.remaining_attempts();
                    self.state = PinGateState::AwaitingInput;
                    self.message = Some(format!(
                        "Incorrect PIN. {} attempt{} remaining",
                        remaining,
                        if remaining == 1 { "" } else { "s" }
                    ));
                    info!(attempts = self.attempts, remaining, "incorrect PIN");
                    PinAttemptOutcome::Incorrect { remaining }
                }
            }
            Err(err) => {
                self.state = PinGateState::Failed;
                self.message = Some("PIN could not be verified".to_string());
                warn!(error = %err, "PIN verifier failed");
                self.fire_fatal(PinAttemptOutcome::Fatal(err))
            }
        }
    }

    fn fire_fatal(&mut self, outcome: PinAttemptOutcome) -> PinAttemptOutcome {
        if let Some(callback) = self.on_fatal.as_mut() {
            callback(&outcome);
        }
        outcome
    }
}

impl fmt::Debug for PinGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinGate")
            .field("config", &self.config)
            .field("entered", &self.digits.len())
            .field("attempts", &self.attempts)
            .field("state", &self.state)
            .finish()
    }
}
