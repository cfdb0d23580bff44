//! Deposit Reconciliation
//!
//! Reconciles the external ledger against internal wager state:
//!
//! ```text
//! waiting -> { confirmed | rejected_too_small | rejected_over_max
//!            | rejected_race_closed | expired }
//! ```
//!
//! ## Components
//!
//! - **signatures**: bounded set of already-consumed transfer signatures
//! - **state_machine**: pure transition rules for a deposit given a
//!   classified transfer or an expiry tick
//! - **service**: the polling loop that drives every waiting deposit

pub mod service;
pub mod signatures;
pub mod state_machine;

pub use service::{CycleReport, DepositReconciler, ReconcilerConfig, ReconcilerError};
pub use signatures::ProcessedSignatureSet;
pub use state_machine::{evaluate_transfer, should_expire, StateMachineError, Verdict, WagerLimits};
