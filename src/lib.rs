//! Trackside - Pari-Mutuel Wagering Backend
//!
//! Server-side engine for pari-mutuel race wagering funded by native SOL
//! transfers to single-use deposit addresses.
//!
//! ## Core Services
//!
//! 1. **Address Allocator** - Mints a fresh keypair per wager, secret encrypted at rest
//! 2. **Deposit Reconciler** - Polls the ledger, classifies inbound transfers,
//!    drives each deposit to a terminal state and books bets
//! 3. **Settlement** - Computes pari-mutuel odds and payouts at race close
//! 4. **Payout Dispatcher** - Sends winnings, refunds rejected deposits, and
//!    sweeps confirmed deposits into the treasury
//!
//! ## Flow
//!
//! Client requests a wager -> allocator mints address+keypair, persists it
//! "waiting" -> reconciler polls it -> on a valid transfer the deposit state
//! machine moves it to "confirmed" and a bet is booked -> at race close
//! settlement computes winnings -> dispatcher sends funds.

pub mod allocator;
pub mod api;
pub mod classifier;
pub mod common;
pub mod config;
pub mod events;
pub mod keystore;
pub mod ledger;
pub mod logging;
pub mod payout;
pub mod reconciler;
pub mod service;
pub mod settlement;
pub mod storage;
pub mod types;

// Re-exports: configuration
pub use config::{ConfigError, EngineConfig, Network};

// Re-exports: root error type
pub use common::error::{EngineError, Result};

// Re-exports: keystore
pub use keystore::{KeyStore, KeystoreError};

// Re-exports: ledger gateway
pub use ledger::{LedgerError, LedgerGateway, RawTransaction, RpcLedgerGateway};

// Re-exports: reconciler
pub use reconciler::{
    CycleReport, DepositReconciler, ProcessedSignatureSet, ReconcilerError,
};

// Re-exports: settlement
pub use settlement::{compute_settlement, SettlementError, SettlementSheet};

// Re-exports: payout dispatcher
pub use payout::{DispatchError, DispatchReport, PayoutDispatcher};

// Re-exports: engine facade
pub use service::WagerEngine;

// Re-exports: domain types
pub use types::{
    Bet, DepositAddress, DepositStatus, Payout, PayoutStatus, Race, RaceStatus, Refund, Runner,
};

/// Lamport conversion helpers
pub mod units {
    pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

    /// Convert SOL to lamports with proper rounding
    pub fn sol_to_lamports(sol: f64) -> u64 {
        (sol * LAMPORTS_PER_SOL as f64).round() as u64
    }

    pub fn lamports_to_sol(lamports: u64) -> f64 {
        lamports as f64 / LAMPORTS_PER_SOL as f64
    }

    pub fn format_lamports(lamports: u64) -> String {
        format!("{} lamports ({:.9} SOL)", lamports, lamports_to_sol(lamports))
    }
}
