//! Storage Trait Definitions
//!
//! Defines abstract storage interfaces for races, deposits, bets, payouts
//! and refunds. Implementations can use SQLite (production) or in-memory
//! (testing).

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Bet, DepositAddress, DepositStatus, Payout, PayoutStatus, Race, Refund};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("connection error: {0}")]
    Connection(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Race storage interface
#[async_trait]
pub trait RaceStore: Send + Sync {
    /// Insert a new race
    async fn insert_race(&self, race: &Race) -> StorageResult<()>;

    /// Update an existing race (status, winner, runner pools)
    async fn update_race(&self, race: &Race) -> StorageResult<()>;

    /// Get a race by ID
    async fn get_race(&self, id: &str) -> StorageResult<Option<Race>>;

    /// Get all races
    async fn all_races(&self) -> StorageResult<Vec<Race>>;
}

/// Deposit address storage interface
#[async_trait]
pub trait DepositStore: Send + Sync {
    /// Insert a new deposit address record
    async fn insert_deposit(&self, record: &DepositAddress) -> StorageResult<()>;

    /// Update an existing deposit address record
    async fn update_deposit(&self, record: &DepositAddress) -> StorageResult<()>;

    /// Get a deposit by ID
    async fn get_deposit(&self, id: &str) -> StorageResult<Option<DepositAddress>>;

    /// Get a deposit by receiving address
    async fn get_deposit_by_address(&self, address: &str)
        -> StorageResult<Option<DepositAddress>>;

    /// Get all deposits with a specific status
    async fn deposits_by_status(&self, status: DepositStatus)
        -> StorageResult<Vec<DepositAddress>>;
}

/// Bet storage interface
#[async_trait]
pub trait BetStore: Send + Sync {
    /// Insert a new bet
    async fn insert_bet(&self, bet: &Bet) -> StorageResult<()>;

    /// Update an existing bet (settlement, payout status)
    async fn update_bet(&self, bet: &Bet) -> StorageResult<()>;

    /// Get a bet by ID
    async fn get_bet(&self, id: &str) -> StorageResult<Option<Bet>>;

    /// Get the bet booked for a deposit, if any (1:1)
    async fn bet_for_deposit(&self, deposit_id: &str) -> StorageResult<Option<Bet>>;

    /// Get all bets on a race
    async fn bets_for_race(&self, race_id: &str) -> StorageResult<Vec<Bet>>;
}

/// Payout storage interface
#[async_trait]
pub trait PayoutStore: Send + Sync {
    /// Insert a new payout
    async fn insert_payout(&self, payout: &Payout) -> StorageResult<()>;

    /// Update an existing payout
    async fn update_payout(&self, payout: &Payout) -> StorageResult<()>;

    /// Get a payout by ID
    async fn get_payout(&self, id: &str) -> StorageResult<Option<Payout>>;

    /// Get all payouts with a specific status
    async fn payouts_by_status(&self, status: PayoutStatus) -> StorageResult<Vec<Payout>>;
}

/// Refund storage interface
#[async_trait]
pub trait RefundStore: Send + Sync {
    /// Insert a new refund
    async fn insert_refund(&self, refund: &Refund) -> StorageResult<()>;

    /// Update an existing refund
    async fn update_refund(&self, refund: &Refund) -> StorageResult<()>;

    /// Get a refund by ID
    async fn get_refund(&self, id: &str) -> StorageResult<Option<Refund>>;

    /// Get all refunds with a specific status
    async fn refunds_by_status(&self, status: PayoutStatus) -> StorageResult<Vec<Refund>>;
}

/// Key-value configuration storage interface
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Idempotently upsert a configuration value
    async fn upsert_config(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Get a configuration value
    async fn get_config(&self, key: &str) -> StorageResult<Option<String>>;
}

/// Everything the engine needs from persistence, as one object-safe bundle
pub trait WagerStore:
    RaceStore + DepositStore + BetStore + PayoutStore + RefundStore + ConfigStore
{
}

impl<T> WagerStore for T where
    T: RaceStore + DepositStore + BetStore + PayoutStore + RefundStore + ConfigStore
{
}
