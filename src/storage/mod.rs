//! Storage Layer
//!
//! Abstract store interfaces plus two implementations: SQLite (production)
//! and in-memory (testing).

pub mod memory;
pub mod sqlite;
pub mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{
    BetStore, ConfigStore, DepositStore, PayoutStore, RaceStore, RefundStore, StorageError,
    StorageResult, WagerStore,
};
