//! Deposit Address Allocator
//!
//! Mints a fresh keypair per wager request. The address is never reused, and
//! the secret is encrypted through the keystore before anything is
//! persisted; an encryption failure aborts the allocation so a plaintext
//! secret can only ever be stored when the keystore is explicitly disabled.

use std::sync::Arc;
use thiserror::Error;

use crate::keystore::{KeyStore, KeystoreError};
use crate::ledger::generate_keypair;
use crate::storage::{StorageError, WagerStore};
use crate::types::{now_ts, DepositAddress, RaceStatus};

/// Allocation errors
#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("race not found: {0}")]
    RaceNotFound(String),

    #[error("race {race_id} is not open for wagers: {status}")]
    RaceNotOpen { race_id: String, status: RaceStatus },

    #[error("race {0} has already reached its scheduled start")]
    RaceStarted(String),

    #[error("race {race_id} has no runner {number}")]
    UnknownRunner { race_id: String, number: u8 },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("keystore error: {0}")]
    Keystore(#[from] KeystoreError),
}

/// Allocates single-use deposit addresses
pub struct AddressAllocator {
    store: Arc<dyn WagerStore>,
    keystore: Arc<KeyStore>,
    /// Deposit address lifetime in minutes
    expiry_mins: i64,
}

impl AddressAllocator {
    pub fn new(store: Arc<dyn WagerStore>, keystore: Arc<KeyStore>, expiry_mins: i64) -> Self {
        Self {
            store,
            keystore,
            expiry_mins,
        }
    }

    /// Allocate a fresh deposit address for a wager on `runner_number`.
    ///
    /// Preconditions: the race exists, is open, has not reached its
    /// scheduled start, and the runner number is within its field.
    pub async fn allocate(
        &self,
        race_id: &str,
        runner_number: u8,
        claimed_by: Option<String>,
    ) -> Result<DepositAddress, AllocationError> {
        let race = self
            .store
            .get_race(race_id)
            .await?
            .ok_or_else(|| AllocationError::RaceNotFound(race_id.to_string()))?;

        if !race.is_open() {
            return Err(AllocationError::RaceNotOpen {
                race_id: race.id,
                status: race.status,
            });
        }

        let now = now_ts();
        if now >= race.scheduled_start {
            return Err(AllocationError::RaceStarted(race.id));
        }

        if !race.has_runner(runner_number) {
            return Err(AllocationError::UnknownRunner {
                race_id: race.id,
                number: runner_number,
            });
        }

        let keypair = generate_keypair();
        let address = solana_sdk::signer::Signer::pubkey(&keypair).to_string();
        let secret_enc = self.keystore.encrypt(&keypair.to_bytes())?;

        let record = DepositAddress::new(
            address,
            secret_enc,
            race.id.clone(),
            runner_number,
            claimed_by,
            now + self.expiry_mins * 60,
        );
        self.store.insert_deposit(&record).await?;

        tracing::info!(
            deposit_id = %record.id,
            race_id = %race.id,
            runner = runner_number,
            address = %record.address,
            expires_at = record.expires_at,
            "deposit address allocated"
        );

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::storage::{BetStore, DepositStore, PayoutStore, RaceStore, RefundStore};
    use crate::types::Race;

    async fn seed_open_race(store: &MemoryStore) -> Race {
        let mut race = Race::new(
            "Maiden Stakes".to_string(),
            vec!["Comet".to_string(), "Meteor".to_string()],
            now_ts() + 3600,
        );
        race.advance_status(RaceStatus::Open);
        store.insert_race(&race).await.unwrap();
        race
    }

    fn allocator(store: Arc<MemoryStore>) -> AddressAllocator {
        AddressAllocator::new(store, Arc::new(KeyStore::new(None)), 30)
    }

    #[tokio::test]
    async fn test_allocates_fresh_addresses() {
        let store = Arc::new(MemoryStore::new());
        let race = seed_open_race(&store).await;
        let allocator = allocator(store.clone());

        let first = allocator.allocate(&race.id, 1, None).await.unwrap();
        let second = allocator
            .allocate(&race.id, 1, Some("alice".to_string()))
            .await
            .unwrap();

        // Fresh keypair per call, never reused
        assert_ne!(first.address, second.address);
        assert_ne!(first.id, second.id);
        assert_eq!(second.claimed_by.as_deref(), Some("alice"));

        let stored = store.get_deposit(&first.id).await.unwrap().unwrap();
        assert_eq!(stored.status, crate::types::DepositStatus::Waiting);
        assert!(stored.expires_at > now_ts());
    }

    #[tokio::test]
    async fn test_rejects_race_not_open() {
        let store = Arc::new(MemoryStore::new());
        let race = Race::new(
            "Pending Stakes".to_string(),
            vec!["Comet".to_string()],
            now_ts() + 3600,
        );
        store.insert_race(&race).await.unwrap();

        let result = allocator(store).allocate(&race.id, 1, None).await;
        assert!(matches!(result, Err(AllocationError::RaceNotOpen { .. })));
    }

    #[tokio::test]
    async fn test_rejects_after_scheduled_start() {
        let store = Arc::new(MemoryStore::new());
        let mut race = Race::new(
            "Gone Stakes".to_string(),
            vec!["Comet".to_string()],
            now_ts() - 10,
        );
        race.advance_status(RaceStatus::Open);
        store.insert_race(&race).await.unwrap();

        let result = allocator(store).allocate(&race.id, 1, None).await;
        assert!(matches!(result, Err(AllocationError::RaceStarted(_))));
    }

    #[tokio::test]
    async fn test_rejects_unknown_runner() {
        let store = Arc::new(MemoryStore::new());
        let race = seed_open_race(&store).await;

        let result = allocator(store).allocate(&race.id, 7, None).await;
        assert!(matches!(result, Err(AllocationError::UnknownRunner { .. })));
    }

    #[tokio::test]
    async fn test_rejects_missing_race() {
        let store = Arc::new(MemoryStore::new());
        let result = allocator(store).allocate("race_missing", 1, None).await;
        assert!(matches!(result, Err(AllocationError::RaceNotFound(_))));
    }
}
