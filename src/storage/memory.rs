//! In-Memory Storage Implementation
//!
//! Thread-safe in-memory store for testing and development. Data is lost
//! when the process exits.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::{
    BetStore, ConfigStore, DepositStore, PayoutStore, RaceStore, RefundStore, StorageError,
    StorageResult,
};
use crate::types::{Bet, DepositAddress, DepositStatus, Payout, PayoutStatus, Race, Refund};

/// In-memory implementation of every store trait
#[derive(Clone, Default)]
pub struct MemoryStore {
    races: Arc<RwLock<HashMap<String, Race>>>,
    deposits: Arc<RwLock<HashMap<String, DepositAddress>>>,
    /// Index: receiving address -> deposit ID
    deposits_by_address: Arc<RwLock<HashMap<String, String>>>,
    bets: Arc<RwLock<HashMap<String, Bet>>>,
    payouts: Arc<RwLock<HashMap<String, Payout>>>,
    refunds: Arc<RwLock<HashMap<String, Refund>>>,
    config: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RaceStore for MemoryStore {
    async fn insert_race(&self, race: &Race) -> StorageResult<()> {
        let mut races = self.races.write().await;
        if races.contains_key(&race.id) {
            return Err(StorageError::Duplicate(race.id.clone()));
        }
        races.insert(race.id.clone(), race.clone());
        Ok(())
    }

    async fn update_race(&self, race: &Race) -> StorageResult<()> {
        let mut races = self.races.write().await;
        if !races.contains_key(&race.id) {
            return Err(StorageError::NotFound(race.id.clone()));
        }
        races.insert(race.id.clone(), race.clone());
        Ok(())
    }

    async fn get_race(&self, id: &str) -> StorageResult<Option<Race>> {
        Ok(self.races.read().await.get(id).cloned())
    }

    async fn all_races(&self) -> StorageResult<Vec<Race>> {
        Ok(self.races.read().await.values().cloned().collect())
    }
}

#[async_trait]
impl DepositStore for MemoryStore {
    async fn insert_deposit(&self, record: &DepositAddress) -> StorageResult<()> {
        let mut deposits = self.deposits.write().await;
        let mut by_address = self.deposits_by_address.write().await;

        if deposits.contains_key(&record.id) {
            return Err(StorageError::Duplicate(format!("id: {}", record.id)));
        }
        if by_address.contains_key(&record.address) {
            return Err(StorageError::Duplicate(format!(
                "address: {}",
                record.address
            )));
        }

        by_address.insert(record.address.clone(), record.id.clone());
        deposits.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update_deposit(&self, record: &DepositAddress) -> StorageResult<()> {
        let mut deposits = self.deposits.write().await;
        if !deposits.contains_key(&record.id) {
            return Err(StorageError::NotFound(record.id.clone()));
        }
        deposits.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_deposit(&self, id: &str) -> StorageResult<Option<DepositAddress>> {
        Ok(self.deposits.read().await.get(id).cloned())
    }

    async fn get_deposit_by_address(
        &self,
        address: &str,
    ) -> StorageResult<Option<DepositAddress>> {
        let id = match self.deposits_by_address.read().await.get(address) {
            Some(id) => id.clone(),
            None => return Ok(None),
        };
        Ok(self.deposits.read().await.get(&id).cloned())
    }

    async fn deposits_by_status(
        &self,
        status: DepositStatus,
    ) -> StorageResult<Vec<DepositAddress>> {
        Ok(self
            .deposits
            .read()
            .await
            .values()
            .filter(|d| d.status == status)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BetStore for MemoryStore {
    async fn insert_bet(&self, bet: &Bet) -> StorageResult<()> {
        let mut bets = self.bets.write().await;
        if bets.contains_key(&bet.id) {
            return Err(StorageError::Duplicate(bet.id.clone()));
        }
        // One bet per deposit address
        if bets.values().any(|b| b.deposit_id == bet.deposit_id) {
            return Err(StorageError::Duplicate(format!(
                "deposit: {}",
                bet.deposit_id
            )));
        }
        bets.insert(bet.id.clone(), bet.clone());
        Ok(())
    }

    async fn update_bet(&self, bet: &Bet) -> StorageResult<()> {
        let mut bets = self.bets.write().await;
        if !bets.contains_key(&bet.id) {
            return Err(StorageError::NotFound(bet.id.clone()));
        }
        bets.insert(bet.id.clone(), bet.clone());
        Ok(())
    }

    async fn get_bet(&self, id: &str) -> StorageResult<Option<Bet>> {
        Ok(self.bets.read().await.get(id).cloned())
    }

    async fn bet_for_deposit(&self, deposit_id: &str) -> StorageResult<Option<Bet>> {
        Ok(self
            .bets
            .read()
            .await
            .values()
            .find(|b| b.deposit_id == deposit_id)
            .cloned())
    }

    async fn bets_for_race(&self, race_id: &str) -> StorageResult<Vec<Bet>> {
        Ok(self
            .bets
            .read()
            .await
            .values()
            .filter(|b| b.race_id == race_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PayoutStore for MemoryStore {
    async fn insert_payout(&self, payout: &Payout) -> StorageResult<()> {
        let mut payouts = self.payouts.write().await;
        if payouts.contains_key(&payout.id) {
            return Err(StorageError::Duplicate(payout.id.clone()));
        }
        payouts.insert(payout.id.clone(), payout.clone());
        Ok(())
    }

    async fn update_payout(&self, payout: &Payout) -> StorageResult<()> {
        let mut payouts = self.payouts.write().await;
        if !payouts.contains_key(&payout.id) {
            return Err(StorageError::NotFound(payout.id.clone()));
        }
        payouts.insert(payout.id.clone(), payout.clone());
        Ok(())
    }

    async fn get_payout(&self, id: &str) -> StorageResult<Option<Payout>> {
        Ok(self.payouts.read().await.get(id).cloned())
    }

    async fn payouts_by_status(&self, status: PayoutStatus) -> StorageResult<Vec<Payout>> {
        Ok(self
            .payouts
            .read()
            .await
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RefundStore for MemoryStore {
    async fn insert_refund(&self, refund: &Refund) -> StorageResult<()> {
        let mut refunds = self.refunds.write().await;
        if refunds.contains_key(&refund.id) {
            return Err(StorageError::Duplicate(refund.id.clone()));
        }
        refunds.insert(refund.id.clone(), refund.clone());
        Ok(())
    }

    async fn update_refund(&self, refund: &Refund) -> StorageResult<()> {
        let mut refunds = self.refunds.write().await;
        if !refunds.contains_key(&refund.id) {
            return Err(StorageError::NotFound(refund.id.clone()));
        }
        refunds.insert(refund.id.clone(), refund.clone());
        Ok(())
    }

    async fn get_refund(&self, id: &str) -> StorageResult<Option<Refund>> {
        Ok(self.refunds.read().await.get(id).cloned())
    }

    async fn refunds_by_status(&self, status: PayoutStatus) -> StorageResult<Vec<Refund>> {
        Ok(self
            .refunds
            .read()
            .await
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn upsert_config(&self, key: &str, value: &str) -> StorageResult<()> {
        self.config
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_config(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.config.read().await.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::now_ts;

    fn test_deposit(id_suffix: &str) -> DepositAddress {
        let mut record = DepositAddress::new(
            format!("addr_{}", id_suffix),
            "envelope".to_string(),
            "race_1".to_string(),
            1,
            None,
            now_ts() + 1800,
        );
        record.id = format!("dep_{}", id_suffix);
        record
    }

    #[tokio::test]
    async fn test_deposit_insert_and_lookup() {
        let store = MemoryStore::new();
        let record = test_deposit("1");

        store.insert_deposit(&record).await.unwrap();

        let by_id = store.get_deposit("dep_1").await.unwrap().unwrap();
        assert_eq!(by_id.address, "addr_1");

        let by_addr = store.get_deposit_by_address("addr_1").await.unwrap().unwrap();
        assert_eq!(by_addr.id, "dep_1");
    }

    #[tokio::test]
    async fn test_duplicate_address_rejected() {
        let store = MemoryStore::new();
        let record1 = test_deposit("1");
        let mut record2 = test_deposit("2");
        record2.address = "addr_1".to_string();

        store.insert_deposit(&record1).await.unwrap();
        let result = store.insert_deposit(&record2).await;
        assert!(matches!(result, Err(StorageError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_deposits_by_status() {
        let store = MemoryStore::new();
        let waiting = test_deposit("1");
        let mut confirmed = test_deposit("2");
        confirmed.mark_confirmed(5_000, "sig".to_string());

        store.insert_deposit(&waiting).await.unwrap();
        store.insert_deposit(&confirmed).await.unwrap();

        let found = store
            .deposits_by_status(DepositStatus::Waiting)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "dep_1");
    }

    #[tokio::test]
    async fn test_one_bet_per_deposit() {
        let store = MemoryStore::new();
        let bet1 = Bet::new(
            "race_1".to_string(),
            1,
            "dep_1".to_string(),
            "sender".to_string(),
            10_000,
            "sig1".to_string(),
            1.5,
        );
        let bet2 = Bet::new(
            "race_1".to_string(),
            2,
            "dep_1".to_string(),
            "sender".to_string(),
            20_000,
            "sig2".to_string(),
            2.0,
        );

        store.insert_bet(&bet1).await.unwrap();
        let result = store.insert_bet(&bet2).await;
        assert!(matches!(result, Err(StorageError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_config_upsert_is_idempotent() {
        let store = MemoryStore::new();
        store.upsert_config("house_edge", "0.05").await.unwrap();
        store.upsert_config("house_edge", "0.05").await.unwrap();
        store.upsert_config("house_edge", "0.10").await.unwrap();

        assert_eq!(
            store.get_config("house_edge").await.unwrap().as_deref(),
            Some("0.10")
        );
    }

    #[tokio::test]
    async fn test_update_missing_record_fails() {
        let store = MemoryStore::new();
        let record = test_deposit("1");
        let result = store.update_deposit(&record).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }
}
