//! Wager Engine Facade
//!
//! Wires the allocator, settlement and dispatcher over shared storage and
//! exposes the operations the request layer consumes. Every operation
//! returns a structured `Result`; nothing panics across this boundary.

use std::sync::Arc;

use crate::allocator::AddressAllocator;
use crate::common::error::{EngineError, Result};
use crate::config::EngineConfig;
use crate::events::{EngineEvent, EngineEventReceiver, EventPublisher};
use crate::keystore::KeyStore;
use crate::ledger::LedgerGateway;
use crate::payout::{DispatchReport, PayoutDispatcher};
use crate::settlement::{compute_settlement, SettlementError, SettlementSheet};
use crate::storage::WagerStore;
use crate::types::{now_ts, Bet, DepositAddress, Payout, Race, RaceStatus};

/// The engine facade exposed to the request layer
pub struct WagerEngine {
    config: EngineConfig,
    store: Arc<dyn WagerStore>,
    allocator: AddressAllocator,
    dispatcher: PayoutDispatcher,
    events: EventPublisher,
}

impl WagerEngine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn WagerStore>,
        ledger: Arc<dyn LedgerGateway>,
        keystore: Arc<KeyStore>,
        events: EventPublisher,
    ) -> Result<Self> {
        let allocator = AddressAllocator::new(
            store.clone(),
            keystore.clone(),
            config.deposit_expiry_mins,
        );

        let dispatcher = PayoutDispatcher::new(
            store.clone(),
            ledger,
            keystore,
            events.clone(),
            &config.treasury_key_hex,
            config.fee_reserve_lamports,
            config.collect_split.clone(),
        )?;

        Ok(Self {
            config,
            store,
            allocator,
            dispatcher,
            events,
        })
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> EngineEventReceiver {
        self.events.subscribe()
    }

    /// Treasury address payouts are funded from
    pub fn treasury_address(&self) -> &str {
        self.dispatcher.treasury_address()
    }

    // ========================================================================
    // Race lifecycle (admin)
    // ========================================================================

    /// Create a race in `pending`
    pub async fn create_race(
        &self,
        title: String,
        runner_names: Vec<String>,
        scheduled_start: i64,
    ) -> Result<Race> {
        if title.trim().is_empty() {
            return Err(EngineError::validation("race title must not be empty"));
        }
        if runner_names.len() < 2 {
            return Err(EngineError::validation(
                "a race needs at least two runners",
            ));
        }
        if scheduled_start <= now_ts() {
            return Err(EngineError::validation(
                "scheduled start must be in the future",
            ));
        }

        let race = Race::new(title, runner_names, scheduled_start);
        self.store.insert_race(&race).await?;
        tracing::info!(race_id = %race.id, runners = race.runners.len(), "race created");
        Ok(race)
    }

    /// Open a race for wagers
    pub async fn open_race(&self, race_id: &str) -> Result<Race> {
        self.transition_race(race_id, RaceStatus::Open).await
    }

    /// Close wagering on a race
    pub async fn close_race(&self, race_id: &str) -> Result<Race> {
        self.transition_race(race_id, RaceStatus::Closed).await
    }

    async fn transition_race(&self, race_id: &str, next: RaceStatus) -> Result<Race> {
        let mut race = self
            .store
            .get_race(race_id)
            .await?
            .ok_or_else(|| EngineError::validation(format!("race not found: {}", race_id)))?;

        if !race.advance_status(next) {
            return Err(EngineError::validation(format!(
                "race {} cannot move from {} to {}",
                race_id, race.status, next
            )));
        }

        self.store.update_race(&race).await?;
        tracing::info!(race_id = %race.id, status = %race.status, "race status advanced");
        Ok(race)
    }

    /// Get a race with its pools
    pub async fn get_race(&self, race_id: &str) -> Result<Option<Race>> {
        Ok(self.store.get_race(race_id).await?)
    }

    /// List all races
    pub async fn list_races(&self) -> Result<Vec<Race>> {
        Ok(self.store.all_races().await?)
    }

    // ========================================================================
    // Wagering
    // ========================================================================

    /// Allocate a single-use deposit address for a wager
    pub async fn allocate(
        &self,
        race_id: &str,
        runner_number: u8,
        claimed_by: Option<String>,
    ) -> Result<DepositAddress> {
        Ok(self
            .allocator
            .allocate(race_id, runner_number, claimed_by)
            .await?)
    }

    /// Get a deposit address and the bet booked against it, if any
    pub async fn deposit_status(
        &self,
        deposit_id: &str,
    ) -> Result<Option<(DepositAddress, Option<Bet>)>> {
        let Some(deposit) = self.store.get_deposit(deposit_id).await? else {
            return Ok(None);
        };
        let bet = self.store.bet_for_deposit(deposit_id).await?;
        Ok(Some((deposit, bet)))
    }

    // ========================================================================
    // Settlement
    // ========================================================================

    /// Settle a race: compute pari-mutuel winnings, create one payout per
    /// winning bet and mark the race completed. One-time and irreversible;
    /// every validation happens before any state mutation.
    pub async fn settle(&self, race_id: &str, winner: u8) -> Result<SettlementSheet> {
        let mut race = self
            .store
            .get_race(race_id)
            .await?
            .ok_or_else(|| SettlementError::RaceNotFound(race_id.to_string()))?;

        if race.status == RaceStatus::Completed {
            return Err(SettlementError::AlreadySettled(race.id).into());
        }
        if race.status == RaceStatus::Pending {
            return Err(SettlementError::NotSettleable {
                race_id: race.id,
                status: race.status,
            }
            .into());
        }
        if !race.has_runner(winner) {
            return Err(SettlementError::InvalidWinner {
                race_id: race.id,
                winner,
            }
            .into());
        }

        let bets = self.store.bets_for_race(&race.id).await?;
        let sheet = compute_settlement(&race.id, &bets, winner, self.config.house_edge);

        for bet in bets {
            let mut bet = bet;
            let entry = sheet.entries.iter().find(|e| e.bet_id == bet.id);

            match entry {
                Some(entry) => {
                    bet.settle(entry.winnings_lamports, true);
                    self.store.update_bet(&bet).await?;

                    let payout = Payout::new(
                        bet.id.clone(),
                        entry.recipient.clone(),
                        entry.total_payout_lamports,
                    );
                    self.store.insert_payout(&payout).await?;
                }
                None => {
                    // Stake is forfeit; nothing is owed
                    bet.settle(0, false);
                    self.store.update_bet(&bet).await?;
                }
            }
        }

        race.complete(winner);
        self.store.update_race(&race).await?;

        tracing::info!(
            race_id = %race.id,
            winner,
            total_pool = sheet.total_pool_lamports,
            distributable = sheet.distributable_lamports,
            payouts = sheet.entries.len(),
            "race settled"
        );

        self.events.publish(EngineEvent::RaceSettled {
            race_id: race.id.clone(),
            winner,
            total_pool_lamports: sheet.total_pool_lamports,
            distributable_lamports: sheet.distributable_lamports,
            payouts: sheet.entries.len(),
        });

        Ok(sheet)
    }

    // ========================================================================
    // Outbound flows (admin)
    // ========================================================================

    /// Send every pending payout from the treasury
    pub async fn process_payouts(&self) -> Result<DispatchReport> {
        Ok(self.dispatcher.process_payouts().await?)
    }

    /// Send every pending refund from its deposit address
    pub async fn process_refunds(&self) -> Result<DispatchReport> {
        Ok(self.dispatcher.process_refunds().await?)
    }

    /// Sweep confirmed deposits into the treasury
    pub async fn collect_deposits(&self) -> Result<DispatchReport> {
        Ok(self.dispatcher.collect_deposits().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use crate::events::engine_event_channel;
    use crate::ledger::MockLedgerGateway;
    use crate::storage::MemoryStore;
    use crate::storage::{BetStore, DepositStore, PayoutStore, RaceStore, RefundStore};
    use crate::types::PayoutStatus;
    use crate::units::sol_to_lamports;

    fn test_config() -> EngineConfig {
        EngineConfig {
            network: Network::Devnet,
            rpc_url: "http://localhost:8899".to_string(),
            min_bet_lamports: sol_to_lamports(0.01),
            max_bet_lamports: sol_to_lamports(20.0),
            house_edge: 0.05,
            deposit_expiry_mins: 30,
            poll_interval_secs: 5,
            keystore_passphrase: None,
            treasury_key_hex: hex::encode(solana_sdk::signature::Keypair::new().to_bytes()),
            fee_reserve_lamports: 5_000,
            collect_split: None,
            db_path: ":memory:".to_string(),
            api_port: 0,
            log_level: "info".to_string(),
            log_json: false,
        }
    }

    fn engine(store: Arc<MemoryStore>) -> WagerEngine {
        let (events, _rx) = engine_event_channel();
        WagerEngine::new(
            test_config(),
            store,
            Arc::new(MockLedgerGateway::new()),
            Arc::new(KeyStore::new(None)),
            events,
        )
        .unwrap()
    }

    async fn open_race_with_bets(
        store: &Arc<MemoryStore>,
        engine: &WagerEngine,
        stakes: &[(u8, f64)],
    ) -> Race {
        let race = engine
            .create_race(
                "Test Stakes".to_string(),
                vec!["Comet".to_string(), "Meteor".to_string()],
                now_ts() + 3600,
            )
            .await
            .unwrap();
        let mut race = engine.open_race(&race.id).await.unwrap();

        for (i, (runner, sol)) in stakes.iter().enumerate() {
            let stake = sol_to_lamports(*sol);
            let bet = Bet::new(
                race.id.clone(),
                *runner,
                format!("dep_{}", i),
                format!("bettor_{}", i),
                stake,
                format!("sig_{}", i),
                1.0,
            );
            store.insert_bet(&bet).await.unwrap();
            race.add_to_pool(*runner, stake);
        }
        store.update_race(&race).await.unwrap();
        race
    }

    #[tokio::test]
    async fn test_settle_two_bet_race() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());

        // 10 SOL on runner 1, 5 SOL on runner 2; runner 1 wins at 5% edge
        let race = open_race_with_bets(&store, &engine, &[(1, 10.0), (2, 5.0)]).await;
        let sheet = engine.settle(&race.id, 1).await.unwrap();

        assert_eq!(sheet.distributable_lamports, sol_to_lamports(4.75));
        assert_eq!(sheet.entries.len(), 1);
        assert_eq!(
            sheet.entries[0].total_payout_lamports,
            sol_to_lamports(14.75)
        );

        // Exactly one payout record for the single winner
        let payouts = store
            .payouts_by_status(PayoutStatus::Pending)
            .await
            .unwrap();
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].amount_lamports, sol_to_lamports(14.75));
        assert_eq!(payouts[0].recipient, "bettor_0");

        // Race is completed with the declared winner
        let race = engine.get_race(&race.id).await.unwrap().unwrap();
        assert_eq!(race.status, RaceStatus::Completed);
        assert_eq!(race.winner, Some(1));

        // Winner settled with winnings, loser forfeits
        let bets = store.bets_for_race(&race.id).await.unwrap();
        let winner = bets.iter().find(|b| b.runner_number == 1).unwrap();
        let loser = bets.iter().find(|b| b.runner_number == 2).unwrap();
        assert_eq!(winner.winnings_lamports, Some(sol_to_lamports(4.75)));
        assert_eq!(winner.payout_status, Some(PayoutStatus::Pending));
        assert_eq!(loser.winnings_lamports, Some(0));
        assert!(loser.payout_status.is_none());
    }

    #[tokio::test]
    async fn test_settle_refuses_second_run() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());

        let race = open_race_with_bets(&store, &engine, &[(1, 1.0), (2, 1.0)]).await;
        engine.settle(&race.id, 1).await.unwrap();

        let result = engine.settle(&race.id, 1).await;
        assert!(matches!(
            result,
            Err(EngineError::Settlement(SettlementError::AlreadySettled(_)))
        ));

        // Still exactly one payout
        let payouts = store
            .payouts_by_status(PayoutStatus::Pending)
            .await
            .unwrap();
        assert_eq!(payouts.len(), 1);
    }

    #[tokio::test]
    async fn test_settle_rejects_out_of_range_winner_before_mutation() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());

        let race = open_race_with_bets(&store, &engine, &[(1, 1.0)]).await;
        let result = engine.settle(&race.id, 9).await;
        assert!(matches!(
            result,
            Err(EngineError::Settlement(SettlementError::InvalidWinner { .. }))
        ));

        // Nothing was mutated
        let race = engine.get_race(&race.id).await.unwrap().unwrap();
        assert_eq!(race.status, RaceStatus::Open);
        assert!(race.winner.is_none());
        let bets = store.bets_for_race(&race.id).await.unwrap();
        assert!(bets[0].winnings_lamports.is_none());
    }

    #[tokio::test]
    async fn test_settle_with_empty_winning_pool() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());

        // Everybody backed runner 1; runner 2 wins
        let race = open_race_with_bets(&store, &engine, &[(1, 3.0), (1, 2.0)]).await;
        let sheet = engine.settle(&race.id, 2).await.unwrap();

        assert!(sheet.entries.is_empty());
        let payouts = store
            .payouts_by_status(PayoutStatus::Pending)
            .await
            .unwrap();
        assert!(payouts.is_empty());

        // The race still completed exactly once
        let race = engine.get_race(&race.id).await.unwrap().unwrap();
        assert_eq!(race.status, RaceStatus::Completed);
        assert!(matches!(
            engine.settle(&race.id, 2).await,
            Err(EngineError::Settlement(SettlementError::AlreadySettled(_)))
        ));
    }

    #[tokio::test]
    async fn test_settle_payout_sum_invariant() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());

        let race = open_race_with_bets(
            &store,
            &engine,
            &[(1, 2.5), (1, 7.5), (2, 4.0), (2, 2.0)],
        )
        .await;
        let sheet = engine.settle(&race.id, 1).await.unwrap();

        let payout_sum: u64 = sheet.entries.iter().map(|e| e.total_payout_lamports).sum();
        let expected = sheet.winning_pool_lamports + sheet.distributable_lamports;

        assert!(payout_sum <= sheet.total_pool_lamports);
        assert!(expected - payout_sum <= sheet.entries.len() as u64);
    }

    #[tokio::test]
    async fn test_create_race_validations() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store);

        let result = engine
            .create_race("".to_string(), vec!["A".into(), "B".into()], now_ts() + 10)
            .await;
        assert!(matches!(result, Err(EngineError::Validation(_))));

        let result = engine
            .create_race("One Horse".to_string(), vec!["A".into()], now_ts() + 10)
            .await;
        assert!(matches!(result, Err(EngineError::Validation(_))));

        let result = engine
            .create_race(
                "Past Race".to_string(),
                vec!["A".into(), "B".into()],
                now_ts() - 10,
            )
            .await;
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }
}
