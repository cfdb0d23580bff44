//! Deposit Reconciler Service
//!
//! Polls every waiting deposit address on a fixed interval, classifies
//! inbound transfers and drives the deposit state machine. One valid
//! transfer per address wins; later transfers to the same single-use address
//! are never converted into a second bet.
//!
//! # Cycle
//! 1. Skip entirely if the previous cycle is still running
//! 2. Check each live waiting address: balance, recent history,
//!    classification, state machine
//! 3. Sweep expired waiting addresses: one final balance check honors a late
//!    transfer; only truly empty addresses are marked expired
//!
//! A ledger failure for one address never aborts the cycle for the others.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::interval;

use super::signatures::ProcessedSignatureSet;
use super::state_machine::{evaluate_transfer, should_expire, StateMachineError, Verdict, WagerLimits};
use crate::classifier::{classify_transfer, ClassifiedTransfer};
use crate::config::EngineConfig;
use crate::events::{EngineEvent, EventPublisher};
use crate::ledger::{LedgerError, LedgerGateway};
use crate::storage::{StorageError, WagerStore};
use crate::types::{now_ts, Bet, DepositAddress, DepositStatus, Refund};

/// Reconciler errors
#[derive(Debug, thiserror::Error)]
pub enum ReconcilerError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("state machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    #[error("race not found: {0}")]
    RaceNotFound(String),
}

/// Reconciler tuning
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Poll interval in seconds
    pub poll_interval_secs: u64,
    /// Minimum accepted wager in lamports
    pub min_bet_lamports: u64,
    /// Maximum accepted wager in lamports
    pub max_bet_lamports: u64,
    /// Transaction history window per address
    pub history_limit: usize,
    /// Capacity of the processed-signature set
    pub signature_capacity: usize,
}

impl ReconcilerConfig {
    pub fn from_engine(config: &EngineConfig) -> Self {
        Self {
            poll_interval_secs: config.poll_interval_secs,
            min_bet_lamports: config.min_bet_lamports,
            max_bet_lamports: config.max_bet_lamports,
            ..Self::default()
        }
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            min_bet_lamports: 10_000_000,
            max_bet_lamports: 20_000_000_000,
            history_limit: 5,
            signature_capacity: 4096,
        }
    }
}

/// Result of a single reconcile cycle
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Cycle was skipped because the previous one was still running
    pub skipped: bool,
    pub checked: usize,
    pub confirmed: usize,
    pub rejected: usize,
    pub expired: usize,
    pub errors: usize,
}

impl CycleReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn has_activity(&self) -> bool {
        self.confirmed > 0 || self.rejected > 0 || self.expired > 0 || self.errors > 0
    }

    fn tally(&mut self, status: DepositStatus) {
        match status {
            DepositStatus::Confirmed => self.confirmed += 1,
            DepositStatus::Expired => self.expired += 1,
            _ => self.rejected += 1,
        }
    }
}

impl std::fmt::Display for CycleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "checked: {}, confirmed: {}, rejected: {}, expired: {}, errors: {}",
            self.checked, self.confirmed, self.rejected, self.expired, self.errors
        )
    }
}

/// Outcome of checking a single address
enum CheckOutcome {
    /// Nothing has arrived
    Empty,
    /// Funds present but no classifiable, unconsumed transfer yet
    NoValidTransfer,
    /// The state machine moved the deposit to a terminal status
    Applied(DepositStatus),
}

/// The deposit reconciler service
pub struct DepositReconciler {
    config: ReconcilerConfig,
    store: Arc<dyn WagerStore>,
    ledger: Arc<dyn LedgerGateway>,
    events: EventPublisher,
    /// Running flag; cleared by `stop()` between cycles
    running: Arc<RwLock<bool>>,
    /// Holds the signature set; also serves as the cycle overlap guard
    cycle: Mutex<ProcessedSignatureSet>,
}

impl DepositReconciler {
    pub fn new(
        config: ReconcilerConfig,
        store: Arc<dyn WagerStore>,
        ledger: Arc<dyn LedgerGateway>,
        events: EventPublisher,
    ) -> Self {
        let signatures = ProcessedSignatureSet::with_capacity(config.signature_capacity);
        Self {
            config,
            store,
            ledger,
            events,
            running: Arc::new(RwLock::new(false)),
            cycle: Mutex::new(signatures),
        }
    }

    /// Rebuild the processed-signature set from terminal deposit records so
    /// a restart cannot reprocess an already-consumed transfer.
    pub async fn preload_signatures(&self) -> Result<usize, ReconcilerError> {
        let mut seen = self.cycle.lock().await;
        let mut loaded = 0;

        for status in [
            DepositStatus::Confirmed,
            DepositStatus::RejectedTooSmall,
            DepositStatus::RejectedOverMax,
            DepositStatus::RejectedRaceClosed,
        ] {
            for deposit in self.store.deposits_by_status(status).await? {
                if let Some(signature) = &deposit.observed_signature {
                    if seen.insert(signature) {
                        loaded += 1;
                    }
                }
            }
        }

        tracing::info!(loaded, "preloaded processed signatures");
        Ok(loaded)
    }

    /// Run the reconciler until `stop()` is called. The in-flight cycle
    /// always finishes before the loop exits.
    pub async fn run(&self) {
        {
            let mut running = self.running.write().await;
            *running = true;
        }

        tracing::info!(
            poll_interval_secs = self.config.poll_interval_secs,
            history_limit = self.config.history_limit,
            "deposit reconciler started"
        );

        let mut poll = interval(Duration::from_secs(self.config.poll_interval_secs));

        loop {
            poll.tick().await;

            if !*self.running.read().await {
                break;
            }

            match self.run_cycle(now_ts()).await {
                Ok(report) if report.skipped => {
                    tracing::debug!("previous cycle still running, skipped");
                }
                Ok(report) if report.has_activity() => {
                    tracing::info!(%report, "reconcile cycle");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "reconcile cycle failed");
                }
            }
        }

        tracing::info!("deposit reconciler stopped");
    }

    /// Request the run loop to stop after the in-flight cycle
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }

    /// Run a single reconcile cycle at the given wall-clock time.
    ///
    /// Public so tests and operators can drive the reconciler without timers.
    pub async fn run_cycle(&self, now: i64) -> Result<CycleReport, ReconcilerError> {
        // Overlap guard: if a prior cycle still holds the lock, skip
        let mut seen = match self.cycle.try_lock() {
            Ok(guard) => guard,
            Err(_) => return Ok(CycleReport::skipped()),
        };

        let mut report = CycleReport::default();
        let waiting = self.store.deposits_by_status(DepositStatus::Waiting).await?;

        let (expired, live): (Vec<_>, Vec<_>) =
            waiting.into_iter().partition(|d| d.is_expired(now));

        for deposit in &live {
            report.checked += 1;
            match self.check_deposit(&mut seen, deposit).await {
                Ok(CheckOutcome::Applied(status)) => report.tally(status),
                Ok(_) => {}
                Err(e) => {
                    // One broken address must not stall the rest; it stays
                    // waiting and is retried next cycle.
                    tracing::warn!(
                        deposit_id = %deposit.id,
                        address = %deposit.address,
                        error = %e,
                        "deposit check failed"
                    );
                    report.errors += 1;
                }
            }
        }

        // Expiry sweep: one last look before declaring an address dead. A
        // transfer that landed at or after the deadline is still honored.
        for deposit in &expired {
            report.checked += 1;
            match self.check_deposit(&mut seen, deposit).await {
                Ok(CheckOutcome::Applied(status)) => report.tally(status),
                Ok(CheckOutcome::Empty) => {
                    if should_expire(deposit, now, 0) {
                        let mut deposit = deposit.clone();
                        deposit.mark_expired();
                        self.store.update_deposit(&deposit).await?;
                        self.events.publish(EngineEvent::DepositExpired {
                            deposit_id: deposit.id.clone(),
                        });
                        tracing::info!(deposit_id = %deposit.id, "deposit expired");
                        report.tally(DepositStatus::Expired);
                    }
                }
                Ok(CheckOutcome::NoValidTransfer) => {
                    // Funded but nothing classifiable yet; leave it waiting
                    tracing::debug!(
                        deposit_id = %deposit.id,
                        "expired address holds funds but no classifiable transfer"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        deposit_id = %deposit.id,
                        error = %e,
                        "expiry check failed"
                    );
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    /// Check one address: balance, recent history, classification. The first
    /// valid unconsumed transfer wins and ends the scan for this cycle.
    async fn check_deposit(
        &self,
        seen: &mut ProcessedSignatureSet,
        deposit: &DepositAddress,
    ) -> Result<CheckOutcome, ReconcilerError> {
        let balance = self.ledger.get_balance(&deposit.address).await?;
        if balance == 0 {
            return Ok(CheckOutcome::Empty);
        }

        let signatures = self
            .ledger
            .get_recent_signatures(&deposit.address, self.config.history_limit)
            .await?;

        for signature in signatures {
            if seen.contains(&signature) {
                continue;
            }

            let Some(raw) = self.ledger.get_transaction(&signature).await? else {
                continue;
            };

            let Some(transfer) = classify_transfer(&raw, &deposit.address) else {
                continue;
            };

            let status = self.apply_transfer(seen, deposit, &transfer).await?;
            return Ok(CheckOutcome::Applied(status));
        }

        Ok(CheckOutcome::NoValidTransfer)
    }

    /// Drive the state machine for a classified transfer and persist the
    /// outcome: a booked bet on confirmation, a queued refund on rejection.
    async fn apply_transfer(
        &self,
        seen: &mut ProcessedSignatureSet,
        deposit: &DepositAddress,
        transfer: &ClassifiedTransfer,
    ) -> Result<DepositStatus, ReconcilerError> {
        let race = self
            .store
            .get_race(&deposit.race_id)
            .await?
            .ok_or_else(|| ReconcilerError::RaceNotFound(deposit.race_id.clone()))?;

        let limits = WagerLimits {
            min_lamports: self.config.min_bet_lamports,
            max_lamports: self.config.max_bet_lamports,
        };

        let verdict = evaluate_transfer(deposit, transfer.lamports, &race, &limits)?;
        let mut deposit = deposit.clone();

        let status = match verdict {
            Verdict::Confirmed { odds_at_placement } => {
                let bet = Bet::new(
                    race.id.clone(),
                    deposit.runner_number,
                    deposit.id.clone(),
                    transfer.sender.clone(),
                    transfer.lamports,
                    transfer.signature.clone(),
                    odds_at_placement,
                );

                // The bet's unique signature constraint is the durable
                // backstop behind the in-memory dedup set.
                self.store.insert_bet(&bet).await?;

                let mut race = race;
                race.add_to_pool(deposit.runner_number, transfer.lamports);
                self.store.update_race(&race).await?;

                deposit.mark_confirmed(transfer.lamports, transfer.signature.clone());
                self.store.update_deposit(&deposit).await?;

                tracing::info!(
                    deposit_id = %deposit.id,
                    bet_id = %bet.id,
                    race_id = %race.id,
                    runner = deposit.runner_number,
                    lamports = transfer.lamports,
                    odds = odds_at_placement,
                    "bet placed"
                );

                self.events.publish(EngineEvent::BetPlaced {
                    race_id: race.id.clone(),
                    bet_id: bet.id.clone(),
                    runner_number: deposit.runner_number,
                    amount_lamports: transfer.lamports,
                    odds: odds_at_placement,
                });

                DepositStatus::Confirmed
            }
            Verdict::Rejected { status } => {
                let refund = Refund::new(
                    deposit.id.clone(),
                    transfer.sender.clone(),
                    transfer.lamports,
                );
                self.store.insert_refund(&refund).await?;

                deposit.mark_rejected(status, transfer.lamports, transfer.signature.clone());
                self.store.update_deposit(&deposit).await?;

                tracing::info!(
                    deposit_id = %deposit.id,
                    refund_id = %refund.id,
                    status = %status,
                    lamports = transfer.lamports,
                    "deposit rejected, refund queued"
                );

                self.events.publish(EngineEvent::DepositRejected {
                    deposit_id: deposit.id.clone(),
                    refund_id: refund.id.clone(),
                    status: status.to_string(),
                    amount_lamports: transfer.lamports,
                });

                status
            }
        };

        seen.insert(&transfer.signature);
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::engine_event_channel;
    use crate::ledger::{MockLedgerGateway, RawTransaction};
    use crate::storage::MemoryStore;
    use crate::storage::{BetStore, DepositStore, PayoutStore, RaceStore, RefundStore};
    use crate::types::{Race, RaceStatus};
    use crate::units::sol_to_lamports;

    const SENDER: &str = "SenderAddr1111111111111111111111111111111111";

    fn funding_tx(signature: &str, target: &str, lamports: u64) -> RawTransaction {
        RawTransaction {
            signature: signature.to_string(),
            account_keys: vec![SENDER.to_string(), target.to_string()],
            pre_balances: vec![lamports + 5_000, 0],
            post_balances: vec![0, lamports],
            succeeded: true,
        }
    }

    async fn seed_race(store: &MemoryStore, open: bool) -> Race {
        let mut race = Race::new(
            "Maiden Stakes".to_string(),
            vec!["Comet".to_string(), "Meteor".to_string()],
            now_ts() + 3600,
        );
        if open {
            race.advance_status(RaceStatus::Open);
        }
        store.insert_race(&race).await.unwrap();
        race
    }

    async fn seed_deposit(store: &MemoryStore, race_id: &str, runner: u8, address: &str) -> DepositAddress {
        let deposit = DepositAddress::new(
            address.to_string(),
            "envelope".to_string(),
            race_id.to_string(),
            runner,
            None,
            now_ts() + 1800,
        );
        store.insert_deposit(&deposit).await.unwrap();
        deposit
    }

    fn reconciler(
        store: Arc<MemoryStore>,
        ledger: MockLedgerGateway,
    ) -> (DepositReconciler, crate::events::EngineEventReceiver) {
        let (events, rx) = engine_event_channel();
        let service = DepositReconciler::new(
            ReconcilerConfig::default(),
            store,
            Arc::new(ledger),
            events,
        );
        (service, rx)
    }

    #[tokio::test]
    async fn test_valid_transfer_books_bet() {
        let store = Arc::new(MemoryStore::new());
        let race = seed_race(&store, true).await;
        let deposit = seed_deposit(&store, &race.id, 1, "dep_addr_1").await;

        let stake = sol_to_lamports(1.0);
        let mut ledger = MockLedgerGateway::new();
        ledger.expect_get_balance().returning(move |_| Ok(stake));
        ledger
            .expect_get_recent_signatures()
            .returning(|_, _| Ok(vec!["sig_fund".to_string()]));
        ledger
            .expect_get_transaction()
            .returning(move |sig| Ok(Some(funding_tx(sig, "dep_addr_1", stake))));

        let (service, mut rx) = reconciler(store.clone(), ledger);
        let report = service.run_cycle(now_ts()).await.unwrap();

        assert_eq!(report.confirmed, 1);
        assert_eq!(report.rejected, 0);

        let stored = store.get_deposit(&deposit.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DepositStatus::Confirmed);
        assert_eq!(stored.observed_lamports, Some(stake));

        let bet = store.bet_for_deposit(&deposit.id).await.unwrap().unwrap();
        assert_eq!(bet.amount_lamports, stake);
        assert_eq!(bet.bettor, SENDER);
        // First money in: odds are exactly 1.0
        assert!((bet.odds_at_placement - 1.0).abs() < 1e-9);

        let race = store.get_race(&race.id).await.unwrap().unwrap();
        assert_eq!(race.runner(1).unwrap().pool_lamports, stake);

        assert!(matches!(
            rx.try_recv().unwrap(),
            EngineEvent::BetPlaced { .. }
        ));
    }

    #[tokio::test]
    async fn test_below_minimum_queues_refund_no_bet() {
        let store = Arc::new(MemoryStore::new());
        let race = seed_race(&store, true).await;
        let deposit = seed_deposit(&store, &race.id, 1, "dep_addr_1").await;

        // 0.005 SOL, below the 0.01 SOL minimum
        let stake = sol_to_lamports(0.005);
        let mut ledger = MockLedgerGateway::new();
        ledger.expect_get_balance().returning(move |_| Ok(stake));
        ledger
            .expect_get_recent_signatures()
            .returning(|_, _| Ok(vec!["sig_small".to_string()]));
        ledger
            .expect_get_transaction()
            .returning(move |sig| Ok(Some(funding_tx(sig, "dep_addr_1", stake))));

        let (service, _rx) = reconciler(store.clone(), ledger);
        let report = service.run_cycle(now_ts()).await.unwrap();
        assert_eq!(report.rejected, 1);

        let stored = store.get_deposit(&deposit.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DepositStatus::RejectedTooSmall);

        assert!(store.bet_for_deposit(&deposit.id).await.unwrap().is_none());

        let refunds = store
            .refunds_by_status(crate::types::PayoutStatus::Pending)
            .await
            .unwrap();
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].amount_lamports, stake);
        assert_eq!(refunds[0].recipient, SENDER);
    }

    #[tokio::test]
    async fn test_over_maximum_queues_refund() {
        let store = Arc::new(MemoryStore::new());
        let race = seed_race(&store, true).await;
        let deposit = seed_deposit(&store, &race.id, 2, "dep_addr_1").await;

        let stake = sol_to_lamports(25.0);
        let mut ledger = MockLedgerGateway::new();
        ledger.expect_get_balance().returning(move |_| Ok(stake));
        ledger
            .expect_get_recent_signatures()
            .returning(|_, _| Ok(vec!["sig_big".to_string()]));
        ledger
            .expect_get_transaction()
            .returning(move |sig| Ok(Some(funding_tx(sig, "dep_addr_1", stake))));

        let (service, _rx) = reconciler(store.clone(), ledger);
        service.run_cycle(now_ts()).await.unwrap();

        let stored = store.get_deposit(&deposit.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DepositStatus::RejectedOverMax);

        let refunds = store
            .refunds_by_status(crate::types::PayoutStatus::Pending)
            .await
            .unwrap();
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].amount_lamports, stake);
    }

    #[tokio::test]
    async fn test_replayed_signature_never_double_booked() {
        let store = Arc::new(MemoryStore::new());
        let race = seed_race(&store, true).await;

        // An earlier run already consumed sig_fund for a confirmed deposit
        let mut consumed = seed_deposit(&store, &race.id, 1, "old_addr").await;
        consumed.mark_confirmed(sol_to_lamports(1.0), "sig_fund".to_string());
        store.update_deposit(&consumed).await.unwrap();

        let fresh = seed_deposit(&store, &race.id, 1, "dep_addr_1").await;

        let stake = sol_to_lamports(1.0);
        let mut ledger = MockLedgerGateway::new();
        ledger.expect_get_balance().returning(move |_| Ok(stake));
        ledger
            .expect_get_recent_signatures()
            .returning(|_, _| Ok(vec!["sig_fund".to_string()]));
        ledger
            .expect_get_transaction()
            .returning(move |sig| Ok(Some(funding_tx(sig, "dep_addr_1", stake))));

        let (service, _rx) = reconciler(store.clone(), ledger);
        service.preload_signatures().await.unwrap();

        let report = service.run_cycle(now_ts()).await.unwrap();
        assert_eq!(report.confirmed, 0);
        assert_eq!(report.rejected, 0);

        // The replayed signature produced neither a bet nor a refund
        assert!(store.bet_for_deposit(&fresh.id).await.unwrap().is_none());
        let refunds = store
            .refunds_by_status(crate::types::PayoutStatus::Pending)
            .await
            .unwrap();
        assert!(refunds.is_empty());
    }

    #[tokio::test]
    async fn test_empty_expired_address_expires() {
        let store = Arc::new(MemoryStore::new());
        let race = seed_race(&store, true).await;
        let mut deposit = seed_deposit(&store, &race.id, 1, "dep_addr_1").await;
        deposit.expires_at = now_ts() - 60;
        store.update_deposit(&deposit).await.unwrap();

        let mut ledger = MockLedgerGateway::new();
        ledger.expect_get_balance().returning(|_| Ok(0));

        let (service, mut rx) = reconciler(store.clone(), ledger);
        let report = service.run_cycle(now_ts()).await.unwrap();
        assert_eq!(report.expired, 1);

        let stored = store.get_deposit(&deposit.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DepositStatus::Expired);

        // No bet, no refund
        assert!(store.bet_for_deposit(&deposit.id).await.unwrap().is_none());
        assert!(store
            .refunds_by_status(crate::types::PayoutStatus::Pending)
            .await
            .unwrap()
            .is_empty());

        assert!(matches!(
            rx.try_recv().unwrap(),
            EngineEvent::DepositExpired { .. }
        ));
    }

    #[tokio::test]
    async fn test_late_transfer_at_expiry_still_honored() {
        let store = Arc::new(MemoryStore::new());
        let race = seed_race(&store, true).await;
        let mut deposit = seed_deposit(&store, &race.id, 1, "dep_addr_1").await;
        deposit.expires_at = now_ts() - 60;
        store.update_deposit(&deposit).await.unwrap();

        let stake = sol_to_lamports(2.0);
        let mut ledger = MockLedgerGateway::new();
        ledger.expect_get_balance().returning(move |_| Ok(stake));
        ledger
            .expect_get_recent_signatures()
            .returning(|_, _| Ok(vec!["sig_late".to_string()]));
        ledger
            .expect_get_transaction()
            .returning(move |sig| Ok(Some(funding_tx(sig, "dep_addr_1", stake))));

        let (service, _rx) = reconciler(store.clone(), ledger);
        let report = service.run_cycle(now_ts()).await.unwrap();

        assert_eq!(report.confirmed, 1);
        assert_eq!(report.expired, 0);

        let stored = store.get_deposit(&deposit.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DepositStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_ledger_error_isolated_per_address() {
        let store = Arc::new(MemoryStore::new());
        let race = seed_race(&store, true).await;
        let broken = seed_deposit(&store, &race.id, 1, "broken_addr").await;
        let _healthy = seed_deposit(&store, &race.id, 2, "healthy_addr").await;

        let stake = sol_to_lamports(1.0);
        let mut ledger = MockLedgerGateway::new();
        ledger.expect_get_balance().returning(move |addr| {
            if addr == "broken_addr" {
                Err(LedgerError::Rpc("rpc timeout".to_string()))
            } else {
                Ok(stake)
            }
        });
        ledger
            .expect_get_recent_signatures()
            .returning(|_, _| Ok(vec!["sig_ok".to_string()]));
        ledger
            .expect_get_transaction()
            .returning(move |sig| Ok(Some(funding_tx(sig, "healthy_addr", stake))));

        let (service, _rx) = reconciler(store.clone(), ledger);
        let report = service.run_cycle(now_ts()).await.unwrap();

        // The broken address is logged, the healthy one is confirmed
        assert_eq!(report.errors, 1);
        assert_eq!(report.confirmed, 1);

        // The broken address stays waiting for the next cycle
        let stored = store.get_deposit(&broken.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DepositStatus::Waiting);
    }

    #[tokio::test]
    async fn test_first_valid_transfer_wins() {
        let store = Arc::new(MemoryStore::new());
        let race = seed_race(&store, true).await;
        let deposit = seed_deposit(&store, &race.id, 1, "dep_addr_1").await;

        let stake = sol_to_lamports(1.0);
        let mut ledger = MockLedgerGateway::new();
        ledger
            .expect_get_balance()
            .returning(move |_| Ok(stake * 2));
        // Two transfers landed; history is reported newest first
        ledger
            .expect_get_recent_signatures()
            .returning(|_, _| Ok(vec!["sig_second".to_string(), "sig_first".to_string()]));
        ledger
            .expect_get_transaction()
            .returning(move |sig| Ok(Some(funding_tx(sig, "dep_addr_1", stake))));

        let (service, _rx) = reconciler(store.clone(), ledger);
        service.run_cycle(now_ts()).await.unwrap();

        // Exactly one bet booked, from the first transfer in reported order
        let bet = store.bet_for_deposit(&deposit.id).await.unwrap().unwrap();
        assert_eq!(bet.signature, "sig_second");

        // The second cycle finds the deposit terminal and books nothing new
        let report = service.run_cycle(now_ts()).await.unwrap();
        assert_eq!(report.confirmed, 0);
        let bets = store.bets_for_race(&race.id).await.unwrap();
        assert_eq!(bets.len(), 1);
    }

    #[tokio::test]
    async fn test_confirmed_status_is_write_once() {
        let store = Arc::new(MemoryStore::new());
        let race = seed_race(&store, true).await;
        let deposit = seed_deposit(&store, &race.id, 1, "dep_addr_1").await;

        let stake = sol_to_lamports(1.0);
        let mut ledger = MockLedgerGateway::new();
        ledger.expect_get_balance().returning(move |_| Ok(stake));
        ledger
            .expect_get_recent_signatures()
            .returning(|_, _| Ok(vec!["sig_a".to_string()]));
        ledger
            .expect_get_transaction()
            .returning(move |sig| Ok(Some(funding_tx(sig, "dep_addr_1", stake))));

        let (service, _rx) = reconciler(store.clone(), ledger);
        for _ in 0..3 {
            service.run_cycle(now_ts()).await.unwrap();
        }

        let stored = store.get_deposit(&deposit.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DepositStatus::Confirmed);
        assert_eq!(store.bets_for_race(&race.id).await.unwrap().len(), 1);
    }
}
