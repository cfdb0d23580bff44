//! Payout Dispatcher
//!
//! Executes the three outbound money flows:
//!
//! - **payouts**: winnings from the treasury to each winning bettor
//! - **refunds**: rejected deposits returned from the deposit address's own
//!   balance, minus the network fee reservation
//! - **collection**: sweeping confirmed deposit balances into the treasury
//!
//! Each flow is guarded by a single-flight flag so overlapping
//! admin-triggered invocations cannot double-spend. Failed transfers are
//! recorded with detail and require a manual re-trigger; money movement is
//! never auto-retried. Deposit secrets are decrypted at the moment of use
//! only and never persisted or logged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::events::{EngineEvent, EventPublisher, TransferKind};
use crate::keystore::{KeyStore, KeystoreError};
use crate::ledger::{LedgerError, LedgerGateway};
use crate::storage::{StorageError, WagerStore};
use crate::types::{DepositAddress, PayoutStatus, Refund};

/// Dispatch errors
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0} batch already running")]
    AlreadyRunning(&'static str),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("keystore error: {0}")]
    Keystore(#[from] KeystoreError),

    #[error("invalid treasury key: {0}")]
    InvalidTreasuryKey(String),

    #[error("deposit not found: {0}")]
    DepositMissing(String),

    #[error("balance {balance} cannot cover {needed} for deposit {deposit}")]
    InsufficientBalance {
        deposit: String,
        balance: u64,
        needed: u64,
    },
}

/// Result of one dispatch batch
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub processed: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl std::fmt::Display for DispatchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "processed: {}, completed: {}, failed: {}, skipped: {}",
            self.processed, self.completed, self.failed, self.skipped
        )
    }
}

/// Clears the in-flight flag when the batch ends, error or not
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Executes outbound settlement transfers
pub struct PayoutDispatcher {
    store: Arc<dyn WagerStore>,
    ledger: Arc<dyn LedgerGateway>,
    keystore: Arc<KeyStore>,
    events: EventPublisher,
    /// 64-byte treasury keypair secret
    treasury_secret: Vec<u8>,
    /// Treasury public address
    treasury_address: String,
    /// Lamports reserved per outbound transfer
    fee_reserve: u64,
    /// Optional sweep split: (secondary wallet, fraction)
    collect_split: Option<(String, f64)>,
    payouts_inflight: AtomicBool,
    refunds_inflight: AtomicBool,
    collect_inflight: AtomicBool,
}

impl PayoutDispatcher {
    pub fn new(
        store: Arc<dyn WagerStore>,
        ledger: Arc<dyn LedgerGateway>,
        keystore: Arc<KeyStore>,
        events: EventPublisher,
        treasury_key_hex: &str,
        fee_reserve: u64,
        collect_split: Option<(String, f64)>,
    ) -> Result<Self, DispatchError> {
        let treasury_secret = hex::decode(treasury_key_hex)
            .map_err(|e| DispatchError::InvalidTreasuryKey(e.to_string()))?;

        let keypair = solana_sdk::signature::Keypair::try_from(treasury_secret.as_slice())
            .map_err(|e| DispatchError::InvalidTreasuryKey(e.to_string()))?;
        let treasury_address = solana_sdk::signer::Signer::pubkey(&keypair).to_string();

        Ok(Self {
            store,
            ledger,
            keystore,
            events,
            treasury_secret,
            treasury_address,
            fee_reserve,
            collect_split,
            payouts_inflight: AtomicBool::new(false),
            refunds_inflight: AtomicBool::new(false),
            collect_inflight: AtomicBool::new(false),
        })
    }

    /// Treasury public address funds are paid from and swept into
    pub fn treasury_address(&self) -> &str {
        &self.treasury_address
    }

    /// Send every pending payout from the treasury.
    ///
    /// Failed payouts stay `failed` with detail and surface for manual
    /// re-trigger; they are not auto-retried.
    pub async fn process_payouts(&self) -> Result<DispatchReport, DispatchError> {
        let _guard = FlightGuard::acquire(&self.payouts_inflight)
            .ok_or(DispatchError::AlreadyRunning("payout"))?;

        let pending = self.store.payouts_by_status(PayoutStatus::Pending).await?;
        let mut report = DispatchReport::default();
        if pending.is_empty() {
            return Ok(report);
        }

        // Balance check up front. Proceeding while underfunded is allowed;
        // individual transfers fail with recorded detail instead of the
        // whole batch being blocked.
        let needed: u64 = pending.iter().map(|p| p.amount_lamports).sum();
        match self.ledger.get_balance(&self.treasury_address).await {
            Ok(balance) if balance < needed + self.fee_reserve * pending.len() as u64 => {
                tracing::warn!(
                    balance,
                    needed,
                    payouts = pending.len(),
                    "treasury balance may not cover this payout batch"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "treasury balance check failed, proceeding");
            }
        }

        for mut payout in pending {
            report.processed += 1;

            payout.mark_processing();
            self.store.update_payout(&payout).await?;

            match self
                .ledger
                .submit_transfer(
                    &self.treasury_secret,
                    &payout.recipient,
                    payout.amount_lamports,
                )
                .await
            {
                Ok(signature) => {
                    payout.mark_completed(signature.clone());
                    self.store.update_payout(&payout).await?;
                    self.mirror_bet_status(&payout.bet_id, PayoutStatus::Completed)
                        .await?;

                    tracing::info!(
                        payout_id = %payout.id,
                        recipient = %payout.recipient,
                        lamports = payout.amount_lamports,
                        signature = %signature,
                        "payout completed"
                    );
                    self.events.publish(EngineEvent::TransferCompleted {
                        id: payout.id.clone(),
                        kind: TransferKind::Payout,
                        tx_signature: signature,
                    });
                    report.completed += 1;
                }
                Err(e) => {
                    payout.mark_failed(e.to_string());
                    self.store.update_payout(&payout).await?;
                    self.mirror_bet_status(&payout.bet_id, PayoutStatus::Failed)
                        .await?;

                    tracing::warn!(
                        payout_id = %payout.id,
                        error = %e,
                        "payout failed, manual re-trigger required"
                    );
                    self.events.publish(EngineEvent::TransferFailed {
                        id: payout.id.clone(),
                        kind: TransferKind::Payout,
                        error: e.to_string(),
                    });
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Send every pending refund from its originating deposit address.
    pub async fn process_refunds(&self) -> Result<DispatchReport, DispatchError> {
        let _guard = FlightGuard::acquire(&self.refunds_inflight)
            .ok_or(DispatchError::AlreadyRunning("refund"))?;

        let pending = self.store.refunds_by_status(PayoutStatus::Pending).await?;
        let mut report = DispatchReport::default();

        for mut refund in pending {
            report.processed += 1;

            refund.mark_processing();
            self.store.update_refund(&refund).await?;

            match self.send_refund(&refund).await {
                Ok(signature) => {
                    refund.mark_completed(signature.clone());
                    self.store.update_refund(&refund).await?;

                    tracing::info!(
                        refund_id = %refund.id,
                        recipient = %refund.recipient,
                        signature = %signature,
                        "refund completed"
                    );
                    self.events.publish(EngineEvent::TransferCompleted {
                        id: refund.id.clone(),
                        kind: TransferKind::Refund,
                        tx_signature: signature,
                    });
                    report.completed += 1;
                }
                Err(e) => {
                    // A keystore or balance failure aborts this item only;
                    // the rest of the batch continues.
                    refund.mark_failed(e.to_string());
                    self.store.update_refund(&refund).await?;

                    tracing::warn!(refund_id = %refund.id, error = %e, "refund failed");
                    self.events.publish(EngineEvent::TransferFailed {
                        id: refund.id.clone(),
                        kind: TransferKind::Refund,
                        error: e.to_string(),
                    });
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Sweep every confirmed, not-yet-swept deposit into the treasury,
    /// optionally splitting a configured share to the secondary wallet.
    /// Addresses that cannot cover the fee reservation are skipped.
    pub async fn collect_deposits(&self) -> Result<DispatchReport, DispatchError> {
        let _guard = FlightGuard::acquire(&self.collect_inflight)
            .ok_or(DispatchError::AlreadyRunning("collection"))?;

        let confirmed = self
            .store
            .deposits_by_status(crate::types::DepositStatus::Confirmed)
            .await?;
        let mut report = DispatchReport::default();

        for deposit in confirmed {
            if deposit.swept_signature.is_some() {
                continue;
            }
            report.processed += 1;

            match self.sweep_deposit(&deposit).await {
                Ok(Some(signature)) => {
                    let mut deposit = deposit;
                    deposit.mark_swept(signature.clone());
                    self.store.update_deposit(&deposit).await?;

                    tracing::info!(
                        deposit_id = %deposit.id,
                        signature = %signature,
                        "deposit swept to treasury"
                    );
                    self.events.publish(EngineEvent::TransferCompleted {
                        id: deposit.id.clone(),
                        kind: TransferKind::Collection,
                        tx_signature: signature,
                    });
                    report.completed += 1;
                }
                Ok(None) => {
                    tracing::debug!(
                        deposit_id = %deposit.id,
                        "balance below fee reservation, skipped"
                    );
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(deposit_id = %deposit.id, error = %e, "sweep failed");
                    self.events.publish(EngineEvent::TransferFailed {
                        id: deposit.id.clone(),
                        kind: TransferKind::Collection,
                        error: e.to_string(),
                    });
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Refund from the deposit address's own balance: what was received,
    /// capped by what is actually there, minus the fee reservation.
    async fn send_refund(&self, refund: &Refund) -> Result<String, DispatchError> {
        let deposit = self
            .store
            .get_deposit(&refund.deposit_id)
            .await?
            .ok_or_else(|| DispatchError::DepositMissing(refund.deposit_id.clone()))?;

        let secret = self.keystore.decrypt(&deposit.secret_enc)?;

        let balance = self.ledger.get_balance(&deposit.address).await?;
        let available = balance.min(refund.amount_lamports);
        let send = available.saturating_sub(self.fee_reserve);
        if send == 0 {
            return Err(DispatchError::InsufficientBalance {
                deposit: deposit.id.clone(),
                balance,
                needed: self.fee_reserve + 1,
            });
        }

        let signature = self
            .ledger
            .submit_transfer(&secret, &refund.recipient, send)
            .await?;
        Ok(signature)
    }

    /// Sweep one deposit. Returns `None` when the balance cannot cover the
    /// fee reservation.
    async fn sweep_deposit(
        &self,
        deposit: &DepositAddress,
    ) -> Result<Option<String>, DispatchError> {
        let balance = self.ledger.get_balance(&deposit.address).await?;

        // Two transfers when splitting, one otherwise
        let fee_total = match &self.collect_split {
            Some(_) => self.fee_reserve * 2,
            None => self.fee_reserve,
        };
        if balance <= fee_total {
            return Ok(None);
        }
        let available = balance - fee_total;

        let secret = self.keystore.decrypt(&deposit.secret_enc)?;

        match &self.collect_split {
            Some((wallet, fraction)) => {
                let split_amount = (available as f64 * fraction).floor() as u64;
                let treasury_amount = available - split_amount;

                let signature = self
                    .ledger
                    .submit_transfer(&secret, &self.treasury_address, treasury_amount)
                    .await?;
                if split_amount > 0 {
                    self.ledger
                        .submit_transfer(&secret, wallet, split_amount)
                        .await?;
                }
                Ok(Some(signature))
            }
            None => {
                let signature = self
                    .ledger
                    .submit_transfer(&secret, &self.treasury_address, available)
                    .await?;
                Ok(Some(signature))
            }
        }
    }

    /// Keep the bet's payout status in sync with its payout record
    async fn mirror_bet_status(
        &self,
        bet_id: &str,
        status: PayoutStatus,
    ) -> Result<(), DispatchError> {
        if let Some(mut bet) = self.store.get_bet(bet_id).await? {
            bet.set_payout_status(status);
            self.store.update_bet(&bet).await?;
        }
        Ok(())
    }
}
