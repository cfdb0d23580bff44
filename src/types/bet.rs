//! Bet, Payout and Refund Records
//!
//! A bet is created exactly once per confirmed deposit address. Payouts are
//! created by settlement and refunds by the reconciler; both are mutated only
//! by the payout dispatcher.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::now_ts;

/// Status of an outbound payout or refund
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    /// Queued, not yet attempted
    Pending,
    /// Transfer in flight
    Processing,
    /// Transfer confirmed on the ledger
    Completed,
    /// Transfer failed; requires manual re-trigger
    Failed,
}

impl std::fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for PayoutStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown payout status: {}", other)),
        }
    }
}

/// A booked wager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    /// Unique bet ID
    pub id: String,
    /// Race this bet belongs to
    pub race_id: String,
    /// Backed runner number
    pub runner_number: u8,
    /// Originating deposit address (1:1)
    pub deposit_id: String,
    /// Sender identified from the funding transfer
    pub bettor: String,
    /// Stake in lamports
    pub amount_lamports: u64,
    /// Funding transfer signature
    pub signature: String,
    /// Odds quoted at placement, including the bettor's own stake
    pub odds_at_placement: f64,
    /// Winnings computed at settlement; `None` until the race settles
    pub winnings_lamports: Option<u64>,
    /// Payout progress; `None` for losing bets (nothing to pay)
    pub payout_status: Option<PayoutStatus>,
    /// Timestamp when the bet was booked
    pub created_at: i64,
    /// Timestamp of last update
    pub updated_at: i64,
}

impl Bet {
    /// Book a new bet from a confirmed deposit
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        race_id: String,
        runner_number: u8,
        deposit_id: String,
        bettor: String,
        amount_lamports: u64,
        signature: String,
        odds_at_placement: f64,
    ) -> Self {
        let now = now_ts();
        Self {
            id: Uuid::new_v4().to_string(),
            race_id,
            runner_number,
            deposit_id,
            bettor,
            amount_lamports,
            signature,
            odds_at_placement,
            winnings_lamports: None,
            payout_status: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record settlement: winners get a pending payout, losers get zero
    pub fn settle(&mut self, winnings_lamports: u64, won: bool) {
        self.winnings_lamports = Some(winnings_lamports);
        self.payout_status = won.then_some(PayoutStatus::Pending);
        self.touch();
    }

    /// Update the payout status (mirrors the payout record)
    pub fn set_payout_status(&mut self, status: PayoutStatus) {
        self.payout_status = Some(status);
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = now_ts();
    }
}

/// A winnings payout owed to a bettor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    /// Unique payout ID
    pub id: String,
    /// Bet being paid
    pub bet_id: String,
    /// Recipient address
    pub recipient: String,
    /// Stake + winnings in lamports
    pub amount_lamports: u64,
    /// Current status
    pub status: PayoutStatus,
    /// Outbound transfer signature once completed
    pub tx_signature: Option<String>,
    /// Error detail when failed
    pub error: Option<String>,
    /// Timestamp when the payout was created
    pub created_at: i64,
    /// Timestamp of last update
    pub updated_at: i64,
}

impl Payout {
    /// Create a pending payout for a winning bet
    pub fn new(bet_id: String, recipient: String, amount_lamports: u64) -> Self {
        let now = now_ts();
        Self {
            id: Uuid::new_v4().to_string(),
            bet_id,
            recipient,
            amount_lamports,
            status: PayoutStatus::Pending,
            tx_signature: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_processing(&mut self) {
        self.status = PayoutStatus::Processing;
        self.touch();
    }

    pub fn mark_completed(&mut self, tx_signature: String) {
        self.tx_signature = Some(tx_signature);
        self.status = PayoutStatus::Completed;
        self.touch();
    }

    pub fn mark_failed(&mut self, error: String) {
        self.error = Some(error);
        self.status = PayoutStatus::Failed;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = now_ts();
    }
}

/// A refund owed for a rejected deposit, paid from the deposit address itself
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    /// Unique refund ID
    pub id: String,
    /// Originating deposit address
    pub deposit_id: String,
    /// Recipient address (the identified sender)
    pub recipient: String,
    /// Amount received, before the network fee reservation
    pub amount_lamports: u64,
    /// Current status
    pub status: PayoutStatus,
    /// Outbound transfer signature once completed
    pub tx_signature: Option<String>,
    /// Error detail when failed
    pub error: Option<String>,
    /// Timestamp when the refund was queued
    pub created_at: i64,
    /// Timestamp of last update
    pub updated_at: i64,
}

impl Refund {
    /// Queue a refund for a rejected deposit
    pub fn new(deposit_id: String, recipient: String, amount_lamports: u64) -> Self {
        let now = now_ts();
        Self {
            id: Uuid::new_v4().to_string(),
            deposit_id,
            recipient,
            amount_lamports,
            status: PayoutStatus::Pending,
            tx_signature: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_processing(&mut self) {
        self.status = PayoutStatus::Processing;
        self.touch();
    }

    pub fn mark_completed(&mut self, tx_signature: String) {
        self.tx_signature = Some(tx_signature);
        self.status = PayoutStatus::Completed;
        self.touch();
    }

    pub fn mark_failed(&mut self, error: String) {
        self.error = Some(error);
        self.status = PayoutStatus::Failed;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = now_ts();
    }
}
