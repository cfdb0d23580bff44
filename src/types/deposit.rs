//! Deposit Address Records
//!
//! A deposit address is minted once per wager request and never reused.
//! Lifecycle: `waiting` until the reconciler observes a transfer or the
//! address expires; every other status is terminal and written exactly once.

use serde::{Deserialize, Serialize};

use super::now_ts;

/// Status of a single-use deposit address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    /// Waiting for a transfer to arrive
    Waiting,
    /// Valid transfer observed, bet booked
    Confirmed,
    /// Transfer below the configured minimum; refund queued
    RejectedTooSmall,
    /// Transfer above the configured maximum; refund queued
    RejectedOverMax,
    /// Transfer arrived after the race stopped accepting wagers; refund queued
    RejectedRaceClosed,
    /// Expired with no transfer ever observed
    Expired,
}

impl DepositStatus {
    /// Everything except `waiting` is terminal
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Waiting)
    }
}

impl std::fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::RejectedTooSmall => write!(f, "rejected_too_small"),
            Self::RejectedOverMax => write!(f, "rejected_over_max"),
            Self::RejectedRaceClosed => write!(f, "rejected_race_closed"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

impl std::str::FromStr for DepositStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "confirmed" => Ok(Self::Confirmed),
            "rejected_too_small" => Ok(Self::RejectedTooSmall),
            "rejected_over_max" => Ok(Self::RejectedOverMax),
            "rejected_race_closed" => Ok(Self::RejectedRaceClosed),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown deposit status: {}", other)),
        }
    }
}

/// A single-use deposit address record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositAddress {
    /// Unique deposit ID
    pub id: String,
    /// Base58 receiving address
    pub address: String,
    /// Keystore envelope holding the address secret
    pub secret_enc: String,
    /// Race this wager belongs to
    pub race_id: String,
    /// Chosen runner number
    pub runner_number: u8,
    /// Optional identity claimed by the requester
    pub claimed_by: Option<String>,
    /// Current status
    pub status: DepositStatus,
    /// Amount credited by the observed transfer
    pub observed_lamports: Option<u64>,
    /// Signature of the observed transfer
    pub observed_signature: Option<String>,
    /// Signature of the collection sweep, once swept to the treasury
    pub swept_signature: Option<String>,
    /// Deadline for a transfer to arrive (unix seconds)
    pub expires_at: i64,
    /// Timestamp when the address was allocated
    pub created_at: i64,
    /// Timestamp of last update
    pub updated_at: i64,
}

impl DepositAddress {
    /// Create a new deposit address in `waiting`
    pub fn new(
        address: String,
        secret_enc: String,
        race_id: String,
        runner_number: u8,
        claimed_by: Option<String>,
        expires_at: i64,
    ) -> Self {
        let now = now_ts();
        let id = format!("dep_{}_{:08x}", now, rand::random::<u32>());

        Self {
            id,
            address,
            secret_enc,
            race_id,
            runner_number,
            claimed_by,
            status: DepositStatus::Waiting,
            observed_lamports: None,
            observed_signature: None,
            swept_signature: None,
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the deposit window has passed at `now`
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Record the observed transfer and confirm the deposit
    pub fn mark_confirmed(&mut self, lamports: u64, signature: String) {
        self.observed_lamports = Some(lamports);
        self.observed_signature = Some(signature);
        self.status = DepositStatus::Confirmed;
        self.touch();
    }

    /// Record the observed transfer and reject the deposit
    pub fn mark_rejected(&mut self, status: DepositStatus, lamports: u64, signature: String) {
        debug_assert!(matches!(
            status,
            DepositStatus::RejectedTooSmall
                | DepositStatus::RejectedOverMax
                | DepositStatus::RejectedRaceClosed
        ));
        self.observed_lamports = Some(lamports);
        self.observed_signature = Some(signature);
        self.status = status;
        self.touch();
    }

    /// Mark the address expired; only valid when nothing was ever received
    pub fn mark_expired(&mut self) {
        self.status = DepositStatus::Expired;
        self.touch();
    }

    /// Record the collection sweep signature
    pub fn mark_swept(&mut self, signature: String) {
        self.swept_signature = Some(signature);
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = now_ts();
    }
}
