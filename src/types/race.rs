//! Race and Runner Records
//!
//! A race moves through `pending -> open -> closed -> completed`; transitions
//! are strictly monotonic and a race is never deleted once it has bets.
//! Runners carry the persisted pari-mutuel pool for their number.

use serde::{Deserialize, Serialize};

use super::now_ts;

/// Status of a race through its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceStatus {
    /// Created but not yet accepting wagers
    Pending,
    /// Accepting wagers
    Open,
    /// Wagering closed, awaiting result
    Closed,
    /// Winner declared and settled
    Completed,
}

impl RaceStatus {
    /// Ordering rank used to enforce monotonic transitions
    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Open => 1,
            Self::Closed => 2,
            Self::Completed => 3,
        }
    }
}

impl std::fmt::Display for RaceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for RaceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown race status: {}", other)),
        }
    }
}

/// A runner in a race, numbered 1..=N, with its persisted pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Runner {
    /// Stable runner number (1-based)
    pub number: u8,
    /// Display name
    pub name: String,
    /// Total confirmed stake on this runner in lamports
    pub pool_lamports: u64,
}

/// A race record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Race {
    /// Unique race ID
    pub id: String,
    /// Race title
    pub title: String,
    /// Current status
    pub status: RaceStatus,
    /// Declared winning runner number, set exactly once at settlement
    pub winner: Option<u8>,
    /// Scheduled start time (unix seconds); wagers close at the gate
    pub scheduled_start: i64,
    /// Runners, immutable once the race is created
    pub runners: Vec<Runner>,
    /// Timestamp when the race was created
    pub created_at: i64,
    /// Timestamp of last update
    pub updated_at: i64,
}

impl Race {
    /// Create a new race in `pending` with the given runner names
    pub fn new(title: String, runner_names: Vec<String>, scheduled_start: i64) -> Self {
        let now = now_ts();
        let id = format!("race_{}_{:08x}", now, rand::random::<u32>());

        let runners = runner_names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Runner {
                number: (i + 1) as u8,
                name,
                pool_lamports: 0,
            })
            .collect();

        Self {
            id,
            title,
            status: RaceStatus::Pending,
            winner: None,
            scheduled_start,
            runners,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check whether a runner number is within this race's field
    pub fn has_runner(&self, number: u8) -> bool {
        number >= 1 && (number as usize) <= self.runners.len()
    }

    /// Get a runner by number
    pub fn runner(&self, number: u8) -> Option<&Runner> {
        self.runners.iter().find(|r| r.number == number)
    }

    /// Total pool across all runners in lamports
    pub fn total_pool(&self) -> u64 {
        self.runners.iter().map(|r| r.pool_lamports).sum()
    }

    /// Whether the race currently accepts wagers
    pub fn is_open(&self) -> bool {
        self.status == RaceStatus::Open
    }

    /// The odds a bettor would lock in by adding `stake` lamports on `number`
    /// right now: `(total pool + stake) / (runner pool + stake)`.
    pub fn odds_for_stake(&self, number: u8, stake: u64) -> Option<f64> {
        let runner = self.runner(number)?;
        let denominator = runner.pool_lamports + stake;
        if denominator == 0 {
            return None;
        }
        Some((self.total_pool() + stake) as f64 / denominator as f64)
    }

    /// Credit a confirmed stake to a runner's pool
    pub fn add_to_pool(&mut self, number: u8, lamports: u64) {
        if let Some(runner) = self.runners.iter_mut().find(|r| r.number == number) {
            runner.pool_lamports += lamports;
            self.touch();
        }
    }

    /// Advance the status; returns false if the transition would go backwards
    pub fn advance_status(&mut self, next: RaceStatus) -> bool {
        if next.rank() <= self.status.rank() {
            return false;
        }
        self.status = next;
        self.touch();
        true
    }

    /// Declare the winner and complete the race
    pub fn complete(&mut self, winner: u8) -> bool {
        if self.status == RaceStatus::Completed {
            return false;
        }
        self.winner = Some(winner);
        self.status = RaceStatus::Completed;
        self.touch();
        true
    }

    fn touch(&mut self) {
        self.updated_at = now_ts();
    }
}
