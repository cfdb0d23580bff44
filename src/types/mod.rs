//! Domain Types
//!
//! Records for races, deposit addresses, bets, payouts and refunds.

pub mod bet;
pub mod deposit;
pub mod race;

pub use bet::{Bet, Payout, PayoutStatus, Refund};
pub use deposit::{DepositAddress, DepositStatus};
pub use race::{Race, RaceStatus, Runner};

/// Current unix timestamp in seconds
pub(crate) fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
