//! Deposit State Machine
//!
//! Pure transition logic for a deposit address given a classified transfer
//! or an expiry tick. All non-`waiting` states are terminal; the machine
//! refuses to evaluate a deposit that already left `waiting`.

use thiserror::Error;

use crate::types::{DepositAddress, DepositStatus, Race};

/// Configured wager bounds
#[derive(Debug, Clone, Copy)]
pub struct WagerLimits {
    pub min_lamports: u64,
    pub max_lamports: u64,
}

/// State machine errors
#[derive(Debug, Error)]
pub enum StateMachineError {
    #[error("deposit {id} already terminal: {status}")]
    AlreadyTerminal { id: String, status: DepositStatus },

    #[error("race {race_id} has no runner {number}")]
    UnknownRunner { race_id: String, number: u8 },
}

/// Outcome of evaluating a classified transfer against a waiting deposit
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Book a bet at these odds
    Confirmed { odds_at_placement: f64 },
    /// Reject with one of the terminal rejection statuses; refund the amount
    Rejected { status: DepositStatus },
}

/// Evaluate a transfer of `lamports` against a waiting deposit.
///
/// Rules, in precedence order:
/// 1. below the minimum -> `rejected_too_small`
/// 2. above the maximum -> `rejected_over_max`
/// 3. race no longer open -> `rejected_race_closed`
/// 4. otherwise -> `confirmed`, at the odds the bettor would receive if no
///    further money arrives: `(total pool + stake) / (runner pool + stake)`
pub fn evaluate_transfer(
    deposit: &DepositAddress,
    lamports: u64,
    race: &Race,
    limits: &WagerLimits,
) -> Result<Verdict, StateMachineError> {
    if deposit.status.is_terminal() {
        return Err(StateMachineError::AlreadyTerminal {
            id: deposit.id.clone(),
            status: deposit.status,
        });
    }

    if lamports < limits.min_lamports {
        return Ok(Verdict::Rejected {
            status: DepositStatus::RejectedTooSmall,
        });
    }

    if lamports > limits.max_lamports {
        return Ok(Verdict::Rejected {
            status: DepositStatus::RejectedOverMax,
        });
    }

    if !race.is_open() {
        return Ok(Verdict::Rejected {
            status: DepositStatus::RejectedRaceClosed,
        });
    }

    let odds = race
        .odds_for_stake(deposit.runner_number, lamports)
        .ok_or_else(|| StateMachineError::UnknownRunner {
            race_id: race.id.clone(),
            number: deposit.runner_number,
        })?;

    Ok(Verdict::Confirmed {
        odds_at_placement: odds,
    })
}

/// Whether a waiting deposit should transition to `expired`: past its
/// deadline with nothing ever received. A funded-but-unmatched address is
/// left alone so a late transfer can still be honored.
pub fn should_expire(deposit: &DepositAddress, now: i64, balance: u64) -> bool {
    deposit.status == DepositStatus::Waiting && deposit.is_expired(now) && balance == 0
}
