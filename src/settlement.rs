//! Pari-Mutuel Settlement
//!
//! Pure computation of odds and payouts at race close: all losing stakes,
//! minus the house edge, are redistributed among winners proportional to
//! their stake. Losing bets forfeit their stake; there is no principal
//! return. Settlement is a one-time, irreversible action per race.

use thiserror::Error;

use crate::types::{Bet, RaceStatus};

/// Settlement errors
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("race not found: {0}")]
    RaceNotFound(String),

    #[error("race {0} already settled")]
    AlreadySettled(String),

    #[error("race {race_id} cannot settle from status {status}")]
    NotSettleable { race_id: String, status: RaceStatus },

    #[error("race {race_id} has no runner {winner}")]
    InvalidWinner { race_id: String, winner: u8 },
}

/// One winning bet's share of the settlement
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementEntry {
    pub bet_id: String,
    /// Identified sender of the funding transfer
    pub recipient: String,
    pub stake_lamports: u64,
    pub winnings_lamports: u64,
    /// Stake returned plus winnings
    pub total_payout_lamports: u64,
}

/// The complete settlement of a race
#[derive(Debug, Clone)]
pub struct SettlementSheet {
    pub race_id: String,
    pub winner: u8,
    pub total_pool_lamports: u64,
    pub winning_pool_lamports: u64,
    pub losing_pool_lamports: u64,
    /// Losing pool after the house edge, floored to whole lamports
    pub distributable_lamports: u64,
    /// One entry per winning bet; empty when nobody backed the winner
    pub entries: Vec<SettlementEntry>,
}

/// Compute the settlement sheet for a race.
///
/// Per winning bet: `winnings = distributable * stake / winning_pool`,
/// floored to whole lamports, so the sum paid out never exceeds the
/// distributable amount. When the winning pool is empty there are no
/// payouts and the full pool is retained.
pub fn compute_settlement(
    race_id: &str,
    bets: &[Bet],
    winner: u8,
    house_edge: f64,
) -> SettlementSheet {
    let total_pool_lamports: u64 = bets.iter().map(|b| b.amount_lamports).sum();
    let winning_pool_lamports: u64 = bets
        .iter()
        .filter(|b| b.runner_number == winner)
        .map(|b| b.amount_lamports)
        .sum();
    let losing_pool_lamports = total_pool_lamports - winning_pool_lamports;

    // Nobody backed the winner: no payouts, the pool stays with the house.
    // This must stay an explicit branch, not a division by zero.
    if winning_pool_lamports == 0 {
        return SettlementSheet {
            race_id: race_id.to_string(),
            winner,
            total_pool_lamports,
            winning_pool_lamports,
            losing_pool_lamports,
            distributable_lamports: 0,
            entries: Vec::new(),
        };
    }

    let distributable = losing_pool_lamports as f64 * (1.0 - house_edge);

    let entries = bets
        .iter()
        .filter(|b| b.runner_number == winner)
        .map(|bet| {
            let share = bet.amount_lamports as f64 / winning_pool_lamports as f64;
            let winnings_lamports = (distributable * share).floor() as u64;
            SettlementEntry {
                bet_id: bet.id.clone(),
                recipient: bet.bettor.clone(),
                stake_lamports: bet.amount_lamports,
                winnings_lamports,
                total_payout_lamports: bet.amount_lamports + winnings_lamports,
            }
        })
        .collect();

    SettlementSheet {
        race_id: race_id.to_string(),
        winner,
        total_pool_lamports,
        winning_pool_lamports,
        losing_pool_lamports,
        distributable_lamports: distributable.floor() as u64,
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::sol_to_lamports;

    fn bet(id: &str, runner: u8, sol: f64) -> Bet {
        Bet::new(
            "race_1".to_string(),
            runner,
            format!("dep_{}", id),
            format!("bettor_{}", id),
            sol_to_lamports(sol),
            format!("sig_{}", id),
            1.0,
        )
    }

    #[test]
    fn test_two_runner_settlement() {
        // 10 SOL on runner 1, 5 SOL on runner 2; runner 1 wins, 5% edge.
        // total=15, winning=10, losing=5, distributable=4.75.
        let bets = vec![bet("a", 1, 10.0), bet("b", 2, 5.0)];
        let sheet = compute_settlement("race_1", &bets, 1, 0.05);

        assert_eq!(sheet.total_pool_lamports, sol_to_lamports(15.0));
        assert_eq!(sheet.winning_pool_lamports, sol_to_lamports(10.0));
        assert_eq!(sheet.losing_pool_lamports, sol_to_lamports(5.0));
        assert_eq!(sheet.distributable_lamports, sol_to_lamports(4.75));

        assert_eq!(sheet.entries.len(), 1);
        let entry = &sheet.entries[0];
        assert_eq!(entry.winnings_lamports, sol_to_lamports(4.75));
        assert_eq!(entry.total_payout_lamports, sol_to_lamports(14.75));
    }

    #[test]
    fn test_winnings_proportional_to_stake() {
        // Two winners staked 2:1 split the distributable pool 2:1
        let bets = vec![bet("a", 1, 6.0), bet("b", 1, 3.0), bet("c", 2, 9.0)];
        let sheet = compute_settlement("race_1", &bets, 1, 0.05);

        // distributable = 9 * 0.95 = 8.55 SOL
        assert_eq!(sheet.distributable_lamports, sol_to_lamports(8.55));
        assert_eq!(sheet.entries[0].winnings_lamports, sol_to_lamports(5.70));
        assert_eq!(sheet.entries[1].winnings_lamports, sol_to_lamports(2.85));
    }

    #[test]
    fn test_empty_winning_pool_pays_nothing() {
        // Nobody backed runner 2; no payouts, no division by zero
        let bets = vec![bet("a", 1, 10.0), bet("b", 3, 5.0)];
        let sheet = compute_settlement("race_1", &bets, 2, 0.05);

        assert!(sheet.entries.is_empty());
        assert_eq!(sheet.winning_pool_lamports, 0);
        assert_eq!(sheet.distributable_lamports, 0);
        assert_eq!(sheet.total_pool_lamports, sol_to_lamports(15.0));
    }

    #[test]
    fn test_no_bets_at_all() {
        let sheet = compute_settlement("race_1", &[], 1, 0.05);
        assert!(sheet.entries.is_empty());
        assert_eq!(sheet.total_pool_lamports, 0);
    }

    #[test]
    fn test_payout_sums_bounded() {
        // With awkward stakes the floored winnings never exceed the
        // distributable pool, and total payouts never exceed the total pool.
        let bets = vec![
            bet("a", 1, 0.333),
            bet("b", 1, 1.777),
            bet("c", 1, 0.011),
            bet("d", 2, 2.499),
            bet("e", 3, 0.101),
        ];
        let sheet = compute_settlement("race_1", &bets, 1, 0.05);

        let winnings_sum: u64 = sheet.entries.iter().map(|e| e.winnings_lamports).sum();
        assert!(winnings_sum <= sheet.distributable_lamports);

        let payout_sum: u64 = sheet.entries.iter().map(|e| e.total_payout_lamports).sum();
        assert!(payout_sum <= sheet.total_pool_lamports);

        // And the sum is within a lamport per winner of the exact figure
        let expected = sheet.winning_pool_lamports + sheet.distributable_lamports;
        assert!(expected - payout_sum <= sheet.entries.len() as u64);
    }

    #[test]
    fn test_zero_house_edge_redistributes_everything() {
        let bets = vec![bet("a", 1, 10.0), bet("b", 2, 5.0)];
        let sheet = compute_settlement("race_1", &bets, 1, 0.0);

        assert_eq!(sheet.distributable_lamports, sol_to_lamports(5.0));
        assert_eq!(
            sheet.entries[0].total_payout_lamports,
            sol_to_lamports(15.0)
        );
    }
}
