//! Transfer Classifier
//!
//! Turns a raw ledger transaction into a normalized inbound transfer relative
//! to a watched address: did the watched address gain funds, from whom, and
//! how much.

use crate::ledger::RawTransaction;

/// A normalized inbound transfer to a watched address
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedTransfer {
    /// The counterparty identified as the sender
    pub sender: String,
    /// Net lamports credited to the watched address
    pub lamports: u64,
    /// Transaction signature
    pub signature: String,
}

/// Classify a transaction against a watched address.
///
/// Returns `None` when the transaction failed, does not touch the address, or
/// did not increase its balance. The sender is the first account in the
/// transaction's account list whose balance decreased. That is an
/// approximation of sender identity, not a signer proof: a transaction can
/// debit several accounts, and the first debited account is not guaranteed to
/// be the fee payer that authorized it. Refunds are addressed to this
/// identified sender; a stricter rule would use the fee payer at index 0.
pub fn classify_transfer(tx: &RawTransaction, target: &str) -> Option<ClassifiedTransfer> {
    if !tx.succeeded {
        return None;
    }

    let target_idx = tx.account_keys.iter().position(|key| key == target)?;

    let pre = *tx.pre_balances.get(target_idx)?;
    let post = *tx.post_balances.get(target_idx)?;
    if post <= pre {
        return None;
    }
    let credited = post - pre;

    // First account whose balance went down
    let sender = tx.account_keys.iter().enumerate().find_map(|(i, key)| {
        let pre = *tx.pre_balances.get(i)?;
        let post = *tx.post_balances.get(i)?;
        (post < pre).then(|| key.clone())
    })?;

    Some(ClassifiedTransfer {
        sender,
        lamports: credited,
        signature: tx.signature.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: &str = "DepositAddr111111111111111111111111111111111";
    const SENDER: &str = "SenderAddr1111111111111111111111111111111111";
    const OTHER: &str = "OtherAddr11111111111111111111111111111111111";

    fn transfer_tx(pre: Vec<u64>, post: Vec<u64>, keys: Vec<&str>, succeeded: bool) -> RawTransaction {
        RawTransaction {
            signature: "sig".to_string(),
            account_keys: keys.into_iter().map(String::from).collect(),
            pre_balances: pre,
            post_balances: post,
            succeeded,
        }
    }

    #[test]
    fn test_simple_transfer() {
        // Sender pays 1 SOL + 5000 fee, target receives 1 SOL
        let tx = transfer_tx(
            vec![2_000_005_000, 0],
            vec![1_000_000_000, 1_000_000_000],
            vec![SENDER, TARGET],
            true,
        );

        let transfer = classify_transfer(&tx, TARGET).unwrap();
        assert_eq!(transfer.sender, SENDER);
        assert_eq!(transfer.lamports, 1_000_000_000);
        assert_eq!(transfer.signature, "sig");
    }

    #[test]
    fn test_failed_transaction_ignored() {
        let tx = transfer_tx(
            vec![2_000_000_000, 0],
            vec![1_000_000_000, 1_000_000_000],
            vec![SENDER, TARGET],
            false,
        );
        assert!(classify_transfer(&tx, TARGET).is_none());
    }

    #[test]
    fn test_target_not_involved() {
        let tx = transfer_tx(
            vec![2_000_000_000, 0],
            vec![1_000_000_000, 1_000_000_000],
            vec![SENDER, OTHER],
            true,
        );
        assert!(classify_transfer(&tx, TARGET).is_none());
    }

    #[test]
    fn test_outbound_from_target_ignored() {
        // Target's balance decreased - that is a sweep, not a deposit
        let tx = transfer_tx(
            vec![1_000_000_000, 0],
            vec![0, 999_995_000],
            vec![TARGET, OTHER],
            true,
        );
        assert!(classify_transfer(&tx, TARGET).is_none());
    }

    #[test]
    fn test_zero_delta_ignored() {
        let tx = transfer_tx(
            vec![1_000_000_000, 500],
            vec![1_000_000_000, 500],
            vec![SENDER, TARGET],
            true,
        );
        assert!(classify_transfer(&tx, TARGET).is_none());
    }

    #[test]
    fn test_first_decreasing_account_wins() {
        // Two accounts decreased; the first in the account list is taken as
        // the sender even though the second lost more.
        let tx = transfer_tx(
            vec![500_000, 3_000_000_000, 0],
            vec![400_000, 1_000_000_000, 2_000_100_000],
            vec![OTHER, SENDER, TARGET],
            true,
        );

        let transfer = classify_transfer(&tx, TARGET).unwrap();
        assert_eq!(transfer.sender, OTHER);
        assert_eq!(transfer.lamports, 2_000_100_000);
    }
}
