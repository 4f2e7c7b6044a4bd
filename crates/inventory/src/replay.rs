//! Deterministic ledger replay.
//!
//! Folds completed ledger rows, in commit order, over opening baselines to
//! obtain the counters every balance record should hold.

use std::collections::BTreeMap;

use garrison_core::{DomainError, DomainResult};

use crate::record::{BalanceCounters, BalanceKey};
use crate::transaction::Transaction;

/// Result of a replay: expected counters per key plus the last sequence seen.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Replay {
    pub balances: BTreeMap<BalanceKey, BalanceCounters>,
    pub last_sequence: u64,
    pub applied: usize,
}

impl Replay {
    pub fn get(&self, key: &BalanceKey) -> Option<&BalanceCounters> {
        self.balances.get(key)
    }
}

/// Replay `transactions` over `openings`.
///
/// Rows must arrive in strictly increasing `sequence`; non-completed rows are
/// skipped. A row that would break a record invariant is reported as an
/// invariant violation naming the offending sequence.
pub fn replay<'a>(
    openings: impl IntoIterator<Item = (BalanceKey, i64)>,
    transactions: impl IntoIterator<Item = &'a Transaction>,
) -> DomainResult<Replay> {
    let mut out = Replay::default();

    for (key, opening) in openings {
        out.balances.insert(key, BalanceCounters::opening(opening));
    }

    for tx in transactions {
        if tx.sequence <= out.last_sequence {
            return Err(DomainError::invariant(format!(
                "ledger out of order: sequence {} after {}",
                tx.sequence, out.last_sequence
            )));
        }
        out.last_sequence = tx.sequence;

        if !tx.is_completed() {
            continue;
        }

        let counters = out.balances.entry(tx.key()).or_default();
        *counters = counters.apply(tx.entry.effect()).map_err(|e| {
            DomainError::invariant(format!("replay failed at sequence {}: {e}", tx.sequence))
        })?;
        out.applied += 1;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use garrison_core::{AssetId, BaseId, TransactionId, UserId};

    use super::*;
    use crate::transaction::{AssigneeSnapshot, NewTransaction, TransactionStatus, Vendor};

    fn commit(seq: u64, entry: NewTransaction) -> Transaction {
        Transaction::committed(TransactionId::new(), seq, Utc::now(), entry)
    }

    #[test]
    fn replay_reproduces_transfer_scenario() {
        let actor = UserId::new();
        let asset = AssetId::new();
        let (b, c) = (BaseId::new(), BaseId::new());
        let kb = BalanceKey::new(asset, b);
        let kc = BalanceKey::new(asset, c);
        let now = Utc::now();

        let (out, inbound) = NewTransaction::transfer_pair(asset, b, c, 40, actor, now);
        let ledger = vec![
            commit(1, NewTransaction::purchase(kb, 100, 10, Vendor::new("Acme"), actor, now).unwrap()),
            commit(2, out),
            commit(3, inbound),
            commit(4, NewTransaction::assignment(kb, 50, AssigneeSnapshot::new("Doe", "Cpl"), actor, now)),
            commit(5, NewTransaction::expenditure(kc, 5, actor, now)),
        ];

        let r = replay([], &ledger).unwrap();

        let at_b = r.get(&kb).unwrap();
        assert_eq!(at_b.current_balance, 60);
        assert_eq!(at_b.assigned_quantity, 50);
        let at_c = r.get(&kc).unwrap();
        assert_eq!(at_c.current_balance, 40);
        assert_eq!(at_c.expended_quantity, 5);
        assert_eq!(r.last_sequence, 5);
        assert_eq!(r.applied, 5);
    }

    #[test]
    fn openings_seed_the_fold_and_cancelled_rows_are_skipped() {
        let actor = UserId::new();
        let key = BalanceKey::new(AssetId::new(), BaseId::new());
        let mut cancelled = NewTransaction::purchase(key, 7, 1, Vendor::new("Acme"), actor, Utc::now()).unwrap();
        cancelled.status = TransactionStatus::Cancelled;

        let r = replay([(key, 20)], &[commit(1, cancelled)]).unwrap();
        let counters = r.get(&key).unwrap();

        assert_eq!(counters.opening_balance, 20);
        assert_eq!(counters.current_balance, 20);
        assert_eq!(r.applied, 0);
    }

    #[test]
    fn out_of_order_ledger_is_rejected() {
        let key = BalanceKey::new(AssetId::new(), BaseId::new());
        let ledger = vec![
            commit(2, NewTransaction::expenditure(key, 1, UserId::new(), Utc::now())),
            commit(1, NewTransaction::expenditure(key, 1, UserId::new(), Utc::now())),
        ];
        assert!(matches!(replay([], &ledger), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn negative_balance_during_replay_is_reported() {
        let key = BalanceKey::new(AssetId::new(), BaseId::new());
        let mut out = NewTransaction::expenditure(key, 1, UserId::new(), Utc::now());
        out.transaction_type = crate::TransactionType::TransferOut;

        let err = replay([], &[commit(1, out)]).unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) => assert!(msg.contains("sequence 1")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
