//! Commit planning shared by every store backend.
//!
//! Given the locked current state of each key, validates a batch and computes
//! the records it produces. Backends only differ in how they lock, persist and
//! assign ledger metadata.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use garrison_inventory::{BalanceKey, InventoryRecord};

use super::r#trait::{CommitBatch, StoreError};

/// Resulting records of a batch, one per key touched by a ledger row.
pub(crate) fn plan_commit(
    current: &BTreeMap<BalanceKey, Option<InventoryRecord>>,
    batch: &CommitBatch,
    now: DateTime<Utc>,
) -> Result<BTreeMap<BalanceKey, InventoryRecord>, StoreError> {
    if batch.transactions.is_empty() {
        return Err(StoreError::Validation("commit batch has no rows".to_string()));
    }
    for tx in &batch.transactions {
        tx.validate()?;
    }

    for key in batch.keys() {
        let version = current
            .get(&key)
            .and_then(|r| r.as_ref())
            .map(|r| r.version)
            .unwrap_or(0);
        batch.expected_version(&key).check(version).map_err(|_| {
            StoreError::Conflict(format!(
                "record {key} moved on (expected {:?}, found version {version})",
                batch.expected_version(&key)
            ))
        })?;
    }

    let mut staged: BTreeMap<BalanceKey, InventoryRecord> = BTreeMap::new();
    for tx in &batch.transactions {
        let key = tx.key();
        let base = match staged.get(&key) {
            Some(r) => r.clone(),
            None => current
                .get(&key)
                .cloned()
                .flatten()
                .unwrap_or_else(|| InventoryRecord::zeroed(key, now)),
        };
        let counters = base.counters.apply(tx.effect())?;
        staged.insert(
            key,
            InventoryRecord {
                key,
                counters,
                last_updated: now,
                updated_by: Some(tx.created_by),
                version: base.version,
            },
        );
    }

    // One version step per record per commit.
    for record in staged.values_mut() {
        record.version += 1;
    }

    Ok(staged)
}

#[cfg(test)]
mod tests {
    use garrison_core::{AssetId, BaseId, ExpectedVersion, UserId};
    use garrison_inventory::{AssigneeSnapshot, NewTransaction, Vendor};

    use super::*;

    #[test]
    fn transfer_plan_moves_stock_between_records() {
        let actor = UserId::new();
        let asset = AssetId::new();
        let (from, to) = (BaseId::new(), BaseId::new());
        let source = InventoryRecord::opening(BalanceKey::new(asset, from), 50, actor, Utc::now()).unwrap();

        let mut current = BTreeMap::new();
        current.insert(source.key, Some(source.clone()));
        current.insert(BalanceKey::new(asset, to), None);

        let (out, inbound) = NewTransaction::transfer_pair(asset, from, to, 20, actor, Utc::now());
        let batch = CommitBatch::new(vec![out, inbound])
            .expect(source.key, ExpectedVersion::Exact(1))
            .expect(BalanceKey::new(asset, to), ExpectedVersion::Absent);

        let planned = plan_commit(&current, &batch, Utc::now()).unwrap();
        assert_eq!(planned[&source.key].current_balance(), 30);
        assert_eq!(planned[&source.key].version, 2);
        assert_eq!(planned[&BalanceKey::new(asset, to)].current_balance(), 20);
        assert_eq!(planned[&BalanceKey::new(asset, to)].version, 1);
    }

    #[test]
    fn stale_expectation_is_a_conflict() {
        let key = BalanceKey::new(AssetId::new(), BaseId::new());
        let record = InventoryRecord::opening(key, 5, UserId::new(), Utc::now()).unwrap();
        let mut current = BTreeMap::new();
        current.insert(key, Some(record));

        let batch = CommitBatch::new(vec![NewTransaction::expenditure(key, 1, UserId::new(), Utc::now())])
            .expect(key, ExpectedVersion::Absent);

        assert!(matches!(plan_commit(&current, &batch, Utc::now()), Err(StoreError::Conflict(_))));
    }

    #[test]
    fn over_assignment_is_an_invariant_violation() {
        let key = BalanceKey::new(AssetId::new(), BaseId::new());
        let mut current = BTreeMap::new();
        current.insert(key, None);
        let batch = CommitBatch::new(vec![NewTransaction::assignment(
            key,
            1,
            AssigneeSnapshot::new("Doe", "Pvt"),
            UserId::new(),
            Utc::now(),
        )]);

        assert!(matches!(
            plan_commit(&current, &batch, Utc::now()),
            Err(StoreError::InvariantViolation(_))
        ));
    }

    #[test]
    fn malformed_rows_are_rejected_before_planning() {
        let key = BalanceKey::new(AssetId::new(), BaseId::new());
        let tx = NewTransaction::purchase(key, 0, 10, Vendor::new("Acme"), UserId::new(), Utc::now()).unwrap();
        let batch = CommitBatch::new(vec![tx]);

        assert!(matches!(
            plan_commit(&BTreeMap::new(), &batch, Utc::now()),
            Err(StoreError::Validation(_))
        ));
    }
}
