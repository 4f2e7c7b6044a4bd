use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::Utc;
use tracing::{debug, instrument};

use garrison_core::{ExpectedVersion, TransactionId, UserId};
use garrison_inventory::{
    BalanceCounters, BalanceKey, Delta, InventoryRecord, NewTransaction, Transaction,
};

use super::plan::plan_commit;
use super::r#trait::{
    BalanceStore, CommitBatch, Committed, GroupKey, GroupSummary, GroupValue, InventoryStore,
    LedgerCut, Page, RecordFilter, SortOrder, StoreError, TransactionFilter, TransactionLedger,
    TransactionPage,
};

type Slot = Arc<Mutex<Option<InventoryRecord>>>;

#[derive(Debug, Default)]
struct Ledger {
    rows: Vec<Transaction>,
    last_sequence: u64,
}

impl Ledger {
    fn push(&mut self, entry: NewTransaction) -> Transaction {
        self.last_sequence += 1;
        let tx = Transaction::committed(TransactionId::new(), self.last_sequence, Utc::now(), entry);
        self.rows.push(tx.clone());
        tx
    }
}

/// In-memory ledger + balance store.
///
/// Intended for tests/dev. Each record lives in its own mutex slot; multi-row
/// commits lock their slots in key order. Writers hold `gate` shared for the
/// whole commit so [`BalanceStore::snapshot`] (which takes it exclusively)
/// never sees half of one.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    gate: RwLock<()>,
    records: RwLock<HashMap<BalanceKey, Slot>>,
    ledger: Mutex<Ledger>,
}

fn poisoned(what: &str) -> StoreError {
    StoreError::Unavailable(format!("{what} lock poisoned"))
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: BalanceKey) -> Result<Slot, StoreError> {
        if let Some(slot) = self
            .records
            .read()
            .map_err(|_| poisoned("records"))?
            .get(&key)
        {
            return Ok(slot.clone());
        }
        let mut records = self.records.write().map_err(|_| poisoned("records"))?;
        Ok(records.entry(key).or_default().clone())
    }

    fn existing_slots(&self) -> Result<Vec<(BalanceKey, Slot)>, StoreError> {
        let records = self.records.read().map_err(|_| poisoned("records"))?;
        let mut slots: Vec<(BalanceKey, Slot)> =
            records.iter().map(|(k, s)| (*k, s.clone())).collect();
        slots.sort_by_key(|(k, _)| *k);
        Ok(slots)
    }

    fn read_matching(&self, filter: &RecordFilter) -> Result<Vec<InventoryRecord>, StoreError> {
        let mut out = Vec::new();
        for (_, slot) in self.existing_slots()? {
            let guard = slot.lock().map_err(|_| poisoned("record"))?;
            if let Some(record) = guard.as_ref().filter(|r| filter.matches(r)) {
                out.push(record.clone());
            }
        }
        Ok(out)
    }

    fn ledger(&self) -> Result<MutexGuard<'_, Ledger>, StoreError> {
        self.ledger.lock().map_err(|_| poisoned("ledger"))
    }
}

impl BalanceStore for InMemoryInventoryStore {
    fn get(&self, key: BalanceKey) -> Result<Option<InventoryRecord>, StoreError> {
        let slot = {
            let records = self.records.read().map_err(|_| poisoned("records"))?;
            match records.get(&key) {
                Some(slot) => slot.clone(),
                None => return Ok(None),
            }
        };
        let guard = slot.lock().map_err(|_| poisoned("record"))?;
        Ok(guard.clone())
    }

    #[instrument(skip(self), fields(key = %key), err)]
    fn apply_delta(
        &self,
        key: BalanceKey,
        delta: Delta,
        actor: UserId,
    ) -> Result<InventoryRecord, StoreError> {
        let _gate = self.gate.read().map_err(|_| poisoned("gate"))?;
        let slot = self.slot(key)?;
        let mut guard = slot.lock().map_err(|_| poisoned("record"))?;

        let now = Utc::now();
        let current = guard.clone().unwrap_or_else(|| InventoryRecord::zeroed(key, now));
        let next = current.with_delta(delta, actor, now)?;
        *guard = Some(next.clone());
        Ok(next)
    }

    fn list(&self, filter: &RecordFilter) -> Result<Vec<InventoryRecord>, StoreError> {
        self.read_matching(filter)
    }

    fn snapshot(&self, filter: &RecordFilter) -> Result<Vec<InventoryRecord>, StoreError> {
        let _gate = self.gate.write().map_err(|_| poisoned("gate"))?;
        self.read_matching(filter)
    }
}

impl TransactionLedger for InMemoryInventoryStore {
    fn append(&self, transaction: NewTransaction) -> Result<Transaction, StoreError> {
        transaction.validate()?;
        Ok(self.ledger()?.push(transaction))
    }

    fn find(
        &self,
        filter: &TransactionFilter,
        page: Page,
        order: SortOrder,
    ) -> Result<TransactionPage, StoreError> {
        let mut matching: Vec<Transaction> = {
            let ledger = self.ledger()?;
            ledger.rows.iter().filter(|t| filter.matches(t)).cloned().collect()
        };
        order.sort(&mut matching);

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(page.limit as usize)
            .collect();

        Ok(TransactionPage {
            items,
            total,
            page: page.page,
            limit: page.limit,
        })
    }

    fn aggregate(
        &self,
        group: GroupKey,
        filter: &TransactionFilter,
    ) -> Result<Vec<GroupSummary>, StoreError> {
        let matching: Vec<Transaction> = {
            let ledger = self.ledger()?;
            ledger.rows.iter().filter(|t| filter.matches(t)).cloned().collect()
        };

        let mut groups: BTreeMap<GroupValue, GroupSummary> = BTreeMap::new();
        for tx in &matching {
            let value = GroupValue::of(group, tx);
            groups
                .entry(value)
                .or_insert_with(|| GroupSummary {
                    group: value,
                    count: 0,
                    total_quantity: 0,
                    total_value: 0,
                })
                .add(tx)?;
        }
        Ok(groups.into_values().collect())
    }
}

impl InventoryStore for InMemoryInventoryStore {
    #[instrument(skip(self, batch), fields(rows = batch.transactions.len()), err)]
    fn commit(&self, batch: CommitBatch) -> Result<Committed, StoreError> {
        let keys = batch.keys();

        let _gate = self.gate.read().map_err(|_| poisoned("gate"))?;
        let slots = keys
            .iter()
            .map(|k| self.slot(*k))
            .collect::<Result<Vec<_>, _>>()?;
        // Locked in sorted key order.
        let mut guards = slots
            .iter()
            .map(|s| s.lock().map_err(|_| poisoned("record")))
            .collect::<Result<Vec<_>, _>>()?;

        let current: BTreeMap<BalanceKey, Option<InventoryRecord>> = keys
            .iter()
            .zip(guards.iter())
            .map(|(k, g)| (*k, (**g).clone()))
            .collect();

        let mut planned = plan_commit(&current, &batch, Utc::now())?;

        let transactions = {
            let mut ledger = self.ledger()?;
            batch
                .transactions
                .into_iter()
                .map(|entry| ledger.push(entry))
                .collect::<Vec<_>>()
        };

        let mut records = Vec::with_capacity(planned.len());
        for (key, guard) in keys.iter().zip(guards.iter_mut()) {
            if let Some(record) = planned.remove(key) {
                **guard = Some(record.clone());
                records.push(record);
            }
        }

        debug!(
            first_sequence = transactions.first().map(|t| t.sequence),
            records = records.len(),
            "commit applied"
        );

        Ok(Committed {
            transactions,
            records,
        })
    }

    fn open_record(&self, record: InventoryRecord) -> Result<InventoryRecord, StoreError> {
        record.counters.check()?;

        let _gate = self.gate.read().map_err(|_| poisoned("gate"))?;
        let slot = self.slot(record.key)?;
        let mut guard = slot.lock().map_err(|_| poisoned("record"))?;
        if guard.is_some() {
            return Err(StoreError::Conflict(format!(
                "inventory record {} already exists",
                record.key
            )));
        }
        let record = InventoryRecord {
            version: 1,
            ..record
        };
        *guard = Some(record.clone());
        Ok(record)
    }

    fn restore_record(
        &self,
        key: BalanceKey,
        counters: BalanceCounters,
        expected: ExpectedVersion,
        actor: UserId,
    ) -> Result<InventoryRecord, StoreError> {
        counters.check()?;

        let _gate = self.gate.read().map_err(|_| poisoned("gate"))?;
        let slot = self.slot(key)?;
        let mut guard = slot.lock().map_err(|_| poisoned("record"))?;
        let version = guard.as_ref().map(|r| r.version).unwrap_or(0);
        expected.check(version)?;
        let record = InventoryRecord {
            key,
            counters,
            last_updated: Utc::now(),
            updated_by: Some(actor),
            version: version + 1,
        };
        *guard = Some(record.clone());
        Ok(record)
    }

    fn ledger_cut(&self) -> Result<LedgerCut, StoreError> {
        let _gate = self.gate.write().map_err(|_| poisoned("gate"))?;
        let records = self.read_matching(&RecordFilter::default())?;
        let ledger = self.ledger()?;
        Ok(LedgerCut {
            records,
            transactions: ledger.rows.clone(),
            last_sequence: ledger.last_sequence,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use garrison_core::{AssetId, BaseId};
    use garrison_inventory::{AssigneeSnapshot, BalanceField, TransactionType, Vendor};

    use super::*;

    fn purchase(key: BalanceKey, quantity: i64) -> NewTransaction {
        NewTransaction::purchase(key, quantity, 100, Vendor::new("Acme"), UserId::new(), Utc::now())
            .unwrap()
    }

    #[test]
    fn get_of_unknown_key_is_absent_and_has_no_side_effect() {
        let store = InMemoryInventoryStore::new();
        let key = BalanceKey::new(AssetId::new(), BaseId::new());

        assert_eq!(store.get(key).unwrap(), None);
        assert!(store.list(&RecordFilter::all()).unwrap().is_empty());
    }

    #[test]
    fn apply_delta_upserts_and_rejects_negative_balances() {
        let store = InMemoryInventoryStore::new();
        let key = BalanceKey::new(AssetId::new(), BaseId::new());
        let actor = UserId::new();

        let rec = store.apply_delta(key, Delta::new(BalanceField::Current, 10), actor).unwrap();
        assert_eq!(rec.current_balance(), 10);

        let err = store
            .apply_delta(key, Delta::new(BalanceField::Current, -11), actor)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvariantViolation(_)));
        assert_eq!(store.get(key).unwrap().unwrap().current_balance(), 10);
    }

    #[test]
    fn commit_assigns_monotonic_sequences_and_updates_records() {
        let store = InMemoryInventoryStore::new();
        let asset = AssetId::new();
        let (b, c) = (BaseId::new(), BaseId::new());
        let kb = BalanceKey::new(asset, b);

        store.commit(CommitBatch::new(vec![purchase(kb, 100)])).unwrap();
        let (out, inbound) = NewTransaction::transfer_pair(asset, b, c, 40, UserId::new(), Utc::now());
        let committed = store
            .commit(CommitBatch::new(vec![out, inbound]).expect(kb, ExpectedVersion::Exact(1)))
            .unwrap();

        let seqs: Vec<u64> = committed.transactions.iter().map(|t| t.sequence).collect();
        assert_eq!(seqs, vec![2, 3]);
        assert_eq!(committed.record(&kb).unwrap().current_balance(), 60);
        assert_eq!(store.get(BalanceKey::new(asset, c)).unwrap().unwrap().current_balance(), 40);
    }

    #[test]
    fn failed_commit_leaves_no_trace() {
        let store = InMemoryInventoryStore::new();
        let key = BalanceKey::new(AssetId::new(), BaseId::new());
        store.commit(CommitBatch::new(vec![purchase(key, 5)])).unwrap();

        let assign = NewTransaction::assignment(key, 6, AssigneeSnapshot::new("Doe", "Sgt"), UserId::new(), Utc::now());
        assert!(store.commit(CommitBatch::new(vec![assign])).is_err());

        let page = store.find(&TransactionFilter::all(), Page::default(), SortOrder::SequenceAsc).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(store.get(key).unwrap().unwrap().assigned_quantity(), 0);
    }

    #[test]
    fn open_record_refuses_existing_records() {
        let store = InMemoryInventoryStore::new();
        let key = BalanceKey::new(AssetId::new(), BaseId::new());
        let rec = InventoryRecord::opening(key, 25, UserId::new(), Utc::now()).unwrap();

        assert_eq!(store.open_record(rec.clone()).unwrap().opening_balance(), 25);
        assert!(matches!(store.open_record(rec), Err(StoreError::Conflict(_))));
    }

    #[test]
    fn find_paginates_and_aggregate_groups_by_type() {
        let store = InMemoryInventoryStore::new();
        let key = BalanceKey::new(AssetId::new(), BaseId::new());
        for q in 1..=5 {
            store.commit(CommitBatch::new(vec![purchase(key, q)])).unwrap();
        }
        store
            .commit(CommitBatch::new(vec![NewTransaction::expenditure(key, 2, UserId::new(), Utc::now())]))
            .unwrap();

        let page = store
            .find(&TransactionFilter::all(), Page::new(Some(2), Some(4), 20, 100), SortOrder::SequenceAsc)
            .unwrap();
        assert_eq!(page.total, 6);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].sequence, 5);
        assert!(!page.has_more());

        let groups = store.aggregate(GroupKey::Type, &TransactionFilter::all()).unwrap();
        let purchases = groups
            .iter()
            .find(|g| g.group == GroupValue::Type(TransactionType::Purchase))
            .unwrap();
        assert_eq!(purchases.count, 5);
        assert_eq!(purchases.total_quantity, 15);
        assert_eq!(purchases.total_value, 1_500);
    }

    #[test]
    fn overflowing_aggregate_fails_without_poisoning_the_ledger() {
        let store = InMemoryInventoryStore::new();
        let asset = AssetId::new();
        let actor = UserId::new();
        let half = i64::MAX / 2 + 1;
        for _ in 0..2 {
            let key = BalanceKey::new(asset, BaseId::new());
            store
                .commit(CommitBatch::new(vec![
                    NewTransaction::purchase(key, half, 1, Vendor::new("Acme"), actor, Utc::now()).unwrap(),
                ]))
                .unwrap();
        }
        let err = store.aggregate(GroupKey::Type, &TransactionFilter::all()).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)), "{err:?}");

        // Value totals overflow u64 on their own.
        let priced = BalanceKey::new(AssetId::new(), BaseId::new());
        for _ in 0..3 {
            store
                .commit(CommitBatch::new(vec![
                    NewTransaction::purchase(
                        BalanceKey::new(priced.asset_id, BaseId::new()),
                        1,
                        garrison_inventory::MAX_MONEY,
                        Vendor::new("Acme"),
                        actor,
                        Utc::now(),
                    )
                    .unwrap(),
                ]))
                .unwrap();
        }
        let by_asset = TransactionFilter {
            asset_id: Some(priced.asset_id),
            ..TransactionFilter::all()
        };
        assert!(matches!(
            store.aggregate(GroupKey::Asset, &by_asset),
            Err(StoreError::Validation(_))
        ));

        // Still usable afterwards.
        store.commit(CommitBatch::new(vec![purchase(priced, 1)])).unwrap();
        let page = store
            .find(&TransactionFilter::all(), Page::first(10), SortOrder::SequenceAsc)
            .unwrap();
        assert_eq!(page.total, 6);
    }

    #[test]
    fn restore_requires_the_observed_version() {
        let store = InMemoryInventoryStore::new();
        let key = BalanceKey::new(AssetId::new(), BaseId::new());
        let actor = UserId::new();
        store.commit(CommitBatch::new(vec![purchase(key, 4)])).unwrap();
        store.commit(CommitBatch::new(vec![purchase(key, 4)])).unwrap();

        let err = store
            .restore_record(key, BalanceCounters::opening(0), ExpectedVersion::Exact(1), actor)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.get(key).unwrap().unwrap().current_balance(), 8);

        let restored = store
            .restore_record(key, BalanceCounters::opening(0), ExpectedVersion::Exact(2), actor)
            .unwrap();
        assert_eq!(restored.version, 3);

        let fresh = BalanceKey::new(key.asset_id, BaseId::new());
        store
            .restore_record(fresh, BalanceCounters::opening(2), ExpectedVersion::Absent, actor)
            .unwrap();
        assert_eq!(store.get(fresh).unwrap().unwrap().current_balance(), 2);
    }

    #[test]
    fn ledger_cut_matches_records_under_concurrent_commits() {
        let store = Arc::new(InMemoryInventoryStore::new());
        let key = BalanceKey::new(AssetId::new(), BaseId::new());

        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    store.commit(CommitBatch::new(vec![purchase(key, 1)])).unwrap();
                }
            })
        };

        for _ in 0..200 {
            let cut = store.ledger_cut().unwrap();
            let stored = cut.records.first().map(|r| r.current_balance()).unwrap_or(0);
            assert_eq!(stored, cut.transactions.len() as i64);
            assert_eq!(cut.last_sequence, cut.transactions.len() as u64);
        }
        writer.join().unwrap();
    }

    #[test]
    fn snapshot_never_sees_half_a_transfer() {
        let store = Arc::new(InMemoryInventoryStore::new());
        let asset = AssetId::new();
        let (b, c) = (BaseId::new(), BaseId::new());
        store
            .commit(CommitBatch::new(vec![purchase(BalanceKey::new(asset, b), 1_000)]))
            .unwrap();

        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    let (from, to) = if i % 2 == 0 { (b, c) } else { (c, b) };
                    let (out, inbound) = NewTransaction::transfer_pair(asset, from, to, 1, UserId::new(), Utc::now());
                    store.commit(CommitBatch::new(vec![out, inbound])).unwrap();
                }
            })
        };

        for _ in 0..200 {
            let total: i64 = store
                .snapshot(&RecordFilter::for_asset(asset))
                .unwrap()
                .iter()
                .map(|r| r.current_balance())
                .sum();
            assert_eq!(total, 1_000);
        }
        writer.join().unwrap();
    }
}
