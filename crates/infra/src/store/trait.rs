use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use garrison_core::{AssetId, BaseFilter, BaseId, DomainError, ExpectedVersion, UserId};
use garrison_inventory::{
    BalanceCounters, BalanceKey, Delta, InventoryRecord, NewTransaction, Transaction,
    TransactionStatus, TransactionType,
};

/// Storage operation error.
///
/// Infrastructure-level failures, as opposed to the business outcomes the
/// engine decides before touching storage.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic concurrency check failed, or a concurrent writer won a race.
    #[error("concurrent modification: {0}")]
    Conflict(String),

    /// A write would break a record invariant.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Malformed row rejected before any write.
    #[error("invalid row: {0}")]
    Validation(String),

    /// Backend unreachable or a transient failure; safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be decoded.
    #[error("corrupt stored data: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether a commit that failed with this error may be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::Unavailable(_))
    }
}

impl From<DomainError> for StoreError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvariantViolation(msg) => StoreError::InvariantViolation(msg),
            DomainError::Conflict(msg) => StoreError::Conflict(msg),
            other => StoreError::Validation(other.to_string()),
        }
    }
}

/// Filter over balance records.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordFilter {
    pub base: BaseFilter,
    /// `Some(vec![])` matches nothing.
    pub asset_ids: Option<Vec<AssetId>>,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_asset(asset_id: AssetId) -> Self {
        Self {
            base: BaseFilter::Any,
            asset_ids: Some(vec![asset_id]),
        }
    }

    pub fn matches(&self, record: &InventoryRecord) -> bool {
        self.base.matches(record.base_id())
            && self
                .asset_ids
                .as_ref()
                .is_none_or(|ids| ids.contains(&record.asset_id()))
    }
}

/// Filter over ledger rows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionFilter {
    pub base: BaseFilter,
    pub asset_id: Option<AssetId>,
    /// Resolved asset set (e.g. from a category); `Some(vec![])` matches nothing.
    pub asset_ids: Option<Vec<AssetId>>,
    pub transaction_type: Option<TransactionType>,
    pub status: Option<TransactionStatus>,
    /// Inclusive lower bound on `transaction_date`.
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `transaction_date`.
    pub end_date: Option<DateTime<Utc>>,
}

impl TransactionFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn completed() -> Self {
        Self {
            status: Some(TransactionStatus::Completed),
            ..Self::default()
        }
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        let e = &tx.entry;
        self.base.matches(e.base_id)
            && self.asset_id.is_none_or(|a| a == e.asset_id)
            && self
                .asset_ids
                .as_ref()
                .is_none_or(|ids| ids.contains(&e.asset_id))
            && self.transaction_type.is_none_or(|t| t == e.transaction_type)
            && self.status.is_none_or(|s| s == e.status)
            && self.start_date.is_none_or(|d| e.transaction_date >= d)
            && self.end_date.is_none_or(|d| e.transaction_date <= d)
    }
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub const DEFAULT_LIMIT: u32 = 20;

    /// Normalize a page request: page defaults to 1, limit to `default_limit`,
    /// and limit is capped at `max_limit`.
    pub fn new(page: Option<u32>, limit: Option<u32>, default_limit: u32, max_limit: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, max_limit.max(1)),
        }
    }

    pub fn first(limit: u32) -> Self {
        Self {
            page: 1,
            limit: limit.max(1),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    pub fn next(&self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            limit: self.limit,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::first(Self::DEFAULT_LIMIT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Commit order, oldest first (replay order).
    SequenceAsc,
    /// Most recently recorded first.
    #[default]
    SequenceDesc,
    /// Business date, newest first; ties broken by sequence, newest first.
    TransactionDateDesc,
}

impl SortOrder {
    pub fn sort(&self, rows: &mut [Transaction]) {
        match self {
            SortOrder::SequenceAsc => rows.sort_by_key(|t| t.sequence),
            SortOrder::SequenceDesc => rows.sort_by(|a, b| b.sequence.cmp(&a.sequence)),
            SortOrder::TransactionDateDesc => rows.sort_by(|a, b| {
                b.entry
                    .transaction_date
                    .cmp(&a.entry.transaction_date)
                    .then(b.sequence.cmp(&a.sequence))
            }),
        }
    }
}

/// One page of ledger rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPage {
    pub items: Vec<Transaction>,
    /// Rows matching the filter across all pages.
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl TransactionPage {
    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(u64::from(self.limit.max(1)))
    }

    pub fn has_more(&self) -> bool {
        u64::from(self.page) < self.total_pages()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    Type,
    Base,
    Asset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupValue {
    Type(TransactionType),
    Base(BaseId),
    Asset(AssetId),
}

impl GroupValue {
    pub fn of(key: GroupKey, tx: &Transaction) -> Self {
        match key {
            GroupKey::Type => GroupValue::Type(tx.entry.transaction_type),
            GroupKey::Base => GroupValue::Base(tx.entry.base_id),
            GroupKey::Asset => GroupValue::Asset(tx.entry.asset_id),
        }
    }
}

/// count / Σquantity / ΣtotalValue of one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub group: GroupValue,
    pub count: u64,
    pub total_quantity: i64,
    pub total_value: u64,
}

impl GroupSummary {
    /// Fold one ledger row into the group. `Validation` when a total overflows.
    pub fn add(&mut self, tx: &Transaction) -> Result<(), StoreError> {
        let group = self.group;
        let overflow = || StoreError::Validation(format!("{group:?} group totals overflow"));
        let total_quantity = self
            .total_quantity
            .checked_add(tx.entry.quantity)
            .ok_or_else(overflow)?;
        let total_value = self
            .total_value
            .checked_add(tx.entry.total_value.unwrap_or(0))
            .ok_or_else(overflow)?;
        self.count += 1;
        self.total_quantity = total_quantity;
        self.total_value = total_value;
        Ok(())
    }
}

/// A multi-row commit: ledger rows plus the record versions they were validated against.
///
/// Each row's signed effect is applied to its own record; keys without an
/// explicit expectation are checked against `ExpectedVersion::Any`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitBatch {
    pub transactions: Vec<NewTransaction>,
    pub expectations: Vec<(BalanceKey, ExpectedVersion)>,
}

impl CommitBatch {
    pub fn new(transactions: Vec<NewTransaction>) -> Self {
        Self {
            transactions,
            expectations: Vec::new(),
        }
    }

    pub fn expect(mut self, key: BalanceKey, expected: ExpectedVersion) -> Self {
        self.expectations.push((key, expected));
        self
    }

    pub fn expected_version(&self, key: &BalanceKey) -> ExpectedVersion {
        self.expectations
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
            .unwrap_or(ExpectedVersion::Any)
    }

    /// Every key the batch touches or checks, sorted (global lock order).
    pub fn keys(&self) -> Vec<BalanceKey> {
        let mut keys: Vec<BalanceKey> = self
            .transactions
            .iter()
            .map(|t| t.key())
            .chain(self.expectations.iter().map(|(k, _)| *k))
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

/// What a successful commit produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    /// Ledger rows in batch order.
    pub transactions: Vec<Transaction>,
    /// Resulting records, sorted by key.
    pub records: Vec<InventoryRecord>,
}

impl Committed {
    pub fn record(&self, key: &BalanceKey) -> Option<&InventoryRecord> {
        self.records.iter().find(|r| r.key == *key)
    }
}

/// Per-(asset, base) balance records.
pub trait BalanceStore: Send + Sync {
    fn get(&self, key: BalanceKey) -> Result<Option<InventoryRecord>, StoreError>;

    /// Atomic upsert-and-add of one counter.
    fn apply_delta(
        &self,
        key: BalanceKey,
        delta: Delta,
        actor: UserId,
    ) -> Result<InventoryRecord, StoreError>;

    /// Records matching `filter`, sorted by key. Read-committed per row.
    fn list(&self, filter: &RecordFilter) -> Result<Vec<InventoryRecord>, StoreError>;

    /// Like [`BalanceStore::list`], but never observes half of a multi-row commit.
    fn snapshot(&self, filter: &RecordFilter) -> Result<Vec<InventoryRecord>, StoreError>;
}

/// Append-only ledger of stock-affecting rows.
pub trait TransactionLedger: Send + Sync {
    /// Append a single row, assigning `id`, `sequence` and `recorded_at`.
    fn append(&self, transaction: NewTransaction) -> Result<Transaction, StoreError>;

    fn find(
        &self,
        filter: &TransactionFilter,
        page: Page,
        order: SortOrder,
    ) -> Result<TransactionPage, StoreError>;

    /// Groups sorted by group value.
    fn aggregate(
        &self,
        group: GroupKey,
        filter: &TransactionFilter,
    ) -> Result<Vec<GroupSummary>, StoreError>;
}

/// Ledger + balances behind a single atomic commit.
pub trait InventoryStore: BalanceStore + TransactionLedger {
    /// Append every row of `batch` and apply each row's effect to its record,
    /// all or nothing.
    fn commit(&self, batch: CommitBatch) -> Result<Committed, StoreError>;

    /// Create a record holding an opening baseline. `Conflict` if it already exists.
    fn open_record(&self, record: InventoryRecord) -> Result<InventoryRecord, StoreError>;

    /// Overwrite a record's counters (reconciliation repair). Bumps the version.
    ///
    /// `Conflict` when the record's version does not satisfy `expected`.
    fn restore_record(
        &self,
        key: BalanceKey,
        counters: BalanceCounters,
        expected: ExpectedVersion,
        actor: UserId,
    ) -> Result<InventoryRecord, StoreError>;

    /// Every record and every ledger row, read at one point in time.
    fn ledger_cut(&self) -> Result<LedgerCut, StoreError>;
}

/// Records and ledger rows observed together, with no commit in between.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LedgerCut {
    /// Sorted by key.
    pub records: Vec<InventoryRecord>,
    /// Sequence ascending.
    pub transactions: Vec<Transaction>,
    pub last_sequence: u64,
}

impl<S> BalanceStore for Arc<S>
where
    S: BalanceStore + ?Sized,
{
    fn get(&self, key: BalanceKey) -> Result<Option<InventoryRecord>, StoreError> {
        (**self).get(key)
    }

    fn apply_delta(
        &self,
        key: BalanceKey,
        delta: Delta,
        actor: UserId,
    ) -> Result<InventoryRecord, StoreError> {
        (**self).apply_delta(key, delta, actor)
    }

    fn list(&self, filter: &RecordFilter) -> Result<Vec<InventoryRecord>, StoreError> {
        (**self).list(filter)
    }

    fn snapshot(&self, filter: &RecordFilter) -> Result<Vec<InventoryRecord>, StoreError> {
        (**self).snapshot(filter)
    }
}

impl<S> TransactionLedger for Arc<S>
where
    S: TransactionLedger + ?Sized,
{
    fn append(&self, transaction: NewTransaction) -> Result<Transaction, StoreError> {
        (**self).append(transaction)
    }

    fn find(
        &self,
        filter: &TransactionFilter,
        page: Page,
        order: SortOrder,
    ) -> Result<TransactionPage, StoreError> {
        (**self).find(filter, page, order)
    }

    fn aggregate(
        &self,
        group: GroupKey,
        filter: &TransactionFilter,
    ) -> Result<Vec<GroupSummary>, StoreError> {
        (**self).aggregate(group, filter)
    }
}

impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    fn commit(&self, batch: CommitBatch) -> Result<Committed, StoreError> {
        (**self).commit(batch)
    }

    fn open_record(&self, record: InventoryRecord) -> Result<InventoryRecord, StoreError> {
        (**self).open_record(record)
    }

    fn restore_record(
        &self,
        key: BalanceKey,
        counters: BalanceCounters,
        expected: ExpectedVersion,
        actor: UserId,
    ) -> Result<InventoryRecord, StoreError> {
        (**self).restore_record(key, counters, expected, actor)
    }

    fn ledger_cut(&self) -> Result<LedgerCut, StoreError> {
        (**self).ledger_cut()
    }
}
