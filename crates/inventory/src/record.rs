//! Per-(asset, base) balance records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use garrison_core::{AggregateRoot, AssetId, BaseId, DomainError, DomainResult, UserId};

/// Unique key of a balance record.
///
/// Ordering is `(asset_id, base_id)`; multi-row commits lock keys in this order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceKey {
    pub asset_id: AssetId,
    pub base_id: BaseId,
}

impl BalanceKey {
    pub fn new(asset_id: AssetId, base_id: BaseId) -> Self {
        Self { asset_id, base_id }
    }
}

impl core::fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.asset_id, self.base_id)
    }
}

/// Counter a delta applies to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceField {
    Current,
    Assigned,
    Expended,
}

impl BalanceField {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceField::Current => "current_balance",
            BalanceField::Assigned => "assigned_quantity",
            BalanceField::Expended => "expended_quantity",
        }
    }
}

/// Signed change to one counter.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub field: BalanceField,
    pub amount: i64,
}

impl Delta {
    pub fn new(field: BalanceField, amount: i64) -> Self {
        Self { field, amount }
    }
}

/// The four counters of a balance record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceCounters {
    pub opening_balance: i64,
    pub current_balance: i64,
    pub assigned_quantity: i64,
    pub expended_quantity: i64,
}

impl BalanceCounters {
    /// Baseline with `quantity` on hand and nothing assigned or expended.
    pub fn opening(quantity: i64) -> Self {
        Self {
            opening_balance: quantity,
            current_balance: quantity,
            assigned_quantity: 0,
            expended_quantity: 0,
        }
    }

    pub fn available(&self) -> i64 {
        self.current_balance - self.assigned_quantity
    }

    pub fn net_movement(&self) -> i64 {
        self.current_balance - self.opening_balance
    }

    /// Apply a delta, rejecting any result that breaks the record invariants.
    pub fn apply(&self, delta: Delta) -> DomainResult<Self> {
        let mut next = *self;
        let slot = match delta.field {
            BalanceField::Current => &mut next.current_balance,
            BalanceField::Assigned => &mut next.assigned_quantity,
            BalanceField::Expended => &mut next.expended_quantity,
        };
        *slot = slot.checked_add(delta.amount).ok_or_else(|| {
            DomainError::invariant(format!("{} overflow", delta.field.as_str()))
        })?;
        next.check()?;
        Ok(next)
    }

    pub fn check(&self) -> DomainResult<()> {
        if self.current_balance < 0 {
            return Err(DomainError::invariant(format!(
                "current balance cannot go negative (would be {})",
                self.current_balance
            )));
        }
        if self.assigned_quantity < 0 {
            return Err(DomainError::invariant(format!(
                "assigned quantity cannot go negative (would be {})",
                self.assigned_quantity
            )));
        }
        if self.assigned_quantity > self.current_balance {
            return Err(DomainError::invariant(format!(
                "assigned quantity {} exceeds current balance {}",
                self.assigned_quantity, self.current_balance
            )));
        }
        if self.expended_quantity < 0 {
            return Err(DomainError::invariant("expended quantity cannot go negative"));
        }
        Ok(())
    }
}

/// Materialized balance of one asset at one base.
///
/// Created lazily on first write, never deleted. `version` is bumped by one on
/// every committed mutation and is `0` for a record that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRecord {
    #[serde(flatten)]
    pub key: BalanceKey,
    #[serde(flatten)]
    pub counters: BalanceCounters,
    pub last_updated: DateTime<Utc>,
    pub updated_by: Option<UserId>,
    pub version: u64,
}

impl InventoryRecord {
    /// The implicit all-zero record of a key that has never been written.
    pub fn zeroed(key: BalanceKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            counters: BalanceCounters::default(),
            last_updated: now,
            updated_by: None,
            version: 0,
        }
    }

    /// A first-write record holding an opening baseline.
    pub fn opening(key: BalanceKey, quantity: i64, actor: UserId, now: DateTime<Utc>) -> DomainResult<Self> {
        if quantity < 0 {
            return Err(DomainError::validation("opening balance cannot be negative"));
        }
        Ok(Self {
            key,
            counters: BalanceCounters::opening(quantity),
            last_updated: now,
            updated_by: Some(actor),
            version: 1,
        })
    }

    pub fn exists(&self) -> bool {
        self.version > 0
    }

    pub fn asset_id(&self) -> AssetId {
        self.key.asset_id
    }

    pub fn base_id(&self) -> BaseId {
        self.key.base_id
    }

    pub fn opening_balance(&self) -> i64 {
        self.counters.opening_balance
    }

    pub fn current_balance(&self) -> i64 {
        self.counters.current_balance
    }

    pub fn assigned_quantity(&self) -> i64 {
        self.counters.assigned_quantity
    }

    pub fn expended_quantity(&self) -> i64 {
        self.counters.expended_quantity
    }

    pub fn available(&self) -> i64 {
        self.counters.available()
    }

    pub fn net_movement(&self) -> i64 {
        self.counters.net_movement()
    }

    /// Next state of this record after `delta`, stamped with actor and time.
    pub fn with_delta(&self, delta: Delta, actor: UserId, now: DateTime<Utc>) -> DomainResult<Self> {
        let counters = self.counters.apply(delta)?;
        Ok(Self {
            key: self.key,
            counters,
            last_updated: now,
            updated_by: Some(actor),
            version: self.version + 1,
        })
    }
}

impl AggregateRoot for InventoryRecord {
    type Id = BalanceKey;

    fn id(&self) -> &Self::Id {
        &self.key
    }

    fn version(&self) -> u64 {
        self.version
    }
}
