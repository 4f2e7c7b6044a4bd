//! Ledger rows: what moved, where, by whom.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use garrison_core::{AssetId, BaseId, DomainError, DomainResult, Entity, TransactionId, UserId};

use crate::record::{BalanceField, BalanceKey, Delta};

/// Kind of stock-affecting movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Purchase,
    TransferIn,
    TransferOut,
    Assignment,
    Expenditure,
    Return,
}

impl TransactionType {
    pub const ALL: [TransactionType; 6] = [
        TransactionType::Purchase,
        TransactionType::TransferIn,
        TransactionType::TransferOut,
        TransactionType::Assignment,
        TransactionType::Expenditure,
        TransactionType::Return,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::TransferIn => "transfer_in",
            TransactionType::TransferOut => "transfer_out",
            TransactionType::Assignment => "assignment",
            TransactionType::Expenditure => "expenditure",
            TransactionType::Return => "return",
        }
    }

    /// Signed effect of `quantity` units of this movement on its own record.
    ///
    /// | type          | counter  | sign |
    /// |---------------|----------|------|
    /// | purchase      | current  | +    |
    /// | transfer_in   | current  | +    |
    /// | transfer_out  | current  | −    |
    /// | assignment    | assigned | +    |
    /// | return        | assigned | −    |
    /// | expenditure   | expended | +    |
    pub fn effect(&self, quantity: i64) -> Delta {
        match self {
            TransactionType::Purchase | TransactionType::TransferIn => {
                Delta::new(BalanceField::Current, quantity)
            }
            TransactionType::TransferOut => Delta::new(BalanceField::Current, -quantity),
            TransactionType::Assignment => Delta::new(BalanceField::Assigned, quantity),
            TransactionType::Return => Delta::new(BalanceField::Assigned, -quantity),
            TransactionType::Expenditure => Delta::new(BalanceField::Expended, quantity),
        }
    }

    pub fn is_transfer(&self) -> bool {
        matches!(self, TransactionType::TransferIn | TransactionType::TransferOut)
    }
}

impl core::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for TransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown transaction type '{s}'")))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Approved,
    #[default]
    Completed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

impl core::str::FromStr for TransactionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "approved" => Ok(TransactionStatus::Approved),
            "completed" => Ok(TransactionStatus::Completed),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown transaction status '{other}'"))),
        }
    }
}

/// Snapshot of the person stock was assigned to (or returned by).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssigneeSnapshot {
    #[serde(default)]
    pub personnel_id: Option<String>,
    pub personnel_name: String,
    pub rank: String,
    #[serde(default)]
    pub unit: Option<String>,
}

impl AssigneeSnapshot {
    pub fn new(personnel_name: impl Into<String>, rank: impl Into<String>) -> Self {
        Self {
            personnel_id: None,
            personnel_name: personnel_name.into(),
            rank: rank.into(),
            unit: None,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.personnel_name.trim().is_empty() {
            return Err(DomainError::validation("assignee personnel name is required"));
        }
        if self.rank.trim().is_empty() {
            return Err(DomainError::validation("assignee rank is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    pub name: String,
    #[serde(default)]
    pub contact: Option<String>,
}

impl Vendor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contact: None,
        }
    }
}

/// Largest money amount a row may carry; stored as a signed 64-bit column.
pub const MAX_MONEY: u64 = i64::MAX as u64;

/// A ledger row before the store assigns `id`, `sequence` and `recorded_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub asset_id: AssetId,
    pub base_id: BaseId,
    pub quantity: i64,

    /// Minor currency units.
    pub unit_price: Option<u64>,
    pub total_value: Option<u64>,
    pub vendor: Option<Vendor>,
    pub purchase_order_number: Option<String>,
    pub invoice_number: Option<String>,

    pub from_base_id: Option<BaseId>,
    pub to_base_id: Option<BaseId>,
    pub transfer_id: Option<Uuid>,

    pub assigned_to: Option<AssigneeSnapshot>,

    pub description: Option<String>,
    pub remarks: Option<String>,

    pub status: TransactionStatus,
    pub created_by: UserId,
    pub transaction_date: DateTime<Utc>,
}

impl NewTransaction {
    fn bare(
        transaction_type: TransactionType,
        key: BalanceKey,
        quantity: i64,
        created_by: UserId,
        transaction_date: DateTime<Utc>,
    ) -> Self {
        Self {
            transaction_type,
            asset_id: key.asset_id,
            base_id: key.base_id,
            quantity,
            unit_price: None,
            total_value: None,
            vendor: None,
            purchase_order_number: None,
            invoice_number: None,
            from_base_id: None,
            to_base_id: None,
            transfer_id: None,
            assigned_to: None,
            description: None,
            remarks: None,
            status: TransactionStatus::Completed,
            created_by,
            transaction_date,
        }
    }

    /// Purchase row; `total_value = quantity × unit_price`.
    pub fn purchase(
        key: BalanceKey,
        quantity: i64,
        unit_price: u64,
        vendor: Vendor,
        created_by: UserId,
        transaction_date: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let total = u64::try_from(quantity)
            .ok()
            .and_then(|q| q.checked_mul(unit_price))
            .filter(|total| *total <= MAX_MONEY && unit_price <= MAX_MONEY)
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "total value of {quantity} × {unit_price} is out of range"
                ))
            })?;

        let mut tx = Self::bare(TransactionType::Purchase, key, quantity, created_by, transaction_date);
        tx.unit_price = Some(unit_price);
        tx.total_value = Some(total);
        tx.vendor = Some(vendor);
        Ok(tx)
    }

    /// The `transfer_out`/`transfer_in` pair of one transfer, sharing a pairing key.
    pub fn transfer_pair(
        asset_id: AssetId,
        from_base_id: BaseId,
        to_base_id: BaseId,
        quantity: i64,
        created_by: UserId,
        transaction_date: DateTime<Utc>,
    ) -> (Self, Self) {
        let transfer_id = Uuid::now_v7();
        let stamp = |transaction_type: TransactionType, base_id: BaseId| {
            let mut tx = Self::bare(
                transaction_type,
                BalanceKey::new(asset_id, base_id),
                quantity,
                created_by,
                transaction_date,
            );
            tx.from_base_id = Some(from_base_id);
            tx.to_base_id = Some(to_base_id);
            tx.transfer_id = Some(transfer_id);
            tx
        };
        (
            stamp(TransactionType::TransferOut, from_base_id),
            stamp(TransactionType::TransferIn, to_base_id),
        )
    }

    pub fn assignment(
        key: BalanceKey,
        quantity: i64,
        assignee: AssigneeSnapshot,
        created_by: UserId,
        transaction_date: DateTime<Utc>,
    ) -> Self {
        let mut tx = Self::bare(TransactionType::Assignment, key, quantity, created_by, transaction_date);
        tx.assigned_to = Some(assignee);
        tx
    }

    pub fn returned(
        key: BalanceKey,
        quantity: i64,
        assignee: AssigneeSnapshot,
        created_by: UserId,
        transaction_date: DateTime<Utc>,
    ) -> Self {
        let mut tx = Self::bare(TransactionType::Return, key, quantity, created_by, transaction_date);
        tx.assigned_to = Some(assignee);
        tx
    }

    pub fn expenditure(
        key: BalanceKey,
        quantity: i64,
        created_by: UserId,
        transaction_date: DateTime<Utc>,
    ) -> Self {
        Self::bare(TransactionType::Expenditure, key, quantity, created_by, transaction_date)
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_remarks(mut self, remarks: Option<String>) -> Self {
        self.remarks = remarks;
        self
    }

    pub fn with_purchase_order(mut self, purchase_order_number: Option<String>) -> Self {
        self.purchase_order_number = purchase_order_number;
        self
    }

    pub fn with_invoice(mut self, invoice_number: Option<String>) -> Self {
        self.invoice_number = invoice_number;
        self
    }

    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.asset_id, self.base_id)
    }

    /// Effect on the row's own record.
    pub fn effect(&self) -> Delta {
        self.transaction_type.effect(self.quantity)
    }

    /// Structural validation of a row about to be appended.
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity <= 0 {
            return Err(DomainError::validation(format!(
                "quantity must be greater than zero (got {})",
                self.quantity
            )));
        }

        match self.transaction_type {
            TransactionType::Purchase => {
                let vendor = self
                    .vendor
                    .as_ref()
                    .ok_or_else(|| DomainError::validation("vendor is required for purchases"))?;
                if vendor.name.trim().is_empty() {
                    return Err(DomainError::validation("vendor name is required"));
                }
                let unit_price = self
                    .unit_price
                    .ok_or_else(|| DomainError::validation("unit price is required for purchases"))?;
                if unit_price > MAX_MONEY || self.total_value.is_some_and(|v| v > MAX_MONEY) {
                    return Err(DomainError::validation(format!(
                        "unit price and total value must not exceed {MAX_MONEY}"
                    )));
                }
                let expected = (self.quantity as u64).checked_mul(unit_price);
                if expected.is_none() || self.total_value != expected {
                    return Err(DomainError::validation(
                        "total value must equal quantity × unit price",
                    ));
                }
            }
            TransactionType::TransferIn | TransactionType::TransferOut => {
                let (from, to) = match (self.from_base_id, self.to_base_id) {
                    (Some(from), Some(to)) => (from, to),
                    _ => {
                        return Err(DomainError::validation(
                            "transfers require both fromBaseId and toBaseId",
                        ));
                    }
                };
                if from == to {
                    return Err(DomainError::validation(
                        "cannot transfer to the same base",
                    ));
                }
                if self.transfer_id.is_none() {
                    return Err(DomainError::validation("transfer rows require a transferId"));
                }
                let own = if self.transaction_type == TransactionType::TransferOut {
                    from
                } else {
                    to
                };
                if own != self.base_id {
                    return Err(DomainError::validation(format!(
                        "{} row must be recorded at base {own}",
                        self.transaction_type
                    )));
                }
            }
            TransactionType::Assignment | TransactionType::Return => {
                self.assigned_to
                    .as_ref()
                    .ok_or_else(|| DomainError::validation("assignee details are required"))?
                    .validate()?;
            }
            TransactionType::Expenditure => {}
        }

        Ok(())
    }
}

/// A committed, immutable ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    /// Commit order across the whole ledger.
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub entry: NewTransaction,
}

impl Transaction {
    pub fn committed(
        id: TransactionId,
        sequence: u64,
        recorded_at: DateTime<Utc>,
        entry: NewTransaction,
    ) -> Self {
        Self {
            id,
            sequence,
            recorded_at,
            entry,
        }
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.entry.transaction_type
    }

    pub fn key(&self) -> BalanceKey {
        self.entry.key()
    }

    pub fn quantity(&self) -> i64 {
        self.entry.quantity
    }

    pub fn is_completed(&self) -> bool {
        self.entry.status == TransactionStatus::Completed
    }
}

impl Entity for Transaction {
    type Id = TransactionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> BalanceKey {
        BalanceKey::new(AssetId::new(), BaseId::new())
    }

    #[test]
    fn effects_follow_signed_table() {
        assert_eq!(TransactionType::Purchase.effect(5), Delta::new(BalanceField::Current, 5));
        assert_eq!(TransactionType::TransferOut.effect(5), Delta::new(BalanceField::Current, -5));
        assert_eq!(TransactionType::TransferIn.effect(5), Delta::new(BalanceField::Current, 5));
        assert_eq!(TransactionType::Assignment.effect(5), Delta::new(BalanceField::Assigned, 5));
        assert_eq!(TransactionType::Return.effect(5), Delta::new(BalanceField::Assigned, -5));
        assert_eq!(TransactionType::Expenditure.effect(5), Delta::new(BalanceField::Expended, 5));
    }

    #[test]
    fn purchase_computes_total_value() {
        let tx = NewTransaction::purchase(key(), 4, 2_500, Vendor::new("Acme"), UserId::new(), Utc::now())
            .unwrap();
        assert_eq!(tx.total_value, Some(10_000));
        assert!(tx.validate().is_ok());
    }

    #[test]
    fn purchase_total_overflow_is_a_validation_error() {
        let err = NewTransaction::purchase(key(), i64::MAX, u64::MAX, Vendor::new("Acme"), UserId::new(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn money_above_signed_range_is_rejected() {
        let actor = UserId::new();
        let err = NewTransaction::purchase(key(), 1, MAX_MONEY + 1, Vendor::new("Acme"), actor, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = NewTransaction::purchase(key(), 2, MAX_MONEY / 2 + 1, Vendor::new("Acme"), actor, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let at_limit = NewTransaction::purchase(key(), 1, MAX_MONEY, Vendor::new("Acme"), actor, Utc::now())
            .unwrap();
        assert_eq!(at_limit.total_value, Some(MAX_MONEY));
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn validate_rejects_hand_built_oversized_money() {
        let mut tx = NewTransaction::purchase(key(), 1, 1, Vendor::new("Acme"), UserId::new(), Utc::now())
            .unwrap();
        tx.unit_price = Some(u64::MAX);
        tx.total_value = Some(u64::MAX);
        assert!(matches!(tx.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let tx = NewTransaction::expenditure(key(), 0, UserId::new(), Utc::now());
        assert!(matches!(tx.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn purchase_requires_vendor_name() {
        let tx = NewTransaction::purchase(key(), 1, 1, Vendor::new("  "), UserId::new(), Utc::now())
            .unwrap();
        assert!(tx.validate().is_err());
    }

    #[test]
    fn transfer_pair_shares_pairing_key() {
        let asset = AssetId::new();
        let (from, to) = (BaseId::new(), BaseId::new());
        let (out, inbound) = NewTransaction::transfer_pair(asset, from, to, 40, UserId::new(), Utc::now());

        assert_eq!(out.transaction_type, TransactionType::TransferOut);
        assert_eq!(out.base_id, from);
        assert_eq!(inbound.base_id, to);
        assert_eq!(out.transfer_id, inbound.transfer_id);
        assert!(out.validate().is_ok());
        assert!(inbound.validate().is_ok());
    }

    #[test]
    fn transfer_to_same_base_is_rejected() {
        let base = BaseId::new();
        let (out, _) = NewTransaction::transfer_pair(AssetId::new(), base, base, 1, UserId::new(), Utc::now());
        assert!(out.validate().is_err());
    }

    #[test]
    fn assignment_requires_name_and_rank() {
        let tx = NewTransaction::assignment(key(), 1, AssigneeSnapshot::new("Doe", ""), UserId::new(), Utc::now());
        assert!(tx.validate().is_err());

        let tx = NewTransaction::assignment(key(), 1, AssigneeSnapshot::new("Doe", "Sgt"), UserId::new(), Utc::now());
        assert!(tx.validate().is_ok());
    }

    #[test]
    fn committed_row_serializes_type_field() {
        let entry = NewTransaction::expenditure(key(), 3, UserId::new(), Utc::now());
        let tx = Transaction::committed(TransactionId::new(), 7, Utc::now(), entry);
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "expenditure");
        assert_eq!(json["sequence"], 7);
        assert_eq!(json["status"], "completed");
    }

    #[test]
    fn type_parses_from_wire_name() {
        assert_eq!("transfer_in".parse::<TransactionType>().unwrap(), TransactionType::TransferIn);
        assert!("refund".parse::<TransactionType>().is_err());
    }
}
