use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use garrison_core::{AssetId, BaseId, TransactionId, UserId};
use garrison_events::Event;

use crate::record::InventoryRecord;
use crate::transaction::{Transaction, TransactionType};

/// Event payload for a single-row movement (purchase, assignment, expenditure, return).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecorded {
    pub transaction_id: TransactionId,
    pub asset_id: AssetId,
    pub base_id: BaseId,
    pub quantity: i64,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl MovementRecorded {
    fn from_transaction(tx: &Transaction) -> Self {
        Self {
            transaction_id: tx.id,
            asset_id: tx.entry.asset_id,
            base_id: tx.entry.base_id,
            quantity: tx.entry.quantity,
            actor_id: tx.entry.created_by,
            occurred_at: tx.entry.transaction_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecorded {
    pub transfer_id: Uuid,
    pub out_transaction_id: TransactionId,
    pub in_transaction_id: TransactionId,
    pub asset_id: AssetId,
    pub from_base_id: BaseId,
    pub to_base_id: BaseId,
    pub quantity: i64,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningBalanceEstablished {
    pub asset_id: AssetId,
    pub base_id: BaseId,
    pub quantity: i64,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Available stock fell under the asset's minimum stock level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockDetected {
    pub asset_id: AssetId,
    pub base_id: BaseId,
    pub available: i64,
    pub minimum_stock_level: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum InventoryEvent {
    PurchaseRecorded(MovementRecorded),
    TransferRecorded(TransferRecorded),
    AssignmentRecorded(MovementRecorded),
    ExpenditureRecorded(MovementRecorded),
    ReturnRecorded(MovementRecorded),
    OpeningBalanceEstablished(OpeningBalanceEstablished),
    LowStockDetected(LowStockDetected),
}

impl InventoryEvent {
    /// Event for a committed single-row movement. Transfer rows are published
    /// as a pair through [`InventoryEvent::transfer`].
    pub fn movement(tx: &Transaction) -> Option<Self> {
        let payload = MovementRecorded::from_transaction(tx);
        match tx.transaction_type() {
            TransactionType::Purchase => Some(InventoryEvent::PurchaseRecorded(payload)),
            TransactionType::Assignment => Some(InventoryEvent::AssignmentRecorded(payload)),
            TransactionType::Expenditure => Some(InventoryEvent::ExpenditureRecorded(payload)),
            TransactionType::Return => Some(InventoryEvent::ReturnRecorded(payload)),
            TransactionType::TransferIn | TransactionType::TransferOut => None,
        }
    }

    pub fn transfer(out: &Transaction, inbound: &Transaction) -> Option<Self> {
        Some(InventoryEvent::TransferRecorded(TransferRecorded {
            transfer_id: out.entry.transfer_id?,
            out_transaction_id: out.id,
            in_transaction_id: inbound.id,
            asset_id: out.entry.asset_id,
            from_base_id: out.entry.base_id,
            to_base_id: inbound.entry.base_id,
            quantity: out.entry.quantity,
            actor_id: out.entry.created_by,
            occurred_at: out.entry.transaction_date,
        }))
    }

    pub fn opening_balance(record: &InventoryRecord, actor_id: UserId) -> Self {
        InventoryEvent::OpeningBalanceEstablished(OpeningBalanceEstablished {
            asset_id: record.asset_id(),
            base_id: record.base_id(),
            quantity: record.opening_balance(),
            actor_id,
            occurred_at: record.last_updated,
        })
    }

    pub fn low_stock(record: &InventoryRecord, minimum_stock_level: i64) -> Self {
        InventoryEvent::LowStockDetected(LowStockDetected {
            asset_id: record.asset_id(),
            base_id: record.base_id(),
            available: record.available(),
            minimum_stock_level,
            occurred_at: record.last_updated,
        })
    }

    /// Base the event is primarily about (source base for transfers).
    pub fn base_id(&self) -> BaseId {
        match self {
            InventoryEvent::PurchaseRecorded(e)
            | InventoryEvent::AssignmentRecorded(e)
            | InventoryEvent::ExpenditureRecorded(e)
            | InventoryEvent::ReturnRecorded(e) => e.base_id,
            InventoryEvent::TransferRecorded(e) => e.from_base_id,
            InventoryEvent::OpeningBalanceEstablished(e) => e.base_id,
            InventoryEvent::LowStockDetected(e) => e.base_id,
        }
    }

    /// Human-readable one-liner for audit/notification consumers.
    pub fn summary(&self) -> String {
        match self {
            InventoryEvent::PurchaseRecorded(e) => {
                format!("purchased {} of asset {} at base {}", e.quantity, e.asset_id, e.base_id)
            }
            InventoryEvent::TransferRecorded(e) => format!(
                "transferred {} of asset {} from base {} to base {}",
                e.quantity, e.asset_id, e.from_base_id, e.to_base_id
            ),
            InventoryEvent::AssignmentRecorded(e) => {
                format!("assigned {} of asset {} at base {}", e.quantity, e.asset_id, e.base_id)
            }
            InventoryEvent::ExpenditureRecorded(e) => {
                format!("expended {} of asset {} at base {}", e.quantity, e.asset_id, e.base_id)
            }
            InventoryEvent::ReturnRecorded(e) => {
                format!("returned {} of asset {} at base {}", e.quantity, e.asset_id, e.base_id)
            }
            InventoryEvent::OpeningBalanceEstablished(e) => format!(
                "opening balance {} for asset {} at base {}",
                e.quantity, e.asset_id, e.base_id
            ),
            InventoryEvent::LowStockDetected(e) => format!(
                "asset {} at base {} is low on stock ({} available, minimum {})",
                e.asset_id, e.base_id, e.available, e.minimum_stock_level
            ),
        }
    }
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::PurchaseRecorded(_) => "inventory.purchase_recorded",
            InventoryEvent::TransferRecorded(_) => "inventory.transfer_recorded",
            InventoryEvent::AssignmentRecorded(_) => "inventory.assignment_recorded",
            InventoryEvent::ExpenditureRecorded(_) => "inventory.expenditure_recorded",
            InventoryEvent::ReturnRecorded(_) => "inventory.return_recorded",
            InventoryEvent::OpeningBalanceEstablished(_) => "inventory.opening_balance_established",
            InventoryEvent::LowStockDetected(_) => "inventory.low_stock",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::PurchaseRecorded(e)
            | InventoryEvent::AssignmentRecorded(e)
            | InventoryEvent::ExpenditureRecorded(e)
            | InventoryEvent::ReturnRecorded(e) => e.occurred_at,
            InventoryEvent::TransferRecorded(e) => e.occurred_at,
            InventoryEvent::OpeningBalanceEstablished(e) => e.occurred_at,
            InventoryEvent::LowStockDetected(e) => e.occurred_at,
        }
    }
}
