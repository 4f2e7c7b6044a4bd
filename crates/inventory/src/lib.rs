//! Inventory ledger domain.
//!
//! Balance records, ledger rows, the signed effect of each movement kind and
//! the pure replay of a ledger over opening baselines. Deterministic domain
//! logic only (no IO, no HTTP, no storage).

pub mod event;
pub mod record;
pub mod replay;
pub mod transaction;

pub use event::{
    InventoryEvent, LowStockDetected, MovementRecorded, OpeningBalanceEstablished,
    TransferRecorded,
};
pub use record::{BalanceCounters, BalanceField, BalanceKey, Delta, InventoryRecord};
pub use replay::{Replay, replay};
pub use transaction::{
    AssigneeSnapshot, MAX_MONEY, NewTransaction, Transaction, TransactionStatus, TransactionType,
    Vendor,
};
