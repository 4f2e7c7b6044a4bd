//! Ledger + balance storage boundary.
//!
//! One trait family ([`InventoryStore`]) with an in-memory backend for tests/dev
//! and a Postgres backend. Both share [`plan::plan_commit`] so they accept and
//! reject exactly the same batches.

pub mod in_memory;
pub mod pages;
pub(crate) mod plan;
pub mod postgres;
pub mod postgres_catalog;
pub mod r#trait;

pub use in_memory::InMemoryInventoryStore;
pub use pages::{collect_all, TransactionPages};
pub use postgres::PostgresInventoryStore;
pub use postgres_catalog::PostgresCatalog;
pub use r#trait::{
    BalanceStore, CommitBatch, Committed, GroupKey, GroupSummary, GroupValue, InventoryStore,
    LedgerCut,
    Page, RecordFilter, SortOrder, StoreError, TransactionFilter, TransactionLedger,
    TransactionPage,
};
