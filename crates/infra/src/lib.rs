//! Infrastructure layer: storage backends, the transaction engine, reporting
//! and reconciliation.

pub mod config;
pub mod engine;
pub mod error;
pub mod reconcile;
pub mod reporting;
pub mod scope;
pub mod store;

pub use config::EngineConfig;
pub use engine::{
    AssignmentRequest, ExpenditureRequest, InventoryEnvelope, OpeningBalanceRequest,
    PurchaseRequest, Receipt, ReturnRequest, TransactionEngine, TransactionQuery, TransferReceipt,
    TransferRequest,
};
pub use error::EngineError;
pub use reconcile::{Drift, DriftReport, Reconciler, RepairReport};
pub use reporting::{
    AssetDistribution, CategoryBalance, DashboardMetrics, InventoryReports, LowStockEntry,
    MovementQuery,
};
pub use scope::{resolve_scope, ResolvedScope, ScopeRequest};
