//! Response bodies. Request bodies are the engine's request types, deserialized
//! directly from camelCase JSON.

use serde::Serialize;

use garrison_infra::store::TransactionPage;
use garrison_infra::{Receipt, TransferReceipt};
use garrison_inventory::{InventoryRecord, Transaction};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionCreated {
    pub message: &'static str,
    pub transaction: Transaction,
    pub record: InventoryRecord,
}

impl TransactionCreated {
    pub fn new(message: &'static str, receipt: Receipt) -> Self {
        Self {
            message,
            transaction: receipt.transaction,
            record: receipt.record,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferCreated {
    pub message: &'static str,
    #[serde(flatten)]
    pub receipt: TransferReceipt,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub pages: u64,
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct TransactionList {
    pub transactions: Vec<Transaction>,
    pub pagination: Pagination,
}

impl From<TransactionPage> for TransactionList {
    fn from(page: TransactionPage) -> Self {
        let pagination = Pagination {
            page: page.page,
            limit: page.limit,
            pages: page.total_pages(),
            total: page.total,
        };
        Self {
            transactions: page.items,
            pagination,
        }
    }
}
