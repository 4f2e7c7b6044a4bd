//! Read-only reporting over balance records and the ledger.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::instrument;

use garrison_catalog::{AssetCategory, CatalogStore};
use garrison_core::{AssetId, BaseAccess, BaseId};
use garrison_inventory::{InventoryRecord, Transaction, TransactionStatus, TransactionType};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::scope::{resolve_scope, ScopeRequest};
use crate::store::{
    GroupKey, GroupSummary, GroupValue, InventoryStore, Page, RecordFilter, SortOrder,
    TransactionPage,
};

const RECENT_TRANSACTIONS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBalance {
    pub category: AssetCategory,
    pub current_balance: i64,
    pub assigned_quantity: i64,
    pub expended_quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub opening_balance: i64,
    pub closing_balance: i64,
    pub net_movement: i64,
    pub assigned: i64,
    pub expended: i64,
    pub purchases: i64,
    pub transfers_in: i64,
    pub transfers_out: i64,
    pub transaction_summary: Vec<GroupSummary>,
    pub recent_transactions: Vec<Transaction>,
    pub category_breakdown: Vec<CategoryBalance>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementQuery {
    #[serde(default)]
    pub base_id: Option<BaseId>,
    #[serde(default, rename = "type")]
    pub transaction_type: Option<TransactionType>,
    #[serde(default)]
    pub start_date: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub end_date: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDistribution {
    pub asset_id: AssetId,
    pub bases: Vec<InventoryRecord>,
    pub total_current: i64,
    pub total_assigned: i64,
    pub total_expended: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LowStockEntry {
    pub record: InventoryRecord,
    pub asset_name: String,
    pub available: i64,
    pub minimum_stock_level: i64,
}

pub struct InventoryReports<S, C> {
    store: S,
    catalog: C,
    config: EngineConfig,
}

impl<S, C> InventoryReports<S, C>
where
    S: InventoryStore,
    C: CatalogStore,
{
    pub fn new(store: S, catalog: C, config: EngineConfig) -> Self {
        Self {
            store,
            catalog,
            config,
        }
    }

    /// Record totals (current state) plus completed movement totals within
    /// the requested date range.
    #[instrument(skip(self, principal), fields(actor = %principal.actor_id()), err)]
    pub fn dashboard_metrics<P>(&self, principal: &P, request: &ScopeRequest) -> Result<DashboardMetrics, EngineError>
    where
        P: BaseAccess + ?Sized,
    {
        let scope = resolve_scope(principal, &self.catalog, request)?;
        let records = self.store.snapshot(&scope.record_filter())?;

        let mut metrics = DashboardMetrics {
            opening_balance: checked_total("opening balance", records.iter().map(|r| r.opening_balance()))?,
            closing_balance: checked_total("closing balance", records.iter().map(|r| r.current_balance()))?,
            net_movement: 0,
            assigned: checked_total("assigned", records.iter().map(|r| r.assigned_quantity()))?,
            expended: checked_total("expended", records.iter().map(|r| r.expended_quantity()))?,
            purchases: 0,
            transfers_in: 0,
            transfers_out: 0,
            transaction_summary: Vec::new(),
            recent_transactions: Vec::new(),
            category_breakdown: Vec::new(),
        };

        let mut completed = scope.transaction_filter();
        completed.status = Some(TransactionStatus::Completed);
        let summary = self.store.aggregate(GroupKey::Type, &completed)?;
        let total_of = |t: TransactionType| {
            summary
                .iter()
                .find(|g| g.group == GroupValue::Type(t))
                .map(|g| g.total_quantity)
                .unwrap_or(0)
        };
        metrics.purchases = total_of(TransactionType::Purchase);
        metrics.transfers_in = total_of(TransactionType::TransferIn);
        metrics.transfers_out = total_of(TransactionType::TransferOut);
        metrics.net_movement = metrics
            .purchases
            .checked_add(metrics.transfers_in)
            .and_then(|v| v.checked_sub(metrics.transfers_out))
            .ok_or_else(|| overflow("net movement"))?;
        metrics.transaction_summary = summary;

        metrics.recent_transactions = self
            .store
            .find(
                &scope.transaction_filter(),
                Page::first(RECENT_TRANSACTIONS),
                SortOrder::SequenceDesc,
            )?
            .items;

        // Breakdown ignores the category filter: it is the per-category view.
        let all_categories = self.store.snapshot(&RecordFilter {
            base: scope.base.clone(),
            asset_ids: None,
        })?;
        metrics.category_breakdown = self.category_breakdown(&all_categories)?;

        Ok(metrics)
    }

    /// Completed rows in scope, newest business date first.
    #[instrument(skip(self, principal), fields(actor = %principal.actor_id()), err)]
    pub fn movement_details<P>(&self, principal: &P, query: &MovementQuery) -> Result<TransactionPage, EngineError>
    where
        P: BaseAccess + ?Sized,
    {
        let scope = resolve_scope(
            principal,
            &self.catalog,
            &ScopeRequest {
                base_id: query.base_id,
                start_date: query.start_date,
                end_date: query.end_date,
                ..ScopeRequest::default()
            },
        )?;
        let mut filter = scope.transaction_filter();
        filter.status = Some(TransactionStatus::Completed);
        filter.transaction_type = query.transaction_type;

        let page = Page::new(
            query.page,
            query.limit,
            self.config.default_page_size,
            self.config.max_page_size,
        );
        Ok(self.store.find(&filter, page, SortOrder::TransactionDateDesc)?)
    }

    /// Per-base balances of one asset within the caller's scope.
    pub fn asset_distribution<P>(&self, principal: &P, asset_id: AssetId) -> Result<AssetDistribution, EngineError>
    where
        P: BaseAccess + ?Sized,
    {
        let scope = resolve_scope(
            principal,
            &self.catalog,
            &ScopeRequest {
                asset_id: Some(asset_id),
                ..ScopeRequest::default()
            },
        )?;
        let bases = self.store.snapshot(&scope.record_filter())?;
        Ok(AssetDistribution {
            asset_id,
            total_current: checked_total("current balance", bases.iter().map(|r| r.current_balance()))?,
            total_assigned: checked_total("assigned", bases.iter().map(|r| r.assigned_quantity()))?,
            total_expended: checked_total("expended", bases.iter().map(|r| r.expended_quantity()))?,
            bases,
        })
    }

    /// Records whose available quantity is under the asset's minimum level.
    #[instrument(skip(self, principal), fields(actor = %principal.actor_id()), err)]
    pub fn low_stock<P>(&self, principal: &P, request: &ScopeRequest) -> Result<Vec<LowStockEntry>, EngineError>
    where
        P: BaseAccess + ?Sized,
    {
        let scope = resolve_scope(principal, &self.catalog, request)?;
        let records = self.store.list(&scope.record_filter())?;
        let assets: HashMap<AssetId, _> = self
            .catalog
            .list_assets()?
            .into_iter()
            .map(|a| (a.id, a))
            .collect();

        Ok(records
            .into_iter()
            .filter_map(|record| {
                let asset = assets.get(&record.asset_id())?;
                asset.is_below_minimum(record.available()).then(|| LowStockEntry {
                    asset_name: asset.name.clone(),
                    available: record.available(),
                    minimum_stock_level: asset.minimum_stock_level,
                    record,
                })
            })
            .collect())
    }

    fn category_breakdown(&self, records: &[InventoryRecord]) -> Result<Vec<CategoryBalance>, EngineError> {
        let categories: HashMap<AssetId, AssetCategory> = self
            .catalog
            .list_assets()?
            .into_iter()
            .map(|a| (a.id, a.category))
            .collect();

        let mut out: BTreeMap<AssetCategory, CategoryBalance> = BTreeMap::new();
        for record in records {
            let Some(category) = categories.get(&record.asset_id()) else {
                continue;
            };
            let entry = out.entry(*category).or_insert(CategoryBalance {
                category: *category,
                current_balance: 0,
                assigned_quantity: 0,
                expended_quantity: 0,
            });
            entry.current_balance = checked_total("current balance", [entry.current_balance, record.current_balance()])?;
            entry.assigned_quantity = checked_total("assigned", [entry.assigned_quantity, record.assigned_quantity()])?;
            entry.expended_quantity = checked_total("expended", [entry.expended_quantity, record.expended_quantity()])?;
        }
        Ok(out.into_values().collect())
    }
}

fn overflow(what: &str) -> EngineError {
    EngineError::validation(format!("{what} total overflows"))
}

fn checked_total(what: &str, values: impl IntoIterator<Item = i64>) -> Result<i64, EngineError> {
    values
        .into_iter()
        .try_fold(0i64, i64::checked_add)
        .ok_or_else(|| overflow(what))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_add_up() {
        assert_eq!(checked_total("current", [3, 4, -2]).unwrap(), 5);
        assert_eq!(checked_total("current", []).unwrap(), 0);
    }

    #[test]
    fn overflowing_total_is_a_validation_error() {
        let err = checked_total("current balance", [i64::MAX, 1]).unwrap_err();
        assert_eq!(err.code(), "validation_error");
        assert!(err.to_string().contains("current balance"));
    }
}
