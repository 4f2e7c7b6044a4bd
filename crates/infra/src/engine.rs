//! Transaction engine: the only writer of the ledger and the balance records.
//!
//! Every call runs validate → authorize → catalog lookup → commit. The commit
//! re-reads the touched records, re-checks availability against them and pins
//! their versions; a version conflict or a transient store failure restarts
//! that step, up to `max_commit_attempts`.

use std::thread;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use garrison_catalog::{Asset, AssetCategory, CatalogStore};
use garrison_core::{AssetId, BaseAccess, BaseId, ExpectedVersion};
use garrison_events::{EventBus, EventEnvelope};
use garrison_inventory::{
    AssigneeSnapshot, BalanceKey, InventoryEvent, InventoryRecord, NewTransaction, Transaction,
    TransactionType, Vendor,
};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::scope::{resolve_scope, ScopeRequest};
use crate::store::{CommitBatch, Committed, InventoryStore, Page, SortOrder, StoreError, TransactionPage};

pub type InventoryEnvelope = EventEnvelope<InventoryEvent>;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub asset_id: AssetId,
    pub base_id: BaseId,
    pub quantity: i64,
    /// Minor currency units.
    pub unit_price: u64,
    pub vendor: Vendor,
    #[serde(default)]
    pub purchase_order_number: Option<String>,
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub transaction_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub asset_id: AssetId,
    pub from_base_id: BaseId,
    pub to_base_id: BaseId,
    pub quantity: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub transaction_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRequest {
    pub asset_id: AssetId,
    pub base_id: BaseId,
    pub quantity: i64,
    pub assigned_to: AssigneeSnapshot,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub transaction_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenditureRequest {
    pub asset_id: AssetId,
    pub base_id: BaseId,
    pub quantity: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub transaction_date: Option<DateTime<Utc>>,
}

/// Stock coming back from the person it was assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRequest {
    pub asset_id: AssetId,
    pub base_id: BaseId,
    pub quantity: i64,
    pub returned_by: AssigneeSnapshot,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub transaction_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpeningBalanceRequest {
    pub asset_id: AssetId,
    pub base_id: BaseId,
    pub quantity: i64,
}

/// Filters + paging of `list_transactions`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionQuery {
    #[serde(default)]
    pub base_id: Option<BaseId>,
    #[serde(default)]
    pub asset_id: Option<AssetId>,
    #[serde(default, rename = "type")]
    pub transaction_type: Option<TransactionType>,
    #[serde(default)]
    pub asset_category: Option<AssetCategory>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl TransactionQuery {
    pub fn scope(&self) -> ScopeRequest {
        ScopeRequest {
            base_id: self.base_id,
            asset_id: self.asset_id,
            asset_category: self.asset_category,
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }
}

/// A committed single-row movement and the record it left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction: Transaction,
    pub record: InventoryRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub transfer_out: Transaction,
    pub transfer_in: Transaction,
    pub source: InventoryRecord,
    pub destination: InventoryRecord,
}

/// Availability a commit depends on, re-checked against freshly read records
/// on every attempt.
#[derive(Debug, Clone, Copy)]
enum Requirement {
    /// `current >= quantity` (transfer source).
    OnHand(BalanceKey, i64),
    /// `current - assigned >= quantity` (assignment).
    Unassigned(BalanceKey, i64),
    /// `assigned >= quantity` (return).
    Assigned(BalanceKey, i64),
}

impl Requirement {
    fn key(&self) -> BalanceKey {
        match self {
            Requirement::OnHand(k, _) | Requirement::Unassigned(k, _) | Requirement::Assigned(k, _) => *k,
        }
    }

    fn check(&self, record: Option<&InventoryRecord>) -> Result<(), EngineError> {
        let (requested, available) = match self {
            Requirement::OnHand(_, q) => (*q, record.map(|r| r.current_balance()).unwrap_or(0)),
            Requirement::Unassigned(_, q) => (*q, record.map(|r| r.available()).unwrap_or(0)),
            Requirement::Assigned(_, q) => (*q, record.map(|r| r.assigned_quantity()).unwrap_or(0)),
        };
        if available < requested {
            return Err(EngineError::InsufficientStock {
                requested,
                available,
            });
        }
        Ok(())
    }
}

enum AttemptError {
    Retryable(StoreError),
    Rejected(EngineError),
}

impl From<StoreError> for AttemptError {
    fn from(value: StoreError) -> Self {
        if value.is_retryable() {
            AttemptError::Retryable(value)
        } else {
            AttemptError::Rejected(value.into())
        }
    }
}

impl From<EngineError> for AttemptError {
    fn from(value: EngineError) -> Self {
        AttemptError::Rejected(value)
    }
}

pub struct TransactionEngine<S, C, B> {
    store: S,
    catalog: C,
    bus: B,
    config: EngineConfig,
}

impl<S, C, B> TransactionEngine<S, C, B>
where
    S: InventoryStore,
    C: CatalogStore,
    B: EventBus<InventoryEnvelope>,
{
    pub fn new(store: S, catalog: C, bus: B) -> Self {
        Self::with_config(store, catalog, bus, EngineConfig::default())
    }

    pub fn with_config(store: S, catalog: C, bus: B, config: EngineConfig) -> Self {
        Self {
            store,
            catalog,
            bus,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[instrument(
        skip(self, principal, request),
        fields(actor = %principal.actor_id(), asset_id = %request.asset_id, base_id = %request.base_id, quantity = request.quantity),
        err
    )]
    pub fn record_purchase<P>(&self, principal: &P, request: PurchaseRequest) -> Result<Receipt, EngineError>
    where
        P: BaseAccess + ?Sized,
    {
        let key = BalanceKey::new(request.asset_id, request.base_id);
        let row = NewTransaction::purchase(
            key,
            request.quantity,
            request.unit_price,
            request.vendor,
            principal.actor_id(),
            request.transaction_date.unwrap_or_else(Utc::now),
        )?
        .with_purchase_order(request.purchase_order_number)
        .with_invoice(request.invoice_number)
        .with_description(request.description)
        .with_remarks(request.remarks);
        row.validate()?;

        self.authorize(principal, request.base_id)?;
        let asset = self.active_asset(request.asset_id)?;
        self.known_base(request.base_id)?;

        let committed = self.commit_with_retry(vec![row], None)?;
        self.single_receipt(committed, &asset)
    }

    #[instrument(
        skip(self, principal, request),
        fields(
            actor = %principal.actor_id(),
            asset_id = %request.asset_id,
            from_base_id = %request.from_base_id,
            to_base_id = %request.to_base_id,
            quantity = request.quantity
        ),
        err
    )]
    pub fn record_transfer<P>(&self, principal: &P, request: TransferRequest) -> Result<TransferReceipt, EngineError>
    where
        P: BaseAccess + ?Sized,
    {
        let (out, inbound) = NewTransaction::transfer_pair(
            request.asset_id,
            request.from_base_id,
            request.to_base_id,
            request.quantity,
            principal.actor_id(),
            request.transaction_date.unwrap_or_else(Utc::now),
        );
        let out = out
            .with_description(request.description.clone())
            .with_remarks(request.remarks.clone());
        let inbound = inbound
            .with_description(request.description)
            .with_remarks(request.remarks);
        out.validate()?;
        inbound.validate()?;

        self.authorize(principal, request.from_base_id)?;
        let asset = self.active_asset(request.asset_id)?;
        self.known_base(request.from_base_id)?;
        self.known_base(request.to_base_id)?;

        let source_key = out.key();
        let destination_key = inbound.key();
        let committed = self.commit_with_retry(
            vec![out, inbound],
            Some(Requirement::OnHand(source_key, request.quantity)),
        )?;

        let (transfer_out, transfer_in) = match committed.transactions.as_slice() {
            [a, b] => (a.clone(), b.clone()),
            _ => {
                return Err(EngineError::InvariantViolation(
                    "transfer commit did not produce exactly two rows".to_string(),
                ));
            }
        };
        let source = committed_record(&committed, &source_key)?;
        let destination = committed_record(&committed, &destination_key)?;

        if let Some(event) = InventoryEvent::transfer(&transfer_out, &transfer_in) {
            let transfer_id = transfer_out.entry.transfer_id.unwrap_or_else(|| *transfer_out.id.as_uuid());
            self.publish(principal.actor_id(), "inventory_transfer", transfer_id, transfer_in.sequence, event);
        }
        self.check_low_stock(&asset, &committed);

        Ok(TransferReceipt {
            transfer_out,
            transfer_in,
            source,
            destination,
        })
    }

    #[instrument(
        skip(self, principal, request),
        fields(actor = %principal.actor_id(), asset_id = %request.asset_id, base_id = %request.base_id, quantity = request.quantity),
        err
    )]
    pub fn record_assignment<P>(&self, principal: &P, request: AssignmentRequest) -> Result<Receipt, EngineError>
    where
        P: BaseAccess + ?Sized,
    {
        let key = BalanceKey::new(request.asset_id, request.base_id);
        let row = NewTransaction::assignment(
            key,
            request.quantity,
            request.assigned_to,
            principal.actor_id(),
            request.transaction_date.unwrap_or_else(Utc::now),
        )
        .with_description(request.description)
        .with_remarks(request.remarks);
        row.validate()?;

        self.authorize(principal, request.base_id)?;
        let asset = self.active_asset(request.asset_id)?;
        self.known_base(request.base_id)?;

        let committed = self.commit_with_retry(vec![row], Some(Requirement::Unassigned(key, request.quantity)))?;
        self.single_receipt(committed, &asset)
    }

    /// Records consumption. Only `expendedQuantity` moves; on-hand stock is
    /// left untouched.
    #[instrument(
        skip(self, principal, request),
        fields(actor = %principal.actor_id(), asset_id = %request.asset_id, base_id = %request.base_id, quantity = request.quantity),
        err
    )]
    pub fn record_expenditure<P>(&self, principal: &P, request: ExpenditureRequest) -> Result<Receipt, EngineError>
    where
        P: BaseAccess + ?Sized,
    {
        let key = BalanceKey::new(request.asset_id, request.base_id);
        let row = NewTransaction::expenditure(
            key,
            request.quantity,
            principal.actor_id(),
            request.transaction_date.unwrap_or_else(Utc::now),
        )
        .with_description(request.description)
        .with_remarks(request.remarks);
        row.validate()?;

        self.authorize(principal, request.base_id)?;
        let asset = self.active_asset(request.asset_id)?;
        self.known_base(request.base_id)?;

        let committed = self.commit_with_retry(vec![row], None)?;
        self.single_receipt(committed, &asset)
    }

    #[instrument(
        skip(self, principal, request),
        fields(actor = %principal.actor_id(), asset_id = %request.asset_id, base_id = %request.base_id, quantity = request.quantity),
        err
    )]
    pub fn record_return<P>(&self, principal: &P, request: ReturnRequest) -> Result<Receipt, EngineError>
    where
        P: BaseAccess + ?Sized,
    {
        let key = BalanceKey::new(request.asset_id, request.base_id);
        let row = NewTransaction::returned(
            key,
            request.quantity,
            request.returned_by,
            principal.actor_id(),
            request.transaction_date.unwrap_or_else(Utc::now),
        )
        .with_description(request.description)
        .with_remarks(request.remarks);
        row.validate()?;

        self.authorize(principal, request.base_id)?;
        let asset = self.active_asset(request.asset_id)?;
        self.known_base(request.base_id)?;

        let committed = self.commit_with_retry(vec![row], Some(Requirement::Assigned(key, request.quantity)))?;
        self.single_receipt(committed, &asset)
    }

    /// Set the historical baseline of a pair that has never been written.
    #[instrument(
        skip(self, principal, request),
        fields(actor = %principal.actor_id(), asset_id = %request.asset_id, base_id = %request.base_id, quantity = request.quantity),
        err
    )]
    pub fn establish_opening_balance<P>(
        &self,
        principal: &P,
        request: OpeningBalanceRequest,
    ) -> Result<InventoryRecord, EngineError>
    where
        P: BaseAccess + ?Sized,
    {
        let key = BalanceKey::new(request.asset_id, request.base_id);
        let record = InventoryRecord::opening(key, request.quantity, principal.actor_id(), Utc::now())?;

        self.authorize(principal, request.base_id)?;
        self.active_asset(request.asset_id)?;
        self.known_base(request.base_id)?;

        let record = self.store.open_record(record).map_err(|e| match e {
            StoreError::Conflict(_) => EngineError::validation(format!(
                "inventory record {key} already exists; opening balance can only be set once"
            )),
            other => other.into(),
        })?;

        info!(key = %key, opening_balance = record.opening_balance(), "opening balance established");
        self.publish(
            principal.actor_id(),
            "inventory_record",
            *key.asset_id.as_uuid(),
            record.version,
            InventoryEvent::opening_balance(&record, principal.actor_id()),
        );
        Ok(record)
    }

    /// Ledger rows visible to the caller, most recent first.
    #[instrument(skip(self, principal), fields(actor = %principal.actor_id()), err)]
    pub fn list_transactions<P>(&self, principal: &P, query: &TransactionQuery) -> Result<TransactionPage, EngineError>
    where
        P: BaseAccess + ?Sized,
    {
        let scope = resolve_scope(principal, &self.catalog, &query.scope())?;
        let mut filter = scope.transaction_filter();
        filter.transaction_type = query.transaction_type;

        let page = Page::new(
            query.page,
            query.limit,
            self.config.default_page_size,
            self.config.max_page_size,
        );
        Ok(self.store.find(&filter, page, SortOrder::SequenceDesc)?)
    }

    pub fn get_record<P>(&self, principal: &P, asset_id: AssetId, base_id: BaseId) -> Result<InventoryRecord, EngineError>
    where
        P: BaseAccess + ?Sized,
    {
        self.authorize(principal, base_id)?;
        let key = BalanceKey::new(asset_id, base_id);
        self.store
            .get(key)?
            .ok_or_else(|| EngineError::not_found(format!("inventory record {key}")))
    }

    fn authorize<P>(&self, principal: &P, base_id: BaseId) -> Result<(), EngineError>
    where
        P: BaseAccess + ?Sized,
    {
        if principal.may_act_on(base_id) {
            Ok(())
        } else {
            Err(EngineError::access_denied(format!(
                "user {} may not act on base {base_id}",
                principal.actor_id()
            )))
        }
    }

    fn active_asset(&self, asset_id: AssetId) -> Result<Asset, EngineError> {
        let asset = self
            .catalog
            .get_asset(asset_id)?
            .ok_or_else(|| EngineError::not_found(format!("asset {asset_id}")))?;
        asset.ensure_active()?;
        Ok(asset)
    }

    fn known_base(&self, base_id: BaseId) -> Result<(), EngineError> {
        self.catalog
            .get_base(base_id)?
            .map(|_| ())
            .ok_or_else(|| EngineError::not_found(format!("base {base_id}")))
    }

    fn commit_with_retry(
        &self,
        rows: Vec<NewTransaction>,
        requirement: Option<Requirement>,
    ) -> Result<Committed, EngineError> {
        let max_attempts = self.config.max_commit_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.attempt_commit(&rows, requirement) {
                Ok(committed) => {
                    debug!(attempt, "commit succeeded");
                    return Ok(committed);
                }
                Err(AttemptError::Rejected(EngineError::InvariantViolation(msg))) => {
                    error!(error = %msg, "commit rejected by record invariants");
                    return Err(EngineError::InvariantViolation(msg));
                }
                Err(AttemptError::Rejected(err)) => return Err(err),
                Err(AttemptError::Retryable(err)) if attempt < max_attempts => {
                    warn!(attempt, max_attempts, error = %err, "commit attempt failed, retrying");
                    let backoff = self.config.retry_backoff * attempt;
                    if !backoff.is_zero() {
                        thread::sleep(backoff);
                    }
                    attempt += 1;
                }
                Err(AttemptError::Retryable(err)) => {
                    warn!(attempt, error = %err, "giving up on commit");
                    return Err(EngineError::TransactionFailed(format!(
                        "commit failed after {attempt} attempts: {err}"
                    )));
                }
            }
        }
    }

    fn attempt_commit(
        &self,
        rows: &[NewTransaction],
        requirement: Option<Requirement>,
    ) -> Result<Committed, AttemptError> {
        let mut batch = CommitBatch::new(rows.to_vec());
        for key in batch.keys() {
            let observed = self.store.get(key)?;
            if let Some(req) = requirement.filter(|r| r.key() == key) {
                req.check(observed.as_ref())?;
            }
            let version = observed.map(|r| r.version).unwrap_or(0);
            batch = batch.expect(key, ExpectedVersion::observed(version));
        }
        Ok(self.store.commit(batch)?)
    }

    fn single_receipt(&self, committed: Committed, asset: &Asset) -> Result<Receipt, EngineError> {
        let transaction = committed
            .transactions
            .first()
            .cloned()
            .ok_or_else(|| EngineError::InvariantViolation("commit produced no rows".to_string()))?;
        let record = committed_record(&committed, &transaction.key())?;

        if let Some(event) = InventoryEvent::movement(&transaction) {
            self.publish(
                transaction.entry.created_by,
                "inventory_transaction",
                *transaction.id.as_uuid(),
                transaction.sequence,
                event,
            );
        }
        self.check_low_stock(asset, &committed);

        Ok(Receipt { transaction, record })
    }

    fn check_low_stock(&self, asset: &Asset, committed: &Committed) {
        let sequence = committed.transactions.last().map(|t| t.sequence).unwrap_or(0);
        let actor = committed.transactions.first().map(|t| t.entry.created_by);
        for record in &committed.records {
            if !asset.is_below_minimum(record.available()) {
                continue;
            }
            warn!(
                key = %record.key,
                available = record.available(),
                minimum = asset.minimum_stock_level,
                "stock below minimum level"
            );
            if let Some(actor) = actor {
                self.publish(
                    actor,
                    "inventory_record",
                    *record.asset_id().as_uuid(),
                    sequence,
                    InventoryEvent::low_stock(record, asset.minimum_stock_level),
                );
            }
        }
    }

    /// Publication failures never undo a commit.
    fn publish(
        &self,
        actor: garrison_core::UserId,
        resource_type: &str,
        resource_id: Uuid,
        sequence: u64,
        event: InventoryEvent,
    ) {
        let summary = event.summary();
        let envelope = EventEnvelope::new(Uuid::now_v7(), actor, resource_type, resource_id, sequence, event);
        match self.bus.publish(envelope) {
            Ok(()) => debug!(resource_type, %resource_id, sequence, %summary, "event published"),
            Err(err) => warn!(resource_type, %resource_id, sequence, error = ?err, "event publication failed"),
        }
    }
}

fn committed_record(committed: &Committed, key: &BalanceKey) -> Result<InventoryRecord, EngineError> {
    committed
        .record(key)
        .cloned()
        .ok_or_else(|| EngineError::InvariantViolation(format!("commit did not return record {key}")))
}
