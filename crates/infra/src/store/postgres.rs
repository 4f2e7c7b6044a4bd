//! Postgres-backed ledger and balance store.
//!
//! Schema lives in `migrations/0001_inventory_ledger.sql`. Counter invariants
//! are enforced twice: by [`plan_commit`] before any write, and by CHECK
//! constraints on `inventory_records`.
//!
//! ## Error Mapping
//!
//! | SQLx error | Code | StoreError |
//! |------------|------|------------|
//! | unique violation | `23505` | `Conflict` (concurrent first insert of a record) |
//! | serialization failure / deadlock | `40001` / `40P01` | `Conflict` |
//! | check violation | `23514` | `InvariantViolation` |
//! | other database error | any | `Validation` |
//! | pool closed / timed out, io | n/a | `Unavailable` |
//! | decode / column not found | n/a | `Corrupt` |
//!
//! ## Ordering
//!
//! `sequence` is an identity column. Every commit locks the records it touches
//! (`SELECT ... FOR UPDATE`) before inserting ledger rows, so rows affecting
//! the same record are numbered in commit order.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use garrison_core::{AssetId, BaseFilter, BaseId, ExpectedVersion, TransactionId, UserId};
use garrison_inventory::{
    AssigneeSnapshot, BalanceCounters, BalanceKey, Delta, InventoryRecord, NewTransaction,
    Transaction, TransactionStatus, TransactionType, Vendor,
};

use super::plan::plan_commit;
use super::r#trait::{
    BalanceStore, CommitBatch, Committed, GroupKey, GroupSummary, GroupValue, InventoryStore,
    LedgerCut, Page, RecordFilter, SortOrder, StoreError, TransactionFilter, TransactionLedger,
    TransactionPage,
};

pub const SCHEMA: &str = include_str!("../../migrations/0001_inventory_ledger.sql");

type PgTx<'c> = sqlx::Transaction<'c, Postgres>;
type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

const RECORD_COLUMNS: &str = "asset_id, base_id, opening_balance, current_balance, \
     assigned_quantity, expended_quantity, last_updated, updated_by, version";

const TRANSACTION_COLUMNS: &str = "id, sequence, recorded_at, type, asset_id, base_id, quantity, \
     unit_price, total_value, vendor_name, vendor_contact, purchase_order_number, invoice_number, \
     from_base_id, to_base_id, transfer_id, assigned_to, description, remarks, status, \
     created_by, transaction_date";

/// Bind order: `$1` bases, `$2` asset, `$3` asset set, `$4` type, `$5` status,
/// `$6` start, `$7` end.
const TRANSACTION_WHERE: &str = "($1::uuid[] IS NULL OR base_id = ANY($1)) \
     AND ($2::uuid IS NULL OR asset_id = $2) \
     AND ($3::uuid[] IS NULL OR asset_id = ANY($3)) \
     AND ($4::text IS NULL OR type = $4) \
     AND ($5::text IS NULL OR status = $5) \
     AND ($6::timestamptz IS NULL OR transaction_date >= $6) \
     AND ($7::timestamptz IS NULL OR transaction_date <= $7)";

#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: Arc<PgPool>,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if missing. Idempotent.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(key = %key), err)]
    pub async fn load_record(&self, key: BalanceKey) -> Result<Option<InventoryRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM inventory_records WHERE asset_id = $1 AND base_id = $2"
        ))
        .bind(key.asset_id.as_uuid())
        .bind(key.base_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_record", e))?;

        row.as_ref().map(record_from_row).transpose()
    }

    pub async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<InventoryRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM inventory_records \
             WHERE ($1::uuid[] IS NULL OR base_id = ANY($1)) \
               AND ($2::uuid[] IS NULL OR asset_id = ANY($2)) \
             ORDER BY asset_id, base_id"
        ))
        .bind(base_param(&filter.base))
        .bind(filter.asset_ids.as_ref().map(|ids| uuids(ids.iter().map(|a| *a.as_uuid()))))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_records", e))?;

        rows.iter().map(record_from_row).collect()
    }

    /// Single-statement read inside a repeatable-read transaction.
    pub async fn snapshot_records(
        &self,
        filter: &RecordFilter,
    ) -> Result<Vec<InventoryRecord>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_snapshot", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM inventory_records \
             WHERE ($1::uuid[] IS NULL OR base_id = ANY($1)) \
               AND ($2::uuid[] IS NULL OR asset_id = ANY($2)) \
             ORDER BY asset_id, base_id"
        ))
        .bind(base_param(&filter.base))
        .bind(filter.asset_ids.as_ref().map(|ids| uuids(ids.iter().map(|a| *a.as_uuid()))))
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("snapshot_records", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_snapshot", e))?;

        rows.iter().map(record_from_row).collect()
    }

    /// Records and the whole ledger from one repeatable-read transaction.
    pub async fn ledger_cut_async(&self) -> Result<LedgerCut, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_snapshot", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        let record_rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM inventory_records ORDER BY asset_id, base_id"
        ))
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("cut_records", e))?;
        let ledger_rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM inventory_transactions ORDER BY sequence ASC"
        ))
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("cut_transactions", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_snapshot", e))?;

        let records = record_rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        let transactions = ledger_rows
            .iter()
            .map(transaction_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        let last_sequence = transactions.last().map(|t| t.sequence).unwrap_or(0);
        Ok(LedgerCut {
            records,
            transactions,
            last_sequence,
        })
    }

    #[instrument(skip(self, batch), fields(rows = batch.transactions.len()), err)]
    pub async fn commit_batch(&self, batch: CommitBatch) -> Result<Committed, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Sorted keys: lock order shared by all writers.
        let mut current = BTreeMap::new();
        for key in batch.keys() {
            current.insert(key, lock_record(&mut tx, key).await?);
        }

        let planned = plan_commit(&current, &batch, Utc::now())?;

        let mut transactions = Vec::with_capacity(batch.transactions.len());
        for entry in batch.transactions {
            transactions.push(insert_transaction(&mut tx, entry).await?);
        }

        for (key, record) in &planned {
            match current.get(key).and_then(|r| r.as_ref()) {
                Some(previous) => update_record(&mut tx, record, previous.version).await?,
                None => insert_record(&mut tx, record).await?,
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        debug!(
            first_sequence = transactions.first().map(|t| t.sequence),
            records = planned.len(),
            "commit applied"
        );

        Ok(Committed {
            transactions,
            records: planned.into_values().collect(),
        })
    }

    pub async fn apply_delta_async(
        &self,
        key: BalanceKey,
        delta: Delta,
        actor: UserId,
    ) -> Result<InventoryRecord, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current = lock_record(&mut tx, key).await?;
        let now = Utc::now();
        let next = match &current {
            Some(record) => record.with_delta(delta, actor, now)?,
            None => InventoryRecord::zeroed(key, now).with_delta(delta, actor, now)?,
        };
        match &current {
            Some(previous) => update_record(&mut tx, &next, previous.version).await?,
            None => insert_record(&mut tx, &next).await?,
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(next)
    }

    pub async fn append_transaction(&self, entry: NewTransaction) -> Result<Transaction, StoreError> {
        entry.validate()?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        let committed = insert_transaction(&mut tx, entry).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(committed)
    }

    pub async fn find_transactions(
        &self,
        filter: &TransactionFilter,
        page: Page,
        order: SortOrder,
    ) -> Result<TransactionPage, StoreError> {
        let count_sql =
            format!("SELECT COUNT(*) AS total FROM inventory_transactions WHERE {TRANSACTION_WHERE}");
        let count_row = bind_transaction_filter(sqlx::query(&count_sql), filter)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_transactions", e))?;
        let total: i64 = get(&count_row, "total")?;

        let order_by = match order {
            SortOrder::SequenceAsc => "sequence ASC",
            SortOrder::SequenceDesc => "sequence DESC",
            SortOrder::TransactionDateDesc => "transaction_date DESC, sequence DESC",
        };
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM inventory_transactions WHERE {TRANSACTION_WHERE} \
             ORDER BY {order_by} LIMIT $8 OFFSET $9"
        );
        let offset = i64::try_from(page.offset())
            .map_err(|_| StoreError::Validation(format!("page {} is out of range", page.page)))?;
        let rows = bind_transaction_filter(sqlx::query(&sql), filter)
            .bind(i64::from(page.limit))
            .bind(offset)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_transactions", e))?;

        let items = rows
            .iter()
            .map(transaction_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TransactionPage {
            items,
            total: u64::try_from(total).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            page: page.page,
            limit: page.limit,
        })
    }

    pub async fn aggregate_transactions(
        &self,
        group: GroupKey,
        filter: &TransactionFilter,
    ) -> Result<Vec<GroupSummary>, StoreError> {
        let column = match group {
            GroupKey::Type => "type",
            GroupKey::Base => "base_id",
            GroupKey::Asset => "asset_id",
        };
        let sql = format!(
            "SELECT {column} AS grp, COUNT(*) AS count, \
                    COALESCE(SUM(quantity), 0)::bigint AS total_quantity, \
                    COALESCE(SUM(total_value), 0)::bigint AS total_value \
             FROM inventory_transactions WHERE {TRANSACTION_WHERE} GROUP BY {column}"
        );
        let rows = bind_transaction_filter(sqlx::query(&sql), filter)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("aggregate_transactions", e))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let value = match group {
                GroupKey::Type => GroupValue::Type(parse_column::<TransactionType>(row, "grp")?),
                GroupKey::Base => GroupValue::Base(BaseId::from_uuid(get(row, "grp")?)),
                GroupKey::Asset => GroupValue::Asset(AssetId::from_uuid(get(row, "grp")?)),
            };
            out.push(GroupSummary {
                group: value,
                count: to_u64(get(row, "count")?)?,
                total_quantity: get(row, "total_quantity")?,
                total_value: to_u64(get(row, "total_value")?)?,
            });
        }
        out.sort_by_key(|g| g.group);
        Ok(out)
    }

    pub async fn open_record_async(&self, record: InventoryRecord) -> Result<InventoryRecord, StoreError> {
        record.counters.check()?;
        let record = InventoryRecord {
            version: 1,
            ..record
        };
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        insert_record(&mut tx, &record).await.map_err(|e| match e {
            StoreError::Conflict(_) => StoreError::Conflict(format!(
                "inventory record {} already exists",
                record.key
            )),
            other => other,
        })?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(record)
    }

    pub async fn restore_record_async(
        &self,
        key: BalanceKey,
        counters: BalanceCounters,
        expected: ExpectedVersion,
        actor: UserId,
    ) -> Result<InventoryRecord, StoreError> {
        counters.check()?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current = lock_record(&mut tx, key).await?;
        expected.check(current.as_ref().map(|r| r.version).unwrap_or(0))?;
        let record = InventoryRecord {
            key,
            counters,
            last_updated: Utc::now(),
            updated_by: Some(actor),
            version: current.as_ref().map(|r| r.version).unwrap_or(0) + 1,
        };
        match &current {
            Some(previous) => update_record(&mut tx, &record, previous.version).await?,
            None => insert_record(&mut tx, &record).await?,
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(record)
    }
}

async fn lock_record(tx: &mut PgTx<'_>, key: BalanceKey) -> Result<Option<InventoryRecord>, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {RECORD_COLUMNS} FROM inventory_records \
         WHERE asset_id = $1 AND base_id = $2 FOR UPDATE"
    ))
    .bind(key.asset_id.as_uuid())
    .bind(key.base_id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_record", e))?;

    row.as_ref().map(record_from_row).transpose()
}

async fn insert_record(tx: &mut PgTx<'_>, record: &InventoryRecord) -> Result<(), StoreError> {
    let c = &record.counters;
    sqlx::query(
        r#"
        INSERT INTO inventory_records (
            asset_id, base_id, opening_balance, current_balance,
            assigned_quantity, expended_quantity, last_updated, updated_by, version
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(record.key.asset_id.as_uuid())
    .bind(record.key.base_id.as_uuid())
    .bind(c.opening_balance)
    .bind(c.current_balance)
    .bind(c.assigned_quantity)
    .bind(c.expended_quantity)
    .bind(record.last_updated)
    .bind(record.updated_by.map(Uuid::from))
    .bind(to_i64(record.version, "version")?)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_record", e))?;
    Ok(())
}

async fn update_record(
    tx: &mut PgTx<'_>,
    record: &InventoryRecord,
    previous_version: u64,
) -> Result<(), StoreError> {
    let c = &record.counters;
    let result = sqlx::query(
        r#"
        UPDATE inventory_records
        SET opening_balance = $3,
            current_balance = $4,
            assigned_quantity = $5,
            expended_quantity = $6,
            last_updated = $7,
            updated_by = $8,
            version = $9
        WHERE asset_id = $1 AND base_id = $2 AND version = $10
        "#,
    )
    .bind(record.key.asset_id.as_uuid())
    .bind(record.key.base_id.as_uuid())
    .bind(c.opening_balance)
    .bind(c.current_balance)
    .bind(c.assigned_quantity)
    .bind(c.expended_quantity)
    .bind(record.last_updated)
    .bind(record.updated_by.map(Uuid::from))
    .bind(to_i64(record.version, "version")?)
    .bind(to_i64(previous_version, "version")?)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_record", e))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict(format!(
            "record {} moved on from version {previous_version}",
            record.key
        )));
    }
    Ok(())
}

async fn insert_transaction(tx: &mut PgTx<'_>, entry: NewTransaction) -> Result<Transaction, StoreError> {
    let id = TransactionId::new();
    let assigned_to = entry
        .assigned_to
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| StoreError::Validation(format!("assignee snapshot: {e}")))?;
    let unit_price = entry.unit_price.map(|v| to_i64(v, "unitPrice")).transpose()?;
    let total_value = entry.total_value.map(|v| to_i64(v, "totalValue")).transpose()?;

    let row = sqlx::query(
        r#"
        INSERT INTO inventory_transactions (
            id, type, asset_id, base_id, quantity,
            unit_price, total_value, vendor_name, vendor_contact,
            purchase_order_number, invoice_number,
            from_base_id, to_base_id, transfer_id, assigned_to,
            description, remarks, status, created_by, transaction_date
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
        RETURNING sequence, recorded_at
        "#,
    )
    .bind(id.as_uuid())
    .bind(entry.transaction_type.as_str())
    .bind(entry.asset_id.as_uuid())
    .bind(entry.base_id.as_uuid())
    .bind(entry.quantity)
    .bind(unit_price)
    .bind(total_value)
    .bind(entry.vendor.as_ref().map(|v| v.name.clone()))
    .bind(entry.vendor.as_ref().and_then(|v| v.contact.clone()))
    .bind(entry.purchase_order_number.clone())
    .bind(entry.invoice_number.clone())
    .bind(entry.from_base_id.map(Uuid::from))
    .bind(entry.to_base_id.map(Uuid::from))
    .bind(entry.transfer_id)
    .bind(assigned_to)
    .bind(entry.description.clone())
    .bind(entry.remarks.clone())
    .bind(entry.status.as_str())
    .bind(entry.created_by.as_uuid())
    .bind(entry.transaction_date)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_transaction", e))?;

    let sequence = to_u64(get(&row, "sequence")?)?;
    let recorded_at: DateTime<Utc> = get(&row, "recorded_at")?;
    Ok(Transaction::committed(id, sequence, recorded_at, entry))
}

fn bind_transaction_filter<'q>(query: PgQuery<'q>, filter: &TransactionFilter) -> PgQuery<'q> {
    query
        .bind(base_param(&filter.base))
        .bind(filter.asset_id.map(Uuid::from))
        .bind(filter.asset_ids.as_ref().map(|ids| uuids(ids.iter().map(|a| *a.as_uuid()))))
        .bind(filter.transaction_type.map(|t| t.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.start_date)
        .bind(filter.end_date)
}

fn base_param(filter: &BaseFilter) -> Option<Vec<Uuid>> {
    match filter {
        BaseFilter::Any => None,
        BaseFilter::Only(bases) => Some(uuids(bases.iter().map(|b| *b.as_uuid()))),
    }
}

fn uuids(ids: impl Iterator<Item = Uuid>) -> Vec<Uuid> {
    ids.collect()
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("column {column}: {e}")))
}

fn parse_column<T>(row: &PgRow, column: &str) -> Result<T, StoreError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    let raw: String = get(row, column)?;
    raw.parse()
        .map_err(|e| StoreError::Corrupt(format!("column {column}: {e}")))
}

fn to_i64(value: u64, field: &str) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Validation(format!("{field} {value} is out of range")))
}

fn to_u64(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative value {value}")))
}

fn record_from_row(row: &PgRow) -> Result<InventoryRecord, StoreError> {
    let key = BalanceKey::new(
        AssetId::from_uuid(get(row, "asset_id")?),
        BaseId::from_uuid(get(row, "base_id")?),
    );
    let record = InventoryRecord {
        key,
        counters: BalanceCounters {
            opening_balance: get(row, "opening_balance")?,
            current_balance: get(row, "current_balance")?,
            assigned_quantity: get(row, "assigned_quantity")?,
            expended_quantity: get(row, "expended_quantity")?,
        },
        last_updated: get(row, "last_updated")?,
        updated_by: get::<Option<Uuid>>(row, "updated_by")?.map(UserId::from_uuid),
        version: to_u64(get(row, "version")?)?,
    };
    record
        .counters
        .check()
        .map_err(|e| StoreError::Corrupt(format!("record {key}: {e}")))?;
    Ok(record)
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction, StoreError> {
    let vendor = get::<Option<String>>(row, "vendor_name")?.map(|name| Vendor {
        name,
        contact: None,
    });
    let vendor = match (vendor, get::<Option<String>>(row, "vendor_contact")?) {
        (Some(v), contact) => Some(Vendor { contact, ..v }),
        (None, _) => None,
    };
    let assigned_to = get::<Option<serde_json::Value>>(row, "assigned_to")?
        .map(serde_json::from_value::<AssigneeSnapshot>)
        .transpose()
        .map_err(|e| StoreError::Corrupt(format!("column assigned_to: {e}")))?;

    let entry = NewTransaction {
        transaction_type: parse_column(row, "type")?,
        asset_id: AssetId::from_uuid(get(row, "asset_id")?),
        base_id: BaseId::from_uuid(get(row, "base_id")?),
        quantity: get(row, "quantity")?,
        unit_price: get::<Option<i64>>(row, "unit_price")?.map(to_u64).transpose()?,
        total_value: get::<Option<i64>>(row, "total_value")?.map(to_u64).transpose()?,
        vendor,
        purchase_order_number: get(row, "purchase_order_number")?,
        invoice_number: get(row, "invoice_number")?,
        from_base_id: get::<Option<Uuid>>(row, "from_base_id")?.map(BaseId::from_uuid),
        to_base_id: get::<Option<Uuid>>(row, "to_base_id")?.map(BaseId::from_uuid),
        transfer_id: get(row, "transfer_id")?,
        assigned_to,
        description: get(row, "description")?,
        remarks: get(row, "remarks")?,
        status: parse_column::<TransactionStatus>(row, "status")?,
        created_by: UserId::from_uuid(get(row, "created_by")?),
        transaction_date: get(row, "transaction_date")?,
    };

    Ok(Transaction::committed(
        TransactionId::from_uuid(get(row, "id")?),
        to_u64(get(row, "sequence")?)?,
        get(row, "recorded_at")?,
        entry,
    ))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            classify_sqlstate(db_err.code().as_deref(), msg)
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            StoreError::Unavailable(format!("{operation}: {err}"))
        }
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_) => StoreError::Corrupt(format!("{operation}: {err}")),
        _ => StoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}

/// Map a Postgres SQLSTATE onto a store error by code, then by class.
fn classify_sqlstate(code: Option<&str>, msg: String) -> StoreError {
    let Some(code) = code else {
        return StoreError::Unavailable(msg);
    };
    match code {
        "23505" | "40001" | "40P01" => StoreError::Conflict(msg),
        "23514" => StoreError::InvariantViolation(msg),
        _ => match code.get(..2) {
            // data exception, integrity constraint
            Some("22") | Some("23") => StoreError::Validation(msg),
            // connection, resources, operator intervention, system error
            Some("08") | Some("53") | Some("57") | Some("58") => StoreError::Unavailable(msg),
            Some("40") => StoreError::Conflict(msg),
            Some("XX") => StoreError::Corrupt(msg),
            _ => StoreError::Unavailable(msg),
        },
    }
}

/// Run an async store operation from the synchronous store traits.
///
/// Must be called from a blocking context inside a tokio runtime (e.g.
/// `spawn_blocking` in an axum handler).
fn block_on<F, T>(fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        StoreError::Unavailable("PostgresInventoryStore requires a tokio runtime".to_string())
    })?;
    handle.block_on(fut)
}

impl BalanceStore for PostgresInventoryStore {
    fn get(&self, key: BalanceKey) -> Result<Option<InventoryRecord>, StoreError> {
        block_on(self.load_record(key))
    }

    fn apply_delta(
        &self,
        key: BalanceKey,
        delta: Delta,
        actor: UserId,
    ) -> Result<InventoryRecord, StoreError> {
        block_on(self.apply_delta_async(key, delta, actor))
    }

    fn list(&self, filter: &RecordFilter) -> Result<Vec<InventoryRecord>, StoreError> {
        block_on(self.list_records(filter))
    }

    fn snapshot(&self, filter: &RecordFilter) -> Result<Vec<InventoryRecord>, StoreError> {
        block_on(self.snapshot_records(filter))
    }
}

impl TransactionLedger for PostgresInventoryStore {
    fn append(&self, transaction: NewTransaction) -> Result<Transaction, StoreError> {
        block_on(self.append_transaction(transaction))
    }

    fn find(
        &self,
        filter: &TransactionFilter,
        page: Page,
        order: SortOrder,
    ) -> Result<TransactionPage, StoreError> {
        block_on(self.find_transactions(filter, page, order))
    }

    fn aggregate(
        &self,
        group: GroupKey,
        filter: &TransactionFilter,
    ) -> Result<Vec<GroupSummary>, StoreError> {
        block_on(self.aggregate_transactions(group, filter))
    }
}

impl InventoryStore for PostgresInventoryStore {
    fn commit(&self, batch: CommitBatch) -> Result<Committed, StoreError> {
        block_on(self.commit_batch(batch))
    }

    fn open_record(&self, record: InventoryRecord) -> Result<InventoryRecord, StoreError> {
        block_on(self.open_record_async(record))
    }

    fn restore_record(
        &self,
        key: BalanceKey,
        counters: BalanceCounters,
        expected: ExpectedVersion,
        actor: UserId,
    ) -> Result<InventoryRecord, StoreError> {
        block_on(self.restore_record_async(key, counters, expected, actor))
    }

    fn ledger_cut(&self) -> Result<LedgerCut, StoreError> {
        block_on(self.ledger_cut_async())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(code: &str) -> StoreError {
        classify_sqlstate(Some(code), format!("sqlstate {code}"))
    }

    #[test]
    fn transient_server_states_are_unavailable() {
        // connection failure, too many connections, admin shutdown, disk full, io error
        for code in ["08006", "08001", "53300", "53100", "57P01", "57014", "58030"] {
            let err = classify(code);
            assert!(matches!(err, StoreError::Unavailable(_)), "{code}: {err:?}");
            assert!(err.is_retryable(), "{code}");
        }
    }

    #[test]
    fn data_and_constraint_states_are_validation() {
        for code in ["22003", "22P02", "23502", "23503"] {
            let err = classify(code);
            assert!(matches!(err, StoreError::Validation(_)), "{code}: {err:?}");
            assert!(!err.is_retryable(), "{code}");
        }
    }

    #[test]
    fn races_and_checks_keep_their_mapping() {
        for code in ["23505", "40001", "40P01"] {
            assert!(matches!(classify(code), StoreError::Conflict(_)), "{code}");
        }
        assert!(matches!(classify("23514"), StoreError::InvariantViolation(_)));
        assert!(matches!(classify("XX001"), StoreError::Corrupt(_)));
    }

    #[test]
    fn missing_code_is_unavailable() {
        let err = classify_sqlstate(None, "no code".to_owned());
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
