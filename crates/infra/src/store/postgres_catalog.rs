//! Catalog reads over the `assets` and `bases` tables.

use std::sync::Arc;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use garrison_catalog::{Asset, AssetCategory, Base, CatalogError, CatalogStore, UnitOfMeasure};
use garrison_core::{AssetId, BaseId};

const ASSET_COLUMNS: &str =
    "id, name, category, unit_of_measure, is_consumable, minimum_stock_level, is_active";

#[derive(Debug, Clone)]
pub struct PostgresCatalog {
    pool: Arc<PgPool>,
}

impl PostgresCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Insert or replace an asset (seeding and tests).
    pub async fn upsert_asset(&self, asset: &Asset) -> Result<(), CatalogError> {
        sqlx::query(
            r#"
            INSERT INTO assets (id, name, category, unit_of_measure, is_consumable, minimum_stock_level, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                category = EXCLUDED.category,
                unit_of_measure = EXCLUDED.unit_of_measure,
                is_consumable = EXCLUDED.is_consumable,
                minimum_stock_level = EXCLUDED.minimum_stock_level,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(asset.id.as_uuid())
        .bind(&asset.name)
        .bind(asset.category.as_str())
        .bind(asset.unit_of_measure.as_str())
        .bind(asset.is_consumable)
        .bind(asset.minimum_stock_level)
        .bind(asset.is_active)
        .execute(&*self.pool)
        .await
        .map_err(|e| unavailable("upsert_asset", e))?;
        Ok(())
    }

    pub async fn upsert_base(&self, base: &Base) -> Result<(), CatalogError> {
        sqlx::query(
            r#"
            INSERT INTO bases (id, code, name) VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET code = EXCLUDED.code, name = EXCLUDED.name
            "#,
        )
        .bind(base.id.as_uuid())
        .bind(&base.code)
        .bind(&base.name)
        .execute(&*self.pool)
        .await
        .map_err(|e| unavailable("upsert_base", e))?;
        Ok(())
    }

    async fn fetch_asset(&self, id: AssetId) -> Result<Option<Asset>, CatalogError> {
        let row = sqlx::query(&format!("SELECT {ASSET_COLUMNS} FROM assets WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| unavailable("get_asset", e))?;
        row.as_ref().map(asset_from_row).transpose()
    }

    async fn fetch_assets(&self, category: Option<AssetCategory>) -> Result<Vec<Asset>, CatalogError> {
        let rows = sqlx::query(&format!(
            "SELECT {ASSET_COLUMNS} FROM assets \
             WHERE ($1::text IS NULL OR category = $1) ORDER BY name"
        ))
        .bind(category.map(|c| c.as_str()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| unavailable("list_assets", e))?;
        rows.iter().map(asset_from_row).collect()
    }

    async fn fetch_bases(&self, id: Option<BaseId>) -> Result<Vec<Base>, CatalogError> {
        let rows = sqlx::query("SELECT id, code, name FROM bases WHERE ($1::uuid IS NULL OR id = $1) ORDER BY code")
            .bind(id.map(Uuid::from))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| unavailable("list_bases", e))?;
        rows.iter()
            .map(|row| {
                Ok(Base {
                    id: BaseId::from_uuid(column(row, "id")?),
                    code: column(row, "code")?,
                    name: column(row, "name")?,
                })
            })
            .collect()
    }
}

fn unavailable(operation: &str, err: sqlx::Error) -> CatalogError {
    CatalogError::Unavailable(format!("{operation}: {err}"))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, CatalogError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| CatalogError::Unavailable(format!("column {name}: {e}")))
}

fn asset_from_row(row: &PgRow) -> Result<Asset, CatalogError> {
    let category: String = column(row, "category")?;
    let unit: String = column(row, "unit_of_measure")?;
    Ok(Asset {
        id: AssetId::from_uuid(column(row, "id")?),
        name: column(row, "name")?,
        category: category
            .parse()
            .map_err(|e| CatalogError::Unavailable(format!("{e}")))?,
        unit_of_measure: unit
            .parse::<UnitOfMeasure>()
            .map_err(|e| CatalogError::Unavailable(format!("{e}")))?,
        is_consumable: column(row, "is_consumable")?,
        minimum_stock_level: column(row, "minimum_stock_level")?,
        is_active: column(row, "is_active")?,
    })
}

fn block_on<F, T>(fut: F) -> Result<T, CatalogError>
where
    F: std::future::Future<Output = Result<T, CatalogError>>,
{
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        CatalogError::Unavailable("PostgresCatalog requires a tokio runtime".to_string())
    })?;
    handle.block_on(fut)
}

impl CatalogStore for PostgresCatalog {
    fn get_asset(&self, id: AssetId) -> Result<Option<Asset>, CatalogError> {
        block_on(self.fetch_asset(id))
    }

    fn get_base(&self, id: BaseId) -> Result<Option<Base>, CatalogError> {
        Ok(block_on(self.fetch_bases(Some(id)))?.into_iter().next())
    }

    fn list_assets(&self) -> Result<Vec<Asset>, CatalogError> {
        block_on(self.fetch_assets(None))
    }

    fn list_bases(&self) -> Result<Vec<Base>, CatalogError> {
        block_on(self.fetch_bases(None))
    }

    fn assets_in_category(&self, category: AssetCategory) -> Result<Vec<Asset>, CatalogError> {
        block_on(self.fetch_assets(Some(category)))
    }
}
