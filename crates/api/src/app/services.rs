//! Service wiring: storage backends, the transaction engine and its readers.

use std::sync::Arc;

use sqlx::PgPool;
use tracing::{info, warn};

use garrison_catalog::{Asset, AssetCategory, Base, CatalogError, CatalogStore, InMemoryCatalog, UnitOfMeasure};
use garrison_events::{Event, EventBus, InMemoryEventBus};
use garrison_infra::store::{InMemoryInventoryStore, InventoryStore, PostgresCatalog, PostgresInventoryStore, StoreError};
use garrison_infra::{EngineConfig, EngineError, InventoryEnvelope, InventoryReports, Reconciler, TransactionEngine};
use garrison_inventory::InventoryEvent;

use crate::app::errors::ApiError;

pub type SharedStore = Arc<dyn InventoryStore>;
pub type SharedCatalog = Arc<dyn CatalogStore>;
pub type SharedBus = Arc<InMemoryEventBus<InventoryEnvelope>>;
pub type Engine = TransactionEngine<SharedStore, SharedCatalog, SharedBus>;

pub struct AppServices {
    engine: Engine,
    reports: InventoryReports<SharedStore, SharedCatalog>,
    reconciler: Reconciler<SharedStore>,
}

impl AppServices {
    pub fn new(store: SharedStore, catalog: SharedCatalog, bus: SharedBus, config: EngineConfig) -> Self {
        Self {
            reports: InventoryReports::new(store.clone(), catalog.clone(), config),
            reconciler: Reconciler::new(store.clone()),
            engine: TransactionEngine::with_config(store, catalog, bus, config),
        }
    }

    /// Process-local stores (dev/tests).
    pub fn in_memory(catalog: Arc<InMemoryCatalog>, config: EngineConfig) -> Self {
        Self::new(
            Arc::new(InMemoryInventoryStore::new()),
            catalog,
            Arc::new(InMemoryEventBus::new()),
            config,
        )
    }

    /// Postgres-backed stores; applies the schema before returning.
    pub async fn postgres(pool: PgPool, config: EngineConfig) -> Result<Self, StoreError> {
        let store = PostgresInventoryStore::new(pool.clone());
        store.ensure_schema().await?;
        Ok(Self::new(
            Arc::new(store),
            Arc::new(PostgresCatalog::new(pool)),
            Arc::new(InMemoryEventBus::new()),
            config,
        ))
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn reports(&self) -> &InventoryReports<SharedStore, SharedCatalog> {
        &self.reports
    }

    pub fn reconciler(&self) -> &Reconciler<SharedStore> {
        &self.reconciler
    }

    pub fn bus(&self) -> &SharedBus {
        self.engine.bus()
    }

    /// Run a blocking engine call off the async executor.
    pub async fn run<T, F>(self: &Arc<Self>, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&AppServices) -> Result<T, EngineError> + Send + 'static,
        T: Send + 'static,
    {
        let services = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(services.as_ref()))
            .await
            .map_err(|e| ApiError::Worker(e.to_string()))?
            .map_err(ApiError::from)
    }
}

/// Log every published inventory event on a dedicated thread.
pub fn spawn_event_log(bus: &SharedBus) -> std::io::Result<std::thread::JoinHandle<()>> {
    let subscription = bus.subscribe();
    std::thread::Builder::new()
        .name("garrison-event-log".into())
        .spawn(move || {
            while let Ok(envelope) = subscription.recv() {
                match envelope.payload() {
                    InventoryEvent::LowStockDetected(low) => warn!(
                        asset_id = %low.asset_id,
                        base_id = %low.base_id,
                        available = low.available,
                        minimum = low.minimum_stock_level,
                        "low stock"
                    ),
                    event => info!(
                        event_type = event.event_type(),
                        event_id = %envelope.event_id(),
                        actor = %envelope.actor_id(),
                        "inventory event"
                    ),
                }
            }
        })
}

/// Demo bases and assets for development deployments.
pub fn demo_catalog() -> (Vec<Base>, Vec<Asset>) {
    let bases = vec![
        Base::new("FL", "Fort Liberty"),
        Base::new("CP", "Camp Pendleton"),
        Base::new("FH", "Fort Hood"),
        Base::new("NBSD", "Naval Base San Diego"),
    ];
    let assets = vec![
        Asset::new("M4 Carbine", AssetCategory::Weapon, UnitOfMeasure::Piece).with_minimum_stock_level(50),
        Asset::new("M9 Pistol", AssetCategory::Weapon, UnitOfMeasure::Piece).with_minimum_stock_level(25),
        Asset::new("HMMWV", AssetCategory::Vehicle, UnitOfMeasure::Unit).with_minimum_stock_level(5),
        Asset::new("M1A2 Abrams", AssetCategory::Vehicle, UnitOfMeasure::Unit).with_minimum_stock_level(2),
        Asset::new("5.56mm Ammunition", AssetCategory::Ammunition, UnitOfMeasure::Box)
            .consumable()
            .with_minimum_stock_level(1000),
        Asset::new("9mm Ammunition", AssetCategory::Ammunition, UnitOfMeasure::Box)
            .consumable()
            .with_minimum_stock_level(500),
        Asset::new("Body Armor", AssetCategory::Equipment, UnitOfMeasure::Piece).with_minimum_stock_level(100),
        Asset::new("MRE", AssetCategory::Supplies, UnitOfMeasure::Box)
            .consumable()
            .with_minimum_stock_level(5000),
    ];
    (bases, assets)
}

pub fn seed_in_memory(catalog: &InMemoryCatalog) -> Result<(), CatalogError> {
    let (bases, assets) = demo_catalog();
    for base in bases {
        catalog.upsert_base(base)?;
    }
    for asset in assets {
        catalog.upsert_asset(asset)?;
    }
    Ok(())
}

pub async fn seed_postgres(catalog: &PostgresCatalog) -> Result<(), CatalogError> {
    let (bases, assets) = demo_catalog();
    for base in &bases {
        catalog.upsert_base(base).await?;
    }
    for asset in &assets {
        catalog.upsert_asset(asset).await?;
    }
    Ok(())
}
