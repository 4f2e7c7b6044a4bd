//! Catalog lookups used by the ledger.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use garrison_core::{AssetId, BaseId};

use crate::{Asset, AssetCategory, Base};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Read-only catalog contract.
pub trait CatalogStore: Send + Sync {
    fn get_asset(&self, id: AssetId) -> Result<Option<Asset>, CatalogError>;

    fn get_base(&self, id: BaseId) -> Result<Option<Base>, CatalogError>;

    fn list_assets(&self) -> Result<Vec<Asset>, CatalogError>;

    fn list_bases(&self) -> Result<Vec<Base>, CatalogError>;

    fn assets_in_category(&self, category: AssetCategory) -> Result<Vec<Asset>, CatalogError> {
        Ok(self
            .list_assets()?
            .into_iter()
            .filter(|a| a.category == category)
            .collect())
    }
}

impl<C> CatalogStore for Arc<C>
where
    C: CatalogStore + ?Sized,
{
    fn get_asset(&self, id: AssetId) -> Result<Option<Asset>, CatalogError> {
        (**self).get_asset(id)
    }

    fn get_base(&self, id: BaseId) -> Result<Option<Base>, CatalogError> {
        (**self).get_base(id)
    }

    fn list_assets(&self) -> Result<Vec<Asset>, CatalogError> {
        (**self).list_assets()
    }

    fn list_bases(&self) -> Result<Vec<Base>, CatalogError> {
        (**self).list_bases()
    }

    fn assets_in_category(&self, category: AssetCategory) -> Result<Vec<Asset>, CatalogError> {
        (**self).assets_in_category(category)
    }
}

/// In-memory catalog for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    assets: RwLock<HashMap<AssetId, Asset>>,
    bases: RwLock<HashMap<BaseId, Base>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_asset(&self, asset: Asset) -> Result<(), CatalogError> {
        let mut guard = self.assets.write().map_err(|_| poisoned())?;
        guard.insert(asset.id, asset);
        Ok(())
    }

    pub fn upsert_base(&self, base: Base) -> Result<(), CatalogError> {
        let mut guard = self.bases.write().map_err(|_| poisoned())?;
        guard.insert(base.id, base);
        Ok(())
    }
}

fn poisoned() -> CatalogError {
    CatalogError::Unavailable("catalog lock poisoned".to_string())
}

impl CatalogStore for InMemoryCatalog {
    fn get_asset(&self, id: AssetId) -> Result<Option<Asset>, CatalogError> {
        let guard = self.assets.read().map_err(|_| poisoned())?;
        Ok(guard.get(&id).cloned())
    }

    fn get_base(&self, id: BaseId) -> Result<Option<Base>, CatalogError> {
        let guard = self.bases.read().map_err(|_| poisoned())?;
        Ok(guard.get(&id).cloned())
    }

    fn list_assets(&self) -> Result<Vec<Asset>, CatalogError> {
        let guard = self.assets.read().map_err(|_| poisoned())?;
        let mut assets: Vec<Asset> = guard.values().cloned().collect();
        assets.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(assets)
    }

    fn list_bases(&self) -> Result<Vec<Base>, CatalogError> {
        let guard = self.bases.read().map_err(|_| poisoned())?;
        let mut bases: Vec<Base> = guard.values().cloned().collect();
        bases.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(bases)
    }
}
