//! Catalog reference data: assets and bases.
//!
//! Read-only from the ledger's point of view. Seeding and lifecycle of catalog
//! entries belong to other collaborators.

pub mod asset;
pub mod base;
pub mod store;

pub use asset::{Asset, AssetCategory, UnitOfMeasure};
pub use base::Base;
pub use store::{CatalogError, CatalogStore, InMemoryCatalog};
