use serde::{Deserialize, Serialize};

use garrison_core::{AssetId, DomainError, DomainResult, Entity};

/// Asset category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetCategory {
    Vehicle,
    Weapon,
    Ammunition,
    Equipment,
    Supplies,
}

impl AssetCategory {
    pub const ALL: [AssetCategory; 5] = [
        AssetCategory::Vehicle,
        AssetCategory::Weapon,
        AssetCategory::Ammunition,
        AssetCategory::Equipment,
        AssetCategory::Supplies,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetCategory::Vehicle => "vehicle",
            AssetCategory::Weapon => "weapon",
            AssetCategory::Ammunition => "ammunition",
            AssetCategory::Equipment => "equipment",
            AssetCategory::Supplies => "supplies",
        }
    }
}

impl core::fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for AssetCategory {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssetCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown asset category '{s}'")))
    }
}

/// Unit in which an asset's quantities are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitOfMeasure {
    Piece,
    Unit,
    Kg,
    Liter,
    Box,
    Crate,
}

impl UnitOfMeasure {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitOfMeasure::Piece => "piece",
            UnitOfMeasure::Unit => "unit",
            UnitOfMeasure::Kg => "kg",
            UnitOfMeasure::Liter => "liter",
            UnitOfMeasure::Box => "box",
            UnitOfMeasure::Crate => "crate",
        }
    }
}

impl core::str::FromStr for UnitOfMeasure {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "piece" => Ok(UnitOfMeasure::Piece),
            "unit" => Ok(UnitOfMeasure::Unit),
            "kg" => Ok(UnitOfMeasure::Kg),
            "liter" => Ok(UnitOfMeasure::Liter),
            "box" => Ok(UnitOfMeasure::Box),
            "crate" => Ok(UnitOfMeasure::Crate),
            other => Err(DomainError::validation(format!("unknown unit of measure '{other}'"))),
        }
    }
}

/// Catalog asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: AssetId,
    pub name: String,
    pub category: AssetCategory,
    pub unit_of_measure: UnitOfMeasure,
    pub is_consumable: bool,
    pub minimum_stock_level: i64,
    pub is_active: bool,
}

impl Asset {
    /// New active, non-consumable asset with no minimum stock level.
    pub fn new(name: impl Into<String>, category: AssetCategory, unit: UnitOfMeasure) -> Self {
        Self {
            id: AssetId::new(),
            name: name.into(),
            category,
            unit_of_measure: unit,
            is_consumable: false,
            minimum_stock_level: 0,
            is_active: true,
        }
    }

    pub fn consumable(mut self) -> Self {
        self.is_consumable = true;
        self
    }

    pub fn with_minimum_stock_level(mut self, level: i64) -> Self {
        self.minimum_stock_level = level;
        self
    }

    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Deactivated assets accept no further movements.
    pub fn ensure_active(&self) -> DomainResult<()> {
        if self.is_active {
            Ok(())
        } else {
            Err(DomainError::validation(format!(
                "asset '{}' ({}) is deactivated",
                self.name, self.id
            )))
        }
    }

    /// Whether `available` has dropped under this asset's minimum stock level.
    pub fn is_below_minimum(&self, available: i64) -> bool {
        self.minimum_stock_level > 0 && available < self.minimum_stock_level
    }
}

impl Entity for Asset {
    type Id = AssetId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
