//! Resolution of a read request into store filters.
//!
//! The principal's base scope narrows the requested base; an asset category is
//! resolved into an explicit asset set through the catalog.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use garrison_catalog::{AssetCategory, CatalogStore};
use garrison_core::{AssetId, BaseAccess, BaseFilter, BaseId};

use crate::error::EngineError;
use crate::store::{RecordFilter, TransactionFilter};

/// Scope parameters shared by listing and reporting queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeRequest {
    #[serde(default)]
    pub base_id: Option<BaseId>,
    #[serde(default)]
    pub asset_id: Option<AssetId>,
    #[serde(default)]
    pub asset_category: Option<AssetCategory>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedScope {
    pub base: BaseFilter,
    /// `None` means every asset.
    pub asset_ids: Option<Vec<AssetId>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl ResolvedScope {
    pub fn record_filter(&self) -> RecordFilter {
        RecordFilter {
            base: self.base.clone(),
            asset_ids: self.asset_ids.clone(),
        }
    }

    pub fn transaction_filter(&self) -> TransactionFilter {
        TransactionFilter {
            base: self.base.clone(),
            asset_ids: self.asset_ids.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
            ..TransactionFilter::default()
        }
    }
}

pub fn resolve_scope<P, C>(
    principal: &P,
    catalog: &C,
    request: &ScopeRequest,
) -> Result<ResolvedScope, EngineError>
where
    P: BaseAccess + ?Sized,
    C: CatalogStore + ?Sized,
{
    if let (Some(start), Some(end)) = (request.start_date, request.end_date) {
        if start > end {
            return Err(EngineError::validation("startDate must not be after endDate"));
        }
    }

    let base = principal.base_scope().narrow(request.base_id).ok_or_else(|| {
        EngineError::access_denied(format!(
            "base {} is outside the caller's scope",
            request.base_id.map(|b| b.to_string()).unwrap_or_default()
        ))
    })?;

    let category_assets = match request.asset_category {
        Some(category) => Some(
            catalog
                .assets_in_category(category)?
                .into_iter()
                .map(|a| a.id)
                .collect::<Vec<_>>(),
        ),
        None => None,
    };

    let asset_ids = match (request.asset_id, category_assets) {
        (Some(asset), Some(set)) => Some(set.into_iter().filter(|a| *a == asset).collect()),
        (Some(asset), None) => Some(vec![asset]),
        (None, set) => set,
    };

    Ok(ResolvedScope {
        base,
        asset_ids,
        start_date: request.start_date,
        end_date: request.end_date,
    })
}

#[cfg(test)]
mod tests {
    use garrison_catalog::{Asset, InMemoryCatalog, UnitOfMeasure};
    use garrison_core::{BaseScope, UserId};

    use super::*;

    struct Caller(BaseScope);

    impl BaseAccess for Caller {
        fn actor_id(&self) -> UserId {
            UserId::new()
        }

        fn base_scope(&self) -> BaseScope {
            self.0.clone()
        }
    }

    #[test]
    fn single_base_caller_is_narrowed_to_own_base() {
        let base = BaseId::new();
        let scope = resolve_scope(
            &Caller(BaseScope::Only(vec![base])),
            &InMemoryCatalog::new(),
            &ScopeRequest::default(),
        )
        .unwrap();
        assert_eq!(scope.base, BaseFilter::Only(vec![base]));
    }

    #[test]
    fn foreign_base_is_denied() {
        let err = resolve_scope(
            &Caller(BaseScope::Only(vec![BaseId::new()])),
            &InMemoryCatalog::new(),
            &ScopeRequest {
                base_id: Some(BaseId::new()),
                ..ScopeRequest::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::AccessDenied(_)));
    }

    #[test]
    fn empty_category_matches_nothing() {
        let catalog = InMemoryCatalog::new();
        catalog
            .upsert_asset(Asset::new("Rifle", AssetCategory::Weapon, UnitOfMeasure::Piece))
            .unwrap();

        let scope = resolve_scope(
            &Caller(BaseScope::All),
            &catalog,
            &ScopeRequest {
                asset_category: Some(AssetCategory::Vehicle),
                ..ScopeRequest::default()
            },
        )
        .unwrap();
        assert_eq!(scope.asset_ids, Some(vec![]));
    }

    #[test]
    fn inverted_date_range_is_rejected() {
        let now = Utc::now();
        let err = resolve_scope(
            &Caller(BaseScope::All),
            &InMemoryCatalog::new(),
            &ScopeRequest {
                start_date: Some(now),
                end_date: Some(now - chrono::Duration::days(1)),
                ..ScopeRequest::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
