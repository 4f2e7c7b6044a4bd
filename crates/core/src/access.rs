//! Base-level access contract between the authorization collaborator and the ledger.
//!
//! The ledger never decides *who* a caller is or which roles it holds; it only
//! asks an already-resolved principal whether it may act on a given base.

use crate::id::{BaseId, UserId};

/// Set of bases a principal may see and act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseScope {
    /// Every base (e.g. administrators).
    All,
    /// Only the listed bases.
    Only(Vec<BaseId>),
}

impl BaseScope {
    pub fn contains(&self, base_id: BaseId) -> bool {
        match self {
            BaseScope::All => true,
            BaseScope::Only(bases) => bases.contains(&base_id),
        }
    }

    /// Narrow a requested base filter to this scope.
    ///
    /// Returns `None` when the request falls entirely outside the scope.
    pub fn narrow(&self, requested: Option<BaseId>) -> Option<BaseFilter> {
        match (self, requested) {
            (BaseScope::All, None) => Some(BaseFilter::Any),
            (BaseScope::All, Some(b)) => Some(BaseFilter::Only(vec![b])),
            (BaseScope::Only(bases), None) => Some(BaseFilter::Only(bases.clone())),
            (BaseScope::Only(bases), Some(b)) if bases.contains(&b) => {
                Some(BaseFilter::Only(vec![b]))
            }
            (BaseScope::Only(_), Some(_)) => None,
        }
    }
}

/// Resolved base restriction for read queries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BaseFilter {
    #[default]
    Any,
    Only(Vec<BaseId>),
}

impl BaseFilter {
    pub fn matches(&self, base_id: BaseId) -> bool {
        match self {
            BaseFilter::Any => true,
            BaseFilter::Only(bases) => bases.contains(&base_id),
        }
    }
}

/// A principal as seen by the ledger.
pub trait BaseAccess {
    /// Identity recorded as `createdBy` on ledger rows.
    fn actor_id(&self) -> UserId;

    /// Bases this principal may act on.
    fn base_scope(&self) -> BaseScope;

    fn may_act_on(&self, base_id: BaseId) -> bool {
        self.base_scope().contains(base_id)
    }
}

impl<T: BaseAccess + ?Sized> BaseAccess for &T {
    fn actor_id(&self) -> UserId {
        (**self).actor_id()
    }

    fn base_scope(&self) -> BaseScope {
        (**self).base_scope()
    }

    fn may_act_on(&self, base_id: BaseId) -> bool {
        (**self).may_act_on(base_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restricted_scope_rejects_foreign_base_filter() {
        let home = BaseId::new();
        let scope = BaseScope::Only(vec![home]);

        assert_eq!(scope.narrow(None), Some(BaseFilter::Only(vec![home])));
        assert_eq!(scope.narrow(Some(home)), Some(BaseFilter::Only(vec![home])));
        assert_eq!(scope.narrow(Some(BaseId::new())), None);
    }

    #[test]
    fn global_scope_keeps_requested_filter() {
        let b = BaseId::new();
        assert_eq!(BaseScope::All.narrow(None), Some(BaseFilter::Any));
        assert_eq!(BaseScope::All.narrow(Some(b)), Some(BaseFilter::Only(vec![b])));
        assert!(BaseFilter::Any.matches(b));
    }
}
