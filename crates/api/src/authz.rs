//! API-side authorization guard for ledger operations.
//!
//! Role → permission checks happen here, before the engine is called. Base
//! scope is enforced by the engine itself from the same principal.

use garrison_auth::{AuthzError, Permission, authorize};

use crate::context::PrincipalContext;

/// Check that the caller's role grants `required`.
pub fn require(principal: &PrincipalContext, required: &Permission) -> Result<(), AuthzError> {
    authorize(principal.principal(), required).inspect_err(|_| {
        tracing::info!(
            user = %principal.user_id(),
            role = %principal.role(),
            permission = %required,
            "request denied by role policy"
        );
    })
}

#[cfg(test)]
mod tests {
    use garrison_auth::Principal;
    use garrison_core::{BaseId, UserId};

    use super::*;

    #[test]
    fn officer_may_purchase_but_not_expend() {
        let ctx = PrincipalContext::new(Principal::logistics_officer(UserId::new(), BaseId::new()));

        assert!(require(&ctx, &Permission::RECORD_PURCHASE).is_ok());
        assert!(require(&ctx, &Permission::RECORD_TRANSFER).is_ok());
        assert!(require(&ctx, &Permission::READ_TRANSACTIONS).is_ok());
        assert!(require(&ctx, &Permission::RECORD_EXPENDITURE).is_err());
        assert!(require(&ctx, &Permission::RECORD_RETURN).is_err());
    }

    #[test]
    fn only_admin_may_reconcile() {
        let admin = PrincipalContext::new(Principal::admin(UserId::new()));
        let commander = PrincipalContext::new(Principal::base_commander(UserId::new(), BaseId::new()));

        assert!(require(&admin, &Permission::RECONCILE).is_ok());
        assert!(require(&commander, &Permission::RECONCILE).is_err());
    }
}
