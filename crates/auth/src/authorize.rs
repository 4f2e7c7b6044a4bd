use std::collections::HashSet;

use thiserror::Error;

use garrison_core::{BaseAccess, BaseId, BaseScope, UserId};

use crate::{JwtClaims, Permission, Role};

/// A fully resolved principal for authorization decisions.
///
/// Built from verified claims plus the role policy; carries no transport or
/// storage concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
    pub assigned_base: Option<BaseId>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role, assigned_base: Option<BaseId>) -> Self {
        let permissions = role_permissions(&role);
        Self {
            user_id,
            role,
            assigned_base,
            permissions,
        }
    }

    pub fn from_claims(claims: &JwtClaims) -> Self {
        Self::new(claims.sub, claims.role.clone(), claims.base_id)
    }

    pub fn admin(user_id: UserId) -> Self {
        Self::new(user_id, Role::ADMIN, None)
    }

    pub fn base_commander(user_id: UserId, base_id: BaseId) -> Self {
        Self::new(user_id, Role::BASE_COMMANDER, Some(base_id))
    }

    pub fn logistics_officer(user_id: UserId, base_id: BaseId) -> Self {
        Self::new(user_id, Role::LOGISTICS_OFFICER, Some(base_id))
    }
}

impl BaseAccess for Principal {
    fn actor_id(&self) -> UserId {
        self.user_id
    }

    fn base_scope(&self) -> BaseScope {
        if self.role.is_global() {
            return BaseScope::All;
        }
        match self.assigned_base {
            Some(base) => BaseScope::Only(vec![base]),
            None => BaseScope::Only(Vec::new()),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Permissions granted to each known role.
///
/// - admin: everything
/// - base_commander: record every movement kind and read everything on its base
/// - logistics_officer: purchases and transfers, plus reads on its base
///
/// Unknown roles get nothing.
pub fn role_permissions(role: &Role) -> Vec<Permission> {
    let reads = [
        Permission::READ_TRANSACTIONS,
        Permission::READ_INVENTORY,
        Permission::READ_DASHBOARD,
    ];

    match role.as_str() {
        "admin" => vec![Permission::WILDCARD],
        "base_commander" => {
            let mut perms = vec![
                Permission::RECORD_PURCHASE,
                Permission::RECORD_TRANSFER,
                Permission::RECORD_ASSIGNMENT,
                Permission::RECORD_EXPENDITURE,
                Permission::RECORD_RETURN,
            ];
            perms.extend(reads);
            perms
        }
        "logistics_officer" => {
            let mut perms = vec![Permission::RECORD_PURCHASE, Permission::RECORD_TRANSFER];
            perms.extend(reads);
            perms
        }
        _ => Vec::new(),
    }
}

/// Check a principal holds `required`.
///
/// Pure policy check: no IO, no base scoping (the ledger scopes by base).
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let perms: HashSet<&str> = principal.permissions.iter().map(|p| p.as_str()).collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}
