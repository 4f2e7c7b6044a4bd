use garrison_auth::{Principal, Role};
use garrison_core::{BaseAccess, BaseId, BaseScope, UserId};

/// Authenticated caller of a request, decoded from its bearer token.
///
/// Inserted by the auth middleware; every protected handler extracts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn role(&self) -> &Role {
        &self.principal.role
    }

    pub fn assigned_base(&self) -> Option<BaseId> {
        self.principal.assigned_base
    }
}

impl BaseAccess for PrincipalContext {
    fn actor_id(&self) -> UserId {
        self.principal.actor_id()
    }

    fn base_scope(&self) -> BaseScope {
        self.principal.base_scope()
    }
}
