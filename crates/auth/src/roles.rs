use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier used for RBAC.
///
/// Roles travel as opaque strings in tokens; the three roles the ledger knows
/// about are exposed as constants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    pub const BASE_COMMANDER: Role = Role(Cow::Borrowed("base_commander"));
    pub const LOGISTICS_OFFICER: Role = Role(Cow::Borrowed("logistics_officer"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Administrators are not bound to a single base.
    pub fn is_global(&self) -> bool {
        *self == Role::ADMIN
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
