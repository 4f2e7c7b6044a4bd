use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier (e.g. "transactions.purchase").
///
/// `"*"` is the wildcard granted to administrators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));
    pub const RECORD_PURCHASE: Permission = Permission(Cow::Borrowed("transactions.purchase"));
    pub const RECORD_TRANSFER: Permission = Permission(Cow::Borrowed("transactions.transfer"));
    pub const RECORD_ASSIGNMENT: Permission = Permission(Cow::Borrowed("transactions.assignment"));
    pub const RECORD_EXPENDITURE: Permission =
        Permission(Cow::Borrowed("transactions.expenditure"));
    pub const RECORD_RETURN: Permission = Permission(Cow::Borrowed("transactions.return"));
    pub const ESTABLISH_OPENING_BALANCE: Permission =
        Permission(Cow::Borrowed("inventory.opening_balance"));
    pub const READ_TRANSACTIONS: Permission = Permission(Cow::Borrowed("transactions.read"));
    pub const READ_INVENTORY: Permission = Permission(Cow::Borrowed("inventory.read"));
    pub const READ_DASHBOARD: Permission = Permission(Cow::Borrowed("dashboard.read"));
    pub const RECONCILE: Permission = Permission(Cow::Borrowed("inventory.reconcile"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
