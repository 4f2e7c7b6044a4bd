use serde::{Deserialize, Serialize};

use garrison_core::{BaseId, Entity};

/// A military base holding stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Base {
    pub id: BaseId,
    pub code: String,
    pub name: String,
}

impl Base {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: BaseId::new(),
            code: code.into(),
            name: name.into(),
        }
    }
}

impl Entity for Base {
    type Id = BaseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
