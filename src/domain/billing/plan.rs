//! Plan reference data.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::PlanId;

/// A local billing tier mapped to a provider price. Read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub provider_price_id: String,
    pub name: String,
}

impl Plan {
    pub fn new(id: PlanId, provider_price_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            provider_price_id: provider_price_id.into(),
            name: name.into(),
        }
    }
}
