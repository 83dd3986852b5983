//! Billing customer record.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{CustomerId, Timestamp, UserId};

/// A provider customer known locally.
///
/// Created lazily on first sight; `linked_user_id` is back-filled once a
/// user identity shows up in a later event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub provider_customer_id: String,
    pub linked_user_id: Option<UserId>,
    pub created_at: Timestamp,
}

impl Customer {
    pub fn new(provider_customer_id: impl Into<String>, linked_user_id: Option<UserId>) -> Self {
        Self {
            id: CustomerId::new(),
            provider_customer_id: provider_customer_id.into(),
            linked_user_id,
            created_at: Timestamp::now(),
        }
    }

    pub fn is_linked(&self) -> bool {
        self.linked_user_id.is_some()
    }
}
