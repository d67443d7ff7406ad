use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orderlink_core::{DomainError, DomainResult, Entity, OrderId};

pub const DESCRIPTION_MIN_CHARS: usize = 3;
pub const DESCRIPTION_MAX_CHARS: usize = 255;

/// Validated mutable fields of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    description: String,
}

impl OrderDraft {
    pub fn new(description: impl Into<String>) -> DomainResult<Self> {
        let description = description.into().trim().to_string();
        if description.is_empty() {
            return Err(DomainError::validation("description cannot be empty"));
        }
        let len = description.chars().count();
        if !(DESCRIPTION_MIN_CHARS..=DESCRIPTION_MAX_CHARS).contains(&len) {
            return Err(DomainError::validation(format!(
                "description must be between {DESCRIPTION_MIN_CHARS} and {DESCRIPTION_MAX_CHARS} characters"
            )));
        }
        Ok(Self { description })
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Order record as held by the order ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn create(id: OrderId, draft: OrderDraft, at: DateTime<Utc>) -> Self {
        Self {
            id,
            description: draft.description,
            created_at: at,
            updated_at: at,
            deleted_at: None,
        }
    }

    pub fn apply_draft(&mut self, draft: OrderDraft, at: DateTime<Utc>) {
        self.description = draft.description;
        self.updated_at = at;
    }

    pub fn tombstone(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
        self.updated_at = at;
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> OrderId {
        self.id
    }

    fn is_tombstoned(&self) -> bool {
        self.deleted_at.is_some()
    }
}
