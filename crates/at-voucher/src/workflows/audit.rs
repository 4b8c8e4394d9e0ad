//! Append-only audit trail of state transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::accounts::UserId;
use super::sequence::Sequence;
use crate::store::RepositoryError;

static EVENT_SEQUENCE: Sequence = Sequence::new("evt");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub actor_id: Option<UserId>,
    pub action: String,
    pub auditable_kind: String,
    pub auditable_id: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn new(
        actor_id: Option<&UserId>,
        action: &str,
        auditable_kind: &str,
        auditable_id: &str,
        metadata: Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EVENT_SEQUENCE.next_id(),
            actor_id: actor_id.cloned(),
            action: action.to_string(),
            auditable_kind: auditable_kind.to_string(),
            auditable_id: auditable_id.to_string(),
            metadata,
            created_at,
        }
    }
}

pub trait EventLog: Send + Sync {
    fn append_event(&self, event: Event) -> Result<(), RepositoryError>;
    fn events_for(&self, kind: &str, id: &str) -> Result<Vec<Event>, RepositoryError>;
}

/// Append an event; audit failures are logged rather than failing the business operation.
pub(crate) fn record(log: &dyn EventLog, event: Event) {
    let action = event.action.clone();
    if let Err(err) = log.append_event(event) {
        warn!(%action, error = %err, "failed to append audit event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn events_are_listed_per_auditable() {
        let store = MemoryStore::default();
        let now = Utc::now();
        let actor = UserId("usr-1".to_string());
        record(
            &store,
            Event::new(Some(&actor), "proof_approved", "application", "app-1", json!({}), now),
        );
        record(
            &store,
            Event::new(None, "voucher_expired", "voucher", "ABC", json!({}), now),
        );

        let events = store.events_for("application", "app-1").expect("list");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, "proof_approved");
        assert_eq!(events[0].actor_id.as_ref(), Some(&actor));
    }
}
