use serde::{Deserialize, Serialize};
use uuid::Uuid;

use garrison_core::UserId;

/// Envelope for a published event, carrying actor + ordering metadata.
///
/// - `actor_id` is the principal whose request produced the event.
/// - `resource_type`/`resource_id` name what the event is about (a ledger row,
///   a transfer pair, a balance record).
/// - `sequence_number` is the ledger commit sequence the event was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    actor_id: UserId,

    resource_type: String,
    resource_id: Uuid,

    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        actor_id: UserId,
        resource_type: impl Into<String>,
        resource_id: Uuid,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            actor_id,
            resource_type: resource_type.into(),
            resource_id,
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn actor_id(&self) -> UserId {
        self.actor_id
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn resource_id(&self) -> Uuid {
        self.resource_id
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
