use chrono::{DateTime, Utc};

/// A domain event emitted after a ledger commit.
///
/// Events are facts: they describe something the ledger already made durable,
/// never a request to change state.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "inventory.purchase_recorded").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the underlying movement happened (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
