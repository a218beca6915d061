//! Domain event bus: trait for publishing business events from any module.
//!
//! Services accept an `Arc<dyn EventSink>` and emit a `DomainEvent` for each
//! state change that other parts of the platform may react to.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CampaignActivated,
    CampaignPaused,
    CampaignArchived,
    CampaignCompleted,
    MemberEnrolled,
    EnrollmentCompleted,
    EnrollmentCancelled,
    MessageSent,
    MessageFailed,
    MessageOpened,
    MessageClicked,
    InvoiceIssued,
    InvoicePaid,
    InvoiceCancelled,
    OrderPlaced,
    OrderPaid,
    OrderCancelled,
    TenantStatusChanged,
    ImpersonationStarted,
    ImpersonationEnded,
    ApiKeyCreated,
    ApiKeyRevoked,
    InviteAccepted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub event_type: EventType,
    pub tenant_id: Option<Uuid>,
    pub subject_id: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Trait for publishing domain events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DomainEvent);
}

/// No-op sink for tests and services that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: DomainEvent) {}
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn count_type(&self, event_type: EventType) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: DomainEvent) {
        self.events.lock().push(event);
    }
}

/// Convenience builder for a `DomainEvent` stamped now.
pub fn make_event(
    event_type: EventType,
    tenant_id: Option<Uuid>,
    subject_id: impl ToString,
    payload: serde_json::Value,
) -> DomainEvent {
    DomainEvent {
        id: Uuid::new_v4(),
        event_type,
        tenant_id,
        subject_id: subject_id.to_string(),
        payload,
        timestamp: Utc::now(),
    }
}

pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_sink() {
        let sink = capture_sink();
        assert_eq!(sink.count(), 0);

        let tenant = Uuid::new_v4();
        sink.emit(make_event(
            EventType::MemberEnrolled,
            Some(tenant),
            "enr-1",
            serde_json::json!({"campaign_id": "c-1"}),
        ));
        sink.emit(make_event(
            EventType::MessageSent,
            Some(tenant),
            "log-1",
            serde_json::Value::Null,
        ));

        assert_eq!(sink.count(), 2);
        assert_eq!(sink.count_type(EventType::MemberEnrolled), 1);
        assert_eq!(sink.count_type(EventType::MessageSent), 1);

        let events = sink.events();
        assert_eq!(events[0].subject_id, "enr-1");
        assert_eq!(events[0].payload["campaign_id"], "c-1");

        sink.clear();
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_noop_sink() {
        let sink = noop_sink();
        sink.emit(make_event(EventType::OrderPaid, None, "ord-1", serde_json::Value::Null));
    }
}
