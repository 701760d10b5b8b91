//! Lifecycle notifications, published after the owning transaction commits.
//!
//! Sinks run outside the transaction and cannot fail the operation that
//! produced the event. Outgoing webhook delivery would be another sink.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Mutex;
use uuid::Uuid;

use crate::domain::LeadStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event")]
pub enum LifecycleEvent {
    #[serde(rename = "pre_lead.created")]
    PreLeadCreated { pre_lead_id: Uuid, source: String },
    #[serde(rename = "pre_lead.validated")]
    PreLeadValidated { pre_lead_id: Uuid, lead_id: Uuid },
    #[serde(rename = "pre_lead.discarded")]
    PreLeadDiscarded { pre_lead_id: Uuid },
    #[serde(rename = "lead.created")]
    LeadCreated { lead_id: Uuid },
    #[serde(rename = "lead.stage_changed")]
    LeadStageChanged { lead_id: Uuid, from: LeadStatus, to: LeadStatus },
    #[serde(rename = "lead.discarded")]
    LeadDiscarded { lead_id: Uuid },
    #[serde(rename = "lead.converted")]
    LeadConverted {
        lead_id: Uuid,
        customer_id: Uuid,
        customer_code: String,
        contacts_moved: u64,
    },
    #[serde(rename = "customer.updated")]
    CustomerUpdated { customer_id: Uuid },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::PreLeadCreated { .. } => "pre_lead.created",
            LifecycleEvent::PreLeadValidated { .. } => "pre_lead.validated",
            LifecycleEvent::PreLeadDiscarded { .. } => "pre_lead.discarded",
            LifecycleEvent::LeadCreated { .. } => "lead.created",
            LifecycleEvent::LeadStageChanged { .. } => "lead.stage_changed",
            LifecycleEvent::LeadDiscarded { .. } => "lead.discarded",
            LifecycleEvent::LeadConverted { .. } => "lead.converted",
            LifecycleEvent::CustomerUpdated { .. } => "customer.updated",
        }
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: LifecycleEvent);
}

/// Writes each event to the `crm_api::events` tracing target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn publish(&self, event: LifecycleEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => tracing::info!(target: "crm_api::events", event = event.name(), %payload, "lifecycle event"),
            Err(e) => tracing::warn!(event = event.name(), "failed to serialize lifecycle event: {}", e),
        }
    }
}

/// Keeps published events in memory; used by tests to assert on side effects.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(LifecycleEvent::name).collect()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn publish(&self, event: LifecycleEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_dotted_event_name() {
        let id = Uuid::nil();
        let json = serde_json::to_value(LifecycleEvent::LeadDiscarded { lead_id: id }).unwrap();
        assert_eq!(json["event"], "lead.discarded");
        assert_eq!(json["lead_id"], id.to_string());
    }

    #[tokio::test]
    async fn recording_sink_keeps_order() {
        let sink = RecordingEventSink::new();
        sink.publish(LifecycleEvent::LeadCreated { lead_id: Uuid::nil() }).await;
        sink.publish(LifecycleEvent::CustomerUpdated { customer_id: Uuid::nil() }).await;
        assert_eq!(sink.names(), vec!["lead.created", "customer.updated"]);
    }
}
