//! Audit event emission for the tenant security envelope.
//!
//! A structured event is emitted for register, access, config change,
//! status change, network change, and compliance check. Events are pushed
//! synchronously from the service layer (design note: "a small
//! component called synchronously from each service operation"), avoiding
//! any hidden async fan-out that could reorder or drop events relative to
//! the operation that produced them.

use std::collections::VecDeque;
use std::sync::Mutex;

/// The kind of action an audit event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEventType {
    Register,
    Access,
    ConfigChange,
    StatusChange,
    NetworkChange,
    ComplianceCheck,
}

impl AuditEventType {
    fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::Register => "register",
            AuditEventType::Access => "access",
            AuditEventType::ConfigChange => "config_change",
            AuditEventType::StatusChange => "status_change",
            AuditEventType::NetworkChange => "network_change",
            AuditEventType::ComplianceCheck => "compliance_check",
        }
    }
}

/// A single audit record, `actor` always set to the acting tenant.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub device_id: String,
    pub tenant_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub success: bool,
    pub details: Option<String>,
    pub actor: String,
}

impl AuditEvent {
    pub fn new(
        event_type: AuditEventType,
        device_id: impl Into<String>,
        tenant_id: impl Into<String>,
        success: bool,
    ) -> Self {
        let tenant_id = tenant_id.into();
        Self {
            event_type,
            device_id: device_id.into(),
            tenant_id: tenant_id.clone(),
            timestamp: chrono::Utc::now(),
            success,
            details: None,
            actor: tenant_id,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Observer for audit events, implemented as a small synchronous sink.
///
/// A message-passing channel to a logger task is an equally valid
/// implementation; the default in-process sinks here stay synchronous
/// because emission is required to be observed before the originating
/// operation returns.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Emits every event through the `log` facade, at `info` for successes and
/// `warn` for failures, matching the rest of the crate's logging discipline.
pub struct LoggingAuditSink;

impl AuditSink for LoggingAuditSink {
    fn record(&self, event: AuditEvent) {
        if event.success {
            log::info!(
                "audit type={} device={} tenant={} actor={} details={:?}",
                event.event_type.as_str(),
                event.device_id,
                event.tenant_id,
                event.actor,
                event.details
            );
        } else {
            log::warn!(
                "audit type={} device={} tenant={} actor={} details={:?}",
                event.event_type.as_str(),
                event.device_id,
                event.tenant_id,
                event.actor,
                event.details
            );
        }
    }
}

/// Bounded in-memory ring buffer, useful for tests and operational
/// introspection of recent audit activity without a durable backend.
pub struct InMemoryAuditSink {
    capacity: usize,
    events: Mutex<VecDeque<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: Mutex::new(VecDeque::new()),
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        let mut events = self.events.lock().unwrap();
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Fans an event out to both a logging sink and an in-memory sink, the
/// default wiring used when a service is constructed without an explicit
/// sink.
pub struct CompositeAuditSink {
    sinks: Vec<Box<dyn AuditSink>>,
}

impl CompositeAuditSink {
    pub fn new(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

impl AuditSink for CompositeAuditSink {
    fn record(&self, event: AuditEvent) {
        for sink in &self.sinks {
            sink.record(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_respects_capacity() {
        let sink = InMemoryAuditSink::new(2);
        sink.record(AuditEvent::new(
                AuditEventType::Register,
                "d1",
                "tenant-a",
                true,
        ));
        sink.record(AuditEvent::new(
                AuditEventType::Access,
                "d1",
                "tenant-a",
                true,
        ));
        sink.record(AuditEvent::new(
                AuditEventType::StatusChange,
                "d1",
                "tenant-a",
                true,
        ));
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, AuditEventType::Access);
        assert_eq!(events[1].event_type, AuditEventType::StatusChange);
    }
}
