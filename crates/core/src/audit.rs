use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::advance::AdvanceId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Submission,
    Approval,
    Reconciliation,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub advance_id: Option<AdvanceId>,
    pub correlation_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        advance_id: Option<AdvanceId>,
        correlation_id: impl Into<String>,
        event_type: impl Into<String>,
        category: AuditCategory,
        actor: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            advance_id,
            correlation_id: correlation_id.into(),
            event_type: event_type.into(),
            category,
            actor: actor.into(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Receives audit events. Implementations must not write to the advance store.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Writes each audit event as one structured log line. Failed outcomes log
/// at `warn`, everything else at `info`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let advance_id = event.advance_id.as_ref().map(|id| id.0.as_str()).unwrap_or("none");
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();

        match event.outcome {
            AuditOutcome::Success | AuditOutcome::Rejected => info!(
                event_name = %event.event_type,
                correlation_id = %event.correlation_id,
                advance_id,
                actor = %event.actor,
                outcome = ?event.outcome,
                category = ?event.category,
                audit_event_id = %event.event_id,
                metadata = %metadata,
                "audit"
            ),
            AuditOutcome::Failed => warn!(
                event_name = %event.event_type,
                correlation_id = %event.correlation_id,
                advance_id,
                actor = %event.actor,
                outcome = ?event.outcome,
                category = ?event.category,
                audit_event_id = %event.event_id,
                metadata = %metadata,
                "audit"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use tracing_subscriber::fmt::MakeWriter;

    use crate::{
        audit::{
            AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
            TracingAuditSink,
        },
        domain::advance::AdvanceId,
    };

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl CapturedLog {
        fn lines(&self) -> Vec<String> {
            let bytes = match self.0.lock() {
                Ok(bytes) => bytes.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            };
            String::from_utf8_lossy(&bytes).lines().map(str::to_owned).collect()
        }
    }

    impl io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            match self.0.lock() {
                Ok(mut bytes) => bytes.extend_from_slice(buf),
                Err(poisoned) => poisoned.into_inner().extend_from_slice(buf),
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLog {
        type Writer = CapturedLog;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn decision(outcome: AuditOutcome) -> AuditEvent {
        AuditEvent::new(
            Some(AdvanceId("ADV-2026-0042".to_owned())),
            "req-123",
            "advance.approve",
            AuditCategory::Approval,
            "u-manager",
            outcome,
        )
    }

    #[test]
    fn in_memory_sink_records_events_with_correlation_fields() {
        let sink = InMemoryAuditSink::default();
        sink.emit(
            AuditEvent::new(
                Some(AdvanceId("ADV-2026-0042".to_owned())),
                "req-123",
                "advance.approve",
                AuditCategory::Approval,
                "u-manager",
                AuditOutcome::Success,
            )
            .with_metadata("status", "approved"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "req-123");
        assert_eq!(events[0].advance_id.as_ref().map(|id| id.0.as_str()), Some("ADV-2026-0042"));
        assert_eq!(events[0].metadata.get("status").map(String::as_str), Some("approved"));
    }

    #[test]
    fn tracing_sink_logs_failures_at_warn_and_other_outcomes_at_info() {
        let log = CapturedLog::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(log.clone())
            .with_ansi(false)
            .with_target(false)
            .without_time()
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let sink = TracingAuditSink;
            sink.emit(decision(AuditOutcome::Success).with_metadata("status", "approved"));
            sink.emit(
                decision(AuditOutcome::Rejected).with_metadata("error_kind", "limit_exceeded"),
            );
            sink.emit(
                decision(AuditOutcome::Failed).with_metadata("error_kind", "transport_failure"),
            );
        });

        let lines = log.lines();
        assert_eq!(lines.len(), 3, "{lines:?}");
        assert!(lines[0].trim_start().starts_with("INFO"), "{}", lines[0]);
        assert!(lines[1].trim_start().starts_with("INFO"), "{}", lines[1]);
        assert!(lines[1].contains("limit_exceeded"));
        assert!(lines[2].trim_start().starts_with("WARN"), "{}", lines[2]);
        assert!(lines[2].contains("transport_failure"));
        assert!(lines.iter().all(|line| line.contains("correlation_id=req-123")));
        assert!(lines.iter().all(|line| line.contains("ADV-2026-0042")));
    }
}
