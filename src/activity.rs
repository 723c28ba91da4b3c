// src/activity.rs
//! User-facing audit trail of what the sourcing funnel did.
//!
//! Recording is fire-and-forget: implementations must not block for long
//! and must never fail the caller.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

pub const ACTIVITY_CAP: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    InProgress,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::InProgress => "in_progress",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityEvent {
    pub at: DateTime<Utc>,
    pub event_type: String,
    pub message: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

pub trait ActivitySink: Send + Sync {
    fn record(&self, event_type: &str, message: &str, severity: Severity, details: Option<Value>);
}

/// Forwards events to `tracing` (target `activity`).
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingActivity;

impl ActivitySink for TracingActivity {
    fn record(&self, event_type: &str, message: &str, severity: Severity, details: Option<Value>) {
        let details = details.map(|d| d.to_string()).unwrap_or_default();
        match severity {
            Severity::Error => tracing::error!(target: "activity", event_type, details = details.as_str(), "{message}"),
            Severity::Warning => tracing::warn!(target: "activity", event_type, details = details.as_str(), "{message}"),
            _ => tracing::info!(
                target: "activity",
                event_type,
                severity = severity.as_str(),
                details = details.as_str(),
                "{message}"
            ),
        }
    }
}

/// Bounded ring buffer of recent events, newest last.
#[derive(Debug)]
pub struct MemoryActivity {
    inner: Mutex<VecDeque<ActivityEvent>>,
    cap: usize,
}

impl MemoryActivity {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(cap.min(ACTIVITY_CAP))),
            cap,
        }
    }

    /// Up to `n` most recent events, newest first.
    pub fn recent(&self, n: usize) -> Vec<ActivityEvent> {
        let q = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        q.iter().rev().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryActivity {
    fn default() -> Self {
        Self::with_capacity(ACTIVITY_CAP)
    }
}

impl ActivitySink for MemoryActivity {
    fn record(&self, event_type: &str, message: &str, severity: Severity, details: Option<Value>) {
        let ev = ActivityEvent {
            at: Utc::now(),
            event_type: event_type.to_string(),
            message: message.to_string(),
            severity,
            details,
        };
        // A poisoned lock still holds a usable buffer.
        let mut q = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if q.len() >= self.cap {
            q.pop_front();
        }
        q.push_back(ev);
    }
}

/// Fan-out to several sinks, e.g. tracing plus the in-memory buffer.
pub struct TeeActivity {
    sinks: Vec<Arc<dyn ActivitySink>>,
}

impl TeeActivity {
    pub fn new(sinks: Vec<Arc<dyn ActivitySink>>) -> Self {
        Self { sinks }
    }
}

impl ActivitySink for TeeActivity {
    fn record(&self, event_type: &str, message: &str, severity: Severity, details: Option<Value>) {
        for s in &self.sinks {
            s.record(event_type, message, severity, details.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ring_buffer_keeps_newest() {
        let m = MemoryActivity::with_capacity(3);
        for i in 0..5 {
            m.record("sourcing", &format!("step {i}"), Severity::Info, None);
        }
        assert_eq!(m.len(), 3);
        let recent: Vec<_> = m.recent(10).into_iter().map(|e| e.message).collect();
        assert_eq!(recent, vec!["step 4", "step 3", "step 2"]);
    }

    #[test]
    fn tee_reaches_every_sink() {
        let a = Arc::new(MemoryActivity::default());
        let b = Arc::new(MemoryActivity::default());
        let sinks: Vec<Arc<dyn ActivitySink>> = vec![a.clone(), b.clone(), Arc::new(TracingActivity)];
        let tee = TeeActivity::new(sinks);
        tee.record("sourcing", "done", Severity::Success, Some(json!({"n": 3})));
        assert_eq!(a.len(), 1);
        assert_eq!(b.recent(1)[0].details, Some(json!({"n": 3})));
    }

    #[test]
    fn severity_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(Severity::InProgress).unwrap(),
            json!("in_progress")
        );
    }
}
