use crate::domain_model::{Alert, MutationKind};
use crate::domain_port::AlertSink;
use std::sync::Mutex;

/// Keeps every alert so callers can assert on what the member would have seen.
#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kinds(&self) -> Vec<MutationKind> {
        match self.alerts.lock() {
            Ok(alerts) => alerts.iter().map(|a| a.kind).collect(),
            Err(poisoned) => poisoned.into_inner().iter().map(|a| a.kind).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.kinds().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl AlertSink for RecordingAlertSink {
    async fn alert(&self, alert: Alert) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert);
        }
    }
}
