use crate::domain_model::Alert;
use crate::domain_port::AlertSink;

#[derive(Debug, Default)]
pub struct TracingAlertSink;

#[async_trait::async_trait]
impl AlertSink for TracingAlertSink {
    async fn alert(&self, alert: Alert) {
        tracing::warn!(kind = ?alert.kind, at = %alert.raised_at, "{}", alert.message);
    }
}
