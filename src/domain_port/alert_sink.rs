use crate::domain_model::Alert;

#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    async fn alert(&self, alert: Alert);
}
