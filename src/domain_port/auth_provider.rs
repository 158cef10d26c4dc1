use crate::domain_model::Identity;
use tokio::sync::watch;

pub trait AuthProvider: Send + Sync {
    fn current_identity(&self) -> Option<Identity>;
    /// Yields `None` on sign-out.
    fn watch(&self) -> watch::Receiver<Option<Identity>>;
}
