use crate::domain_model::Identity;
use crate::domain_port::AuthProvider;
use tokio::sync::watch;

/// Auth state held in memory; sign-in and sign-out are driven by the caller.
pub struct MemoryAuthProvider {
    state: watch::Sender<Option<Identity>>,
}

impl MemoryAuthProvider {
    pub fn new() -> Self {
        Self {
            state: watch::Sender::new(None),
        }
    }

    pub fn sign_in(&self, identity: Identity) {
        tracing::info!("signed in as {}", identity.member_id);
        self.state.send_replace(Some(identity));
    }

    pub fn sign_out(&self) {
        if let Some(previous) = self.state.send_replace(None) {
            tracing::info!("signed out {}", previous.member_id);
        }
    }
}

impl Default for MemoryAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthProvider for MemoryAuthProvider {
    fn current_identity(&self) -> Option<Identity> {
        self.state.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<Option<Identity>> {
        self.state.subscribe()
    }
}
