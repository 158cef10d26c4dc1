use crate::application_impl::*;
use crate::application_port::CommunityService;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use crate::settings::Community;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to open session for {member}: {reason}")]
    OpenFailed { member: MemberId, reason: String },

    #[error("session for {0} closed before its listeners were ready")]
    NotReady(MemberId),

    #[error("client is shut down")]
    Closed,
}

/// Last session the supervisor could not open.
#[derive(Debug, Clone)]
pub struct OpenFailure {
    pub member: MemberId,
    pub reason: String,
}

/// Follows the auth provider and keeps exactly one community session alive for
/// whoever is signed in.
pub struct Client {
    session: Arc<watch::Sender<Option<Arc<CommunitySession>>>>,
    failure: Arc<watch::Sender<Option<OpenFailure>>>,
    supervisor_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl Client {
    pub fn new(
        settings: &Community,
        store: Arc<dyn RemoteStore>,
        auth: Arc<dyn AuthProvider>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let session = Arc::new(watch::Sender::new(None));
        let failure = Arc::new(watch::Sender::new(None));

        let supervisor = Supervisor {
            store,
            alerts,
            config: SessionConfig {
                search_limit: settings.search_limit,
            },
            session: session.clone(),
            failure: failure.clone(),
        };
        let supervisor_handle = tokio::spawn(supervisor.run(auth, cancel.clone()));

        info!("client started");

        Self {
            session,
            failure,
            supervisor_handle: Mutex::new(Some(supervisor_handle)),
            cancel,
        }
    }

    pub fn session(&self) -> Option<Arc<CommunitySession>> {
        self.session.borrow().clone()
    }

    pub fn watch_session(&self) -> watch::Receiver<Option<Arc<CommunitySession>>> {
        self.session.subscribe()
    }

    /// Waits until a session for `member` is open and its listeners are ready,
    /// or until the supervisor reports that opening it failed.
    pub async fn wait_for_session(
        &self,
        member: &MemberId,
    ) -> Result<Arc<CommunitySession>, ClientError> {
        let mut sessions = self.session.subscribe();
        let mut failures = self.failure.subscribe();

        let session = tokio::select! {
            found = sessions.wait_for(|s| {
                s.as_ref()
                    .is_some_and(|s| &s.identity().member_id == member)
            }) => found.map_err(|_| ClientError::Closed)?.clone(),
            failed = failures.wait_for(|f| f.as_ref().is_some_and(|f| &f.member == member)) => {
                let failure = failed.map_err(|_| ClientError::Closed)?.clone();
                return Err(match failure {
                    Some(OpenFailure { member, reason }) => ClientError::OpenFailed { member, reason },
                    None => ClientError::Closed,
                });
            }
        };
        let session = session.ok_or(ClientError::Closed)?;

        if session.wait_ready().await {
            Ok(session)
        } else {
            Err(ClientError::NotReady(member.clone()))
        }
    }

    pub async fn shutdown(&self) {
        info!("client shutting down...");

        self.cancel.cancel();

        let handle = match self.supervisor_handle.lock() {
            Ok(mut lock) => lock.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            let r = handle.await;
            info!("supervisor handle dropped: {:?}", r);
        }
    }
}

struct Supervisor {
    store: Arc<dyn RemoteStore>,
    alerts: Arc<dyn AlertSink>,
    config: SessionConfig,
    session: Arc<watch::Sender<Option<Arc<CommunitySession>>>>,
    failure: Arc<watch::Sender<Option<OpenFailure>>>,
}

impl Supervisor {
    async fn run(self, auth: Arc<dyn AuthProvider>, cancel: CancellationToken) {
        let mut changes = auth.watch();
        let mut identity = auth.current_identity();
        loop {
            self.switch_to(identity).await;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = changes.changed() => {
                    if changed.is_err() {
                        warn!("auth provider went away");
                        break;
                    }
                }
            }
            identity = changes.borrow_and_update().clone();
        }

        self.switch_to(None).await;
        info!("supervisor shutting down...");
    }

    async fn switch_to(&self, identity: Option<Identity>) {
        let current = self.session.borrow().clone();
        if let (Some(current), Some(identity)) = (&current, &identity) {
            if current.identity() == identity {
                return;
            }
        }

        if let Some(previous) = current {
            previous.dispose().await;
            self.session.send_replace(None);
        }

        let Some(identity) = identity else {
            return;
        };
        let member = identity.member_id.clone();
        self.failure.send_replace(None);
        match CommunitySession::open(
            identity,
            self.store.clone(),
            self.alerts.clone(),
            self.config.clone(),
        )
        .await
        {
            Ok(session) => {
                let session = Arc::new(session);
                session.activate().await;
                self.session.send_replace(Some(session));
                info!("session opened for {member}");
            }
            Err(e) => {
                error!("failed to open session for {member}: {e}");
                self.failure.send_replace(Some(OpenFailure {
                    member,
                    reason: e.to_string(),
                }));
            }
        }
    }
}
