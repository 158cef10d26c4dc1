use std::sync::Arc;
use wayfarer::application_port::*;
use wayfarer::client::Client;
use wayfarer::domain_model::*;
use wayfarer::domain_port::{AlertSink, StoreError};
use wayfarer::infra_local::*;
use wayfarer::logger::*;
use wayfarer::settings::*;

/// Walks two members through request, accept and unfriend against the
/// in-memory backend.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logger = Logger::new_bootstrap()?;

    let project_settings = parse_settings(cli.settings.as_deref())?;
    info!(?project_settings);
    logger.reload_from_settings(&project_settings.log)?;

    if project_settings.store.backend != "memory" {
        return Err(anyhow::anyhow!(
            "Unknown store backend: {}",
            project_settings.store.backend
        ));
    }
    if project_settings.auth.backend != "memory" {
        return Err(anyhow::anyhow!(
            "Unknown auth backend: {}",
            project_settings.auth.backend
        ));
    }

    let store = Arc::new(MemoryRemoteStore::new());
    let alerts: Arc<dyn AlertSink> = Arc::new(TracingAlertSink);
    let alice = Identity::new("u1", "alice");
    let bob = Identity::new("u2", "bob");
    for member in [&alice, &bob] {
        store.seed_profile(
            &member.member_id,
            &ProfileDocument {
                display_name: member.display_name.clone(),
                ..Default::default()
            },
        )?;
    }

    // alice's device
    let alice_auth = Arc::new(MemoryAuthProvider::new());
    let alice_client = Client::new(
        &project_settings.community,
        store.clone(),
        alice_auth.clone(),
        alerts.clone(),
    );
    alice_auth.sign_in(alice.clone());
    let alice_session = alice_client
        .wait_for_session(&alice.member_id)
        .await?;

    let hits = alice_session.search_members(&cli.search).await?;
    info!("search {:?} -> {:?}", cli.search, hits);
    let Some(target) = hits.into_iter().find(|m| m.member_id == bob.member_id) else {
        return Err(anyhow::anyhow!("bob not found by prefix {:?}", cli.search));
    };
    report("send request", alice_session.send_request(&target).settled().await);
    report("send again", alice_session.send_request(&target).settled().await);

    // bob's device
    let bob_auth = Arc::new(MemoryAuthProvider::new());
    let bob_client = Client::new(
        &project_settings.community,
        store.clone(),
        bob_auth.clone(),
        alerts.clone(),
    );
    bob_auth.sign_in(bob.clone());
    let bob_session = bob_client
        .wait_for_session(&bob.member_id)
        .await?;

    let incoming = bob_session.refresh().await?.incoming;
    let Some(request) = incoming.first() else {
        return Err(anyhow::anyhow!("bob has no incoming request"));
    };
    report(
        "accept request",
        bob_session.accept_request(&request.request_id).settled().await,
    );
    info!(
        "alice sees bob as {:?}",
        alice_session.refresh().await?.relation_to(&alice.member_id, &bob.member_id)
    );

    // a failed write is rolled back
    store.fail_writes(StoreError::Unavailable("demo outage".into()));
    report(
        "remove friend (outage)",
        alice_session.remove_friend(&bob.member_id).settled().await,
    );
    info!("alice friends after rollback: {:?}", alice_session.snapshot().friends);
    store.clear_faults();
    report(
        "remove friend",
        alice_session.remove_friend(&bob.member_id).settled().await,
    );

    alice_auth.sign_out();
    alice_client.shutdown().await;
    bob_client.shutdown().await;
    info!("listeners left open: {}", store.listener_count());

    Ok(())
}

fn report(step: &str, state: MutationState) {
    match state {
        MutationState::Committed => info!("{step}: committed"),
        MutationState::Skipped(reason) => info!("{step}: skipped ({reason})"),
        MutationState::RolledBack(reason) => warn!("{step}: rolled back ({reason})"),
        MutationState::Applied => warn!("{step}: still pending"),
    }
}
