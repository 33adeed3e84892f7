//! Tandem sync demo.
//!
//! Runs the sync core against in-memory collaborators: sign in, a burst of
//! edits, an edit from "another device", then sign out. Set `RUST_LOG` to
//! adjust verbosity and the `TANDEM_*` variables to tune timings.

use std::sync::Arc;
use std::time::Duration;

use tandem_engine::{Action, Dispatcher, Identity, MemoryCache, Profile, Role, Store};
use tandem_sync::{
    IdentityHandle, MemoryDocumentStore, Result, SyncConfig, SyncService, SyncState,
};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tandem_sync=debug,tandem_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = SyncConfig::from_env()?;
    let debounce = config.debounce;

    // Wire the core
    let dispatcher = Dispatcher::new();
    let cache = Arc::new(MemoryCache::new());
    let store = Store::new(&dispatcher, cache, config.store_config());
    let identity = IdentityHandle::new();
    let remote = Arc::new(MemoryDocumentStore::new());

    let service = SyncService::spawn(
        config,
        dispatcher.clone(),
        store.clone(),
        remote.clone(),
        &identity,
    );
    let mut sync_state = service.watch_state();

    dispatcher.dispatch(Action::SetLoading(true));
    dispatcher.dispatch(Action::LoadProfile);

    // Sign in: no document yet, so the session seeds one.
    identity.sign_in(Identity::new("u1").with_display_name("La Taqueria"));
    wait_until(&mut sync_state, |s| s.is_connected && !s.is_syncing).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    tracing::info!(profile = ?store.current_profile(), "Signed in");

    // A burst of keystrokes collapses into one write.
    let base = store
        .current_profile()
        .unwrap_or_else(|| Profile::new("", "La Taqueria", Role::Restaurant));
    for bio in ["G", "Gr", "Great", "Great t", "Great tacos"] {
        let edited = Profile {
            handle: "taqueria".into(),
            role: Role::Restaurant,
            ..base.clone()
        }
        .with_bio(bio);
        dispatcher.dispatch(Action::UpdateProfile(edited));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(debounce * 2).await;
    tracing::info!(
        writes = remote.write_count("u1"),
        remote = ?remote.document("u1"),
        "Edits written"
    );

    // Another device changes the profile.
    if let Some(current) = remote.document("u1") {
        remote.put_external("u1", &current.with_location("Mission St"));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    tracing::info!(profile = ?store.current_profile(), "Remote change applied");

    // Sign out clears local state.
    identity.sign_out();
    wait_until(&mut sync_state, |s| !s.is_authenticated).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    tracing::info!(profile = ?store.current_profile(), "Signed out");

    service.shutdown().await?;
    Ok(())
}

async fn wait_until<F>(state: &mut watch::Receiver<SyncState>, predicate: F)
where
    F: Fn(&SyncState) -> bool,
{
    let timed_out = tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| predicate(s)))
        .await
        .is_err();
    if timed_out {
        tracing::warn!(state = ?*state.borrow(), "Timed out waiting for sync state");
    }
}
