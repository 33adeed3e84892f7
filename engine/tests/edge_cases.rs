//! Edge case tests for tandem-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use tandem_engine::{
    Action, Dispatcher, LocalCache, MemoryCache, Profile, Role, Store, StoreConfig, StoreState,
    WireAction, DEFAULT_CACHE_KEY,
};

fn create_store() -> (Dispatcher, Arc<MemoryCache>, Arc<Store>) {
    let dispatcher = Dispatcher::new();
    let cache = Arc::new(MemoryCache::new());
    let store = Store::new(&dispatcher, cache.clone(), StoreConfig::default());
    (dispatcher, cache, store)
}

// ============================================================================
// String Edge Cases
// ============================================================================

#[test]
fn empty_string_fields() {
    let (dispatcher, _, store) = create_store();
    let profile = Profile::new("", "", Role::Person);

    dispatcher.dispatch(Action::UpdateProfile(profile.clone()));

    assert_eq!(store.current_profile(), Some(profile));
}

#[test]
fn unicode_strings_survive_the_cache() {
    let bios = vec![
        "日本語テスト",
        "Привет мир",
        "🎉🚀💯",
        "Hello\nWorld\tTab",
        "Null\0Test",
    ];

    for bio in bios {
        let (dispatcher, cache, _) = create_store();
        dispatcher.dispatch(Action::UpdateProfile(
            Profile::new("ana", "Ana", Role::Person).with_bio(bio),
        ));

        // Warm start in a fresh store backed by the same cache
        let fresh_dispatcher = Dispatcher::new();
        let fresh = Store::new(&fresh_dispatcher, cache.clone(), StoreConfig::default());
        fresh_dispatcher.dispatch(Action::LoadProfile);

        assert_eq!(fresh.current_profile().unwrap().bio, bio, "Failed for: {}", bio);
    }
}

#[test]
fn very_long_bio() {
    let (dispatcher, _, store) = create_store();
    let long_bio = "x".repeat(1024 * 1024);

    dispatcher.dispatch(Action::UpdateProfile(
        Profile::new("ana", "Ana", Role::Person).with_bio(long_bio.clone()),
    ));

    assert_eq!(store.current_profile().unwrap().bio.len(), long_bio.len());
}

// ============================================================================
// Cache Edge Cases
// ============================================================================

#[test]
fn custom_cache_key_is_honored() {
    let dispatcher = Dispatcher::new();
    let cache = Arc::new(MemoryCache::new());
    let _store = Store::new(
        &dispatcher,
        cache.clone(),
        StoreConfig {
            cache_key: "profiles/u1".into(),
        },
    );

    dispatcher.dispatch(Action::UpdateProfile(Profile::new("ana", "Ana", Role::Person)));

    assert!(cache.peek("profiles/u1").is_some());
    assert!(cache.peek(DEFAULT_CACHE_KEY).is_none());
}

#[test]
fn failing_cache_on_clear_still_resets_profile() {
    let (dispatcher, cache, store) = create_store();
    dispatcher.dispatch(Action::UpdateProfile(Profile::new("ana", "Ana", Role::Person)));
    cache.set_failing(true);

    dispatcher.dispatch(Action::ClearProfile);

    let state = store.get_state();
    assert_eq!(state.current_profile, None);
    assert!(state.error.is_some());
}

#[test]
fn cache_recovers_after_failure() {
    let (dispatcher, cache, store) = create_store();
    cache.set_failing(true);
    dispatcher.dispatch(Action::LoadProfile);
    assert!(store.get_state().error.is_some());

    cache.set_failing(false);
    cache
        .set(
            DEFAULT_CACHE_KEY,
            &serde_json::to_string(&Profile::new("ana", "Ana", Role::Person)).unwrap(),
        )
        .unwrap();
    dispatcher.dispatch(Action::LoadProfile);

    let state = store.get_state();
    assert_eq!(state.error, None);
    assert_eq!(state.current_profile.unwrap().handle, "ana");
}

// ============================================================================
// Dispatcher / Store Interplay
// ============================================================================

#[test]
fn two_stores_share_one_dispatcher() {
    let dispatcher = Dispatcher::new();
    let a = Store::new(&dispatcher, Arc::new(MemoryCache::new()), StoreConfig::default());
    let b = Store::new(&dispatcher, Arc::new(MemoryCache::new()), StoreConfig::default());

    dispatcher.dispatch(Action::SetSyncing(true));

    assert!(a.get_state().is_syncing);
    assert!(b.get_state().is_syncing);
}

#[test]
fn subscriber_may_dispatch_reentrantly() {
    let (dispatcher, _, store) = create_store();
    let inner = dispatcher.clone();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();

    let _sub = store.subscribe(move |state: &StoreState| {
        if state.current_profile.is_some() && !state.is_syncing {
            counter.fetch_add(1, Ordering::SeqCst);
            inner.dispatch(Action::SetSyncing(true));
        }
    });

    dispatcher.dispatch(Action::UpdateProfile(Profile::new("ana", "Ana", Role::Person)));

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(store.get_state().is_syncing);
}

#[test]
fn wire_actions_drive_the_store() {
    let (dispatcher, _, store) = create_store();
    let raw = r#"{"type":"UPDATE_PROFILE","payload":{"handle":"taqueria","displayName":"La Taqueria","role":"restaurant","menuLink":"https://example.com/menu"}}"#;
    let wire: WireAction = serde_json::from_str(raw).unwrap();

    dispatcher.dispatch(Action::from_wire(wire).unwrap());

    let profile = store.current_profile().unwrap();
    assert_eq!(profile.role, Role::Restaurant);
    assert_eq!(profile.menu_link.as_deref(), Some("https://example.com/menu"));
    assert_eq!(profile.bio, "");
}

#[test]
fn notifications_follow_dispatch_order() {
    let (dispatcher, _, store) = create_store();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let _sub = store.subscribe(move |state| {
        log.lock()
            .unwrap()
            .push(state.current_profile.as_ref().map(|p| p.bio.clone()));
    });

    for bio in ["a", "b", "c"] {
        dispatcher.dispatch(Action::UpdateProfile(
            Profile::new("ana", "Ana", Role::Person).with_bio(bio),
        ));
    }
    dispatcher.dispatch(Action::ClearProfile);

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            Some("a".to_string()),
            Some("b".to_string()),
            Some("c".to_string()),
            None
        ]
    );
}

// ============================================================================
// Properties
// ============================================================================

fn arb_profile() -> impl Strategy<Value = Profile> {
    (
        ".{0,16}",
        "[a-z0-9_]{0,12}",
        ".{0,16}",
        ".{0,64}",
        prop_oneof![Just(Role::Person), Just(Role::Restaurant)],
        proptest::option::of(".{0,16}"),
        proptest::option::of("https://[a-z]{1,8}\\.com/[a-z]{0,8}"),
    )
        .prop_map(
            |(photo_url, handle, display_name, bio, role, location_text, menu_link)| Profile {
                photo_url,
                handle,
                display_name,
                bio,
                role,
                location_text,
                menu_link,
            },
        )
}

proptest! {
    #[test]
    fn any_profile_survives_the_document_format(profile in arb_profile()) {
        let parsed = Profile::from_document(&profile.to_document()).unwrap();
        prop_assert_eq!(parsed, profile);
    }

    #[test]
    fn update_then_clear_always_leaves_empty_state(profile in arb_profile()) {
        let (dispatcher, cache, store) = create_store();
        dispatcher.dispatch(Action::UpdateProfile(profile));
        dispatcher.dispatch(Action::ClearProfile);

        prop_assert_eq!(store.get_state(), StoreState::default());
        prop_assert!(cache.peek(DEFAULT_CACHE_KEY).is_none());
    }
}
