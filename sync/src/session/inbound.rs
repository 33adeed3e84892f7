//! Inbound reconciler: decides what a remote document change means locally.

use tandem_engine::Profile;

/// What to do with an incoming remote profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// Equal to the last synced snapshot or to the write in flight: our own
    /// write reflected back. Discard.
    Echo,
    /// Already what the store holds. Adopt as the snapshot, nothing to apply.
    Adopt,
    /// A genuine external change. Adopt as the snapshot, then apply.
    Apply,
}

/// Classify a remote change.
pub(crate) fn reconcile(
    incoming: &Profile,
    last_synced: Option<&Profile>,
    in_flight: Option<&Profile>,
    local: Option<&Profile>,
) -> Verdict {
    if Some(incoming) == last_synced || Some(incoming) == in_flight {
        return Verdict::Echo;
    }
    if Some(incoming) == local {
        return Verdict::Adopt;
    }
    Verdict::Apply
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tandem_engine::Role;

    fn profile(bio: &str) -> Profile {
        Profile::new("ana", "Ana", Role::Person).with_bio(bio)
    }

    #[test]
    fn snapshot_match_is_an_echo() {
        let p = profile("Great tacos");
        assert_eq!(reconcile(&p, Some(&p), None, None), Verdict::Echo);
        assert_eq!(
            reconcile(&p, Some(&p), None, Some(&profile("other"))),
            Verdict::Echo
        );
    }

    #[test]
    fn in_flight_match_is_an_echo() {
        let written = profile("new");
        let old = profile("old");
        let typed_since = profile("newer");
        assert_eq!(
            reconcile(&written, Some(&old), Some(&written), Some(&typed_since)),
            Verdict::Echo
        );
    }

    #[test]
    fn matching_local_state_is_adopted() {
        let p = profile("same");
        assert_eq!(
            reconcile(&p, Some(&profile("old")), None, Some(&p)),
            Verdict::Adopt
        );
    }

    #[test]
    fn external_change_is_applied() {
        assert_eq!(
            reconcile(
                &profile("from phone"),
                Some(&profile("old")),
                Some(&profile("typing")),
                Some(&profile("typing"))
            ),
            Verdict::Apply
        );
        assert_eq!(reconcile(&profile("first"), None, None, None), Verdict::Apply);
    }

    proptest! {
        #[test]
        fn snapshot_equal_input_never_applies(
            bio in ".{0,32}",
            handle in "[a-z]{0,8}",
            local_bio in proptest::option::of(".{0,32}"),
        ) {
            let incoming = Profile::new(handle.clone(), "Ana", Role::Person).with_bio(bio);
            let snapshot = incoming.clone();
            let local = local_bio.map(|b| Profile::new(handle, "Ana", Role::Person).with_bio(b));

            prop_assert_eq!(
                reconcile(&incoming, Some(&snapshot), None, local.as_ref()),
                Verdict::Echo
            );
        }
    }
}
