//! Outbound debounced writer.
//!
//! Store changes restart a debounce timer; when it fires, the latest profile
//! is queued for writing. The queue is FIFO with at most one write in flight
//! and a short pause between consecutive writes.

use std::collections::VecDeque;
use std::time::Duration;

use tandem_engine::{IdentityId, Profile};
use tokio::time::Instant;
use uuid::Uuid;

/// Why a write was queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteKind {
    /// Creates the document for an identity that has none.
    Seed,
    /// Debounced local edit.
    Edit,
    /// Manual `force_sync`.
    Forced,
}

impl WriteKind {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            WriteKind::Seed => "seed",
            WriteKind::Edit => "edit",
            WriteKind::Forced => "forced",
        }
    }
}

/// A queued remote write.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WriteOp {
    pub id: Uuid,
    /// Session epoch at enqueue time
    pub epoch: u64,
    pub identity: IdentityId,
    pub profile: Profile,
    pub kind: WriteKind,
}

impl WriteOp {
    pub(crate) fn new(epoch: u64, identity: IdentityId, profile: Profile, kind: WriteKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            identity,
            profile,
            kind,
        }
    }
}

/// Whether a store change warrants scheduling a write.
///
/// Nothing is scheduled while a write is in flight (its completion re-runs
/// this check), when there is no profile, when the profile already equals
/// the last synced snapshot, or when it is the value whose write just
/// failed. Failed writes are not retried automatically.
pub(crate) fn needs_write(
    candidate: Option<&Profile>,
    last_synced: Option<&Profile>,
    last_failed: Option<&Profile>,
    write_in_flight: bool,
) -> bool {
    if write_in_flight {
        return false;
    }
    match candidate {
        Some(profile) => Some(profile) != last_synced && Some(profile) != last_failed,
        None => false,
    }
}

/// Debounce timer plus serial write queue.
#[derive(Debug)]
pub(crate) struct Outbound {
    debounce: Duration,
    pause: Duration,
    deadline: Option<Instant>,
    queue: VecDeque<WriteOp>,
    in_flight: Option<WriteOp>,
    resume_at: Option<Instant>,
}

impl Outbound {
    pub(crate) fn new(debounce: Duration, pause: Duration) -> Self {
        Self {
            debounce,
            pause,
            deadline: None,
            queue: VecDeque::new(),
            in_flight: None,
            resume_at: None,
        }
    }

    /// (Re)start the debounce window.
    pub(crate) fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.debounce);
    }

    /// When the debounce timer fires, if armed.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Disarm the debounce timer after it fired.
    pub(crate) fn take_deadline(&mut self) -> Option<Instant> {
        self.deadline.take()
    }

    pub(crate) fn enqueue(&mut self, op: WriteOp) {
        self.queue.push_back(op);
    }

    /// Disarm the timer and drop queued writes. An in-flight write is left
    /// to finish. Returns the number of writes dropped.
    pub(crate) fn cancel(&mut self) -> usize {
        self.deadline = None;
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    /// When the next queued write may start, if one is waiting.
    pub(crate) fn ready_at(&self, now: Instant) -> Option<Instant> {
        if self.in_flight.is_some() || self.queue.is_empty() {
            return None;
        }
        Some(self.resume_at.map_or(now, |at| at.max(now)))
    }

    /// Take the next write and mark it in flight.
    pub(crate) fn start_next(&mut self, now: Instant) -> Option<WriteOp> {
        if self.ready_at(now)? > now {
            return None;
        }
        let op = self.queue.pop_front()?;
        self.in_flight = Some(op.clone());
        Some(op)
    }

    /// Mark the in-flight write finished and start the inter-write pause.
    pub(crate) fn finish(&mut self, id: Uuid, now: Instant) {
        if self.in_flight.as_ref().map(|op| op.id) == Some(id) {
            self.in_flight = None;
            self.resume_at = Some(now + self.pause);
        }
    }

    /// The write currently in flight.
    pub(crate) fn in_flight(&self) -> Option<&WriteOp> {
        self.in_flight.as_ref()
    }

    pub(crate) fn is_syncing(&self) -> bool {
        self.in_flight.is_some()
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.queue.is_empty()
    }

    pub(crate) fn queued(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_engine::Role;

    const DEBOUNCE: Duration = Duration::from_millis(500);
    const PAUSE: Duration = Duration::from_millis(100);

    fn profile(bio: &str) -> Profile {
        Profile::new("ana", "Ana", Role::Person).with_bio(bio)
    }

    fn op(bio: &str) -> WriteOp {
        WriteOp::new(1, "u1".into(), profile(bio), WriteKind::Edit)
    }

    #[test]
    fn needs_write_rules() {
        let a = profile("a");
        let b = profile("b");

        assert!(needs_write(Some(&a), None, None, false));
        assert!(needs_write(Some(&a), Some(&b), None, false));
        assert!(needs_write(Some(&a), Some(&b), Some(&b), false));
        assert!(!needs_write(Some(&a), Some(&a), None, false));
        assert!(!needs_write(Some(&a), Some(&b), Some(&a), false));
        assert!(!needs_write(Some(&a), Some(&b), None, true));
        assert!(!needs_write(None, Some(&b), None, false));
    }

    #[test]
    fn schedule_restarts_the_window() {
        let mut outbound = Outbound::new(DEBOUNCE, PAUSE);
        let start = Instant::now();

        outbound.schedule(start);
        outbound.schedule(start + Duration::from_millis(300));

        assert_eq!(
            outbound.deadline(),
            Some(start + Duration::from_millis(800))
        );
        assert!(outbound.take_deadline().is_some());
        assert!(outbound.deadline().is_none());
    }

    #[test]
    fn one_write_in_flight_at_a_time() {
        let mut outbound = Outbound::new(DEBOUNCE, PAUSE);
        let now = Instant::now();
        outbound.enqueue(op("a"));
        outbound.enqueue(op("b"));

        let first = outbound.start_next(now).unwrap();
        assert_eq!(first.profile.bio, "a");
        assert!(outbound.is_syncing());
        assert!(outbound.start_next(now).is_none());
        assert_eq!(outbound.ready_at(now), None);

        outbound.finish(first.id, now);
        assert!(!outbound.is_syncing());
        // Pause before the next write
        assert_eq!(outbound.ready_at(now), Some(now + PAUSE));
        assert!(outbound.start_next(now).is_none());

        let second = outbound.start_next(now + PAUSE).unwrap();
        assert_eq!(second.profile.bio, "b");
    }

    #[test]
    fn finish_ignores_unknown_ids() {
        let mut outbound = Outbound::new(DEBOUNCE, PAUSE);
        let now = Instant::now();
        outbound.enqueue(op("a"));
        let started = outbound.start_next(now).unwrap();

        outbound.finish(Uuid::new_v4(), now);
        assert_eq!(outbound.in_flight().map(|op| op.id), Some(started.id));
    }

    #[test]
    fn cancel_drops_queue_but_not_in_flight() {
        let mut outbound = Outbound::new(DEBOUNCE, PAUSE);
        let now = Instant::now();
        outbound.enqueue(op("a"));
        outbound.enqueue(op("b"));
        outbound.enqueue(op("c"));
        let _ = outbound.start_next(now);
        outbound.schedule(now);

        assert_eq!(outbound.cancel(), 2);
        assert_eq!(outbound.queued(), 0);
        assert!(outbound.deadline().is_none());
        assert!(outbound.is_syncing());
        assert!(!outbound.is_idle());
    }
}
