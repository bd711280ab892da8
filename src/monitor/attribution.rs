//! Best-effort actor attribution for deletions.
//!
//! Deletion notifications carry no actor, so we keep a bounded map of
//! recently seen users (updated by every non-deletion event that reveals
//! one) and attribute a deletion to the most recent entry within a short
//! window. A heuristic, not an audit trail.

use std::collections::HashMap;
use std::time::{Duration, Instant};

struct ActivityEntry {
    name: String,
    seen: Instant,
}

pub struct ActivityTracker {
    window: Duration,
    ttl: Duration,
    entries: HashMap<String, ActivityEntry>,
}

impl ActivityTracker {
    pub fn new(window: Duration, ttl: Duration) -> Self {
        Self {
            window,
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn record(&mut self, user_id: &str, name: &str) {
        self.record_at(user_id, name, Instant::now());
    }

    pub fn record_at(&mut self, user_id: &str, name: &str, now: Instant) {
        self.entries.insert(
            user_id.to_string(),
            ActivityEntry {
                name: name.to_string(),
                seen: now,
            },
        );
        // Sweep expired entries on write; no background timer.
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.duration_since(entry.seen) <= ttl);
    }

    /// The most recently active user inside the attribution window, if any.
    pub fn probable_actor(&self) -> Option<String> {
        self.probable_actor_at(Instant::now())
    }

    pub fn probable_actor_at(&self, now: Instant) -> Option<String> {
        self.entries
            .values()
            .filter(|entry| now.duration_since(entry.seen) < self.window)
            .max_by_key(|entry| entry.seen)
            .map(|entry| entry.name.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ActivityTracker {
        ActivityTracker::new(Duration::from_secs(30), Duration::from_secs(300))
    }

    #[test]
    fn empty_tracker_attributes_nobody() {
        assert!(tracker().probable_actor().is_none());
    }

    #[test]
    fn most_recent_user_wins() {
        let mut t = tracker();
        let now = Instant::now();
        t.record_at("u-1", "Laura", now);
        t.record_at("u-2", "Marco", now + Duration::from_secs(5));

        let probed = t.probable_actor_at(now + Duration::from_secs(10));
        assert_eq!(probed.as_deref(), Some("Marco"));
    }

    #[test]
    fn activity_older_than_the_window_does_not_attribute() {
        let mut t = tracker();
        let now = Instant::now();
        t.record_at("u-1", "Laura", now);

        assert!(
            t.probable_actor_at(now + Duration::from_secs(31))
                .is_none()
        );
    }

    #[test]
    fn entries_past_ttl_are_swept_on_write() {
        let mut t = tracker();
        let now = Instant::now();
        t.record_at("u-1", "Laura", now);
        t.record_at("u-2", "Marco", now + Duration::from_secs(301));

        assert_eq!(t.len(), 1);
        assert!(
            t.probable_actor_at(now + Duration::from_secs(302))
                .is_some()
        );
    }

    #[test]
    fn re_recording_refreshes_recency() {
        let mut t = tracker();
        let now = Instant::now();
        t.record_at("u-1", "Laura", now);
        t.record_at("u-2", "Marco", now + Duration::from_secs(1));
        t.record_at("u-1", "Laura", now + Duration::from_secs(2));

        let probed = t.probable_actor_at(now + Duration::from_secs(3));
        assert_eq!(probed.as_deref(), Some("Laura"));
    }
}
