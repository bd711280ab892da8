//! Inbound notification handling: classification, dedup, and the worker.
//!
//! The gateway only parses and enqueues; this module decides what a
//! notification is and routes it. A single worker drains the queue so that
//! policy evaluation and snapshot updates for a task are serialized.

use crate::monitor::TaskMonitor;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const TYPE_MODIFIED: &str = "page.properties_updated";
const TYPE_CREATED: &str = "page.created";
const TYPE_DELETED: &str = "page.deleted";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Modified,
    Created,
    Deleted,
}

impl EventKind {
    pub fn from_type(event_type: &str) -> Option<Self> {
        match event_type {
            TYPE_MODIFIED => Some(Self::Modified),
            TYPE_CREATED => Some(Self::Created),
            TYPE_DELETED => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// A relevant change notification, ready for the worker queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: EventKind,
    pub page_id: String,
}

/// Where an inbound payload ends up before any processing happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// One-time setup handshake; the token must be echoed back unchanged.
    VerificationEcho(String),
    /// Declared author is our own integration — authoritative self-filter,
    /// independent of the loop guard's timing heuristic.
    SelfOriginated,
    /// Event type outside the three we react to.
    Irrelevant,
    /// Belongs to a collection we do not monitor.
    ForeignCollection,
    /// Structurally unusable payload.
    Invalid(&'static str),
    Event(Notification),
}

/// Classify a raw webhook payload. Pure; no state is touched.
pub fn classify(payload: &Value, monitored_collection: &str) -> Disposition {
    if let Some(token) = payload.get("verification_token").and_then(Value::as_str) {
        return Disposition::VerificationEcho(token.to_string());
    }

    let integration_id = payload.get("integration_id").and_then(Value::as_str);
    if let Some(authors) = payload.get("authors").and_then(Value::as_array) {
        let ours = authors.iter().any(|author| {
            author.get("type").and_then(Value::as_str) == Some("bot")
                || (integration_id.is_some()
                    && author.get("id").and_then(Value::as_str) == integration_id)
        });
        if ours {
            return Disposition::SelfOriginated;
        }
    }

    let Some(kind) = payload
        .get("type")
        .and_then(Value::as_str)
        .and_then(EventKind::from_type)
    else {
        return Disposition::Irrelevant;
    };

    let Some(page_id) = payload.pointer("/entity/id").and_then(Value::as_str) else {
        return Disposition::Invalid("missing entity.id");
    };

    // Deletion payloads carry no parent, so the collection filter cannot
    // apply to them; the self-filter above already ran.
    if kind != EventKind::Deleted {
        let parent = payload.pointer("/data/parent/id").and_then(Value::as_str);
        if parent != Some(monitored_collection) {
            return Disposition::ForeignCollection;
        }
    }

    Disposition::Event(Notification {
        kind,
        page_id: page_id.to_string(),
    })
}

/// Drops repeat notifications for a task inside a short window, absorbing
/// the provider's fan-out of a single logical edit.
pub struct Dedup {
    window: Duration,
    seen: HashMap<String, Instant>,
}

impl Dedup {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    pub fn is_duplicate(&mut self, task_id: &str) -> bool {
        self.is_duplicate_at(task_id, Instant::now())
    }

    pub fn is_duplicate_at(&mut self, task_id: &str, now: Instant) -> bool {
        // Sweep on lookup keeps the map bounded without a timer thread.
        let window = self.window;
        self.seen
            .retain(|_, seen| now.duration_since(*seen) < window);

        if self.seen.contains_key(task_id) {
            return true;
        }
        self.seen.insert(task_id.to_string(), now);
        false
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Counters shared between the gateway handlers and the worker.
#[derive(Debug, Default)]
pub struct Stats {
    pub processed: AtomicU64,
    pub ignored: AtomicU64,
    pub duplicates: AtomicU64,
    pub pending: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub ignored: u64,
    pub duplicates: u64,
    pub pending: u64,
}

impl Stats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Relaxed),
        }
    }
}

/// Single worker: drains the queue one notification at a time.
pub async fn run_worker(
    mut rx: mpsc::Receiver<Notification>,
    mut monitor: TaskMonitor,
    mut dedup: Dedup,
    stats: Arc<Stats>,
) {
    tracing::info!("enforcement worker started");

    while let Some(notification) = rx.recv().await {
        stats
            .pending
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            })
            .ok();

        let outcome = match notification.kind {
            EventKind::Modified => {
                if dedup.is_duplicate(&notification.page_id) {
                    stats.duplicates.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        task = crate::directory::short_id(&notification.page_id),
                        "duplicate notification dropped"
                    );
                    continue;
                }
                monitor.process_modified(&notification.page_id).await
            }
            EventKind::Created => monitor.process_created(&notification.page_id).await,
            EventKind::Deleted => monitor.process_deleted(&notification.page_id).await,
        };

        stats.processed.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            task = crate::directory::short_id(&notification.page_id),
            %outcome,
            "notification processed"
        );
    }

    tracing::info!("notification queue closed, worker stopping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COLLECTION: &str = "db-tasks";

    fn modified_payload() -> Value {
        json!({
            "type": TYPE_MODIFIED,
            "authors": [{ "id": "u-1", "type": "person" }],
            "integration_id": "int-1",
            "entity": { "id": "task-1" },
            "data": { "parent": { "id": COLLECTION } },
        })
    }

    #[test]
    fn verification_token_is_echoed() {
        let payload = json!({ "verification_token": "tok-123" });
        assert_eq!(
            classify(&payload, COLLECTION),
            Disposition::VerificationEcho("tok-123".into())
        );
    }

    #[test]
    fn bot_author_is_filtered_as_self() {
        let mut payload = modified_payload();
        payload["authors"] = json!([{ "id": "b-1", "type": "bot" }]);
        assert_eq!(classify(&payload, COLLECTION), Disposition::SelfOriginated);
    }

    #[test]
    fn integration_author_is_filtered_as_self() {
        let mut payload = modified_payload();
        payload["authors"] = json!([{ "id": "int-1", "type": "person" }]);
        assert_eq!(classify(&payload, COLLECTION), Disposition::SelfOriginated);
    }

    #[test]
    fn unknown_event_types_are_irrelevant() {
        let mut payload = modified_payload();
        payload["type"] = json!("page.content_updated");
        assert_eq!(classify(&payload, COLLECTION), Disposition::Irrelevant);
    }

    #[test]
    fn foreign_collection_is_dropped() {
        let mut payload = modified_payload();
        payload["data"]["parent"]["id"] = json!("db-other");
        assert_eq!(
            classify(&payload, COLLECTION),
            Disposition::ForeignCollection
        );
    }

    #[test]
    fn deletion_skips_the_collection_filter() {
        let payload = json!({
            "type": TYPE_DELETED,
            "authors": [{ "id": "u-1", "type": "person" }],
            "entity": { "id": "task-1" },
        });
        assert_eq!(
            classify(&payload, COLLECTION),
            Disposition::Event(Notification {
                kind: EventKind::Deleted,
                page_id: "task-1".into(),
            })
        );
    }

    #[test]
    fn missing_entity_id_is_invalid() {
        let payload = json!({
            "type": TYPE_CREATED,
            "authors": [],
            "data": { "parent": { "id": COLLECTION } },
        });
        assert_eq!(
            classify(&payload, COLLECTION),
            Disposition::Invalid("missing entity.id")
        );
    }

    #[test]
    fn well_formed_modification_becomes_an_event() {
        assert_eq!(
            classify(&modified_payload(), COLLECTION),
            Disposition::Event(Notification {
                kind: EventKind::Modified,
                page_id: "task-1".into(),
            })
        );
    }

    #[test]
    fn repeat_inside_window_is_a_duplicate() {
        let mut dedup = Dedup::new(Duration::from_secs(2));
        let now = Instant::now();
        assert!(!dedup.is_duplicate_at("task-1", now));
        assert!(dedup.is_duplicate_at("task-1", now + Duration::from_secs(1)));
    }

    #[test]
    fn repeat_after_window_is_fresh() {
        let mut dedup = Dedup::new(Duration::from_secs(2));
        let now = Instant::now();
        assert!(!dedup.is_duplicate_at("task-1", now));
        assert!(!dedup.is_duplicate_at("task-1", now + Duration::from_secs(3)));
    }

    #[test]
    fn dedup_is_per_task_and_sweeps_expired_entries() {
        let mut dedup = Dedup::new(Duration::from_secs(2));
        let now = Instant::now();
        assert!(!dedup.is_duplicate_at("task-1", now));
        assert!(!dedup.is_duplicate_at("task-2", now + Duration::from_secs(1)));
        assert_eq!(dedup.len(), 2);

        // task-1's entry is past the window by now and gets swept.
        assert!(!dedup.is_duplicate_at("task-3", now + Duration::from_secs(3)));
        assert!(dedup.len() <= 2);
    }

    #[test]
    fn stats_snapshot_reads_all_counters() {
        let stats = Stats::default();
        stats.processed.fetch_add(3, Ordering::Relaxed);
        stats.ignored.fetch_add(2, Ordering::Relaxed);
        let snap = stats.snapshot();
        assert_eq!(snap.processed, 3);
        assert_eq!(snap.ignored, 2);
        assert_eq!(snap.duplicates, 0);
    }
}
