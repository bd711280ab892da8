//! End-to-end enforcement flows over an in-memory tracker fake.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use sprintguard::audit::AuditWriter;
use sprintguard::config::PolicyConfig;
use sprintguard::directory::UserDirectory;
use sprintguard::error::TrackerError;
use sprintguard::monitor::{Outcome, TaskMonitor};
use sprintguard::snapshot::{Snapshot, SnapshotStore};
use sprintguard::tracker::Tracker;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// In-memory tracker: updates are applied to the stored pages, so a
/// re-fetch after a revert observes the reverted state.
#[derive(Default)]
struct FakeTracker {
    pages: Mutex<HashMap<String, Value>>,
    updates: Mutex<Vec<(String, Value)>>,
    creates: Mutex<Vec<(String, Value)>>,
}

impl FakeTracker {
    fn insert_page(&self, id: &str, page: Value) {
        self.pages.lock().unwrap().insert(id.to_string(), page);
    }

    fn set_last_edited(&self, id: &str, timestamp: &str) {
        let mut pages = self.pages.lock().unwrap();
        if let Some(page) = pages.get_mut(id) {
            page["last_edited_time"] = json!(timestamp);
        }
    }

    fn updates_for(&self, id: &str) -> Vec<Value> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|(target, _)| target == id)
            .map(|(_, props)| props.clone())
            .collect()
    }

    fn audit_categories(&self) -> Vec<String> {
        self.creates
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, props)| {
                props
                    .pointer("/Tipo Modificación/select/name")
                    .and_then(Value::as_str)
                    .map(String::from)
            })
            .collect()
    }
}

#[async_trait]
impl Tracker for FakeTracker {
    async fn retrieve(&self, page_id: &str) -> Result<Value, TrackerError> {
        self.pages
            .lock()
            .unwrap()
            .get(page_id)
            .cloned()
            .ok_or_else(|| TrackerError::Status {
                op: "pages.retrieve".into(),
                status: 404,
                body: "object_not_found".into(),
            })
    }

    async fn update(&self, page_id: &str, properties: Value) -> Result<Value, TrackerError> {
        self.updates
            .lock()
            .unwrap()
            .push((page_id.to_string(), properties.clone()));

        let mut pages = self.pages.lock().unwrap();
        if let Some(page) = pages.get_mut(page_id) {
            if let Some(map) = properties.as_object() {
                for (key, value) in map {
                    page["properties"][key] = value.clone();
                }
            }
        }
        Ok(json!({ "id": page_id }))
    }

    async fn create(
        &self,
        collection_id: &str,
        properties: Value,
    ) -> Result<Value, TrackerError> {
        self.creates
            .lock()
            .unwrap()
            .push((collection_id.to_string(), properties));
        Ok(json!({ "id": "log-entry" }))
    }

    async fn retrieve_collection(&self, collection_id: &str) -> Result<Value, TrackerError> {
        Ok(json!({ "id": collection_id }))
    }

    async fn query(
        &self,
        _collection_id: &str,
        _filter: Option<Value>,
        _sorts: Option<Value>,
    ) -> Result<Vec<Value>, TrackerError> {
        Ok(Vec::new())
    }
}

fn task_json(
    id: &str,
    name: &str,
    priority: &str,
    assignees: &[&str],
    elapsed: i64,
    sprint: &str,
) -> Value {
    json!({
        "id": id,
        "last_edited_time": "2026-03-02T10:00:00.000Z",
        "last_edited_by": { "object": "user", "id": "u-laura", "name": "Laura" },
        "properties": {
            "Nombre": { "title": [{ "text": { "content": name } }] },
            "Personas": {
                "relation": assignees.iter().map(|a| json!({ "id": a })).collect::<Vec<_>>()
            },
            "Prioridad": { "select": { "name": priority } },
            "Tamaño": { "select": { "name": "M" } },
            "Estado": { "status": { "name": "En curso" } },
            "Sprint": { "relation": [{ "id": sprint }] },
            "Días Transcurridos Sprint": { "formula": { "number": elapsed } },
            "Violaciones Detectadas": { "number": 0 },
        }
    })
}

fn sprint_json(id: &str, monitored: bool) -> Value {
    json!({
        "id": id,
        "properties": { "Monitoreo Activo": { "checkbox": monitored } }
    })
}

struct Harness {
    _tmp: TempDir,
    tracker: Arc<FakeTracker>,
    monitor: TaskMonitor,
    store: SnapshotStore,
}

fn harness() -> Harness {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("task_snapshots.json");

    let tracker = Arc::new(FakeTracker::default());
    tracker.insert_page("s-1", sprint_json("s-1", true));
    tracker.insert_page("s-off", sprint_json("s-off", false));

    let as_dyn: Arc<dyn Tracker> = tracker.clone();
    let monitor = TaskMonitor::new(
        Arc::clone(&as_dyn),
        SnapshotStore::new(path.clone()),
        AuditWriter::new(as_dyn, Some("db-log".into())),
        UserDirectory::new(),
        PolicyConfig::default(),
    );

    Harness {
        _tmp: tmp,
        tracker,
        monitor,
        store: SnapshotStore::new(path),
    }
}

async fn seed_snapshot(h: &Harness, id: &str, task: &Value) {
    h.store.put(id, Snapshot::capture(task)).await.unwrap();
}

#[tokio::test]
async fn evasion_relabel_is_reverted_and_counted() {
    let mut h = harness();

    // Committed state: Alta. Someone relabels to Imprevista on day 5.
    let before = task_json("t-1", "Ship report", "Alta", &["p-1"], 5, "s-1");
    seed_snapshot(&h, "t-1", &before).await;
    h.tracker
        .insert_page("t-1", task_json("t-1", "Ship report", "Imprevista", &["p-1"], 5, "s-1"));

    let outcome = h.monitor.process_modified("t-1").await;
    assert_eq!(outcome, Outcome::Evaluated(1));

    let updates = h.tracker.updates_for("t-1");
    let reverted = updates.iter().any(|u| {
        u.pointer("/Prioridad/select/name").and_then(Value::as_str) == Some("Alta")
    });
    assert!(reverted, "priority should be restored to Alta: {updates:?}");

    let counted = updates.iter().any(|u| {
        u.pointer("/Violaciones Detectadas/number").and_then(Value::as_i64) == Some(1)
    });
    assert!(counted, "violation counter should be bumped");

    assert_eq!(h.tracker.audit_categories(), vec!["Bloqueada"]);

    // The snapshot reflects the reverted value, not the attempted one.
    let snapshot = h.store.get("t-1").await.unwrap().unwrap();
    assert_eq!(snapshot.priority_label().as_deref(), Some("Alta"));
}

#[tokio::test]
async fn own_revert_echo_is_suppressed_then_forgotten() {
    let mut h = harness();

    let before = task_json("t-1", "Ship report", "Alta", &["p-1"], 5, "s-1");
    seed_snapshot(&h, "t-1", &before).await;
    h.tracker
        .insert_page("t-1", task_json("t-1", "Ship report", "Imprevista", &["p-1"], 5, "s-1"));
    assert_eq!(h.monitor.process_modified("t-1").await, Outcome::Evaluated(1));

    // The provider now redelivers the edit our own revert produced.
    h.tracker
        .set_last_edited("t-1", &Utc::now().to_rfc3339());
    assert_eq!(
        h.monitor.process_modified("t-1").await,
        Outcome::SelfOriginated
    );

    // Long after the write, the same task is evaluated normally again.
    let later = (Utc::now() + chrono::Duration::seconds(60)).to_rfc3339();
    h.tracker.set_last_edited("t-1", &later);
    assert_eq!(
        h.monitor.process_modified("t-1").await,
        Outcome::NoMonitoredChanges
    );
}

#[tokio::test]
async fn previously_unplanned_priority_change_is_permitted_and_logged() {
    let mut h = harness();

    let before = task_json("t-2", "Triage bug", "Imprevista", &["p-1"], 5, "s-1");
    seed_snapshot(&h, "t-2", &before).await;
    h.tracker
        .insert_page("t-2", task_json("t-2", "Triage bug", "Baja", &["p-1"], 5, "s-1"));

    let outcome = h.monitor.process_modified("t-2").await;
    assert_eq!(outcome, Outcome::Evaluated(1));

    // No write-back: the only traffic is the audit record.
    let property_updates: Vec<Value> = h
        .tracker
        .updates_for("t-2")
        .into_iter()
        .filter(|u| u.get("Prioridad").is_some())
        .collect();
    assert!(property_updates.is_empty(), "{property_updates:?}");
    assert_eq!(h.tracker.audit_categories(), vec!["Permitida"]);

    let snapshot = h.store.get("t-2").await.unwrap().unwrap();
    assert_eq!(snapshot.priority_label().as_deref(), Some("Baja"));
}

#[tokio::test]
async fn removing_last_assignee_is_reverted_adding_one_is_not() {
    let mut h = harness();

    let before = task_json("t-3", "Pair work", "Alta", &["p-1", "p-2"], 6, "s-1");
    seed_snapshot(&h, "t-3", &before).await;
    h.tracker
        .insert_page("t-3", task_json("t-3", "Pair work", "Alta", &[], 6, "s-1"));

    assert_eq!(h.monitor.process_modified("t-3").await, Outcome::Evaluated(1));
    let restored = h.tracker.updates_for("t-3").iter().any(|u| {
        u.pointer("/Personas/relation")
            .and_then(Value::as_array)
            .is_some_and(|ids| ids.len() == 2)
    });
    assert!(restored, "both assignees should be restored");

    let snapshot = h.store.get("t-3").await.unwrap().unwrap();
    assert_eq!(
        snapshot
            .value(sprintguard::policy::MonitoredField::Assignees)
            .as_ids()
            .map(<[String]>::len),
        Some(2)
    );

    // Adding a third assignee under the same elapsed days is permit-and-log.
    h.tracker.insert_page(
        "t-3",
        task_json("t-3", "Pair work", "Alta", &["p-1", "p-2", "p-3"], 6, "s-1"),
    );
    // Fresh edit timestamp so the earlier revert's marker does not suppress.
    let later = (Utc::now() + chrono::Duration::seconds(60)).to_rfc3339();
    h.tracker.set_last_edited("t-3", &later);

    assert_eq!(h.monitor.process_modified("t-3").await, Outcome::Evaluated(1));
    let categories = h.tracker.audit_categories();
    assert_eq!(categories, vec!["Bloqueada", "Permitida"]);
}

#[tokio::test]
async fn missing_snapshot_blocks_evaluation() {
    let mut h = harness();
    h.tracker
        .insert_page("t-4", task_json("t-4", "Orphan", "Alta", &["p-1"], 5, "s-1"));
    assert_eq!(h.monitor.process_modified("t-4").await, Outcome::NoSnapshot);
    assert!(h.tracker.updates_for("t-4").is_empty());
}

#[tokio::test]
async fn unmonitored_sprint_is_ignored() {
    let mut h = harness();
    h.tracker
        .insert_page("t-5", task_json("t-5", "Elsewhere", "Alta", &["p-1"], 5, "s-off"));
    assert_eq!(
        h.monitor.process_modified("t-5").await,
        Outcome::SprintNotMonitored
    );
}

#[tokio::test]
async fn late_created_task_is_converted_to_unplanned() {
    let mut h = harness();
    h.tracker
        .insert_page("t-6", task_json("t-6", "Late add", "Alta", &["p-1"], 6, "s-1"));

    let outcome = h.monitor.process_created("t-6").await;
    assert_eq!(outcome, Outcome::ConvertedToUnplanned);

    let converted = h.tracker.updates_for("t-6").iter().any(|u| {
        u.pointer("/Prioridad/select/name").and_then(Value::as_str) == Some("Imprevista")
    });
    assert!(converted);
    assert_eq!(h.tracker.audit_categories(), vec!["Auto-conversión"]);

    // Snapshot reflects the converted state.
    let snapshot = h.store.get("t-6").await.unwrap().unwrap();
    assert!(
        snapshot
            .priority_label()
            .unwrap()
            .eq_ignore_ascii_case("imprevista")
    );
}

#[tokio::test]
async fn created_task_inside_window_is_just_seeded() {
    let mut h = harness();
    h.tracker
        .insert_page("t-7", task_json("t-7", "Planned", "Alta", &["p-1"], 2, "s-1"));

    assert_eq!(h.monitor.process_created("t-7").await, Outcome::SnapshotSeeded);
    assert!(h.tracker.updates_for("t-7").is_empty());
    assert!(h.tracker.audit_categories().is_empty());
    assert!(h.store.get("t-7").await.unwrap().is_some());
}

#[tokio::test]
async fn unplanned_deletion_is_permitted_and_forgotten() {
    let mut h = harness();
    let gone = task_json("t-8", "Scratch", "Imprevista", &["p-1"], 6, "s-1");
    seed_snapshot(&h, "t-8", &gone).await;

    assert_eq!(
        h.monitor.process_deleted("t-8").await,
        Outcome::DeletionPermitted
    );
    assert_eq!(h.tracker.audit_categories(), vec!["Eliminación"]);
    assert!(h.store.get("t-8").await.unwrap().is_none());
}

#[tokio::test]
async fn planned_deletion_is_blocked_but_not_reversed() {
    let mut h = harness();
    let gone = task_json("t-9", "Committed", "Alta", &["p-1"], 6, "s-1");
    seed_snapshot(&h, "t-9", &gone).await;

    assert_eq!(
        h.monitor.process_deleted("t-9").await,
        Outcome::DeletionBlocked
    );
    assert_eq!(h.tracker.audit_categories(), vec!["Eliminación"]);
    // Known limitation: no recreate is attempted; the snapshot is retained.
    assert!(h.store.get("t-9").await.unwrap().is_some());
    assert!(h.tracker.updates_for("t-9").is_empty());
}

#[tokio::test]
async fn deletion_without_snapshot_cannot_be_evaluated() {
    let mut h = harness();
    assert_eq!(h.monitor.process_deleted("ghost").await, Outcome::NoSnapshot);
    assert!(h.tracker.audit_categories().is_empty());
}

#[tokio::test]
async fn deletion_actor_comes_from_recent_activity() {
    let mut h = harness();

    // A modification first: reveals Laura as the most recent actor.
    let before = task_json("t-10", "Busy task", "Alta", &["p-1"], 2, "s-1");
    seed_snapshot(&h, "t-10", &before).await;
    let mut edited = task_json("t-10", "Busy task renamed", "Alta", &["p-1"], 2, "s-1");
    edited["last_edited_time"] = json!(Utc::now().to_rfc3339());
    h.tracker.insert_page("t-10", edited);
    h.monitor.process_modified("t-10").await;

    // Then a deletion of a blocked task attributes her.
    let gone = task_json("t-11", "Victim", "Alta", &["p-2"], 6, "s-1");
    seed_snapshot(&h, "t-11", &gone).await;
    h.monitor.process_deleted("t-11").await;

    let actor = h
        .tracker
        .creates
        .lock()
        .unwrap()
        .last()
        .and_then(|(_, props)| {
            props
                .pointer("/Usuario/rich_text/0/text/content")
                .and_then(Value::as_str)
                .map(String::from)
        })
        .unwrap();
    assert_eq!(actor, "Laura");
}

#[tokio::test]
async fn status_progress_outside_window_is_permitted_with_log() {
    let mut h = harness();

    let before = task_json("t-12", "Ongoing", "Alta", &["p-1"], 7, "s-1");
    seed_snapshot(&h, "t-12", &before).await;
    let mut done = task_json("t-12", "Ongoing", "Alta", &["p-1"], 7, "s-1");
    done["properties"]["Estado"] = json!({ "status": { "name": "Hecho" } });
    h.tracker.insert_page("t-12", done);

    assert_eq!(h.monitor.process_modified("t-12").await, Outcome::Evaluated(1));
    assert!(h.tracker.updates_for("t-12").is_empty(), "no revert for status");
    assert_eq!(h.tracker.audit_categories(), vec!["Permitida"]);
}
