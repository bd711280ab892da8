//! Monitoring activation: sprint selection, flag flipping, snapshot seeding.
//!
//! Runs as the `setup` subcommand before (or while) the daemon is live. The
//! runtime treats "no snapshot for a monitored task" as a blocking
//! condition, so this must have run at least once per activation.

use crate::config::{CollectionsConfig, Config};
use crate::snapshot::SnapshotStore;
use crate::tracker::{FieldValue, HttpTracker, Tracker, fields};
use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde_json::{Value, json};

/// What the seeding pass saw, for the activation summary.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub sprints: usize,
    pub consulted: usize,
    pub seeded: usize,
    pub skipped_unnamed: usize,
    pub skipped_unassigned: usize,
    pub skipped_no_sprint: usize,
    pub skipped_multiple_reasons: usize,
}

pub async fn run(config: &Config) -> Result<()> {
    config.validate()?;
    let tracker = HttpTracker::from_config(&config.tracker)?;
    let store = SnapshotStore::new(config.snapshot_path());

    let report = activate_monitoring(&tracker, &store, &config.collections).await?;

    tracing::info!(
        sprints = report.sprints,
        consulted = report.consulted,
        seeded = report.seeded,
        skipped_unnamed = report.skipped_unnamed,
        skipped_unassigned = report.skipped_unassigned,
        skipped_no_sprint = report.skipped_no_sprint,
        "monitoring activated"
    );
    println!(
        "Monitoring active on {} sprint(s); {} snapshot(s) seeded ({} task(s) consulted).",
        report.sprints, report.seeded, report.consulted
    );
    Ok(())
}

/// Flip the activation flag onto the relevant sprint set and seed snapshots
/// for every valid task in them.
pub async fn activate_monitoring(
    tracker: &dyn Tracker,
    store: &SnapshotStore,
    collections: &CollectionsConfig,
) -> Result<SeedReport> {
    let relevant = relevant_sprints(tracker, &collections.sprints).await?;
    set_monitoring_flags(tracker, &collections.sprints, &relevant).await?;

    let mut report = collect_and_seed(tracker, store, &collections.tasks, &relevant).await?;
    report.sprints = relevant.len();

    if report.seeded == 0 {
        tracing::warn!("no valid tasks found in the monitored sprints");
    }
    Ok(report)
}

/// The sprint set worth monitoring: the current sprint plus up to two most
/// recently finished predecessors.
pub async fn relevant_sprints(
    tracker: &dyn Tracker,
    sprints_collection: &str,
) -> Result<Vec<Value>> {
    let sorts = json!([{ "property": "Fecha Fin", "direction": "descending" }]);
    let sprints = tracker
        .query(sprints_collection, None, Some(sorts))
        .await
        .context("query sprints collection")?;

    let Some(current) = sprints.iter().find(|s| fields::is_current_sprint(s)) else {
        bail!("no sprint is flagged as current — cannot pick a monitoring set");
    };
    let current_id = current.get("id").and_then(Value::as_str).unwrap_or_default();
    let mut relevant = vec![current.clone()];

    let Some(current_end) = end_date(current) else {
        tracing::warn!("current sprint has no end date — monitoring it alone");
        return Ok(relevant);
    };

    let mut previous: Vec<(&Value, NaiveDate)> = sprints
        .iter()
        .filter(|s| s.get("id").and_then(Value::as_str) != Some(current_id))
        .filter_map(|s| end_date(s).map(|d| (s, d)))
        .filter(|(_, end)| *end < current_end)
        .collect();
    previous.sort_by(|a, b| b.1.cmp(&a.1));

    for (sprint, _) in previous.into_iter().take(2) {
        relevant.push(sprint.clone());
    }
    Ok(relevant)
}

fn end_date(sprint: &Value) -> Option<NaiveDate> {
    match fields::field_value(sprint, "Fecha Fin") {
        FieldValue::Date(start) => {
            NaiveDate::parse_from_str(start.get(..10).unwrap_or(&start), "%Y-%m-%d").ok()
        }
        _ => None,
    }
}

/// Deactivate the flag everywhere, then activate it on the relevant set.
async fn set_monitoring_flags(
    tracker: &dyn Tracker,
    sprints_collection: &str,
    relevant: &[Value],
) -> Result<()> {
    let all = tracker
        .query(sprints_collection, None, None)
        .await
        .context("query sprints for flag reset")?;

    for sprint in &all {
        let Some(id) = sprint.get("id").and_then(Value::as_str) else {
            continue;
        };
        let off = json!({ "Monitoreo Activo": { "checkbox": false } });
        if let Err(e) = tracker.update(id, off).await {
            tracing::warn!("could not deactivate monitoring flag: {e}");
        }
    }

    for sprint in relevant {
        let Some(id) = sprint.get("id").and_then(Value::as_str) else {
            continue;
        };
        let on = json!({ "Monitoreo Activo": { "checkbox": true } });
        tracker
            .update(id, on)
            .await
            .context("activate monitoring flag")?;
    }
    Ok(())
}

/// A task enters monitoring only when it has a title, at least one assignee,
/// and a sprint relation. Returns the skip reasons otherwise.
pub fn validation_problems(task: &Value) -> Vec<&'static str> {
    let mut problems = Vec::new();

    let named = fields::task_name(task).is_some_and(|n| !n.trim().is_empty());
    if !named {
        problems.push("unnamed");
    }

    let assigned = fields::field_value(task, "Personas")
        .as_ids()
        .is_some_and(|ids| !ids.is_empty());
    if !assigned {
        problems.push("unassigned");
    }

    if fields::sprint_relation(task).is_none() {
        problems.push("no sprint");
    }
    problems
}

async fn collect_and_seed(
    tracker: &dyn Tracker,
    store: &SnapshotStore,
    tasks_collection: &str,
    sprints: &[Value],
) -> Result<SeedReport> {
    let mut report = SeedReport::default();
    let mut valid = Vec::new();

    for sprint in sprints {
        let Some(sprint_id) = sprint.get("id").and_then(Value::as_str) else {
            continue;
        };
        let filter = json!({ "property": "Sprint", "relation": { "contains": sprint_id } });
        let tasks = tracker
            .query(tasks_collection, Some(filter), None)
            .await
            .context("query sprint tasks")?;

        for task in tasks {
            report.consulted += 1;
            let problems = validation_problems(&task);
            match problems.as_slice() {
                [] => valid.push(task),
                [single] => match *single {
                    "unnamed" => report.skipped_unnamed += 1,
                    "unassigned" => report.skipped_unassigned += 1,
                    _ => report.skipped_no_sprint += 1,
                },
                _ => report.skipped_multiple_reasons += 1,
            }
        }
    }

    report.seeded = store.bulk_init(&valid).await?;
    Ok(report)
}
