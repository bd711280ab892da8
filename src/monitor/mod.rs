//! The reactive enforcement core.
//!
//! One monitor instance is owned by the single worker task; every
//! notification flows through here serially, so a task's fetch-decide-write
//! sequence never interleaves with another evaluation of the same task.
//!
//! Failures of external calls are outcomes, not errors: they are logged at
//! the call site and abort processing of that notification. At-least-once
//! redelivery from the provider is the recovery mechanism, not internal
//! retry.

pub mod attribution;
pub mod loop_guard;
pub mod revert;

pub use attribution::ActivityTracker;
pub use loop_guard::LoopGuard;

use crate::audit::{self, AuditAction, AuditRecord, AuditWriter};
use crate::config::PolicyConfig;
use crate::directory::{UserDirectory, short_id};
use crate::policy::{self, Decision, MonitoredField, PolicyAction, TaskContext, UNPLANNED_LABEL};
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::tracker::{FieldValue, Tracker, fields};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Terminal result of processing one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    FetchFailed,
    StoreFailed,
    SelfOriginated,
    SprintNotMonitored,
    NoSnapshot,
    NoMonitoredChanges,
    Evaluated(usize),
    ConvertedToUnplanned,
    ConversionFailed,
    SnapshotSeeded,
    DeletionPermitted,
    DeletionBlocked,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FetchFailed => write!(f, "fetch-failed"),
            Self::StoreFailed => write!(f, "snapshot-store-failed"),
            Self::SelfOriginated => write!(f, "self-originated-ignored"),
            Self::SprintNotMonitored => write!(f, "sprint-not-monitored"),
            Self::NoSnapshot => write!(f, "no-snapshot"),
            Self::NoMonitoredChanges => write!(f, "no-monitored-changes"),
            Self::Evaluated(n) => write!(f, "evaluated-{n}-changes"),
            Self::ConvertedToUnplanned => write!(f, "converted-to-unplanned"),
            Self::ConversionFailed => write!(f, "conversion-failed"),
            Self::SnapshotSeeded => write!(f, "snapshot-seeded"),
            Self::DeletionPermitted => write!(f, "deletion-permitted"),
            Self::DeletionBlocked => write!(f, "deletion-blocked"),
        }
    }
}

pub struct TaskMonitor {
    tracker: Arc<dyn Tracker>,
    snapshots: SnapshotStore,
    audit: AuditWriter,
    directory: UserDirectory,
    loop_guard: LoopGuard,
    activity: ActivityTracker,
    policy: PolicyConfig,
}

impl TaskMonitor {
    pub fn new(
        tracker: Arc<dyn Tracker>,
        snapshots: SnapshotStore,
        audit: AuditWriter,
        directory: UserDirectory,
        policy: PolicyConfig,
    ) -> Self {
        let loop_guard = LoopGuard::new(
            policy.self_write_window_secs,
            policy.self_write_cleanup_secs,
        );
        let activity = ActivityTracker::new(
            Duration::from_secs(policy.attribution_window_secs),
            Duration::from_secs(policy.attribution_ttl_secs),
        );

        Self {
            tracker,
            snapshots,
            audit,
            directory,
            loop_guard,
            activity,
            policy,
        }
    }

    /// A task's monitored properties changed.
    pub async fn process_modified(&mut self, task_id: &str) -> Outcome {
        tracing::info!(task = short_id(task_id), "evaluating modified task");

        let task = match self.tracker.retrieve(task_id).await {
            Ok(task) => task,
            Err(e) => {
                tracing::error!("could not fetch task {}: {e}", short_id(task_id));
                return Outcome::FetchFailed;
            }
        };

        self.record_editor_activity(&task);

        if self
            .loop_guard
            .is_self_originated(task_id, fields::last_edited_time(&task))
        {
            return Outcome::SelfOriginated;
        }

        if !self.sprint_monitored(&task).await {
            tracing::debug!(task = short_id(task_id), "sprint not monitored, ignoring");
            return Outcome::SprintNotMonitored;
        }

        let snapshot = match self.snapshots.get(task_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                tracing::warn!(
                    task = short_id(task_id),
                    "no snapshot for monitored task — run setup to re-seed"
                );
                return Outcome::NoSnapshot;
            }
            Err(e) => {
                tracing::error!("snapshot read failed: {e}");
                return Outcome::StoreFailed;
            }
        };

        let ctx = TaskContext {
            elapsed_days: fields::elapsed_days(&task),
            current_priority: fields::field_value(&task, MonitoredField::Priority.property())
                .as_label()
                .unwrap_or_default()
                .to_string(),
        };
        let actor = self
            .directory
            .display_editor(fields::editor(&task).as_ref());

        let mut changes = 0;
        for field in MonitoredField::ALL {
            let current = fields::field_value(&task, field.property());
            let previous = snapshot.value(field);
            if current == previous {
                continue;
            }
            changes += 1;

            let decision = policy::evaluate(
                &ctx,
                self.policy.block_threshold_days,
                field,
                &previous,
                &current,
            );
            tracing::info!(
                task = short_id(task_id),
                %field,
                rule = decision.rule,
                action = %decision.action,
                "change classified"
            );
            self.apply_decision(&task, task_id, field, &previous, &current, &ctx, &actor, &decision)
                .await;
        }

        if changes == 0 {
            tracing::debug!(task = short_id(task_id), "no monitored field changed");
            return Outcome::NoMonitoredChanges;
        }

        // Rewrite the snapshot from the task's post-processing actual state,
        // so a revert is reflected rather than the attempted value.
        self.refresh_snapshot(task_id).await;
        Outcome::Evaluated(changes)
    }

    /// A task was created in the monitored collection.
    pub async fn process_created(&mut self, task_id: &str) -> Outcome {
        tracing::info!(task = short_id(task_id), "evaluating created task");

        let task = match self.tracker.retrieve(task_id).await {
            Ok(task) => task,
            Err(e) => {
                tracing::error!("could not fetch task {}: {e}", short_id(task_id));
                return Outcome::FetchFailed;
            }
        };

        self.record_editor_activity(&task);

        if !self.sprint_monitored(&task).await {
            return Outcome::SprintNotMonitored;
        }

        let elapsed = fields::elapsed_days(&task);
        let priority = fields::field_value(&task, MonitoredField::Priority.property());

        if elapsed > self.policy.block_threshold_days && !priority.label_matches(UNPLANNED_LABEL) {
            // New tasks cannot be backdated into the protected window under a
            // normal priority.
            tracing::warn!(
                task = short_id(task_id),
                elapsed,
                "task created past the edit window — converting to unplanned"
            );
            let actor = self
                .directory
                .display_editor(fields::editor(&task).as_ref());
            let record = AuditRecord {
                task_id: task_id.to_string(),
                task_name: fields::task_name(&task).unwrap_or_else(|| "unnamed".into()),
                field: MonitoredField::Priority.property().to_string(),
                old_value: audit::format_value(&priority, &self.directory),
                new_value: "Imprevista".into(),
                elapsed_days: Some(elapsed),
                priority: priority.as_label().unwrap_or_default().to_string(),
                actor,
                action: AuditAction::AutoConverted,
            };
            self.audit.append(&record).await;

            if !revert::convert_to_unplanned(
                self.tracker.as_ref(),
                &mut self.loop_guard,
                task_id,
            )
            .await
            {
                return Outcome::ConversionFailed;
            }

            let seeded = match self.tracker.retrieve(task_id).await {
                Ok(fresh) => Snapshot::capture(&fresh),
                Err(e) => {
                    // Fall back to the as-created state, corrected for the
                    // conversion we just applied.
                    tracing::warn!("re-fetch after conversion failed: {e}");
                    let mut snapshot = Snapshot::capture(&task);
                    snapshot.values.insert(
                        MonitoredField::Priority.property().to_string(),
                        FieldValue::Choice("Imprevista".into()),
                    );
                    snapshot
                }
            };
            self.put_snapshot(task_id, seeded).await;
            return Outcome::ConvertedToUnplanned;
        }

        self.put_snapshot(task_id, Snapshot::capture(&task)).await;
        tracing::info!(task = short_id(task_id), "initial snapshot seeded");
        Outcome::SnapshotSeeded
    }

    /// A task was deleted from the monitored collection.
    pub async fn process_deleted(&mut self, task_id: &str) -> Outcome {
        tracing::warn!(task = short_id(task_id), "task deletion detected");

        let snapshot = match self.snapshots.get(task_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                tracing::warn!(
                    task = short_id(task_id),
                    "no snapshot for deleted task — deletion cannot be evaluated"
                );
                return Outcome::NoSnapshot;
            }
            Err(e) => {
                tracing::error!("snapshot read failed: {e}");
                return Outcome::StoreFailed;
            }
        };

        // Deletions carry no actor; attribute from recent activity.
        let actor = self
            .activity
            .probable_actor()
            .unwrap_or_else(|| "unknown".into());
        let priority = snapshot.priority_label().unwrap_or_default();

        let record = AuditRecord {
            task_id: task_id.to_string(),
            task_name: snapshot.task_name.clone(),
            field: "Tarea completa".into(),
            old_value: "Existente".into(),
            new_value: "Eliminada".into(),
            elapsed_days: None,
            priority: priority.clone(),
            actor,
            action: AuditAction::DeletionPermitted,
        };

        if priority.eq_ignore_ascii_case(UNPLANNED_LABEL) {
            self.audit.append(&record).await;
            if let Err(e) = self.snapshots.delete(task_id).await {
                tracing::error!("could not drop snapshot of deleted task: {e}");
            }
            tracing::info!(task = short_id(task_id), "unplanned task deletion permitted");
            return Outcome::DeletionPermitted;
        }

        let record = AuditRecord {
            action: AuditAction::DeletionBlocked,
            ..record
        };
        self.audit.append(&record).await;
        tracing::warn!(
            task = short_id(task_id),
            "out-of-policy deletion recorded; reversal is not implemented — review manually"
        );
        Outcome::DeletionBlocked
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_decision(
        &mut self,
        task: &Value,
        task_id: &str,
        field: MonitoredField,
        previous: &FieldValue,
        current: &FieldValue,
        ctx: &TaskContext,
        actor: &str,
        decision: &Decision,
    ) {
        let record = AuditRecord {
            task_id: task_id.to_string(),
            task_name: fields::task_name(task).unwrap_or_else(|| "unnamed".into()),
            field: field.property().to_string(),
            old_value: audit::format_value(previous, &self.directory),
            new_value: audit::format_value(current, &self.directory),
            elapsed_days: Some(ctx.elapsed_days),
            priority: ctx.current_priority.clone(),
            actor: actor.to_string(),
            action: AuditAction::Permitted,
        };

        match decision.action {
            PolicyAction::Revert => {
                let reverted = revert::apply_revert(
                    self.tracker.as_ref(),
                    &mut self.loop_guard,
                    task_id,
                    field,
                    previous,
                )
                .await;

                if reverted {
                    revert::increment_violation_counter(
                        self.tracker.as_ref(),
                        &mut self.loop_guard,
                        task_id,
                    )
                    .await;
                    if decision.requires_log {
                        let record = AuditRecord {
                            action: AuditAction::Reverted,
                            ..record
                        };
                        self.audit.append(&record).await;
                    }
                } else if decision.requires_log {
                    // Fail open: the change stays in place, the failure is
                    // its own audit action, and the counter is untouched.
                    let record = AuditRecord {
                        action: AuditAction::RevertFailed,
                        ..record
                    };
                    self.audit.append(&record).await;
                }
            }
            PolicyAction::Permit | PolicyAction::PermitAndLog => {
                if decision.requires_log {
                    self.audit.append(&record).await;
                }
            }
        }
    }

    async fn sprint_monitored(&self, task: &Value) -> bool {
        let Some(sprint_id) = fields::sprint_relation(task) else {
            return false;
        };
        match self.tracker.retrieve(&sprint_id).await {
            Ok(sprint) => fields::monitoring_active(&sprint),
            Err(e) => {
                tracing::error!("could not check sprint monitoring flag: {e}");
                false
            }
        }
    }

    fn record_editor_activity(&mut self, task: &Value) {
        if let Some(editor) = fields::editor(task) {
            if !editor.bot {
                let name = self.directory.display_editor(Some(&editor));
                self.activity.record(&editor.id, &name);
            }
        }
    }

    async fn refresh_snapshot(&mut self, task_id: &str) {
        match self.tracker.retrieve(task_id).await {
            Ok(fresh) => {
                self.put_snapshot(task_id, Snapshot::capture(&fresh)).await;
            }
            Err(e) => {
                tracing::error!("snapshot refresh fetch failed, keeping previous: {e}");
            }
        }
    }

    async fn put_snapshot(&mut self, task_id: &str, snapshot: Snapshot) {
        if let Err(e) = self.snapshots.put(task_id, snapshot).await {
            tracing::error!("snapshot write failed: {e}");
        }
    }
}
