//! Edit-window policy: a stateless classifier over (field, old, new) diffs.
//!
//! The policy protects commitments made at sprint planning time — title,
//! size, priority, last assignee — from silent post-commitment edits, while
//! always allowing status progression and exempting tasks already triaged as
//! unplanned work. Rules are evaluated top-down; later rules assume earlier
//! ones did not match.

use crate::tracker::FieldValue;
use strum::Display;

/// Priority label designating work outside the original sprint planning.
/// Tasks carrying it are exempt from the edit window; compared
/// case-insensitively against the workspace's select options.
pub const UNPLANNED_LABEL: &str = "imprevista";

/// The five watched properties, with their external schema names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum MonitoredField {
    #[strum(serialize = "Nombre")]
    Title,
    #[strum(serialize = "Personas")]
    Assignees,
    #[strum(serialize = "Prioridad")]
    Priority,
    #[strum(serialize = "Tamaño")]
    Size,
    #[strum(serialize = "Estado")]
    Status,
}

impl MonitoredField {
    pub const ALL: [MonitoredField; 5] = [
        Self::Title,
        Self::Assignees,
        Self::Priority,
        Self::Size,
        Self::Status,
    ];

    /// Property name in the external collection.
    pub fn property(self) -> &'static str {
        match self {
            Self::Title => "Nombre",
            Self::Assignees => "Personas",
            Self::Priority => "Prioridad",
            Self::Size => "Tamaño",
            Self::Status => "Estado",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PolicyAction {
    #[strum(serialize = "permit")]
    Permit,
    #[strum(serialize = "permit-and-log")]
    PermitAndLog,
    #[strum(serialize = "revert")]
    Revert,
}

/// Outcome of one rule evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub action: PolicyAction,
    pub requires_log: bool,
    /// Which rule fired — used for log lines and tests, never for control flow.
    pub rule: &'static str,
}

impl Decision {
    fn new(action: PolicyAction, requires_log: bool, rule: &'static str) -> Self {
        Self {
            action,
            requires_log,
            rule,
        }
    }
}

/// Task-level inputs the rules need besides the changed field itself.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Days since sprint start, precomputed by the external store.
    pub elapsed_days: i64,
    /// The task's priority at evaluation time, regardless of which field
    /// changed.
    pub current_priority: String,
}

fn is_unplanned(value: &FieldValue) -> bool {
    value.label_matches(UNPLANNED_LABEL)
}

fn assignee_count(value: &FieldValue) -> usize {
    value.as_ids().map_or(0, <[String]>::len)
}

/// Classify a single field change. Pure; the caller executes the decision.
pub fn evaluate(
    ctx: &TaskContext,
    threshold_days: i64,
    field: MonitoredField,
    old: &FieldValue,
    new: &FieldValue,
) -> Decision {
    let windowed = ctx.elapsed_days > threshold_days;

    if field == MonitoredField::Priority && windowed {
        // Relabeling to the exempt value is itself the change under scrutiny:
        // only a genuine prior unplanned-designation exempts, not the act of
        // declaring it now.
        if is_unplanned(new) && !is_unplanned(old) {
            return Decision::new(PolicyAction::Revert, true, "unplanned-relabel-blocked");
        }
        if is_unplanned(old) {
            return Decision::new(PolicyAction::PermitAndLog, true, "was-already-unplanned");
        }
        return Decision::new(PolicyAction::Revert, true, "priority-outside-window");
    }

    if field == MonitoredField::Assignees && windowed {
        if assignee_count(old) > 0 && assignee_count(new) == 0 {
            return Decision::new(PolicyAction::Revert, true, "last-assignee-removed");
        }
        return Decision::new(PolicyAction::PermitAndLog, true, "assignee-change");
    }

    if ctx.current_priority.eq_ignore_ascii_case(UNPLANNED_LABEL) {
        return Decision::new(PolicyAction::Permit, windowed, "task-is-unplanned");
    }

    if field == MonitoredField::Status {
        return Decision::new(PolicyAction::Permit, windowed, "status-always-permitted");
    }

    if !windowed {
        return Decision::new(PolicyAction::Permit, false, "inside-edit-window");
    }

    Decision::new(PolicyAction::Revert, true, "outside-window-default")
}
