//! Corrective writes back to the tracker.
//!
//! Every write issued here is marked on the [`LoopGuard`] first, so the
//! notification it triggers is recognized as our own echo.

use super::loop_guard::LoopGuard;
use crate::policy::{MonitoredField, UNPLANNED_LABEL};
use crate::tracker::{FieldValue, Tracker, fields};
use serde_json::{Value, json};

/// Field-type-appropriate write payload restoring `previous`.
///
/// Returns `None` when there is nothing sensible to write back (a status
/// with no previous label has no clear form), in which case the revert is
/// reported as failed.
pub fn revert_payload(field: MonitoredField, previous: &FieldValue) -> Option<Value> {
    let property = field.property();
    let value = match field {
        MonitoredField::Title => match previous.as_label() {
            Some(text) => json!({ "title": [{ "text": { "content": text } }] }),
            None => json!({ "title": [] }),
        },
        MonitoredField::Status => json!({ "status": { "name": previous.as_label()? } }),
        MonitoredField::Priority | MonitoredField::Size => match previous.as_label() {
            Some(label) => json!({ "select": { "name": label } }),
            None => json!({ "select": null }),
        },
        MonitoredField::Assignees => {
            let ids: Vec<Value> = previous
                .as_ids()
                .unwrap_or(&[])
                .iter()
                .map(|id| json!({ "id": id }))
                .collect();
            json!({ "relation": ids })
        }
    };

    Some(json!({ property: value }))
}

/// Write the previous value back. Returns whether the write was applied.
pub async fn apply_revert(
    tracker: &dyn Tracker,
    guard: &mut LoopGuard,
    task_id: &str,
    field: MonitoredField,
    previous: &FieldValue,
) -> bool {
    let Some(properties) = revert_payload(field, previous) else {
        tracing::error!(%field, "no revert payload for previous value");
        return false;
    };

    guard.mark_self_write(task_id);
    match tracker.update(task_id, properties).await {
        Ok(_) => {
            tracing::warn!(
                task = crate::directory::short_id(task_id),
                %field,
                "out-of-policy change reverted"
            );
            true
        }
        Err(e) => {
            tracing::error!(%field, "revert failed: {e}");
            false
        }
    }
}

/// Bump the task's violation counter. Best-effort: a failure is logged and
/// the revert stands.
pub async fn increment_violation_counter(
    tracker: &dyn Tracker,
    guard: &mut LoopGuard,
    task_id: &str,
) {
    guard.mark_self_write(task_id);

    let current = match tracker.retrieve(task_id).await {
        Ok(task) => fields::violation_count(&task),
        Err(e) => {
            tracing::error!("could not read violation counter: {e}");
            return;
        }
    };

    let properties = json!({ "Violaciones Detectadas": { "number": current + 1 } });
    match tracker.update(task_id, properties).await {
        Ok(_) => tracing::debug!(count = current + 1, "violation counter updated"),
        Err(e) => tracing::error!("could not increment violation counter: {e}"),
    }
}

/// Force a task's priority to the unplanned label.
pub async fn convert_to_unplanned(
    tracker: &dyn Tracker,
    guard: &mut LoopGuard,
    task_id: &str,
) -> bool {
    guard.mark_self_write(task_id);

    let priority_property = MonitoredField::Priority.property();
    let properties = json!({
        priority_property: { "select": { "name": "Imprevista" } }
    });
    match tracker.update(task_id, properties).await {
        Ok(_) => true,
        Err(e) => {
            tracing::error!("conversion to {UNPLANNED_LABEL} failed: {e}");
            false
        }
    }
}
