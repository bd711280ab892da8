//! Suppression of the system's own corrective writes.
//!
//! The notification stream cannot reliably say who made an edit, so a short
//! time-proximity check against our own just-issued writes is the practical
//! substitute. Known trade-off: a genuine external edit landing inside the
//! window right after a system write is indistinguishable from our echo and
//! will be suppressed.

use chrono::DateTime;
use std::collections::HashMap;

pub struct LoopGuard {
    /// Observed edits closer than this to a mark count as ours.
    window_secs: f64,
    /// Marks further than this from the observed edit are stale and purged.
    cleanup_secs: f64,
    marks: HashMap<String, f64>,
}

impl LoopGuard {
    pub fn new(window_secs: f64, cleanup_secs: f64) -> Self {
        Self {
            window_secs,
            cleanup_secs,
            marks: HashMap::new(),
        }
    }

    /// Record that we are about to write to this task.
    pub fn mark_self_write(&mut self, task_id: &str) {
        self.mark_at(task_id, now_epoch());
    }

    /// Record a mark at an explicit epoch time.
    pub fn mark_at(&mut self, task_id: &str, epoch_secs: f64) {
        tracing::debug!(task = crate::directory::short_id(task_id), "self-write marked");
        self.marks.insert(task_id.to_string(), epoch_secs);
    }

    /// Is an observed `last_edited_time` our own echo? Lazily purges marks
    /// the observation has clearly moved past.
    pub fn is_self_originated(
        &mut self,
        task_id: &str,
        observed_last_edited: Option<&str>,
    ) -> bool {
        let Some(&mark) = self.marks.get(task_id) else {
            return false;
        };
        let Some(observed) = observed_last_edited.and_then(parse_epoch) else {
            return false;
        };

        let distance = (observed - mark).abs();
        if distance < self.window_secs {
            tracing::debug!(
                task = crate::directory::short_id(task_id),
                distance_secs = distance,
                "self-originated edit suppressed"
            );
            return true;
        }
        if distance > self.cleanup_secs {
            self.marks.remove(task_id);
            tracing::debug!(
                task = crate::directory::short_id(task_id),
                "stale self-write marker purged"
            );
        }
        false
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

fn now_epoch() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

fn parse_epoch(raw: &str) -> Option<f64> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.timestamp_millis() as f64 / 1000.0)
}
