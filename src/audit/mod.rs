//! Structured audit records for every evaluated change.
//!
//! One page per record, appended to the external log collection. The
//! property names and select options below are that collection's schema;
//! the core never queries the log back.

use crate::directory::UserDirectory;
use crate::error::TrackerError;
use crate::tracker::{FieldValue, Tracker};
use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};
use std::sync::Arc;

/// What the core did about an evaluated change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Permitted,
    Reverted,
    RevertFailed,
    AutoConverted,
    DeletionPermitted,
    DeletionBlocked,
}

impl AuditAction {
    /// Value for the log's "Acción Tomada" select.
    pub fn taken_label(self) -> &'static str {
        match self {
            Self::Permitted => "Permitido",
            Self::Reverted => "Revertido",
            Self::RevertFailed => "Error al revertir",
            Self::AutoConverted => "Auto-convertida a Imprevista",
            Self::DeletionPermitted => "Eliminación permitida (Imprevista)",
            Self::DeletionBlocked => "Eliminación bloqueada (No imprevista)",
        }
    }

    /// Value for the log's "Tipo Modificación" select.
    pub fn category(self) -> &'static str {
        match self {
            Self::Permitted => "Permitida",
            Self::Reverted | Self::RevertFailed => "Bloqueada",
            Self::AutoConverted => "Auto-conversión",
            Self::DeletionPermitted | Self::DeletionBlocked => "Eliminación",
        }
    }
}

/// Immutable log entry for one evaluated change.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub task_id: String,
    pub task_name: String,
    pub field: String,
    pub old_value: String,
    pub new_value: String,
    /// `None` for deletions, which have no meaningful elapsed-days reading.
    pub elapsed_days: Option<i64>,
    pub priority: String,
    pub actor: String,
    pub action: AuditAction,
}

/// Render a field value the way log readers expect: assignee id lists become
/// names (or truncated ids), absence reads as "none".
pub fn format_value(value: &FieldValue, directory: &UserDirectory) -> String {
    match value {
        FieldValue::IdList(ids) if ids.is_empty() => "sin responsables".into(),
        FieldValue::IdList(ids) => ids
            .iter()
            .map(|id| {
                directory
                    .person_name(id)
                    .map_or_else(|| format!("ID:{}", crate::directory::short_id(id)), String::from)
            })
            .collect::<Vec<_>>()
            .join(", "),
        FieldValue::Absent => "sin valor".into(),
        other => other.as_label().unwrap_or_default().to_string(),
    }
}

/// Build the log page's property payload. Pure, for testability; the
/// timestamp and log id are injected.
pub fn build_properties(record: &AuditRecord, timestamp: &str, log_id: &str) -> Value {
    let elapsed = record
        .elapsed_days
        .map_or_else(|| "N/A".to_string(), |d| d.to_string());
    let detail = format!(
        "Tarea: {} | Campo: {} | Días: {} | Usuario: {} | Prioridad: {}",
        record.task_name, record.field, elapsed, record.actor, record.priority
    );

    json!({
        "ID Log": { "title": [{ "text": { "content": log_id } }] },
        "Tarea Afectada": { "relation": [{ "id": record.task_id }] },
        "Usuario": { "rich_text": [{ "text": { "content": record.actor } }] },
        "Fecha Modificación": { "date": { "start": timestamp } },
        "Tipo Modificación": { "select": { "name": record.action.category() } },
        "Campo Modificado": { "rich_text": [{ "text": { "content": record.field } }] },
        "Valor Anterior": { "rich_text": [{ "text": { "content": record.old_value } }] },
        "Valor Nuevo": { "rich_text": [{ "text": { "content": record.new_value } }] },
        "Acción Tomada": { "select": { "name": record.action.taken_label() } },
        "Detalle": { "rich_text": [{ "text": { "content": detail } }] },
    })
}

/// Appends audit records to the external log collection.
pub struct AuditWriter {
    tracker: Arc<dyn Tracker>,
    log_collection: Option<String>,
}

impl AuditWriter {
    pub fn new(tracker: Arc<dyn Tracker>, log_collection: Option<String>) -> Self {
        Self {
            tracker,
            log_collection,
        }
    }

    /// Append one record. Audit failures are logged, never propagated — the
    /// enforcement outcome stands regardless.
    pub async fn append(&self, record: &AuditRecord) {
        let Some(collection) = &self.log_collection else {
            tracing::warn!("audit-log collection not configured; record dropped");
            return;
        };

        match self.try_append(collection, record).await {
            Ok(()) => tracing::info!(
                category = record.action.category(),
                action = record.action.taken_label(),
                "audit record written"
            ),
            Err(e) => tracing::error!("failed to write audit record: {e}"),
        }
    }

    async fn try_append(
        &self,
        collection: &str,
        record: &AuditRecord,
    ) -> Result<(), TrackerError> {
        let now = Utc::now();
        let log_id = format!(
            "LOG_{}_{}",
            now.format("%Y%m%d_%H%M%S"),
            crate::directory::short_id(&record.task_id)
        );
        let timestamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let properties = build_properties(record, &timestamp, &log_id);

        self.tracker.create(collection, properties).await?;
        Ok(())
    }
}
