//! Typed extraction from the tracker's semi-structured page records.
//!
//! The provider wraps every property value in a per-type envelope (title
//! array, select object, relation list, …). Everything downstream operates on
//! the [`FieldValue`] union produced here, never on the raw shape; any
//! missing or malformed wrapper degrades to [`FieldValue::Absent`] instead of
//! erroring.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalized value of a single page property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Choice(String),
    Status(String),
    Date(String),
    IdList(Vec<String>),
    Absent,
}

impl FieldValue {
    /// Scalar label, for the variants that carry one.
    pub fn as_label(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Choice(s) | Self::Status(s) | Self::Date(s) => Some(s),
            Self::IdList(_) | Self::Absent => None,
        }
    }

    pub fn as_ids(&self) -> Option<&[String]> {
        match self {
            Self::IdList(ids) => Some(ids),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Case-insensitive label comparison; `Absent` and id-lists never match.
    pub fn label_matches(&self, expected: &str) -> bool {
        self.as_label()
            .is_some_and(|l| l.eq_ignore_ascii_case(expected))
    }
}

/// The user recorded on a page's `last_edited_by`.
#[derive(Debug, Clone)]
pub struct EditorRef {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub bot: bool,
}

fn property<'a>(page: &'a Value, name: &str) -> Option<&'a Value> {
    page.get("properties").and_then(|p| p.get(name))
}

/// Extract a property as a [`FieldValue`], normalizing the provider's
/// per-type wrappers. A relation wrapper always yields an `IdList`, even when
/// empty — "no assignees" is a value, not an absence.
pub fn field_value(page: &Value, name: &str) -> FieldValue {
    let Some(prop) = property(page, name) else {
        return FieldValue::Absent;
    };

    if let Some(title) = prop.get("title").and_then(Value::as_array) {
        if let Some(content) = title
            .first()
            .and_then(|t| t.pointer("/text/content"))
            .and_then(Value::as_str)
        {
            return FieldValue::Text(content.to_string());
        }
    }
    if let Some(name) = prop.pointer("/status/name").and_then(Value::as_str) {
        return FieldValue::Status(name.to_string());
    }
    if let Some(name) = prop.pointer("/select/name").and_then(Value::as_str) {
        return FieldValue::Choice(name.to_string());
    }
    if let Some(start) = prop.pointer("/date/start").and_then(Value::as_str) {
        return FieldValue::Date(start.to_string());
    }
    if let Some(relation) = prop.get("relation").and_then(Value::as_array) {
        let ids = relation
            .iter()
            .filter_map(|r| r.get("id").and_then(Value::as_str))
            .map(String::from)
            .collect();
        return FieldValue::IdList(ids);
    }
    if let Some(rich) = prop.get("rich_text").and_then(Value::as_array) {
        if let Some(content) = rich
            .first()
            .and_then(|t| t.pointer("/text/content"))
            .and_then(Value::as_str)
        {
            return FieldValue::Text(content.to_string());
        }
    }

    FieldValue::Absent
}

/// Days since the owning sprint's start — precomputed by the store as a
/// formula property; 0 when missing.
pub fn elapsed_days(page: &Value) -> i64 {
    property(page, "Días Transcurridos Sprint")
        .and_then(|p| p.pointer("/formula/number"))
        .and_then(Value::as_f64)
        .map_or(0, |n| n as i64)
}

/// Current value of the violation counter; 0 when missing.
pub fn violation_count(page: &Value) -> i64 {
    property(page, "Violaciones Detectadas")
        .and_then(|p| p.get("number"))
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

pub fn task_name(page: &Value) -> Option<String> {
    match field_value(page, "Nombre") {
        FieldValue::Text(s) => Some(s),
        _ => None,
    }
}

/// First id of the task's sprint relation.
pub fn sprint_relation(page: &Value) -> Option<String> {
    page.pointer("/properties/Sprint/relation/0/id")
        .and_then(Value::as_str)
        .map(String::from)
}

pub fn last_edited_time(page: &Value) -> Option<&str> {
    page.get("last_edited_time").and_then(Value::as_str)
}

/// The sprint page's monitoring-activation flag.
pub fn monitoring_active(sprint: &Value) -> bool {
    sprint
        .pointer("/properties/Monitoreo Activo/checkbox")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// The sprint page's "is current" formula flag.
pub fn is_current_sprint(sprint: &Value) -> bool {
    sprint
        .pointer("/properties/Es Actual/formula/boolean")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

pub fn editor(page: &Value) -> Option<EditorRef> {
    let by = page.get("last_edited_by")?;
    let id = by.get("id").and_then(Value::as_str)?.to_string();
    let bot = by.get("object").and_then(Value::as_str) == Some("bot")
        || by.get("type").and_then(Value::as_str) == Some("bot");
    let name = by.get("name").and_then(Value::as_str).map(String::from);
    let email = by
        .pointer("/person/email")
        .and_then(Value::as_str)
        .map(String::from);

    Some(EditorRef {
        id,
        name,
        email,
        bot,
    })
}
