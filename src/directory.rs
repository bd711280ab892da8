//! Display-name caches for actors and assignees.
//!
//! Loaded once at startup from the people collection: tracker-account id →
//! display name (audit actor resolution) and person page id → display name
//! (rendering assignee relation lists in audit records).

use crate::tracker::{EditorRef, Tracker};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct UserDirectory {
    /// Tracker account id → display name.
    accounts: HashMap<String, String>,
    /// Person page id → display name.
    people: HashMap<String, String>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load both caches from the people collection. Failures leave the
    /// directory partially (or fully) empty — name resolution degrades to
    /// fallbacks, never blocks processing.
    pub async fn load(tracker: &dyn Tracker, people_collection: &str) -> Self {
        let mut directory = Self::new();

        let persons = match tracker.query(people_collection, None, None).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!("failed to load people directory: {e}");
                return directory;
            }
        };

        for person in &persons {
            let Some(name) = person
                .pointer("/properties/Nombre/title/0/text/content")
                .and_then(Value::as_str)
            else {
                continue;
            };

            if let Some(page_id) = person.get("id").and_then(Value::as_str) {
                directory.people.insert(page_id.to_string(), name.to_string());
            }
            if let Some(account_id) = person
                .pointer("/properties/Cuenta Notion/people/0/id")
                .and_then(Value::as_str)
            {
                directory
                    .accounts
                    .insert(account_id.to_string(), name.to_string());
            }
        }

        tracing::info!(
            accounts = directory.accounts.len(),
            people = directory.people.len(),
            "people directory loaded"
        );
        directory
    }

    pub fn person_name(&self, page_id: &str) -> Option<&str> {
        self.people.get(page_id).map(String::as_str)
    }

    /// Resolve the display name for a page editor, with graceful fallbacks:
    /// directory entry, provider-reported name, name derived from the email
    /// local part, then a truncated id. `None` (no editor on the page) reads
    /// as the system itself.
    pub fn display_editor(&self, editor: Option<&EditorRef>) -> String {
        let Some(editor) = editor else {
            return "system".into();
        };

        if let Some(name) = self.accounts.get(&editor.id) {
            return name.clone();
        }
        if let Some(name) = &editor.name {
            return name.clone();
        }
        if let Some(email) = &editor.email {
            return name_from_email(email);
        }
        format!("user-{}", short_id(&editor.id))
    }
}

/// "laura.perez@example.com" → "Laura Perez"
fn name_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email);
    local
        .split('.')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn short_id(id: &str) -> &str {
    &id[..id.len().min(8)]
}
