pub mod fields;

pub use fields::{EditorRef, FieldValue};

use crate::config::TrackerConfig;
use crate::error::TrackerError;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;

/// External store contract — the four calls the core depends on.
///
/// `query` hides cursor pagination: implementations loop until no cursor
/// remains and return the full result set.
#[async_trait]
pub trait Tracker: Send + Sync {
    async fn retrieve(&self, page_id: &str) -> Result<Value, TrackerError>;

    async fn update(&self, page_id: &str, properties: Value) -> Result<Value, TrackerError>;

    async fn create(&self, collection_id: &str, properties: Value)
    -> Result<Value, TrackerError>;

    /// Collection metadata — used only as a connectivity probe.
    async fn retrieve_collection(&self, collection_id: &str) -> Result<Value, TrackerError>;

    async fn query(
        &self,
        collection_id: &str,
        filter: Option<Value>,
        sorts: Option<Value>,
    ) -> Result<Vec<Value>, TrackerError>;
}

/// Tracker client over the provider's JSON HTTP API.
pub struct HttpTracker {
    client: reqwest::Client,
    base_url: String,
    token: String,
    api_version: String,
}

impl HttpTracker {
    pub fn from_config(config: &TrackerConfig) -> Result<Self, TrackerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TrackerError::Request {
                op: "client.build".into(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone().unwrap_or_default(),
            api_version: config.api_version.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Notion-Version", &self.api_version)
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        op: &str,
    ) -> Result<Value, TrackerError> {
        let resp = builder.send().await.map_err(|e| TrackerError::Request {
            op: op.into(),
            message: e.to_string(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
            return Err(TrackerError::Status {
                op: op.into(),
                status: status.as_u16(),
                body,
            });
        }

        resp.json().await.map_err(|e| TrackerError::Decode {
            op: op.into(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl Tracker for HttpTracker {
    async fn retrieve(&self, page_id: &str) -> Result<Value, TrackerError> {
        let builder = self.request(reqwest::Method::GET, &format!("/pages/{page_id}"));
        self.send(builder, "pages.retrieve").await
    }

    async fn update(&self, page_id: &str, properties: Value) -> Result<Value, TrackerError> {
        let builder = self
            .request(reqwest::Method::PATCH, &format!("/pages/{page_id}"))
            .json(&json!({ "properties": properties }));
        self.send(builder, "pages.update").await
    }

    async fn create(
        &self,
        collection_id: &str,
        properties: Value,
    ) -> Result<Value, TrackerError> {
        let builder = self.request(reqwest::Method::POST, "/pages").json(&json!({
            "parent": { "database_id": collection_id },
            "properties": properties,
        }));
        self.send(builder, "pages.create").await
    }

    async fn retrieve_collection(&self, collection_id: &str) -> Result<Value, TrackerError> {
        let builder = self.request(
            reqwest::Method::GET,
            &format!("/databases/{collection_id}"),
        );
        self.send(builder, "databases.retrieve").await
    }

    async fn query(
        &self,
        collection_id: &str,
        filter: Option<Value>,
        sorts: Option<Value>,
    ) -> Result<Vec<Value>, TrackerError> {
        let mut results = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({ "page_size": 100 });
            if let Some(ref f) = filter {
                body["filter"] = f.clone();
            }
            if let Some(ref s) = sorts {
                body["sorts"] = s.clone();
            }
            if let Some(ref c) = cursor {
                body["start_cursor"] = json!(c);
            }

            let builder = self
                .request(
                    reqwest::Method::POST,
                    &format!("/databases/{collection_id}/query"),
                )
                .json(&body);
            let page = self.send(builder, "databases.query").await?;

            if let Some(items) = page.get("results").and_then(Value::as_array) {
                results.extend(items.iter().cloned());
            }

            let has_more = page
                .get("has_more")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            cursor = page
                .get("next_cursor")
                .and_then(Value::as_str)
                .map(String::from);

            if !has_more || cursor.is_none() {
                break;
            }
        }

        Ok(results)
    }
}
