// Bugzilla REST client.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use super::IssueTracker;
use crate::bug::{Attachment, BugRecord, Comment};
use crate::config::TrackerSection;
use crate::error::{ConfigError, TrackerError};
use crate::transport::HttpTransport;

const API_KEY_HEADER: &str = "X-BUGZILLA-API-KEY";

// ── API response types ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct BugList {
    #[serde(default)]
    bugs: Vec<BugRecord>,
}

#[derive(Debug, Deserialize)]
struct CommentEnvelope {
    bugs: HashMap<String, CommentList>,
}

#[derive(Debug, Deserialize)]
struct CommentList {
    #[serde(default)]
    comments: Vec<Comment>,
}

#[derive(Debug, Deserialize)]
struct AttachmentEnvelope {
    bugs: HashMap<String, Vec<Attachment>>,
}

/// Bugzilla REST API client.
#[derive(Debug, Clone)]
pub struct BugzillaClient {
    transport: Arc<HttpTransport>,
    api_root: String,
    api_key: String,
    include_fields: String,
}

impl BugzillaClient {
    pub fn new(
        transport: Arc<HttpTransport>,
        api_root: &str,
        api_key: &str,
        include_fields: &str,
    ) -> Self {
        Self {
            transport,
            api_root: api_root.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            include_fields: include_fields.to_string(),
        }
    }

    /// Build a client from the environment. The API root variable overrides
    /// the configured root; the API key variable is required.
    pub fn from_env(
        transport: Arc<HttpTransport>,
        section: &TrackerSection,
    ) -> Result<Self, ConfigError> {
        let api_key = std::env::var(&section.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::MissingEnv(section.api_key_env.clone()))?;
        let api_root =
            std::env::var(&section.api_root_env).unwrap_or_else(|_| section.api_root.clone());
        Ok(Self::new(transport, &api_root, &api_key, &section.include_fields))
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T, TrackerError> {
        let url = format!("{}/{path}", self.api_root);
        let resp = self
            .transport
            .send(|client| {
                client
                    .get(&url)
                    .header(API_KEY_HEADER, &self.api_key)
                    .query(query)
            })
            .await?;
        resp.json()
            .await
            .map_err(|e| TrackerError::Parse(format!("{path}: {e}")))
    }

    async fn comments(&self, id: u64) -> Result<Vec<Comment>, TrackerError> {
        let mut envelope: CommentEnvelope = self.get(&format!("bug/{id}/comment"), &[]).await?;
        Ok(envelope
            .bugs
            .remove(&id.to_string())
            .map(|list| list.comments)
            .unwrap_or_default())
    }

    async fn attachments(&self, id: u64) -> Result<Vec<Attachment>, TrackerError> {
        let mut envelope: AttachmentEnvelope =
            self.get(&format!("bug/{id}/attachment"), &[]).await?;
        Ok(envelope.bugs.remove(&id.to_string()).unwrap_or_default())
    }
}

/// Flatten a saved search into query pairs; arrays repeat the key.
fn search_pairs(params: &Map<String, Value>) -> Vec<(String, String)> {
    let scalar = |v: &Value| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    params
        .iter()
        .flat_map(|(key, value)| match value {
            Value::Array(items) => items.iter().map(|v| (key.clone(), scalar(v))).collect(),
            other => vec![(key.clone(), scalar(other))],
        })
        .collect()
}

/// Rewrite a record diff into an update request body. Keywords are replaced
/// wholesale and only flags without an id (new requests) are sent.
fn update_body(diff: &Map<String, Value>) -> Map<String, Value> {
    let mut body = Map::new();
    for (key, value) in diff {
        match key.as_str() {
            "keywords" => {
                body.insert(key.clone(), serde_json::json!({ "set": value }));
            }
            "flags" => {
                let new: Vec<Value> = value
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter(|f| f.get("id").is_none())
                    .cloned()
                    .collect();
                if !new.is_empty() {
                    body.insert(key.clone(), Value::Array(new));
                }
            }
            "id" | "attachments" | "comments" | "last_change_time" => {}
            _ => {
                body.insert(key.clone(), value.clone());
            }
        }
    }
    body
}

#[async_trait::async_trait]
impl IssueTracker for BugzillaClient {
    #[instrument(skip(self))]
    async fn fetch(&self, id: u64) -> Result<BugRecord, TrackerError> {
        let query = [("include_fields".to_string(), self.include_fields.clone())];
        let list: BugList = self.get(&format!("bug/{id}"), &query).await?;
        let mut record = list
            .bugs
            .into_iter()
            .next()
            .ok_or(TrackerError::NotFound(id))?;
        record.comments = self.comments(id).await?;
        record.attachments = self.attachments(id).await?;
        debug!(
            bug = id,
            comments = record.comments.len(),
            attachments = record.attachments.len(),
            "Fetched bug"
        );
        Ok(record)
    }

    async fn search(&self, params: &Map<String, Value>) -> Result<Vec<BugRecord>, TrackerError> {
        let mut query = search_pairs(params);
        if !params.contains_key("include_fields") {
            query.push(("include_fields".to_string(), self.include_fields.clone()));
        }
        let list: BugList = self.get("bug", &query).await?;
        info!(count = list.bugs.len(), "Search returned bugs");
        Ok(list.bugs)
    }

    async fn push(&self, id: u64, diff: &Map<String, Value>) -> Result<(), TrackerError> {
        let body = update_body(diff);
        if body.is_empty() {
            return Ok(());
        }
        let url = format!("{}/bug/{id}", self.api_root);
        self.transport
            .send(|client| {
                client
                    .put(&url)
                    .header(API_KEY_HEADER, &self.api_key)
                    .json(&body)
            })
            .await?;
        info!(bug = id, fields = body.len(), "Updated bug");
        Ok(())
    }
}
