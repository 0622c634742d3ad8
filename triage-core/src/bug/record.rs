//! Serde view of the tracker's bug JSON.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One bug as returned by the tracker REST API. Fields the workflow does not
/// read are preserved in `extra`, which is also where the per-branch
/// `cf_status_*` flags live.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BugRecord {
    pub id: u64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub resolution: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub version: String,
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub component: String,
    #[serde(default)]
    pub op_sys: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub whiteboard: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub creation_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_change_time: Option<String>,
    #[serde(default)]
    pub assigned_to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to_detail: Option<UserDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_detail: Option<UserDetail>,
    #[serde(default)]
    pub flags: Vec<BugFlag>,
    /// New comment to post with the next update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<NewComment>,
    /// Present only on offline records.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Present only on offline records.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserDetail {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub nick: String,
    #[serde(default)]
    pub real_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BugFlag {
    /// Set by the tracker; new flags have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requestee: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewComment {
    pub body: String,
    pub is_private: bool,
    pub is_markdown: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "bool_or_int")]
    pub is_obsolete: bool,
    #[serde(default)]
    pub creation_time: String,
    /// Base64 payload.
    #[serde(default)]
    pub data: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub creation_time: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn string_or_number<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn bool_or_int<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_unknown_fields() {
        let record: BugRecord = serde_json::from_value(serde_json::json!({
            "id": 1_234_567,
            "status": "NEW",
            "version": 130,
            "whiteboard": "[bugmon:confirm]",
            "cf_status_firefox130": "affected",
            "severity": "S2",
        }))
        .unwrap();
        assert_eq!(record.version, "130");
        assert_eq!(record.extra["cf_status_firefox130"], "affected");

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["severity"], "S2");
        assert!(back.get("attachments").is_none());
    }

    #[test]
    fn obsolete_accepts_integers() {
        let attachment: Attachment = serde_json::from_value(serde_json::json!({
            "id": 1,
            "file_name": "testcase.html",
            "is_obsolete": 1,
        }))
        .unwrap();
        assert!(attachment.is_obsolete);
    }
}
