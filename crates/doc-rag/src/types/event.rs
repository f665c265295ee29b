//! Object-storage change notifications

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// What happened to an object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageEventKind {
    /// Object was created or overwritten
    Created,
    /// Object was deleted
    Deleted,
    /// Any other notification type (ignored)
    Other(String),
}

impl StorageEventKind {
    /// Map a notification type string to a kind
    pub fn parse(event_type: &str) -> Self {
        match event_type {
            "Created" | "Microsoft.Storage.BlobCreated" => Self::Created,
            "Deleted" | "Microsoft.Storage.BlobDeleted" => Self::Deleted,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A single object-storage change notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageEvent {
    /// Notification kind
    pub kind: StorageEventKind,
    /// Full object URL (`data.url`)
    pub url: String,
}

impl StorageEvent {
    /// Create a creation notification
    pub fn created(url: impl Into<String>) -> Self {
        Self {
            kind: StorageEventKind::Created,
            url: url.into(),
        }
    }

    /// Create a deletion notification
    pub fn deleted(url: impl Into<String>) -> Self {
        Self {
            kind: StorageEventKind::Deleted,
            url: url.into(),
        }
    }

    /// Parse one notification
    ///
    /// Accepts both `eventType` (event-grid schema) and `event_type`.
    pub fn from_value(value: &Value) -> Result<Self> {
        let event_type = value
            .get("eventType")
            .or_else(|| value.get("event_type"))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidEvent("missing event type".to_string()))?;

        let url = value
            .get("data")
            .and_then(|data| data.get("url"))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidEvent("missing data.url".to_string()))?;

        Ok(Self {
            kind: StorageEventKind::parse(event_type),
            url: url.to_string(),
        })
    }

    /// Parse a request body holding either one notification or an array of them
    pub fn parse_batch(value: &Value) -> Result<Vec<Self>> {
        match value {
            Value::Array(items) => items.iter().map(Self::from_value).collect(),
            single => Ok(vec![Self::from_value(single)?]),
        }
    }
}
