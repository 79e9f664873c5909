// ── Core error types ──
//
// User-facing errors from stockroom-core. Consumers never see reqwest
// errors or raw envelopes; `CoreError::from_api` translates transport
// failures into validation, conflict, not-found and network variants.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{EntityId, EntityKind};

/// Unified error type for the core crate.
///
/// `Clone` so a store can keep the last one around in its error state.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Connectivity ─────────────────────────────────────────────────
    #[error("Network error: {reason}")]
    Network { reason: String },

    // ── Request outcome ──────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        /// Per-field messages, keyed by field name.
        fields: BTreeMap<String, String>,
    },

    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        linked: LinkedEntities,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    #[error("API error: {message}")]
    Api { message: String, status: Option<u16> },

    // ── Local state ──────────────────────────────────────────────────
    #[error("The {kind} store has been closed")]
    StoreClosed { kind: EntityKind },

    #[error("Preferences error: {message}")]
    Preferences { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether retrying the same call may succeed. Only connectivity
    /// failures qualify; everything else is terminal for the attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Translate an API error, attributing a 404 to `kind` / `id`.
    pub fn from_api(err: stockroom_api::Error, kind: EntityKind, id: Option<&EntityId>) -> Self {
        if err.is_not_found() {
            return Self::NotFound {
                kind: kind.to_string(),
                id: id.map_or_else(|| "<unknown>".into(), ToString::to_string),
            };
        }
        Self::from(err)
    }

    fn from_details(message: String, status: Option<u16>, details: Option<&serde_json::Value>) -> Self {
        let linked = details.map(LinkedEntities::from_details).unwrap_or_default();
        if status == Some(409) || !linked.is_empty() {
            return Self::Conflict { message, linked };
        }

        let fields = details.map(validation_fields).unwrap_or_default();
        if matches!(status, Some(400 | 422)) || !fields.is_empty() {
            return Self::Validation { message, fields };
        }

        Self::Api { message, status }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<stockroom_api::Error> for CoreError {
    fn from(err: stockroom_api::Error) -> Self {
        use stockroom_api::Error as Api;

        if err.is_transient() {
            return Self::Network {
                reason: err.to_string(),
            };
        }

        match err {
            Api::Api {
                status: 404,
                message,
                ..
            } => Self::NotFound {
                kind: "resource".into(),
                id: message,
            },
            Api::Api {
                status,
                message,
                details,
            } => Self::from_details(message, Some(status), details.as_ref()),
            Api::Rejected { message, details } => {
                Self::from_details(message, None, details.as_ref())
            }
            Api::Transport(e) => Self::Api {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            },
            Api::Tls(msg) => Self::Network {
                reason: format!("TLS error: {msg}"),
            },
            Api::InvalidUrl(e) => Self::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::InvalidToken(msg) => Self::Config {
                message: format!("Invalid API token: {msg}"),
            },
            Api::WebSocketConnect(reason) => Self::Network {
                reason: format!("WebSocket connection failed: {reason}"),
            },
            Api::WebSocketClosed { code, reason } => Self::Network {
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            Api::Deserialization { message, body: _ } => {
                Self::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}

fn validation_fields(details: &serde_json::Value) -> BTreeMap<String, String> {
    let Some(fields) = details.get("fields").and_then(serde_json::Value::as_object) else {
        return BTreeMap::new();
    };

    fields
        .iter()
        .map(|(field, msg)| {
            let text = match msg {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Array(items) => items
                    .iter()
                    .filter_map(serde_json::Value::as_str)
                    .collect::<Vec<_>>()
                    .join("; "),
                other => other.to_string(),
            };
            (field.clone(), text)
        })
        .collect()
}

// ── LinkedEntities ───────────────────────────────────────────────────

/// An entity blocking a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedEntity {
    pub id: EntityId,
    #[serde(default)]
    pub name: String,
}

/// Dependents reported by the server on a conflicting delete, keyed as
/// the server keys them (`linkedProducts`, `linkedCategories`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkedEntities(BTreeMap<String, Vec<LinkedEntity>>);

impl LinkedEntities {
    /// Collect every `linked*` list from an envelope `details` object.
    /// Entries that are not `{id, name}` records are skipped.
    pub fn from_details(details: &serde_json::Value) -> Self {
        let Some(map) = details.as_object() else {
            return Self::default();
        };

        let linked = map
            .iter()
            .filter(|(key, _)| key.starts_with("linked"))
            .filter_map(|(key, value)| {
                let items: Vec<LinkedEntity> = value
                    .as_array()?
                    .iter()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect();
                (!items.is_empty()).then(|| (key.clone(), items))
            })
            .collect();

        Self(linked)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of dependents across all groups.
    pub fn total(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn get(&self, key: &str) -> Option<&[LinkedEntity]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[LinkedEntity])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl fmt::Display for LinkedEntities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (group, items) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            let names: Vec<&str> = items.iter().map(|e| e.name.as_str()).collect();
            write!(f, "{group}: {}", names.join(", "))?;
        }
        Ok(())
    }
}
