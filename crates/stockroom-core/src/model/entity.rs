// ── Generic entity contract ──
//
// Every catalog kind implements `CatalogEntity`; the store, the bridge,
// and the preferences factory are written against this trait only.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString};

use super::entity_id::EntityId;

// ── EntityKind ──────────────────────────────────────────────────────

/// The four catalog entity kinds.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum EntityKind {
    #[strum(to_string = "product", serialize = "products")]
    Product,
    #[strum(to_string = "brand", serialize = "brands")]
    Brand,
    #[strum(to_string = "category", serialize = "categories")]
    Category,
    #[strum(to_string = "supplier", serialize = "suppliers")]
    Supplier,
}

impl EntityKind {
    /// Pluralized REST collection name (`/api/{collection}`).
    pub fn collection(self) -> &'static str {
        match self {
            Self::Product => "products",
            Self::Brand => "brands",
            Self::Category => "categories",
            Self::Supplier => "suppliers",
        }
    }

    /// WebSocket channel name. Same as the collection.
    pub fn channel(self) -> &'static str {
        self.collection()
    }

    /// Reverse of [`channel`](Self::channel).
    pub fn from_channel(channel: &str) -> Option<Self> {
        match channel {
            "products" => Some(Self::Product),
            "brands" => Some(Self::Brand),
            "categories" => Some(Self::Category),
            "suppliers" => Some(Self::Supplier),
            _ => None,
        }
    }

    /// Durable storage key for this kind's preferences record.
    pub fn preferences_key(self) -> String {
        format!("{self}-preferences")
    }
}

// ── SyncStatus ──────────────────────────────────────────────────────

/// Relationship of an entity with the external e-commerce platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum SyncStatus {
    /// Never pushed (no external id).
    Unsynced,
    /// External copy matches.
    Synced,
    /// Modified locally since the last successful sync.
    PendingChanges,
}

impl SyncStatus {
    /// Derive from the presence of an external id and the dirty flag.
    pub fn derive(external_id: Option<&str>, dirty: bool) -> Self {
        match (external_id, dirty) {
            (None, _) => Self::Unsynced,
            (Some(_), true) => Self::PendingChanges,
            (Some(_), false) => Self::Synced,
        }
    }
}

/// External-platform bookkeeping shared by every kind (flattened into
/// each entity's JSON).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default)]
    pub dirty: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_status: Option<SyncStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl SyncInfo {
    /// The server-reported status, or one derived from the external id.
    pub fn status(&self) -> SyncStatus {
        self.sync_status
            .unwrap_or_else(|| SyncStatus::derive(self.external_id.as_deref(), self.dirty))
    }
}

// ── EntityRef ───────────────────────────────────────────────────────

/// A weak reference to another entity. Never checked by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: EntityId) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

// ── CatalogEntity ───────────────────────────────────────────────────

/// Contract shared by products, brands, categories and suppliers.
pub trait CatalogEntity:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: EntityKind;

    /// Creation payload.
    type Draft: Serialize + Send + Sync;
    /// Partial-update payload.
    type Patch: Serialize + Send + Sync;

    fn id(&self) -> &EntityId;
    fn label(&self) -> &str;
    fn sync_info(&self) -> &SyncInfo;

    fn sync_status(&self) -> SyncStatus {
        self.sync_info().status()
    }

    fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.sync_info().last_synced_at
    }

    /// Other entities this one points at.
    fn references(&self) -> Vec<EntityRef> {
        Vec::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn kind_parses_singular_and_plural() {
        assert_eq!("brand".parse::<EntityKind>().unwrap(), EntityKind::Brand);
        assert_eq!("Categories".parse::<EntityKind>().unwrap(), EntityKind::Category);
        assert!("widgets".parse::<EntityKind>().is_err());
    }

    #[test]
    fn kind_channel_round_trip() {
        for kind in EntityKind::iter() {
            assert_eq!(EntityKind::from_channel(kind.channel()), Some(kind));
        }
    }

    #[test]
    fn preferences_key_uses_singular_name() {
        assert_eq!(EntityKind::Supplier.preferences_key(), "supplier-preferences");
    }

    #[test]
    fn sync_status_derivation() {
        assert_eq!(SyncStatus::derive(None, true), SyncStatus::Unsynced);
        assert_eq!(SyncStatus::derive(Some("wc-1"), false), SyncStatus::Synced);
        assert_eq!(SyncStatus::derive(Some("wc-1"), true), SyncStatus::PendingChanges);
    }

    #[test]
    fn explicit_status_wins_over_derivation() {
        let info: SyncInfo = serde_json::from_value(serde_json::json!({
            "externalId": "wc-9",
            "syncStatus": "pendingChanges"
        }))
        .unwrap();
        assert_eq!(info.status(), SyncStatus::PendingChanges);
        assert_eq!(SyncStatus::PendingChanges.to_string(), "pendingChanges");
    }
}
