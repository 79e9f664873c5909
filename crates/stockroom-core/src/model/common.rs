// ── Shared value types ──

use serde::{Deserialize, Serialize};

use super::entity_id::EntityId;

/// An image attached to an entity (brand logo, category image, product gallery).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: EntityId,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}
