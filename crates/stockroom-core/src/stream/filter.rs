// ── Filter predicates for entity snapshots ──
//
// Used by front-ends to narrow a cached snapshot without re-querying the API.

use crate::model::{CatalogEntity, EntityRef, SyncStatus};

/// Filter predicate over any catalog kind.
pub enum EntityFilter<T: CatalogEntity> {
    All,
    BySyncStatus(SyncStatus),
    /// Case-insensitive substring match on the label.
    LabelContains(String),
    /// Entities pointing at the given entity.
    Referencing(EntityRef),
    Custom(Box<dyn Fn(&T) -> bool + Send + Sync>),
}

impl<T: CatalogEntity> EntityFilter<T> {
    pub fn matches(&self, entity: &T) -> bool {
        match self {
            Self::All => true,
            Self::BySyncStatus(status) => entity.sync_status() == *status,
            Self::LabelContains(needle) => entity
                .label()
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            Self::Referencing(target) => entity.references().contains(target),
            Self::Custom(f) => f(entity),
        }
    }
}
