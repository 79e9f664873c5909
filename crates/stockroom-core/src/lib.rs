// stockroom-core: entity stores, push reconciliation, and persisted
// preferences between stockroom-api and front-ends.

pub mod bridge;
pub mod catalog;
pub mod config;
pub mod error;
pub mod model;
pub mod preferences;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::{BridgeOptions, ChannelState, SyncBridge};
pub use catalog::Catalog;
pub use config::{CatalogConfig, PreferencesLocation, TlsVerification};
pub use error::{CoreError, LinkedEntities, LinkedEntity};
pub use preferences::{PreferencesStore, Section};
pub use store::EntityStore;
pub use stream::{EntityFilter, EntityStream};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Address, Brand, BrandDraft, BrandPatch, CatalogEntity, Category, CategoryDraft,
    CategoryPatch, Contact, EntityId, EntityKind, EntityRef, Image, ListFilters, Product,
    ProductDraft, ProductPatch, Supplier, SupplierDraft, SupplierPatch, SyncInfo, SyncStatus,
};
