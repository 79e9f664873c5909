// ── Domain model ──
//
// Typed records for every catalog kind, plus the generic entity contract
// the stores are written against.

pub mod brand;
pub mod category;
pub mod common;
pub mod entity;
pub mod entity_id;
pub mod filters;
pub mod product;
pub mod supplier;

pub use brand::{Brand, BrandDraft, BrandPatch};
pub use category::{Category, CategoryDraft, CategoryPatch};
pub use common::Image;
pub use entity::{CatalogEntity, EntityKind, EntityRef, SyncInfo, SyncStatus};
pub use entity_id::EntityId;
pub use filters::ListFilters;
pub use product::{Product, ProductDraft, ProductPatch};
pub use supplier::{Address, Contact, Supplier, SupplierDraft, SupplierPatch};
