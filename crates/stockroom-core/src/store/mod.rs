// ── Entity stores ──
//
// One `EntityStore<T>` per catalog kind, each backed by a reactive
// `EntityCollection`.

mod collection;
mod entity_store;
mod product_ops;

pub use entity_store::EntityStore;
