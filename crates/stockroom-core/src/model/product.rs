use serde::{Deserialize, Serialize};

use super::common::Image;
use super::entity::{CatalogEntity, EntityKind, EntityRef, SyncInfo};
use super::entity_id::EntityId;

/// A sellable item. `price` is kept as the decimal string the server sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: EntityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<EntityId>,
    #[serde(default)]
    pub supplier_ids: Vec<EntityId>,
    /// Gallery, in display order.
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(flatten)]
    pub sync: SyncInfo,
}

impl Product {
    pub fn image(&self, image_id: &EntityId) -> Option<&Image> {
        self.images.iter().find(|i| &i.id == image_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supplier_ids: Vec<EntityId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_ids: Option<Vec<EntityId>>,
}

impl CatalogEntity for Product {
    const KIND: EntityKind = EntityKind::Product;
    type Draft = ProductDraft;
    type Patch = ProductPatch;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn label(&self) -> &str {
        &self.name
    }

    fn sync_info(&self) -> &SyncInfo {
        &self.sync
    }

    fn references(&self) -> Vec<EntityRef> {
        let mut refs = Vec::with_capacity(2 + self.supplier_ids.len());
        if let Some(id) = &self.brand_id {
            refs.push(EntityRef::new(EntityKind::Brand, id.clone()));
        }
        if let Some(id) = &self.category_id {
            refs.push(EntityRef::new(EntityKind::Category, id.clone()));
        }
        refs.extend(
            self.supplier_ids
                .iter()
                .map(|id| EntityRef::new(EntityKind::Supplier, id.clone())),
        );
        refs
    }
}
