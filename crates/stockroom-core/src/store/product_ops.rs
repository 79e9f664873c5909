// ── Product gallery sub-resources ──
//
// Image upload, removal and ordering. Each call returns the updated
// product, which replaces the cached copy.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;

use super::EntityStore;
use crate::error::CoreError;
use crate::model::{CatalogEntity, EntityId, Product};

impl EntityStore<Product> {
    /// Upload one image to the end of the product's gallery.
    pub async fn upload_image(
        &self,
        product_id: &EntityId,
        file_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<Arc<Product>, CoreError> {
        self.ensure_open()?;
        self.with_id_lock(product_id, async {
            let _loading = self.begin_request();
            let result = self
                .client()
                .upload_image::<Product>(
                    Product::KIND.collection(),
                    product_id.as_str(),
                    file_name,
                    bytes,
                    content_type,
                )
                .await
                .map_err(|e| CoreError::from_api(e, Product::KIND, Some(product_id)));

            let product = self.absorb(self.record(result)?);
            info!(id = %product_id, file_name, images = product.images.len(), "image uploaded");
            Ok::<_, CoreError>(product)
        })
        .await
    }

    pub async fn delete_image(
        &self,
        product_id: &EntityId,
        image_id: &EntityId,
    ) -> Result<Arc<Product>, CoreError> {
        self.ensure_open()?;
        self.with_id_lock(product_id, async {
            let _loading = self.begin_request();
            let result = self
                .client()
                .delete_image::<Product>(
                    Product::KIND.collection(),
                    product_id.as_str(),
                    image_id.as_str(),
                )
                .await
                .map_err(|e| CoreError::from_api(e, Product::KIND, Some(product_id)));

            Ok::<_, CoreError>(self.absorb(self.record(result)?))
        })
        .await
    }

    /// Reorder the gallery. When the product is cached, `order` must be a
    /// permutation of its image ids; a mismatch is rejected locally
    /// without a request.
    pub async fn reorder_gallery(
        &self,
        product_id: &EntityId,
        order: &[EntityId],
    ) -> Result<Arc<Product>, CoreError> {
        self.ensure_open()?;

        if let Some(cached) = self.cached(product_id) {
            check_permutation(&cached, order)?;
        }

        self.with_id_lock(product_id, async {
            let _loading = self.begin_request();
            let ids: Vec<String> = order.iter().map(ToString::to_string).collect();
            let result = self
                .client()
                .reorder_images::<Product>(Product::KIND.collection(), product_id.as_str(), &ids)
                .await
                .map_err(|e| CoreError::from_api(e, Product::KIND, Some(product_id)));

            Ok::<_, CoreError>(self.absorb(self.record(result)?))
        })
        .await
    }
}

fn check_permutation(product: &Product, order: &[EntityId]) -> Result<(), CoreError> {
    let current: HashSet<&EntityId> = product.images.iter().map(|i| &i.id).collect();
    let requested: HashSet<&EntityId> = order.iter().collect();

    if requested.len() != order.len() || current != requested {
        return Err(CoreError::Validation {
            message: format!(
                "gallery order must list each of the product's {} images exactly once",
                current.len()
            ),
            fields: [("order".to_owned(), "not a permutation of the gallery".to_owned())]
                .into_iter()
                .collect(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn product() -> Product {
        serde_json::from_value(json!({
            "id": "p1",
            "name": "Widget",
            "images": [
                { "id": "i1", "url": "https://cdn.test/1.png" },
                { "id": "i2", "url": "https://cdn.test/2.png" }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn permutation_accepted() {
        let order = [EntityId::from("i2"), EntityId::from("i1")];
        assert!(check_permutation(&product(), &order).is_ok());
    }

    #[test]
    fn missing_or_duplicate_ids_rejected() {
        let p = product();
        assert!(check_permutation(&p, &[EntityId::from("i1")]).is_err());
        assert!(check_permutation(&p, &[EntityId::from("i1"), EntityId::from("i1")]).is_err());
        assert!(
            check_permutation(&p, &[EntityId::from("i1"), EntityId::from("i9")]).is_err()
        );
    }
}
