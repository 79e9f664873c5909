//! list / get / create / update / delete / sync handlers, shared by every
//! entity kind.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tabled::Tabled;
use tracing::warn;

use stockroom_core::{
    Brand, Catalog, CatalogEntity, Category, EntityId, EntityKind, EntityStore, ListFilters,
    Product, Supplier,
};

use crate::cli::{GlobalOpts, ListArgs, PayloadArgs};
use crate::error::CliError;
use crate::output;

use super::with_store;

// ── Rendering ───────────────────────────────────────────────────────

/// Table row and detail view for one entity type.
pub trait Render: CatalogEntity + PartialEq {
    type Row: Tabled;

    fn row(&self, color: bool) -> Self::Row;

    /// `(label, value)` pairs for the detail view.
    fn fields(&self) -> Vec<(&'static str, String)>;
}

fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_owned()
}

fn common_fields<T: CatalogEntity>(entity: &T) -> Vec<(&'static str, String)> {
    let sync = entity.sync_info();
    vec![
        ("Sync", output::sync_badge(entity.sync_status(), false)),
        ("External ID", or_dash(sync.external_id.as_deref())),
        (
            "Last Synced",
            entity
                .last_synced_at()
                .map_or_else(|| "-".into(), |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
        ),
    ]
}

#[derive(Tabled)]
pub struct ProductRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "SKU")]
    sku: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Stock")]
    stock: String,
    #[tabled(rename = "Sync")]
    sync: String,
}

impl Render for Product {
    type Row = ProductRow;

    fn row(&self, color: bool) -> ProductRow {
        ProductRow {
            id: self.id.to_string(),
            name: self.name.clone(),
            sku: or_dash(self.sku.as_deref()),
            price: or_dash(self.price.as_deref()),
            stock: self.stock_quantity.map_or_else(|| "-".into(), |q| q.to_string()),
            sync: output::sync_badge(self.sync_status(), color),
        }
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("ID", self.id.to_string()),
            ("Name", self.name.clone()),
            ("SKU", or_dash(self.sku.as_deref())),
            ("Price", or_dash(self.price.as_deref())),
            (
                "Stock",
                self.stock_quantity.map_or_else(|| "-".into(), |q| q.to_string()),
            ),
            ("Description", or_dash(self.description.as_deref())),
            ("Images", self.images.len().to_string()),
        ];
        fields.extend(common_fields(self));
        fields
    }
}

#[derive(Tabled)]
pub struct BrandRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Slug")]
    slug: String,
    #[tabled(rename = "Sync")]
    sync: String,
}

impl Render for Brand {
    type Row = BrandRow;

    fn row(&self, color: bool) -> BrandRow {
        BrandRow {
            id: self.id.to_string(),
            name: self.name.clone(),
            slug: or_dash(self.slug.as_deref()),
            sync: output::sync_badge(self.sync_status(), color),
        }
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("ID", self.id.to_string()),
            ("Name", self.name.clone()),
            ("Slug", or_dash(self.slug.as_deref())),
            ("Description", or_dash(self.description.as_deref())),
            ("Logo", or_dash(self.logo.as_ref().map(|i| i.url.as_str()))),
        ];
        fields.extend(common_fields(self));
        fields
    }
}

#[derive(Tabled)]
pub struct CategoryRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Parent")]
    parent: String,
    #[tabled(rename = "Sync")]
    sync: String,
}

impl Render for Category {
    type Row = CategoryRow;

    fn row(&self, color: bool) -> CategoryRow {
        CategoryRow {
            id: self.id.to_string(),
            name: self.name.clone(),
            parent: or_dash(self.parent_id.as_ref().map(EntityId::as_str)),
            sync: output::sync_badge(self.sync_status(), color),
        }
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("ID", self.id.to_string()),
            ("Name", self.name.clone()),
            ("Slug", or_dash(self.slug.as_deref())),
            ("Description", or_dash(self.description.as_deref())),
        ];
        fields.extend(common_fields(self));
        fields
    }
}

#[derive(Tabled)]
pub struct SupplierRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Email")]
    email: String,
    #[tabled(rename = "City")]
    city: String,
    #[tabled(rename = "Sync")]
    sync: String,
}

impl Render for Supplier {
    type Row = SupplierRow;

    fn row(&self, color: bool) -> SupplierRow {
        SupplierRow {
            id: self.id.to_string(),
            name: self.name.clone(),
            email: or_dash(self.contact.email.as_deref()),
            city: or_dash(self.address.as_ref().and_then(|a| a.city.as_deref())),
            sync: output::sync_badge(self.sync_status(), color),
        }
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("ID", self.id.to_string()),
            ("Name", self.name.clone()),
            ("Contact", or_dash(self.contact.name.as_deref())),
            ("Email", or_dash(self.contact.email.as_deref())),
            ("Phone", or_dash(self.contact.phone.as_deref())),
            (
                "City",
                or_dash(self.address.as_ref().and_then(|a| a.city.as_deref())),
            ),
            ("Notes", or_dash(self.notes.as_deref())),
        ];
        fields.extend(common_fields(self));
        fields
    }
}

fn detail_text(fields: &[(&'static str, String)]) -> String {
    let width = fields.iter().map(|(k, _)| k.len()).max().unwrap_or(0) + 1;
    fields
        .iter()
        .map(|(k, v)| format!("{:<width$} {v}", format!("{k}:")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Detail view with referenced entities resolved to their names.
async fn detail_with_references<T: Render>(catalog: &Catalog, entity: &T) -> String {
    let mut fields = entity.fields();
    for target in entity.references() {
        let label = catalog
            .label_for(&target)
            .await
            .unwrap_or_else(|| "(unknown)".into());
        let heading = match target.kind {
            EntityKind::Product => "Product",
            EntityKind::Brand => "Brand",
            EntityKind::Category => "Category",
            EntityKind::Supplier => "Supplier",
        };
        fields.push((heading, format!("{label} ({})", target.id)));
    }
    detail_text(&fields)
}

fn print_entity<T: Render>(entity: &T, detail: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_single(global.output, entity, |_| detail.to_owned())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Payloads ────────────────────────────────────────────────────────

/// Inline `--json` or the contents of `--from-file`.
pub fn read_payload(args: &PayloadArgs) -> Result<serde_json::Value, CliError> {
    let raw = match (&args.json, &args.from_file) {
        (Some(json), _) => json.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => {
            return Err(CliError::Validation {
                field: "payload".into(),
                reason: "pass --json or --from-file".into(),
            });
        }
    };
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    if !value.is_object() {
        return Err(CliError::Validation {
            field: "payload".into(),
            reason: "expected a JSON object".into(),
        });
    }
    Ok(value)
}

fn decode<P: DeserializeOwned>(payload: serde_json::Value) -> Result<P, CliError> {
    serde_json::from_value(payload).map_err(|e| CliError::Validation {
        field: "payload".into(),
        reason: e.to_string(),
    })
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn list(catalog: &Catalog, args: ListArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut filters = ListFilters::new();
    if let Some(search) = args.search {
        filters = filters.search(search);
    }
    for (key, value) in args.filters {
        filters = filters.field(key, value);
    }

    with_store!(catalog, args.kind, |store| list_in(store, &filters, global).await)
}

async fn list_in<T: Render>(
    store: &EntityStore<T>,
    filters: &ListFilters,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let items: Vec<Arc<T>> = store.fetch_all(filters).await?;
    let color = output::should_color(global.color);
    let out = output::render_list(global.output, &items, |e| e.row(color))?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn get(
    catalog: &Catalog,
    kind: EntityKind,
    id: EntityId,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    with_store!(catalog, kind, |store| {
        let entity = store.get_by_id(&id).await?;
        if let Err(e) = catalog.preferences(kind).record_view(id.clone()) {
            warn!(error = %e, "could not record recently viewed entry");
        }
        let detail = detail_with_references(catalog, entity.as_ref()).await;
        print_entity(entity.as_ref(), &detail, global)
    })
}

pub async fn create(
    catalog: &Catalog,
    kind: EntityKind,
    payload: serde_json::Value,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    with_store!(catalog, kind, |store| create_in(store, payload, global).await)
}

async fn create_in<T: Render>(
    store: &EntityStore<T>,
    payload: serde_json::Value,
    global: &GlobalOpts,
) -> Result<(), CliError>
where
    T::Draft: DeserializeOwned,
{
    let draft: T::Draft = decode(payload)?;
    let created = store.create(&draft).await?;
    if !global.quiet {
        eprintln!("Created {} {}", T::KIND, created.id());
    }
    print_entity(created.as_ref(), &detail_text(&created.fields()), global)
}

pub async fn update(
    catalog: &Catalog,
    kind: EntityKind,
    id: EntityId,
    payload: serde_json::Value,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    with_store!(catalog, kind, |store| update_in(store, &id, payload, global).await)
}

async fn update_in<T: Render>(
    store: &EntityStore<T>,
    id: &EntityId,
    payload: serde_json::Value,
    global: &GlobalOpts,
) -> Result<(), CliError>
where
    T::Patch: DeserializeOwned,
{
    let patch: T::Patch = decode(payload)?;
    let updated = store.update(id, &patch).await?;
    print_entity(updated.as_ref(), &detail_text(&updated.fields()), global)
}

pub async fn delete(
    catalog: &Catalog,
    kind: EntityKind,
    id: EntityId,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    with_store!(catalog, kind, |store| store.delete(&id).await)?;
    if !global.quiet {
        eprintln!("Deleted {kind} {id}");
    }
    Ok(())
}

pub async fn sync(
    catalog: &Catalog,
    kind: EntityKind,
    id: EntityId,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    with_store!(catalog, kind, |store| {
        let synced = store.sync(&id).await?;
        print_entity(synced.as_ref(), &detail_text(&synced.fields()), global)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_labels_are_aligned() {
        let text = detail_text(&[("ID", "b1".into()), ("Name", "Acme".into())]);
        assert_eq!(text, "ID:   b1\nName: Acme");
    }

    #[test]
    fn payload_must_be_an_object() {
        let args = PayloadArgs {
            json: Some("[1, 2]".into()),
            from_file: None,
        };
        assert!(matches!(read_payload(&args), Err(CliError::Validation { .. })));
    }
}
