// ── Catalog application context ──
//
// Owns the HTTP client, one store per kind, the optional sync bridge,
// and the preferences factory. Pass it around instead of reaching for
// globals.

use std::sync::Arc;

use dashmap::DashMap;
use stockroom_api::transport::{TlsMode, TransportConfig};
use stockroom_api::websocket::ReconnectConfig;
use stockroom_api::CatalogClient;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bridge::{BridgeOptions, ChannelState, SyncBridge};
use crate::config::{CatalogConfig, PreferencesLocation, TlsVerification};
use crate::error::CoreError;
use crate::model::{
    Brand, CatalogEntity, Category, EntityId, EntityKind, EntityRef, ListFilters, Product,
    Supplier,
};
use crate::preferences::{FileStorage, MemoryStorage, PreferenceStorage, PreferencesStore};
use crate::store::EntityStore;

/// The main entry point for consumers.
///
/// Cheaply cloneable; clones share stores, bridge, and preferences.
#[derive(Clone)]
pub struct Catalog {
    inner: Arc<CatalogInner>,
}

struct CatalogInner {
    config: CatalogConfig,
    transport: TransportConfig,
    products: EntityStore<Product>,
    brands: EntityStore<Brand>,
    categories: EntityStore<Category>,
    suppliers: EntityStore<Supplier>,
    preference_storage: Arc<dyn PreferenceStorage>,
    preferences: DashMap<EntityKind, PreferencesStore>,
    bridge: Mutex<Option<SyncBridge>>,
}

impl Catalog {
    /// Build the client and empty stores. Nothing is fetched and no
    /// socket is opened until asked.
    pub fn new(config: CatalogConfig) -> Result<Self, CoreError> {
        let transport = build_transport(&config);
        let client = CatalogClient::new(config.api_url.as_str(), &transport)?;

        let preference_storage: Arc<dyn PreferenceStorage> = match &config.preferences {
            PreferencesLocation::Directory(dir) => Arc::new(FileStorage::new(dir.clone())),
            PreferencesLocation::Memory => Arc::new(MemoryStorage::new()),
        };

        debug!(api_url = %config.api_url, "catalog created");

        Ok(Self {
            inner: Arc::new(CatalogInner {
                products: EntityStore::new(client.clone()),
                brands: EntityStore::new(client.clone()),
                categories: EntityStore::new(client.clone()),
                suppliers: EntityStore::new(client),
                config,
                transport,
                preference_storage,
                preferences: DashMap::new(),
                bridge: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.inner.config
    }

    // ── Stores ───────────────────────────────────────────────────────

    pub fn products(&self) -> &EntityStore<Product> {
        &self.inner.products
    }

    pub fn brands(&self) -> &EntityStore<Brand> {
        &self.inner.brands
    }

    pub fn categories(&self) -> &EntityStore<Category> {
        &self.inner.categories
    }

    pub fn suppliers(&self) -> &EntityStore<Supplier> {
        &self.inner.suppliers
    }

    /// Full unfiltered fetch of every kind, in parallel.
    pub async fn refresh_all(&self) -> Result<(), CoreError> {
        let all = ListFilters::new();
        let (products, brands, categories, suppliers) = tokio::join!(
            self.inner.products.fetch_all(&all),
            self.inner.brands.fetch_all(&all),
            self.inner.categories.fetch_all(&all),
            self.inner.suppliers.fetch_all(&all),
        );
        products?;
        brands?;
        categories?;
        suppliers?;
        Ok(())
    }

    // ── Preferences ──────────────────────────────────────────────────

    /// Preferences for `kind`, opened on first use and shared afterwards.
    pub fn preferences(&self, kind: EntityKind) -> PreferencesStore {
        self.inner
            .preferences
            .entry(kind)
            .or_insert_with(|| {
                PreferencesStore::open(kind, Arc::clone(&self.inner.preference_storage))
            })
            .clone()
    }

    // ── Sync ─────────────────────────────────────────────────────────

    /// Open the push connection and attach every store. Calling it again
    /// while the bridge runs is a no-op.
    pub async fn start_sync(&self) -> Result<SyncBridge, CoreError> {
        let mut slot = self.inner.bridge.lock().await;
        if let Some(bridge) = slot.as_ref() {
            return Ok(bridge.clone());
        }

        let ws_url = self.inner.config.websocket_url()?;
        let bridge = SyncBridge::start(
            ws_url.clone(),
            BridgeOptions {
                reconnect: ReconnectConfig::default(),
                authorization: self.inner.transport.authorization(),
                reconcile_interval: self.inner.config.reconcile_interval,
            },
        );
        bridge.attach(&self.inner.products);
        bridge.attach(&self.inner.brands);
        bridge.attach(&self.inner.categories);
        bridge.attach(&self.inner.suppliers);

        info!(%ws_url, "sync bridge started");
        *slot = Some(bridge.clone());
        Ok(bridge)
    }

    /// State of `kind`'s push channel. `Disconnected` when sync is off.
    pub async fn channel_state(&self, kind: EntityKind) -> ChannelState {
        self.inner
            .bridge
            .lock()
            .await
            .as_ref()
            .map_or(ChannelState::Disconnected, |b| b.channel_state(kind))
    }

    // ── Relationship display ─────────────────────────────────────────

    /// Display name of a referenced entity: cache first, then the
    /// server. `None` if it cannot be resolved.
    pub async fn label_for(&self, target: &EntityRef) -> Option<String> {
        match target.kind {
            EntityKind::Product => label_in(&self.inner.products, &target.id).await,
            EntityKind::Brand => label_in(&self.inner.brands, &target.id).await,
            EntityKind::Category => label_in(&self.inner.categories, &target.id).await,
            EntityKind::Supplier => label_in(&self.inner.suppliers, &target.id).await,
        }
    }

    // ── Teardown ─────────────────────────────────────────────────────

    /// Close every store and stop the bridge. Late responses and pushes
    /// are ignored afterwards.
    pub async fn shutdown(&self) {
        if let Some(bridge) = self.inner.bridge.lock().await.take() {
            for kind in bridge.attached() {
                bridge.detach(kind);
            }
            bridge.shutdown();
        }

        self.inner.products.close();
        self.inner.brands.close();
        self.inner.categories.close();
        self.inner.suppliers.close();
        debug!("catalog shut down");
    }
}

async fn label_in<T: CatalogEntity>(store: &EntityStore<T>, id: &EntityId) -> Option<String> {
    store
        .get_by_id(id)
        .await
        .ok()
        .map(|entity| entity.label().to_owned())
}

fn build_transport(config: &CatalogConfig) -> TransportConfig {
    TransportConfig {
        tls: match &config.tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        },
        timeout: config.timeout,
        api_token: config.api_token.clone(),
    }
}
