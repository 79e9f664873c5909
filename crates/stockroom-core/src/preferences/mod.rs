// ── Preferences store ──
//
// Persisted, per-kind UI state. Every mutation is written to storage
// before the call returns; `focused` is the one transient field.

mod sections;
mod storage;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::model::{EntityId, EntityKind};

pub use sections::{
    DEFAULT_PAGE_SIZE, Density, DetailPatch, DetailPrefs, FormPatch, FormPrefs, GlobalPatch,
    GlobalPrefs, PREFERENCES_VERSION, Preferences, RECENTLY_VIEWED_CAP, Section, Sort,
    SortDirection, TablePatch, TablePrefs,
};
pub use storage::{FileStorage, MemoryStorage, PreferenceStorage};

/// How long a focused row stays highlighted.
pub const FOCUS_CLEAR_DELAY: Duration = Duration::from_millis(1500);

/// Preferences for one entity kind. Clones share state.
#[derive(Clone)]
pub struct PreferencesStore {
    inner: Arc<PrefsInner>,
}

struct PrefsInner {
    kind: EntityKind,
    key: String,
    storage: Arc<dyn PreferenceStorage>,
    state: watch::Sender<Arc<Preferences>>,
    /// Bumped by every `focus`/`clear_focus`; a pending auto-clear only
    /// fires if the generation it captured is still current.
    focus_generation: AtomicU64,
}

impl PreferencesStore {
    /// Load the stored record for `kind`, or start from defaults when it
    /// is missing, unreadable, or written by another schema version.
    pub fn open(kind: EntityKind, storage: Arc<dyn PreferenceStorage>) -> Self {
        let key = kind.preferences_key();
        let prefs = load_record(&key, storage.as_ref());
        let (state, _) = watch::channel(Arc::new(prefs));

        Self {
            inner: Arc::new(PrefsInner {
                kind,
                key,
                storage,
                state,
                focus_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.inner.kind
    }

    /// Storage key, e.g. `brand-preferences`.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn snapshot(&self) -> Arc<Preferences> {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Preferences>> {
        self.inner.state.subscribe()
    }

    // ── Section updates ──────────────────────────────────────────────

    pub fn set_table(&self, patch: TablePatch) -> Result<Arc<Preferences>, CoreError> {
        if patch.page == Some(0) || patch.page_size == Some(0) {
            return Err(CoreError::Validation {
                message: "page and page size start at 1".into(),
                fields: [("table".to_owned(), "must be at least 1".to_owned())]
                    .into_iter()
                    .collect(),
            });
        }
        self.mutate(|p| patch.apply(&mut p.table))
    }

    pub fn set_detail(&self, patch: DetailPatch) -> Result<Arc<Preferences>, CoreError> {
        self.mutate(|p| patch.apply(&mut p.detail))
    }

    pub fn set_form(&self, patch: FormPatch) -> Result<Arc<Preferences>, CoreError> {
        self.mutate(|p| patch.apply(&mut p.form))
    }

    pub fn set_global(&self, patch: GlobalPatch) -> Result<Arc<Preferences>, CoreError> {
        self.mutate(|p| patch.apply(&mut p.global))
    }

    /// Put an entity at the head of the recently-viewed list.
    pub fn record_view(&self, id: EntityId) -> Result<Arc<Preferences>, CoreError> {
        self.mutate(|p| p.detail.push_recent(id))
    }

    pub fn reset_section(&self, section: Section) -> Result<Arc<Preferences>, CoreError> {
        debug!(kind = %self.inner.kind, %section, "resetting preferences section");
        self.mutate(|p| match section {
            Section::Table => p.table = TablePrefs::default(),
            Section::Detail => p.detail = DetailPrefs::default(),
            Section::Form => p.form = FormPrefs::default(),
            Section::Global => p.global = GlobalPrefs::default(),
        })
    }

    /// Back to defaults, and drop the stored record.
    pub fn reset_all(&self) -> Result<(), CoreError> {
        self.inner.focus_generation.fetch_add(1, Ordering::AcqRel);
        self.inner
            .state
            .send_replace(Arc::new(Preferences::default()));
        self.inner.storage.remove(&self.inner.key)?;
        debug!(kind = %self.inner.kind, "preferences reset");
        Ok(())
    }

    // ── Focus ────────────────────────────────────────────────────────

    /// Highlight a row. Cleared automatically after
    /// [`FOCUS_CLEAR_DELAY`] unless focus moves again first.
    ///
    /// Must be called inside a tokio runtime.
    pub fn focus(&self, id: EntityId) {
        let generation = self.inner.focus_generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.state.send_modify(|current| {
            let mut next = (**current).clone();
            next.table.focused = Some(id);
            *current = Arc::new(next);
        });

        let weak: Weak<PrefsInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(FOCUS_CLEAR_DELAY).await;
            if let Some(inner) = weak.upgrade() {
                if inner.focus_generation.load(Ordering::Acquire) == generation {
                    inner.clear_focused();
                }
            }
        });
    }

    pub fn clear_focus(&self) {
        self.inner.focus_generation.fetch_add(1, Ordering::AcqRel);
        self.inner.clear_focused();
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Apply `f` to a copy of the record, publish it, and write it out.
    /// The in-memory state advances even if the write fails.
    fn mutate(&self, f: impl FnOnce(&mut Preferences)) -> Result<Arc<Preferences>, CoreError> {
        let mut written = Ok(());
        self.inner.state.send_modify(|current| {
            let mut next = (**current).clone();
            f(&mut next);
            written = self.inner.persist(&next);
            *current = Arc::new(next);
        });
        written?;
        Ok(self.snapshot())
    }
}

impl PrefsInner {
    fn persist(&self, prefs: &Preferences) -> Result<(), CoreError> {
        let json = serde_json::to_string(prefs).map_err(|e| CoreError::Preferences {
            message: format!("failed to encode preferences: {e}"),
        })?;
        self.storage.save(&self.key, &json).inspect_err(|e| {
            warn!(key = %self.key, error = %e, "failed to persist preferences");
        })
    }

    fn clear_focused(&self) {
        self.state.send_if_modified(|current| {
            if current.table.focused.is_none() {
                return false;
            }
            let mut next = (**current).clone();
            next.table.focused = None;
            *current = Arc::new(next);
            true
        });
    }
}

fn load_record(key: &str, storage: &dyn PreferenceStorage) -> Preferences {
    let raw = match storage.load(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Preferences::default(),
        Err(e) => {
            warn!(key, error = %e, "could not read preferences, using defaults");
            return Preferences::default();
        }
    };

    match serde_json::from_str::<Preferences>(&raw) {
        Ok(prefs) if prefs.version == PREFERENCES_VERSION => prefs,
        Ok(prefs) => {
            warn!(
                key,
                found = prefs.version,
                expected = PREFERENCES_VERSION,
                "preferences written by another schema version, using defaults"
            );
            Preferences::default()
        }
        Err(e) => {
            warn!(key, error = %e, "unparseable preferences, using defaults");
            Preferences::default()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn open(storage: &MemoryStorage) -> PreferencesStore {
        PreferencesStore::open(EntityKind::Brand, Arc::new(storage.clone()))
    }

    #[test]
    fn page_size_survives_reload() {
        let storage = MemoryStorage::new();
        open(&storage)
            .set_table(TablePatch {
                page_size: Some(25),
                ..TablePatch::default()
            })
            .unwrap();

        let reloaded = open(&storage);
        assert_eq!(reloaded.snapshot().table.page_size, 25);
        assert!(storage.get("brand-preferences").is_some());
    }

    #[test]
    fn version_mismatch_falls_back_to_defaults() {
        let storage = MemoryStorage::new();
        storage
            .save("brand-preferences", r#"{"version":0,"table":{"pageSize":50}}"#)
            .unwrap();
        assert_eq!(open(&storage).snapshot().table.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn garbage_record_falls_back_to_defaults() {
        let storage = MemoryStorage::new();
        storage.save("brand-preferences", "not json").unwrap();
        assert_eq!(*open(&storage).snapshot(), Preferences::default());
    }

    #[test]
    fn zero_page_size_rejected() {
        let prefs = open(&MemoryStorage::new());
        let err = prefs
            .set_table(TablePatch {
                page_size: Some(0),
                ..TablePatch::default()
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[test]
    fn reset_section_only_touches_that_section() {
        let prefs = open(&MemoryStorage::new());
        prefs
            .set_global(GlobalPatch {
                density: Some(Density::Compact),
                ..GlobalPatch::default()
            })
            .unwrap();
        prefs
            .set_detail(DetailPatch {
                active_tab: Some("images".into()),
                ..DetailPatch::default()
            })
            .unwrap();

        let after = prefs.reset_section(Section::Detail).unwrap();
        assert_eq!(after.detail.active_tab, "general");
        assert_eq!(after.global.density, Density::Compact);
    }

    #[test]
    fn reset_all_removes_stored_record() {
        let storage = MemoryStorage::new();
        let prefs = open(&storage);
        prefs.record_view("b1".into()).unwrap();
        assert!(storage.get("brand-preferences").is_some());

        prefs.reset_all().unwrap();
        assert!(storage.get("brand-preferences").is_none());
        assert!(prefs.snapshot().detail.recently_viewed.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn focus_clears_after_delay() {
        let prefs = open(&MemoryStorage::new());
        prefs.focus("b1".into());
        assert_eq!(prefs.snapshot().table.focused.as_ref().unwrap().as_str(), "b1");

        tokio::time::sleep(FOCUS_CLEAR_DELAY + Duration::from_millis(10)).await;
        assert!(prefs.snapshot().table.focused.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_focus_supersedes_pending_clear() {
        let prefs = open(&MemoryStorage::new());
        prefs.focus("b1".into());
        tokio::time::sleep(Duration::from_millis(1000)).await;
        prefs.focus("b2".into());

        // First timer fires here; it must not clear the newer focus.
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(prefs.snapshot().table.focused.as_ref().unwrap().as_str(), "b2");

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(prefs.snapshot().table.focused.is_none());
    }

    #[test]
    fn focus_is_not_persisted() {
        let storage = MemoryStorage::new();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let prefs = open(&storage);
            prefs.focus("b1".into());
            prefs.record_view("b1".into()).unwrap();
        });
        let stored = storage.get("brand-preferences").unwrap();
        assert!(!stored.contains("focused"));
    }
}
