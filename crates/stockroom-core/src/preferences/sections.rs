// ── Preference record ──
//
// One record per entity kind, split into independently resettable
// sections. Stored as camelCase JSON with an explicit schema version.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString};

use crate::model::EntityId;

/// Schema version written into every stored record. Records carrying any
/// other version are discarded on load.
pub const PREFERENCES_VERSION: u32 = 1;

/// Upper bound on `detail.recently_viewed`.
pub const RECENTLY_VIEWED_CAP: usize = 10;

pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub version: u32,
    #[serde(default)]
    pub table: TablePrefs,
    #[serde(default)]
    pub detail: DetailPrefs,
    #[serde(default)]
    pub form: FormPrefs,
    #[serde(default)]
    pub global: GlobalPrefs,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            version: PREFERENCES_VERSION,
            table: TablePrefs::default(),
            detail: DetailPrefs::default(),
            form: FormPrefs::default(),
            global: GlobalPrefs::default(),
        }
    }
}

/// Named section, for targeted resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, EnumIter, strum::Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Section {
    Table,
    Detail,
    Form,
    Global,
}

// ── Table ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TablePrefs {
    pub page: u32,
    pub page_size: u32,
    pub sort: Option<Sort>,
    pub filters: BTreeMap<String, String>,
    pub search: String,
    pub selected: BTreeSet<EntityId>,
    /// Row highlighted after navigation. Never persisted.
    #[serde(skip)]
    pub focused: Option<EntityId>,
}

impl Default for TablePrefs {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort: None,
            filters: BTreeMap::new(),
            search: String::new(),
            selected: BTreeSet::new(),
            focused: None,
        }
    }
}

/// Shallow update for [`TablePrefs`]. `sort: Some(None)` clears the sort.
#[derive(Debug, Clone, Default)]
pub struct TablePatch {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub sort: Option<Option<Sort>>,
    pub filters: Option<BTreeMap<String, String>>,
    pub search: Option<String>,
    pub selected: Option<BTreeSet<EntityId>>,
}

impl TablePatch {
    pub(crate) fn apply(self, table: &mut TablePrefs) {
        if let Some(page) = self.page {
            table.page = page;
        }
        if let Some(page_size) = self.page_size {
            table.page_size = page_size;
        }
        if let Some(sort) = self.sort {
            table.sort = sort;
        }
        if let Some(filters) = self.filters {
            table.filters = filters;
        }
        if let Some(search) = self.search {
            table.search = search;
        }
        if let Some(selected) = self.selected {
            table.selected = selected;
        }
    }
}

// ── Detail ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetailPrefs {
    pub active_tab: String,
    pub scroll_offset: u32,
    pub expanded_sections: BTreeSet<String>,
    /// Most recent first, no duplicates.
    pub recently_viewed: Vec<EntityId>,
}

impl Default for DetailPrefs {
    fn default() -> Self {
        Self {
            active_tab: "general".into(),
            scroll_offset: 0,
            expanded_sections: BTreeSet::new(),
            recently_viewed: Vec::new(),
        }
    }
}

impl DetailPrefs {
    pub(crate) fn push_recent(&mut self, id: EntityId) {
        self.recently_viewed.retain(|seen| *seen != id);
        self.recently_viewed.insert(0, id);
        self.recently_viewed.truncate(RECENTLY_VIEWED_CAP);
    }
}

#[derive(Debug, Clone, Default)]
pub struct DetailPatch {
    pub active_tab: Option<String>,
    pub scroll_offset: Option<u32>,
    pub expanded_sections: Option<BTreeSet<String>>,
}

impl DetailPatch {
    pub(crate) fn apply(self, detail: &mut DetailPrefs) {
        if let Some(tab) = self.active_tab {
            detail.active_tab = tab;
        }
        if let Some(offset) = self.scroll_offset {
            detail.scroll_offset = offset;
        }
        if let Some(sections) = self.expanded_sections {
            detail.expanded_sections = sections;
        }
    }
}

// ── Form ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormPrefs {
    /// Last values entered in the create/edit form.
    pub draft: Option<serde_json::Value>,
    pub wizard_step: u32,
}

/// `draft: Some(None)` discards the saved draft.
#[derive(Debug, Clone, Default)]
pub struct FormPatch {
    pub draft: Option<Option<serde_json::Value>>,
    pub wizard_step: Option<u32>,
}

impl FormPatch {
    pub(crate) fn apply(self, form: &mut FormPrefs) {
        if let Some(draft) = self.draft {
            form.draft = draft;
        }
        if let Some(step) = self.wizard_step {
            form.wizard_step = step;
        }
    }
}

// ── Global ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Density {
    Compact,
    #[default]
    Comfortable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalPrefs {
    pub density: Density,
    pub show_sync_badges: bool,
}

impl Default for GlobalPrefs {
    fn default() -> Self {
        Self {
            density: Density::default(),
            show_sync_badges: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GlobalPatch {
    pub density: Option<Density>,
    pub show_sync_badges: Option<bool>,
}

impl GlobalPatch {
    pub(crate) fn apply(self, global: &mut GlobalPrefs) {
        if let Some(density) = self.density {
            global.density = density;
        }
        if let Some(show) = self.show_sync_badges {
            global.show_sync_badges = show;
        }
    }
}
