//! Preferences subcommand handlers.

use stockroom_core::{Catalog, EntityId, PreferencesLocation};
use stockroom_core::preferences::{Preferences, TablePatch};

use crate::cli::{GlobalOpts, PrefsArgs, PrefsCommand};
use crate::error::CliError;
use crate::output;

fn summary(p: &Preferences) -> String {
    let sort = p
        .table
        .sort
        .as_ref()
        .map_or_else(|| "-".into(), |s| format!("{} {:?}", s.field, s.direction));
    let recent: Vec<&str> = p.detail.recently_viewed.iter().map(EntityId::as_str).collect();
    [
        format!("Page:            {}", p.table.page),
        format!("Page size:       {}", p.table.page_size),
        format!("Sort:            {sort}"),
        format!("Search:          {}", if p.table.search.is_empty() { "-" } else { p.table.search.as_str() }),
        format!("Active tab:      {}", p.detail.active_tab),
        format!("Recently viewed: {}", if recent.is_empty() { "-".into() } else { recent.join(", ") }),
        format!("Density:         {}", p.global.density),
        format!("Sync badges:     {}", p.global.show_sync_badges),
    ]
    .join("\n")
}

/// Changes only make sense when they outlive the process.
fn ensure_persistent(catalog: &Catalog) -> Result<(), CliError> {
    match catalog.config().preferences {
        PreferencesLocation::Directory(_) => Ok(()),
        PreferencesLocation::Memory => Err(CliError::Validation {
            field: "preferences".into(),
            reason: "no preferences directory available; set preferences_dir in the profile"
                .into(),
        }),
    }
}

pub fn handle(catalog: &Catalog, args: PrefsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if !matches!(args.command, PrefsCommand::Show { .. }) {
        ensure_persistent(catalog)?;
    }
    match args.command {
        PrefsCommand::Show { kind } => {
            let prefs = catalog.preferences(kind).snapshot();
            let out = output::render_single(global.output, prefs.as_ref(), summary)?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        PrefsCommand::Reset { kind, section } => {
            let store = catalog.preferences(kind);
            match section {
                Some(section) => {
                    store.reset_section(section)?;
                    if !global.quiet {
                        eprintln!("Reset {section} preferences for {kind}");
                    }
                }
                None => {
                    store.reset_all()?;
                    if !global.quiet {
                        eprintln!("Reset all preferences for {kind}");
                    }
                }
            }
            Ok(())
        }

        PrefsCommand::PageSize { kind, size } => {
            let prefs = catalog.preferences(kind).set_table(TablePatch {
                page_size: Some(size),
                // A new page size invalidates the current page.
                page: Some(1),
                ..TablePatch::default()
            })?;
            if !global.quiet {
                eprintln!("Page size for {kind} set to {}", prefs.table.page_size);
            }
            Ok(())
        }
    }
}
