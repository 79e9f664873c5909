//! `watch`: load a kind, open the push bridge, and print cache changes
//! until Ctrl-C.

use std::collections::HashMap;
use std::sync::Arc;

use owo_colors::OwoColorize;
use serde_json::json;

use stockroom_core::{Catalog, ChannelState, EntityId, EntityKind, EntityStore, ListFilters};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::entities::Render;
use super::with_store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Added,
    Updated,
    Removed,
}

impl Change {
    fn as_str(self) -> &'static str {
        match self {
            Self::Added => "created",
            Self::Updated => "updated",
            Self::Removed => "deleted",
        }
    }
}

/// Differences between two snapshots, in id order.
fn diff<T: Render>(
    before: &HashMap<EntityId, Arc<T>>,
    after: &HashMap<EntityId, Arc<T>>,
) -> Vec<(Change, Arc<T>)> {
    let mut changes: Vec<(Change, Arc<T>)> = after
        .iter()
        .filter_map(|(id, now)| match before.get(id) {
            None => Some((Change::Added, Arc::clone(now))),
            Some(was) if !Arc::ptr_eq(was, now) && was != now => {
                Some((Change::Updated, Arc::clone(now)))
            }
            Some(_) => None,
        })
        .collect();
    changes.extend(
        before
            .iter()
            .filter(|(id, _)| !after.contains_key(*id))
            .map(|(_, was)| (Change::Removed, Arc::clone(was))),
    );
    changes.sort_by(|a, b| a.1.id().cmp(b.1.id()));
    changes
}

fn index<T: Render>(snapshot: &[Arc<T>]) -> HashMap<EntityId, Arc<T>> {
    snapshot
        .iter()
        .map(|e| (e.id().clone(), Arc::clone(e)))
        .collect()
}

fn print_change<T: Render>(change: Change, entity: &T, global: &GlobalOpts, color: bool) {
    let line = match global.output {
        OutputFormat::Table => {
            let marker = match change {
                Change::Added => "+",
                Change::Updated => "~",
                Change::Removed => "-",
            };
            let text = format!("{marker} {} {}", entity.id(), entity.label());
            if color {
                match change {
                    Change::Added => text.green().to_string(),
                    Change::Updated => text.yellow().to_string(),
                    Change::Removed => text.red().to_string(),
                }
            } else {
                text
            }
        }
        OutputFormat::Json | OutputFormat::JsonCompact => json!({
            "action": change.as_str(),
            "id": entity.id(),
            "entity": entity,
        })
        .to_string(),
    };
    output::print_output(&line, global.quiet);
}

pub async fn handle(catalog: &Catalog, kind: EntityKind, global: &GlobalOpts) -> Result<(), CliError> {
    with_store!(catalog, kind, |store| watch_store(catalog, store, global).await)
}

async fn watch_store<T: Render>(
    catalog: &Catalog,
    store: &EntityStore<T>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let kind = T::KIND;
    store.fetch_all(&ListFilters::new()).await?;
    let bridge = catalog.start_sync().await?;

    let color = output::should_color(global.color);
    let mut entities = store.subscribe();
    let mut states = bridge.subscribe_states();
    let mut known = index(entities.current());

    if !global.quiet {
        eprintln!("Watching {} {kind} entities (Ctrl-C to stop)", known.len());
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,

            snapshot = entities.changed() => {
                let Some(snapshot) = snapshot else { break };
                let next = index(&snapshot);
                for (change, entity) in diff(&known, &next) {
                    print_change(change, entity.as_ref(), global, color);
                }
                known = next;
            }

            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().get(&kind).copied().unwrap_or_default();
                if !global.quiet {
                    let text = format!("{kind} channel: {state}");
                    if color && state == ChannelState::Subscribed {
                        eprintln!("{}", text.dimmed());
                    } else {
                        eprintln!("{text}");
                    }
                }
            }
        }
    }

    if !global.quiet {
        eprintln!("Stopped watching {kind}");
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use stockroom_core::Brand;

    fn brand(id: &str, name: &str) -> Arc<Brand> {
        Arc::new(serde_json::from_value(json!({ "id": id, "name": name })).unwrap())
    }

    #[test]
    fn diff_reports_each_kind_of_change() {
        let kept = brand("b1", "Acme");
        let before = index(&[Arc::clone(&kept), brand("b2", "Bolt"), brand("b3", "Crate")]);
        let after = index(&[kept, brand("b2", "Bolt Co"), brand("b4", "Dyno")]);

        let changes: Vec<(Change, String)> = diff(&before, &after)
            .into_iter()
            .map(|(c, b)| (c, b.id.to_string()))
            .collect();
        assert_eq!(
            changes,
            vec![
                (Change::Updated, "b2".to_owned()),
                (Change::Removed, "b3".to_owned()),
                (Change::Added, "b4".to_owned()),
            ]
        );
    }

    #[test]
    fn equal_replacement_is_not_an_update() {
        let before = index(&[brand("b1", "Acme")]);
        let after = index(&[brand("b1", "Acme")]);
        assert!(diff(&before, &after).is_empty());
    }
}
