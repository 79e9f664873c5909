//! Command dispatch: bridges CLI args -> catalog stores -> output formatting.

pub mod config_cmd;
pub mod entities;
pub mod prefs;
pub mod watch;

use stockroom_core::Catalog;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Bind `$store` to the catalog's store for `$kind` and evaluate `$body`
/// once per concrete entity type.
macro_rules! with_store {
    ($catalog:expr, $kind:expr, |$store:ident| $body:expr) => {
        match $kind {
            ::stockroom_core::EntityKind::Product => {
                let $store = $catalog.products();
                $body
            }
            ::stockroom_core::EntityKind::Brand => {
                let $store = $catalog.brands();
                $body
            }
            ::stockroom_core::EntityKind::Category => {
                let $store = $catalog.categories();
                $body
            }
            ::stockroom_core::EntityKind::Supplier => {
                let $store = $catalog.suppliers();
                $body
            }
        }
    };
}
pub(crate) use with_store;

/// Dispatch a backend-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, catalog: &Catalog, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::List(args) => entities::list(catalog, args, global).await,
        Command::Get { kind, id } => entities::get(catalog, kind, id.into(), global).await,
        Command::Create { kind, payload } => {
            let payload = entities::read_payload(&payload)?;
            entities::create(catalog, kind, payload, global).await
        }
        Command::Update { kind, id, payload } => {
            let payload = entities::read_payload(&payload)?;
            entities::update(catalog, kind, id.into(), payload, global).await
        }
        Command::Delete { kind, id } => entities::delete(catalog, kind, id.into(), global).await,
        Command::Sync { kind, id } => entities::sync(catalog, kind, id.into(), global).await,
        Command::Watch { kind } => watch::handle(catalog, kind, global).await,
        Command::Prefs(args) => prefs::handle(catalog, args, global),
        // Config is handled before a catalog exists
        Command::Config(_) => unreachable!("config commands are dispatched in main"),
    }
}
