//! Clap derive structures for the `stockroom` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use stockroom_core::{EntityKind, Section};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// stockroom -- administer a product catalog from the command line
#[derive(Debug, Parser)]
#[command(
    name = "stockroom",
    version,
    about = "Manage a product catalog from the command line",
    long_about = "Browse and edit products, brands, categories, and suppliers,\n\
        push them to the external shop, and watch live changes.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Backend profile to use
    #[arg(long, short = 'p', env = "STOCKROOM_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Backend URL (overrides profile)
    #[arg(long, env = "STOCKROOM_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Bearer token (overrides profile)
    #[arg(long, env = "STOCKROOM_API_TOKEN", global = true, hide_env_values = true)]
    pub api_token: Option<String>,

    /// Output format
    #[arg(long, short = 'o', env = "STOCKROOM_OUTPUT", default_value = "table", global = true)]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "STOCKROOM_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List entities of a kind
    #[command(alias = "ls")]
    List(ListArgs),

    /// Show one entity
    Get {
        kind: EntityKind,
        id: String,
    },

    /// Create an entity from a JSON payload
    Create {
        kind: EntityKind,
        #[command(flatten)]
        payload: PayloadArgs,
    },

    /// Apply a partial JSON update to an entity
    Update {
        kind: EntityKind,
        id: String,
        #[command(flatten)]
        payload: PayloadArgs,
    },

    /// Delete an entity
    #[command(alias = "rm")]
    Delete {
        kind: EntityKind,
        id: String,
    },

    /// Push an entity to the external shop
    Sync {
        kind: EntityKind,
        id: String,
    },

    /// Stream live changes for a kind until interrupted
    Watch {
        kind: EntityKind,
    },

    /// Inspect or change stored UI preferences
    Prefs(PrefsArgs),

    /// Manage configuration profiles
    Config(ConfigArgs),
}

// ── Entity args ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ListArgs {
    pub kind: EntityKind,

    /// Free-text search
    #[arg(long, short = 's')]
    pub search: Option<String>,

    /// Field filter, repeatable (e.g. --filter brandId=b1)
    #[arg(long = "filter", short = 'f', value_parser = parse_key_val)]
    pub filters: Vec<(String, String)>,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct PayloadArgs {
    /// Inline JSON payload
    #[arg(long)]
    pub json: Option<String>,

    /// Read the JSON payload from a file
    #[arg(long, short = 'F')]
    pub from_file: Option<PathBuf>,
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_owned(), v.to_owned())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

// ── Prefs ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct PrefsArgs {
    #[command(subcommand)]
    pub command: PrefsCommand,
}

#[derive(Debug, Subcommand)]
pub enum PrefsCommand {
    /// Print the stored preferences for a kind
    Show { kind: EntityKind },

    /// Reset one section, or everything
    Reset {
        kind: EntityKind,
        /// table, detail, form, or global
        #[arg(long)]
        section: Option<Section>,
    },

    /// Set the table page size
    PageSize {
        kind: EntityKind,
        size: u32,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create or replace a profile from --api-url (named by --profile,
    /// default "default")
    Init {
        /// Environment variable that holds the bearer token
        #[arg(long)]
        token_env: Option<String>,

        /// Directory for preference files
        #[arg(long)]
        preferences_dir: Option<PathBuf>,

        /// Periodic full refetch while watching, in seconds
        #[arg(long)]
        reconcile_interval: Option<u64>,

        /// Make this the default profile
        #[arg(long)]
        set_default: bool,
    },

    /// Print the current configuration
    Show,

    /// Print the config file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn key_val_parsing() {
        assert_eq!(
            parse_key_val("brandId=b1"),
            Ok(("brandId".to_owned(), "b1".to_owned()))
        );
        assert_eq!(parse_key_val("sku="), Ok(("sku".to_owned(), String::new())));
        assert!(parse_key_val("=x").is_err());
        assert!(parse_key_val("novalue").is_err());
    }
}
