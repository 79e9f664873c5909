//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` variants into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use stockroom_config::ConfigError;
use stockroom_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the catalog backend")]
    #[diagnostic(
        code(stockroom::connection_failed),
        help(
            "{reason}\n\
             Check that the backend is running and the profile URL is right.\n\
             Try: stockroom config show"
        )
    )]
    ConnectionFailed { reason: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{kind} '{id}' not found")]
    #[diagnostic(
        code(stockroom::not_found),
        help("Run: stockroom list {kind} to see what exists")
    )]
    NotFound { kind: String, id: String },

    #[error("{message}")]
    #[diagnostic(
        code(stockroom::conflict),
        help("Still referenced by {linked}.\nRemove or reassign those first.")
    )]
    Conflict { message: String, linked: String },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error ({status}): {message}")]
    #[diagnostic(code(stockroom::api_error))]
    ApiError { status: String, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(stockroom::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(stockroom::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: stockroom config init --api-url <URL>"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No backend configured")]
    #[diagnostic(
        code(stockroom::no_config),
        help(
            "Create a profile with: stockroom config init --api-url <URL>\n\
             Or pass --api-url / set STOCKROOM_API_URL.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(stockroom::config))]
    Config(#[from] ConfigError),

    #[error("Preferences could not be saved: {message}")]
    #[diagnostic(code(stockroom::preferences))]
    Preferences { message: String },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(stockroom::json), help("Check the payload and try again."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::Json(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Network { reason } => CliError::ConnectionFailed { reason },

            CoreError::NotFound { kind, id } => CliError::NotFound { kind, id },

            CoreError::Conflict { message, linked } => CliError::Conflict {
                message,
                linked: if linked.is_empty() {
                    "other records".into()
                } else {
                    linked.to_string()
                },
            },

            CoreError::Validation { message, fields } => {
                if fields.is_empty() {
                    CliError::Validation {
                        field: "input".into(),
                        reason: message,
                    }
                } else {
                    let detail: Vec<String> =
                        fields.iter().map(|(f, why)| format!("{f} {why}")).collect();
                    CliError::Validation {
                        field: fields.keys().cloned().collect::<Vec<_>>().join(", "),
                        reason: format!("{message} ({})", detail.join("; ")),
                    }
                }
            }

            CoreError::Api { message, status } => CliError::ApiError {
                status: status.map_or_else(|| "-".into(), |s| s.to_string()),
                message,
            },

            CoreError::Preferences { message } => CliError::Preferences { message },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            other @ (CoreError::StoreClosed { .. } | CoreError::Internal(_)) => {
                CliError::ApiError {
                    status: "internal".into(),
                    message: other.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_core::LinkedEntities;

    #[test]
    fn conflict_maps_to_exit_six() {
        let err = CliError::from(CoreError::Conflict {
            message: "brand is in use".into(),
            linked: LinkedEntities::default(),
        });
        assert_eq!(err.exit_code(), exit_code::CONFLICT);
    }

    #[test]
    fn not_found_and_network_codes() {
        let nf = CliError::from(CoreError::NotFound {
            kind: "brand".into(),
            id: "b9".into(),
        });
        assert_eq!(nf.exit_code(), exit_code::NOT_FOUND);

        let net = CliError::from(CoreError::Network {
            reason: "connection refused".into(),
        });
        assert_eq!(net.exit_code(), exit_code::CONNECTION);
    }

    #[test]
    fn field_errors_are_listed() {
        let err = CliError::from(CoreError::Validation {
            message: "invalid payload".into(),
            fields: [("name".to_owned(), "is required".to_owned())]
                .into_iter()
                .collect(),
        });
        assert_eq!(err.exit_code(), exit_code::USAGE);
        assert!(err.to_string().contains("name is required"));
    }
}
