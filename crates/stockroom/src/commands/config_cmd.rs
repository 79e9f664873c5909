//! Config subcommand handlers.

use stockroom_config::{Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

/// Copy of `cfg` safe to print.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for profile in cfg.profiles.values_mut() {
        if profile.api_token.is_some() {
            profile.api_token = Some(REDACTED.into());
        }
    }
    cfg
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init {
            token_env,
            preferences_dir,
            reconcile_interval,
            set_default,
        } => {
            let Some(api_url) = global.api_url.clone() else {
                return Err(CliError::Validation {
                    field: "api-url".into(),
                    reason: "config init needs --api-url <URL>".into(),
                });
            };
            url::Url::parse(&api_url).map_err(|e| CliError::Validation {
                field: "api-url".into(),
                reason: format!("invalid URL {api_url:?}: {e}"),
            })?;

            let name = global.profile.clone().unwrap_or_else(|| "default".into());
            let mut cfg = config::load_config_or_default();
            let profile = Profile {
                api_token_env: token_env,
                preferences_dir,
                reconcile_interval_secs: reconcile_interval,
                timeout: global.timeout,
                insecure: global.insecure.then_some(true),
                ..Profile::new(api_url)
            };
            cfg.profiles.insert(name.clone(), profile);
            if set_default || cfg.profiles.len() == 1 {
                cfg.default_profile = Some(name.clone());
            }

            let path = config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("Profile '{name}' saved to {}", path.display());
            }
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = redacted(&config::load_config_or_default());
            let out = match global.output {
                OutputFormat::Table => toml::to_string_pretty(&cfg).map_err(|e| {
                    CliError::Validation {
                        field: "config".into(),
                        reason: format!("failed to serialize config: {e}"),
                    }
                })?,
                format => output::render_single(format, &cfg, |_| String::new())?,
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }
    }
}
