//! Profile resolution with CLI flag overrides on top of `stockroom-config`.

use stockroom_config::{Config, Profile};
use stockroom_core::CatalogConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use stockroom_config::{config_path, load_config_or_default, save_config};

/// Profile name in effect: `--profile`, then the config's default.
pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `CatalogConfig` from the config file, profile, and CLI overrides.
///
/// Without a matching profile, `--api-url` alone is enough; preferences
/// then go to the profile's default data directory.
pub fn build_catalog_config(global: &GlobalOpts) -> Result<CatalogConfig, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    if let Some(profile) = cfg.profiles.get(&profile_name) {
        let profile = apply_overrides(profile.clone(), global);
        return Ok(stockroom_config::profile_to_catalog_config(
            &profile,
            &profile_name,
            &cfg.defaults,
        )?);
    }

    if global.profile.is_some() {
        let mut available: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
        available.sort_unstable();
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: if available.is_empty() {
                "(none)".into()
            } else {
                available.join(", ")
            },
        });
    }

    let Some(url) = global.api_url.clone() else {
        return Err(CliError::NoConfig {
            path: config_path().display().to_string(),
        });
    };

    let profile = apply_overrides(Profile::new(url), global);
    Ok(stockroom_config::profile_to_catalog_config(
        &profile,
        &profile_name,
        &cfg.defaults,
    )?)
}

fn apply_overrides(mut profile: Profile, global: &GlobalOpts) -> Profile {
    if let Some(ref url) = global.api_url {
        profile.api_url.clone_from(url);
    }
    if let Some(ref token) = global.api_token {
        profile.api_token = Some(token.clone());
        profile.api_token_env = None;
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
    profile
}
