// ── Runtime catalog configuration ──
//
// Describes how to reach the backend and where preferences live.
// Built by the CLI from a config profile; core never reads config files.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::CoreError;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store.
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed dev servers).
    DangerAcceptInvalid,
}

/// Where preference records are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PreferencesLocation {
    /// One JSON file per entity kind in this directory.
    Directory(PathBuf),
    /// Process memory only.
    #[default]
    Memory,
}

/// Everything needed to build a [`Catalog`](crate::Catalog).
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Backend base URL. The REST API lives under `{api_url}/api/`.
    pub api_url: Url,
    /// Push endpoint. Derived from `api_url` when `None`.
    pub ws_url: Option<Url>,
    pub api_token: Option<SecretString>,
    pub tls: TlsVerification,
    pub timeout: Duration,
    pub preferences: PreferencesLocation,
    /// Periodic full refetch while the bridge runs. Off when `None`.
    pub reconcile_interval: Option<Duration>,
}

impl CatalogConfig {
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            ws_url: None,
            api_token: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            preferences: PreferencesLocation::default(),
            reconcile_interval: None,
        }
    }

    /// The configured push endpoint, or one derived from `api_url`.
    pub fn websocket_url(&self) -> Result<Url, CoreError> {
        match &self.ws_url {
            Some(url) => Ok(url.clone()),
            None => derive_ws_url(&self.api_url),
        }
    }
}

/// `http(s)://host[:port]/...` → `ws(s)://host[:port]/ws`.
pub fn derive_ws_url(api_url: &Url) -> Result<Url, CoreError> {
    let scheme = match api_url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(CoreError::Config {
                message: format!("cannot derive a WebSocket URL from scheme {other:?}"),
            });
        }
    };

    let mut url = api_url.clone();
    url.set_scheme(scheme).map_err(|()| CoreError::Config {
        message: format!("cannot switch {api_url} to {scheme}"),
    })?;
    url.set_path("/ws");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_follows_api_scheme() {
        let http = Url::parse("http://localhost:3000/").unwrap();
        let https = Url::parse("https://shop.example/admin?x=1").unwrap();

        assert_eq!(derive_ws_url(&http).unwrap().as_str(), "ws://localhost:3000/ws");
        assert_eq!(derive_ws_url(&https).unwrap().as_str(), "wss://shop.example/ws");
    }

    #[test]
    fn explicit_ws_url_wins() {
        let mut config = CatalogConfig::new(Url::parse("https://shop.example").unwrap());
        config.ws_url = Some(Url::parse("wss://push.shop.example/socket").unwrap());
        assert_eq!(
            config.websocket_url().unwrap().as_str(),
            "wss://push.shop.example/socket"
        );
    }

    #[test]
    fn unsupported_scheme_is_config_error() {
        let ftp = Url::parse("ftp://files.example").unwrap();
        assert!(matches!(derive_ws_url(&ftp), Err(CoreError::Config { .. })));
    }
}
