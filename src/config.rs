//! Runtime configuration.
//! Defaults target the production Tado endpoints; every URL can be pointed elsewhere.

use crate::cache::{CachePolicy, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
use crate::models::tado::TemperatureUnit;
use std::time::Duration;

pub const DEFAULT_AUTH_HOST: &str = "https://auth.tado.com";
pub const DEFAULT_API_HOST: &str = "https://my.tado.com";
pub const OAUTH_CLIENT_ID: &str = "tado-web-app";
pub const OAUTH_SCOPE: &str = "home.user";
pub const REFERER: &str = "https://my.tado.com/";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Endpoints and policies of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// OAuth token endpoint for password and refresh grants.
    pub token_url: String,
    /// Base that relative API paths are resolved against (trailing slash).
    pub api_url: String,
    /// v1 "who am I" endpoint hit once after login for the session cookie.
    pub legacy_me_url: String,
    pub client_id: String,
    pub scope: String,
    pub referer: String,
    pub timeout: Duration,
    pub cache: CachePolicy,
    pub temperature_unit: TemperatureUnit,
    /// Refresh and retry once when an authenticated GET or DELETE gets HTTP 401.
    /// POST and PUT still refresh nothing and return the 401 to the caller.
    pub refresh_on_unauthorized: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig::with_hosts(DEFAULT_AUTH_HOST, DEFAULT_API_HOST)
    }
}

impl ClientConfig {
    /// Config whose OAuth endpoint lives on `auth_host` and API on `api_host`
    /// (scheme and authority only, e.g. `https://my.tado.com`).
    pub fn with_hosts(auth_host: &str, api_host: &str) -> Self {
        let auth_host = auth_host.trim_end_matches('/');
        let api_host = api_host.trim_end_matches('/');
        ClientConfig {
            token_url: format!("{}/oauth/token", auth_host),
            api_url: format!("{}/api/v2/", api_host),
            legacy_me_url: format!("{}/api/v1/me", api_host),
            client_id: OAUTH_CLIENT_ID.to_string(),
            scope: OAUTH_SCOPE.to_string(),
            referer: REFERER.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            cache: CachePolicy::default(),
            temperature_unit: TemperatureUnit::default(),
            refresh_on_unauthorized: false,
        }
    }
}

/// Everything the binary needs, read from the process environment.
#[derive(Clone)]
pub struct Config {
    pub username: String,
    pub password: String,
    pub client_secret: String,
    pub client: ClientConfig,
}

impl core::fmt::Debug for Config {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Config")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("client_secret", &"<redacted>")
            .field("client", &self.client)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; `from_env` passes the process environment.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let required = |key: &str| match var(key) {
            Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
            _ => Err(format!("Missing {}: set it in the environment or a .env file", key)),
        };
        let non_empty = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let username = required("TADO_USERNAME")?;
        let password = required("TADO_PASSWORD")?;
        let client_secret = required("TADO_CLIENT_SECRET")?;

        let auth_host = non_empty("TADO_AUTH_URL").unwrap_or_else(|| DEFAULT_AUTH_HOST.to_string());
        let api_host = non_empty("TADO_API_URL").unwrap_or_else(|| DEFAULT_API_HOST.to_string());
        let mut client = ClientConfig::with_hosts(&auth_host, &api_host);

        let ttl_secs = match non_empty("TADO_CACHE_TTL_SECS") {
            Some(s) => s
                .parse::<u64>()
                .map_err(|_| "TADO_CACHE_TTL_SECS must be a non-negative integer".to_string())?,
            None => DEFAULT_CACHE_TTL.as_secs(),
        };
        let max_entries = match non_empty("TADO_CACHE_CAPACITY") {
            Some(s) => s
                .parse::<usize>()
                .map_err(|_| "TADO_CACHE_CAPACITY must be a non-negative integer".to_string())?,
            None => DEFAULT_CACHE_CAPACITY,
        };
        client.cache = CachePolicy {
            ttl: Duration::from_secs(ttl_secs),
            max_entries,
        };

        if let Some(s) = non_empty("TADO_TIMEOUT_SECS") {
            let secs = s
                .parse::<u64>()
                .ok()
                .filter(|v| *v > 0)
                .ok_or_else(|| "TADO_TIMEOUT_SECS must be a positive integer".to_string())?;
            client.timeout = Duration::from_secs(secs);
        }

        if let Some(s) = non_empty("TADO_TEMPERATURE_UNIT") {
            client.temperature_unit = s.parse().map_err(|e| format!("TADO_TEMPERATURE_UNIT: {}", e))?;
        }

        client.refresh_on_unauthorized = non_empty("TADO_REFRESH_ON_401")
            .map(|s| matches!(s.as_str(), "1" | "true" | "TRUE"))
            .unwrap_or(false);

        Ok(Config {
            username,
            password,
            client_secret,
            client,
        })
    }
}
