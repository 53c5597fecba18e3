//! Client configuration.
//!
//! Settings come from the environment (`MEDIDESK_*` variables, usually via a
//! `.env` file loaded by the binary) with fixed fallbacks. The session file
//! lives under the user cache directory at `~/.cache/medidesk/session.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

/// Application name used for cache directory paths
const APP_NAME: &str = "medidesk";

/// Fallback when `MEDIDESK_API_URL` is unset.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";

/// Every request gives up after 15 seconds.
pub const REQUEST_TIMEOUT_MS: u64 = 15_000;

/// How long a closed auth-failure cycle's outcome is reused. 401s landing
/// inside the window take it instead of starting another cycle.
pub const DEFAULT_SETTLE_WINDOW_MS: u64 = 1_000;

/// Area exempt from forced login redirects when unset in the environment.
pub const DEFAULT_EXEMPT_AREA: &str = "billing";

pub const DEFAULT_LOGIN_PATH: &str = "/login";

pub const ENV_BASE_URL: &str = "MEDIDESK_API_URL";
pub const ENV_EXEMPT_AREAS: &str = "MEDIDESK_EXEMPT_AREAS";
pub const ENV_LOGIN_PATH: &str = "MEDIDESK_LOGIN_PATH";
pub const ENV_SETTLE_WINDOW_MS: &str = "MEDIDESK_SETTLE_WINDOW_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub exempt_areas: Vec<String>,
    pub login_path: String,
    pub settle_window: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
            exempt_areas: vec![DEFAULT_EXEMPT_AREA.to_string()],
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            settle_window: Duration::from_millis(DEFAULT_SETTLE_WINDOW_MS),
        }
    }
}

impl ClientConfig {
    /// Build a config from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(url) = get(ENV_BASE_URL) {
            config.base_url = url;
        }

        if let Some(areas) = get(ENV_EXEMPT_AREAS) {
            config.exempt_areas = areas
                .split(',')
                .map(|a| a.trim().trim_matches('/').to_string())
                .filter(|a| !a.is_empty())
                .collect();
        }

        if let Some(path) = get(ENV_LOGIN_PATH) {
            config.login_path = path;
        }

        if let Some(ms) = get(ENV_SETTLE_WINDOW_MS) {
            match ms.parse::<u64>() {
                Ok(ms) => config.settle_window = Duration::from_millis(ms),
                Err(_) => tracing::warn!(value = %ms, "Ignoring invalid {}", ENV_SETTLE_WINDOW_MS),
            }
        }

        config
    }
}

/// Directory holding the persisted session file.
pub fn session_dir() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
    Ok(cache_dir.join(APP_NAME))
}
