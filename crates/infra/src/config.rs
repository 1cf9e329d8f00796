//! Configuration loading and representation.

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use permsync_catalog::{PredefinedRoles, init_role};

pub const DEFAULT_API_DOCS_PATH: &str = "/v2/choerodon/api-docs";

/// Synchronization engine settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Run the level-mismatch sweep before every synchronization.
    pub clean_role_permission: bool,
    pub fetch_timeout: Duration,
    pub api_docs_path: String,
    /// Extra read-modify-write attempts after a version conflict.
    pub max_conflict_retries: u32,
    /// Permission codes reconciled in parallel within one run.
    pub endpoint_concurrency: usize,
    pub predefined_roles: PredefinedRoles,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            clean_role_permission: true,
            fetch_timeout: Duration::from_secs(10),
            api_docs_path: DEFAULT_API_DOCS_PATH.to_string(),
            max_conflict_retries: 3,
            endpoint_concurrency: 8,
            predefined_roles: PredefinedRoles::default(),
        }
    }
}

impl SyncConfig {
    /// Load settings from `PERMSYNC_*` environment variables, falling back to
    /// defaults (with a warning) for anything missing or unparseable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let predefined_roles = match lookup("PERMSYNC_PREDEFINED_ROLES") {
            Some(raw) => PredefinedRoles::new(
                raw.split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>(),
            ),
            None => PredefinedRoles::new(init_role::ALL),
        };

        Self {
            clean_role_permission: parse_or(
                &lookup,
                "PERMSYNC_CLEAN_ROLE_PERMISSION",
                defaults.clean_role_permission,
            ),
            fetch_timeout: Duration::from_millis(parse_or(
                &lookup,
                "PERMSYNC_FETCH_TIMEOUT_MS",
                defaults.fetch_timeout.as_millis() as u64,
            )),
            api_docs_path: lookup("PERMSYNC_API_DOCS_PATH").unwrap_or(defaults.api_docs_path),
            max_conflict_retries: parse_or(
                &lookup,
                "PERMSYNC_MAX_CONFLICT_RETRIES",
                defaults.max_conflict_retries,
            ),
            endpoint_concurrency: parse_or(
                &lookup,
                "PERMSYNC_ENDPOINT_CONCURRENCY",
                defaults.endpoint_concurrency,
            )
            .max(1),
            predefined_roles,
        }
    }

    pub fn with_clean_role_permission(mut self, enabled: bool) -> Self {
        self.clean_role_permission = enabled;
        self
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + core::fmt::Debug,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, default = ?default, "invalid config value; using default");
            default
        }),
    }
}
