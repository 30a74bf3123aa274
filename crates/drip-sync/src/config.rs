//! Environment-driven configuration. CLI flags override individual fields
//! after `from_env`.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use drip_storage::NtfyConfig;

const DEFAULT_COLLECTION: &str = "coffees";
const DEFAULT_TRIED_COLLECTION: &str = "coffees_tried";
const DEFAULT_DB_PATH: &str = "coffees.db";
const DEFAULT_NTFY_SERVER: &str = "https://ntfy.sh";
const DEFAULT_POLITENESS_MS: u64 = 1200;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub project_id: String,
    pub collection: String,
    pub tried_collection: String,
    pub db_path: PathBuf,
    /// Pause between consecutive page fetches.
    pub politeness_delay: Duration,
    pub bearer_token: Option<String>,
    pub emulator_host: Option<String>,
    pub ntfy: NtfyConfig,
}

impl MonitorConfig {
    pub fn from_env() -> Result<Self> {
        let project_id = env::var("FIREBASE_PROJECT_ID")
            .context("FIREBASE_PROJECT_ID must be set (the Firestore project to write to)")?;
        let politeness_ms = match env_opt("POLITENESS_DELAY_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("POLITENESS_DELAY_MS is not a number: {raw}"))?,
            None => DEFAULT_POLITENESS_MS,
        };
        Ok(Self {
            project_id,
            collection: env_or("FIREBASE_COLLECTION", DEFAULT_COLLECTION),
            tried_collection: env_or("FIREBASE_TRIED_COLLECTION", DEFAULT_TRIED_COLLECTION),
            db_path: PathBuf::from(env_or("COFFEE_DB", DEFAULT_DB_PATH)),
            politeness_delay: Duration::from_millis(politeness_ms),
            bearer_token: env_opt("FIRESTORE_TOKEN"),
            emulator_host: env_opt("FIRESTORE_EMULATOR_HOST"),
            ntfy: Self::ntfy_from_env(),
        })
    }

    /// Notification settings alone, for paths that never touch the stores.
    pub fn ntfy_from_env() -> NtfyConfig {
        NtfyConfig {
            topic: env_opt("NTFY_TOPIC"),
            server: env_or("NTFY_SERVER", DEFAULT_NTFY_SERVER),
            site_base_url: env_opt("SITE_BASE_URL"),
            click_url: env_opt("NTFY_CLICK_URL"),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

/// Unset and empty both read as "not configured".
fn env_opt(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_env_value_reads_as_unset() {
        env::set_var("DRIP_TEST_EMPTY_VAR", "   ");
        assert_eq!(env_opt("DRIP_TEST_EMPTY_VAR"), None);
        assert_eq!(env_or("DRIP_TEST_EMPTY_VAR", "fallback"), "fallback");
        env::remove_var("DRIP_TEST_EMPTY_VAR");
    }

    #[test]
    fn set_env_value_wins_over_default() {
        env::set_var("DRIP_TEST_SET_VAR", "custom");
        assert_eq!(env_or("DRIP_TEST_SET_VAR", "fallback"), "custom");
        env::remove_var("DRIP_TEST_SET_VAR");
    }
}
