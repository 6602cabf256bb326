//! Client configuration
//!
//! Read from the environment (after loading a `.env` file if one exists).
//! Every variable is optional; unset variables fall back to the defaults below.
use anyhow::Context;
use chrono::FixedOffset;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

use crate::types::{ist, local_offset};

pub const DEFAULT_API_URL: &str = "https://api.localvan.in/api";
const MAX_RETRY_BACKOFF_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_url: String,
    pub timeout: Duration,
    /// Extra attempts for idempotent reads. Mutations are never retried.
    pub read_retries: u32,
    pub retry_backoff: Duration,
    pub utc_offset: FixedOffset,
    pub journal_path: Option<PathBuf>,
    pub log_level: Level,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(15),
            read_retries: 2,
            retry_backoff: Duration::from_millis(300),
            utc_offset: ist(),
            journal_path: None,
            log_level: Level::INFO,
        }
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            let value = raw
                .trim()
                .parse::<T>()
                .with_context(|| format!("{key} must be a valid value, got {raw:?}"))?;
            Ok(Some(value))
        }
        _ => Ok(None),
    }
}

impl ClientConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup("LOCALVAN_API_URL").filter(|u| !u.trim().is_empty()) {
            config.api_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(secs) = parsed::<u64>(&lookup, "LOCALVAN_API_TIMEOUT_SECS")? {
            anyhow::ensure!(secs > 0, "LOCALVAN_API_TIMEOUT_SECS must be greater than zero");
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = parsed::<u32>(&lookup, "LOCALVAN_READ_RETRIES")? {
            config.read_retries = retries;
        }
        if let Some(ms) = parsed::<u64>(&lookup, "LOCALVAN_RETRY_BACKOFF_MS")? {
            anyhow::ensure!(
                ms <= MAX_RETRY_BACKOFF_MS,
                "LOCALVAN_RETRY_BACKOFF_MS must be at most {MAX_RETRY_BACKOFF_MS}, got {ms}"
            );
            config.retry_backoff = Duration::from_millis(ms);
        }
        if let Some(minutes) = parsed::<i32>(&lookup, "LOCALVAN_UTC_OFFSET_MINUTES")? {
            config.utc_offset = local_offset(minutes)
                .with_context(|| format!("LOCALVAN_UTC_OFFSET_MINUTES out of range: {minutes}"))?;
        }
        if let Some(path) = lookup("LOCALVAN_JOURNAL_PATH").filter(|p| !p.trim().is_empty()) {
            config.journal_path = Some(PathBuf::from(path.trim()));
        }
        if let Some(level) = parsed::<Level>(&lookup, "LOCALVAN_LOG")? {
            config.log_level = level;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("LOCALVAN_API_URL", "http://localhost:8080/api/"),
            ("LOCALVAN_API_TIMEOUT_SECS", "5"),
            ("LOCALVAN_READ_RETRIES", "0"),
            ("LOCALVAN_RETRY_BACKOFF_MS", "50"),
            ("LOCALVAN_UTC_OFFSET_MINUTES", "0"),
            ("LOCALVAN_JOURNAL_PATH", "/tmp/localvan-journal"),
            ("LOCALVAN_LOG", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.api_url, "http://localhost:8080/api");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.read_retries, 0);
        assert_eq!(config.retry_backoff, Duration::from_millis(50));
        assert_eq!(config.utc_offset.local_minus_utc(), 0);
        assert_eq!(config.journal_path, Some(PathBuf::from("/tmp/localvan-journal")));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = ClientConfig::from_lookup(lookup(&[("LOCALVAN_API_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("LOCALVAN_API_TIMEOUT_SECS"));

        assert!(ClientConfig::from_lookup(lookup(&[("LOCALVAN_API_TIMEOUT_SECS", "0")])).is_err());
        assert!(
            ClientConfig::from_lookup(lookup(&[("LOCALVAN_UTC_OFFSET_MINUTES", "100000")]))
                .is_err()
        );
    }

    #[test]
    fn out_of_range_values_are_errors() {
        let err = ClientConfig::from_lookup(lookup(&[("LOCALVAN_UTC_OFFSET_MINUTES", "100000000")]))
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));

        let err = ClientConfig::from_lookup(lookup(&[(
            "LOCALVAN_RETRY_BACKOFF_MS",
            "18446744073709551615",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("LOCALVAN_RETRY_BACKOFF_MS"));
    }
}
