//! Engine tuning read from the environment.

use std::time::Duration;

use tracing::warn;

pub const MAX_COMMIT_ATTEMPTS_ENV: &str = "GARRISON_MAX_COMMIT_ATTEMPTS";
pub const RETRY_BACKOFF_MS_ENV: &str = "GARRISON_RETRY_BACKOFF_MS";
pub const MAX_PAGE_SIZE_ENV: &str = "GARRISON_MAX_PAGE_SIZE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Commit attempts per request before `TransactionFailed` (>= 1).
    pub max_commit_attempts: u32,
    /// Base backoff between attempts; grows linearly with the attempt number.
    pub retry_backoff: Duration,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_commit_attempts: 5,
            retry_backoff: Duration::from_millis(10),
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unparseable or out-of-range
    /// values fall back to the default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let max_commit_attempts = parse_or(
            &lookup,
            MAX_COMMIT_ATTEMPTS_ENV,
            defaults.max_commit_attempts,
            |v: &u32| *v >= 1,
        );
        let backoff_ms = parse_or(
            &lookup,
            RETRY_BACKOFF_MS_ENV,
            defaults.retry_backoff.as_millis() as u64,
            |_| true,
        );
        let max_page_size = parse_or(
            &lookup,
            MAX_PAGE_SIZE_ENV,
            defaults.max_page_size,
            |v: &u32| *v >= 1,
        );

        Self {
            max_commit_attempts,
            retry_backoff: Duration::from_millis(backoff_ms),
            default_page_size: defaults.default_page_size.min(max_page_size),
            max_page_size,
        }
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
    valid: impl Fn(&T) -> bool,
) -> T
where
    T: core::str::FromStr + core::fmt::Display,
{
    let Some(raw) = lookup(name) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            warn!(variable = name, value = %raw, fallback = %default, "invalid configuration value, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn missing_variables_yield_defaults() {
        assert_eq!(EngineConfig::from_lookup(lookup(&[])), EngineConfig::default());
    }

    #[test]
    fn valid_values_are_used() {
        let cfg = EngineConfig::from_lookup(lookup(&[
            (MAX_COMMIT_ATTEMPTS_ENV, "3"),
            (RETRY_BACKOFF_MS_ENV, "0"),
            (MAX_PAGE_SIZE_ENV, "50"),
        ]));
        assert_eq!(cfg.max_commit_attempts, 3);
        assert_eq!(cfg.retry_backoff, Duration::ZERO);
        assert_eq!(cfg.max_page_size, 50);
    }

    #[test]
    fn invalid_values_fall_back() {
        let cfg = EngineConfig::from_lookup(lookup(&[
            (MAX_COMMIT_ATTEMPTS_ENV, "0"),
            (MAX_PAGE_SIZE_ENV, "lots"),
        ]));
        assert_eq!(cfg.max_commit_attempts, 5);
        assert_eq!(cfg.max_page_size, 100);
    }

    #[test]
    fn default_page_size_never_exceeds_cap() {
        let cfg = EngineConfig::from_lookup(lookup(&[(MAX_PAGE_SIZE_ENV, "5")]));
        assert_eq!(cfg.default_page_size, 5);
    }
}
