//! Tracing/logging initialization.
//!
//! Filtering comes from `RUST_LOG` (default `info`); the output format from
//! `GARRISON_LOG_FORMAT` (`json`, the default, or `pretty`).

use tracing_subscriber::EnvFilter;

pub const LOG_FORMAT_ENV: &str = "GARRISON_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl LogFormat {
    pub fn from_env() -> Self {
        std::env::var(LOG_FORMAT_ENV)
            .map(|v| Self::parse(&v))
            .unwrap_or_default()
    }

    /// Unknown values fall back to JSON.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime);

    let _ = match format {
        LogFormat::Json => builder.json().with_target(false).try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing_defaults_to_json() {
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(" PRETTY "), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("xml"), LogFormat::Json);
    }

    #[test]
    fn init_twice_is_a_no_op() {
        init(LogFormat::Json);
        init(LogFormat::Pretty);
    }
}
