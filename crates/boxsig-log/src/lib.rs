//! Logging for boxsig.
//!
//! Re-exports the tracing macros the protocol crates log with and installs
//! the global subscriber from [`LogSettings`]. Protocol crates log under
//! their module targets (`boxsig_client::coordinator`,
//! `boxsig_client::signatures`, ...) so `boxsig_client=debug` shows chunk
//! plans and cost quotes without the HTTP client's noise.

use serde::{Deserialize, Serialize};
use std::fmt as stdfmt;
use std::str::FromStr;

pub use tracing::{debug, error, info, instrument, span, trace, warn, Level, Span};
pub use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter applied when neither `RUST_LOG` nor the settings name one
pub const DEFAULT_FILTER: &str = "info";

/// Crates whose targets [`protocol_filter`] raises
pub const PROTOCOL_TARGETS: &[&str] = &["boxsig_client", "boxsig_store", "boxsig_crypto"];

pub type InitError = Box<dyn std::error::Error + Send + Sync>;

/// Output encoding of log records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per record, with file and thread ids
    #[default]
    Json,
    Pretty,
    Compact,
}

impl FromStr for LogFormat {
    type Err = InitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            other => Err(format!("unknown log format {other:?}").into()),
        }
    }
}

impl stdfmt::Display for LogFormat {
    fn fmt(&self, f: &mut stdfmt::Formatter<'_>) -> stdfmt::Result {
        f.write_str(match self {
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
            LogFormat::Compact => "compact",
        })
    }
}

/// Subscriber settings carried in the client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directives; `RUST_LOG` wins when set
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Json,
        }
    }
}

impl LogSettings {
    /// Check that `filter` parses as `EnvFilter` directives
    pub fn validate(&self) -> Result<(), InitError> {
        EnvFilter::try_new(&self.filter)?;
        Ok(())
    }
}

/// Directives logging the protocol crates at `level` and everything else at warn
pub fn protocol_filter(level: Level) -> String {
    let level = level.to_string().to_ascii_lowercase();
    let mut directives = vec!["warn".to_string()];
    directives.extend(PROTOCOL_TARGETS.iter().map(|target| format!("{target}={level}")));
    directives.join(",")
}

/// Install the global subscriber described by `settings`
pub fn init(settings: &LogSettings) -> Result<(), InitError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.filter)?,
    };
    install(filter, settings.format)
}

/// Initialize with structured JSON output, honoring `RUST_LOG`
pub fn init_tracing() -> Result<(), InitError> {
    init(&LogSettings::default())
}

/// Initialize JSON output with an explicit filter, e.g. `"boxsig_client=debug"`
pub fn init_tracing_with_level(level: &str) -> Result<(), InitError> {
    install(EnvFilter::try_new(level)?, LogFormat::Json)
}

/// Initialize tracing for tests with plain output captured by the test harness
///
/// Safe to call from every test; only the first call installs the subscriber.
pub fn init_tracing_test() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}

fn install(filter: EnvFilter, format: LogFormat) -> Result<(), InitError> {
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .json(),
            )
            .try_init()?,
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init()?,
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(true))
            .try_init()?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_test_is_idempotent() {
        init_tracing_test();
        init_tracing_test();
        info!(group = 1u64, "subscriber installed");
    }

    #[test]
    fn test_invalid_directive_is_rejected() {
        assert!(init_tracing_with_level("boxsig_client=notalevel").is_err());
        let settings = LogSettings {
            filter: "boxsig_client=loud".to_string(),
            ..LogSettings::default()
        };
        assert!(settings.validate().is_err());
        assert!(LogSettings::default().validate().is_ok());
    }

    #[test]
    fn test_protocol_filter() {
        assert_eq!(
            protocol_filter(Level::DEBUG),
            "warn,boxsig_client=debug,boxsig_store=debug,boxsig_crypto=debug"
        );
        assert!(EnvFilter::try_new(protocol_filter(Level::TRACE)).is_ok());
    }

    #[test]
    fn test_format_names() {
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::Compact.to_string(), "compact");
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    #[tracing::instrument]
    fn test_instrument_attribute() {
        debug!("instrumented test body");
    }
}
