//! Agent configuration read from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `TRACKER_ENDPOINT` | `http://localhost:8080/api/positions` |
//! | `TRACKER_POSITION_SOURCE` | `gpsd` (or `simulated`) |
//! | `GPSD_ADDR` | `127.0.0.1:2947` |
//! | `TRACKER_SAMPLE_PERIOD_MS` | `5000` |
//! | `TRACKER_FIX_TIMEOUT_MS` | `10000` |
//! | `TRACKER_MAX_FIX_AGE_MS` | `1000` |
//! | `TRACKER_REQUEST_TIMEOUT_MS` | `30000` |
//! | `TRACKER_CONSENT_FILE` | unset, consent reads as `prompt` |
//! | `TRACKER_UNIT_FILE` | `vehicle_id` |
//! | `VEHICLE_ID` | unset, falls back to the stored id |
//! | `TRACKER_AUTOSTART` | `true` |

pub mod error;

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::controller::SessionTiming;
use crate::position::gpsd::DEFAULT_GPSD_ADDR;
use crate::transmission::http::DEFAULT_REQUEST_TIMEOUT;
use crate::unit::UnitId;

pub use self::error::ConfigError;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080/api/positions";
pub const DEFAULT_UNIT_FILE: &str = "vehicle_id";

/// Where position fixes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionBackend {
    /// A gpsd daemon at `addr`.
    Gpsd { addr: String },
    /// A random walk, for running without receiver hardware.
    Simulated,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub endpoint: Url,
    pub position: PositionBackend,
    pub timing: SessionTiming,
    pub request_timeout: Duration,
    pub consent_file: Option<PathBuf>,
    pub unit_file: PathBuf,
    /// Overrides the stored unit id when set.
    pub vehicle_id: Option<UnitId>,
    pub autostart: bool,
}

impl AgentConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read the configuration through `lookup`, which returns the value of a variable if set.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let endpoint_var = "TRACKER_ENDPOINT";
        let endpoint = get(endpoint_var)
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
            .parse::<Url>()
            .map_err(|source| ConfigError::InvalidUrl {
                var: endpoint_var,
                source,
            })?;

        let source_var = "TRACKER_POSITION_SOURCE";
        let position = match get(source_var).map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("gpsd") => PositionBackend::Gpsd {
                addr: get("GPSD_ADDR").unwrap_or_else(|| DEFAULT_GPSD_ADDR.to_string()),
            },
            Some("simulated") => PositionBackend::Simulated,
            Some(other) => {
                return Err(ConfigError::UnknownPositionSource {
                    var: source_var,
                    value: other.to_string(),
                });
            }
        };

        let defaults = SessionTiming::default();
        let sample_period = millis(&get, "TRACKER_SAMPLE_PERIOD_MS", defaults.sample_period)?;
        if sample_period.is_zero() {
            return Err(ConfigError::ZeroPeriod {
                var: "TRACKER_SAMPLE_PERIOD_MS",
            });
        }
        let timing = SessionTiming::builder()
            .sample_period(sample_period)
            .fix_timeout(millis(&get, "TRACKER_FIX_TIMEOUT_MS", defaults.fix_timeout)?)
            .max_fix_age(millis(&get, "TRACKER_MAX_FIX_AGE_MS", defaults.max_fix_age)?)
            .build();

        let request_timeout = millis(&get, "TRACKER_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT)?;

        let autostart = match get("TRACKER_AUTOSTART") {
            None => true,
            Some(value) => parse_flag(&value).ok_or(ConfigError::InvalidFlag {
                var: "TRACKER_AUTOSTART",
                value,
            })?,
        };

        Ok(Self {
            endpoint,
            position,
            timing,
            request_timeout,
            consent_file: get("TRACKER_CONSENT_FILE").map(PathBuf::from),
            unit_file: get("TRACKER_UNIT_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UNIT_FILE)),
            vehicle_id: get("VEHICLE_ID").and_then(|value| UnitId::parse(&value).ok()),
            autostart,
        })
    }
}

fn millis<G>(get: &G, var: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|source| ConfigError::InvalidMillis { var, value, source }),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
