//! Error types for agent configuration.

use std::num::ParseIntError;

/// A configuration variable held a value the agent cannot use.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is not a valid URL: {source}")]
    InvalidUrl {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("{var}={value:?} is not a number of milliseconds: {source}")]
    InvalidMillis {
        var: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("{var} must be greater than zero")]
    ZeroPeriod { var: &'static str },

    #[error("{var}={value:?} must be one of `gpsd` or `simulated`")]
    UnknownPositionSource { var: &'static str, value: String },

    #[error("{var}={value:?} is not a boolean")]
    InvalidFlag { var: &'static str, value: String },
}
