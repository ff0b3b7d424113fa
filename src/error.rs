use thiserror::Error as ThisError;

/// Rejected probe settings. Raised before any connection is attempted.
#[derive(ThisError, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("attempts must be a positive integer, got {0}")]
    InvalidAttempts(u32),
    #[error("timeout must be a positive number of seconds, got {0}")]
    InvalidTimeout(f64),
    #[error("interval must be zero or a positive number of seconds, got {0}")]
    InvalidInterval(f64),
    #[error("port must be in 1-65535, got {0}")]
    InvalidPort(u32),
    #[error("host must not be empty")]
    EmptyHost,
    #[error("Invalid log level: {0}. Valid levels are: trace, debug, info, warn, error")]
    InvalidLogLevel(String),
}

#[derive(ThisError, Debug)]
pub enum ResolveError {
    #[error("failed to resolve host {host}: {source}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("host {host} has no {family} address")]
    NoAddress { host: String, family: &'static str },
}
