//! Domain error types.
//!
//! Filter rejections and halted days are not errors — they are terminal day
//! states reported through the log channel. Errors here are configuration
//! problems (strategy must not start), unrecoverable data gaps, and failed
//! broker operations.

/// Top-level error type for oprtrader.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("no minute data for {symbol} in [{from_utc}, {to_utc})")]
    MissingData {
        symbol: String,
        from_utc: String,
        to_utc: String,
    },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("broker error: {reason}")]
    Broker { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&EngineError> for std::process::ExitCode {
    fn from(err: &EngineError) -> Self {
        let code: u8 = match err {
            EngineError::Io(_) => 1,
            EngineError::ConfigParse { .. }
            | EngineError::ConfigMissing { .. }
            | EngineError::ConfigInvalid { .. } => 2,
            EngineError::MissingData { .. } | EngineError::DataSource { .. } => 3,
            EngineError::Broker { .. } => 4,
        };
        std::process::ExitCode::from(code)
    }
}
