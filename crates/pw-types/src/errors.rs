use thiserror::Error;

/// Main error type for the PegWatch system
#[derive(Error, Debug)]
pub enum PwError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while acquiring or validating an observation.
///
/// All of these are scoped to a single asset; the engine skips that asset for
/// the tick and carries on with the rest.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("Asset not found: {asset}")]
    AssetNotFound { asset: String },

    #[error("Invalid observation for {asset}: {message}")]
    InvalidObservation { asset: String, message: String },

    #[error("Fetch failed for {asset}: {message}")]
    FetchFailed { asset: String, message: String },

    #[error("Fetch for {asset} timed out after {timeout_ms} ms")]
    Timeout { asset: String, timeout_ms: u64 },
}

impl DataError {
    /// Asset the failure belongs to.
    pub fn asset(&self) -> &str {
        match self {
            DataError::AssetNotFound { asset }
            | DataError::InvalidObservation { asset, .. }
            | DataError::FetchFailed { asset, .. }
            | DataError::Timeout { asset, .. } => asset,
        }
    }
}

/// Engine lifecycle errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Monitoring must be started from within a tokio runtime")]
    NoRuntime,

    #[error("No assets specified for monitoring")]
    NoAssets,
}

/// Result type alias for PegWatch operations
pub type PwResult<T> = Result<T, PwError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::PwError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = DataError::Timeout {
            asset: "USDC".into(),
            timeout_ms: 250,
        };

        assert!(error.to_string().contains("USDC"));
        assert!(error.to_string().contains("250"));
        assert_eq!(error.asset(), "USDC");
    }

    #[test]
    fn test_error_conversion() {
        let data_error = DataError::AssetNotFound {
            asset: "FRAX".to_string(),
        };
        let pw_error: PwError = data_error.into();

        match pw_error {
            PwError::Data(_) => (),
            _ => panic!("Expected Data error"),
        }

        let pw_error: PwError = EngineError::NoAssets.into();
        assert!(matches!(pw_error, PwError::Engine(EngineError::NoAssets)));
    }

    #[test]
    fn test_config_error_macro() {
        let config_err = config_error!("Missing required field: {}", "assets");
        assert_eq!(
            config_err.to_string(),
            "Configuration error: Missing required field: assets"
        );
    }
}
