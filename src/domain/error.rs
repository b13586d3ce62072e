//! Domain error types.
//!
//! Fatal errors abort a run before any symbol is processed. Everything else
//! is caught at the symbol, rule or dispatch boundary and reported.

/// Top-level error type for spxscan.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("universe fetch failed: {reason}")]
    UniverseFetch { reason: String },

    #[error("no usable data for {symbol}: {reason}")]
    SymbolData { symbol: String, reason: String },

    #[error("indicator computation failed for {symbol}: {reason}")]
    IndicatorCompute { symbol: String, reason: String },

    #[error("notification failed: {reason}")]
    Notify { reason: String },

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

    #[error("bar cache error: {reason}")]
    Cache { reason: String },

    #[error("scan state error: {reason}")]
    State { reason: String },

    #[error("failed to write {path}: {reason}")]
    Artifact { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScanError {
    pub fn symbol_data(symbol: &str, reason: impl Into<String>) -> Self {
        ScanError::SymbolData {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }

    pub fn indicator(symbol: &str, reason: impl Into<String>) -> Self {
        ScanError::IndicatorCompute {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        ScanError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Fatal errors stop the run; the rest only skip a symbol, a rule or a send.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScanError::UniverseFetch { .. }
                | ScanError::ConfigParse { .. }
                | ScanError::ConfigMissing { .. }
                | ScanError::ConfigInvalid { .. }
                | ScanError::State { .. }
                | ScanError::Io(_)
        )
    }
}

impl From<&ScanError> for std::process::ExitCode {
    fn from(err: &ScanError) -> Self {
        let code: u8 = match err {
            ScanError::Io(_) | ScanError::Artifact { .. } => 1,
            ScanError::ConfigParse { .. }
            | ScanError::ConfigMissing { .. }
            | ScanError::ConfigInvalid { .. } => 2,
            ScanError::UniverseFetch { .. } => 3,
            ScanError::State { .. } => 4,
            ScanError::SymbolData { .. }
            | ScanError::IndicatorCompute { .. }
            | ScanError::Notify { .. }
            | ScanError::Cache { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
