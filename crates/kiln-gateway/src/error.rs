use std::io;

/// Errors from storage gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The requested key is absent from the store.
    #[error("not found: {key}")]
    NotFound { key: String },

    /// The URI scheme has no backend.
    #[error("unsupported {role} store scheme: {scheme:?}")]
    UnsupportedScheme { scheme: String, role: String },

    /// A parameter the backend needs is missing from the URI.
    #[error("missing parameter {param:?} in {uri}")]
    MissingParam { param: &'static str, uri: String },

    /// The URI could not be parsed or names an unusable location.
    #[error("invalid store uri {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },

    /// I/O error from a filesystem-backed store.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error reported by an embedded database backend.
    #[error("backend error: {0}")]
    Backend(String),
}

impl GatewayError {
    /// Returns `true` for the recoverable not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for configuration errors (bad scheme, URI or params).
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedScheme { .. } | Self::MissingParam { .. } | Self::InvalidUri { .. }
        )
    }
}

impl From<sled::Error> for GatewayError {
    fn from(e: sled::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

impl From<rusqlite::Error> for GatewayError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

impl From<tokio::task::JoinError> for GatewayError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Backend(format!("blocking task failed: {e}"))
    }
}

/// Result alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
