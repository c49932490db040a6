use tablestore_api::ClientError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("client error: {0}")]
    Client(#[from] ClientError),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Add context to the error.
    ///
    /// Message-carrying variants and `Io` (same kind, prefixed message) are
    /// rewritten; a `Client` error is returned as-is so callers can still
    /// match on it.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            EngineError::Config(msg) => EngineError::Config(format!("{ctx}: {msg}")),
            EngineError::UnknownOperation(msg) => {
                EngineError::UnknownOperation(format!("{ctx}: {msg}"))
            }
            EngineError::Io(e) => {
                EngineError::Io(std::io::Error::new(e.kind(), format!("{ctx}: {e}")))
            }
            other => other,
        }
    }
}
