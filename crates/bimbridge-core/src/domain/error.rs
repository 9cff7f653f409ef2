//! Engine-level error taxonomy.
//!
//! Validation failures are not errors at this level — they travel inside
//! `ValidationResult` back to the caller. `EngineError` covers everything
//! that aborts an operation: host failures, execution failures, script
//! failures, and infrastructure problems.

/// Errors produced by the execution engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("host error: {0}")]
    Host(#[from] bimbridge_host::HostError),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("command aborted")]
    Aborted,

    #[error("command exceeded its {limit_ms}ms execution budget")]
    TimedOut { limit_ms: u64 },

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("unknown script: {0}")]
    UnknownScript(String),

    #[error("script error: {0}")]
    Script(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::UnknownCommand("teleport_wall".to_string());
        assert!(err.to_string().contains("teleport_wall"));

        let err = EngineError::TimedOut { limit_ms: 30_000 };
        assert!(err.to_string().contains("30000"));

        let err = EngineError::Script("NameError: undefined".to_string());
        assert!(err.to_string().contains("NameError"));
    }

    #[test]
    fn test_host_error_converts() {
        let host = bimbridge_host::HostError::NoActiveTransaction;
        let err: EngineError = host.into();
        assert!(matches!(err, EngineError::Host(_)));
    }
}
