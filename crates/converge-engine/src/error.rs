//! Engine error taxonomy
//!
//! Transient errors are expected to clear on a later pass (the provider is
//! still converging); validation errors are surfaced verbatim and never
//! retried. A dependency-not-ready error aborts only the current record and
//! resolves once the dependency's mapper has run to completion.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("dependency not ready: waiting for {kind} {id}")]
    DependencyNotReady { kind: String, id: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("client error: {0}")]
    Client(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("module already registered: {0}")]
    DuplicateModule(String),

    #[error("module '{module}' depends on unregistered module '{dependency}'")]
    UnknownDependency { module: String, dependency: String },

    #[error("unknown module: {0}")]
    UnknownModule(String),

    #[error("dependency cycle detected involving module '{0}'")]
    DependencyCycle(String),

    #[error("no mapper registered for entity kind '{0}'")]
    UnknownEntity(String),

    #[error("timed out after {waited_ms}ms waiting for a terminal state")]
    WaitTimeout { waited_ms: u64 },

    #[error(transparent)]
    Record(#[from] converge_core::RecordError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether the caller should expect a later pass to succeed without any
    /// change to the desired state
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Transient(_)
                | EngineError::WaitTimeout { .. }
                | EngineError::DependencyNotReady { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(EngineError::Transient("rate limited".into()).is_transient());
        assert!(EngineError::WaitTimeout { waited_ms: 300_000 }.is_transient());
        assert!(
            EngineError::DependencyNotReady {
                kind: "network".into(),
                id: "net-1|ap-east-1".into(),
            }
            .is_transient()
        );
        assert!(!EngineError::Validation("bad cidr".into()).is_transient());
    }
}
