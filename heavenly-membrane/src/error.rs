//! Error taxonomy for membrane operations
//!
//! Every error is local to one request/response turn. Nothing here is retried:
//! a failure is surfaced to whichever side made the request.

use heavenly_wire::{Path, WireError};

/// Errors raised while crossing the membrane
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MembraneError {
    #[error("Path `{path}` does not resolve: cannot read `{key}`")]
    Path { path: Path, key: String },

    #[error("Empty path")]
    EmptyPath,

    #[error("Not callable: `{0}`")]
    NotCallable(Path),

    #[error("Unknown wire type: {0}")]
    UnknownWireType(String),

    #[error("Wire error: {0}")]
    Wire(String),

    #[error("{native} expects {expected} argument(s), got {got}")]
    Arity {
        native: String,
        expected: usize,
        got: usize,
    },

    /// Raised by a host function; passes through the bridge untouched
    #[error("Host error: {0}")]
    Host(String),

    /// Raised by the machine itself (syntax errors, sandbox-side type errors)
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Link mismatch: {names} name(s) for {values} value(s)")]
    LinkMismatch { names: usize, values: usize },

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Re-entrant call to `{procedure}`: the machine is already running a turn")]
    Reentrant { procedure: String },
}

impl MembraneError {
    /// Convenience constructor for host function failures
    pub fn host(message: impl Into<String>) -> Self {
        MembraneError::Host(message.into())
    }

    pub fn sandbox(message: impl Into<String>) -> Self {
        MembraneError::Sandbox(message.into())
    }
}

impl From<WireError> for MembraneError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::UnknownType(tag) => MembraneError::UnknownWireType(tag),
            other => MembraneError::Wire(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for MembraneError {
    fn from(err: serde_json::Error) -> Self {
        MembraneError::Wire(err.to_string())
    }
}

pub type MembraneResult<T> = Result<T, MembraneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tag_maps_to_unknown_wire_type() {
        let err: MembraneError = WireError::UnknownType("bogus".to_string()).into();
        assert_eq!(err, MembraneError::UnknownWireType("bogus".to_string()));
    }

    #[test]
    fn test_other_wire_errors_stay_generic() {
        let err: MembraneError = WireError::MissingType.into();
        assert!(matches!(err, MembraneError::Wire(_)));
    }

    #[test]
    fn test_path_error_message() {
        let err = MembraneError::Path {
            path: Path::from(["a", "b", "c"]),
            key: "b".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Path `a.b.c` does not resolve: cannot read `b`"
        );
    }
}
