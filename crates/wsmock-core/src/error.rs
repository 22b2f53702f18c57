use thiserror::Error;

/// Errors raised while writing into a JSON tree by path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Empty path")]
    EmptyPath,
    #[error("Empty segment in path: {0}")]
    EmptySegment(String),
    #[error("Cannot descend into '{segment}': value at that point is not an object or array")]
    NotAContainer { segment: String },
    #[error("Invalid array index '{segment}'")]
    InvalidIndex { segment: String },
}

/// Errors raised when a command line cannot be turned into a command.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Invalid JSON after '{prefix}': {source}")]
    InvalidPayload {
        prefix: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("'{prefix}' expects {expected}")]
    UnexpectedShape {
        prefix: &'static str,
        expected: &'static str,
    },
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("'db set' requires a path")]
    MissingPath,
}
