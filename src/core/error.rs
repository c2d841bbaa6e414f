//! AZ-008: Error kinds raised while composing and synthesizing a stack.
//!
//! Every variant is a local validation failure. None are retried.

use thiserror::Error;

/// Result type alias for composition operations.
pub type ComposeResult<T> = Result<T, ComposeError>;

/// Errors that can occur while building or synthesizing a stack.
#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("duplicate identifier '{segment}' under '{parent}'")]
    DuplicateIdentifier { parent: String, segment: String },

    #[error("invalid identifier '{segment}' under '{parent}': {reason}")]
    InvalidIdentifier {
        parent: String,
        segment: String,
        reason: String,
    },

    #[error("unresolved reference: no value for '{attribute}' at '{path}'")]
    UnresolvedReference { path: String, attribute: String },

    #[error("reference cycle detected: {}", .cycle.join(" -> "))]
    ReferenceCycle { cycle: Vec<String> },

    #[error("duplicate output '{0}'")]
    DuplicateOutput(String),

    #[error(
        "unsupported API version '{requested}' for {resource_type} (supported: {})",
        .supported.join(", ")
    )]
    UnsupportedVersion {
        resource_type: String,
        requested: String,
        supported: Vec<String>,
    },

    #[error("unknown role '{role}' for principal '{principal}'")]
    UnknownRole { principal: String, role: String },

    #[error("invalid property '{property}' at '{path}': {reason}")]
    InvalidProperty {
        path: String,
        property: String,
        reason: String,
    },

    #[error("stack file error: {0}")]
    StackFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}
