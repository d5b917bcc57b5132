use crate::node::NodeId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuamError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Format error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Invalid reference \"{reference}\": {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("Please provide {class}.{field} as it is a required field")]
    MissingRequiredField { class: String, field: String },

    #[error("Unknown class: {0}")]
    UnknownClass(String),

    #[error("Field {field} is not a valid field of {class}")]
    UnknownField { class: String, field: String },

    #[error("Wrong type for {field}: expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("Value cannot be serialised: {0}")]
    Unserializable(String),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Key not found on node {node}: {key}")]
    KeyNotFound { node: NodeId, key: String },

    #[error("Node {0} is not a container")]
    NotAContainer(NodeId),

    #[error("Unsupported path suffix: {0}")]
    UnsupportedPath(PathBuf),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("File is not a JSON file: {0}")]
    NotJsonFile(PathBuf),

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Missing config version")]
    MissingConfigVersion,

    #[error("Unsupported config version: {0}")]
    UnsupportedConfigVersion(u32),

    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl QuamError {
    pub(crate) fn invalid_reference(reference: &str, reason: impl Into<String>) -> Self {
        QuamError::InvalidReference {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }
}
