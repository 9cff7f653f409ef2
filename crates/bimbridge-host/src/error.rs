//! Error taxonomy for host document operations.

use crate::model::ElementId;

/// Errors produced by a host document adapter.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("element not found: {0}")]
    ElementNotFound(ElementId),

    #[error("parameter {name} not found on element {element}")]
    ParameterNotFound { element: ElementId, name: String },

    #[error("parameter {name} on element {element} is read-only")]
    ReadOnlyParameter { element: ElementId, name: String },

    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("unknown type {type_name} in category {category}")]
    UnknownType {
        category: String,
        type_name: String,
    },

    #[error("no active transaction")]
    NoActiveTransaction,

    #[error("transaction already active: {0}")]
    TransactionInProgress(String),

    #[error("no active transaction group")]
    NoActiveGroup,

    #[error("transaction group already active: {0}")]
    GroupInProgress(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for host document operations.
pub type HostResult<T> = std::result::Result<T, HostError>;
