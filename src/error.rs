//! Error types for tierbit

/// All errors returned by tierbit operations.
///
/// An undefined permission or an unresolved SKU is not an error; those come
/// back as [`PermissionResult::Undefined`](crate::PermissionResult) and `None`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// An ancestor holds a locked denial for this permission.
    #[error("permission {key}{} is locked by {locked_by}", scope_suffix(.scope))]
    Locked {
        key: String,
        scope: Option<String>,
        locked_by: String,
    },

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("permission request not found: {0}")]
    RequestNotFound(u64),

    #[error("permission request {0} is not pending")]
    RequestNotPending(u64),

    /// Malformed key, code or path handed to a write operation.
    #[error("invalid input: {0}")]
    InvalidKey(String),

    /// Invalid configuration; raised when the config is loaded, never per call.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("storage backend error: {0}")]
    Storage(String),
}

fn scope_suffix(scope: &Option<String>) -> String {
    match scope {
        Some(s) => format!(" (scope {})", s),
        None => String::new(),
    }
}

/// Result type alias for tierbit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Convert any backend error to [`Error::Storage`]
pub fn err<E: std::error::Error>(e: E) -> Error {
    Error::Storage(e.to_string())
}
