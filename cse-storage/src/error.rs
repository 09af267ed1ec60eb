//! Errors the storage layer can raise, kept separate from [`cse_model::CseError`]
//! so a backend crate can depend on `cse-storage` without pulling in the
//! whole resource model's error taxonomy — the Dispatcher is the one place
//! that bridges [`StorageError`] into `CseError` (spec §7).

#[derive(Debug)]
pub enum StorageError {
    NotFound(String),
    Conflict(String),
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl StorageError {
    /// Construct a `Backend` variant from any error type.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StorageError::Backend(Box::new(err))
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::NotFound(msg) => write!(f, "Not found: {msg}"),
            StorageError::Conflict(msg) => write!(f, "Conflict: {msg}"),
            StorageError::Backend(err) => write!(f, "Storage backend error: {err}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Backend(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<StorageError> for cse_model::CseError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(msg) => cse_model::CseError::NotFound(msg),
            StorageError::Conflict(msg) => cse_model::CseError::Conflict(msg),
            StorageError::Backend(err) => cse_model::CseError::Internal(err.to_string()),
        }
    }
}
