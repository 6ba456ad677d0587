use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateStoreError {
    #[error("state not found for run {0}")]
    NotFound(String),
    #[error("state already exists for run {0}")]
    AlreadyExists(String),
    #[error("state schema invalid: {0}")]
    SchemaInvalid(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StateStoreError>;

impl From<StateStoreError> for adw_core::Error {
    fn from(err: StateStoreError) -> Self {
        match err {
            StateStoreError::NotFound(run_id) => adw_core::Error::StateNotFound(run_id),
            StateStoreError::SchemaInvalid(msg) => adw_core::Error::StateSchemaInvalid(msg),
            StateStoreError::Serialization(e) => {
                adw_core::Error::StateSchemaInvalid(e.to_string())
            }
            StateStoreError::Io(e) => adw_core::Error::Io(e),
            other => adw_core::Error::Internal(other.to_string()),
        }
    }
}
