use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    /// The server could not be reached or answered with something unusable.
    /// Local state is left as it was.
    #[error("Remote operation failed: {0}")]
    Remote(String),

    #[error("You must enter a number into the {0} field")]
    InvalidNumber(String),

    #[error("Model info has no file to save against")]
    MissingFile,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for StorageError {
    fn from(e: reqwest::Error) -> Self {
        StorageError::Remote(e.to_string())
    }
}
