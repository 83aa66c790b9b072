use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Operation not installed: {0}")]
    NotInstalled(String),

    #[error("Installed operation {0} has a different signature")]
    SignatureMismatch(String),

    #[error("Unsuccessful at fixing corrupt data: {0}")]
    FixUnsuccessful(String),

    #[error("No graph is pending a fix")]
    NothingToFix,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
