use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid input data: {0}")]
    InvalidInputData(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    #[error("Amount overflow")]
    AmountOverflow,

    #[error("Malformed dataset: {0}")]
    MalformedDataset(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
