use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache store unreachable: {0}")]
    Connection(String),

    #[error("Cache command failed: {0}")]
    Command(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("TTL must be greater than zero")]
    InvalidTtl,
}

pub type CacheResult<T> = Result<T, CacheError>;

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}
