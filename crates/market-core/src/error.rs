use thiserror::Error;

/// Why a single upstream provider could not contribute to a fetch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceFailure {
    #[error("API key not configured")]
    MissingCredentials,

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Timed out")]
    Timeout,

    #[error("Empty response")]
    Empty,

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<SourceFailure>,
    },
}

/// The only error a source adapter hands back to its caller.
///
/// It never aborts an aggregation: the merge simply has nothing from this source.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{source_id} unavailable: {failure}")]
pub struct SourceUnavailable {
    pub source_id: &'static str,
    pub failure: SourceFailure,
}

impl SourceUnavailable {
    pub fn new(source_id: &'static str, failure: SourceFailure) -> Self {
        Self { source_id, failure }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.failure, SourceFailure::Timeout)
    }
}

pub type SourceResult<T> = Result<T, SourceUnavailable>;
