use thiserror::Error;

/// Everything that can go wrong while pulling one source.
///
/// None of these reach an HTTP client: the aggregator turns them into
/// "no data for this source" and records them in the per-source report.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    #[error("RPC call failed: {0}")]
    Rpc(String),

    #[error("malformed payload: {0}")]
    Parse(String),

    #[error("expected structure not found: {0}")]
    Extraction(String),

    #[error("implausible value: {0}")]
    Validation(String),
}

impl SourceError {
    pub fn network(url: &str, reason: impl std::fmt::Display) -> Self {
        SourceError::Network {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(err.to_string())
    }
}
