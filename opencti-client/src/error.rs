use thiserror::Error;

/// Errors returned by calls against the OpenCTI API.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid OpenCTI URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {endpoint}")]
    Status { endpoint: &'static str, status: u16 },

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("Missing data in response: {0}")]
    MissingData(&'static str),
}
