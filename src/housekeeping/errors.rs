use thiserror::Error;

use crate::store::StoreError;

/// Errors from retrieving a CRL over HTTP.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("timeout while fetching CRL")]
    Timeout,

    #[error("CRL endpoint returned HTTP {0}")]
    HttpStatus(reqwest::StatusCode),

    #[error("network error while fetching CRL: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid CRL URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Transient failures are retried with backoff; 4xx responses and bad
    /// URLs are permanent misconfiguration and are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Network(_) => true,
            Self::HttpStatus(status) => status.is_server_error(),
            Self::InvalidUrl(_) => false,
        }
    }
}

/// Errors from decoding a DER-encoded CRL.
///
/// Parsing is all-or-nothing: a blob that fails here is never persisted as a
/// partial record.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("CRL data is truncated")]
    Truncated,

    #[error("malformed CRL: {0}")]
    Malformed(String),

    #[error("unsupported CRL encoding, expected raw DER")]
    UnsupportedEncoding,
}

/// Infrastructure-level failures that abort a whole invocation.
///
/// Per-source fetch/parse/store failures never surface here; they land in
/// that source's `last_error` and the run keeps going.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("store failure aborted the run: {0}")]
    Store(#[from] StoreError),
}

/// Convenient Result type aliases
pub type FetchResult<T> = Result<T, FetchError>;
pub type ParseResult<T> = Result<T, ParseError>;
