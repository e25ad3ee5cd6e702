use std::path::PathBuf;

use thiserror::Error;

/// Failure decoding a single page of the `QueryContainer` response.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The document itself is unusable, or a container-level field is wrong.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An `Item` is missing a required field or carries an unusable value.
    #[error("malformed recording #{index} on page: missing or invalid `{field}`")]
    MalformedRecord { index: usize, field: &'static str },
}

/// Failure of one of the injected fetch capabilities.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("invalid URL {url:?}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}
impl FetchError {
    /// Whether repeating the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_builder(),
            Self::Status { status, .. } => !status.is_client_error(),
            Self::Auth(_) | Self::InvalidUrl { .. } => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("fetching page at offset {offset} failed")]
    Fetch {
        offset: u64,
        #[source]
        source: FetchError,
    },

    #[error("parsing page at offset {offset} failed")]
    Parse {
        offset: u64,
        #[source]
        source: ParseError,
    },

    #[error("device reported {expected} recordings but {actual} were listed")]
    Integrity { expected: u64, actual: u64 },
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("could not open stream for {title:?}")]
    Open {
        title: String,
        #[source]
        source: FetchError,
    },

    #[error("stream for {title:?} failed after {written} bytes")]
    Stream {
        title: String,
        written: u64,
        #[source]
        source: FetchError,
    },

    #[error("writing {path:?} failed")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("listing recordings failed")]
    Catalog(#[from] CatalogError),

    #[error("downloading recording #{rank:04} failed")]
    Transfer {
        rank: usize,
        #[source]
        source: TransferError,
    },

    #[error("writing the report failed")]
    Report(#[from] std::io::Error),

    #[error("preparing output directory {path:?} failed")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
