use thiserror::Error;

/// Failures of one listing request. All of them end the page loop; none end the process.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transport failure on page {page}: {message}")]
    Transport { page: u32, message: String },

    #[error("HTTP {status} on page {page}")]
    Status { page: u32, status: u16 },

    #[error("malformed response on page {page}: {message}")]
    ResponseFormat { page: u32, message: String },
}

/// Why a listing row was skipped. Skips are counted, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowSkip {
    #[error("row has no data cells")]
    NoCells,

    #[error("row carries neither a project id nor a report contract id")]
    MissingIdentifier,
}

/// Failures loading an optional enrichment input.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid CSV in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("feature service request failed: {0}")]
    Http(String),

    #[error("feature service returned an error: {0}")]
    Service(String),

    #[error("unexpected feature service payload: {0}")]
    Payload(String),
}
