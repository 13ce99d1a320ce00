use thiserror::Error;

/// Failure to retrieve a document. Always fatal for the running stage.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GET {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("GET {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CaseIdError {
    #[error("case id {0:?} has no ':' separator")]
    MissingSeparator(String),
    #[error("case id {0:?} has an unparsable date")]
    BadDate(String),
    #[error("case id {0:?} has a non-numeric sequence number")]
    BadSequence(String),
}
