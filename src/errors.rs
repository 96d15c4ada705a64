// src/errors.rs
//
// Failure taxonomy. Only catalog-level failure escalates to the caller as a
// hard error; per-instrument anomalies (missing quotes, malformed products)
// degrade to missing data and are logged where they occur.

use thiserror::Error;

/// Catalog fetch/normalization failure. Recoverable by the caller, which
/// should render an explicit "no data" state rather than a stale chain.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("catalog request returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("catalog response malformed: {0}")]
    Malformed(String),

    #[error("catalog cache io: {0}")]
    Cache(#[from] std::io::Error),
}

/// Per-instrument quote failure. Never fatal to a chain build; the affected
/// row keeps its strike with undefined prices.
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("quote request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("quote request returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("quote request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("quote response missing result for {0}")]
    MissingResult(String),
}
