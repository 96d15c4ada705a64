// src/traits.rs

use crate::errors::QuoteError;
use crate::models::{OptionInstrument, Quote};
use async_trait::async_trait;
use std::sync::Arc;

/// Source of per-instrument quotes.
///
/// The chain builder treats any error as "no quote for this instrument" and
/// keeps going; the error is only surfaced in logs. Implementations should
/// apply their own per-request timeout so one slow symbol cannot stall the
/// whole fan-out.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quote(&self, instrument: &OptionInstrument) -> Result<Quote, QuoteError>;
}

/// Shared quote source handle, so the service and builder can share one
/// HTTP client across concurrent fetches.
pub type SharedQuoteSource = Arc<dyn QuoteSource>;
