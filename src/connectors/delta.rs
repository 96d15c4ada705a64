// src/connectors/delta.rs
//
// Delta Exchange quote client.
// Per-symbol REST ticker fetch against the public /v2/tickers endpoint.

use crate::errors::QuoteError;
use crate::models::{DeltaTickerResponse, OptionInstrument, Quote};
use crate::traits::{QuoteSource, SharedQuoteSource};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Default per-request timeout. A slow symbol degrades to "no quote"; it
/// must not stall the rest of the fan-out.
pub const DEFAULT_QUOTE_TIMEOUT: Duration = Duration::from_secs(5);

/// REST quote client for Delta Exchange.
///
/// Clone-cheap: the underlying `reqwest::Client` is an `Arc` internally, so
/// one client is shared across all concurrent fetches.
#[derive(Clone)]
pub struct DeltaQuoteClient {
    http_client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl DeltaQuoteClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Option<Duration>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.into(),
            request_timeout: request_timeout.unwrap_or(DEFAULT_QUOTE_TIMEOUT),
        }
    }

    /// Wrap in an `Arc` for sharing across the service and builder.
    pub fn shared(self) -> SharedQuoteSource {
        Arc::new(self)
    }

    fn ticker_url(&self, symbol: &str) -> String {
        format!("{}/v2/tickers/{}", self.base_url, symbol)
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Quote, QuoteError> {
        let request = self.http_client.get(self.ticker_url(symbol)).send();
        let response = timeout(self.request_timeout, request)
            .await
            .map_err(|_| QuoteError::Timeout(self.request_timeout))??;

        if !response.status().is_success() {
            return Err(QuoteError::Status(response.status()));
        }

        let body: DeltaTickerResponse = timeout(self.request_timeout, response.json())
            .await
            .map_err(|_| QuoteError::Timeout(self.request_timeout))??;

        match body.result {
            Some(data) => Ok(data.to_quote()),
            None => Err(QuoteError::MissingResult(symbol.to_string())),
        }
    }
}

#[async_trait]
impl QuoteSource for DeltaQuoteClient {
    async fn quote(&self, instrument: &OptionInstrument) -> Result<Quote, QuoteError> {
        self.fetch_ticker(&instrument.symbol).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_url() {
        let client = DeltaQuoteClient::new("https://api.delta.exchange", None);
        assert_eq!(
            client.ticker_url("P-BTC-116400-160825"),
            "https://api.delta.exchange/v2/tickers/P-BTC-116400-160825"
        );
    }

    #[test]
    fn test_default_timeout_applied() {
        let client = DeltaQuoteClient::new("https://api.delta.exchange", None);
        assert_eq!(client.request_timeout, DEFAULT_QUOTE_TIMEOUT);

        let client = DeltaQuoteClient::new(
            "https://api.delta.exchange",
            Some(Duration::from_secs(2)),
        );
        assert_eq!(client.request_timeout, Duration::from_secs(2));
    }
}
