// src/connectors/mod.rs
//
// Exchange adapters. One client per venue; each implements the `QuoteSource`
// seam so the chain builder never sees HTTP.

pub mod delta;

pub use delta::DeltaQuoteClient;
