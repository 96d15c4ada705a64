// src/models.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// =============================================================================
// Option and Pricing Types
// =============================================================================

/// Call or put.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionType::Call => write!(f, "call"),
            OptionType::Put => write!(f, "put"),
        }
    }
}

/// How chain rows are priced: mid of best bid/ask, or the exchange mark price.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PricingMode {
    Mid,
    Mark,
}

impl fmt::Display for PricingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PricingMode::Mid => write!(f, "mid"),
            PricingMode::Mark => write!(f, "mark"),
        }
    }
}

/// One tradeable option contract, normalized from the exchange catalog.
///
/// Strike and option type come from the structured product fields when the
/// exchange provides them, or from parsing the symbol otherwise. Products
/// where neither source resolves are dropped during catalog normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionInstrument {
    /// Exchange symbol (e.g., "C-BTC-128400-290825")
    pub symbol: String,
    /// Numeric product id (alternative quote-lookup key on some API shapes)
    pub product_id: u64,
    /// Underlying asset (e.g., "BTC", "ETH")
    pub underlying: String,
    /// Call or put
    pub option_type: OptionType,
    /// Strike price in the quote currency
    pub strike: f64,
    /// Contract settlement time (UTC)
    pub settlement_time: DateTime<Utc>,
}

// =============================================================================
// Quotes
// =============================================================================

/// Bid/ask/mark snapshot for one instrument at fetch time.
///
/// All fields are optional: an empty book has no bid or ask, and a fetch
/// failure yields `Quote::default()` (everything absent).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub mark_price: Option<f64>,
}

impl Quote {
    /// Mid price, defined only when both sides of the book are present.
    ///
    /// A one-sided book yields `None`, never a single-sided substitute.
    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        }
    }

    /// Price under the given pricing mode.
    pub fn price(&self, mode: PricingMode) -> Option<f64> {
        match mode {
            PricingMode::Mid => self.mid_price(),
            PricingMode::Mark => self.mark_price,
        }
    }
}

// =============================================================================
// Chain Output
// =============================================================================

/// One output row per strike. Missing prices stay `None` so the sink can
/// render "no data" explicitly; they are never defaulted to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainRow {
    pub strike: f64,
    pub call_price: Option<f64>,
    pub put_price: Option<f64>,
}

/// A fully assembled options chain for one underlying at one expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionsChain {
    pub underlying: String,
    /// Settlement time shared by every instrument in this chain
    pub expiry: DateTime<Utc>,
    pub pricing: PricingMode,
    /// Rows in strictly ascending strike order
    pub rows: Vec<ChainRow>,
}

// =============================================================================
// Symbol Parsing
// =============================================================================

/// Option fields recovered from an exchange symbol string.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSymbol {
    pub underlying: String,
    pub option_type: OptionType,
    pub strike: f64,
    pub expiry: NaiveDate,
}

impl ParsedSymbol {
    /// Parse an option symbol.
    ///
    /// Two layouts are accepted, matching the exchange's API versions:
    /// - `C-BTC-128400-290825` (type, underlying, strike, expiry DDMMYY)
    /// - `BTC-29AUG25-128400-C` (underlying, expiry DDMonYY, strike, type)
    pub fn parse(symbol: &str) -> Option<Self> {
        let parts: Vec<&str> = symbol.split('-').collect();
        if parts.len() != 4 {
            return None;
        }

        if let Some(option_type) = type_from_tag(parts[0]) {
            // C-BTC-128400-290825
            let strike = parse_strike(parts[2])?;
            let expiry = NaiveDate::parse_from_str(parts[3], "%d%m%y").ok()?;
            return Some(Self {
                underlying: parts[1].to_string(),
                option_type,
                strike,
                expiry,
            });
        }

        if let Some(option_type) = type_from_tag(parts[3]) {
            // BTC-29AUG25-128400-C
            let strike = parse_strike(parts[2])?;
            let expiry = parse_dmony(parts[1])?;
            return Some(Self {
                underlying: parts[0].to_string(),
                option_type,
                strike,
                expiry,
            });
        }

        None
    }

    /// Settlement timestamp implied by the expiry date.
    ///
    /// The exchange settles daily options at 12:00 UTC; used only when the
    /// catalog record carries no explicit settlement time.
    pub fn settlement_time(&self) -> Option<DateTime<Utc>> {
        self.expiry.and_hms_opt(12, 0, 0).map(|dt| dt.and_utc())
    }
}

fn type_from_tag(tag: &str) -> Option<OptionType> {
    match tag {
        "C" => Some(OptionType::Call),
        "P" => Some(OptionType::Put),
        _ => None,
    }
}

/// Strikes must be finite: "NaN" and "1e999" parse as f64 but are garbage.
fn parse_strike(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a `29AUG25`-style date. chrono's `%b` expects title-case month
/// names, so normalize before parsing.
fn parse_dmony(s: &str) -> Option<NaiveDate> {
    if !s.is_ascii() || s.len() < 6 {
        return None;
    }
    let (day, rest) = s.split_at(s.len() - 5);
    let (mon, year) = rest.split_at(3);
    let mut mon_norm = mon.to_lowercase();
    if let Some(first) = mon_norm.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    let normalized = format!("{}{}{}", day, mon_norm, year);
    NaiveDate::parse_from_str(&normalized, "%d%b%y").ok()
}

// --- Raw Delta Exchange Ticker Types (Used for JSON parsing only) ---
// Numeric fields can arrive as JSON numbers or as decimal strings depending
// on the endpoint version; both are accepted, and unparseable values are
// treated as absent rather than failing the whole response.

#[derive(Debug, Deserialize, Clone)]
pub struct DeltaTickerResponse {
    #[serde(default)]
    pub success: bool,
    pub result: Option<DeltaTickerData>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DeltaTickerData {
    pub symbol: Option<String>,
    #[serde(default, deserialize_with = "de_opt_decimal")]
    pub best_bid_price: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_decimal")]
    pub best_ask_price: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_decimal")]
    pub mark_price: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_decimal")]
    pub spot_price: Option<f64>,
}

impl DeltaTickerData {
    pub fn to_quote(&self) -> Quote {
        Quote {
            best_bid: self.best_bid_price,
            best_ask: self.best_ask_price,
            mark_price: self.mark_price,
        }
    }
}

/// Deserialize an optional decimal that may be a number, a numeric string,
/// or null. Unparseable strings map to `None`.
pub fn de_opt_decimal<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(decimal_from_value))
}

/// Lenient decimal extraction from a JSON value.
pub fn decimal_from_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================
