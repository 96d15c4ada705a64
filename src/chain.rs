// src/chain.rs
//
// Options chain assembly: nearest-expiry selection, per-strike call/put
// pairing, and the concurrent quote fan-out feeding both. Everything here is
// a pure function of its inputs apart from invoking the quote source.

use crate::models::{ChainRow, OptionInstrument, OptionType, OptionsChain, PricingMode, Quote};
use crate::traits::QuoteSource;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::warn;
use std::collections::HashMap;

/// Select the instruments at the nearest future expiry for an underlying.
///
/// Past-expiry contracts are always excluded (`settlement_time > now`,
/// strictly). Several instruments normally share the nearest settlement
/// time; all of them are returned. An empty catalog, or one with no future
/// contracts for this underlying, yields an empty vec.
pub fn select_nearest_expiry(
    catalog: &[OptionInstrument],
    underlying: &str,
    now: DateTime<Utc>,
) -> Vec<OptionInstrument> {
    let live: Vec<&OptionInstrument> = catalog
        .iter()
        .filter(|i| i.underlying == underlying && i.settlement_time > now)
        .collect();

    let nearest = match live.iter().map(|i| i.settlement_time).min() {
        Some(t) => t,
        None => return Vec::new(),
    };

    live.into_iter()
        .filter(|i| i.settlement_time == nearest)
        .cloned()
        .collect()
}

/// Build the chain for one nearest-expiry instrument set.
///
/// Quotes are fetched concurrently, one per instrument; a failed fetch
/// degrades to an empty quote for that instrument only. Row assembly waits
/// for the full fan-out, since the strike union needs every instrument's
/// quote resolved. Returns `None` when `instruments` is empty so the caller
/// can render an explicit "no options" state.
pub async fn build_chain(
    instruments: &[OptionInstrument],
    quotes: &dyn QuoteSource,
    mode: PricingMode,
) -> Option<OptionsChain> {
    let first = instruments.first()?;
    let underlying = first.underlying.clone();
    let expiry = instruments
        .iter()
        .map(|i| i.settlement_time)
        .min()
        .unwrap_or(first.settlement_time);

    let fetches = instruments.iter().map(|inst| async move {
        match quotes.quote(inst).await {
            Ok(quote) => (inst.symbol.clone(), quote),
            Err(e) => {
                warn!("chain: quote unavailable for {}: {}", inst.symbol, e);
                (inst.symbol.clone(), Quote::default())
            }
        }
    });
    let fetched: HashMap<String, Quote> = join_all(fetches).await.into_iter().collect();

    Some(OptionsChain {
        underlying,
        expiry,
        pricing: mode,
        rows: assemble_rows(instruments, &fetched, mode),
    })
}

/// Pair calls and puts by strike and price each side.
///
/// The strike set is the union of call and put strikes: a strike with only
/// one side still gets a row, the other side left undefined. Rows come out
/// in ascending strike order. If malformed catalog data produces two
/// instruments of the same type at one strike, the first in iteration order
/// wins and the duplicate is logged.
pub fn assemble_rows(
    instruments: &[OptionInstrument],
    quotes: &HashMap<String, Quote>,
    mode: PricingMode,
) -> Vec<ChainRow> {
    // f64 strikes come from a single parse, so bit-equality keys are sound.
    let mut calls: HashMap<u64, &OptionInstrument> = HashMap::new();
    let mut puts: HashMap<u64, &OptionInstrument> = HashMap::new();

    for inst in instruments {
        let side = match inst.option_type {
            OptionType::Call => &mut calls,
            OptionType::Put => &mut puts,
        };
        if let Some(existing) = side.get(&inst.strike.to_bits()) {
            warn!(
                "chain: duplicate {} at strike {} ({} kept, {} ignored)",
                inst.option_type, inst.strike, existing.symbol, inst.symbol
            );
            continue;
        }
        side.insert(inst.strike.to_bits(), inst);
    }

    let mut strikes: Vec<f64> = calls
        .keys()
        .chain(puts.keys())
        .map(|bits| f64::from_bits(*bits))
        .collect();
    strikes.sort_by(|a, b| a.total_cmp(b));
    strikes.dedup();

    strikes
        .into_iter()
        .map(|strike| {
            let price_of = |side: &HashMap<u64, &OptionInstrument>| {
                side.get(&strike.to_bits())
                    .and_then(|inst| quotes.get(&inst.symbol))
                    .and_then(|quote| quote.price(mode))
            };
            ChainRow {
                strike,
                call_price: price_of(&calls),
                put_price: price_of(&puts),
            }
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::QuoteError;
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn settlement(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn instrument(
        symbol: &str,
        option_type: OptionType,
        strike: f64,
        settlement_time: &str,
    ) -> OptionInstrument {
        OptionInstrument {
            symbol: symbol.to_string(),
            product_id: 0,
            underlying: "BTC".to_string(),
            option_type,
            strike,
            settlement_time: settlement(settlement_time),
        }
    }

    /// Quote source backed by a fixed map; unknown symbols error.
    struct MapQuotes(HashMap<String, Quote>);

    #[async_trait]
    impl QuoteSource for MapQuotes {
        async fn quote(&self, inst: &OptionInstrument) -> Result<Quote, QuoteError> {
            self.0
                .get(&inst.symbol)
                .copied()
                .ok_or_else(|| QuoteError::MissingResult(inst.symbol.clone()))
        }
    }

    fn quote(bid: Option<f64>, ask: Option<f64>) -> Quote {
        Quote {
            best_bid: bid,
            best_ask: ask,
            mark_price: None,
        }
    }

    #[test]
    fn test_nearest_expiry_keeps_all_ties() {
        // Settlement times [T2, T1, T1, T3] with T1 < T2 < T3
        let catalog = vec![
            instrument("C-BTC-100-B", OptionType::Call, 100.0, "2025-09-05T12:00:00Z"),
            instrument("C-BTC-100-A", OptionType::Call, 100.0, "2025-08-30T12:00:00Z"),
            instrument("P-BTC-100-A", OptionType::Put, 100.0, "2025-08-30T12:00:00Z"),
            instrument("C-BTC-100-C", OptionType::Call, 100.0, "2025-09-26T12:00:00Z"),
        ];
        let now = Utc.with_ymd_and_hms(2025, 8, 6, 0, 0, 0).unwrap();

        let selected = select_nearest_expiry(&catalog, "BTC", now);
        assert_eq!(selected.len(), 2);
        assert!(selected.iter().all(|i| i.settlement_time
            == settlement("2025-08-30T12:00:00Z")));
    }

    #[test]
    fn test_nearest_expiry_excludes_past_contracts() {
        let catalog = vec![
            instrument("C-BTC-100-OLD", OptionType::Call, 100.0, "2025-08-01T12:00:00Z"),
            instrument("C-BTC-100-NEW", OptionType::Call, 100.0, "2025-08-30T12:00:00Z"),
        ];
        let now = Utc.with_ymd_and_hms(2025, 8, 6, 0, 0, 0).unwrap();

        let selected = select_nearest_expiry(&catalog, "BTC", now);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].symbol, "C-BTC-100-NEW");
    }

    #[test]
    fn test_nearest_expiry_filters_underlying() {
        let mut eth = instrument("C-ETH-50-A", OptionType::Call, 50.0, "2025-08-20T12:00:00Z");
        eth.underlying = "ETH".to_string();
        let catalog = vec![
            eth,
            instrument("C-BTC-100-A", OptionType::Call, 100.0, "2025-08-30T12:00:00Z"),
        ];
        let now = Utc.with_ymd_and_hms(2025, 8, 6, 0, 0, 0).unwrap();

        let selected = select_nearest_expiry(&catalog, "BTC", now);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].underlying, "BTC");
    }

    #[test]
    fn test_nearest_expiry_empty_catalog() {
        let now = Utc.with_ymd_and_hms(2025, 8, 6, 0, 0, 0).unwrap();
        assert!(select_nearest_expiry(&[], "BTC", now).is_empty());
    }

    #[tokio::test]
    async fn test_chain_call_and_put_at_one_strike() {
        // Scenario: one call + one put at 100000, both fully quoted
        let instruments = vec![
            instrument("C-BTC-100000-300825", OptionType::Call, 100000.0, "2025-08-30T12:00:00Z"),
            instrument("P-BTC-100000-300825", OptionType::Put, 100000.0, "2025-08-30T12:00:00Z"),
        ];
        let quotes = MapQuotes(HashMap::from([
            ("C-BTC-100000-300825".to_string(), quote(Some(10.0), Some(12.0))),
            ("P-BTC-100000-300825".to_string(), quote(Some(8.0), Some(10.0))),
        ]));

        let chain = build_chain(&instruments, &quotes, PricingMode::Mid)
            .await
            .unwrap();
        assert_eq!(chain.rows.len(), 1);
        assert_eq!(chain.rows[0].strike, 100000.0);
        assert_eq!(chain.rows[0].call_price, Some(11.0));
        assert_eq!(chain.rows[0].put_price, Some(9.0));
        assert_eq!(chain.expiry, settlement("2025-08-30T12:00:00Z"));
    }

    #[tokio::test]
    async fn test_chain_one_sided_book_leaves_price_undefined() {
        // Scenario: the put has no resting bid, so its mid is undefined
        let instruments = vec![
            instrument("C-BTC-100000-300825", OptionType::Call, 100000.0, "2025-08-30T12:00:00Z"),
            instrument("P-BTC-100000-300825", OptionType::Put, 100000.0, "2025-08-30T12:00:00Z"),
        ];
        let quotes = MapQuotes(HashMap::from([
            ("C-BTC-100000-300825".to_string(), quote(Some(10.0), Some(12.0))),
            ("P-BTC-100000-300825".to_string(), quote(None, Some(10.0))),
        ]));

        let chain = build_chain(&instruments, &quotes, PricingMode::Mid)
            .await
            .unwrap();
        assert_eq!(chain.rows.len(), 1);
        assert_eq!(chain.rows[0].call_price, Some(11.0));
        assert_eq!(chain.rows[0].put_price, None);
    }

    #[tokio::test]
    async fn test_chain_strike_union_keeps_unpaired_call() {
        // Scenario: a call with no matching put still gets its row
        let instruments = vec![instrument(
            "C-BTC-100000-300825",
            OptionType::Call,
            100000.0,
            "2025-08-30T12:00:00Z",
        )];
        let quotes = MapQuotes(HashMap::from([(
            "C-BTC-100000-300825".to_string(),
            quote(Some(10.0), Some(12.0)),
        )]));

        let chain = build_chain(&instruments, &quotes, PricingMode::Mid)
            .await
            .unwrap();
        assert_eq!(chain.rows.len(), 1);
        assert_eq!(chain.rows[0].call_price, Some(11.0));
        assert_eq!(chain.rows[0].put_price, None);
    }

    #[tokio::test]
    async fn test_chain_empty_instrument_set() {
        let quotes = MapQuotes(HashMap::new());
        assert!(build_chain(&[], &quotes, PricingMode::Mid).await.is_none());
    }

    #[tokio::test]
    async fn test_chain_failed_quote_degrades_to_undefined() {
        // Put symbol missing from the source: its fetch errors, row survives
        let instruments = vec![
            instrument("C-BTC-100000-300825", OptionType::Call, 100000.0, "2025-08-30T12:00:00Z"),
            instrument("P-BTC-100000-300825", OptionType::Put, 100000.0, "2025-08-30T12:00:00Z"),
        ];
        let quotes = MapQuotes(HashMap::from([(
            "C-BTC-100000-300825".to_string(),
            quote(Some(10.0), Some(12.0)),
        )]));

        let chain = build_chain(&instruments, &quotes, PricingMode::Mid)
            .await
            .unwrap();
        assert_eq!(chain.rows.len(), 1);
        assert_eq!(chain.rows[0].call_price, Some(11.0));
        assert_eq!(chain.rows[0].put_price, None);
    }

    #[tokio::test]
    async fn test_chain_mark_pricing_mode() {
        let instruments = vec![instrument(
            "C-BTC-100000-300825",
            OptionType::Call,
            100000.0,
            "2025-08-30T12:00:00Z",
        )];
        let quotes = MapQuotes(HashMap::from([(
            "C-BTC-100000-300825".to_string(),
            Quote {
                best_bid: Some(10.0),
                best_ask: Some(12.0),
                mark_price: Some(11.4),
            },
        )]));

        let chain = build_chain(&instruments, &quotes, PricingMode::Mark)
            .await
            .unwrap();
        assert_eq!(chain.rows[0].call_price, Some(11.4));
    }

    #[test]
    fn test_rows_are_ascending_and_strikes_are_the_union() {
        let instruments = vec![
            instrument("C-BTC-110000", OptionType::Call, 110000.0, "2025-08-30T12:00:00Z"),
            instrument("P-BTC-90000", OptionType::Put, 90000.0, "2025-08-30T12:00:00Z"),
            instrument("C-BTC-100000", OptionType::Call, 100000.0, "2025-08-30T12:00:00Z"),
            instrument("P-BTC-100000", OptionType::Put, 100000.0, "2025-08-30T12:00:00Z"),
        ];
        let rows = assemble_rows(&instruments, &HashMap::new(), PricingMode::Mid);

        let strikes: Vec<f64> = rows.iter().map(|r| r.strike).collect();
        assert_eq!(strikes, vec![90000.0, 100000.0, 110000.0]);
    }

    #[test]
    fn test_duplicate_same_type_strike_first_wins() {
        let instruments = vec![
            instrument("C-BTC-100000-a", OptionType::Call, 100000.0, "2025-08-30T12:00:00Z"),
            instrument("C-BTC-100000-b", OptionType::Call, 100000.0, "2025-08-30T12:00:00Z"),
        ];
        let quotes = HashMap::from([
            ("C-BTC-100000-a".to_string(), quote(Some(1.0), Some(3.0))),
            ("C-BTC-100000-b".to_string(), quote(Some(100.0), Some(102.0))),
        ]);

        let rows = assemble_rows(&instruments, &quotes, PricingMode::Mid);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].call_price, Some(2.0));
    }

    #[tokio::test]
    async fn test_build_chain_is_pure() {
        let instruments = vec![
            instrument("C-BTC-100000-300825", OptionType::Call, 100000.0, "2025-08-30T12:00:00Z"),
            instrument("P-BTC-100000-300825", OptionType::Put, 100000.0, "2025-08-30T12:00:00Z"),
        ];
        let quotes = MapQuotes(HashMap::from([
            ("C-BTC-100000-300825".to_string(), quote(Some(10.0), Some(12.0))),
            ("P-BTC-100000-300825".to_string(), quote(Some(8.0), Some(10.0))),
        ]));

        let first = build_chain(&instruments, &quotes, PricingMode::Mid).await;
        let second = build_chain(&instruments, &quotes, PricingMode::Mid).await;
        assert_eq!(first, second);
    }
}
