// src/catalog/delta.rs
//
// Delta Exchange option-product catalog.
// Fetches and caches product metadata from the public /v2/products endpoint.
// Products only add/remove (they don't change after listing, they just expire).

use super::{format_timestamp, is_stale, unix_now, AutoRefreshGuard, DEFAULT_STALE_THRESHOLD_SECS};
use crate::errors::CatalogError;
use crate::models::{decimal_from_value, OptionInstrument, OptionType, ParsedSymbol};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

const DEFAULT_CACHE_PATH: &str = "delta_products.jsonl";

/// Static flag to prevent multiple concurrent auto-refreshes.
static AUTO_REFRESH_IN_PROGRESS: AtomicBool = AtomicBool::new(false);

/// Cache file entry: one snapshot per line (newest first, older lines are
/// ignored on load).
#[derive(Debug, Serialize, Deserialize)]
struct CacheSnapshot {
    timestamp: u64,
    items: Vec<OptionInstrument>,
}

/// Response from the /v2/products endpoint.
#[derive(Debug, Deserialize)]
struct GetProductsResponse {
    #[serde(default)]
    success: bool,
    result: Option<Vec<DeltaApiProduct>>,
}

/// Raw product record. Every field is optional at the wire level; the
/// normalizer decides what is recoverable.
#[derive(Debug, Deserialize)]
struct DeltaApiProduct {
    id: Option<u64>,
    symbol: Option<String>,
    contract_type: Option<String>,
    #[serde(default)]
    strike_price: Option<serde_json::Value>,
    settlement_time: Option<String>,
    underlying_asset: Option<DeltaApiAsset>,
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeltaApiAsset {
    symbol: Option<String>,
}

/// Internal state for the catalog.
#[derive(Default)]
struct CatalogState {
    instruments: HashMap<String, OptionInstrument>,
    last_updated: u64,
    /// Products dropped during the last refresh for missing/unparseable fields
    malformed: usize,
}

/// Delta Exchange option-product catalog.
///
/// Holds the normalized instrument set behind an `RwLock`, persists a
/// snapshot to a JSONL cache file, and refreshes itself from the exchange
/// when the snapshot goes stale.
pub struct DeltaCatalog {
    inner: RwLock<CatalogState>,
    base_url: String,
    cache_path: String,
    http_client: reqwest::Client,
    stale_threshold_secs: u64,
}

impl DeltaCatalog {
    /// Create a new catalog against the given API base URL.
    ///
    /// Loads the disk cache if present; if the cache is stale, spawns a
    /// background refresh task.
    pub fn new(
        base_url: impl Into<String>,
        cache_path: Option<&str>,
        stale_threshold_secs: Option<u64>,
    ) -> Arc<Self> {
        let cache_path = cache_path.unwrap_or(DEFAULT_CACHE_PATH).to_string();
        let stale_threshold_secs = stale_threshold_secs.unwrap_or(DEFAULT_STALE_THRESHOLD_SECS);
        let state = Self::load_from_disk(&cache_path).unwrap_or_default();

        let loaded_count = state.instruments.len();
        let last_updated = state.last_updated;

        let catalog = Arc::new(Self {
            inner: RwLock::new(state),
            base_url: base_url.into(),
            cache_path,
            http_client: reqwest::Client::new(),
            stale_threshold_secs,
        });

        if loaded_count > 0 {
            info!(
                "DeltaCatalog: Loaded {} instruments from cache (updated {})",
                loaded_count,
                format_timestamp(last_updated)
            );
        }

        if is_stale(last_updated, catalog.stale_threshold_secs) {
            if AUTO_REFRESH_IN_PROGRESS
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                info!("DeltaCatalog: Cache is stale, spawning background refresh...");
                let catalog_clone = catalog.clone();
                tokio::spawn(async move {
                    // Guard ensures flag is reset even if this task panics
                    let _guard = AutoRefreshGuard::new(&AUTO_REFRESH_IN_PROGRESS);
                    match catalog_clone.refresh().await {
                        Ok(count) => {
                            info!("DeltaCatalog: Background refresh complete, {} products", count)
                        }
                        Err(e) => error!("DeltaCatalog: Background refresh failed: {}", e),
                    }
                });
            } else {
                info!("DeltaCatalog: Cache is stale, but refresh already in progress");
            }
        }

        catalog
    }

    /// Create an empty catalog (no cache load, no auto-refresh).
    pub fn new_empty(base_url: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(CatalogState::default()),
            base_url: base_url.into(),
            cache_path: DEFAULT_CACHE_PATH.to_string(),
            http_client: reqwest::Client::new(),
            stale_threshold_secs: DEFAULT_STALE_THRESHOLD_SECS,
        })
    }

    /// Check if the catalog cache is stale.
    pub fn is_stale(&self) -> bool {
        let state = self.inner.read().unwrap();
        is_stale(state.last_updated, self.stale_threshold_secs)
    }

    /// Refresh from the exchange only when the current state is stale.
    ///
    /// A refresh failure is escalated: the caller gets `CatalogUnavailable`
    /// semantics instead of silently serving an expired snapshot.
    pub async fn ensure_fresh(&self) -> Result<(), CatalogError> {
        if self.is_stale() {
            self.refresh().await?;
        }
        Ok(())
    }

    fn load_from_disk(path: &str) -> Option<CatalogState> {
        let file = File::open(path).ok()?;
        let reader = BufReader::new(file);
        let first_line = reader.lines().next()?.ok()?;
        let snapshot: CacheSnapshot = serde_json::from_str(&first_line).ok()?;

        let instruments: HashMap<String, OptionInstrument> = snapshot
            .items
            .into_iter()
            .map(|i| (i.symbol.clone(), i))
            .collect();

        Some(CatalogState {
            instruments,
            last_updated: snapshot.timestamp,
            malformed: 0,
        })
    }

    fn save_to_disk(&self) -> Result<(), CatalogError> {
        let state = self.inner.read().unwrap();
        let snapshot = CacheSnapshot {
            timestamp: state.last_updated,
            items: state.instruments.values().cloned().collect(),
        };

        let mut file = File::create(&self.cache_path)?;
        let line = serde_json::to_string(&snapshot)
            .map_err(|e| CatalogError::Malformed(format!("cache serialization: {}", e)))?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    /// Fetch the live option products and replace the catalog state.
    ///
    /// Returns the number of instruments now in the catalog. Malformed
    /// products are dropped and counted, never fatal.
    pub async fn refresh(&self) -> Result<usize, CatalogError> {
        let url = format!(
            "{}/v2/products?contract_types=call_options,put_options&states=live&page_size=1000",
            self.base_url
        );

        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(CatalogError::Status(response.status()));
        }

        let body: GetProductsResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Malformed(format!("products decode: {}", e)))?;

        let products = match body.result {
            Some(products) if body.success => products,
            _ => {
                return Err(CatalogError::Malformed(
                    "products response missing result".to_string(),
                ))
            }
        };

        let total = products.len();
        let mut instruments = HashMap::new();
        let mut malformed = 0usize;
        for product in products {
            match normalize_product(product) {
                Some(inst) => {
                    instruments.insert(inst.symbol.clone(), inst);
                }
                None => malformed += 1,
            }
        }

        if malformed > 0 {
            warn!(
                "DeltaCatalog: Dropped {} of {} products (unresolvable type/strike/settlement)",
                malformed, total
            );
        }

        let count = instruments.len();
        {
            let mut state = self.inner.write().unwrap();
            state.instruments = instruments;
            state.last_updated = unix_now();
            state.malformed = malformed;
        }

        info!("DeltaCatalog: Fetched {} option products", count);

        if let Err(e) = self.save_to_disk() {
            error!("DeltaCatalog: Failed to save cache: {}", e);
        }

        Ok(count)
    }

    /// All instruments for an underlying, in no particular order.
    pub fn options_for(&self, underlying: &str) -> Vec<OptionInstrument> {
        let state = self.inner.read().unwrap();
        state
            .instruments
            .values()
            .filter(|i| i.underlying == underlying)
            .cloned()
            .collect()
    }

    /// Every instrument currently in the catalog.
    pub fn all(&self) -> Vec<OptionInstrument> {
        let state = self.inner.read().unwrap();
        state.instruments.values().cloned().collect()
    }

    /// Get instrument by symbol.
    pub fn get(&self, symbol: &str) -> Option<OptionInstrument> {
        let state = self.inner.read().unwrap();
        state.instruments.get(symbol).cloned()
    }

    /// Unix timestamp of the last successful refresh.
    pub fn last_updated(&self) -> u64 {
        self.inner.read().unwrap().last_updated
    }

    /// Count of products dropped during the last refresh.
    pub fn malformed_count(&self) -> usize {
        self.inner.read().unwrap().malformed
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().instruments.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn insert_for_test(&self, inst: OptionInstrument) {
        let mut state = self.inner.write().unwrap();
        state.instruments.insert(inst.symbol.clone(), inst);
        state.last_updated = unix_now();
    }
}

/// Normalize a raw product into an `OptionInstrument`.
///
/// Structured fields win; the symbol parse fills whatever they leave open.
/// Returns `None` when option type, strike, underlying, or settlement time
/// cannot be resolved from either source.
fn normalize_product(product: DeltaApiProduct) -> Option<OptionInstrument> {
    let symbol = product.symbol?;
    if matches!(product.state.as_deref(), Some(s) if s != "live") {
        return None;
    }

    let parsed = ParsedSymbol::parse(&symbol);

    let option_type = match product.contract_type.as_deref() {
        Some("call_options") => Some(OptionType::Call),
        Some("put_options") => Some(OptionType::Put),
        _ => None,
    }
    .or_else(|| parsed.as_ref().map(|p| p.option_type))?;

    let strike = product
        .strike_price
        .as_ref()
        .and_then(decimal_from_value)
        .filter(|v| v.is_finite())
        .or_else(|| parsed.as_ref().map(|p| p.strike))?;

    let underlying = product
        .underlying_asset
        .and_then(|a| a.symbol)
        .or_else(|| parsed.as_ref().map(|p| p.underlying.clone()))?;

    let settlement_time = product
        .settlement_time
        .as_deref()
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .or_else(|| parsed.as_ref().and_then(|p| p.settlement_time()))?;

    Some(OptionInstrument {
        symbol,
        product_id: product.id.unwrap_or_default(),
        underlying,
        option_type,
        strike,
        settlement_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::io::Write as _;

    fn raw_product(json: &str) -> DeltaApiProduct {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_normalize_structured_fields() {
        let product = raw_product(
            r#"{
                "id": 12345,
                "symbol": "C-BTC-128400-290825",
                "contract_type": "call_options",
                "strike_price": "128400",
                "settlement_time": "2025-08-29T12:00:00Z",
                "underlying_asset": { "symbol": "BTC" },
                "state": "live"
            }"#,
        );

        let inst = normalize_product(product).unwrap();
        assert_eq!(inst.product_id, 12345);
        assert_eq!(inst.underlying, "BTC");
        assert_eq!(inst.option_type, OptionType::Call);
        assert_eq!(inst.strike, 128400.0);
        assert_eq!(
            inst.settlement_time,
            Utc.with_ymd_and_hms(2025, 8, 29, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_normalize_falls_back_to_symbol_parse() {
        // No structured type/strike/settlement: everything from the symbol
        let product = raw_product(
            r#"{ "id": 7, "symbol": "P-BTC-116400-160825", "state": "live" }"#,
        );

        let inst = normalize_product(product).unwrap();
        assert_eq!(inst.option_type, OptionType::Put);
        assert_eq!(inst.strike, 116400.0);
        assert_eq!(inst.underlying, "BTC");
        assert_eq!(
            inst.settlement_time,
            Utc.with_ymd_and_hms(2025, 8, 16, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_normalize_drops_unresolvable_product() {
        // Unparseable symbol and no structured fields
        let product = raw_product(r#"{ "id": 9, "symbol": "BTCUSD", "state": "live" }"#);
        assert!(normalize_product(product).is_none());

        // Bad settlement string and no date in the symbol
        let product = raw_product(
            r#"{
                "id": 10,
                "symbol": "BTCUSD",
                "contract_type": "call_options",
                "strike_price": 100,
                "settlement_time": "soon",
                "underlying_asset": { "symbol": "BTC" }
            }"#,
        );
        assert!(normalize_product(product).is_none());
    }

    #[test]
    fn test_normalize_skips_non_live_state() {
        let product = raw_product(
            r#"{ "id": 11, "symbol": "C-BTC-128400-290825", "state": "expired" }"#,
        );
        assert!(normalize_product(product).is_none());
    }

    #[test]
    fn test_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("products.jsonl");
        let cache_str = cache_path.to_str().unwrap();

        let inst = OptionInstrument {
            symbol: "C-BTC-128400-290825".to_string(),
            product_id: 1,
            underlying: "BTC".to_string(),
            option_type: OptionType::Call,
            strike: 128400.0,
            settlement_time: Utc.with_ymd_and_hms(2025, 8, 29, 12, 0, 0).unwrap(),
        };

        let snapshot = CacheSnapshot {
            timestamp: unix_now(),
            items: vec![inst.clone()],
        };
        let mut file = File::create(&cache_path).unwrap();
        writeln!(file, "{}", serde_json::to_string(&snapshot).unwrap()).unwrap();

        let state = DeltaCatalog::load_from_disk(cache_str).unwrap();
        assert_eq!(state.instruments.len(), 1);
        assert_eq!(
            state.instruments.get("C-BTC-128400-290825"),
            Some(&inst)
        );
    }

    #[test]
    fn test_options_for_filters_underlying() {
        let catalog = DeltaCatalog::new_empty("https://example.invalid");
        catalog.insert_for_test(OptionInstrument {
            symbol: "C-BTC-100000-290825".to_string(),
            product_id: 1,
            underlying: "BTC".to_string(),
            option_type: OptionType::Call,
            strike: 100000.0,
            settlement_time: Utc.with_ymd_and_hms(2025, 8, 29, 12, 0, 0).unwrap(),
        });
        catalog.insert_for_test(OptionInstrument {
            symbol: "C-ETH-4000-290825".to_string(),
            product_id: 2,
            underlying: "ETH".to_string(),
            option_type: OptionType::Call,
            strike: 4000.0,
            settlement_time: Utc.with_ymd_and_hms(2025, 8, 29, 12, 0, 0).unwrap(),
        });

        let btc = catalog.options_for("BTC");
        assert_eq!(btc.len(), 1);
        assert_eq!(btc[0].underlying, "BTC");
        assert_eq!(catalog.len(), 2);
    }
}
