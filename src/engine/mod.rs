// src/engine/mod.rs
//
// The ChainService orchestrates one refresh cycle per underlying:
// catalog freshness check -> nearest-expiry selection -> concurrent quote
// fetch -> chain assembly. The latest snapshot per underlying is kept for
// the REST API, and every fresh snapshot is broadcast to dashboard clients.

use crate::catalog::{unix_now, DeltaCatalog};
use crate::chain::{build_chain, select_nearest_expiry};
use crate::models::{OptionsChain, PricingMode};
use crate::traits::SharedQuoteSource;
use chrono::Utc;
use log::{error, info};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;

/// Outcome of one refresh cycle for one underlying.
///
/// `NoInstruments` and `CatalogUnavailable` are explicit states the sink
/// must render as such; a snapshot never carries a partially wrong chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    Ok,
    NoInstruments,
    CatalogUnavailable,
    /// No refresh cycle has completed yet (synthesized by the API layer)
    Pending,
}

/// The latest chain (or explicit absence of one) for an underlying.
#[derive(Clone, Debug, Serialize)]
pub struct ChainSnapshot {
    pub underlying: String,
    pub status: ChainStatus,
    pub chain: Option<OptionsChain>,
    pub error: Option<String>,
    /// Unix timestamp (seconds) when this snapshot was produced
    pub updated_at: u64,
}

/// Periodic chain builder for a fixed set of underlyings.
pub struct ChainService {
    catalog: Arc<DeltaCatalog>,
    quotes: SharedQuoteSource,
    underlyings: Vec<String>,
    pricing: PricingMode,
    refresh_interval: Duration,
    snapshots: RwLock<HashMap<String, ChainSnapshot>>,
    update_tx: broadcast::Sender<ChainSnapshot>,
}

impl ChainService {
    pub fn new(
        catalog: Arc<DeltaCatalog>,
        quotes: SharedQuoteSource,
        underlyings: Vec<String>,
        pricing: PricingMode,
        refresh_interval: Duration,
    ) -> Arc<Self> {
        let (update_tx, _) = broadcast::channel(100);
        Arc::new(Self {
            catalog,
            quotes,
            underlyings,
            pricing,
            refresh_interval,
            snapshots: RwLock::new(HashMap::new()),
            update_tx,
        })
    }

    /// Underlyings this service refreshes, in configured order.
    pub fn underlyings(&self) -> &[String] {
        &self.underlyings
    }

    pub fn pricing(&self) -> PricingMode {
        self.pricing
    }

    /// Latest snapshot for an underlying, if a cycle has completed.
    pub fn snapshot(&self, underlying: &str) -> Option<ChainSnapshot> {
        self.snapshots.read().unwrap().get(underlying).cloned()
    }

    /// Subscribe to fresh snapshots (dashboard WebSocket feed).
    pub fn subscribe(&self) -> broadcast::Receiver<ChainSnapshot> {
        self.update_tx.subscribe()
    }

    /// Run one refresh cycle for a single underlying and publish the result.
    pub async fn refresh_underlying(&self, underlying: &str) -> ChainSnapshot {
        let snapshot = self.build_snapshot(underlying).await;

        self.snapshots
            .write()
            .unwrap()
            .insert(underlying.to_string(), snapshot.clone());
        // Ignore send errors (no receivers)
        let _ = self.update_tx.send(snapshot.clone());

        snapshot
    }

    async fn build_snapshot(&self, underlying: &str) -> ChainSnapshot {
        if let Err(e) = self.catalog.ensure_fresh().await {
            error!("ChainService: catalog unavailable: {}", e);
            return ChainSnapshot {
                underlying: underlying.to_string(),
                status: ChainStatus::CatalogUnavailable,
                chain: None,
                error: Some(e.to_string()),
                updated_at: unix_now(),
            };
        }

        let catalog = self.catalog.options_for(underlying);
        let nearest = select_nearest_expiry(&catalog, underlying, Utc::now());
        if nearest.is_empty() {
            info!("ChainService: no live options for {}", underlying);
            return ChainSnapshot {
                underlying: underlying.to_string(),
                status: ChainStatus::NoInstruments,
                chain: None,
                error: None,
                updated_at: unix_now(),
            };
        }

        // build_chain only returns None on an empty set, checked above
        let chain = build_chain(&nearest, self.quotes.as_ref(), self.pricing).await;

        ChainSnapshot {
            underlying: underlying.to_string(),
            status: ChainStatus::Ok,
            chain,
            error: None,
            updated_at: unix_now(),
        }
    }

    /// Refresh every configured underlying once.
    pub async fn refresh_all(&self) {
        for underlying in &self.underlyings {
            let snapshot = self.refresh_underlying(underlying).await;
            info!(
                "ChainService: {} -> {:?} ({} rows)",
                underlying,
                snapshot.status,
                snapshot.chain.as_ref().map(|c| c.rows.len()).unwrap_or(0)
            );
        }
    }

    /// Run the periodic refresh loop. Never returns.
    pub async fn run(self: Arc<Self>) {
        info!(
            "ChainService: refreshing {:?} every {:?}",
            self.underlyings, self.refresh_interval
        );
        let mut interval = tokio::time::interval(self.refresh_interval);
        loop {
            interval.tick().await;
            self.refresh_all().await;
        }
    }
}
