// src/main.rs
//
// Options-chain dashboard for Delta Exchange.
// Fetches the option catalog and per-symbol quotes, builds the
// nearest-expiry chain per underlying, and serves it in the browser.

use chainboard::catalog::DeltaCatalog;
use chainboard::config::{default_config_template, Config};
use chainboard::connectors::DeltaQuoteClient;
use chainboard::dashboard::DashboardServer;
use chainboard::engine::{ChainService, ChainSnapshot, ChainStatus};
use chainboard::models::PricingMode;
use clap::Parser;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "chainboard")]
#[command(about = "Options-chain dashboard for Delta Exchange")]
struct Args {
    /// Mode of operation: serve (dashboard) or snapshot (print once)
    #[arg(long, default_value = "serve")]
    mode: String,

    /// Path to configuration file (TOML)
    #[arg(long, short)]
    config: Option<String>,

    /// Comma-separated underlyings, overriding the config (e.g. "BTC,ETH")
    #[arg(long)]
    underlying: Option<String>,

    /// Pricing mode override: mid or mark
    #[arg(long)]
    pricing: Option<String>,

    /// Dashboard port, overriding the config
    #[arg(long)]
    port: Option<u16>,

    /// Generate a default configuration file
    #[arg(long)]
    generate_config: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Handle config generation before anything else
    if args.generate_config {
        println!("{}", default_config_template());
        return;
    }

    let config = match &args.config {
        Some(path) => match Config::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                eprintln!("Use --generate-config to create a template.");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    init_logging(&config);

    match args.mode.as_str() {
        "serve" => run_serve_mode(&args, &config).await,
        "snapshot" => run_snapshot_mode(&args, &config).await,
        _ => {
            eprintln!("Unknown mode: {}. Use: serve or snapshot", args.mode);
            std::process::exit(1);
        }
    }
}

fn init_logging(config: &Config) {
    let default_level = config.global.log_level.as_deref().unwrap_or("info");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn build_service(args: &Args, config: &Config) -> Arc<ChainService> {
    let underlyings = match &args.underlying {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect(),
        None => config.underlyings(),
    };

    let pricing = match args.pricing.as_deref() {
        Some("mid") => PricingMode::Mid,
        Some("mark") => PricingMode::Mark,
        Some(other) => {
            eprintln!("Unknown pricing mode: {}. Use: mid or mark", other);
            std::process::exit(1);
        }
        None => config.pricing_mode(),
    };

    let catalog = DeltaCatalog::new(
        config.base_url(),
        config.exchange.catalog_cache_path.as_deref(),
        config.exchange.catalog_stale_secs,
    );
    let quotes = DeltaQuoteClient::new(config.base_url(), Some(config.quote_timeout())).shared();

    ChainService::new(
        catalog,
        quotes,
        underlyings,
        pricing,
        config.refresh_interval(),
    )
}

// =============================================================================
// Serve Mode: Refresh loop + web dashboard
// =============================================================================

async fn run_serve_mode(args: &Args, config: &Config) {
    let service = build_service(args, config);
    println!(
        "Serving chains for {:?} ({} pricing)",
        service.underlyings(),
        service.pricing()
    );

    let refresher = service.clone();
    tokio::spawn(async move {
        refresher.run().await;
    });

    let port = args.port.or(config.global.dashboard_port).unwrap_or(8080);
    println!("Dashboard available at http://localhost:{}", port);

    let dashboard = DashboardServer::new(service, port);
    tokio::select! {
        result = dashboard.run() => {
            if let Err(e) = result {
                eprintln!("Dashboard server error: {}", e);
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }
}

// =============================================================================
// Snapshot Mode: Build each chain once and print it
// =============================================================================

async fn run_snapshot_mode(args: &Args, config: &Config) {
    let service = build_service(args, config);

    for underlying in service.underlyings().to_vec() {
        let snapshot = service.refresh_underlying(&underlying).await;
        print_snapshot(&snapshot);
    }
}

fn print_snapshot(snapshot: &ChainSnapshot) {
    match snapshot.status {
        ChainStatus::CatalogUnavailable => {
            println!(
                "\n{}: exchange unavailable ({})",
                snapshot.underlying,
                snapshot.error.as_deref().unwrap_or("unknown error")
            );
        }
        ChainStatus::NoInstruments => {
            println!("\n{}: no live option contracts found", snapshot.underlying);
        }
        ChainStatus::Ok | ChainStatus::Pending => {
            let chain = match &snapshot.chain {
                Some(chain) => chain,
                None => {
                    println!("\n{}: no chain available", snapshot.underlying);
                    return;
                }
            };

            println!(
                "\n## {} options, expiry {} ({} price)",
                chain.underlying,
                chain.expiry.format("%Y-%m-%d %H:%M UTC"),
                chain.pricing
            );
            println!("{:>12} | {:>12} | {:>12}", "Call", "Strike", "Put");
            println!("{:->13}|{:->14}|{:->13}", "", "", "");
            for row in &chain.rows {
                println!(
                    "{:>12} | {:>12} | {:>12}",
                    format_price(row.call_price),
                    row.strike,
                    format_price(row.put_price)
                );
            }
        }
    }
}

/// Missing prices print as a dash, never as zero.
fn format_price(price: Option<f64>) -> String {
    match price {
        Some(p) => format!("{:.2}", p),
        None => "-".to_string(),
    }
}
