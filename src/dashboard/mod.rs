// src/dashboard/mod.rs

//! Dashboard server for the options-chain table.
//!
//! Provides a web server that:
//! - Serves a single-page frontend with a tab per underlying
//! - Exposes REST endpoints for the latest chain snapshots
//! - Pushes fresh snapshots to WebSocket clients as refresh cycles complete

use crate::engine::{ChainService, ChainSnapshot, ChainStatus};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::{error, info};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

/// The dashboard server. Wraps the chain service and a listen port.
pub struct DashboardServer {
    service: Arc<ChainService>,
    port: u16,
}

impl DashboardServer {
    pub fn new(service: Arc<ChainService>, port: u16) -> Self {
        Self { service, port }
    }

    /// Starts the dashboard web server.
    /// This method runs until the server is shut down.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let app = Router::new()
            .route("/", get(serve_frontend))
            .route("/api/underlyings", get(list_underlyings))
            .route("/api/chain/{underlying}", get(get_chain))
            .route("/ws", get(websocket_handler))
            .layer(cors)
            .with_state(self.service);

        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Dashboard server starting on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

/// GET / - Serves the main dashboard frontend
async fn serve_frontend() -> Html<&'static str> {
    Html(FRONTEND_HTML)
}

/// Underlying info returned by the API
#[derive(Serialize)]
struct UnderlyingInfo {
    name: String,
    status: ChainStatus,
    updated_at: Option<u64>,
}

/// GET /api/underlyings - Lists configured underlyings and their state
async fn list_underlyings(State(service): State<Arc<ChainService>>) -> Json<Vec<UnderlyingInfo>> {
    let underlyings = service
        .underlyings()
        .iter()
        .map(|name| match service.snapshot(name) {
            Some(snapshot) => UnderlyingInfo {
                name: name.clone(),
                status: snapshot.status,
                updated_at: Some(snapshot.updated_at),
            },
            None => UnderlyingInfo {
                name: name.clone(),
                status: ChainStatus::Pending,
                updated_at: None,
            },
        })
        .collect();

    Json(underlyings)
}

/// GET /api/chain/:underlying - Latest chain snapshot for one underlying
async fn get_chain(
    State(service): State<Arc<ChainService>>,
    Path(underlying): Path<String>,
) -> Response {
    if !service.underlyings().iter().any(|u| u == &underlying) {
        return (StatusCode::NOT_FOUND, "Unknown underlying").into_response();
    }

    match service.snapshot(&underlying) {
        Some(snapshot) => Json(snapshot).into_response(),
        None => Json(ChainSnapshot {
            underlying,
            status: ChainStatus::Pending,
            chain: None,
            error: None,
            updated_at: 0,
        })
        .into_response(),
    }
}

/// GET /ws - WebSocket endpoint for snapshot pushes
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(service): State<Arc<ChainService>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, service))
}

async fn handle_websocket(mut socket: WebSocket, service: Arc<ChainService>) {
    info!("WebSocket client connected");

    // Send the current snapshot for every underlying up front
    for underlying in service.underlyings() {
        if let Some(snapshot) = service.snapshot(underlying) {
            if let Ok(json) = serde_json::to_string(&snapshot) {
                if socket.send(Message::Text(json.into())).await.is_err() {
                    return;
                }
            }
        }
    }

    // Then forward fresh snapshots as refresh cycles complete
    let mut rx = service.subscribe();

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(snapshot) => {
                        if let Ok(json) = serde_json::to_string(&snapshot) {
                            if socket.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        info!("WebSocket client lagged, skipped {} snapshots", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }

            // Handle incoming messages from client (ping/pong, close)
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}

/// Embedded frontend HTML with CSS and JavaScript
const FRONTEND_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Options Chain</title>
    <link rel="preconnect" href="https://fonts.googleapis.com">
    <link rel="preconnect" href="https://fonts.gstatic.com" crossorigin>
    <link href="https://fonts.googleapis.com/css2?family=JetBrains+Mono:wght@400;500;600&family=Outfit:wght@400;500;600;700&display=swap" rel="stylesheet">
    <style>
        :root {
            --bg-primary: #0a0a0f;
            --bg-secondary: #12121a;
            --bg-tertiary: #1a1a26;
            --bg-card: #16161f;
            --border: #2a2a3d;
            --border-active: #4f46e5;
            --text-primary: #f0f0f5;
            --text-secondary: #8888a0;
            --text-muted: #555566;
            --accent: #6366f1;
            --accent-glow: rgba(99, 102, 241, 0.3);
            --success: #22c55e;
            --warning: #f59e0b;
            --danger: #ef4444;
            --call: #22c55e;
            --put: #ef4444;
        }

        * {
            margin: 0;
            padding: 0;
            box-sizing: border-box;
        }

        body {
            font-family: 'Outfit', -apple-system, BlinkMacSystemFont, sans-serif;
            background: var(--bg-primary);
            color: var(--text-primary);
            min-height: 100vh;
            background-image:
                radial-gradient(ellipse at 20% 0%, rgba(99, 102, 241, 0.08) 0%, transparent 50%),
                radial-gradient(ellipse at 80% 100%, rgba(139, 92, 246, 0.06) 0%, transparent 50%);
        }

        .container {
            max-width: 900px;
            margin: 0 auto;
            padding: 24px;
        }

        header {
            display: flex;
            justify-content: space-between;
            align-items: center;
            margin-bottom: 32px;
            padding-bottom: 24px;
            border-bottom: 1px solid var(--border);
        }

        h1 {
            font-size: 24px;
            font-weight: 600;
            letter-spacing: -0.5px;
        }

        .status {
            display: flex;
            align-items: center;
            gap: 8px;
            font-size: 14px;
            color: var(--text-secondary);
        }

        .status-dot {
            width: 8px;
            height: 8px;
            border-radius: 50%;
            background: var(--success);
            box-shadow: 0 0 8px var(--success);
            animation: pulse 2s infinite;
        }

        .status-dot.disconnected {
            background: var(--danger);
            box-shadow: 0 0 8px var(--danger);
        }

        @keyframes pulse {
            0%, 100% { opacity: 1; }
            50% { opacity: 0.5; }
        }

        .tabs {
            display: flex;
            gap: 4px;
            margin-bottom: 24px;
            background: var(--bg-secondary);
            padding: 6px;
            border-radius: 12px;
            border: 1px solid var(--border);
        }

        .tab {
            padding: 12px 24px;
            border: none;
            background: transparent;
            color: var(--text-secondary);
            font-family: inherit;
            font-size: 14px;
            font-weight: 500;
            cursor: pointer;
            border-radius: 8px;
            transition: all 0.2s ease;
        }

        .tab:hover {
            color: var(--text-primary);
            background: var(--bg-tertiary);
        }

        .tab.active {
            background: var(--accent);
            color: white;
            box-shadow: 0 4px 12px var(--accent-glow);
        }

        .card {
            background: var(--bg-card);
            border: 1px solid var(--border);
            border-radius: 16px;
            padding: 24px;
        }

        .card-header {
            display: flex;
            justify-content: space-between;
            align-items: baseline;
            margin-bottom: 20px;
        }

        .card-title {
            font-size: 14px;
            font-weight: 500;
            color: var(--text-secondary);
            text-transform: uppercase;
            letter-spacing: 0.5px;
        }

        .card-meta {
            font-family: 'JetBrains Mono', monospace;
            font-size: 12px;
            color: var(--text-muted);
        }

        table {
            width: 100%;
            border-collapse: collapse;
            font-family: 'JetBrains Mono', monospace;
            font-size: 14px;
        }

        th {
            text-align: right;
            padding: 10px 16px;
            font-size: 12px;
            font-weight: 500;
            color: var(--text-muted);
            text-transform: uppercase;
            letter-spacing: 0.5px;
            border-bottom: 1px solid var(--border);
        }

        td {
            text-align: right;
            padding: 10px 16px;
            border-bottom: 1px solid var(--bg-tertiary);
        }

        tr:last-child td {
            border-bottom: none;
        }

        td.call { color: var(--call); }
        td.put { color: var(--put); }
        td.strike { color: var(--text-primary); font-weight: 600; }
        td.missing { color: var(--text-muted); }

        .empty-state {
            text-align: center;
            padding: 60px 20px;
            color: var(--text-muted);
        }

        .empty-state h2 {
            font-size: 18px;
            margin-bottom: 8px;
            color: var(--text-secondary);
        }

        .empty-state.error h2 {
            color: var(--danger);
        }
    </style>
</head>
<body>
    <div class="container">
        <header>
            <h1>Options Chain</h1>
            <div class="status">
                <div class="status-dot" id="statusDot"></div>
                <span id="statusText">Connecting...</span>
            </div>
        </header>

        <div class="tabs" id="tabs"></div>

        <div id="content">
            <div class="empty-state">
                <h2>Loading...</h2>
                <p>Waiting for the first chain snapshot</p>
            </div>
        </div>
    </div>

    <script>
        // State
        let underlyings = [];
        let snapshots = {};
        let activeUnderlying = null;
        let ws = null;

        async function init() {
            await loadUnderlyings();
            connectWebSocket();
        }

        async function loadUnderlyings() {
            try {
                const res = await fetch('/api/underlyings');
                underlyings = (await res.json()).map(u => u.name);

                if (underlyings.length > 0) {
                    activeUnderlying = underlyings[0];
                    renderTabs();
                    for (const u of underlyings) {
                        const chainRes = await fetch(`/api/chain/${u}`);
                        if (chainRes.ok) {
                            snapshots[u] = await chainRes.json();
                        }
                    }
                    render();
                }
            } catch (err) {
                console.error('Failed to load underlyings:', err);
            }
        }

        function connectWebSocket() {
            const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
            ws = new WebSocket(`${protocol}//${window.location.host}/ws`);

            ws.onopen = () => {
                document.getElementById('statusDot').classList.remove('disconnected');
                document.getElementById('statusText').textContent = 'Connected';
            };

            ws.onclose = () => {
                document.getElementById('statusDot').classList.add('disconnected');
                document.getElementById('statusText').textContent = 'Disconnected';
                setTimeout(connectWebSocket, 2000);
            };

            ws.onmessage = (event) => {
                try {
                    const snapshot = JSON.parse(event.data);
                    snapshots[snapshot.underlying] = snapshot;
                    if (snapshot.underlying === activeUnderlying) {
                        render();
                    }
                } catch (err) {
                    console.error('Failed to parse snapshot:', err);
                }
            };
        }

        function renderTabs() {
            const tabsEl = document.getElementById('tabs');
            tabsEl.innerHTML = underlyings.map(u => `
                <button class="tab ${u === activeUnderlying ? 'active' : ''}"
                        onclick="selectUnderlying('${u}')">
                    ${u}
                </button>
            `).join('');
        }

        function selectUnderlying(name) {
            activeUnderlying = name;
            renderTabs();
            render();
        }

        function render() {
            const content = document.getElementById('content');
            const snapshot = snapshots[activeUnderlying];

            if (!snapshot || snapshot.status === 'pending') {
                content.innerHTML = emptyState('Loading...', 'Waiting for the first chain snapshot');
                return;
            }

            if (snapshot.status === 'catalog_unavailable') {
                content.innerHTML = emptyState('Exchange unavailable',
                    snapshot.error || 'The product catalog could not be fetched', true);
                return;
            }

            if (snapshot.status === 'no_instruments' || !snapshot.chain) {
                content.innerHTML = emptyState('No options found',
                    `No live option contracts for ${activeUnderlying}`);
                return;
            }

            const chain = snapshot.chain;
            const expiry = new Date(chain.expiry).toUTCString();
            const rows = chain.rows.map(r => `
                <tr>
                    <td class="${priceClass(r.call_price, 'call')}">${formatPrice(r.call_price)}</td>
                    <td class="strike">${r.strike.toLocaleString()}</td>
                    <td class="${priceClass(r.put_price, 'put')}">${formatPrice(r.put_price)}</td>
                </tr>
            `).join('');

            content.innerHTML = `
                <div class="card">
                    <div class="card-header">
                        <span class="card-title">${chain.underlying} &middot; expires ${expiry}</span>
                        <span class="card-meta">${chain.pricing} price &middot; updated ${new Date(snapshot.updated_at * 1000).toLocaleTimeString()}</span>
                    </div>
                    <table>
                        <thead>
                            <tr><th>Call</th><th>Strike</th><th>Put</th></tr>
                        </thead>
                        <tbody>${rows}</tbody>
                    </table>
                </div>
            `;
        }

        function emptyState(title, message, isError = false) {
            return `
                <div class="empty-state ${isError ? 'error' : ''}">
                    <h2>${title}</h2>
                    <p>${message}</p>
                </div>
            `;
        }

        function priceClass(value, side) {
            return value === null || value === undefined ? 'missing' : side;
        }

        function formatPrice(value) {
            // Missing data renders as a dash, never as 0
            if (value === null || value === undefined) return '&mdash;';
            if (Math.abs(value) < 0.01) return value.toFixed(6);
            if (Math.abs(value) < 1) return value.toFixed(4);
            if (Math.abs(value) < 100) return value.toFixed(2);
            return value.toLocaleString();
        }

        // Start
        init();
    </script>
</body>
</html>
"##;
