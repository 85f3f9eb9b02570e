//! Connection handlers for the relay server.
//!
//! This module owns the HTTP surface: the WebSocket upgrade with its
//! handshake checks, the per-connection read and write loops, and the
//! liveness probe.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use firechat_protocol::{codec, InboundEvent, ProtocolError};
use firechat_relay_core::{authenticate, outbox, ConnectionId, Relay, RelayHandle};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Handle to the relay task.
    pub relay: RelayHandle,
    /// Server configuration.
    pub config: Config,
    /// Open WebSocket connections, for the connection cap.
    connections: Arc<AtomicUsize>,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(relay: RelayHandle, config: Config) -> Self {
        Self {
            relay,
            config,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// A reserved place under `limits.max_connections`, released on drop.
struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    fn acquire(counter: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |open| {
                (open < max).then_some(open + 1)
            })
            .ok()
            .map(|_| Self(Arc::clone(counter)))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Bind the configured address and run the server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Firechat relay listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}?{}=<user>",
        addr, config.transport.websocket_path, config.transport.identity_param
    );

    serve(listener, config, shutdown_signal()).await
}

/// Serve the relay on an already bound listener until `shutdown` resolves.
///
/// Spawns the relay task and, when enabled, the metrics exporter.
///
/// # Errors
///
/// Returns an error if the HTTP server fails.
pub async fn serve(
    listener: TcpListener,
    config: Config,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {:#}", e);
        }
    }

    let (relay, _task) = RelayHandle::spawn(Relay::new());
    let app = build_router(Arc::new(AppState::new(relay, config)));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")?;

    info!("Firechat relay stopped");
    Ok(())
}

/// Build the HTTP router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let ws_path = state.config.transport.websocket_path.clone();

    let mut app = Router::new().route(&ws_path, get(ws_handler));
    for probe in ["/health", "/"] {
        if probe != ws_path {
            app = app.route(probe, get(health_handler));
        }
    }

    app.with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "firechat-relay",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// WebSocket upgrade handler.
///
/// Refuses the handshake before upgrading when the origin is not allowed,
/// the identity is missing, or the server is full.
async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if let Some(origin) = headers.get(header::ORIGIN) {
        let allowed = origin
            .to_str()
            .is_ok_and(|origin| state.config.cors.allows(origin));
        if !allowed {
            warn!(origin = ?origin, "Connection rejected: origin not allowed");
            metrics::record_rejection("origin");
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let identity = params.get(&state.config.transport.identity_param);
    let user_id = match authenticate(identity.map(String::as_str)) {
        Ok(user_id) => user_id,
        Err(e) => {
            warn!("{}", e);
            metrics::record_rejection("missing_identity");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    let max = state.config.limits.max_connections;
    let Some(slot) = ConnectionSlot::acquire(&state.connections, max) else {
        warn!(user = %user_id, max, "Connection rejected: server full");
        metrics::record_rejection("capacity");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    let max_message_size = state.config.limits.max_message_size;
    ws.max_message_size(max_message_size)
        .max_frame_size(max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, user_id, state, slot))
}

/// Handle a WebSocket connection.
async fn handle_websocket(
    socket: WebSocket,
    user_id: String,
    state: Arc<AppState>,
    _slot: ConnectionSlot,
) {
    let _metrics_guard = ConnectionMetricsGuard::new();
    let connection_id = ConnectionId::generate();
    let (tx, mut rx) = outbox();

    if let Err(e) = state.relay.connect(connection_id.clone(), &user_id, tx).await {
        warn!(connection = %connection_id, user = %user_id, error = %e, "Connect failed");
        return;
    }
    debug!(connection = %connection_id, user = %user_id, "WebSocket connected");
    update_gauges(&state).await;

    let (mut sender, mut receiver) = socket.split();

    // Frames queued by the relay, including the connect-time presence frames
    let mut writer = tokio::spawn({
        let connection_id = connection_id.clone();
        async move {
            while let Some(frame) = rx.recv().await {
                metrics::record_frame(frame.len(), "outbound");
                // Message::Text owns its String, so each connection copies the shared frame
                let text = match String::from_utf8(frame.to_vec()) {
                    Ok(text) => text,
                    Err(e) => {
                        error!(connection = %connection_id, error = %e, "Non-UTF-8 outbound frame");
                        continue;
                    }
                };
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut writer => {
                debug!(connection = %connection_id, "Writer closed");
                break;
            }

            msg = receiver.next() => {
                let relayed = match msg {
                    Some(Ok(Message::Text(text))) => {
                        metrics::record_frame(text.len(), "inbound");
                        relay_frame(&state, &connection_id, codec::decode(&text))
                    }
                    Some(Ok(Message::Binary(data))) => {
                        metrics::record_frame(data.len(), "inbound");
                        relay_frame(&state, &connection_id, codec::decode_bytes(&data))
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => true,
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(connection = %connection_id, "Client closed connection");
                        false
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        false
                    }
                };
                if !relayed {
                    break;
                }
            }
        }
    }

    if state.relay.disconnect(connection_id.clone()).is_err() {
        warn!(connection = %connection_id, "Relay stopped before disconnect");
    }
    writer.abort();
    update_gauges(&state).await;

    debug!(connection = %connection_id, user = %user_id, "WebSocket disconnected");
}

/// Hand a decoded frame to the relay. Returns `false` once the relay is gone.
fn relay_frame(
    state: &AppState,
    connection_id: &ConnectionId,
    decoded: Result<InboundEvent, ProtocolError>,
) -> bool {
    match decoded {
        Ok(event) => {
            metrics::record_event(event.name());
            if state.relay.dispatch(connection_id.clone(), event).is_err() {
                error!(connection = %connection_id, "Relay stopped");
                return false;
            }
        }
        Err(e) => {
            metrics::record_decode_error();
            debug!(connection = %connection_id, error = %e, "Dropping undecodable frame");
        }
    }
    true
}

async fn update_gauges(state: &AppState) {
    if let Ok(stats) = state.relay.stats().await {
        metrics::set_relay_stats(&stats);
    }
}
