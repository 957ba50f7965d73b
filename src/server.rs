//! HTTP server exposing the ingest and analytics surface.
//!
//! Routes:
//! - `GET /publish?name=<key>&topic=<channel>` synthesizes an event and
//!   echoes it back
//! - `POST /ingest` accepts a full event from an external producer
//! - `GET /analytics` streams the trailing-window counts over SSE, one
//!   frame per publisher tick
//! - `GET /health`, `GET /stats` for liveness and counters
//!
//! # Architecture
//!
//! ```text
//! producers ──→ /publish, /ingest ──→ gateway ──→ windowed counter
//!                                                       │
//! browsers  ←── /analytics (SSE) ←── publisher ←── snapshot query
//! ```

use crate::config::Config;
use crate::core::{CounterStats, SnapshotQuery, WindowedCounter};
use crate::event::PageEvent;
use crate::ingest::{EventIngestGateway, IngestError};
use crate::publisher::AnalyticsStreamPublisher;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};

/// Shared server state
pub struct ServerState {
    gateway: EventIngestGateway,
    publisher: Arc<AnalyticsStreamPublisher>,
    store: Arc<WindowedCounter>,
}

impl ServerState {
    /// Wire up the store, gateway and publisher from a config.
    pub fn new(config: &Config) -> Self {
        let store = Arc::new(WindowedCounter::new(
            config.window_duration,
            config.retention_horizon,
        ));
        let gateway = EventIngestGateway::new(Arc::clone(&store), config);
        let query = SnapshotQuery::new(Arc::clone(&store));
        let publisher = Arc::new(AnalyticsStreamPublisher::new(
            query,
            config.tick_interval,
            config.trailing_window_secs,
        ));

        Self {
            gateway,
            publisher,
            store,
        }
    }
}

/// Query parameters for GET /publish
#[derive(Debug, Deserialize)]
pub struct PublishParams {
    pub name: Option<String>,
    pub topic: Option<String>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

fn validation_rejection(err: IngestError) -> (StatusCode, Json<ErrorResponse>) {
    tracing::warn!(error = %err, "rejecting event");
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: err.to_string(),
            code: "VALIDATION_ERROR".to_string(),
        }),
    )
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /stats
async fn stats(State(state): State<Arc<ServerState>>) -> Json<CounterStats> {
    Json(state.store.stats())
}

/// GET /publish?name=<key>&topic=<channel>
///
/// Synthesizes an event for `name` on `topic` and returns the accepted
/// event. Repeated calls with identical parameters produce distinct events.
async fn publish(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<PublishParams>,
) -> Result<Json<PageEvent>, (StatusCode, Json<ErrorResponse>)> {
    let (Some(name), Some(topic)) = (params.name, params.topic) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "both name and topic query parameters are required".to_string(),
                code: "MISSING_PARAMS".to_string(),
            }),
        ));
    };

    let event = state
        .gateway
        .manual_publish(&name, &topic)
        .map_err(validation_rejection)?;
    Ok(Json(event))
}

/// POST /ingest
///
/// Accepts a full event from an external producer and echoes the accepted
/// event back for confirmation.
async fn ingest(
    State(state): State<Arc<ServerState>>,
    Json(event): Json<PageEvent>,
) -> Result<Json<PageEvent>, (StatusCode, Json<ErrorResponse>)> {
    let accepted = state.gateway.ingest(event).map_err(validation_rejection)?;
    Ok(Json(accepted))
}

/// GET /analytics
///
/// Long-lived SSE stream; each frame is a JSON map of page key to count
/// over the trailing window, sent once per tick until the client
/// disconnects.
async fn analytics(
    State(state): State<Arc<ServerState>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, Json<ErrorResponse>)> {
    let subscription = state.publisher.subscribe().map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: e.to_string(),
                code: "PUBLISHER_STOPPED".to_string(),
            }),
        )
    })?;

    let stream = subscription.into_stream().filter_map(|snapshot| {
        serde_json::to_string(&snapshot.counts)
            .ok()
            .map(|data| Ok(Event::default().data(data)))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Build the router for the given shared state.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/publish", get(publish))
        .route("/ingest", post(ingest))
        .route("/analytics", get(analytics))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(config: Config) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    config.validate()?;
    let state = Arc::new(ServerState::new(&config));
    let app = router(Arc::clone(&state));

    // Retention eviction runs independently of ingest and ticks
    let evictor = {
        let store = Arc::clone(&state.store);
        let mut ticker = tokio::time::interval(config.window_duration);
        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                store.evict_expired(Utc::now());
            }
        })
    };

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("analytics server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("server shutdown signal received");
            })
            .await
        {
            tracing::error!("server error: {}", e);
        }
        state.publisher.stop();
        evictor.abort();
    });

    Ok((actual_addr, shutdown_tx))
}
