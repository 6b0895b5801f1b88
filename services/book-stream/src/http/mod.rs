//! Read-only inspection endpoints
//!
//! Handlers only ever take the read side of the book lock; the replay loop
//! is the single writer. Responses are eventually consistent snapshots.

mod error;
mod handlers;

use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::aggregate::OrderBookAggregate;
use crate::distributor::ShutdownHandle;
use crate::metrics::{MetricsRecorder, StreamMetrics};

pub use error::ApiError;

pub const DEFAULT_DEPTH: usize = 5;
pub const MAX_DEPTH: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub book: Arc<RwLock<OrderBookAggregate>>,
    pub recorder: Arc<MetricsRecorder>,
    pub stream_metrics: Arc<StreamMetrics>,
}

impl AppState {
    /// The recorder is taken from the aggregate so both views share counters.
    pub fn new(book: Arc<RwLock<OrderBookAggregate>>, stream_metrics: Arc<StreamMetrics>) -> Self {
        let recorder = match book.read() {
            Ok(guard) => guard.recorder().clone(),
            Err(poisoned) => poisoned.into_inner().recorder().clone(),
        };
        Self {
            book,
            recorder,
            stream_metrics,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/symbols", get(handlers::symbols))
        .route("/book/{symbol}", get(handlers::book))
        .route("/bba/{symbol}", get(handlers::bba))
        .route("/verify/{symbol}", get(handlers::verify))
        .route("/snapshot/{symbol}", get(handlers::snapshot))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until shutdown is triggered.
pub async fn serve(addr: SocketAddr, state: AppState, shutdown: ShutdownHandle) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Inspection API listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
}
