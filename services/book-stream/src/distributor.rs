//! Rate-controlled streaming distributor
//!
//! Accepts subscriber connections for the life of the server, replays a
//! bounded event set in fixed-size batches at a target rate, feeds every
//! event to a callback (the book engine) in order, and broadcasts its
//! framed JSON to all connected subscribers.
//!
//! ```text
//!  events ──► replay loop ──► callback (single writer, in order)
//!                 │
//!                 ▼
//!        broadcast::Sender<Bytes>
//!          │        │        │
//!        sub 1    sub 2    sub N   (independent tasks, own queue each)
//! ```
//!
//! Rate limiting is per batch: a batch that finished early sleeps out the
//! rest of `batch_len / target_rate`. Shutdown is observed between batches
//! and during that sleep.

use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use types::event::FeedEvent;

use crate::config::StreamConfig;
use crate::metrics::StreamMetrics;
use crate::subscriber::{self, SubscriberContext};
use crate::wire::{self, Control, WireError};

const PROGRESS_EVERY: usize = 10_000;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid stream config: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("subscriber lagged by {0} frames")]
    Lagged(u64),

    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Explicit shutdown signal shared by the accept loop, the replay loop
/// and every subscriber task.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Resolve once shutdown has been triggered.
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        loop {
            let triggered = *rx.borrow_and_update();
            if triggered || rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one replay.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySummary {
    pub events_total: usize,
    pub events_replayed: usize,
    pub callback_errors: u64,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl ReplaySummary {
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.events_replayed as f64 / secs
        } else {
            0.0
        }
    }
}

/// A bound distributor with its accept loop running.
pub struct StreamServer {
    config: StreamConfig,
    local_addr: SocketAddr,
    frames: broadcast::Sender<Bytes>,
    metrics: Arc<StreamMetrics>,
    shutdown: ShutdownHandle,
    accept_task: JoinHandle<()>,
}

impl StreamServer {
    /// Validate config, open the listener and start accepting.
    ///
    /// A bind failure is fatal to the distributor.
    pub async fn bind(config: StreamConfig, metrics: Arc<StreamMetrics>) -> Result<Self, StreamError> {
        Self::bind_with_shutdown(config, metrics, ShutdownHandle::new()).await
    }

    pub async fn bind_with_shutdown(
        config: StreamConfig,
        metrics: Arc<StreamMetrics>,
        shutdown: ShutdownHandle,
    ) -> Result<Self, StreamError> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| StreamError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;
        let (frames, _) = broadcast::channel(config.channel_capacity);

        let ctx = SubscriberContext {
            metrics: Arc::clone(&metrics),
            write_timeout: config.write_timeout,
            lag_policy: config.lag_policy,
        };
        let accept_task = tokio::spawn(accept_loop(
            listener,
            frames.clone(),
            ctx,
            config.welcome_message.clone(),
            shutdown.subscribe(),
        ));

        info!(addr = %local_addr, "Stream server listening");

        Ok(Self {
            config,
            local_addr,
            frames,
            metrics,
            shutdown,
            accept_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<StreamMetrics> {
        &self.metrics
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Subscribers currently attached to the broadcast queue.
    pub fn subscriber_count(&self) -> usize {
        self.frames.receiver_count()
    }

    /// Wait until at least `n` subscribers are attached, up to `limit`.
    pub async fn wait_for_subscribers(&self, n: usize, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while self.subscriber_count() < n {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }

    /// Replay `events` once.
    ///
    /// For each event the callback runs first, then the frame is published.
    /// Callback failures are counted and logged and never stop the batch.
    pub async fn replay<F, E>(&self, events: &[FeedEvent], mut on_event: F) -> ReplaySummary
    where
        F: FnMut(&FeedEvent) -> Result<(), E>,
        E: Display,
    {
        let started = Instant::now();
        let paced_from = tokio::time::Instant::now();
        self.metrics.mark_started();
        let mut shutdown = self.shutdown.subscribe();

        info!(
            events = events.len(),
            target_rate = self.config.target_rate,
            batch_size = self.config.batch_size,
            "Starting replay"
        );

        let mut replayed = 0usize;
        let mut callback_errors = 0u64;
        let mut cancelled = false;

        for batch in events.chunks(self.config.batch_size) {
            if self.shutdown.is_triggered() {
                cancelled = true;
                break;
            }

            for event in batch {
                if let Err(e) = on_event(event) {
                    callback_errors += 1;
                    self.metrics.record_error();
                    debug!(error = %e, "Replay callback failed");
                }
                self.publish(event);

                replayed += 1;
                if replayed % PROGRESS_EVERY == 0 {
                    info!(
                        replayed,
                        total = events.len(),
                        subscribers = self.subscriber_count(),
                        "Replay progress"
                    );
                }
            }

            if let Some(offset) = self.config.pace_offset(replayed) {
                let due = paced_from + offset;
                if tokio::time::Instant::now() < due {
                    tokio::select! {
                        _ = tokio::time::sleep_until(due) => {}
                        _ = shutdown.changed() => {
                            cancelled = true;
                            break;
                        }
                    }
                }
            }
        }

        let summary = ReplaySummary {
            events_total: events.len(),
            events_replayed: replayed,
            callback_errors,
            elapsed: started.elapsed(),
            cancelled,
        };
        info!(
            replayed = summary.events_replayed,
            errors = summary.callback_errors,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            throughput = %format!("{:.0}", summary.throughput()),
            cancelled = summary.cancelled,
            "Replay finished"
        );
        summary
    }

    /// Encode and publish one event frame.
    fn publish(&self, event: &FeedEvent) {
        match wire::encode(event) {
            Ok(frame) => {
                // No receivers is not an error; the frame is still published.
                let _ = self.frames.send(frame);
                self.metrics.record_sent();
            }
            Err(e) => {
                self.metrics.record_error();
                warn!(error = %e, "Failed to encode event frame");
            }
        }
    }

    /// Replay, then keep serving until shutdown is triggered, then close.
    pub async fn run<F, E>(self, events: &[FeedEvent], on_event: F) -> ReplaySummary
    where
        F: FnMut(&FeedEvent) -> Result<(), E>,
        E: Display,
    {
        let summary = self.replay(events, on_event).await;
        if !summary.cancelled {
            info!(addr = %self.local_addr, "Replay complete, still accepting subscribers");
        }
        self.shutdown.wait().await;
        self.close().await;
        summary
    }

    /// Signal shutdown and wait for the listener and subscribers to close.
    pub async fn close(self) {
        self.shutdown.trigger();
        if let Err(e) = self.accept_task.await {
            error!(error = %e, "Accept loop panicked");
        }
        info!(addr = %self.local_addr, "Stream server closed");
    }
}

async fn accept_loop(
    listener: TcpListener,
    frames: broadcast::Sender<Bytes>,
    ctx: SubscriberContext,
    welcome_message: String,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut subscribers = JoinSet::new();

    loop {
        let stop = *shutdown.borrow();
        if stop {
            break;
        }

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }

            Some(_) = subscribers.join_next(), if !subscribers.is_empty() => {}

            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    let _ = socket.set_nodelay(true);
                    let welcome = match welcome_frame(&welcome_message) {
                        Ok(frame) => frame,
                        Err(e) => {
                            ctx.metrics.record_error();
                            warn!(%peer, error = %e, "Failed to build welcome frame");
                            continue;
                        }
                    };
                    subscribers.spawn(subscriber::serve(
                        socket,
                        peer,
                        welcome,
                        frames.subscribe(),
                        ctx.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(e) => {
                    ctx.metrics.record_error();
                    warn!(error = %e, "Accept failed");
                }
            },
        }
    }

    drop(listener);
    while subscribers.join_next().await.is_some() {}
    debug!("Accept loop stopped");
}

fn welcome_frame(message: &str) -> Result<Bytes, WireError> {
    wire::encode(&Control::Welcome {
        message: message.to_string(),
        timestamp: chrono::Utc::now().timestamp_millis(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use types::event::OrderEvent;
    use types::order::{EventKind, Side};

    fn local_config() -> StreamConfig {
        StreamConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..StreamConfig::default()
        }
    }

    fn events(n: usize) -> Vec<FeedEvent> {
        (0..n)
            .map(|i| {
                OrderEvent::new(
                    i as i64,
                    EventKind::New,
                    format!("ORD{:010}", i),
                    "AAPL",
                    Side::Bid,
                    Decimal::new(100 + i as i64, 0),
                    1,
                )
                .into()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_bind_conflict_is_fatal() {
        let first = StreamServer::bind(local_config(), Arc::new(StreamMetrics::new()))
            .await
            .unwrap();
        let taken = StreamConfig {
            bind_addr: first.local_addr(),
            ..StreamConfig::default()
        };
        let err = StreamServer::bind(taken, Arc::new(StreamMetrics::new()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StreamError::Bind { .. }));
        first.close().await;
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = StreamConfig {
            batch_size: 0,
            ..local_config()
        };
        let err = StreamServer::bind(config, Arc::new(StreamMetrics::new()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StreamError::Config(_)));
    }

    #[tokio::test]
    async fn test_replay_without_subscribers_counts_every_event() {
        let server = StreamServer::bind(local_config(), Arc::new(StreamMetrics::new()))
            .await
            .unwrap();
        let mut seen = 0;
        let summary = server
            .replay(&events(250), |_| {
                seen += 1;
                Ok::<(), String>(())
            })
            .await;

        assert_eq!(seen, 250);
        assert_eq!(summary.events_replayed, 250);
        assert!(!summary.cancelled);
        assert_eq!(server.metrics().snapshot().messages_sent, 250);
        server.close().await;
    }

    #[tokio::test]
    async fn test_callback_errors_isolated() {
        let server = StreamServer::bind(local_config(), Arc::new(StreamMetrics::new()))
            .await
            .unwrap();
        let summary = server
            .replay(&events(10), |e| match e {
                FeedEvent::Order(o) if o.timestamp % 2 == 0 => Err("even"),
                _ => Ok(()),
            })
            .await;

        assert_eq!(summary.events_replayed, 10);
        assert_eq!(summary.callback_errors, 5);
        let snap = server.metrics().snapshot();
        assert_eq!(snap.errors, 5);
        assert_eq!(snap.messages_sent, 10);
        server.close().await;
    }

    #[tokio::test]
    async fn test_shutdown_cancels_between_batches() {
        let config = StreamConfig {
            target_rate: 1_000,
            batch_size: 10,
            ..local_config()
        };
        let server = StreamServer::bind(config, Arc::new(StreamMetrics::new()))
            .await
            .unwrap();
        let handle = server.shutdown_handle();

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.trigger();
        });

        // 10_000 events at 1_000/s would take ten seconds
        let summary = server.replay(&events(10_000), |_| Ok::<(), String>(())).await;
        stopper.await.unwrap();

        assert!(summary.cancelled);
        assert!(summary.events_replayed < 10_000);
        assert_eq!(summary.events_replayed % 10, 0);
        server.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pacing_holds_target_rate_with_short_batches() {
        // 1 ms per batch: timer rounding on each sleep must not accumulate.
        let config = StreamConfig {
            target_rate: 100_000,
            batch_size: 100,
            ..local_config()
        };
        let server = StreamServer::bind(config, Arc::new(StreamMetrics::new()))
            .await
            .unwrap();

        let summary = server.replay(&events(20_000), |_| Ok::<(), String>(())).await;

        assert_eq!(summary.events_replayed, 20_000);
        assert!(summary.elapsed >= Duration::from_millis(200));
        assert!(summary.throughput() >= 80_000.0, "throughput {:.0}", summary.throughput());
        assert!(summary.throughput() <= 101_000.0, "throughput {:.0}", summary.throughput());
        server.close().await;
    }

    #[tokio::test]
    async fn test_run_returns_after_shutdown() {
        let server = StreamServer::bind(local_config(), Arc::new(StreamMetrics::new()))
            .await
            .unwrap();
        let handle = server.shutdown_handle();
        let task = tokio::spawn(async move {
            let evs = events(5);
            server.run(&evs, |_| Ok::<(), String>(())).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());
        handle.trigger();

        let summary = task.await.unwrap();
        assert_eq!(summary.events_replayed, 5);
    }
}
