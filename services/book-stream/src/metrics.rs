//! Observability for the book engine and the stream distributor
//!
//! Two independent collectors:
//! - `MetricsRecorder`: message/error counters and apply latency samples,
//!   all behind one short-held lock. Derived statistics are computed from a
//!   copy taken under the lock, never while holding it.
//! - `StreamMetrics`: lock-free distributor counters.
//!
//! Both are owned by the process entry point and shared via `Arc`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Linear-interpolated percentile over ascending samples.
///
/// `index = q * (n - 1)`; the result interpolates between the floor and
/// ceiling ranks, or is the last sample when the floor is already the last
/// rank. `q` is a fraction in `[0, 1]`.
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let index = q.clamp(0.0, 1.0) * (n - 1) as f64;
    let floor = index.floor() as usize;
    if floor >= n - 1 {
        return Some(sorted[n - 1]);
    }
    let frac = index - floor as f64;
    Some(sorted[floor] + (sorted[floor + 1] - sorted[floor]) * frac)
}

/// Latency distribution in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: usize,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl LatencySummary {
    /// Summarize unsorted samples. Empty input yields all zeros.
    pub fn from_samples(mut samples: Vec<f64>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_by(|a, b| a.total_cmp(b));

        let count = samples.len();
        let sum: f64 = samples.iter().sum();
        Self {
            count,
            min_ms: samples[0],
            max_ms: samples[count - 1],
            mean_ms: sum / count as f64,
            p50_ms: percentile(&samples, 0.50).unwrap_or_default(),
            p95_ms: percentile(&samples, 0.95).unwrap_or_default(),
            p99_ms: percentile(&samples, 0.99).unwrap_or_default(),
        }
    }
}

/// Point-in-time view of the engine metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub messages_total: u64,
    pub errors_total: u64,
    pub throughput_msg_per_sec: f64,
    pub uptime_sec: f64,
    pub latency: LatencySummary,
}

struct RecorderState {
    started: Instant,
    messages: u64,
    errors: u64,
    latencies_ms: Vec<f64>,
}

impl RecorderState {
    fn fresh() -> Self {
        Self {
            started: Instant::now(),
            messages: 0,
            errors: 0,
            latencies_ms: Vec::new(),
        }
    }
}

/// Engine-side counters and latency samples.
///
/// Samples accumulate for the life of the recorder.
pub struct MetricsRecorder {
    state: Mutex<RecorderState>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RecorderState::fresh()),
        }
    }

    pub fn record_message(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.messages += 1;
        }
    }

    pub fn record_error(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.errors += 1;
        }
    }

    pub fn record_latency(&self, latency_ms: f64) {
        if let Ok(mut state) = self.state.lock() {
            state.latencies_ms.push(latency_ms);
        }
    }

    /// One applied event: message, latency and optionally an error, under a
    /// single lock acquisition.
    pub fn record_apply(&self, latency_ms: f64, failed: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.messages += 1;
            state.latencies_ms.push(latency_ms);
            if failed {
                state.errors += 1;
            }
        }
    }

    pub fn messages(&self) -> u64 {
        self.state.lock().map(|s| s.messages).unwrap_or_default()
    }

    pub fn errors(&self) -> u64 {
        self.state.lock().map(|s| s.errors).unwrap_or_default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let copied = self
            .state
            .lock()
            .map(|s| (s.messages, s.errors, s.latencies_ms.clone(), s.started.elapsed()))
            .ok();
        let (messages, errors, samples, uptime) =
            copied.unwrap_or((0, 0, Vec::new(), Duration::ZERO));

        let uptime_sec = uptime.as_secs_f64();
        MetricsSnapshot {
            messages_total: messages,
            errors_total: errors,
            throughput_msg_per_sec: rate(messages, uptime_sec),
            uptime_sec,
            latency: LatencySummary::from_samples(samples),
        }
    }

    /// Zero everything and restart the uptime clock.
    pub fn reset(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = RecorderState::fresh();
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the distributor metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSnapshot {
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub throughput_msg_per_sec: f64,
    pub clients_connected: u64,
    pub errors: u64,
    pub messages_dropped: u64,
    pub uptime_seconds: f64,
}

/// Distributor counters.
pub struct StreamMetrics {
    /// Event frames published, once per event regardless of subscribers.
    pub messages_sent: AtomicU64,
    /// Frame bytes written to subscriber sockets.
    pub bytes_sent: AtomicU64,
    pub clients_connected: AtomicU64,
    /// Callback failures plus subscriber transport failures.
    pub errors: AtomicU64,
    /// Frames skipped by lagging subscribers.
    pub messages_dropped: AtomicU64,
    started: Mutex<Option<Instant>>,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self {
            messages_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            clients_connected: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            started: Mutex::new(None),
        }
    }

    /// Start the throughput clock. Later calls restart it.
    pub fn mark_started(&self) {
        if let Ok(mut started) = self.started.lock() {
            *started = Some(Instant::now());
        }
    }

    pub fn record_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes(&self, n: usize) {
        self.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, n: u64) {
        self.messages_dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn client_connected(&self) {
        self.clients_connected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn client_disconnected(&self) {
        let _ = self
            .clients_connected
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)));
    }

    pub fn elapsed(&self) -> Duration {
        self.started
            .lock()
            .ok()
            .and_then(|s| *s)
            .map(|s| s.elapsed())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        let messages_sent = self.messages_sent.load(Ordering::Relaxed);
        let uptime_seconds = self.elapsed().as_secs_f64();
        StreamSnapshot {
            messages_sent,
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            throughput_msg_per_sec: rate(messages_sent, uptime_seconds),
            clients_connected: self.clients_connected.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            uptime_seconds,
        }
    }
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn rate(count: u64, seconds: f64) -> f64 {
    if seconds > 0.0 {
        count as f64 / seconds
    } else {
        0.0
    }
}
