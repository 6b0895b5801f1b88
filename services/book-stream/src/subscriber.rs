//! Per-subscriber connection task
//!
//! Lifecycle: CONNECTED → (receiving broadcasts)* → DISCONNECTED.
//!
//! A connection first gets the welcome frame, then every broadcast frame in
//! publish order. Inbound bytes are read and discarded; only EOF matters.
//! Failures end this connection only and never reach the replay loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::config::LagPolicy;
use crate::distributor::StreamError;
use crate::metrics::StreamMetrics;

/// Why a connection ended cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Peer closed its side.
    PeerClosed,
    /// Distributor shutdown.
    Shutdown,
    /// Broadcast source dropped.
    SourceClosed,
}

/// Shared settings for subscriber tasks.
#[derive(Clone)]
pub struct SubscriberContext {
    pub metrics: Arc<StreamMetrics>,
    pub write_timeout: Duration,
    pub lag_policy: LagPolicy,
}

/// Drive one subscriber until it disconnects. Updates the connection gauge
/// and error counter on the way out.
pub async fn serve(
    socket: TcpStream,
    peer: SocketAddr,
    welcome: Bytes,
    frames: broadcast::Receiver<Bytes>,
    ctx: SubscriberContext,
    shutdown: watch::Receiver<bool>,
) {
    ctx.metrics.client_connected();
    info!(%peer, "Subscriber connected");

    let result = run(socket, welcome, frames, &ctx, shutdown).await;
    ctx.metrics.client_disconnected();

    match result {
        Ok(reason) => info!(%peer, ?reason, "Subscriber disconnected"),
        Err(e) => {
            ctx.metrics.record_error();
            warn!(%peer, error = %e, "Subscriber dropped");
        }
    }
}

async fn run(
    mut socket: TcpStream,
    welcome: Bytes,
    mut frames: broadcast::Receiver<Bytes>,
    ctx: &SubscriberContext,
    mut shutdown: watch::Receiver<bool>,
) -> Result<DisconnectReason, StreamError> {
    let (mut reader, mut writer) = socket.split();

    write_frame(&mut writer, &welcome, ctx).await?;

    let mut inbound = [0u8; 1024];
    loop {
        let stop = *shutdown.borrow();
        if stop {
            return Ok(DisconnectReason::Shutdown);
        }

        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() {
                    return Ok(DisconnectReason::Shutdown);
                }
            }

            read = reader.read(&mut inbound) => match read {
                Ok(0) => return Ok(DisconnectReason::PeerClosed),
                Ok(n) => debug!(bytes = n, "Discarding inbound subscriber bytes"),
                Err(e) => return Err(StreamError::Transport(e)),
            },

            frame = frames.recv() => match frame {
                Ok(frame) => write_frame(&mut writer, &frame, ctx).await?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => match ctx.lag_policy {
                    LagPolicy::Disconnect => return Err(StreamError::Lagged(skipped)),
                    LagPolicy::DropOldest => {
                        ctx.metrics.record_dropped(skipped);
                        warn!(skipped, "Subscriber lagging, dropped oldest frames");
                    }
                },
                Err(broadcast::error::RecvError::Closed) => return Ok(DisconnectReason::SourceClosed),
            },
        }
    }
}

async fn write_frame<W>(writer: &mut W, frame: &[u8], ctx: &SubscriberContext) -> Result<(), StreamError>
where
    W: AsyncWrite + Unpin,
{
    match tokio::time::timeout(ctx.write_timeout, writer.write_all(frame)).await {
        Ok(Ok(())) => {
            ctx.metrics.record_bytes(frame.len());
            Ok(())
        }
        Ok(Err(e)) => Err(StreamError::Transport(e)),
        Err(_) => Err(StreamError::Transport(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "subscriber write timed out",
        ))),
    }
}
