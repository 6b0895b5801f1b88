//! Subscriber-side client for the stream distributor

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::io::BufReader;
use tokio::net::TcpStream;
use tracing::debug;
use types::event::FeedEvent;

use crate::distributor::StreamError;
use crate::wire::{self, Control, ServerMessage};

/// A connected subscriber.
pub struct StreamClient {
    reader: BufReader<TcpStream>,
}

/// Receive statistics for a bounded listening session.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiveStats {
    pub welcome: Option<String>,
    pub events: u64,
    pub elapsed: Duration,
    pub closed_by_server: bool,
}

impl ReceiveStats {
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.events as f64 / secs
        } else {
            0.0
        }
    }
}

impl StreamClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self, StreamError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!(%addr, "Connected to stream server");
        Ok(Self {
            reader: BufReader::new(stream),
        })
    }

    /// Next decoded frame, or None once the server closed the stream.
    pub async fn next_message(&mut self) -> Result<Option<ServerMessage>, StreamError> {
        Ok(wire::read_message(&mut self.reader).await?)
    }

    /// Next event frame, skipping control frames.
    pub async fn next_event(&mut self) -> Result<Option<FeedEvent>, StreamError> {
        loop {
            match self.next_message().await? {
                Some(ServerMessage::Event(event)) => return Ok(Some(event)),
                Some(ServerMessage::Control(_)) => continue,
                None => return Ok(None),
            }
        }
    }

    /// Read until `duration` passes or the server closes.
    pub async fn receive_for(&mut self, duration: Duration) -> Result<ReceiveStats, StreamError> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + duration;
        let mut stats = ReceiveStats {
            welcome: None,
            events: 0,
            elapsed: Duration::ZERO,
            closed_by_server: false,
        };

        loop {
            match tokio::time::timeout_at(deadline, self.next_message()).await {
                Err(_) => break,
                Ok(Ok(Some(ServerMessage::Control(Control::Welcome { message, .. })))) => {
                    stats.welcome = Some(message);
                }
                Ok(Ok(Some(ServerMessage::Event(_)))) => stats.events += 1,
                Ok(Ok(None)) => {
                    stats.closed_by_server = true;
                    break;
                }
                Ok(Err(e)) => return Err(e),
            }
        }

        stats.elapsed = started.elapsed();
        Ok(stats)
    }
}
