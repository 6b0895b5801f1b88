//! book-stream: MBO order book replay and stream distribution
//!
//! Subcommands:
//! - `stream`    load a feed, rebuild books, stream it to TCP subscribers
//! - `subscribe` connect as a subscriber and report the receive rate
//! - `generate`  write a seeded synthetic MBO feed as CSV
//! - `validate`  load a feed and check its error rate

use std::fs::{self, File};
use std::io::BufWriter;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use book_stream::aggregate::{BookConfig, OrderBookAggregate};
use book_stream::client::StreamClient;
use book_stream::config::{LagPolicy, StreamConfig};
use book_stream::distributor::{ShutdownHandle, StreamServer};
use book_stream::export::BookExport;
use book_stream::http::{self, AppState};
use book_stream::metrics::{MetricsRecorder, StreamMetrics};
use book_stream::order_book::ModifyPolicy;
use book_stream::reader::{self, DEFAULT_MAX_ERROR_RATE};
use book_stream::synth::FeedGenerator;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use types::event::FeedEvent;

#[derive(Parser)]
#[command(name = "book-stream", version, about = "MBO order book replay and stream distribution")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a feed into the books and stream it to subscribers
    Stream(StreamArgs),

    /// Connect to a stream server and report the receive rate
    Subscribe {
        #[arg(long, env = "BOOK_STREAM_CONNECT", default_value = "127.0.0.1:9999")]
        connect: SocketAddr,

        /// Seconds to listen
        #[arg(long, default_value_t = 10)]
        duration: u64,
    },

    /// Write a seeded synthetic feed as CSV
    Generate {
        #[arg(long, short)]
        output: PathBuf,

        #[arg(long, default_value_t = 100_000)]
        count: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Load a feed and check its error rate
    Validate {
        #[arg(long, short)]
        input: PathBuf,

        #[arg(long, default_value_t = DEFAULT_MAX_ERROR_RATE)]
        max_error_rate: f64,
    },
}

#[derive(Args)]
struct StreamArgs {
    /// CSV or NDJSON feed file
    #[arg(long, short, env = "BOOK_STREAM_INPUT")]
    input: PathBuf,

    /// Book export written on shutdown
    #[arg(long, short, env = "BOOK_STREAM_OUTPUT", default_value = "order_book_output.json")]
    output: PathBuf,

    #[arg(long, env = "BOOK_STREAM_HOST", default_value = "0.0.0.0")]
    host: std::net::IpAddr,

    #[arg(long, env = "BOOK_STREAM_TCP_PORT", default_value_t = 9999)]
    tcp_port: u16,

    /// Inspection API port; 0 disables it
    #[arg(long, env = "BOOK_STREAM_HTTP_PORT", default_value_t = 8080)]
    http_port: u16,

    /// Events per second; 0 streams as fast as possible
    #[arg(long, env = "BOOK_STREAM_RATE", default_value_t = 100_000)]
    rate: u64,

    #[arg(long, env = "BOOK_STREAM_BATCH_SIZE", default_value_t = 100)]
    batch_size: usize,

    /// Frames a subscriber may fall behind before the lag policy applies
    #[arg(long, env = "BOOK_STREAM_CHANNEL_CAPACITY", default_value_t = 10_000)]
    channel_capacity: usize,

    /// disconnect | drop-oldest
    #[arg(long, env = "BOOK_STREAM_LAG_POLICY", default_value = "disconnect")]
    lag_policy: LagPolicy,

    /// cancel-replace | keep-priority-on-reduce
    #[arg(long, env = "BOOK_STREAM_MODIFY_POLICY", default_value = "cancel-replace")]
    modify_policy: ModifyPolicy,

    /// Levels per side in the export; full depth when omitted
    #[arg(long)]
    export_depth: Option<usize>,

    #[arg(long, default_value_t = DEFAULT_MAX_ERROR_RATE)]
    max_error_rate: f64,
}

impl StreamArgs {
    fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            bind_addr: SocketAddr::new(self.host, self.tcp_port),
            target_rate: self.rate,
            batch_size: self.batch_size,
            channel_capacity: self.channel_capacity,
            lag_policy: self.lag_policy,
            ..StreamConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Stream(args) => stream(args).await,
        Command::Subscribe { connect, duration } => subscribe(connect, duration).await,
        Command::Generate { output, count, seed } => generate(&output, count, seed),
        Command::Validate {
            input,
            max_error_rate,
        } => validate(&input, max_error_rate),
    }
}

async fn stream(args: StreamArgs) -> Result<()> {
    info!(version = book_stream::SERVICE_VERSION, "Starting book-stream");

    let loaded = reader::load(&args.input)
        .with_context(|| format!("failed to load {}", args.input.display()))?;
    loaded
        .stats
        .validate(args.max_error_rate)
        .context("input failed validation")?;
    info!(
        messages = loaded.stats.total_messages,
        errors = loaded.stats.errors,
        symbols = loaded.stats.symbols.len(),
        "Feed loaded"
    );

    let recorder = Arc::new(MetricsRecorder::new());
    let book = Arc::new(RwLock::new(OrderBookAggregate::new(
        BookConfig {
            modify_policy: args.modify_policy,
        },
        Arc::clone(&recorder),
    )));
    let stream_metrics = Arc::new(StreamMetrics::new());
    let shutdown = ShutdownHandle::new();

    let server = StreamServer::bind_with_shutdown(args.stream_config(), Arc::clone(&stream_metrics), shutdown.clone())
        .await
        .context("failed to start stream server")?;

    let http_task = if args.http_port != 0 {
        let addr = SocketAddr::new(args.host, args.http_port);
        let state = AppState::new(Arc::clone(&book), Arc::clone(&stream_metrics));
        let shutdown = shutdown.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = http::serve(addr, state, shutdown).await {
                error!(error = %e, %addr, "Inspection API failed");
            }
        }))
    } else {
        None
    };

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Ctrl-C received, shutting down"),
                Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
            }
            shutdown.trigger();
        });
    }

    let writer = Arc::clone(&book);
    let summary = server
        .run(&loaded.events, move |event: &FeedEvent| -> Result<()> {
            let mut guard = writer.write().map_err(|_| anyhow!("book lock poisoned"))?;
            guard.apply(event)?;
            Ok(())
        })
        .await;

    if let Some(task) = http_task {
        if let Err(e) = task.await {
            error!(error = %e, "Inspection API task panicked");
        }
    }

    let guard = book.read().map_err(|_| anyhow!("book lock poisoned"))?;
    let source = args.input.display().to_string();
    let export = BookExport::build(&guard, args.export_depth, Some(&source));
    export
        .write_to(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    let engine = guard.metrics_snapshot();
    let wire = stream_metrics.snapshot();
    println!("Replay");
    println!("  events replayed:  {}/{}", summary.events_replayed, summary.events_total);
    println!("  callback errors:  {}", summary.callback_errors);
    println!("  throughput:       {:.0} msg/s", summary.throughput());
    println!("  cancelled:        {}", summary.cancelled);
    println!("Engine");
    println!("  messages:         {}", engine.messages_total);
    println!("  errors:           {}", engine.errors_total);
    println!("  latency p50/p99:  {:.4}/{:.4} ms", engine.latency.p50_ms, engine.latency.p99_ms);
    println!("Stream");
    println!("  messages sent:    {}", wire.messages_sent);
    println!("  bytes sent:       {}", wire.bytes_sent);
    println!("  messages dropped: {}", wire.messages_dropped);
    println!("Verification");
    for report in guard.verify_all() {
        if report.valid {
            println!("  {}: ok", report.symbol);
        } else {
            println!("  {}: {} violation(s)", report.symbol, report.violations.len());
            for violation in &report.violations {
                println!("    - {}", violation);
            }
        }
    }
    println!("State checksum: {}", guard.state_checksum());

    Ok(())
}

async fn subscribe(addr: SocketAddr, duration: u64) -> Result<()> {
    let mut client = StreamClient::connect(addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;
    let stats = client.receive_for(Duration::from_secs(duration)).await?;

    if let Some(welcome) = &stats.welcome {
        println!("Welcome: {}", welcome);
    }
    println!(
        "Received {} events in {:.2}s ({:.0} msg/s){}",
        stats.events,
        stats.elapsed.as_secs_f64(),
        stats.rate(),
        if stats.closed_by_server { ", closed by server" } else { "" }
    );
    Ok(())
}

fn generate(output: &Path, count: usize, seed: u64) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = File::create(output).with_context(|| format!("failed to create {}", output.display()))?;

    let mut generator = FeedGenerator::new(seed);
    let events = generator.generate(count);
    reader::write_csv(BufWriter::new(file), &events)?;

    info!(
        path = %output.display(),
        events = events.len(),
        active_orders = generator.active_orders(),
        seed,
        "Synthetic feed written"
    );
    Ok(())
}

fn validate(input: &Path, max_error_rate: f64) -> Result<()> {
    let loaded = reader::load(input).with_context(|| format!("failed to load {}", input.display()))?;
    println!("{}", serde_json::to_string_pretty(&loaded.stats)?);
    println!("Error rate: {:.2}%", loaded.stats.error_rate() * 100.0);

    if let Err(e) = loaded.stats.validate(max_error_rate) {
        bail!("validation failed: {}", e);
    }
    println!("Validation passed");
    Ok(())
}
