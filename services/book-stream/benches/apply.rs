//! Benchmarks for book apply throughput

use std::sync::Arc;

use book_stream::aggregate::{BookConfig, OrderBookAggregate};
use book_stream::metrics::MetricsRecorder;
use book_stream::synth::{alternating_new_orders, FeedGenerator};
use book_stream::wire;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use types::event::FeedEvent;

fn aggregate() -> OrderBookAggregate {
    OrderBookAggregate::new(BookConfig::default(), Arc::new(MetricsRecorder::new()))
}

fn benchmark_apply_mixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_mixed");

    for size in [1_000usize, 10_000, 100_000] {
        let events: Vec<FeedEvent> = FeedGenerator::new(42)
            .generate(size)
            .into_iter()
            .map(FeedEvent::from)
            .collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("{}_events", size), |b| {
            b.iter_batched(
                aggregate,
                |mut agg| {
                    for event in &events {
                        let _ = black_box(agg.apply(event));
                    }
                    agg
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn benchmark_apply_deep_book(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_deep_book");
    let events = alternating_new_orders("SYN", 50_000);

    group.throughput(Throughput::Elements(events.len() as u64));
    group.bench_function("50000_new_orders", |b| {
        b.iter_batched(
            aggregate,
            |mut agg| {
                for event in &events {
                    let _ = black_box(agg.apply(event));
                }
                agg
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

fn benchmark_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("queries");
    let mut agg = aggregate();
    for event in alternating_new_orders("SYN", 20_000) {
        let _ = agg.apply(&event);
    }

    group.bench_function("best_bid_ask", |b| b.iter(|| black_box(agg.best_bid_ask("SYN"))));
    group.bench_function("top_10", |b| b.iter(|| black_box(agg.top("SYN", 10))));
    group.bench_function("state_checksum", |b| b.iter(|| black_box(agg.state_checksum())));

    group.finish();
}

fn benchmark_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("wire");
    let events = alternating_new_orders("SYN", 1_000);

    group.throughput(Throughput::Elements(events.len() as u64));
    group.bench_function("encode_1000", |b| {
        b.iter(|| {
            for event in &events {
                let _ = black_box(wire::encode(event));
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_apply_mixed,
    benchmark_apply_deep_book,
    benchmark_queries,
    benchmark_encode
);
criterion_main!(benches);
