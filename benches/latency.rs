//! Latency benchmarks for the per-check hot path.
//!
//! Run with: cargo bench --bench latency

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use guard_core::config::{RiskConfig, TrailingConfig};
use guard_core::types::{Position, Snapshot};
use guard_core::{MockSnapshotProvider, NullNotifier};
use risk_manager::{PositionExitRule, RiskEngine, TrailingStop};
use rust_decimal::Decimal;
use std::sync::Arc;
use trading_engine::{ActionExecutor, ExecutorConfig, PaperGateway};

fn snapshot(positions: usize) -> Snapshot {
    Snapshot::new(
        (0..positions)
            .map(|i| {
                let sign = if i % 2 == 0 { 1 } else { -1 };
                Position::new(format!("SYM{}", i), 25 * sign)
                    .with_avg_price(Decimal::new(20_000 + i as i64, 0))
                    .with_pnl(Decimal::new(i as i64 * 3, 0), Decimal::new(sign * 7, 0))
            })
            .collect(),
    )
}

fn engine() -> RiskEngine {
    let config = RiskConfig {
        trailing: Some(TrailingConfig {
            activation_profit: Decimal::new(1_000_000, 0),
            trail_percent: Decimal::new(20, 0),
        }),
        position_take_profit_pct: Some(Decimal::new(50, 0)),
        position_stoploss_pct: Some(Decimal::new(50, 0)),
        ..RiskConfig::new(Decimal::new(-1_000_000, 0), Decimal::new(1_000_000, 0))
    };
    let executor = ActionExecutor::new(Arc::new(PaperGateway::new()), ExecutorConfig::default());
    RiskEngine::new(
        config,
        Arc::new(MockSnapshotProvider::new()),
        executor,
        Arc::new(NullNotifier),
    )
}

/// Benchmark a full within-limits evaluation (the common case).
fn bench_evaluate(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let mut group = c.benchmark_group("evaluate");

    for size in [1, 10, 50, 200] {
        let snap = snapshot(size);
        let mut engine = engine();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("within_limits", size), &snap, |b, snap| {
            b.iter(|| runtime.block_on(engine.evaluate(black_box(snap))))
        });
    }

    group.finish();
}

/// Benchmark snapshot aggregation used by every PNL update.
fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for size in [10, 200] {
        let snap = snapshot(size);
        group.bench_with_input(BenchmarkId::new("total_pnl", size), &snap, |b, snap| {
            b.iter(|| black_box(snap.total_pnl()))
        });
        group.bench_with_input(BenchmarkId::new("top_positions", size), &snap, |b, snap| {
            b.iter(|| black_box(snap.top_positions(5)))
        });
    }

    group.finish();
}

/// Benchmark the per-position and trailing rules in isolation.
fn bench_rules(c: &mut Criterion) {
    let mut group = c.benchmark_group("rules");

    let rule = PositionExitRule {
        take_profit_pct: Some(Decimal::new(10, 0)),
        stoploss_pct: Some(Decimal::new(5, 0)),
    };
    let position = Position::new("NIFTY24JUNFUT", 50)
        .with_avg_price(Decimal::new(23_000, 0))
        .with_pnl(Decimal::ZERO, Decimal::new(-4_200, 0));
    group.bench_function("position_exit", |b| {
        b.iter(|| black_box(rule.evaluate(black_box(&position))))
    });

    let trailing = TrailingStop::new(TrailingConfig {
        activation_profit: Decimal::new(1000, 0),
        trail_percent: Decimal::new(20, 0),
    });
    let current = Decimal::new(-1000, 0);
    let pnl = Decimal::new(15005, 1);
    group.bench_function("trailing_ratchet", |b| {
        b.iter(|| black_box(trailing.ratchet(black_box(current), black_box(pnl))))
    });

    group.finish();
}

criterion_group!(benches, bench_evaluate, bench_snapshot, bench_rules);

criterion_main!(benches);
