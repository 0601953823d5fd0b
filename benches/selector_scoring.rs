//! Benchmarks for provider selection
//!
//! This benchmark measures:
//! - Full selection (narrowing + scoring) per tier
//! - Selection with a partially filled tried set
//! - Raw scoring of a single provider

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use doc_enhance_core::routing::{ModelSelector, ProviderCatalog, SelectionCriteria};
use doc_enhance_core::types::{
    DocumentSignals, DocumentType, ProcessingPriority, ProviderId, RequestContext, UserTier,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn selector() -> ModelSelector {
    let selector = ModelSelector::new(Arc::new(ProviderCatalog::default()), ProviderId::ALL);
    // Warm the performance records so scoring reads real entries.
    for (i, id) in ProviderId::ALL.iter().enumerate() {
        selector
            .performance()
            .record_success(*id, Duration::from_millis(800 + 400 * i as u64), 0.004);
    }
    selector
}

fn bench_select_per_tier(c: &mut Criterion) {
    let selector = selector();
    let tried = BTreeSet::new();
    let signals = DocumentSignals {
        overall_score: 42.0,
        issue_count: 6,
        suggestion_count: 4,
        palette_size: 7,
        font_count: 3,
    };

    let mut group = c.benchmark_group("select");
    for tier in UserTier::ALL {
        let ctx =
            RequestContext::new(tier, DocumentType::Presentation).with_signals(signals.clone());
        let criteria = SelectionCriteria::from_context(&ctx);
        group.bench_with_input(BenchmarkId::new("tier", tier.as_str()), &criteria, |b, criteria| {
            b.iter(|| selector.select(black_box(criteria), black_box(&tried)).unwrap())
        });
    }
    group.finish();
}

fn bench_select_after_failures(c: &mut Criterion) {
    let selector = selector();
    let criteria = SelectionCriteria::from_context(
        &RequestContext::new(UserTier::Premium, DocumentType::Resume).with_cost_optimization(true),
    )
    .with_requester("bench-user");
    let tried: BTreeSet<ProviderId> =
        [ProviderId::ClaudeSonnet, ProviderId::Gpt4o].into_iter().collect();

    c.bench_function("select_with_tried_set", |b| {
        b.iter(|| selector.select(black_box(&criteria), black_box(&tried)).unwrap())
    });
}

fn bench_score(c: &mut Criterion) {
    let selector = selector();
    let now = Instant::now();

    let mut group = c.benchmark_group("score");
    for priority in [
        ProcessingPriority::Speed,
        ProcessingPriority::Balanced,
        ProcessingPriority::Quality,
    ] {
        group.bench_with_input(
            BenchmarkId::new("priority", priority.to_string()),
            &priority,
            |b, priority| {
                b.iter(|| {
                    selector.score(
                        black_box(ProviderId::Gpt4o),
                        *priority,
                        DocumentType::Marketing,
                        now,
                    )
                })
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_select_per_tier,
    bench_select_after_failures,
    bench_score,
);
criterion_main!(benches);
