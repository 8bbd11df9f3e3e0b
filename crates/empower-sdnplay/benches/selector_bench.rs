//! Benchmarks for per-group MCS selection
//!
//! Run with: cargo bench --package empower-sdnplay

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use empower_core::{Address, Band, Probability, RadioBlock, RateEntry, RateTable};
use empower_sdnplay::{DemoMode, GroupScheduler, McsSelector};

/// Rate table with a receiver-dependent cut-off: rates at or below the
/// cut-off are reliable, the rest degrade with distance from it.
fn receiver_table(index: usize) -> RateTable {
    let cutoff = 3 + (index % 5) as u8;
    let entries = (0u8..8).map(|mcs| {
        let prob = if mcs <= cutoff {
            Probability::ONE
        } else {
            Probability::from_fraction(0.85 - 0.1 * f64::from(mcs - cutoff))
        };
        (mcs, RateEntry::with_probs(prob, prob))
    });
    RateTable::from_entries(0.9, entries)
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("MCS Selection");
    group.measurement_time(Duration::from_secs(5));

    let block = RadioBlock::new(0, Address([0x04, 0xF0, 0x21, 0x09, 0xF9, 0x9E]), 36, Band::HT20)
        .expect("valid block");

    for &receivers in &[1usize, 8, 32, 128] {
        let tables: Vec<RateTable> = (0..receivers).map(receiver_table).collect();
        let refs: Vec<&RateTable> = tables.iter().collect();

        group.throughput(Throughput::Elements(receivers as u64));
        group.bench_with_input(BenchmarkId::new("select_for", receivers), &refs, |b, refs| {
            b.iter(|| McsSelector::select_for(black_box(refs), black_box(&block)));
        });
    }

    group.finish();
}

fn bench_scheduler(c: &mut Criterion) {
    let mut group = c.benchmark_group("Group Scheduler");

    for &groups in &[1usize, 10, 100] {
        let addrs: Vec<Address> = (0..groups)
            .map(|i| Address([0x01, 0x00, 0x5E, 0x00, (i >> 8) as u8, i as u8]))
            .collect();
        let mut sched = GroupScheduler::new(1, 9, DemoMode::SdnPlay);
        for a in &addrs {
            sched.register(*a);
        }

        group.throughput(Throughput::Elements(groups as u64));
        group.bench_function(BenchmarkId::new("next_phase_all", groups), |b| {
            b.iter(|| {
                for a in &addrs {
                    black_box(sched.next_phase(*a));
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_select, bench_scheduler);
criterion_main!(benches);
