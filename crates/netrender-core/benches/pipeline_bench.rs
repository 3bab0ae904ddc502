//! # Pipeline Benchmarks
//!
//! Parse, import and render throughput for netrender-core.
//!
//! Run with: `cargo bench -p netrender-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use netrender_core::{Parser, State, generate, state_to_yaml};
use std::hint::black_box;
use std::path::Path;

/// A document with `size` ethernets, bridged in pairs.
fn build_document(size: usize) -> String {
    let mut text = String::from("network:\n  renderer: networkd\n  ethernets:\n");
    for i in 0..size {
        text.push_str(&format!(
            "    eth{}:\n      mtu: 1500\n      addresses: [10.{}.{}.2/24]\n",
            i,
            i / 256,
            i % 256
        ));
    }
    text.push_str("  bridges:\n");
    for i in (0..size.saturating_sub(1)).step_by(2) {
        text.push_str(&format!(
            "    br{}:\n      interfaces: [eth{}, eth{}]\n      dhcp4: true\n",
            i / 2,
            i,
            i + 1
        ));
    }
    text
}

fn import(text: &str) -> State {
    let mut parser = Parser::new();
    parser
        .load_yaml_str(text, Path::new("/etc/netplan/bench.yaml"))
        .expect("load");
    let mut state = State::new();
    state.import_from(&mut parser).expect("import");
    state
}

fn bench_import(c: &mut Criterion) {
    let mut group = c.benchmark_group("import");
    for size in [10, 100, 500] {
        let text = build_document(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &text, |b, text| {
            b.iter(|| black_box(import(text)));
        });
    }
    group.finish();
}

fn bench_overlay(c: &mut Criterion) {
    let text = build_document(200);
    c.bench_function("overlay_200_twice", |b| {
        b.iter(|| {
            let mut parser = Parser::new();
            let origin = Path::new("/etc/netplan/bench.yaml");
            parser.load_yaml_str(&text, origin).expect("first");
            parser.load_yaml_str(&text, origin).expect("second");
            black_box(parser.len())
        });
    });
}

fn bench_generate(c: &mut Criterion) {
    let state = import(&build_document(100));
    let dir = tempfile::tempdir().expect("tempdir");
    c.bench_function("generate_100", |b| {
        b.iter(|| black_box(generate(&state, dir.path()).expect("generate")));
    });
}

fn bench_export(c: &mut Criterion) {
    let state = import(&build_document(100));
    c.bench_function("state_to_yaml_100", |b| {
        b.iter(|| black_box(state_to_yaml(&state).expect("yaml")));
    });
}

criterion_group!(
    benches,
    bench_import,
    bench_overlay,
    bench_generate,
    bench_export
);
criterion_main!(benches);
