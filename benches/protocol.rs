//! Benchmarks for wire protocol encoding and decoding
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use predvis_rs::config::MOTE_BUFFER_SIZE;
use predvis_rs::feedback;
use predvis_rs::protocol::{classify, decode_bytecode_lines, deploy_frame, parse_neighbour_report};
use predvis_rs::topology::TopologyTracker;
use predvis_rs::{NodeId, VariableDetails};

fn neighbour_line(pairs: usize) -> String {
    let pairs: Vec<String> = (0..pairs)
        .map(|i| format!("{}.{},{}.{}", i % 16, i, (i + 1) % 16, i + 1))
        .collect();
    format!("R=42|{}", pairs.join("~"))
}

fn bench_deploy_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("deploy_frame");
    let target: NodeId = "10.99".parse().unwrap();
    let variables = [VariableDetails::new(1, 1), VariableDetails::new(2, 3)];

    for size in [16usize, 124, 1024].iter() {
        let bytecode: Vec<u8> = (0..*size).map(|i| (i % 256) as u8).collect();
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("encode", size), &bytecode, |b, bytecode| {
            b.iter(|| {
                black_box(deploy_frame(
                    7,
                    &target,
                    black_box(bytecode),
                    &variables,
                    MOTE_BUFFER_SIZE,
                ))
            });
        });

        let lines = deploy_frame(7, &target, &bytecode, &variables, MOTE_BUFFER_SIZE);
        group.bench_with_input(BenchmarkId::new("decode", size), &lines, |b, lines| {
            b.iter(|| black_box(decode_bytecode_lines(lines.iter().map(String::as_str))))
        });
    }

    group.finish();
}

fn bench_neighbour_reports(c: &mut Criterion) {
    let mut group = c.benchmark_group("neighbour_report");

    for pairs in [1usize, 8, 32].iter() {
        let line = neighbour_line(*pairs);
        group.throughput(Throughput::Elements(*pairs as u64));
        group.bench_with_input(BenchmarkId::new("parse", pairs), &line, |b, line| {
            b.iter(|| black_box(parse_neighbour_report(black_box(line))))
        });

        let report = parse_neighbour_report(&line).unwrap();
        group.bench_with_input(BenchmarkId::new("track", pairs), &report, |b, report| {
            b.iter(|| {
                let tracker = TopologyTracker::new();
                tracker.update(report.round, &report.pairs);
                black_box(tracker.snapshot())
            })
        });
    }

    group.finish();
}

fn bench_feedback_decode(c: &mut Criterion) {
    let line = "PF *1.2:7:0#1#4,1#2#2:0=10,1=20.5|0=11,1=-3|0=9,1=1e2:1500:1*";
    c.bench_function("feedback_decode", |b| {
        b.iter(|| black_box(feedback::decode(black_box(line))))
    });
    c.bench_function("classify_ignored", |b| {
        b.iter(|| black_box(classify(black_box("Rime started with address 1.0"))))
    });
}

criterion_group!(
    benches,
    bench_deploy_frame,
    bench_neighbour_reports,
    bench_feedback_decode,
);

criterion_main!(benches);
