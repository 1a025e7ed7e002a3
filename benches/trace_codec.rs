//! Benchmark for recording and replaying traces
//!
//! Measures the cost of each pass over a counting loop of growing length.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use opencoder::{Frame, OpNum, Operand, Trace, TraceConfig, ValueType};
use std::time::Duration;

/// Record `iterations` loop bodies, each with a guard and resume data
fn build_loop(iterations: usize) -> Trace {
    let config = TraceConfig::default().with_trace_limit(iterations * 3 + 1);
    let mut trace = Trace::with_config(&[ValueType::Int, ValueType::Int], config);
    let inputs = trace.inputargs();
    let (mut counter, limit) = (inputs[0], inputs[1]);
    let mut frames = vec![
        Frame::new(1, 0, vec![Operand::Box(counter), Operand::Box(limit)]),
        Frame::new(2, 0, vec![]),
    ];
    for i in 0..iterations {
        let next = trace
            .record_op(OpNum::IntAdd, &[Operand::Box(counter), Operand::int(i as i64)], None)
            .expect("record int_add");
        let cond = trace
            .record_op(OpNum::IntLt, &[Operand::Box(next), Operand::Box(limit)], None)
            .expect("record int_lt");
        trace
            .record_op(OpNum::GuardTrue, &[Operand::Box(cond)], None)
            .expect("record guard");
        frames[1].pc = i as u32;
        frames[1].boxes = vec![Operand::Box(next)];
        trace
            .capture_resumedata(&mut frames, None, &[])
            .expect("capture resume data");
        counter = next;
    }
    trace
        .record_op(OpNum::Jump, &[Operand::Box(counter), Operand::Box(limit)], None)
        .expect("record jump");
    trace
}

const SIZES: [usize; 4] = [10, 100, 500, 1000];

fn bench_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("record");
    group.measurement_time(Duration::from_secs(5));

    for size in SIZES {
        group.throughput(Throughput::Elements((size * 3 + 1) as u64));
        group.bench_with_input(BenchmarkId::new("counting_loop", size), &size, |b, &size| {
            b.iter(|| build_loop(black_box(size)))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for size in SIZES {
        let trace = build_loop(size);
        group.throughput(Throughput::Bytes(trace.length() as u64));
        group.bench_with_input(BenchmarkId::new("ops", size), &trace, |b, trace| {
            b.iter(|| {
                let mut count = 0;
                for op in black_box(trace).get_iter() {
                    black_box(op.expect("decode"));
                    count += 1;
                }
                count
            })
        });
        group.bench_with_input(BenchmarkId::new("ops_with_snapshots", size), &trace, |b, trace| {
            b.iter(|| {
                let mut iter = black_box(trace).get_iter();
                let mut boxes = 0;
                while let Some(op) = iter.next() {
                    let op = op.expect("decode");
                    if let Some(resume) = op.resume_position() {
                        let si = iter.get_snapshot_iter(resume).expect("snapshot");
                        for &frame in si.framestack() {
                            let array = si.iter_array(frame).expect("array");
                            boxes += si.unpack_array(array).expect("unpack").len();
                        }
                    }
                }
                boxes
            })
        });
    }
    group.finish();
}

fn bench_liveness(c: &mut Criterion) {
    let mut group = c.benchmark_group("liveness");

    for size in SIZES {
        let trace = build_loop(size);
        group.throughput(Throughput::Elements(trace.num_ops() as u64));
        group.bench_with_input(BenchmarkId::new("live_ranges", size), &trace, |b, trace| {
            b.iter(|| black_box(trace).get_live_ranges().expect("live ranges"))
        });
        group.bench_with_input(BenchmarkId::new("dead_ranges", size), &trace, |b, trace| {
            b.iter(|| black_box(trace).get_dead_ranges().expect("dead ranges"))
        });
    }
    group.finish();
}

fn bench_cut(c: &mut Criterion) {
    let mut group = c.benchmark_group("cut");

    for size in SIZES {
        let trace = build_loop(size);
        let cut = Trace::new(&[ValueType::Int, ValueType::Int]).cut_point();
        let inputs = trace.inputargs();
        group.throughput(Throughput::Elements(trace.num_ops() as u64));
        group.bench_with_input(BenchmarkId::new("whole_loop", size), &trace, |b, trace| {
            b.iter(|| trace.cut_trace_from(black_box(cut), &inputs).expect("cut"))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_record, bench_decode, bench_liveness, bench_cut);
criterion_main!(benches);
