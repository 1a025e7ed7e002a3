/// Shared helpers for opencoder integration tests
///
/// - Logging setup so `RUST_LOG`-style output shows up under `--nocapture`
/// - Builders for small traces used across test files
use opencoder::{AbstractDescr, Frame, OpNum, Operand, Position, Trace, ValueType};

#[derive(Debug)]
pub struct FieldDescr(pub &'static str);

impl AbstractDescr for FieldDescr {}

/// Install a test subscriber once; later calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn b(pos: Position) -> Operand {
    Operand::Box(pos)
}

/// Build a counting loop body:
///
/// ```text
/// i2 = int_add(i0, 1)
/// i3 = int_lt(i2, i1)
/// guard_true(i3)        [frames: (7, pc) [i0, i1], (9, pc) [i2]]
/// jump(i2, i1)
/// ```
///
/// repeated `iterations` times with fresh positions.
pub fn counting_loop(iterations: usize) -> Trace {
    let mut trace = Trace::new(&[ValueType::Int, ValueType::Int]);
    let inputs = trace.inputargs();
    let (mut counter, limit) = (inputs[0], inputs[1]);
    let mut frames = vec![
        Frame::new(7, 0, vec![b(counter), b(limit)]),
        Frame::new(9, 0, vec![]),
    ];
    for i in 0..iterations {
        let next = trace
            .record_op(OpNum::IntAdd, &[b(counter), Operand::int(1)], None)
            .unwrap();
        let cond = trace
            .record_op(OpNum::IntLt, &[b(next), b(limit)], None)
            .unwrap();
        trace.record_op(OpNum::GuardTrue, &[b(cond)], None).unwrap();
        frames[1].pc = i as u32;
        frames[1].boxes = vec![b(next)];
        trace.capture_resumedata(&mut frames, None, &[]).unwrap();
        counter = next;
    }
    trace
        .record_op(OpNum::Jump, &[b(counter), b(limit)], None)
        .unwrap();
    trace
}
