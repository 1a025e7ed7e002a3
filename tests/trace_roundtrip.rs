//! Trace Round-Trip Integration Tests
//!
//! Records traces through the public API and checks that decoding,
//! resume data, liveness and cutting agree with what was recorded.

mod common;

use std::sync::Arc;

use common::{b, counting_loop, init_logging, FieldDescr};
use opencoder::{
    Const, Descr, Frame, GcRef, OpNum, Operand, Trace, TraceConfig, TraceError, TraceResult,
    Value, ValueType,
};

#[test]
fn test_counting_loop_roundtrip() {
    init_logging();
    let trace = counting_loop(4);
    let stats = trace.tracing_done();
    assert_eq!(stats.num_ops, 4 * 3 + 1);
    assert_eq!(stats.num_positions, 2 + 4 * 2);
    // one caller snapshot shared by all four guards
    assert_eq!(stats.num_snapshots, 1 + 4);

    let mut iter = trace.get_iter();
    let inputs = iter.inputargs();
    let mut guards = 0;
    let mut previous: Option<Value> = None;
    while let Some(op) = iter.next() {
        let op = op.unwrap();
        match op.opnum() {
            OpNum::IntAdd => {
                let expected = previous.clone().unwrap_or_else(|| inputs[0].clone());
                assert_eq!(op.getarg(0), &expected);
                assert_eq!(op.getarg(1).getint(), Some(1));
                previous = Some(Value::Op(op.clone()));
            }
            OpNum::GuardTrue => {
                let si = iter.get_snapshot_iter(op.resume_position().unwrap()).unwrap();
                let frames = si.framestack();
                assert_eq!(frames.len(), 2);
                assert_eq!(si.unpack_jitcode_pc(frames[0]).unwrap(), (7, 0));
                assert_eq!(si.unpack_jitcode_pc(frames[1]).unwrap(), (9, guards));
                assert_eq!(
                    si.unpack_array(si.iter_array(frames[1]).unwrap()).unwrap(),
                    vec![previous.clone().unwrap()]
                );
                guards += 1;
            }
            OpNum::Jump => {
                assert_eq!(op.getarglist(), &[previous.clone().unwrap(), inputs[1].clone()][..]);
            }
            _ => {}
        }
    }
    assert_eq!(guards, 4);
}

#[test]
fn test_cut_bridge_from_loop() {
    init_logging();
    let mut trace = Trace::new(&[ValueType::Int, ValueType::Ref]);
    let inputs = trace.inputargs();
    let (n, obj) = (inputs[0], inputs[1]);
    let descr: Descr = Arc::new(FieldDescr("value"));

    let field = trace
        .record_op(OpNum::GetfieldGcI, &[b(obj)], Some(descr.clone()))
        .unwrap();
    let cut = trace.cut_point();
    let sum = trace
        .record_op(OpNum::IntAdd, &[b(field), b(n)], None)
        .unwrap();
    trace
        .record_op(OpNum::SetfieldGc, &[b(obj), b(sum)], Some(descr.clone()))
        .unwrap();
    trace
        .record_op(OpNum::GuardNonnull, &[b(obj)], None)
        .unwrap();
    trace
        .capture_resumedata(&mut [Frame::new(1, 5, vec![b(sum), b(obj)])], Some(&[b(obj)][..]), &[])
        .unwrap();
    trace
        .record_op(OpNum::Finish, &[b(sum)], None)
        .unwrap();

    let bridge = trace.cut_trace_from(cut, &[obj, field, n]).unwrap();
    assert_eq!(bridge.input_types(), &[ValueType::Ref, ValueType::Int, ValueType::Int]);
    assert_eq!(bridge.num_ops(), 4);

    let mut iter = bridge.get_iter();
    let inputs = iter.inputargs();
    let ops: Vec<_> = iter.by_ref().collect::<TraceResult<_>>().unwrap();
    assert_eq!(ops[0].getarglist(), &[inputs[1].clone(), inputs[2].clone()][..]);
    assert!(Arc::ptr_eq(ops[1].getdescr().unwrap(), &descr));
    let si = iter.get_snapshot_iter(ops[2].resume_position().unwrap()).unwrap();
    assert_eq!(si.unpack_array(si.vable_array()).unwrap(), vec![inputs[0].clone()]);
    let frame = si.framestack()[0];
    assert_eq!(
        si.unpack_array(si.iter_array(frame).unwrap()).unwrap(),
        vec![Value::Op(ops[0].clone()), inputs[0].clone()]
    );

    // the source trace is untouched and still decodes fully
    assert_eq!(trace.get_iter().count(), 5);
}

#[test]
fn test_cut_requires_live_values() {
    let trace = counting_loop(2);
    let cut = Trace::new(&[ValueType::Int, ValueType::Int]).cut_point();
    let inputs = trace.inputargs();
    assert_eq!(
        trace.cut_trace_from(cut, &[inputs[0]]).unwrap_err(),
        TraceError::MissingCutInput(inputs[1])
    );
}

#[test]
fn test_concurrent_decode_passes() {
    let trace = counting_loop(50);
    let expected = trace.get_live_ranges().unwrap();
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    let ops = trace.get_iter().collect::<TraceResult<Vec<_>>>().unwrap();
                    (ops.len(), trace.get_live_ranges().unwrap())
                })
            })
            .collect();
        for handle in handles {
            let (len, live) = handle.join().unwrap();
            assert_eq!(len, trace.num_ops());
            assert_eq!(live, expected);
        }
    });
}

#[test]
fn test_constants_roundtrip() {
    let mut trace = Trace::new(&[]);
    let constants = [
        Const::Int(0),
        Const::Int(-1),
        Const::Int(i64::MAX),
        Const::Int(i64::MIN),
        Const::Float(-0.0),
        Const::Float(f64::INFINITY),
        Const::Ptr(GcRef::NULL),
        Const::Ptr(GcRef(0xdead_beef)),
    ];
    let args: Vec<Operand> = constants.iter().map(|c| Operand::Const(*c)).collect();
    trace.record_op(OpNum::EscapeN, &args, None).unwrap();
    trace.record_op(OpNum::EscapeN, &args, None).unwrap();
    assert_eq!(trace.num_bigints(), 2);
    assert_eq!(trace.num_floats(), 2);
    assert_eq!(trace.num_refs(), 2);

    for op in trace.get_iter() {
        let op = op.unwrap();
        let decoded: Vec<Const> = op.getarglist().iter().map(|v| *v.as_const().unwrap()).collect();
        assert_eq!(decoded, constants);
    }
}

#[test]
fn test_limit_from_toml() {
    let config = TraceConfig::parse_toml("trace_limit = 3").unwrap();
    let mut trace = Trace::with_config(&[ValueType::Int], config);
    let i0 = trace.inputargs()[0];
    for _ in 0..3 {
        trace.record_op(OpNum::IntNeg, &[b(i0)], None).unwrap();
    }
    assert_eq!(
        trace.record_op(OpNum::IntNeg, &[b(i0)], None),
        Err(TraceError::TraceTooLong { limit: 3 })
    );
}
