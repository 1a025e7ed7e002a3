//! Opencoder - compact trace storage for a tracing JIT
//!
//! This library records the linear IR produced while tracing into a compact
//! byte buffer, replays it with reference identity preserved, and keeps the
//! interpreter state needed to resume after a failing guard.
//!
//! # Architecture
//!
//! 1. **Encoding** (`trace` module)
//!    - `record_op` appends one operation and returns its position
//!    - Small integers are stored inline, other constants are interned
//!    - Boxes are stored as distances back to their defining position
//!
//! 2. **Resume data** (`trace::snapshot`)
//!    - `capture_resumedata` attaches the frame stack to the last guard
//!    - Frames under the same callers share one snapshot chain
//!
//! 3. **Decoding** (`trace::iter`)
//!    - `get_iter` replays operations as `Rc` records
//!    - `get_snapshot_iter` unpacks a guard's frames and arrays
//!
//! 4. **Analyses and surgery**
//!    - `get_live_ranges` / `get_dead_ranges` for register allocation
//!    - `cut_point` / `cut_trace_from` for bridges
//!
//! # Example
//!
//! ```rust
//! use opencoder::{Frame, OpNum, Operand, Trace, Value, ValueType};
//!
//! let mut trace = Trace::new(&[ValueType::Int, ValueType::Int]);
//! let inputs = trace.inputargs();
//! let sum = trace
//!     .record_op(OpNum::IntAdd, &[inputs[0].into(), inputs[1].into()], None)
//!     .unwrap();
//! trace.record_op(OpNum::GuardTrue, &[sum.into()], None).unwrap();
//! let mut frames = [Frame::new(2, 1, vec![inputs[0].into(), sum.into()])];
//! trace.capture_resumedata(&mut frames, None, &[]).unwrap();
//! trace.record_op(OpNum::Finish, &[sum.into(), Operand::int(1)], None).unwrap();
//!
//! let mut iter = trace.get_iter();
//! let add = iter.next().unwrap().unwrap();
//! let guard = iter.next().unwrap().unwrap();
//! assert_eq!(guard.getarg(0), &Value::Op(add.clone()));
//!
//! let snapshots = iter.get_snapshot_iter(guard.resume_position().unwrap()).unwrap();
//! let frame = snapshots.framestack()[0];
//! assert_eq!(snapshots.unpack_jitcode_pc(frame).unwrap(), (2, 1));
//! ```

pub mod config;
pub mod error;
pub mod opcodes;
pub mod tag;
pub mod trace;
pub mod value;
pub mod varint;

pub use config::TraceConfig;
pub use error::{TraceError, TraceResult};
pub use opcodes::{Arity, OpClass, OpInfo, OpNum, ValueType};
pub use tag::{SMALL_INT_START, SMALL_INT_STOP, TAGBOX, TAGCONSTOTHER, TAGCONSTPTR, TAGINT};
pub use trace::{
    ArrayRef, CutPoint, Frame, ResumeFrame, SnapshotId, SnapshotIterator, Trace, TraceIterator,
    TraceStats,
};
pub use value::{AbstractDescr, Const, Descr, GcRef, InputArg, Operand, Position, ResOp, Value};
pub use varint::{
    decode_varint_signed, encode_varint_signed, skip_varint_signed, MAX_VALUE, MIN_VALUE,
};
