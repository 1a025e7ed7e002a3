//! Compact trace storage
//!
//! A [`Trace`] records operations into a flat byte buffer instead of a graph
//! of heap objects. Each operation is laid out as:
//!
//! ```text
//! opnum:u8 [argcount:varint] arg:varint* [slot:varint]
//! ```
//!
//! - `argcount` is present only for variadic operations.
//! - Each `arg` is a tagged varint (see [`crate::tag`]). Boxes are written
//!   as the distance from the operation's own position back to the
//!   defining position, so local uses stay short.
//! - `slot` is present for operations carrying a descriptor: for guards it
//!   is the index of the guard's resume record, otherwise `0` for "no
//!   descriptor" or `descr_index + 1`.
//!
//! Side tables hold interned constants (big ints, floats, GC pointers), the
//! descriptor list, the snapshot arena and resume records.
//!
//! ## Positions
//!
//! Inputs take positions `0..n`. Each value-producing operation takes the
//! next position; void operations (guards, stores, `finish`) report the
//! position the next value will take and do not consume it. Positions are
//! therefore dense and usable as array indices by the liveness passes.

mod cut;
mod iter;
mod liveness;
mod snapshot;


use indexmap::IndexSet;
use smallvec::SmallVec;
use std::fmt::Write as _;
use tracing::{debug, trace, warn};

use crate::config::TraceConfig;
use crate::error::{TraceError, TraceResult};
use crate::opcodes::{Arity, OpNum, ValueType};
use crate::tag::{is_small_int, tag, untag, TAGBOX, TAGCONSTOTHER, TAGCONSTPTR, TAGINT};
use crate::value::{Const, Descr, GcRef, Operand, Position};
use crate::varint::{decode_varint_signed, encode_varint_signed, skip_varint_signed};

pub use cut::CutPoint;
pub use iter::TraceIterator;
pub use snapshot::{ArrayRef, Frame, ResumeFrame, SnapshotId, SnapshotIterator};

use snapshot::{ResumeRecord, SnapshotNode};

/// Decoded but unresolved operand
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Tagged {
    Int(i64),
    Ptr(usize),
    BigInt(usize),
    Float(usize),
    Box(Position),
}

/// Operation read straight from the buffer, arguments still tagged
#[derive(Debug)]
pub(crate) struct RawOp {
    pub opnum: OpNum,
    pub args: SmallVec<[Tagged; 3]>,
    /// Descriptor slot; always read for guards, skipped for other ops
    /// unless requested
    pub slot: Option<usize>,
    pub position: Position,
}

/// Summary reported when tracing finishes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceStats {
    /// Size of the operation buffer in bytes
    pub length: usize,
    pub num_ops: usize,
    pub num_positions: usize,
    pub num_snapshots: usize,
    pub num_resume_records: usize,
    /// Size of the snapshot array buffer in bytes
    pub snapshot_bytes: usize,
    pub num_bigints: usize,
    pub num_floats: usize,
    /// GC pointer table size, including the null slot
    pub num_refs: usize,
    pub num_descrs: usize,
}

/// A recorded trace
#[derive(Debug, Clone)]
pub struct Trace {
    config: TraceConfig,
    input_types: Vec<ValueType>,
    ops: Vec<u8>,
    /// Number of recorded operations
    count: usize,
    /// Next free position
    index: u32,
    bigints: IndexSet<i64>,
    /// Float constants by bit pattern
    floats: IndexSet<u64>,
    refs: IndexSet<GcRef>,
    descrs: Vec<Descr>,
    snapshot_data: Vec<u8>,
    snapshots: Vec<SnapshotNode>,
    resumes: Vec<ResumeRecord>,
    /// Guard waiting for `capture_resumedata`
    pending_guard: Option<Position>,
}

impl Trace {
    /// Create an empty trace with inputs of the given types
    pub fn new(input_types: &[ValueType]) -> Self {
        Self::with_config(input_types, TraceConfig::default())
    }

    pub fn with_config(input_types: &[ValueType], config: TraceConfig) -> Self {
        let mut refs = IndexSet::new();
        refs.insert(GcRef::NULL);
        Trace {
            ops: Vec::with_capacity(config.init_size),
            config,
            input_types: input_types.to_vec(),
            count: 0,
            index: input_types.len() as u32,
            bigints: IndexSet::new(),
            floats: IndexSet::new(),
            refs,
            descrs: Vec::new(),
            snapshot_data: Vec::new(),
            snapshots: Vec::new(),
            resumes: Vec::new(),
            pending_guard: None,
        }
    }

    /// Positions of the input arguments
    pub fn inputargs(&self) -> Vec<Position> {
        (0..self.input_types.len() as u32).map(Position::new).collect()
    }

    #[inline]
    pub fn input_types(&self) -> &[ValueType] {
        &self.input_types
    }

    #[inline]
    pub fn num_inputargs(&self) -> usize {
        self.input_types.len()
    }

    /// Size of the operation buffer in bytes
    #[inline]
    pub fn length(&self) -> usize {
        self.ops.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of recorded operations
    #[inline]
    pub fn num_ops(&self) -> usize {
        self.count
    }

    /// Number of positions in use, inputs included
    #[inline]
    pub fn num_positions(&self) -> usize {
        self.index as usize
    }

    #[inline]
    pub fn num_snapshots(&self) -> usize {
        self.snapshots.len()
    }

    #[inline]
    pub fn num_resume_records(&self) -> usize {
        self.resumes.len()
    }

    /// Size of the GC pointer table, including the null slot
    #[inline]
    pub fn num_refs(&self) -> usize {
        self.refs.len()
    }

    #[inline]
    pub fn num_bigints(&self) -> usize {
        self.bigints.len()
    }

    #[inline]
    pub fn num_floats(&self) -> usize {
        self.floats.len()
    }

    #[inline]
    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Whether a guard is waiting for its resume data
    #[inline]
    pub fn has_pending_guard(&self) -> bool {
        self.pending_guard.is_some()
    }

    /// Record one operation and return its position
    ///
    /// Void operations return the position the next value will take.
    /// On error nothing is written.
    pub fn record_op(
        &mut self,
        opnum: OpNum,
        args: &[Operand],
        descr: Option<Descr>,
    ) -> TraceResult<Position> {
        if let Some(guard) = self.pending_guard {
            return Err(TraceError::ResumeDataPending(guard));
        }
        if self.count >= self.config.trace_limit {
            warn!(limit = self.config.trace_limit, "trace too long");
            return Err(TraceError::TraceTooLong {
                limit: self.config.trace_limit,
            });
        }
        if !opnum.accepts_args(args.len()) {
            let expected = match opnum.arity() {
                Arity::Fixed(n) => n as usize,
                Arity::Variadic => args.len(),
            };
            return Err(TraceError::ArityMismatch {
                opnum,
                expected,
                got: args.len(),
            });
        }
        if descr.is_some() && (!opnum.has_descr() || opnum.is_guard()) {
            return Err(TraceError::UnexpectedDescr(opnum));
        }

        let start = self.ops.len();
        if let Err(e) = self.write_op(opnum, args, descr) {
            self.ops.truncate(start);
            return Err(e);
        }

        let position = Position::new(self.index);
        self.count += 1;
        if opnum.produces_value() {
            self.index += 1;
        }
        if opnum.is_guard() {
            self.pending_guard = Some(position);
        }
        trace!(op = opnum.name(), %position, bytes = self.ops.len() - start, "recorded");
        Ok(position)
    }

    fn write_op(&mut self, opnum: OpNum, args: &[Operand], descr: Option<Descr>) -> TraceResult<()> {
        self.ops.push(opnum.to_byte());
        if opnum.arity() == Arity::Variadic {
            encode_varint_signed(args.len() as i64, &mut self.ops)?;
        }
        for arg in args {
            let tagged = self.encode_operand(arg, self.index)?;
            encode_varint_signed(tagged, &mut self.ops)?;
        }
        if opnum.has_descr() {
            let slot = if opnum.is_guard() {
                self.resumes.len()
            } else {
                match descr {
                    Some(descr) => {
                        self.descrs.push(descr);
                        self.descrs.len()
                    }
                    None => 0,
                }
            };
            if let Err(e) = encode_varint_signed(slot as i64, &mut self.ops) {
                if !opnum.is_guard() && slot != 0 {
                    self.descrs.pop();
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Tag an operand; boxes are written relative to `anchor`
    pub(crate) fn encode_operand(&mut self, arg: &Operand, anchor: u32) -> TraceResult<i64> {
        match *arg {
            Operand::Box(pos) => {
                if pos.as_u32() >= anchor {
                    return Err(TraceError::UndefinedPosition(pos));
                }
                tag(TAGBOX, anchor as i64 - pos.as_u32() as i64)
            }
            Operand::Const(Const::Int(value)) if is_small_int(value) => tag(TAGINT, value),
            Operand::Const(Const::Int(value)) => {
                let (index, _) = self.bigints.insert_full(value);
                tag(TAGCONSTOTHER, (index as i64) << 1)
            }
            Operand::Const(Const::Float(value)) => {
                let (index, _) = self.floats.insert_full(value.to_bits());
                tag(TAGCONSTOTHER, ((index as i64) << 1) | 1)
            }
            Operand::Const(Const::Ptr(gcref)) => tag(TAGCONSTPTR, self.const_ptr_index(gcref) as i64),
        }
    }

    /// Intern a GC pointer constant; null always maps to slot 0
    pub fn const_ptr_index(&mut self, gcref: GcRef) -> usize {
        self.refs.insert_full(gcref).0
    }

    /// Intern a big integer constant
    pub fn const_bigint_index(&mut self, value: i64) -> usize {
        self.bigints.insert_full(value).0
    }

    /// Intern a float constant
    pub fn const_float_index(&mut self, value: f64) -> usize {
        self.floats.insert_full(value.to_bits()).0
    }

    /// Read the operation at `offset` whose position is `index`
    pub(crate) fn read_op(
        &self,
        offset: usize,
        index: u32,
        with_descr: bool,
    ) -> TraceResult<(RawOp, usize)> {
        let byte = *self.ops.get(offset).ok_or(TraceError::Truncated { offset })?;
        let opnum = OpNum::from_byte(byte).ok_or(TraceError::UnknownOpcode { byte, offset })?;
        let mut pos = offset + 1;

        let count = match opnum.arity() {
            Arity::Fixed(n) => n as usize,
            Arity::Variadic => {
                let (n, next) = decode_varint_signed(&self.ops, pos)?;
                // every argument takes at least two bytes
                if n < 0 || n as usize > (self.ops.len() - next) / 2 {
                    return Err(TraceError::Corrupt {
                        offset: pos,
                        reason: "bad argument count",
                    });
                }
                pos = next;
                n as usize
            }
        };

        let mut args = SmallVec::with_capacity(count);
        for _ in 0..count {
            let (value, next) = decode_varint_signed(&self.ops, pos)?;
            args.push(decode_tagged(value, index, pos)?);
            pos = next;
        }

        let mut slot = None;
        if opnum.has_descr() {
            if with_descr || opnum.is_guard() {
                let (value, next) = decode_varint_signed(&self.ops, pos)?;
                if value < 0 {
                    return Err(TraceError::Corrupt {
                        offset: pos,
                        reason: "negative descriptor slot",
                    });
                }
                slot = Some(value as usize);
                pos = next;
            } else {
                pos = skip_varint_signed(&self.ops, pos)?;
            }
        }

        Ok((
            RawOp {
                opnum,
                args,
                slot,
                position: Position::new(index),
            },
            pos,
        ))
    }

    pub(crate) fn bigint(&self, index: usize) -> Option<i64> {
        self.bigints.get_index(index).copied()
    }

    pub(crate) fn float(&self, index: usize) -> Option<f64> {
        self.floats.get_index(index).map(|bits| f64::from_bits(*bits))
    }

    pub(crate) fn gcref(&self, index: usize) -> Option<GcRef> {
        self.refs.get_index(index).copied()
    }

    /// Descriptor stored in a non-guard slot
    pub(crate) fn descr_for_slot(&self, slot: usize) -> Option<&Descr> {
        slot.checked_sub(1).and_then(|i| self.descrs.get(i))
    }

    /// Resolve a tagged constant; `None` for boxes
    pub(crate) fn tagged_const(&self, tagged: Tagged, offset: usize) -> TraceResult<Option<Const>> {
        let missing = TraceError::Corrupt {
            offset,
            reason: "constant index out of range",
        };
        Ok(Some(match tagged {
            Tagged::Int(value) => Const::Int(value),
            Tagged::BigInt(i) => Const::Int(self.bigint(i).ok_or(missing)?),
            Tagged::Float(i) => Const::Float(self.float(i).ok_or(missing)?),
            Tagged::Ptr(i) => Const::Ptr(self.gcref(i).ok_or(missing)?),
            Tagged::Box(_) => return Ok(None),
        }))
    }

    /// Start a decode pass
    pub fn get_iter(&self) -> TraceIterator<'_> {
        TraceIterator::new(self)
    }

    /// Report statistics once recording is over
    pub fn tracing_done(&self) -> TraceStats {
        let stats = TraceStats {
            length: self.ops.len(),
            num_ops: self.count,
            num_positions: self.index as usize,
            num_snapshots: self.snapshots.len(),
            num_resume_records: self.resumes.len(),
            snapshot_bytes: self.snapshot_data.len(),
            num_bigints: self.bigints.len(),
            num_floats: self.floats.len(),
            num_refs: self.refs.len(),
            num_descrs: self.descrs.len(),
        };
        debug!(
            length = stats.length,
            ops = stats.num_ops,
            positions = stats.num_positions,
            snapshots = stats.num_snapshots,
            snapshot_bytes = stats.snapshot_bytes,
            bigints = stats.num_bigints,
            floats = stats.num_floats,
            refs = stats.num_refs,
            descrs = stats.num_descrs,
            "tracing done"
        );
        stats
    }

    /// Human-readable listing of the operation log
    pub fn disassemble(&self) -> String {
        let mut output = String::new();
        let mut types = self.input_types.clone();
        let inputs: Vec<String> = types
            .iter()
            .enumerate()
            .map(|(i, ty)| format!("{}{}", ty.prefix(), i))
            .collect();
        let _ = writeln!(output, "=== trace ===");
        let _ = writeln!(
            output,
            "inputs: [{}], ops: {}, bytes: {}",
            inputs.join(", "),
            self.count,
            self.ops.len()
        );

        let mut offset = 0;
        let mut index = self.num_inputargs() as u32;
        while offset < self.ops.len() {
            let (op, next) = match self.read_op(offset, index, true) {
                Ok(read) => read,
                Err(e) => {
                    let _ = writeln!(output, "{:04x} ??? ({})", offset, e);
                    break;
                }
            };
            let args: Vec<String> = op
                .args
                .iter()
                .map(|arg| self.format_tagged(*arg, &types))
                .collect();
            let result = if op.opnum.produces_value() {
                format!("{}{} = ", op.opnum.result_type().prefix(), index)
            } else {
                String::new()
            };
            let suffix = match op.slot {
                Some(resume) if op.opnum.is_guard() => format!(" [resume {}]", resume),
                Some(slot) => match self.descr_for_slot(slot) {
                    Some(descr) => format!(" descr={:?}", descr),
                    None => String::new(),
                },
                None => String::new(),
            };
            let _ = writeln!(
                output,
                "{:04x} {}{}({}){}",
                offset,
                result,
                op.opnum.name(),
                args.join(", "),
                suffix
            );
            if op.opnum.produces_value() {
                types.push(op.opnum.result_type());
                index += 1;
            }
            offset = next;
        }

        output
    }

    fn format_tagged(&self, tagged: Tagged, types: &[ValueType]) -> String {
        match tagged {
            Tagged::Box(pos) => {
                let prefix = types.get(pos.index()).map_or('?', |ty| ty.prefix());
                format!("{}{}", prefix, pos.as_u32())
            }
            other => match self.tagged_const(other, 0) {
                Ok(Some(c)) => c.to_string(),
                _ => "???".to_string(),
            },
        }
    }
}

/// Split a tagged varint into its operand; boxes resolve against `anchor`
pub(crate) fn decode_tagged(value: i64, anchor: u32, offset: usize) -> TraceResult<Tagged> {
    let (kind, payload) = untag(value);
    match kind {
        TAGINT => Ok(Tagged::Int(payload)),
        TAGCONSTPTR if payload >= 0 => Ok(Tagged::Ptr(payload as usize)),
        TAGCONSTOTHER if payload >= 0 => {
            let index = (payload >> 1) as usize;
            if payload & 1 == 0 {
                Ok(Tagged::BigInt(index))
            } else {
                Ok(Tagged::Float(index))
            }
        }
        TAGBOX if payload > 0 && payload <= anchor as i64 => {
            Ok(Tagged::Box(Position::new(anchor - payload as u32)))
        }
        _ => Err(TraceError::Corrupt {
            offset,
            reason: "bad tagged operand",
        }),
    }
}
