//! Single-pass trace decoding

use smallvec::SmallVec;
use std::rc::Rc;

use super::{SnapshotIterator, Tagged, Trace};
use crate::error::{TraceError, TraceResult};
use crate::value::{InputArg, Position, ResOp, Value};

/// Forward cursor over a trace
///
/// Each pass owns its identity map: every reference to a position yields
/// the same `Rc` record, and two passes never share records.
pub struct TraceIterator<'t> {
    trace: &'t Trace,
    inputargs: Vec<Rc<InputArg>>,
    /// Value-producing records, indexed by `position - num_inputargs`
    defined: Vec<Rc<ResOp>>,
    offset: usize,
    end: usize,
    index: u32,
}

impl<'t> TraceIterator<'t> {
    pub(crate) fn new(trace: &'t Trace) -> Self {
        let inputargs: Vec<_> = trace
            .input_types()
            .iter()
            .enumerate()
            .map(|(i, ty)| Rc::new(InputArg::new(Position::new(i as u32), *ty)))
            .collect();
        TraceIterator {
            trace,
            index: inputargs.len() as u32,
            inputargs,
            defined: Vec::with_capacity(trace.num_positions() - trace.num_inputargs()),
            offset: 0,
            end: trace.length(),
        }
    }

    #[inline]
    pub fn done(&self) -> bool {
        self.offset >= self.end
    }

    /// Trace being decoded
    #[inline]
    pub fn trace(&self) -> &'t Trace {
        self.trace
    }

    /// Input records of this pass
    pub fn inputargs(&self) -> Vec<Value> {
        self.inputargs.iter().cloned().map(Value::Input).collect()
    }

    /// Byte offset of the next operation
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Position the next value-producing operation will take
    #[inline]
    pub fn index(&self) -> Position {
        Position::new(self.index)
    }

    /// Record already decoded for `pos`
    pub fn resolve(&self, pos: Position) -> TraceResult<Value> {
        let i = pos.index();
        if let Some(arg) = self.inputargs.get(i) {
            return Ok(Value::Input(arg.clone()));
        }
        self.defined
            .get(i - self.inputargs.len())
            .map(|op| Value::Op(op.clone()))
            .ok_or(TraceError::Corrupt {
                offset: self.offset,
                reason: "reference to a value not yet decoded",
            })
    }

    pub(crate) fn materialize(&self, tagged: Tagged, offset: usize) -> TraceResult<Value> {
        match tagged {
            Tagged::Box(pos) => self.resolve(pos),
            other => self
                .trace
                .tagged_const(other, offset)?
                .map(Value::Const)
                .ok_or(TraceError::Corrupt {
                    offset,
                    reason: "bad tagged operand",
                }),
        }
    }

    /// Resume data of a decoded guard
    pub fn get_snapshot_iter(&self, resume_position: usize) -> TraceResult<SnapshotIterator<'_, 't>> {
        SnapshotIterator::new(self, resume_position)
    }

    /// Decode the next operation
    pub fn next_op(&mut self) -> TraceResult<Rc<ResOp>> {
        let offset = self.offset;
        let (raw, next) = self.trace.read_op(offset, self.index, true)?;

        let args = raw
            .args
            .iter()
            .map(|arg| self.materialize(*arg, offset))
            .collect::<TraceResult<SmallVec<[Value; 3]>>>()?;

        let (descr, resume) = match raw.slot {
            Some(resume) if raw.opnum.is_guard() => (None, Some(resume)),
            Some(0) | None => (None, None),
            Some(slot) => {
                let descr = self.trace.descr_for_slot(slot).ok_or(TraceError::Corrupt {
                    offset,
                    reason: "descriptor index out of range",
                })?;
                (Some(descr.clone()), None)
            }
        };

        let op = Rc::new(ResOp::new(raw.opnum, args, descr, raw.position, resume));
        if raw.opnum.produces_value() {
            self.defined.push(op.clone());
            self.index += 1;
        }
        self.offset = next;
        Ok(op)
    }
}

impl Iterator for TraceIterator<'_> {
    type Item = TraceResult<Rc<ResOp>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done() {
            return None;
        }
        let result = self.next_op();
        if result.is_err() {
            // a corrupt buffer ends the pass
            self.offset = self.end;
        }
        Some(result)
    }
}
