//! Bridge extraction
//!
//! A cut point marks where a later bridge may start. Cutting re-records the
//! operations after it into a fresh trace whose inputs are the values live
//! at the cut.

use smallvec::SmallVec;
use std::collections::HashMap;
use tracing::debug;

use super::{SnapshotId, Trace};
use crate::error::{TraceError, TraceResult};
use crate::value::{Operand, Position, Value};

/// Opaque marker returned by [`Trace::cut_point`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutPoint {
    offset: usize,
    count: usize,
    index: u32,
}

impl CutPoint {
    /// Number of operations recorded before the cut
    pub fn num_ops(&self) -> usize {
        self.count
    }

    /// First position defined after the cut
    pub fn position(&self) -> Position {
        Position::new(self.index)
    }
}

/// Old position to new position
type Retarget = HashMap<Position, Position>;

fn retarget(value: &Value, mapping: &Retarget) -> TraceResult<Operand> {
    match value.to_operand() {
        Operand::Box(pos) => mapping
            .get(&pos)
            .map(|new| Operand::Box(*new))
            .ok_or(TraceError::MissingCutInput(pos)),
        constant => Ok(constant),
    }
}

fn retarget_all(values: &[Value], mapping: &Retarget) -> TraceResult<Vec<Operand>> {
    values.iter().map(|v| retarget(v, mapping)).collect()
}

impl Trace {
    /// Mark the current end of the trace
    pub fn cut_point(&self) -> CutPoint {
        CutPoint {
            offset: self.length(),
            count: self.num_ops(),
            index: self.num_positions() as u32,
        }
    }

    /// Build a new trace from the operations recorded after `cut`
    ///
    /// `new_inputs` become the inputs of the new trace, in order. Every
    /// value used after the cut must be either defined after it or listed
    /// in `new_inputs`. Resume data is copied with its sharing preserved.
    pub fn cut_trace_from(&self, cut: CutPoint, new_inputs: &[Position]) -> TraceResult<Trace> {
        if cut.offset > self.length()
            || cut.count > self.num_ops()
            || cut.index as usize > self.num_positions()
        {
            return Err(TraceError::InvalidCutPoint { offset: cut.offset });
        }

        let mut iter = self.get_iter();
        while iter.offset() < cut.offset {
            iter.next_op()?;
        }
        if iter.offset() != cut.offset || iter.index() != cut.position() {
            return Err(TraceError::InvalidCutPoint { offset: cut.offset });
        }

        let mut mapping = Retarget::with_capacity(new_inputs.len());
        let mut types = Vec::with_capacity(new_inputs.len());
        for (i, &pos) in new_inputs.iter().enumerate() {
            if pos.as_u32() >= cut.index {
                return Err(TraceError::InvalidCutInput(pos));
            }
            types.push(iter.resolve(pos)?.value_type());
            mapping.entry(pos).or_insert(Position::new(i as u32));
        }

        let mut bridge = Trace::with_config(&types, self.config.clone());
        let mut snapshots: HashMap<SnapshotId, SnapshotId> = HashMap::new();

        while let Some(op) = iter.next() {
            let op = op?;
            let args = op
                .getarglist()
                .iter()
                .map(|arg| retarget(arg, &mapping))
                .collect::<TraceResult<SmallVec<[Operand; 3]>>>()?;
            let new_pos = bridge.record_op(op.opnum(), &args, op.getdescr().cloned())?;
            if op.opnum().produces_value() {
                mapping.insert(op.position(), new_pos);
            }

            let Some(resume) = op.resume_position() else {
                continue;
            };
            if resume >= self.num_resume_records() {
                // guard recorded last, still without resume data
                continue;
            }
            let si = iter.get_snapshot_iter(resume)?;
            let mut parent = None;
            for &id in si.framestack() {
                let copied = match snapshots.get(&id) {
                    Some(&copied) => copied,
                    None => {
                        let (jitcode_index, pc) = si.unpack_jitcode_pc(id)?;
                        let boxes = retarget_all(&si.unpack_array(si.iter_array(id)?)?, &mapping)?;
                        let copied = bridge.push_snapshot(jitcode_index, pc, &boxes, parent)?;
                        snapshots.insert(id, copied);
                        copied
                    }
                };
                parent = Some(copied);
            }
            let vable = retarget_all(&si.unpack_array(si.vable_array())?, &mapping)?;
            let vref = retarget_all(&si.unpack_array(si.vref_array())?, &mapping)?;
            bridge.attach_resume(parent, &vable, &vref)?;
        }

        debug!(
            inputs = new_inputs.len(),
            ops = bridge.num_ops(),
            skipped = cut.count,
            snapshots = bridge.num_snapshots(),
            "cut trace"
        );
        Ok(bridge)
    }
}
