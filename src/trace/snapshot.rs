//! Guard resume data
//!
//! Each guard owns a resume record: the snapshot of its innermost frame,
//! plus the virtualizable and virtual-ref arrays. Snapshots live in an
//! arena and point to their caller's snapshot by index, so guards recorded
//! under the same callers share one parent chain.
//!
//! Arrays are stored in a separate byte buffer as
//! `len:varint anchor:varint item:varint*`, using the same tagged encoding
//! as operation arguments with box distances taken from `anchor`.

use smallvec::SmallVec;
use tracing::debug;

use super::{decode_tagged, Tagged, Trace, TraceIterator};
use crate::error::{TraceError, TraceResult};
use crate::value::{Operand, Position, Value};
use crate::varint::{decode_varint_signed, encode_varint_signed};

/// Index of a snapshot in a trace's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotId(u32);

impl SnapshotId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Offset of a compact array in the snapshot buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayRef(u32);

#[derive(Debug, Clone)]
pub(crate) struct SnapshotNode {
    pub jitcode_index: u32,
    pub pc: u32,
    pub array: ArrayRef,
    pub parent: Option<SnapshotId>,
}

#[derive(Debug, Clone)]
pub(crate) struct ResumeRecord {
    pub top: Option<SnapshotId>,
    pub vable: ArrayRef,
    pub vref: ArrayRef,
}

/// Interpreter frame as seen by resume capture
///
/// Frames cache the snapshot emitted for their caller so that later guards
/// under the same caller reuse it. The cache belongs to one trace; reset it
/// before recording into another.
pub trait ResumeFrame {
    fn jitcode_index(&self) -> u32;
    fn pc(&self) -> u32;
    /// Values live in this frame at the guard
    fn active_boxes(&self) -> &[Operand];
    /// Snapshot of the caller frame, if already emitted
    fn parent_snapshot(&self) -> Option<SnapshotId>;
    fn set_parent_snapshot(&mut self, snapshot: SnapshotId);
}

/// Plain frame holding its live values
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub jitcode_index: u32,
    pub pc: u32,
    pub boxes: Vec<Operand>,
    parent_snapshot: Option<SnapshotId>,
}

impl Frame {
    pub fn new(jitcode_index: u32, pc: u32, boxes: Vec<Operand>) -> Self {
        Frame {
            jitcode_index,
            pc,
            boxes,
            parent_snapshot: None,
        }
    }

    /// Forget the cached caller snapshot
    pub fn reset_parent_snapshot(&mut self) {
        self.parent_snapshot = None;
    }
}

impl ResumeFrame for Frame {
    fn jitcode_index(&self) -> u32 {
        self.jitcode_index
    }

    fn pc(&self) -> u32 {
        self.pc
    }

    fn active_boxes(&self) -> &[Operand] {
        &self.boxes
    }

    fn parent_snapshot(&self) -> Option<SnapshotId> {
        self.parent_snapshot
    }

    fn set_parent_snapshot(&mut self, snapshot: SnapshotId) {
        self.parent_snapshot = Some(snapshot);
    }
}

impl Trace {
    /// Attach resume data to the guard just recorded
    ///
    /// `framestack` runs from the outermost frame to the innermost one.
    /// Virtualizable boxes are stored with their last entry (the
    /// virtualizable itself) first. Returns the resume record index.
    /// On error the arena is left as it was and the guard stays pending.
    pub fn capture_resumedata<F: ResumeFrame>(
        &mut self,
        framestack: &mut [F],
        virtualizables: Option<&[Operand]>,
        vref_boxes: &[Operand],
    ) -> TraceResult<usize> {
        if self.pending_guard.is_none() {
            return Err(TraceError::NoPendingGuard);
        }
        let created = self.snapshots.len();
        let data_len = self.snapshot_data.len();

        match self.capture_frames(framestack, virtualizables, vref_boxes) {
            Ok(resume) => {
                debug!(
                    resume,
                    frames = framestack.len(),
                    new_snapshots = self.snapshots.len() - created,
                    "captured resume data"
                );
                Ok(resume)
            }
            Err(e) => {
                // frames may still cache ids from the dropped nodes; the
                // range check in ensure_parent_snapshots rejects them
                self.snapshots.truncate(created);
                self.snapshot_data.truncate(data_len);
                Err(e)
            }
        }
    }

    fn capture_frames<F: ResumeFrame>(
        &mut self,
        framestack: &mut [F],
        virtualizables: Option<&[Operand]>,
        vref_boxes: &[Operand],
    ) -> TraceResult<usize> {
        let top = match framestack.len().checked_sub(1) {
            None => None,
            Some(n) => {
                let parent = self.ensure_parent_snapshots(framestack, n)?;
                let frame = &framestack[n];
                Some(self.push_snapshot(
                    frame.jitcode_index(),
                    frame.pc(),
                    frame.active_boxes(),
                    parent,
                )?)
            }
        };

        let vable: Vec<Operand> = match virtualizables {
            Some([rest @ .., last]) => std::iter::once(*last).chain(rest.iter().copied()).collect(),
            _ => Vec::new(),
        };
        self.attach_resume(top, &vable, vref_boxes)
    }

    /// Make sure every caller of frame `n` has a snapshot and return the
    /// one of its direct caller
    fn ensure_parent_snapshots<F: ResumeFrame>(
        &mut self,
        framestack: &mut [F],
        n: usize,
    ) -> TraceResult<Option<SnapshotId>> {
        // walk down to the first frame whose caller snapshot is cached
        let mut k = n;
        while k > 0 && framestack[k].parent_snapshot().is_none() {
            k -= 1;
        }
        let mut parent = if k == 0 {
            None
        } else {
            framestack[k].parent_snapshot()
        };
        if let Some(id) = parent.filter(|id| id.index() >= self.snapshots.len()) {
            return Err(TraceError::StaleParentSnapshot(id));
        }
        for i in k + 1..=n {
            let caller = &framestack[i - 1];
            let snapshot = self.push_snapshot(
                caller.jitcode_index(),
                caller.pc(),
                caller.active_boxes(),
                parent,
            )?;
            framestack[i].set_parent_snapshot(snapshot);
            parent = Some(snapshot);
        }
        Ok(parent)
    }

    pub(crate) fn push_snapshot(
        &mut self,
        jitcode_index: u32,
        pc: u32,
        boxes: &[Operand],
        parent: Option<SnapshotId>,
    ) -> TraceResult<SnapshotId> {
        let array = self.write_array(boxes)?;
        let id = SnapshotId(self.snapshots.len() as u32);
        self.snapshots.push(SnapshotNode {
            jitcode_index,
            pc,
            array,
            parent,
        });
        Ok(id)
    }

    /// Store the resume record of the pending guard
    pub(crate) fn attach_resume(
        &mut self,
        top: Option<SnapshotId>,
        vable: &[Operand],
        vref: &[Operand],
    ) -> TraceResult<usize> {
        if self.pending_guard.is_none() {
            return Err(TraceError::NoPendingGuard);
        }
        let vable = self.write_array(vable)?;
        let vref = self.write_array(vref)?;
        let resume = self.resumes.len();
        self.resumes.push(ResumeRecord { top, vable, vref });
        self.pending_guard = None;
        Ok(resume)
    }

    fn write_array(&mut self, items: &[Operand]) -> TraceResult<ArrayRef> {
        let start = self.snapshot_data.len();
        match self.write_array_items(items) {
            Ok(()) => Ok(ArrayRef(start as u32)),
            Err(e) => {
                self.snapshot_data.truncate(start);
                Err(e)
            }
        }
    }

    fn write_array_items(&mut self, items: &[Operand]) -> TraceResult<()> {
        let anchor = self.index;
        encode_varint_signed(items.len() as i64, &mut self.snapshot_data)?;
        encode_varint_signed(anchor as i64, &mut self.snapshot_data)?;
        for item in items {
            let tagged = self.encode_operand(item, anchor)?;
            encode_varint_signed(tagged, &mut self.snapshot_data)?;
        }
        Ok(())
    }

    pub(crate) fn read_array(&self, array: ArrayRef) -> TraceResult<SmallVec<[Tagged; 8]>> {
        let data = &self.snapshot_data;
        let (len, pos) = decode_varint_signed(data, array.0 as usize)?;
        let (anchor, mut pos) = decode_varint_signed(data, pos)?;
        if len < 0 || len as usize > data.len().saturating_sub(pos) / 2 || anchor < 0 {
            return Err(TraceError::Corrupt {
                offset: array.0 as usize,
                reason: "bad array header",
            });
        }
        let mut items = SmallVec::with_capacity(len as usize);
        for _ in 0..len {
            let (value, next) = decode_varint_signed(data, pos)?;
            items.push(decode_tagged(value, anchor as u32, pos)?);
            pos = next;
        }
        Ok(items)
    }

    pub(crate) fn snapshot(&self, id: SnapshotId) -> TraceResult<&SnapshotNode> {
        self.snapshots.get(id.index()).ok_or(TraceError::Corrupt {
            offset: id.index(),
            reason: "snapshot index out of range",
        })
    }

    pub(crate) fn resume_record(&self, resume: usize) -> TraceResult<&ResumeRecord> {
        self.resumes.get(resume).ok_or(TraceError::Corrupt {
            offset: resume,
            reason: "resume index out of range",
        })
    }

    /// Call `f` on every box position mentioned by a resume record
    pub(crate) fn for_each_resume_box(
        &self,
        resume: usize,
        mut f: impl FnMut(Position) -> TraceResult<()>,
    ) -> TraceResult<()> {
        let record = self.resume_record(resume)?;
        let mut arrays: SmallVec<[ArrayRef; 8]> = SmallVec::new();
        arrays.push(record.vable);
        arrays.push(record.vref);
        let mut next = record.top;
        while let Some(id) = next {
            let node = self.snapshot(id)?;
            arrays.push(node.array);
            next = node.parent;
        }
        for array in arrays {
            for item in self.read_array(array)? {
                if let Tagged::Box(pos) = item {
                    f(pos)?;
                }
            }
        }
        Ok(())
    }
}

/// View of one guard's resume data within a decode pass
///
/// Values resolve through the pass's identity map, so boxes compare
/// identical to the decoded operations.
pub struct SnapshotIterator<'i, 't> {
    iter: &'i TraceIterator<'t>,
    vable: ArrayRef,
    vref: ArrayRef,
    top: Option<SnapshotId>,
    framestack: Vec<SnapshotId>,
}

impl<'i, 't> SnapshotIterator<'i, 't> {
    pub(crate) fn new(iter: &'i TraceIterator<'t>, resume: usize) -> TraceResult<Self> {
        let trace = iter.trace();
        let record = trace.resume_record(resume)?;
        let mut si = SnapshotIterator {
            iter,
            vable: record.vable,
            vref: record.vref,
            top: record.top,
            framestack: Vec::new(),
        };
        let mut framestack = si.parents(record.top).collect::<TraceResult<Vec<_>>>()?;
        framestack.reverse();
        si.framestack = framestack;
        Ok(si)
    }

    #[inline]
    pub fn vable_array(&self) -> ArrayRef {
        self.vable
    }

    #[inline]
    pub fn vref_array(&self) -> ArrayRef {
        self.vref
    }

    /// Snapshot of the innermost frame
    #[inline]
    pub fn top(&self) -> Option<SnapshotId> {
        self.top
    }

    /// Snapshots from the outermost frame to the innermost one
    #[inline]
    pub fn framestack(&self) -> &[SnapshotId] {
        &self.framestack
    }

    /// Walk from `start` towards the outermost frame
    pub fn parents(
        &self,
        start: Option<SnapshotId>,
    ) -> impl Iterator<Item = TraceResult<SnapshotId>> + 'i {
        let trace: &'i Trace = self.iter.trace();
        let mut next = start;
        std::iter::from_fn(move || {
            let id = next?;
            match trace.snapshot(id) {
                Ok(node) => {
                    next = node.parent;
                    Some(Ok(id))
                }
                Err(e) => {
                    next = None;
                    Some(Err(e))
                }
            }
        })
    }

    /// Jit-code index and program counter of a frame snapshot
    pub fn unpack_jitcode_pc(&self, id: SnapshotId) -> TraceResult<(u32, u32)> {
        let node = self.iter.trace().snapshot(id)?;
        Ok((node.jitcode_index, node.pc))
    }

    /// Live-value array of a frame snapshot
    pub fn iter_array(&self, id: SnapshotId) -> TraceResult<ArrayRef> {
        Ok(self.iter.trace().snapshot(id)?.array)
    }

    pub fn unpack_array(&self, array: ArrayRef) -> TraceResult<Vec<Value>> {
        let offset = array.0 as usize;
        self.iter
            .trace()
            .read_array(array)?
            .into_iter()
            .map(|item| self.iter.materialize(item, offset))
            .collect()
    }
}
