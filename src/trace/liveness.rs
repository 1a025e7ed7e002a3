//! Live and dead ranges for register allocation
//!
//! Both passes scan the raw buffer; no records are built.

use super::{Tagged, Trace};
use crate::error::{TraceError, TraceResult};
use crate::value::Position;

impl Trace {
    /// Last use of every position
    ///
    /// Entry `p` is the position of the last operation using value `p`,
    /// counting uses from the resume data of guards. Unused values get 0.
    pub fn get_live_ranges(&self) -> TraceResult<Vec<u32>> {
        let mut live = vec![0u32; self.num_positions()];
        let mut offset = 0;
        let mut index = self.num_inputargs() as u32;

        while offset < self.length() {
            let (op, next) = self.read_op(offset, index, false)?;
            for arg in &op.args {
                if let Tagged::Box(pos) = arg {
                    mark_live(&mut live, *pos, index, offset)?;
                }
            }
            if op.opnum.is_guard() {
                // a trailing guard may still be waiting for its resume data
                if let Some(resume) = op.slot.filter(|r| *r < self.num_resume_records()) {
                    self.for_each_resume_box(resume, |pos| mark_live(&mut live, pos, index, offset))?;
                }
            }
            if op.opnum.produces_value() {
                index += 1;
            }
            offset = next;
        }
        Ok(live)
    }

    /// Values that are certainly dead by each position
    ///
    /// Entry `x` names a non-input value whose last use lies before `x`
    /// (0 for none). A value whose slot is taken moves to the next free
    /// one. The result has two spare entries past the last position.
    pub fn get_dead_ranges(&self) -> TraceResult<Vec<u32>> {
        let live = self.get_live_ranges()?;
        let mut dead = vec![0u32; self.num_positions() + 2];
        for (i, &last_use) in live.iter().enumerate().skip(self.num_inputargs()) {
            if last_use != 0 {
                insert_dead(&mut dead, last_use as usize + 1, i as u32);
            }
        }
        Ok(dead)
    }
}

fn mark_live(live: &mut [u32], pos: Position, index: u32, offset: usize) -> TraceResult<()> {
    let slot = live.get_mut(pos.index()).ok_or(TraceError::Corrupt {
        offset,
        reason: "reference past the last position",
    })?;
    *slot = index;
    Ok(())
}

fn insert_dead(dead: &mut [u32], mut pos: usize, value: u32) {
    while let Some(&taken) = dead.get(pos) {
        if taken == 0 {
            dead[pos] = value;
            return;
        }
        pos += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_dead_skips_taken_slots() {
        let mut dead = vec![0, 0, 7, 0];
        insert_dead(&mut dead, 2, 5);
        assert_eq!(dead, vec![0, 0, 7, 5]);
        insert_dead(&mut dead, 2, 6);
        assert_eq!(dead, vec![0, 0, 7, 5]);
    }
}
