//! Two-bit operand tags
//!
//! Every operand in the trace is written as one signed varint holding
//! `(payload << TAGSHIFT) | tag`.
//!
//! | Tag             | Payload                                          |
//! |-----------------|--------------------------------------------------|
//! | `TAGINT`        | small integer constant, inline                   |
//! | `TAGCONSTPTR`   | index into the GC pointer table (0 = null)       |
//! | `TAGCONSTOTHER` | `index << 1` big int, `index << 1 \| 1` float    |
//! | `TAGBOX`        | `anchor - position` of a previously defined value |

use crate::error::{TraceError, TraceResult};
use crate::varint::{MAX_VALUE, MIN_VALUE};

pub const TAGINT: u8 = 0;
pub const TAGCONSTPTR: u8 = 1;
pub const TAGCONSTOTHER: u8 = 2;
pub const TAGBOX: u8 = 3;

pub const TAGSHIFT: u32 = 2;
pub const TAGMASK: i64 = (1 << TAGSHIFT) - 1;

/// First integer that can be stored inline with `TAGINT`
pub const SMALL_INT_START: i64 = MIN_VALUE >> TAGSHIFT;
/// One past the last integer that can be stored inline with `TAGINT`
pub const SMALL_INT_STOP: i64 = (MAX_VALUE >> TAGSHIFT) + 1;

/// Check whether an integer constant fits inline.
#[inline]
pub fn is_small_int(value: i64) -> bool {
    (SMALL_INT_START..SMALL_INT_STOP).contains(&value)
}

/// Combine a tag and its payload into one varint value.
#[inline]
pub fn tag(kind: u8, payload: i64) -> TraceResult<i64> {
    if !is_small_int(payload) {
        return Err(TraceError::TagOverflow(payload));
    }
    Ok((payload << TAGSHIFT) | kind as i64)
}

/// Split a varint value into its tag and payload.
#[inline]
pub fn untag(tagged: i64) -> (u8, i64) {
    ((tagged & TAGMASK) as u8, tagged >> TAGSHIFT)
}
