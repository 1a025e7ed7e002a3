//! Error types for trace recording and decoding.

use crate::opcodes::OpNum;
use crate::trace::SnapshotId;
use crate::value::Position;

/// Trace error types
///
/// Every error is fatal to the trace being recorded or decoded. The caller
/// is expected to discard the trace and fall back to interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceError {
    /// Argument count does not match the opcode's declared arity
    ArityMismatch {
        opnum: OpNum,
        expected: usize,
        got: usize,
    },
    /// A descriptor was passed to an opcode that cannot carry one
    UnexpectedDescr(OpNum),
    /// A box argument refers to a position that has not been defined yet
    UndefinedPosition(Position),
    /// Resume data was captured without a guard waiting for it
    NoPendingGuard,
    /// A frame's cached caller snapshot does not belong to this trace
    StaleParentSnapshot(SnapshotId),
    /// An operation was recorded while a guard still waits for resume data
    ResumeDataPending(Position),
    /// The kept suffix of a cut references a value missing from the new inputs
    MissingCutInput(Position),
    /// A new input of a cut is not defined before the cut point
    InvalidCutInput(Position),
    /// The cut point does not fall on an operation boundary of this trace
    InvalidCutPoint { offset: usize },
    /// The trace exceeded the configured operation limit
    TraceTooLong { limit: usize },
    /// Value outside the varint range
    VarintOutOfRange(i64),
    /// Tagged payload does not fit the varint range
    TagOverflow(i64),
    /// Buffer ended in the middle of an item
    Truncated { offset: usize },
    /// Byte does not name an opcode
    UnknownOpcode { byte: u8, offset: usize },
    /// Structurally invalid buffer contents
    Corrupt {
        offset: usize,
        reason: &'static str,
    },
}

impl std::fmt::Display for TraceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ArityMismatch {
                opnum,
                expected,
                got,
            } => {
                write!(
                    f,
                    "Invalid arity for {}: expected {}, got {}",
                    opnum.name(),
                    expected,
                    got
                )
            }
            Self::UnexpectedDescr(opnum) => {
                write!(f, "Operation {} does not take a descriptor", opnum.name())
            }
            Self::UndefinedPosition(pos) => write!(f, "Reference to undefined value {}", pos),
            Self::NoPendingGuard => write!(f, "Resume data captured without a preceding guard"),
            Self::StaleParentSnapshot(id) => write!(
                f,
                "Frame caches snapshot {} which this trace does not have",
                id.index()
            ),
            Self::ResumeDataPending(pos) => {
                write!(f, "Guard at {} is still waiting for its resume data", pos)
            }
            Self::MissingCutInput(pos) => {
                write!(f, "Value {} is used after the cut but is not an input", pos)
            }
            Self::InvalidCutInput(pos) => {
                write!(f, "Value {} is not defined before the cut point", pos)
            }
            Self::InvalidCutPoint { offset } => {
                write!(f, "Cut point at byte {} is not an operation boundary", offset)
            }
            Self::TraceTooLong { limit } => write!(f, "Trace too long (limit {} operations)", limit),
            Self::VarintOutOfRange(value) => write!(f, "Value {} out of varint range", value),
            Self::TagOverflow(payload) => write!(f, "Tagged payload {} overflows", payload),
            Self::Truncated { offset } => write!(f, "Truncated trace data at byte {}", offset),
            Self::UnknownOpcode { byte, offset } => {
                write!(f, "Unknown opcode 0x{:02x} at byte {}", byte, offset)
            }
            Self::Corrupt { offset, reason } => {
                write!(f, "Corrupt trace data at byte {}: {}", offset, reason)
            }
        }
    }
}

impl std::error::Error for TraceError {}

/// Result type for trace operations
pub type TraceResult<T> = Result<T, TraceError>;
