//! Values flowing into and out of a trace
//!
//! The encoder takes [`Operand`]s: either a constant or the [`Position`] of
//! a value defined earlier in the same trace. The decoder hands back
//! [`Value`]s, where boxes are shared records (`Rc`) so that two references
//! to the same position compare identical within one decode pass.

use smallvec::SmallVec;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

use crate::opcodes::{OpNum, ValueType};

/// Dense index of a value in a trace
///
/// Inputs take `0..n`; every value-producing operation takes the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position(u32);

impl Position {
    #[inline]
    pub const fn new(index: u32) -> Self {
        Position(index)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Opaque garbage-collected pointer constant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GcRef(pub usize);

impl GcRef {
    pub const NULL: GcRef = GcRef(0);

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Constant operand
///
/// Floats compare and hash by bit pattern so constants can be interned.
#[derive(Debug, Clone, Copy)]
pub enum Const {
    Int(i64),
    Float(f64),
    Ptr(GcRef),
}

impl Const {
    pub fn value_type(&self) -> ValueType {
        match self {
            Const::Int(_) => ValueType::Int,
            Const::Float(_) => ValueType::Float,
            Const::Ptr(_) => ValueType::Ref,
        }
    }

    pub fn getint(&self) -> Option<i64> {
        match self {
            Const::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn getfloat(&self) -> Option<f64> {
        match self {
            Const::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn getref(&self) -> Option<GcRef> {
        match self {
            Const::Ptr(r) => Some(*r),
            _ => None,
        }
    }
}

impl PartialEq for Const {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Const::Int(a), Const::Int(b)) => a == b,
            (Const::Float(a), Const::Float(b)) => a.to_bits() == b.to_bits(),
            (Const::Ptr(a), Const::Ptr(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Const {}

impl Hash for Const {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Const::Int(v) => v.hash(state),
            Const::Float(v) => v.to_bits().hash(state),
            Const::Ptr(r) => r.hash(state),
        }
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::Int(v) => write!(f, "{}", v),
            Const::Float(v) => write!(f, "{:?}", v),
            Const::Ptr(r) if r.is_null() => write!(f, "NULL"),
            Const::Ptr(r) => write!(f, "ConstPtr(0x{:x})", r.0),
        }
    }
}

/// Argument passed to the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    /// Result of an earlier operation or an input
    Box(Position),
    Const(Const),
}

impl Operand {
    pub fn int(value: i64) -> Self {
        Operand::Const(Const::Int(value))
    }

    pub fn float(value: f64) -> Self {
        Operand::Const(Const::Float(value))
    }

    pub fn ptr(value: GcRef) -> Self {
        Operand::Const(Const::Ptr(value))
    }
}

impl From<Position> for Operand {
    fn from(pos: Position) -> Self {
        Operand::Box(pos)
    }
}

impl From<Const> for Operand {
    fn from(c: Const) -> Self {
        Operand::Const(c)
    }
}

/// Side metadata attached to an operation (field or array layout, call target)
///
/// The trace never looks inside a descriptor; it only stores and returns it.
pub trait AbstractDescr: fmt::Debug + Send + Sync {}

pub type Descr = Arc<dyn AbstractDescr>;

/// Decoded input argument
#[derive(Debug)]
pub struct InputArg {
    position: Position,
    ty: ValueType,
}

impl InputArg {
    pub(crate) fn new(position: Position, ty: ValueType) -> Self {
        InputArg { position, ty }
    }

    #[inline]
    pub fn position(&self) -> Position {
        self.position
    }

    #[inline]
    pub fn value_type(&self) -> ValueType {
        self.ty
    }
}

/// Decoded value
///
/// Boxes compare by identity, constants by value.
#[derive(Clone)]
pub enum Value {
    Const(Const),
    Input(Rc<InputArg>),
    Op(Rc<ResOp>),
}

impl Value {
    /// Position of a box, `None` for constants
    pub fn position(&self) -> Option<Position> {
        match self {
            Value::Const(_) => None,
            Value::Input(arg) => Some(arg.position()),
            Value::Op(op) => Some(op.position()),
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Const(c) => c.value_type(),
            Value::Input(arg) => arg.value_type(),
            Value::Op(op) => op.result_type(),
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Value::Const(_))
    }

    pub fn getint(&self) -> Option<i64> {
        match self {
            Value::Const(c) => c.getint(),
            _ => None,
        }
    }

    pub fn as_const(&self) -> Option<&Const> {
        match self {
            Value::Const(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_op(&self) -> Option<&Rc<ResOp>> {
        match self {
            Value::Op(op) => Some(op),
            _ => None,
        }
    }

    /// Operand referring to this value in the trace it was decoded from
    pub fn to_operand(&self) -> Operand {
        match self {
            Value::Const(c) => Operand::Const(*c),
            Value::Input(arg) => Operand::Box(arg.position()),
            Value::Op(op) => Operand::Box(op.position()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Const(a), Value::Const(b)) => a == b,
            (Value::Input(a), Value::Input(b)) => Rc::ptr_eq(a, b),
            (Value::Op(a), Value::Op(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<Rc<ResOp>> for Value {
    fn from(op: Rc<ResOp>) -> Self {
        Value::Op(op)
    }
}

impl From<Rc<InputArg>> for Value {
    fn from(arg: Rc<InputArg>) -> Self {
        Value::Input(arg)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Const(c) => write!(f, "{}", c),
            Value::Input(_) | Value::Op(_) => {
                // Only the name: printing the defining record would recurse
                // through the whole data-flow graph.
                let pos = self.position().map(Position::as_u32).unwrap_or(0);
                write!(f, "{}{}", self.value_type().prefix(), pos)
            }
        }
    }
}

/// Decoded operation record
pub struct ResOp {
    opnum: OpNum,
    args: SmallVec<[Value; 3]>,
    descr: Option<Descr>,
    position: Position,
    resume_position: Option<usize>,
}

impl ResOp {
    pub(crate) fn new(
        opnum: OpNum,
        args: SmallVec<[Value; 3]>,
        descr: Option<Descr>,
        position: Position,
        resume_position: Option<usize>,
    ) -> Self {
        ResOp {
            opnum,
            args,
            descr,
            position,
            resume_position,
        }
    }

    #[inline]
    pub fn opnum(&self) -> OpNum {
        self.opnum
    }

    /// Argument `i`; panics when out of range, like slice indexing
    #[inline]
    pub fn getarg(&self, i: usize) -> &Value {
        &self.args[i]
    }

    #[inline]
    pub fn getarglist(&self) -> &[Value] {
        &self.args
    }

    #[inline]
    pub fn numargs(&self) -> usize {
        self.args.len()
    }

    #[inline]
    pub fn getdescr(&self) -> Option<&Descr> {
        self.descr.as_ref()
    }

    /// Position of the result, or of the next value for void operations
    #[inline]
    pub fn position(&self) -> Position {
        self.position
    }

    #[inline]
    pub fn result_type(&self) -> ValueType {
        self.opnum.result_type()
    }

    #[inline]
    pub fn is_guard(&self) -> bool {
        self.opnum.is_guard()
    }

    /// Index of the guard's resume record
    #[inline]
    pub fn resume_position(&self) -> Option<usize> {
        self.resume_position
    }
}

impl fmt::Debug for ResOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ResOp");
        s.field("opnum", &self.opnum)
            .field("args", &self.args.as_slice())
            .field("position", &self.position);
        if let Some(descr) = &self.descr {
            s.field("descr", descr);
        }
        if let Some(resume) = self.resume_position {
            s.field("resume_position", &resume);
        }
        s.finish()
    }
}

impl Drop for ResOp {
    // Use-def chains can be as long as the trace; free them iteratively.
    fn drop(&mut self) {
        let mut pending: Vec<Value> = self.args.drain(..).collect();
        while let Some(value) = pending.pop() {
            if let Value::Op(op) = value {
                if let Ok(mut op) = Rc::try_unwrap(op) {
                    pending.extend(op.args.drain(..));
                }
            }
        }
    }
}

/// Compare two descriptors by identity
pub fn same_descr(a: &Descr, b: &Descr) -> bool {
    Arc::ptr_eq(a, b)
}
