//! Trace operation catalogue
//!
//! Every operation that can appear in a trace is listed once in a static
//! table indexed by [`OpNum`]. The table answers the questions the encoder
//! and decoder ask (arity, whether a descriptor slot follows the arguments)
//! plus the classification queries used by downstream passes.
//!
//! Operations are grouped into contiguous classes:
//!
//! | Class          | Examples                               | Properties                     |
//! |----------------|----------------------------------------|--------------------------------|
//! | `Final`        | `jump`, `finish`                       | end a trace                    |
//! | `Guard`        | `guard_true`, `guard_class`            | carry resume data              |
//! | `AlwaysPure`   | `int_add`, `float_lt`, `strlen`        | foldable, no side effects      |
//! | `NoSideEffect` | `getfield_gc_i`, `new_with_vtable`     | removable when unused          |
//! | `SideEffect`   | `setfield_gc`, `escape_n`              | must be kept                   |
//! | `Call`         | `call_i`, `call_may_force_n`           | may raise                      |
//! | `Overflow`     | `int_add_ovf`                          | followed by an overflow guard  |

use std::fmt;

/// Type of the value an operation produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Int,
    Ref,
    Float,
    /// No value; the operation does not occupy a position
    Void,
}

impl ValueType {
    /// Single-letter prefix used when printing values
    pub fn prefix(self) -> char {
        match self {
            ValueType::Int => 'i',
            ValueType::Ref => 'p',
            ValueType::Float => 'f',
            ValueType::Void => 'v',
        }
    }
}

/// Number of arguments an operation takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(u8),
    /// Argument count is written inline before the arguments
    Variadic,
}

/// Operation class, see the module table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    Final,
    Guard,
    AlwaysPure,
    NoSideEffect,
    SideEffect,
    Debug,
    Call,
    Overflow,
}

/// Static metadata for one operation
#[derive(Debug, Clone, Copy)]
pub struct OpInfo {
    pub name: &'static str,
    pub arity: Arity,
    pub has_descr: bool,
    pub result: ValueType,
    pub class: OpClass,
}

macro_rules! arity {
    (*) => {
        Arity::Variadic
    };
    ($n:literal) => {
        Arity::Fixed($n)
    };
}

macro_rules! operations {
    ($( $variant:ident = $name:literal, $arity:tt, $descr:literal, $result:ident, $class:ident; )*) => {
        /// Operation number
        ///
        /// Dense enumeration; the discriminant is the byte written to the trace.
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum OpNum {
            $( $variant, )*
        }

        static OP_INFO: &[OpInfo] = &[
            $( OpInfo {
                name: $name,
                arity: arity!($arity),
                has_descr: $descr,
                result: ValueType::$result,
                class: OpClass::$class,
            }, )*
        ];

        static ALL_OPS: &[OpNum] = &[ $( OpNum::$variant, )* ];
    };
}

operations! {
    Jump = "jump", *, true, Void, Final;
    Finish = "finish", *, true, Void, Final;
    Label = "label", *, true, Void, SideEffect;

    GuardTrue = "guard_true", 1, true, Void, Guard;
    GuardFalse = "guard_false", 1, true, Void, Guard;
    GuardValue = "guard_value", 2, true, Void, Guard;
    GuardClass = "guard_class", 2, true, Void, Guard;
    GuardNonnull = "guard_nonnull", 1, true, Void, Guard;
    GuardIsnull = "guard_isnull", 1, true, Void, Guard;
    GuardNonnullClass = "guard_nonnull_class", 2, true, Void, Guard;
    GuardGcType = "guard_gc_type", 2, true, Void, Guard;
    GuardIsObject = "guard_is_object", 1, true, Void, Guard;
    GuardSubclass = "guard_subclass", 2, true, Void, Guard;
    GuardNoException = "guard_no_exception", 0, true, Void, Guard;
    GuardException = "guard_exception", 1, true, Ref, Guard;
    GuardNoOverflow = "guard_no_overflow", 0, true, Void, Guard;
    GuardOverflow = "guard_overflow", 0, true, Void, Guard;
    GuardNotForced = "guard_not_forced", 0, true, Void, Guard;
    GuardNotForced2 = "guard_not_forced_2", 0, true, Void, Guard;
    GuardNotInvalidated = "guard_not_invalidated", 0, true, Void, Guard;
    GuardFutureCondition = "guard_future_condition", 0, true, Void, Guard;

    IntAdd = "int_add", 2, false, Int, AlwaysPure;
    IntSub = "int_sub", 2, false, Int, AlwaysPure;
    IntMul = "int_mul", 2, false, Int, AlwaysPure;
    UintMulHigh = "uint_mul_high", 2, false, Int, AlwaysPure;
    IntAnd = "int_and", 2, false, Int, AlwaysPure;
    IntOr = "int_or", 2, false, Int, AlwaysPure;
    IntXor = "int_xor", 2, false, Int, AlwaysPure;
    IntRshift = "int_rshift", 2, false, Int, AlwaysPure;
    IntLshift = "int_lshift", 2, false, Int, AlwaysPure;
    UintRshift = "uint_rshift", 2, false, Int, AlwaysPure;
    IntSignext = "int_signext", 2, false, Int, AlwaysPure;
    FloatAdd = "float_add", 2, false, Float, AlwaysPure;
    FloatSub = "float_sub", 2, false, Float, AlwaysPure;
    FloatMul = "float_mul", 2, false, Float, AlwaysPure;
    FloatTruediv = "float_truediv", 2, false, Float, AlwaysPure;
    FloatNeg = "float_neg", 1, false, Float, AlwaysPure;
    FloatAbs = "float_abs", 1, false, Float, AlwaysPure;
    CastFloatToInt = "cast_float_to_int", 1, false, Int, AlwaysPure;
    CastIntToFloat = "cast_int_to_float", 1, false, Float, AlwaysPure;
    IntLt = "int_lt", 2, false, Int, AlwaysPure;
    IntLe = "int_le", 2, false, Int, AlwaysPure;
    IntEq = "int_eq", 2, false, Int, AlwaysPure;
    IntNe = "int_ne", 2, false, Int, AlwaysPure;
    IntGt = "int_gt", 2, false, Int, AlwaysPure;
    IntGe = "int_ge", 2, false, Int, AlwaysPure;
    UintLt = "uint_lt", 2, false, Int, AlwaysPure;
    UintLe = "uint_le", 2, false, Int, AlwaysPure;
    UintGt = "uint_gt", 2, false, Int, AlwaysPure;
    UintGe = "uint_ge", 2, false, Int, AlwaysPure;
    FloatLt = "float_lt", 2, false, Int, AlwaysPure;
    FloatLe = "float_le", 2, false, Int, AlwaysPure;
    FloatEq = "float_eq", 2, false, Int, AlwaysPure;
    FloatNe = "float_ne", 2, false, Int, AlwaysPure;
    FloatGt = "float_gt", 2, false, Int, AlwaysPure;
    FloatGe = "float_ge", 2, false, Int, AlwaysPure;
    IntIsZero = "int_is_zero", 1, false, Int, AlwaysPure;
    IntIsTrue = "int_is_true", 1, false, Int, AlwaysPure;
    IntNeg = "int_neg", 1, false, Int, AlwaysPure;
    IntInvert = "int_invert", 1, false, Int, AlwaysPure;
    IntForceGeZero = "int_force_ge_zero", 1, false, Int, AlwaysPure;
    SameAsI = "same_as_i", 1, false, Int, AlwaysPure;
    SameAsR = "same_as_r", 1, false, Ref, AlwaysPure;
    SameAsF = "same_as_f", 1, false, Float, AlwaysPure;
    CastPtrToInt = "cast_ptr_to_int", 1, false, Int, AlwaysPure;
    CastIntToPtr = "cast_int_to_ptr", 1, false, Ref, AlwaysPure;
    PtrEq = "ptr_eq", 2, false, Int, AlwaysPure;
    PtrNe = "ptr_ne", 2, false, Int, AlwaysPure;
    InstancePtrEq = "instance_ptr_eq", 2, false, Int, AlwaysPure;
    InstancePtrNe = "instance_ptr_ne", 2, false, Int, AlwaysPure;
    ArraylenGc = "arraylen_gc", 1, true, Int, AlwaysPure;
    Strlen = "strlen", 1, false, Int, AlwaysPure;
    Strgetitem = "strgetitem", 2, false, Int, AlwaysPure;

    GetarrayitemGcI = "getarrayitem_gc_i", 2, true, Int, NoSideEffect;
    GetarrayitemGcR = "getarrayitem_gc_r", 2, true, Ref, NoSideEffect;
    GetarrayitemGcF = "getarrayitem_gc_f", 2, true, Float, NoSideEffect;
    GetfieldGcI = "getfield_gc_i", 1, true, Int, NoSideEffect;
    GetfieldGcR = "getfield_gc_r", 1, true, Ref, NoSideEffect;
    GetfieldGcF = "getfield_gc_f", 1, true, Float, NoSideEffect;
    GetfieldRawI = "getfield_raw_i", 1, true, Int, NoSideEffect;
    GetfieldRawF = "getfield_raw_f", 1, true, Float, NoSideEffect;
    New = "new", 0, true, Ref, NoSideEffect;
    NewWithVtable = "new_with_vtable", 0, true, Ref, NoSideEffect;
    NewArray = "new_array", 1, true, Ref, NoSideEffect;
    NewArrayClear = "new_array_clear", 1, true, Ref, NoSideEffect;
    Newstr = "newstr", 1, false, Ref, NoSideEffect;
    ForceToken = "force_token", 0, false, Ref, NoSideEffect;
    VirtualRef = "virtual_ref", 2, false, Ref, NoSideEffect;

    SetarrayitemGc = "setarrayitem_gc", 3, true, Void, SideEffect;
    SetfieldGc = "setfield_gc", 2, true, Void, SideEffect;
    SetfieldRaw = "setfield_raw", 2, true, Void, SideEffect;
    Strsetitem = "strsetitem", 3, false, Void, SideEffect;
    Copystrcontent = "copystrcontent", 5, false, Void, SideEffect;
    VirtualRefFinish = "virtual_ref_finish", 2, false, Void, SideEffect;
    Keepalive = "keepalive", 1, false, Void, SideEffect;
    EscapeI = "escape_i", *, false, Int, SideEffect;
    EscapeR = "escape_r", *, false, Ref, SideEffect;
    EscapeF = "escape_f", *, false, Float, SideEffect;
    EscapeN = "escape_n", *, false, Void, SideEffect;
    DebugMergePoint = "debug_merge_point", *, false, Void, Debug;
    EnterPortalFrame = "enter_portal_frame", 2, false, Void, Debug;
    LeavePortalFrame = "leave_portal_frame", 1, false, Void, Debug;
    JitDebug = "jit_debug", *, false, Void, Debug;

    CallI = "call_i", *, true, Int, Call;
    CallR = "call_r", *, true, Ref, Call;
    CallF = "call_f", *, true, Float, Call;
    CallN = "call_n", *, true, Void, Call;
    CondCallN = "cond_call_n", *, true, Void, Call;
    CallAssemblerI = "call_assembler_i", *, true, Int, Call;
    CallAssemblerR = "call_assembler_r", *, true, Ref, Call;
    CallAssemblerF = "call_assembler_f", *, true, Float, Call;
    CallAssemblerN = "call_assembler_n", *, true, Void, Call;
    CallMayForceI = "call_may_force_i", *, true, Int, Call;
    CallMayForceR = "call_may_force_r", *, true, Ref, Call;
    CallMayForceF = "call_may_force_f", *, true, Float, Call;
    CallMayForceN = "call_may_force_n", *, true, Void, Call;
    CallPureI = "call_pure_i", *, true, Int, Call;
    CallPureR = "call_pure_r", *, true, Ref, Call;
    CallPureF = "call_pure_f", *, true, Float, Call;
    CallPureN = "call_pure_n", *, true, Void, Call;

    IntAddOvf = "int_add_ovf", 2, false, Int, Overflow;
    IntSubOvf = "int_sub_ovf", 2, false, Int, Overflow;
    IntMulOvf = "int_mul_ovf", 2, false, Int, Overflow;
}

impl OpNum {
    /// Decode an operation from its byte, `None` if the byte is not assigned
    #[inline]
    pub fn from_byte(byte: u8) -> Option<OpNum> {
        ALL_OPS.get(byte as usize).copied()
    }

    /// Byte written to the trace for this operation
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// All operations in table order
    pub fn all() -> &'static [OpNum] {
        ALL_OPS
    }

    #[inline]
    pub fn info(self) -> &'static OpInfo {
        &OP_INFO[self as usize]
    }

    #[inline]
    pub fn name(self) -> &'static str {
        self.info().name
    }

    #[inline]
    pub fn arity(self) -> Arity {
        self.info().arity
    }

    /// Whether a descriptor slot follows the arguments
    #[inline]
    pub fn has_descr(self) -> bool {
        self.info().has_descr
    }

    #[inline]
    pub fn result_type(self) -> ValueType {
        self.info().result
    }

    /// Whether the operation defines a value (and so occupies a position)
    #[inline]
    pub fn produces_value(self) -> bool {
        self.info().result != ValueType::Void
    }

    #[inline]
    pub fn class(self) -> OpClass {
        self.info().class
    }

    #[inline]
    pub fn is_guard(self) -> bool {
        self.class() == OpClass::Guard
    }

    /// Guards whose condition can be constant-folded
    pub fn is_foldable_guard(self) -> bool {
        (OpNum::GuardTrue..=OpNum::GuardSubclass).contains(&self)
    }

    pub fn is_final(self) -> bool {
        self.class() == OpClass::Final
    }

    pub fn is_always_pure(self) -> bool {
        self.class() == OpClass::AlwaysPure
    }

    pub fn has_no_side_effect(self) -> bool {
        matches!(self.class(), OpClass::AlwaysPure | OpClass::NoSideEffect)
    }

    pub fn is_call(self) -> bool {
        self.class() == OpClass::Call
    }

    pub fn can_raise(self) -> bool {
        self.is_call()
    }

    pub fn is_ovf(self) -> bool {
        self.class() == OpClass::Overflow
    }

    pub fn is_malloc(self) -> bool {
        matches!(
            self,
            OpNum::New
                | OpNum::NewWithVtable
                | OpNum::NewArray
                | OpNum::NewArrayClear
                | OpNum::Newstr
        )
    }

    /// Comparisons producing 0 or 1
    pub fn returns_bool_result(self) -> bool {
        matches!(
            self,
            OpNum::IntLt
                | OpNum::IntLe
                | OpNum::IntEq
                | OpNum::IntNe
                | OpNum::IntGt
                | OpNum::IntGe
                | OpNum::UintLt
                | OpNum::UintLe
                | OpNum::UintGt
                | OpNum::UintGe
                | OpNum::FloatLt
                | OpNum::FloatLe
                | OpNum::FloatEq
                | OpNum::FloatNe
                | OpNum::FloatGt
                | OpNum::FloatGe
                | OpNum::IntIsZero
                | OpNum::IntIsTrue
                | OpNum::PtrEq
                | OpNum::PtrNe
                | OpNum::InstancePtrEq
                | OpNum::InstancePtrNe
        )
    }

    /// Comparison computing the negated result: `a < b` -> `a >= b`
    pub fn bool_inverse(self) -> Option<OpNum> {
        use OpNum::*;
        Some(match self {
            IntEq => IntNe,
            IntNe => IntEq,
            IntLt => IntGe,
            IntGe => IntLt,
            IntGt => IntLe,
            IntLe => IntGt,
            UintLt => UintGe,
            UintGe => UintLt,
            UintGt => UintLe,
            UintLe => UintGt,
            FloatEq => FloatNe,
            FloatNe => FloatEq,
            FloatLt => FloatGe,
            FloatGe => FloatLt,
            FloatGt => FloatLe,
            FloatLe => FloatGt,
            PtrEq => PtrNe,
            PtrNe => PtrEq,
            _ => return None,
        })
    }

    /// Comparison with swapped operands: `a < b` -> `b > a`
    pub fn bool_reflex(self) -> Option<OpNum> {
        use OpNum::*;
        Some(match self {
            IntEq => IntEq,
            IntNe => IntNe,
            IntLt => IntGt,
            IntGe => IntLe,
            IntGt => IntLt,
            IntLe => IntGe,
            UintLt => UintGt,
            UintGe => UintLe,
            UintGt => UintLt,
            UintLe => UintGe,
            FloatEq => FloatEq,
            FloatNe => FloatNe,
            FloatLt => FloatGt,
            FloatGe => FloatLe,
            FloatGt => FloatLt,
            FloatLe => FloatGe,
            PtrEq => PtrEq,
            PtrNe => PtrNe,
            _ => return None,
        })
    }

    /// Check an argument count against the declared arity
    pub fn accepts_args(self, count: usize) -> bool {
        match self.arity() {
            Arity::Fixed(n) => n as usize == count,
            Arity::Variadic => true,
        }
    }
}

impl fmt::Display for OpNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
