// BSD 3-Clause License
//
// Copyright © 2021 Keegan Saunders
// Copyright © 2021 VTIL Project
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this
//    list of conditions and the following disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice,
//    this list of conditions and the following disclaimer in the documentation
//    and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its
//    contributors may be used to endorse or promote products derived from
//    this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS"
// AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE
// IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE
// FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL
// DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER
// CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY,
// OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
// OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.
//

//! The machine-independent IR this crate's selector consumes. Construction,
//! type inference and optimization happen upstream; everything here is
//! already type-checked by the time [`crate::driver::select`] sees it.

use std::fmt;

/// The enumerated IR type set. Every IR temp carries exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrType {
    Bit,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl IrType {
    /// Size in bytes, used by the store/put/array lowerers.
    pub fn size_bytes(self) -> u32 {
        match self {
            IrType::Bit | IrType::I8 => 1,
            IrType::I16 => 2,
            IrType::I32 | IrType::F32 => 4,
            IrType::I64 | IrType::F64 => 8,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            IrType::Bit | IrType::I8 | IrType::I16 | IrType::I32 | IrType::I64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, IrType::F32 | IrType::F64)
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IrType::Bit => "bit",
            IrType::I8 => "i8",
            IrType::I16 => "i16",
            IrType::I32 => "i32",
            IrType::I64 => "i64",
            IrType::F32 => "f32",
            IrType::F64 => "f64",
        };
        f.write_str(s)
    }
}

/// An IR temp, identified by a dense index into the block's type environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IrTemp(pub u32);

/// IEEE-754 rounding mode, as carried by `F64toI32`/`F64toI16`/`F64toI64`/
/// `RoundF64`. Values mirror the x87 control-word rounding-control field
/// after masking to its low two bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundingMode {
    Nearest,
    NegInf,
    PosInf,
    Zero,
}

impl RoundingMode {
    pub fn control_bits(self) -> u32 {
        match self {
            RoundingMode::Nearest => 0,
            RoundingMode::NegInf => 1,
            RoundingMode::PosInf => 2,
            RoundingMode::Zero => 3,
        }
    }
}

/// Descriptor for an indexed guest-state access (`GetI`/`PutI`).
///
/// Only `n_elems == 8` and `elem_size_bytes in {1, 8}` are supported by
/// this back end (see [`crate::select::array`]); constructing one with
/// other values is legal, but lowering it is not.
#[derive(Debug, Clone, Copy)]
pub struct ArrayDescriptor {
    /// Byte offset of element 0 within the guest state block.
    pub base: i32,
    pub elem_ty: IrType,
    pub n_elems: u32,
}

impl ArrayDescriptor {
    pub fn elem_size_bytes(&self) -> u32 {
        self.elem_ty.size_bytes()
    }
}

/// Descriptor of a C helper callee for [`Expr::CCall`]/dirty calls.
#[derive(Debug, Clone)]
pub struct CalleeDescriptor {
    pub name: String,
    pub addr: u32,
    /// Number of leading arguments passed in `EAX, EDX, ECX` (0..=3).
    pub regparms: u8,
}

/// A constant leaf, tagged by IR type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Const {
    Bit(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F64(f64),
    /// An f64 constant carried as its raw bit pattern (`F64i` in the
    /// original IR) — used when the bits do not round-trip through an
    /// `f64` comparison (e.g. NaNs with a specific payload).
    F64Bits(u64),
}

impl Const {
    pub fn ty(&self) -> IrType {
        match self {
            Const::Bit(_) => IrType::Bit,
            Const::U8(_) => IrType::I8,
            Const::U16(_) => IrType::I16,
            Const::U32(_) => IrType::I32,
            Const::U64(_) => IrType::I64,
            Const::F64(_) | Const::F64Bits(_) => IrType::F64,
        }
    }
}

/// IR unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Not1,
    Not8,
    Not16,
    Not32,
    /// Zero-extend to the enclosing 32-bit register, `{8,16}Uto32`.
    U8to32,
    U16to32,
    /// Sign-extend, `{8,16}Sto32`.
    S8to32,
    S16to32,
    /// Narrowing no-ops, `{16,32}to8`, `32to16`.
    Narrow32to8,
    Narrow32to16,
    Narrow16to8,
    /// High-half extraction, `16HIto8`, `32HIto16`.
    HighHalf16to8,
    HighHalf32to16,
    /// 64-bit decomposition, `64HIto32`, `64to32`.
    High64to32,
    Low64to32,
    /// Bit-to-int widenings, `1Uto{8,16,32}`, `1Sto{8,16,32}`.
    U1to8,
    U1to16,
    U1to32,
    S1to8,
    S1to16,
    S1to32,
    /// Bit-typed narrowing used by the condition-code selector, `32to1`.
    Narrow32to1,
    /// Bit complement, `Not1` in condition-code position.
    Not1Bit,
    Ctz32,
    Clz32,
    NegF64,
    AbsF64,
    SqrtF64,
    SinF64,
    CosF64,
    TanF64,
    TwoXm1F64,
    I32toF64,
    I64toF64,
    ReinterpI64asF64,
    ReinterpF64asI64,
    F32toF64,
    F64toF32,
    /// Round to an integer-valued float under the given rounding mode,
    /// `RoundF64` in the original IR.
    Round(RoundingMode),
}

/// IR binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add8,
    Add16,
    Add32,
    Sub8,
    Sub16,
    Sub32,
    And8,
    And16,
    And32,
    Or8,
    Or16,
    Or32,
    Xor8,
    Xor16,
    Xor32,
    Mul16,
    Mul32,
    Shl8,
    Shl16,
    Shl32,
    Shr8,
    Shr16,
    Shr32,
    Sar8,
    Sar16,
    Sar32,
    HLto16_8,
    HLto32_16,
    MullS8,
    MullU8,
    MullS16,
    MullU16,
    CmpF64,
    F64toI32,
    F64toI16,
    PRemC3210F64,
    PRem1C3210F64,

    /// Bit-typed comparisons feeding the condition-code selector.
    CmpEQ8,
    CmpNE8,
    CmpEQ16,
    CmpNE16,
    CmpEQ32,
    CmpNE32,
    CmpLT32S,
    CmpLT32U,
    CmpLE32S,
    CmpLE32U,
    CmpNE64,

    Or64,
    MullU32,
    MullS32,
    DivModU64to32,
    DivModS64to32,
    Shl64,
    Shr64,
    F64toI64,

    AddF64,
    SubF64,
    MulF64,
    DivF64,
    ScaleF64,
    AtanF64,
    Yl2xF64,
    Yl2xp1F64,
    PRemF64,
    PRem1F64,
}

/// An IR expression tree node. Shared subexpressions are represented by
/// repeated [`Expr::Temp`] references, not by aliasing `Expr` itself — the
/// tree is genuinely tree-shaped after the upstream SSA-like pass.
#[derive(Debug, Clone)]
pub enum Expr {
    Temp(IrTemp),
    Get {
        offset: i32,
        ty: IrType,
    },
    GetI {
        descr: ArrayDescriptor,
        index: Box<Expr>,
        bias: i32,
    },
    Const(Const),
    Load {
        ty: IrType,
        addr: Box<Expr>,
    },
    Unop {
        op: UnOp,
        arg: Box<Expr>,
    },
    Binop {
        op: BinOp,
        arg1: Box<Expr>,
        arg2: Box<Expr>,
    },
    /// `if cond == 0 then arg0 else argx`; `cond` is i8, tested zero-vs-nonzero.
    Mux0X {
        cond: Box<Expr>,
        expr0: Box<Expr>,
        expr_x: Box<Expr>,
        ty: IrType,
    },
    CCall {
        callee: CalleeDescriptor,
        args: Vec<Expr>,
        ret_ty: IrType,
    },
    /// Pattern-only placeholder; never appears in a real expression tree
    /// produced by the front end. See [`crate::pattern`].
    Binder(u8),
}

impl Expr {
    pub fn temp(t: u32) -> Expr {
        Expr::Temp(IrTemp(t))
    }

    pub fn constu8(v: u8) -> Expr {
        Expr::Const(Const::U8(v))
    }

    pub fn constu32(v: u32) -> Expr {
        Expr::Const(Const::U32(v))
    }

    pub fn binop(op: BinOp, a1: Expr, a2: Expr) -> Expr {
        Expr::Binop {
            op,
            arg1: Box::new(a1),
            arg2: Box::new(a2),
        }
    }

    pub fn unop(op: UnOp, a: Expr) -> Expr {
        Expr::Unop {
            op,
            arg: Box::new(a),
        }
    }
}

/// Effect descriptor for a dirty call: which guest-state regions it reads
/// and writes, used only to decide `passBBP`-style wiring (§4.8) here —
/// actual alias analysis is an upstream concern.
#[derive(Debug, Clone, Default)]
pub struct EffectDescriptor {
    pub reads_guest_state: bool,
    pub writes_guest_state: bool,
    pub n_fx_state: u32,
    pub needs_bbp: bool,
}

/// A single IR statement.
#[derive(Debug, Clone)]
pub enum Stmt {
    Store {
        addr: Expr,
        ty: IrType,
        value: Expr,
    },
    Put {
        offset: i32,
        ty: IrType,
        value: Expr,
    },
    PutI {
        descr: ArrayDescriptor,
        index: Expr,
        bias: i32,
        value: Expr,
    },
    TempAssign {
        dst: IrTemp,
        ty: IrType,
        value: Expr,
    },
    DirtyCall {
        callee: CalleeDescriptor,
        args: Vec<Expr>,
        effects: EffectDescriptor,
        guard: Option<Expr>,
        result: Option<(IrTemp, IrType)>,
    },
    Exit {
        guard: Expr,
        target: Expr,
        jump_kind: JumpKind,
    },
}

/// The kind of control transfer a block terminator or side-exit performs.
/// Consumed opaquely by the host `Goto` factory (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    Boring,
    Call,
    Return,
    NoDecode,
    MapFail,
    InvalICache,
    Yield,
}

/// A basic block: a type environment, a sequence of statements, a
/// terminator, and the jump kind of that terminator.
#[derive(Debug, Clone)]
pub struct Block {
    /// `types[i]` is the type of `IrTemp(i as u32)`.
    pub types: Vec<IrType>,
    pub stmts: Vec<Stmt>,
    pub next: Expr,
    pub jump_kind: JumpKind,
}

impl Block {
    pub fn type_of(&self, t: IrTemp) -> IrType {
        self.types[t.0 as usize]
    }
}
