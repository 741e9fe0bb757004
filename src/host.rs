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

//! The x86 instruction data model this crate's selector targets: virtual
//! registers, operand forms (`AMode`/`RMI`/`RI`/`RM`/`R`), condition codes,
//! and the emitted instruction enum. Register allocation, spilling and
//! final encoding to machine bytes are out of scope; this module only
//! constructs values, it never interprets them.

use std::fmt;

/// A register kind: general-purpose integer, or x87-style floating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegClass {
    Int,
    Float,
}

/// The small set of architecturally-required real registers the
/// call/shift/multiply/divide protocols pin operands to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RealReg {
    Eax,
    Edx,
    Ecx,
    Esp,
    Ebp,
}

impl fmt::Display for RealReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RealReg::Eax => "%eax",
            RealReg::Edx => "%edx",
            RealReg::Ecx => "%ecx",
            RealReg::Esp => "%esp",
            RealReg::Ebp => "%ebp",
        };
        f.write_str(s)
    }
}

/// A register operand: either a virtual register (identity is the
/// index-kind pair) or one of the pinned real registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    Virtual { index: u32, class: RegClass },
    Real(RealReg),
}

impl Reg {
    pub fn class(&self) -> RegClass {
        match self {
            Reg::Virtual { class, .. } => *class,
            Reg::Real(_) => RegClass::Int,
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, Reg::Virtual { .. })
    }

    pub fn eax() -> Reg {
        Reg::Real(RealReg::Eax)
    }
    pub fn edx() -> Reg {
        Reg::Real(RealReg::Edx)
    }
    pub fn ecx() -> Reg {
        Reg::Real(RealReg::Ecx)
    }
    pub fn esp() -> Reg {
        Reg::Real(RealReg::Esp)
    }
    pub fn ebp() -> Reg {
        Reg::Real(RealReg::Ebp)
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reg::Virtual { index, class } => {
                let prefix = match class {
                    RegClass::Int => "v",
                    RegClass::Float => "vf",
                };
                write!(f, "%{}{}", prefix, index)
            }
            Reg::Real(r) => write!(f, "{}", r),
        }
    }
}

/// A 32-bit x86 addressing mode: `(imm32, base)` or a scaled-index form
/// `(imm32, base, index, log2scale)` with `log2scale in {0,1,2,3}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AMode {
    BaseDisp { disp: i32, base: Reg },
    BaseIndexScale { disp: i32, base: Reg, index: Reg, log2scale: u8 },
}

impl AMode {
    pub fn base_disp(disp: i32, base: Reg) -> AMode {
        AMode::BaseDisp { disp, base }
    }

    pub fn scaled(disp: i32, base: Reg, index: Reg, log2scale: u8) -> AMode {
        debug_assert!(log2scale <= 3);
        AMode::BaseIndexScale {
            disp,
            base,
            index,
            log2scale,
        }
    }

    /// Returns the same addressing mode with its displacement advanced by
    /// `n` bytes (used to address the high half of a 64-bit value).
    pub fn advance(&self, n: i32) -> AMode {
        match *self {
            AMode::BaseDisp { disp, base } => AMode::BaseDisp {
                disp: disp + n,
                base,
            },
            AMode::BaseIndexScale {
                disp,
                base,
                index,
                log2scale,
            } => AMode::BaseIndexScale {
                disp: disp + n,
                base,
                index,
                log2scale,
            },
        }
    }

    pub fn base(&self) -> Reg {
        match *self {
            AMode::BaseDisp { base, .. } => base,
            AMode::BaseIndexScale { base, .. } => base,
        }
    }

    pub fn index(&self) -> Option<Reg> {
        match *self {
            AMode::BaseDisp { .. } => None,
            AMode::BaseIndexScale { index, .. } => Some(index),
        }
    }
}

impl fmt::Display for AMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AMode::BaseDisp { disp, base } => write!(f, "{:#x}({})", disp, base),
            AMode::BaseIndexScale {
                disp,
                base,
                index,
                log2scale,
            } => write!(f, "{:#x}({},{},{})", disp, base, index, 1u32 << log2scale),
        }
    }
}

/// "register or memory or immediate" — the richest operand slot of most ALU ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rmi {
    Reg(Reg),
    Mem(AMode),
    Imm(i32),
}

/// "register or immediate" — for slots that cannot be memory (e.g. the
/// store source of `movl imm/reg, mem`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ri {
    Reg(Reg),
    Imm(i32),
}

/// "register or memory".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rm {
    Reg(Reg),
    Mem(AMode),
}

impl fmt::Display for Rmi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rmi::Reg(r) => write!(f, "{}", r),
            Rmi::Mem(m) => write!(f, "{}", m),
            Rmi::Imm(i) => write!(f, "${:#x}", i),
        }
    }
}

impl fmt::Display for Ri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ri::Reg(r) => write!(f, "{}", r),
            Ri::Imm(i) => write!(f, "${:#x}", i),
        }
    }
}

impl fmt::Display for Rm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rm::Reg(r) => write!(f, "{}", r),
            Rm::Mem(m) => write!(f, "{}", m),
        }
    }
}

/// An x86 flag-combination name, returned by the condition-code selector
/// and consumed by conditional branch, `cmov`, `set`, and conditional `call`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondCode {
    Z,
    Nz,
    B,
    Nb,
    Be,
    Nbe,
    L,
    Nl,
    Le,
    Nle,
    Always,
}

impl CondCode {
    /// Logical negation. The low-bit-xor trick from the original source
    /// (`Z=0,NZ=1,B=2,NB=3,...`) only works if the encoding is laid out in
    /// inverted pairs; this crate uses an explicit table instead, per the
    /// portability caveat in the design notes.
    pub fn invert(self) -> CondCode {
        match self {
            CondCode::Z => CondCode::Nz,
            CondCode::Nz => CondCode::Z,
            CondCode::B => CondCode::Nb,
            CondCode::Nb => CondCode::B,
            CondCode::Be => CondCode::Nbe,
            CondCode::Nbe => CondCode::Be,
            CondCode::L => CondCode::Nl,
            CondCode::Nl => CondCode::L,
            CondCode::Le => CondCode::Nle,
            CondCode::Nle => CondCode::Le,
            CondCode::Always => panic!("CondCode::Always has no inverse"),
        }
    }
}

/// ALU opcodes consumed by `Alu32R`/`Alu32M`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Mov,
    Add,
    Sub,
    And,
    Or,
    Xor,
    Mul,
}

/// Shift opcodes consumed by `Sh32`/`Sh3232` (double-precision shift).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Shl,
    Shr,
    Sar,
}

/// Unary ALU opcodes (`neg`, `not`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// x87 binary opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpBinOp {
    Add,
    Sub,
    Mul,
    Div,
    Scale,
    Atan,
    Yl2x,
    Yl2xp1,
    Prem,
    Prem1,
}

/// x87 unary opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpUnOp {
    Mov,
    Neg,
    Abs,
    Sqrt,
    Sin,
    Cos,
    Tan,
    TwoXm1,
    Round,
}

/// Signedness/size tag for the long-multiply pseudo-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulLongKind {
    S32,
    U32,
}

/// Signedness tag for the divide pseudo-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivKind {
    S32,
    U32,
}

/// Which of bsf/bsr to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitScanKind {
    Forward,
    Reverse,
}

/// A single emitted symbolic x86 instruction. Opaque to the selector core
/// beyond what the abstract factories below construct; consumed later by
/// register allocation and encoding.
#[derive(Debug, Clone)]
pub enum Instr {
    /// `mov`-class move between any two register operands.
    MovRR { dst: Reg, src: Reg },
    /// 32-bit ALU op writing a register destination.
    Alu32R { op: AluOp, src: Rmi, dst: Reg },
    /// 32-bit ALU op writing a memory destination.
    Alu32M { op: AluOp, src: Ri, dst: AMode },
    /// Unary ALU op (`neg`/`not`) in place on a register-or-memory operand.
    Unary32 { op: UnaryOp, dst: Rm },
    /// Widening multiply: `EDX:EAX = EAX * src`, signed or unsigned per `kind`.
    MulLong { kind: MulLongKind, src: Rm },
    /// `EDX:EAX / src`, quotient to `EAX`, remainder to `EDX`, signed or
    /// unsigned per `kind`.
    Divide { kind: DivKind, src: Rm },
    /// Immediate-count shift.
    Sh32 { op: ShiftOp, amount: u8, dst: Rm },
    /// `%cl`-form shift (amount is implicitly `ECX`).
    Sh32Cl { op: ShiftOp, dst: Rm },
    /// `shld`/`shrd` by an immediate count.
    Sh3232 { op: ShiftOp, amount: u8, src: Reg, dst: Reg },
    /// `shld`/`shrd` by `%cl`.
    Sh3232Cl { op: ShiftOp, src: Reg, dst: Reg },
    /// `test` of an immediate mask against a register-or-memory operand.
    Test32 { mask: i32, src: Rm },
    /// Conditional move.
    CMov32 { cc: CondCode, src: Rm, dst: Reg },
    /// `setCC` into the low byte of a register (upper bits unspecified).
    Set32 { cc: CondCode, dst: Reg },
    /// `bsf`/`bsr`.
    BitScan { kind: BitScanKind, src: Rm, dst: Reg },
    /// Zero/sign extending load of width 1 or 2 bytes into a 32-bit register.
    LoadExtend { width: u8, signed: bool, src: AMode, dst: Reg },
    /// Store of width 1, 2 or 4 bytes.
    Store { width: u8, src: Ri, dst: AMode },
    /// `push`.
    Push { src: Rmi },
    /// Conditional call with a fixed regparm count. `target` is the
    /// callee's raw address as the IR saw it.
    Call { cc: CondCode, target: u32, regparms: u8 },
    /// Unconditional/conditional control transfer out of the block.
    Goto { cc: CondCode, jump_kind: crate::ir::JumpKind, target: Ri },
    /// `fld`/`fst`(p) of width 4 or 8 bytes, `store` selects direction.
    FpLdSt { store: bool, width: u8, reg: Reg, mem: AMode },
    /// `fild`/`fist`(p) of width 2, 4 or 8 bytes.
    FpLdStInt { store: bool, width: u8, reg: Reg, mem: AMode },
    /// `fldcw`/`fstcw`.
    FpLdStCw { load: bool, mem: AMode },
    /// Binary x87 op: `dst = op(src_l, src_r)`.
    FpBinary { op: FpBinOp, src_l: Reg, src_r: Reg, dst: Reg },
    /// Unary x87 op.
    FpUnary { op: FpUnOp, src: Reg, dst: Reg },
    /// x87 compare producing a GP integer result (ah-derived) in `dst`.
    FpCompare { src_l: Reg, src_r: Reg, dst: Reg },
    /// `fstsw %ax`.
    FpStatusWordToAx,
    /// Floating-point conditional move.
    FpCMov { cc: CondCode, src: Reg, dst: Reg },
}

/// The result of lowering one basic block: the flat instruction list plus
/// the total number of virtual registers allocated (`1 + max index used`).
#[derive(Debug, Clone, Default)]
pub struct SelectedBlock {
    pub instrs: Vec<Instr>,
    pub n_vregs: u32,
}

impl fmt::Display for SelectedBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instr in &self.instrs {
            writeln!(f, "{:?}", instr)?;
        }
        Ok(())
    }
}
