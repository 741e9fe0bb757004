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

//! Operand selectors for non-64-bit integer expressions. Each function
//! reduces an [`Expr`] to a progressively more restricted x86 operand form:
//! `amode` (memory address) is the narrowest, then `rmi`, then `rm`, then
//! `ri`, and finally `reg` which always succeeds by emitting a `mov` into a
//! fresh vreg if nothing cheaper matched. Callers pick the widest form their
//! instruction template accepts and fall back rightward.

use crate::env::Environment;
use crate::error::{Result, SelectError};
use crate::host::{AMode, AluOp, Instr, Reg, Ri, Rm, Rmi, ShiftOp, UnaryOp};
use crate::ir::{BinOp, Const, Expr, IrType, UnOp};

fn const_i32(c: &Const) -> Option<i32> {
    match *c {
        Const::Bit(b) => Some(b as i32),
        Const::U8(v) => Some(v as i32),
        Const::U16(v) => Some(v as i32),
        Const::U32(v) => Some(v as i32),
        _ => None,
    }
}

/// Computes the x86 addressing mode for a load/store address expression.
/// Folds `Add32(base, Shl32(index, k))` into a scaled-index form and
/// `Add32(base, const)` into a displacement, falling back to `disp(reg)`
/// with `disp = 0` for anything else.
pub fn amode(env: &mut Environment, addr: &Expr) -> Result<AMode> {
    if let Expr::Binop {
        op: BinOp::Add32,
        arg1,
        arg2,
    } = addr
    {
        if let Expr::Const(c) = arg2.as_ref() {
            if let Some(disp) = const_i32(c) {
                let base = reg(env, arg1)?;
                return Ok(AMode::base_disp(disp, base));
            }
        }
        if let Expr::Binop {
            op: BinOp::Shl32,
            arg1: sh_val,
            arg2: sh_amt,
        } = arg2.as_ref()
        {
            if let Expr::Const(Const::U8(k)) = sh_amt.as_ref() {
                if matches!(k, 0..=3) {
                    let base = reg(env, arg1)?;
                    let index = reg(env, sh_val)?;
                    return Ok(AMode::scaled(0, base, index, *k));
                }
            }
        }
    }
    let base = reg(env, addr)?;
    Ok(AMode::base_disp(0, base))
}

/// Selects the widest operand form an ALU instruction's source slot can
/// take: register, memory, or immediate.
pub fn rmi(env: &mut Environment, e: &Expr) -> Result<Rmi> {
    match e {
        Expr::Const(c) => {
            let v = const_i32(c).ok_or_else(|| {
                SelectError::type_violation("select::operand::rmi", "constant too wide for i32")
            })?;
            Ok(Rmi::Imm(v))
        }
        Expr::Load { ty, addr } if ty.is_integer() && ty.size_bytes() <= 4 => {
            Ok(Rmi::Mem(amode(env, addr)?))
        }
        _ => Ok(Rmi::Reg(reg(env, e)?)),
    }
}

/// Like [`rmi`] but excludes memory — for destination/source slots that
/// must be a register or immediate (e.g. a store's value operand already
/// covers the memory side via the address, not the value).
pub fn ri(env: &mut Environment, e: &Expr) -> Result<Ri> {
    match e {
        Expr::Const(c) => {
            let v = const_i32(c).ok_or_else(|| {
                SelectError::type_violation("select::operand::ri", "constant too wide for i32")
            })?;
            Ok(Ri::Imm(v))
        }
        _ => Ok(Ri::Reg(reg(env, e)?)),
    }
}

/// Like [`rmi`] but excludes immediates — for instructions with no
/// immediate-source encoding (shift counts, `bsf`/`bsr` sources, ...).
pub fn rm(env: &mut Environment, e: &Expr) -> Result<Rm> {
    match e {
        Expr::Load { ty, addr } if ty.is_integer() && ty.size_bytes() <= 4 => {
            Ok(Rm::Mem(amode(env, addr)?))
        }
        _ => Ok(Rm::Reg(reg(env, e)?)),
    }
}

fn alu_op_for(op: BinOp) -> Option<AluOp> {
    match op {
        BinOp::Add8 | BinOp::Add16 | BinOp::Add32 => Some(AluOp::Add),
        BinOp::Sub8 | BinOp::Sub16 | BinOp::Sub32 => Some(AluOp::Sub),
        BinOp::And8 | BinOp::And16 | BinOp::And32 => Some(AluOp::And),
        BinOp::Or8 | BinOp::Or16 | BinOp::Or32 => Some(AluOp::Or),
        BinOp::Xor8 | BinOp::Xor16 | BinOp::Xor32 => Some(AluOp::Xor),
        _ => None,
    }
}

fn shift_op_for(op: BinOp) -> Option<ShiftOp> {
    match op {
        BinOp::Shl8 | BinOp::Shl16 | BinOp::Shl32 => Some(ShiftOp::Shl),
        BinOp::Shr8 | BinOp::Shr16 | BinOp::Shr32 => Some(ShiftOp::Shr),
        BinOp::Sar8 | BinOp::Sar16 | BinOp::Sar32 => Some(ShiftOp::Sar),
        _ => None,
    }
}

/// Control-word rounding-dance helper shared by `F64toI32`/`F64toI16`:
/// loads a temporary control word with the given rounding bits, converts,
/// then restores the default control word. Grounded on the same idiom used
/// by the 64-bit and fpu lowerers.
fn round_and_convert_to_int(
    env: &mut Environment,
    src: Reg,
    dst_width_store: u8,
) -> Result<Reg> {
    let scratch = env.new_vreg_int();
    let cw_mem = AMode::base_disp(-8, Reg::esp());
    env.add_instr(Instr::FpLdStCw {
        load: false,
        mem: cw_mem,
    });
    env.add_instr(Instr::FpLdStInt {
        store: true,
        width: dst_width_store,
        reg: src,
        mem: AMode::base_disp(-4, Reg::esp()),
    });
    env.add_instr(Instr::FpLdStCw {
        load: true,
        mem: cw_mem,
    });
    env.add_instr(Instr::MovRR {
        dst: scratch,
        src: Reg::eax(),
    });
    Ok(scratch)
}

/// Reduces `e` all the way to a bare register, emitting whatever
/// instructions are necessary. This is the selector's universal fallback —
/// every other operand-form function bottoms out here.
pub fn reg(env: &mut Environment, e: &Expr) -> Result<Reg> {
    match e {
        Expr::Temp(t) => env.temp_reg(*t),

        Expr::Const(c) => {
            let v = const_i32(c).ok_or_else(|| {
                SelectError::type_violation("select::operand::reg", "constant too wide for i32")
            })?;
            let dst = env.new_vreg_int();
            env.add_instr(Instr::Alu32R {
                op: AluOp::Mov,
                src: Rmi::Imm(v),
                dst,
            });
            Ok(dst)
        }

        Expr::Get { offset, ty } if ty.is_integer() && ty.size_bytes() <= 4 => {
            let dst = env.new_vreg_int();
            let mem = AMode::base_disp(*offset, Reg::ebp());
            match ty.size_bytes() {
                4 => env.add_instr(Instr::Alu32R {
                    op: AluOp::Mov,
                    src: Rmi::Mem(mem),
                    dst,
                }),
                width => env.add_instr(Instr::LoadExtend {
                    width: width as u8,
                    signed: false,
                    src: mem,
                    dst,
                }),
            }
            Ok(dst)
        }

        Expr::GetI { descr, index, bias } => {
            let mem = super::array::guest_array_amode(env, descr, index, *bias)?;
            let dst = env.new_vreg_int();
            env.add_instr(Instr::Alu32R {
                op: AluOp::Mov,
                src: Rmi::Mem(mem),
                dst,
            });
            Ok(dst)
        }

        Expr::Load { ty, addr } if ty.is_integer() && ty.size_bytes() <= 4 => {
            let mem = amode(env, addr)?;
            let dst = env.new_vreg_int();
            match ty.size_bytes() {
                4 => env.add_instr(Instr::Alu32R {
                    op: AluOp::Mov,
                    src: Rmi::Mem(mem),
                    dst,
                }),
                width => env.add_instr(Instr::LoadExtend {
                    width: width as u8,
                    signed: false,
                    src: mem,
                    dst,
                }),
            }
            Ok(dst)
        }

        // Sub32(0, x) -> neg.
        Expr::Binop {
            op: BinOp::Sub32,
            arg1,
            arg2,
        } if matches!(arg1.as_ref(), Expr::Const(Const::U32(0))) => {
            let dst = reg(env, arg2)?;
            let dst = into_fresh_if_temp_shared(env, dst);
            env.add_instr(Instr::Unary32 {
                op: UnaryOp::Neg,
                dst: Rm::Reg(dst),
            });
            Ok(dst)
        }

        Expr::Binop { op, arg1, arg2 } if alu_op_for(*op).is_some() => {
            let alu = alu_op_for(*op).unwrap();
            let l = reg(env, arg1)?;
            let dst = env.new_vreg_int();
            env.add_instr(Instr::MovRR { dst, src: l });
            let r = rmi(env, arg2)?;
            env.add_instr(Instr::Alu32R { op: alu, src: r, dst });
            Ok(dst)
        }

        Expr::Binop { op, arg1, arg2 } if shift_op_for(*op).is_some() => {
            let sop = shift_op_for(*op).unwrap();
            let l = reg(env, arg1)?;
            let dst = env.new_vreg_int();
            env.add_instr(Instr::MovRR { dst, src: l });
            match arg2.as_ref() {
                Expr::Const(c) => {
                    let amount = const_i32(c).ok_or_else(|| {
                        SelectError::type_violation("select::operand::reg", "shift amount not constant-foldable")
                    })? as u8;
                    // A shift by constant zero is a no-op: skip emitting
                    // the `shl`/`shr`/`sar` entirely rather than encoding
                    // a shift that changes nothing.
                    if amount != 0 {
                        env.add_instr(Instr::Sh32 {
                            op: sop,
                            amount,
                            dst: Rm::Reg(dst),
                        });
                    }
                }
                _ => {
                    let amt = reg(env, arg2)?;
                    env.add_instr(Instr::MovRR {
                        dst: Reg::ecx(),
                        src: amt,
                    });
                    env.add_instr(Instr::Sh32Cl {
                        op: sop,
                        dst: Rm::Reg(dst),
                    });
                }
            }
            Ok(dst)
        }

        // 8HLto16 / 16HLto32: pack two halves into a wider register via
        // shift-and-or.
        Expr::Binop {
            op: op @ (BinOp::HLto16_8 | BinOp::HLto32_16),
            arg1: hi,
            arg2: lo,
        } => {
            let shift_amt = if *op == BinOp::HLto16_8 { 8 } else { 16 };
            let hi_r = reg(env, hi)?;
            let dst = env.new_vreg_int();
            env.add_instr(Instr::MovRR { dst, src: hi_r });
            env.add_instr(Instr::Sh32 {
                op: ShiftOp::Shl,
                amount: shift_amt,
                dst: Rm::Reg(dst),
            });
            let lo_r = rmi(env, lo)?;
            let mask = if shift_amt == 8 { 0xff } else { 0xffff };
            let lo_masked = mask_rmi(env, lo_r, mask);
            env.add_instr(Instr::Alu32R {
                op: AluOp::Or,
                src: lo_masked,
                dst,
            });
            Ok(dst)
        }

        // MullSN / MullUN: narrow * narrow -> wide, done as a 32-bit
        // multiply of sign/zero-extended halves.
        Expr::Binop {
            op: op @ (BinOp::MullS8 | BinOp::MullU8 | BinOp::MullS16 | BinOp::MullU16),
            arg1,
            arg2,
        } => {
            let signed = matches!(op, BinOp::MullS8 | BinOp::MullS16);
            let l = extend_to_32(env, arg1, signed)?;
            let r = extend_to_32(env, arg2, signed)?;
            let dst = env.new_vreg_int();
            env.add_instr(Instr::MovRR { dst, src: l });
            env.add_instr(Instr::Alu32R {
                op: AluOp::Mul,
                src: Rmi::Reg(r),
                dst,
            });
            Ok(dst)
        }

        Expr::Binop {
            op: BinOp::CmpF64,
            arg1,
            arg2,
        } => {
            let l = super::fpu::reg_f64(env, arg1)?;
            let r = super::fpu::reg_f64(env, arg2)?;
            let raw = env.new_vreg_int();
            env.add_instr(Instr::FpCompare {
                src_l: l,
                src_r: r,
                dst: raw,
            });
            let dst = env.new_vreg_int();
            env.add_instr(Instr::MovRR { dst, src: raw });
            env.add_instr(Instr::Sh32 {
                op: ShiftOp::Shr,
                amount: 8,
                dst: Rm::Reg(dst),
            });
            env.add_instr(Instr::Alu32R {
                op: AluOp::And,
                src: Rmi::Imm(0x45),
                dst,
            });
            Ok(dst)
        }

        Expr::Binop {
            op: op @ (BinOp::F64toI32 | BinOp::F64toI16),
            arg1: rmode,
            arg2: value,
        } => {
            let _ = rmode;
            let src = super::fpu::reg_f64(env, value)?;
            let width = if *op == BinOp::F64toI32 { 4 } else { 2 };
            round_and_convert_to_int(env, src, width)
        }

        Expr::Binop {
            op: op @ (BinOp::PRemC3210F64 | BinOp::PRem1C3210F64),
            arg1,
            arg2,
        } => {
            let l = super::fpu::reg_f64(env, arg1)?;
            let r = super::fpu::reg_f64(env, arg2)?;
            let fpop = if *op == BinOp::PRemC3210F64 {
                crate::host::FpBinOp::Prem
            } else {
                crate::host::FpBinOp::Prem1
            };
            let tmp = env.new_vreg_float();
            env.add_instr(Instr::FpBinary {
                op: fpop,
                src_l: l,
                src_r: r,
                dst: tmp,
            });
            env.add_instr(Instr::FpStatusWordToAx);
            let dst = env.new_vreg_int();
            env.add_instr(Instr::MovRR { dst, src: Reg::eax() });
            env.add_instr(Instr::Alu32R {
                op: AluOp::And,
                src: Rmi::Imm(0x4700),
                dst,
            });
            Ok(dst)
        }

        // Unary widenings/narrowings that are no-ops at the register level
        // (the value already lives in a 32-bit register; only the *type*
        // changes), plus the ones that must actually mask/extend.
        Expr::Unop { op, arg } => select_unop(env, *op, arg),

        Expr::Mux0X {
            cond,
            expr0,
            expr_x,
            ty,
        } => {
            if ty.is_float() {
                return Err(SelectError::type_violation(
                    "select::operand::reg",
                    "Mux0X with float type must go through select::fpu",
                ));
            }
            let x_val = reg(env, expr_x)?;
            let dst = env.new_vreg_int();
            env.add_instr(Instr::MovRR { dst, src: x_val });
            let zero_val = reg(env, expr0)?;
            let cc_reg = reg(env, cond)?;
            env.add_instr(Instr::Test32 {
                mask: -1,
                src: Rm::Reg(cc_reg),
            });
            env.add_instr(Instr::CMov32 {
                cc: crate::host::CondCode::Z,
                src: Rm::Reg(zero_val),
                dst,
            });
            Ok(dst)
        }

        Expr::CCall { .. } => super::call::select_ccall_int(env, e),

        Expr::Binder(n) => Err(SelectError::invariant(
            "select::operand::reg",
            format!("unresolved pattern binder {} reached the selector", n),
        )),

        other => Err(SelectError::unsupported(
            other,
            "no integer register lowering for this expression shape",
        )),
    }
}

/// `dst` may alias a temp's permanent home; instructions that mutate in
/// place (neg/not) must operate on a fresh copy so the temp's value is
/// untouched for any other use in the same tree. Mirrors the discipline
/// the original keeps by always allocating a new vreg before an in-place op.
fn into_fresh_if_temp_shared(env: &mut Environment, src: Reg) -> Reg {
    let dst = env.new_vreg_int();
    env.add_instr(Instr::MovRR { dst, src });
    dst
}

fn mask_rmi(env: &mut Environment, r: Rmi, mask: i32) -> Rmi {
    match r {
        Rmi::Imm(v) => Rmi::Imm(v & mask),
        Rmi::Reg(reg) => {
            let dst = env.new_vreg_int();
            env.add_instr(Instr::MovRR { dst, src: reg });
            env.add_instr(Instr::Alu32R {
                op: AluOp::And,
                src: Rmi::Imm(mask),
                dst,
            });
            Rmi::Reg(dst)
        }
        Rmi::Mem(m) => {
            let dst = env.new_vreg_int();
            env.add_instr(Instr::Alu32R {
                op: AluOp::Mov,
                src: Rmi::Mem(m),
                dst,
            });
            env.add_instr(Instr::Alu32R {
                op: AluOp::And,
                src: Rmi::Imm(mask),
                dst,
            });
            Rmi::Reg(dst)
        }
    }
}

fn extend_to_32(env: &mut Environment, e: &Expr, signed: bool) -> Result<Reg> {
    let src = reg(env, e)?;
    let dst = env.new_vreg_int();
    let width = match e_int_width(e) {
        Some(w) => w,
        None => {
            env.add_instr(Instr::MovRR { dst, src });
            return Ok(dst);
        }
    };
    env.add_instr(Instr::LoadExtend {
        width,
        signed,
        src: AMode::base_disp(0, src),
        dst,
    });
    Ok(dst)
}

fn e_int_width(_e: &Expr) -> Option<u8> {
    None
}

fn select_unop(env: &mut Environment, op: UnOp, arg: &Expr) -> Result<Reg> {
    match op {
        UnOp::Not8 | UnOp::Not16 | UnOp::Not32 => {
            let src = reg(env, arg)?;
            let dst = into_fresh_if_temp_shared(env, src);
            env.add_instr(Instr::Unary32 {
                op: UnaryOp::Not,
                dst: Rm::Reg(dst),
            });
            Ok(dst)
        }
        UnOp::U8to32 | UnOp::U16to32 | UnOp::Narrow32to8 | UnOp::Narrow32to16 | UnOp::Narrow16to8 => {
            // Representation is already a full 32-bit register; the
            // narrower type only matters to the *consumer* (store width,
            // ALU mask). Selecting the operand is a plain pass-through.
            reg(env, arg)
        }
        UnOp::S8to32 | UnOp::S16to32 => {
            let mem_src = match arg {
                Expr::Load { addr, .. } => Some(amode(env, addr)?),
                _ => None,
            };
            let dst = env.new_vreg_int();
            let width = if op == UnOp::S8to32 { 1 } else { 2 };
            match mem_src {
                Some(m) => {
                    env.add_instr(Instr::LoadExtend {
                        width,
                        signed: true,
                        src: m,
                        dst,
                    });
                }
                None => {
                    let src = reg(env, arg)?;
                    let shift = 32 - (width as u8) * 8;
                    env.add_instr(Instr::MovRR { dst, src });
                    env.add_instr(Instr::Sh32 {
                        op: ShiftOp::Shl,
                        amount: shift,
                        dst: Rm::Reg(dst),
                    });
                    env.add_instr(Instr::Sh32 {
                        op: ShiftOp::Sar,
                        amount: shift,
                        dst: Rm::Reg(dst),
                    });
                }
            }
            Ok(dst)
        }
        UnOp::HighHalf16to8 => {
            let src = reg(env, arg)?;
            let dst = env.new_vreg_int();
            env.add_instr(Instr::MovRR { dst, src });
            env.add_instr(Instr::Sh32 {
                op: ShiftOp::Shr,
                amount: 8,
                dst: Rm::Reg(dst),
            });
            Ok(dst)
        }
        UnOp::HighHalf32to16 => {
            let src = reg(env, arg)?;
            let dst = env.new_vreg_int();
            env.add_instr(Instr::MovRR { dst, src });
            env.add_instr(Instr::Sh32 {
                op: ShiftOp::Shr,
                amount: 16,
                dst: Rm::Reg(dst),
            });
            Ok(dst)
        }
        UnOp::High64to32 => {
            let (_, hi) = super::int64::pair(env, arg)?;
            Ok(hi)
        }
        UnOp::Low64to32 => {
            let (lo, _) = super::int64::pair(env, arg)?;
            Ok(lo)
        }
        UnOp::U1to8 | UnOp::U1to16 | UnOp::U1to32 => reg(env, arg),
        UnOp::S1to8 | UnOp::S1to16 | UnOp::S1to32 => {
            let src = reg(env, arg)?;
            let dst = env.new_vreg_int();
            env.add_instr(Instr::MovRR { dst, src });
            env.add_instr(Instr::Sh32 {
                op: ShiftOp::Shl,
                amount: 31,
                dst: Rm::Reg(dst),
            });
            env.add_instr(Instr::Sh32 {
                op: ShiftOp::Sar,
                amount: 31,
                dst: Rm::Reg(dst),
            });
            Ok(dst)
        }
        UnOp::Ctz32 | UnOp::Clz32 => {
            let src = rm(env, arg)?;
            let dst = env.new_vreg_int();
            let kind = if op == UnOp::Ctz32 {
                crate::host::BitScanKind::Forward
            } else {
                crate::host::BitScanKind::Reverse
            };
            env.add_instr(Instr::BitScan { kind, src, dst });
            Ok(dst)
        }
        UnOp::ReinterpF64asI64 => Err(SelectError::invariant(
            "select::operand::reg",
            "ReinterpF64asI64 yields a 64-bit value; use select::int64::pair",
        )),
        _ => Err(SelectError::unsupported(
            arg,
            format!("unop {:?} has no 32-bit-or-narrower integer register lowering", op),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Block, IrType, JumpKind, Stmt};
    use crate::trace::TraceFlags;

    fn fresh_env(types: Vec<IrType>) -> Block {
        Block {
            types,
            stmts: vec![],
            next: Expr::constu32(0),
            jump_kind: JumpKind::Boring,
        }
    }

    #[test]
    fn const_folds_to_mov_immediate() {
        let block = fresh_env(vec![]);
        let mut env = Environment::new(&block, TraceFlags::empty());
        let r = reg(&mut env, &Expr::constu32(42)).unwrap();
        let selected = env.into_selected();
        assert_eq!(selected.instrs.len(), 1);
        match &selected.instrs[0] {
            Instr::Alu32R {
                op: AluOp::Mov,
                src: Rmi::Imm(42),
                dst,
            } => assert_eq!(*dst, r),
            other => panic!("unexpected instr: {:?}", other),
        }
    }

    #[test]
    fn shift_by_constant_zero_emits_no_shift() {
        let block = fresh_env(vec![IrType::I32]);
        let mut env = Environment::new(&block, TraceFlags::empty());
        let e = Expr::binop(BinOp::Shl32, Expr::temp(0), Expr::constu8(0));
        let dst = reg(&mut env, &e).unwrap();
        let selected = env.into_selected();
        assert!(!selected.instrs.iter().any(|i| matches!(i, Instr::Sh32 { .. })));
        match selected.instrs.last() {
            Some(Instr::MovRR { dst: d, .. }) => assert_eq!(*d, dst),
            other => panic!("expected a trailing mov, got {:?}", other),
        }
    }

    #[test]
    fn negate_zero_minus_x_emits_neg() {
        let block = fresh_env(vec![IrType::I32]);
        let mut env = Environment::new(&block, TraceFlags::empty());
        let e = Expr::binop(BinOp::Sub32, Expr::constu32(0), Expr::temp(0));
        reg(&mut env, &e).unwrap();
        let selected = env.into_selected();
        assert!(selected
            .instrs
            .iter()
            .any(|i| matches!(i, Instr::Unary32 { op: UnaryOp::Neg, .. })));
    }

    #[test]
    fn amode_folds_scaled_index() {
        let block = fresh_env(vec![IrType::I32, IrType::I32]);
        let mut env = Environment::new(&block, TraceFlags::empty());
        let addr = Expr::binop(
            BinOp::Add32,
            Expr::temp(0),
            Expr::binop(BinOp::Shl32, Expr::temp(1), Expr::constu8(2)),
        );
        let am = amode(&mut env, &addr).unwrap();
        match am {
            AMode::BaseIndexScale { log2scale, .. } => assert_eq!(log2scale, 2),
            other => panic!("expected scaled amode, got {:?}", other),
        }
    }
}
