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

//! Lowers `I64`-typed expressions onto a `(lo, hi)` pair of 32-bit integer
//! vregs, since the target has no 64-bit general-purpose register. Every
//! function here returns the pair rather than a single [`Reg`].

use crate::env::Environment;
use crate::error::{Result, SelectError};
use crate::host::{AluOp, CondCode, DivKind, Instr, MulLongKind, Reg, Rm, Rmi, ShiftOp};
use crate::ir::{BinOp, Const, Expr, IrType, UnOp};

/// Selects `e` (an `I64`-typed expression) onto a `(lo, hi)` vreg pair.
pub fn pair(env: &mut Environment, e: &Expr) -> Result<(Reg, Reg)> {
    match e {
        Expr::Temp(t) => env.temp_pair(*t),

        Expr::Const(Const::U64(v)) => {
            let lo = env.new_vreg_int();
            let hi = env.new_vreg_int();
            env.add_instr(Instr::Alu32R {
                op: AluOp::Mov,
                src: Rmi::Imm(*v as u32 as i32),
                dst: lo,
            });
            env.add_instr(Instr::Alu32R {
                op: AluOp::Mov,
                src: Rmi::Imm((*v >> 32) as u32 as i32),
                dst: hi,
            });
            Ok((lo, hi))
        }

        Expr::Load {
            ty: IrType::I64,
            addr,
        } => {
            let base = super::operand::amode(env, addr)?;
            let lo = env.new_vreg_int();
            let hi = env.new_vreg_int();
            env.add_instr(Instr::Alu32R {
                op: AluOp::Mov,
                src: Rmi::Mem(base),
                dst: lo,
            });
            env.add_instr(Instr::Alu32R {
                op: AluOp::Mov,
                src: Rmi::Mem(base.advance(4)),
                dst: hi,
            });
            Ok((lo, hi))
        }

        Expr::GetI { descr, index, bias } => {
            let base = super::array::guest_array_amode(env, descr, index, *bias)?;
            let lo = env.new_vreg_int();
            let hi = env.new_vreg_int();
            env.add_instr(Instr::Alu32R {
                op: AluOp::Mov,
                src: Rmi::Mem(base),
                dst: lo,
            });
            env.add_instr(Instr::Alu32R {
                op: AluOp::Mov,
                src: Rmi::Mem(base.advance(4)),
                dst: hi,
            });
            Ok((lo, hi))
        }

        Expr::Mux0X {
            cond,
            expr0,
            expr_x,
            ty: IrType::I64,
        } => {
            let (x_lo, x_hi) = pair(env, expr_x)?;
            let dst_lo = env.new_vreg_int();
            let dst_hi = env.new_vreg_int();
            env.add_instr(Instr::MovRR { dst: dst_lo, src: x_lo });
            env.add_instr(Instr::MovRR { dst: dst_hi, src: x_hi });
            let (zero_lo, zero_hi) = pair(env, expr0)?;
            let cc_reg = super::operand::reg(env, cond)?;
            env.add_instr(Instr::Test32 {
                mask: -1,
                src: Rm::Reg(cc_reg),
            });
            // Two cmovs must both read the same flags, set once: the
            // intervening lowering of `zero_{lo,hi}` must not clobber them,
            // which holds here because both operands are already-selected
            // registers, not fresh computation.
            env.add_instr(Instr::CMov32 {
                cc: CondCode::Z,
                src: Rm::Reg(zero_lo),
                dst: dst_lo,
            });
            env.add_instr(Instr::CMov32 {
                cc: CondCode::Z,
                src: Rm::Reg(zero_hi),
                dst: dst_hi,
            });
            Ok((dst_lo, dst_hi))
        }

        Expr::Binop {
            op: op @ (BinOp::MullU32 | BinOp::MullS32),
            arg1,
            arg2,
        } => {
            let kind = if *op == BinOp::MullU32 {
                MulLongKind::U32
            } else {
                MulLongKind::S32
            };
            let l = super::operand::reg(env, arg1)?;
            let r = super::operand::rm(env, arg2)?;
            env.add_instr(Instr::MovRR { dst: Reg::eax(), src: l });
            env.add_instr(Instr::MulLong { kind, src: r });
            Ok((Reg::eax(), Reg::edx()))
        }

        Expr::Binop {
            op: op @ (BinOp::DivModU64to32 | BinOp::DivModS64to32),
            arg1,
            arg2,
        } => {
            let kind = if *op == BinOp::DivModU64to32 {
                DivKind::U32
            } else {
                DivKind::S32
            };
            let (num_lo, num_hi) = pair(env, arg1)?;
            let divisor = super::operand::rm(env, arg2)?;
            env.add_instr(Instr::MovRR { dst: Reg::eax(), src: num_lo });
            env.add_instr(Instr::MovRR { dst: Reg::edx(), src: num_hi });
            env.add_instr(Instr::Divide { kind, src: divisor });
            Ok((Reg::eax(), Reg::edx()))
        }

        Expr::Binop {
            op: BinOp::Or64,
            arg1,
            arg2,
        } => {
            let (l_lo, l_hi) = pair(env, arg1)?;
            let (r_lo, r_hi) = pair(env, arg2)?;
            let dst_lo = env.new_vreg_int();
            let dst_hi = env.new_vreg_int();
            env.add_instr(Instr::MovRR { dst: dst_lo, src: l_lo });
            env.add_instr(Instr::Alu32R {
                op: AluOp::Or,
                src: Rmi::Reg(r_lo),
                dst: dst_lo,
            });
            env.add_instr(Instr::MovRR { dst: dst_hi, src: l_hi });
            env.add_instr(Instr::Alu32R {
                op: AluOp::Or,
                src: Rmi::Reg(r_hi),
                dst: dst_hi,
            });
            Ok((dst_lo, dst_hi))
        }

        Expr::Binop {
            op: op @ (BinOp::Shl64 | BinOp::Shr64),
            arg1,
            arg2,
        } => lower_shift64(env, *op, arg1, arg2),

        Expr::Binop {
            op: BinOp::F64toI64,
            arg1: _rmode,
            arg2: value,
        } => lower_f64_to_i64(env, value),

        Expr::Unop {
            op: UnOp::HLto32_16,
            arg: _,
        } => Err(SelectError::invariant(
            "select::int64::pair",
            "32HLto64 must be represented as a dedicated Binop, not HLto32_16",
        )),

        Expr::Unop {
            op: UnOp::S1to32,
            arg,
        } => {
            let bitval = super::operand::reg(env, arg)?;
            let lo = env.new_vreg_int();
            env.add_instr(Instr::MovRR { dst: lo, src: bitval });
            env.add_instr(Instr::Sh32 {
                op: ShiftOp::Shl,
                amount: 31,
                dst: Rm::Reg(lo),
            });
            env.add_instr(Instr::Sh32 {
                op: ShiftOp::Sar,
                amount: 31,
                dst: Rm::Reg(lo),
            });
            let hi = env.new_vreg_int();
            env.add_instr(Instr::MovRR { dst: hi, src: lo });
            Ok((lo, hi))
        }

        Expr::Unop {
            op: UnOp::ReinterpF64asI64,
            arg,
        } => {
            let f = super::fpu::reg_f64(env, arg)?;
            let lo = env.new_vreg_int();
            let hi = env.new_vreg_int();
            let mem = crate::host::AMode::base_disp(-8, Reg::esp());
            env.add_instr(Instr::FpLdSt {
                store: true,
                width: 8,
                reg: f,
                mem,
            });
            env.add_instr(Instr::Alu32R {
                op: AluOp::Mov,
                src: Rmi::Mem(mem),
                dst: lo,
            });
            env.add_instr(Instr::Alu32R {
                op: AluOp::Mov,
                src: Rmi::Mem(mem.advance(4)),
                dst: hi,
            });
            Ok((lo, hi))
        }

        Expr::CCall { .. } => super::call::select_ccall_int64(env, e),

        other => Err(SelectError::unsupported(
            other,
            "no 64-bit integer lowering for this expression shape",
        )),
    }
}

/// `32HLto64(hi, lo)`: builds a pair straight from already-32-bit halves.
/// Exposed under its own name because it does not correspond to an
/// `Expr::Unop`/`Expr::Binop` tag already covered by [`pair`]'s match.
pub fn from_halves(env: &mut Environment, hi: &Expr, lo: &Expr) -> Result<(Reg, Reg)> {
    let lo_r = super::operand::reg(env, lo)?;
    let hi_r = super::operand::reg(env, hi)?;
    Ok((lo_r, hi_r))
}

/// `32Sto64`/`32Uto64`: widen a 32-bit value to a pair.
pub fn widen(env: &mut Environment, arg: &Expr, signed: bool) -> Result<(Reg, Reg)> {
    let lo = super::operand::reg(env, arg)?;
    let hi = env.new_vreg_int();
    if signed {
        env.add_instr(Instr::MovRR { dst: hi, src: lo });
        env.add_instr(Instr::Sh32 {
            op: ShiftOp::Sar,
            amount: 31,
            dst: Rm::Reg(hi),
        });
    } else {
        env.add_instr(Instr::Alu32R {
            op: AluOp::Mov,
            src: Rmi::Imm(0),
            dst: hi,
        });
    }
    Ok((lo, hi))
}

fn lower_shift64(env: &mut Environment, op: BinOp, value: &Expr, amount: &Expr) -> Result<(Reg, Reg)> {
    let (v_lo, v_hi) = pair(env, value)?;
    let dst_lo = env.new_vreg_int();
    let dst_hi = env.new_vreg_int();
    env.add_instr(Instr::MovRR { dst: dst_lo, src: v_lo });
    env.add_instr(Instr::MovRR { dst: dst_hi, src: v_hi });

    let shift_op = if op == BinOp::Shl64 {
        ShiftOp::Shl
    } else {
        ShiftOp::Shr
    };

    match amount {
        Expr::Const(c) => {
            let amt = match c {
                Const::U8(v) => *v,
                _ => {
                    return Err(SelectError::type_violation(
                        "select::int64::lower_shift64",
                        "shift amount must be a u8 constant",
                    ))
                }
            };
            if op == BinOp::Shl64 {
                env.add_instr(Instr::Sh3232 {
                    op: ShiftOp::Shl,
                    amount: amt,
                    src: dst_lo,
                    dst: dst_hi,
                });
                env.add_instr(Instr::Sh32 {
                    op: ShiftOp::Shl,
                    amount: amt,
                    dst: Rm::Reg(dst_lo),
                });
            } else {
                env.add_instr(Instr::Sh3232 {
                    op: ShiftOp::Shr,
                    amount: amt,
                    src: dst_hi,
                    dst: dst_lo,
                });
                env.add_instr(Instr::Sh32 {
                    op: shift_op,
                    amount: amt,
                    dst: Rm::Reg(dst_hi),
                });
            }
        }
        _ => {
            let amt = super::operand::reg(env, amount)?;
            env.add_instr(Instr::MovRR { dst: Reg::ecx(), src: amt });
            if op == BinOp::Shl64 {
                env.add_instr(Instr::Sh3232Cl {
                    op: ShiftOp::Shl,
                    src: dst_lo,
                    dst: dst_hi,
                });
                env.add_instr(Instr::Sh32Cl {
                    op: ShiftOp::Shl,
                    dst: Rm::Reg(dst_lo),
                });
            } else {
                env.add_instr(Instr::Sh3232Cl {
                    op: ShiftOp::Shr,
                    src: dst_hi,
                    dst: dst_lo,
                });
                env.add_instr(Instr::Sh32Cl {
                    op: shift_op,
                    dst: Rm::Reg(dst_hi),
                });
            }
            // When the count is >= 32 the `shld`/`shrd` result is
            // architecturally undefined; the original selector patches
            // this with a test-$32,%cl / cmov pair forcing the
            // shifted-but-not-double-shifted half into the other, which
            // is what a count in [32,63] actually means for a logical
            // 64-bit shift.
            env.add_instr(Instr::Test32 {
                mask: 32,
                src: Rm::Reg(Reg::ecx()),
            });
            if op == BinOp::Shl64 {
                env.add_instr(Instr::CMov32 {
                    cc: CondCode::Nz,
                    src: Rm::Reg(dst_lo),
                    dst: dst_hi,
                });
                let zero = env.new_vreg_int();
                env.add_instr(Instr::Alu32R {
                    op: AluOp::Mov,
                    src: Rmi::Imm(0),
                    dst: zero,
                });
                env.add_instr(Instr::CMov32 {
                    cc: CondCode::Nz,
                    src: Rm::Reg(zero),
                    dst: dst_lo,
                });
            } else {
                env.add_instr(Instr::CMov32 {
                    cc: CondCode::Nz,
                    src: Rm::Reg(dst_hi),
                    dst: dst_lo,
                });
                let zero = env.new_vreg_int();
                env.add_instr(Instr::Alu32R {
                    op: AluOp::Mov,
                    src: Rmi::Imm(0),
                    dst: zero,
                });
                env.add_instr(Instr::CMov32 {
                    cc: CondCode::Nz,
                    src: Rm::Reg(zero),
                    dst: dst_hi,
                });
            }
        }
    }
    Ok((dst_lo, dst_hi))
}

fn lower_f64_to_i64(env: &mut Environment, value: &Expr) -> Result<(Reg, Reg)> {
    let src = super::fpu::reg_f64(env, value)?;
    let cw_mem = crate::host::AMode::base_disp(-8, Reg::esp());
    let out_mem = crate::host::AMode::base_disp(-16, Reg::esp());
    env.add_instr(Instr::FpLdStCw {
        load: false,
        mem: cw_mem,
    });
    env.add_instr(Instr::FpLdStInt {
        store: true,
        width: 8,
        reg: src,
        mem: out_mem,
    });
    env.add_instr(Instr::FpLdStCw {
        load: true,
        mem: cw_mem,
    });
    let lo = env.new_vreg_int();
    let hi = env.new_vreg_int();
    env.add_instr(Instr::Alu32R {
        op: AluOp::Mov,
        src: Rmi::Mem(out_mem),
        dst: lo,
    });
    env.add_instr(Instr::Alu32R {
        op: AluOp::Mov,
        src: Rmi::Mem(out_mem.advance(4)),
        dst: hi,
    });
    Ok((lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Block, IrType, JumpKind};
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
    fn const_u64_splits_into_two_movs() {
        let block = fresh_env(vec![]);
        let mut env = Environment::new(&block, TraceFlags::empty());
        let (lo, hi) = pair(&mut env, &Expr::Const(Const::U64(0x1_0000_0002))).unwrap();
        assert_ne!(lo, hi);
        let selected = env.into_selected();
        assert_eq!(selected.instrs.len(), 2);
    }

    #[test]
    fn shift_by_immediate_uses_double_shift() {
        let block = fresh_env(vec![IrType::I64]);
        let mut env = Environment::new(&block, TraceFlags::empty());
        let e = Expr::binop(BinOp::Shl64, Expr::temp(0), Expr::constu8(5));
        pair(&mut env, &e).unwrap();
        let selected = env.into_selected();
        assert!(selected.instrs.iter().any(|i| matches!(i, Instr::Sh3232 { .. })));
    }
}
