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

//! Lowers `F32`/`F64`-typed expressions onto x87-style floating pseudo
//! registers.

use crate::env::Environment;
use crate::error::{Result, SelectError};
use crate::host::{AluOp, CondCode, FpBinOp, FpUnOp, Instr, Reg, Rm, Rmi};
use crate::ir::{BinOp, Const, Expr, IrType, RoundingMode, UnOp};

fn fp_binop_for(op: BinOp) -> Option<FpBinOp> {
    match op {
        BinOp::AddF64 => Some(FpBinOp::Add),
        BinOp::SubF64 => Some(FpBinOp::Sub),
        BinOp::MulF64 => Some(FpBinOp::Mul),
        BinOp::DivF64 => Some(FpBinOp::Div),
        BinOp::ScaleF64 => Some(FpBinOp::Scale),
        BinOp::AtanF64 => Some(FpBinOp::Atan),
        BinOp::Yl2xF64 => Some(FpBinOp::Yl2x),
        BinOp::Yl2xp1F64 => Some(FpBinOp::Yl2xp1),
        BinOp::PRemF64 => Some(FpBinOp::Prem),
        BinOp::PRem1F64 => Some(FpBinOp::Prem1),
        _ => None,
    }
}

fn fp_unop_for(op: UnOp) -> Option<FpUnOp> {
    match op {
        UnOp::NegF64 => Some(FpUnOp::Neg),
        UnOp::AbsF64 => Some(FpUnOp::Abs),
        UnOp::SqrtF64 => Some(FpUnOp::Sqrt),
        UnOp::SinF64 => Some(FpUnOp::Sin),
        UnOp::CosF64 => Some(FpUnOp::Cos),
        UnOp::TanF64 => Some(FpUnOp::Tan),
        UnOp::TwoXm1F64 => Some(FpUnOp::TwoXm1),
        _ => None,
    }
}

/// Selects `e` (an `F64`-typed expression) into a floating pseudo-register.
pub fn reg_f64(env: &mut Environment, e: &Expr) -> Result<Reg> {
    select(env, e, IrType::F64)
}

/// Selects `e` (an `F32`-typed expression) into a floating pseudo-register.
pub fn reg_f32(env: &mut Environment, e: &Expr) -> Result<Reg> {
    select(env, e, IrType::F32)
}

fn select(env: &mut Environment, e: &Expr, want_ty: IrType) -> Result<Reg> {
    let width = want_ty.size_bytes() as u8;
    match e {
        Expr::Temp(t) => env.temp_reg(*t),

        Expr::Get { offset, ty } if *ty == want_ty => {
            let dst = env.new_vreg_float();
            let mem = crate::host::AMode::base_disp(*offset, Reg::ebp());
            env.add_instr(Instr::FpLdSt {
                store: false,
                width,
                reg: dst,
                mem,
            });
            Ok(dst)
        }

        Expr::GetI { descr, index, bias } => {
            let mem = super::array::guest_array_amode(env, descr, index, *bias)?;
            let dst = env.new_vreg_float();
            env.add_instr(Instr::FpLdSt {
                store: false,
                width,
                reg: dst,
                mem,
            });
            Ok(dst)
        }

        Expr::Load { ty, addr } if *ty == want_ty => {
            let mem = super::operand::amode(env, addr)?;
            let dst = env.new_vreg_float();
            env.add_instr(Instr::FpLdSt {
                store: false,
                width,
                reg: dst,
                mem,
            });
            Ok(dst)
        }

        // A float constant has no immediate encoding on x87: push its raw
        // bits onto the stack (lo dword first, then hi for an 8-byte
        // constant) and load it back from there.
        Expr::Const(c) => {
            let bits = match (c, want_ty) {
                (Const::F64(v), IrType::F64) => v.to_bits(),
                (Const::F64Bits(v), IrType::F64) => *v,
                _ => {
                    return Err(SelectError::type_violation(
                        "select::fpu::select",
                        "constant does not match requested float type",
                    ))
                }
            };
            if width == 8 {
                env.add_instr(Instr::Push {
                    src: Rmi::Imm((bits >> 32) as u32 as i32),
                });
                env.add_instr(Instr::Push {
                    src: Rmi::Imm(bits as u32 as i32),
                });
            } else {
                env.add_instr(Instr::Push {
                    src: Rmi::Imm(bits as u32 as i32),
                });
            }
            let dst = env.new_vreg_float();
            let mem = crate::host::AMode::base_disp(0, Reg::esp());
            env.add_instr(Instr::FpLdSt {
                store: false,
                width,
                reg: dst,
                mem,
            });
            env.add_instr(Instr::Alu32R {
                op: AluOp::Add,
                src: Rmi::Imm(width as i32),
                dst: Reg::esp(),
            });
            Ok(dst)
        }

        Expr::Binop { op, arg1, arg2 } if fp_binop_for(*op).is_some() => {
            let fpop = fp_binop_for(*op).unwrap();
            let l = select(env, arg1, want_ty)?;
            let r = select(env, arg2, want_ty)?;
            let dst = env.new_vreg_float();
            env.add_instr(Instr::FpBinary {
                op: fpop,
                src_l: l,
                src_r: r,
                dst,
            });
            Ok(dst)
        }

        Expr::Unop { op, arg } if fp_unop_for(*op).is_some() => {
            let fpop = fp_unop_for(*op).unwrap();
            let src = select(env, arg, want_ty)?;
            let dst = env.new_vreg_float();
            env.add_instr(Instr::FpUnary {
                op: fpop,
                src,
                dst,
            });
            Ok(dst)
        }

        Expr::Unop {
            op: UnOp::I32toF64,
            arg,
        } if want_ty == IrType::F64 => {
            let src = super::operand::reg(env, arg)?;
            let mem = crate::host::AMode::base_disp(-4, Reg::esp());
            env.add_instr(Instr::Store {
                width: 4,
                src: crate::host::Ri::Reg(src),
                dst: mem,
            });
            let dst = env.new_vreg_float();
            env.add_instr(Instr::FpLdStInt {
                store: false,
                width: 4,
                reg: dst,
                mem,
            });
            Ok(dst)
        }

        Expr::Unop {
            op: UnOp::I64toF64,
            arg,
        } if want_ty == IrType::F64 => {
            let (lo, hi) = super::int64::pair(env, arg)?;
            let mem = crate::host::AMode::base_disp(-8, Reg::esp());
            env.add_instr(Instr::Store {
                width: 4,
                src: crate::host::Ri::Reg(lo),
                dst: mem,
            });
            env.add_instr(Instr::Store {
                width: 4,
                src: crate::host::Ri::Reg(hi),
                dst: mem.advance(4),
            });
            let dst = env.new_vreg_float();
            env.add_instr(Instr::FpLdStInt {
                store: false,
                width: 8,
                reg: dst,
                mem,
            });
            Ok(dst)
        }

        Expr::Unop {
            op: UnOp::ReinterpI64asF64,
            arg,
        } if want_ty == IrType::F64 => {
            let (lo, hi) = super::int64::pair(env, arg)?;
            let mem = crate::host::AMode::base_disp(-8, Reg::esp());
            env.add_instr(Instr::Store {
                width: 4,
                src: crate::host::Ri::Reg(lo),
                dst: mem,
            });
            env.add_instr(Instr::Store {
                width: 4,
                src: crate::host::Ri::Reg(hi),
                dst: mem.advance(4),
            });
            let dst = env.new_vreg_float();
            env.add_instr(Instr::FpLdSt {
                store: false,
                width: 8,
                reg: dst,
                mem,
            });
            Ok(dst)
        }

        Expr::Unop {
            op: UnOp::F32toF64,
            arg,
        } if want_ty == IrType::F64 => select(env, arg, IrType::F32),

        Expr::Unop {
            op: UnOp::F64toF32,
            arg,
        } if want_ty == IrType::F32 => select(env, arg, IrType::F64),

        Expr::Mux0X {
            cond,
            expr0,
            expr_x,
            ty,
        } if *ty == want_ty => {
            let x_val = select(env, expr_x, want_ty)?;
            let dst = env.new_vreg_float();
            env.add_instr(Instr::FpUnary {
                op: FpUnOp::Mov,
                src: x_val,
                dst,
            });
            let zero_val = select(env, expr0, want_ty)?;
            let cc_reg = super::operand::reg(env, cond)?;
            env.add_instr(Instr::Test32 {
                mask: -1,
                src: Rm::Reg(cc_reg),
            });
            env.add_instr(Instr::FpCMov {
                cc: CondCode::Z,
                src: zero_val,
                dst,
            });
            Ok(dst)
        }

        Expr::CCall { .. } => super::call::select_ccall_float(env, e, want_ty),

        Expr::Unop {
            op: UnOp::Round(rmode),
            arg,
        } => round_f64_via_control_word(env, *rmode, arg, want_ty),

        other => Err(SelectError::unsupported(
            other,
            "no floating-point lowering for this expression shape",
        )),
    }
}

/// `RoundF64(rmode, x)`: sets the x87 control word's rounding-control
/// field, performs a round-to-integer-valued-float via `frndint`, then
/// restores the control word.
fn round_f64_via_control_word(
    env: &mut Environment,
    rmode: RoundingMode,
    value: &Expr,
    want_ty: IrType,
) -> Result<Reg> {
    let src = select(env, value, want_ty)?;
    let cw_mem = crate::host::AMode::base_disp(-8, Reg::esp());
    let tmp_cw = crate::host::AMode::base_disp(-4, Reg::esp());
    env.add_instr(Instr::FpLdStCw {
        load: false,
        mem: cw_mem,
    });
    env.add_instr(Instr::Alu32R {
        op: AluOp::Mov,
        src: Rmi::Mem(cw_mem),
        dst: Reg::eax(),
    });
    env.add_instr(Instr::Alu32R {
        op: AluOp::And,
        src: Rmi::Imm(!0xc00u32 as i32),
        dst: Reg::eax(),
    });
    env.add_instr(Instr::Alu32R {
        op: AluOp::Or,
        src: Rmi::Imm((rmode.control_bits() << 10) as i32),
        dst: Reg::eax(),
    });
    env.add_instr(Instr::Store {
        width: 4,
        src: crate::host::Ri::Reg(Reg::eax()),
        dst: tmp_cw,
    });
    env.add_instr(Instr::FpLdStCw {
        load: true,
        mem: tmp_cw,
    });
    let dst = env.new_vreg_float();
    env.add_instr(Instr::FpUnary {
        op: FpUnOp::Round,
        src,
        dst,
    });
    env.add_instr(Instr::FpLdStCw {
        load: true,
        mem: cw_mem,
    });
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Block, JumpKind};
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
    fn f64_add_emits_fp_binary() {
        let block = fresh_env(vec![IrType::F64, IrType::F64]);
        let mut env = Environment::new(&block, TraceFlags::empty());
        let e = Expr::binop(BinOp::AddF64, Expr::temp(0), Expr::temp(1));
        reg_f64(&mut env, &e).unwrap();
        let selected = env.into_selected();
        assert!(selected
            .instrs
            .iter()
            .any(|i| matches!(i, Instr::FpBinary { op: FpBinOp::Add, .. })));
    }

    #[test]
    fn f64_const_pushes_both_halves() {
        let block = fresh_env(vec![]);
        let mut env = Environment::new(&block, TraceFlags::empty());
        let e = Expr::Const(Const::F64(1.5));
        reg_f64(&mut env, &e).unwrap();
        let selected = env.into_selected();
        let pushes = selected
            .instrs
            .iter()
            .filter(|i| matches!(i, Instr::Push { .. }))
            .count();
        assert_eq!(pushes, 2);
    }

    #[test]
    fn f64_mux0x_moves_x_branch_instead_of_double_negating() {
        let block = fresh_env(vec![IrType::I32]);
        let mut env = Environment::new(&block, TraceFlags::empty());
        let e = Expr::Mux0X {
            cond: Box::new(Expr::temp(0)),
            expr0: Box::new(Expr::Const(Const::F64(0.0))),
            expr_x: Box::new(Expr::Const(Const::F64(1.0))),
            ty: IrType::F64,
        };
        reg_f64(&mut env, &e).unwrap();
        let selected = env.into_selected();
        assert!(!selected
            .instrs
            .iter()
            .any(|i| matches!(i, Instr::FpUnary { op: FpUnOp::Neg, .. })));
        assert!(selected
            .instrs
            .iter()
            .any(|i| matches!(i, Instr::FpUnary { op: FpUnOp::Mov, .. })));
    }
}
