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

//! Lowers a `Bit`-typed expression to an x86 [`CondCode`] plus the
//! instructions needed to set the flags it tests, rather than to a 0/1
//! register value. Used by `Mux0X` (indirectly, via a `test`+`cmov` in
//! [`super::operand`]), by conditional exits, and by the call marshaller's
//! deferred guard evaluation.

use crate::env::Environment;
use crate::error::{Result, SelectError};
use crate::host::{AluOp, CondCode, Instr, Rm, Rmi};
use crate::ir::{BinOp, Const, Expr, UnOp};

fn alu_cmp_cc_32(op: BinOp) -> Option<(AluOp, CondCode)> {
    match op {
        BinOp::CmpEQ32 => Some((AluOp::Sub, CondCode::Z)),
        BinOp::CmpNE32 => Some((AluOp::Sub, CondCode::Nz)),
        BinOp::CmpLT32S => Some((AluOp::Sub, CondCode::L)),
        BinOp::CmpLT32U => Some((AluOp::Sub, CondCode::B)),
        BinOp::CmpLE32S => Some((AluOp::Sub, CondCode::Le)),
        BinOp::CmpLE32U => Some((AluOp::Sub, CondCode::Be)),
        _ => None,
    }
}

fn cc_width(op: BinOp) -> Option<(u8, CondCode)> {
    match op {
        BinOp::CmpEQ8 => Some((1, CondCode::Z)),
        BinOp::CmpNE8 => Some((1, CondCode::Nz)),
        BinOp::CmpEQ16 => Some((2, CondCode::Z)),
        BinOp::CmpNE16 => Some((2, CondCode::Nz)),
        _ => None,
    }
}

/// Selects `e` (a `Bit`-typed expression) as a condition code, emitting a
/// `cmp`/`test`-class instruction that sets the flags the returned code
/// reads. Always succeeds for a well-typed `Bit` expression or returns an
/// error describing the unsupported shape.
pub fn select_cc(env: &mut Environment, e: &Expr) -> Result<CondCode> {
    match e {
        Expr::Const(Const::Bit(true)) => Ok(CondCode::Always),
        Expr::Const(Const::Bit(false)) => {
            // False is representable as "always, inverted" by the caller;
            // there is no single flag state meaning "never", so this is an
            // invariant violation if a caller ever asks for it directly.
            Err(SelectError::invariant(
                "select::cc::select_cc",
                "constant-false condition must be folded away upstream",
            ))
        }
        Expr::Unop {
            op: UnOp::Not1Bit,
            arg,
        } => Ok(select_cc(env, arg)?.invert()),

        // 1Uto32 composed with 32to1 is a no-op round trip through a
        // wider type; match straight through to the inner condition.
        Expr::Unop {
            op: UnOp::Narrow32to1,
            arg,
        } => match arg.as_ref() {
            Expr::Unop {
                op: UnOp::U1to32,
                arg: inner,
            } => select_cc(env, inner),
            other => select_cc_from_nonzero_test(env, other),
        },

        Expr::Binop { op, arg1, arg2 } if cc_width(*op).is_some() => {
            let (width, cc) = cc_width(*op).unwrap();
            let l = super::operand::reg(env, arg1)?;
            let r = super::operand::rmi(env, arg2)?;
            let mask = match width {
                1 => 0xff,
                2 => 0xffff,
                _ => -1i32,
            };
            let masked_l = mask_reg(env, l, mask);
            let masked_r = mask_rmi(env, r, mask);
            env.add_instr(Instr::Alu32R {
                op: AluOp::Sub,
                src: masked_r,
                dst: masked_l,
            });
            Ok(cc)
        }

        Expr::Binop { op, arg1, arg2 } if alu_cmp_cc_32(*op).is_some() => {
            let (alu, cc) = alu_cmp_cc_32(*op).unwrap();
            let l = super::operand::reg(env, arg1)?;
            let r = super::operand::rmi(env, arg2)?;
            let scratch = env.new_vreg_int();
            env.add_instr(Instr::MovRR { dst: scratch, src: l });
            env.add_instr(Instr::Alu32R { op: alu, src: r, dst: scratch });
            Ok(cc)
        }

        // CmpNE64(1Sto64(b), 0) is a disguised Bit-to-Bit identity; match
        // before falling into the general 64-bit comparison.
        Expr::Binop {
            op: BinOp::CmpNE64,
            arg1,
            arg2,
        } if matches!(arg2.as_ref(), Expr::Const(Const::U64(0))) => {
            if let Expr::Unop {
                op: UnOp::S1to32,
                arg: inner,
            } = arg1.as_ref()
            {
                return select_cc(env, inner);
            }
            select_cc_64_nonzero(env, arg1)
        }

        Expr::Binop {
            op: BinOp::CmpNE64,
            arg1,
            arg2,
        } => {
            let (l_lo, l_hi) = super::int64::pair(env, arg1)?;
            let (r_lo, r_hi) = super::int64::pair(env, arg2)?;
            let scratch_lo = env.new_vreg_int();
            env.add_instr(Instr::MovRR { dst: scratch_lo, src: l_lo });
            env.add_instr(Instr::Alu32R {
                op: AluOp::Xor,
                src: Rmi::Reg(r_lo),
                dst: scratch_lo,
            });
            let scratch_hi = env.new_vreg_int();
            env.add_instr(Instr::MovRR { dst: scratch_hi, src: l_hi });
            env.add_instr(Instr::Alu32R {
                op: AluOp::Xor,
                src: Rmi::Reg(r_hi),
                dst: scratch_hi,
            });
            env.add_instr(Instr::Alu32R {
                op: AluOp::Or,
                src: Rmi::Reg(scratch_hi),
                dst: scratch_lo,
            });
            Ok(CondCode::Nz)
        }

        Expr::Temp(_) => select_cc_from_nonzero_test(env, e),

        other => Err(SelectError::unsupported(
            other,
            "no condition-code lowering for this bit expression shape",
        )),
    }
}

fn select_cc_from_nonzero_test(env: &mut Environment, e: &Expr) -> Result<CondCode> {
    let r = super::operand::rm(env, e)?;
    env.add_instr(Instr::Test32 { mask: 1, src: r });
    Ok(CondCode::Nz)
}

fn select_cc_64_nonzero(env: &mut Environment, e: &Expr) -> Result<CondCode> {
    let (lo, hi) = super::int64::pair(env, e)?;
    let scratch = env.new_vreg_int();
    env.add_instr(Instr::MovRR { dst: scratch, src: lo });
    env.add_instr(Instr::Alu32R {
        op: AluOp::Or,
        src: Rmi::Reg(hi),
        dst: scratch,
    });
    Ok(CondCode::Nz)
}

fn mask_reg(env: &mut Environment, r: crate::host::Reg, mask: i32) -> crate::host::Reg {
    if mask == -1 {
        return r;
    }
    let dst = env.new_vreg_int();
    env.add_instr(Instr::MovRR { dst, src: r });
    env.add_instr(Instr::Alu32R {
        op: AluOp::And,
        src: Rmi::Imm(mask),
        dst,
    });
    dst
}

fn mask_rmi(env: &mut Environment, r: Rmi, mask: i32) -> Rmi {
    if mask == -1 {
        return r;
    }
    match r {
        Rmi::Imm(v) => Rmi::Imm(v & mask),
        Rmi::Reg(reg) => Rmi::Reg(mask_reg(env, reg, mask)),
        Rmi::Mem(_) => {
            let dst = env.new_vreg_int();
            if let Rmi::Mem(m) = r {
                env.add_instr(Instr::Alu32R {
                    op: AluOp::Mov,
                    src: Rmi::Mem(m),
                    dst,
                });
            }
            env.add_instr(Instr::Alu32R {
                op: AluOp::And,
                src: Rmi::Imm(mask),
                dst,
            });
            Rmi::Reg(dst)
        }
    }
}

#[allow(dead_code)]
fn unused_rm_silencer(_: Rm) {}

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
    fn const_true_is_always() {
        let block = fresh_env(vec![]);
        let mut env = Environment::new(&block, TraceFlags::empty());
        let cc = select_cc(&mut env, &Expr::Const(Const::Bit(true))).unwrap();
        assert_eq!(cc, CondCode::Always);
    }

    #[test]
    fn cmpeq32_yields_z() {
        let block = fresh_env(vec![IrType::I32]);
        let mut env = Environment::new(&block, TraceFlags::empty());
        let e = Expr::binop(BinOp::CmpEQ32, Expr::temp(0), Expr::constu32(4));
        let cc = select_cc(&mut env, &e).unwrap();
        assert_eq!(cc, CondCode::Z);
    }

    #[test]
    fn not1_inverts() {
        let block = fresh_env(vec![IrType::I32]);
        let mut env = Environment::new(&block, TraceFlags::empty());
        let inner = Expr::binop(BinOp::CmpEQ32, Expr::temp(0), Expr::constu32(4));
        let e = Expr::unop(UnOp::Not1Bit, inner);
        let cc = select_cc(&mut env, &e).unwrap();
        assert_eq!(cc, CondCode::Nz);
    }
}
