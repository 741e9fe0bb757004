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

//! Selects a single IR statement, dispatching to the operand/cc/int64/fpu/
//! call/array lowerers for its constituent expressions.

use crate::env::Environment;
use crate::error::{Result, SelectError};
use crate::host::{CondCode, Instr, Ri};
use crate::ir::{IrType, Stmt};

pub fn select_stmt(env: &mut Environment, stmt: &Stmt) -> Result<()> {
    env.trace_stmt(stmt);
    match stmt {
        Stmt::Store { addr, ty, value } => select_store(env, addr, *ty, value),
        Stmt::Put { offset, ty, value } => select_put(env, *offset, *ty, value),
        Stmt::PutI {
            descr,
            index,
            bias,
            value,
        } => select_puti(env, descr, index, *bias, value),
        Stmt::TempAssign { dst, ty, value } => select_temp_assign(env, *dst, *ty, value),
        Stmt::DirtyCall {
            callee,
            args,
            effects,
            guard,
            result,
        } => select_dirty_call(env, callee, args, effects, guard.as_ref(), result.as_ref()),
        Stmt::Exit {
            guard,
            target,
            jump_kind,
        } => select_exit(env, guard, target, *jump_kind),
    }
}

fn select_store(env: &mut Environment, addr: &crate::ir::Expr, ty: IrType, value: &crate::ir::Expr) -> Result<()> {
    if ty == IrType::I64 {
        let mem = super::operand::amode(env, addr)?;
        let (lo, hi) = super::int64::pair(env, value)?;
        env.add_instr(Instr::Store {
            width: 4,
            src: Ri::Reg(lo),
            dst: mem,
        });
        env.add_instr(Instr::Store {
            width: 4,
            src: Ri::Reg(hi),
            dst: mem.advance(4),
        });
        return Ok(());
    }
    if ty.is_float() {
        let mem = super::operand::amode(env, addr)?;
        let reg = if ty == IrType::F64 {
            super::fpu::reg_f64(env, value)?
        } else {
            super::fpu::reg_f32(env, value)?
        };
        env.add_instr(Instr::FpLdSt {
            store: true,
            width: ty.size_bytes() as u8,
            reg,
            mem,
        });
        return Ok(());
    }
    if ty.size_bytes() > 4 {
        return Err(SelectError::type_violation(
            "select::stmt::select_store",
            "store type wider than 4 bytes must be I64 or float",
        ));
    }
    let mem = super::operand::amode(env, addr)?;
    let v = super::operand::ri(env, value)?;
    env.add_instr(Instr::Store {
        width: ty.size_bytes() as u8,
        src: v,
        dst: mem,
    });
    Ok(())
}

fn select_put(env: &mut Environment, offset: i32, ty: IrType, value: &crate::ir::Expr) -> Result<()> {
    let mem = crate::host::AMode::base_disp(offset, crate::host::Reg::ebp());
    if ty == IrType::I64 {
        let (lo, hi) = super::int64::pair(env, value)?;
        env.add_instr(Instr::Store {
            width: 4,
            src: Ri::Reg(lo),
            dst: mem,
        });
        env.add_instr(Instr::Store {
            width: 4,
            src: Ri::Reg(hi),
            dst: mem.advance(4),
        });
        return Ok(());
    }
    if ty.is_float() {
        let reg = if ty == IrType::F64 {
            super::fpu::reg_f64(env, value)?
        } else {
            super::fpu::reg_f32(env, value)?
        };
        env.add_instr(Instr::FpLdSt {
            store: true,
            width: ty.size_bytes() as u8,
            reg,
            mem,
        });
        return Ok(());
    }
    let v = super::operand::ri(env, value)?;
    env.add_instr(Instr::Store {
        width: ty.size_bytes() as u8,
        src: v,
        dst: mem,
    });
    Ok(())
}

fn select_puti(
    env: &mut Environment,
    descr: &crate::ir::ArrayDescriptor,
    index: &crate::ir::Expr,
    bias: i32,
    value: &crate::ir::Expr,
) -> Result<()> {
    let mem = super::array::guest_array_amode(env, descr, index, bias)?;
    if descr.elem_ty == IrType::F64 {
        let reg = super::fpu::reg_f64(env, value)?;
        env.add_instr(Instr::FpLdSt {
            store: true,
            width: 8,
            reg,
            mem,
        });
        return Ok(());
    }
    let v = super::operand::ri(env, value)?;
    env.add_instr(Instr::Store {
        width: descr.elem_size_bytes() as u8,
        src: v,
        dst: mem,
    });
    Ok(())
}

fn select_temp_assign(env: &mut Environment, dst: crate::ir::IrTemp, ty: IrType, value: &crate::ir::Expr) -> Result<()> {
    if ty == IrType::I64 {
        let (v_lo, v_hi) = super::int64::pair(env, value)?;
        let (d_lo, d_hi) = env.temp_pair(dst)?;
        env.add_instr(Instr::MovRR { dst: d_lo, src: v_lo });
        env.add_instr(Instr::MovRR { dst: d_hi, src: v_hi });
        return Ok(());
    }
    if ty.is_float() {
        let v = if ty == IrType::F64 {
            super::fpu::reg_f64(env, value)?
        } else {
            super::fpu::reg_f32(env, value)?
        };
        let d = env.temp_reg(dst)?;
        env.add_instr(Instr::FpUnary {
            op: crate::host::FpUnOp::Mov,
            src: v,
            dst: d,
        });
        return Ok(());
    }
    let v = super::operand::reg(env, value)?;
    let d = env.temp_reg(dst)?;
    env.add_instr(Instr::MovRR { dst: d, src: v });
    Ok(())
}

fn select_dirty_call(
    env: &mut Environment,
    callee: &crate::ir::CalleeDescriptor,
    args: &[crate::ir::Expr],
    effects: &crate::ir::EffectDescriptor,
    guard: Option<&crate::ir::Expr>,
    result: Option<&(crate::ir::IrTemp, IrType)>,
) -> Result<()> {
    super::call::select_dirty_call(env, callee, args, effects, guard)?;
    if let Some((dst, ty)) = result {
        match ty.size_bytes() {
            1 | 2 => {
                // the callee leaves a full 32-bit value in EAX; the
                // caller's consumers mask/narrow on read, not on capture.
                let d = env.temp_reg(*dst)?;
                env.add_instr(Instr::MovRR {
                    dst: d,
                    src: crate::host::Reg::eax(),
                });
            }
            4 => {
                let d = env.temp_reg(*dst)?;
                env.add_instr(Instr::MovRR {
                    dst: d,
                    src: crate::host::Reg::eax(),
                });
            }
            8 => {
                let (d_lo, d_hi) = env.temp_pair(*dst)?;
                env.add_instr(Instr::MovRR {
                    dst: d_lo,
                    src: crate::host::Reg::eax(),
                });
                env.add_instr(Instr::MovRR {
                    dst: d_hi,
                    src: crate::host::Reg::edx(),
                });
            }
            _ => {
                return Err(SelectError::type_violation(
                    "select::stmt::select_dirty_call",
                    "dirty call result type must fit a single register or an i64 pair",
                ))
            }
        }
    }
    Ok(())
}

fn select_exit(
    env: &mut Environment,
    guard: &crate::ir::Expr,
    target: &crate::ir::Expr,
    jump_kind: crate::ir::JumpKind,
) -> Result<()> {
    let target_const = match target {
        crate::ir::Expr::Const(crate::ir::Const::U32(v)) => *v,
        other => {
            return Err(SelectError::encoding_violation(
                "select::stmt::select_exit",
                format!("side-exit target must be a U32 constant, got {:?}", other),
            ))
        }
    };
    let cc = super::cc::select_cc(env, guard)?;
    env.add_instr(Instr::Goto {
        cc,
        jump_kind,
        target: Ri::Imm(target_const as i32),
    });
    Ok(())
}

/// Selects the block terminator (`next`/`jump_kind`), always an
/// unconditional `goto` since there is no guard at block-exit position.
pub fn select_terminator(
    env: &mut Environment,
    next: &crate::ir::Expr,
    jump_kind: crate::ir::JumpKind,
) -> Result<()> {
    let target = super::operand::ri(env, next)?;
    env.add_instr(Instr::Goto {
        cc: CondCode::Always,
        jump_kind,
        target,
    });
    Ok(())
}
