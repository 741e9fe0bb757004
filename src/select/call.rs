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

//! Marshals a C helper call under the `regparm(3)` convention: the first
//! up-to-three arguments travel in `EAX`/`EDX`/`ECX`, the rest are pushed
//! right-to-left. A call guard (if present) is evaluated to a condition
//! code only after every argument has been computed, since argument
//! computation may itself clobber the flags the guard would otherwise set.

use crate::env::Environment;
use crate::error::{Result, SelectError};
use crate::host::{CondCode, Instr, Reg, Rmi};
use crate::ir::{CalleeDescriptor, EffectDescriptor, Expr, IrType};

const MAX_REGPARMS: u8 = 3;

fn regparm_reg(slot: u8) -> Reg {
    match slot {
        0 => Reg::eax(),
        1 => Reg::edx(),
        2 => Reg::ecx(),
        _ => unreachable!("regparm slot out of range, checked by caller"),
    }
}

/// Emits the argument marshalling and `call` instruction for `callee(args)`,
/// returning nothing: callers fetch the result out of `EAX`/`EDX:EAX`/an
/// FP register per their own type after this returns.
///
/// `pass_bbp` threads `%EBP` (the guest-state base pointer) to the callee as
/// an implicit extra argument ahead of `args`: into a free regparm slot if
/// one exists, else pushed as the first stack argument.
fn marshal_and_call(
    env: &mut Environment,
    callee: &CalleeDescriptor,
    args: &[Expr],
    guard: Option<&Expr>,
    pass_bbp: bool,
) -> Result<()> {
    if callee.regparms > MAX_REGPARMS {
        return Err(SelectError::type_violation(
            "select::call::marshal_and_call",
            format!("regparms {} exceeds the architecture's limit of 3", callee.regparms),
        ));
    }
    if (callee.regparms as usize) > args.len() {
        return Err(SelectError::type_violation(
            "select::call::marshal_and_call",
            "regparms exceeds the argument count",
        ));
    }

    // Passing %EBP in a register costs one regparm slot, since the slot
    // it would have occupied is freed for it instead.
    let stack_limit = if pass_bbp && callee.regparms > 0 {
        callee.regparms - 1
    } else {
        callee.regparms
    };

    let stack_args = &args[stack_limit as usize..];
    let mut n_pushed: i32 = 0;
    // Pushed right-to-left so the first stack argument ends up at the
    // lowest address, matching cdecl/regparm layout.
    for a in stack_args.iter().rev() {
        let v = super::operand::rmi(env, a)?;
        env.add_instr(Instr::Push { src: v });
        n_pushed += 1;
    }

    if callee.regparms > 0 {
        // Regparm slots are loaded right-to-left, after every stack
        // argument is already selected, so that loading EAX/EDX/ECX
        // cannot clobber an operand a later argument still needs.
        let mut argreg = callee.regparms;
        for a in args[..stack_limit as usize].iter().rev() {
            argreg -= 1;
            let v = super::operand::reg(env, a)?;
            env.add_instr(Instr::MovRR {
                dst: regparm_reg(argreg),
                src: v,
            });
        }
        if pass_bbp {
            debug_assert_eq!(argreg, 1, "passBBP always frees exactly argregs[0]");
            env.add_instr(Instr::MovRR {
                dst: Reg::eax(),
                src: Reg::ebp(),
            });
        }
    } else if pass_bbp {
        // No regparm slot to steal: %EBP is the last thing pushed, so it
        // ends up at the lowest address, i.e. logically the first arg.
        env.add_instr(Instr::Push {
            src: Rmi::Reg(Reg::ebp()),
        });
        n_pushed += 1;
    }

    // The guard is evaluated last, immediately before the call, so no
    // argument computation above can disturb the flags it reads.
    let cc = match guard {
        Some(g) => super::cc::select_cc(env, g)?,
        None => CondCode::Always,
    };

    env.add_instr(Instr::Call {
        cc,
        target: callee.addr,
        regparms: callee.regparms,
    });

    if n_pushed > 0 {
        env.add_instr(Instr::Alu32R {
            op: crate::host::AluOp::Add,
            src: Rmi::Imm(n_pushed * 4),
            dst: Reg::esp(),
        });
    }
    Ok(())
}

pub fn select_ccall_int(env: &mut Environment, e: &Expr) -> Result<Reg> {
    match e {
        Expr::CCall {
            callee,
            args,
            ret_ty,
        } if ret_ty.is_integer() && ret_ty.size_bytes() <= 4 => {
            marshal_and_call(env, callee, args, None, false)?;
            let dst = env.new_vreg_int();
            env.add_instr(Instr::MovRR { dst, src: Reg::eax() });
            Ok(dst)
        }
        other => Err(SelectError::unsupported(
            other,
            "select_ccall_int called on a non-32-bit-integer CCall",
        )),
    }
}

pub fn select_ccall_int64(env: &mut Environment, e: &Expr) -> Result<(Reg, Reg)> {
    match e {
        Expr::CCall {
            callee,
            args,
            ret_ty: IrType::I64,
        } => {
            marshal_and_call(env, callee, args, None, false)?;
            let lo = env.new_vreg_int();
            let hi = env.new_vreg_int();
            env.add_instr(Instr::MovRR { dst: lo, src: Reg::eax() });
            env.add_instr(Instr::MovRR { dst: hi, src: Reg::edx() });
            Ok((lo, hi))
        }
        other => Err(SelectError::unsupported(
            other,
            "select_ccall_int64 called on a non-I64 CCall",
        )),
    }
}

pub fn select_ccall_float(env: &mut Environment, e: &Expr, want_ty: IrType) -> Result<Reg> {
    match e {
        Expr::CCall {
            callee,
            args,
            ret_ty,
        } if *ret_ty == want_ty && ret_ty.is_float() => {
            marshal_and_call(env, callee, args, None, false)?;
            // The callee is expected to leave its result on the x87 top of
            // stack; the register identity here is nominal (register
            // allocation resolves it against the real ST(0)).
            Ok(env.new_vreg_float())
        }
        other => Err(SelectError::unsupported(
            other,
            "select_ccall_float called on a mismatched-type CCall",
        )),
    }
}

/// Entry point used by the statement selector for a guarded dirty call
/// with no return value consumed by a larger expression.
pub fn select_dirty_call(
    env: &mut Environment,
    callee: &CalleeDescriptor,
    args: &[Expr],
    effects: &EffectDescriptor,
    guard: Option<&Expr>,
) -> Result<()> {
    let pass_bbp = effects.n_fx_state > 0 && effects.needs_bbp;
    marshal_and_call(env, callee, args, guard, pass_bbp)
}
