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

//! Computes the addressing mode for an indexed guest-state access
//! (`GetI`/`PutI`). The guest-state array model this back end supports is
//! deliberately narrow: a circular array of exactly 8 elements, each 1 or
//! 8 bytes, indexed modulo 8 by masking rather than a real modulo
//! operation (the index is assumed small and the mask is exact because 8
//! is a power of two).

use crate::env::Environment;
use crate::error::{Result, SelectError};
use crate::host::{AMode, AluOp, Instr, Reg, Rmi};
use crate::ir::{ArrayDescriptor, Expr};

/// Computes the [`AMode`] for `descr[index + bias]`, masked modulo 8.
///
/// # Errors
/// Returns [`SelectError::EncodingViolation`] unless `descr.n_elems == 8`
/// and `descr.elem_size_bytes() in {1, 8}` — the only shapes this back end
/// was built to address.
pub fn guest_array_amode(
    env: &mut Environment,
    descr: &ArrayDescriptor,
    index: &Expr,
    bias: i32,
) -> Result<AMode> {
    if descr.n_elems != 8 {
        return Err(SelectError::encoding_violation(
            "select::array::guest_array_amode",
            format!("nElems must be 8, got {}", descr.n_elems),
        ));
    }
    let elem_sz = descr.elem_size_bytes();
    if elem_sz != 1 && elem_sz != 8 {
        return Err(SelectError::encoding_violation(
            "select::array::guest_array_amode",
            format!("elemSz must be 1 or 8, got {}", elem_sz),
        ));
    }

    let idx_reg = super::operand::reg(env, index)?;
    let masked = env.new_vreg_int();
    env.add_instr(Instr::MovRR { dst: masked, src: idx_reg });
    if bias != 0 {
        env.add_instr(Instr::Alu32R {
            op: AluOp::Add,
            src: Rmi::Imm(bias),
            dst: masked,
        });
    }
    env.add_instr(Instr::Alu32R {
        op: AluOp::And,
        src: Rmi::Imm(7),
        dst: masked,
    });

    let log2scale: u8 = if elem_sz == 8 { 3 } else { 0 };
    Ok(AMode::scaled(descr.base, Reg::ebp(), masked, log2scale))
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
    fn rejects_wrong_elem_count() {
        let block = fresh_env(vec![IrType::I32]);
        let mut env = Environment::new(&block, TraceFlags::empty());
        let descr = ArrayDescriptor {
            base: 0x100,
            elem_ty: IrType::I32,
            n_elems: 4,
        };
        let result = guest_array_amode(&mut env, &descr, &Expr::temp(0), 0);
        assert!(result.is_err());
    }

    #[test]
    fn eight_byte_elements_scale_by_eight() {
        let block = fresh_env(vec![IrType::I32]);
        let mut env = Environment::new(&block, TraceFlags::empty());
        let descr = ArrayDescriptor {
            base: 0x100,
            elem_ty: IrType::F64,
            n_elems: 8,
        };
        let am = guest_array_amode(&mut env, &descr, &Expr::temp(0), 0).unwrap();
        match am {
            AMode::BaseIndexScale { log2scale, disp, .. } => {
                assert_eq!(log2scale, 3);
                assert_eq!(disp, 0x100);
            }
            other => panic!("expected scaled amode, got {:?}", other),
        }
    }
}
