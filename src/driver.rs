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

//! The top-level entry point: lowers an entire [`crate::ir::Block`] into a
//! [`crate::host::SelectedBlock`].

use crate::env::Environment;
use crate::error::{Result, SelectError};
use crate::host::SelectedBlock;
use crate::ir::Block;
use crate::select::stmt::{select_stmt, select_terminator};
use crate::trace::TraceFlags;

/// Lowers `block` statement-by-statement, in order, then the terminator.
/// Returns every fatal condition encountered as a typed [`SelectError`]
/// rather than panicking — see [`select_or_die`] for the literal
/// "print and abort" contract.
pub fn select(block: &Block) -> Result<SelectedBlock> {
    select_with_flags(block, TraceFlags::empty())
}

/// As [`select`], but with explicit trace-flag control (the "v-code"/
/// per-statement `tracing` output).
pub fn select_with_flags(block: &Block, flags: TraceFlags) -> Result<SelectedBlock> {
    let mut env = Environment::new(block, flags);

    for stmt in &block.stmts {
        select_stmt(&mut env, stmt)?;
    }
    select_terminator(&mut env, &block.next, block.jump_kind)?;

    Ok(env.into_selected())
}

/// Performs the literal fatal-diagnostic contract: selects `block` and
/// panics, after logging, on any [`SelectError`]. Use this when the
/// caller's own error-handling strategy is "this should never happen, and
/// if it does the process should not continue" — the same posture the
/// original selector takes unconditionally.
pub fn select_or_die(block: &Block) -> SelectedBlock {
    match select(block) {
        Ok(selected) => selected,
        Err(err) => {
            tracing::error!(%err, "instruction selection failed, aborting");
            panic!("instruction selection failed: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Expr, IrType, JumpKind, Stmt};

    #[test]
    fn empty_block_selects_just_the_terminator() {
        let block = Block {
            types: vec![],
            stmts: vec![],
            next: Expr::constu32(0x1000),
            jump_kind: JumpKind::Boring,
        };
        let selected = select(&block).unwrap();
        assert_eq!(selected.instrs.len(), 1);
    }

    #[test]
    fn single_temp_assign_then_exit() {
        let block = Block {
            types: vec![IrType::I32],
            stmts: vec![Stmt::TempAssign {
                dst: crate::ir::IrTemp(0),
                ty: IrType::I32,
                value: Expr::constu32(7),
            }],
            next: Expr::constu32(0x2000),
            jump_kind: JumpKind::Boring,
        };
        let selected = select(&block).unwrap();
        assert!(selected.n_vregs >= 1);
        assert!(selected.instrs.len() >= 2);
    }

    #[test]
    fn unsupported_shape_is_a_typed_error_not_a_panic() {
        let block = Block {
            types: vec![],
            stmts: vec![],
            next: Expr::Binder(0),
            jump_kind: JumpKind::Boring,
        };
        let err = select(&block).unwrap_err();
        assert!(matches!(err, SelectError::InvariantViolation { .. }));
    }
}
