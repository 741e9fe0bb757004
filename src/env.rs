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

//! The selector's per-block working state: the IR type environment, the
//! IR-temp-to-virtual-register map, the output instruction stream, and the
//! virtual register counter. One [`Environment`] is created per block and
//! discarded after [`crate::driver::select`] returns.

use crate::error::{Result, SelectError};
use crate::host::{Instr, Reg, RegClass};
use crate::ir::{Block, IrTemp, IrType};
use crate::trace::TraceFlags;

/// Where a given [`IrTemp`] lives once lowered: a single vreg for every
/// type except `I64`, which needs a (lo, hi) pair of 32-bit integer vregs.
#[derive(Debug, Clone, Copy)]
enum TempHome {
    Single(Reg),
    Pair(Reg, Reg),
}

pub struct Environment<'b> {
    block: &'b Block,
    homes: Vec<Option<TempHome>>,
    next_vreg: u32,
    instrs: Vec<Instr>,
    flags: TraceFlags,
}

impl<'b> Environment<'b> {
    pub fn new(block: &'b Block, flags: TraceFlags) -> Self {
        let mut env = Environment {
            homes: vec![None; block.types.len()],
            next_vreg: 0,
            instrs: Vec::new(),
            block,
            flags,
        };
        // Both maps are fully populated before statement selection begins
        // and are immutable thereafter (spec'd "map completeness"): every
        // declared temp gets a home here, including ones no statement ever
        // references.
        for i in 0..env.block.types.len() {
            let t = IrTemp(i as u32);
            let home = if env.type_of(t) == IrType::I64 {
                let lo = env.fresh(RegClass::Int);
                let hi = env.fresh(RegClass::Int);
                TempHome::Pair(lo, hi)
            } else {
                let class = if env.type_of(t).is_float() {
                    RegClass::Float
                } else {
                    RegClass::Int
                };
                TempHome::Single(env.fresh(class))
            };
            env.homes[i] = Some(home);
        }
        env
    }

    pub fn type_of(&self, t: IrTemp) -> IrType {
        self.block.type_of(t)
    }

    fn fresh(&mut self, class: RegClass) -> Reg {
        let index = self.next_vreg;
        self.next_vreg += 1;
        Reg::Virtual { index, class }
    }

    /// Returns `t`'s pre-populated single-vreg home. Errors via
    /// [`SelectError::invariant`] if `t` is typed `I64` (use
    /// [`Environment::temp_pair`] instead) — every home is assigned once,
    /// up front, in [`Environment::new`].
    pub fn temp_reg(&mut self, t: IrTemp) -> Result<Reg> {
        match self.homes[t.0 as usize] {
            Some(TempHome::Single(r)) => Ok(r),
            Some(TempHome::Pair(..)) => Err(SelectError::invariant(
                "env::temp_reg",
                format!("temp {:?} is I64, must use temp_pair", t),
            )),
            None => unreachable!("every temp home is populated in Environment::new"),
        }
    }

    /// Returns `t`'s pre-populated `(lo, hi)` vreg pair home.
    pub fn temp_pair(&mut self, t: IrTemp) -> Result<(Reg, Reg)> {
        match self.homes[t.0 as usize] {
            Some(TempHome::Pair(lo, hi)) => Ok((lo, hi)),
            Some(TempHome::Single(..)) => Err(SelectError::invariant(
                "env::temp_pair",
                format!("temp {:?} is not I64", t),
            )),
            None => unreachable!("every temp home is populated in Environment::new"),
        }
    }

    pub fn new_vreg_int(&mut self) -> Reg {
        self.fresh(RegClass::Int)
    }

    pub fn new_vreg_float(&mut self) -> Reg {
        self.fresh(RegClass::Float)
    }

    /// Appends `instr` to the output stream, tracing it under
    /// [`TraceFlags::V_CODE`] if enabled.
    pub fn add_instr(&mut self, instr: Instr) {
        if self.flags.contains(TraceFlags::V_CODE) {
            tracing::trace!(target: "x86_isel::vcode", instr = ?instr, "emit");
        }
        self.instrs.push(instr);
    }

    pub fn trace_stmt(&self, stmt: &crate::ir::Stmt) {
        if self.flags.contains(TraceFlags::STMT) {
            tracing::trace!(target: "x86_isel::stmt", stmt = ?stmt, "select");
        }
    }

    pub fn into_selected(self) -> crate::host::SelectedBlock {
        crate::host::SelectedBlock {
            instrs: self.instrs,
            n_vregs: self.next_vreg,
        }
    }
}
