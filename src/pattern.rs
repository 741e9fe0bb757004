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

//! Structural pattern matching over [`crate::ir::Expr`] trees, with a fixed
//! number of capture ("binder") slots. Individual selectors build small
//! pattern tables once (behind a [`std::sync::OnceLock`]) and match
//! candidate expressions against every entry in order, taking the first hit.

use std::sync::OnceLock;

use crate::ir::{BinOp, Const, Expr, UnOp};

/// Maximum number of captures a single pattern may bind. Chosen to match
/// the richest pattern in this selector (the `AMode` scaled-index fold,
/// which binds a base and an index).
pub const N_MATCH_BINDERS: usize = 4;

/// The result of a successful match: the captured subexpressions, indexed
/// by binder number (`Expr::Binder(i)` in the pattern captures slot `i`).
#[derive(Debug, Default, Clone)]
pub struct MatchInfo<'e> {
    binders: [Option<&'e Expr>; N_MATCH_BINDERS],
}

impl<'e> MatchInfo<'e> {
    pub fn new() -> Self {
        MatchInfo {
            binders: [None; N_MATCH_BINDERS],
        }
    }

    /// Fetches binder `i`. Panics (an internal invariant violation, not a
    /// caller error) if it was never bound by the pattern that produced
    /// this `MatchInfo`.
    pub fn binder(&self, i: u8) -> &'e Expr {
        self.binders[i as usize].unwrap_or_else(|| {
            panic!("pattern binder {} read before being bound", i);
        })
    }

    fn bind(&mut self, i: u8, e: &'e Expr) -> bool {
        let slot = self
            .binders
            .get_mut(i as usize)
            .unwrap_or_else(|| panic!("pattern binder index {} out of range", i));
        match slot {
            Some(existing) => std::ptr::eq(*existing, e) || expr_shape_eq(existing, e),
            None => {
                *slot = Some(e);
                true
            }
        }
    }
}

/// Structural equality used only to decide whether a second occurrence of
/// the same binder in one pattern is consistent (e.g. `Add32(Binder(0),
/// Binder(0))`); this is not a general `Expr` equality and intentionally
/// does not recurse into `Temp`-vs-`Temp` identity beyond index comparison.
fn expr_shape_eq(a: &Expr, b: &Expr) -> bool {
    match (a, b) {
        (Expr::Temp(t1), Expr::Temp(t2)) => t1 == t2,
        (Expr::Const(c1), Expr::Const(c2)) => const_eq(c1, c2),
        _ => false,
    }
}

fn const_eq(a: &Const, b: &Const) -> bool {
    match (a, b) {
        (Const::Bit(x), Const::Bit(y)) => x == y,
        (Const::U8(x), Const::U8(y)) => x == y,
        (Const::U16(x), Const::U16(y)) => x == y,
        (Const::U32(x), Const::U32(y)) => x == y,
        (Const::U64(x), Const::U64(y)) => x == y,
        (Const::F64(x), Const::F64(y)) => x.to_bits() == y.to_bits(),
        (Const::F64Bits(x), Const::F64Bits(y)) => x == y,
        _ => false,
    }
}

/// A pattern tree. Built once per selector into a static table; matched
/// structurally against a candidate `Expr`.
#[derive(Debug, Clone)]
pub enum Pat {
    /// Captures the matched subexpression into binder slot `n`, unconditionally.
    Bind(u8),
    /// Matches any constant, binding it.
    AnyConst(u8),
    /// Matches a specific unary op, recursing into its argument.
    Unop(UnOp, Box<Pat>),
    /// Matches a specific binary op, recursing into both arguments.
    Binop(BinOp, Box<Pat>, Box<Pat>),
    /// Matches a `Const::U32` of exactly this value (no capture).
    ConstU32(u32),
    /// Matches a `Const::U8` of exactly this value (no capture).
    ConstU8(u8),
}

impl Pat {
    pub fn bind(n: u8) -> Pat {
        Pat::Bind(n)
    }
    pub fn any_const(n: u8) -> Pat {
        Pat::AnyConst(n)
    }
    pub fn unop(op: UnOp, inner: Pat) -> Pat {
        Pat::Unop(op, Box::new(inner))
    }
    pub fn binop(op: BinOp, l: Pat, r: Pat) -> Pat {
        Pat::Binop(op, Box::new(l), Box::new(r))
    }
}

/// Attempts to match `pat` against `expr`, threading capture state through
/// `info`. Returns `false` (leaving `info` partially mutated but discarded
/// by the caller on failure) rather than erroring: a failed match is the
/// normal way a selector probes the next pattern in its table.
pub fn match_expr<'e>(pat: &Pat, expr: &'e Expr, info: &mut MatchInfo<'e>) -> bool {
    match pat {
        Pat::Bind(n) => info.bind(*n, expr),
        Pat::AnyConst(n) => matches!(expr, Expr::Const(_)) && info.bind(*n, expr),
        Pat::Unop(op, inner) => match expr {
            Expr::Unop { op: eop, arg } if eop == op => match_expr(inner, arg, info),
            _ => false,
        },
        Pat::Binop(op, lp, rp) => match expr {
            Expr::Binop { op: eop, arg1, arg2 } if eop == op => {
                match_expr(lp, arg1, info) && match_expr(rp, arg2, info)
            }
            _ => false,
        },
        Pat::ConstU32(v) => matches!(expr, Expr::Const(Const::U32(x)) if x == v),
        Pat::ConstU8(v) => matches!(expr, Expr::Const(Const::U8(x)) if x == v),
    }
}

/// Tries every `(pattern, handler)` pair in `table` in order against `expr`,
/// returning the first handler's result. Used by every selector module to
/// build its "try each shape in turn, fall through to the generic case"
/// dispatch without repeating the `MatchInfo` plumbing.
pub fn try_patterns<'e, T>(
    table: &[Pat],
    expr: &'e Expr,
    mut handler: impl FnMut(usize, &MatchInfo<'e>) -> Option<T>,
) -> Option<T> {
    for (i, pat) in table.iter().enumerate() {
        let mut info = MatchInfo::new();
        if match_expr(pat, expr, &mut info) {
            if let Some(result) = handler(i, &info) {
                return Some(result);
            }
        }
    }
    None
}

/// Helper for selectors that want a lazily-built, process-wide-cached
/// pattern table. Replaces the original's two-mode permanent/temporary
/// arena trick: the table is built exactly once, on first use, and lives
/// for the process lifetime — there is no "temporary" mode to leak or
/// reset, which is strictly simpler than the allocator discipline it
/// stands in for.
pub fn static_table<T: Send + Sync + 'static>(
    cell: &'static OnceLock<T>,
    build: impl FnOnce() -> T,
) -> &'static T {
    cell.get_or_init(build)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrTemp;

    #[test]
    fn bind_captures_subexpression() {
        let e = Expr::temp(5);
        let mut info = MatchInfo::new();
        assert!(match_expr(&Pat::bind(0), &e, &mut info));
        match info.binder(0) {
            Expr::Temp(IrTemp(5)) => {}
            other => panic!("unexpected capture: {:?}", other),
        }
    }

    #[test]
    fn binop_pattern_matches_shape_and_recurses() {
        let e = Expr::binop(BinOp::Add32, Expr::temp(1), Expr::constu32(4));
        let pat = Pat::binop(BinOp::Add32, Pat::bind(0), Pat::any_const(1));
        let mut info = MatchInfo::new();
        assert!(match_expr(&pat, &e, &mut info));
        assert!(matches!(info.binder(0), Expr::Temp(IrTemp(1))));
        assert!(matches!(info.binder(1), Expr::Const(Const::U32(4))));
    }

    #[test]
    fn binop_pattern_rejects_wrong_op() {
        let e = Expr::binop(BinOp::Sub32, Expr::temp(1), Expr::constu32(4));
        let pat = Pat::binop(BinOp::Add32, Pat::bind(0), Pat::any_const(1));
        let mut info = MatchInfo::new();
        assert!(!match_expr(&pat, &e, &mut info));
    }

    #[test]
    #[should_panic]
    fn reading_unbound_binder_panics() {
        let info = MatchInfo::new();
        info.binder(0);
    }
}
