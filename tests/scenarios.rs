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

//! End-to-end scenarios exercising `driver::select` over small hand-built
//! blocks, one per notable lowering path.

use x86_isel::host::Instr;
use x86_isel::ir::{
    ArrayDescriptor, BinOp, Block, CalleeDescriptor, Const, EffectDescriptor, Expr, IrTemp,
    IrType, JumpKind, Stmt, UnOp,
};

#[test]
fn scenario_straight_line_arithmetic() {
    // t0 = 1 + 2; exit to a fixed address.
    let block = Block {
        types: vec![IrType::I32],
        stmts: vec![Stmt::TempAssign {
            dst: IrTemp(0),
            ty: IrType::I32,
            value: Expr::binop(BinOp::Add32, Expr::constu32(1), Expr::constu32(2)),
        }],
        next: Expr::constu32(0x4000),
        jump_kind: JumpKind::Boring,
    };
    let selected = x86_isel::select(&block).expect("straight-line block must lower");
    assert!(selected.instrs.iter().any(|i| matches!(
        i,
        Instr::Alu32R {
            op: x86_isel::host::AluOp::Add,
            ..
        }
    )));
}

#[test]
fn scenario_conditional_mux_selects_test_and_cmov() {
    // t1 = (t0 == 0) ? 10 : 20
    let block = Block {
        types: vec![IrType::I32, IrType::I32],
        stmts: vec![Stmt::TempAssign {
            dst: IrTemp(1),
            ty: IrType::I32,
            value: Expr::Mux0X {
                cond: Box::new(Expr::temp(0)),
                expr0: Box::new(Expr::constu32(10)),
                expr_x: Box::new(Expr::constu32(20)),
                ty: IrType::I32,
            },
        }],
        next: Expr::constu32(0x4004),
        jump_kind: JumpKind::Boring,
    };
    let selected = x86_isel::select(&block).expect("mux block must lower");
    assert!(selected
        .instrs
        .iter()
        .any(|i| matches!(i, Instr::CMov32 { .. })));
}

#[test]
fn scenario_wide_shift_uses_double_shift_idiom() {
    // t1 = t0:i64 << 9
    let block = Block {
        types: vec![IrType::I64, IrType::I64],
        stmts: vec![Stmt::TempAssign {
            dst: IrTemp(1),
            ty: IrType::I64,
            value: Expr::binop(BinOp::Shl64, Expr::temp(0), Expr::constu8(9)),
        }],
        next: Expr::constu32(0x4008),
        jump_kind: JumpKind::Boring,
    };
    let selected = x86_isel::select(&block).expect("wide shift block must lower");
    assert!(selected
        .instrs
        .iter()
        .any(|i| matches!(i, Instr::Sh3232 { .. })));
}

#[test]
fn scenario_floating_point_arithmetic() {
    // t1 = t0:f64 + t0:f64
    let block = Block {
        types: vec![IrType::F64, IrType::F64],
        stmts: vec![Stmt::TempAssign {
            dst: IrTemp(1),
            ty: IrType::F64,
            value: Expr::binop(BinOp::AddF64, Expr::temp(0), Expr::temp(0)),
        }],
        next: Expr::constu32(0x400c),
        jump_kind: JumpKind::Boring,
    };
    let selected = x86_isel::select(&block).expect("float block must lower");
    assert!(selected
        .instrs
        .iter()
        .any(|i| matches!(i, Instr::FpBinary { .. })));
}

#[test]
fn scenario_guarded_helper_call_marshals_regparms() {
    // if (t0 == 0) dirty_call(helper, t0, 5)
    let block = Block {
        types: vec![IrType::I32],
        stmts: vec![Stmt::DirtyCall {
            callee: CalleeDescriptor {
                name: "helper".into(),
                addr: 0xdead_beef,
                regparms: 2,
            },
            args: vec![Expr::temp(0), Expr::constu32(5)],
            effects: EffectDescriptor::default(),
            guard: Some(Expr::binop(BinOp::CmpEQ32, Expr::temp(0), Expr::constu32(0))),
            result: None,
        }],
        next: Expr::constu32(0x4010),
        jump_kind: JumpKind::Boring,
    };
    let selected = x86_isel::select(&block).expect("guarded call block must lower");
    assert!(selected.instrs.iter().any(
        |i| matches!(i, Instr::Call { regparms: 2, .. })
    ));
}

#[test]
fn scenario_guest_array_access_masks_index() {
    // t1 = guest_array[t0 + 1] (8 elements of 8 bytes each)
    let descr = ArrayDescriptor {
        base: 0x120,
        elem_ty: IrType::F64,
        n_elems: 8,
    };
    let block = Block {
        types: vec![IrType::I32, IrType::I32],
        stmts: vec![Stmt::TempAssign {
            dst: IrTemp(1),
            ty: IrType::I32,
            value: Expr::GetI {
                descr,
                index: Box::new(Expr::temp(0)),
                bias: 1,
            },
        }],
        next: Expr::constu32(0x4014),
        jump_kind: JumpKind::Boring,
    };
    let selected = x86_isel::select(&block).expect("guest array access must lower");
    assert!(selected.instrs.iter().any(
        |i| matches!(i, Instr::Alu32R { op: x86_isel::host::AluOp::And, .. })
    ));
}

#[test]
fn malformed_side_exit_target_is_a_typed_encoding_violation() {
    let block = Block {
        types: vec![IrType::I32],
        stmts: vec![Stmt::Exit {
            guard: Expr::Const(Const::Bit(true)),
            target: Expr::temp(0),
            jump_kind: JumpKind::Boring,
        }],
        next: Expr::constu32(0x4018),
        jump_kind: JumpKind::Boring,
    };
    let err = x86_isel::select(&block).unwrap_err();
    assert!(matches!(err, x86_isel::SelectError::EncodingViolation { .. }));
}

#[test]
fn scenario_dirty_call_passes_bbp_when_effects_require_it() {
    // dirty_call(helper) with effects that need the base block pointer
    // passed, and one regparm available to carry it.
    let block = Block {
        types: vec![],
        stmts: vec![Stmt::DirtyCall {
            callee: CalleeDescriptor {
                name: "helper".into(),
                addr: 0xdead_beef,
                regparms: 1,
            },
            args: vec![Expr::constu32(7)],
            effects: EffectDescriptor {
                reads_guest_state: true,
                writes_guest_state: true,
                n_fx_state: 1,
                needs_bbp: true,
            },
            guard: None,
            result: None,
        }],
        next: Expr::constu32(0x4020),
        jump_kind: JumpKind::Boring,
    };
    let selected = x86_isel::select(&block).expect("passBBP call must lower");
    let ebp = x86_isel::host::Reg::ebp();
    assert!(selected
        .instrs
        .iter()
        .any(|i| matches!(i, Instr::MovRR { src, .. } if *src == ebp)));
}

#[test]
fn scenario_dirty_call_i64_result_copies_eax_and_edx() {
    // t0 = dirty_call(helper) : i64
    let block = Block {
        types: vec![IrType::I64],
        stmts: vec![Stmt::DirtyCall {
            callee: CalleeDescriptor {
                name: "helper".into(),
                addr: 0xdead_beef,
                regparms: 0,
            },
            args: vec![],
            effects: EffectDescriptor::default(),
            guard: None,
            result: Some((IrTemp(0), IrType::I64)),
        }],
        next: Expr::constu32(0x4024),
        jump_kind: JumpKind::Boring,
    };
    let selected = x86_isel::select(&block).expect("i64 dirty call result must lower");
    let eax = x86_isel::host::Reg::eax();
    let edx = x86_isel::host::Reg::edx();
    assert!(selected
        .instrs
        .iter()
        .any(|i| matches!(i, Instr::MovRR { src, .. } if *src == eax)));
    assert!(selected
        .instrs
        .iter()
        .any(|i| matches!(i, Instr::MovRR { src, .. } if *src == edx)));
}

#[test]
#[allow(unused)]
fn unop_narrow_is_accepted_as_a_pass_through() {
    let block = Block {
        types: vec![IrType::I32, IrType::I32],
        stmts: vec![Stmt::TempAssign {
            dst: IrTemp(1),
            ty: IrType::I32,
            value: Expr::unop(UnOp::Narrow32to8, Expr::temp(0)),
        }],
        next: Expr::constu32(0x401c),
        jump_kind: JumpKind::Boring,
    };
    x86_isel::select(&block).expect("narrowing unop must lower");
}
