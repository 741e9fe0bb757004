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

use thiserror::Error;

/// Every error in this crate is a programming error in the caller's IR, or
/// an assertion failure on a selector invariant. There is no recoverable
/// error and no retry policy: lowering a malformed block is undefined
/// behaviour, not a runtime condition. Callers that want the literal
/// "print and abort" contract should use [`crate::driver::select_or_die`].
#[derive(Debug, Error)]
pub enum SelectError {
    /// An expression tag / opcode / type combination the selector does not
    /// cover.
    #[error("cannot reduce tree: {detail} (expr: {expr})")]
    UnsupportedShape { expr: String, detail: String },

    /// A caller-side type invariant was violated (e.g. storing through a
    /// non-i32 address, or passing a non-i32 argument in a regparm slot).
    #[error("type violation in {context}: {detail}")]
    TypeViolation { context: String, detail: String },

    /// An encoding-level invariant was violated (e.g. a side-exit target
    /// that is not a `U32` constant).
    #[error("encoding violation in {context}: {detail}")]
    EncodingViolation { context: String, detail: String },

    /// An internal selector invariant failed (pattern binder out of range
    /// or rebound, a returned `AMode`/`RMI` failed its sanity check, ...).
    #[error("invariant violation in {context}: {detail}")]
    InvariantViolation { context: String, detail: String },
}

impl SelectError {
    pub(crate) fn unsupported(expr: impl std::fmt::Debug, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let expr = format!("{:?}", expr);
        tracing::error!(%expr, %detail, "cannot reduce tree");
        SelectError::UnsupportedShape { expr, detail }
    }

    pub(crate) fn type_violation(context: impl Into<String>, detail: impl Into<String>) -> Self {
        let context = context.into();
        let detail = detail.into();
        tracing::error!(%context, %detail, "type violation");
        SelectError::TypeViolation { context, detail }
    }

    pub(crate) fn encoding_violation(
        context: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        let context = context.into();
        let detail = detail.into();
        tracing::error!(%context, %detail, "encoding violation");
        SelectError::EncodingViolation { context, detail }
    }

    pub(crate) fn invariant(context: impl Into<String>, detail: impl Into<String>) -> Self {
        let context = context.into();
        let detail = detail.into();
        tracing::error!(%context, %detail, "invariant violation");
        SelectError::InvariantViolation { context, detail }
    }
}

pub type Result<T> = std::result::Result<T, SelectError>;
