//! Error kinds and the throw channel.
//!
//! The error enum is grounded on `rhai-hir`'s `error.rs`
//! (`crates/rhai-hir/src/error.rs` in the teacher's own workspace): a small
//! `Error` struct wrapping a `#[derive(thiserror::Error)]` `ErrorKind` enum,
//! one `#[error("...")]` message per variant. `rhai`'s own
//! `EvalAltResult` (`rhai/src/error.rs`) is the grounding for a different
//! decision: that non-error control signals (there, `LoopBreak` and
//! `Return`; here, [`Thrown`]) are carried through their own type rather
//! than folded into the error enum, since `spec.md` §7 is explicit that a
//! throw is *not* an error — it is a labeled non-local return that only
//! some errors ever result from (an unmatched throw propagates, it never
//! becomes an `EvalError`).

use crate::value::Cell;
use thiserror::Error;

/// One raised failure. Every fallible operation in the evaluator returns
/// `Result<_, Box<EvalError>>`; boxing keeps the success path's `Result`
/// small, the same tradeoff `rhai::EvalAltResult` makes.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct EvalError {
    pub kind: ErrorKind,
}

impl EvalError {
    #[must_use]
    pub fn new(kind: ErrorKind) -> Box<Self> {
        Box::new(Self { kind })
    }
}

/// Error kinds, one per named failure in `spec.md` §7.
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("no argument given for non-endable parameter `{param}`")]
    NoArgGiven { param: String },

    #[error("ambiguous infix: enfix deferral requested twice at the same site")]
    AmbiguousInfix,

    #[error("argument `{param}` of type {actual:?} does not satisfy its typeset")]
    ArgTypeMismatch {
        param: String,
        actual: crate::value::KindTag,
    },

    #[error("enfix hard-quote operator `{op}` saw an already-evaluated left-hand value")]
    EvaluativeQuoteViolation { op: String },

    #[error("refinement `{refinement}` argument was null after an earlier argument was set")]
    RevokeOrder { refinement: String },

    #[error("bad refinement `{refinement}`: duplicate or unbound")]
    BadRefine { refinement: String },

    #[error("operation requires a non-void result")]
    NeedNonVoid,

    #[error("operation requires a non-null result")]
    NeedNonNull,

    #[error("operation requires a non-end result")]
    NeedNonEnd,

    #[error("cannot evaluate a void cell directly")]
    VoidEvaluation,

    #[error("cannot evaluate a null cell directly")]
    NullEvaluation,

    #[error("left-quoting operator `{op}` has nothing to its left")]
    LiteralLeftPath { op: String },

    #[error("enfix dispatch via PATH! is disabled; use `<-` to shove left operands into paths")]
    EnfixViaPath,

    #[error("unbound word `{word}`")]
    UnboundWord { word: String },

    #[error("action `{name}` has no dispatcher installed")]
    NoDispatcher { name: String },

    #[error("evaluator signal hook requested an abort")]
    SignalAbort,

    #[error("maximum data-stack depth exceeded")]
    StackDepthExceeded,

    #[error("{message}")]
    Custom { message: String },
}

/// A throw label. `unwind` and `redo` are intrinsic labels the Dispatcher
/// Bridge recognizes by identity against "this very frame" (`spec.md`
/// §4.5); any other label is an ordinary user-level non-local exit that
/// propagates until a matching catch frame consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThrowLabel {
    Unwind,
    Redo,
    Named(crate::value::Spelling),
}

/// A labeled non-local return, carried through the same `Result`/output-cell
/// channel as an ordinary value (`spec.md` §7). Not an [`EvalError`]: a
/// throw that reaches the top level un-caught is converted to an error by
/// the caller, not raised as one internally.
#[derive(Debug, Clone)]
pub struct Thrown {
    pub label: ThrowLabel,
    pub payload: Cell,
}

impl Thrown {
    #[must_use]
    pub fn new(label: ThrowLabel, payload: Cell) -> Self {
        Self { label, payload }
    }
}
