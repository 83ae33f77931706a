//! # ren-core — the central expression evaluator
//!
//! This crate is the evaluator core of a dynamically typed, homoiconic
//! interpreter in the Rebol/Ren-C lineage. It consumes a stream of source
//! [`Cell`]s (a reified array or a synthetic iterator) and produces a
//! result value, one expression at a time.
//!
//! The core interleaves several cooperating pieces, each its own module:
//!
//! - [`value`] — the uniform value [`Cell`] and its header flags.
//! - [`feed`] — the forward-only [`Feed`] over source cells.
//! - [`stack`] — the shared LIFO [`DataStack`].
//! - [`action`] — callable [`ActionDescriptor`]s and their parameters.
//! - [`frame`] — per-invocation [`Frame`] state.
//! - [`fulfill`] — the argument fulfiller.
//! - [`dispatch`] — the dispatcher bridge.
//! - [`lookahead`] — enfix lookahead.
//! - [`eval`] — the evaluator loop (`eval_step` / `eval_to_end`).
//! - [`error`] — error kinds and the throw channel.
//! - [`collaborators`] — traits the core requires from its surroundings.
//! - [`intrinsics`] — the small fixed set of actions the testable
//!   properties in the specification exercise by name.
//!
//! Explicitly out of scope: source text lexing, garbage collection policy,
//! path traversal algorithms, the standard library of built-in actions,
//! persistent storage, and concurrency.

mod action;
mod collaborators;
mod dispatch;
mod error;
mod eval;
mod feed;
mod frame;
mod fulfill;
mod intrinsics;
mod limits;
mod lookahead;
mod scope;
mod stack;
mod state;
mod value;

pub use action::{ActionDescriptor, ActionFlags, DispatchSignal, Dispatcher, Param, ParamClass, ParamFlags};
pub use collaborators::{Bindings, NoopSignalSink, PathEvaluation, PathOutcome, PathResolver, SignalSink};
pub use error::{EvalError, ErrorKind, ThrowLabel, Thrown};
pub use eval::{do_block, eval_step, eval_to_end, DoOutcome, StepOutcome};
pub use feed::{Feed, Specifier};
pub use frame::{Frame, FrameFlags, RefineCursor, SpecialCursor};
pub use intrinsics::install_intrinsics;
pub use limits::EvalLimits;
pub use scope::Scope;
pub use stack::DataStack;
pub use state::EvalState;
pub use value::{CellFlags, Kind, Cell, Spelling};

#[cfg(not(feature = "sync"))]
pub(crate) type Shared<T> = std::rc::Rc<T>;
#[cfg(feature = "sync")]
pub(crate) type Shared<T> = std::sync::Arc<T>;

/// Evaluating a single expression step never leaves the output cell
/// indeterminate: it is either a well-formed value, a throw, or the call
/// returned `Err`. See `spec.md` §8, "Universal invariants".
pub type EvalResult<T> = Result<T, Box<EvalError>>;
