//! Traits the core requires from its surroundings (`spec.md` §6,
//! "Required (from collaborators)").
//!
//! String search, path resolution, and the surrounding read-eval-print loop
//! are external collaborators, specified only at their interface here
//! (`spec.md` §1). Grounded on how `rhai::Engine` separates variable lookup
//! (`search_namespace`/`search_scope_only` in `rhai/src/engine.rs`) from the
//! evaluator's own control flow — those methods take the same `scope,
//! mods, state, lib` bundle every other evaluator method does, rather than
//! being a trait object; we use a trait object here instead because
//! `spec.md` §6 explicitly frames these as a pluggable boundary ("required
//! from collaborators"), not an internal implementation detail.

use crate::feed::Specifier;
use crate::value::Cell;
use crate::EvalResult;

/// Variable lookup and storage. `spec.md` §6.
pub trait Bindings {
    /// Look up a word's bound value. Fails (raises `UnboundWord`) if the
    /// word has no binding.
    fn get_variable(&self, word: &str, specifier: &Specifier) -> EvalResult<Cell>;

    /// Non-failing variant: `Ok(None)` if unbound.
    fn try_get_variable(&self, word: &str, specifier: &Specifier) -> EvalResult<Option<Cell>>;

    /// Store into a word's binding.
    fn set_variable(&mut self, word: &str, specifier: &Specifier, value: Cell) -> EvalResult<()>;

    /// Store into a polymorphic target: a word, a path, or a destructuring
    /// block of targets (`spec.md` §4.3, "set-block").
    fn set_variable_poly(
        &mut self,
        target: &Cell,
        specifier: &Specifier,
        value: Cell,
    ) -> EvalResult<()>;

    /// Derive a binding context for a value nested inside another,
    /// given the outer specifier (`spec.md` §6).
    fn derive_specifier(&self, outer: &Specifier, inner: &Cell) -> Specifier {
        let _ = inner;
        outer.clone()
    }
}

/// Result of resolving a `path!`/`set-path!`/`get-path!` (`spec.md` §6,
/// `path_evaluate`).
pub struct PathEvaluation {
    pub value: Cell,
    pub label: Option<crate::value::Spelling>,
}

/// What `path_evaluate` produced: an ordinary resolution, or a throw
/// escaping out of path resolution itself (`spec.md` §6, `path_evaluate(...)
/// -> (value, label?) | throw`) — a path target can itself be an action that
/// throws during its own evaluation, the same way any other dispatch can.
pub enum PathOutcome {
    Value(PathEvaluation),
    Thrown(crate::error::Thrown),
}

/// Path resolution, with optional set-semantics (`spec.md` §6). Path
/// traversal algorithms are explicitly out of scope (`spec.md` §1, §9 Open
/// Questions); this trait exists so the evaluator core compiles and is
/// testable without a full path engine behind it.
pub trait PathResolver {
    /// Resolve `array[index..]` under `specifier`. If `setval` is `Some`,
    /// perform set-semantics instead of a read. If `push_refines`, push any
    /// refinement names encountered onto the data stack.
    ///
    /// Per `spec.md` §9 Open Questions, enfix dispatch via path stays
    /// disabled: implementations must never return an `ENFIXED` action
    /// cell from this method.
    fn path_evaluate(
        &self,
        array: &[Cell],
        specifier: &Specifier,
        setval: Option<&Cell>,
        push_refines: bool,
        stack: &mut crate::stack::DataStack,
    ) -> EvalResult<PathOutcome>;

    /// Reduce a block's elements onto the stack for `get-block!`
    /// (`spec.md` §6, §4.3).
    fn reduce_to_stack(
        &self,
        block: &[Cell],
        specifier: &Specifier,
        stack: &mut crate::stack::DataStack,
    ) -> EvalResult<()>;
}

/// The signals hook called at expression boundaries (`spec.md` §5, §6).
/// May recycle (garbage collect), enter an interactive debugger, or raise
/// an abort throw; callers must be prepared for this at any expression
/// boundary.
pub trait SignalSink {
    /// Called once per expression start, when the tick counter reaches
    /// zero. Returning `Err` raises `ErrorKind::SignalAbort`.
    fn on_signal_check(&mut self) -> EvalResult<()> {
        Ok(())
    }
}

/// A signals hook that never interrupts evaluation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSignalSink;

impl SignalSink for NoopSignalSink {}
