//! The Argument Fulfiller: walks an action's parameter list and builds its
//! varlist from the feed, the data stack's pushed refinements, and (for an
//! enfix call) the frame's own output cell (`spec.md` §4.4).
//!
//! There is no single rhai counterpart to this component — `rhai`'s
//! `fn_call.rs` gathers positional arguments with a straight loop, since rhai
//! has neither refinements nor quoting disciplines. The per-parameter
//! decision tree here is new code, but it is wired through the same types
//! (`Frame`, `DataStack`, `Feed`) the rest of this crate builds atop `rhai`'s
//! shapes, and the recursive-descent call back into [`crate::eval::eval_step`]
//! for each evaluated argument mirrors how `rhai::Engine::exec_fn_call`
//! (`rhai/src/fn_call.rs`) recurses into `eval_expr` for each call argument.

use crate::action::{ActionDescriptor, Param, ParamClass, ParamFlags};
use crate::error::{ErrorKind, EvalError, Thrown};
use crate::frame::{Frame, RefineCursor, SpecialCursor};
use crate::stack::StackEntry;
use crate::value::{Cell, CellFlags, Kind, KindTag};
use crate::{EvalResult, Shared};

/// What a completed fulfillment pass produced.
pub enum FulfillOutcome {
    /// Every parameter slot is filled and checked.
    Done,
    /// Evaluating one of the arguments threw.
    Thrown(Thrown),
}

/// Fill every slot of `frame.varlist` per `frame.phase`'s parameter list.
///
/// Preconditions: `frame.phase` is `Some`, `frame.varlist` is sized to
/// `phase.params.len()` (filled with [`Cell::end`] placeholders), and
/// `frame.dsp_orig` is the data-stack depth at call entry, with any
/// path-supplied refinement names already pushed above it in path order.
pub fn fulfill(state: &mut crate::state::EvalState, frame: &mut Frame) -> EvalResult<FulfillOutcome> {
    let phase = frame
        .phase
        .clone()
        .expect("fulfill requires a phase to be installed on the frame");
    if frame.varlist.len() != phase.params.len() {
        frame.varlist = vec![Cell::end(); phase.params.len()];
    }
    let base = frame.dsp_orig;

    // In-order pass, one parameter at a time, declaration order.
    frame.param_cursor = 0;
    while frame.param_cursor < phase.params.len() {
        if let FulfillOutcome::Thrown(t) = fulfill_one(state, frame, &phase, base, false)? {
            return Ok(FulfillOutcome::Thrown(t));
        }
        frame.param_cursor += 1;
    }

    // Pickups phase: any refinement matched out of declaration order during
    // the pass above was rebound in place as a `PartialIndex` pickup marker
    // rather than consumed. Pop them from the top down and revisit each
    // one's parameter span (`spec.md` §4.4 step 1).
    loop {
        let popped = match state.stack.above(base).last() {
            Some(StackEntry::PartialIndex(..)) => state.stack.pop(),
            Some(StackEntry::Refinement(name)) => {
                return Err(EvalError::new(ErrorKind::BadRefine {
                    refinement: name.as_str().to_string(),
                }))
            }
            _ => None,
        };
        let Some(StackEntry::PartialIndex(_, target)) = popped else {
            break;
        };
        frame.param_cursor = target;
        loop {
            if let FulfillOutcome::Thrown(t) = fulfill_one(state, frame, &phase, base, true)? {
                return Ok(FulfillOutcome::Thrown(t));
            }
            frame.param_cursor += 1;
            if frame.param_cursor >= phase.params.len() {
                break;
            }
            if phase.params[frame.param_cursor].is_refinement() {
                break;
            }
        }
    }

    Ok(FulfillOutcome::Done)
}

/// The frontmost (earliest-pushed) still-unconsumed refinement entry above
/// `base`, if any. Pushed refinements are matched by *declaration* order
/// during the in-order pass; the one pushed first by the path is "next".
fn front_refinement_index(stack: &crate::stack::DataStack, base: usize) -> Option<usize> {
    stack
        .above(base)
        .iter()
        .position(|e| matches!(e, StackEntry::Refinement(_)))
        .map(|i| i + base)
}

fn specialized_value(frame: &mut Frame, idx: usize) -> Option<Cell> {
    match &mut frame.special {
        SpecialCursor::Fulfillment => None,
        SpecialCursor::TypecheckOnly => Some(frame.varlist[idx].clone()),
        SpecialCursor::Partial { values, index } => {
            let v = values.get(*index).cloned();
            *index += 1;
            v
        }
    }
}

fn is_first_argument_slot(params: &[Param], idx: usize) -> bool {
    params[..idx].iter().all(|p| p.is_refinement() || p.is_pure_local())
}

/// Process exactly one parameter at `frame.param_cursor` (`spec.md` §4.4
/// steps 1-8).
fn fulfill_one(
    state: &mut crate::state::EvalState,
    frame: &mut Frame,
    phase: &Shared<ActionDescriptor>,
    base: usize,
    doing_pickups: bool,
) -> EvalResult<FulfillOutcome> {
    let idx = frame.param_cursor;
    let param = phase.params[idx].clone();

    // Step 1: refinement header.
    if param.is_refinement() {
        if doing_pickups {
            frame.refine = RefineCursor::Live(idx);
            frame.refine_arg_seen_nonnull = false;
            frame.varlist[idx] =
                Cell::word(param.name.clone()).with_flags(CellFlags::STALE_OR_CHECKED);
            return Ok(FulfillOutcome::Done);
        }
        fulfill_refinement(state, frame, &param, idx, base);
        return Ok(FulfillOutcome::Done);
    }

    // Step 2: pure local.
    if param.is_pure_local() {
        frame.varlist[idx] = Cell::null().with_flags(CellFlags::STALE_OR_CHECKED);
        return Ok(FulfillOutcome::Done);
    }

    // Step 3: skipping the args of a refinement that is not in use.
    if matches!(frame.refine, RefineCursor::ArgToUnusedRefinement) {
        frame.varlist[idx] = Cell::null().with_flags(CellFlags::STALE_OR_CHECKED);
        return Ok(FulfillOutcome::Done);
    }

    // Step 4: already-specialized value.
    if let Some(v) = specialized_value(frame, idx) {
        return typecheck_and_store(frame, phase, &param, idx, v);
    }

    // Step 5: next-arg-from-output (enfix left-hand argument).
    if frame.from_enfix && !frame.enfix_consumed && is_first_argument_slot(&phase.params, idx) {
        let left = std::mem::replace(&mut frame.output, Cell::end());
        frame.enfix_consumed = true;
        if param.class == ParamClass::HardQuote && !left.flags().is_unevaluated() {
            return Err(EvalError::new(ErrorKind::EvaluativeQuoteViolation {
                op: phase.name.as_str().to_string(),
            }));
        }
        // Tight-argument-like enfix behavior: this call's own right-hand
        // argument must not absorb a following same-priority enfix operator,
        // so `1 + 2 * 3` binds as `(1 + 2) * 3` (spec.md §4.2, §8).
        if param.class == ParamClass::Normal && !phase.defers_lookback() && !phase.postpones() {
            state.feed.flags_mut().insert(crate::feed::FeedFlags::NO_LOOKAHEAD);
        }
        return typecheck_and_store(frame, phase, &param, idx, left);
    }

    // Step 6: variadic capture. Simplified: snapshots the remainder of the
    // feed into a block rather than installing a live lazily-pulled handle
    // (see DESIGN.md).
    if param.flags.contains(ParamFlags::VARIADIC) {
        let mut items = Vec::new();
        while !state.feed.is_at_end() {
            items.push(state.feed.fetch_next());
        }
        frame.varlist[idx] = Cell::block(items).with_flags(CellFlags::STALE_OR_CHECKED);
        return Ok(FulfillOutcome::Done);
    }

    // Step 7: ordinary fulfillment from the feed.
    if state.feed.is_at_end() || state.feed.flags().contains(crate::feed::FeedFlags::BARRIER_HIT) {
        if param.flags.contains(ParamFlags::ENDABLE) {
            return typecheck_and_store(frame, phase, &param, idx, Cell::null());
        }
        return Err(EvalError::new(ErrorKind::NoArgGiven {
            param: param.name.as_str().to_string(),
        }));
    }

    let arg = match param.class {
        ParamClass::HardQuote => {
            let candidate = state.feed.peek().clone();
            if param.flags.contains(ParamFlags::SKIPPABLE) && !param.accepts(candidate.kind_tag())
            {
                frame.varlist[idx] = Cell::null().with_flags(CellFlags::STALE_OR_CHECKED);
                return Ok(FulfillOutcome::Done);
            }
            state.feed.fetch_next();
            candidate.with_flags(CellFlags::UNEVALUATED)
        }
        ParamClass::SoftQuote => {
            if state.feed.peek().is_quotably_soft() {
                let mut sub = Cell::end();
                match crate::eval::eval_step(state, &mut sub, false, true)? {
                    crate::eval::StepOutcome::Thrown(t) => return Ok(FulfillOutcome::Thrown(t)),
                    crate::eval::StepOutcome::Value => {}
                    crate::eval::StepOutcome::Deferred(p) => frame.pending_deferred = Some(p),
                }
                sub
            } else {
                let candidate = state.feed.peek().clone();
                if param.flags.contains(ParamFlags::SKIPPABLE)
                    && !param.accepts(candidate.kind_tag())
                {
                    frame.varlist[idx] = Cell::null().with_flags(CellFlags::STALE_OR_CHECKED);
                    return Ok(FulfillOutcome::Done);
                }
                state.feed.fetch_next();
                candidate.with_flags(CellFlags::UNEVALUATED)
            }
        }
        ParamClass::Tight => {
            let mut sub = Cell::end();
            match crate::eval::eval_step(state, &mut sub, true, true)? {
                crate::eval::StepOutcome::Thrown(t) => return Ok(FulfillOutcome::Thrown(t)),
                crate::eval::StepOutcome::Value => {}
                crate::eval::StepOutcome::Deferred(p) => frame.pending_deferred = Some(p),
            }
            sub
        }
        ParamClass::Normal => {
            let no_lookahead = state.feed.flags().contains(crate::feed::FeedFlags::NO_LOOKAHEAD);
            if no_lookahead {
                state.feed.flags_mut().remove(crate::feed::FeedFlags::NO_LOOKAHEAD);
            }
            let mut sub = Cell::end();
            match crate::eval::eval_step(state, &mut sub, no_lookahead, true)? {
                crate::eval::StepOutcome::Thrown(t) => return Ok(FulfillOutcome::Thrown(t)),
                crate::eval::StepOutcome::Value => {}
                crate::eval::StepOutcome::Deferred(p) => frame.pending_deferred = Some(p),
            }
            sub
        }
        ParamClass::Refinement | ParamClass::Local | ParamClass::Return => {
            unreachable!("handled in steps 1-2")
        }
    };

    typecheck_and_store(frame, phase, &param, idx, arg)
}

fn fulfill_refinement(
    state: &mut crate::state::EvalState,
    frame: &mut Frame,
    param: &Param,
    idx: usize,
    base: usize,
) {
    match state.stack.find_refinement(base, &param.name) {
        Some(stack_idx) if Some(stack_idx) == front_refinement_index(state.stack, base) => {
            // Consumed in declaration order: drop it from the stack and go live.
            remove_stack_entry(state.stack, stack_idx);
            frame.refine = RefineCursor::Live(idx);
            frame.refine_arg_seen_nonnull = false;
            frame.varlist[idx] =
                Cell::word(param.name.clone()).with_flags(CellFlags::STALE_OR_CHECKED);
        }
        Some(stack_idx) => {
            // Present, but out of order: defer to the pickups phase.
            rebind_as_pickup(state.stack, stack_idx, param.name.clone(), idx);
            frame.refine = RefineCursor::ArgToUnusedRefinement;
            frame.varlist[idx] = Cell::blank().with_flags(CellFlags::STALE_OR_CHECKED);
        }
        None => {
            frame.refine = RefineCursor::ArgToUnusedRefinement;
            frame.varlist[idx] = Cell::blank().with_flags(CellFlags::STALE_OR_CHECKED);
        }
    }
}

fn remove_stack_entry(stack: &mut crate::stack::DataStack, at: usize) {
    let depth = stack.depth();
    let tail: Vec<StackEntry> = stack.above(at + 1).to_vec();
    stack.truncate(at);
    for entry in tail {
        stack.push(entry);
    }
    debug_assert_eq!(stack.depth(), depth - 1);
}

fn rebind_as_pickup(
    stack: &mut crate::stack::DataStack,
    at: usize,
    name: crate::value::Spelling,
    target_param: usize,
) {
    let depth = stack.depth();
    let tail: Vec<StackEntry> = stack.above(at + 1).to_vec();
    stack.truncate(at);
    stack.push(StackEntry::PartialIndex(name, target_param));
    for entry in tail {
        stack.push(entry);
    }
    debug_assert_eq!(stack.depth(), depth);
}

/// Step 8: typecheck, dequote accumulation, `<blank>` fulfill-only, and
/// refinement revocation.
fn typecheck_and_store(
    frame: &mut Frame,
    phase: &Shared<ActionDescriptor>,
    param: &Param,
    idx: usize,
    mut arg: Cell,
) -> EvalResult<FulfillOutcome> {
    let dequote_marked = param.flags.contains(ParamFlags::DEQUOTE_MARKED)
        || phase.flags.contains(crate::action::ActionFlags::DEQUOTE);
    if dequote_marked {
        if let Kind::Quoted(inner, depth, flags) = arg.kind().clone() {
            frame.quote_requote += depth;
            arg = (*inner).with_flags(flags);
        }
    }

    let tag = arg.kind_tag();

    if param.flags.contains(ParamFlags::BLANK_MARKED) && tag == KindTag::Blank {
        frame.flags.insert(crate::frame::FrameFlags::FULFILL_ONLY);
        arg.flags_mut().insert(CellFlags::STALE_OR_CHECKED);
        frame.varlist[idx] = arg;
        return Ok(FulfillOutcome::Done);
    }

    if !param.accepts(tag) {
        if tag == KindTag::Null {
            if let RefineCursor::Live(refine_idx) = frame.refine {
                if !frame.refine_arg_seen_nonnull {
                    frame.varlist[refine_idx] =
                        Cell::blank().with_flags(CellFlags::STALE_OR_CHECKED);
                    frame.refine = RefineCursor::ArgToUnusedRefinement;
                    arg.flags_mut().insert(CellFlags::STALE_OR_CHECKED);
                    frame.varlist[idx] = arg;
                    return Ok(FulfillOutcome::Done);
                }
                return Err(EvalError::new(ErrorKind::RevokeOrder {
                    refinement: param.name.as_str().to_string(),
                }));
            }
        }
        return Err(EvalError::new(ErrorKind::ArgTypeMismatch {
            param: param.name.as_str().to_string(),
            actual: tag,
        }));
    }

    if let RefineCursor::Live(_) = frame.refine {
        frame.refine_arg_seen_nonnull = true;
    }

    arg.flags_mut().insert(CellFlags::STALE_OR_CHECKED);
    frame.varlist[idx] = arg;
    Ok(FulfillOutcome::Done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::PathResolver;
    use crate::feed::{Feed, Specifier};
    use crate::limits::EvalLimits;
    use crate::scope::Scope;
    use crate::stack::DataStack;
    use crate::state::EvalState;
    use crate::value::KindTag;

    struct NullResolver;
    impl PathResolver for NullResolver {
        fn path_evaluate(
            &self,
            _array: &[Cell],
            _specifier: &Specifier,
            _setval: Option<&Cell>,
            _push_refines: bool,
            _stack: &mut DataStack,
        ) -> EvalResult<crate::collaborators::PathOutcome> {
            unimplemented!("not exercised by fulfill tests")
        }

        fn reduce_to_stack(
            &self,
            _block: &[Cell],
            _specifier: &Specifier,
            _stack: &mut DataStack,
        ) -> EvalResult<()> {
            unimplemented!("not exercised by fulfill tests")
        }
    }

    fn harness(cells: Vec<Cell>) -> (Feed, DataStack, Scope, NullResolver, crate::NoopSignalSink, EvalLimits) {
        (
            Feed::from_array(cells, Specifier::root()),
            DataStack::new(),
            Scope::new(),
            NullResolver,
            crate::NoopSignalSink,
            EvalLimits::default(),
        )
    }

    fn test_action(params: Vec<Param>) -> Shared<ActionDescriptor> {
        ActionDescriptor::new(
            "test-action",
            params,
            crate::action::ActionFlags::NONE,
            Shared::new(|_state: &mut crate::state::EvalState, _frame: &mut Frame| {
                Ok(crate::action::DispatchSignal::Value(Cell::blank()))
            }),
        )
    }

    #[test]
    fn normal_param_pulls_one_evaluated_value() {
        let action = test_action(vec![Param::new("a", ParamClass::Normal)]);
        let (mut feed, mut stack, mut scope, resolver, mut signals, limits) =
            harness(vec![Cell::integer(7)]);
        let mut state = EvalState::new(&mut feed, &mut stack, &mut scope, &resolver, &mut signals, &limits);
        let mut frame = Frame::new(state.stack.depth());
        frame.phase = Some(action.clone());
        frame.varlist = vec![Cell::end(); action.params.len()];
        assert!(matches!(fulfill(&mut state, &mut frame), Ok(FulfillOutcome::Done)));
        assert!(matches!(frame.varlist[0].kind(), Kind::Integer(7, _)));
        assert!(frame.varlist[0].flags().is_checked());
    }

    #[test]
    fn missing_non_endable_arg_errors() {
        let action = test_action(vec![Param::new("a", ParamClass::Normal)]);
        let (mut feed, mut stack, mut scope, resolver, mut signals, limits) = harness(vec![]);
        let mut state = EvalState::new(&mut feed, &mut stack, &mut scope, &resolver, &mut signals, &limits);
        let mut frame = Frame::new(state.stack.depth());
        frame.phase = Some(action.clone());
        frame.varlist = vec![Cell::end(); action.params.len()];
        assert!(fulfill(&mut state, &mut frame).is_err());
    }

    #[test]
    fn endable_missing_arg_becomes_null() {
        let action = test_action(vec![
            Param::new("a", ParamClass::Normal).with_flags(ParamFlags::ENDABLE)
        ]);
        let (mut feed, mut stack, mut scope, resolver, mut signals, limits) = harness(vec![]);
        let mut state = EvalState::new(&mut feed, &mut stack, &mut scope, &resolver, &mut signals, &limits);
        let mut frame = Frame::new(state.stack.depth());
        frame.phase = Some(action.clone());
        frame.varlist = vec![Cell::end(); action.params.len()];
        assert!(matches!(fulfill(&mut state, &mut frame), Ok(FulfillOutcome::Done)));
        assert!(frame.varlist[0].is_null());
    }

    #[test]
    fn typecheck_rejects_wrong_kind() {
        let action = test_action(vec![
            Param::new("a", ParamClass::Normal).with_typeset(vec![KindTag::Logic])
        ]);
        let (mut feed, mut stack, mut scope, resolver, mut signals, limits) =
            harness(vec![Cell::integer(1)]);
        let mut state = EvalState::new(&mut feed, &mut stack, &mut scope, &resolver, &mut signals, &limits);
        let mut frame = Frame::new(state.stack.depth());
        frame.phase = Some(action.clone());
        frame.varlist = vec![Cell::end(); action.params.len()];
        assert!(fulfill(&mut state, &mut frame).is_err());
    }

    #[test]
    fn refinements_fulfilled_out_of_declaration_order_via_pickups() {
        // Declares /a then /b; the path names them b then a.
        let action = test_action(vec![
            Param::new("a-flag", ParamClass::Refinement),
            Param::new("a-arg", ParamClass::Normal),
            Param::new("b-flag", ParamClass::Refinement),
            Param::new("b-arg", ParamClass::Normal),
        ]);
        let (mut feed, mut stack, mut scope, resolver, mut signals, limits) =
            harness(vec![Cell::integer(2), Cell::integer(1)]);
        stack.push(StackEntry::Refinement(crate::value::Spelling::new("b-flag")));
        stack.push(StackEntry::Refinement(crate::value::Spelling::new("a-flag")));
        let mut state = EvalState::new(&mut feed, &mut stack, &mut scope, &resolver, &mut signals, &limits);
        let dsp_orig = 0;
        let mut frame = Frame::new(dsp_orig);
        frame.phase = Some(action.clone());
        frame.varlist = vec![Cell::end(); action.params.len()];
        assert!(matches!(fulfill(&mut state, &mut frame), Ok(FulfillOutcome::Done)));
        // b's argument was gathered first (it was the front-pushed / matched
        // in declaration order after a was deferred to pickups), a's second.
        assert!(matches!(frame.varlist[3].kind(), Kind::Integer(2, _)));
        assert!(matches!(frame.varlist[1].kind(), Kind::Integer(1, _)));
        assert!(state.stack.above(dsp_orig).is_empty());
    }
}
