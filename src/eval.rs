//! The Evaluator Loop: `eval_step` runs one expression's worth of the main
//! kind-dispatch switch followed by enfix lookahead; `eval_to_end` and
//! `do_block` run a whole feed/block to completion (`spec.md` §4.1-§4.3).

use crate::action::ActionDescriptor;
use crate::error::{ErrorKind, EvalError, Thrown};
use crate::feed::{Feed, FeedFlags, Specifier};
use crate::frame::{Frame, PendingEnfix};
use crate::stack::StackEntry;
use crate::state::EvalState;
use crate::value::{Cell, CellFlags, Kind, KindTag, Spelling};
use crate::{dispatch, fulfill, lookahead};
use crate::{EvalResult, Shared};

/// What one `eval_step` call produced.
pub enum StepOutcome {
    /// A value was written to the caller's output cell (or, for an
    /// invisible action, deliberately left untouched).
    Value,
    Thrown(Thrown),
    /// An enfixed action was seen but must be absorbed by an enclosing
    /// frame instead of here (`spec.md` §4.2, "Deferral rule").
    Deferred(PendingEnfix),
}

/// What running a block of cells to completion produced. Kept distinct
/// from [`StepOutcome`] because a throw escaping a nested block must keep
/// propagating as data, not collapse into an `Err` the way an unhandled
/// top-level throw does in [`eval_to_end`].
pub enum DoOutcome {
    Value(Cell),
    Thrown(Thrown),
}

/// Run one expression: repeat the main kind-dispatch switch until it
/// produces a non-invisible value (or the feed ends), then run post-switch
/// enfix lookahead (`spec.md` §4.1-§4.3).
pub fn eval_step(
    state: &mut EvalState,
    output: &mut Cell,
    no_lookahead: bool,
    fulfilling_arg: bool,
) -> EvalResult<StepOutcome> {
    state.tick()?;
    // A barrier only holds back argument fulfillment within the expression
    // that consumed it; a fresh expression (this call) starts unbarriered.
    state.feed.flags_mut().remove(FeedFlags::BARRIER_HIT);

    loop {
        if state.feed.is_at_end() {
            return Ok(StepOutcome::Value);
        }

        if lookahead::should_look_ahead(state.feed.flags()) {
            if let Some((action, label)) = lookahead::pending_backward_quote(state, no_lookahead) {
                let literal = state.feed.fetch_next().with_flags(CellFlags::UNEVALUATED);
                state.feed.fetch_next(); // consume the quoting word itself
                match invoke_action(state, output, action, Some(literal), Some(label))? {
                    StepOutcome::Value => break,
                    StepOutcome::Thrown(t) => return Ok(StepOutcome::Thrown(t)),
                    StepOutcome::Deferred(_) => unreachable!("backward-quote steal never defers"),
                }
            }
        }

        match main_switch(state, output)? {
            MainOutcome::Produced => break,
            MainOutcome::Invisible => continue,
            MainOutcome::Thrown(t) => return Ok(StepOutcome::Thrown(t)),
        }
    }

    if no_lookahead || !lookahead::should_look_ahead(state.feed.flags()) {
        return Ok(StepOutcome::Value);
    }

    loop {
        let Some(action) = lookahead::pending_enfix(state) else {
            return Ok(StepOutcome::Value);
        };
        if lookahead::postpones(&action) {
            return Ok(StepOutcome::Value);
        }
        if lookahead::should_defer(&action, fulfilling_arg) {
            if state.feed.flags().contains(FeedFlags::DEFERRING_ENFIX) {
                return Err(EvalError::new(ErrorKind::AmbiguousInfix));
            }
            state.feed.flags_mut().insert(FeedFlags::DEFERRING_ENFIX);
            let label = state.feed.peek().as_word().cloned();
            return Ok(StepOutcome::Deferred(PendingEnfix { action, label }));
        }

        let label = state.feed.peek().as_word().cloned();
        state.feed.fetch_next();
        match invoke_action(state, output, action, Some(output.clone()), label)? {
            StepOutcome::Value => {}
            StepOutcome::Thrown(t) => return Ok(StepOutcome::Thrown(t)),
            StepOutcome::Deferred(_) => {
                unreachable!("invoke_action resolves its own pending deferrals before returning")
            }
        }

        if no_lookahead || !lookahead::should_look_ahead(state.feed.flags()) {
            return Ok(StepOutcome::Value);
        }
    }
}

/// Run `state.feed` to its end, keeping the last produced value (an
/// invisible trailing expression leaves the previous one standing, the way
/// `do [1 comment "x"]` yields `1`). An uncaught throw reaching this
/// boundary becomes an ordinary error: nothing above `eval_to_end` can
/// catch it by frame identity.
pub fn eval_to_end(state: &mut EvalState) -> EvalResult<Cell> {
    let mut last = Cell::void();
    while !state.feed.is_at_end() {
        match eval_step(state, &mut last, false, false)? {
            StepOutcome::Value => {}
            StepOutcome::Thrown(t) => {
                tracing::debug!(label = ?t.label, "unhandled throw reached top level");
                return Err(EvalError::new(ErrorKind::Custom {
                    message: format!("unhandled throw: {:?}", t.label),
                }))
            }
            StepOutcome::Deferred(_) => unreachable!("top-level statements never defer"),
        }
    }
    Ok(last)
}

/// Run a standalone block of cells to completion under the current
/// collaborators, preserving an escaping throw as data. The entry point
/// intrinsics reach for to run a block-typed argument (`if`, `either`,
/// loop bodies).
pub fn do_block(state: &mut EvalState, cells: Vec<Cell>) -> EvalResult<DoOutcome> {
    let specifier = state.feed.specifier().clone();
    eval_inline(state, cells, specifier)
}

/// Build a fresh [`Feed`]/[`EvalState`] over `cells` sharing every other
/// collaborator with `state`, and run it to completion. Used for `GROUP!`
/// bodies, `do_block`, and the `GET-GROUP!`/`SET-GROUP!` target
/// expression.
fn eval_inline(state: &mut EvalState, cells: Vec<Cell>, specifier: Specifier) -> EvalResult<DoOutcome> {
    let mut sub_feed = Feed::from_array(cells, specifier);
    let mut sub_state = EvalState::new(
        &mut sub_feed,
        &mut *state.stack,
        &mut *state.bindings,
        &*state.resolver,
        &mut *state.signals,
        state.limits,
    );
    let mut last = Cell::void();
    while !sub_state.feed.is_at_end() {
        match eval_step(&mut sub_state, &mut last, false, false)? {
            StepOutcome::Value => {}
            StepOutcome::Thrown(t) => return Ok(DoOutcome::Thrown(t)),
            StepOutcome::Deferred(_) => unreachable!("inline block statements never defer"),
        }
    }
    Ok(DoOutcome::Value(last))
}

enum MainOutcome {
    Produced,
    Invisible,
    Thrown(Thrown),
}

/// The kind-dispatch table (`spec.md` §4.3): what the current feed cell's
/// kind alone determines about how it is processed.
fn main_switch(state: &mut EvalState, output: &mut Cell) -> EvalResult<MainOutcome> {
    let tag = state.feed.peek().kind_tag();
    match tag {
        KindTag::End => {
            *output = Cell::end();
            Ok(MainOutcome::Produced)
        }
        KindTag::Null => Err(EvalError::new(ErrorKind::NullEvaluation)),
        KindTag::Void => Err(EvalError::new(ErrorKind::VoidEvaluation)),
        KindTag::Quoted => {
            let cell = state.feed.fetch_next();
            *output = cell.dequote_one();
            Ok(MainOutcome::Produced)
        }
        KindTag::Word => eval_word(state, output),
        KindTag::SetWord => eval_set_word(state, output),
        KindTag::GetWord => eval_get_word(state, output),
        KindTag::Path => eval_path(state, output, false),
        KindTag::GetPath => eval_path(state, output, true),
        KindTag::SetPath => eval_set_path(state, output),
        KindTag::Group => eval_group(state, output),
        KindTag::SetBlock => eval_set_block(state, output),
        KindTag::GetBlock => eval_get_block(state, output),
        KindTag::GetGroup => eval_get_group(state, output),
        KindTag::SetGroup => eval_set_group(state, output),
        KindTag::Action => eval_action_literal(state, output),
        _ if tag.is_inert() || tag == KindTag::Frame => {
            let cell = state.feed.fetch_next();
            *output = cell.with_flags(CellFlags::UNEVALUATED);
            Ok(MainOutcome::Produced)
        }
        _ => unreachable!("every KindTag variant is handled above"),
    }
}

fn spelling_of(cell: &Cell) -> Spelling {
    match cell.kind() {
        Kind::Word(s, _) | Kind::SetWord(s, _) | Kind::GetWord(s, _) | Kind::Issue(s, _) => {
            s.clone()
        }
        other => unreachable!("spelling_of called on {other:?}"),
    }
}

fn eval_word(state: &mut EvalState, output: &mut Cell) -> EvalResult<MainOutcome> {
    let word = spelling_of(state.feed.peek());
    let value = match state.feed.gotten() {
        Some(cached) => cached.clone(),
        None => {
            let v = state.bindings.get_variable(word.as_str(), state.feed.specifier())?;
            state.feed.set_gotten(Some(v.clone()));
            v
        }
    };

    if value.is_action() {
        if value.flags().is_enfixed() {
            return Err(EvalError::new(ErrorKind::LiteralLeftPath {
                op: word.as_str().to_string(),
            }));
        }
        let action = value.as_action().expect("checked is_action").clone();
        let is_invisible = action.is_invisible();
        state.feed.fetch_next();
        return match invoke_action(state, output, action, None, Some(word))? {
            StepOutcome::Value => Ok(if is_invisible {
                MainOutcome::Invisible
            } else {
                MainOutcome::Produced
            }),
            StepOutcome::Thrown(t) => Ok(MainOutcome::Thrown(t)),
            StepOutcome::Deferred(_) => unreachable!("prefix invocation never defers"),
        };
    }
    if value.is_null() {
        return Err(EvalError::new(ErrorKind::NullEvaluation));
    }
    if value.is_void() {
        return Err(EvalError::new(ErrorKind::VoidEvaluation));
    }
    state.feed.fetch_next();
    *output = value;
    Ok(MainOutcome::Produced)
}

fn eval_get_word(state: &mut EvalState, output: &mut Cell) -> EvalResult<MainOutcome> {
    let word = spelling_of(state.feed.peek());
    let value = state.bindings.get_variable(word.as_str(), state.feed.specifier())?;
    state.feed.fetch_next();
    *output = value;
    Ok(MainOutcome::Produced)
}

fn eval_set_word(state: &mut EvalState, output: &mut Cell) -> EvalResult<MainOutcome> {
    let word = spelling_of(state.feed.peek());
    state.feed.fetch_next();
    let specifier = state.feed.specifier().clone();
    if state.feed.is_at_end() {
        return Err(EvalError::new(ErrorKind::NoArgGiven {
            param: word.as_str().to_string(),
        }));
    }
    let mut value = Cell::end();
    match eval_step(state, &mut value, false, false)? {
        StepOutcome::Value => {}
        StepOutcome::Thrown(t) => return Ok(MainOutcome::Thrown(t)),
        StepOutcome::Deferred(_) => unreachable!("rhs recursion passes fulfilling_arg=false"),
    }
    if value.is_void() {
        return Err(EvalError::new(ErrorKind::NeedNonVoid));
    }
    state.bindings.set_variable(word.as_str(), &specifier, value.clone())?;
    *output = value;
    Ok(MainOutcome::Produced)
}

fn eval_path(state: &mut EvalState, output: &mut Cell, is_get: bool) -> EvalResult<MainOutcome> {
    let cell = state.feed.peek().clone();
    let array = cell.as_array().expect("Path/GetPath carries an array").clone();
    if array.first().is_some_and(Cell::is_kind_inert) {
        state.feed.fetch_next();
        *output = cell.with_flags(CellFlags::UNEVALUATED);
        return Ok(MainOutcome::Produced);
    }

    // Captured before `path_evaluate` runs: any refinements it pushes via
    // `push_refines` must land *above* the callee frame's own `dsp_orig`, or
    // `fulfill`'s in-order pass would never see them (`spec.md` §4.4 step 1).
    let dsp_orig = state.stack.depth();
    let specifier = state.feed.specifier().clone();
    let resolved = match state
        .resolver
        .path_evaluate(&array, &specifier, None, !is_get, state.stack)?
    {
        crate::collaborators::PathOutcome::Value(v) => v,
        crate::collaborators::PathOutcome::Thrown(t) => return Ok(MainOutcome::Thrown(t)),
    };
    state.feed.fetch_next();

    if is_get {
        *output = resolved.value;
        return Ok(MainOutcome::Produced);
    }
    if !resolved.value.is_action() {
        *output = resolved.value;
        return Ok(MainOutcome::Produced);
    }
    if resolved.value.flags().is_enfixed() {
        return Err(EvalError::new(ErrorKind::EnfixViaPath));
    }
    let action = resolved.value.as_action().expect("checked is_action").clone();
    let is_invisible = action.is_invisible();
    match invoke_action_at(state, output, action, None, resolved.label, dsp_orig)? {
        StepOutcome::Value => Ok(if is_invisible {
            MainOutcome::Invisible
        } else {
            MainOutcome::Produced
        }),
        StepOutcome::Thrown(t) => Ok(MainOutcome::Thrown(t)),
        StepOutcome::Deferred(_) => unreachable!("prefix invocation never defers"),
    }
}

fn eval_set_path(state: &mut EvalState, output: &mut Cell) -> EvalResult<MainOutcome> {
    let array = state.feed.peek().as_array().expect("SetPath carries an array").clone();
    state.feed.fetch_next();
    let specifier = state.feed.specifier().clone();
    if state.feed.is_at_end() {
        return Err(EvalError::new(ErrorKind::NoArgGiven {
            param: "set-path".to_string(),
        }));
    }
    let mut value = Cell::end();
    match eval_step(state, &mut value, false, false)? {
        StepOutcome::Value => {}
        StepOutcome::Thrown(t) => return Ok(MainOutcome::Thrown(t)),
        StepOutcome::Deferred(_) => unreachable!("rhs recursion passes fulfilling_arg=false"),
    }
    if value.is_void() {
        return Err(EvalError::new(ErrorKind::NeedNonVoid));
    }
    match state
        .resolver
        .path_evaluate(&array, &specifier, Some(&value), false, state.stack)?
    {
        crate::collaborators::PathOutcome::Value(_) => {}
        crate::collaborators::PathOutcome::Thrown(t) => return Ok(MainOutcome::Thrown(t)),
    }
    *output = value;
    Ok(MainOutcome::Produced)
}

fn eval_group(state: &mut EvalState, output: &mut Cell) -> EvalResult<MainOutcome> {
    let cell = state.feed.peek().clone();
    let array = cell.as_array().expect("Group carries an array").clone();
    let specifier = state.bindings.derive_specifier(state.feed.specifier(), &cell);
    state.feed.fetch_next();
    if array.is_empty() {
        return Ok(MainOutcome::Invisible);
    }
    match eval_inline(state, (*array).clone(), specifier)? {
        DoOutcome::Value(v) if v.is_void() => Ok(MainOutcome::Invisible),
        DoOutcome::Value(v) => {
            *output = v;
            Ok(MainOutcome::Produced)
        }
        DoOutcome::Thrown(t) => Ok(MainOutcome::Thrown(t)),
    }
}

fn eval_set_block(state: &mut EvalState, output: &mut Cell) -> EvalResult<MainOutcome> {
    let array = state.feed.peek().as_array().expect("SetBlock carries an array").clone();
    state.feed.fetch_next();
    let specifier = state.feed.specifier().clone();
    if state.feed.is_at_end() {
        return Err(EvalError::new(ErrorKind::NoArgGiven {
            param: "set-block".to_string(),
        }));
    }
    let mut value = Cell::end();
    match eval_step(state, &mut value, false, false)? {
        StepOutcome::Value => {}
        StepOutcome::Thrown(t) => return Ok(MainOutcome::Thrown(t)),
        StepOutcome::Deferred(_) => unreachable!("rhs recursion passes fulfilling_arg=false"),
    }
    if value.is_void() {
        return Err(EvalError::new(ErrorKind::NeedNonVoid));
    }
    let targets = Cell::block((*array).clone());
    state.bindings.set_variable_poly(&targets, &specifier, value.clone())?;
    *output = value;
    Ok(MainOutcome::Produced)
}

/// Pop exactly `count` values pushed by [`crate::collaborators::PathResolver::reduce_to_stack`].
/// The data stack is a shared multi-purpose scratch area (`spec.md` §3):
/// reduce results ride the same `StackEntry::ChainAction` slot chain
/// completion uses for pushed action values, since both are "just a `Cell`
/// temporarily parked above a frame's base".
fn pop_reduced(state: &mut EvalState, count: usize) -> EvalResult<Vec<Cell>> {
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        match state.stack.pop() {
            Some(StackEntry::ChainAction(v)) => items.push(v),
            _ => {
                return Err(EvalError::new(ErrorKind::Custom {
                    message: "reduce_to_stack pushed a non-value entry".to_string(),
                }))
            }
        }
    }
    items.reverse();
    Ok(items)
}

fn eval_get_block(state: &mut EvalState, output: &mut Cell) -> EvalResult<MainOutcome> {
    let array = state.feed.peek().as_array().expect("GetBlock carries an array").clone();
    state.feed.fetch_next();
    let specifier = state.feed.specifier().clone();
    state.resolver.reduce_to_stack(&array, &specifier, state.stack)?;
    let items = pop_reduced(state, array.len())?;
    *output = Cell::block(items);
    Ok(MainOutcome::Produced)
}

/// `GET-GROUP!`: evaluate the group, then retype the result as the
/// corresponding get-form and re-evaluate (`spec.md` §4.3). Zero-arity
/// actions are also accepted so `(:foo)` can call a niladic action. Any
/// other result kind is a `Custom` error; the original's full retyping
/// matrix is not reproduced in full (see DESIGN.md).
fn eval_get_group(state: &mut EvalState, output: &mut Cell) -> EvalResult<MainOutcome> {
    let cell = state.feed.peek().clone();
    let array = cell.as_array().expect("GetGroup carries an array").clone();
    let specifier = state.bindings.derive_specifier(state.feed.specifier(), &cell);
    state.feed.fetch_next();

    let target = match eval_inline(state, (*array).clone(), specifier.clone())? {
        DoOutcome::Value(v) => v,
        DoOutcome::Thrown(t) => return Ok(MainOutcome::Thrown(t)),
    };

    match target.kind_tag() {
        KindTag::Word => {
            let word = target.as_word().expect("checked Word").clone();
            *output = state.bindings.get_variable(word.as_str(), &specifier)?;
            Ok(MainOutcome::Produced)
        }
        KindTag::Path => {
            let arr = target.as_array().expect("checked Path").clone();
            match state.resolver.path_evaluate(&arr, &specifier, None, false, state.stack)? {
                crate::collaborators::PathOutcome::Value(resolved) => {
                    *output = resolved.value;
                    Ok(MainOutcome::Produced)
                }
                crate::collaborators::PathOutcome::Thrown(t) => Ok(MainOutcome::Thrown(t)),
            }
        }
        KindTag::Block => {
            let arr = target.as_array().expect("checked Block").clone();
            state.resolver.reduce_to_stack(&arr, &specifier, state.stack)?;
            let items = pop_reduced(state, arr.len())?;
            *output = Cell::block(items);
            Ok(MainOutcome::Produced)
        }
        KindTag::Action => {
            let action = target.as_action().expect("checked Action").clone();
            match invoke_action(state, output, action, None, None)? {
                StepOutcome::Value => Ok(MainOutcome::Produced),
                StepOutcome::Thrown(t) => Ok(MainOutcome::Thrown(t)),
                StepOutcome::Deferred(_) => unreachable!("prefix invocation never defers"),
            }
        }
        _ => Err(EvalError::new(ErrorKind::Custom {
            message: "get-group target is not a word, path, block, or action".to_string(),
        })),
    }
}

/// `SET-GROUP!`: evaluate the right-hand side before the group (`spec.md`
/// §4.3, "right before left"), then either dispatch the group's result as
/// an enfix-style consumer of that value, or retype-and-set like
/// `GET-GROUP!` does for reads.
fn eval_set_group(state: &mut EvalState, output: &mut Cell) -> EvalResult<MainOutcome> {
    let cell = state.feed.peek().clone();
    let array = cell.as_array().expect("SetGroup carries an array").clone();
    let specifier = state.bindings.derive_specifier(state.feed.specifier(), &cell);
    state.feed.fetch_next();

    if state.feed.is_at_end() {
        return Err(EvalError::new(ErrorKind::NoArgGiven {
            param: "set-group".to_string(),
        }));
    }
    let mut value = Cell::end();
    match eval_step(state, &mut value, false, false)? {
        StepOutcome::Value => {}
        StepOutcome::Thrown(t) => return Ok(MainOutcome::Thrown(t)),
        StepOutcome::Deferred(_) => unreachable!("rhs recursion passes fulfilling_arg=false"),
    }
    if value.is_void() {
        return Err(EvalError::new(ErrorKind::NeedNonVoid));
    }

    let target = match eval_inline(state, (*array).clone(), specifier.clone())? {
        DoOutcome::Value(v) => v,
        DoOutcome::Thrown(t) => return Ok(MainOutcome::Thrown(t)),
    };

    match target.kind_tag() {
        KindTag::Action => {
            let action = target.as_action().expect("checked Action").clone();
            return match invoke_action(state, &mut value, action, Some(value.clone()), None)? {
                StepOutcome::Value => {
                    *output = value;
                    Ok(MainOutcome::Produced)
                }
                StepOutcome::Thrown(t) => Ok(MainOutcome::Thrown(t)),
                StepOutcome::Deferred(_) => unreachable!("prefix invocation never defers"),
            };
        }
        KindTag::Word => {
            let word = target.as_word().expect("checked Word").clone();
            state.bindings.set_variable(word.as_str(), &specifier, value.clone())?;
        }
        KindTag::Path => {
            let arr = target.as_array().expect("checked Path").clone();
            match state
                .resolver
                .path_evaluate(&arr, &specifier, Some(&value), false, state.stack)?
            {
                crate::collaborators::PathOutcome::Value(_) => {}
                crate::collaborators::PathOutcome::Thrown(t) => return Ok(MainOutcome::Thrown(t)),
            }
        }
        _ => {
            return Err(EvalError::new(ErrorKind::Custom {
                message: "set-group target is not an action, word, or path".to_string(),
            }))
        }
    }
    *output = value;
    Ok(MainOutcome::Produced)
}

fn eval_action_literal(state: &mut EvalState, output: &mut Cell) -> EvalResult<MainOutcome> {
    let cell = state.feed.peek().clone();
    let action = cell.as_action().expect("checked Action").clone();
    if cell.flags().is_enfixed() {
        return Err(EvalError::new(ErrorKind::LiteralLeftPath {
            op: action.name.as_str().to_string(),
        }));
    }
    let is_invisible = action.is_invisible();
    state.feed.fetch_next();
    match invoke_action(state, output, action, None, None)? {
        StepOutcome::Value => Ok(if is_invisible {
            MainOutcome::Invisible
        } else {
            MainOutcome::Produced
        }),
        StepOutcome::Thrown(t) => Ok(MainOutcome::Thrown(t)),
        StepOutcome::Deferred(_) => unreachable!("prefix invocation never defers"),
    }
}

enum FrameResult {
    Value(Cell),
    Invisible,
    Thrown(Thrown),
}

/// Push a frame for `action`, fulfill its arguments, dispatch it, and
/// resolve any enfix deferral it picked up while fulfilling its own
/// arguments, before tearing the frame back down (`spec.md` §4.6). `left`,
/// when given, seeds `frame.output` for enfix-style consumption
/// (`spec.md` §4.4 step 5).
pub(crate) fn invoke_action(
    state: &mut EvalState,
    output: &mut Cell,
    action: Shared<ActionDescriptor>,
    left: Option<Cell>,
    label: Option<Spelling>,
) -> EvalResult<StepOutcome> {
    let dsp_orig = state.stack.depth();
    invoke_action_at(state, output, action, left, label, dsp_orig)
}

/// As [`invoke_action`], but with `dsp_orig` pinned by the caller rather than
/// captured fresh. Needed when the caller already pushed stack entries (e.g.
/// path-resolution refinements) that must sit *above* this frame's own
/// `dsp_orig` for `fulfill`'s pickups pass to see them (`spec.md` §4.4 step
/// 1).
pub(crate) fn invoke_action_at(
    state: &mut EvalState,
    output: &mut Cell,
    action: Shared<ActionDescriptor>,
    left: Option<Cell>,
    label: Option<Spelling>,
    dsp_orig: usize,
) -> EvalResult<StepOutcome> {
    tracing::trace!(action = %action.name.as_str(), depth = state.depth(), "invoking action");
    state.enter()?;
    if state.stack.depth() > state.limits.max_stack_depth() {
        state.leave();
        return Err(EvalError::new(ErrorKind::StackDepthExceeded));
    }
    let mut frame = Frame::new(dsp_orig);
    frame.phase = Some(action);
    frame.label = label;
    if let Some(left_value) = left {
        frame.from_enfix = true;
        frame.output = left_value;
    }

    let outcome = run_frame(state, &mut frame);
    state.stack.truncate(dsp_orig);
    state.leave();

    match outcome? {
        FrameResult::Value(v) => {
            *output = v;
            Ok(StepOutcome::Value)
        }
        FrameResult::Invisible => Ok(StepOutcome::Value),
        FrameResult::Thrown(t) => Ok(StepOutcome::Thrown(t)),
    }
}

fn run_frame(state: &mut EvalState, frame: &mut Frame) -> EvalResult<FrameResult> {
    match fulfill::fulfill(state, frame)? {
        fulfill::FulfillOutcome::Thrown(t) => return Ok(FrameResult::Thrown(t)),
        fulfill::FulfillOutcome::Done => {}
    }

    let mut value = match dispatch::dispatch(state, frame)? {
        dispatch::DispatchOutcome::Value(v) => v,
        dispatch::DispatchOutcome::Invisible => return Ok(FrameResult::Invisible),
        dispatch::DispatchOutcome::Thrown(t) => return Ok(FrameResult::Thrown(t)),
    };

    while let Some(pending) = frame.pending_deferred.take() {
        state.feed.flags_mut().remove(FeedFlags::DEFERRING_ENFIX);
        state.feed.fetch_next();
        match invoke_action(state, &mut value, pending.action, Some(value.clone()), pending.label)? {
            StepOutcome::Value => {}
            StepOutcome::Thrown(t) => return Ok(FrameResult::Thrown(t)),
            StepOutcome::Deferred(_) => {
                unreachable!("invoke_action resolves its own pending deferrals before returning")
            }
        }
    }

    Ok(FrameResult::Value(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionDescriptor, ActionFlags, DispatchSignal, Param, ParamClass};
    use crate::collaborators::{Bindings, NoopSignalSink, PathResolver};
    use crate::limits::EvalLimits;
    use crate::stack::DataStack;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct MapBindings(RefCell<HashMap<String, Cell>>);

    impl Bindings for MapBindings {
        fn get_variable(&self, word: &str, _specifier: &Specifier) -> EvalResult<Cell> {
            self.0
                .borrow()
                .get(word)
                .cloned()
                .ok_or_else(|| EvalError::new(ErrorKind::UnboundWord { word: word.to_string() }))
        }
        fn try_get_variable(&self, word: &str, _specifier: &Specifier) -> EvalResult<Option<Cell>> {
            Ok(self.0.borrow().get(word).cloned())
        }
        fn set_variable(&mut self, word: &str, _specifier: &Specifier, value: Cell) -> EvalResult<()> {
            self.0.borrow_mut().insert(word.to_string(), value);
            Ok(())
        }
        fn set_variable_poly(&mut self, target: &Cell, specifier: &Specifier, value: Cell) -> EvalResult<()> {
            if let Some(word) = target.as_word() {
                return self.set_variable(word.as_str(), specifier, value);
            }
            Err(EvalError::new(ErrorKind::Custom {
                message: "unsupported destructure target in test bindings".to_string(),
            }))
        }
    }

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
            Err(EvalError::new(ErrorKind::Custom {
                message: "path resolution not exercised in this test".to_string(),
            }))
        }
        fn reduce_to_stack(&self, _block: &[Cell], _specifier: &Specifier, _stack: &mut DataStack) -> EvalResult<()> {
            Ok(())
        }
    }

    fn add_action() -> Shared<ActionDescriptor> {
        ActionDescriptor::new(
            "add",
            vec![
                Param::new("a", ParamClass::Normal).with_typeset(vec![KindTag::Integer]),
                Param::new("b", ParamClass::Normal).with_typeset(vec![KindTag::Integer]),
            ],
            ActionFlags::NONE,
            Shared::new(|_state: &mut EvalState, frame: &mut Frame| {
                let a = match frame.varlist[0].kind() {
                    Kind::Integer(i, _) => *i,
                    _ => unreachable!(),
                };
                let b = match frame.varlist[1].kind() {
                    Kind::Integer(i, _) => *i,
                    _ => unreachable!(),
                };
                Ok(DispatchSignal::Value(Cell::integer(a + b)))
            }),
        )
    }

    fn harness(cells: Vec<Cell>, bindings: HashMap<String, Cell>) -> (Feed, DataStack, MapBindings, NullResolver, NoopSignalSink, EvalLimits) {
        (
            Feed::from_array(cells, Specifier::root()),
            DataStack::new(),
            MapBindings(RefCell::new(bindings)),
            NullResolver,
            NoopSignalSink,
            EvalLimits::new(),
        )
    }

    fn bind_action(bindings: &mut HashMap<String, Cell>, name: &str, action: Shared<ActionDescriptor>, enfixed: bool) {
        let mut cell = Cell::action(action);
        if enfixed {
            cell.flags_mut().insert(CellFlags::ENFIXED);
        }
        bindings.insert(name.to_string(), cell);
    }

    #[test]
    fn prefix_call_evaluates_normal_arguments() {
        let cells = vec![Cell::word("add"), Cell::integer(1), Cell::integer(2)];
        let mut bindings = HashMap::new();
        bindings.insert("add".to_string(), Cell::action(add_action()));
        let (mut feed, mut stack, mut bind, resolver, mut signals, limits) = harness(cells, bindings);
        let mut state = EvalState::new(&mut feed, &mut stack, &mut bind, &resolver, &mut signals, &limits);
        let result = eval_to_end(&mut state).expect("evaluation succeeds");
        assert!(matches!(result.kind(), Kind::Integer(3, _)));
    }

    #[test]
    fn enfix_lookahead_absorbs_following_operator() {
        let mut bindings = HashMap::new();
        bind_action(&mut bindings, "+", add_action(), true);
        let cells = vec![Cell::integer(1), Cell::word("+"), Cell::integer(2)];
        let (mut feed, mut stack, mut bind, resolver, mut signals, limits) =
            harness(cells, bindings);
        let mut state = EvalState::new(&mut feed, &mut stack, &mut bind, &resolver, &mut signals, &limits);
        let result = eval_to_end(&mut state).expect("evaluation succeeds");
        assert!(matches!(result.kind(), Kind::Integer(3, _)));
    }

    #[test]
    fn unbound_word_errors() {
        let cells = vec![Cell::word("missing")];
        let (mut feed, mut stack, mut bind, resolver, mut signals, limits) =
            harness(cells, HashMap::new());
        let mut state = EvalState::new(&mut feed, &mut stack, &mut bind, &resolver, &mut signals, &limits);
        let err = eval_to_end(&mut state).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnboundWord { .. }));
    }

    #[test]
    fn set_word_stores_and_yields_the_value() {
        let cells = vec![Cell::set_word("x"), Cell::integer(9)];
        let (mut feed, mut stack, mut bind, resolver, mut signals, limits) =
            harness(cells, HashMap::new());
        let mut state = EvalState::new(&mut feed, &mut stack, &mut bind, &resolver, &mut signals, &limits);
        let result = eval_to_end(&mut state).expect("evaluation succeeds");
        assert!(matches!(result.kind(), Kind::Integer(9, _)));
        assert!(matches!(
            state.bindings.get_variable("x", &Specifier::root()).unwrap().kind(),
            Kind::Integer(9, _)
        ));
    }

    #[test]
    fn empty_group_is_invisible_and_leaves_prior_output() {
        let cells = vec![Cell::integer(5), Cell::group(Vec::new())];
        let (mut feed, mut stack, mut bind, resolver, mut signals, limits) =
            harness(cells, HashMap::new());
        let mut state = EvalState::new(&mut feed, &mut stack, &mut bind, &resolver, &mut signals, &limits);
        let result = eval_to_end(&mut state).expect("evaluation succeeds");
        assert!(matches!(result.kind(), Kind::Integer(5, _)));
    }
}
