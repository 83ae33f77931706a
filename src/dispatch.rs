//! The Dispatcher Bridge: invokes an action's dispatcher once fulfillment
//! has completed, interprets the returned [`DispatchSignal`], runs chain
//! completion, and applies requote (`spec.md` §4.5).

use crate::action::DispatchSignal;
use crate::error::{ErrorKind, EvalError, Thrown, ThrowLabel};
use crate::frame::{Frame, FrameFlags};
use crate::stack::StackEntry;
use crate::value::Cell;
use crate::EvalResult;

/// What dispatch, chain completion, and requote together produced.
pub enum DispatchOutcome {
    Value(Cell),
    /// The action is invisible; the caller must leave its own output cell
    /// untouched rather than overwrite it with this call's (non-)result.
    Invisible,
    Thrown(Thrown),
}

/// Run `frame.phase`'s dispatcher against the now-fulfilled `frame`.
///
/// `unwind` and `redo` are recognized by *label identity* only, not by a
/// frame pointer: this crate has no `prior`-chain to test "bound to this
/// very frame" against (see DESIGN.md), so every `dispatch` call catches its
/// own immediate `unwind`/`redo` unconditionally. A `ThrowLabel::Named`
/// throw always propagates untouched, preserving catch-by-identity for the
/// one case that matters without the chain.
pub fn dispatch(state: &mut crate::state::EvalState, frame: &mut Frame) -> EvalResult<DispatchOutcome> {
    if frame.flags.contains(FrameFlags::FULFILL_ONLY) {
        return Ok(DispatchOutcome::Value(Cell::null()));
    }
    let phase = frame
        .phase
        .clone()
        .expect("dispatch requires an installed phase");

    let value = loop {
        let signal = (phase.dispatcher)(state, frame)?;
        match signal {
            DispatchSignal::Value(v) => break v,
            DispatchSignal::Null => break Cell::null(),
            DispatchSignal::Invisible => return Ok(DispatchOutcome::Invisible),
            DispatchSignal::Thrown(t) => match t.label {
                ThrowLabel::Unwind => {
                    tracing::trace!("unwind caught by its own dispatch call");
                    break t.payload;
                }
                ThrowLabel::Redo => {
                    tracing::trace!(action = %frame.phase.as_ref().map(|p| p.name.as_str()).unwrap_or(""), "redo: restarting fulfillment");
                    frame.param_cursor = 0;
                    frame.arg_cursor = 0;
                    match crate::fulfill::fulfill(state, frame)? {
                        crate::fulfill::FulfillOutcome::Done => continue,
                        crate::fulfill::FulfillOutcome::Thrown(t2) => {
                            return Ok(DispatchOutcome::Thrown(t2))
                        }
                    }
                }
                ThrowLabel::Named(_) => return Ok(DispatchOutcome::Thrown(t)),
            },
            DispatchSignal::Redo { checked } => {
                if checked {
                    frame.param_cursor = 0;
                    frame.arg_cursor = 0;
                    match crate::fulfill::fulfill(state, frame)? {
                        crate::fulfill::FulfillOutcome::Done => {}
                        crate::fulfill::FulfillOutcome::Thrown(t2) => {
                            return Ok(DispatchOutcome::Thrown(t2))
                        }
                    }
                }
                continue;
            }
        }
    };

    let value = match chain_complete(state, frame, value)? {
        DispatchOutcome::Value(v) => v,
        other => return Ok(other),
    };

    Ok(DispatchOutcome::Value(requote(&phase, value, frame.quote_requote)))
}

/// While the data stack above `frame.dsp_orig` holds chained action values
/// (pushed by `SET-GROUP!` dispatch), pop and run each in turn, each
/// consuming the previous result as its first (enfix-style) argument.
/// Integer quote-level markers interleaved on the stack accumulate onto
/// `frame.quote_requote` (`spec.md` §4.5, "Chain completion").
fn chain_complete(
    state: &mut crate::state::EvalState,
    frame: &mut Frame,
    mut value: Cell,
) -> EvalResult<DispatchOutcome> {
    loop {
        match state.stack.above(frame.dsp_orig).last() {
            Some(StackEntry::ChainAction(_) | StackEntry::QuoteLevel(_)) => {}
            _ => return Ok(DispatchOutcome::Value(value)),
        }
        match state.stack.pop().expect("checked non-empty above") {
            StackEntry::QuoteLevel(levels) => {
                frame.quote_requote += levels;
            }
            StackEntry::ChainAction(action_cell) => {
                let action = action_cell.as_action().cloned().ok_or_else(|| {
                    EvalError::new(ErrorKind::Custom {
                        message: "chained stack value is not an action".to_string(),
                    })
                })?;
                match crate::eval::invoke_action(state, &mut value, action, Some(value.clone()), None)? {
                    crate::eval::StepOutcome::Value => {}
                    crate::eval::StepOutcome::Thrown(t) => return Ok(DispatchOutcome::Thrown(t)),
                    crate::eval::StepOutcome::Deferred(_) => {
                        unreachable!("invoke_action never defers; only eval_step's own lookahead does")
                    }
                }
            }
            StackEntry::Refinement(_) | StackEntry::PartialIndex(..) => unreachable!(),
        }
    }
}

fn requote(phase: &crate::Shared<crate::action::ActionDescriptor>, value: Cell, levels: u32) -> Cell {
    use crate::action::ActionFlags;
    if !phase.flags.contains(ActionFlags::REQUOTE) {
        return value;
    }
    if value.is_null() && !phase.flags.contains(ActionFlags::REQUOTE_NULL) {
        return value;
    }
    if levels == 0 {
        value
    } else {
        value.requote(levels)
    }
}
