//! Enfix Lookahead: the predicates the Evaluator Loop consults to decide
//! whether a following word names an enfixed action, and whether that
//! action should be absorbed immediately, deferred, stolen backward, or
//! left alone (`spec.md` §4.2).
//!
//! Grounded on how `rhai::Engine` separates "is the next token an operator"
//! lexer lookahead (`rhai/src/parse.rs`, `token.rs`) from the parse
//! decision itself; here the question is answered against bound values
//! rather than a fixed operator table, since any word can be bound to an
//! enfixed action.

use crate::action::{ActionDescriptor, ParamClass, ParamFlags};
use crate::feed::FeedFlags;
use crate::state::EvalState;
use crate::value::{Cell, KindTag, Spelling};
use crate::Shared;

/// If the feed's current cell is a word bound to an `ENFIXED` action,
/// return that action's descriptor without consuming anything.
#[must_use]
pub fn pending_enfix(state: &EvalState) -> Option<Shared<ActionDescriptor>> {
    if let Some(cached) = state.feed.gotten() {
        return enfixed_action(cached);
    }
    let word = state.feed.peek().as_word()?.as_str();
    let looked = state
        .bindings
        .try_get_variable(word, state.feed.specifier())
        .ok()
        .flatten()?;
    enfixed_action(&looked)
}

fn enfixed_action(cell: &Cell) -> Option<Shared<ActionDescriptor>> {
    if cell.flags().is_enfixed() {
        cell.as_action().cloned()
    } else {
        None
    }
}

/// Whether post-switch lookahead runs at all at this site: suppressed by a
/// barrier having just been hit (`spec.md` §4.1, §4.2). The sibling
/// `NO_LOOKAHEAD` suppression (the no-lookahead/tight-argument rule) is
/// carried as `eval_step`'s own `no_lookahead` parameter rather than a feed
/// flag this function reads, since it is consumed by the very next
/// argument fulfillment rather than persisting across a lookahead check.
#[must_use]
pub fn should_look_ahead(feed_flags: FeedFlags) -> bool {
    !feed_flags.contains(FeedFlags::BARRIER_HIT)
}

/// Whether encountering `action` at this site, while fulfilling another
/// action's argument, must be deferred to the parent frame rather than
/// absorbed immediately (`spec.md` §4.2, "Deferral rule").
#[must_use]
pub fn should_defer(action: &ActionDescriptor, fulfilling_arg: bool) -> bool {
    fulfilling_arg && action.defers_lookback()
}

/// The `<skip>`-able / postpone / no-lookahead exemptions from `spec.md`
/// §4.2 step 2 reduce, for post-switch lookahead, to one test: an action
/// that postpones never absorbs, granting the forward side an unconditional
/// exemption.
#[must_use]
pub fn postpones(action: &ActionDescriptor) -> bool {
    action.postpones()
}

/// Pre-switch backward-quote priority resolution (`spec.md` §4.2 step 2):
/// before the current cell is dispatched at all, check whether the word
/// that follows it names an enfixed, left-quoting (hard- or soft-quote)
/// action. If so, that action steals the current cell literally instead of
/// current ever being evaluated — unless one of five exceptions applies, in
/// which case ordinary forward dispatch of current proceeds instead.
///
/// Returns the stealing action and its binding word, if the steal applies.
#[must_use]
pub fn pending_backward_quote(
    state: &mut EvalState,
    no_lookahead: bool,
) -> Option<(Shared<ActionDescriptor>, Spelling)> {
    // Exception 1: current is itself a word bound to a forward-quoting
    // prefix action. Forward-quote beats enfix-quote.
    if let Some(current_word) = state.feed.peek().as_word() {
        if let Ok(Some(bound)) = state
            .bindings
            .try_get_variable(current_word.as_str(), state.feed.specifier())
        {
            if !bound.flags().is_enfixed() {
                if let Some(action) = bound.as_action() {
                    if matches!(
                        action.first_param_class(),
                        Some(ParamClass::HardQuote | ParamClass::SoftQuote)
                    ) {
                        return None;
                    }
                }
            }
        }
    }

    let next_word = state.feed.peek_ahead(0).as_word()?.clone();
    let bound = state
        .bindings
        .try_get_variable(next_word.as_str(), state.feed.specifier())
        .ok()
        .flatten()?;
    if !bound.flags().is_enfixed() {
        return None;
    }
    let action = bound.as_action()?.clone();
    let first = action.params.first()?;
    if !matches!(first.class, ParamClass::HardQuote | ParamClass::SoftQuote) {
        // An ordinary (non-quoting) enfix action never steals backward;
        // that's the post-switch absorption rule's job.
        return None;
    }

    // Exception 2: `<skip>`-able and current's kind fails the typeset.
    let current_tag = state.feed.peek().kind_tag();
    if first.flags.contains(ParamFlags::SKIPPABLE) && !first.accepts(current_tag) {
        return None;
    }

    // Exception 3: the action postpones, granting forward dispatch an
    // unconditional exemption.
    if action.postpones() {
        return None;
    }

    // Exception 4: no-lookahead is in force, unless current is itself a
    // set-word or set-path (those must still offer themselves up to a
    // quoting operator, e.g. `x: quote ...`-style constructs).
    let is_set_target = matches!(current_tag, KindTag::SetWord | KindTag::SetPath);
    if (no_lookahead || state.feed.flags().contains(FeedFlags::NO_LOOKAHEAD)) && !is_set_target {
        return None;
    }

    // Exception 5: end-of-input swap. If nothing follows the quoting word
    // and current is a word or path, the sides swap: current consumes the
    // quoting word as its own operand via ordinary dispatch instead of
    // being stolen by it.
    if state.feed.peek_ahead(1).is_end() && matches!(current_tag, KindTag::Word | KindTag::Path) {
        return None;
    }

    Some((action, next_word))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_lookahead_when_barrier_hit() {
        let mut flags = FeedFlags::NONE;
        assert!(should_look_ahead(flags));
        flags.insert(FeedFlags::BARRIER_HIT);
        assert!(!should_look_ahead(flags));
    }
}
