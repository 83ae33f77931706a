//! Process-wide evaluator state shared across the whole call chain.
//!
//! Grounded on `rhai::engine::EvalState` (`rhai/src/engine.rs`): there, one
//! struct bundles the operation counter, module count, and other run-wide
//! bookkeeping, and is threaded by `&mut` reference through every
//! `eval_expr`/`eval_stmt` call alongside `scope`, `mods`, and `lib` as
//! separate parameters. This crate follows the same threading style rather
//! than collapsing everything (including the [`Feed`] and [`DataStack`])
//! into one object: `spec.md` §2 names Feed and Data Stack as independent
//! components with their own sharing rules, so they stay distinct
//! parameters here, exactly as `rhai` keeps `scope` distinct from `state`.

use crate::collaborators::{Bindings, PathResolver, SignalSink};
use crate::feed::Feed;
use crate::limits::EvalLimits;
use crate::stack::DataStack;

/// Everything an `eval_step` call needs beyond the [`Frame`][crate::Frame]
/// itself: the shared feed and data stack, the collaborator trait objects,
/// resource limits, and the signal-check tick counter (`spec.md` §5, "a
/// periodic signal check counter decrements on each expression start").
pub struct EvalState<'a> {
    pub feed: &'a mut Feed,
    pub stack: &'a mut DataStack,
    pub bindings: &'a mut dyn Bindings,
    pub resolver: &'a dyn PathResolver,
    pub signals: &'a mut dyn SignalSink,
    pub limits: &'a EvalLimits,
    ticks_remaining: u64,
    depth: usize,
}

impl<'a> EvalState<'a> {
    #[must_use]
    pub fn new(
        feed: &'a mut Feed,
        stack: &'a mut DataStack,
        bindings: &'a mut dyn Bindings,
        resolver: &'a dyn PathResolver,
        signals: &'a mut dyn SignalSink,
        limits: &'a EvalLimits,
    ) -> Self {
        let ticks_remaining = limits.signal_check_interval();
        Self {
            feed,
            stack,
            bindings,
            resolver,
            signals,
            limits,
            ticks_remaining,
            depth: 0,
        }
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Enter a nested frame, failing if the configured maximum is
    /// exceeded.
    pub fn enter(&mut self) -> crate::EvalResult<()> {
        if self.depth >= self.limits.max_frame_depth() {
            tracing::debug!(depth = self.depth, "max frame nesting depth exceeded");
            return Err(crate::error::EvalError::new(crate::error::ErrorKind::Custom {
                message: "maximum frame nesting depth exceeded".to_string(),
            }));
        }
        self.depth += 1;
        Ok(())
    }

    /// Leave a nested frame. Paired with every [`Self::enter`], including
    /// on the error/throw unwind path (`spec.md` §5, "Acquisition
    /// discipline").
    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        tracing::trace!(depth = self.depth, "frame dropped");
    }

    /// Decrement the signal-check counter; when it reaches zero, invoke the
    /// signals hook and reload the counter (`spec.md` §5, §6).
    pub fn tick(&mut self) -> crate::EvalResult<()> {
        self.ticks_remaining = self.ticks_remaining.saturating_sub(1);
        if self.ticks_remaining == 0 {
            self.ticks_remaining = self.limits.signal_check_interval();
            tracing::trace!("signal check interval reached");
            self.signals.on_signal_check()?;
        }
        Ok(())
    }
}
