//! Cooperative resource bounds for the evaluator.
//!
//! `spec.md` §5 describes a "periodic signal check counter" that decrements
//! on each expression start and a per-frame nesting discipline, but never
//! gives these numbers a home. Grounded on `rhai::Engine`'s limit fields
//! (`rhai/src/engine_settings.rs`, e.g. `set_max_call_levels`,
//! `set_max_operations`): a small plain struct of `usize`/`u64` knobs with
//! `set_*` builder methods, not a config file format (lexing/parsing a
//! config source is as out of scope as lexing script source).

/// Evaluator-wide limits, owned by the embedding caller and threaded
/// through every frame push.
#[derive(Debug, Clone, Copy)]
pub struct EvalLimits {
    /// Maximum frame nesting depth before `ErrorKind::Custom` is raised as
    /// a stack-overflow guard.
    max_frame_depth: usize,
    /// How many expression steps between signal-hook invocations
    /// (`spec.md` §5, "a periodic signal check counter").
    signal_check_interval: u64,
    /// Maximum data-stack depth.
    max_stack_depth: usize,
}

impl Default for EvalLimits {
    fn default() -> Self {
        Self {
            max_frame_depth: 256,
            signal_check_interval: 4096,
            max_stack_depth: 65536,
        }
    }
}

impl EvalLimits {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_max_frame_depth(&mut self, depth: usize) -> &mut Self {
        self.max_frame_depth = depth;
        self
    }

    #[must_use]
    pub const fn max_frame_depth(&self) -> usize {
        self.max_frame_depth
    }

    pub fn set_signal_check_interval(&mut self, ticks: u64) -> &mut Self {
        self.signal_check_interval = ticks.max(1);
        self
    }

    #[must_use]
    pub const fn signal_check_interval(&self) -> u64 {
        self.signal_check_interval
    }

    pub fn set_max_stack_depth(&mut self, depth: usize) -> &mut Self {
        self.max_stack_depth = depth;
        self
    }

    #[must_use]
    pub const fn max_stack_depth(&self) -> usize {
        self.max_stack_depth
    }
}
