//! Per-invocation evaluator state (`spec.md` §3, "Frame", and §4.6
//! lifecycle).
//!
//! `spec.md` §9 notes the original links frames into a chain via a `prior`
//! pointer. This crate recurses through ordinary Rust function calls
//! instead — the call stack already is that chain — so there is no
//! explicit `prior` field (see DESIGN.md). What *is* carried explicitly is
//! everything `spec.md` says a frame owns: output/spare cells, the
//! parameter/argument cursors, the refinement and specialization cursors,
//! the data-stack base, the varlist, the current phase, an optional label,
//! the quote-requote counter, and frame flags.

use crate::action::ActionDescriptor;
use crate::value::{Cell, Spelling};
use crate::Shared;

/// The refinement cursor's three disjoint states (`spec.md` §3).
#[derive(Debug, Clone, Default)]
pub enum RefineCursor {
    /// Not filling a refinement's arguments.
    #[default]
    Ordinary,
    /// The refinement in question is not in use; remaining args are set to
    /// null/blank without consuming the feed.
    ArgToUnusedRefinement,
    /// The refinement is in use; holds the varlist index of the
    /// refinement's own argument cell, so a later null argument can revoke
    /// it (`spec.md` §4.4 step 8).
    Live(usize),
}

/// The specialization cursor's three modes (`spec.md` §3, "Specialization
/// (`special`)"). The invariant "`++special` always steps to a meaningful
/// entry" is maintained by [`crate::fulfill`] rather than by this type
/// itself.
#[derive(Debug, Clone, Default)]
pub enum SpecialCursor {
    /// Arguments come from the callsite; `special` walks the parameter
    /// list itself.
    #[default]
    Fulfillment,
    /// Typecheck-only mode; `special` walks the already-filled argument
    /// slots.
    TypecheckOnly,
    /// Partial specialization; `special` walks a third array of values.
    Partial { values: Shared<Vec<Cell>>, index: usize },
}

/// Frame-entry flags (`spec.md` §6). Most of the flags `spec.md` lists at
/// the frame-entry boundary (explicit-evaluate, to-end, push-path-refines,
/// no-lookahead, the three re-entry targets, const, error-on-deferred-enfix)
/// describe a re-entrant trampoline loop this crate doesn't have: recursion
/// through ordinary Rust calls stands in for re-entry (see DESIGN.md,
/// `Frame`'s module doc), so only the one flag an actual call site reads is
/// kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags(u16);

impl FrameFlags {
    pub const NONE: Self = Self(0);
    /// Build the frame but do not invoke the body (`spec.md` §4.4 step 8,
    /// a `<blank>`-marked argument short-circuits the whole call).
    pub const FULFILL_ONLY: Self = Self(1 << 0);

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for FrameFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A saved pointer to an enfix action whose lookback was deferred, to be
/// resumed once the parent's own argument fulfillment completes that slot
/// (`spec.md` §4.2, "Deferral rule"); drained by `run_frame`'s
/// `pending_deferred` loop rather than a re-entry flag (see DESIGN.md).
#[derive(Debug, Clone)]
pub struct PendingEnfix {
    pub action: Shared<ActionDescriptor>,
    pub label: Option<Spelling>,
}

/// A reified `frame!` value — a lightweight snapshot of an invocation's
/// identity, not the live, still-executing [`Frame`] itself.
#[derive(Debug, Clone)]
pub struct FrameHandle {
    pub label: Option<Spelling>,
    pub phase: Option<Shared<ActionDescriptor>>,
}

/// Per-invocation evaluator state. Pushed on entry, dropped on normal or
/// abnormal exit, at which point the data stack is truncated back to
/// `dsp_orig` (`spec.md` §4.6) — enforced here by [`Frame::drop_into`]
/// rather than by a `Drop` impl, since truncation needs a live `&mut
/// DataStack` that the frame does not itself own (see DESIGN.md).
pub struct Frame {
    /// The frame's output cell. Conceptually "external, stable storage" in
    /// the original (a borrowed pointer into caller-owned memory); here the
    /// frame owns it directly and the caller reads it back after the step
    /// completes, trading one indirection for simpler ownership.
    pub output: Cell,
    pub spare: Cell,
    pub varlist: Vec<Cell>,
    pub param_cursor: usize,
    pub arg_cursor: usize,
    pub special: SpecialCursor,
    pub refine: RefineCursor,
    pub dsp_orig: usize,
    pub phase: Option<Shared<ActionDescriptor>>,
    pub label: Option<Spelling>,
    pub quote_requote: u32,
    pub flags: FrameFlags,
    pub pending_deferred: Option<PendingEnfix>,
    /// This invocation was triggered by an `ENFIXED` action cell: its first
    /// argument-bearing parameter is fulfilled from `output`, not the feed
    /// (`spec.md` §4.4 step 5).
    pub from_enfix: bool,
    /// Whether the enfix left argument has already been consumed from
    /// `output` this call.
    pub enfix_consumed: bool,
    /// Whether an argument in the current `Live` refinement's span has
    /// already been stored as non-null. A null argument after that point is
    /// `RevokeOrder`, not a legitimate revoke (`spec.md` §4.4 step 8).
    pub refine_arg_seen_nonnull: bool,
}

impl Frame {
    #[must_use]
    pub fn new(dsp_orig: usize) -> Self {
        Self {
            output: Cell::end(),
            spare: Cell::end(),
            varlist: Vec::new(),
            param_cursor: 0,
            arg_cursor: 0,
            special: SpecialCursor::Fulfillment,
            refine: RefineCursor::Ordinary,
            dsp_orig,
            phase: None,
            label: None,
            quote_requote: 0,
            flags: FrameFlags::NONE,
            pending_deferred: None,
            from_enfix: false,
            enfix_consumed: false,
            refine_arg_seen_nonnull: false,
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: FrameFlags) -> Self {
        self.flags.insert(flags);
        self
    }

    /// Mark the output stale unless the current phase is invisible
    /// (`spec.md` §4.4 step 5, "After consumption, mark output stale
    /// unless action is invisible").
    pub fn mark_output_stale_unless_invisible(&mut self) {
        let invisible = self
            .phase
            .as_ref()
            .is_some_and(|p| p.is_invisible());
        if !invisible {
            self.output
                .flags_mut()
                .insert(crate::value::CellFlags::STALE_OR_CHECKED);
        }
    }

    /// Snapshot this frame's identity as a reified `frame!` value.
    #[must_use]
    pub fn as_handle(&self) -> FrameHandle {
        FrameHandle {
            label: self.label.clone(),
            phase: self.phase.clone(),
        }
    }
}
