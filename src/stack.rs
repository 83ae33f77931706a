//! The process-wide data stack: pending partial refinements, ordered
//! refinement names popped as fulfilled, and quote-level markers for
//! chain-style post-processing (`spec.md` §3, "Data Stack").
//!
//! Shared up the call chain and partitioned across frames by `dsp_orig`
//! (`spec.md` §5): each frame must restore the stack to its own base on
//! exit. Modeled after `rhai::Scope`'s flat `SmallVec`-backed storage
//! (`rhai/src/scope.rs`) rather than a plain `Vec`, since stack entries are
//! small and usually shallow.

use crate::value::Cell;
use smallvec::SmallVec;

/// One slot on the data stack.
#[derive(Debug, Clone)]
pub enum StackEntry {
    /// A pushed refinement name awaiting fulfillment, or already consumed
    /// and left as a pickup marker (`spec.md` §4.4 step 1).
    Refinement(crate::value::Spelling),
    /// An unchecked issue carrying a partial-refinement index, pushed by a
    /// specialization (`spec.md` §4.4 step 1).
    PartialIndex(crate::value::Spelling, usize),
    /// A chained action value, pushed during `SET-GROUP!`/chain completion
    /// (`spec.md` §4.5, "Chain completion").
    ChainAction(Cell),
    /// A quote-level marker interleaved with chain actions, carrying the
    /// accumulated quote count to requote the final result with.
    QuoteLevel(u32),
}

/// A LIFO scratch stack shared by every frame in the call chain.
#[derive(Debug, Default)]
pub struct DataStack {
    entries: SmallVec<[StackEntry; 16]>,
}

impl DataStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current depth — a frame's `dsp_orig` is this value at frame-push
    /// time.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn push(&mut self, entry: StackEntry) {
        self.entries.push(entry);
    }

    #[must_use]
    pub fn pop(&mut self) -> Option<StackEntry> {
        self.entries.pop()
    }

    #[must_use]
    pub fn top(&self) -> Option<&StackEntry> {
        self.entries.last()
    }

    /// Truncate back to a saved depth. Called on every frame exit, normal
    /// or abnormal (`spec.md` §4.6, §5 "Acquisition discipline").
    pub fn truncate(&mut self, depth: usize) {
        self.entries.truncate(depth);
    }

    /// Slice of entries above `base`, in push order — used to walk pending
    /// refinements during the pickups phase and chained actions during
    /// chain completion.
    #[must_use]
    pub fn above(&self, base: usize) -> &[StackEntry] {
        &self.entries[base..]
    }

    #[must_use]
    pub fn above_mut(&mut self, base: usize) -> &mut [StackEntry] {
        &mut self.entries[base..]
    }

    /// Find a pushed refinement by name above `base`, returning its
    /// absolute stack index. Used by `spec.md` §4.4 step 1's "search the
    /// pushed refinement stack for the parameter's name".
    #[must_use]
    pub fn find_refinement(&self, base: usize, name: &crate::value::Spelling) -> Option<usize> {
        self.entries[base..].iter().position(|e| match e {
            StackEntry::Refinement(n) => n == name,
            _ => false,
        }).map(|i| i + base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Spelling;

    #[test]
    fn truncate_restores_frame_base() {
        let mut stack = DataStack::new();
        let base = stack.depth();
        stack.push(StackEntry::Refinement(Spelling::new("a")));
        stack.push(StackEntry::Refinement(Spelling::new("b")));
        assert_eq!(stack.depth(), base + 2);
        stack.truncate(base);
        assert_eq!(stack.depth(), base);
    }

    #[test]
    fn find_refinement_scoped_above_base() {
        let mut stack = DataStack::new();
        stack.push(StackEntry::Refinement(Spelling::new("a")));
        let base = stack.depth();
        stack.push(StackEntry::Refinement(Spelling::new("b")));
        assert!(stack.find_refinement(base, &Spelling::new("a")).is_none());
        assert_eq!(stack.find_refinement(base, &Spelling::new("b")), Some(base));
    }
}
