//! The forward-only [`Feed`]: an abstraction over an array with an index or
//! an external variadic iterator (`spec.md` §4.1, §9 "Variadic").
//!
//! There is no lexer in this crate (source text lexing is an explicit
//! non-goal, `spec.md` §1): a [`Feed`] always iterates already-reified
//! [`Cell`]s. The lookback/peek shape is grounded on the teacher's
//! `TokenIterator` (`rhai/src/token.rs`), which likewise exposes a
//! single-token lookahead buffer over a character stream; here the same
//! idea is lifted one level, over cells instead of characters.

use crate::value::Cell;
use std::collections::VecDeque;

/// A binding-resolution context attached to a value or a feed (`spec.md`
/// §3, "Specifier"). Path resolution and variable lookup are external
/// collaborators (`spec.md` §6); the core only needs to carry this token
/// around and hand it back to them. Kept intentionally opaque: it is
/// whatever scope/context id the surrounding interpreter assigns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Specifier(pub Option<u32>);

impl Specifier {
    #[must_use]
    pub const fn root() -> Self {
        Self(None)
    }

    #[must_use]
    pub const fn of(id: u32) -> Self {
        Self(Some(id))
    }
}

/// Feed-level flags (`spec.md` §3, §4.2).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedFlags(u8);

impl FeedFlags {
    pub const NONE: Self = Self(0);
    /// Suppress post-switch enfix absorption for the argument currently
    /// being fulfilled (`spec.md` §4.2, "no-lookahead rule").
    pub const NO_LOOKAHEAD: Self = Self(1 << 0);
    /// An enfix action deferred lookback once at this site; a second
    /// deferral here is an ambiguity error (`spec.md` §4.2, "Deferral
    /// rule").
    pub const DEFERRING_ENFIX: Self = Self(1 << 1);
    /// A non-evaluating separator was consumed; argument fulfillment
    /// should treat this position as end-of-expression (`spec.md` §4.1).
    pub const BARRIER_HIT: Self = Self(1 << 2);

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

/// Where cells come from: a reified array with an index, or a lazily
/// pulled iterator (for variadic parameters, `spec.md` §4.4 step 6).
enum Source {
    Array { cells: Vec<Cell>, index: usize },
    Iter(Box<dyn Iterator<Item = Cell>>),
}

impl Source {
    fn take_next(&mut self) -> Cell {
        match self {
            Self::Array { cells, index } => {
                if *index < cells.len() {
                    let v = cells[*index].clone();
                    *index += 1;
                    v
                } else {
                    Cell::end()
                }
            }
            Self::Iter(it) => it.next().unwrap_or_else(Cell::end),
        }
    }
}

/// Forward-only iterator over source values with one-token lookback and a
/// cached variable-lookup slot (`spec.md` §3, §4.1).
///
/// Shared across nested frames that advance it; never rewound.
pub struct Feed {
    source: Source,
    current: Cell,
    /// Cells pulled from `source` ahead of `current` but not yet made
    /// current, for the pre-switch backward-quote check (`spec.md` §4.2
    /// step 2), which must see past `current` without consuming it.
    /// `forward[0]` is the cell immediately after `current`.
    forward: VecDeque<Cell>,
    lookback: Option<Cell>,
    /// `true` for exactly one `fetch_next` after the one that produced
    /// `lookback`; a second advance invalidates it, per `spec.md` §4.1.
    lookback_fresh: bool,
    gotten: Option<Cell>,
    specifier: Specifier,
    flags: FeedFlags,
}

impl Feed {
    /// Build a feed over a reified array of cells.
    #[must_use]
    pub fn from_array(cells: Vec<Cell>, specifier: Specifier) -> Self {
        let mut source = Source::Array { cells, index: 0 };
        let current = source.take_next();
        Self {
            source,
            current,
            forward: VecDeque::new(),
            lookback: None,
            lookback_fresh: false,
            gotten: None,
            specifier,
            flags: FeedFlags::NONE,
        }
    }

    /// Build a feed over a synthetic (variadic) iterator of cells.
    #[must_use]
    pub fn from_iter(iter: impl Iterator<Item = Cell> + 'static, specifier: Specifier) -> Self {
        let mut source = Source::Iter(Box::new(iter));
        let current = source.take_next();
        Self {
            source,
            current,
            forward: VecDeque::new(),
            lookback: None,
            lookback_fresh: false,
            gotten: None,
            specifier,
            flags: FeedFlags::NONE,
        }
    }

    /// An already-exhausted feed (used to build empty variadics, `spec.md`
    /// §4.4 step 5).
    #[must_use]
    pub fn empty() -> Self {
        Self::from_array(Vec::new(), Specifier::root())
    }

    /// Current value. Never past end; end is the `Cell::end()` sentinel
    /// kind.
    #[must_use]
    pub fn peek(&self) -> &Cell {
        &self.current
    }

    #[must_use]
    pub fn is_at_end(&self) -> bool {
        self.current.is_end()
    }

    #[must_use]
    pub fn specifier(&self) -> &Specifier {
        &self.specifier
    }

    pub fn set_specifier(&mut self, specifier: Specifier) {
        self.specifier = specifier;
    }

    #[must_use]
    pub fn flags(&self) -> FeedFlags {
        self.flags
    }

    pub fn flags_mut(&mut self) -> &mut FeedFlags {
        &mut self.flags
    }

    /// Advance one position; returns the old current as a "lookback" cell,
    /// guaranteed stable until the *next* `fetch_next` (`spec.md` §4.1).
    pub fn fetch_next(&mut self) -> Cell {
        let next = self.forward.pop_front().unwrap_or_else(|| self.source.take_next());
        let old_current = std::mem::replace(&mut self.current, next);
        self.lookback = Some(old_current.clone());
        self.lookback_fresh = true;
        self.invalidate_cache();
        old_current
    }

    /// Peek `n` cells past `current` without consuming anything (`n == 0`
    /// is the cell immediately following `current`), pulling from `source`
    /// and buffering as needed (`spec.md` §4.2 step 2, "backward-quote
    /// priority resolution", which must know what follows `current` before
    /// deciding whether to evaluate it at all).
    pub fn peek_ahead(&mut self, n: usize) -> &Cell {
        while self.forward.len() <= n {
            let cell = self.source.take_next();
            self.forward.push_back(cell);
        }
        &self.forward[n]
    }

    /// The most recent lookback cell, if it is still fresh (one
    /// `fetch_next` since it was produced).
    #[must_use]
    pub fn lookback(&self) -> Option<&Cell> {
        if self.lookback_fresh {
            self.lookback.as_ref()
        } else {
            None
        }
    }

    /// Cached variable-lookup result for the current word, if any.
    #[must_use]
    pub fn gotten(&self) -> Option<&Cell> {
        self.gotten.as_ref()
    }

    pub fn set_gotten(&mut self, value: Option<Cell>) {
        self.gotten = value;
    }

    /// Clear the cached variable lookup. Must be called after any
    /// operation that can mutate bindings or storage (`spec.md` §4.1); we
    /// also call it internally on every `fetch_next` since advancing moves
    /// to a different current word.
    pub fn invalidate_cache(&mut self) {
        self.gotten = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_then_fetch_advances_monotonically() {
        let mut feed = Feed::from_array(
            vec![Cell::integer(1), Cell::integer(2), Cell::integer(3)],
            Specifier::root(),
        );
        assert_eq!(feed.peek().kind_tag(), crate::value::KindTag::Integer);
        let first = feed.fetch_next();
        assert!(matches!(first.kind(), crate::value::Kind::Integer(1, _)));
        assert!(matches!(feed.peek().kind(), crate::value::Kind::Integer(2, _)));
    }

    #[test]
    fn lookback_invalidates_after_second_fetch() {
        let mut feed = Feed::from_array(
            vec![Cell::integer(1), Cell::integer(2), Cell::integer(3)],
            Specifier::root(),
        );
        feed.fetch_next();
        assert!(feed.lookback().is_some());
        feed.fetch_next();
        // lookback is refreshed each fetch, so it's still "fresh" but now
        // points at the second element.
        assert!(matches!(feed.lookback().unwrap().kind(), crate::value::Kind::Integer(2, _)));
    }

    #[test]
    fn peek_ahead_does_not_disturb_current_or_order() {
        let mut feed = Feed::from_array(
            vec![Cell::integer(1), Cell::integer(2), Cell::integer(3)],
            Specifier::root(),
        );
        assert!(matches!(feed.peek_ahead(1).kind(), crate::value::Kind::Integer(3, _)));
        assert!(matches!(feed.peek().kind(), crate::value::Kind::Integer(1, _)));
        assert!(matches!(feed.fetch_next().kind(), crate::value::Kind::Integer(1, _)));
        assert!(matches!(feed.peek().kind(), crate::value::Kind::Integer(2, _)));
        assert!(matches!(feed.fetch_next().kind(), crate::value::Kind::Integer(2, _)));
        assert!(matches!(feed.peek().kind(), crate::value::Kind::Integer(3, _)));
    }

    #[test]
    fn exhausted_feed_reports_end() {
        let mut feed = Feed::from_array(vec![Cell::integer(1)], Specifier::root());
        feed.fetch_next();
        assert!(feed.is_at_end());
    }
}
