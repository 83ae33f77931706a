//! The uniform value [`Cell`] and its header flags.
//!
//! Grounded on `rhai::Dynamic` (`rhai/src/dynamic.rs`): there, `Dynamic` is a
//! newtype around a `Union` enum whose variants each carry `(payload, Tag,
//! AccessMode)`, and `access_mode()`/`set_access_mode()` match over every
//! variant to reach the trailing mode field. [`Cell`] follows the same
//! shape: a newtype around [`Kind`], whose variants each carry `(..,
//! CellFlags)`, with [`Cell::flags`]/[`Cell::flags_mut`] doing the same
//! whole-enum match `rhai` does for `AccessMode`.

use crate::action::ActionDescriptor;
use crate::frame::FrameHandle;
use crate::Shared;
use std::fmt;

/// Header bits that ride alongside every [`Cell`], regardless of kind.
///
/// `OUT_MARKED_STALE` and `ARG_MARKED_CHECKED` are, per `spec.md` §3, *the
/// same physical bit* read in two different contexts (an output cell that
/// was not freshly written this step, or an argument cell that has already
/// passed its typeset check). We keep one underlying bit and expose both
/// names as accessors so call sites read as intent, not as bit-twiddling.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct CellFlags(u8);

impl CellFlags {
    pub const NONE: Self = Self(0);
    /// This value was placed here without evaluation.
    pub const UNEVALUATED: Self = Self(1 << 0);
    /// On an action cell retrieved from a binding: invoke with the
    /// left-hand argument taken from output.
    pub const ENFIXED: Self = Self(1 << 1);
    /// Dual-purpose bit; see the struct docs.
    pub const STALE_OR_CHECKED: Self = Self(1 << 2);
    /// The value carries a read-only taint that propagates through
    /// evaluation.
    pub const CONST: Self = Self(1 << 3);
    /// The cell is an externally reference-held API handle.
    pub const ROOT: Self = Self(1 << 4);

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

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Read `OUT_MARKED_STALE` — output was not freshly written this step.
    #[must_use]
    pub const fn is_stale(self) -> bool {
        self.contains(Self::STALE_OR_CHECKED)
    }

    /// Read `ARG_MARKED_CHECKED` — the same bit, read as "already
    /// typechecked" for an argument cell.
    #[must_use]
    pub const fn is_checked(self) -> bool {
        self.contains(Self::STALE_OR_CHECKED)
    }

    #[must_use]
    pub const fn is_unevaluated(self) -> bool {
        self.contains(Self::UNEVALUATED)
    }

    #[must_use]
    pub const fn is_enfixed(self) -> bool {
        self.contains(Self::ENFIXED)
    }

    #[must_use]
    pub const fn is_const(self) -> bool {
        self.contains(Self::CONST)
    }
}

impl fmt::Debug for CellFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        if self.contains(Self::UNEVALUATED) {
            list.entry(&"UNEVALUATED");
        }
        if self.contains(Self::ENFIXED) {
            list.entry(&"ENFIXED");
        }
        if self.contains(Self::STALE_OR_CHECKED) {
            list.entry(&"STALE_OR_CHECKED");
        }
        if self.contains(Self::CONST) {
            list.entry(&"CONST");
        }
        if self.contains(Self::ROOT) {
            list.entry(&"ROOT");
        }
        list.finish()
    }
}

/// An interned-ish word spelling. A thin immutable string, the way
/// `rhai::ImmutableString` (`rhai/src/immutable_string.rs`) wraps a shared
/// `SmartString` so that words can be cloned by reference count rather than
/// by copying bytes.
#[derive(Clone, Eq, Hash)]
pub struct Spelling(Shared<smartstring::SmartString<smartstring::LazyCompact>>);

impl Spelling {
    #[must_use]
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(Shared::new(smartstring::SmartString::from(s.as_ref())))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for Spelling {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl fmt::Debug for Spelling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for Spelling {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A shared, reified array of cells — the payload behind `path!`, `block!`,
/// `group!`, and their set-/get- counterparts.
pub type CellArray = Shared<Vec<Cell>>;

/// The kind-byte discriminant, independent of payload or flags. Used for
/// typeset membership checks during argument fulfillment (`spec.md` §4.4
/// step 8) and for `<skip>`-able hard-quote parameters (§4.4 step 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KindTag {
    End,
    Null,
    Void,
    Blank,
    Logic,
    Integer,
    Decimal,
    Word,
    SetWord,
    GetWord,
    Path,
    SetPath,
    GetPath,
    Group,
    Block,
    SetBlock,
    GetBlock,
    GetGroup,
    SetGroup,
    Issue,
    Action,
    Frame,
    Quoted,
}

impl KindTag {
    /// Kinds that never require evaluation: copied straight to output,
    /// marked `UNEVALUATED`. `spec.md` §4.3, last row of the dispatch
    /// table.
    #[must_use]
    pub const fn is_inert(self) -> bool {
        matches!(
            self,
            Self::Blank | Self::Logic | Self::Integer | Self::Decimal | Self::Block | Self::Issue
        )
    }
}

/// The payload-carrying union behind [`Cell`]. See the module docs for why
/// every variant ends in a [`CellFlags`].
#[derive(Clone, Debug)]
pub enum Kind {
    End(CellFlags),
    Null(CellFlags),
    Void(CellFlags),
    Blank(CellFlags),
    Logic(bool, CellFlags),
    Integer(i64, CellFlags),
    Decimal(f64, CellFlags),
    Word(Spelling, CellFlags),
    SetWord(Spelling, CellFlags),
    GetWord(Spelling, CellFlags),
    Path(CellArray, CellFlags),
    SetPath(CellArray, CellFlags),
    GetPath(CellArray, CellFlags),
    Group(CellArray, CellFlags),
    Block(CellArray, CellFlags),
    SetBlock(CellArray, CellFlags),
    GetBlock(CellArray, CellFlags),
    GetGroup(CellArray, CellFlags),
    SetGroup(CellArray, CellFlags),
    Issue(Spelling, CellFlags),
    Action(Shared<ActionDescriptor>, CellFlags),
    Frame(Shared<FrameHandle>, CellFlags),
    /// `depth` is the number of quote levels removed to reach `inner`. We
    /// always use this heap-escaped form; `spec.md` §9 notes the original
    /// also has a compact kind-byte encoding for low escape levels as a
    /// size optimization, which we do not replicate (see DESIGN.md).
    Quoted(Box<Cell>, u32, CellFlags),
}

/// A single runtime value: a kind byte plus header flags, four machine
/// words in the original (`spec.md` §3). See the module docs for the
/// `rhai::Dynamic` grounding.
#[derive(Clone, Debug)]
pub struct Cell(Kind);

impl Cell {
    #[must_use]
    pub const fn new(kind: Kind) -> Self {
        Self(kind)
    }

    #[must_use]
    pub fn end() -> Self {
        Self(Kind::End(CellFlags::NONE))
    }

    #[must_use]
    pub fn null() -> Self {
        Self(Kind::Null(CellFlags::NONE))
    }

    #[must_use]
    pub fn void() -> Self {
        Self(Kind::Void(CellFlags::NONE))
    }

    #[must_use]
    pub fn blank() -> Self {
        Self(Kind::Blank(CellFlags::NONE))
    }

    #[must_use]
    pub fn logic(b: bool) -> Self {
        Self(Kind::Logic(b, CellFlags::NONE))
    }

    #[must_use]
    pub fn integer(i: i64) -> Self {
        Self(Kind::Integer(i, CellFlags::NONE))
    }

    #[must_use]
    pub fn decimal(d: f64) -> Self {
        Self(Kind::Decimal(d, CellFlags::NONE))
    }

    #[must_use]
    pub fn word(s: impl Into<Spelling>) -> Self {
        Self(Kind::Word(s.into(), CellFlags::NONE))
    }

    #[must_use]
    pub fn set_word(s: impl Into<Spelling>) -> Self {
        Self(Kind::SetWord(s.into(), CellFlags::NONE))
    }

    #[must_use]
    pub fn get_word(s: impl Into<Spelling>) -> Self {
        Self(Kind::GetWord(s.into(), CellFlags::NONE))
    }

    #[must_use]
    pub fn block(items: Vec<Cell>) -> Self {
        Self(Kind::Block(Shared::new(items), CellFlags::NONE))
    }

    #[must_use]
    pub fn group(items: Vec<Cell>) -> Self {
        Self(Kind::Group(Shared::new(items), CellFlags::NONE))
    }

    #[must_use]
    pub fn path(items: Vec<Cell>) -> Self {
        Self(Kind::Path(Shared::new(items), CellFlags::NONE))
    }

    #[must_use]
    pub fn action(descriptor: Shared<ActionDescriptor>) -> Self {
        Self(Kind::Action(descriptor, CellFlags::NONE))
    }

    #[must_use]
    pub fn issue(s: impl Into<Spelling>) -> Self {
        Self(Kind::Issue(s.into(), CellFlags::NONE))
    }

    #[must_use]
    pub const fn kind(&self) -> &Kind {
        &self.0
    }

    #[must_use]
    pub fn kind_tag(&self) -> KindTag {
        match &self.0 {
            Kind::End(_) => KindTag::End,
            Kind::Null(_) => KindTag::Null,
            Kind::Void(_) => KindTag::Void,
            Kind::Blank(_) => KindTag::Blank,
            Kind::Logic(..) => KindTag::Logic,
            Kind::Integer(..) => KindTag::Integer,
            Kind::Decimal(..) => KindTag::Decimal,
            Kind::Word(..) => KindTag::Word,
            Kind::SetWord(..) => KindTag::SetWord,
            Kind::GetWord(..) => KindTag::GetWord,
            Kind::Path(..) => KindTag::Path,
            Kind::SetPath(..) => KindTag::SetPath,
            Kind::GetPath(..) => KindTag::GetPath,
            Kind::Group(..) => KindTag::Group,
            Kind::Block(..) => KindTag::Block,
            Kind::SetBlock(..) => KindTag::SetBlock,
            Kind::GetBlock(..) => KindTag::GetBlock,
            Kind::GetGroup(..) => KindTag::GetGroup,
            Kind::SetGroup(..) => KindTag::SetGroup,
            Kind::Issue(..) => KindTag::Issue,
            Kind::Action(..) => KindTag::Action,
            Kind::Frame(..) => KindTag::Frame,
            Kind::Quoted(..) => KindTag::Quoted,
        }
    }

    /// See `rhai::Dynamic::access_mode` (`dynamic.rs`) for the pattern this
    /// mirrors.
    #[must_use]
    pub fn flags(&self) -> CellFlags {
        match &self.0 {
            Kind::End(f)
            | Kind::Null(f)
            | Kind::Void(f)
            | Kind::Blank(f)
            | Kind::Logic(_, f)
            | Kind::Integer(_, f)
            | Kind::Decimal(_, f)
            | Kind::Word(_, f)
            | Kind::SetWord(_, f)
            | Kind::GetWord(_, f)
            | Kind::Path(_, f)
            | Kind::SetPath(_, f)
            | Kind::GetPath(_, f)
            | Kind::Group(_, f)
            | Kind::Block(_, f)
            | Kind::SetBlock(_, f)
            | Kind::GetBlock(_, f)
            | Kind::GetGroup(_, f)
            | Kind::SetGroup(_, f)
            | Kind::Issue(_, f)
            | Kind::Action(_, f)
            | Kind::Frame(_, f)
            | Kind::Quoted(_, _, f) => *f,
        }
    }

    pub fn flags_mut(&mut self) -> &mut CellFlags {
        match &mut self.0 {
            Kind::End(f)
            | Kind::Null(f)
            | Kind::Void(f)
            | Kind::Blank(f)
            | Kind::Logic(_, f)
            | Kind::Integer(_, f)
            | Kind::Decimal(_, f)
            | Kind::Word(_, f)
            | Kind::SetWord(_, f)
            | Kind::GetWord(_, f)
            | Kind::Path(_, f)
            | Kind::SetPath(_, f)
            | Kind::GetPath(_, f)
            | Kind::Group(_, f)
            | Kind::Block(_, f)
            | Kind::SetBlock(_, f)
            | Kind::GetBlock(_, f)
            | Kind::GetGroup(_, f)
            | Kind::SetGroup(_, f)
            | Kind::Issue(_, f)
            | Kind::Action(_, f)
            | Kind::Frame(_, f)
            | Kind::Quoted(_, _, f) => f,
        }
    }

    pub fn set_flags(&mut self, flags: CellFlags) -> &mut Self {
        *self.flags_mut() = flags;
        self
    }

    pub fn with_flags(mut self, flags: CellFlags) -> Self {
        self.flags_mut().insert(flags);
        self
    }

    #[must_use]
    pub fn is_end(&self) -> bool {
        self.kind_tag() == KindTag::End
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.kind_tag() == KindTag::Null
    }

    #[must_use]
    pub fn is_void(&self) -> bool {
        self.kind_tag() == KindTag::Void
    }

    #[must_use]
    pub fn is_action(&self) -> bool {
        self.kind_tag() == KindTag::Action
    }

    #[must_use]
    pub fn as_action(&self) -> Option<&Shared<ActionDescriptor>> {
        match &self.0 {
            Kind::Action(a, _) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_word(&self) -> Option<&Spelling> {
        match &self.0 {
            Kind::Word(s, _) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&CellArray> {
        match &self.0 {
            Kind::Path(a, _)
            | Kind::SetPath(a, _)
            | Kind::GetPath(a, _)
            | Kind::Group(a, _)
            | Kind::Block(a, _)
            | Kind::SetBlock(a, _)
            | Kind::GetBlock(a, _)
            | Kind::GetGroup(a, _)
            | Kind::SetGroup(a, _) => Some(a),
            _ => None,
        }
    }

    /// A value is "quotably soft" when it would trigger a sub-evaluation
    /// under a soft-quote parameter: a group, get-word, or get-path.
    /// `spec.md` §4.4 step 5 and step 7.
    #[must_use]
    pub fn is_quotably_soft(&self) -> bool {
        matches!(
            self.kind_tag(),
            KindTag::Group | KindTag::GetWord | KindTag::GetPath
        )
    }

    /// Wrap this cell in one additional quote level.
    #[must_use]
    pub fn quote(self) -> Self {
        let flags = self.flags();
        match self.0 {
            Kind::Quoted(inner, depth, _) => Self(Kind::Quoted(inner, depth + 1, flags)),
            other => Self(Kind::Quoted(Box::new(Self(other)), 1, flags)),
        }
    }

    /// Remove one quote level, if any. Used by the `quoted` arm of the main
    /// switch (`spec.md` §4.3) and by `<dequote>`-marked parameters
    /// (`spec.md` §4.4 step 4).
    #[must_use]
    pub fn dequote_one(self) -> Self {
        match self.0 {
            Kind::Quoted(inner, depth, flags) if depth > 1 => {
                Self(Kind::Quoted(inner, depth - 1, flags))
            }
            Kind::Quoted(inner, _, flags) => inner.with_flags(flags),
            other => Self(other),
        }
    }

    /// Wrap this cell in `levels` additional quote levels. Used by
    /// `<requote>` actions (`spec.md` §4.5).
    #[must_use]
    pub fn requote(mut self, levels: u32) -> Self {
        for _ in 0..levels {
            self = self.quote();
        }
        self
    }

    #[must_use]
    pub fn is_kind_inert(&self) -> bool {
        self.kind_tag().is_inert()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_and_checked_share_one_bit() {
        let mut c = Cell::integer(1);
        assert!(!c.flags().is_stale());
        c.flags_mut().insert(CellFlags::STALE_OR_CHECKED);
        assert!(c.flags().is_stale());
        assert!(c.flags().is_checked());
    }

    #[test]
    fn quote_then_dequote_round_trips() {
        let c = Cell::integer(42);
        let q = c.clone().quote().quote();
        assert_eq!(q.kind_tag(), KindTag::Quoted);
        let d1 = q.dequote_one();
        assert_eq!(d1.kind_tag(), KindTag::Quoted);
        let d0 = d1.dequote_one();
        assert_eq!(d0.kind_tag(), KindTag::Integer);
    }

    #[test]
    fn word_spelling_equality_is_by_value() {
        let a = Spelling::new("foo");
        let b = Spelling::new("foo");
        assert_eq!(a, b);
    }
}
