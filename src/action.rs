//! Callables: parameter lists, dispatcher function pointers, and
//! action-level flags (`spec.md` §3, "Action Descriptor").
//!
//! The dispatcher type is grounded on `rhai::fn_native::FnAny`
//! (`rhai/src/fn_native.rs`, `pub type FnAny = dyn Fn(NativeCallContext,
//! &mut FnCallArgs) -> RhaiResult`): a boxed `Fn` trait object rather than a
//! bare function pointer, so actions can close over native state the way
//! `rhai`'s registered functions do.

use crate::error::EvalError;
use crate::frame::Frame;
use crate::value::{Cell, KindTag, Spelling};
use crate::Shared;

/// How a parameter's argument is gathered. `spec.md` §1, "Mixed evaluation
/// disciplines per parameter".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamClass {
    /// Evaluated with full lookahead.
    Normal,
    /// Evaluated with lookahead suppressed (`spec.md` §4.2, "no-lookahead
    /// rule").
    Tight,
    /// Never evaluated; the literal next cell is taken (`spec.md` §4.4
    /// step 7).
    HardQuote,
    /// Literal unless the next cell is "quotably soft" (a group, get-word,
    /// or get-path), in which case it is evaluated (`spec.md` §4.4 steps 5
    /// and 7).
    SoftQuote,
    /// A refinement header parameter (`/name`), not itself an argument
    /// slot.
    Refinement,
    /// A pure local: initialized to null (or the `return` intrinsic for
    /// `ParamClass::Return`) and never fulfilled from the callsite
    /// (`spec.md` §4.4 step 2).
    Local,
    /// The implicit `return` local.
    Return,
}

/// Per-parameter modifier flags (`spec.md` §4.4).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamFlags(u8);

impl ParamFlags {
    pub const NONE: Self = Self(0);
    /// May capture the feed lazily rather than a single value (`spec.md`
    /// §4.4 step 6).
    pub const VARIADIC: Self = Self(1 << 0);
    /// `<skip>`: a hard-quote parameter that yields control instead of
    /// erroring when the candidate kind fails its typeset (`spec.md` §4.2
    /// lookahead exceptions, §4.4 step 7).
    pub const SKIPPABLE: Self = Self(1 << 1);
    /// `<end>`: may be fulfilled with an endish-null at end of feed
    /// instead of erroring (`spec.md` §4.4 step 7).
    pub const ENDABLE: Self = Self(1 << 2);
    /// `<blank>`: a blank argument here makes the whole call a no-op
    /// (`FULFILL_ONLY`) (`spec.md` §4.4 step 8).
    pub const BLANK_MARKED: Self = Self(1 << 3);
    /// `<dequote>`: strip and accumulate quote levels from this argument
    /// (`spec.md` §4.4 steps 4 and 8).
    pub const DEQUOTE_MARKED: Self = Self(1 << 4);

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for ParamFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One declared parameter (or refinement header) of an action.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: Spelling,
    pub class: ParamClass,
    pub flags: ParamFlags,
    /// Accepted kinds; empty means "accept anything evaluable".
    pub typeset: Vec<KindTag>,
}

impl Param {
    #[must_use]
    pub fn new(name: impl Into<Spelling>, class: ParamClass) -> Self {
        Self {
            name: name.into(),
            class,
            flags: ParamFlags::NONE,
            typeset: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: ParamFlags) -> Self {
        self.flags.insert(flags);
        self
    }

    #[must_use]
    pub fn with_typeset(mut self, typeset: Vec<KindTag>) -> Self {
        self.typeset = typeset;
        self
    }

    #[must_use]
    pub fn accepts(&self, tag: KindTag) -> bool {
        self.typeset.is_empty() || self.typeset.contains(&tag)
    }

    #[must_use]
    pub fn is_refinement(&self) -> bool {
        self.class == ParamClass::Refinement
    }

    #[must_use]
    pub fn is_pure_local(&self) -> bool {
        matches!(self.class, ParamClass::Local | ParamClass::Return)
    }
}

/// Action-level flags governing dispatch and lookahead (`spec.md` §4.2,
/// §4.5).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionFlags(u8);

impl ActionFlags {
    pub const NONE: Self = Self(0);
    /// This enfix action defers lookback (`then`, `else`): deferred once
    /// per argument slot when encountered mid-fulfillment (`spec.md`
    /// §4.2).
    pub const DEFERS_LOOKBACK: Self = Self(1 << 0);
    /// This enfix action postpones entirely, granting lookahead an
    /// exemption (`spec.md` §4.2).
    pub const POSTPONES: Self = Self(1 << 1);
    /// Invisible: does not write the output cell (`spec.md` §4.5, §1).
    pub const INVISIBLE: Self = Self(1 << 2);
    /// `<requote>`: wrap a non-null result in the accumulated quote levels
    /// (`spec.md` §4.5).
    pub const REQUOTE: Self = Self(1 << 3);
    /// Requote even when the result is null.
    pub const REQUOTE_NULL: Self = Self(1 << 4);
    /// `<dequote>`: this action's quoted-typed parameters strip and
    /// accumulate quote levels (`spec.md` §4.4 step 4).
    pub const DEQUOTE: Self = Self(1 << 5);

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

/// The signal a dispatcher returns, interpreted by the Dispatcher Bridge
/// (`spec.md` §4.5).
pub enum DispatchSignal {
    /// Ordinary result value.
    Value(Cell),
    /// Result is null.
    Null,
    /// The dispatcher threw.
    Thrown(crate::error::Thrown),
    /// Restart dispatch. `checked` resets the parameter cursor; unchecked
    /// keeps current args.
    Redo { checked: bool },
    /// The action is invisible and did not write output.
    Invisible,
}

/// A native or interpreted action body. Boxed `Fn` trait object, mirroring
/// `rhai::fn_native::FnAny`. Takes the evaluator state alongside the frame —
/// the way `rhai::fn_native::NativeCallContext` gives a registered native
/// function a handle back into the engine — so an intrinsic like `if` can
/// recursively `do` a block argument rather than being limited to its own
/// varlist.
pub type Dispatcher = Shared<
    dyn Fn(&mut crate::state::EvalState, &mut Frame) -> Result<DispatchSignal, Box<EvalError>>,
>;

/// A callable's parameter list, dispatcher, and action-level flags
/// (`spec.md` §3).
pub struct ActionDescriptor {
    pub name: Spelling,
    pub params: Vec<Param>,
    pub dispatcher: Dispatcher,
    pub flags: ActionFlags,
}

impl std::fmt::Debug for ActionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("flags", &self.flags)
            .finish()
    }
}

impl ActionDescriptor {
    #[must_use]
    pub fn new(
        name: impl Into<Spelling>,
        params: Vec<Param>,
        flags: ActionFlags,
        dispatcher: Dispatcher,
    ) -> Shared<Self> {
        Shared::new(Self {
            name: name.into(),
            params,
            flags,
            dispatcher,
        })
    }

    #[must_use]
    pub fn is_enfix_capable(&self) -> bool {
        matches!(
            self.params.first().map(|p| p.class),
            Some(crate::action::ParamClass::Normal | ParamClass::Tight | ParamClass::HardQuote | ParamClass::SoftQuote)
        )
    }

    #[must_use]
    pub fn first_param_class(&self) -> Option<ParamClass> {
        self.params.first().map(|p| p.class)
    }

    #[must_use]
    pub fn defers_lookback(&self) -> bool {
        self.flags.contains(ActionFlags::DEFERS_LOOKBACK)
    }

    #[must_use]
    pub fn postpones(&self) -> bool {
        self.flags.contains(ActionFlags::POSTPONES)
    }

    #[must_use]
    pub fn is_invisible(&self) -> bool {
        self.flags.contains(ActionFlags::INVISIBLE)
    }
}
