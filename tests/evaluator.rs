//! End-to-end evaluator behavior, built from hand-constructed `Cell` trees
//! since this crate has no lexer (`spec.md` §1). Mirrors `spec.md` §8's
//! concrete scenarios and named laws.

use ren_core::{
    install_intrinsics, ActionDescriptor, ActionFlags, Cell, DataStack, DispatchSignal,
    EvalLimits, EvalState, Feed, Kind, KindTag, NoopSignalSink, Param, ParamClass, PathOutcome,
    PathResolver, Scope, Specifier,
};

struct NullResolver;

impl PathResolver for NullResolver {
    fn path_evaluate(
        &self,
        _array: &[Cell],
        _specifier: &Specifier,
        _setval: Option<&Cell>,
        _push_refines: bool,
        _stack: &mut DataStack,
    ) -> ren_core::EvalResult<PathOutcome> {
        unimplemented!("no path syntax appears in these cell trees")
    }

    fn reduce_to_stack(
        &self,
        _block: &[Cell],
        _specifier: &Specifier,
        _stack: &mut DataStack,
    ) -> ren_core::EvalResult<()> {
        unimplemented!("no get-block! appears in these cell trees")
    }
}

fn run(cells: Vec<Cell>, scope: &mut Scope) -> Cell {
    let mut feed = Feed::from_array(cells, Specifier::root());
    let mut stack = DataStack::new();
    let resolver = NullResolver;
    let mut signals = NoopSignalSink;
    let limits = EvalLimits::default();
    let mut state = EvalState::new(&mut feed, &mut stack, scope, &resolver, &mut signals, &limits);
    ren_core::eval_to_end(&mut state).expect("evaluation succeeds")
}

fn int(cell: &Cell) -> i64 {
    match cell.kind() {
        Kind::Integer(i, _) => *i,
        other => panic!("expected integer, got {other:?}"),
    }
}

#[test]
fn scenario_1_enfix_left_to_right() {
    let mut scope = Scope::new();
    install_intrinsics(&mut scope);
    let result = run(
        vec![
            Cell::integer(1),
            Cell::word("+"),
            Cell::integer(2),
            Cell::word("*"),
            Cell::integer(3),
        ],
        &mut scope,
    );
    assert_eq!(int(&result), 9);
}

#[test]
fn scenario_2_comment_is_transparent() {
    let mut scope = Scope::new();
    install_intrinsics(&mut scope);
    let result = run(
        vec![
            Cell::word("comment"),
            Cell::issue("x"),
            Cell::integer(1),
            Cell::word("+"),
            Cell::integer(2),
        ],
        &mut scope,
    );
    assert_eq!(int(&result), 3);
}

#[test]
fn scenario_3_barrier_separates_expressions() {
    let mut scope = Scope::new();
    install_intrinsics(&mut scope);
    let result = run(
        vec![
            Cell::integer(1),
            Cell::word("+"),
            Cell::integer(2),
            Cell::word("|"),
            Cell::integer(10),
        ],
        &mut scope,
    );
    assert_eq!(int(&result), 10);
}

#[test]
fn scenario_4_set_word_then_do_rebinds_and_reads_back() {
    let mut scope = Scope::new();
    install_intrinsics(&mut scope);
    let result = run(
        vec![
            Cell::set_word("x"),
            Cell::integer(10),
            Cell::word("do"),
            Cell::block(vec![
                Cell::set_word("x"),
                Cell::integer(20),
                Cell::word("x"),
            ]),
        ],
        &mut scope,
    );
    assert_eq!(int(&result), 20);
    assert_eq!(int(scope.get("x").expect("x bound")), 20);
}

#[test]
fn scenario_5_if_true_else_takes_then_branch() {
    let mut scope = Scope::new();
    install_intrinsics(&mut scope);
    let result = run(
        vec![
            Cell::word("if"),
            Cell::logic(true),
            Cell::block(vec![Cell::integer(1)]),
            Cell::word("else"),
            Cell::block(vec![Cell::integer(2)]),
        ],
        &mut scope,
    );
    assert_eq!(int(&result), 1);
}

#[test]
fn scenario_5_if_false_else_takes_else_branch() {
    let mut scope = Scope::new();
    install_intrinsics(&mut scope);
    let result = run(
        vec![
            Cell::word("if"),
            Cell::logic(false),
            Cell::block(vec![Cell::integer(1)]),
            Cell::word("else"),
            Cell::block(vec![Cell::integer(2)]),
        ],
        &mut scope,
    );
    assert_eq!(int(&result), 2);
}

#[test]
fn scenario_6_lit_yields_the_unevaluated_group() {
    let mut scope = Scope::new();
    install_intrinsics(&mut scope);
    let result = run(
        vec![
            Cell::word("lit"),
            Cell::group(vec![Cell::integer(1), Cell::word("+"), Cell::integer(2)]),
        ],
        &mut scope,
    );
    assert_eq!(result.kind_tag(), KindTag::Group);
    assert!(result.flags().is_unevaluated());
}

#[test]
fn then_defers_until_its_left_hand_if_completes() {
    // `if true [1] then [99]` — `then` is enfix and deferred, so it only
    // absorbs `if`'s whole result, not just the condition.
    let mut scope = Scope::new();
    install_intrinsics(&mut scope);
    let result = run(
        vec![
            Cell::word("if"),
            Cell::logic(true),
            Cell::block(vec![Cell::integer(1)]),
            Cell::word("then"),
            Cell::block(vec![Cell::integer(99)]),
        ],
        &mut scope,
    );
    assert_eq!(int(&result), 99);
}

#[test]
fn then_passes_null_through_when_if_fails() {
    let mut scope = Scope::new();
    install_intrinsics(&mut scope);
    let result = run(
        vec![
            Cell::word("if"),
            Cell::logic(false),
            Cell::block(vec![Cell::integer(1)]),
            Cell::word("then"),
            Cell::block(vec![Cell::integer(99)]),
        ],
        &mut scope,
    );
    assert!(result.is_null());
}

#[test]
fn quote_is_literal_regardless_of_evaluability() {
    let mut scope = Scope::new();
    install_intrinsics(&mut scope);
    // `quote` followed by a word that is bound to an action: an ordinary
    // evaluation of `+` here would error (naked enfix word), but `quote`
    // must see it as a literal regardless.
    let result = run(vec![Cell::word("quote"), Cell::word("+")], &mut scope);
    assert_eq!(result.as_word().expect("quoted word").as_str(), "+");
}

/// An enfixed hard-quote action: `x grab 999` must steal `x` literally,
/// the same law `quote_is_literal_regardless_of_evaluability` checks for a
/// *prefix* hard-quote, but here the stealing happens before the main
/// switch ever dispatches `x` at all.
#[test]
fn enfixed_hard_quote_steals_the_left_word_unevaluated() {
    let mut scope = Scope::new();
    install_intrinsics(&mut scope);
    scope.push("x", Cell::integer(5));

    let grab = ActionDescriptor::new(
        "grab",
        vec![
            Param::new("left", ParamClass::HardQuote),
            Param::new("extra", ParamClass::Normal),
        ],
        ActionFlags::NONE,
        std::rc::Rc::new(|_state: &mut EvalState, frame: &mut ren_core::Frame| {
            Ok(DispatchSignal::Value(frame.varlist[0].clone()))
        }),
    );
    let mut cell = Cell::action(grab);
    cell.flags_mut().insert(ren_core::CellFlags::ENFIXED);
    scope.push("grab", cell);

    let result = run(vec![Cell::word("x"), Cell::word("grab"), Cell::integer(999)], &mut scope);
    assert_eq!(result.as_word().expect("left arg stolen literally").as_str(), "x");
}

#[test]
fn unbound_word_errors() {
    let mut scope = Scope::new();
    install_intrinsics(&mut scope);
    let mut feed = Feed::from_array(vec![Cell::word("nope")], Specifier::root());
    let mut stack = DataStack::new();
    let resolver = NullResolver;
    let mut signals = NoopSignalSink;
    let limits = EvalLimits::default();
    let mut state = EvalState::new(&mut feed, &mut stack, &mut scope, &resolver, &mut signals, &limits);
    assert!(ren_core::eval_to_end(&mut state).is_err());
}
