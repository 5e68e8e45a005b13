use graftwork::{Automaton, Config};
use graftwork_tests::{grammars, Recognizer};
use pretty_assertions::assert_eq;

const INPUTS: &[(&str, usize)] = &[
    ("1", 1),
    ("1+1*1", 1),
    ("(1+1)*(1-1)", 1),
    ("((1))/1", 1),
    ("1+", 0),
    ("(1))", 0),
];

#[test]
fn lazy_automaton_is_shared_between_threads() {
    let graph = grammars::arithmetic().unwrap();
    let lazy = Config::new().lazy().build(graph.clone(), "EXPR").unwrap();

    std::thread::scope(|scope| {
        for offset in 0..8 {
            let lazy = &lazy;
            scope.spawn(move || {
                let recognizer = Recognizer::new(lazy);
                for i in 0..INPUTS.len() {
                    let (input, expected) = INPUTS[(i + offset) % INPUTS.len()];
                    assert_eq!(recognizer.count_parses(input).unwrap(), expected, "{}", input);
                }
            });
        }
    });

    lazy.build_all().unwrap();
    let eager = Automaton::build(graph, "EXPR").unwrap();
    assert_eq!(eager.snapshot(), lazy.snapshot());
}

#[test]
fn build_all_races_with_queries() {
    let graph = grammars::left_recursive_ambiguity().unwrap();
    let lazy = Config::new().lazy().build(graph.clone(), "S").unwrap();

    std::thread::scope(|scope| {
        scope.spawn(|| lazy.build_all().unwrap());
        scope.spawn(|| {
            let recognizer = Recognizer::new(&lazy);
            assert_eq!(recognizer.count_parses("a").unwrap(), 2);
            assert_eq!(recognizer.count_parses("acada").unwrap(), 0);
        });
    });

    let eager = Automaton::build(graph, "S").unwrap();
    assert_eq!(eager.snapshot(), lazy.snapshot());
}
