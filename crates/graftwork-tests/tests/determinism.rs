use graftwork::{Automaton, Config};
use graftwork_tests::{grammars, Recognizer};
use pretty_assertions::assert_eq;

#[test]
fn lazy_build_all_matches_eager() {
    for (name, graph, goal) in grammars::all().unwrap() {
        let eager = Automaton::build(graph.clone(), goal).unwrap();
        let lazy = Config::new().lazy().build(graph, goal).unwrap();
        lazy.build_all().unwrap();
        assert_eq!(eager.snapshot(), lazy.snapshot(), "{}", name);
    }
}

#[test]
fn build_cache_does_not_change_the_automaton() {
    for (name, graph, goal) in grammars::all().unwrap() {
        let cached = Automaton::build(graph.clone(), goal).unwrap();
        let uncached = Config::new()
            .use_build_cache(false)
            .build(graph, goal)
            .unwrap();
        assert_eq!(cached.snapshot(), uncached.snapshot(), "{}", name);
    }
}

#[test]
fn queries_before_build_all_do_not_change_the_result() {
    let graph = grammars::ambiguous_sum().unwrap();
    let eager = Automaton::build(graph.clone(), "E").unwrap();

    let lazy = Config::new().lazy().build(graph, "E").unwrap();
    assert!(lazy.snapshot().len() < eager.snapshot().len());
    assert_eq!(Recognizer::new(&lazy).count_parses("n+n+n").unwrap(), 2);
    lazy.build_all().unwrap();

    assert_eq!(eager.snapshot(), lazy.snapshot());
}

#[test]
fn rebuilding_is_deterministic() {
    for (name, graph, goal) in grammars::all().unwrap() {
        let first = Automaton::build(graph.clone(), goal).unwrap();
        let second = Automaton::build(graph, goal).unwrap();
        assert_eq!(first.to_string(), second.to_string(), "{}", name);
    }
}
