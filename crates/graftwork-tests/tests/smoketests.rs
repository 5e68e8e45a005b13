use graftwork::Automaton;
use graftwork_tests::grammars;
use std::sync::Once;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[test]
fn smoketest_all_grammars() {
    init_tracing();
    for (name, graph, goal) in grammars::all().unwrap() {
        eprintln!("grammar {}:\n{}", name, graph);
        let automaton = Automaton::build(graph, goal).unwrap();
        eprintln!("automaton:\n---\n{}", automaton);

        for set in automaton.state_sets() {
            for state in set.states() {
                let at_end = state
                    .rule_positions()
                    .iter()
                    .filter(|rp| rp.is_at_end())
                    .count();
                assert!(
                    at_end == 0 || at_end == state.rule_positions().len(),
                    "{}: mixed state {:?}",
                    name,
                    state
                );
            }
        }
    }
}
