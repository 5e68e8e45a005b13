use criterion::{criterion_group, criterion_main, Criterion};
use graftwork::{Automaton, Config, RuleGraph};
use graftwork_tests::{grammars, Recognizer};
use std::{hint::black_box, sync::Arc};

criterion_main!(benches);
criterion_group!(benches, bench_build, bench_build_uncached, bench_recognize);

fn bench_build(c: &mut Criterion) {
    for (name, graph, goal) in grammars::all().unwrap() {
        bench_automaton_build(c, name, graph, goal, Config::new());
    }
}

fn bench_build_uncached(c: &mut Criterion) {
    let mut config = Config::new();
    config.use_build_cache(false);
    bench_automaton_build(
        c,
        "arithmetic (uncached)",
        grammars::arithmetic().unwrap(),
        "EXPR",
        config,
    );
}

fn bench_recognize(c: &mut Criterion) {
    let automaton = Automaton::build(grammars::ambiguous_sum().unwrap(), "E").unwrap();
    c.bench_function("recognize ambiguous_sum", |b| {
        b.iter(|| {
            let recognizer = Recognizer::new(&automaton);
            black_box(recognizer.count_parses("n+n+n+n+n").unwrap());
        });
    });
}

fn bench_automaton_build(
    c: &mut Criterion,
    name: &str,
    graph: Arc<RuleGraph>,
    goal: &str,
    config: Config,
) {
    c.bench_function(name, |b| {
        b.iter(|| {
            let _automaton = black_box(config.build(graph.clone(), goal).unwrap());
        });
    });
}
