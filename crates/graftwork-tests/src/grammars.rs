//! Rule graphs shared by the integration tests and benchmarks.

use graftwork::{GrammarDefError, RuleGraph, RuleID};
use std::sync::Arc;

/// `S = 'a' | S1`, `S1 = 'a' 'b'?`
///
/// "a" has two parses, "ab" has one.
pub fn simple_choice() -> Result<Arc<RuleGraph>, GrammarDefError> {
    RuleGraph::define(|g| {
        let a = g.literal("a")?;
        let b = g.literal("b")?;
        let s = g.nonterminal("S")?;
        let s1 = g.nonterminal("S1")?;
        let b_opt = g.nonterminal("bOpt")?;
        g.choice(s, [vec![a], vec![s1]])?;
        g.concatenation(s1, [a, b_opt])?;
        g.optional(b_opt, b)
    })
    .map(Arc::new)
}

/// `S = ACS | ADS`, `ACS = 'a' | ACS 'c' 'a'`, `ADS = 'a' | ADS 'd' 'a'`
///
/// "a" has two parses sharing the terminal.
pub fn left_recursive_ambiguity() -> Result<Arc<RuleGraph>, GrammarDefError> {
    RuleGraph::define(|g| {
        let a = g.literal("a")?;
        let c = g.literal("c")?;
        let d = g.literal("d")?;
        let s = g.nonterminal("S")?;
        let acs = g.nonterminal("ACS")?;
        let ads = g.nonterminal("ADS")?;
        g.choice(s, [vec![acs], vec![ads]])?;
        g.choice(acs, [vec![a], vec![acs, c, a]])?;
        g.choice(ads, [vec![a], vec![ads, d, a]])
    })
    .map(Arc::new)
}

/// `E = E '+' E | 'n'`
pub fn ambiguous_sum() -> Result<Arc<RuleGraph>, GrammarDefError> {
    RuleGraph::define(|g| {
        let plus = g.literal("+")?;
        let n = g.literal("n")?;
        let e = g.nonterminal("E")?;
        g.choice(e, [vec![e, plus, e], vec![n]])
    })
    .map(Arc::new)
}

/// An unambiguous arithmetic grammar with parentheses.
pub fn arithmetic() -> Result<Arc<RuleGraph>, GrammarDefError> {
    RuleGraph::define(|g| {
        let lparen = g.literal("(")?;
        let rparen = g.literal(")")?;
        let plus = g.literal("+")?;
        let minus = g.literal("-")?;
        let star = g.literal("*")?;
        let slash = g.literal("/")?;
        let num = g.literal("1")?;

        let expr = g.nonterminal("EXPR")?;
        let factor = g.nonterminal("FACTOR")?;
        let term = g.nonterminal("TERM")?;

        g.choice(
            expr,
            [
                vec![expr, plus, factor],  // expr '+' factor
                vec![expr, minus, factor], // expr '-' factor
                vec![factor],
            ],
        )?;
        g.choice(
            factor,
            [
                vec![factor, star, term],  // factor '*' term
                vec![factor, slash, term], // factor '/' term
                vec![term],
            ],
        )?;
        g.choice(term, [vec![num], vec![lparen, expr, rparen]])
    })
    .map(Arc::new)
}

/// `Items = 'a'{1,3}`
pub fn bounded_multi() -> Result<Arc<RuleGraph>, GrammarDefError> {
    RuleGraph::define(|g| {
        let a = g.literal("a")?;
        let items = g.nonterminal("Items")?;
        g.multi(items, a, 1, Some(3))
    })
    .map(Arc::new)
}

/// `Csv = 'a' (',' 'a')*` holding two or three items.
pub fn bounded_separated() -> Result<Arc<RuleGraph>, GrammarDefError> {
    RuleGraph::define(|g| {
        let a = g.literal("a")?;
        let comma = g.literal(",")?;
        let csv = g.nonterminal("Csv")?;
        g.separated_list(csv, a, comma, 2, Some(3))
    })
    .map(Arc::new)
}

/// `S = A 'b'`, `A = 'a'?`
pub fn nullable_prefix() -> Result<Arc<RuleGraph>, GrammarDefError> {
    RuleGraph::define(|g| {
        let a = g.literal("a")?;
        let b = g.literal("b")?;
        let s = g.nonterminal("S")?;
        let a_opt = g.nonterminal("A")?;
        g.optional(a_opt, a)?;
        g.concatenation(s, [a_opt, b])
    })
    .map(Arc::new)
}

/// `L = L 'a' | <empty>`
pub fn empty_left_recursion() -> Result<Arc<RuleGraph>, GrammarDefError> {
    RuleGraph::define(|g| {
        let a = g.literal("a")?;
        let l = g.nonterminal("L")?;
        g.choice(l, [vec![l, a], vec![RuleID::EMPTY]])
    })
    .map(Arc::new)
}

/// `A = B 'a' | 'a'`, `B = A?`
///
/// The left recursion is hidden behind the nullable `B`.
pub fn hidden_left_recursion() -> Result<Arc<RuleGraph>, GrammarDefError> {
    RuleGraph::define(|g| {
        let a = g.literal("a")?;
        let rule_a = g.nonterminal("A")?;
        let rule_b = g.nonterminal("B")?;
        g.choice(rule_a, [vec![rule_b, a], vec![a]])?;
        g.optional(rule_b, rule_a)
    })
    .map(Arc::new)
}

/// `S = 'a' 'b'` with blanks skipped between tokens.
pub fn with_blanks() -> Result<Arc<RuleGraph>, GrammarDefError> {
    RuleGraph::define(|g| {
        let a = g.literal("a")?;
        let b = g.literal("b")?;
        let blank = g.literal(" ")?;
        let s = g.nonterminal("S")?;
        g.concatenation(s, [a, b])?;
        g.skip(blank)
    })
    .map(Arc::new)
}

/// `Inner = 'x' 'y'?`
pub fn inner() -> Result<Arc<RuleGraph>, GrammarDefError> {
    RuleGraph::define(|g| {
        let x = g.literal("x")?;
        let y = g.literal("y")?;
        let inner = g.nonterminal("Inner")?;
        let y_opt = g.nonterminal("yOpt")?;
        g.optional(y_opt, y)?;
        g.concatenation(inner, [x, y_opt])
    })
    .map(Arc::new)
}

/// `S = '<' E '>'` where `E` is parsed by the goal of [`inner`].
pub fn embedding() -> Result<Arc<RuleGraph>, GrammarDefError> {
    let inner = inner()?;
    RuleGraph::define(|g| {
        let open = g.literal("<")?;
        let close = g.literal(">")?;
        let e = g.embedded("E", inner, "Inner")?;
        let s = g.nonterminal("S")?;
        g.concatenation(s, [open, e, close])
    })
    .map(Arc::new)
}

/// `Opt = 'x'?`, embedded by `S = '<' E '>'`.
pub fn nullable_embedding() -> Result<Arc<RuleGraph>, GrammarDefError> {
    let inner = RuleGraph::define(|g| {
        let x = g.literal("x")?;
        let opt = g.nonterminal("Opt")?;
        g.optional(opt, x)
    })
    .map(Arc::new)?;
    RuleGraph::define(|g| {
        let open = g.literal("<")?;
        let close = g.literal(">")?;
        let e = g.embedded("E", inner, "Opt")?;
        let s = g.nonterminal("S")?;
        g.concatenation(s, [open, e, close])
    })
    .map(Arc::new)
}

/// Every grammar above with its goal rule.
pub fn all() -> Result<Vec<(&'static str, Arc<RuleGraph>, &'static str)>, GrammarDefError> {
    Ok(vec![
        ("simple_choice", simple_choice()?, "S"),
        ("left_recursive_ambiguity", left_recursive_ambiguity()?, "S"),
        ("ambiguous_sum", ambiguous_sum()?, "E"),
        ("arithmetic", arithmetic()?, "EXPR"),
        ("bounded_multi", bounded_multi()?, "Items"),
        ("bounded_separated", bounded_separated()?, "Csv"),
        ("nullable_prefix", nullable_prefix()?, "S"),
        ("empty_left_recursion", empty_left_recursion()?, "L"),
        ("hidden_left_recursion", hidden_left_recursion()?, "A"),
        ("with_blanks", with_blanks()?, "S"),
        ("embedding", embedding()?, "S"),
        ("nullable_embedding", nullable_embedding()?, "S"),
    ])
}
