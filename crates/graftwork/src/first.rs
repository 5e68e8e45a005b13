//! Calculation of first set function.

use crate::{
    grammar::{ListRule, RuleID, RuleItems},
    lookahead::{LookaheadSetPart, TerminalSet},
    rule_position::{GrammarView, RuleClass, RulePosition},
    types::{Map, Set},
};

/// The terminals starting a derivation, and whether the derivation may be empty.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FirstOf {
    pub terminals: TerminalSet,
    pub reaches_end: bool,
}

impl FirstOf {
    /// Convert into a lookahead, substituting `if_reach_end` when the derivation may be empty.
    pub fn with_end(&self, if_reach_end: &LookaheadSetPart) -> LookaheadSetPart {
        let part = LookaheadSetPart::from_terminals(self.terminals.clone());
        if self.reaches_end {
            part.union(if_reach_end)
        } else {
            part
        }
    }

    pub fn union_with(&mut self, other: &Self) {
        self.terminals.union_with(&other.terminals);
        self.reaches_end |= other.reaches_end;
    }
}

#[derive(Debug)]
pub struct FirstSets {
    nulls: Set<RuleID>,
    first_sets: Map<RuleID, TerminalSet>,
}

impl FirstSets {
    /// Compute FIRST and nullability of every rule in `used_rules`.
    ///
    /// Embedded rules ask `embedded_nullable` whether their goal derives the
    /// empty string; their content is never inlined.
    pub fn new(
        view: &GrammarView<'_>,
        used_rules: &[RuleID],
        embedded_nullable: impl Fn(RuleID) -> bool,
    ) -> Self {
        let nulls = nulls_set(view, used_rules, &embedded_nullable);
        let first_sets = first_set(view, used_rules, &nulls);
        Self { nulls, first_sets }
    }

    pub fn is_nullable(&self, rule: RuleID) -> bool {
        self.nulls.contains(&rule)
    }

    /// `First(rule)`, ignoring empty derivations.
    pub fn first_of_rule(&self, rule: RuleID) -> TerminalSet {
        self.first_sets.get(&rule).cloned().unwrap_or_default()
    }

    /// FIRST of the remainder of a rule, starting with the item at `rp`.
    ///
    /// Nullable items are skipped by walking `next()`; `reaches_end` reports
    /// whether the walk ran off the end of the rule.
    pub fn first_of(&self, view: &GrammarView<'_>, rp: RulePosition) -> FirstOf {
        let mut result = FirstOf::default();
        let mut visited = Set::default();
        let mut pending = vec![rp];
        visited.insert(rp);
        while let Some(rp) = pending.pop() {
            let Some(item) = view.item(rp) else {
                result.reaches_end = true;
                continue;
            };
            match view.class(item) {
                RuleClass::Terminal { is_empty: true } => {}
                RuleClass::Terminal { .. } | RuleClass::Embedded(..) => {
                    result.terminals.insert(item);
                }
                RuleClass::Goal | RuleClass::NonTerminal(..) => {
                    if let Some(first) = self.first_sets.get(&item) {
                        result.terminals.union_with(first);
                    }
                }
            }
            if self.is_nullable(item) {
                for next in view.next(rp) {
                    if visited.insert(next) {
                        pending.push(next);
                    }
                }
            }
        }
        result
    }
}

/// The item sequences whose prefixes contribute to FIRST of a rule.
fn option_sequences(view: &GrammarView<'_>, rule: RuleID) -> Vec<Vec<RuleID>> {
    match view.class(rule) {
        RuleClass::Goal => vec![vec![view.goal]],
        RuleClass::Terminal { .. } | RuleClass::Embedded(..) => vec![],
        RuleClass::NonTerminal(items) => match items {
            RuleItems::Empty => vec![vec![RuleID::EMPTY]],
            RuleItems::Concatenation(items) => vec![items.clone()],
            RuleItems::Choice(alternatives) => alternatives.clone(),
            RuleItems::List(list) => {
                let mut sequences = match list {
                    ListRule::Multi { item, .. } => vec![vec![*item]],
                    // a nullable item is followed by a separator
                    ListRule::Separated {
                        item, separator, ..
                    } => vec![vec![*item, *separator]],
                };
                if list.min() == 0 {
                    sequences.push(vec![RuleID::EMPTY]);
                }
                sequences
            }
        },
    }
}

/// Calculate the set of nullable rules.
fn nulls_set(
    view: &GrammarView<'_>,
    used_rules: &[RuleID],
    embedded_nullable: &impl Fn(RuleID) -> bool,
) -> Set<RuleID> {
    let mut nulls: Set<RuleID> = used_rules
        .iter()
        .copied()
        .filter(|&rule| match view.class(rule) {
            RuleClass::Terminal { is_empty } => is_empty,
            RuleClass::Embedded(..) => embedded_nullable(rule),
            _ => false,
        })
        .collect();

    let nullable_options = |rule: RuleID| -> Vec<Vec<RuleID>> {
        match view.class(rule) {
            // one item, no separator
            RuleClass::NonTerminal(RuleItems::List(ListRule::Separated { item, min, .. })) => {
                let mut options = vec![vec![*item]];
                if *min == 0 {
                    options.push(vec![RuleID::EMPTY]);
                }
                options
            }
            _ => option_sequences(view, rule),
        }
    };

    let mut changed = true;
    while changed {
        changed = false;
        for &rule in used_rules {
            if nulls.contains(&rule) {
                continue;
            }
            let is_nullable = nullable_options(rule)
                .iter()
                .any(|items| items.iter().all(|item| nulls.contains(item)));
            if is_nullable {
                changed = true;
                nulls.insert(rule);
            }
        }
    }

    nulls
}

fn first_set(
    view: &GrammarView<'_>,
    used_rules: &[RuleID],
    nulls: &Set<RuleID>,
) -> Map<RuleID, TerminalSet> {
    let mut map: Map<RuleID, TerminalSet> = Map::default();

    for &rule in used_rules {
        let initial = match view.class(rule) {
            RuleClass::Terminal { is_empty: false } | RuleClass::Embedded(..) => {
                Some(rule).into_iter().collect()
            }
            _ => TerminalSet::default(),
        };
        map.insert(rule, initial);
    }

    // First(X) \supseteq First(Yi) for every prefix Y1 .. Yi of an option
    // of X where Y1 .. Y(i-1) are all nullable.
    #[derive(Debug)]
    struct Constraint {
        sup: RuleID,
        sub: RuleID,
    }
    let mut constraints = vec![];
    for &rule in used_rules {
        for items in option_sequences(view, rule) {
            for item in items {
                if item != rule {
                    constraints.push(Constraint {
                        sup: rule,
                        sub: item,
                    });
                }
                if !nulls.contains(&item) {
                    break;
                }
            }
        }
    }

    let mut changed = true;
    while changed {
        changed = false;

        for Constraint { sup, sub } in &constraints {
            let Some(subset) = map.get(sub).cloned() else {
                continue;
            };
            if let Some(superset) = map.get_mut(sup) {
                if !subset.is_subset(superset) {
                    superset.union_with(&subset);
                    changed = true;
                }
            }
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::RuleGraph;

    fn graph() -> RuleGraph {
        RuleGraph::define(|g| {
            let a = g.literal("a")?;
            let b = g.literal("b")?;
            let c = g.literal("c")?;
            let s = g.nonterminal("S")?;
            let opt_a = g.nonterminal("OptA")?;
            let bs = g.nonterminal("Bs")?;
            let e = g.nonterminal("E")?;
            g.concatenation(s, [opt_a, bs, c])?;
            g.optional(opt_a, a)?;
            g.multi(bs, b, 0, None)?;
            g.choice(e, [vec![e, a], vec![b]])?;
            Ok(())
        })
        .unwrap()
    }

    fn all_rules(graph: &RuleGraph) -> Vec<RuleID> {
        graph.rules().map(|r| r.id()).chain(Some(RuleID::GOAL)).collect()
    }

    #[test]
    fn nullable_rules() {
        let graph = graph();
        let s = graph.find("S").unwrap();
        let view = GrammarView::new(&graph, s);
        let first = FirstSets::new(&view, &all_rules(&graph), |_| false);

        assert!(first.is_nullable(RuleID::EMPTY));
        assert!(first.is_nullable(graph.find("OptA").unwrap()));
        assert!(first.is_nullable(graph.find("Bs").unwrap()));
        assert!(!first.is_nullable(s));
        assert!(!first.is_nullable(graph.find("E").unwrap()));
        assert!(!first.is_nullable(RuleID::GOAL));
    }

    #[test]
    fn first_skips_nullable_prefix() {
        let graph = graph();
        let s = graph.find("S").unwrap();
        let view = GrammarView::new(&graph, s);
        let first = FirstSets::new(&view, &all_rules(&graph), |_| false);

        let names = |set: TerminalSet| {
            set.iter()
                .map(|t| graph.rule(t).to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(first.first_of_rule(s)), ["'a'", "'b'", "'c'"]);
        assert_eq!(names(first.first_of_rule(RuleID::GOAL)), ["'a'", "'b'", "'c'"]);
        assert_eq!(names(first.first_of_rule(graph.find("E").unwrap())), ["'b'"]);

        let after_opt = first.first_of(&view, RulePosition::new(s, 0, 1));
        assert_eq!(names(after_opt.terminals.clone()), ["'b'", "'c'"]);
        assert!(!after_opt.reaches_end);
    }

    #[test]
    fn first_reaches_end_through_nullable_items() {
        let graph = graph();
        let bs = graph.find("Bs").unwrap();
        let view = GrammarView::new(&graph, bs);
        let first = FirstSets::new(&view, &all_rules(&graph), |_| false);

        let empty_option = RulePosition::new(bs, RulePosition::OPTION_LIST_EMPTY, 0);
        let result = first.first_of(&view, empty_option);
        assert!(result.terminals.is_empty());
        assert!(result.reaches_end);

        let fallback = LookaheadSetPart::end_of_text();
        assert_eq!(result.with_end(&fallback), fallback);
    }
}
