//! Dotted positions inside rule alternatives.

use crate::{
    grammar::{EmbeddedRule, ListRule, RuleGraph, RuleID, RuleItems, RuleKind},
    util::display_fn,
};
use std::fmt;

/// A `(rule, option, position)` triple.
///
/// For list rules the option selects between the item loop
/// ([`RulePosition::OPTION_LIST_ITEM`]) and the empty alternative of lists
/// allowing zero items ([`RulePosition::OPTION_LIST_EMPTY`]).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RulePosition {
    pub rule: RuleID,
    pub option: u16,
    pub position: u16,
}

impl RulePosition {
    pub const START: u16 = 0;
    pub const END: u16 = u16::MAX;

    pub const OPTION_LIST_ITEM: u16 = 0;
    pub const OPTION_LIST_EMPTY: u16 = 1;

    pub const POSITION_MULTI_ITEM: u16 = 1;
    pub const POSITION_SLIST_SEPARATOR: u16 = 1;
    pub const POSITION_SLIST_ITEM: u16 = 2;

    pub const fn new(rule: RuleID, option: u16, position: u16) -> Self {
        Self {
            rule,
            option,
            position,
        }
    }

    /// The position of a completed terminal or embedded rule.
    pub const fn leaf(rule: RuleID) -> Self {
        Self::new(rule, 0, Self::END)
    }

    pub const fn is_at_start(&self) -> bool {
        self.position == Self::START
    }

    pub const fn is_at_end(&self) -> bool {
        self.position == Self::END
    }

    pub const fn is_goal(&self) -> bool {
        self.rule.into_raw() == RuleID::GOAL.into_raw()
    }

    const fn with_position(self, position: u16) -> Self {
        Self { position, ..self }
    }
}

impl fmt::Debug for RulePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_at_end() {
            write!(f, "({:?},{},END)", self.rule, self.option)
        } else {
            write!(f, "({:?},{},{})", self.rule, self.option, self.position)
        }
    }
}

/// How a rule behaves when it appears as an item.
#[derive(Debug, Clone, Copy)]
pub enum RuleClass<'g> {
    Goal,
    Terminal { is_empty: bool },
    Embedded(&'g EmbeddedRule),
    NonTerminal(&'g RuleItems),
}

impl RuleClass<'_> {
    /// Terminals and embedded rules are not descended into by closures.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Terminal { .. } | Self::Embedded(..))
    }
}

/// A rule graph seen from one goal rule: the graph plus the synthetic goal wrapper.
#[derive(Debug, Clone, Copy)]
pub struct GrammarView<'g> {
    pub graph: &'g RuleGraph,
    pub goal: RuleID,
}

impl<'g> GrammarView<'g> {
    pub fn new(graph: &'g RuleGraph, goal: RuleID) -> Self {
        Self { graph, goal }
    }

    pub fn class(&self, rule: RuleID) -> RuleClass<'g> {
        if rule == RuleID::GOAL {
            return RuleClass::Goal;
        }
        match self.graph.rule(rule).kind() {
            RuleKind::Terminal(terminal) => RuleClass::Terminal {
                is_empty: terminal.is_empty,
            },
            RuleKind::Embedded(embedded) => RuleClass::Embedded(embedded),
            RuleKind::NonTerminal(items) => RuleClass::NonTerminal(items),
        }
    }

    /// Start positions of every option of a non-terminal.
    pub fn start_positions(&self, rule: RuleID) -> Vec<RulePosition> {
        match self.class(rule) {
            RuleClass::Goal => vec![RulePosition::new(RuleID::GOAL, 0, RulePosition::START)],
            RuleClass::Terminal { .. } | RuleClass::Embedded(..) => vec![],
            RuleClass::NonTerminal(items) => match items {
                RuleItems::Empty | RuleItems::Concatenation(..) => {
                    vec![RulePosition::new(rule, 0, RulePosition::START)]
                }
                RuleItems::Choice(alternatives) => (0..alternatives.len())
                    .map(|option| RulePosition::new(rule, option as u16, RulePosition::START))
                    .collect(),
                RuleItems::List(list) => {
                    let mut positions = vec![RulePosition::new(
                        rule,
                        RulePosition::OPTION_LIST_ITEM,
                        RulePosition::START,
                    )];
                    if list.min() == 0 {
                        positions.push(RulePosition::new(
                            rule,
                            RulePosition::OPTION_LIST_EMPTY,
                            RulePosition::START,
                        ));
                    }
                    positions
                }
            },
        }
    }

    /// The item directly after the dot, or `None` at the end of the rule.
    pub fn item(&self, rp: RulePosition) -> Option<RuleID> {
        if rp.is_at_end() {
            return None;
        }
        let position = usize::from(rp.position);
        match self.class(rp.rule) {
            RuleClass::Goal => (position == 0).then_some(self.goal),
            RuleClass::Terminal { .. } | RuleClass::Embedded(..) => None,
            RuleClass::NonTerminal(items) => match items {
                RuleItems::Empty => (position == 0).then_some(RuleID::EMPTY),
                RuleItems::Concatenation(items) => items.get(position).copied(),
                RuleItems::Choice(alternatives) => alternatives
                    .get(usize::from(rp.option))
                    .and_then(|items| items.get(position).copied()),
                RuleItems::List(_) if rp.option == RulePosition::OPTION_LIST_EMPTY => {
                    (position == 0).then_some(RuleID::EMPTY)
                }
                RuleItems::List(ListRule::Multi { item, .. }) => {
                    (rp.position <= RulePosition::POSITION_MULTI_ITEM).then_some(*item)
                }
                RuleItems::List(ListRule::Separated {
                    item, separator, ..
                }) => match rp.position {
                    RulePosition::START | RulePosition::POSITION_SLIST_ITEM => Some(*item),
                    RulePosition::POSITION_SLIST_SEPARATOR => Some(*separator),
                    _ => None,
                },
            },
        }
    }

    /// Positions reachable by consuming the item after the dot.
    ///
    /// List items loop back onto themselves, so this returns a set.
    pub fn next(&self, rp: RulePosition) -> Vec<RulePosition> {
        if rp.is_at_end() {
            return vec![];
        }
        let end = rp.with_position(RulePosition::END);
        let sequence = |len: usize| {
            let following = usize::from(rp.position) + 1;
            if following < len {
                vec![rp.with_position(following as u16)]
            } else {
                vec![end]
            }
        };
        match self.class(rp.rule) {
            RuleClass::Goal => vec![end],
            RuleClass::Terminal { .. } | RuleClass::Embedded(..) => vec![],
            RuleClass::NonTerminal(items) => match items {
                RuleItems::Empty => vec![end],
                RuleItems::Concatenation(items) => sequence(items.len()),
                RuleItems::Choice(alternatives) => alternatives
                    .get(usize::from(rp.option))
                    .map_or_else(Vec::new, |items| sequence(items.len())),
                RuleItems::List(_) if rp.option == RulePosition::OPTION_LIST_EMPTY => vec![end],
                RuleItems::List(ListRule::Multi { max, .. }) => {
                    let mut next = vec![];
                    if *max != Some(1) {
                        next.push(rp.with_position(RulePosition::POSITION_MULTI_ITEM));
                    }
                    next.push(end);
                    next
                }
                RuleItems::List(ListRule::Separated { max, .. }) => match rp.position {
                    RulePosition::POSITION_SLIST_SEPARATOR => {
                        vec![rp.with_position(RulePosition::POSITION_SLIST_ITEM)]
                    }
                    _ => {
                        let mut next = vec![];
                        if *max != Some(1) {
                            next.push(rp.with_position(RulePosition::POSITION_SLIST_SEPARATOR));
                        }
                        next.push(end);
                        next
                    }
                },
            },
        }
    }

    /// Items consumed before reaching the dot, as far as they tell positions apart.
    pub fn consumed_items(&self, rp: RulePosition) -> Vec<RuleID> {
        match self.class(rp.rule) {
            RuleClass::Goal => {
                if rp.is_at_end() {
                    vec![self.goal]
                } else {
                    vec![]
                }
            }
            RuleClass::Terminal { .. } | RuleClass::Embedded(..) => vec![rp.rule],
            RuleClass::NonTerminal(items) => {
                let prefix = |items: &[RuleID]| {
                    let len = if rp.is_at_end() {
                        items.len()
                    } else {
                        usize::from(rp.position).min(items.len())
                    };
                    items[..len].to_vec()
                };
                match items {
                    RuleItems::Empty => {
                        if rp.is_at_end() {
                            vec![RuleID::EMPTY]
                        } else {
                            vec![]
                        }
                    }
                    RuleItems::Concatenation(items) => prefix(items.as_slice()),
                    RuleItems::Choice(alternatives) => alternatives
                        .get(usize::from(rp.option))
                        .map_or_else(Vec::new, |items| prefix(items.as_slice())),
                    RuleItems::List(_) if rp.option == RulePosition::OPTION_LIST_EMPTY => {
                        if rp.is_at_end() {
                            vec![RuleID::EMPTY]
                        } else {
                            vec![]
                        }
                    }
                    RuleItems::List(ListRule::Multi { item, .. }) => {
                        if rp.is_at_start() {
                            vec![]
                        } else {
                            vec![*item]
                        }
                    }
                    RuleItems::List(ListRule::Separated {
                        item, separator, ..
                    }) => match rp.position {
                        RulePosition::START => vec![],
                        RulePosition::POSITION_SLIST_ITEM => vec![*item, *separator],
                        _ => vec![*item],
                    },
                }
            }
        }
    }

    /// The list rule a position belongs to, if any.
    pub fn list_rule(&self, rp: RulePosition) -> Option<&'g ListRule> {
        match self.class(rp.rule) {
            RuleClass::NonTerminal(RuleItems::List(list)) => Some(list),
            _ => None,
        }
    }

    pub fn rule_name(&self, rule: RuleID) -> impl fmt::Display + 'g {
        let graph = self.graph;
        display_fn(move |f| match rule {
            RuleID::GOAL => f.write_str("<goal>"),
            RuleID::END_OF_TEXT => f.write_str("<eot>"),
            RuleID::USE_PARENT_LOOKAHEAD => f.write_str("<up>"),
            RuleID::ANY => f.write_str("<any>"),
            rule => match graph.get(rule) {
                Some(rule) => fmt::Display::fmt(rule, f),
                None => write!(f, "{:?}", rule),
            },
        })
    }

    pub fn display_position(&self, rp: RulePosition) -> impl fmt::Display + 'g {
        let name = self.rule_name(rp.rule);
        display_fn(move |f| {
            if rp.is_at_end() {
                write!(f, "{}[{}]@END", name, rp.option)
            } else {
                write!(f, "{}[{}]@{}", name, rp.option, rp.position)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_graph() -> RuleGraph {
        RuleGraph::define(|g| {
            let a = g.literal("a")?;
            let comma = g.literal(",")?;
            let many = g.nonterminal("Many")?;
            let one = g.nonterminal("One")?;
            let sep = g.nonterminal("Sep")?;
            let opt = g.nonterminal("Opt")?;
            g.multi(many, a, 0, None)?;
            g.multi(one, a, 1, Some(1))?;
            g.separated_list(sep, a, comma, 1, None)?;
            g.optional(opt, a)?;
            Ok(())
        })
        .unwrap()
    }

    #[test]
    fn multi_next_loops_back() {
        let graph = list_graph();
        let many = graph.find("Many").unwrap();
        let view = GrammarView::new(&graph, many);

        let starts = view.start_positions(many);
        assert_eq!(
            starts,
            vec![
                RulePosition::new(many, RulePosition::OPTION_LIST_ITEM, 0),
                RulePosition::new(many, RulePosition::OPTION_LIST_EMPTY, 0),
            ]
        );
        assert_eq!(view.item(starts[1]), Some(RuleID::EMPTY));

        let item = RulePosition::new(many, 0, RulePosition::POSITION_MULTI_ITEM);
        let end = RulePosition::new(many, 0, RulePosition::END);
        assert_eq!(view.next(starts[0]), vec![item, end]);
        assert_eq!(view.next(item), vec![item, end]);
        assert_eq!(view.next(end), vec![]);
    }

    #[test]
    fn single_item_list_does_not_loop() {
        let graph = list_graph();
        let one = graph.find("One").unwrap();
        let view = GrammarView::new(&graph, one);

        let starts = view.start_positions(one);
        assert_eq!(starts.len(), 1);
        assert_eq!(view.next(starts[0]), vec![RulePosition::new(one, 0, RulePosition::END)]);
    }

    #[test]
    fn separated_list_alternates() {
        let graph = list_graph();
        let sep = graph.find("Sep").unwrap();
        let a = graph.find("'a'").unwrap();
        let comma = graph.find("','").unwrap();
        let view = GrammarView::new(&graph, sep);

        let start = RulePosition::new(sep, 0, RulePosition::START);
        let separator = RulePosition::new(sep, 0, RulePosition::POSITION_SLIST_SEPARATOR);
        let item = RulePosition::new(sep, 0, RulePosition::POSITION_SLIST_ITEM);
        let end = RulePosition::new(sep, 0, RulePosition::END);

        assert_eq!(view.item(start), Some(a));
        assert_eq!(view.item(separator), Some(comma));
        assert_eq!(view.item(item), Some(a));
        assert_eq!(view.next(start), vec![separator, end]);
        assert_eq!(view.next(separator), vec![item]);
        assert_eq!(view.next(item), vec![separator, end]);
        assert_eq!(view.consumed_items(item), vec![a, comma]);
    }

    #[test]
    fn goal_wraps_goal_rule() {
        let graph = list_graph();
        let opt = graph.find("Opt").unwrap();
        let view = GrammarView::new(&graph, opt);

        let start = view.start_positions(RuleID::GOAL);
        assert_eq!(start, vec![RulePosition::new(RuleID::GOAL, 0, 0)]);
        assert_eq!(view.item(start[0]), Some(opt));
        assert_eq!(view.next(start[0]), vec![RulePosition::new(RuleID::GOAL, 0, RulePosition::END)]);
        assert_eq!(view.display_position(start[0]).to_string(), "<goal>[0]@0");
    }
}
