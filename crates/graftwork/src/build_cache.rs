//! Memoization of closures and of the derived WIDTH / HEIGHT-GRAFT relations.

use crate::{
    closure::{ClosureGraph, ClosureGraphBuilder},
    first::{FirstOf, FirstSets},
    grammar::RuleID,
    lookahead::LookaheadSetPart,
    rule_position::{GrammarView, RulePosition},
    transition::{Action, RuntimeGuard},
    types::{Map, Set},
};
use std::sync::Arc;

/// The grammar-derived inputs shared by every cache computation of one state set.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'g> {
    pub view: GrammarView<'g>,
    pub first_sets: &'g FirstSets,
}

impl<'g> BuildContext<'g> {
    pub fn new(view: GrammarView<'g>, first_sets: &'g FirstSets) -> Self {
        Self { view, first_sets }
    }
}

/// FIRST of rule positions ignoring the end of rule; context free, so cached per position.
#[derive(Debug)]
pub struct FirstOfCache {
    enabled: bool,
    first_of: Map<RulePosition, FirstOf>,
    first_of_next: Map<RulePosition, FirstOf>,
}

impl FirstOfCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            first_of: Map::default(),
            first_of_next: Map::default(),
        }
    }

    pub fn first_of(&mut self, cx: &BuildContext<'_>, rp: RulePosition) -> FirstOf {
        if let Some(first) = self.first_of.get(&rp) {
            return first.clone();
        }
        let first = cx.first_sets.first_of(&cx.view, rp);
        if self.enabled {
            self.first_of.insert(rp, first.clone());
        }
        first
    }

    /// FIRST of everything after the item at `rp`.
    pub fn first_of_next(&mut self, cx: &BuildContext<'_>, rp: RulePosition) -> FirstOf {
        if let Some(first) = self.first_of_next.get(&rp) {
            return first.clone();
        }
        let mut first = FirstOf::default();
        for next in cx.view.next(rp) {
            first.union_with(&self.first_of(cx, next));
        }
        if self.enabled {
            self.first_of_next.insert(rp, first.clone());
        }
        first
    }
}

/// A terminal or embedded rule reachable by shifting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidthInfo {
    pub to: RulePosition,
    pub lookahead: LookaheadSetPart,
}

/// A parent reachable by reducing a completed rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeightGraftInfo {
    pub action: Action,
    /// The closure positions whose item was completed.
    pub parent: Vec<RulePosition>,
    /// The positions of the new (or grafted) parent node.
    pub parent_next: Vec<RulePosition>,
    pub lookahead: LookaheadSetPart,
    pub up: LookaheadSetPart,
    pub runtime_guard: RuntimeGuard,
}

/// Positions carrying equal keys behave identically and share one state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateMergeKey {
    pub is_at_end: bool,
    pub consumed: Vec<RuleID>,
    pub first: FirstOf,
    pub runtime_guard: RuntimeGuard,
}

impl StateMergeKey {
    pub fn new(cx: &BuildContext<'_>, first: &mut FirstOfCache, rp: RulePosition) -> Self {
        Self {
            is_at_end: rp.is_at_end(),
            consumed: cx.view.consumed_items(rp),
            first: if rp.is_at_end() {
                FirstOf::default()
            } else {
                first.first_of(cx, rp)
            },
            runtime_guard: RuntimeGuard::for_position(&cx.view, rp),
        }
    }
}

type HeightKey = (Vec<RulePosition>, Vec<RuleID>);

#[derive(Debug)]
pub struct BuildCache {
    enabled: bool,
    first: FirstOfCache,
    closures: Map<Vec<RulePosition>, Arc<ClosureGraph>>,
    width_into: Map<Vec<RulePosition>, Arc<[WidthInfo]>>,
    height_or_graft_into: Map<HeightKey, Arc<[HeightGraftInfo]>>,
}

impl BuildCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            first: FirstOfCache::new(enabled),
            closures: Map::default(),
            width_into: Map::default(),
            height_or_graft_into: Map::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn first(&mut self) -> &mut FirstOfCache {
        &mut self.first
    }

    /// The downward closure of a set of root positions.
    pub fn closure(&mut self, cx: &BuildContext<'_>, roots: &[RulePosition]) -> Arc<ClosureGraph> {
        if let Some(closure) = self.closures.get(roots) {
            return closure.clone();
        }
        let mut builder = ClosureGraphBuilder::new(cx);
        builder.add_roots(roots);
        let closure = Arc::new(builder.finish(&mut self.first));
        if self.enabled {
            self.closures.insert(roots.to_vec(), closure.clone());
        }
        closure
    }

    /// Terminal and embedded rules reachable by shifting from `from`, one entry per rule.
    pub fn width_into(&mut self, cx: &BuildContext<'_>, from: &[RulePosition]) -> Arc<[WidthInfo]> {
        if let Some(infos) = self.width_into.get(from) {
            return infos.clone();
        }

        let closure = self.closure(cx, from);
        let mut grouped: Map<RuleID, LookaheadSetPart> = Map::default();
        for (idx, node) in closure.nodes() {
            let rp = node.rule_position();
            let Some(item) = cx.view.item(rp) else {
                continue;
            };
            if !cx.view.class(item).is_leaf() {
                continue;
            }
            let lookahead = self.first.first_of_next(cx, rp).with_end(closure.follow(idx));
            grouped
                .entry(item)
                .or_insert_with(LookaheadSetPart::empty)
                .union_with(&lookahead);
        }
        grouped.sort_keys();

        let infos: Arc<[WidthInfo]> = grouped
            .into_iter()
            .map(|(rule, lookahead)| WidthInfo {
                to: RulePosition::leaf(rule),
                lookahead,
            })
            .collect();
        if self.enabled {
            self.width_into.insert(from.to_vec(), infos.clone());
        }
        infos
    }

    /// Parents reachable by reducing `completed` rules in the closure of `prev`.
    ///
    /// Entries are bucketed by action and by the lookahead carried upward;
    /// within a bucket the next positions are split into states by
    /// [`StateMergeKey`].
    pub fn height_or_graft_into(
        &mut self,
        cx: &BuildContext<'_>,
        prev: &[RulePosition],
        completed: &[RuleID],
    ) -> Arc<[HeightGraftInfo]> {
        let key = (prev.to_vec(), completed.to_vec());
        if let Some(infos) = self.height_or_graft_into.get(&key) {
            return infos.clone();
        }

        #[derive(Default)]
        struct Group {
            parent: Set<RulePosition>,
            parent_next: Set<RulePosition>,
            lookahead: LookaheadSetPart,
        }

        let closure = self.closure(cx, prev);
        let mut groups: Map<(Action, LookaheadSetPart, StateMergeKey), Group> = Map::default();
        for (idx, node) in closure.nodes() {
            let rp = node.rule_position();
            let Some(item) = cx.view.item(rp) else {
                continue;
            };
            if !completed.contains(&item) {
                continue;
            }
            let action = match (node.is_root(), rp.is_goal()) {
                (true, true) => Action::Goal,
                (true, false) => Action::Graft,
                (false, _) => Action::Height,
            };
            let up = closure.follow(idx).clone();
            for next in cx.view.next(rp) {
                let guard = if next.is_at_end() {
                    up.clone()
                } else {
                    self.first.first_of(cx, next).with_end(&up)
                };
                let merge_key = StateMergeKey::new(cx, &mut self.first, next);
                let group = groups.entry((action, up.clone(), merge_key)).or_default();
                group.parent.insert(rp);
                group.parent_next.insert(next);
                group.lookahead.union_with(&guard);
            }
        }

        let mut infos: Vec<HeightGraftInfo> = groups
            .into_iter()
            .map(|((action, up, merge_key), group)| {
                let mut parent: Vec<_> = group.parent.into_iter().collect();
                parent.sort();
                let mut parent_next: Vec<_> = group.parent_next.into_iter().collect();
                parent_next.sort();
                HeightGraftInfo {
                    action,
                    parent,
                    parent_next,
                    lookahead: group.lookahead,
                    up,
                    runtime_guard: merge_key.runtime_guard,
                }
            })
            .collect();
        infos.sort_by(|a, b| {
            (a.action, &a.parent_next, &a.up).cmp(&(b.action, &b.parent_next, &b.up))
        });

        let infos: Arc<[HeightGraftInfo]> = infos.into();
        if self.enabled {
            self.height_or_graft_into.insert(key, infos.clone());
        }
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::RuleGraph;

    struct Fixture {
        graph: RuleGraph,
        first_sets: FirstSets,
        goal: RuleID,
    }

    impl Fixture {
        fn new(graph: RuleGraph, goal: &str) -> Self {
            let goal = graph.find(goal).unwrap();
            let rules: Vec<_> = graph.rules().map(|r| r.id()).chain(Some(RuleID::GOAL)).collect();
            let first_sets = FirstSets::new(&GrammarView::new(&graph, goal), &rules, |_| false);
            Self {
                graph,
                first_sets,
                goal,
            }
        }

        fn cx(&self) -> BuildContext<'_> {
            BuildContext::new(GrammarView::new(&self.graph, self.goal), &self.first_sets)
        }
    }

    fn simple_choice() -> RuleGraph {
        RuleGraph::define(|g| {
            let a = g.literal("a")?;
            let b = g.literal("b")?;
            let s = g.nonterminal("S")?;
            let s1 = g.nonterminal("S1")?;
            let b_opt = g.nonterminal("bOpt")?;
            g.choice(s, [vec![a], vec![s1]])?;
            g.concatenation(s1, [a, b_opt])?;
            g.optional(b_opt, b)?;
            Ok(())
        })
        .unwrap()
    }

    const START: [RulePosition; 1] = [RulePosition::new(RuleID::GOAL, 0, 0)];

    #[test]
    fn width_groups_by_terminal() {
        let fixture = Fixture::new(simple_choice(), "S");
        let cx = fixture.cx();
        let mut cache = BuildCache::new(true);

        let infos = cache.width_into(&cx, &START);
        assert_eq!(infos.len(), 1);
        let a = fixture.graph.find("'a'").unwrap();
        let b = fixture.graph.find("'b'").unwrap();
        assert_eq!(infos[0].to, RulePosition::leaf(a));
        assert_eq!(
            infos[0].lookahead,
            LookaheadSetPart::from_rules([b, RuleID::USE_PARENT_LOOKAHEAD]).unwrap()
        );
        assert!(Arc::ptr_eq(&infos, &cache.width_into(&cx, &START)));
    }

    #[test]
    fn height_splits_by_end_of_rule() {
        let fixture = Fixture::new(simple_choice(), "S");
        let cx = fixture.cx();
        let mut cache = BuildCache::new(true);
        let a = fixture.graph.find("'a'").unwrap();
        let s = fixture.graph.find("S").unwrap();
        let s1 = fixture.graph.find("S1").unwrap();

        let infos = cache.height_or_graft_into(&cx, &START, &[a]);
        assert_eq!(infos.len(), 2);
        assert!(infos.iter().all(|info| info.action == Action::Height));
        let ends: Vec<_> = infos.iter().map(|info| info.parent_next.clone()).collect();
        assert!(ends.contains(&vec![RulePosition::new(s, 0, RulePosition::END)]));
        assert!(ends.contains(&vec![RulePosition::new(s1, 0, 1)]));
        for info in infos.iter() {
            assert_eq!(info.up, LookaheadSetPart::up());
        }
    }

    #[test]
    fn goal_is_reached_from_root() {
        let fixture = Fixture::new(simple_choice(), "S");
        let cx = fixture.cx();
        let mut cache = BuildCache::new(false);
        let s = fixture.graph.find("S").unwrap();

        let infos = cache.height_or_graft_into(&cx, &START, &[s]);
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].action, Action::Goal);
        assert_eq!(infos[0].parent, START.to_vec());
        assert_eq!(infos[0].lookahead, LookaheadSetPart::up());
        assert!(!Arc::ptr_eq(
            &infos,
            &cache.height_or_graft_into(&cx, &START, &[s])
        ));
    }

    #[test]
    fn graft_carries_list_guard() {
        let graph = RuleGraph::define(|g| {
            let a = g.literal("a")?;
            let many = g.nonterminal("Many")?;
            g.multi(many, a, 1, Some(3))
        })
        .unwrap();
        let fixture = Fixture::new(graph, "Many");
        let cx = fixture.cx();
        let mut cache = BuildCache::new(true);
        let a = fixture.graph.find("'a'").unwrap();
        let many = fixture.goal;

        let loop_position = RulePosition::new(many, 0, RulePosition::POSITION_MULTI_ITEM);
        let infos = cache.height_or_graft_into(&cx, &[loop_position], &[a]);
        assert_eq!(infos.len(), 2);
        for info in infos.iter() {
            assert_eq!(info.action, Action::Graft);
            assert_eq!(info.parent, vec![loop_position]);
            assert!(matches!(
                info.runtime_guard,
                RuntimeGuard::MultiMinMax {
                    min: 1,
                    max: Some(3),
                    ..
                }
            ));
        }
    }
}
