//! Closure graph with deferred follow computation.
//!
//! Nodes are shared between every path reaching the same rule position, so
//! a closure holds at most two nodes per rule position (one root, one
//! child). The follow of a node is described by a [`Follow`] term when the
//! node is linked, and every term is resolved in one pass by
//! [`ClosureGraphBuilder::finish`], once all parent edges exist.

use crate::{
    build_cache::{BuildContext, FirstOfCache},
    digraph::digraph,
    lookahead::LookaheadSetPart,
    rule_position::{RuleClass, RulePosition},
    types::Map,
};

pub type NodeIdx = usize;
pub type FollowID = usize;

/// A deferred follow value.
#[derive(Debug, Clone)]
pub enum Follow {
    Literal(LookaheadSetPart),
    Union(Vec<FollowID>),
    /// FIRST of the positions following `rule_position`, falling back to
    /// `if_reach_end` when the rest of the rule derives the empty string.
    FirstOfNext {
        rule_position: RulePosition,
        if_reach_end: FollowID,
    },
}

#[derive(Debug, Clone)]
pub enum ClosureNode {
    Root {
        rule_position: RulePosition,
        follow: FollowID,
    },
    Child {
        parents: Vec<NodeIdx>,
        rule_position: RulePosition,
        follow: FollowID,
    },
}

impl ClosureNode {
    pub fn rule_position(&self) -> RulePosition {
        match self {
            Self::Root { rule_position, .. } | Self::Child { rule_position, .. } => *rule_position,
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Self::Root { .. })
    }

    pub fn parents(&self) -> &[NodeIdx] {
        match self {
            Self::Root { .. } => &[],
            Self::Child { parents, .. } => parents,
        }
    }

    fn follow_id(&self) -> FollowID {
        match self {
            Self::Root { follow, .. } | Self::Child { follow, .. } => *follow,
        }
    }
}

const ROOT_FOLLOW: FollowID = 0;

#[derive(Debug)]
pub struct ClosureGraphBuilder<'c, 'g> {
    cx: &'c BuildContext<'g>,
    nodes: Vec<ClosureNode>,
    index: Map<(RulePosition, bool), NodeIdx>,
    follows: Vec<Follow>,
    first_of_next: Map<NodeIdx, FollowID>,
}

impl<'c, 'g> ClosureGraphBuilder<'c, 'g> {
    pub fn new(cx: &'c BuildContext<'g>) -> Self {
        Self {
            cx,
            nodes: vec![],
            index: Map::default(),
            follows: vec![Follow::Literal(LookaheadSetPart::up())],
            first_of_next: Map::default(),
        }
    }

    /// Add root positions and everything reachable below them.
    pub fn add_roots(&mut self, roots: &[RulePosition]) {
        let mut pending = vec![];
        for &rule_position in roots {
            let key = (rule_position, true);
            if self.index.contains_key(&key) {
                continue;
            }
            let idx = self.nodes.len();
            self.nodes.push(ClosureNode::Root {
                rule_position,
                follow: ROOT_FOLLOW,
            });
            self.index.insert(key, idx);
            pending.push(idx);
        }

        while let Some(parent) = pending.pop() {
            let rule_position = self.nodes[parent].rule_position();
            let Some(item) = self.cx.view.item(rule_position) else {
                continue;
            };
            if !matches!(self.cx.view.class(item), RuleClass::NonTerminal(..)) {
                continue;
            }
            let contribution = self.first_of_next_follow(parent);
            for start in self.cx.view.start_positions(item) {
                let (child, created) = self.child(start);
                if let ClosureNode::Child { parents, follow, .. } = &mut self.nodes[child] {
                    if parents.contains(&parent) {
                        continue;
                    }
                    parents.push(parent);
                    if let Follow::Union(members) = &mut self.follows[*follow] {
                        members.push(contribution);
                    }
                }
                if created {
                    pending.push(child);
                }
            }
        }
    }

    fn child(&mut self, rule_position: RulePosition) -> (NodeIdx, bool) {
        let key = (rule_position, false);
        if let Some(&idx) = self.index.get(&key) {
            return (idx, false);
        }
        let follow = self.follows.len();
        self.follows.push(Follow::Union(vec![]));
        let idx = self.nodes.len();
        self.nodes.push(ClosureNode::Child {
            parents: vec![],
            rule_position,
            follow,
        });
        self.index.insert(key, idx);
        (idx, true)
    }

    fn first_of_next_follow(&mut self, node: NodeIdx) -> FollowID {
        if let Some(&follow) = self.first_of_next.get(&node) {
            return follow;
        }
        let follow = self.follows.len();
        self.follows.push(Follow::FirstOfNext {
            rule_position: self.nodes[node].rule_position(),
            if_reach_end: self.nodes[node].follow_id(),
        });
        self.first_of_next.insert(node, follow);
        follow
    }

    /// Resolve every deferred follow and freeze the graph.
    pub fn finish(self, first: &mut FirstOfCache) -> ClosureGraph {
        let mut values: Map<FollowID, LookaheadSetPart> = Map::default();
        let mut successors = Vec::with_capacity(self.follows.len());
        for (id, follow) in self.follows.iter().enumerate() {
            let (base, edges) = match follow {
                Follow::Literal(part) => (part.clone(), vec![]),
                Follow::Union(members) => (LookaheadSetPart::empty(), members.clone()),
                Follow::FirstOfNext {
                    rule_position,
                    if_reach_end,
                } => {
                    let first = first.first_of_next(self.cx, *rule_position);
                    let edges = if first.reaches_end {
                        vec![*if_reach_end]
                    } else {
                        vec![]
                    };
                    (LookaheadSetPart::from_terminals(first.terminals), edges)
                }
            };
            values.insert(id, base);
            successors.push(edges);
        }

        digraph(&mut values, &successors);

        tracing::trace!(
            "closure resolved: {} nodes, {} follow terms",
            self.nodes.len(),
            self.follows.len()
        );

        ClosureGraph {
            nodes: self.nodes,
            resolved: values.into_values().collect(),
        }
    }
}

/// A resolved closure.
#[derive(Debug)]
pub struct ClosureGraph {
    nodes: Vec<ClosureNode>,
    resolved: Vec<LookaheadSetPart>,
}

impl ClosureGraph {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, idx: NodeIdx) -> &ClosureNode {
        &self.nodes[idx]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIdx, &ClosureNode)> + '_ {
        self.nodes.iter().enumerate()
    }

    /// The lookahead following the completion of the node's rule.
    pub fn follow(&self, idx: NodeIdx) -> &LookaheadSetPart {
        &self.resolved[self.nodes[idx].follow_id()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        first::FirstSets,
        grammar::{RuleGraph, RuleID},
        rule_position::GrammarView,
        types::Set,
    };

    fn left_recursive() -> RuleGraph {
        RuleGraph::define(|g| {
            let a = g.literal("a")?;
            let c = g.literal("c")?;
            let d = g.literal("d")?;
            let s = g.nonterminal("S")?;
            let acs = g.nonterminal("acs")?;
            let ads = g.nonterminal("ads")?;
            g.choice(s, [vec![acs], vec![ads]])?;
            g.choice(acs, [vec![a], vec![acs, c, a]])?;
            g.choice(ads, [vec![a], vec![ads, d, a]])?;
            Ok(())
        })
        .unwrap()
    }

    fn build(graph: &RuleGraph, goal: &str) -> ClosureGraph {
        let view = GrammarView::new(graph, graph.find(goal).unwrap());
        let rules: Vec<_> = graph.rules().map(|r| r.id()).chain(Some(RuleID::GOAL)).collect();
        let first_sets = FirstSets::new(&view, &rules, |_| false);
        let cx = BuildContext::new(view, &first_sets);
        let mut first = FirstOfCache::new(true);
        let mut builder = ClosureGraphBuilder::new(&cx);
        builder.add_roots(&[RulePosition::new(RuleID::GOAL, 0, 0)]);
        builder.finish(&mut first)
    }

    #[test]
    fn left_recursion_terminates_without_duplicates() {
        let graph = left_recursive();
        let closure = build(&graph, "S");

        // goal, S x2, acs x2, ads x2
        assert_eq!(closure.len(), 7);
        let keys: Set<_> = closure
            .nodes()
            .map(|(_, node)| (node.rule_position(), node.is_root()))
            .collect();
        assert_eq!(keys.len(), closure.len());

        let acs = graph.find("acs").unwrap();
        let (idx, node) = closure
            .nodes()
            .find(|(_, node)| node.rule_position() == RulePosition::new(acs, 1, 0))
            .unwrap();
        // shared by S and acs itself
        assert_eq!(node.parents().len(), 2);
        let follow = closure.follow(idx);
        assert!(follow.includes_up());
        assert!(follow.content().contains(graph.find("'c'").unwrap()));
        assert!(!follow.content().contains(graph.find("'d'").unwrap()));
    }

    #[test]
    fn indirect_left_recursion_terminates() {
        // A = B 'a' | 'c', B = A 'b'
        let graph = RuleGraph::define(|g| {
            let a = g.literal("a")?;
            let b = g.literal("b")?;
            let c = g.literal("c")?;
            let rule_a = g.nonterminal("A")?;
            let rule_b = g.nonterminal("B")?;
            g.choice(rule_a, [vec![rule_b, a], vec![c]])?;
            g.concatenation(rule_b, [rule_a, b])?;
            Ok(())
        })
        .unwrap();
        let closure = build(&graph, "A");

        // goal, A x2, B
        assert_eq!(closure.len(), 4);
        let keys: Set<_> = closure
            .nodes()
            .map(|(_, node)| (node.rule_position(), node.is_root()))
            .collect();
        assert_eq!(keys.len(), closure.len());

        let rule_a = graph.find("A").unwrap();
        let rule_b = graph.find("B").unwrap();
        let find = |rp: RulePosition| {
            closure
                .nodes()
                .find(|(_, node)| node.rule_position() == rp)
                .unwrap()
        };

        let (idx, node) = find(RulePosition::new(rule_a, 0, 0));
        // the goal and B
        assert_eq!(node.parents().len(), 2);
        let follow = closure.follow(idx);
        assert!(follow.includes_up());
        assert!(follow.content().contains(graph.find("'b'").unwrap()));

        let (idx, node) = find(RulePosition::new(rule_b, 0, 0));
        assert_eq!(node.parents().len(), 1);
        let follow = closure.follow(idx);
        assert!(!follow.includes_up());
        assert_eq!(
            follow.content().iter().collect::<Vec<_>>(),
            [graph.find("'a'").unwrap()]
        );
    }

    #[test]
    fn root_follow_is_up() {
        let graph = left_recursive();
        let closure = build(&graph, "S");
        let (idx, node) = closure.nodes().next().unwrap();
        assert!(node.is_root());
        assert_eq!(*closure.follow(idx), LookaheadSetPart::up());
    }
}
