//! The states and transitions of one goal rule.

use crate::{
    automaton::AutomatonError,
    build_cache::{BuildCache, BuildContext},
    first::FirstSets,
    grammar::{RuleGraph, RuleID},
    lookahead::{LookaheadSetPart, LookaheadSetTable},
    rule_position::{GrammarView, RuleClass, RulePosition},
    runtime::{CallingContext, RuntimeTransitionCalculator},
    state::{ParserState, StateID, Transitions},
    transition::{Action, Lookahead, RuntimeGuard, Transition},
    types::{Map, Queue, Set},
    util::{self, display_fn},
};
use std::{
    collections::BTreeSet,
    fmt,
    sync::{Arc, Mutex, RwLock},
};

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SetID {
    raw: u16,
}

impl SetID {
    pub const fn from_raw(raw: u16) -> Self {
        Self { raw }
    }

    pub const fn into_raw(self) -> u16 {
        self.raw
    }
}

impl fmt::Debug for SetID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A#{}", self.raw)
    }
}

#[derive(Debug, Default)]
struct StateTable {
    states: Vec<Arc<ParserState>>,
    index: Map<Vec<RulePosition>, StateID>,
}

#[derive(Debug)]
struct Builder {
    cache: BuildCache,
    lookaheads: LookaheadSetTable,
    transitions: Set<Arc<Transition>>,
}

/// The automaton of one goal rule (or of the skip rules of a graph).
#[derive(Debug)]
pub struct ParserStateSet {
    id: SetID,
    graph: Arc<RuleGraph>,
    goal: RuleID,
    is_skip: bool,
    used_rules: Vec<RuleID>,
    first_sets: FirstSets,
    embedded: Map<RuleID, SetID>,
    skip: Option<SetID>,
    states: RwLock<StateTable>,
    builder: Mutex<Builder>,
    calculator: RuntimeTransitionCalculator,
}

/// Every rule reachable from `goal`, plus the empty terminal and the goal wrapper.
///
/// Embedded rules are leaves: the rules of the embedded graph are not visited.
pub(crate) fn used_rules(graph: &RuleGraph, goal: RuleID) -> Result<Vec<RuleID>, AutomatonError> {
    let mut used: Set<RuleID> = Set::default();
    used.insert(RuleID::EMPTY);
    let mut queue: Queue<RuleID> = Some(goal).into_iter().collect();
    while let Some(rule) = queue.pop() {
        if rule.is_reserved() {
            return Err(AutomatonError::ReservedRule(rule));
        }
        let data = graph
            .get(rule)
            .ok_or_else(|| AutomatonError::UnknownRule(format!("{:?}", rule)))?;
        if used.insert(rule) {
            for item in data.referenced_rules() {
                if !used.contains(&item) {
                    queue.push(item);
                }
            }
        }
    }
    let mut used: Vec<_> = used.into_iter().collect();
    used.sort();
    used.push(RuleID::GOAL);
    Ok(used)
}

impl ParserStateSet {
    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(skip_all, fields(id = ?id, goal = ?goal))]
    pub(crate) fn new(
        id: SetID,
        graph: Arc<RuleGraph>,
        goal: RuleID,
        is_skip: bool,
        embedded: Map<RuleID, SetID>,
        skip: Option<SetID>,
        embedded_nullable: impl Fn(RuleID) -> bool,
        cache_enabled: bool,
    ) -> Result<Self, AutomatonError> {
        let used_rules = used_rules(&graph, goal)?;
        let first_sets = FirstSets::new(&GrammarView::new(&graph, goal), &used_rules, embedded_nullable);
        tracing::trace!("used rules: {}", used_rules.len());

        let set = Self {
            id,
            graph,
            goal,
            is_skip,
            used_rules,
            first_sets,
            embedded,
            skip,
            states: RwLock::default(),
            builder: Mutex::new(Builder {
                cache: BuildCache::new(cache_enabled),
                lookaheads: LookaheadSetTable::default(),
                transitions: Set::default(),
            }),
            calculator: RuntimeTransitionCalculator::default(),
        };
        let start = set.intern_state(vec![RulePosition::new(RuleID::GOAL, 0, RulePosition::START)])?;
        debug_assert_eq!(start, StateID::START);
        Ok(set)
    }

    pub fn id(&self) -> SetID {
        self.id
    }

    pub fn graph(&self) -> &Arc<RuleGraph> {
        &self.graph
    }

    pub fn goal(&self) -> RuleID {
        self.goal
    }

    /// Whether this set parses the skip rules of its graph.
    pub fn is_skip(&self) -> bool {
        self.is_skip
    }

    /// The skip set used between the tokens of this set.
    pub fn skip(&self) -> Option<SetID> {
        self.skip
    }

    pub fn used_rules(&self) -> &[RuleID] {
        &self.used_rules
    }

    pub fn first_sets(&self) -> &FirstSets {
        &self.first_sets
    }

    /// The state set parsing an embedded rule of this set.
    pub fn embedded_set(&self, rule: RuleID) -> Option<SetID> {
        self.embedded.get(&rule).copied()
    }

    pub fn view(&self) -> GrammarView<'_> {
        GrammarView::new(&self.graph, self.goal)
    }

    fn cx(&self) -> BuildContext<'_> {
        BuildContext::new(self.view(), &self.first_sets)
    }

    pub fn start_state(&self) -> Arc<ParserState> {
        util::read(&self.states).states[0].clone()
    }

    pub fn state(&self, id: StateID) -> Result<Arc<ParserState>, AutomatonError> {
        util::read(&self.states)
            .states
            .get(id.into_raw() as usize)
            .cloned()
            .ok_or(AutomatonError::UnresolvedState {
                set: self.id,
                state: id,
            })
    }

    /// The state holding exactly these rule positions, if it has been created.
    pub fn find_state(&self, rule_positions: &[RulePosition]) -> Option<StateID> {
        let mut key = rule_positions.to_vec();
        key.sort();
        key.dedup();
        util::read(&self.states).index.get(&key).copied()
    }

    /// The states created so far.
    pub fn states(&self) -> Vec<Arc<ParserState>> {
        util::read(&self.states).states.clone()
    }

    pub fn len(&self) -> usize {
        util::read(&self.states).states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lookahead_count(&self) -> usize {
        util::lock(&self.builder).lookaheads.len()
    }

    fn intern_state(&self, mut rule_positions: Vec<RulePosition>) -> Result<StateID, AutomatonError> {
        rule_positions.sort();
        rule_positions.dedup();
        let at_end = rule_positions.iter().filter(|rp| rp.is_at_end()).count();
        if rule_positions.is_empty() || (at_end != 0 && at_end != rule_positions.len()) {
            return Err(AutomatonError::MixedState(rule_positions));
        }

        if let Some(&id) = util::read(&self.states).index.get(&rule_positions) {
            return Ok(id);
        }
        let mut table = util::write(&self.states);
        if let Some(&id) = table.index.get(&rule_positions) {
            return Ok(id);
        }
        let id = StateID::from_raw(table.states.len() as u32);
        tracing::trace!("new state {:?}: {:?}", id, rule_positions);
        table
            .states
            .push(Arc::new(ParserState::new(id, self.id, rule_positions.clone())));
        table.index.insert(rule_positions, id);
        Ok(id)
    }

    /// Outgoing transitions of `state` when it was reached on top of `prev`.
    ///
    /// States at the end of a rule need the previous state; the transitions
    /// of other states do not depend on it.
    pub fn transitions(
        &self,
        prev: Option<StateID>,
        state: StateID,
    ) -> Result<Transitions, AutomatonError> {
        let state = self.state(state)?;
        let key = if state.is_at_end() && !state.is_goal() {
            prev
        } else {
            None
        };
        if let Some(transitions) = state.cached_transitions(key) {
            return Ok(transitions);
        }

        let prev = match key {
            Some(prev) => Some(self.state(prev)?),
            None if state.is_at_end() && !state.is_goal() => {
                return Err(AutomatonError::MissingPrevious(state.id()));
            }
            None => None,
        };

        let mut builder = util::lock(&self.builder);
        if let Some(transitions) = state.cached_transitions(key) {
            return Ok(transitions);
        }
        let transitions = self.compute_transitions(&mut builder, prev.as_deref(), &state)?;
        tracing::trace!(
            "transitions of {:?} (prev = {:?}): {}",
            state.id(),
            key,
            transitions.len()
        );
        Ok(state.store_transitions(key, transitions))
    }

    /// Transitions of `state` applicable in the given calling context.
    pub fn transitions_for(
        &self,
        state: StateID,
        context: CallingContext,
    ) -> Result<Transitions, AutomatonError> {
        self.calculator.transitions_for(self, state, context)
    }

    fn compute_transitions(
        &self,
        builder: &mut Builder,
        prev: Option<&ParserState>,
        state: &ParserState,
    ) -> Result<Transitions, AutomatonError> {
        let cx = self.cx();

        // (action, to, graft_prev_guard, runtime_guard, embedded)
        type Key = (Action, StateID, Option<Vec<RulePosition>>, RuntimeGuard, Option<SetID>);
        let mut entries: Vec<(Key, LookaheadSetPart, LookaheadSetPart)> = vec![];

        if state.is_goal() {
            entries.push((
                (Action::Goal, state.id(), None, RuntimeGuard::AlwaysTrue, None),
                LookaheadSetPart::up(),
                LookaheadSetPart::up(),
            ));
        } else if state.is_at_end() {
            let prev = prev.ok_or(AutomatonError::MissingPrevious(state.id()))?;
            let completed = state.completed_rules();
            let infos = builder
                .cache
                .height_or_graft_into(&cx, prev.rule_positions(), &completed);
            for info in infos.iter() {
                let to = self.intern_state(info.parent_next.clone())?;
                let graft_prev_guard = match info.action {
                    Action::Graft => Some(info.parent.clone()),
                    _ => None,
                };
                entries.push((
                    (info.action, to, graft_prev_guard, info.runtime_guard, None),
                    info.lookahead.clone(),
                    info.up.clone(),
                ));
            }
        } else {
            let infos = builder.cache.width_into(&cx, state.rule_positions());
            for info in infos.iter() {
                let (action, embedded) = match cx.view.class(info.to.rule) {
                    RuleClass::Embedded(..) => {
                        let embedded = self.embedded_set(info.to.rule).ok_or_else(|| {
                            AutomatonError::UnknownRule(self.graph.rule(info.to.rule).tag().into())
                        })?;
                        (Action::Embed, Some(embedded))
                    }
                    _ => (Action::Width, None),
                };
                let to = self.intern_state(vec![info.to])?;
                entries.push((
                    (action, to, None, RuntimeGuard::AlwaysTrue, embedded),
                    info.lookahead.clone(),
                    info.lookahead.clone(),
                ));
            }
        }

        let mut merged: Map<Key, Vec<Lookahead>> = Map::default();
        for (key, guard, up) in entries {
            let lookahead = Lookahead {
                guard: builder.lookaheads.intern(guard),
                up: builder.lookaheads.intern(up),
            };
            merged.entry(key).or_default().push(lookahead);
        }

        let mut transitions = Vec::with_capacity(merged.len());
        for ((action, to, graft_prev_guard, runtime_guard, embedded), mut lookahead) in merged {
            lookahead.sort();
            lookahead.dedup();
            let transition = Transition {
                from: state.id(),
                to,
                action,
                lookahead,
                graft_prev_guard,
                runtime_guard,
                embedded,
            };
            let transition = match builder.transitions.get(&transition) {
                Some(interned) => interned.clone(),
                None => {
                    let interned = Arc::new(transition);
                    builder.transitions.insert(interned.clone());
                    interned
                }
            };
            transitions.push(transition);
        }
        Ok(transitions.into())
    }

    /// Terminal and embedded rules the state can shift next.
    pub fn expected_terminals(&self, state: StateID) -> Result<Vec<RuleID>, AutomatonError> {
        let state = self.state(state)?;
        if state.is_at_end() {
            return Ok(vec![]);
        }
        let infos = util::lock(&self.builder)
            .cache
            .width_into(&self.cx(), state.rule_positions());
        Ok(infos.iter().map(|info| info.to.rule).collect())
    }

    /// Build every state and transition reachable from the start state.
    #[tracing::instrument(skip_all, fields(id = ?self.id))]
    pub fn build_all(&self) -> Result<(), AutomatonError> {
        #[derive(Default)]
        struct Explorer {
            queue: Queue<(Option<StateID>, StateID)>,
            seen: Set<(Option<StateID>, StateID)>,
            previous_of: Map<StateID, Set<Option<StateID>>>,
            grafts_onto: Map<StateID, Set<StateID>>,
        }
        impl Explorer {
            fn visit(&mut self, prev: Option<StateID>, state: StateID) {
                let mut pending = vec![(prev, state)];
                while let Some((prev, state)) = pending.pop() {
                    if !self.seen.insert((prev, state)) {
                        continue;
                    }
                    self.previous_of.entry(state).or_default().insert(prev);
                    if let Some(grafted) = self.grafts_onto.get(&state) {
                        pending.extend(grafted.iter().map(|&to| (prev, to)));
                    }
                    self.queue.push((prev, state));
                }
            }

            fn graft(&mut self, prev: Option<StateID>, to: StateID) {
                let Some(prev) = prev else {
                    self.visit(None, to);
                    return;
                };
                self.grafts_onto.entry(prev).or_default().insert(to);
                let previous: Vec<_> = self
                    .previous_of
                    .get(&prev)
                    .map(|p| p.iter().copied().collect())
                    .unwrap_or_default();
                for prev_prev in previous {
                    self.visit(prev_prev, to);
                }
            }
        }

        let mut explorer = Explorer::default();
        explorer.visit(None, StateID::START);
        while let Some((prev, state)) = explorer.queue.pop() {
            for transition in self.transitions(prev, state)?.iter() {
                match transition.action() {
                    Action::Width | Action::Embed => explorer.visit(Some(state), transition.to()),
                    Action::Height => explorer.visit(prev, transition.to()),
                    Action::Graft => explorer.graft(prev, transition.to()),
                    Action::Goal if transition.to() == state => {}
                    Action::Goal => explorer.graft(prev, transition.to()),
                }
            }
        }

        tracing::debug!(
            "built {:?}: {} states, {} contexts, {} lookahead sets",
            self.id,
            self.len(),
            explorer.seen.len(),
            self.lookahead_count()
        );
        Ok(())
    }

    /// A canonical rendering of every computed transition, independent of numbering.
    pub fn snapshot(&self) -> BTreeSet<String> {
        let view = self.view();
        let states = self.states();
        let state_name = |id: StateID| {
            states
                .get(id.into_raw() as usize)
                .map_or_else(|| format!("{:?}", id), |s| s.display(&view).to_string())
        };
        let mut lines = BTreeSet::new();
        for state in &states {
            for prev in state.transition_keys() {
                let Some(transitions) = state.cached_transitions(prev) else {
                    continue;
                };
                let context = prev.map_or_else(|| "-".to_owned(), &state_name);
                if transitions.is_empty() {
                    lines.insert(format!("{} :: {} (none)", context, state_name(state.id())));
                }
                for transition in transitions.iter() {
                    lines.insert(format!(
                        "{} :: {}",
                        context,
                        transition.display(&view, &state_name)
                    ));
                }
            }
        }
        lines
    }

    pub fn display(&self) -> impl fmt::Display + '_ {
        display_fn(move |f| {
            let view = self.view();
            let tag = view.rule_name(self.goal);
            writeln!(
                f,
                "## state set {:?} (goal = {}{})",
                self.id,
                tag,
                if self.is_skip { ", skip" } else { "" }
            )?;
            for state in self.states() {
                writeln!(f, "{:?} {}", state.id(), state.display(&view))?;
                for prev in state.transition_keys() {
                    let Some(transitions) = state.cached_transitions(prev) else {
                        continue;
                    };
                    for transition in transitions.iter() {
                        let name = |id: StateID| format!("{:?}", id);
                        match prev {
                            Some(prev) => writeln!(
                                f,
                                "  [{:?}] {}",
                                prev,
                                transition.display(&view, name)
                            )?,
                            None => writeln!(f, "  {}", transition.display(&view, name))?,
                        }
                    }
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// `S = 'a' 'c' 'y' | 'a' 'c' 'z' | 'b'`
    fn graph() -> Arc<RuleGraph> {
        Arc::new(
            RuleGraph::define(|g| {
                let a = g.literal("a")?;
                let b = g.literal("b")?;
                let c = g.literal("c")?;
                let y = g.literal("y")?;
                let z = g.literal("z")?;
                let s = g.nonterminal("S")?;
                g.choice(s, [vec![a, c, y], vec![a, c, z], vec![b]])
            })
            .unwrap(),
        )
    }

    fn state_set(cache_enabled: bool) -> ParserStateSet {
        let graph = graph();
        let goal = graph.find("S").unwrap();
        ParserStateSet::new(
            SetID::from_raw(0),
            graph,
            goal,
            false,
            Map::default(),
            None,
            |_| false,
            cache_enabled,
        )
        .unwrap()
    }

    #[test]
    fn start_state_shifts_first_terminals() {
        let set = state_set(true);
        let graph = set.graph().clone();
        let transitions = set.transitions(None, StateID::START).unwrap();
        assert!(transitions.iter().all(|t| t.action() == Action::Width));
        assert_eq!(
            set.expected_terminals(StateID::START).unwrap(),
            [graph.find("'a'").unwrap(), graph.find("'b'").unwrap()]
        );
    }

    #[test]
    fn equivalent_positions_share_a_state() {
        let set = state_set(true);
        set.build_all().unwrap();
        let s = set.graph().find("S").unwrap();

        let after_a = [RulePosition::new(s, 0, 1), RulePosition::new(s, 1, 1)];
        assert!(set.find_state(&after_a).is_some());
        assert!(set.find_state(&after_a[..1]).is_none());

        // the positions after 'c' expect different terminals
        assert!(set.find_state(&[RulePosition::new(s, 0, 2)]).is_some());
        assert!(set.find_state(&[RulePosition::new(s, 1, 2)]).is_some());
    }

    #[test]
    fn mixed_state_is_rejected() {
        let set = state_set(true);
        let s = set.graph().find("S").unwrap();
        let err = set
            .intern_state(vec![
                RulePosition::new(s, 2, RulePosition::END),
                RulePosition::new(s, 0, 1),
            ])
            .unwrap_err();
        assert!(matches!(err, AutomatonError::MixedState(..)));
        assert!(matches!(
            set.intern_state(vec![]),
            Err(AutomatonError::MixedState(..))
        ));
    }

    #[test]
    fn snapshot_does_not_depend_on_the_build_cache() {
        let cached = state_set(true);
        let uncached = state_set(false);
        cached.build_all().unwrap();
        uncached.transitions(None, StateID::START).unwrap();
        uncached.build_all().unwrap();
        assert_eq!(cached.snapshot(), uncached.snapshot());
        assert_eq!(cached.len(), uncached.len());
    }
}
