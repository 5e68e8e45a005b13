//! Construction of the parser state sets of a rule graph.

use crate::{
    grammar::{RuleGraph, RuleID, RuleKind},
    lookahead::LookaheadError,
    rule_position::RulePosition,
    runtime::CallingContext,
    state::{StateID, Transitions},
    state_set::{used_rules, ParserStateSet, SetID},
    types::{Map, Set},
};
use std::{collections::BTreeSet, fmt, sync::Arc};

#[derive(Debug, thiserror::Error)]
pub enum AutomatonError {
    #[error("the reserved rule {0:?} is used as an ordinary rule")]
    ReservedRule(RuleID),

    #[error("unknown rule `{0}'")]
    UnknownRule(String),

    #[error("`{0}' cannot be used as a goal")]
    InvalidGoal(String),

    #[error("a state mixes completed and incomplete rule positions: {0:?}")]
    MixedState(Vec<RulePosition>),

    #[error("no state {state:?} in state set {set:?}")]
    UnresolvedState { set: SetID, state: StateID },

    #[error("no state set {0:?}")]
    UnknownStateSet(SetID),

    #[error("the completed state {0:?} needs a previous state")]
    MissingPrevious(StateID),

    #[error("the embedded rule `{0}' embeds itself")]
    CyclicEmbedding(String),

    #[error("the state set {0:?} has no skip rules")]
    NoSkipRules(SetID),

    #[error(transparent)]
    Lookahead(#[from] LookaheadError),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum BuildMode {
    Eager,
    Lazy,
}

#[derive(Debug, Clone)]
pub struct Config {
    mode: BuildMode,
    use_build_cache: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub const fn new() -> Self {
        Self {
            mode: BuildMode::Eager,
            use_build_cache: true,
        }
    }

    /// Build every reachable state and transition before returning the automaton.
    ///
    /// This is the default.
    pub fn eager(&mut self) -> &mut Self {
        self.mode = BuildMode::Eager;
        self
    }

    /// Compute transitions on first query.
    pub fn lazy(&mut self) -> &mut Self {
        self.mode = BuildMode::Lazy;
        self
    }

    /// Enable or disable memoization of closures and of the WIDTH / HEIGHT-GRAFT relations.
    pub fn use_build_cache(&mut self, enabled: bool) -> &mut Self {
        self.use_build_cache = enabled;
        self
    }

    pub fn is_lazy(&self) -> bool {
        self.mode == BuildMode::Lazy
    }

    /// Build the automaton of the rule tagged `goal`.
    #[tracing::instrument(skip_all, fields(goal = %goal))]
    pub fn build(&self, graph: Arc<RuleGraph>, goal: &str) -> Result<Automaton, AutomatonError> {
        let goal_id = graph
            .find(goal)
            .ok_or_else(|| AutomatonError::UnknownRule(goal.to_owned()))?;
        if graph.rule(goal_id).items().is_none() {
            return Err(AutomatonError::InvalidGoal(goal.to_owned()));
        }

        let mut creator = SetCreator {
            config: self,
            sets: vec![],
            created: Map::default(),
            in_progress: Set::default(),
        };
        let root = creator.create(&graph, goal_id, false)?;
        let automaton = Automaton {
            sets: creator.sets,
            root,
            config: self.clone(),
        };

        if self.mode == BuildMode::Eager {
            automaton.build_all()?;
        }
        Ok(automaton)
    }
}

type SetKey = (usize, RuleID, bool);

struct SetCreator<'c> {
    config: &'c Config,
    sets: Vec<Arc<ParserStateSet>>,
    created: Map<SetKey, SetID>,
    in_progress: Set<SetKey>,
}

impl SetCreator<'_> {
    /// Create the set of `(graph, goal)` after the sets it depends on.
    fn create(
        &mut self,
        graph: &Arc<RuleGraph>,
        goal: RuleID,
        is_skip: bool,
    ) -> Result<SetID, AutomatonError> {
        let key = (Arc::as_ptr(graph) as usize, goal, is_skip);
        if let Some(&id) = self.created.get(&key) {
            return Ok(id);
        }
        if !self.in_progress.insert(key) {
            return Err(AutomatonError::CyclicEmbedding(graph.rule(goal).tag().to_owned()));
        }

        let mut embedded = Map::default();
        for rule in used_rules(graph, goal)? {
            if rule == RuleID::GOAL {
                continue;
            }
            if let RuleKind::Embedded(embedding) = graph.rule(rule).kind() {
                let id = self.create(&embedding.graph, embedding.goal, false)?;
                embedded.insert(rule, id);
            }
        }
        let skip = match graph.skip_goal() {
            Some(skip_goal) if !is_skip => Some(self.create(graph, skip_goal, true)?),
            _ => None,
        };

        let id = SetID::from_raw(self.sets.len() as u16);
        let sets = &self.sets;
        let embedded_nullable = |rule: RuleID| {
            embedded
                .get(&rule)
                .and_then(|id| sets.get(usize::from(id.into_raw())))
                .map_or(false, |set| set.first_sets().is_nullable(set.goal()))
        };
        let set = ParserStateSet::new(
            id,
            graph.clone(),
            goal,
            is_skip,
            embedded.clone(),
            skip,
            embedded_nullable,
            self.config.use_build_cache,
        )?;
        tracing::trace!("created state set {:?} for `{}'", id, graph.rule(goal).tag());

        self.sets.push(Arc::new(set));
        self.in_progress.swap_remove(&key);
        self.created.insert(key, id);
        Ok(id)
    }
}

/// The state sets built for one goal rule: the goal itself, every embedded
/// goal and every skip automaton involved.
#[derive(Debug)]
pub struct Automaton {
    sets: Vec<Arc<ParserStateSet>>,
    root: SetID,
    config: Config,
}

impl Automaton {
    /// Build with the default configuration.
    pub fn build(graph: Arc<RuleGraph>, goal: &str) -> Result<Self, AutomatonError> {
        Config::new().build(graph, goal)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The state set of the goal rule.
    pub fn root(&self) -> &Arc<ParserStateSet> {
        &self.sets[usize::from(self.root.into_raw())]
    }

    pub fn state_set(&self, id: SetID) -> Result<&Arc<ParserStateSet>, AutomatonError> {
        self.sets
            .get(usize::from(id.into_raw()))
            .ok_or(AutomatonError::UnknownStateSet(id))
    }

    pub fn state_sets(&self) -> impl Iterator<Item = &Arc<ParserStateSet>> + '_ {
        self.sets.iter()
    }

    /// The skip automaton used between the tokens of a state set.
    pub fn skip_set(&self, id: SetID) -> Result<&Arc<ParserStateSet>, AutomatonError> {
        let skip = self.state_set(id)?.skip().ok_or(AutomatonError::NoSkipRules(id))?;
        self.state_set(skip)
    }

    pub fn transitions_for(
        &self,
        set: SetID,
        state: StateID,
        context: CallingContext,
    ) -> Result<Transitions, AutomatonError> {
        self.state_set(set)?.transitions_for(state, context)
    }

    /// Build every state set completely. Lazy automata end up identical to eager ones.
    pub fn build_all(&self) -> Result<(), AutomatonError> {
        for set in &self.sets {
            set.build_all()?;
        }
        Ok(())
    }

    /// A canonical rendering of every computed transition of every state set.
    pub fn snapshot(&self) -> BTreeSet<String> {
        let mut lines = BTreeSet::new();
        for set in &self.sets {
            let view = set.view();
            let prefix = format!(
                "{}{}",
                view.rule_name(set.goal()),
                if set.is_skip() { " (skip)" } else { "" }
            );
            lines.extend(
                set.snapshot()
                    .into_iter()
                    .map(|line| format!("{} | {}", prefix, line)),
            );
        }
        lines
    }
}

impl fmt::Display for Automaton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for set in &self.sets {
            writeln!(f, "{}", set.display())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::Action;

    fn simple_choice() -> Arc<RuleGraph> {
        Arc::new(
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
            .unwrap(),
        )
    }

    #[test]
    fn smoketest() {
        let automaton = Automaton::build(simple_choice(), "S").unwrap();
        eprintln!("{}", automaton);
        let root = automaton.root();
        assert!(!root.is_empty());
        for state in root.states() {
            let at_end = state.rule_positions().iter().filter(|rp| rp.is_at_end()).count();
            assert!(at_end == 0 || at_end == state.rule_positions().len());
        }
    }

    #[test]
    fn unknown_and_invalid_goal() {
        let err = Automaton::build(simple_choice(), "T").unwrap_err();
        assert!(matches!(err, AutomatonError::UnknownRule(tag) if tag == "T"));
        let err = Automaton::build(simple_choice(), "'a'").unwrap_err();
        assert!(matches!(err, AutomatonError::InvalidGoal(..)));
    }

    #[test]
    fn completed_state_needs_previous() {
        let automaton = Config::new().lazy().build(simple_choice(), "S").unwrap();
        let root = automaton.root();
        let width = root.transitions(None, StateID::START).unwrap();
        assert_eq!(width.len(), 1);
        assert_eq!(width[0].action(), Action::Width);

        let err = root.transitions(None, width[0].to()).unwrap_err();
        assert!(matches!(err, AutomatonError::MissingPrevious(..)));
        assert!(root.transitions(Some(StateID::START), width[0].to()).is_ok());
    }

    #[test]
    fn unknown_state_is_reported() {
        let automaton = Config::new().lazy().build(simple_choice(), "S").unwrap();
        let err = automaton
            .root()
            .transitions(None, StateID::from_raw(999))
            .unwrap_err();
        assert!(matches!(err, AutomatonError::UnresolvedState { .. }));
        assert!(matches!(
            automaton.skip_set(automaton.root().id()),
            Err(AutomatonError::NoSkipRules(..))
        ));
    }

    #[test]
    fn goal_state_loops_on_itself() {
        let automaton = Automaton::build(simple_choice(), "S").unwrap();
        let root = automaton.root();
        let goal = root
            .find_state(&[RulePosition::new(RuleID::GOAL, 0, RulePosition::END)])
            .unwrap();
        let transitions = root.transitions(None, goal).unwrap();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].action(), Action::Goal);
        assert_eq!(transitions[0].to(), goal);
    }

    #[test]
    fn shared_embedded_goal_is_built_once() {
        let inner = Arc::new(
            RuleGraph::define(|g| {
                let x = g.literal("x")?;
                let i = g.nonterminal("I")?;
                g.concatenation(i, [x])
            })
            .unwrap(),
        );
        let outer = Arc::new(
            RuleGraph::define(|g| {
                let e1 = g.embedded("E1", inner.clone(), "I")?;
                let e2 = g.embedded("E2", inner.clone(), "I")?;
                let s = g.nonterminal("S")?;
                g.concatenation(s, [e1, e2])
            })
            .unwrap(),
        );
        let automaton = Automaton::build(outer, "S").unwrap();
        assert_eq!(automaton.state_sets().count(), 2);
    }
}
