//! Parser states.

use crate::{
    grammar::RuleID,
    rule_position::{GrammarView, RulePosition},
    state_set::SetID,
    transition::Transition,
    types::Map,
    util::{self, display_fn},
};
use std::{fmt, sync::Arc, sync::RwLock};

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct StateID {
    raw: u32,
}

impl StateID {
    /// The start state of every state set.
    pub const START: Self = Self::from_raw(0);

    pub const fn from_raw(raw: u32) -> Self {
        Self { raw }
    }

    pub const fn into_raw(self) -> u32 {
        self.raw
    }
}

impl fmt::Debug for StateID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S#{:03}", self.raw)
    }
}

pub type Transitions = Arc<[Arc<Transition>]>;

/// A set of mutually indistinguishable rule positions.
pub struct ParserState {
    id: StateID,
    set: SetID,
    rule_positions: Vec<RulePosition>,
    is_at_end: bool,
    /// Outgoing transitions keyed by the previous state. States not at the
    /// end of a rule only use the `None` entry.
    transitions: RwLock<Map<Option<StateID>, Transitions>>,
}

impl fmt::Debug for ParserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserState")
            .field("id", &self.id)
            .field("set", &self.set)
            .field("rule_positions", &self.rule_positions)
            .finish()
    }
}

impl ParserState {
    pub(crate) fn new(id: StateID, set: SetID, rule_positions: Vec<RulePosition>) -> Self {
        let is_at_end = rule_positions.iter().all(|rp| rp.is_at_end());
        Self {
            id,
            set,
            rule_positions,
            is_at_end,
            transitions: RwLock::default(),
        }
    }

    pub fn id(&self) -> StateID {
        self.id
    }

    pub fn set(&self) -> SetID {
        self.set
    }

    /// Sorted and deduplicated.
    pub fn rule_positions(&self) -> &[RulePosition] {
        &self.rule_positions
    }

    pub fn is_at_end(&self) -> bool {
        self.is_at_end
    }

    pub fn is_goal(&self) -> bool {
        self.is_at_end && self.rule_positions.iter().all(|rp| rp.is_goal())
    }

    /// The rules completed by this state; empty unless the state is at end.
    pub fn completed_rules(&self) -> Vec<RuleID> {
        if !self.is_at_end {
            return vec![];
        }
        let mut rules: Vec<_> = self.rule_positions.iter().map(|rp| rp.rule).collect();
        rules.dedup();
        rules
    }

    pub(crate) fn cached_transitions(&self, prev: Option<StateID>) -> Option<Transitions> {
        util::read(&self.transitions).get(&prev).cloned()
    }

    /// Insert unless another thread got there first; returns the stored value.
    pub(crate) fn store_transitions(
        &self,
        prev: Option<StateID>,
        transitions: Transitions,
    ) -> Transitions {
        util::write(&self.transitions)
            .entry(prev)
            .or_insert(transitions)
            .clone()
    }

    pub(crate) fn transition_keys(&self) -> Vec<Option<StateID>> {
        util::read(&self.transitions).keys().copied().collect()
    }

    pub fn display<'a>(&'a self, view: &'a GrammarView<'a>) -> impl fmt::Display + 'a {
        display_fn(move |f| {
            f.write_str("{")?;
            for (i, rp) in self.rule_positions.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", view.display_position(*rp))?;
            }
            f.write_str("}")
        })
    }
}
