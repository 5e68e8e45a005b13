//! Transitions applicable in a concrete calling context.

use crate::{
    automaton::AutomatonError,
    state::{StateID, Transitions},
    state_set::ParserStateSet,
    transition::Action,
    types::Map,
    util,
};
use std::sync::RwLock;

/// The two states below the current one on the parse stack.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CallingContext {
    pub prev_prev: Option<StateID>,
    pub prev: Option<StateID>,
}

impl CallingContext {
    pub const fn new(prev_prev: Option<StateID>, prev: Option<StateID>) -> Self {
        Self { prev_prev, prev }
    }
}

#[derive(Debug, Default)]
pub(crate) struct RuntimeTransitionCalculator {
    cache: RwLock<Map<(CallingContext, StateID), Transitions>>,
}

impl RuntimeTransitionCalculator {
    /// Narrow the transitions of `(prev, state)` to the ones valid on top of `prev_prev`.
    ///
    /// A GRAFT is dropped when its guard is not contained in the previous
    /// state, or when it completes a rule that cannot be reduced any further
    /// in the `prev_prev` context.
    pub(crate) fn transitions_for(
        &self,
        set: &ParserStateSet,
        state: StateID,
        context: CallingContext,
    ) -> Result<Transitions, AutomatonError> {
        if let Some(transitions) = util::read(&self.cache).get(&(context, state)) {
            return Ok(transitions.clone());
        }

        let all = set.transitions(context.prev, state)?;
        let previous = match context.prev {
            Some(prev) => set.state(prev)?.rule_positions().to_vec(),
            None => vec![],
        };

        let mut applicable = Vec::with_capacity(all.len());
        for transition in all.iter() {
            if transition.action() == Action::Graft {
                if !transition.admits_previous(&previous) {
                    continue;
                }
                let to = set.state(transition.to())?;
                if let Some(prev_prev) = context.prev_prev {
                    if to.is_at_end()
                        && !to.is_goal()
                        && set.transitions(Some(prev_prev), to.id())?.is_empty()
                    {
                        tracing::trace!(
                            "drop {:?} -> {:?}: no reduction above {:?}",
                            state,
                            to.id(),
                            prev_prev
                        );
                        continue;
                    }
                }
            }
            applicable.push(transition.clone());
        }

        let applicable: Transitions = applicable.into();
        Ok(util::write(&self.cache)
            .entry((context, state))
            .or_insert(applicable)
            .clone())
    }
}
