//! Parse automaton construction for scannerless, ambiguity-tolerant parsing.
//!
//! A [`RuleGraph`](grammar::RuleGraph) is turned into one
//! [`ParserStateSet`](state_set::ParserStateSet) per goal rule, embedded
//! goal and skip automaton, owned by an [`Automaton`](automaton::Automaton).

pub mod automaton;
pub mod build_cache;
pub mod closure;
pub mod digraph;
pub mod first;
pub mod grammar;
pub mod lookahead;
pub mod rule_position;
pub mod runtime;
pub mod state;
pub mod state_set;
pub mod transition;
pub mod types;
pub mod util;

pub use crate::{
    automaton::{Automaton, AutomatonError, Config},
    grammar::{GrammarDefError, RuleGraph, RuleID},
    runtime::CallingContext,
    state::{ParserState, StateID},
    state_set::{ParserStateSet, SetID},
    transition::{Action, Transition},
};
