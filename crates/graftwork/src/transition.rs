//! Transitions between parser states.

use crate::{
    grammar::ListRule,
    lookahead::LookaheadSet,
    rule_position::{GrammarView, RulePosition},
    state::StateID,
    state_set::SetID,
    util::display_fn,
};
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    /// Shift a terminal.
    Width,
    /// Reduce into a new parent node.
    Height,
    /// Reduce into the partial node of the previous state.
    Graft,
    Goal,
    /// Parse an embedded rule with another state set.
    Embed,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Width => "WIDTH",
            Self::Height => "HEIGHT",
            Self::Graft => "GRAFT",
            Self::Goal => "GOAL",
            Self::Embed => "EMBED",
        })
    }
}

/// The list position a transition moves to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ListTarget {
    End,
    Item,
    Separator,
}

/// A predicate over the number of non-skip children of the growing list node.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuntimeGuard {
    AlwaysTrue,
    MultiMinMax {
        min: u32,
        max: Option<u32>,
        target: ListTarget,
    },
    SeparatedMinMax {
        min: u32,
        max: Option<u32>,
        target: ListTarget,
    },
}

impl RuntimeGuard {
    /// The guard of a transition moving the parent to `next`.
    pub fn for_position(view: &GrammarView<'_>, next: RulePosition) -> Self {
        if next.option == RulePosition::OPTION_LIST_EMPTY {
            return Self::AlwaysTrue;
        }
        match view.list_rule(next) {
            None => Self::AlwaysTrue,
            Some(ListRule::Multi { min, max, .. }) => Self::MultiMinMax {
                min: *min,
                max: *max,
                target: if next.is_at_end() {
                    ListTarget::End
                } else {
                    ListTarget::Item
                },
            },
            Some(ListRule::Separated { min, max, .. }) => Self::SeparatedMinMax {
                min: *min,
                max: *max,
                target: match next.position {
                    RulePosition::END => ListTarget::End,
                    RulePosition::POSITION_SLIST_SEPARATOR => ListTarget::Separator,
                    _ => ListTarget::Item,
                },
            },
        }
    }

    /// Evaluate the guard once the transition has added its child.
    pub fn accepts(&self, child_count: u32) -> bool {
        let within_max = |count: u32, max: Option<u32>| max.map_or(true, |max| count <= max);
        let below_max = |count: u32, max: Option<u32>| max.map_or(true, |max| count < max);
        match *self {
            Self::AlwaysTrue => true,
            Self::MultiMinMax { min, max, target } => match target {
                ListTarget::End => min <= child_count && within_max(child_count, max),
                ListTarget::Item | ListTarget::Separator => below_max(child_count, max),
            },
            Self::SeparatedMinMax { min, max, target } => {
                let items = child_count / 2 + 1;
                match target {
                    ListTarget::End => min <= items && within_max(items, max),
                    ListTarget::Separator => below_max(items, max),
                    ListTarget::Item => within_max(items, max),
                }
            }
        }
    }
}

/// A pair of lookahead guard and the lookahead carried by the new node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Lookahead {
    pub guard: LookaheadSet,
    pub up: LookaheadSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Transition {
    pub(crate) from: StateID,
    pub(crate) to: StateID,
    pub(crate) action: Action,
    pub(crate) lookahead: Vec<Lookahead>,
    pub(crate) graft_prev_guard: Option<Vec<RulePosition>>,
    pub(crate) runtime_guard: RuntimeGuard,
    pub(crate) embedded: Option<SetID>,
}

impl Transition {
    pub fn from(&self) -> StateID {
        self.from
    }

    pub fn to(&self) -> StateID {
        self.to
    }

    pub fn action(&self) -> Action {
        self.action
    }

    /// Lookahead pairs, sorted and deduplicated.
    pub fn lookahead(&self) -> &[Lookahead] {
        &self.lookahead
    }

    /// Rule positions the previous state must contain for a GRAFT to apply.
    pub fn graft_prev_guard(&self) -> Option<&[RulePosition]> {
        self.graft_prev_guard.as_deref()
    }

    pub fn runtime_guard(&self) -> RuntimeGuard {
        self.runtime_guard
    }

    /// The state set parsing the embedded rule of an EMBED transition.
    pub fn embedded(&self) -> Option<SetID> {
        self.embedded
    }

    /// Whether the GRAFT guard admits a previous state with these rule positions.
    pub fn admits_previous(&self, previous: &[RulePosition]) -> bool {
        match &self.graft_prev_guard {
            None => true,
            Some(guard) => guard.iter().all(|rp| previous.contains(rp)),
        }
    }

    pub(crate) fn display<'a>(
        &'a self,
        view: &'a GrammarView<'a>,
        state_name: impl Fn(StateID) -> String + 'a,
    ) -> impl fmt::Display + 'a {
        display_fn(move |f| {
            write!(
                f,
                "{} --{}--> {}",
                state_name(self.from),
                self.action,
                state_name(self.to)
            )?;
            f.write_str(" [")?;
            for (i, la) in self.lookahead.iter().enumerate() {
                if i > 0 {
                    f.write_str(" | ")?;
                }
                write!(
                    f,
                    "{} -> {}",
                    la.guard.part().display(view),
                    la.up.part().display(view)
                )?;
            }
            f.write_str("]")?;
            if let Some(guard) = &self.graft_prev_guard {
                f.write_str(" prev=")?;
                for (i, rp) in guard.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", view.display_position(*rp))?;
                }
            }
            if self.runtime_guard != RuntimeGuard::AlwaysTrue {
                write!(f, " guard={:?}", self.runtime_guard)?;
            }
            if let Some(embedded) = self.embedded {
                write!(f, " embed={:?}", embedded)?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_guard_min1_max3() {
        let end = RuntimeGuard::MultiMinMax {
            min: 1,
            max: Some(3),
            target: ListTarget::End,
        };
        assert!(!end.accepts(0));
        assert!(end.accepts(1));
        assert!(end.accepts(2));
        assert!(end.accepts(3));
        assert!(!end.accepts(4));

        let item = RuntimeGuard::MultiMinMax {
            min: 1,
            max: Some(3),
            target: ListTarget::Item,
        };
        assert!(item.accepts(2));
        assert!(!item.accepts(3));
    }

    #[test]
    fn unbounded_multi_guard() {
        let item = RuntimeGuard::MultiMinMax {
            min: 2,
            max: None,
            target: ListTarget::Item,
        };
        assert!(item.accepts(100));
        let end = RuntimeGuard::MultiMinMax {
            min: 2,
            max: None,
            target: ListTarget::End,
        };
        assert!(!end.accepts(1));
        assert!(end.accepts(2));
    }

    #[test]
    fn separated_guard_counts_items() {
        let guard = |target| RuntimeGuard::SeparatedMinMax {
            min: 2,
            max: Some(3),
            target,
        };
        // item , item , item
        assert!(!guard(ListTarget::End).accepts(1));
        assert!(guard(ListTarget::End).accepts(3));
        assert!(guard(ListTarget::End).accepts(5));
        assert!(!guard(ListTarget::End).accepts(7));

        assert!(guard(ListTarget::Separator).accepts(3));
        assert!(!guard(ListTarget::Separator).accepts(5));

        assert!(guard(ListTarget::Item).accepts(4));
        assert!(!guard(ListTarget::Item).accepts(6));
    }

    #[test]
    fn always_true() {
        assert!(RuntimeGuard::AlwaysTrue.accepts(0));
        assert!(RuntimeGuard::AlwaysTrue.accepts(u32::MAX));
    }
}
