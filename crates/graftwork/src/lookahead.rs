//! Lookahead sets attached to transitions.

use crate::{grammar::RuleID, rule_position::GrammarView, types::Map, util::display_fn};
use std::{cmp::Ordering, fmt, hash::Hash, sync::Arc};

/// A set of terminal (and embedded) rules, keyed by rule number.
#[derive(Debug, Default, Clone)]
pub struct TerminalSet {
    inner: bit_set::BitSet,
}
impl TerminalSet {
    pub fn contains(&self, id: RuleID) -> bool {
        self.inner.contains(id.into_raw().into())
    }
    pub fn insert(&mut self, id: RuleID) -> bool {
        self.inner.insert(id.into_raw().into())
    }
    pub fn union_with(&mut self, other: &Self) {
        self.inner.union_with(&other.inner)
    }
    pub fn is_subset(&self, other: &Self) -> bool {
        self.inner.is_subset(&other.inner)
    }
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
    pub fn len(&self) -> usize {
        self.inner.len()
    }
    pub fn clear(&mut self) {
        self.inner.clear()
    }
    pub fn iter(&self) -> impl Iterator<Item = RuleID> + '_ {
        // rule numbers never exceed u16
        self.inner.iter().map(|raw| RuleID::from_raw(raw as u16))
    }
}
impl FromIterator<RuleID> for TerminalSet {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = RuleID>,
    {
        Self {
            inner: iter.into_iter().map(|t| t.into_raw().into()).collect(),
        }
    }
}
impl PartialEq for TerminalSet {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}
impl Eq for TerminalSet {}
impl Hash for TerminalSet {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for id in self.iter() {
            id.hash(state);
        }
    }
}
impl PartialOrd for TerminalSet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TerminalSet {
    fn cmp(&self, other: &Self) -> Ordering {
        self.iter().cmp(other.iter())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LookaheadError {
    #[error("the caller lookahead must not contain UP")]
    UnresolvedUp,

    #[error("reserved rule {0:?} cannot be a lookahead")]
    ReservedRule(RuleID),
}

/// The content of a lookahead set.
///
/// The pseudo terminals are flags, never members of `content`. A part
/// matching anything carries no other content.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LookaheadSetPart {
    matches_any: bool,
    includes_eot: bool,
    includes_up: bool,
    content: TerminalSet,
}

impl LookaheadSetPart {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn up() -> Self {
        Self {
            includes_up: true,
            ..Self::default()
        }
    }

    pub fn end_of_text() -> Self {
        Self {
            includes_eot: true,
            ..Self::default()
        }
    }

    pub fn any() -> Self {
        Self {
            matches_any: true,
            ..Self::default()
        }
    }

    /// Build a part from rule numbers, mapping the pseudo terminals onto flags.
    pub fn from_rules<I>(rules: I) -> Result<Self, LookaheadError>
    where
        I: IntoIterator<Item = RuleID>,
    {
        let mut part = Self::default();
        for rule in rules {
            part.insert(rule)?;
        }
        Ok(part)
    }

    pub fn from_terminals(content: TerminalSet) -> Self {
        Self {
            content,
            ..Self::default()
        }
    }

    pub fn insert(&mut self, rule: RuleID) -> Result<(), LookaheadError> {
        match rule {
            RuleID::GOAL => return Err(LookaheadError::ReservedRule(rule)),
            _ if self.matches_any => {}
            RuleID::USE_PARENT_LOOKAHEAD => self.includes_up = true,
            RuleID::END_OF_TEXT => self.includes_eot = true,
            RuleID::ANY => *self = Self::any(),
            rule => {
                self.content.insert(rule);
            }
        }
        Ok(())
    }

    pub fn content(&self) -> &TerminalSet {
        &self.content
    }

    pub fn includes_up(&self) -> bool {
        self.includes_up
    }

    pub fn includes_eot(&self) -> bool {
        self.includes_eot
    }

    pub fn matches_any(&self) -> bool {
        self.matches_any
    }

    pub fn is_empty(&self) -> bool {
        !self.matches_any && !self.includes_eot && !self.includes_up && self.content.is_empty()
    }

    pub fn union_with(&mut self, other: &Self) {
        if self.matches_any {
            return;
        }
        if other.matches_any {
            *self = Self::any();
            return;
        }
        self.includes_up |= other.includes_up;
        self.includes_eot |= other.includes_eot;
        self.content.union_with(&other.content);
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut union = self.clone();
        union.union_with(other);
        union
    }

    /// Whether every member of `self` is a member of `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        if other.matches_any {
            return true;
        }
        !self.matches_any
            && (!self.includes_up || other.includes_up)
            && (!self.includes_eot || other.includes_eot)
            && self.content.is_subset(&other.content)
    }

    /// Replace UP with the content of the calling context.
    pub fn resolve_up(&self, caller: &Self) -> Result<Self, LookaheadError> {
        if caller.includes_up {
            return Err(LookaheadError::UnresolvedUp);
        }
        if !self.includes_up {
            return Ok(self.clone());
        }
        let mut resolved = Self {
            includes_up: false,
            ..self.clone()
        };
        resolved.union_with(caller);
        Ok(resolved)
    }

    pub fn display<'g>(&'g self, view: &'g GrammarView<'g>) -> impl fmt::Display + 'g {
        display_fn(move |f| {
            if self.matches_any {
                return f.write_str("{<any>}");
            }
            let mut names: Vec<String> = self
                .content
                .iter()
                .map(|rule| view.rule_name(rule).to_string())
                .collect();
            names.sort();
            if self.includes_eot {
                names.push("<eot>".into());
            }
            if self.includes_up {
                names.push("<up>".into());
            }
            write!(f, "{{{}}}", names.join(", "))
        })
    }
}

/// An interned lookahead set.
///
/// Equality, hashing and ordering only look at the content, so numbering
/// never affects the shape of the automaton.
#[derive(Clone)]
pub struct LookaheadSet {
    number: u32,
    part: Arc<LookaheadSetPart>,
}

impl LookaheadSet {
    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn part(&self) -> &LookaheadSetPart {
        &self.part
    }

    pub fn includes_up(&self) -> bool {
        self.part.includes_up
    }

    pub fn resolve_up(&self, caller: &LookaheadSetPart) -> Result<LookaheadSetPart, LookaheadError> {
        self.part.resolve_up(caller)
    }
}

impl fmt::Debug for LookaheadSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LA#{}{:?}", self.number, self.part)
    }
}
impl PartialEq for LookaheadSet {
    fn eq(&self, other: &Self) -> bool {
        self.part == other.part
    }
}
impl Eq for LookaheadSet {}
impl Hash for LookaheadSet {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.part.hash(state)
    }
}
impl PartialOrd for LookaheadSet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for LookaheadSet {
    fn cmp(&self, other: &Self) -> Ordering {
        self.part.cmp(&other.part)
    }
}

/// Interning table of lookahead sets, one per parser state set.
#[derive(Debug)]
pub struct LookaheadSetTable {
    sets: Map<Arc<LookaheadSetPart>, u32>,
}

impl Default for LookaheadSetTable {
    fn default() -> Self {
        let mut table = Self {
            sets: Map::default(),
        };
        table.intern(LookaheadSetPart::empty());
        table.intern(LookaheadSetPart::up());
        table.intern(LookaheadSetPart::end_of_text());
        table.intern(LookaheadSetPart::any());
        table
    }
}

impl LookaheadSetTable {
    pub fn intern(&mut self, part: LookaheadSetPart) -> LookaheadSet {
        if let Some((part, &number)) = self.sets.get_key_value(&part) {
            return LookaheadSet {
                number,
                part: part.clone(),
            };
        }
        let number = self.sets.len() as u32;
        let part = Arc::new(part);
        self.sets.insert(part.clone(), number);
        LookaheadSet { number, part }
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

impl crate::digraph::Set for LookaheadSetPart {
    fn union_with(&mut self, other: &Self) {
        self.union_with(other)
    }
}
