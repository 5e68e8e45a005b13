//! The rule graph consumed by the automaton builder.
//!
//! A rule graph is immutable once defined. Every graph contains the shared
//! empty terminal [`RuleID::EMPTY`]; the pseudo rules used by the automaton
//! (goal, end of text, parent lookahead, any) are reserved numbers that never
//! appear as items.

use crate::{types::Map, util::display_fn};
use std::{fmt, marker::PhantomData, sync::Arc};

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct RuleID {
    raw: u16,
}

impl RuleID {
    /// The empty terminal, matching zero characters.
    pub const EMPTY: Self = Self::new(0);

    /// The goal wrapper rule of a parser state set.
    pub const GOAL: Self = Self::new(u16::MAX);

    /// Pseudo terminal standing for the end of the input text.
    pub const END_OF_TEXT: Self = Self::new(u16::MAX - 1);

    /// Pseudo terminal standing for the lookahead of the calling context.
    pub const USE_PARENT_LOOKAHEAD: Self = Self::new(u16::MAX - 2);

    /// Pseudo terminal matching any input.
    pub const ANY: Self = Self::new(u16::MAX - 3);

    const RESERVED: u16 = u16::MAX - 3;

    #[inline]
    const fn new(raw: u16) -> Self {
        Self { raw }
    }

    #[inline]
    pub const fn into_raw(self) -> u16 {
        self.raw
    }

    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self::new(raw)
    }

    /// Whether this number denotes one of the automaton's pseudo rules.
    pub const fn is_reserved(self) -> bool {
        self.raw >= Self::RESERVED
    }
}

impl fmt::Debug for RuleID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::EMPTY => f.write_str("R#Empty"),
            Self::GOAL => f.write_str("R#Goal"),
            Self::END_OF_TEXT => f.write_str("R#EOT"),
            Self::USE_PARENT_LOOKAHEAD => f.write_str("R#Up"),
            Self::ANY => f.write_str("R#Any"),
            _ => write!(f, "R#{:03}", self.raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TerminalValue {
    Literal(String),
    Pattern(String),
}

#[derive(Debug, Clone)]
pub struct TerminalRule {
    pub value: TerminalValue,
    /// The terminal matches the empty string.
    pub is_empty: bool,
}

/// A rule whose content is parsed by the automaton of another rule graph.
#[derive(Debug, Clone)]
pub struct EmbeddedRule {
    pub graph: Arc<RuleGraph>,
    pub goal: RuleID,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListRule {
    Multi {
        item: RuleID,
        min: u32,
        max: Option<u32>,
    },
    Separated {
        item: RuleID,
        separator: RuleID,
        min: u32,
        max: Option<u32>,
    },
}

impl ListRule {
    pub fn min(&self) -> u32 {
        match *self {
            Self::Multi { min, .. } | Self::Separated { min, .. } => min,
        }
    }

    pub fn max(&self) -> Option<u32> {
        match *self {
            Self::Multi { max, .. } | Self::Separated { max, .. } => max,
        }
    }

    pub fn item(&self) -> RuleID {
        match *self {
            Self::Multi { item, .. } | Self::Separated { item, .. } => item,
        }
    }
}

/// The right-hand side of a non-terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleItems {
    /// Derives the empty terminal only.
    Empty,
    Concatenation(Vec<RuleID>),
    /// Each alternative is a concatenation of items.
    Choice(Vec<Vec<RuleID>>),
    List(ListRule),
}

#[derive(Debug, Clone)]
pub enum RuleKind {
    Terminal(TerminalRule),
    Embedded(EmbeddedRule),
    NonTerminal(RuleItems),
}

#[derive(Debug)]
pub struct Rule {
    id: RuleID,
    tag: String,
    kind: RuleKind,
    is_skip: bool,
}

impl Rule {
    pub fn id(&self) -> RuleID {
        self.id
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }

    pub fn is_skip(&self) -> bool {
        self.is_skip
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, RuleKind::Terminal(..))
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self.kind, RuleKind::Embedded(..))
    }

    /// Return the right-hand side if this rule is a non-terminal.
    pub fn items(&self) -> Option<&RuleItems> {
        match &self.kind {
            RuleKind::NonTerminal(items) => Some(items),
            _ => None,
        }
    }

    /// Every rule referenced from the right-hand side, in order of appearance.
    pub fn referenced_rules(&self) -> Vec<RuleID> {
        match &self.kind {
            RuleKind::Terminal(..) | RuleKind::Embedded(..) => vec![],
            RuleKind::NonTerminal(items) => match items {
                RuleItems::Empty => vec![RuleID::EMPTY],
                RuleItems::Concatenation(items) => items.clone(),
                RuleItems::Choice(alternatives) => alternatives.iter().flatten().copied().collect(),
                RuleItems::List(ListRule::Multi { item, min, .. }) => {
                    let mut rules = vec![*item];
                    if *min == 0 {
                        rules.push(RuleID::EMPTY);
                    }
                    rules
                }
                RuleItems::List(ListRule::Separated {
                    item,
                    separator,
                    min,
                    ..
                }) => {
                    let mut rules = vec![*item, *separator];
                    if *min == 0 {
                        rules.push(RuleID::EMPTY);
                    }
                    rules
                }
            },
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            RuleKind::Terminal(TerminalRule { is_empty: true, .. }) => f.write_str("<empty>"),
            RuleKind::Terminal(TerminalRule {
                value: TerminalValue::Literal(text),
                ..
            }) => write!(f, "'{}'", text),
            RuleKind::Terminal(TerminalRule {
                value: TerminalValue::Pattern(..),
                ..
            })
            | RuleKind::Embedded(..)
            | RuleKind::NonTerminal(..) => f.write_str(&self.tag),
        }
    }
}

/// An immutable graph of terminal and non-terminal rules.
#[derive(Debug)]
pub struct RuleGraph {
    rules: Vec<Rule>,
    tags: Map<String, RuleID>,
    skip_goal: Option<RuleID>,
}

impl fmt::Display for RuleGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## terminals:")?;
        for rule in self.rules.iter().filter(|r| r.id != RuleID::EMPTY) {
            if let RuleKind::Terminal(terminal) = &rule.kind {
                match &terminal.value {
                    TerminalValue::Literal(..) => writeln!(f, "{}", rule)?,
                    TerminalValue::Pattern(pattern) => writeln!(f, "{} = \"{}\"", rule, pattern)?,
                }
            }
        }

        writeln!(f, "\n## rules:")?;
        for rule in &self.rules {
            match &rule.kind {
                RuleKind::Terminal(..) => continue,
                RuleKind::Embedded(embedded) => {
                    writeln!(
                        f,
                        "{} = embedded {}",
                        rule,
                        embedded.graph.rule(embedded.goal)
                    )?;
                }
                RuleKind::NonTerminal(items) => {
                    writeln!(f, "{} = {}", rule, self.display_items(items))?;
                }
            }
        }

        Ok(())
    }
}

impl RuleGraph {
    /// Define a rule graph using the specified function.
    pub fn define<F>(f: F) -> Result<Self, GrammarDefError>
    where
        F: FnOnce(&mut GrammarDef<'_>) -> Result<(), GrammarDefError>,
    {
        let mut def = GrammarDef {
            rules: vec![],
            tags: Map::default(),
            defined: vec![],
            skip: vec![],
            _marker: PhantomData,
        };
        def.push(
            "<empty>".into(),
            RuleKind::Terminal(TerminalRule {
                value: TerminalValue::Literal(String::new()),
                is_empty: true,
            }),
        )?;

        f(&mut def)?;

        def.end()
    }

    /// Return the rule with the specified number.
    ///
    /// # Panics
    /// Panics if `id` is a reserved number or does not belong to this graph.
    pub fn rule(&self, id: RuleID) -> &Rule {
        &self.rules[usize::from(id.raw)]
    }

    pub fn get(&self, id: RuleID) -> Option<&Rule> {
        self.rules.get(usize::from(id.raw))
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> + '_ {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Look up a rule by its tag.
    pub fn find(&self, tag: &str) -> Option<RuleID> {
        self.tags.get(tag).copied()
    }

    /// The goal of the skip automaton, if any rule is marked as skip.
    pub fn skip_goal(&self) -> Option<RuleID> {
        self.skip_goal
    }

    fn display_items<'g>(&'g self, items: &'g RuleItems) -> impl fmt::Display + 'g {
        display_fn(move |f| {
            let seq = |f: &mut fmt::Formatter<'_>, items: &[RuleID]| -> fmt::Result {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", self.rule(*item))?;
                }
                Ok(())
            };
            match items {
                RuleItems::Empty => f.write_str("<empty>"),
                RuleItems::Concatenation(items) => seq(f, items),
                RuleItems::Choice(alternatives) => {
                    for (i, alternative) in alternatives.iter().enumerate() {
                        if i > 0 {
                            f.write_str(" | ")?;
                        }
                        seq(f, alternative)?;
                    }
                    Ok(())
                }
                RuleItems::List(list) => {
                    match list {
                        ListRule::Multi { item, .. } => write!(f, "[{}]", self.rule(*item))?,
                        ListRule::Separated {
                            item, separator, ..
                        } => write!(f, "[{} / {}]", self.rule(*item), self.rule(*separator))?,
                    }
                    match list.max() {
                        Some(max) => write!(f, "{{{},{}}}", list.min(), max),
                        None => write!(f, "{{{},}}", list.min()),
                    }
                }
            }
        })
    }
}

/// Items of a sequence and alternatives of a choice are numbered by `u16`,
/// with `u16::MAX` marking the end of a rule.
const MAX_SEQUENCE_LEN: usize = u16::MAX as usize;

/// The contextual values for building a `RuleGraph`.
#[derive(Debug)]
pub struct GrammarDef<'def> {
    rules: Vec<Rule>,
    tags: Map<String, RuleID>,
    defined: Vec<bool>,
    skip: Vec<RuleID>,
    _marker: PhantomData<&'def mut ()>,
}

impl<'def> GrammarDef<'def> {
    fn push(&mut self, tag: String, kind: RuleKind) -> Result<RuleID, GrammarDefError> {
        if self.tags.contains_key(&tag) {
            return Err(GrammarDefError::DuplicateTag(tag));
        }
        let raw = u16::try_from(self.rules.len()).map_err(|_| GrammarDefError::TooManyRules)?;
        let id = RuleID::new(raw);
        if id.is_reserved() {
            return Err(GrammarDefError::TooManyRules);
        }
        self.defined.push(!matches!(kind, RuleKind::NonTerminal(..)));
        self.tags.insert(tag.clone(), id);
        self.rules.push(Rule {
            id,
            tag,
            kind,
            is_skip: false,
        });
        Ok(id)
    }

    /// Declare a literal terminal. Declaring the same literal twice returns the same rule.
    pub fn literal(&mut self, text: &str) -> Result<RuleID, GrammarDefError> {
        let tag = format!("'{}'", text);
        if let Some(&id) = self.tags.get(&tag) {
            return Ok(id);
        }
        if text.is_empty() {
            return Err("an empty literal must be written as an empty rule".into());
        }
        self.push(
            tag,
            RuleKind::Terminal(TerminalRule {
                value: TerminalValue::Literal(text.to_owned()),
                is_empty: false,
            }),
        )
    }

    /// Declare a pattern terminal.
    pub fn pattern(&mut self, tag: &str, pattern: &str) -> Result<RuleID, GrammarDefError> {
        self.push(
            tag.to_owned(),
            RuleKind::Terminal(TerminalRule {
                value: TerminalValue::Pattern(pattern.to_owned()),
                is_empty: false,
            }),
        )
    }

    /// Declare an embedded rule that parses `goal` of another rule graph.
    pub fn embedded(
        &mut self,
        tag: &str,
        graph: Arc<RuleGraph>,
        goal: &str,
    ) -> Result<RuleID, GrammarDefError> {
        let goal_id = graph
            .find(goal)
            .ok_or_else(|| GrammarDefError::UnknownRule(goal.to_owned()))?;
        if graph.rule(goal_id).items().is_none() {
            return Err(GrammarDefError::InvalidEmbeddedGoal(goal.to_owned()));
        }
        self.push(
            tag.to_owned(),
            RuleKind::Embedded(EmbeddedRule {
                graph,
                goal: goal_id,
            }),
        )
    }

    /// Declare a non-terminal; its items are given by one of the defining methods.
    pub fn nonterminal(&mut self, tag: &str) -> Result<RuleID, GrammarDefError> {
        self.push(tag.to_owned(), RuleKind::NonTerminal(RuleItems::Empty))
    }

    pub fn empty(&mut self, rule: RuleID) -> Result<(), GrammarDefError> {
        self.define_items(rule, RuleItems::Empty)
    }

    pub fn concatenation<I>(&mut self, rule: RuleID, items: I) -> Result<(), GrammarDefError>
    where
        I: IntoIterator<Item = RuleID>,
    {
        let items: Vec<_> = items.into_iter().collect();
        if items.is_empty() {
            return Err(GrammarDefError::EmptySequence(self.tag(rule)));
        }
        if items.len() > MAX_SEQUENCE_LEN {
            return Err(GrammarDefError::TooManyItems(self.tag(rule)));
        }
        self.define_items(rule, RuleItems::Concatenation(items))
    }

    pub fn choice<I, A>(&mut self, rule: RuleID, alternatives: I) -> Result<(), GrammarDefError>
    where
        I: IntoIterator<Item = A>,
        A: IntoIterator<Item = RuleID>,
    {
        let alternatives: Vec<Vec<_>> = alternatives
            .into_iter()
            .map(|a| a.into_iter().collect())
            .collect();
        if alternatives.is_empty() || alternatives.iter().any(|a| a.is_empty()) {
            return Err(GrammarDefError::EmptySequence(self.tag(rule)));
        }
        if alternatives.len() > MAX_SEQUENCE_LEN
            || alternatives.iter().any(|a| a.len() > MAX_SEQUENCE_LEN)
        {
            return Err(GrammarDefError::TooManyItems(self.tag(rule)));
        }
        self.define_items(rule, RuleItems::Choice(alternatives))
    }

    pub fn multi(
        &mut self,
        rule: RuleID,
        item: RuleID,
        min: u32,
        max: Option<u32>,
    ) -> Result<(), GrammarDefError> {
        self.define_items(rule, RuleItems::List(ListRule::Multi { item, min, max }))
    }

    /// Shorthand for a multi rule taking zero or one item.
    pub fn optional(&mut self, rule: RuleID, item: RuleID) -> Result<(), GrammarDefError> {
        self.multi(rule, item, 0, Some(1))
    }

    pub fn separated_list(
        &mut self,
        rule: RuleID,
        item: RuleID,
        separator: RuleID,
        min: u32,
        max: Option<u32>,
    ) -> Result<(), GrammarDefError> {
        self.define_items(
            rule,
            RuleItems::List(ListRule::Separated {
                item,
                separator,
                min,
                max,
            }),
        )
    }

    /// Mark a rule to be parsed between ordinary tokens.
    pub fn skip(&mut self, rule: RuleID) -> Result<(), GrammarDefError> {
        self.check_item(rule)?;
        if !self.skip.contains(&rule) {
            self.skip.push(rule);
        }
        Ok(())
    }

    fn tag(&self, rule: RuleID) -> String {
        self.rules
            .get(usize::from(rule.raw))
            .map_or_else(|| format!("{:?}", rule), |r| r.tag.clone())
    }

    fn check_item(&self, item: RuleID) -> Result<(), GrammarDefError> {
        if item.is_reserved() {
            return Err(GrammarDefError::ReservedRule(item));
        }
        if usize::from(item.raw) >= self.rules.len() {
            return Err(GrammarDefError::UnknownRule(format!("{:?}", item)));
        }
        Ok(())
    }

    fn define_items(&mut self, rule: RuleID, items: RuleItems) -> Result<(), GrammarDefError> {
        self.check_item(rule)?;
        let index = usize::from(rule.raw);
        if !matches!(self.rules[index].kind, RuleKind::NonTerminal(..)) {
            return Err(GrammarDefError::Other {
                msg: format!("`{}' is not a non-terminal", self.rules[index].tag),
            });
        }
        if self.defined[index] {
            return Err(GrammarDefError::Other {
                msg: format!("`{}' has already been defined", self.rules[index].tag),
            });
        }
        if let RuleItems::List(list) = &items {
            if list.max() == Some(0) || list.max().map_or(false, |max| max < list.min()) {
                return Err(GrammarDefError::InvalidCardinality(self.tag(rule)));
            }
        }
        self.rules[index].kind = RuleKind::NonTerminal(items);
        self.defined[index] = true;
        Ok(())
    }

    fn end(mut self) -> Result<RuleGraph, GrammarDefError> {
        for (index, rule) in self.rules.iter().enumerate() {
            if !self.defined[index] {
                return Err(GrammarDefError::Undefined(rule.tag.clone()));
            }
            for item in rule.referenced_rules() {
                self.check_item(item)?;
            }
        }

        let skip_goal = if self.skip.is_empty() {
            None
        } else {
            for &rule in &self.skip {
                self.rules[usize::from(rule.raw)].is_skip = true;
            }
            let skip = std::mem::take(&mut self.skip);
            let choice = self.nonterminal("<skip-choice>")?;
            self.choice(choice, skip.into_iter().map(|rule| [rule]))?;
            let multi = self.nonterminal("<skip-multi>")?;
            self.multi(multi, choice, 1, None)?;
            self.rules[usize::from(choice.raw)].is_skip = true;
            self.rules[usize::from(multi.raw)].is_skip = true;
            Some(multi)
        };

        tracing::trace!("defined rule graph with {} rules", self.rules.len());

        Ok(RuleGraph {
            rules: self.rules,
            tags: self.tags,
            skip_goal,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GrammarDefError {
    #[error("the tag `{0}' has already been used")]
    DuplicateTag(String),

    #[error("unknown rule `{0}'")]
    UnknownRule(String),

    #[error("the reserved rule {0:?} cannot be used as an item")]
    ReservedRule(RuleID),

    #[error("the non-terminal `{0}' has no items")]
    Undefined(String),

    #[error("the rule `{0}' has an empty concatenation")]
    EmptySequence(String),

    #[error("the list rule `{0}' has an invalid cardinality")]
    InvalidCardinality(String),

    #[error("the embedded goal `{0}' is not a non-terminal")]
    InvalidEmbeddedGoal(String),

    #[error("too many rules in one graph")]
    TooManyRules,

    #[error("the rule `{0}' has too many items or alternatives")]
    TooManyItems(String),

    #[error("Other error: {}", msg)]
    Other { msg: String },
}
impl From<&str> for GrammarDefError {
    fn from(msg: &str) -> Self {
        Self::Other { msg: msg.into() }
    }
}
impl From<String> for GrammarDefError {
    fn from(msg: String) -> Self {
        Self::Other { msg }
    }
}
