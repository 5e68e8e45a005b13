//! A backtracking recognizer driven by the runtime transitions of an automaton.
//!
//! Every path through the transitions is explored, so the number of
//! completed paths is the number of parses of the input. Only literal
//! terminals are supported.

use anyhow::{bail, Context as _};
use graftwork::{
    grammar::{RuleKind, TerminalRule, TerminalValue},
    lookahead::LookaheadSetPart,
    Action, Automaton, CallingContext, ParserStateSet, RuleID, StateID, Transition,
};
use std::{cell::Cell, rc::Rc};

const MAX_STEPS: usize = 1_000_000;

/// A node of the parse stack.
struct Node {
    state: StateID,
    /// The concrete lookahead the node was created with.
    lookahead: LookaheadSetPart,
    /// Number of children grafted into the node so far.
    children: u32,
    prev: Option<Rc<Node>>,
}

pub struct Recognizer<'a> {
    automaton: &'a Automaton,
    steps: Cell<usize>,
}

impl<'a> Recognizer<'a> {
    pub fn new(automaton: &'a Automaton) -> Self {
        Self {
            automaton,
            steps: Cell::new(0),
        }
    }

    /// The number of parses of the whole `text`.
    pub fn count_parses(&self, text: &str) -> anyhow::Result<usize> {
        self.steps.set(0);
        let root = self.automaton.root();
        let start = self.skip(root, text, 0)?;
        let ends = self.parse(root, text, start, LookaheadSetPart::end_of_text())?;
        tracing::debug!("{:?}: {} steps", text, self.steps.get());
        Ok(ends.into_iter().filter(|&end| end == text.len()).count())
    }

    pub fn recognize(&self, text: &str) -> anyhow::Result<bool> {
        Ok(self.count_parses(text)? > 0)
    }

    /// End positions of every parse of `set` starting at `pos`, one entry per parse.
    fn parse(
        &self,
        set: &ParserStateSet,
        text: &str,
        pos: usize,
        lookahead: LookaheadSetPart,
    ) -> anyhow::Result<Vec<usize>> {
        let start = Rc::new(Node {
            state: StateID::START,
            lookahead,
            children: 0,
            prev: None,
        });
        let mut ends = vec![];
        self.step(set, text, pos, start, &mut ends)?;
        Ok(ends)
    }

    fn step(
        &self,
        set: &ParserStateSet,
        text: &str,
        pos: usize,
        node: Rc<Node>,
        ends: &mut Vec<usize>,
    ) -> anyhow::Result<()> {
        let steps = self.steps.get() + 1;
        if steps > MAX_STEPS {
            bail!("gave up after {} steps", MAX_STEPS);
        }
        self.steps.set(steps);

        if set.state(node.state)?.is_goal() {
            ends.push(pos);
            return Ok(());
        }

        let prev = node.prev.as_ref();
        let context = CallingContext::new(
            prev.and_then(|prev| prev.prev.as_ref()).map(|pp| pp.state),
            prev.map(|prev| prev.state),
        );
        for transition in set.transitions_for(node.state, context)?.iter() {
            match transition.action() {
                Action::Width => {
                    if let Some(end) = self.match_terminal(set, text, pos, transition)? {
                        let after = self.skip(set, text, end)?;
                        self.shift(set, text, after, &node, transition, ends)?;
                    }
                }
                Action::Embed => {
                    let embedded = transition
                        .embedded()
                        .context("EMBED transition without a state set")?;
                    let embedded = self.automaton.state_set(embedded)?;
                    for end in self.parse(embedded, text, pos, LookaheadSetPart::any())? {
                        let after = self.skip(set, text, end)?;
                        self.shift(set, text, after, &node, transition, ends)?;
                    }
                }
                Action::Height | Action::Graft | Action::Goal => {
                    let prev = prev.context("completed state without a previous node")?;
                    self.reduce(set, text, pos, prev, transition, ends)?;
                }
            }
        }
        Ok(())
    }

    fn shift(
        &self,
        set: &ParserStateSet,
        text: &str,
        pos: usize,
        node: &Rc<Node>,
        transition: &Transition,
        ends: &mut Vec<usize>,
    ) -> anyhow::Result<()> {
        if let Some(lookahead) = self.admitted(set, text, pos, transition, &node.lookahead)? {
            let next = Rc::new(Node {
                state: transition.to(),
                lookahead,
                children: 0,
                prev: Some(node.clone()),
            });
            self.step(set, text, pos, next, ends)?;
        }
        Ok(())
    }

    fn reduce(
        &self,
        set: &ParserStateSet,
        text: &str,
        pos: usize,
        prev: &Rc<Node>,
        transition: &Transition,
        ends: &mut Vec<usize>,
    ) -> anyhow::Result<()> {
        let (children, below) = match transition.action() {
            Action::Height => (1, Some(prev.clone())),
            _ => (prev.children + 1, prev.prev.clone()),
        };
        if !transition.runtime_guard().accepts(children) {
            return Ok(());
        }
        if let Some(lookahead) = self.admitted(set, text, pos, transition, &prev.lookahead)? {
            let next = Rc::new(Node {
                state: transition.to(),
                lookahead,
                children,
                prev: below,
            });
            self.step(set, text, pos, next, ends)?;
        }
        Ok(())
    }

    /// The lookahead of the new node, if any guard of `transition` matches at `pos`.
    fn admitted(
        &self,
        set: &ParserStateSet,
        text: &str,
        pos: usize,
        transition: &Transition,
        caller: &LookaheadSetPart,
    ) -> anyhow::Result<Option<LookaheadSetPart>> {
        let mut admitted: Option<LookaheadSetPart> = None;
        for lookahead in transition.lookahead() {
            let guard = lookahead.guard.resolve_up(caller)?;
            if !self.lookahead_matches(set, text, pos, &guard)? {
                continue;
            }
            let up = lookahead.up.resolve_up(caller)?;
            match &mut admitted {
                Some(admitted) => admitted.union_with(&up),
                None => admitted = Some(up),
            }
        }
        Ok(admitted)
    }

    fn lookahead_matches(
        &self,
        set: &ParserStateSet,
        text: &str,
        pos: usize,
        lookahead: &LookaheadSetPart,
    ) -> anyhow::Result<bool> {
        if lookahead.matches_any() || (lookahead.includes_eot() && pos == text.len()) {
            return Ok(true);
        }
        for terminal in lookahead.content().iter() {
            if self.starts_with(set, text, pos, terminal)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether `text[pos..]` may start with `rule`.
    fn starts_with(
        &self,
        set: &ParserStateSet,
        text: &str,
        pos: usize,
        rule: RuleID,
    ) -> anyhow::Result<bool> {
        match set.graph().rule(rule).kind() {
            RuleKind::Terminal(terminal) if terminal.is_empty => Ok(true),
            RuleKind::Terminal(terminal) => Ok(text[pos..].starts_with(literal(terminal)?)),
            RuleKind::Embedded(..) => {
                let embedded = set
                    .embedded_set(rule)
                    .with_context(|| format!("no state set for {:?}", rule))?;
                let embedded = self.automaton.state_set(embedded)?;
                let first_sets = embedded.first_sets();
                if first_sets.is_nullable(embedded.goal()) {
                    return Ok(true);
                }
                for terminal in first_sets.first_of_rule(embedded.goal()).iter() {
                    if self.starts_with(embedded, text, pos, terminal)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            RuleKind::NonTerminal(..) => bail!("{:?} is not a terminal", rule),
        }
    }

    /// The end of the terminal shifted by a WIDTH transition, if it matches at `pos`.
    fn match_terminal(
        &self,
        set: &ParserStateSet,
        text: &str,
        pos: usize,
        transition: &Transition,
    ) -> anyhow::Result<Option<usize>> {
        let to = set.state(transition.to())?;
        let rule = to
            .rule_positions()
            .first()
            .context("WIDTH target without rule positions")?
            .rule;
        match set.graph().rule(rule).kind() {
            RuleKind::Terminal(terminal) if terminal.is_empty => Ok(Some(pos)),
            RuleKind::Terminal(terminal) => {
                let literal = literal(terminal)?;
                Ok(text[pos..]
                    .starts_with(literal)
                    .then(|| pos + literal.len()))
            }
            _ => bail!("WIDTH target {:?} is not a terminal", rule),
        }
    }

    /// Position after the skip rules matched at `pos`.
    fn skip(&self, set: &ParserStateSet, text: &str, pos: usize) -> anyhow::Result<usize> {
        let skip = match set.skip() {
            Some(skip) => self.automaton.state_set(skip)?,
            None => return Ok(pos),
        };
        let ends = self.parse(skip, text, pos, LookaheadSetPart::any())?;
        Ok(ends.into_iter().max().unwrap_or(pos))
    }
}

fn literal(terminal: &TerminalRule) -> anyhow::Result<&str> {
    match &terminal.value {
        TerminalValue::Literal(text) => Ok(text),
        TerminalValue::Pattern(pattern) => bail!("pattern terminals are not supported: {}", pattern),
    }
}
