//! Rule conditions and their AND/OR evaluation.
use crate::context::RewriteContext;
use crate::pattern::{Captures, MatchResults, Matcher};
use crate::template::{BackReferences, Template};

/// How a rule combines the results of its conditions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogicalGrouping {
    /// Every condition must pass
    #[default]
    MatchAll,
    /// At least one condition must pass
    MatchAny,
}

/// Single condition: an input template tested against a [`Matcher`].
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    input: Template,
    matcher: Matcher,
    or_next: bool,
}

impl Condition {
    pub fn new(input: Template, matcher: Matcher) -> Self {
        Self {
            input,
            matcher,
            or_next: false,
        }
    }

    /// Chain this condition with the following one using OR, within an
    /// otherwise AND grouped list (`[OR]` in mod_rewrite).
    pub fn or_next(mut self, or_next: bool) -> Self {
        self.or_next = or_next;
        self
    }

    #[inline]
    pub fn input(&self) -> &Template {
        &self.input
    }

    #[inline]
    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    #[inline]
    pub fn is_negated(&self) -> bool {
        self.matcher.is_negated()
    }

    #[inline]
    pub fn is_or_next(&self) -> bool {
        self.or_next
    }

    /// Resolve the input and test it against the matcher.
    pub fn evaluate(&self, ctx: &RewriteContext, refs: &BackReferences) -> MatchResults {
        let input = self.input.evaluate(ctx, refs);
        self.matcher.evaluate(&input)
    }
}

/// Ordered condition list with its grouping policy.
///
/// Without capture tracking `{C:n}` refers to the groups of the last
/// evaluated condition. With tracking every group of every evaluated
/// condition, group `0` included, is appended in order: for two conditions
/// with one group each `{C:0}`..`{C:3}` are the first whole match, its group,
/// the second whole match and its group.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Conditions {
    items: Vec<Condition>,
    grouping: LogicalGrouping,
    track_all_captures: bool,
}

impl Conditions {
    pub fn new(items: Vec<Condition>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    pub fn grouping(mut self, grouping: LogicalGrouping) -> Self {
        self.grouping = grouping;
        self
    }

    pub fn track_all_captures(mut self, track: bool) -> Self {
        self.track_all_captures = track;
        self
    }

    #[inline]
    pub fn items(&self) -> &[Condition] {
        &self.items
    }

    #[inline]
    pub fn logical_grouping(&self) -> LogicalGrouping {
        self.grouping
    }

    #[inline]
    pub fn is_tracking_all_captures(&self) -> bool {
        self.track_all_captures
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Evaluate the conditions in order, short-circuiting per the grouping.
    ///
    /// Returns the condition captures on success. An empty list always
    /// succeeds.
    pub fn evaluate(&self, ctx: &RewriteContext, rule: &Captures) -> Option<Captures> {
        let mut tracker = Tracker::new(self.track_all_captures);
        match self.grouping {
            LogicalGrouping::MatchAny if !self.items.is_empty() => {
                for condition in &self.items {
                    let result = condition.evaluate(ctx, &tracker.refs(rule));
                    let success = result.success;
                    tracker.record(result.captures);
                    if success {
                        return Some(tracker.finish());
                    }
                }
                None
            }
            _ => {
                let mut index = 0;
                while let Some(condition) = self.items.get(index) {
                    let result = condition.evaluate(ctx, &tracker.refs(rule));
                    let success = result.success;
                    tracker.record(result.captures);
                    if success {
                        // skip the remaining alternatives of this OR chain
                        while self.items[index].or_next && index + 1 < self.items.len() {
                            index += 1;
                        }
                    } else if !condition.or_next || index + 1 == self.items.len() {
                        return None;
                    }
                    index += 1;
                }
                Some(tracker.finish())
            }
        }
    }
}

/// Accumulates condition captures per the track-all policy.
struct Tracker {
    track_all: bool,
    captures: Captures,
}

impl Tracker {
    fn new(track_all: bool) -> Self {
        Self {
            track_all,
            captures: Captures::default(),
        }
    }

    fn refs(&self, rule: &Captures) -> BackReferences {
        BackReferences::new(rule.clone(), self.captures.clone())
    }

    fn record(&mut self, captures: Captures) {
        if !self.track_all {
            self.captures = captures;
            return;
        }
        self.captures.extend(captures.iter());
    }

    fn finish(self) -> Captures {
        self.captures
    }
}
