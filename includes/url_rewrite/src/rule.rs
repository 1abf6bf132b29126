use crate::action::Action;
use crate::conditions::Conditions;
use crate::context::{RewriteContext, RuleResult};
use crate::error::EngineError;
use crate::pattern::Matcher;
use crate::template::BackReferences;

/// Singular rewrite rule.
///
/// It contains a [`Matcher`] tested against the request path, a list of
/// [`Conditions`] guarding it, and the [`Action`] applied when both
/// succeed.
#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    name: String,
    enabled: bool,
    matcher: Matcher,
    relative: bool,
    conditions: Conditions,
    action: Action,
    stop_processing: bool,
    escape_back_references: bool,
}

impl Rule {
    pub fn new<S: Into<String>>(name: S, matcher: Matcher, action: Action) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            matcher,
            relative: true,
            conditions: Conditions::default(),
            action,
            stop_processing: false,
            escape_back_references: false,
        }
    }

    /// Disabled rules are skipped by the engine entirely.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Match against the path without its leading `/` (IIS style) instead
    /// of the full path (mod_rewrite style).
    pub fn relative(mut self, relative: bool) -> Self {
        self.relative = relative;
        self
    }

    pub fn conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = conditions;
        self
    }

    /// Halt the pipeline after this rule matches.
    pub fn stop_processing(mut self, stop: bool) -> Self {
        self.stop_processing = stop;
        self
    }

    /// Percent-encode back-reference values substituted into the action.
    pub fn escape_back_references(mut self, escape: bool) -> Self {
        self.escape_back_references = escape;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    #[inline]
    pub fn is_relative(&self) -> bool {
        self.relative
    }

    #[inline]
    pub fn get_conditions(&self) -> &Conditions {
        &self.conditions
    }

    #[inline]
    pub fn action(&self) -> &Action {
        &self.action
    }

    #[inline]
    pub fn is_stop_processing(&self) -> bool {
        self.stop_processing
    }

    /// Evaluate the rule against the context, applying its action on match.
    ///
    /// Non-matching rules report [`RuleResult::Continue`] and leave the
    /// context untouched.
    pub fn apply(&self, ctx: &mut RewriteContext) -> Result<RuleResult, EngineError> {
        let input = match self.relative {
            true => ctx.path().strip_prefix('/').unwrap_or(ctx.path()),
            false => ctx.path(),
        };
        let result = self.matcher.evaluate(input);
        if !result.success {
            tracing::trace!(rule = %self.name, input, "pattern did not match");
            return Ok(RuleResult::Continue);
        }
        let Some(condition) = self.conditions.evaluate(ctx, &result.captures) else {
            tracing::trace!(rule = %self.name, "conditions not met");
            return Ok(RuleResult::Continue);
        };

        tracing::debug!(rule = %self.name, action = self.action.kind(), "rule matched");
        let refs = BackReferences::new(result.captures, condition)
            .escaped(self.escape_back_references);
        let outcome = self
            .action
            .apply(ctx, &refs)
            .map_err(|source| EngineError::Delegate {
                rule: self.name.clone(),
                source,
            })?;
        Ok(match outcome {
            RuleResult::Continue if self.stop_processing => RuleResult::Stop,
            outcome => outcome,
        })
    }
}
