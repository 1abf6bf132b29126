//! Framework agnostic url rewrite and redirect engine.
//!
//! Rules come from two configuration dialects, an xml schema modeled on
//! [IIS URL Rewrite](https://learn.microsoft.com/en-us/iis/extensions/url-rewrite-module/url-rewrite-module-configuration-reference)
//! and the directives of HTTPD's [mod_rewrite](https://httpd.apache.org/docs/current/mod/mod_rewrite.html),
//! or from code through [`RewriteOptions`]. All of them compile into the same
//! immutable [`Rule`] list driven by an [`Engine`].
//!
//! # Example
//!
//! ```
//! use url_rewrite::{RewriteContext, RewriteOptions, RuleResult};
//!
//! let engine = RewriteOptions::new()
//!     .add_iis_url_rewrite(r#"
//!       <rewrite>
//!         <rules>
//!           <rule name="Rewrite to article.aspx">
//!             <match url="^article/([0-9]+)/([_0-9a-z-]+)" />
//!             <action type="Rewrite" url="article.aspx?id={R:1}&amp;title={R:2}" />
//!           </rule>
//!         </rules>
//!       </rewrite>
//!     "#)
//!     .expect("failed to parse rules")
//!     .add_apache_mod_rewrite("RewriteRule ^/blocked - [F]")
//!     .expect("failed to parse rules")
//!     .build();
//!
//! let mut ctx = RewriteContext::new("/article/123/my-title");
//! let result = engine.apply(&mut ctx).unwrap();
//! assert_eq!(result, RuleResult::Continue);
//! assert_eq!(ctx.path_and_query(), "article.aspx?id=123&title=my-title");
//! ```
use std::str::FromStr;
use std::sync::Arc;

pub mod action;
mod builder;
pub mod conditions;
pub mod context;
pub mod error;
mod extra;
pub mod parse;
pub mod pattern;
mod rule;
pub mod template;

use error::{EngineError, ParseError};

pub use action::{Action, Delegate, QueryStringPolicy};
pub use builder::RewriteOptions;
pub use conditions::{Condition, Conditions, LogicalGrouping};
pub use context::{Response, RewriteContext, RuleResult};
pub use extra::State;
pub use parse::{ModRewriteFileParser, UrlRewriteFileParser};
pub use pattern::{Matcher, PatternSyntax};
pub use rule::Rule;
pub use template::{InputParser, Template};

/// Immutable, ordered rule list evaluated once per request.
///
/// Cloning is cheap and shares the underlying rules, an engine can be
/// handed to as many worker threads as needed.
#[derive(Debug, Default, Clone)]
pub struct Engine {
    rules: Arc<[Rule]>,
}

impl Engine {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules: rules.into(),
        }
    }

    /// Build an engine from IIS URL Rewrite xml.
    #[inline]
    pub fn from_xml(xml: &str) -> Result<Self, ParseError> {
        Ok(Self::new(UrlRewriteFileParser::new().parse(xml)?))
    }

    #[inline]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every enabled rule in declaration order against the context.
    ///
    /// Each rule sees the path left behind by the rules before it. The
    /// pipeline halts at the first [`RuleResult::Stop`] or
    /// [`RuleResult::Terminate`]. The final result is also recorded on the
    /// context.
    pub fn apply(&self, ctx: &mut RewriteContext) -> Result<RuleResult, EngineError> {
        let mut result = RuleResult::Continue;
        for rule in self.rules.iter().filter(|r| r.is_enabled()) {
            result = rule.apply(ctx)?;
            if result != RuleResult::Continue {
                tracing::debug!(rule = rule.name(), ?result, "rule halted pipeline");
                break;
            }
        }
        ctx.set_result(result);
        Ok(result)
    }
}

impl FromStr for Engine {
    type Err = ParseError;

    /// Build an engine from `mod_rewrite` directives.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(ModRewriteFileParser::new().parse(s)?))
    }
}
