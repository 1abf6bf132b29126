//! Programmatic rule registration.
use std::path::Path;
use std::sync::Arc;

use crate::Engine;
use crate::action::{Action, Delegate, QueryStringPolicy};
use crate::context::RewriteContext;
use crate::error::{DelegateError, ParseError, ParseErrorKind};
use crate::parse::{ModRewriteFileParser, UrlRewriteFileParser};
use crate::pattern::{Matcher, PatternSyntax, RegexCompiler, default_compiler};
use crate::rule::Rule;
use crate::template::InputParser;

/// Ordered rule list under construction.
///
/// Rules run in the order they were registered, regardless of whether they
/// came from code or from a configuration file. [`RewriteOptions::build`]
/// freezes the list into an immutable [`Engine`].
///
/// # Example
///
/// ```
/// use url_rewrite::RewriteOptions;
///
/// let engine = RewriteOptions::new()
///     .redirect_to_https_permanent()
///     .rewrite(r"^blog/(\d+)$", "post.php?id=$1", true)
///     .expect("invalid rule")
///     .build();
/// assert_eq!(engine.len(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct RewriteOptions {
    rules: Vec<Rule>,
    compiler: Arc<dyn RegexCompiler>,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            compiler: default_compiler(),
        }
    }
}

impl RewriteOptions {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile every following pattern with a custom regex implementation.
    pub fn with_compiler(&mut self, compiler: Arc<dyn RegexCompiler>) -> &mut Self {
        self.compiler = compiler;
        self
    }

    #[inline]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Append an already constructed [`Rule`].
    pub fn add(&mut self, rule: Rule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    /// Append a rule running `callback` for every request.
    ///
    /// The callback reports how the pipeline continues through
    /// [`RewriteContext::set_result`].
    pub fn add_fn<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(&mut RewriteContext) -> Result<(), DelegateError> + Send + Sync + 'static,
    {
        let action = Action::Delegate(Delegate::new(callback));
        self.add(Rule::new("delegate", Matcher::any(), action))
    }

    /// Rewrite the path when `regex` matches it. `replacement` may refer to
    /// capture groups with `$n`. A query in `replacement` is merged ahead of
    /// the request query.
    pub fn rewrite(
        &mut self,
        regex: &str,
        replacement: &str,
        stop_processing: bool,
    ) -> Result<&mut Self, ParseError> {
        let action = Action::Rewrite {
            url: InputParser::parse_directive(replacement)?,
            query_string: QueryStringPolicy::Append,
        };
        let rule = self
            .code_rule(regex, action)?
            .stop_processing(stop_processing);
        Ok(self.add(rule))
    }

    /// Redirect with `302 Found` when `regex` matches the path.
    #[inline]
    pub fn redirect(&mut self, regex: &str, replacement: &str) -> Result<&mut Self, ParseError> {
        self.redirect_with_status(regex, replacement, 302)
    }

    /// Redirect with a custom `3xx` status when `regex` matches the path.
    pub fn redirect_with_status(
        &mut self,
        regex: &str,
        replacement: &str,
        status_code: u16,
    ) -> Result<&mut Self, ParseError> {
        check_redirect_status(status_code)?;
        let action = Action::Redirect {
            url: InputParser::parse_directive(replacement)?,
            status_code,
            query_string: QueryStringPolicy::Append,
        };
        let rule = self.code_rule(regex, action)?;
        Ok(self.add(rule))
    }

    /// Redirect plain http requests to https with `302 Found`.
    #[inline]
    pub fn redirect_to_https(&mut self) -> &mut Self {
        self.https_rule(302, None)
    }

    /// Redirect plain http requests to https with `301 Moved Permanently`.
    #[inline]
    pub fn redirect_to_https_permanent(&mut self) -> &mut Self {
        self.https_rule(301, None)
    }

    /// Redirect plain http requests to https with a custom `3xx` status,
    /// optionally on a non-default port.
    pub fn redirect_to_https_with(
        &mut self,
        status_code: u16,
        ssl_port: Option<u16>,
    ) -> Result<&mut Self, ParseError> {
        check_redirect_status(status_code)?;
        Ok(self.https_rule(status_code, ssl_port))
    }

    fn https_rule(&mut self, status_code: u16, ssl_port: Option<u16>) -> &mut Self {
        let action = Action::RedirectToHttps {
            status_code,
            ssl_port,
        };
        self.add(Rule::new("redirect-to-https", Matcher::any(), action))
    }

    /// Parse IIS URL Rewrite xml and append its rules.
    pub fn add_iis_url_rewrite(&mut self, xml: &str) -> Result<&mut Self, ParseError> {
        let rules = UrlRewriteFileParser::with_compiler(self.compiler.clone()).parse(xml)?;
        self.rules.extend(rules);
        Ok(self)
    }

    /// Parse an IIS URL Rewrite xml file and append its rules.
    #[inline]
    pub fn add_iis_url_rewrite_file<P: AsRef<Path>>(
        &mut self,
        path: P,
    ) -> Result<&mut Self, ParseError> {
        self.add_iis_url_rewrite(&std::fs::read_to_string(path)?)
    }

    /// Parse `mod_rewrite` directives and append their rules.
    pub fn add_apache_mod_rewrite(&mut self, text: &str) -> Result<&mut Self, ParseError> {
        let rules = ModRewriteFileParser::with_compiler(self.compiler.clone()).parse(text)?;
        self.rules.extend(rules);
        Ok(self)
    }

    /// Parse a `mod_rewrite` directive file and append its rules.
    #[inline]
    pub fn add_apache_mod_rewrite_file<P: AsRef<Path>>(
        &mut self,
        path: P,
    ) -> Result<&mut Self, ParseError> {
        self.add_apache_mod_rewrite(&std::fs::read_to_string(path)?)
    }

    /// Freeze the registered rules into an [`Engine`].
    pub fn build(&self) -> Engine {
        tracing::debug!(rules = self.rules.len(), "building rewrite engine");
        Engine::new(self.rules.clone())
    }

    fn code_rule(&self, regex: &str, action: Action) -> Result<Rule, ParseError> {
        let matcher = Matcher::compile(
            self.compiler.as_ref(),
            regex,
            PatternSyntax::EcmaScript,
            false,
            false,
        )?;
        Ok(Rule::new(regex, matcher, action).relative(true))
    }
}

fn check_redirect_status(status_code: u16) -> Result<(), ParseError> {
    match (300..400).contains(&status_code) {
        true => Ok(()),
        false => Err(ParseError::new(ParseErrorKind::InvalidStatus(status_code))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Response, RuleResult};

    #[test]
    fn test_code_rules() {
        let engine = RewriteOptions::new()
            .rewrite(r"^blog/(\d+)$", "post.php?id=$1", false)
            .unwrap()
            .redirect(r"^post\.php$", "/articles")
            .unwrap()
            .build();
        let mut ctx = RewriteContext::new("/blog/9?x=1");
        assert_eq!(engine.apply(&mut ctx).unwrap(), RuleResult::Terminate);
        assert_eq!(
            ctx.response(),
            Some(&Response::Redirect {
                status: 302,
                location: "/articles?id=9&x=1".to_owned()
            })
        );
    }

    #[test]
    fn test_rewrite_merges_query() {
        let engine = RewriteOptions::new()
            .rewrite(r"^blog/(\d+)$", "articles?id=$1", false)
            .unwrap()
            .build();
        let mut ctx = RewriteContext::new("/blog/9?x=1");
        engine.apply(&mut ctx).unwrap();
        assert_eq!(ctx.path_and_query(), "articles?id=9&x=1");

        let mut ctx = RewriteContext::new("/blog/9");
        engine.apply(&mut ctx).unwrap();
        assert_eq!(ctx.path_and_query(), "articles?id=9");
    }

    #[test]
    fn test_redirect_status() {
        let mut options = RewriteOptions::new();
        assert!(options.redirect_with_status("^a$", "/b", 308).is_ok());
        let err = options.redirect_with_status("^a$", "/b", 200).unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::InvalidStatus(200)));
        let err = options.rewrite("^(a$", "/b", false).unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::Pattern(_)));
        assert_eq!(options.rules().len(), 1);
    }

    #[test]
    fn test_https_status() {
        let mut options = RewriteOptions::new();
        let err = options.redirect_to_https_with(200, None).unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::InvalidStatus(200)));
        let err = options.redirect_to_https_with(1000, Some(8443)).unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::InvalidStatus(1000)));
        assert!(options.rules().is_empty());

        assert!(options.redirect_to_https_with(307, Some(8443)).is_ok());
        assert_eq!(options.rules().len(), 1);
    }

    #[test]
    fn test_https() {
        let engine = RewriteOptions::new().redirect_to_https_permanent().build();
        let mut ctx = RewriteContext::new("/a?b=c").with_host("example.com");
        engine.apply(&mut ctx).unwrap();
        assert_eq!(
            ctx.response(),
            Some(&Response::Redirect {
                status: 301,
                location: "https://example.com/a?b=c".to_owned()
            })
        );
    }

    #[test]
    fn test_registration_order() {
        let engine = RewriteOptions::new()
            .add_fn(|ctx| {
                let path = format!("{}/one", ctx.path());
                ctx.set_path(path);
                Ok(())
            })
            .add_apache_mod_rewrite("RewriteRule ^/start/one$ /two")
            .unwrap()
            .add_fn(|ctx| {
                ctx.set_result(RuleResult::Stop);
                Ok(())
            })
            .add_fn(|ctx| {
                ctx.set_path("/unreachable");
                Ok(())
            })
            .build();
        let mut ctx = RewriteContext::new("/start");
        assert_eq!(engine.apply(&mut ctx).unwrap(), RuleResult::Stop);
        assert_eq!(ctx.path(), "/two");
    }

    #[test]
    fn test_missing_file() {
        let err = RewriteOptions::new()
            .add_iis_url_rewrite_file("/does/not/exist.xml")
            .unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::Io(_)));
    }
}
