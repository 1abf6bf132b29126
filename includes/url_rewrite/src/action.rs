//! Effects a matched rule applies to the request.
use std::fmt;
use std::sync::Arc;

use crate::context::{RewriteContext, RuleResult};
use crate::error::DelegateError;
use crate::extra;
use crate::template::{BackReferences, Template};

/// Callback signature of [`Action::Delegate`].
pub type DelegateFn = dyn Fn(&mut RewriteContext) -> Result<(), DelegateError> + Send + Sync;

/// Opaque callback with full access to the [`RewriteContext`].
#[derive(Clone)]
pub struct Delegate(Arc<DelegateFn>);

impl Delegate {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&mut RewriteContext) -> Result<(), DelegateError> + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }
}

impl fmt::Debug for Delegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Delegate(..)")
    }
}

impl PartialEq for Delegate {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// How the original query string is combined with a resolved url.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QueryStringPolicy {
    /// Resolved query first, then the original query
    #[default]
    Append,
    /// Only the resolved query, possibly empty
    Replace,
    /// Resolved query if the url has one, otherwise the original query
    Preserve,
    /// Drop every query string
    Discard,
}

impl QueryStringPolicy {
    fn combine(&self, resolved: Option<&str>, original: &str) -> String {
        match self {
            Self::Append => extra::merge_query(resolved.unwrap_or(""), original),
            Self::Replace => resolved.unwrap_or("").to_owned(),
            Self::Preserve => resolved.unwrap_or(original).to_owned(),
            Self::Discard => String::new(),
        }
    }
}

/// Action applied once a rule and its conditions match.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// No mutation
    None,
    Rewrite {
        url: Template,
        query_string: QueryStringPolicy,
    },
    Redirect {
        url: Template,
        status_code: u16,
        query_string: QueryStringPolicy,
    },
    RedirectToHttps {
        status_code: u16,
        ssl_port: Option<u16>,
    },
    CustomResponse {
        status_code: u16,
        reason: Option<String>,
    },
    AbortRequest,
    Delegate(Delegate),
}

impl Action {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Rewrite { .. } => "rewrite",
            Self::Redirect { .. } => "redirect",
            Self::RedirectToHttps { .. } => "redirect-to-https",
            Self::CustomResponse { .. } => "custom-response",
            Self::AbortRequest => "abort",
            Self::Delegate(_) => "delegate",
        }
    }

    /// Apply the action to the context and report how the pipeline should
    /// continue.
    pub fn apply(
        &self,
        ctx: &mut RewriteContext,
        refs: &BackReferences,
    ) -> Result<RuleResult, DelegateError> {
        match self {
            Self::None => Ok(RuleResult::Continue),
            Self::Rewrite { url, query_string } => {
                let resolved = url.evaluate(ctx, refs);
                rewrite(ctx, &resolved, *query_string);
                Ok(RuleResult::Continue)
            }
            Self::Redirect {
                url,
                status_code,
                query_string,
            } => {
                let resolved = url.evaluate(ctx, refs);
                let location = redirect_location(ctx, &resolved, *query_string);
                ctx.redirect(*status_code, location);
                Ok(RuleResult::Terminate)
            }
            Self::RedirectToHttps {
                status_code,
                ssl_port,
            } => {
                if ctx.is_https() {
                    return Ok(RuleResult::Continue);
                }
                let port = ssl_port.map(|p| format!(":{p}")).unwrap_or_default();
                let location = format!("https://{}{port}{}", ctx.host(), ctx.path_and_query());
                ctx.redirect(*status_code, location);
                Ok(RuleResult::Terminate)
            }
            Self::CustomResponse {
                status_code,
                reason,
            } => {
                ctx.respond(*status_code, reason.clone());
                Ok(RuleResult::Terminate)
            }
            Self::AbortRequest => {
                ctx.abort();
                Ok(RuleResult::Terminate)
            }
            Self::Delegate(Delegate(callback)) => {
                ctx.set_result(RuleResult::Continue);
                callback(ctx)?;
                Ok(ctx.result())
            }
        }
    }
}

fn rewrite(ctx: &mut RewriteContext, resolved: &str, policy: QueryStringPolicy) {
    let (target, query) = match resolved.split_once('?') {
        Some((target, query)) => (target, Some(query)),
        None => (resolved, None),
    };
    let query = policy.combine(query, ctx.query());

    let absolute = target
        .contains("://")
        .then(|| url::Url::parse(target).ok())
        .flatten()
        .filter(|url| url.has_host());
    match absolute {
        Some(url) => {
            ctx.set_scheme(url.scheme());
            ctx.set_host(url.host_str().unwrap_or_default(), url.port());
            ctx.set_path(url.path());
        }
        None => ctx.set_path(target),
    }
    ctx.set_query(query);
}

fn redirect_location(ctx: &RewriteContext, resolved: &str, policy: QueryStringPolicy) -> String {
    let (target, query) = match resolved.split_once('?') {
        Some((target, query)) => (target, Some(query)),
        None => (resolved, None),
    };
    let mut location = match target.contains("://") || target.starts_with('/') {
        true => target.to_owned(),
        false => format!("/{target}"),
    };
    let query = policy.combine(query, ctx.query());
    if !query.is_empty() {
        location.push('?');
        location.push_str(&query);
    }
    location
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Response;
    use crate::template::InputParser;

    fn template(s: &str) -> Template {
        InputParser::parse_input_string(s).unwrap()
    }

    fn refs(rule: &[&str]) -> BackReferences {
        BackReferences::new(rule.iter().copied().collect(), Default::default())
    }

    #[test]
    fn test_rewrite_query_policies() {
        let action = |query_string| Action::Rewrite {
            url: template("/new/{R:1}?x=1"),
            query_string,
        };
        let refs = refs(&["", "page"]);

        let mut ctx = RewriteContext::new("/old/page?a=b");
        let result = action(QueryStringPolicy::Append).apply(&mut ctx, &refs).unwrap();
        assert_eq!(result, RuleResult::Continue);
        assert_eq!(ctx.path_and_query(), "/new/page?x=1&a=b");

        let mut ctx = RewriteContext::new("/old/page?a=b");
        action(QueryStringPolicy::Replace).apply(&mut ctx, &refs).unwrap();
        assert_eq!(ctx.path_and_query(), "/new/page?x=1");

        let mut ctx = RewriteContext::new("/old/page?a=b");
        action(QueryStringPolicy::Discard).apply(&mut ctx, &refs).unwrap();
        assert_eq!(ctx.path_and_query(), "/new/page");

        let mut ctx = RewriteContext::new("/old/page?a=b");
        let preserve = Action::Rewrite {
            url: template("/new/{R:1}"),
            query_string: QueryStringPolicy::Preserve,
        };
        preserve.apply(&mut ctx, &refs).unwrap();
        assert_eq!(ctx.path_and_query(), "/new/page?a=b");

        let mut ctx = RewriteContext::new("/old/page?a=b");
        let replace = Action::Rewrite {
            url: template("/new/{R:1}"),
            query_string: QueryStringPolicy::Replace,
        };
        replace.apply(&mut ctx, &refs).unwrap();
        assert_eq!(ctx.path_and_query(), "/new/page");
    }

    #[test]
    fn test_rewrite_absolute() {
        let mut ctx = RewriteContext::new("/app").with_host("example.com");
        let action = Action::Rewrite {
            url: template("https://backend.local:8443/api"),
            query_string: QueryStringPolicy::Append,
        };
        action.apply(&mut ctx, &refs(&[])).unwrap();
        assert_eq!(ctx.scheme(), "https");
        assert_eq!(ctx.host(), "backend.local");
        assert_eq!(ctx.port(), Some(8443));
        assert_eq!(ctx.path(), "/api");
    }

    #[test]
    fn test_redirect() {
        let mut ctx = RewriteContext::new("/old?a=b");
        let action = Action::Redirect {
            url: template("new/{R:1}"),
            status_code: 301,
            query_string: QueryStringPolicy::Append,
        };
        let result = action.apply(&mut ctx, &refs(&["", "x"])).unwrap();
        assert_eq!(result, RuleResult::Terminate);
        assert_eq!(
            ctx.response(),
            Some(&Response::Redirect {
                status: 301,
                location: "/new/x?a=b".to_owned()
            })
        );
    }

    #[test]
    fn test_redirect_to_https() {
        let action = Action::RedirectToHttps {
            status_code: 302,
            ssl_port: Some(8443),
        };
        let mut ctx = RewriteContext::new("/secure?a=b").with_host("example.com:8080");
        let result = action.apply(&mut ctx, &refs(&[])).unwrap();
        assert_eq!(result, RuleResult::Terminate);
        assert_eq!(
            ctx.response(),
            Some(&Response::Redirect {
                status: 302,
                location: "https://example.com:8443/secure?a=b".to_owned()
            })
        );

        let mut ctx = RewriteContext::new("/secure")
            .with_scheme("https")
            .with_host("example.com");
        let result = action.apply(&mut ctx, &refs(&[])).unwrap();
        assert_eq!(result, RuleResult::Continue);
        assert_eq!(ctx.response(), None);
        assert_eq!(ctx.path(), "/secure");
    }

    #[test]
    fn test_responses() {
        let mut ctx = RewriteContext::new("/");
        let action = Action::CustomResponse {
            status_code: 403,
            reason: Some("Forbidden".to_owned()),
        };
        assert_eq!(action.apply(&mut ctx, &refs(&[])).unwrap(), RuleResult::Terminate);
        assert_eq!(
            ctx.response(),
            Some(&Response::Status {
                status: 403,
                reason: Some("Forbidden".to_owned())
            })
        );

        let mut ctx = RewriteContext::new("/");
        assert_eq!(
            Action::AbortRequest.apply(&mut ctx, &refs(&[])).unwrap(),
            RuleResult::Terminate
        );
        assert_eq!(ctx.response(), Some(&Response::Abort));
    }

    #[test]
    fn test_delegate() {
        let action = Action::Delegate(Delegate::new(|ctx| {
            ctx.set_path("/delegated");
            Ok(())
        }));
        let mut ctx = RewriteContext::new("/");
        assert_eq!(action.apply(&mut ctx, &refs(&[])).unwrap(), RuleResult::Continue);
        assert_eq!(ctx.path(), "/delegated");

        let stop = Action::Delegate(Delegate::new(|ctx| {
            ctx.set_result(RuleResult::Stop);
            Ok(())
        }));
        assert_eq!(stop.apply(&mut ctx, &refs(&[])).unwrap(), RuleResult::Stop);

        let failing = Action::Delegate(Delegate::new(|_| Err("boom".into())));
        assert!(failing.apply(&mut ctx, &refs(&[])).is_err());
    }
}
