use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use url_rewrite::context::ServerCtx;
use url_rewrite::error::{EngineError, ParseErrorKind, PatternError};
use url_rewrite::pattern::{AutomataCompiler, Captures, CompiledRegex, RegexCompiler};
use url_rewrite::{
    Engine, Response, RewriteContext, RewriteOptions, RuleResult, UrlRewriteFileParser,
};

const ARTICLE: &str = r#"
<rewrite>
  <rules>
    <rule name="Rewrite to article.aspx">
      <match url="^article/([0-9]+)/([_0-9a-z-]+)" />
      <conditions>
        <add input="{HTTPS}" pattern="^OFF$" />
      </conditions>
      <action type="Rewrite" url="article.aspx?id={R:1}&amp;title={R:2}" />
    </rule>
  </rules>
</rewrite>
"#;

#[test]
fn test_article_rewrite() {
    let engine = Engine::from_xml(ARTICLE).unwrap();
    let mut ctx = RewriteContext::new("/article/123/my-title").with_variable("HTTPS", "OFF");
    assert_eq!(engine.apply(&mut ctx).unwrap(), RuleResult::Continue);
    assert_eq!(ctx.path_and_query(), "article.aspx?id=123&title=my-title");
    assert_eq!(ctx.response(), None);

    let mut ctx = RewriteContext::new("/article/123/my-title").with_scheme("https");
    engine.apply(&mut ctx).unwrap();
    assert_eq!(ctx.path_and_query(), "/article/123/my-title");
}

#[test]
fn test_negated_condition() {
    let engine = Engine::from_xml(
        r#"<rewrite><rules>
            <rule name="secure-only" stopProcessing="true">
                <match url=".*" />
                <conditions>
                    <add input="{HTTPS}" pattern="^OFF$" negate="true" ignoreCase="false" />
                </conditions>
                <action type="CustomResponse" statusCode="204" />
            </rule>
        </rules></rewrite>"#,
    )
    .unwrap();

    let mut ctx = RewriteContext::new("/").with_variable("HTTPS", "OFF");
    assert_eq!(engine.apply(&mut ctx).unwrap(), RuleResult::Continue);

    let mut ctx = RewriteContext::new("/").with_variable("HTTPS", "ON");
    assert_eq!(engine.apply(&mut ctx).unwrap(), RuleResult::Terminate);
    assert_eq!(
        ctx.response(),
        Some(&Response::Status {
            status: 204,
            reason: None
        })
    );
}

#[test]
fn test_track_all_captures() {
    let engine = Engine::from_xml(
        r#"<rewrite><rules>
            <rule name="tenant">
                <match url="^(.*)$" />
                <conditions trackAllCaptures="true">
                    <add input="{HTTP_HOST}" pattern="^([a-z]+)\.example\.com$" />
                    <add input="{QUERY_STRING}" pattern="lang=([a-z]{2})" />
                </conditions>
                <action type="Rewrite" url="/{C:1}/{C:3}/{R:1}" appendQueryString="false" />
            </rule>
        </rules></rewrite>"#,
    )
    .unwrap();
    let mut ctx = RewriteContext::new("/docs?lang=fr").with_host("acme.example.com");
    engine.apply(&mut ctx).unwrap();
    assert_eq!(ctx.path_and_query(), "/acme/fr/docs");
}

#[test]
fn test_match_any() {
    let engine = Engine::from_xml(
        r#"<rewrite><rules>
            <rule name="block-agents">
                <match url=".*" />
                <conditions logicalGrouping="MatchAny">
                    <add input="{HTTP_USER_AGENT}" pattern="badbot" />
                    <add input="{HTTP_USER_AGENT}" pattern="scraper" />
                </conditions>
                <action type="AbortRequest" />
            </rule>
        </rules></rewrite>"#,
    )
    .unwrap();

    let mut ctx = RewriteContext::new("/").with_header("User-Agent", "Mozilla Scraper/1.0");
    assert_eq!(engine.apply(&mut ctx).unwrap(), RuleResult::Terminate);
    assert_eq!(ctx.response(), Some(&Response::Abort));

    let mut ctx = RewriteContext::new("/").with_header("User-Agent", "curl/8.0");
    assert_eq!(engine.apply(&mut ctx).unwrap(), RuleResult::Continue);
}

#[test]
fn test_redirect_to_https_port() {
    let engine = RewriteOptions::new()
        .redirect_to_https_with(302, Some(8443))
        .unwrap()
        .build();

    let mut ctx = RewriteContext::new("/cart?item=1").with_host("shop.example.com");
    assert_eq!(engine.apply(&mut ctx).unwrap(), RuleResult::Terminate);
    assert_eq!(
        ctx.response(),
        Some(&Response::Redirect {
            status: 302,
            location: "https://shop.example.com:8443/cart?item=1".to_owned()
        })
    );

    let mut ctx = RewriteContext::new("/cart")
        .with_scheme("https")
        .with_host("shop.example.com");
    assert_eq!(engine.apply(&mut ctx).unwrap(), RuleResult::Continue);
    assert_eq!(ctx.response(), None);
}

#[test]
fn test_mixed_sources() {
    let engine = RewriteOptions::new()
        .add_iis_url_rewrite(ARTICLE)
        .unwrap()
        .add_apache_mod_rewrite(
            r#"
            RewriteRule ^article\.aspx$ /legacy/article.php [QSA]
            "#,
        )
        .unwrap()
        .build();
    let mut ctx = RewriteContext::new("/article/7/intro");
    engine.apply(&mut ctx).unwrap();
    assert_eq!(ctx.path_and_query(), "/legacy/article.php?id=7&title=intro");

    // directive rules match the full path, so the leading slash matters
    let mut ctx = RewriteContext::new("/article.aspx?x=1");
    engine.apply(&mut ctx).unwrap();
    assert_eq!(ctx.path(), "/article.aspx");
}

#[test]
fn test_delegate_error() {
    let engine = RewriteOptions::new()
        .add_fn(|ctx| match ctx.header("Authorization") {
            Some(_) => Ok(()),
            None => Err("missing credentials".into()),
        })
        .build();

    let mut ctx = RewriteContext::new("/").with_header("Authorization", "Bearer x");
    assert!(engine.apply(&mut ctx).is_ok());

    let mut ctx = RewriteContext::new("/");
    let err = engine.apply(&mut ctx).unwrap_err();
    let EngineError::Delegate { rule, source } = err;
    assert_eq!(rule, "delegate");
    assert_eq!(source.to_string(), "missing credentials");
}

#[test]
fn test_deterministic_parse() {
    let parser = UrlRewriteFileParser::new();
    assert_eq!(parser.parse(ARTICLE).unwrap(), parser.parse(ARTICLE).unwrap());

    let text = "RewriteCond %{HTTPS} off [NC]\nRewriteRule ^/(.*)$ https://%{HTTP_HOST}/$1 [R=301,L]";
    assert_eq!(
        Engine::from_str(text).unwrap().rules(),
        Engine::from_str(text).unwrap().rules()
    );
}

#[test]
fn test_parse_errors() {
    let err = Engine::from_xml("<rewrite><rules>").unwrap_err();
    assert!(matches!(err.kind, ParseErrorKind::Xml(_)));

    let err = Engine::from_xml(
        r#"<rewrite>
  <rules>
    <rule name="broken" patternSyntax="Wildcard">
      <match url="files\*\x" />
      <action type="None" />
    </rule>
  </rules>
</rewrite>"#,
    )
    .unwrap_err();
    assert!(matches!(
        err.kind,
        ParseErrorKind::Pattern(PatternError::InvalidWildcard(_))
    ));
    assert_eq!(err.location.rule.as_deref(), Some("broken"));
    assert_eq!(err.location.line, Some(4));
    assert!(err.to_string().contains("rule `broken`"));
}

#[test]
fn test_out_of_range_back_reference() {
    let engine = Engine::from_xml(
        r#"<rewrite><rules>
            <rule name="sparse">
                <match url="^(a)(b)?$" />
                <action type="Rewrite" url="/{R:1}-{R:2}-{R:9}-{C:3}" />
            </rule>
        </rules></rewrite>"#,
    )
    .unwrap();
    let mut ctx = RewriteContext::new("/a");
    engine.apply(&mut ctx).unwrap();
    assert_eq!(ctx.path(), "/a---");
}

/// Regex capability wrapper counting every compilation.
#[derive(Debug, Default)]
struct CountingCompiler(AtomicUsize);

impl RegexCompiler for CountingCompiler {
    fn compile(
        &self,
        pattern: &str,
        ignore_case: bool,
    ) -> Result<Arc<dyn CompiledRegex>, PatternError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        AutomataCompiler.compile(pattern, ignore_case)
    }
}

#[test]
fn test_injected_compiler() {
    let compiler = Arc::new(CountingCompiler::default());
    let rules = UrlRewriteFileParser::with_compiler(compiler.clone())
        .parse(ARTICLE)
        .unwrap();
    assert_eq!(compiler.0.load(Ordering::SeqCst), 2);

    let engine = Engine::new(rules);
    let mut ctx = RewriteContext::new("/article/1/a");
    engine.apply(&mut ctx).unwrap();
    engine.apply(&mut RewriteContext::new("/article/2/b")).unwrap();
    assert_eq!(compiler.0.load(Ordering::SeqCst), 2);

    let captures: Captures = ["x", "y"].into_iter().collect();
    assert_eq!(captures.get(1), "y");
}

#[test]
fn test_front_controller_serves_existing_files() {
    let engine = Engine::from_str(
        r#"
        RewriteCond %{REQUEST_FILENAME} !-f
        RewriteCond %{REQUEST_FILENAME} !-d
        RewriteRule ^ /front.php [L]
    "#,
    )
    .unwrap();
    let root = || ServerCtx::default().document_root(env!("CARGO_MANIFEST_DIR"));

    let mut ctx = RewriteContext::new("/Cargo.toml").with_provider(root());
    assert_eq!(engine.apply(&mut ctx).unwrap(), RuleResult::Continue);
    assert_eq!(ctx.path(), "/Cargo.toml");

    let mut ctx = RewriteContext::new("/src").with_provider(root());
    engine.apply(&mut ctx).unwrap();
    assert_eq!(ctx.path(), "/src");

    let mut ctx = RewriteContext::new("/missing/page?a=b").with_provider(root());
    assert_eq!(engine.apply(&mut ctx).unwrap(), RuleResult::Stop);
    assert_eq!(ctx.path_and_query(), "/front.php?a=b");

    let iis = Engine::from_xml(
        r#"<rewrite><rules>
            <rule name="front controller" stopProcessing="true">
                <match url=".*" />
                <conditions>
                    <add input="{REQUEST_FILENAME}" matchType="IsFile" negate="true" />
                </conditions>
                <action type="Rewrite" url="front.php" />
            </rule>
        </rules></rewrite>"#,
    )
    .unwrap();
    let mut ctx = RewriteContext::new("/Cargo.toml").with_provider(root());
    assert_eq!(iis.apply(&mut ctx).unwrap(), RuleResult::Continue);
    assert_eq!(ctx.path(), "/Cargo.toml");

    let mut ctx = RewriteContext::new("/nothing.txt").with_provider(root());
    assert_eq!(iis.apply(&mut ctx).unwrap(), RuleResult::Stop);
    assert_eq!(ctx.path(), "front.php");
}
