use std::io::Read;
use std::sync::Arc;

use roxmltree::{Document, Node};

use crate::action::{Action, QueryStringPolicy};
use crate::conditions::{Condition, Conditions, LogicalGrouping};
use crate::error::{ParseError, ParseErrorKind};
use crate::pattern::{
    FileTest, MatchKind, Matcher, PatternSyntax, RegexCompiler, default_compiler,
};
use crate::rule::Rule;
use crate::template::InputParser;

/// Parser for the IIS URL Rewrite xml schema.
///
/// Accepts either a bare `<rewrite>` document or a full `web.config`
/// (`configuration > system.webServer > rewrite`).
///
/// # Example
///
/// ```
/// use url_rewrite::UrlRewriteFileParser;
///
/// let rules = UrlRewriteFileParser::new()
///     .parse(r#"
///         <rewrite>
///           <rules>
///             <rule name="article" stopProcessing="true">
///               <match url="^article/([0-9]+)" />
///               <action type="Rewrite" url="article.aspx?id={R:1}" />
///             </rule>
///           </rules>
///         </rewrite>
///     "#)
///     .expect("failed to parse rules");
/// assert_eq!(rules[0].name(), "article");
/// ```
#[derive(Clone, Debug)]
pub struct UrlRewriteFileParser {
    compiler: Arc<dyn RegexCompiler>,
}

impl Default for UrlRewriteFileParser {
    fn default() -> Self {
        Self {
            compiler: default_compiler(),
        }
    }
}

impl UrlRewriteFileParser {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile patterns with a custom regex implementation.
    pub fn with_compiler(compiler: Arc<dyn RegexCompiler>) -> Self {
        Self { compiler }
    }

    /// Read the whole reader into memory and [`parse`](Self::parse) it.
    pub fn parse_reader<R: Read>(&self, mut reader: R) -> Result<Vec<Rule>, ParseError> {
        let mut xml = String::new();
        reader.read_to_string(&mut xml)?;
        self.parse(&xml)
    }

    /// Parse xml text into an ordered rule list.
    pub fn parse(&self, xml: &str) -> Result<Vec<Rule>, ParseError> {
        let doc = Document::parse(xml).map_err(|err| {
            let pos = err.pos();
            ParseError::new(err).at(pos.row, Some(pos.col))
        })?;
        let reader = XmlReader {
            doc: &doc,
            compiler: self.compiler.as_ref(),
        };
        let rewrite = reader.rewrite_element()?;
        let rules = reader.single_child(rewrite, "rules", true)?;

        let mut parsed = Vec::new();
        for node in rules.children().filter(Node::is_element) {
            match node.tag_name().name() {
                "rule" => parsed.push(reader.rule(node)?),
                "clear" => parsed.clear(),
                other => {
                    let kind = ParseErrorKind::UnexpectedElement(other.to_owned());
                    return Err(reader.fail(node, kind));
                }
            }
        }
        tracing::debug!(rules = parsed.len(), "parsed url rewrite xml");
        Ok(parsed)
    }
}

struct XmlReader<'a, 'input> {
    doc: &'a Document<'input>,
    compiler: &'a dyn RegexCompiler,
}

impl<'a, 'input> XmlReader<'a, 'input> {
    fn fail(&self, node: Node, kind: ParseErrorKind) -> ParseError {
        let pos = self.doc.text_pos_at(node.range().start);
        ParseError::new(kind).at(pos.row, Some(pos.col))
    }

    fn rewrite_element(&self) -> Result<Node<'a, 'input>, ParseError> {
        let root = self.doc.root_element();
        match root.tag_name().name() {
            "rewrite" => Ok(root),
            "configuration" => {
                let server = self.single_child(root, "system.webServer", false)?;
                let rewrite = server
                    .children()
                    .find(|n| n.has_tag_name("rewrite"))
                    .ok_or_else(|| self.fail(server, ParseErrorKind::MissingElement("rewrite")))?;
                Ok(rewrite)
            }
            other => Err(self.fail(root, ParseErrorKind::InvalidRoot(other.to_owned()))),
        }
    }

    /// Find the only `name` child of `parent`. A `strict` parent rejects any
    /// other child element.
    fn single_child(
        &self,
        parent: Node<'a, 'input>,
        name: &'static str,
        strict: bool,
    ) -> Result<Node<'a, 'input>, ParseError> {
        let mut found = None;
        for node in parent.children().filter(Node::is_element) {
            let tag = node.tag_name().name();
            if tag == name {
                if found.is_some() {
                    return Err(self.fail(node, ParseErrorKind::DuplicateElement(name)));
                }
                found = Some(node);
            } else if strict {
                return Err(self.fail(node, ParseErrorKind::UnexpectedElement(tag.to_owned())));
            }
        }
        found.ok_or_else(|| self.fail(parent, ParseErrorKind::MissingElement(name)))
    }

    fn rule(&self, node: Node) -> Result<Rule, ParseError> {
        let name = node.attribute("name").ok_or_else(|| {
            self.fail(
                node,
                ParseErrorKind::MissingAttribute {
                    element: "rule",
                    attribute: "name",
                },
            )
        })?;
        self.rule_body(node, name).map_err(|err| err.rule(name))
    }

    fn rule_body(&self, node: Node, name: &str) -> Result<Rule, ParseError> {
        let enabled = self.flag(node, "enabled", true)?;
        let stop = self.flag(node, "stopProcessing", false)?;
        let syntax = match node.attribute("patternSyntax") {
            None => PatternSyntax::EcmaScript,
            Some(s) => match s.to_lowercase().as_str() {
                "ecmascript" => PatternSyntax::EcmaScript,
                "wildcard" => PatternSyntax::Wildcard,
                "exactmatch" => PatternSyntax::ExactMatch,
                _ => return Err(self.invalid(node, "patternSyntax", s)),
            },
        };

        let mut matcher = None;
        let mut conditions = None;
        let mut action = None;
        for child in node.children().filter(Node::is_element) {
            let duplicate = match child.tag_name().name() {
                "match" => matcher
                    .replace(self.initial_match(child, syntax)?)
                    .map(|_| "match"),
                "conditions" => conditions
                    .replace(self.conditions(child, syntax)?)
                    .map(|_| "conditions"),
                "action" => action.replace(self.action(child)?).map(|_| "action"),
                other => {
                    let kind = ParseErrorKind::UnexpectedElement(other.to_owned());
                    return Err(self.fail(child, kind));
                }
            };
            if let Some(tag) = duplicate {
                return Err(self.fail(child, ParseErrorKind::DuplicateElement(tag)));
            }
        }
        let matcher =
            matcher.ok_or_else(|| self.fail(node, ParseErrorKind::MissingElement("match")))?;
        let action =
            action.ok_or_else(|| self.fail(node, ParseErrorKind::MissingElement("action")))?;

        Ok(Rule::new(name, matcher, action)
            .enabled(enabled)
            .relative(true)
            .conditions(conditions.unwrap_or_default())
            .stop_processing(stop))
    }

    fn initial_match(&self, node: Node, syntax: PatternSyntax) -> Result<Matcher, ParseError> {
        let url = self.required(node, "match", "url")?;
        let ignore_case = self.flag(node, "ignoreCase", true)?;
        let negate = self.flag(node, "negate", false)?;
        Matcher::compile(self.compiler, url, syntax, ignore_case, negate)
            .map_err(|err| self.fail(node, err.into()))
    }

    fn conditions(&self, node: Node, syntax: PatternSyntax) -> Result<Conditions, ParseError> {
        let grouping = match node.attribute("logicalGrouping") {
            None => LogicalGrouping::MatchAll,
            Some(s) => match s.to_lowercase().as_str() {
                "matchall" => LogicalGrouping::MatchAll,
                "matchany" => LogicalGrouping::MatchAny,
                _ => return Err(self.invalid(node, "logicalGrouping", s)),
            },
        };
        let track = self.flag(node, "trackAllCaptures", false)?;

        let mut items = Vec::new();
        for child in node.children().filter(Node::is_element) {
            match child.tag_name().name() {
                "add" => items.push(self.condition(child, syntax)?),
                other => {
                    let kind = ParseErrorKind::UnexpectedElement(other.to_owned());
                    return Err(self.fail(child, kind));
                }
            }
        }
        Ok(Conditions::new(items)
            .grouping(grouping)
            .track_all_captures(track))
    }

    fn condition(&self, node: Node, syntax: PatternSyntax) -> Result<Condition, ParseError> {
        let input = self.required(node, "add", "input")?;
        let input = InputParser::parse_input_string(input)
            .map_err(|err| self.fail(node, err.into()))?;
        let ignore_case = self.flag(node, "ignoreCase", true)?;
        let negate = self.flag(node, "negate", false)?;

        let matcher = match node.attribute("matchType") {
            None => None,
            Some(s) => match s.to_lowercase().as_str() {
                "pattern" => None,
                "isfile" => Some(FileTest::File),
                "isdirectory" => Some(FileTest::Dir),
                _ => return Err(self.invalid(node, "matchType", s)),
            },
        };
        let matcher = match matcher {
            Some(test) => Matcher::new(MatchKind::FileTest(test), ignore_case, negate),
            None => {
                let pattern = self.required(node, "add", "pattern")?;
                Matcher::compile(self.compiler, pattern, syntax, ignore_case, negate)
                    .map_err(|err| self.fail(node, err.into()))?
            }
        };
        Ok(Condition::new(input, matcher))
    }

    fn action(&self, node: Node) -> Result<Action, ParseError> {
        let kind = self.required(node, "action", "type")?;
        let action = match kind.to_lowercase().as_str() {
            "none" => Action::None,
            "rewrite" => Action::Rewrite {
                url: self.url(node)?,
                query_string: self.query_string(node)?,
            },
            "redirect" => {
                let status_code = match node.attribute("redirectType") {
                    None => 301,
                    Some(s) => match s.to_lowercase().as_str() {
                        "permanent" => 301,
                        "found" => 302,
                        "seeother" => 303,
                        "temporary" => 307,
                        _ => return Err(self.invalid(node, "redirectType", s)),
                    },
                };
                Action::Redirect {
                    url: self.url(node)?,
                    status_code,
                    query_string: self.query_string(node)?,
                }
            }
            "customresponse" => {
                let status = self.required(node, "action", "statusCode")?;
                let status_code: u16 = status
                    .parse()
                    .map_err(|_| self.invalid(node, "statusCode", status))?;
                if !(100..600).contains(&status_code) {
                    return Err(self.fail(node, ParseErrorKind::InvalidStatus(status_code)));
                }
                Action::CustomResponse {
                    status_code,
                    reason: node.attribute("statusReason").map(str::to_owned),
                }
            }
            "abortrequest" => Action::AbortRequest,
            _ => {
                return Err(self.fail(node, ParseErrorKind::UnknownActionType(kind.to_owned())));
            }
        };
        Ok(action)
    }

    fn url(&self, node: Node) -> Result<crate::template::Template, ParseError> {
        let url = self.required(node, "action", "url")?;
        InputParser::parse_input_string(url).map_err(|err| self.fail(node, err.into()))
    }

    fn query_string(&self, node: Node) -> Result<QueryStringPolicy, ParseError> {
        Ok(match self.flag(node, "appendQueryString", true)? {
            true => QueryStringPolicy::Append,
            false => QueryStringPolicy::Replace,
        })
    }

    fn required<'n>(
        &self,
        node: Node<'n, '_>,
        element: &'static str,
        attribute: &'static str,
    ) -> Result<&'n str, ParseError> {
        node.attribute(attribute).ok_or_else(|| {
            self.fail(
                node,
                ParseErrorKind::MissingAttribute { element, attribute },
            )
        })
    }

    fn flag(&self, node: Node, attribute: &'static str, default: bool) -> Result<bool, ParseError> {
        match node.attribute(attribute) {
            None => Ok(default),
            Some(s) if s.eq_ignore_ascii_case("true") => Ok(true),
            Some(s) if s.eq_ignore_ascii_case("false") => Ok(false),
            Some(s) => Err(self.invalid(node, attribute, s)),
        }
    }

    fn invalid(&self, node: Node, attribute: &'static str, value: &str) -> ParseError {
        self.fail(
            node,
            ParseErrorKind::InvalidAttribute {
                attribute,
                value: value.to_owned(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RewriteContext;
    use crate::error::Location;

    const ARTICLE: &str = r#"<rewrite>
  <rules>
    <rule name="Rewrite to article.aspx">
      <match url="^article/([0-9]+)/([_0-9a-z-]+)" />
      <conditions>
        <add input="{HTTPS}" pattern="^OFF$" />
      </conditions>
      <action type="Rewrite" url="article.aspx?id={R:1}&amp;title={R:2}" />
    </rule>
  </rules>
</rewrite>"#;

    fn parse(xml: &str) -> Result<Vec<Rule>, ParseError> {
        UrlRewriteFileParser::new().parse(xml)
    }

    #[test]
    fn test_typical_rule() {
        let rules = parse(ARTICLE).unwrap();
        assert_eq!(rules.len(), 1);
        let rule = &rules[0];
        assert_eq!(rule.name(), "Rewrite to article.aspx");
        assert!(rule.is_enabled());
        assert!(rule.is_relative());
        assert!(!rule.is_stop_processing());
        assert!(rule.matcher().ignore_case());
        assert_eq!(rule.get_conditions().len(), 1);
        assert_eq!(
            rule.get_conditions().logical_grouping(),
            LogicalGrouping::MatchAll
        );
        let Action::Rewrite { url, query_string } = rule.action() else {
            panic!("expected rewrite action, got {:?}", rule.action());
        };
        assert_eq!(*query_string, QueryStringPolicy::Append);
        assert_eq!(url.segments().len(), 4);
    }

    #[test]
    fn test_multiple_rules() {
        let rules = parse(
            r#"<rewrite><rules>
                <rule name="first"><match url="a" /><action type="None" /></rule>
                <rule name="second" enabled="false" stopProcessing="true">
                    <match url="b" ignoreCase="false" negate="true" />
                    <action type="AbortRequest" />
                </rule>
            </rules></rewrite>"#,
        )
        .unwrap();
        let names: Vec<_> = rules.iter().map(|r| r.name()).collect();
        assert_eq!(names, ["first", "second"]);
        assert!(!rules[1].is_enabled());
        assert!(rules[1].is_stop_processing());
        assert!(rules[1].matcher().is_negated());
        assert!(!rules[1].matcher().ignore_case());
        assert_eq!(rules[1].action(), &Action::AbortRequest);
    }

    #[test]
    fn test_web_config() {
        let rules = parse(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <configuration>
              <system.webServer>
                <rewrite>
                  <rules>
                    <clear />
                    <rule name="https" patternSyntax="Wildcard">
                      <match url="*" />
                      <conditions logicalGrouping="MatchAny" trackAllCaptures="true">
                        <add input="{HTTPS}" pattern="off" />
                        <add input="{REQUEST_FILENAME}" matchType="IsFile" negate="true" />
                      </conditions>
                      <action type="Redirect" url="https://{HTTP_HOST}/{R:1}" redirectType="Found" appendQueryString="false" />
                    </rule>
                  </rules>
                </rewrite>
              </system.webServer>
            </configuration>"#,
        )
        .unwrap();
        let rule = &rules[0];
        let conditions = rule.get_conditions();
        assert_eq!(conditions.logical_grouping(), LogicalGrouping::MatchAny);
        assert!(conditions.is_tracking_all_captures());
        assert_eq!(
            conditions.items()[1].matcher().kind(),
            &MatchKind::FileTest(FileTest::File)
        );
        assert!(conditions.items()[1].is_negated());
        assert!(matches!(
            rule.action(),
            Action::Redirect { status_code: 302, query_string: QueryStringPolicy::Replace, .. }
        ));
    }

    #[test]
    fn test_custom_response() {
        let rules = parse(
            r#"<rewrite><rules>
                <rule name="deny">
                    <match url="^private/" />
                    <action type="CustomResponse" statusCode="403" statusReason="Forbidden" />
                </rule>
                <rule name="moved">
                    <match url="^old$" />
                    <action type="Redirect" url="new" />
                </rule>
            </rules></rewrite>"#,
        )
        .unwrap();
        assert_eq!(
            rules[0].action(),
            &Action::CustomResponse {
                status_code: 403,
                reason: Some("Forbidden".to_owned())
            }
        );
        assert!(matches!(
            rules[1].action(),
            Action::Redirect { status_code: 301, query_string: QueryStringPolicy::Append, .. }
        ));
    }

    #[test]
    fn test_rewrite_applies() {
        let rules = parse(ARTICLE).unwrap();
        let mut ctx = RewriteContext::new("/article/123/my-title").with_variable("HTTPS", "OFF");
        rules[0].apply(&mut ctx).unwrap();
        assert_eq!(ctx.path_and_query(), "article.aspx?id=123&title=my-title");
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(parse(ARTICLE).unwrap(), parse(ARTICLE).unwrap());
    }

    #[test]
    fn test_errors() {
        let err = parse("<rewrite><rules><rule name=\"x\"><match url=\"a\" /></rules></rewrite>")
            .unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::Xml(_)));

        let err = parse(
            "<rewrite>\n<rules>\n<rule name=\"no-match\">\n<action type=\"None\" />\n</rule>\n</rules>\n</rewrite>",
        )
        .unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::MissingElement("match")));
        assert_eq!(
            err.location,
            Location {
                rule: Some("no-match".to_owned()),
                line: Some(3),
                column: Some(1),
            }
        );

        let err = parse(
            r#"<rewrite><rules><rule name="bad"><match url="a" /><action type="Explode" /></rule></rules></rewrite>"#,
        )
        .unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::UnknownActionType(ref t) if t == "Explode"));

        let err = parse(r#"<rewrite><rules><rule><match url="a" /></rule></rules></rewrite>"#)
            .unwrap_err();
        assert!(matches!(
            err.kind,
            ParseErrorKind::MissingAttribute { element: "rule", attribute: "name" }
        ));

        let err = parse(
            r#"<rewrite><rules><rule name="r" enabled="maybe"><match url="a" /><action type="None" /></rule></rules></rewrite>"#,
        )
        .unwrap_err();
        assert!(matches!(
            err.kind,
            ParseErrorKind::InvalidAttribute { attribute: "enabled", .. }
        ));

        let err = parse(
            r#"<rewrite><rules><rule name="r"><match url="a" /><bogus /><action type="None" /></rule></rules></rewrite>"#,
        )
        .unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::UnexpectedElement(ref e) if e == "bogus"));

        let err = parse("<rules />").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::InvalidRoot(ref r) if r == "rules"));

        let err = parse(
            r#"<rewrite><rules><rule name="r" patternSyntax="Wildcard"><match url="a\b" /><action type="None" /></rule></rules></rewrite>"#,
        )
        .unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::Pattern(_)));

        let err = parse(
            r#"<rewrite><rules><rule name="r"><match url="a" /><action type="Rewrite" url="{R:x}" /></rule></rules></rewrite>"#,
        )
        .unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::Template(_)));
    }
}
