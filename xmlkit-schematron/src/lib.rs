//! Schematron rule validation.
//!
//! Pipeline: an ISO Schematron file compiles to a [`SchematronRuleset`]
//! (the include/abstract-expansion stages applied natively), instances
//! are evaluated rule by rule through XPath 1.0, the findings are
//! materialized as an SVRL document, and the SVRL parse yields the
//! [`ValidationError`] list callers consume.

pub mod cache;
pub mod ruleset;
pub mod svrl;

pub use cache::RulesetCache;
pub use ruleset::{Assertion, MessagePart, Pattern, Rule, SchematronRuleset};

use std::path::Path;
use sxd_xpath::{Context, Factory, Value};
use xmlkit_model::cancel::{CancelToken, Cancelled};
use xmlkit_model::report::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum SchematronError {
    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("XML parse error in schematron source: {0}")]
    Xml(roxmltree::Error),
    #[error("not a schematron schema: root element is {found:?}")]
    NotSchematron { found: String },
    #[error("invalid schematron: {detail}")]
    Invalid { detail: String },
    #[error("pre-compiled XSLT schematron input {path:?} is not supported; supply the .sch source")]
    XsltInputUnsupported { path: String },
    #[error("XPath error in {expr:?}: {detail}")]
    XPath { expr: String, detail: String },
    #[error("instance document is not well-formed: {detail}")]
    InstanceParse { detail: String },
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

#[derive(Debug)]
pub struct SchematronReport {
    pub errors: Vec<ValidationError>,
    /// The intermediate SVRL document the errors were parsed from.
    pub svrl: String,
    /// Number of rules whose context matched at least one node.
    pub fired_rules: usize,
}

impl SchematronReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Compile Schematron text into an executable ruleset.
pub fn compile_str(text: &str) -> Result<SchematronRuleset, SchematronError> {
    ruleset::parse(text)
}

/// Compile a Schematron file. `.sch` sources are parsed; pre-compiled
/// XSLT inputs are recognized by extension and rejected.
pub fn compile_file(path: &Path) -> Result<SchematronRuleset, SchematronError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("xsl") | Some("xslt") => Err(SchematronError::XsltInputUnsupported {
            path: path.display().to_string(),
        }),
        _ => {
            let text = std::fs::read_to_string(path).map_err(|source| SchematronError::Io {
                path: path.display().to_string(),
                source,
            })?;
            compile_str(&text)
        }
    }
}

/// Long-lived engine holding the shared compiled-ruleset cache.
pub struct SchematronEngine {
    cache: RulesetCache,
}

impl Default for SchematronEngine {
    fn default() -> Self {
        SchematronEngine::new()
    }
}

impl SchematronEngine {
    pub fn new() -> SchematronEngine {
        SchematronEngine {
            cache: RulesetCache::new(32),
        }
    }

    pub fn with_cache_capacity(capacity: usize) -> SchematronEngine {
        SchematronEngine {
            cache: RulesetCache::new(capacity),
        }
    }

    pub fn cache(&self) -> &RulesetCache {
        &self.cache
    }

    /// Validate `xml` against the Schematron file at `path`, using the
    /// cache keyed by canonical path and mtime.
    pub fn validate_file(&self, path: &Path, xml: &str) -> Result<SchematronReport, SchematronError> {
        if let Some("xsl") | Some("xslt") = path.extension().and_then(|e| e.to_str()) {
            return Err(SchematronError::XsltInputUnsupported {
                path: path.display().to_string(),
            });
        }
        let ruleset = self.cache.get_or_compile(path)?;
        run(&ruleset, xml, "#ALL", &CancelToken::new())
    }
}

/// Validate without a cache, for in-memory rulesets.
pub fn validate_str(sch: &str, xml: &str) -> Result<SchematronReport, SchematronError> {
    let ruleset = compile_str(sch)?;
    run(&ruleset, xml, "#ALL", &CancelToken::new())
}

/// Schematron contexts are match patterns; anything not rooted matches
/// anywhere in the document.
fn rooted(context: &str) -> String {
    if context.starts_with('/') {
        context.to_string()
    } else {
        format!("//{context}")
    }
}

fn build_xpath(factory: &Factory, expr: &str) -> Result<sxd_xpath::XPath, SchematronError> {
    factory
        .build(expr)
        .map_err(|e| SchematronError::XPath {
            expr: expr.to_string(),
            detail: format!("{e:?}"),
        })?
        .ok_or_else(|| SchematronError::XPath {
            expr: expr.to_string(),
            detail: "empty expression".to_string(),
        })
}

/// Evaluate a ruleset against an instance document.
pub fn run(
    ruleset: &SchematronRuleset,
    xml: &str,
    phase: &str,
    cancel: &CancelToken,
) -> Result<SchematronReport, SchematronError> {
    let package = sxd_document::parser::parse(xml).map_err(|e| SchematronError::InstanceParse {
        detail: format!("{e:?}"),
    })?;
    let document = package.as_document();
    let factory = Factory::new();

    let mut builder = svrl::SvrlBuilder::new(ruleset.title.as_deref());
    let mut fired_rules = 0usize;

    for pattern in ruleset.active_patterns(phase) {
        // Cancellation is observed between patterns.
        cancel.check()?;
        builder.active_pattern(pattern.id.as_deref(), pattern.title.as_deref());

        for rule in &pattern.rules {
            let context_expr = rooted(&rule.context);
            let xpath = build_xpath(&factory, &context_expr)?;
            let mut root_ctx = Context::new();
            for (prefix, uri) in &ruleset.namespaces {
                root_ctx.set_namespace(prefix, uri);
            }
            let matched = xpath
                .evaluate(&root_ctx, document.root())
                .map_err(|e| SchematronError::XPath {
                    expr: context_expr.clone(),
                    detail: format!("{e:?}"),
                })?;
            let Value::Nodeset(nodes) = matched else {
                continue;
            };
            if nodes.size() > 0 {
                builder.fired_rule(&rule.context);
                fired_rules += 1;
            }

            for node in nodes.document_order() {
                let mut ctx = Context::new();
                for (prefix, uri) in &ruleset.namespaces {
                    ctx.set_namespace(prefix, uri);
                }
                for binding in pattern.lets.iter().chain(rule.lets.iter()) {
                    let value_expr = build_xpath(&factory, &binding.value)?;
                    let value =
                        value_expr
                            .evaluate(&ctx, node)
                            .map_err(|e| SchematronError::XPath {
                                expr: binding.value.clone(),
                                detail: format!("{e:?}"),
                            })?;
                    ctx.set_variable(binding.name.as_str(), value);
                }

                let location = node_location(node);
                for assertion in &rule.asserts {
                    let test = build_xpath(&factory, &assertion.test)?;
                    let value = test.evaluate(&ctx, node).map_err(|e| SchematronError::XPath {
                        expr: assertion.test.clone(),
                        detail: format!("{e:?}"),
                    })?;
                    if !value.boolean() {
                        let message = render_message(&assertion.message, &factory, &ctx, node)?;
                        builder.failed_assert(
                            assertion.id.as_deref().or(rule.id.as_deref()),
                            &assertion.test,
                            assertion.role.as_deref(),
                            &location,
                            &message,
                        );
                    }
                }
                for report in &rule.reports {
                    let test = build_xpath(&factory, &report.test)?;
                    let value = test.evaluate(&ctx, node).map_err(|e| SchematronError::XPath {
                        expr: report.test.clone(),
                        detail: format!("{e:?}"),
                    })?;
                    if value.boolean() {
                        let message = render_message(&report.message, &factory, &ctx, node)?;
                        builder.successful_report(
                            report.id.as_deref().or(rule.id.as_deref()),
                            &report.test,
                            report.role.as_deref(),
                            &location,
                            &message,
                        );
                    }
                }
            }
        }
    }

    let svrl_text = builder.finish();
    let errors = svrl::parse(&svrl_text)?;
    Ok(SchematronReport {
        errors,
        svrl: svrl_text,
        fired_rules,
    })
}

/// Render a message template, substituting `<value-of>` selections and
/// `<name/>` against the context node, and collapsing the whitespace
/// that pretty-printed rule files carry.
fn render_message<'d>(
    parts: &[MessagePart],
    factory: &Factory,
    ctx: &Context<'d>,
    node: sxd_xpath::nodeset::Node<'d>,
) -> Result<String, SchematronError> {
    let mut out = String::new();
    for part in parts {
        match part {
            MessagePart::Text(text) => out.push_str(text),
            MessagePart::ValueOf(select) => {
                let xpath = build_xpath(factory, select)?;
                let value = xpath.evaluate(ctx, node).map_err(|e| SchematronError::XPath {
                    expr: select.clone(),
                    detail: format!("{e:?}"),
                })?;
                out.push_str(&value.string());
            }
            MessagePart::Name => out.push_str(&node_name(node)),
        }
    }
    Ok(out.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn node_name(node: sxd_xpath::nodeset::Node) -> String {
    use sxd_xpath::nodeset::Node;
    match node {
        Node::Element(el) => el.name().local_part().to_string(),
        Node::Attribute(attr) => attr.name().local_part().to_string(),
        _ => String::new(),
    }
}

/// The SVRL `@location` of a node: slash-separated local names with
/// 1-based sibling positions.
fn node_location(node: sxd_xpath::nodeset::Node) -> String {
    use sxd_document::dom::{ChildOfElement, ParentOfChild};
    use sxd_xpath::nodeset::Node;

    fn element_path(el: sxd_document::dom::Element, out: &mut String) {
        if let Some(ParentOfChild::Element(parent)) = el.parent() {
            element_path(parent, out);
            let mut index = 1;
            for child in parent.children() {
                if let ChildOfElement::Element(sibling) = child {
                    if sibling == el {
                        break;
                    }
                    if sibling.name() == el.name() {
                        index += 1;
                    }
                }
            }
            out.push_str(&format!("/{}[{}]", el.name().local_part(), index));
        } else {
            out.push_str(&format!("/{}[1]", el.name().local_part()));
        }
    }

    match node {
        Node::Element(el) => {
            let mut out = String::new();
            element_path(el, &mut out);
            out
        }
        Node::Attribute(attr) => {
            let mut out = String::new();
            if let Some(parent) = attr.parent() {
                element_path(parent, &mut out);
            }
            out.push_str(&format!("/@{}", attr.name().local_part()));
            out
        }
        Node::Root(_) => "/".to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xmlkit_model::report::Severity;

    const CHILD_RULE: &str = r#"<sch:schema xmlns:sch="http://purl.oclc.org/dsdl/schematron">
  <sch:title>structure checks</sch:title>
  <sch:pattern id="structure">
    <sch:rule context="root" id="root-has-child">
      <sch:assert test="element">Root element must contain an element child</sch:assert>
    </sch:rule>
  </sch:pattern>
</sch:schema>"#;

    #[test]
    fn failed_assert_produces_one_error_with_rule_id() {
        let report = validate_str(CHILD_RULE, "<root/>").expect("run");
        assert_eq!(report.errors.len(), 1);
        let err = &report.errors[0];
        assert_eq!(err.message, "Root element must contain an element child");
        assert_eq!(err.rule_id.as_deref(), Some("root-has-child"));
        assert_eq!(err.context_xpath.as_deref(), Some("/root[1]"));
        assert_eq!(err.severity, Severity::Error);
    }

    #[test]
    fn satisfied_assert_is_quiet() {
        let report = validate_str(CHILD_RULE, "<root><element/></root>").expect("run");
        assert!(report.is_valid());
        assert_eq!(report.fired_rules, 1);
        assert!(report.svrl.contains("<svrl:fired-rule"));
    }

    #[test]
    fn value_of_is_substituted() {
        let sch = r#"<sch:schema xmlns:sch="http://purl.oclc.org/dsdl/schematron">
  <sch:pattern><sch:rule context="item">
    <sch:assert test="@price &gt; 0">Item <sch:value-of select="@name"/> needs a positive price</sch:assert>
  </sch:rule></sch:pattern>
</sch:schema>"#;
        let report = validate_str(sch, r#"<cart><item name="apple" price="0"/></cart>"#).unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(
            report.errors[0].message,
            "Item apple needs a positive price"
        );
    }

    #[test]
    fn role_maps_to_severity() {
        let sch = r#"<sch:schema xmlns:sch="http://purl.oclc.org/dsdl/schematron">
  <sch:pattern><sch:rule context="doc">
    <sch:assert test="false()" role="warning">advice only</sch:assert>
  </sch:rule></sch:pattern>
</sch:schema>"#;
        let report = validate_str(sch, "<doc/>").unwrap();
        assert_eq!(report.errors[0].severity, Severity::Warning);
    }

    #[test]
    fn report_fires_on_true_test() {
        let sch = r#"<sch:schema xmlns:sch="http://purl.oclc.org/dsdl/schematron">
  <sch:pattern><sch:rule context="doc">
    <sch:report test="deprecated">uses a deprecated element</sch:report>
  </sch:rule></sch:pattern>
</sch:schema>"#;
        let report = validate_str(sch, "<doc><deprecated/></doc>").unwrap();
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].message.contains("deprecated"));
    }

    #[test]
    fn namespaces_and_lets_are_honored() {
        let sch = r#"<sch:schema xmlns:sch="http://purl.oclc.org/dsdl/schematron">
  <sch:ns prefix="b" uri="urn:books"/>
  <sch:pattern>
    <sch:rule context="b:book">
      <sch:let name="pages" value="number(@pages)"/>
      <sch:assert test="$pages &gt;= 10">too short</sch:assert>
    </sch:rule>
  </sch:pattern>
</sch:schema>"#;
        let xml = r#"<b:shelf xmlns:b="urn:books"><b:book pages="5"/></b:shelf>"#;
        let report = validate_str(sch, xml).unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].message, "too short");
    }

    #[test]
    fn xslt_input_is_rejected() {
        let err = compile_file(std::path::Path::new("rules.xslt")).unwrap_err();
        assert!(matches!(err, SchematronError::XsltInputUnsupported { .. }));
    }
}
