//! ISO Schematron parsing.
//!
//! Produces a [`SchematronRuleset`]: patterns of rules with their context
//! expressions, assertions and reports, plus the namespace and variable
//! declarations the XPath evaluation context needs. Abstract rules are
//! expanded into their extenders here, mirroring what the skeleton's
//! `iso_abstract_expand` stage does.

use crate::SchematronError;
use std::collections::HashMap;
use xmlkit_model::report::Severity;

pub const SCH_NAMESPACE: &str = "http://purl.oclc.org/dsdl/schematron";
/// The pre-ISO namespace is still widespread; both are accepted.
pub const SCH_1_5_NAMESPACE: &str = "http://www.ascc.net/xml/schematron";

#[derive(Clone, Debug)]
pub struct SchematronRuleset {
    pub title: Option<String>,
    /// Prefix declarations from `<sch:ns>`.
    pub namespaces: Vec<(String, String)>,
    pub patterns: Vec<Pattern>,
    /// Phase id -> active pattern ids. Phase `#ALL` runs everything.
    pub phases: HashMap<String, Vec<String>>,
}

#[derive(Clone, Debug)]
pub struct Pattern {
    pub id: Option<String>,
    pub title: Option<String>,
    /// `<sch:let>` bindings at pattern scope.
    pub lets: Vec<LetBinding>,
    pub rules: Vec<Rule>,
}

#[derive(Clone, Debug)]
pub struct Rule {
    pub id: Option<String>,
    /// The context match expression.
    pub context: String,
    pub lets: Vec<LetBinding>,
    pub asserts: Vec<Assertion>,
    pub reports: Vec<Assertion>,
    /// Unexpanded `<sch:extends>` targets; drained during parsing.
    pub(crate) extends: Vec<String>,
}

/// An `<sch:assert>` or `<sch:report>`.
#[derive(Clone, Debug)]
pub struct Assertion {
    pub id: Option<String>,
    pub test: String,
    pub role: Option<String>,
    /// Message template: literal text interleaved with value-of selects.
    pub message: Vec<MessagePart>,
}

#[derive(Clone, Debug)]
pub enum MessagePart {
    Text(String),
    /// `<sch:value-of select="..."/>`, substituted at report time.
    ValueOf(String),
    /// `<sch:name/>` shorthand for the context element's name.
    Name,
}

#[derive(Clone, Debug)]
pub struct LetBinding {
    pub name: String,
    pub value: String,
}

impl Assertion {
    /// Severity derived from `@role`, defaulting to error.
    pub fn severity(&self) -> Severity {
        match self.role.as_deref() {
            Some("info") | Some("information") => Severity::Info,
            Some("warn") | Some("warning") => Severity::Warning,
            Some("fatal") => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl SchematronRuleset {
    /// Patterns active in `phase` (`#ALL` or an id from `<sch:phase>`).
    pub fn active_patterns(&self, phase: &str) -> Vec<&Pattern> {
        if phase == "#ALL" {
            return self.patterns.iter().collect();
        }
        match self.phases.get(phase) {
            None => self.patterns.iter().collect(),
            Some(active) => self
                .patterns
                .iter()
                .filter(|p| p.id.as_ref().map(|id| active.contains(id)).unwrap_or(false))
                .collect(),
        }
    }
}

fn is_sch(node: roxmltree::Node, local: &str) -> bool {
    node.is_element()
        && matches!(
            node.tag_name().namespace(),
            Some(SCH_NAMESPACE) | Some(SCH_1_5_NAMESPACE)
        )
        && node.tag_name().name() == local
}

pub fn parse(text: &str) -> Result<SchematronRuleset, SchematronError> {
    let doc = roxmltree::Document::parse(text).map_err(SchematronError::Xml)?;
    let root = doc.root_element();
    if !is_sch(root, "schema") {
        return Err(SchematronError::NotSchematron {
            found: root.tag_name().name().to_string(),
        });
    }

    let mut ruleset = SchematronRuleset {
        title: None,
        namespaces: Vec::new(),
        patterns: Vec::new(),
        phases: HashMap::new(),
    };
    // Abstract rules referenced by <sch:extends>.
    let mut abstract_rules: HashMap<String, Rule> = HashMap::new();

    for child in root.children().filter(|c| c.is_element()) {
        if is_sch(child, "title") {
            ruleset.title = child.text().map(str::to_string);
        } else if is_sch(child, "ns") {
            let (Some(prefix), Some(uri)) = (child.attribute("prefix"), child.attribute("uri"))
            else {
                return Err(SchematronError::Invalid {
                    detail: "sch:ns requires prefix and uri".into(),
                });
            };
            ruleset.namespaces.push((prefix.to_string(), uri.to_string()));
        } else if is_sch(child, "phase") {
            let Some(id) = child.attribute("id") else {
                continue;
            };
            let active = child
                .children()
                .filter(|c| is_sch(*c, "active"))
                .filter_map(|c| c.attribute("pattern"))
                .map(str::to_string)
                .collect();
            ruleset.phases.insert(id.to_string(), active);
        } else if is_sch(child, "pattern") {
            ruleset
                .patterns
                .push(parse_pattern(child, &mut abstract_rules)?);
        }
    }

    // Expand <sch:extends> references now that every abstract rule is known.
    for pattern in &mut ruleset.patterns {
        for rule in &mut pattern.rules {
            let mut extra_asserts = Vec::new();
            let mut extra_reports = Vec::new();
            for base_id in rule.extends.drain(..) {
                match abstract_rules.get(&base_id) {
                    Some(base) => {
                        extra_asserts.extend(base.asserts.iter().cloned());
                        extra_reports.extend(base.reports.iter().cloned());
                    }
                    None => {
                        return Err(SchematronError::Invalid {
                            detail: format!("sch:extends references unknown rule {base_id:?}"),
                        });
                    }
                }
            }
            rule.asserts.extend(extra_asserts);
            rule.reports.extend(extra_reports);
        }
    }

    if ruleset.patterns.is_empty() {
        log::warn!("schematron schema contains no patterns");
    }
    Ok(ruleset)
}

fn parse_pattern(
    node: roxmltree::Node,
    abstract_rules: &mut HashMap<String, Rule>,
) -> Result<Pattern, SchematronError> {
    let mut pattern = Pattern {
        id: node.attribute("id").map(str::to_string),
        title: node.attribute("name").map(str::to_string),
        lets: Vec::new(),
        rules: Vec::new(),
    };
    for child in node.children().filter(|c| c.is_element()) {
        if is_sch(child, "title") {
            pattern.title = child.text().map(str::to_string);
        } else if is_sch(child, "let") {
            pattern.lets.push(parse_let(child)?);
        } else if is_sch(child, "rule") {
            let rule = parse_rule(child)?;
            if child.attribute("abstract") == Some("true") {
                let Some(id) = rule.id.clone() else {
                    return Err(SchematronError::Invalid {
                        detail: "abstract rule requires an id".into(),
                    });
                };
                abstract_rules.insert(id, rule);
            } else {
                pattern.rules.push(rule);
            }
        }
    }
    Ok(pattern)
}

fn parse_rule(node: roxmltree::Node) -> Result<Rule, SchematronError> {
    let context = match node.attribute("context") {
        Some(c) => c.to_string(),
        None if node.attribute("abstract") == Some("true") => String::new(),
        None => {
            return Err(SchematronError::Invalid {
                detail: "sch:rule requires a context".into(),
            });
        }
    };
    let mut rule = Rule {
        id: node.attribute("id").map(str::to_string),
        context,
        lets: Vec::new(),
        asserts: Vec::new(),
        reports: Vec::new(),
        extends: Vec::new(),
    };
    for child in node.children().filter(|c| c.is_element()) {
        if is_sch(child, "let") {
            rule.lets.push(parse_let(child)?);
        } else if is_sch(child, "assert") {
            rule.asserts.push(parse_assertion(child)?);
        } else if is_sch(child, "report") {
            rule.reports.push(parse_assertion(child)?);
        } else if is_sch(child, "extends") {
            if let Some(base) = child.attribute("rule") {
                rule.extends.push(base.to_string());
            }
        }
    }
    Ok(rule)
}

fn parse_let(node: roxmltree::Node) -> Result<LetBinding, SchematronError> {
    let (Some(name), Some(value)) = (node.attribute("name"), node.attribute("value")) else {
        return Err(SchematronError::Invalid {
            detail: "sch:let requires name and value".into(),
        });
    };
    Ok(LetBinding {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn parse_assertion(node: roxmltree::Node) -> Result<Assertion, SchematronError> {
    let Some(test) = node.attribute("test") else {
        return Err(SchematronError::Invalid {
            detail: format!("sch:{} requires a test", node.tag_name().name()),
        });
    };
    let mut message = Vec::new();
    for child in node.children() {
        if child.is_text() {
            if let Some(text) = child.text() {
                message.push(MessagePart::Text(text.to_string()));
            }
        } else if is_sch(child, "value-of") {
            if let Some(select) = child.attribute("select") {
                message.push(MessagePart::ValueOf(select.to_string()));
            }
        } else if is_sch(child, "name") {
            message.push(MessagePart::Name);
        }
    }
    Ok(Assertion {
        id: node.attribute("id").map(str::to_string),
        test: test.to_string(),
        role: node.attribute("role").map(str::to_string),
        message,
    })
}
