//! SVRL, the Schematron Validation Report Language.
//!
//! Rule evaluation materializes an SVRL document; that document is then
//! parsed back into [`ValidationError`]s. SVRL is an internal format:
//! the report text is available for inspection but the public contract
//! is the error list.

use crate::SchematronError;
use xmlkit_model::report::{ErrorSource, Severity, ValidationError};

pub const SVRL_NAMESPACE: &str = "http://purl.oclc.org/dsdl/svrl";

/// Accumulates an SVRL document during rule evaluation.
pub struct SvrlBuilder {
    out: String,
}

impl SvrlBuilder {
    pub fn new(title: Option<&str>) -> SvrlBuilder {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str("<svrl:schematron-output xmlns:svrl=\"");
        out.push_str(SVRL_NAMESPACE);
        out.push('"');
        if let Some(title) = title {
            out.push_str(&format!(" title=\"{}\"", escape_attr(title)));
        }
        out.push_str(">\n");
        SvrlBuilder { out }
    }

    pub fn active_pattern(&mut self, id: Option<&str>, name: Option<&str>) {
        self.out.push_str("  <svrl:active-pattern");
        if let Some(id) = id {
            self.out.push_str(&format!(" id=\"{}\"", escape_attr(id)));
        }
        if let Some(name) = name {
            self.out.push_str(&format!(" name=\"{}\"", escape_attr(name)));
        }
        self.out.push_str("/>\n");
    }

    pub fn fired_rule(&mut self, context: &str) {
        self.out.push_str(&format!(
            "  <svrl:fired-rule context=\"{}\"/>\n",
            escape_attr(context)
        ));
    }

    pub fn failed_assert(
        &mut self,
        id: Option<&str>,
        test: &str,
        role: Option<&str>,
        location: &str,
        message: &str,
    ) {
        self.assertion("failed-assert", id, test, role, location, message);
    }

    pub fn successful_report(
        &mut self,
        id: Option<&str>,
        test: &str,
        role: Option<&str>,
        location: &str,
        message: &str,
    ) {
        self.assertion("successful-report", id, test, role, location, message);
    }

    fn assertion(
        &mut self,
        element: &str,
        id: Option<&str>,
        test: &str,
        role: Option<&str>,
        location: &str,
        message: &str,
    ) {
        self.out.push_str(&format!(
            "  <svrl:{element} test=\"{}\"",
            escape_attr(test)
        ));
        if let Some(id) = id {
            self.out.push_str(&format!(" id=\"{}\"", escape_attr(id)));
        }
        if let Some(role) = role {
            self.out.push_str(&format!(" role=\"{}\"", escape_attr(role)));
        }
        self.out
            .push_str(&format!(" location=\"{}\">\n", escape_attr(location)));
        self.out.push_str(&format!(
            "    <svrl:text>{}</svrl:text>\n",
            escape_text(message)
        ));
        self.out.push_str(&format!("  </svrl:{element}>\n"));
    }

    pub fn finish(mut self) -> String {
        self.out.push_str("</svrl:schematron-output>\n");
        self.out
    }
}

/// Parse an SVRL document into validation errors: one per
/// `svrl:failed-assert` and `svrl:successful-report`.
pub fn parse(svrl: &str) -> Result<Vec<ValidationError>, SchematronError> {
    let doc = roxmltree::Document::parse(svrl).map_err(SchematronError::Xml)?;
    let mut errors = Vec::new();
    for node in doc.root_element().children().filter(|c| c.is_element()) {
        if node.tag_name().namespace() != Some(SVRL_NAMESPACE) {
            continue;
        }
        let kind = node.tag_name().name();
        if kind != "failed-assert" && kind != "successful-report" {
            continue;
        }
        let message = node
            .children()
            .find(|c| c.is_element() && c.tag_name().name() == "text")
            .and_then(|t| t.text())
            .unwrap_or_default()
            .to_string();
        let severity = match node.attribute("role") {
            Some("info") | Some("information") => Severity::Info,
            Some("warn") | Some("warning") => Severity::Warning,
            Some("fatal") => Severity::Fatal,
            _ => Severity::Error,
        };
        let mut err = ValidationError::new(ErrorSource::Schematron, severity, message);
        if let Some(id) = node.attribute("id") {
            err = err.with_rule(id);
        }
        if let Some(location) = node.attribute("location") {
            err = err.with_context(location);
        }
        errors.push(err);
    }
    Ok(errors)
}

fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_round_trips_through_svrl() {
        let mut builder = SvrlBuilder::new(Some("demo"));
        builder.active_pattern(Some("p1"), None);
        builder.fired_rule("root");
        builder.failed_assert(
            Some("a1"),
            "element",
            Some("warning"),
            "/root[1]",
            "Root element must contain an element child",
        );
        let svrl = builder.finish();
        let errors = parse(&svrl).expect("svrl parses");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].rule_id.as_deref(), Some("a1"));
        assert_eq!(errors[0].context_xpath.as_deref(), Some("/root[1]"));
        assert_eq!(errors[0].severity, Severity::Warning);
        assert_eq!(
            errors[0].message,
            "Root element must contain an element child"
        );
    }
}
