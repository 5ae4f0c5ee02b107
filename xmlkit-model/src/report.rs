//! The error record shared by every validation front end.
//!
//! Validity problems are collected into lists of [`ValidationError`],
//! never raised; each entry carries enough location information to be
//! rendered in an editor gutter.

use std::fmt;

#[derive(PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Debug)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Which engine produced the error.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum ErrorSource {
    WellFormed,
    Xsd,
    Schematron,
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorSource::WellFormed => "wellformed",
            ErrorSource::Xsd => "xsd",
            ErrorSource::Schematron => "schematron",
        };
        f.write_str(s)
    }
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub struct ValidationError {
    pub file: Option<String>,
    /// 1-based line.
    pub line: Option<u32>,
    /// 1-based column.
    pub column: Option<u32>,
    pub message: String,
    pub severity: Severity,
    pub source: ErrorSource,
    /// Schematron rule or assertion id, when applicable.
    pub rule_id: Option<String>,
    /// XPath of the node the error is about.
    pub context_xpath: Option<String>,
}

impl ValidationError {
    pub fn new(source: ErrorSource, severity: Severity, message: impl Into<String>) -> Self {
        ValidationError {
            file: None,
            line: None,
            column: None,
            message: message.into(),
            severity,
            source,
            rule_id: None,
            context_xpath: None,
        }
    }

    pub fn error(source: ErrorSource, message: impl Into<String>) -> Self {
        Self::new(source, Severity::Error, message)
    }

    pub fn warning(source: ErrorSource, message: impl Into<String>) -> Self {
        Self::new(source, Severity::Warning, message)
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_context(mut self, xpath: impl Into<String>) -> Self {
        self.context_xpath = Some(xpath.into());
        self
    }

    pub fn with_rule(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}]", self.source, self.severity)?;
        if let Some(file) = &self.file {
            write!(f, " {file}")?;
            if let (Some(line), Some(col)) = (self.line, self.column) {
                write!(f, ":{line}:{col}")?;
            }
        } else if let (Some(line), Some(col)) = (self.line, self.column) {
            write!(f, " {line}:{col}")?;
        }
        write!(f, " {}", self.message)?;
        if let Some(rule) = &self.rule_id {
            write!(f, " (rule {rule})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_location_and_rule() {
        let err = ValidationError::error(ErrorSource::Schematron, "missing child")
            .in_file("a.xml")
            .at(3, 7)
            .with_rule("r1");
        assert_eq!(
            err.to_string(),
            "[schematron/error] a.xml:3:7 missing child (rule r1)"
        );
    }
}
