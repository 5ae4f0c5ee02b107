//! Streaming XML instance validation.
//!
//! The validator pulls tokens from `xmlparser` and checks well-formedness
//! and, when a compiled schema is supplied, content models, attributes and
//! simple-type values. Errors are collected in document order; a
//! well-formedness failure short-circuits schema checking.

pub mod discovery;
pub mod matcher;

use fnv::FnvHashMap;
use matcher::{ChildMatch, GroupMatcher};
use std::rc::Rc;
use xmlkit_model::datatype::SimpleType;
use xmlkit_model::registry::{TypeDefinition, TypeRegistry};
use xmlkit_model::report::{ErrorSource, ValidationError};
use xmlkit_syntax::types::{AttributeUse, ProcessContents, QName, XSI_NAMESPACE};
use xmlparser::{ElementEnd, Token, Tokenizer};

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Validates XML text, optionally against a compiled schema.
pub struct Validator<'a> {
    registry: Option<&'a TypeRegistry>,
    file: Option<String>,
}

/// Well-formedness check with no schema.
pub fn validate_wellformed(xml: &str) -> Vec<ValidationError> {
    Validator::wellformed_only().validate(xml)
}

impl<'a> Validator<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Validator<'a> {
        Validator {
            registry: Some(registry),
            file: None,
        }
    }

    pub fn wellformed_only() -> Validator<'static> {
        Validator {
            registry: None,
            file: None,
        }
    }

    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file = Some(name.into());
        self
    }

    pub fn validate(&self, xml: &str) -> Vec<ValidationError> {
        Run::new(self.registry, self.file.clone(), xml).run()
    }
}

/// Per-open-element namespace scope and name record.
struct ElemScope {
    prefix: String,
    local: String,
    /// Prefix to URI, empty prefix for the default namespace.
    ns_decls: Vec<(String, String)>,
}

/// Schema state attached to an open element.
enum Frame {
    /// Complex content: children matched against the model.
    Complex {
        matcher: Option<GroupMatcher>,
        mixed: bool,
        /// Simple-content types collect text instead of children.
        simple: Option<Rc<SimpleType>>,
        text: String,
        nil: bool,
        name: String,
        pos: usize,
    },
    /// Element with a simple type: text only.
    Simple {
        simple: Rc<SimpleType>,
        text: String,
        nil: bool,
        name: String,
        pos: usize,
    },
    /// Subtree not checked against the schema (wildcards, unresolved
    /// declarations, anyType).
    Skip,
}

struct Run<'a, 'input> {
    registry: Option<&'a TypeRegistry>,
    file: Option<String>,
    text: &'input str,
    line_starts: Vec<usize>,
    errors: Vec<ValidationError>,
    scopes: Vec<ElemScope>,
    frames: Vec<Frame>,
    pending_start: Option<(String, String, usize)>,
    pending_attrs: Vec<PendingAttr>,
    seen_root: bool,
}

struct PendingAttr {
    prefix: String,
    local: String,
    value: String,
    pos: usize,
}

impl<'a, 'input> Run<'a, 'input> {
    fn new(registry: Option<&'a TypeRegistry>, file: Option<String>, text: &'input str) -> Self {
        let mut line_starts = vec![0usize];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Run {
            registry,
            file,
            text,
            line_starts,
            errors: Vec::new(),
            scopes: Vec::new(),
            frames: Vec::new(),
            pending_start: None,
            pending_attrs: Vec::new(),
            seen_root: false,
        }
    }

    fn line_col(&self, pos: usize) -> (u32, u32) {
        let line = match self.line_starts.binary_search(&pos) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let col = pos - self.line_starts[line];
        (line as u32 + 1, col as u32 + 1)
    }

    fn push_error(&mut self, source: ErrorSource, pos: usize, message: String) {
        let (line, column) = self.line_col(pos);
        let mut err = ValidationError::error(source, message).at(line, column);
        if let Some(file) = &self.file {
            err = err.in_file(file.clone());
        }
        self.errors.push(err);
    }

    fn run(mut self) -> Vec<ValidationError> {
        if self.text.trim().is_empty() {
            self.errors.push(premature_eof(self.file.as_deref()));
            return self.errors;
        }
        // Whitespace ahead of the XML declaration is a prolog error the
        // tokenizer itself does not flag.
        if self.text.starts_with(char::is_whitespace) && self.text.trim_start().starts_with("<?xml")
        {
            self.push_error(
                ErrorSource::WellFormed,
                0,
                "Content is not allowed in prolog.".to_string(),
            );
            return self.errors;
        }

        for token in Tokenizer::from(self.text) {
            let token = match token {
                Ok(token) => token,
                Err(err) => {
                    let pos = err.pos();
                    let mut verr = ValidationError::error(
                        ErrorSource::WellFormed,
                        format!("{err}"),
                    )
                    .at(pos.row, pos.col);
                    if let Some(file) = &self.file {
                        verr = verr.in_file(file.clone());
                    }
                    self.errors.push(verr);
                    // Well-formedness errors short-circuit schema checks.
                    return self.errors;
                }
            };
            if !self.token(token) {
                return self.errors;
            }
        }

        if !self.scopes.is_empty() || !self.seen_root {
            self.errors.push(premature_eof(self.file.as_deref()));
        }
        self.errors
    }

    /// Returns false to stop the run (fatal well-formedness error).
    fn token(&mut self, token: Token<'input>) -> bool {
        match token {
            Token::Declaration { .. }
            | Token::ProcessingInstruction { .. }
            | Token::Comment { .. }
            | Token::DtdStart { .. }
            | Token::EmptyDtd { .. }
            | Token::EntityDeclaration { .. }
            | Token::DtdEnd { .. } => true,
            Token::ElementStart { prefix, local, span } => {
                self.pending_start =
                    Some((prefix.as_str().to_string(), local.as_str().to_string(), span.start()));
                self.pending_attrs.clear();
                true
            }
            Token::Attribute { prefix, local, value, span } => {
                self.pending_attrs.push(PendingAttr {
                    prefix: prefix.as_str().to_string(),
                    local: local.as_str().to_string(),
                    value: unescape(value.as_str()),
                    pos: span.start(),
                });
                true
            }
            Token::ElementEnd { end, span } => match end {
                ElementEnd::Open => {
                    self.open_element();
                    true
                }
                ElementEnd::Empty => {
                    self.open_element();
                    self.close_element(span.start());
                    true
                }
                ElementEnd::Close(prefix, local) => {
                    let expected = self.scopes.last().map(|s| (s.prefix.clone(), s.local.clone()));
                    match expected {
                        Some((open_prefix, open_local))
                            if open_prefix == prefix.as_str() && open_local == local.as_str() =>
                        {
                            self.close_element(span.start());
                            true
                        }
                        Some((open_prefix, open_local)) => {
                            let open = tag_display(&open_prefix, &open_local);
                            let found = tag_display(prefix.as_str(), local.as_str());
                            self.push_error(
                                ErrorSource::WellFormed,
                                span.start(),
                                format!(
                                    "closing tag mismatch: expected </{open}>, found </{found}>"
                                ),
                            );
                            false
                        }
                        None => {
                            self.push_error(
                                ErrorSource::WellFormed,
                                span.start(),
                                format!(
                                    "unexpected closing tag </{}>",
                                    tag_display(prefix.as_str(), local.as_str())
                                ),
                            );
                            false
                        }
                    }
                }
            },
            Token::Text { text } => {
                self.text_content(text.as_str(), text.start());
                true
            }
            Token::Cdata { text, span } => {
                self.text_content(text.as_str(), span.start());
                true
            }
        }
    }

    fn lookup_namespace(&self, prefix: &str) -> Option<String> {
        if prefix == "xml" {
            return Some(XML_NAMESPACE.to_string());
        }
        for scope in self.scopes.iter().rev() {
            for (p, uri) in scope.ns_decls.iter().rev() {
                if p == prefix {
                    if uri.is_empty() {
                        return None;
                    }
                    return Some(uri.clone());
                }
            }
        }
        None
    }

    fn open_element(&mut self) {
        let (prefix, local, pos) = self
            .pending_start
            .take()
            .expect("ElementEnd without ElementStart");
        self.seen_root = true;

        let mut ns_decls = Vec::new();
        for attr in &self.pending_attrs {
            if attr.prefix == "xmlns" {
                ns_decls.push((attr.local.clone(), attr.value.clone()));
            } else if attr.prefix.is_empty() && attr.local == "xmlns" {
                ns_decls.push((String::new(), attr.value.clone()));
            }
        }
        self.scopes.push(ElemScope {
            prefix: prefix.clone(),
            local: local.clone(),
            ns_decls,
        });

        let Some(registry) = self.registry else {
            return;
        };

        let namespace = self.lookup_namespace(&prefix);
        if namespace.is_none() && !prefix.is_empty() {
            self.push_error(
                ErrorSource::WellFormed,
                pos,
                format!("the prefix {prefix:?} is not defined"),
            );
            self.frames.push(Frame::Skip);
            return;
        }
        let name = QName::new(namespace, local.clone());
        let nil = self.nil_requested();

        // Inside a skipped subtree nothing is checked.
        if matches!(self.frames.last(), Some(Frame::Skip)) {
            self.frames.push(Frame::Skip);
            return;
        }

        let resolution: Result<ChildMatch, Option<String>> = match self.frames.last_mut() {
            None => match registry.global_element(&name) {
                Some(spec) => Ok(ChildMatch::Spec(spec)),
                None => Err(Some(format!(
                    "no declaration found for root element {}",
                    name.local
                ))),
            },
            Some(Frame::Complex { matcher, nil: parent_nil, name: parent, .. }) => {
                if *parent_nil {
                    Err(Some(format!(
                        "element {parent} is nilled and must be empty"
                    )))
                } else {
                    match matcher {
                        Some(matcher) => matcher.accept(&name, registry).map_err(|expected| {
                            Some(format!(
                                "element {} is not allowed here; expected {}",
                                name.local, expected
                            ))
                        }),
                        None => Err(Some(format!(
                            "element {parent} does not allow child elements"
                        ))),
                    }
                }
            }
            Some(Frame::Simple { name: parent, .. }) => Err(Some(format!(
                "element {} is not allowed inside the simple content of {parent}",
                name.local
            ))),
            Some(Frame::Skip) => unreachable!("handled above"),
        };

        match resolution {
            Ok(ChildMatch::Spec(spec)) => {
                let type_def = match registry.resolve_ref(&spec.type_ref) {
                    Ok(def) => def,
                    Err(err) => {
                        self.push_error(ErrorSource::Xsd, pos, err.to_string());
                        self.frames.push(Frame::Skip);
                        return;
                    }
                };
                if nil && !spec.nillable {
                    self.push_error(
                        ErrorSource::Xsd,
                        pos,
                        format!("element {} is not nillable", name.local),
                    );
                }
                match type_def.as_ref() {
                    TypeDefinition::Simple(simple) => {
                        if is_anytype(simple) {
                            self.frames.push(Frame::Skip);
                        } else {
                            self.check_attributes(&[], pos);
                            self.frames.push(Frame::Simple {
                                simple: simple.clone(),
                                text: String::new(),
                                nil,
                                name: name.local.clone(),
                                pos,
                            });
                        }
                    }
                    TypeDefinition::Complex(complex) => {
                        let attrs = complex.attributes.clone();
                        self.check_attributes(&attrs, pos);
                        self.frames.push(Frame::Complex {
                            matcher: GroupMatcher::from_content(&complex.content),
                            mixed: complex.mixed,
                            simple: complex.simple_content.clone(),
                            text: String::new(),
                            nil,
                            name: name.local.clone(),
                            pos,
                        });
                    }
                }
            }
            Ok(ChildMatch::Wildcard(pc)) => {
                // Lax processing would look the element up; both lax and
                // skip accept unknown content here.
                if pc == ProcessContents::Strict {
                    if registry.global_element(&name).is_none() {
                        self.push_error(
                            ErrorSource::Xsd,
                            pos,
                            format!(
                                "wildcard requires a declaration for element {}",
                                name.local
                            ),
                        );
                    }
                }
                self.frames.push(Frame::Skip);
            }
            Err(message) => {
                if let Some(message) = message {
                    self.push_error(ErrorSource::Xsd, pos, message);
                }
                self.frames.push(Frame::Skip);
            }
        }
    }

    fn nil_requested(&self) -> bool {
        self.pending_attrs.iter().any(|a| {
            a.local == "nil"
                && a.value == "true"
                && self
                    .resolve_attr_ns(&a.prefix)
                    .as_deref()
                    == Some(XSI_NAMESPACE)
        })
    }

    fn resolve_attr_ns(&self, prefix: &str) -> Option<String> {
        if prefix.is_empty() {
            // Unprefixed attributes are in no namespace.
            return None;
        }
        self.lookup_namespace(prefix)
    }

    fn check_attributes(
        &mut self,
        specs: &[xmlkit_model::registry::AttributeSpec],
        elem_pos: usize,
    ) {
        let mut seen: FnvHashMap<String, usize> = FnvHashMap::default();
        let pending = std::mem::take(&mut self.pending_attrs);
        for attr in &pending {
            if attr.prefix == "xmlns" || (attr.prefix.is_empty() && attr.local == "xmlns") {
                continue;
            }
            let ns = self.resolve_attr_ns(&attr.prefix);
            if ns.as_deref() == Some(XSI_NAMESPACE) || ns.as_deref() == Some(XML_NAMESPACE) {
                continue;
            }
            match specs.iter().position(|s| s.name.local == attr.local) {
                Some(idx) => {
                    seen.insert(attr.local.clone(), idx);
                    let spec = &specs[idx];
                    if !spec.simple_type.is_valid(&attr.value) {
                        self.push_error(
                            ErrorSource::Xsd,
                            attr.pos,
                            format!(
                                "value {:?} is not valid for attribute {}",
                                attr.value, attr.local
                            ),
                        );
                    }
                    if let Some(fixed) = &spec.fixed {
                        if &attr.value != fixed {
                            self.push_error(
                                ErrorSource::Xsd,
                                attr.pos,
                                format!(
                                    "attribute {} must have the fixed value {fixed:?}",
                                    attr.local
                                ),
                            );
                        }
                    }
                }
                None => {
                    self.push_error(
                        ErrorSource::Xsd,
                        attr.pos,
                        format!("attribute {} is not allowed", attr.local),
                    );
                }
            }
        }
        for spec in specs {
            if spec.use_ == AttributeUse::Required && !seen.contains_key(&spec.name.local) {
                self.push_error(
                    ErrorSource::Xsd,
                    elem_pos,
                    format!("required attribute {} is missing", spec.name.local),
                );
            }
        }
        self.pending_attrs = pending;
    }

    fn text_content(&mut self, content: &str, pos: usize) {
        match self.frames.last_mut() {
            Some(Frame::Simple { text, .. }) => text.push_str(&unescape(content)),
            Some(Frame::Complex { text, simple, mixed, name, .. }) => {
                if simple.is_some() {
                    text.push_str(&unescape(content));
                } else if !*mixed && !content.trim().is_empty() {
                    let message =
                        format!("text content is not allowed in element {name}");
                    self.push_error(ErrorSource::Xsd, pos, message);
                }
            }
            _ => {}
        }
    }

    fn close_element(&mut self, pos: usize) {
        self.scopes.pop();
        if self.registry.is_none() {
            return;
        }
        match self.frames.pop() {
            Some(Frame::Simple { simple, text, nil, name, pos: start }) => {
                if !nil && !simple.is_valid(&text) {
                    let (line, col) = self.line_col(if text.is_empty() { start } else { pos });
                    let mut err = ValidationError::error(
                        ErrorSource::Xsd,
                        format!("value {:?} is not valid for element {name}", text),
                    )
                    .at(line, col);
                    if let Some(file) = &self.file {
                        err = err.in_file(file.clone());
                    }
                    self.errors.push(err);
                }
            }
            Some(Frame::Complex { matcher, simple, text, nil, name, pos: start, .. }) => {
                if let Some(simple) = simple {
                    if !nil && !simple.is_valid(&text) {
                        self.push_error(
                            ErrorSource::Xsd,
                            start,
                            format!("value {:?} is not valid for element {name}", text),
                        );
                    }
                } else if let Some(matcher) = matcher {
                    if !nil && !matcher.close_ok() {
                        let missing = self
                            .registry
                            .map(|r| matcher.missing(r).join(", "))
                            .unwrap_or_default();
                        self.push_error(
                            ErrorSource::Xsd,
                            start,
                            format!("element {name} is missing required children: {missing}"),
                        );
                    }
                }
            }
            _ => {}
        }
    }
}

fn is_anytype(simple: &SimpleType) -> bool {
    simple
        .name
        .as_ref()
        .map(|n| n.is_xsd() && n.local == "anyType")
        .unwrap_or(false)
}

fn tag_display(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{prefix}:{local}")
    }
}

/// Expand the predefined and character entity references the tokenizer
/// leaves in place. Unknown entities pass through verbatim.
fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 1..];
        let Some(end) = rest.find(';') else {
            out.push('&');
            break;
        };
        let entity = &rest[..end];
        match entity {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                let code = entity
                    .strip_prefix("#x")
                    .and_then(|h| u32::from_str_radix(h, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()));
                match code.and_then(char::from_u32) {
                    Some(c) => out.push(c),
                    None => {
                        out.push('&');
                        out.push_str(entity);
                        out.push(';');
                    }
                }
            }
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}

fn premature_eof(file: Option<&str>) -> ValidationError {
    let mut err = ValidationError::error(ErrorSource::WellFormed, "Premature end of file.")
        .at(1, 1);
    if let Some(file) = file {
        err = err.in_file(file);
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wellformed_input_yields_no_errors() {
        assert!(validate_wellformed("<a><b>text</b></a>").is_empty());
    }

    #[test]
    fn mismatched_tags_report_tag_mismatch() {
        let errors = validate_wellformed("<a><b></a>");
        assert!(!errors.is_empty());
        assert!(
            errors[0].message.contains("tag mismatch"),
            "got {:?}",
            errors[0].message
        );
        assert_eq!(errors[0].source, ErrorSource::WellFormed);
    }

    #[test]
    fn empty_and_blank_inputs_are_premature_eof() {
        for input in ["", "   \n\t  "] {
            let errors = validate_wellformed(input);
            assert_eq!(errors.len(), 1, "for {input:?}");
            assert_eq!(errors[0].message, "Premature end of file.");
        }
    }

    #[test]
    fn whitespace_before_declaration_is_a_prolog_error() {
        let errors = validate_wellformed("  <?xml version=\"1.0\"?><a/>");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("prolog"));
    }

    #[test]
    fn entity_references_are_expanded() {
        assert_eq!(unescape("a &amp; b &#65;&#x42;"), "a & b AB");
        assert_eq!(unescape("plain"), "plain");
        assert_eq!(unescape("&unknown;"), "&unknown;");
    }

    #[test]
    fn ignorable_whitespace_does_not_change_results() {
        let a = validate_wellformed("<a><b>x</b></a>");
        let b = validate_wellformed("<a>\n  <b>x</b>\n</a>");
        assert_eq!(a, b);
    }
}
