//! Structural editing of XSD documents.
//!
//! The editor owns a mutable DOM for one schema. Target nodes are
//! addressed by the same slash-separated XPath keys the element graph
//! uses; `[n]` indices are accepted and ignored during lookup. Every
//! operation resolves its targets before the first mutation, so a
//! failed edit leaves the document untouched, and every successful edit
//! returns an [`EditRecord`] that reverses it. Serialization uses
//! 2-space indentation and preserves comments and attribute order.

use std::collections::HashSet;
use xmlkit_syntax::types::FacetKind;
use xot::{Node, Xot};

const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";
const VC_NS: &str = "http://www.w3.org/2007/XMLSchema-versioning";

#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("XML parse error: {detail}")]
    Parse { detail: String },
    #[error("no schema node found for {xpath}")]
    NotFound { xpath: String },
    #[error("{xpath} is not an assertion site; it references a named type — edit that type instead")]
    NotAnAssertionSite { xpath: String },
    #[error("prefix {prefix:?} is already bound to a different namespace")]
    PrefixConflict { prefix: String },
    #[error("invalid edit: {detail}")]
    Invalid { detail: String },
}

/// Undo data for one applied edit: a description for menus plus the
/// full serialized document from before the change. Callers keep these
/// on their own undo/redo stacks.
#[derive(Clone, Debug)]
pub struct EditRecord {
    pub description: String,
    before: String,
}

impl EditRecord {
    pub fn description(&self) -> &str {
        &self.description
    }
}

#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum AttributeUse {
    Optional,
    Required,
    Prohibited,
}

impl AttributeUse {
    fn as_str(&self) -> &'static str {
        match self {
            AttributeUse::Optional => "optional",
            AttributeUse::Required => "required",
            AttributeUse::Prohibited => "prohibited",
        }
    }
}

enum AssertionSite {
    Complex(Node),
    Simple(Node),
}

pub struct XsdEditor {
    xot: Xot,
    doc: Node,
    /// The input used CRLF line endings; serialization keeps them.
    crlf: bool,
}

impl XsdEditor {
    pub fn parse(text: &str) -> Result<XsdEditor, EditError> {
        let mut xot = Xot::new();
        let doc = xot.parse(text).map_err(|e| EditError::Parse {
            detail: e.to_string(),
        })?;
        let mut editor = XsdEditor {
            xot,
            doc,
            crlf: text.contains("\r\n"),
        };
        let root = editor.root()?;
        if !editor.is_xs(root, "schema") {
            return Err(EditError::Invalid {
                detail: "document root is not xs:schema".to_string(),
            });
        }
        editor.strip_layout_whitespace(doc);
        Ok(editor)
    }

    /// Render the document with 2-space indentation. Comments and
    /// attribute order come through the DOM untouched; line endings
    /// follow the input.
    pub fn serialize(&self) -> Result<String, EditError> {
        let parameters = xot::output::xml::Parameters {
            indentation: Some(Default::default()),
            ..Default::default()
        };
        let text = self
            .xot
            .serialize_xml_string(parameters, self.doc)
            .map_err(|e| EditError::Parse {
                detail: e.to_string(),
            })?;
        if self.crlf {
            Ok(text.replace('\n', "\r\n"))
        } else {
            Ok(text)
        }
    }

    /// Restore the state captured in `record`, returning a record that
    /// redoes the undone edit.
    pub fn undo(&mut self, record: &EditRecord) -> Result<EditRecord, EditError> {
        let redo = EditRecord {
            description: format!("redo {}", record.description),
            before: self.serialize()?,
        };
        let mut xot = Xot::new();
        let doc = xot.parse(&record.before).map_err(|e| EditError::Parse {
            detail: e.to_string(),
        })?;
        self.xot = xot;
        self.doc = doc;
        self.strip_layout_whitespace(self.doc);
        Ok(redo)
    }

    fn checkpoint(&self, description: String) -> Result<EditRecord, EditError> {
        log::debug!("edit: {description}");
        Ok(EditRecord {
            description,
            before: self.serialize()?,
        })
    }

    // ---- operations -----------------------------------------------------

    /// Add a child element declaration under the element at
    /// `parent_xpath`, creating the inline complexType/sequence scaffold
    /// when the parent does not have one yet.
    pub fn add_element(
        &mut self,
        parent_xpath: &str,
        name: &str,
        type_name: Option<&str>,
        min_occurs: u32,
        max_occurs: Option<u32>,
        attributes: &[(String, String)],
    ) -> Result<EditRecord, EditError> {
        let parent = self.find_element(parent_xpath)?;
        let record = self.checkpoint(format!("add element {name} under {parent_xpath}"))?;

        let model = self.ensure_content_model(parent)?;
        let element = self.new_xs_element("element");
        self.set_attr(element, "name", name);
        if let Some(type_name) = type_name {
            if attributes.is_empty() {
                self.set_attr(element, "type", type_name);
            }
        }
        if min_occurs != 1 {
            self.set_attr(element, "minOccurs", &min_occurs.to_string());
        }
        match max_occurs {
            Some(1) => {}
            Some(n) => self.set_attr(element, "maxOccurs", &n.to_string()),
            None => self.set_attr(element, "maxOccurs", "unbounded"),
        }
        if !attributes.is_empty() {
            // Attributes force an inline complex type.
            let complex = self.new_xs_element("complexType");
            for (attr_name, attr_type) in attributes {
                let attribute = self.new_xs_element("attribute");
                self.set_attr(attribute, "name", attr_name);
                self.set_attr(attribute, "type", attr_type);
                self.append(complex, attribute)?;
            }
            self.append(element, complex)?;
        }
        self.append(model, element)?;
        Ok(record)
    }

    /// Remove the element declaration at `xpath` entirely.
    pub fn remove_element(&mut self, xpath: &str) -> Result<EditRecord, EditError> {
        let node = self.find_element(xpath)?;
        let record = self.checkpoint(format!("remove element {xpath}"))?;
        self.xot.detach(node).map_err(|e| EditError::Parse {
            detail: e.to_string(),
        })?;
        Ok(record)
    }

    /// Rename the element at `xpath`, rewriting `ref` and
    /// `substitutionGroup` references to it throughout the schema.
    pub fn rename(&mut self, xpath: &str, new_name: &str) -> Result<EditRecord, EditError> {
        let node = self.find_element(xpath)?;
        let old_name = self
            .attr(node, "name")
            .ok_or_else(|| EditError::Invalid {
                detail: format!("{xpath} is a reference, not a declaration"),
            })?
            .to_string();
        let record = self.checkpoint(format!("rename {old_name} to {new_name}"))?;

        self.set_attr(node, "name", new_name);
        let root = self.root()?;
        let targets = self.collect_elements(root);
        for target in targets {
            for attr_name in ["ref", "substitutionGroup"] {
                if let Some(value) = self.attr_by_local(target, attr_name) {
                    let (prefix, local) = split_qname(&value);
                    if local == old_name {
                        let new_value = match prefix {
                            Some(p) => format!("{p}:{new_name}"),
                            None => new_name.to_string(),
                        };
                        self.set_attr_by_local(target, attr_name, &new_value);
                    }
                }
            }
        }
        Ok(record)
    }

    /// Add an attribute declaration to the element at `owner_xpath`.
    pub fn add_attribute(
        &mut self,
        owner_xpath: &str,
        name: &str,
        type_name: &str,
        use_: AttributeUse,
        default: Option<&str>,
    ) -> Result<EditRecord, EditError> {
        let owner = self.find_element(owner_xpath)?;
        let complex = self
            .inline_child(owner, "complexType")
            .ok_or_else(|| EditError::Invalid {
                detail: format!(
                    "{owner_xpath} has no directly-declared complex type to hold attributes"
                ),
            })?;
        let record = self.checkpoint(format!("add attribute {name} to {owner_xpath}"))?;

        let attribute = self.new_xs_element("attribute");
        self.set_attr(attribute, "name", name);
        self.set_attr(attribute, "type", type_name);
        if use_ != AttributeUse::Optional {
            self.set_attr(attribute, "use", use_.as_str());
        }
        if let Some(default) = default {
            self.set_attr(attribute, "default", default);
        }
        self.append(complex, attribute)?;
        Ok(record)
    }

    /// Add a constraining facet to the simple type at
    /// `simple_type_xpath` (an element with an inline simple type, or a
    /// global simple type addressed as `/TypeName`).
    pub fn add_facet(
        &mut self,
        simple_type_xpath: &str,
        kind: FacetKind,
        value: &str,
    ) -> Result<EditRecord, EditError> {
        let restriction = self.find_restriction(simple_type_xpath)?;
        let record = self.checkpoint(format!(
            "add facet {} to {simple_type_xpath}",
            kind.element_name()
        ))?;

        let facet = self.new_xs_element(kind.element_name());
        let attr = if kind == FacetKind::Assertion { "test" } else { "value" };
        self.set_attr(facet, attr, value);
        // Facet order matters to readers: enumerations append, pattern
        // and bounds go after any whiteSpace facet already present.
        self.append(restriction, facet)?;
        Ok(record)
    }

    /// Add an XSD 1.1 assertion. The target must be a directly-declared
    /// complex or simple type; an element that references a named type
    /// by QName is not an assertion site of its own — a child inside a
    /// complex type writes to the owning complex type, a top-level
    /// reference fails. Complex sites take `xs:assert`, simple sites the
    /// `xs:assertion` facet. The schema root gains `vc:minVersion="1.1"`
    /// if it does not carry it yet.
    pub fn add_assertion(
        &mut self,
        xpath: &str,
        test: &str,
        message: Option<&str>,
    ) -> Result<EditRecord, EditError> {
        let site = self.find_assertion_site(xpath)?;
        self.check_vc_prefix()?;
        let record = self.checkpoint(format!("add assertion to {xpath}"))?;

        let assert = match site {
            AssertionSite::Complex(_) => self.new_xs_element("assert"),
            AssertionSite::Simple(_) => self.new_xs_element("assertion"),
        };
        self.set_attr(assert, "test", test);
        if let Some(message) = message {
            let annotation = self.new_xs_element("annotation");
            let documentation = self.new_xs_element("documentation");
            let text = self.xot.new_text(message);
            self.append(documentation, text)?;
            self.append(annotation, documentation)?;
            self.append(assert, annotation)?;
        }
        match site {
            AssertionSite::Complex(node) => self.append(node, assert)?,
            AssertionSite::Simple(node) => {
                let restriction = self
                    .xot
                    .children(node)
                    .find(|&c| self.is_xs(c, "restriction"))
                    .ok_or_else(|| EditError::Invalid {
                        detail: "simple type has no restriction to hold the assertion".to_string(),
                    })?;
                self.append(restriction, assert)?;
            }
        }
        self.ensure_vc_min_version()?;
        Ok(record)
    }

    // ---- lookup ---------------------------------------------------------

    fn root(&self) -> Result<Node, EditError> {
        self.xot
            .document_element(self.doc)
            .map_err(|e| EditError::Parse {
                detail: e.to_string(),
            })
    }

    fn is_xs(&self, node: Node, local: &str) -> bool {
        let Some(element) = self.xot.element(node) else {
            return false;
        };
        let name = element.name();
        self.xot.local_name_str(name) == local
            && self.xot.namespace_str(self.xot.namespace_for_name(name)) == XSD_NS
    }

    /// Resolve an instance-style XPath key to the `xs:element`
    /// declaration node it describes.
    fn find_element(&self, xpath: &str) -> Result<Node, EditError> {
        let segments: Vec<String> = xpath
            .split('/')
            .filter(|s| !s.is_empty())
            .map(strip_index)
            .collect();
        let not_found = || EditError::NotFound {
            xpath: xpath.to_string(),
        };
        let (first, rest) = segments.split_first().ok_or_else(not_found)?;

        let root = self.root()?;
        let mut current = self
            .xot
            .children(root)
            .find(|&c| self.is_xs(c, "element") && self.attr(c, "name").as_deref() == Some(first.as_str()))
            .ok_or_else(not_found)?;

        for segment in rest {
            let mut seen_types = HashSet::new();
            current = self
                .descend(current, segment, &mut seen_types)
                .ok_or_else(not_found)?;
        }
        Ok(current)
    }

    /// Find the child element declaration named `segment` inside the
    /// content model of `element` (inline or same-document named type).
    fn descend(&self, element: Node, segment: &str, seen: &mut HashSet<String>) -> Option<Node> {
        let type_node = if let Some(inline) = self.inline_child(element, "complexType") {
            Some(inline)
        } else if let Some(type_name) = self.attr(element, "type") {
            let local = split_qname(&type_name).1.to_string();
            if !seen.insert(local.clone()) {
                return None;
            }
            self.global_type(&local)
        } else {
            None
        }?;
        self.find_in_model(type_node, segment)
    }

    fn find_in_model(&self, node: Node, segment: &str) -> Option<Node> {
        for child in self.xot.children(node) {
            if self.is_xs(child, "element") {
                let matches = self.attr(child, "name").as_deref() == Some(segment)
                    || self
                        .attr(child, "ref")
                        .map(|r| split_qname(&r).1 == segment)
                        .unwrap_or(false);
                if matches {
                    return Some(child);
                }
            } else if self.is_xs(child, "sequence")
                || self.is_xs(child, "choice")
                || self.is_xs(child, "all")
                || self.is_xs(child, "group")
                || self.is_xs(child, "complexContent")
                || self.is_xs(child, "extension")
                || self.is_xs(child, "restriction")
            {
                if let Some(found) = self.find_in_model(child, segment) {
                    return Some(found);
                }
            }
        }
        None
    }

    fn global_type(&self, local: &str) -> Option<Node> {
        let root = self.root().ok()?;
        self.xot.children(root).find(|&c| {
            (self.is_xs(c, "complexType") || self.is_xs(c, "simpleType"))
                && self.attr(c, "name").as_deref() == Some(local)
        })
    }

    fn find_restriction(&self, xpath: &str) -> Result<Node, EditError> {
        let not_found = || EditError::NotFound {
            xpath: xpath.to_string(),
        };
        // A bare /TypeName addresses a global simple type.
        let simple_type = match self.find_element(xpath) {
            Ok(element) => self
                .inline_child(element, "simpleType")
                .ok_or_else(|| EditError::Invalid {
                    detail: format!("{xpath} has no directly-declared simple type"),
                })?,
            Err(_) => {
                let local = strip_index(xpath.trim_start_matches('/'));
                let node = self.global_type(&local).ok_or_else(not_found)?;
                if !self.is_xs(node, "simpleType") {
                    return Err(EditError::Invalid {
                        detail: format!("{xpath} is not a simple type"),
                    });
                }
                node
            }
        };
        self.xot
            .children(simple_type)
            .find(|&c| self.is_xs(c, "restriction"))
            .ok_or_else(|| EditError::Invalid {
                detail: format!("{xpath} has no xs:restriction to hold facets"),
            })
    }

    fn find_assertion_site(&self, xpath: &str) -> Result<AssertionSite, EditError> {
        if let Ok(element) = self.find_element(xpath) {
            if let Some(inline) = self.inline_child(element, "complexType") {
                return Ok(AssertionSite::Complex(inline));
            }
            if let Some(inline) = self.inline_child(element, "simpleType") {
                return Ok(AssertionSite::Simple(inline));
            }
            if self.attr(element, "type").is_some() {
                // Assertions live on the type, and this element only
                // points at one; unless the element sits inside an
                // enclosing directly-declared complex type, it is not a
                // site of its own.
                if let Some(owner) = self.owning_complex_type(element) {
                    return Ok(AssertionSite::Complex(owner));
                }
                return Err(EditError::NotAnAssertionSite {
                    xpath: xpath.to_string(),
                });
            }
            return Err(EditError::NotAnAssertionSite {
                xpath: xpath.to_string(),
            });
        }
        // A global type addressed by name.
        let local = strip_index(xpath.trim_start_matches('/'));
        let node = self.global_type(&local).ok_or_else(|| EditError::NotFound {
            xpath: xpath.to_string(),
        })?;
        if self.is_xs(node, "simpleType") {
            Ok(AssertionSite::Simple(node))
        } else {
            Ok(AssertionSite::Complex(node))
        }
    }

    /// The complex type whose content model contains `node`, when that
    /// type is directly declared (not reached through a QName).
    fn owning_complex_type(&self, node: Node) -> Option<Node> {
        let mut current = self.xot.parent(node);
        while let Some(n) = current {
            if self.is_xs(n, "complexType") {
                return Some(n);
            }
            if self.is_xs(n, "schema") {
                return None;
            }
            current = self.xot.parent(n);
        }
        None
    }

    fn inline_child(&self, node: Node, local: &str) -> Option<Node> {
        self.xot.children(node).find(|&c| self.is_xs(c, local))
    }

    /// The parent's model group, creating `complexType/sequence`
    /// scaffolding on demand.
    fn ensure_content_model(&mut self, element: Node) -> Result<Node, EditError> {
        let complex = match self.inline_child(element, "complexType") {
            Some(c) => c,
            None => {
                if self.attr(element, "type").is_some() {
                    return Err(EditError::Invalid {
                        detail: "element references a named type; edit that type instead"
                            .to_string(),
                    });
                }
                let complex = self.new_xs_element("complexType");
                self.append(element, complex)?;
                complex
            }
        };
        for kind in ["sequence", "choice", "all"] {
            if let Some(model) = self.inline_child(complex, kind) {
                return Ok(model);
            }
        }
        let sequence = self.new_xs_element("sequence");
        // The model group must precede attribute declarations.
        let first_attr = self
            .xot
            .children(complex)
            .find(|&c| self.is_xs(c, "attribute") || self.is_xs(c, "attributeGroup"));
        match first_attr {
            Some(attr) => self.xot.insert_before(attr, sequence),
            None => self.xot.append(complex, sequence),
        }
        .map_err(|e| EditError::Parse {
            detail: e.to_string(),
        })?;
        Ok(sequence)
    }

    // ---- vc:minVersion --------------------------------------------------

    fn check_vc_prefix(&self) -> Result<(), EditError> {
        let root = self.root()?;
        for (prefix_id, ns_id) in self.xot.namespaces(root).iter() {
            if self.xot.prefix_str(prefix_id) == "vc" && self.xot.namespace_str(*ns_id) != VC_NS {
                return Err(EditError::PrefixConflict {
                    prefix: "vc".to_string(),
                });
            }
        }
        Ok(())
    }

    fn ensure_vc_min_version(&mut self) -> Result<(), EditError> {
        let root = self.root()?;
        let vc_ns = self.xot.add_namespace(VC_NS);
        let vc_prefix = self.xot.add_prefix("vc");
        let has_decl = self
            .xot
            .namespaces(root)
            .iter()
            .any(|(p, _)| self.xot.prefix_str(p) == "vc");
        if !has_decl {
            self.xot.namespaces_mut(root).insert(vc_prefix, vc_ns);
        }
        let min_version = self.xot.add_name_ns("minVersion", vc_ns);
        if self.xot.attributes(root).get(min_version).is_none() {
            self.xot
                .attributes_mut(root)
                .insert(min_version, "1.1".to_string());
        }
        Ok(())
    }

    // ---- small DOM helpers ----------------------------------------------

    fn new_xs_element(&mut self, local: &str) -> Node {
        let ns = self.xot.add_namespace(XSD_NS);
        let name = self.xot.add_name_ns(local, ns);
        self.xot.new_element(name)
    }

    fn append(&mut self, parent: Node, child: Node) -> Result<(), EditError> {
        self.xot.append(parent, child).map_err(|e| EditError::Parse {
            detail: e.to_string(),
        })
    }

    fn attr(&self, node: Node, local: &str) -> Option<String> {
        self.attr_by_local(node, local)
    }

    fn attr_by_local(&self, node: Node, local: &str) -> Option<String> {
        let attrs = self.xot.attributes(node);
        for (name_id, value) in attrs.iter() {
            if self.xot.local_name_str(name_id) == local {
                return Some(value.clone());
            }
        }
        None
    }

    fn set_attr(&mut self, node: Node, local: &str, value: &str) {
        let name = self.xot.add_name(local);
        self.xot.attributes_mut(node).insert(name, value.to_string());
    }

    fn set_attr_by_local(&mut self, node: Node, local: &str, value: &str) {
        let existing = {
            let attrs = self.xot.attributes(node);
            let found = attrs
                .iter()
                .map(|(name_id, _)| name_id)
                .find(|&name_id| self.xot.local_name_str(name_id) == local);
            found
        };
        match existing {
            Some(name_id) => {
                self.xot.attributes_mut(node).insert(name_id, value.to_string());
            }
            None => self.set_attr(node, local, value),
        }
    }

    fn collect_elements(&self, node: Node) -> Vec<Node> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            if self.is_xs(n, "element") {
                out.push(n);
            }
            stack.extend(self.xot.children(n));
        }
        out
    }

    /// Drop whitespace-only text nodes so serialization re-indents
    /// cleanly instead of stacking old and new layout.
    fn strip_layout_whitespace(&mut self, node: Node) {
        let children: Vec<Node> = self.xot.children(node).collect();
        for child in children {
            if let Some(text) = self.xot.text_str(child) {
                if text.trim().is_empty() {
                    let _ = self.xot.detach(child);
                }
                continue;
            }
            self.strip_layout_whitespace(child);
        }
    }
}

fn strip_index(segment: &str) -> String {
    match segment.find('[') {
        Some(i) => segment[..i].to_string(),
        None => segment.to_string(),
    }
}

fn split_qname(value: &str) -> (Option<&str>, &str) {
    match value.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SCHEMA: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <!-- invoice master schema -->
  <xs:element name="invoice">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="line" type="LineType" maxOccurs="unbounded"/>
        <xs:element name="total">
          <xs:simpleType>
            <xs:restriction base="xs:decimal">
              <xs:minInclusive value="0"/>
            </xs:restriction>
          </xs:simpleType>
        </xs:element>
      </xs:sequence>
      <xs:attribute name="id" type="xs:ID" use="required"/>
    </xs:complexType>
  </xs:element>
  <xs:complexType name="LineType">
    <xs:sequence>
      <xs:element name="amount" type="xs:decimal"/>
    </xs:sequence>
  </xs:complexType>
  <xs:element name="note" type="xs:string"/>
</xs:schema>"#;

    fn editor() -> XsdEditor {
        XsdEditor::parse(SCHEMA).expect("schema parses")
    }

    #[test]
    fn add_element_creates_declaration_in_sequence() {
        let mut ed = editor();
        ed.add_element("/invoice", "currency", Some("xs:string"), 1, Some(1), &[])
            .expect("add");
        let out = ed.serialize().unwrap();
        assert!(out.contains("<xs:element name=\"currency\" type=\"xs:string\"/>"));
    }

    #[test]
    fn add_element_with_occurs_and_attributes() {
        let mut ed = editor();
        ed.add_element(
            "/invoice",
            "tag",
            None,
            0,
            None,
            &[("lang".to_string(), "xs:language".to_string())],
        )
        .expect("add");
        let out = ed.serialize().unwrap();
        assert!(out.contains("minOccurs=\"0\""));
        assert!(out.contains("maxOccurs=\"unbounded\""));
        assert!(out.contains("<xs:attribute name=\"lang\" type=\"xs:language\"/>"));
    }

    #[test]
    fn remove_element_deletes_the_declaration() {
        let mut ed = editor();
        ed.remove_element("/invoice/total").expect("remove");
        let out = ed.serialize().unwrap();
        assert!(!out.contains("name=\"total\""));
        // Untouched siblings survive.
        assert!(out.contains("name=\"line\""));
    }

    #[test]
    fn rename_round_trip_restores_the_document() {
        let mut ed = editor();
        let original = ed.serialize().unwrap();
        ed.rename("/note", "remark").expect("rename");
        assert!(ed.serialize().unwrap().contains("name=\"remark\""));
        ed.rename("/remark", "note").expect("rename back");
        assert_eq!(ed.serialize().unwrap(), original);
    }

    #[test]
    fn rename_rewrites_references() {
        let schema = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="item" type="xs:string"/>
  <xs:element name="list">
    <xs:complexType>
      <xs:sequence>
        <xs:element ref="item" maxOccurs="unbounded"/>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;
        let mut ed = XsdEditor::parse(schema).unwrap();
        ed.rename("/item", "entry").expect("rename");
        let out = ed.serialize().unwrap();
        assert!(out.contains("name=\"entry\""));
        assert!(out.contains("ref=\"entry\""));
        assert!(!out.contains("\"item\""));
    }

    #[test]
    fn add_attribute_goes_to_the_inline_complex_type() {
        let mut ed = editor();
        ed.add_attribute("/invoice", "issued", "xs:date", AttributeUse::Required, None)
            .expect("add attribute");
        let out = ed.serialize().unwrap();
        assert!(out.contains("<xs:attribute name=\"issued\" type=\"xs:date\" use=\"required\"/>"));
    }

    #[test]
    fn add_attribute_without_complex_type_fails_cleanly() {
        let mut ed = editor();
        let before = ed.serialize().unwrap();
        let err = ed
            .add_attribute("/note", "x", "xs:string", AttributeUse::Optional, None)
            .unwrap_err();
        assert_matches!(err, EditError::Invalid { .. });
        assert_eq!(ed.serialize().unwrap(), before, "failed edit must not write");
    }

    #[test]
    fn add_facet_on_inline_simple_type() {
        let mut ed = editor();
        ed.add_facet("/invoice/total", FacetKind::FractionDigits, "2")
            .expect("add facet");
        let out = ed.serialize().unwrap();
        assert!(out.contains("<xs:fractionDigits value=\"2\"/>"));
    }

    #[test]
    fn assertion_on_directly_declared_type_bumps_min_version() {
        let mut ed = editor();
        ed.add_assertion("/invoice", "count(line) > 0", Some("An invoice needs lines"))
            .expect("assert");
        let out = ed.serialize().unwrap();
        assert!(out.contains("<xs:assert test=\"count(line) &gt; 0\">")
            || out.contains("<xs:assert test=\"count(line) > 0\">"));
        assert!(out.contains("vc:minVersion=\"1.1\""));
        assert!(out.contains("An invoice needs lines"));
    }

    #[test]
    fn element_referencing_named_type_is_not_an_assertion_site_at_top_level() {
        let mut ed = XsdEditor::parse(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="doc" type="DocType"/>
  <xs:complexType name="DocType">
    <xs:sequence><xs:element name="a" type="xs:string"/></xs:sequence>
  </xs:complexType>
</xs:schema>"#,
        )
        .unwrap();
        let err = ed.add_assertion("/doc", "true()", None).unwrap_err();
        assert_matches!(err, EditError::NotAnAssertionSite { .. });
        // The named type itself is a valid site.
        ed.add_assertion("/DocType", "true()", None).expect("type site");
    }

    #[test]
    fn child_with_named_type_writes_to_the_owning_complex_type() {
        let mut ed = editor();
        // `line` references LineType by QName; the assertion belongs to
        // the complex type that owns the selection, invoice's inline one.
        ed.add_assertion("/invoice/line", "count(.) > 0", None)
            .expect("assert on child");
        let out = ed.serialize().unwrap();
        let assert_pos = out.find("<xs:assert ").unwrap();
        let line_type_pos = out.find("name=\"LineType\"").unwrap();
        assert!(assert_pos < line_type_pos, "assert must land on the owning type");
    }

    #[test]
    fn directly_declared_simple_type_takes_an_assertion_facet() {
        let mut ed = editor();
        ed.add_assertion("/invoice/total", "$value >= 0", None)
            .expect("assert on simple type");
        let out = ed.serialize().unwrap();
        assert!(out.contains("<xs:assertion test="), "got {out}");
    }

    #[test]
    fn undo_restores_previous_state_and_redo_record_works() {
        let mut ed = editor();
        let original = ed.serialize().unwrap();
        let record = ed
            .add_element("/invoice", "memo", Some("xs:string"), 0, Some(1), &[])
            .unwrap();
        let after = ed.serialize().unwrap();
        assert_ne!(original, after);
        let redo = ed.undo(&record).expect("undo");
        assert_eq!(ed.serialize().unwrap(), original);
        ed.undo(&redo).expect("redo");
        assert_eq!(ed.serialize().unwrap(), after);
    }

    #[test]
    fn comments_survive_serialization() {
        let ed = editor();
        assert!(ed.serialize().unwrap().contains("<!-- invoice master schema -->"));
    }

    #[test]
    fn vc_prefix_conflict_fails_the_operation() {
        let mut ed = XsdEditor::parse(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:vc="urn:other">
  <xs:element name="doc"><xs:complexType><xs:sequence/></xs:complexType></xs:element>
</xs:schema>"#,
        )
        .unwrap();
        let err = ed.add_assertion("/doc", "true()", None).unwrap_err();
        assert_matches!(err, EditError::PrefixConflict { .. });
    }
}
