//! XSD parsing over a `roxmltree` document.
//!
//! The walk is tolerant of unknown elements outside the XSD namespace
//! (vendor annotations are common in the wild) but strict about the
//! structure of the constructs it does understand.

use crate::types::*;
use crate::SyntaxError;
use codemap::Span;
use roxmltree::{Document, Node};

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

pub(crate) struct SchemaParser<'a, 'input> {
    doc: &'a Document<'input>,
    /// Span of the whole source file in the loader's codemap.
    base: Span,
}

/// Parse the `<xs:schema>` root of `doc` into a [`Schema`].
pub fn parse_schema(doc: &Document<'_>, base: Span) -> Result<Schema, SyntaxError> {
    SchemaParser { doc, base }.schema(doc.root_element())
}

impl<'a, 'input> SchemaParser<'a, 'input> {
    fn span(&self, node: Node) -> Span {
        let range = node.range();
        self.base.subspan(range.start as u64, range.end as u64)
    }

    fn line(&self, node: Node) -> u32 {
        self.doc.text_pos_at(node.range().start).row
    }

    fn err(&self, node: Node, message: impl Into<String>) -> SyntaxError {
        SyntaxError::Schema {
            span: self.span(node),
            message: message.into(),
        }
    }

    fn is_xsd(&self, node: Node, local: &str) -> bool {
        node.is_element()
            && node.tag_name().namespace() == Some(XSD_NAMESPACE)
            && node.tag_name().name() == local
    }

    /// Resolve a prefixed name (`xs:string`, `tns:Invoice`, `Invoice`)
    /// against the namespace declarations in scope at `node`.
    fn qname(&self, node: Node, value: &str) -> Result<QName, SyntaxError> {
        let (prefix, local) = match value.split_once(':') {
            Some((p, l)) => (Some(p), l),
            None => (None, value),
        };
        if local.is_empty() || local.contains(':') {
            return Err(self.err(node, format!("malformed QName {value:?}")));
        }
        let namespace = match prefix {
            Some("xml") => Some(XML_NAMESPACE.to_string()),
            Some(p) => Some(self.lookup_namespace(node, Some(p)).ok_or_else(|| {
                self.err(node, format!("undefined namespace prefix {p:?} in {value:?}"))
            })?),
            // An unprefixed QName takes the default namespace if one is
            // declared, else no namespace.
            None => self.lookup_namespace(node, None),
        };
        Ok(QName::new(namespace, local))
    }

    fn lookup_namespace(&self, node: Node, prefix: Option<&str>) -> Option<String> {
        let mut current = Some(node);
        while let Some(n) = current {
            if n.is_element() {
                for ns in n.namespaces() {
                    if ns.name() == prefix {
                        return Some(ns.uri().to_string());
                    }
                }
            }
            current = n.parent();
        }
        None
    }

    fn occurrence(&self, node: Node) -> Result<Occurrence, SyntaxError> {
        let min = match node.attribute("minOccurs") {
            None => 1,
            Some(v) => v
                .parse::<u32>()
                .map_err(|_| self.err(node, format!("invalid minOccurs {v:?}")))?,
        };
        let max = match node.attribute("maxOccurs") {
            None => MaxOccurs::Bounded(1),
            Some("unbounded") => MaxOccurs::Unbounded,
            Some(v) => MaxOccurs::Bounded(
                v.parse::<u32>()
                    .map_err(|_| self.err(node, format!("invalid maxOccurs {v:?}")))?,
            ),
        };
        if let MaxOccurs::Bounded(m) = max {
            if m < min {
                return Err(self.err(node, format!("maxOccurs {m} is less than minOccurs {min}")));
            }
        }
        Ok(Occurrence { min, max })
    }

    fn annotation(&self, node: Node) -> Annotation {
        let mut out = Annotation::default();
        for ann in node.children().filter(|c| self.is_xsd(*c, "annotation")) {
            for doc in ann.children().filter(|c| self.is_xsd(*c, "documentation")) {
                let lang = doc
                    .attributes()
                    .find(|a| a.namespace() == Some(XML_NAMESPACE) && a.name() == "lang")
                    .map(|a| a.value().to_string());
                let text = collect_text(doc);
                out.documentation.push(Documentation { lang, text });
            }
        }
        out
    }

    fn bool_attr(&self, node: Node, name: &str) -> bool {
        matches!(node.attribute(name), Some("true") | Some("1"))
    }

    pub fn schema(&self, root: Node) -> Result<Schema, SyntaxError> {
        if !self.is_xsd(root, "schema") {
            return Err(self.err(
                root,
                format!(
                    "expected an xs:schema root element, found {:?}",
                    root.tag_name().name()
                ),
            ));
        }
        let mut schema = Schema {
            span: self.span(root),
            target_namespace: root.attribute("targetNamespace").map(str::to_string),
            element_form_default: form_default(root.attribute("elementFormDefault")),
            attribute_form_default: form_default(root.attribute("attributeFormDefault")),
            min_version: root
                .attributes()
                .find(|a| a.namespace() == Some(VC_NAMESPACE) && a.name() == "minVersion")
                .map(|a| a.value().to_string()),
            includes: Vec::new(),
            imports: Vec::new(),
            elements: Vec::new(),
            attributes: Vec::new(),
            simple_types: Vec::new(),
            complex_types: Vec::new(),
            groups: Vec::new(),
            attribute_groups: Vec::new(),
        };

        for child in root.children().filter(|c| c.is_element()) {
            if child.tag_name().namespace() != Some(XSD_NAMESPACE) {
                continue;
            }
            match child.tag_name().name() {
                "annotation" => {}
                "include" => {
                    let location = child
                        .attribute("schemaLocation")
                        .ok_or_else(|| self.err(child, "xs:include without schemaLocation"))?;
                    schema.includes.push(IncludeDecl {
                        span: self.span(child),
                        location: location.to_string(),
                    });
                }
                "import" => schema.imports.push(ImportDecl {
                    span: self.span(child),
                    namespace: child.attribute("namespace").map(str::to_string),
                    location: child.attribute("schemaLocation").map(str::to_string),
                }),
                "redefine" | "override" => {
                    return Err(self.err(child, "xs:redefine/xs:override are not supported"));
                }
                "element" => schema.elements.push(self.element(child)?),
                "attribute" => schema.attributes.push(self.attribute(child)?),
                "simpleType" => {
                    let st = self.simple_type(child)?;
                    if st.name.is_none() {
                        return Err(self.err(child, "global xs:simpleType requires a name"));
                    }
                    schema.simple_types.push(st);
                }
                "complexType" => {
                    let ct = self.complex_type(child)?;
                    if ct.name.is_none() {
                        return Err(self.err(child, "global xs:complexType requires a name"));
                    }
                    schema.complex_types.push(ct);
                }
                "group" => schema.groups.push(self.group_def(child)?),
                "attributeGroup" => schema.attribute_groups.push(self.attribute_group_def(child)?),
                "notation" => {}
                other => {
                    log::debug!("skipping unhandled top-level xs:{other}");
                }
            }
        }
        Ok(schema)
    }

    fn element(&self, node: Node) -> Result<ElementDecl, SyntaxError> {
        let name = node.attribute("name").map(str::to_string);
        let reference = node
            .attribute("ref")
            .map(|v| self.qname(node, v))
            .transpose()?;
        if name.is_none() && reference.is_none() {
            return Err(self.err(node, "xs:element requires name or ref"));
        }
        let type_name = node
            .attribute("type")
            .map(|v| self.qname(node, v))
            .transpose()?;

        let mut inline_type = None;
        for child in node.children().filter(|c| c.is_element()) {
            if self.is_xsd(child, "simpleType") {
                inline_type = Some(InlineType::Simple(self.simple_type(child)?));
            } else if self.is_xsd(child, "complexType") {
                inline_type = Some(InlineType::Complex(Box::new(self.complex_type(child)?)));
            }
        }

        Ok(ElementDecl {
            span: self.span(node),
            line: self.line(node),
            name,
            reference,
            type_name,
            inline_type,
            occurrence: self.occurrence(node)?,
            nillable: self.bool_attr(node, "nillable"),
            is_abstract: self.bool_attr(node, "abstract"),
            default: node.attribute("default").map(str::to_string),
            fixed: node.attribute("fixed").map(str::to_string),
            substitution_group: node
                .attribute("substitutionGroup")
                .map(|v| self.qname(node, v))
                .transpose()?,
            annotation: self.annotation(node),
        })
    }

    fn attribute(&self, node: Node) -> Result<AttributeDecl, SyntaxError> {
        let name = node.attribute("name").map(str::to_string);
        let reference = node
            .attribute("ref")
            .map(|v| self.qname(node, v))
            .transpose()?;
        if name.is_none() && reference.is_none() {
            return Err(self.err(node, "xs:attribute requires name or ref"));
        }
        let mut inline_type = None;
        for child in node.children().filter(|c| self.is_xsd(*c, "simpleType")) {
            inline_type = Some(self.simple_type(child)?);
        }
        let use_ = match node.attribute("use") {
            None => AttributeUse::Optional,
            Some(v) => AttributeUse::from_str(v)
                .ok_or_else(|| self.err(node, format!("invalid attribute use {v:?}")))?,
        };
        Ok(AttributeDecl {
            span: self.span(node),
            name,
            reference,
            type_name: node
                .attribute("type")
                .map(|v| self.qname(node, v))
                .transpose()?,
            inline_type,
            use_,
            default: node.attribute("default").map(str::to_string),
            fixed: node.attribute("fixed").map(str::to_string),
            annotation: self.annotation(node),
        })
    }

    fn simple_type(&self, node: Node) -> Result<SimpleTypeDef, SyntaxError> {
        let mut variety = None;
        for child in node.children().filter(|c| c.is_element()) {
            if self.is_xsd(child, "restriction") {
                let base = child
                    .attribute("base")
                    .map(|v| self.qname(child, v))
                    .transpose()?;
                let mut base_inline = None;
                let mut facets = Vec::new();
                for f in child.children().filter(|c| c.is_element()) {
                    if self.is_xsd(f, "simpleType") {
                        base_inline = Some(Box::new(self.simple_type(f)?));
                        continue;
                    }
                    if self.is_xsd(f, "annotation") {
                        continue;
                    }
                    let Some(kind) = FacetKind::from_element_name(f.tag_name().name()) else {
                        continue;
                    };
                    let value_attr = if kind == FacetKind::Assertion { "test" } else { "value" };
                    let value = f.attribute(value_attr).ok_or_else(|| {
                        self.err(f, format!("facet xs:{} without {value_attr}", f.tag_name().name()))
                    })?;
                    facets.push(FacetDecl {
                        span: self.span(f),
                        kind,
                        value: value.to_string(),
                    });
                }
                if base.is_none() && base_inline.is_none() {
                    return Err(self.err(child, "xs:restriction requires base or nested simpleType"));
                }
                variety = Some(SimpleVariety::Restriction {
                    base,
                    base_inline,
                    facets,
                });
            } else if self.is_xsd(child, "list") {
                let mut item_inline = None;
                for st in child.children().filter(|c| self.is_xsd(*c, "simpleType")) {
                    item_inline = Some(Box::new(self.simple_type(st)?));
                }
                variety = Some(SimpleVariety::List {
                    item_type: child
                        .attribute("itemType")
                        .map(|v| self.qname(child, v))
                        .transpose()?,
                    item_inline,
                });
            } else if self.is_xsd(child, "union") {
                let mut member_types = Vec::new();
                if let Some(list) = child.attribute("memberTypes") {
                    for m in list.split_whitespace() {
                        member_types.push(self.qname(child, m)?);
                    }
                }
                let mut member_inline = Vec::new();
                for st in child.children().filter(|c| self.is_xsd(*c, "simpleType")) {
                    member_inline.push(self.simple_type(st)?);
                }
                variety = Some(SimpleVariety::Union {
                    member_types,
                    member_inline,
                });
            }
        }
        let variety = variety
            .ok_or_else(|| self.err(node, "xs:simpleType requires restriction, list or union"))?;
        Ok(SimpleTypeDef {
            span: self.span(node),
            name: node.attribute("name").map(str::to_string),
            annotation: self.annotation(node),
            variety,
        })
    }

    fn complex_type(&self, node: Node) -> Result<ComplexTypeDef, SyntaxError> {
        let mut content = ComplexContent::Empty;
        let mut attributes = Vec::new();
        let mut attribute_groups = Vec::new();
        let mut asserts = Vec::new();

        for child in node.children().filter(|c| c.is_element()) {
            if child.tag_name().namespace() != Some(XSD_NAMESPACE) {
                continue;
            }
            match child.tag_name().name() {
                "annotation" => {}
                "sequence" | "choice" | "all" => {
                    content = ComplexContent::Model(self.model_group(child)?);
                }
                "group" => {
                    // A group reference in content position wraps the model.
                    let reference = child
                        .attribute("ref")
                        .ok_or_else(|| self.err(child, "content-position xs:group requires ref"))?;
                    content = ComplexContent::Model(ModelGroup {
                        span: self.span(child),
                        kind: GroupKind::Sequence,
                        occurrence: Occurrence::default(),
                        particles: vec![ParticleDecl::GroupRef {
                            span: self.span(child),
                            reference: self.qname(child, reference)?,
                            occurrence: self.occurrence(child)?,
                        }],
                    });
                }
                "simpleContent" => {
                    let (base, facets, mut attrs, mut groups) = self.content_derivation(child)?;
                    attributes.append(&mut attrs);
                    attribute_groups.append(&mut groups);
                    content = ComplexContent::SimpleContent { base, facets };
                }
                "complexContent" => {
                    let derivation = child
                        .children()
                        .filter(|c| c.is_element())
                        .find(|c| self.is_xsd(*c, "extension") || self.is_xsd(*c, "restriction"))
                        .ok_or_else(|| {
                            self.err(child, "xs:complexContent requires extension or restriction")
                        })?;
                    let method = if self.is_xsd(derivation, "extension") {
                        DerivationMethod::Extension
                    } else {
                        DerivationMethod::Restriction
                    };
                    let base = derivation
                        .attribute("base")
                        .ok_or_else(|| self.err(derivation, "derivation requires base"))?;
                    let mut model = None;
                    for c in derivation.children().filter(|c| c.is_element()) {
                        match c.tag_name().name() {
                            "sequence" | "choice" | "all" => model = Some(self.model_group(c)?),
                            "attribute" => attributes.push(self.attribute(c)?),
                            "attributeGroup" => {
                                if let Some(r) = c.attribute("ref") {
                                    attribute_groups.push(self.qname(c, r)?);
                                }
                            }
                            "assert" => asserts.push(self.assert_decl(c)?),
                            _ => {}
                        }
                    }
                    content = ComplexContent::Derived {
                        base: self.qname(derivation, base)?,
                        method,
                        model,
                    };
                }
                "attribute" => attributes.push(self.attribute(child)?),
                "attributeGroup" => {
                    let reference = child
                        .attribute("ref")
                        .ok_or_else(|| self.err(child, "xs:attributeGroup use requires ref"))?;
                    attribute_groups.push(self.qname(child, reference)?);
                }
                "anyAttribute" => {}
                "assert" => asserts.push(self.assert_decl(child)?),
                other => {
                    log::debug!("skipping unhandled xs:{other} inside complexType");
                }
            }
        }

        Ok(ComplexTypeDef {
            span: self.span(node),
            name: node.attribute("name").map(str::to_string),
            annotation: self.annotation(node),
            is_abstract: self.bool_attr(node, "abstract"),
            mixed: self.bool_attr(node, "mixed"),
            content,
            attributes,
            attribute_groups,
            asserts,
        })
    }

    /// Shared walk for `xs:simpleContent` extension/restriction bodies.
    #[allow(clippy::type_complexity)]
    fn content_derivation(
        &self,
        node: Node,
    ) -> Result<(QName, Vec<FacetDecl>, Vec<AttributeDecl>, Vec<QName>), SyntaxError> {
        let derivation = node
            .children()
            .filter(|c| c.is_element())
            .find(|c| self.is_xsd(*c, "extension") || self.is_xsd(*c, "restriction"))
            .ok_or_else(|| self.err(node, "xs:simpleContent requires extension or restriction"))?;
        let base = derivation
            .attribute("base")
            .ok_or_else(|| self.err(derivation, "derivation requires base"))?;
        let base = self.qname(derivation, base)?;
        let mut facets = Vec::new();
        let mut attributes = Vec::new();
        let mut groups = Vec::new();
        for c in derivation.children().filter(|c| c.is_element()) {
            match c.tag_name().name() {
                "attribute" => attributes.push(self.attribute(c)?),
                "attributeGroup" => {
                    if let Some(r) = c.attribute("ref") {
                        groups.push(self.qname(c, r)?);
                    }
                }
                name => {
                    if let Some(kind) = FacetKind::from_element_name(name) {
                        let value_attr =
                            if kind == FacetKind::Assertion { "test" } else { "value" };
                        if let Some(value) = c.attribute(value_attr) {
                            facets.push(FacetDecl {
                                span: self.span(c),
                                kind,
                                value: value.to_string(),
                            });
                        }
                    }
                }
            }
        }
        Ok((base, facets, attributes, groups))
    }

    fn group_def(&self, node: Node) -> Result<GroupDef, SyntaxError> {
        let name = node
            .attribute("name")
            .ok_or_else(|| self.err(node, "global xs:group requires a name"))?;
        let model = node
            .children()
            .find(|c| {
                self.is_xsd(*c, "sequence") || self.is_xsd(*c, "choice") || self.is_xsd(*c, "all")
            })
            .ok_or_else(|| self.err(node, "xs:group requires a sequence, choice or all"))?;
        Ok(GroupDef {
            span: self.span(node),
            name: name.to_string(),
            annotation: self.annotation(node),
            model: self.model_group(model)?,
        })
    }

    fn attribute_group_def(&self, node: Node) -> Result<AttributeGroupDef, SyntaxError> {
        let name = node
            .attribute("name")
            .ok_or_else(|| self.err(node, "global xs:attributeGroup requires a name"))?;
        let mut attributes = Vec::new();
        let mut attribute_groups = Vec::new();
        for child in node.children().filter(|c| c.is_element()) {
            if self.is_xsd(child, "attribute") {
                attributes.push(self.attribute(child)?);
            } else if self.is_xsd(child, "attributeGroup") {
                if let Some(reference) = child.attribute("ref") {
                    attribute_groups.push(self.qname(child, reference)?);
                }
            }
        }
        Ok(AttributeGroupDef {
            span: self.span(node),
            name: name.to_string(),
            annotation: self.annotation(node),
            attributes,
            attribute_groups,
        })
    }

    fn assert_decl(&self, node: Node) -> Result<AssertDecl, SyntaxError> {
        let test = node
            .attribute("test")
            .ok_or_else(|| self.err(node, "xs:assert requires a test expression"))?;
        Ok(AssertDecl {
            span: self.span(node),
            test: test.to_string(),
            default_namespace: node.attribute("xpathDefaultNamespace").map(str::to_string),
            annotation: self.annotation(node),
        })
    }

    fn model_group(&self, node: Node) -> Result<ModelGroup, SyntaxError> {
        let kind = match node.tag_name().name() {
            "sequence" => GroupKind::Sequence,
            "choice" => GroupKind::Choice,
            "all" => GroupKind::All,
            other => return Err(self.err(node, format!("unexpected model group xs:{other}"))),
        };
        let mut particles = Vec::new();
        for child in node.children().filter(|c| c.is_element()) {
            if child.tag_name().namespace() != Some(XSD_NAMESPACE) {
                continue;
            }
            match child.tag_name().name() {
                "annotation" => {}
                "element" => particles.push(ParticleDecl::Element(self.element(child)?)),
                "sequence" | "choice" | "all" => {
                    particles.push(ParticleDecl::Group(self.model_group(child)?))
                }
                "group" => {
                    let reference = child
                        .attribute("ref")
                        .ok_or_else(|| self.err(child, "nested xs:group requires ref"))?;
                    particles.push(ParticleDecl::GroupRef {
                        span: self.span(child),
                        reference: self.qname(child, reference)?,
                        occurrence: self.occurrence(child)?,
                    });
                }
                "any" => particles.push(ParticleDecl::Any(AnyDecl {
                    span: self.span(child),
                    occurrence: self.occurrence(child)?,
                    process_contents: match child.attribute("processContents") {
                        Some("lax") => ProcessContents::Lax,
                        Some("skip") => ProcessContents::Skip,
                        _ => ProcessContents::Strict,
                    },
                })),
                other => {
                    log::debug!("skipping unhandled xs:{other} inside model group");
                }
            }
        }
        Ok(ModelGroup {
            span: self.span(node),
            kind,
            occurrence: self.occurrence(node)?,
            particles,
        })
    }
}

fn form_default(value: Option<&str>) -> FormDefault {
    match value {
        Some("qualified") => FormDefault::Qualified,
        _ => FormDefault::Unqualified,
    }
}

/// Concatenated text content of an element, markup stripped.
fn collect_text(node: Node) -> String {
    let mut out = String::new();
    for d in node.descendants() {
        if let Some(t) = d.text() {
            if d.is_text() {
                out.push_str(t);
            }
        }
    }
    out.trim().to_string()
}
