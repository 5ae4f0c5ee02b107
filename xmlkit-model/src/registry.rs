//! The compiled type registry.
//!
//! First pass of the graph build (spec'd ordering): every global
//! `simpleType`, `complexType`, `group`, `attributeGroup`, `element` and
//! `attribute` across the include/import closure is registered here,
//! compiled down to [`TypeDefinition`]s. Group and attribute-group
//! references are flattened during compilation; element references stay
//! symbolic (`Term::Ref`) and resolve during graph expansion, which is
//! what lets recursive element structures compile without fixpoints.

use crate::datatype::{Builtin, Facets, SimpleType, Variety};
use crate::ModelError;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use xmlkit_syntax::loader::SchemaDocument;
use xmlkit_syntax::types::{
    Annotation, AttributeDecl, AttributeGroupDef, AttributeUse, ComplexContent, ComplexTypeDef,
    DerivationMethod, ElementDecl, FormDefault, GroupDef, GroupKind, InlineType, MaxOccurs,
    ModelGroup, ParticleDecl, ProcessContents, QName, SimpleTypeDef, SimpleVariety,
};

#[derive(Clone, Debug)]
pub enum TypeDefinition {
    Simple(Rc<SimpleType>),
    Complex(ComplexType),
}

impl TypeDefinition {
    pub fn name(&self) -> Option<&QName> {
        match self {
            TypeDefinition::Simple(s) => s.name.as_ref(),
            TypeDefinition::Complex(c) => c.name.as_ref(),
        }
    }

    pub fn as_simple(&self) -> Option<&Rc<SimpleType>> {
        match self {
            TypeDefinition::Simple(s) => Some(s),
            TypeDefinition::Complex(c) => c.simple_content.as_ref(),
        }
    }
}

/// Reference from a use site to a type: either by QName (resolved against
/// the registry on demand) or a directly-declared anonymous type.
#[derive(Clone, Debug)]
pub enum TypeRef {
    Named(QName),
    Inline(Rc<TypeDefinition>),
}

#[derive(Clone, Debug)]
pub struct ComplexType {
    pub name: Option<QName>,
    pub is_abstract: bool,
    pub mixed: bool,
    pub content: ContentModel,
    pub attributes: Vec<AttributeSpec>,
    /// XSD 1.1 assertion test expressions on this type.
    pub assertions: Vec<String>,
    /// Present for `xs:simpleContent`: text content validated as this
    /// simple type.
    pub simple_content: Option<Rc<SimpleType>>,
    pub annotation: Annotation,
}

#[derive(Clone, Debug)]
pub enum ContentModel {
    Empty,
    Sequence(Vec<Particle>),
    Choice(Vec<Particle>),
    All(Vec<Particle>),
}

impl ContentModel {
    pub fn particles(&self) -> &[Particle] {
        match self {
            ContentModel::Empty => &[],
            ContentModel::Sequence(p) | ContentModel::Choice(p) | ContentModel::All(p) => p,
        }
    }

    pub fn kind(&self) -> Option<GroupKind> {
        match self {
            ContentModel::Empty => None,
            ContentModel::Sequence(_) => Some(GroupKind::Sequence),
            ContentModel::Choice(_) => Some(GroupKind::Choice),
            ContentModel::All(_) => Some(GroupKind::All),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Particle {
    pub min: u32,
    pub max: MaxOccurs,
    pub term: Term,
}

#[derive(Clone, Debug)]
pub enum Term {
    Element(Rc<ElementSpec>),
    /// Reference to a global element declaration, resolved at expansion.
    Ref(QName),
    /// A nested model group.
    Model(GroupKind, Vec<Particle>),
    /// `xs:any` wildcard.
    Any(ProcessContents),
}

#[derive(Clone, Debug)]
pub struct ElementSpec {
    pub name: QName,
    pub type_ref: TypeRef,
    pub nillable: bool,
    pub is_abstract: bool,
    pub default: Option<String>,
    pub fixed: Option<String>,
    pub substitution_group: Option<QName>,
    pub annotation: Annotation,
    /// 1-based line of the declaration in its source file.
    pub line: u32,
}

#[derive(Clone, Debug)]
pub struct AttributeSpec {
    pub name: QName,
    pub simple_type: Rc<SimpleType>,
    pub use_: AttributeUse,
    pub default: Option<String>,
    pub fixed: Option<String>,
    pub annotation: Annotation,
}

/// Compiled global declarations for one loaded schema set. Constructed
/// once per load and read-only afterwards.
#[derive(Debug)]
pub struct TypeRegistry {
    types: HashMap<QName, Rc<TypeDefinition>>,
    elements: HashMap<QName, Rc<ElementSpec>>,
    attributes: HashMap<QName, Rc<AttributeSpec>>,
    /// Substitution-group head to member element names.
    substitutions: HashMap<QName, Vec<QName>>,
    pub target_namespace: Option<String>,
    /// URI of the root schema document, used for `xsi:schemaLocation`.
    pub source_uri: String,
    pub version: u64,
    pub element_form_qualified: bool,
}

const BUILTINS: &[(&str, Builtin)] = &[
    ("anySimpleType", Builtin::AnySimpleType),
    ("anyType", Builtin::AnySimpleType),
    ("string", Builtin::String),
    ("normalizedString", Builtin::NormalizedString),
    ("token", Builtin::Token),
    ("language", Builtin::Language),
    ("Name", Builtin::Name),
    ("NCName", Builtin::NcName),
    ("NMTOKEN", Builtin::NmToken),
    ("NMTOKENS", Builtin::NmTokens),
    ("ID", Builtin::Id),
    ("IDREF", Builtin::IdRef),
    ("ENTITY", Builtin::Entity),
    ("QName", Builtin::QName),
    ("anyURI", Builtin::AnyUri),
    ("boolean", Builtin::Boolean),
    ("decimal", Builtin::Decimal),
    ("integer", Builtin::Integer),
    ("nonPositiveInteger", Builtin::NonPositiveInteger),
    ("negativeInteger", Builtin::NegativeInteger),
    ("long", Builtin::Long),
    ("int", Builtin::Int),
    ("short", Builtin::Short),
    ("byte", Builtin::Byte),
    ("nonNegativeInteger", Builtin::NonNegativeInteger),
    ("unsignedLong", Builtin::UnsignedLong),
    ("unsignedInt", Builtin::UnsignedInt),
    ("unsignedShort", Builtin::UnsignedShort),
    ("unsignedByte", Builtin::UnsignedByte),
    ("positiveInteger", Builtin::PositiveInteger),
    ("float", Builtin::Float),
    ("double", Builtin::Double),
    ("duration", Builtin::Duration),
    ("dateTime", Builtin::DateTime),
    ("time", Builtin::Time),
    ("date", Builtin::Date),
    ("gYearMonth", Builtin::GYearMonth),
    ("gYear", Builtin::GYear),
    ("gMonthDay", Builtin::GMonthDay),
    ("gDay", Builtin::GDay),
    ("gMonth", Builtin::GMonth),
    ("hexBinary", Builtin::HexBinary),
    ("base64Binary", Builtin::Base64Binary),
];

impl TypeRegistry {
    /// Compile every global declaration reachable from `doc`.
    pub fn from_document(doc: &SchemaDocument) -> Result<TypeRegistry, ModelError> {
        let mut registry = TypeRegistry {
            types: HashMap::new(),
            elements: HashMap::new(),
            attributes: HashMap::new(),
            substitutions: HashMap::new(),
            target_namespace: doc.target_namespace.clone(),
            source_uri: doc.uri.to_string(),
            version: doc.version,
            element_form_qualified: doc.schema.element_form_default == FormDefault::Qualified,
        };
        for (name, builtin) in BUILTINS {
            registry.types.insert(
                QName::xsd(*name),
                Rc::new(TypeDefinition::Simple(Rc::new(SimpleType::builtin(
                    *builtin, name,
                )))),
            );
        }
        Compiler::new(doc)?.run(&mut registry)?;
        Ok(registry)
    }

    pub fn resolve(&self, name: &QName) -> Option<Rc<TypeDefinition>> {
        self.types.get(name).cloned()
    }

    pub fn resolve_ref(&self, type_ref: &TypeRef) -> Result<Rc<TypeDefinition>, ModelError> {
        match type_ref {
            TypeRef::Inline(def) => Ok(def.clone()),
            TypeRef::Named(name) => self
                .resolve(name)
                .ok_or_else(|| ModelError::UnresolvedType { name: name.clone() }),
        }
    }

    pub fn global_element(&self, name: &QName) -> Option<Rc<ElementSpec>> {
        self.elements.get(name).cloned()
    }

    /// Global element lookup by local name only, for caller-specified
    /// roots given without a namespace.
    pub fn global_element_by_local(&self, local: &str) -> Option<Rc<ElementSpec>> {
        self.elements.values().find(|e| e.name.local == local).cloned()
    }

    pub fn global_elements(&self) -> impl Iterator<Item = &Rc<ElementSpec>> {
        self.elements.values()
    }

    pub fn global_attribute(&self, name: &QName) -> Option<Rc<AttributeSpec>> {
        self.attributes.get(name).cloned()
    }

    /// Elements declaring `substitutionGroup` pointing at `head`.
    pub fn substitution_members(&self, head: &QName) -> &[QName] {
        self.substitutions.get(head).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn type_names(&self) -> impl Iterator<Item = &QName> {
        self.types.keys().filter(|n| !n.is_xsd())
    }
}

/// One compilation over the raw syntax of the whole schema set.
struct Compiler<'a> {
    simple_syntax: HashMap<QName, &'a SimpleTypeDef>,
    complex_syntax: HashMap<QName, &'a ComplexTypeDef>,
    group_syntax: HashMap<QName, &'a GroupDef>,
    attr_group_syntax: HashMap<QName, &'a AttributeGroupDef>,
    element_syntax: HashMap<QName, (&'a ElementDecl, Option<String>, bool)>,
    attribute_syntax: HashMap<QName, &'a AttributeDecl>,
    /// Named types currently being compiled, for derivation cycles.
    in_progress: HashSet<QName>,
    /// Group refs on the current flattening path, for group recursion.
    group_stack: Vec<QName>,
}

impl<'a> Compiler<'a> {
    fn new(doc: &'a SchemaDocument) -> Result<Compiler<'a>, ModelError> {
        let mut compiler = Compiler {
            simple_syntax: HashMap::new(),
            complex_syntax: HashMap::new(),
            group_syntax: HashMap::new(),
            attr_group_syntax: HashMap::new(),
            element_syntax: HashMap::new(),
            attribute_syntax: HashMap::new(),
            in_progress: HashSet::new(),
            group_stack: Vec::new(),
        };
        compiler.collect(doc, doc.target_namespace.clone());
        Ok(compiler)
    }

    /// Gather raw global declarations depth-first. A sub-schema without a
    /// target namespace (chameleon include) inherits the including
    /// document's namespace.
    fn collect(&mut self, doc: &'a SchemaDocument, inherited_tns: Option<String>) {
        let tns = doc.target_namespace.clone().or(inherited_tns);
        let qn = |name: &str| QName::new(tns.clone(), name);
        let qualified = doc.schema.element_form_default == FormDefault::Qualified;
        for st in &doc.schema.simple_types {
            if let Some(name) = &st.name {
                self.simple_syntax.entry(qn(name)).or_insert(st);
            }
        }
        for ct in &doc.schema.complex_types {
            if let Some(name) = &ct.name {
                self.complex_syntax.entry(qn(name)).or_insert(ct);
            }
        }
        for g in &doc.schema.groups {
            self.group_syntax.entry(qn(&g.name)).or_insert(g);
        }
        for ag in &doc.schema.attribute_groups {
            self.attr_group_syntax.entry(qn(&ag.name)).or_insert(ag);
        }
        for el in &doc.schema.elements {
            if let Some(name) = &el.name {
                self.element_syntax
                    .entry(qn(name))
                    .or_insert((el, tns.clone(), qualified));
            }
        }
        for at in &doc.schema.attributes {
            if let Some(name) = &at.name {
                self.attribute_syntax.entry(qn(name)).or_insert(at);
            }
        }
        for sub in &doc.sub_documents {
            self.collect(sub, tns.clone());
        }
    }

    fn run(&mut self, registry: &mut TypeRegistry) -> Result<(), ModelError> {
        let simple_names: Vec<QName> = self.simple_syntax.keys().cloned().collect();
        for name in simple_names {
            self.named_simple(registry, &name)?;
        }
        let complex_names: Vec<QName> = self.complex_syntax.keys().cloned().collect();
        for name in complex_names {
            self.named_complex(registry, &name)?;
        }
        let attr_names: Vec<QName> = self.attribute_syntax.keys().cloned().collect();
        for name in attr_names {
            self.named_attribute(registry, &name)?;
        }
        let element_names: Vec<QName> = self.element_syntax.keys().cloned().collect();
        for name in element_names {
            let (decl, tns) = {
                let (decl, tns, _) = self.element_syntax.get(&name).expect("collected");
                (*decl, tns.clone())
            };
            let spec = self.element_spec(registry, decl, tns, true, true)?;
            if let Some(head) = &spec.substitution_group {
                registry
                    .substitutions
                    .entry(head.clone())
                    .or_default()
                    .push(spec.name.clone());
            }
            registry.elements.insert(name, Rc::new(spec));
        }
        Ok(())
    }

    fn named_simple(
        &mut self,
        registry: &mut TypeRegistry,
        name: &QName,
    ) -> Result<Rc<SimpleType>, ModelError> {
        if let Some(existing) = registry.types.get(name) {
            return match existing.as_ref() {
                TypeDefinition::Simple(s) => Ok(s.clone()),
                TypeDefinition::Complex(_) => Err(ModelError::InvalidDerivation {
                    name: name.clone(),
                    detail: "expected a simple type".into(),
                }),
            };
        }
        let def = *self
            .simple_syntax
            .get(name)
            .ok_or_else(|| ModelError::UnresolvedType { name: name.clone() })?;
        if !self.in_progress.insert(name.clone()) {
            return Err(ModelError::CircularDerivation { name: name.clone() });
        }
        let compiled = self.simple_type(registry, def, Some(name.clone()));
        self.in_progress.remove(name);
        let compiled = Rc::new(compiled?);
        registry.types.insert(
            name.clone(),
            Rc::new(TypeDefinition::Simple(compiled.clone())),
        );
        Ok(compiled)
    }

    fn simple_type(
        &mut self,
        registry: &mut TypeRegistry,
        def: &'a SimpleTypeDef,
        name: Option<QName>,
    ) -> Result<SimpleType, ModelError> {
        match &def.variety {
            SimpleVariety::Restriction {
                base,
                base_inline,
                facets,
            } => {
                let base_type = match (base, base_inline) {
                    (Some(base_name), _) => self.simple_ref(registry, base_name)?,
                    (None, Some(inline)) => Rc::new(self.simple_type(registry, inline, None)?),
                    (None, None) => unreachable!("parser guarantees base or nested simpleType"),
                };
                let mut merged = base_type.facets.clone();
                for facet in facets {
                    merged
                        .apply(facet.kind, &facet.value)
                        .map_err(|source| ModelError::Facet {
                            type_name: name
                                .clone()
                                .map(|n| n.to_string())
                                .unwrap_or_else(|| "anonymous".into()),
                            source,
                        })?;
                }
                Ok(SimpleType {
                    name,
                    base: base
                        .clone()
                        .or_else(|| base_type.name.clone())
                        .unwrap_or_else(|| QName::xsd("anySimpleType")),
                    builtin: base_type.builtin,
                    variety: base_type.variety.clone(),
                    facets: merged,
                })
            }
            SimpleVariety::List {
                item_type,
                item_inline,
            } => {
                let item = match (item_type, item_inline) {
                    (Some(item_name), _) => self.simple_ref(registry, item_name)?,
                    (None, Some(inline)) => Rc::new(self.simple_type(registry, inline, None)?),
                    (None, None) => {
                        return Err(ModelError::InvalidDerivation {
                            name: name.unwrap_or_else(|| QName::new(None, "anonymous")),
                            detail: "xs:list requires itemType or nested simpleType".into(),
                        });
                    }
                };
                Ok(SimpleType {
                    name,
                    base: QName::xsd("anySimpleType"),
                    builtin: Builtin::AnySimpleType,
                    variety: Variety::List { item },
                    facets: Facets::default(),
                })
            }
            SimpleVariety::Union {
                member_types,
                member_inline,
            } => {
                let mut members = Vec::new();
                for m in member_types {
                    members.push(self.simple_ref(registry, m)?);
                }
                for inline in member_inline {
                    members.push(Rc::new(self.simple_type(registry, inline, None)?));
                }
                if members.is_empty() {
                    return Err(ModelError::InvalidDerivation {
                        name: name.unwrap_or_else(|| QName::new(None, "anonymous")),
                        detail: "xs:union requires at least one member type".into(),
                    });
                }
                Ok(SimpleType {
                    name,
                    base: QName::xsd("anySimpleType"),
                    builtin: Builtin::AnySimpleType,
                    variety: Variety::Union { members },
                    facets: Facets::default(),
                })
            }
        }
    }

    /// Resolve a simple-type reference: built-in or named declaration.
    fn simple_ref(
        &mut self,
        registry: &mut TypeRegistry,
        name: &QName,
    ) -> Result<Rc<SimpleType>, ModelError> {
        if let Some(existing) = registry.types.get(name) {
            if let TypeDefinition::Simple(s) = existing.as_ref() {
                return Ok(s.clone());
            }
            // A complex type with simple content can serve as a simple base.
            if let TypeDefinition::Complex(c) = existing.as_ref() {
                if let Some(sc) = &c.simple_content {
                    return Ok(sc.clone());
                }
            }
            return Err(ModelError::InvalidDerivation {
                name: name.clone(),
                detail: "complex type used where a simple type is required".into(),
            });
        }
        if self.simple_syntax.contains_key(name) {
            return self.named_simple(registry, name);
        }
        if self.complex_syntax.contains_key(name) {
            let compiled = self.named_complex(registry, name)?;
            if let Some(sc) = &compiled.simple_content {
                return Ok(sc.clone());
            }
            return Err(ModelError::InvalidDerivation {
                name: name.clone(),
                detail: "complex type used where a simple type is required".into(),
            });
        }
        Err(ModelError::UnresolvedType { name: name.clone() })
    }

    fn named_complex(
        &mut self,
        registry: &mut TypeRegistry,
        name: &QName,
    ) -> Result<ComplexType, ModelError> {
        if let Some(existing) = registry.types.get(name) {
            return match existing.as_ref() {
                TypeDefinition::Complex(c) => Ok(c.clone()),
                TypeDefinition::Simple(_) => Err(ModelError::InvalidDerivation {
                    name: name.clone(),
                    detail: "expected a complex type".into(),
                }),
            };
        }
        let def = *self
            .complex_syntax
            .get(name)
            .ok_or_else(|| ModelError::UnresolvedType { name: name.clone() })?;
        if !self.in_progress.insert(name.clone()) {
            return Err(ModelError::CircularDerivation { name: name.clone() });
        }
        let compiled = self.complex_type(registry, def, Some(name.clone()));
        self.in_progress.remove(name);
        let compiled = compiled?;
        registry.types.insert(
            name.clone(),
            Rc::new(TypeDefinition::Complex(compiled.clone())),
        );
        Ok(compiled)
    }

    fn complex_type(
        &mut self,
        registry: &mut TypeRegistry,
        def: &'a ComplexTypeDef,
        name: Option<QName>,
    ) -> Result<ComplexType, ModelError> {
        let mut attributes = Vec::new();
        for attr in &def.attributes {
            if let Some(spec) = self.attribute_spec(registry, attr)? {
                attributes.push(spec);
            }
        }
        let mut seen_groups = HashSet::new();
        for group in &def.attribute_groups {
            self.flatten_attribute_group(registry, group, &mut attributes, &mut seen_groups)?;
        }

        let mut simple_content = None;
        let content = match &def.content {
            ComplexContent::Empty => ContentModel::Empty,
            ComplexContent::Model(group) => self.content_model(registry, group)?,
            ComplexContent::SimpleContent { base, facets } => {
                let base_type = self.simple_ref(registry, base)?;
                let mut merged = base_type.facets.clone();
                for facet in facets {
                    merged
                        .apply(facet.kind, &facet.value)
                        .map_err(|source| ModelError::Facet {
                            type_name: name
                                .clone()
                                .map(|n| n.to_string())
                                .unwrap_or_else(|| "anonymous".into()),
                            source,
                        })?;
                }
                simple_content = Some(Rc::new(SimpleType {
                    name: None,
                    base: base.clone(),
                    builtin: base_type.builtin,
                    variety: base_type.variety.clone(),
                    facets: merged,
                }));
                ContentModel::Empty
            }
            ComplexContent::Derived {
                base,
                method,
                model,
            } => {
                // The ur-type is a valid (empty) complex base.
                let base_type = if base.is_xsd() && base.local == "anyType" {
                    ComplexType {
                        name: None,
                        is_abstract: false,
                        mixed: false,
                        content: ContentModel::Empty,
                        attributes: Vec::new(),
                        assertions: Vec::new(),
                        simple_content: None,
                        annotation: Annotation::default(),
                    }
                } else {
                    self.named_complex(registry, base)?
                };
                // Base attributes first; own declarations override by name.
                let mut combined = base_type.attributes.clone();
                for own in attributes.drain(..) {
                    combined.retain(|a| a.name != own.name);
                    combined.push(own);
                }
                attributes = combined;
                let own_model = model
                    .as_ref()
                    .map(|m| self.content_model(registry, m))
                    .transpose()?;
                match method {
                    DerivationMethod::Restriction => own_model.unwrap_or(ContentModel::Empty),
                    DerivationMethod::Extension => match (base_type.content, own_model) {
                        (base_content, None) => base_content,
                        (ContentModel::Empty, Some(own)) => own,
                        (base_content, Some(own)) => {
                            // Extension appends the derived model after the
                            // base model, as a sequence of the two.
                            let base_kind = base_content.kind().unwrap_or(GroupKind::Sequence);
                            let own_kind = own.kind().unwrap_or(GroupKind::Sequence);
                            ContentModel::Sequence(vec![
                                Particle {
                                    min: 1,
                                    max: MaxOccurs::Bounded(1),
                                    term: Term::Model(base_kind, base_content.particles().to_vec()),
                                },
                                Particle {
                                    min: 1,
                                    max: MaxOccurs::Bounded(1),
                                    term: Term::Model(own_kind, own.particles().to_vec()),
                                },
                            ])
                        }
                    },
                }
            }
        };

        let mut assertions: Vec<String> = def.asserts.iter().map(|a| a.test.clone()).collect();
        // Assertion facets written on a simpleContent restriction belong to
        // the owning type.
        if let Some(sc) = &simple_content {
            assertions.extend(sc.facets.assertions.iter().cloned());
        }

        Ok(ComplexType {
            name,
            is_abstract: def.is_abstract,
            mixed: def.mixed,
            content,
            attributes,
            assertions,
            simple_content,
            annotation: def.annotation.clone(),
        })
    }

    fn content_model(
        &mut self,
        registry: &mut TypeRegistry,
        group: &'a ModelGroup,
    ) -> Result<ContentModel, ModelError> {
        let particles = self.particles(registry, group)?;
        Ok(match group.kind {
            GroupKind::Sequence => ContentModel::Sequence(particles),
            GroupKind::Choice => ContentModel::Choice(particles),
            GroupKind::All => ContentModel::All(particles),
        })
    }

    fn particles(
        &mut self,
        registry: &mut TypeRegistry,
        group: &'a ModelGroup,
    ) -> Result<Vec<Particle>, ModelError> {
        let mut out = Vec::new();
        for particle in &group.particles {
            match particle {
                ParticleDecl::Element(decl) => {
                    if let Some(reference) = &decl.reference {
                        out.push(Particle {
                            min: decl.occurrence.min,
                            max: decl.occurrence.max,
                            term: Term::Ref(reference.clone()),
                        });
                    } else {
                        let spec = self.element_spec(registry, decl, None, false, false)?;
                        out.push(Particle {
                            min: decl.occurrence.min,
                            max: decl.occurrence.max,
                            term: Term::Element(Rc::new(spec)),
                        });
                    }
                }
                ParticleDecl::Group(nested) => {
                    let inner = self.particles(registry, nested)?;
                    out.push(Particle {
                        min: nested.occurrence.min,
                        max: nested.occurrence.max,
                        term: Term::Model(nested.kind, inner),
                    });
                }
                ParticleDecl::GroupRef {
                    reference,
                    occurrence,
                    ..
                } => {
                    if self.group_stack.contains(reference) {
                        return Err(ModelError::CircularGroup {
                            name: reference.clone(),
                        });
                    }
                    let def = *self
                        .group_syntax
                        .get(reference)
                        .ok_or_else(|| ModelError::UnresolvedGroup {
                            name: reference.clone(),
                        })?;
                    self.group_stack.push(reference.clone());
                    let inner = self.particles(registry, &def.model);
                    self.group_stack.pop();
                    out.push(Particle {
                        min: occurrence.min,
                        max: occurrence.max,
                        term: Term::Model(def.model.kind, inner?),
                    });
                }
                ParticleDecl::Any(any) => out.push(Particle {
                    min: any.occurrence.min,
                    max: any.occurrence.max,
                    term: Term::Any(any.process_contents),
                }),
            }
        }
        Ok(out)
    }

    fn element_spec(
        &mut self,
        registry: &mut TypeRegistry,
        decl: &'a ElementDecl,
        tns: Option<String>,
        global: bool,
        qualified_form: bool,
    ) -> Result<ElementSpec, ModelError> {
        let local = decl
            .name
            .clone()
            .expect("element_spec called on a named declaration");
        // Global elements are always namespace-qualified; locals follow
        // elementFormDefault.
        let namespace = if global || qualified_form || registry.element_form_qualified {
            tns.or_else(|| registry.target_namespace.clone())
        } else {
            None
        };
        let type_ref = match (&decl.inline_type, &decl.type_name) {
            // Inline wins over a named type when both are present.
            (Some(InlineType::Simple(st)), _) => {
                let compiled = self.simple_type(registry, st, None)?;
                TypeRef::Inline(Rc::new(TypeDefinition::Simple(Rc::new(compiled))))
            }
            (Some(InlineType::Complex(ct)), _) => {
                let compiled = self.complex_type(registry, ct, None)?;
                TypeRef::Inline(Rc::new(TypeDefinition::Complex(compiled)))
            }
            (None, Some(named)) => TypeRef::Named(named.clone()),
            (None, None) => TypeRef::Named(QName::xsd("anyType")),
        };
        Ok(ElementSpec {
            name: QName::new(namespace, local),
            type_ref,
            nillable: decl.nillable,
            is_abstract: decl.is_abstract,
            default: decl.default.clone(),
            fixed: decl.fixed.clone(),
            substitution_group: decl.substitution_group.clone(),
            annotation: decl.annotation.clone(),
            line: decl.line,
        })
    }

    fn named_attribute(
        &mut self,
        registry: &mut TypeRegistry,
        name: &QName,
    ) -> Result<Rc<AttributeSpec>, ModelError> {
        if let Some(existing) = registry.attributes.get(name) {
            return Ok(existing.clone());
        }
        let decl = *self
            .attribute_syntax
            .get(name)
            .ok_or_else(|| ModelError::UnresolvedAttribute { name: name.clone() })?;
        let spec = self
            .attribute_spec(registry, decl)?
            .expect("global attributes cannot be prohibited");
        let spec = Rc::new(spec);
        registry.attributes.insert(name.clone(), spec.clone());
        Ok(spec)
    }

    /// Returns `None` for `use="prohibited"` declarations.
    fn attribute_spec(
        &mut self,
        registry: &mut TypeRegistry,
        decl: &'a AttributeDecl,
    ) -> Result<Option<AttributeSpec>, ModelError> {
        if decl.use_ == AttributeUse::Prohibited {
            return Ok(None);
        }
        if let Some(reference) = &decl.reference {
            let global = self.named_attribute(registry, reference)?;
            let mut spec = (*global).clone();
            spec.use_ = decl.use_;
            if decl.default.is_some() {
                spec.default = decl.default.clone();
            }
            if decl.fixed.is_some() {
                spec.fixed = decl.fixed.clone();
            }
            return Ok(Some(spec));
        }
        let local = decl
            .name
            .clone()
            .expect("attribute without name or ref rejected by parser");
        let simple_type = match (&decl.inline_type, &decl.type_name) {
            (Some(inline), _) => Rc::new(self.simple_type(registry, inline, None)?),
            (None, Some(named)) => self.simple_ref(registry, named)?,
            (None, None) => match registry
                .resolve(&QName::xsd("anySimpleType"))
                .expect("builtins pre-registered")
                .as_ref()
            {
                TypeDefinition::Simple(s) => s.clone(),
                TypeDefinition::Complex(_) => unreachable!(),
            },
        };
        Ok(Some(AttributeSpec {
            name: QName::new(None, local),
            simple_type,
            use_: decl.use_,
            default: decl.default.clone(),
            fixed: decl.fixed.clone(),
            annotation: decl.annotation.clone(),
        }))
    }

    fn flatten_attribute_group(
        &mut self,
        registry: &mut TypeRegistry,
        name: &QName,
        out: &mut Vec<AttributeSpec>,
        seen: &mut HashSet<QName>,
    ) -> Result<(), ModelError> {
        if !seen.insert(name.clone()) {
            return Ok(());
        }
        let def = *self
            .attr_group_syntax
            .get(name)
            .ok_or_else(|| ModelError::UnresolvedGroup { name: name.clone() })?;
        for attr in &def.attributes {
            if let Some(spec) = self.attribute_spec(registry, attr)? {
                out.push(spec);
            }
        }
        let nested: Vec<QName> = def.attribute_groups.clone();
        for sub in &nested {
            self.flatten_attribute_group(registry, sub, out, seen)?;
        }
        Ok(())
    }
}
