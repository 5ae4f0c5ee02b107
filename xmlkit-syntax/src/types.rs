//! Syntax-level representation of an XSD document.
//!
//! These types are a faithful record of what the schema text says, before
//! any reference resolution or type flattening. Global declarations keep
//! their QName references; inline (anonymous) types are nested in place.
//! Every node carries a `codemap::Span` into the source file so later
//! passes can report diagnostics against the original text.

use codemap::Span;
use std::fmt;

pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const VC_NAMESPACE: &str = "http://www.w3.org/2007/XMLSchema-versioning";

/// A namespace-qualified name as written in the schema, already resolved
/// against the prefixes in scope at the point of use.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct QName {
    pub namespace: Option<String>,
    pub local: String,
}

impl QName {
    pub fn new(namespace: Option<String>, local: impl Into<String>) -> QName {
        QName {
            namespace,
            local: local.into(),
        }
    }

    pub fn xsd(local: impl Into<String>) -> QName {
        QName {
            namespace: Some(XSD_NAMESPACE.to_string()),
            local: local.into(),
        }
    }

    pub fn is_xsd(&self) -> bool {
        self.namespace.as_deref() == Some(XSD_NAMESPACE)
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local),
            None => write!(f, "{}", self.local),
        }
    }
}

/// `maxOccurs` value. `Unbounded` is a distinct sentinel and is never
/// folded into a finite count.
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum MaxOccurs {
    Bounded(u32),
    Unbounded,
}

impl fmt::Display for MaxOccurs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxOccurs::Bounded(n) => write!(f, "{n}"),
            MaxOccurs::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// The minOccurs/maxOccurs pair carried by every particle.
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub struct Occurrence {
    pub min: u32,
    pub max: MaxOccurs,
}

impl Default for Occurrence {
    fn default() -> Self {
        Occurrence {
            min: 1,
            max: MaxOccurs::Bounded(1),
        }
    }
}

impl Occurrence {
    pub fn required() -> Occurrence {
        Occurrence::default()
    }

    pub fn optional() -> Occurrence {
        Occurrence {
            min: 0,
            max: MaxOccurs::Bounded(1),
        }
    }

    pub fn is_repeating(&self) -> bool {
        match self.max {
            MaxOccurs::Bounded(n) => n > 1,
            MaxOccurs::Unbounded => true,
        }
    }
}

/// One `xs:documentation` child of an `xs:annotation`.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Documentation {
    pub lang: Option<String>,
    pub text: String,
}

/// Folded annotation content for a declaration.
#[derive(PartialEq, Eq, Clone, Debug, Default)]
pub struct Annotation {
    pub documentation: Vec<Documentation>,
}

impl Annotation {
    pub fn is_empty(&self) -> bool {
        self.documentation.is_empty()
    }

    /// The primary documentation entry: the one without `xml:lang`,
    /// otherwise the first in document order.
    pub fn primary(&self) -> Option<&Documentation> {
        self.documentation
            .iter()
            .find(|d| d.lang.is_none())
            .or_else(|| self.documentation.first())
    }
}

#[derive(PartialEq, Eq, Copy, Clone, Debug, Default)]
pub enum FormDefault {
    #[default]
    Unqualified,
    Qualified,
}

/// An element declaration, global or local. Local declarations may be
/// references (`ref=`) to a global one.
#[derive(Clone, Debug)]
pub struct ElementDecl {
    pub span: Span,
    /// 1-based source line of the `<xs:element>` start tag, kept for
    /// editor round-trips.
    pub line: u32,
    pub name: Option<String>,
    pub reference: Option<QName>,
    pub type_name: Option<QName>,
    pub inline_type: Option<InlineType>,
    pub occurrence: Occurrence,
    pub nillable: bool,
    pub is_abstract: bool,
    pub default: Option<String>,
    pub fixed: Option<String>,
    pub substitution_group: Option<QName>,
    pub annotation: Annotation,
}

#[derive(Clone, Debug)]
pub enum InlineType {
    Simple(SimpleTypeDef),
    Complex(Box<ComplexTypeDef>),
}

#[derive(Clone, Debug)]
pub struct SimpleTypeDef {
    pub span: Span,
    pub name: Option<String>,
    pub annotation: Annotation,
    pub variety: SimpleVariety,
}

#[derive(Clone, Debug)]
pub enum SimpleVariety {
    Restriction {
        base: Option<QName>,
        base_inline: Option<Box<SimpleTypeDef>>,
        facets: Vec<FacetDecl>,
    },
    List {
        item_type: Option<QName>,
        item_inline: Option<Box<SimpleTypeDef>>,
    },
    Union {
        member_types: Vec<QName>,
        member_inline: Vec<SimpleTypeDef>,
    },
}

#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum FacetKind {
    Pattern,
    Enumeration,
    MinInclusive,
    MaxInclusive,
    MinExclusive,
    MaxExclusive,
    Length,
    MinLength,
    MaxLength,
    TotalDigits,
    FractionDigits,
    WhiteSpace,
    /// XSD 1.1 `xs:assertion` facet on a simple type.
    Assertion,
}

impl FacetKind {
    pub fn from_element_name(name: &str) -> Option<FacetKind> {
        Some(match name {
            "pattern" => FacetKind::Pattern,
            "enumeration" => FacetKind::Enumeration,
            "minInclusive" => FacetKind::MinInclusive,
            "maxInclusive" => FacetKind::MaxInclusive,
            "minExclusive" => FacetKind::MinExclusive,
            "maxExclusive" => FacetKind::MaxExclusive,
            "length" => FacetKind::Length,
            "minLength" => FacetKind::MinLength,
            "maxLength" => FacetKind::MaxLength,
            "totalDigits" => FacetKind::TotalDigits,
            "fractionDigits" => FacetKind::FractionDigits,
            "whiteSpace" => FacetKind::WhiteSpace,
            "assertion" => FacetKind::Assertion,
            _ => return None,
        })
    }

    pub fn element_name(&self) -> &'static str {
        match self {
            FacetKind::Pattern => "pattern",
            FacetKind::Enumeration => "enumeration",
            FacetKind::MinInclusive => "minInclusive",
            FacetKind::MaxInclusive => "maxInclusive",
            FacetKind::MinExclusive => "minExclusive",
            FacetKind::MaxExclusive => "maxExclusive",
            FacetKind::Length => "length",
            FacetKind::MinLength => "minLength",
            FacetKind::MaxLength => "maxLength",
            FacetKind::TotalDigits => "totalDigits",
            FacetKind::FractionDigits => "fractionDigits",
            FacetKind::WhiteSpace => "whiteSpace",
            FacetKind::Assertion => "assertion",
        }
    }
}

/// A single facet as written in the schema; `value` is the raw attribute
/// text (`value=` for most facets, `test=` for assertions).
#[derive(Clone, Debug)]
pub struct FacetDecl {
    pub span: Span,
    pub kind: FacetKind,
    pub value: String,
}

#[derive(Clone, Debug)]
pub struct ComplexTypeDef {
    pub span: Span,
    pub name: Option<String>,
    pub annotation: Annotation,
    pub is_abstract: bool,
    pub mixed: bool,
    pub content: ComplexContent,
    pub attributes: Vec<AttributeDecl>,
    pub attribute_groups: Vec<QName>,
    pub asserts: Vec<AssertDecl>,
}

#[derive(Clone, Debug)]
pub enum ComplexContent {
    Empty,
    /// A directly declared sequence/choice/all group.
    Model(ModelGroup),
    /// `xs:simpleContent` extension/restriction of a simple base.
    SimpleContent {
        base: QName,
        facets: Vec<FacetDecl>,
    },
    /// `xs:complexContent` extension/restriction of a complex base.
    Derived {
        base: QName,
        method: DerivationMethod,
        model: Option<ModelGroup>,
    },
}

#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum DerivationMethod {
    Extension,
    Restriction,
}

/// XSD 1.1 `xs:assert` on a complex type (or `xs:assertion` facet hoisted
/// from a simple type restriction).
#[derive(Clone, Debug)]
pub struct AssertDecl {
    pub span: Span,
    pub test: String,
    /// `xpathDefaultNamespace`, when present.
    pub default_namespace: Option<String>,
    pub annotation: Annotation,
}

#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum GroupKind {
    Sequence,
    Choice,
    All,
}

impl GroupKind {
    pub fn element_name(&self) -> &'static str {
        match self {
            GroupKind::Sequence => "sequence",
            GroupKind::Choice => "choice",
            GroupKind::All => "all",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ModelGroup {
    pub span: Span,
    pub kind: GroupKind,
    pub occurrence: Occurrence,
    pub particles: Vec<ParticleDecl>,
}

#[derive(Clone, Debug)]
pub enum ParticleDecl {
    Element(ElementDecl),
    Group(ModelGroup),
    GroupRef {
        span: Span,
        reference: QName,
        occurrence: Occurrence,
    },
    Any(AnyDecl),
}

#[derive(PartialEq, Eq, Copy, Clone, Debug, Default)]
pub enum ProcessContents {
    #[default]
    Strict,
    Lax,
    Skip,
}

/// `xs:any` / `xs:anyAttribute` wildcard.
#[derive(Clone, Debug)]
pub struct AnyDecl {
    pub span: Span,
    pub occurrence: Occurrence,
    pub process_contents: ProcessContents,
}

#[derive(PartialEq, Eq, Copy, Clone, Debug, Default)]
pub enum AttributeUse {
    #[default]
    Optional,
    Required,
    Prohibited,
}

impl AttributeUse {
    pub fn from_str(s: &str) -> Option<AttributeUse> {
        Some(match s {
            "optional" => AttributeUse::Optional,
            "required" => AttributeUse::Required,
            "prohibited" => AttributeUse::Prohibited,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug)]
pub struct AttributeDecl {
    pub span: Span,
    pub name: Option<String>,
    pub reference: Option<QName>,
    pub type_name: Option<QName>,
    pub inline_type: Option<SimpleTypeDef>,
    pub use_: AttributeUse,
    pub default: Option<String>,
    pub fixed: Option<String>,
    pub annotation: Annotation,
}

#[derive(Clone, Debug)]
pub struct GroupDef {
    pub span: Span,
    pub name: String,
    pub annotation: Annotation,
    pub model: ModelGroup,
}

#[derive(Clone, Debug)]
pub struct AttributeGroupDef {
    pub span: Span,
    pub name: String,
    pub annotation: Annotation,
    pub attributes: Vec<AttributeDecl>,
    pub attribute_groups: Vec<QName>,
}

#[derive(Clone, Debug)]
pub struct IncludeDecl {
    pub span: Span,
    pub location: String,
}

#[derive(Clone, Debug)]
pub struct ImportDecl {
    pub span: Span,
    pub namespace: Option<String>,
    pub location: Option<String>,
}

/// The parsed content of one schema file.
#[derive(Clone, Debug)]
pub struct Schema {
    pub span: Span,
    pub target_namespace: Option<String>,
    pub element_form_default: FormDefault,
    pub attribute_form_default: FormDefault,
    /// `vc:minVersion`, when the schema opts into XSD 1.1 features.
    pub min_version: Option<String>,
    pub includes: Vec<IncludeDecl>,
    pub imports: Vec<ImportDecl>,
    pub elements: Vec<ElementDecl>,
    pub attributes: Vec<AttributeDecl>,
    pub simple_types: Vec<SimpleTypeDef>,
    pub complex_types: Vec<ComplexTypeDef>,
    pub groups: Vec<GroupDef>,
    pub attribute_groups: Vec<AttributeGroupDef>,
}

impl Schema {
    /// Look up a global element declaration by local name.
    pub fn global_element(&self, name: &str) -> Option<&ElementDecl> {
        self.elements.iter().find(|e| e.name.as_deref() == Some(name))
    }
}
