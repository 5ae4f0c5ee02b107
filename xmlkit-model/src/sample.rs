//! Facet-driven sample instance generation.
//!
//! Walks the element graph in declared document order and emits a valid
//! XML instance: occurrence counts honor `minOccurs`/`maxOccurs` clamped
//! by the policy, choice groups pick one branch, enumerations win over
//! every other value source, and pattern facets go through the finite
//! regex expander with a raw-pattern fallback.

use crate::cancel::CancelToken;
use crate::datatype::{Builtin, SimpleType, Variety};
use crate::graph::{ElementGraph, ElementNode, NodeId};
use crate::regex_gen;
use crate::registry::{ContentModel, Particle, Term, TypeDefinition, TypeRegistry};
use crate::report::{ErrorSource, ValidationError};
use crate::ModelError;
use bigdecimal::BigDecimal;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use xmlkit_syntax::types::{AttributeUse, GroupKind, MaxOccurs};

#[derive(PartialEq, Eq, Copy, Clone, Debug, Default)]
pub enum EmitOptional {
    Always,
    #[default]
    Never,
    Random,
}

#[derive(Clone, Debug)]
pub struct GeneratorPolicy {
    /// Minimum repetitions per unbounded particle.
    pub min_elements: u32,
    /// Maximum repetitions per unbounded particle.
    pub max_elements: u32,
    pub emit_optional: EmitOptional,
    /// Makes random choices deterministic.
    pub seed: Option<u64>,
    /// Spaces per indentation level.
    pub indent: usize,
}

impl Default for GeneratorPolicy {
    fn default() -> Self {
        GeneratorPolicy {
            min_elements: 1,
            max_elements: 3,
            emit_optional: EmitOptional::Never,
            seed: None,
            indent: 2,
        }
    }
}

#[derive(Debug)]
pub struct GeneratedInstance {
    pub xml: String,
    /// Non-fatal degradations (unsupported patterns, facet oddities).
    pub warnings: Vec<ValidationError>,
}

pub struct SampleGenerator<'a> {
    graph: &'a ElementGraph,
    registry: &'a TypeRegistry,
    policy: GeneratorPolicy,
    cancel: CancelToken,
    rng: StdRng,
    bool_state: bool,
    warnings: Vec<ValidationError>,
}

impl<'a> SampleGenerator<'a> {
    pub fn new(graph: &'a ElementGraph, registry: &'a TypeRegistry) -> SampleGenerator<'a> {
        Self::with_policy(graph, registry, GeneratorPolicy::default())
    }

    pub fn with_policy(
        graph: &'a ElementGraph,
        registry: &'a TypeRegistry,
        policy: GeneratorPolicy,
    ) -> SampleGenerator<'a> {
        let rng = match policy.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(0),
        };
        let bool_state = policy.seed.unwrap_or(0) % 2 == 0;
        SampleGenerator {
            graph,
            registry,
            policy,
            cancel: CancelToken::new(),
            rng,
            bool_state,
            warnings: Vec::new(),
        }
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Generate a complete UTF-8 document rooted at `root`.
    pub fn generate(mut self, root: NodeId) -> Result<GeneratedInstance, ModelError> {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        let node = self.graph.node(root);
        self.emit_element(node, 0, true, &mut xml)?;
        Ok(GeneratedInstance {
            xml,
            warnings: self.warnings,
        })
    }

    fn indent(&self, depth: usize, out: &mut String) {
        for _ in 0..depth * self.policy.indent {
            out.push(' ');
        }
    }

    /// How many copies of a particle to emit.
    fn occurrence_count(&mut self, min: u32, max: MaxOccurs) -> u32 {
        let cap = match max {
            MaxOccurs::Bounded(n) => n.min(self.policy.max_elements.max(1)).max(min),
            MaxOccurs::Unbounded => self.policy.max_elements.max(1).max(min),
        };
        if min == 0 {
            match self.policy.emit_optional {
                EmitOptional::Never => 0,
                EmitOptional::Always => self.policy.min_elements.clamp(1, cap),
                EmitOptional::Random => {
                    if self.rng.gen_bool(0.5) {
                        self.policy.min_elements.clamp(1, cap)
                    } else {
                        0
                    }
                }
            }
        } else {
            min.max(self.policy.min_elements).min(cap)
        }
    }

    fn emit_element(
        &mut self,
        node: &'a ElementNode,
        depth: usize,
        is_root: bool,
        out: &mut String,
    ) -> Result<(), ModelError> {
        // A cancel is observable within one element emit.
        self.cancel.check()?;

        let count = if is_root {
            1
        } else if node.recursive {
            // Recursive branches emit exactly minOccurs and stop descent.
            node.min_occurs
        } else {
            self.occurrence_count(node.min_occurs, node.max_occurs)
        };

        for _ in 0..count {
            self.indent(depth, out);
            out.push('<');
            out.push_str(&node.name.local);
            if is_root {
                self.emit_root_namespaces(out);
            }
            self.emit_attributes(node, out);

            if node.recursive {
                out.push_str("/>\n");
                continue;
            }

            match node.type_def.as_ref() {
                TypeDefinition::Simple(simple) => {
                    if is_anytype(simple) {
                        out.push_str("/>\n");
                        continue;
                    }
                    let value = self.element_value(node, simple);
                    out.push('>');
                    out.push_str(&escape_text(&value));
                    out.push_str("</");
                    out.push_str(&node.name.local);
                    out.push_str(">\n");
                }
                TypeDefinition::Complex(complex) => {
                    if let Some(simple) = &complex.simple_content {
                        let value = self.element_value(node, simple);
                        out.push('>');
                        out.push_str(&escape_text(&value));
                        out.push_str("</");
                        out.push_str(&node.name.local);
                        out.push_str(">\n");
                    } else {
                        // Children render into a scratch buffer first so an
                        // all-optional content model still self-closes.
                        let mut inner = String::new();
                        let mut cursor = 0usize;
                        self.emit_children(node, &complex.content, &mut cursor, depth + 1, &mut inner)?;
                        if inner.is_empty() {
                            out.push_str("/>\n");
                        } else {
                            out.push_str(">\n");
                            out.push_str(&inner);
                            self.indent(depth, out);
                            out.push_str("</");
                            out.push_str(&node.name.local);
                            out.push_str(">\n");
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Walk the content model in document order, consuming child nodes
    /// from the graph as the matching element terms come up. For a
    /// choice, one branch is emitted but the cursor still advances over
    /// the skipped branches' nodes.
    fn emit_children(
        &mut self,
        node: &'a ElementNode,
        content: &ContentModel,
        cursor: &mut usize,
        depth: usize,
        out: &mut String,
    ) -> Result<(), ModelError> {
        match content {
            ContentModel::Empty => Ok(()),
            ContentModel::Sequence(particles) | ContentModel::All(particles) => {
                self.emit_group(node, GroupKind::Sequence, particles, cursor, depth, out)
            }
            ContentModel::Choice(particles) => {
                self.emit_group(node, GroupKind::Choice, particles, cursor, depth, out)
            }
        }
    }

    fn emit_group(
        &mut self,
        node: &'a ElementNode,
        kind: GroupKind,
        particles: &[Particle],
        cursor: &mut usize,
        depth: usize,
        out: &mut String,
    ) -> Result<(), ModelError> {
        match kind {
            // xs:all emits every child once in document order, same as a
            // sequence for generation purposes.
            GroupKind::Sequence | GroupKind::All => {
                for particle in particles {
                    self.emit_particle(node, particle, cursor, depth, true, out)?;
                }
                Ok(())
            }
            GroupKind::Choice => {
                let chosen = self.choose_branch(particles.len());
                for (i, particle) in particles.iter().enumerate() {
                    self.emit_particle(node, particle, cursor, depth, i == chosen, out)?;
                }
                Ok(())
            }
        }
    }

    fn choose_branch(&mut self, len: usize) -> usize {
        if len <= 1 {
            0
        } else if self.policy.seed.is_some() {
            self.rng.gen_range(0..len)
        } else {
            0
        }
    }

    fn emit_particle(
        &mut self,
        node: &'a ElementNode,
        particle: &Particle,
        cursor: &mut usize,
        depth: usize,
        emit: bool,
        out: &mut String,
    ) -> Result<(), ModelError> {
        match &particle.term {
            Term::Element(spec) => {
                self.emit_child_named(node, &spec.name.local, cursor, depth, emit, out)
            }
            Term::Ref(name) => self.emit_child_named(node, &name.local, cursor, depth, emit, out),
            Term::Model(kind, inner) => {
                if emit {
                    self.emit_group(node, *kind, inner, cursor, depth, out)
                } else {
                    self.skip_group(node, inner, cursor);
                    Ok(())
                }
            }
            Term::Any(_) => Ok(()),
        }
    }

    fn emit_child_named(
        &mut self,
        node: &'a ElementNode,
        local: &str,
        cursor: &mut usize,
        depth: usize,
        emit: bool,
        out: &mut String,
    ) -> Result<(), ModelError> {
        // Depth-pruned branches left no node behind; the name check keeps
        // the cursor honest in that case.
        let Some(child_id) = node.children.get(*cursor) else {
            return Ok(());
        };
        let child = self.graph.node(*child_id);
        if child.name.local != local {
            return Ok(());
        }
        *cursor += 1;
        if emit {
            self.emit_element(child, depth, false, out)?;
        }
        Ok(())
    }

    /// Advance the cursor past a skipped branch's nodes without emitting.
    fn skip_group(&self, node: &'a ElementNode, particles: &[Particle], cursor: &mut usize) {
        for particle in particles {
            match &particle.term {
                Term::Element(spec) => self.skip_child_named(node, &spec.name.local, cursor),
                Term::Ref(name) => self.skip_child_named(node, &name.local, cursor),
                Term::Model(_, inner) => self.skip_group(node, inner, cursor),
                Term::Any(_) => {}
            }
        }
    }

    fn skip_child_named(&self, node: &'a ElementNode, local: &str, cursor: &mut usize) {
        if let Some(id) = node.children.get(*cursor) {
            if self.graph.node(*id).name.local == local {
                *cursor += 1;
            }
        }
    }

    fn emit_root_namespaces(&mut self, out: &mut String) {
        if let Some(tns) = &self.registry.target_namespace {
            out.push_str(&format!(" xmlns=\"{}\"", escape_attr(tns)));
        }
        let location = &self.registry.source_uri;
        if !location.is_empty() {
            out.push_str(" xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\"");
            match &self.registry.target_namespace {
                Some(tns) => out.push_str(&format!(
                    " xsi:schemaLocation=\"{} {}\"",
                    escape_attr(tns),
                    escape_attr(location)
                )),
                None => out.push_str(&format!(
                    " xsi:noNamespaceSchemaLocation=\"{}\"",
                    escape_attr(location)
                )),
            }
        }
    }

    fn emit_attributes(&mut self, node: &'a ElementNode, out: &mut String) {
        for attr in &node.attributes {
            let emit = match attr.use_ {
                AttributeUse::Required => true,
                AttributeUse::Prohibited => false,
                AttributeUse::Optional => match self.policy.emit_optional {
                    EmitOptional::Always => true,
                    EmitOptional::Never => false,
                    EmitOptional::Random => self.rng.gen_bool(0.5),
                },
            };
            if !emit {
                continue;
            }
            let value = attr
                .fixed
                .clone()
                .or_else(|| attr.default.clone())
                .unwrap_or_else(|| self.simple_value(&attr.simple_type));
            out.push(' ');
            out.push_str(&attr.name.local);
            out.push_str("=\"");
            out.push_str(&escape_attr(&value));
            out.push('"');
        }
    }

    /// The lazily computed example value for a node with simple content;
    /// computed once and cached on the node.
    pub fn example_for(&mut self, node: &'a ElementNode) -> Option<String> {
        if let Some(cached) = node.example() {
            return Some(cached);
        }
        let simple = match node.type_def.as_ref() {
            TypeDefinition::Simple(simple) => simple.clone(),
            TypeDefinition::Complex(complex) => complex.simple_content.clone()?,
        };
        let value = self.simple_value(&simple);
        node.cache_example(value.clone());
        Some(value)
    }

    fn element_value(&mut self, node: &'a ElementNode, simple: &SimpleType) -> String {
        if let Some(fixed) = &node.fixed {
            return fixed.clone();
        }
        if let Some(default) = &node.default {
            return default.clone();
        }
        let value = self.simple_value(simple);
        node.cache_example(value.clone());
        value
    }

    /// A valid sample value for a simple type, honoring its facets.
    pub fn simple_value(&mut self, simple: &SimpleType) -> String {
        match &simple.variety {
            Variety::List { item } => {
                let n = self.policy.min_elements.max(1);
                let items: Vec<String> = (0..n).map(|_| self.simple_value(item)).collect();
                return items.join(" ");
            }
            Variety::Union { members } => {
                if let Some(first) = members.first() {
                    return self.simple_value(first);
                }
                return String::new();
            }
            Variety::Atomic => {}
        }
        let facets = &simple.facets;
        if let Some(first) = facets.enumeration.first() {
            let pick = if self.policy.seed.is_some() && facets.enumeration.len() > 1 {
                self.rng.gen_range(0..facets.enumeration.len())
            } else {
                0
            };
            return facets.enumeration.get(pick).cloned().unwrap_or_else(|| first.clone());
        }
        if let Some(pattern) = &facets.pattern {
            match regex_gen::sample_matching(pattern.source()) {
                Ok(sample) => return sample,
                Err(err) => {
                    // Raw-pattern fallback, flagged so downstream tools can
                    // surface it.
                    self.warnings.push(ValidationError::warning(
                        ErrorSource::Xsd,
                        format!("{err}; emitting the raw pattern text"),
                    ));
                    return pattern.source().to_string();
                }
            }
        }
        let base = self.builtin_value(simple);
        self.fit_length(base, simple)
    }

    fn builtin_value(&mut self, simple: &SimpleType) -> String {
        let facets = &simple.facets;
        match simple.builtin {
            Builtin::AnySimpleType | Builtin::String | Builtin::NormalizedString => {
                "string".to_string()
            }
            Builtin::Token => "token".to_string(),
            Builtin::Language => "en".to_string(),
            Builtin::Name | Builtin::NcName | Builtin::Id => "id1".to_string(),
            Builtin::IdRef | Builtin::Entity => "id1".to_string(),
            Builtin::NmToken | Builtin::NmTokens => "token".to_string(),
            Builtin::QName => "local".to_string(),
            Builtin::AnyUri => "https://example.com/".to_string(),
            Builtin::Boolean => {
                self.bool_state = !self.bool_state;
                if self.bool_state { "true" } else { "false" }.to_string()
            }
            Builtin::Float | Builtin::Double => "0.0".to_string(),
            Builtin::Decimal => {
                let scale = facets.fraction_digits.unwrap_or(2) as i64;
                let value = facets
                    .bounds
                    .min_value()
                    .or_else(|| facets.bounds.max_value().filter(|m| m < &BigDecimal::from(0)))
                    .unwrap_or_else(|| BigDecimal::from(0));
                value.with_scale(scale).to_string()
            }
            Builtin::Integer
            | Builtin::Long
            | Builtin::Int
            | Builtin::Short
            | Builtin::Byte
            | Builtin::NonPositiveInteger => self.integer_value(simple, 0),
            Builtin::NonNegativeInteger
            | Builtin::UnsignedLong
            | Builtin::UnsignedInt
            | Builtin::UnsignedShort
            | Builtin::UnsignedByte => self.integer_value(simple, 0),
            Builtin::PositiveInteger => self.integer_value(simple, 1),
            Builtin::NegativeInteger => self.integer_value(simple, -1),
            Builtin::Duration => "P1D".to_string(),
            Builtin::Date => chrono::Local::now().format("%Y-%m-%d").to_string(),
            Builtin::DateTime => chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
            Builtin::Time => "12:00:00".to_string(),
            Builtin::GYear => chrono::Local::now().format("%Y").to_string(),
            Builtin::GYearMonth => chrono::Local::now().format("%Y-%m").to_string(),
            Builtin::GMonthDay => "--01-01".to_string(),
            Builtin::GDay => "---01".to_string(),
            Builtin::GMonth => "--01".to_string(),
            Builtin::HexBinary => {
                let octets = simple.facets.length.min_len().unwrap_or(1).max(1);
                "00".repeat(octets)
            }
            Builtin::Base64Binary => "ZGF0YQ==".to_string(),
        }
    }

    /// Default integer constrained to the facet bounds: the lower bound
    /// when one exists, else the floor natural to the type.
    fn integer_value(&mut self, simple: &SimpleType, floor: i64) -> String {
        let bounds = &simple.facets.bounds;
        let floor = BigDecimal::from(floor);
        let value = match (bounds.min_value(), bounds.max_value()) {
            (Some(min), _) if min > floor => min,
            (_, Some(max)) if max < floor => max,
            _ => floor,
        };
        value.with_scale(0).to_string()
    }

    /// Pad or clip string-family values to their length facets.
    fn fit_length(&self, mut value: String, simple: &SimpleType) -> String {
        let stringish = matches!(
            simple.builtin,
            Builtin::AnySimpleType
                | Builtin::String
                | Builtin::NormalizedString
                | Builtin::Token
                | Builtin::Name
                | Builtin::NcName
                | Builtin::NmToken
                | Builtin::Id
                | Builtin::IdRef
                | Builtin::Entity
        );
        if !stringish {
            return value;
        }
        if let Some(min) = simple.facets.length.min_len() {
            while value.chars().count() < min {
                value.push('a');
            }
        }
        if let Some(max) = simple.facets.length.max_len() {
            if value.chars().count() > max {
                value = value.chars().take(max).collect();
            }
        }
        value
    }
}

fn is_anytype(simple: &SimpleType) -> bool {
    simple
        .name
        .as_ref()
        .map(|n| n.is_xsd() && n.local == "anyType")
        .unwrap_or(false)
}

pub fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::registry::TypeRegistry;
    use std::io;
    use std::path::Path;
    use url::Url;
    use xmlkit_syntax::loader::{Files, Loader};

    struct NoFiles;
    impl Files for NoFiles {
        fn load(&mut self, _: &Path) -> Result<String, io::Error> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no files in test"))
        }
    }

    fn build(xsd: &str) -> (TypeRegistry, crate::graph::ElementGraph) {
        let mut loader = Loader::new(NoFiles);
        let doc = loader
            .load_text(xsd.to_string(), Url::from_file_path("/t/gen.xsd").unwrap())
            .expect("parse");
        let registry = TypeRegistry::from_document(&doc).expect("compile");
        let graph = GraphBuilder::new(&registry).build().expect("graph");
        (registry, graph)
    }

    #[test]
    fn recursive_optional_schema_emits_bare_root() {
        let (registry, graph) = build(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="root" type="Node"/>
  <xs:complexType name="Node">
    <xs:sequence>
      <xs:element name="child" type="Node" minOccurs="0" maxOccurs="1"/>
    </xs:sequence>
  </xs:complexType>
</xs:schema>"#,
        );
        let policy = GeneratorPolicy {
            emit_optional: EmitOptional::Never,
            ..GeneratorPolicy::default()
        };
        let out = SampleGenerator::with_policy(&graph, &registry, policy)
            .generate(graph.roots[0])
            .expect("generate");
        let body = out.xml.lines().nth(1).expect("root line");
        assert!(body.starts_with("<root"), "got {body:?}");
        assert!(body.ends_with("/>"), "optional recursion must not expand: {body:?}");
    }

    #[test]
    fn required_elements_and_attributes_are_emitted() {
        let (registry, graph) = build(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="order">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="qty" type="xs:int"/>
        <xs:element name="note" type="xs:string" minOccurs="0"/>
      </xs:sequence>
      <xs:attribute name="id" type="xs:ID" use="required"/>
      <xs:attribute name="tag" type="xs:string"/>
    </xs:complexType>
  </xs:element>
</xs:schema>"#,
        );
        let out = SampleGenerator::new(&graph, &registry)
            .generate(graph.roots[0])
            .unwrap();
        assert!(out.xml.contains("<qty>0</qty>"));
        assert!(out.xml.contains("id=\""));
        assert!(!out.xml.contains("<note>"), "optional skipped by default");
        assert!(!out.xml.contains("tag=\""), "optional attribute skipped");
    }

    #[test]
    fn choice_emits_exactly_one_branch() {
        let (registry, graph) = build(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="payment">
    <xs:complexType>
      <xs:choice>
        <xs:element name="card" type="xs:string"/>
        <xs:element name="transfer" type="xs:string"/>
      </xs:choice>
    </xs:complexType>
  </xs:element>
</xs:schema>"#,
        );
        let out = SampleGenerator::new(&graph, &registry)
            .generate(graph.roots[0])
            .unwrap();
        assert!(out.xml.contains("<card>"));
        assert!(!out.xml.contains("<transfer>"));
    }

    #[test]
    fn enumeration_and_facets_drive_values() {
        let (registry, graph) = build(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="config">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="mode">
          <xs:simpleType>
            <xs:restriction base="xs:string">
              <xs:enumeration value="fast"/>
              <xs:enumeration value="slow"/>
            </xs:restriction>
          </xs:simpleType>
        </xs:element>
        <xs:element name="level">
          <xs:simpleType>
            <xs:restriction base="xs:int">
              <xs:minInclusive value="5"/>
            </xs:restriction>
          </xs:simpleType>
        </xs:element>
        <xs:element name="code">
          <xs:simpleType>
            <xs:restriction base="xs:string">
              <xs:pattern value="[A-Z]{3}-\d{2}"/>
            </xs:restriction>
          </xs:simpleType>
        </xs:element>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>"#,
        );
        let out = SampleGenerator::new(&graph, &registry)
            .generate(graph.roots[0])
            .unwrap();
        assert!(out.xml.contains("<mode>fast</mode>"));
        assert!(out.xml.contains("<level>5</level>"));
        let code = regex::Regex::new("<code>([^<]*)</code>").unwrap();
        let value = code.captures(&out.xml).unwrap().get(1).unwrap().as_str();
        assert!(
            regex::Regex::new(r"^[A-Z]{3}-\d{2}$").unwrap().is_match(value),
            "generated {value:?} should match the pattern facet"
        );
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn unbounded_particles_respect_policy_caps() {
        let (registry, graph) = build(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="list">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="item" type="xs:string" maxOccurs="unbounded"/>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>"#,
        );
        let policy = GeneratorPolicy {
            min_elements: 2,
            max_elements: 2,
            ..GeneratorPolicy::default()
        };
        let out = SampleGenerator::with_policy(&graph, &registry, policy)
            .generate(graph.roots[0])
            .unwrap();
        assert_eq!(out.xml.matches("<item>").count(), 2);
    }

    #[test]
    fn seed_makes_generation_deterministic() {
        let (registry, graph) = build(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="coin">
    <xs:complexType>
      <xs:choice>
        <xs:element name="heads" type="xs:string"/>
        <xs:element name="tails" type="xs:string"/>
      </xs:choice>
    </xs:complexType>
  </xs:element>
</xs:schema>"#,
        );
        let policy = GeneratorPolicy {
            seed: Some(42),
            ..GeneratorPolicy::default()
        };
        let a = SampleGenerator::with_policy(&graph, &registry, policy.clone())
            .generate(graph.roots[0])
            .unwrap();
        let b = SampleGenerator::with_policy(&graph, &registry, policy)
            .generate(graph.roots[0])
            .unwrap();
        assert_eq!(a.xml, b.xml);
    }

    #[test]
    fn schema_location_is_populated() {
        let (registry, graph) = build(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
    targetNamespace="urn:cfg" xmlns:c="urn:cfg">
  <xs:element name="root" type="xs:string"/>
</xs:schema>"#,
        );
        let out = SampleGenerator::new(&graph, &registry)
            .generate(graph.roots[0])
            .unwrap();
        assert!(out.xml.contains("xsi:schemaLocation=\"urn:cfg "));
        assert!(out.xml.contains("xmlns=\"urn:cfg\""));
    }
}
