// Schema-driven validation cases: each builds a registry from an inline
// schema and checks a (document, expected outcome) pair.

use url::Url;
use xmlkit_model::registry::TypeRegistry;
use xmlkit_model::report::{ErrorSource, ValidationError};
use xmlkit_syntax::loader::{Files, Loader};
use xmlkit_validator::Validator;

struct NoFiles;
impl Files for NoFiles {
    fn load(&mut self, _: &std::path::Path) -> Result<String, std::io::Error> {
        Err(std::io::Error::new(std::io::ErrorKind::NotFound, "inline only"))
    }
}

fn registry(xsd: &str) -> TypeRegistry {
    let mut loader = Loader::new(NoFiles);
    let doc = loader
        .load_text(xsd.to_string(), Url::from_file_path("/t/schema.xsd").unwrap())
        .expect("schema parses");
    TypeRegistry::from_document(&doc).expect("schema compiles")
}

fn validate(xsd: &str, xml: &str) -> Vec<ValidationError> {
    let registry = registry(xsd);
    Validator::new(&registry).validate(xml)
}

const ORDER: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="order">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="item" type="xs:string" maxOccurs="2"/>
        <xs:element name="total" type="xs:decimal"/>
        <xs:element name="note" type="xs:string" minOccurs="0"/>
      </xs:sequence>
      <xs:attribute name="id" type="xs:int" use="required"/>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

#[test]
fn valid_document_passes() {
    let errors = validate(
        ORDER,
        r#"<order id="7"><item>a</item><item>b</item><total>9.50</total></order>"#,
    );
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
}

#[test]
fn missing_required_child_is_reported() {
    let errors = validate(ORDER, r#"<order id="7"><item>a</item></order>"#);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("total"), "{:?}", errors[0].message);
    assert_eq!(errors[0].source, ErrorSource::Xsd);
}

#[test]
fn too_many_occurrences_are_reported() {
    let errors = validate(
        ORDER,
        r#"<order id="7"><item>a</item><item>b</item><item>c</item><total>1</total></order>"#,
    );
    assert!(!errors.is_empty());
    assert!(errors[0].message.contains("not allowed"), "{:?}", errors[0].message);
}

#[test]
fn missing_required_attribute_is_reported() {
    let errors = validate(ORDER, r#"<order><item>a</item><total>1</total></order>"#);
    assert!(errors.iter().any(|e| e.message.contains("required attribute id")));
}

#[test]
fn invalid_attribute_value_is_reported() {
    let errors = validate(
        ORDER,
        r#"<order id="seven"><item>a</item><total>1</total></order>"#,
    );
    assert!(errors.iter().any(|e| e.message.contains("not valid for attribute id")));
}

#[test]
fn invalid_simple_value_is_reported() {
    let errors = validate(
        ORDER,
        r#"<order id="7"><item>a</item><total>not-a-number</total></order>"#,
    );
    assert!(errors.iter().any(|e| e.message.contains("not valid for element total")));
}

#[test]
fn unknown_root_is_reported_once() {
    let errors = validate(ORDER, r#"<invoice/>"#);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("no declaration found"));
}

#[test]
fn unexpected_element_reports_expectation() {
    let errors = validate(
        ORDER,
        r#"<order id="7"><bogus/><total>1</total></order>"#,
    );
    assert!(!errors.is_empty());
    assert!(
        errors[0].message.contains("bogus") && errors[0].message.contains("expected"),
        "{:?}",
        errors[0].message
    );
}

#[test]
fn errors_preserve_document_order() {
    let errors = validate(
        ORDER,
        r#"<order><item>a</item><total>x</total></order>"#,
    );
    assert!(errors.len() >= 2);
    let lines: Vec<_> = errors.iter().map(|e| (e.line, e.column)).collect();
    let mut sorted = lines.clone();
    sorted.sort();
    assert_eq!(lines, sorted);
}

const CHOICE: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="payment">
    <xs:complexType>
      <xs:choice>
        <xs:element name="card" type="xs:string"/>
        <xs:element name="transfer" type="xs:string"/>
      </xs:choice>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

#[test]
fn choice_accepts_either_branch_but_not_both() {
    assert!(validate(CHOICE, "<payment><card>x</card></payment>").is_empty());
    assert!(validate(CHOICE, "<payment><transfer>x</transfer></payment>").is_empty());
    let errors = validate(
        CHOICE,
        "<payment><card>x</card><transfer>y</transfer></payment>",
    );
    assert!(!errors.is_empty(), "both branches must be rejected");
}

const QUALIFIED: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
    targetNamespace="urn:inv" xmlns:i="urn:inv" elementFormDefault="qualified">
  <xs:element name="invoice">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="amount" type="xs:decimal"/>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

#[test]
fn namespace_qualified_instance_validates() {
    let errors = validate(
        QUALIFIED,
        r#"<invoice xmlns="urn:inv"><amount>1.00</amount></invoice>"#,
    );
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
}

#[test]
fn wrong_namespace_is_rejected() {
    let errors = validate(
        QUALIFIED,
        r#"<invoice xmlns="urn:other"><amount>1.00</amount></invoice>"#,
    );
    assert!(!errors.is_empty());
}

const FACETED: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="doc">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="code">
          <xs:simpleType>
            <xs:restriction base="xs:string">
              <xs:pattern value="[A-Z]{2}\d{4}"/>
            </xs:restriction>
          </xs:simpleType>
        </xs:element>
        <xs:element name="level">
          <xs:simpleType>
            <xs:restriction base="xs:int">
              <xs:minInclusive value="1"/>
              <xs:maxInclusive value="10"/>
            </xs:restriction>
          </xs:simpleType>
        </xs:element>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

#[test]
fn facet_violations_are_reported() {
    assert!(validate(FACETED, "<doc><code>AB1234</code><level>5</level></doc>").is_empty());
    let errors = validate(FACETED, "<doc><code>nope</code><level>11</level></doc>");
    assert_eq!(errors.len(), 2);
}

#[test]
fn nillable_element_may_be_empty() {
    let xsd = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="root">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="due" type="xs:date" nillable="true"/>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;
    let errors = validate(
        xsd,
        r#"<root><due xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:nil="true"/></root>"#,
    );
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    let errors = validate(xsd, "<root><due/></root>");
    assert!(!errors.is_empty(), "empty non-nilled date must fail");
}

#[test]
fn generated_samples_validate_against_their_schema() {
    use xmlkit_model::graph::GraphBuilder;
    use xmlkit_model::sample::{EmitOptional, GeneratorPolicy, SampleGenerator};

    for xsd in [ORDER, CHOICE, QUALIFIED, FACETED] {
        let registry = registry(xsd);
        let graph = GraphBuilder::new(&registry).build().expect("graph");
        let policy = GeneratorPolicy {
            emit_optional: EmitOptional::Never,
            ..GeneratorPolicy::default()
        };
        let sample = SampleGenerator::with_policy(&graph, &registry, policy)
            .generate(graph.roots[0])
            .expect("generate");
        let errors = Validator::new(&registry).validate(&sample.xml);
        assert!(
            errors.is_empty(),
            "sample for schema should validate; errors {errors:?}\nxml: {}",
            sample.xml
        );
    }
}

#[test]
fn schema_discovery_follows_the_instance_hint() {
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let schema_path = dir.path().join("order.xsd");
    std::fs::write(&schema_path, ORDER).unwrap();

    let xml_path = dir.path().join("order.xml");
    let mut f = std::fs::File::create(&xml_path).unwrap();
    write!(
        f,
        r#"<order xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
       xsi:noNamespaceSchemaLocation="order.xsd" id="1"><item>a</item><total>1.00</total></order>"#
    )
    .unwrap();
    drop(f);

    let errors = xmlkit_validator::discovery::validate_file(&xml_path, None).expect("load");
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");

    // The same instance minus a required child now fails through the
    // discovered schema.
    std::fs::write(
        &xml_path,
        r#"<order xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
       xsi:noNamespaceSchemaLocation="order.xsd" id="1"><item>a</item></order>"#,
    )
    .unwrap();
    let errors = xmlkit_validator::discovery::validate_file(&xml_path, None).expect("load");
    assert!(errors.iter().any(|e| e.message.contains("total")));
}
