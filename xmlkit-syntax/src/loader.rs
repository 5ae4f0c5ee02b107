//! Schema loading and include/import resolution.
//!
//! A [`Loader`] owns a `codemap::CodeMap` so every loaded file can be
//! rendered in diagnostics, and a set of canonical URIs so that diamond
//! include graphs and include cycles resolve each document exactly once.

use crate::types::Schema;
use crate::xml::parse_schema;
use crate::SyntaxError;
use codemap::CodeMap;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::Path;
use url::Url;

/// Source of schema file contents, injectable for tests.
pub trait Files {
    fn load(&mut self, path: &Path) -> Result<String, io::Error>;
}

/// Loads schema text from the local filesystem.
pub struct FsFiles;

impl Files for FsFiles {
    fn load(&mut self, path: &Path) -> Result<String, io::Error> {
        fs::read_to_string(path)
    }
}

/// An immutable snapshot of one loaded XSD and its resolved sub-schemas.
///
/// Downstream components treat the document as read-only; edits produce a
/// new document with a bumped `version`, which caches use to detect stale
/// derived data.
#[derive(Debug)]
pub struct SchemaDocument {
    pub text: String,
    pub uri: Url,
    pub target_namespace: Option<String>,
    /// Prefix to namespace-URI map declared on the schema root. The
    /// default namespace is stored under the empty prefix.
    pub namespaces: BTreeMap<String, String>,
    pub schema: Schema,
    pub sub_documents: Vec<SchemaDocument>,
    pub version: u64,
}

impl SchemaDocument {
    /// This document and every include/import-reachable sub-document,
    /// in depth-first order.
    pub fn all_documents(&self) -> Vec<&SchemaDocument> {
        let mut out = vec![self];
        for sub in &self.sub_documents {
            out.extend(sub.all_documents());
        }
        out
    }
}

pub struct Loader<F: Files> {
    files: F,
    codemap: CodeMap,
    /// Canonical URIs already resolved in this load; prevents reload cycles.
    loaded: HashSet<Url>,
}

impl Loader<FsFiles> {
    pub fn fs() -> Loader<FsFiles> {
        Loader::new(FsFiles)
    }
}

impl<F: Files> Loader<F> {
    pub fn new(files: F) -> Loader<F> {
        Loader {
            files,
            codemap: CodeMap::new(),
            loaded: HashSet::new(),
        }
    }

    pub fn codemap(&self) -> &CodeMap {
        &self.codemap
    }

    /// Load and parse the schema at `path`, resolving its include/import
    /// closure relative to the file's location.
    pub fn load(&mut self, path: &Path) -> Result<SchemaDocument, SyntaxError> {
        let abs = path
            .canonicalize()
            .map_err(|source| SyntaxError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let uri = Url::from_file_path(&abs).map_err(|()| SyntaxError::Io {
            path: abs.clone(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "path is not absolute"),
        })?;
        let text = self.files.load(&abs).map_err(|source| SyntaxError::Io {
            path: abs.clone(),
            source,
        })?;
        self.load_text(text, uri)
    }

    /// Parse in-memory schema text. Includes and imports with relative
    /// locations resolve against `uri`.
    pub fn load_text(&mut self, text: String, uri: Url) -> Result<SchemaDocument, SyntaxError> {
        self.loaded.insert(uri.clone());
        self.parse_document(text, uri, 1)
    }

    /// Re-parse edited schema text as the successor of an existing
    /// document, carrying a bumped version tag.
    pub fn load_edited(
        &mut self,
        text: String,
        predecessor: &SchemaDocument,
    ) -> Result<SchemaDocument, SyntaxError> {
        self.loaded.insert(predecessor.uri.clone());
        self.parse_document(text, predecessor.uri.clone(), predecessor.version + 1)
    }

    fn parse_document(
        &mut self,
        text: String,
        uri: Url,
        version: u64,
    ) -> Result<SchemaDocument, SyntaxError> {
        let file = self
            .codemap
            .add_file(uri.to_string(), text.clone());
        let doc = roxmltree::Document::parse(&text).map_err(|source| SyntaxError::Xml {
            uri: uri.to_string(),
            source,
        })?;
        let schema = parse_schema(&doc, file.span)?;

        let mut namespaces = BTreeMap::new();
        for ns in doc.root_element().namespaces() {
            namespaces.insert(ns.name().unwrap_or("").to_string(), ns.uri().to_string());
        }

        let mut sub_documents = Vec::new();
        let locations: Vec<(codemap::Span, String)> = schema
            .includes
            .iter()
            .map(|inc| (inc.span, inc.location.clone()))
            .chain(schema.imports.iter().filter_map(|imp| {
                imp.location.as_ref().map(|loc| (imp.span, loc.clone()))
            }))
            .collect();
        for (span, location) in locations {
            let resolved = uri
                .join(&location)
                .map_err(|_| SyntaxError::Resolve {
                    span,
                    location: location.clone(),
                })?;
            if !self.loaded.insert(resolved.clone()) {
                log::debug!("skipping already-loaded schema {resolved}");
                continue;
            }
            let path = resolved.to_file_path().map_err(|()| SyntaxError::Resolve {
                span,
                location: location.clone(),
            })?;
            let sub_text = self.files.load(&path).map_err(|source| SyntaxError::Io {
                path,
                source,
            })?;
            sub_documents.push(self.parse_document(sub_text, resolved, version)?);
        }

        Ok(SchemaDocument {
            target_namespace: schema.target_namespace.clone(),
            text,
            uri,
            namespaces,
            schema,
            sub_documents,
            version,
        })
    }

    /// Render a load error as a gutter diagnostic on stderr.
    pub fn dump_diagnostic(&self, err: &SyntaxError) {
        let mut emitter = codemap_diagnostic::Emitter::stderr(
            codemap_diagnostic::ColorConfig::Auto,
            Some(&self.codemap),
        );
        let spans = match err.span() {
            Some(span) => vec![codemap_diagnostic::SpanLabel {
                span,
                label: None,
                style: codemap_diagnostic::SpanStyle::Primary,
            }],
            None => vec![],
        };
        emitter.emit(&[codemap_diagnostic::Diagnostic {
            level: codemap_diagnostic::Level::Error,
            message: err.to_string(),
            code: None,
            spans,
        }]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GroupKind, MaxOccurs};
    use assert_matches::assert_matches;

    struct MemFiles(BTreeMap<&'static str, &'static str>);
    impl Files for MemFiles {
        fn load(&mut self, path: &Path) -> Result<String, io::Error> {
            self.0
                .get(path.to_str().unwrap())
                .map(|s| s.to_string())
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "missing"))
        }
    }

    fn url(path: &str) -> Url {
        Url::from_file_path(path).unwrap()
    }

    const SIMPLE: &str = r#"<?xml version="1.0"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           targetNamespace="urn:test" xmlns:t="urn:test">
  <xs:element name="invoice" type="t:InvoiceType"/>
  <xs:complexType name="InvoiceType">
    <xs:sequence>
      <xs:element name="line" type="xs:string" maxOccurs="unbounded"/>
    </xs:sequence>
    <xs:attribute name="id" type="xs:int" use="required"/>
  </xs:complexType>
</xs:schema>"#;

    #[test]
    fn parses_global_declarations() {
        let mut loader = Loader::new(MemFiles(BTreeMap::new()));
        let doc = loader
            .load_text(SIMPLE.to_string(), url("/s/invoice.xsd"))
            .expect("parse");
        assert_eq!(doc.target_namespace.as_deref(), Some("urn:test"));
        assert_eq!(doc.schema.elements.len(), 1);
        assert_eq!(doc.schema.complex_types.len(), 1);
        let ct = &doc.schema.complex_types[0];
        assert_eq!(ct.name.as_deref(), Some("InvoiceType"));
        match &ct.content {
            crate::types::ComplexContent::Model(group) => {
                assert_eq!(group.kind, GroupKind::Sequence);
                assert_eq!(group.particles.len(), 1);
            }
            other => panic!("unexpected content {other:?}"),
        }
        assert_eq!(doc.version, 1);
    }

    #[test]
    fn unbounded_is_a_sentinel() {
        let mut loader = Loader::new(MemFiles(BTreeMap::new()));
        let doc = loader
            .load_text(SIMPLE.to_string(), url("/s/invoice.xsd"))
            .unwrap();
        let ct = &doc.schema.complex_types[0];
        let crate::types::ComplexContent::Model(group) = &ct.content else {
            panic!("expected model");
        };
        let crate::types::ParticleDecl::Element(line) = &group.particles[0] else {
            panic!("expected element");
        };
        assert_eq!(line.occurrence.max, MaxOccurs::Unbounded);
    }

    #[test]
    fn include_cycle_resolves_each_document_once() {
        let a = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:include schemaLocation="b.xsd"/>
  <xs:element name="a" type="xs:string"/>
</xs:schema>"#;
        let b = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:include schemaLocation="a.xsd"/>
  <xs:element name="b" type="xs:string"/>
</xs:schema>"#;
        let mut files = BTreeMap::new();
        files.insert("/s/a.xsd", a);
        files.insert("/s/b.xsd", b);
        let mut loader = Loader::new(MemFiles(files));
        let doc = loader.load_text(a.to_string(), url("/s/a.xsd")).expect("load");
        // a includes b; b's include of a is skipped as already loaded.
        assert_eq!(doc.sub_documents.len(), 1);
        assert!(doc.sub_documents[0].sub_documents.is_empty());
        assert_eq!(doc.all_documents().len(), 2);
    }

    #[test]
    fn undefined_prefix_is_an_error() {
        let bad = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="a" type="missing:Thing"/>
</xs:schema>"#;
        let mut loader = Loader::new(MemFiles(BTreeMap::new()));
        let err = loader.load_text(bad.to_string(), url("/s/bad.xsd"));
        assert_matches!(err, Err(SyntaxError::Schema { .. }));
    }
}
