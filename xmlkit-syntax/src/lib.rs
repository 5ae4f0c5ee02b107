//! Syntax layer for XSD processing: parsing schema text into a positioned
//! syntax tree and resolving the include/import closure of a schema set.
//!
//! The output of this crate is a [`SchemaDocument`]: one parsed schema file
//! together with every sub-schema reachable through `xs:include` and
//! `xs:import`, each resolved exactly once by canonical URI.

pub mod loader;
pub mod types;
pub mod xml;

pub use loader::{Files, FsFiles, Loader, SchemaDocument};
pub use types::{QName, Schema};
pub use xml::parse_schema;

use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SyntaxError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("XML parse error in {uri}: {source}")]
    Xml {
        uri: String,
        #[source]
        source: roxmltree::Error,
    },
    #[error("schema error: {message}")]
    Schema {
        span: codemap::Span,
        message: String,
    },
    #[error("cannot resolve schema location {location:?}")]
    Resolve {
        span: codemap::Span,
        location: String,
    },
}

impl SyntaxError {
    pub fn span(&self) -> Option<codemap::Span> {
        match self {
            SyntaxError::Schema { span, .. } | SyntaxError::Resolve { span, .. } => Some(*span),
            _ => None,
        }
    }
}
