//! Compiled XSD model: type registry, facet engine, flattened element
//! graph, and the facet-driven sample generator.
//!
//! The crate is thread-safe but single-owner per document: a registry and
//! its graphs belong to one editing session and are treated as immutable
//! once built. Cross-session sharing happens by value or by rebuilding
//! from the source text.

pub mod cancel;
pub mod datatype;
pub mod graph;
pub mod regex_gen;
pub mod registry;
pub mod report;
pub mod sample;

pub use cancel::{CancelToken, Cancelled};
pub use datatype::{Builtin, Facets, SimpleType};
pub use graph::{ElementGraph, ElementNode, GraphBuilder, NodeId, MAX_ALLOWED_DEPTH};
pub use registry::{ContentModel, ElementSpec, Particle, Term, TypeDefinition, TypeRegistry, TypeRef};
pub use report::{ErrorSource, Severity, ValidationError};
pub use sample::{EmitOptional, GeneratedInstance, GeneratorPolicy, SampleGenerator};

use xmlkit_syntax::types::QName;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("unresolved type reference {name}")]
    UnresolvedType { name: QName },
    #[error("unresolved element reference {name}")]
    UnresolvedElement { name: QName },
    #[error("unresolved attribute reference {name}")]
    UnresolvedAttribute { name: QName },
    #[error("unresolved group reference {name}")]
    UnresolvedGroup { name: QName },
    #[error("circular derivation involving {name}")]
    CircularDerivation { name: QName },
    #[error("circular model group reference {name}")]
    CircularGroup { name: QName },
    #[error("invalid derivation for {name}: {detail}")]
    InvalidDerivation { name: QName, detail: String },
    #[error("facet error on {type_name}: {source}")]
    Facet {
        type_name: String,
        #[source]
        source: datatype::FacetError,
    },
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}
