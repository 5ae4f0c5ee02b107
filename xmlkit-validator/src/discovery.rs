//! Schema discovery from instance hints.
//!
//! When no explicit schema is supplied, `xsi:schemaLocation` and
//! `xsi:noNamespaceSchemaLocation` on the root element are honored;
//! relative locations resolve against the instance's parent URI.

use crate::Validator;
use std::fs;
use std::path::Path;
use url::Url;
use xmlkit_model::registry::TypeRegistry;
use xmlkit_model::report::ValidationError;
use xmlkit_model::ModelError;
use xmlkit_syntax::loader::Loader;
use xmlkit_syntax::types::XSI_NAMESPACE;
use xmlkit_syntax::SyntaxError;
use xmlparser::{ElementEnd, Token, Tokenizer};

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot resolve schema location {location:?}")]
    Location { location: String },
    #[error(transparent)]
    Schema(#[from] SyntaxError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Validate a file on disk. An explicit `schema` wins over instance
/// hints; with neither, only well-formedness is checked.
pub fn validate_file(
    xml_path: &Path,
    schema: Option<&Path>,
) -> Result<Vec<ValidationError>, DiscoveryError> {
    let text = fs::read_to_string(xml_path).map_err(|source| DiscoveryError::Io {
        path: xml_path.display().to_string(),
        source,
    })?;
    let base = xml_path
        .canonicalize()
        .ok()
        .and_then(|p| Url::from_file_path(p).ok());
    let file_name = xml_path.display().to_string();

    let registry = match schema {
        Some(path) => Some(load_registry(path)?),
        None => match schema_hint(&text) {
            Some(hint) => {
                let resolved = resolve_hint(&hint, base.as_ref())?;
                Some(load_registry(&resolved)?)
            }
            None => None,
        },
    };

    Ok(match &registry {
        Some(registry) => Validator::new(registry).file_name(file_name).validate(&text),
        None => Validator::wellformed_only().file_name(file_name).validate(&text),
    })
}

fn load_registry(path: &Path) -> Result<TypeRegistry, DiscoveryError> {
    let mut loader = Loader::fs();
    let doc = loader.load(path)?;
    Ok(TypeRegistry::from_document(&doc)?)
}

fn resolve_hint(
    hint: &str,
    base: Option<&Url>,
) -> Result<std::path::PathBuf, DiscoveryError> {
    let err = || DiscoveryError::Location {
        location: hint.to_string(),
    };
    match base {
        Some(base) => {
            let url = base.join(hint).map_err(|_| err())?;
            url.to_file_path().map_err(|()| err())
        }
        None => Ok(std::path::PathBuf::from(hint)),
    }
}

/// Extract the schema location hint from the root element, if any.
/// `xsi:schemaLocation` holds namespace/location pairs; the pair whose
/// namespace matches the root's default namespace wins, else the first.
pub fn schema_hint(xml: &str) -> Option<String> {
    let mut default_ns: Option<String> = None;
    let mut pairs: Option<String> = None;
    let mut no_ns: Option<String> = None;
    let mut xsi_prefixes: Vec<String> = vec![];
    let mut attrs: Vec<(String, String, String)> = vec![];

    for token in Tokenizer::from(xml) {
        match token.ok()? {
            Token::ElementStart { .. } => {}
            Token::Attribute { prefix, local, value, .. } => {
                let prefix = prefix.as_str();
                if prefix == "xmlns" && value.as_str() == XSI_NAMESPACE {
                    xsi_prefixes.push(local.as_str().to_string());
                } else if prefix.is_empty() && local.as_str() == "xmlns" {
                    default_ns = Some(value.as_str().to_string());
                }
                attrs.push((
                    prefix.to_string(),
                    local.as_str().to_string(),
                    value.as_str().to_string(),
                ));
            }
            Token::ElementEnd { end, .. } => match end {
                ElementEnd::Open | ElementEnd::Empty => break,
                ElementEnd::Close(..) => return None,
            },
            _ => {}
        }
    }

    for (prefix, local, value) in &attrs {
        if !xsi_prefixes.iter().any(|p| p == prefix) {
            continue;
        }
        match local.as_str() {
            "schemaLocation" => pairs = Some(value.clone()),
            "noNamespaceSchemaLocation" => no_ns = Some(value.clone()),
            _ => {}
        }
    }

    if let Some(location) = no_ns {
        return Some(location);
    }
    let pairs = pairs?;
    let tokens: Vec<&str> = pairs.split_whitespace().collect();
    let mut first = None;
    for chunk in tokens.chunks(2) {
        if let [ns, loc] = chunk {
            if first.is_none() {
                first = Some(loc.to_string());
            }
            if Some(*ns) == default_ns.as_deref() {
                return Some(loc.to_string());
            }
        }
    }
    first
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_namespace_hint_wins() {
        let xml = r#"<root xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
            xsi:noNamespaceSchemaLocation="local.xsd"/>"#;
        assert_eq!(schema_hint(xml).as_deref(), Some("local.xsd"));
    }

    #[test]
    fn schema_location_pair_matches_default_namespace() {
        let xml = r#"<root xmlns="urn:b" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
            xsi:schemaLocation="urn:a a.xsd urn:b b.xsd"/>"#;
        assert_eq!(schema_hint(xml).as_deref(), Some("b.xsd"));
    }

    #[test]
    fn absent_hint_is_none() {
        assert_eq!(schema_hint("<root/>"), None);
    }
}
