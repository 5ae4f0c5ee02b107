//! Exclusive XML canonicalization over a xot tree.
//!
//! Namespace declarations are emitted only where a prefix is visibly
//! utilized and not already rendered by an ancestor in the output, which
//! keeps the byte stream stable when a subtree (SignedInfo) is
//! canonicalized standalone. Comments and processing instructions are
//! omitted; both the signing and the verifying side run this same code,
//! so the reference digests agree on what the octet stream is.

use crate::SignatureError;
use std::collections::BTreeMap;
use xot::{Node, Value, Xot};

/// Canonicalize `node` (document or element), skipping the `exclude`
/// subtree (the enveloped-signature transform).
pub fn canonicalize(xot: &Xot, node: Node, exclude: Option<Node>) -> Result<Vec<u8>, SignatureError> {
    let mut out = Vec::new();
    let mut rendered: Vec<(String, String)> = Vec::new();
    write_node(xot, node, exclude, &mut rendered, &mut out)?;
    Ok(out)
}

fn write_node(
    xot: &Xot,
    node: Node,
    exclude: Option<Node>,
    rendered: &mut Vec<(String, String)>,
    out: &mut Vec<u8>,
) -> Result<(), SignatureError> {
    if Some(node) == exclude {
        return Ok(());
    }
    match xot.value(node) {
        Value::Document => {
            for child in xot.children(node) {
                write_node(xot, child, exclude, rendered, out)?;
            }
            Ok(())
        }
        Value::Element(element) => {
            let name = element.name();
            let (local, ns_uri) = name_parts(xot, name);
            let prefix = resolve_prefix(xot, node, &ns_uri)?;

            out.push(b'<');
            out.extend_from_slice(qualified(&prefix, &local).as_bytes());

            // Visibly utilized prefixes: the element's own plus every
            // prefixed attribute's.
            let mut visible: BTreeMap<String, String> = BTreeMap::new();
            if !ns_uri.is_empty() {
                visible.insert(prefix.clone(), ns_uri.clone());
            }
            let mut attrs: Vec<(String, String, String)> = Vec::new();
            for (attr_name, value) in xot.attributes(node).iter() {
                let (attr_local, attr_ns) = name_parts(xot, attr_name);
                let attr_prefix = if attr_ns.is_empty() {
                    String::new()
                } else {
                    let p = resolve_prefix(xot, node, &attr_ns)?;
                    visible.insert(p.clone(), attr_ns.clone());
                    p
                };
                let formatted = format_attr(&attr_prefix, &attr_local, value);
                attrs.push((attr_ns, attr_local, formatted));
            }

            // Namespace axis, sorted by prefix, skipping declarations an
            // ancestor already rendered.
            let mut emitted = 0;
            for (p, uri) in &visible {
                if uri.is_empty() {
                    continue;
                }
                if rendered.iter().rev().any(|(rp, ruri)| rp == p && ruri == uri) {
                    continue;
                }
                if p.is_empty() {
                    out.extend_from_slice(format!(" xmlns=\"{}\"", escape_attr(uri)).as_bytes());
                } else {
                    out.extend_from_slice(
                        format!(" xmlns:{}=\"{}\"", p, escape_attr(uri)).as_bytes(),
                    );
                }
                rendered.push((p.clone(), uri.clone()));
                emitted += 1;
            }

            // Attributes sorted by (namespace URI, local name).
            attrs.sort();
            for (_, _, formatted) in &attrs {
                out.extend_from_slice(formatted.as_bytes());
            }
            out.push(b'>');

            for child in xot.children(node) {
                write_node(xot, child, exclude, rendered, out)?;
            }

            out.extend_from_slice(format!("</{}>", qualified(&prefix, &local)).as_bytes());
            for _ in 0..emitted {
                rendered.pop();
            }
            Ok(())
        }
        Value::Text(text) => {
            out.extend_from_slice(escape_text(text.get()).as_bytes());
            Ok(())
        }
        Value::Comment(_) | Value::ProcessingInstruction(_) => Ok(()),
        _ => Ok(()),
    }
}

fn name_parts(xot: &Xot, name: xot::NameId) -> (String, String) {
    let local = xot.local_name_str(name).to_string();
    let ns = xot.namespace_for_name(name);
    let uri = xot.namespace_str(ns).to_string();
    (local, uri)
}

/// The prefix this canonicalization uses for a namespace: the nearest
/// in-scope declaration, alphabetically first when several map to the
/// same URI at the same depth.
fn resolve_prefix(xot: &Xot, node: Node, ns_uri: &str) -> Result<String, SignatureError> {
    if ns_uri.is_empty() {
        return Ok(String::new());
    }
    let mut current = Some(node);
    while let Some(n) = current {
        let mut candidates: Vec<String> = Vec::new();
        for (prefix_id, ns_id) in xot.namespaces(n).iter() {
            if xot.namespace_str(*ns_id) == ns_uri {
                candidates.push(xot.prefix_str(prefix_id).to_string());
            }
        }
        if !candidates.is_empty() {
            candidates.sort();
            return Ok(candidates.remove(0));
        }
        current = xot.parent(n);
    }
    Err(SignatureError::Canonicalization {
        detail: format!("no in-scope prefix for namespace {ns_uri:?}"),
    })
}

fn qualified(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{prefix}:{local}")
    }
}

fn format_attr(prefix: &str, local: &str, value: &str) -> String {
    format!(" {}=\"{}\"", qualified(prefix, local), escape_attr(value))
}

fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\r', "&#xD;")
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('"', "&quot;")
        .replace('\t', "&#x9;")
        .replace('\n', "&#xA;")
        .replace('\r', "&#xD;")
}
