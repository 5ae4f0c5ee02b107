//! Enveloped signature creation.
//!
//! The reference covers the whole document (`URI=""`) with the
//! enveloped-signature and exclusive-c14n transforms, digested with
//! SHA-256 and signed RSA-PKCS#1v1.5. The `ds:Signature` element is
//! appended to the document root and the document is serialized without
//! re-indentation so the digested octets stay untouched.

use crate::c14n::canonicalize;
use crate::keystore::KeyMaterial;
use crate::{SignatureError, ALGO_C14N_EXC, ALGO_DIGEST_SHA256, ALGO_ENVELOPED, ALGO_RSA_SHA256, DS_NAMESPACE};
use base64::Engine as _;
use rsa::signature::{SignatureEncoding, Signer};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use xot::Xot;

/// Sign `xml` and return the serialized document with the enveloped
/// `ds:Signature` appended to the root element.
pub fn sign_str(xml: &str, material: &KeyMaterial) -> Result<String, SignatureError> {
    let mut xot = Xot::new();
    let doc = xot.parse(xml).map_err(|e| SignatureError::Parse {
        detail: e.to_string(),
    })?;
    let root = xot.document_element(doc).map_err(|e| SignatureError::Parse {
        detail: e.to_string(),
    })?;

    // Re-signing replaces any previous signature.
    let existing: Vec<xot::Node> = xot
        .children(root)
        .filter(|&child| is_signature_element(&xot, child))
        .collect();
    for node in existing {
        xot.detach(node).map_err(|e| SignatureError::Parse {
            detail: e.to_string(),
        })?;
    }

    let digest = Sha256::digest(canonicalize(&xot, doc, None)?);
    let digest_b64 = base64::engine::general_purpose::STANDARD.encode(digest);

    let signed_info = canonical_signed_info(&digest_b64);
    let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new(material.private_key.clone());
    let signature = signing_key.sign(signed_info.as_bytes()).to_vec();
    let signature_b64 = base64::engine::general_purpose::STANDARD.encode(signature);
    let certificate_b64 = material
        .certificate_der
        .as_ref()
        .map(|der| base64::engine::general_purpose::STANDARD.encode(der));

    append_signature(&mut xot, root, &digest_b64, &signature_b64, certificate_b64.as_deref())?;

    xot.to_string(doc).map_err(|e| SignatureError::Parse {
        detail: e.to_string(),
    })
}

/// Sign the file at `input` with keys from `keystore`, writing the
/// signed document to `output`.
#[allow(clippy::too_many_arguments)]
pub fn sign_file(
    input: &Path,
    keystore: &Path,
    store_password: &str,
    alias: &str,
    key_password: &str,
    output: &Path,
) -> Result<(), SignatureError> {
    let xml = fs::read_to_string(input).map_err(|source| SignatureError::Io {
        path: input.display().to_string(),
        source,
    })?;
    let material = crate::keystore::load(keystore, store_password, alias, key_password)?;
    let signed = sign_str(&xml, &material)?;
    fs::write(output, signed).map_err(|source| SignatureError::Io {
        path: output.display().to_string(),
        source,
    })
}

pub(crate) fn is_signature_element(xot: &Xot, node: xot::Node) -> bool {
    let Some(element) = xot.element(node) else {
        return false;
    };
    let name = element.name();
    xot.local_name_str(name) == "Signature"
        && xot.namespace_str(xot.namespace_for_name(name)) == DS_NAMESPACE
}

/// The canonical form of SignedInfo is built directly: every element in
/// the ds namespace, the prefix declared on the outermost element,
/// attributes already in canonical order, no self-closing tags.
pub(crate) fn canonical_signed_info(digest_b64: &str) -> String {
    format!(
        concat!(
            "<ds:SignedInfo xmlns:ds=\"{ns}\">",
            "<ds:CanonicalizationMethod Algorithm=\"{c14n}\"></ds:CanonicalizationMethod>",
            "<ds:SignatureMethod Algorithm=\"{sig}\"></ds:SignatureMethod>",
            "<ds:Reference URI=\"\">",
            "<ds:Transforms>",
            "<ds:Transform Algorithm=\"{env}\"></ds:Transform>",
            "<ds:Transform Algorithm=\"{c14n}\"></ds:Transform>",
            "</ds:Transforms>",
            "<ds:DigestMethod Algorithm=\"{dig}\"></ds:DigestMethod>",
            "<ds:DigestValue>{value}</ds:DigestValue>",
            "</ds:Reference>",
            "</ds:SignedInfo>"
        ),
        ns = DS_NAMESPACE,
        c14n = ALGO_C14N_EXC,
        sig = ALGO_RSA_SHA256,
        env = ALGO_ENVELOPED,
        dig = ALGO_DIGEST_SHA256,
        value = digest_b64,
    )
}

fn append_signature(
    xot: &mut Xot,
    root: xot::Node,
    digest_b64: &str,
    signature_b64: &str,
    certificate_b64: Option<&str>,
) -> Result<(), SignatureError> {
    let parse_err = |e: xot::Error| SignatureError::Parse {
        detail: e.to_string(),
    };

    let ns = xot.add_namespace(DS_NAMESPACE);
    let prefix = xot.add_prefix("ds");
    let algorithm = xot.add_name("Algorithm");
    let uri = xot.add_name("URI");

    let element = |xot: &mut Xot, local: &str| {
        let name = xot.add_name_ns(local, ns);
        xot.new_element(name)
    };

    let signature = element(xot, "Signature");
    xot.namespaces_mut(signature).insert(prefix, ns);

    let signed_info = element(xot, "SignedInfo");
    let c14n_method = element(xot, "CanonicalizationMethod");
    xot.attributes_mut(c14n_method)
        .insert(algorithm, ALGO_C14N_EXC.to_string());
    let sig_method = element(xot, "SignatureMethod");
    xot.attributes_mut(sig_method)
        .insert(algorithm, ALGO_RSA_SHA256.to_string());
    let reference = element(xot, "Reference");
    xot.attributes_mut(reference).insert(uri, String::new());
    let transforms = element(xot, "Transforms");
    let transform_env = element(xot, "Transform");
    xot.attributes_mut(transform_env)
        .insert(algorithm, ALGO_ENVELOPED.to_string());
    let transform_c14n = element(xot, "Transform");
    xot.attributes_mut(transform_c14n)
        .insert(algorithm, ALGO_C14N_EXC.to_string());
    let digest_method = element(xot, "DigestMethod");
    xot.attributes_mut(digest_method)
        .insert(algorithm, ALGO_DIGEST_SHA256.to_string());
    let digest_value = element(xot, "DigestValue");
    let digest_text = xot.new_text(digest_b64);
    let signature_value = element(xot, "SignatureValue");
    let signature_text = xot.new_text(signature_b64);

    xot.append(signature, signed_info).map_err(parse_err)?;
    xot.append(signed_info, c14n_method).map_err(parse_err)?;
    xot.append(signed_info, sig_method).map_err(parse_err)?;
    xot.append(signed_info, reference).map_err(parse_err)?;
    xot.append(reference, transforms).map_err(parse_err)?;
    xot.append(transforms, transform_env).map_err(parse_err)?;
    xot.append(transforms, transform_c14n).map_err(parse_err)?;
    xot.append(reference, digest_method).map_err(parse_err)?;
    xot.append(reference, digest_value).map_err(parse_err)?;
    xot.append(digest_value, digest_text).map_err(parse_err)?;
    xot.append(signature, signature_value).map_err(parse_err)?;
    xot.append(signature_value, signature_text).map_err(parse_err)?;

    if let Some(cert) = certificate_b64 {
        let key_info = element(xot, "KeyInfo");
        let x509_data = element(xot, "X509Data");
        let x509_cert = element(xot, "X509Certificate");
        let cert_text = xot.new_text(cert);
        xot.append(signature, key_info).map_err(parse_err)?;
        xot.append(key_info, x509_data).map_err(parse_err)?;
        xot.append(x509_data, x509_cert).map_err(parse_err)?;
        xot.append(x509_cert, cert_text).map_err(parse_err)?;
    }

    xot.append(root, signature).map_err(parse_err)
}
