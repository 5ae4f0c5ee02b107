//! Enveloped signature verification.
//!
//! Verification is two-stage: the reference digest over the document
//! minus the signature, then the RSA signature over the canonical
//! SignedInfo. The outcome is a value, not an error; only unreadable
//! input surfaces as `Err`.

use crate::c14n::canonicalize;
use crate::sign::is_signature_element;
use crate::{SignatureError, DS_NAMESPACE};
use base64::Engine as _;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use x509_cert::der::Decode;
use x509_cert::Certificate;
use xot::Xot;

#[derive(PartialEq, Eq, Clone, Debug)]
pub enum VerifyFailure {
    /// No `ds:Signature` element under the document root.
    NoSignature,
    /// The document content does not match the signed digest.
    ReferenceMismatch,
    /// Key, certificate or signature-value failure.
    CryptoFailure(String),
}

#[derive(Debug)]
pub struct VerifyOutcome {
    pub valid: bool,
    pub reason: Option<VerifyFailure>,
}

impl VerifyOutcome {
    fn ok() -> VerifyOutcome {
        VerifyOutcome {
            valid: true,
            reason: None,
        }
    }

    fn failed(reason: VerifyFailure) -> VerifyOutcome {
        VerifyOutcome {
            valid: false,
            reason: Some(reason),
        }
    }
}

/// Verify the enveloped signature of the file at `path`. A trusted
/// certificate overrides the one embedded in `ds:KeyInfo`.
pub fn verify_file(path: &Path, trust: Option<&Path>) -> Result<VerifyOutcome, SignatureError> {
    let xml = fs::read_to_string(path).map_err(|source| SignatureError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let trust_der = trust.map(crate::keystore::load_certificate).transpose()?;
    verify_str(&xml, trust_der.as_deref())
}

pub fn verify_str(xml: &str, trust_der: Option<&[u8]>) -> Result<VerifyOutcome, SignatureError> {
    let mut xot = Xot::new();
    let doc = xot.parse(xml).map_err(|e| SignatureError::Parse {
        detail: e.to_string(),
    })?;
    let root = xot.document_element(doc).map_err(|e| SignatureError::Parse {
        detail: e.to_string(),
    })?;

    let Some(signature) = find_signature(&xot, root) else {
        return Ok(VerifyOutcome::failed(VerifyFailure::NoSignature));
    };
    let Some(signed_info) = find_ds_child(&xot, signature, "SignedInfo") else {
        return Ok(VerifyOutcome::failed(VerifyFailure::CryptoFailure(
            "signature has no SignedInfo".to_string(),
        )));
    };
    let Some(digest_value) = find_ds_descendant(&xot, signed_info, "DigestValue") else {
        return Ok(VerifyOutcome::failed(VerifyFailure::CryptoFailure(
            "signature has no DigestValue".to_string(),
        )));
    };
    let Some(signature_value) = find_ds_child(&xot, signature, "SignatureValue") else {
        return Ok(VerifyOutcome::failed(VerifyFailure::CryptoFailure(
            "signature has no SignatureValue".to_string(),
        )));
    };

    let expected_digest = match decode_b64(&xot.string_value(digest_value)) {
        Ok(bytes) => bytes,
        Err(detail) => return Ok(VerifyOutcome::failed(VerifyFailure::CryptoFailure(detail))),
    };
    let signature_bytes = match decode_b64(&xot.string_value(signature_value)) {
        Ok(bytes) => bytes,
        Err(detail) => return Ok(VerifyOutcome::failed(VerifyFailure::CryptoFailure(detail))),
    };

    // Stage one: the reference digest over the enveloped-transformed,
    // canonicalized document.
    let actual_digest = Sha256::digest(canonicalize(&xot, doc, Some(signature))?);
    if actual_digest.as_slice() != expected_digest.as_slice() {
        return Ok(VerifyOutcome::failed(VerifyFailure::ReferenceMismatch));
    }

    // Stage two: the signature value over the canonical SignedInfo.
    let cert_der = match trust_der {
        Some(der) => der.to_vec(),
        None => {
            let Some(cert_node) = find_ds_descendant(&xot, signature, "X509Certificate") else {
                return Ok(VerifyOutcome::failed(VerifyFailure::CryptoFailure(
                    "no X509Certificate in signature and no truststore given".to_string(),
                )));
            };
            match decode_b64(&xot.string_value(cert_node)) {
                Ok(bytes) => bytes,
                Err(detail) => {
                    return Ok(VerifyOutcome::failed(VerifyFailure::CryptoFailure(detail)));
                }
            }
        }
    };
    let public_key = match public_key_from_cert(&cert_der) {
        Ok(key) => key,
        Err(detail) => return Ok(VerifyOutcome::failed(VerifyFailure::CryptoFailure(detail))),
    };

    let canonical_signed_info = canonicalize(&xot, signed_info, None)?;
    let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(public_key);
    let signature_value = match rsa::pkcs1v15::Signature::try_from(signature_bytes.as_slice()) {
        Ok(sig) => sig,
        Err(e) => {
            return Ok(VerifyOutcome::failed(VerifyFailure::CryptoFailure(
                e.to_string(),
            )));
        }
    };
    match verifying_key.verify(&canonical_signed_info, &signature_value) {
        Ok(()) => Ok(VerifyOutcome::ok()),
        Err(e) => Ok(VerifyOutcome::failed(VerifyFailure::CryptoFailure(
            e.to_string(),
        ))),
    }
}

fn public_key_from_cert(der: &[u8]) -> Result<RsaPublicKey, String> {
    let certificate = Certificate::from_der(der).map_err(|e| e.to_string())?;
    let spki = &certificate.tbs_certificate.subject_public_key_info;
    RsaPublicKey::from_pkcs1_der(spki.subject_public_key.raw_bytes()).map_err(|e| e.to_string())
}

fn decode_b64(text: &str) -> Result<Vec<u8>, String> {
    let stripped: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(stripped.as_bytes())
        .map_err(|e| format!("invalid base64: {e}"))
}

fn find_signature(xot: &Xot, root: xot::Node) -> Option<xot::Node> {
    // The enveloped signature is a direct child of the root in
    // well-formed documents, but a descendant search keeps us honest
    // about documents signed by other tools.
    fn walk(xot: &Xot, node: xot::Node) -> Option<xot::Node> {
        if is_signature_element(xot, node) {
            return Some(node);
        }
        for child in xot.children(node) {
            if let Some(found) = walk(xot, child) {
                return Some(found);
            }
        }
        None
    }
    xot.children(root).find_map(|c| walk(xot, c)).or_else(|| {
        if is_signature_element(xot, root) {
            Some(root)
        } else {
            None
        }
    })
}

fn is_ds_named(xot: &Xot, node: xot::Node, local: &str) -> bool {
    let Some(element) = xot.element(node) else {
        return false;
    };
    let name = element.name();
    xot.local_name_str(name) == local
        && xot.namespace_str(xot.namespace_for_name(name)) == DS_NAMESPACE
}

fn find_ds_child(xot: &Xot, parent: xot::Node, local: &str) -> Option<xot::Node> {
    xot.children(parent).find(|&c| is_ds_named(xot, c, local))
}

fn find_ds_descendant(xot: &Xot, parent: xot::Node, local: &str) -> Option<xot::Node> {
    for child in xot.children(parent) {
        if is_ds_named(xot, child, local) {
            return Some(child);
        }
        if let Some(found) = find_ds_descendant(xot, child, local) {
            return Some(found);
        }
    }
    None
}
