//! XML Digital Signatures: enveloped signing, verification, key
//! material handling and key generation.
//!
//! The signature profile is fixed to what the editor produces:
//! RSA-SHA256 over an exclusive-c14n reference covering the whole
//! document, with the enveloped-signature transform excluding the
//! `ds:Signature` element itself.

pub mod c14n;
pub mod keygen;
pub mod keystore;
pub mod pem;
pub mod sign;
pub mod verify;

pub use keygen::{generate, GeneratedKeys};
pub use keystore::{load as load_keystore, KeyMaterial};
pub use sign::{sign_file, sign_str};
pub use verify::{verify_file, verify_str, VerifyFailure, VerifyOutcome};

pub const DS_NAMESPACE: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const ALGO_RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
pub const ALGO_DIGEST_SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
pub const ALGO_C14N_EXC: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
pub const ALGO_ENVELOPED: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("failed to access {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("XML parse error: {detail}")]
    Parse { detail: String },
    #[error("canonicalization failed: {detail}")]
    Canonicalization { detail: String },
    #[error("PEM error: {detail}")]
    Pem { detail: String },
    #[error("keystore error: {detail}")]
    Keystore { detail: String },
    #[error("keystore format {format} is not supported; convert to PKCS#12")]
    UnsupportedKeystore { format: String },
    #[error("cryptographic failure: {detail}")]
    Crypto { detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::RsaPrivateKey;
    use std::sync::OnceLock;

    // Key generation dominates the suite's runtime; one shared key
    // exercises the same code path for every case.
    fn test_material() -> &'static KeyMaterial {
        static MATERIAL: OnceLock<KeyMaterial> = OnceLock::new();
        MATERIAL.get_or_init(|| {
            let keys = keygen::generate("sig-test", "pw", 2048, 7).expect("keygen");
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("key.pem");
            std::fs::write(
                &path,
                format!("{}{}", keys.private_key_pem, keys.certificate_pem),
            )
            .unwrap();
            keystore::load(&path, "pw", "any", "pw").expect("load generated key")
        })
    }

    const DOC: &str = r#"<invoice xmlns="urn:billing"><amount currency="EUR">42.00</amount><due>2026-01-01</due></invoice>"#;

    #[test]
    fn sign_then_verify_round_trips() {
        let material = test_material();
        let signed = sign_str(DOC, &material).expect("sign");
        assert!(signed.contains("<ds:Signature"));
        let outcome = verify_str(&signed, None).expect("verify runs");
        assert!(outcome.valid, "reason: {:?}", outcome.reason);
    }

    #[test]
    fn tampering_content_fails_with_reference_mismatch() {
        let material = test_material();
        let signed = sign_str(DOC, &material).expect("sign");
        let tampered = signed.replace("42.00", "43.00");
        assert_ne!(signed, tampered);
        let outcome = verify_str(&tampered, None).expect("verify runs");
        assert!(!outcome.valid);
        assert_eq!(outcome.reason, Some(VerifyFailure::ReferenceMismatch));
    }

    #[test]
    fn unsigned_document_reports_no_signature() {
        let outcome = verify_str(DOC, None).expect("verify runs");
        assert!(!outcome.valid);
        assert_eq!(outcome.reason, Some(VerifyFailure::NoSignature));
    }

    #[test]
    fn tampered_signature_value_is_a_crypto_failure() {
        let material = test_material();
        let signed = sign_str(DOC, &material).expect("sign");
        // Corrupt a byte inside the SignatureValue text.
        let idx = signed.find("<ds:SignatureValue>").unwrap() + "<ds:SignatureValue>".len();
        let mut bytes = signed.into_bytes();
        bytes[idx] = if bytes[idx] == b'A' { b'B' } else { b'A' };
        let corrupted = String::from_utf8(bytes).unwrap();
        let outcome = verify_str(&corrupted, None).expect("verify runs");
        assert!(!outcome.valid);
        assert!(matches!(outcome.reason, Some(VerifyFailure::CryptoFailure(_))));
    }

    #[test]
    fn resigning_replaces_the_previous_signature() {
        let material = test_material();
        let once = sign_str(DOC, &material).expect("sign");
        let twice = sign_str(&once, &material).expect("re-sign");
        assert_eq!(twice.matches("<ds:Signature ").count(), 1);
        assert!(verify_str(&twice, None).unwrap().valid);
    }

    #[test]
    fn private_key_is_a_real_rsa_key() {
        let material = test_material();
        let _: &RsaPrivateKey = &material.private_key;
        assert!(material.certificate_der.is_some());
    }
}
