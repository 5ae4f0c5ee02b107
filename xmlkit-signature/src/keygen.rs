//! RSA key and self-signed certificate generation.
//!
//! Output formats match what the rest of the engine consumes: an
//! X.509 certificate as PEM and the private key as an AES-256-CFB
//! encrypted PKCS#1 PEM (OpenSSL legacy container).

use crate::keystore::{encrypt_legacy, hex_encode};
use crate::pem;
use crate::SignatureError;
use rand::RngCore;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::EncodePublicKey;
use rsa::RsaPrivateKey;
use sha2::Sha256;
use std::str::FromStr;
use std::time::Duration;
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::der::{Decode, Encode};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::Validity;

pub struct GeneratedKeys {
    /// AES-256-CFB encrypted PKCS#1 private key, PEM.
    pub private_key_pem: String,
    /// Self-signed certificate, PEM.
    pub certificate_pem: String,
}

fn crypto<E: std::fmt::Display>(e: E) -> SignatureError {
    SignatureError::Crypto {
        detail: e.to_string(),
    }
}

/// Generate an RSA keypair and a self-signed certificate for
/// `common_name`, valid for `days`. The private key PEM is encrypted
/// with `password`.
pub fn generate(
    common_name: &str,
    password: &str,
    bits: usize,
    days: u64,
) -> Result<GeneratedKeys, SignatureError> {
    let mut rng = rand::rngs::OsRng;
    let private_key = RsaPrivateKey::new(&mut rng, bits).map_err(crypto)?;
    let public_key = private_key.to_public_key();

    let subject = Name::from_str(&format!("CN={common_name}")).map_err(crypto)?;
    let serial = SerialNumber::from(rng.next_u32());
    let validity =
        Validity::from_now(Duration::from_secs(days * 24 * 60 * 60)).map_err(crypto)?;
    let spki_der = public_key.to_public_key_der().map_err(crypto)?;
    let spki = SubjectPublicKeyInfoOwned::from_der(spki_der.as_bytes()).map_err(crypto)?;

    let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(private_key.clone());
    let builder = CertificateBuilder::new(
        Profile::Root,
        serial,
        validity,
        subject,
        spki,
        &signer,
    )
    .map_err(crypto)?;
    let certificate = builder
        .build::<rsa::pkcs1v15::Signature>()
        .map_err(crypto)?;
    let cert_der = certificate.to_der().map_err(crypto)?;

    let key_der = private_key.to_pkcs1_der().map_err(crypto)?;
    let mut iv = [0u8; 16];
    rng.fill_bytes(&mut iv);
    let encrypted = encrypt_legacy(key_der.as_bytes(), &iv, password);
    let dek_info = format!("AES-256-CFB,{}", hex_encode(&iv));
    let private_key_pem = pem::encode(
        "RSA PRIVATE KEY",
        &[("Proc-Type", "4,ENCRYPTED"), ("DEK-Info", dek_info.as_str())],
        &encrypted,
    );
    let certificate_pem = pem::encode("CERTIFICATE", &[], &cert_der);

    log::debug!("generated {bits}-bit RSA key for CN={common_name}");
    Ok(GeneratedKeys {
        private_key_pem,
        certificate_pem,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_loads_back_through_the_keystore() {
        let keys = generate("unit-test", "pw", 2048, 30).expect("keygen");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.pem");
        std::fs::write(
            &path,
            format!("{}{}", keys.private_key_pem, keys.certificate_pem),
        )
        .unwrap();
        let material = crate::keystore::load(&path, "pw", "any", "pw").expect("load");
        assert!(material.certificate_der.is_some());
    }
}
