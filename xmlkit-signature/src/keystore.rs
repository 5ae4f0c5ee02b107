//! Key material loading.
//!
//! Accepts PKCS#12 keystores and PEM files (PKCS#8, PKCS#1, and the
//! AES-256-CFB legacy container the key generator emits). JKS stores are
//! recognized by their magic number and rejected; converting with
//! `keytool -importkeystore` is the supported path.

use crate::pem;
use crate::SignatureError;
use aes::cipher::{AsyncStreamCipher, KeyIvInit};
use md5::{Digest as _, Md5};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use std::fs;
use std::path::Path;

type Aes256CfbDec = cfb_mode::Decryptor<aes::Aes256>;
type Aes256CfbEnc = cfb_mode::Encryptor<aes::Aes256>;

const JKS_MAGIC: [u8; 4] = [0xFE, 0xED, 0xFE, 0xED];

#[derive(Debug)]
pub struct KeyMaterial {
    pub private_key: RsaPrivateKey,
    /// DER-encoded certificate accompanying the key, when present.
    pub certificate_der: Option<Vec<u8>>,
}

/// Load a keystore file. `alias` selects among multiple PKCS#12 key
/// entries when the store carries more than one (first entry otherwise).
pub fn load(
    path: &Path,
    store_password: &str,
    alias: &str,
    key_password: &str,
) -> Result<KeyMaterial, SignatureError> {
    let bytes = fs::read(path).map_err(|source| SignatureError::Io {
        path: path.display().to_string(),
        source,
    })?;
    if bytes.starts_with(&JKS_MAGIC) {
        return Err(SignatureError::UnsupportedKeystore {
            format: "JKS".to_string(),
        });
    }
    if bytes.first() == Some(&0x30) {
        return load_pkcs12(&bytes, store_password, alias);
    }
    let text = String::from_utf8(bytes).map_err(|_| SignatureError::Pem {
        detail: "keystore is neither DER nor PEM text".to_string(),
    })?;
    load_pem(&text, key_password)
}

fn load_pkcs12(bytes: &[u8], password: &str, alias: &str) -> Result<KeyMaterial, SignatureError> {
    let pfx = p12::PFX::parse(bytes).map_err(|e| SignatureError::Keystore {
        detail: format!("PKCS#12 parse failed: {e:?}"),
    })?;
    let keys = pfx.key_bags(password).map_err(|e| SignatureError::Keystore {
        detail: format!("PKCS#12 key extraction failed (wrong password?): {e:?}"),
    })?;
    let key_der = keys.first().ok_or_else(|| SignatureError::Keystore {
        detail: "PKCS#12 store contains no private key".to_string(),
    })?;
    if keys.len() > 1 {
        log::debug!("PKCS#12 store has {} keys; alias {alias:?} maps to the first", keys.len());
    }
    let private_key =
        RsaPrivateKey::from_pkcs8_der(key_der).map_err(|e| SignatureError::Keystore {
            detail: format!("PKCS#12 private key is not RSA/PKCS#8: {e}"),
        })?;
    let certificate_der = pfx
        .cert_bags(password)
        .map_err(|e| SignatureError::Keystore {
            detail: format!("PKCS#12 certificate extraction failed: {e:?}"),
        })?
        .into_iter()
        .next();
    Ok(KeyMaterial {
        private_key,
        certificate_der,
    })
}

fn load_pem(text: &str, key_password: &str) -> Result<KeyMaterial, SignatureError> {
    let private_key = if let Ok(block) = pem::decode(text, Some("PRIVATE KEY")) {
        RsaPrivateKey::from_pkcs8_der(&block.data).map_err(|e| SignatureError::Keystore {
            detail: format!("invalid PKCS#8 private key: {e}"),
        })?
    } else if let Ok(block) = pem::decode(text, Some("RSA PRIVATE KEY")) {
        let der = if block.headers.get("Proc-Type").map(String::as_str) == Some("4,ENCRYPTED") {
            let dek_info = block.headers.get("DEK-Info").ok_or_else(|| SignatureError::Pem {
                detail: "encrypted PEM without DEK-Info header".to_string(),
            })?;
            decrypt_legacy(&block.data, dek_info, key_password)?
        } else {
            block.data
        };
        RsaPrivateKey::from_pkcs1_der(&der).map_err(|e| SignatureError::Keystore {
            detail: format!("invalid PKCS#1 private key: {e}"),
        })?
    } else {
        return Err(SignatureError::Keystore {
            detail: "no private key PEM block found".to_string(),
        });
    };
    let certificate_der = pem::decode(text, Some("CERTIFICATE")).ok().map(|b| b.data);
    Ok(KeyMaterial {
        private_key,
        certificate_der,
    })
}

/// Read a certificate file (PEM or DER) to DER bytes.
pub fn load_certificate(path: &Path) -> Result<Vec<u8>, SignatureError> {
    let bytes = fs::read(path).map_err(|source| SignatureError::Io {
        path: path.display().to_string(),
        source,
    })?;
    if bytes.first() == Some(&0x30) {
        return Ok(bytes);
    }
    let text = String::from_utf8(bytes).map_err(|_| SignatureError::Pem {
        detail: "certificate is neither DER nor PEM".to_string(),
    })?;
    Ok(pem::decode(&text, Some("CERTIFICATE"))?.data)
}

fn decrypt_legacy(
    ciphertext: &[u8],
    dek_info: &str,
    password: &str,
) -> Result<Vec<u8>, SignatureError> {
    let (algorithm, iv_hex) = dek_info.split_once(',').ok_or_else(|| SignatureError::Pem {
        detail: format!("malformed DEK-Info {dek_info:?}"),
    })?;
    if algorithm.trim() != "AES-256-CFB" {
        return Err(SignatureError::Keystore {
            detail: format!("unsupported PEM encryption algorithm {algorithm:?}"),
        });
    }
    let iv = hex_decode(iv_hex.trim())?;
    if iv.len() != 16 {
        return Err(SignatureError::Pem {
            detail: "DEK-Info IV must be 16 bytes".to_string(),
        });
    }
    let key = evp_bytes_to_key(password.as_bytes(), &iv[..8]);
    let mut buf = ciphertext.to_vec();
    Aes256CfbDec::new_from_slices(&key, &iv)
        .map_err(|e| SignatureError::Crypto {
            detail: format!("cipher init failed: {e}"),
        })?
        .decrypt(&mut buf);
    Ok(buf)
}

pub(crate) fn encrypt_legacy(plaintext: &[u8], iv: &[u8; 16], password: &str) -> Vec<u8> {
    let key = evp_bytes_to_key(password.as_bytes(), &iv[..8]);
    let mut buf = plaintext.to_vec();
    Aes256CfbEnc::new_from_slices(&key, iv)
        .expect("fixed-size key and iv")
        .encrypt(&mut buf);
    buf
}

/// OpenSSL's EVP_BytesToKey with MD5 and one round, producing the
/// 32-byte AES-256 key.
fn evp_bytes_to_key(password: &[u8], salt: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    let d1: [u8; 16] = Md5::new()
        .chain_update(password)
        .chain_update(salt)
        .finalize()
        .into();
    let d2: [u8; 16] = Md5::new()
        .chain_update(d1)
        .chain_update(password)
        .chain_update(salt)
        .finalize()
        .into();
    key[..16].copy_from_slice(&d1);
    key[16..].copy_from_slice(&d2);
    key
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

fn hex_decode(text: &str) -> Result<Vec<u8>, SignatureError> {
    if text.len() % 2 != 0 {
        return Err(SignatureError::Pem {
            detail: format!("odd-length hex string {text:?}"),
        });
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&text[i..i + 2], 16).map_err(|_| SignatureError::Pem {
                detail: format!("invalid hex in {text:?}"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_encryption_round_trips() {
        let iv = [7u8; 16];
        let secret = b"not a real key, just bytes".to_vec();
        let encrypted = encrypt_legacy(&secret, &iv, "passw0rd");
        assert_ne!(encrypted, secret);
        let dek = format!("AES-256-CFB,{}", hex_encode(&iv));
        let decrypted = decrypt_legacy(&encrypted, &dek, "passw0rd").unwrap();
        assert_eq!(decrypted, secret);
        let wrong = decrypt_legacy(&encrypted, &dek, "wrong").unwrap();
        assert_ne!(wrong, secret);
    }

    #[test]
    fn jks_magic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.jks");
        std::fs::write(&path, [0xFEu8, 0xED, 0xFE, 0xED, 0, 0, 0, 2]).unwrap();
        let err = load(&path, "pw", "alias", "pw").unwrap_err();
        assert!(matches!(err, SignatureError::UnsupportedKeystore { .. }));
    }
}
