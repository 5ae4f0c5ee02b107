//! Minimal PEM codec with encapsulated-header support.
//!
//! The standard pkcs8 PEM paths go through the `rsa` crate; this module
//! exists for the OpenSSL-style encrypted container (`Proc-Type` /
//! `DEK-Info` headers) that the key generator writes.

use crate::SignatureError;
use base64::Engine as _;
use std::collections::HashMap;

pub struct PemBlock {
    pub label: String,
    pub headers: HashMap<String, String>,
    pub data: Vec<u8>,
}

pub fn encode(label: &str, headers: &[(&str, &str)], data: &[u8]) -> String {
    let mut out = format!("-----BEGIN {label}-----\n");
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\n"));
    }
    if !headers.is_empty() {
        out.push('\n');
    }
    let b64 = base64::engine::general_purpose::STANDARD.encode(data);
    for chunk in b64.as_bytes().chunks(64) {
        out.push_str(std::str::from_utf8(chunk).expect("base64 is ascii"));
        out.push('\n');
    }
    out.push_str(&format!("-----END {label}-----\n"));
    out
}

/// Parse the first PEM block with the given label (any label when `None`).
pub fn decode(text: &str, label: Option<&str>) -> Result<PemBlock, SignatureError> {
    let mut lines = text.lines();
    let mut found_label = None;
    for line in lines.by_ref() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("-----BEGIN ") {
            if let Some(name) = rest.strip_suffix("-----") {
                if label.map(|l| l == name).unwrap_or(true) {
                    found_label = Some(name.to_string());
                    break;
                }
            }
        }
    }
    let Some(found_label) = found_label else {
        return Err(SignatureError::Pem {
            detail: match label {
                Some(label) => format!("no {label} PEM block found"),
                None => "no PEM block found".to_string(),
            },
        });
    };

    let mut headers = HashMap::new();
    let mut body = String::new();
    let mut in_headers = true;
    for line in lines {
        let line = line.trim();
        if line.starts_with("-----END ") {
            break;
        }
        if in_headers {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_string(), value.trim().to_string());
                continue;
            }
            in_headers = false;
            if line.is_empty() {
                continue;
            }
        }
        body.push_str(line);
    }

    let data = base64::engine::general_purpose::STANDARD
        .decode(body.as_bytes())
        .map_err(|e| SignatureError::Pem {
            detail: format!("invalid base64 in PEM body: {e}"),
        })?;
    Ok(PemBlock {
        label: found_label,
        headers,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_with_headers() {
        let text = encode(
            "RSA PRIVATE KEY",
            &[("Proc-Type", "4,ENCRYPTED"), ("DEK-Info", "AES-256-CFB,00ff")],
            b"secret-bytes",
        );
        let block = decode(&text, Some("RSA PRIVATE KEY")).unwrap();
        assert_eq!(block.label, "RSA PRIVATE KEY");
        assert_eq!(block.headers.get("Proc-Type").unwrap(), "4,ENCRYPTED");
        assert_eq!(block.data, b"secret-bytes");
    }

    #[test]
    fn round_trip_without_headers() {
        let text = encode("CERTIFICATE", &[], &[1, 2, 3, 4]);
        let block = decode(&text, None).unwrap();
        assert_eq!(block.label, "CERTIFICATE");
        assert_eq!(block.data, vec![1, 2, 3, 4]);
    }
}
