//! PEM and X.509 helpers for the bootstrap flow: render a public key the way
//! the control plane's OpenSSL-based parser expects it, and turn the returned
//! certificate material into verified certificate objects.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use rustls::pki_types::CertificateDer;
use thiserror::Error;
use x509_parser::prelude::*;

const OPENSSL_PUBLIC_KEY_BEGIN: &str = "-----BEGIN RSA PUBLIC KEY-----";
const OPENSSL_PUBLIC_KEY_END: &str = "-----END RSA PUBLIC KEY-----";
const PEM_LINE_LENGTH: usize = 64;

#[derive(Debug, Error)]
pub enum CertError {
    #[error("certificate parse error: {0}")]
    Parse(String),

    #[error("invalid PEM block: {0}")]
    Pem(String),
}

/// An X.509 certificate validated during parsing, kept as owned DER for TLS
/// use alongside the fields extracted from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCertificate {
    der: CertificateDer<'static>,
    pub subject: String,
    pub issuer: String,
    pub serial: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl ParsedCertificate {
    pub fn der(&self) -> &CertificateDer<'static> {
        &self.der
    }

    pub fn pem(&self) -> String {
        let mut out = String::from("-----BEGIN CERTIFICATE-----\n");
        out.push_str(&wrap_base64(self.der.as_ref()));
        out.push_str("\n-----END CERTIFICATE-----\n");
        out
    }
}

/// Render an SPKI DER public key as an OpenSSL-style PEM block. Line wrapping
/// must be exactly 64 characters or the control plane rejects the key.
pub fn encode_public_key_pem(der: &[u8]) -> String {
    let mut out = String::with_capacity(der.len() * 2);
    out.push_str(OPENSSL_PUBLIC_KEY_BEGIN);
    out.push('\n');
    out.push_str(&wrap_base64(der));
    out.push('\n');
    out.push_str(OPENSSL_PUBLIC_KEY_END);
    out.push('\n');
    out
}

/// Inverse of [`encode_public_key_pem`].
pub fn parse_public_key_pem(pem: &str) -> Result<Vec<u8>, CertError> {
    let body = pem
        .trim()
        .strip_prefix(OPENSSL_PUBLIC_KEY_BEGIN)
        .and_then(|rest| rest.strip_suffix(OPENSSL_PUBLIC_KEY_END))
        .ok_or_else(|| CertError::Pem("missing RSA PUBLIC KEY delimiters".into()))?;
    let joined: String = body.split_whitespace().collect();
    BASE64
        .decode(joined.as_bytes())
        .map_err(|e| CertError::Pem(format!("invalid base64 body: {}", e)))
}

/// Decode one X.509 certificate from PEM or raw DER bytes. The structure is
/// fully parsed so malformed control-plane responses fail here instead of at
/// handshake time.
pub fn parse_certificate(bytes: &[u8]) -> Result<ParsedCertificate, CertError> {
    let der = if bytes.starts_with(b"-----BEGIN") {
        first_pem_certificate(bytes)?
    } else {
        CertificateDer::from(bytes.to_vec())
    };

    let (rest, cert) = X509Certificate::from_der(der.as_ref())
        .map_err(|e| CertError::Parse(format!("{:?}", e)))?;
    if !rest.is_empty() {
        return Err(CertError::Parse(format!(
            "{} trailing bytes after certificate",
            rest.len()
        )));
    }

    let subject = cert.subject().to_string();
    let issuer = cert.issuer().to_string();
    let serial = hex::encode(cert.raw_serial());
    let not_before = DateTime::from_timestamp(cert.validity().not_before.timestamp(), 0)
        .ok_or_else(|| CertError::Parse("notBefore out of range".into()))?;
    let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
        .ok_or_else(|| CertError::Parse("notAfter out of range".into()))?;

    Ok(ParsedCertificate {
        der,
        subject,
        issuer,
        serial,
        not_before,
        not_after,
    })
}

fn first_pem_certificate(bytes: &[u8]) -> Result<CertificateDer<'static>, CertError> {
    rustls_pemfile::certs(&mut &bytes[..])
        .next()
        .ok_or_else(|| CertError::Pem("no CERTIFICATE block found".into()))?
        .map_err(|e| CertError::Pem(format!("{}", e)))
}

fn wrap_base64(der: &[u8]) -> String {
    let encoded = BASE64.encode(der);
    let mut wrapped = String::with_capacity(encoded.len() + encoded.len() / PEM_LINE_LENGTH + 1);
    for (i, c) in encoded.chars().enumerate() {
        if i > 0 && i % PEM_LINE_LENGTH == 0 {
            wrapped.push('\n');
        }
        wrapped.push(c);
    }
    wrapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DnType, KeyPair};

    fn test_cert(common_name: &str) -> (String, Vec<u8>) {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec![]).unwrap();
        params
            .distinguished_name
            .push(DnType::CommonName, common_name);
        let cert = params.self_signed(&key).unwrap();
        (cert.pem(), cert.der().as_ref().to_vec())
    }

    #[test]
    fn test_public_key_pem_layout() {
        let key = KeyPair::generate().unwrap();
        let pem = encode_public_key_pem(&key.public_key_der());

        let lines: Vec<&str> = pem.lines().collect();
        assert_eq!(lines.first(), Some(&OPENSSL_PUBLIC_KEY_BEGIN));
        assert_eq!(lines.last(), Some(&OPENSSL_PUBLIC_KEY_END));
        assert!(pem.ends_with('\n'));

        let body = &lines[1..lines.len() - 1];
        assert!(!body.is_empty());
        for line in &body[..body.len() - 1] {
            assert_eq!(line.len(), PEM_LINE_LENGTH);
        }
        assert!(body[body.len() - 1].len() <= PEM_LINE_LENGTH);
    }

    #[test]
    fn test_public_key_pem_roundtrip() {
        let key = KeyPair::generate().unwrap();
        let der = key.public_key_der();
        let decoded = parse_public_key_pem(&encode_public_key_pem(&der)).unwrap();
        assert_eq!(decoded, der);
    }

    #[test]
    fn test_parse_public_key_pem_rejects_garbage() {
        assert!(parse_public_key_pem("not a pem block").is_err());
        assert!(
            parse_public_key_pem(
                "-----BEGIN RSA PUBLIC KEY-----\n@@@@\n-----END RSA PUBLIC KEY-----"
            )
            .is_err()
        );
    }

    #[test]
    fn test_parse_certificate_from_der() {
        let (_, der) = test_cert("db.internal");
        let cert = parse_certificate(&der).unwrap();
        assert!(cert.subject.contains("db.internal"));
        assert_eq!(cert.der().as_ref(), der.as_slice());
        assert!(cert.not_after > cert.not_before);
        assert!(!cert.serial.is_empty());
    }

    #[test]
    fn test_parse_certificate_from_pem() {
        let (pem, der) = test_cert("client-0");
        let cert = parse_certificate(pem.as_bytes()).unwrap();
        assert_eq!(cert.der().as_ref(), der.as_slice());
    }

    #[test]
    fn test_parse_certificate_pem_roundtrip() {
        let (pem, _) = test_cert("roundtrip");
        let cert = parse_certificate(pem.as_bytes()).unwrap();
        let reparsed = parse_certificate(cert.pem().as_bytes()).unwrap();
        assert_eq!(cert, reparsed);
    }

    #[test]
    fn test_parse_certificate_rejects_malformed_input() {
        assert!(parse_certificate(b"definitely not DER").is_err());
        assert!(parse_certificate(b"").is_err());
        assert!(parse_certificate(b"-----BEGIN CERTIFICATE-----\nzzzz\n").is_err());

        let (_, mut der) = test_cert("truncated");
        der.truncate(der.len() / 2);
        assert!(parse_certificate(&der).is_err());
    }
}
