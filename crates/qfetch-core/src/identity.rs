//! Ephemeral TLS identity for the listener.
//!
//! A fresh key pair and self-signed certificate are generated on every start
//! and never written to disk. Nothing anchors this certificate, so a client
//! contacting the server for the first time gets no authenticity guarantee:
//! it either trusts on first use or pins the fingerprint the server logs at
//! startup.

use std::fmt;

use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
    KeyUsagePurpose, SerialNumber, PKCS_ECDSA_P256_SHA256,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use time::OffsetDateTime;

use crate::constants::{CERT_ORGANIZATION, CERT_VALIDITY, SERVER_NAME};
use crate::error::{Error, Result};

/// Server credential: certificate and PKCS#8 private key, both DER encoded.
#[derive(Clone)]
pub struct TlsIdentity {
    cert_der: Vec<u8>,
    key_der: Vec<u8>,
}

impl TlsIdentity {
    /// Certificate as a rustls type.
    pub fn certificate(&self) -> CertificateDer<'static> {
        CertificateDer::from(self.cert_der.clone())
    }

    /// Private key as a rustls type.
    pub fn private_key(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key_der.clone()))
    }

    /// Raw certificate bytes.
    pub fn cert_der(&self) -> &[u8] {
        &self.cert_der
    }

    /// SHA-256 of the certificate, lowercase hex.
    pub fn fingerprint(&self) -> String {
        to_hex(&cert_hash(&self.cert_der))
    }
}

impl fmt::Debug for TlsIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsIdentity")
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

/// Generate a fresh server identity.
///
/// ECDSA P-256 key, serial 1, subject `O=QUIC Server`, valid for one year from
/// now, usable for signatures and key encipherment, server authentication only.
pub fn provision_identity() -> Result<TlsIdentity> {
    let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).map_err(|e| {
        Error::Certificate {
            message: format!("failed to generate key pair: {}", e),
        }
    })?;

    let mut params =
        CertificateParams::new(vec![SERVER_NAME.to_string()]).map_err(|e| Error::Certificate {
            message: format!("invalid certificate parameters: {}", e),
        })?;

    let mut subject = DistinguishedName::new();
    subject.push(DnType::OrganizationName, CERT_ORGANIZATION);
    params.distinguished_name = subject;
    params.serial_number = Some(SerialNumber::from_slice(&[1]));

    let (not_before, not_after) = validity_window(OffsetDateTime::now_utc());
    params.not_before = not_before;
    params.not_after = not_after;

    params.key_usages = vec![
        KeyUsagePurpose::KeyEncipherment,
        KeyUsagePurpose::DigitalSignature,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| Error::Certificate {
            message: format!("failed to self-sign certificate: {}", e),
        })?;

    Ok(TlsIdentity {
        cert_der: cert.der().to_vec(),
        key_der: key_pair.serialize_der(),
    })
}

/// One calendar year starting at `now`. Feb 29 rolls to 365 days later.
fn validity_window(now: OffsetDateTime) -> (OffsetDateTime, OffsetDateTime) {
    let end = now
        .replace_year(now.year() + 1)
        .unwrap_or_else(|_| now + CERT_VALIDITY);
    (now, end)
}

/// Compute SHA-256 hash of certificate DER bytes.
pub fn cert_hash(cert_der: &[u8]) -> Vec<u8> {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(cert_der);
    hasher.finalize().to_vec()
}

/// Encode bytes as lowercase hex.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Decode a hex fingerprint. Colons are accepted as separators.
pub fn parse_fingerprint(s: &str) -> Result<Vec<u8>> {
    let digits: Vec<u8> = s.bytes().filter(|b| *b != b':').collect();
    if digits.is_empty() || digits.len() % 2 != 0 {
        return Err(Error::Config {
            message: format!("invalid fingerprint length: {}", s),
        });
    }

    digits
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|p| u8::from_str_radix(p, 16).ok())
                .ok_or_else(|| Error::Config {
                    message: format!("invalid hex in fingerprint: {}", s),
                })
        })
        .collect()
}
