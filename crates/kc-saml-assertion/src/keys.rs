//! Decryption and verification keys and their resolution.
//!
//! Each identity provider is configured with an ordered list of private
//! keys for decrypting assertions and an ordered list of public keys for
//! verifying their signatures. Several keys are common during rollover;
//! the pipeline tries them in the configured order.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use kc_crypto::{RsaDecryptionKey, RsaEncryptionKey};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::config::IdentityProviderConfig;
use crate::error::{SamlError, SamlResult};

/// Private key used to unwrap content keys of encrypted assertions.
#[derive(Clone)]
pub struct DecryptionKey {
    name: Option<String>,
    key: Arc<RsaDecryptionKey>,
}

impl DecryptionKey {
    /// Wraps a decryption key.
    #[must_use]
    pub fn new(key: RsaDecryptionKey) -> Self {
        Self {
            name: None,
            key: Arc::new(key),
        }
    }

    /// Reads a PKCS#8 DER private key.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Configuration`] if the key is not an RSA key.
    pub fn from_pkcs8_der(der: &[u8]) -> SamlResult<Self> {
        RsaDecryptionKey::from_pkcs8(der)
            .map(Self::new)
            .map_err(|e| SamlError::Configuration(format!("invalid decryption key: {e}")))
    }

    /// Reads a PEM `PRIVATE KEY` block.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Configuration`] if the PEM or the key is invalid.
    pub fn from_pem(pem: &str) -> SamlResult<Self> {
        let der = pem_to_der(pem, "PRIVATE KEY").ok_or_else(|| {
            SamlError::Configuration("invalid private key PEM".to_string())
        })?;
        Self::from_pkcs8_der(&der)
    }

    /// Attaches a name used in logs.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name used in logs.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The public half, for encrypting to this key.
    #[must_use]
    pub fn encryption_key(&self) -> &RsaEncryptionKey {
        self.key.public_key()
    }

    pub(crate) fn rsa(&self) -> &RsaDecryptionKey {
        &self.key
    }
}

impl fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionKey")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Public key used to verify assertion signatures.
///
/// Holds a DER-encoded PKCS#1 `RSAPublicKey`.
#[derive(Clone, PartialEq, Eq)]
pub struct VerificationKey {
    name: Option<String>,
    public_key_der: Vec<u8>,
}

impl VerificationKey {
    /// Creates a key from a DER-encoded PKCS#1 `RSAPublicKey`.
    #[must_use]
    pub fn from_rsa_public_key_der(der: impl Into<Vec<u8>>) -> Self {
        Self {
            name: None,
            public_key_der: der.into(),
        }
    }

    /// Extracts the public key of a DER-encoded X.509 certificate.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Configuration`] if the certificate cannot be parsed.
    pub fn from_certificate_der(der: &[u8]) -> SamlResult<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| SamlError::Configuration(format!("failed to parse certificate: {e}")))?;
        let public_key = cert.public_key().subject_public_key.data.to_vec();
        Ok(Self::from_rsa_public_key_der(public_key)
            .with_name(cert.subject().to_string()))
    }

    /// Extracts the public key of a PEM `CERTIFICATE` block.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Configuration`] if the PEM or certificate is invalid.
    pub fn from_certificate_pem(pem: &str) -> SamlResult<Self> {
        let der = pem_to_der(pem, "CERTIFICATE")
            .ok_or_else(|| SamlError::Configuration("invalid certificate PEM".to_string()))?;
        Self::from_certificate_der(&der)
    }

    /// Attaches a name used in logs.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name used in logs.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The DER-encoded PKCS#1 public key.
    #[must_use]
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_key_der
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("name", &self.name)
            .field("der_len", &self.public_key_der.len())
            .finish()
    }
}

/// Supplies the candidate keys for an identity provider.
///
/// Implementations may consult metadata or a key store; the order of the
/// returned keys is the order in which they are tried.
pub trait KeyResolver: Send + Sync {
    /// Private keys for decrypting assertions from this identity provider.
    fn decryption_keys(&self, idp: &IdentityProviderConfig) -> Vec<DecryptionKey>;

    /// Public keys for verifying signatures from this identity provider.
    fn verification_keys(&self, idp: &IdentityProviderConfig) -> Vec<VerificationKey>;
}

/// Resolves keys straight from the identity provider configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfiguredKeyResolver;

impl KeyResolver for ConfiguredKeyResolver {
    fn decryption_keys(&self, idp: &IdentityProviderConfig) -> Vec<DecryptionKey> {
        idp.decryption_keys.clone()
    }

    fn verification_keys(&self, idp: &IdentityProviderConfig) -> Vec<VerificationKey> {
        idp.verification_keys.clone()
    }
}

/// Extracts DER data from a PEM string.
pub(crate) fn pem_to_der(pem: &str, label: &str) -> Option<Vec<u8>> {
    let begin = format!("-----BEGIN {label}-----");
    let end = format!("-----END {label}-----");

    let start = pem.find(&begin)? + begin.len();
    let end_pos = pem.find(&end)?;
    if end_pos < start {
        return None;
    }

    let b64_data: String = pem[start..end_pos]
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    base64::engine::general_purpose::STANDARD.decode(b64_data).ok()
}
