//! XML Encryption of assertions and attributes.
//!
//! Identity providers encrypt; this side exists so that test identity
//! providers and fixtures produce the exact structures the decrypter reads.

use base64::Engine;
use kc_crypto::{ContentEncryptionAlgorithm, KeyTransportAlgorithm, RsaEncryptionKey};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::{SamlError, SamlResult};
use crate::types::{
    digest_algorithms, mgf_algorithms, Assertion, Attribute, EncryptedAssertion,
    EncryptedAttribute, EncryptedData, EncryptedElement, EncryptedId, EncryptedKey,
    EncryptionMethod, KeyInfo, NameId, XMLENC_ELEMENT_TYPE, XS_NS,
};

/// Encrypts assertions for a recipient public key.
#[derive(Debug, Clone, Copy)]
pub struct Encrypter {
    key_transport: KeyTransportAlgorithm,
    content_encryption: ContentEncryptionAlgorithm,
}

impl Default for Encrypter {
    fn default() -> Self {
        Self::new()
    }
}

impl Encrypter {
    /// RSA-OAEP-MGF1P key transport with AES-256-GCM content encryption.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            key_transport: KeyTransportAlgorithm::RsaOaepMgf1p,
            content_encryption: ContentEncryptionAlgorithm::Aes256Gcm,
        }
    }

    /// Sets the key transport algorithm.
    #[must_use]
    pub const fn with_key_transport(mut self, algorithm: KeyTransportAlgorithm) -> Self {
        self.key_transport = algorithm;
        self
    }

    /// Sets the content encryption algorithm.
    #[must_use]
    pub const fn with_content_encryption(mut self, algorithm: ContentEncryptionAlgorithm) -> Self {
        self.content_encryption = algorithm;
        self
    }

    /// Encrypts an assertion.
    ///
    /// A signed assertion is encrypted as it was signed, so its signature
    /// survives the round trip.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Crypto`] if encryption fails.
    pub fn encrypt(
        &self,
        assertion: &Assertion,
        recipient: &RsaEncryptionKey,
    ) -> SamlResult<EncryptedAssertion> {
        let encrypted = self.encrypt_xml(&assertion.to_xml(), recipient)?;
        tracing::debug!(
            assertion_id = %assertion.id(),
            content_algorithm = self.content_encryption.uri(),
            "Assertion encrypted"
        );
        Ok(EncryptedAssertion { encrypted })
    }

    /// Encrypts an attribute.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Crypto`] if encryption fails.
    pub fn encrypt_attribute(
        &self,
        attribute: &Attribute,
        recipient: &RsaEncryptionKey,
    ) -> SamlResult<EncryptedAttribute> {
        let xml = attribute
            .to_element()
            .with_namespace_declaration("xs", XS_NS)
            .to_xml();
        Ok(EncryptedAttribute {
            encrypted: self.encrypt_xml(&xml, recipient)?,
        })
    }

    /// Encrypts a name identifier into a `saml:EncryptedID`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Crypto`] if encryption fails.
    pub fn encrypt_name_id(
        &self,
        name_id: &NameId,
        recipient: &RsaEncryptionKey,
    ) -> SamlResult<EncryptedId> {
        Ok(EncryptedId {
            encrypted: self.encrypt_xml(&name_id.to_element().to_xml(), recipient)?,
        })
    }

    fn encrypt_xml(&self, xml: &str, recipient: &RsaEncryptionKey) -> SamlResult<EncryptedElement> {
        let engine = base64::engine::general_purpose::STANDARD;
        let content_key = self.content_encryption.generate_key();
        let cipher_value = self.content_encryption.seal(&content_key, xml.as_bytes())?;
        let wrapped_key = recipient.wrap_key(self.key_transport, &content_key)?;

        let encrypted_key = EncryptedKey {
            id: Some(kc_crypto::generate_xml_id()),
            encryption_method: Some(self.key_transport_method()),
            cipher_value: engine.encode(wrapped_key),
            ..EncryptedKey::default()
        };

        Ok(EncryptedElement {
            encrypted_data: EncryptedData {
                id: Some(kc_crypto::generate_xml_id()),
                type_uri: Some(XMLENC_ELEMENT_TYPE.to_string()),
                encryption_method: Some(EncryptionMethod::new(self.content_encryption.uri())),
                key_info: Some(KeyInfo {
                    encrypted_keys: vec![encrypted_key],
                    ..KeyInfo::default()
                }),
                cipher_value: engine.encode(cipher_value),
            },
            encrypted_keys: Vec::new(),
        })
    }

    fn key_transport_method(&self) -> EncryptionMethod {
        let method = EncryptionMethod::new(self.key_transport.uri());
        match self.key_transport {
            KeyTransportAlgorithm::RsaOaepMgf1p => EncryptionMethod {
                digest_method: Some(digest_algorithms::SHA1.to_string()),
                ..method
            },
            KeyTransportAlgorithm::RsaOaepSha256 => EncryptionMethod {
                digest_method: Some(digest_algorithms::SHA256.to_string()),
                mgf: Some(mgf_algorithms::MGF1_SHA256.to_string()),
                ..method
            },
        }
    }
}

/// Extracts the RSA encryption key of a DER-encoded X.509 certificate.
///
/// # Errors
///
/// Returns [`SamlError::Configuration`] if the certificate or its key is invalid.
pub fn encryption_key_from_certificate_der(der: &[u8]) -> SamlResult<RsaEncryptionKey> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| SamlError::Configuration(format!("failed to parse certificate: {e}")))?;
    RsaEncryptionKey::from_spki_der(cert.public_key().raw)
        .map_err(|e| SamlError::Configuration(format!("invalid encryption key: {e}")))
}
