//! Decryption of encrypted assertions, attributes and name identifiers.
//!
//! An encrypted element is opened by trying every configured private key of
//! the identity provider, in order, against every transported key of the
//! element. The first combination that yields well-formed plaintext of the
//! expected element type wins.

use std::sync::Arc;

use base64::Engine;
use kc_crypto::{ContentEncryptionAlgorithm, KeyTransportAlgorithm};

use crate::config::IdentityProviderConfig;
use crate::error::{SamlError, SamlResult};
use crate::keys::{ConfiguredKeyResolver, DecryptionKey, KeyResolver};
use crate::types::{
    digest_algorithms, mgf_algorithms, Assertion, AssertionElement, Attribute, AttributeStatement,
    EncryptedAssertion, EncryptedAttribute, EncryptedElement, EncryptedId, EncryptionMethod,
    NameId, Subject, SAML_NS, XMLENC_ELEMENT_TYPE,
};
use crate::xml::XmlElement;

/// Decrypts encrypted assertions and attributes.
#[derive(Clone)]
pub struct Decrypter {
    key_resolver: Arc<dyn KeyResolver>,
}

impl Default for Decrypter {
    fn default() -> Self {
        Self::new(Arc::new(ConfiguredKeyResolver))
    }
}

impl std::fmt::Debug for Decrypter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decrypter").finish_non_exhaustive()
    }
}

impl Decrypter {
    /// Creates a decrypter that obtains keys from the given resolver.
    #[must_use]
    pub fn new(key_resolver: Arc<dyn KeyResolver>) -> Self {
        Self { key_resolver }
    }

    /// Returns the plaintext assertion of an input element.
    ///
    /// Plaintext assertions are returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::UnsupportedAssertionType`] for elements that are
    /// neither kind of assertion, otherwise the errors of [`decrypt`](Self::decrypt).
    pub fn decrypt_element(
        &self,
        element: AssertionElement,
        idp: &IdentityProviderConfig,
    ) -> SamlResult<Assertion> {
        match element {
            AssertionElement::Assertion(assertion) => Ok(assertion),
            AssertionElement::EncryptedAssertion(encrypted) => self.decrypt(&encrypted, idp),
            AssertionElement::Unsupported { name } => {
                Err(SamlError::UnsupportedAssertionType { element: name })
            }
        }
    }

    /// Decrypts an encrypted assertion.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::DecryptionFailed`] if no configured key can
    /// decrypt the assertion, and [`SamlError::InvalidAssertion`] if the
    /// plaintext is not a usable assertion.
    pub fn decrypt(
        &self,
        encrypted: &EncryptedAssertion,
        idp: &IdentityProviderConfig,
    ) -> SamlResult<Assertion> {
        let element = self.open(&encrypted.encrypted, idp, "Assertion")?;
        let assertion = Assertion::from_element(element)?;
        tracing::debug!(
            assertion_id = %assertion.id(),
            idp = %idp.entity_id,
            "Assertion decrypted"
        );
        Ok(assertion)
    }

    /// Decrypts an encrypted attribute.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::DecryptionFailed`] if no configured key can
    /// decrypt the attribute.
    pub fn decrypt_attribute(
        &self,
        encrypted: &EncryptedAttribute,
        idp: &IdentityProviderConfig,
    ) -> SamlResult<Attribute> {
        let element = self.open(&encrypted.encrypted, idp, "Attribute")?;
        Attribute::from_element(&element)
    }

    /// Returns the statement with its encrypted attributes decrypted and
    /// appended to the plaintext ones.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::DecryptionFailed`] if any attribute cannot be
    /// decrypted.
    pub fn decrypt_attribute_statement(
        &self,
        statement: &AttributeStatement,
        idp: &IdentityProviderConfig,
    ) -> SamlResult<AttributeStatement> {
        let mut decrypted = AttributeStatement {
            attributes: statement.attributes.clone(),
            encrypted_attributes: Vec::new(),
        };
        for encrypted in &statement.encrypted_attributes {
            decrypted
                .attributes
                .push(self.decrypt_attribute(encrypted, idp)?);
        }
        Ok(decrypted)
    }

    /// Decrypts an encrypted name identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::DecryptionFailed`] if no configured key can
    /// decrypt it, and [`SamlError::InvalidAssertion`] if the plaintext is
    /// not a `saml:NameID`.
    pub fn decrypt_name_id(
        &self,
        encrypted: &EncryptedId,
        idp: &IdentityProviderConfig,
    ) -> SamlResult<NameId> {
        let element = self.open(&encrypted.encrypted, idp, "NameID")?;
        Ok(NameId::from_element(&element))
    }

    /// Returns the name identifier of a subject, decrypting it if the
    /// subject only carries an `EncryptedID`.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`decrypt_name_id`](Self::decrypt_name_id).
    pub fn subject_name_id(
        &self,
        subject: &Subject,
        idp: &IdentityProviderConfig,
    ) -> SamlResult<Option<NameId>> {
        match (&subject.name_id, &subject.encrypted_id) {
            (Some(name_id), _) => Ok(Some(name_id.clone())),
            (None, Some(encrypted)) => self.decrypt_name_id(encrypted, idp).map(Some),
            (None, None) => Ok(None),
        }
    }

    fn open(
        &self,
        encrypted: &EncryptedElement,
        idp: &IdentityProviderConfig,
        expected: &str,
    ) -> SamlResult<XmlElement> {
        let keys = self.key_resolver.decryption_keys(idp);
        if keys.is_empty() {
            return Err(SamlError::DecryptionFailed(format!(
                "no decryption keys configured for {}",
                idp.entity_id
            )));
        }

        let data = &encrypted.encrypted_data;
        if let Some(type_uri) = data.type_uri.as_deref() {
            if type_uri != XMLENC_ELEMENT_TYPE {
                return Err(SamlError::DecryptionFailed(format!(
                    "unsupported EncryptedData type: {type_uri}"
                )));
            }
        }
        let content_algorithm = data
            .encryption_method
            .as_ref()
            .and_then(|method| ContentEncryptionAlgorithm::from_uri(&method.algorithm))
            .ok_or_else(|| {
                SamlError::DecryptionFailed(format!(
                    "unsupported content encryption algorithm: {}",
                    data.encryption_method
                        .as_ref()
                        .map_or("none", |method| method.algorithm.as_str())
                ))
            })?;
        let cipher_value = base64::engine::general_purpose::STANDARD
            .decode(&data.cipher_value)
            .map_err(|e| SamlError::DecryptionFailed(format!("invalid cipher value: {e}")))?;

        for (key_index, key) in keys.iter().enumerate() {
            for (transport_index, transported) in encrypted.candidate_keys().enumerate() {
                let Some(plaintext) = open_with(
                    key,
                    transported.encryption_method.as_ref(),
                    &transported.cipher_value,
                    content_algorithm,
                    &cipher_value,
                ) else {
                    tracing::debug!(
                        key_index,
                        key = key.name().unwrap_or("unnamed"),
                        transport_index,
                        "Decryption key did not open element"
                    );
                    continue;
                };

                let element = XmlElement::parse(&plaintext).map_err(|e| {
                    SamlError::InvalidAssertion(format!("decrypted content is not XML: {e}"))
                })?;
                if !element.is(SAML_NS, expected) {
                    return Err(SamlError::InvalidAssertion(format!(
                        "decrypted element is {}, expected {expected}",
                        element.qualified_name()
                    )));
                }
                tracing::debug!(key_index, transport_index, element = expected, "Element decrypted");
                return Ok(element);
            }
        }

        tracing::warn!(
            idp = %idp.entity_id,
            keys = keys.len(),
            element = expected,
            "No decryption key could open the encrypted element"
        );
        Err(SamlError::DecryptionFailed(format!(
            "none of the {} configured decryption keys could decrypt the {expected}",
            keys.len()
        )))
    }
}

/// Unwraps the content key with one private key and opens the payload.
fn open_with(
    key: &DecryptionKey,
    method: Option<&EncryptionMethod>,
    wrapped_key: &str,
    content_algorithm: ContentEncryptionAlgorithm,
    cipher_value: &[u8],
) -> Option<String> {
    let transport = key_transport(method?)?;
    let wrapped = base64::engine::general_purpose::STANDARD
        .decode(wrapped_key)
        .ok()?;
    let content_key = key.rsa().unwrap_key(transport, &wrapped).ok()?;
    if content_key.len() != content_algorithm.key_len() {
        return None;
    }
    let plaintext = content_algorithm.open(&content_key, cipher_value).ok()?;
    String::from_utf8(plaintext).ok()
}

/// Maps an `EncryptedKey` method to an OAEP variant.
///
/// `xmlenc11#rsa-oaep` defaults to SHA-1 and MGF1-SHA1 unless its digest and
/// mask generation function say otherwise.
fn key_transport(method: &EncryptionMethod) -> Option<KeyTransportAlgorithm> {
    let digest = method.digest_method.as_deref().unwrap_or(digest_algorithms::SHA1);
    let mgf = method.mgf.as_deref().unwrap_or(mgf_algorithms::MGF1_SHA1);

    match method.algorithm.as_str() {
        KeyTransportAlgorithm::RSA_OAEP_MGF1P_URI if digest == digest_algorithms::SHA1 => {
            Some(KeyTransportAlgorithm::RsaOaepMgf1p)
        }
        KeyTransportAlgorithm::RSA_OAEP_URI => match (digest, mgf) {
            (digest_algorithms::SHA1, mgf_algorithms::MGF1_SHA1) => {
                Some(KeyTransportAlgorithm::RsaOaepMgf1p)
            }
            (digest_algorithms::SHA256, mgf_algorithms::MGF1_SHA256) => {
                Some(KeyTransportAlgorithm::RsaOaepSha256)
            }
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encrypter::Encrypter;
    use crate::types::{Conditions, EncryptedKey};
    use kc_crypto::{KeySize, RsaDecryptionKey};

    fn generate_key(name: &str) -> DecryptionKey {
        DecryptionKey::new(RsaDecryptionKey::generate(KeySize::Rsa2048).unwrap()).with_name(name)
    }

    fn assertion() -> Assertion {
        Assertion::with_id("_enc", "https://idp.example.com")
            .with_conditions(Conditions::with_validity(5).with_audience("https://sp.example.com"))
    }

    #[test]
    fn decrypts_with_matching_key() {
        let key = generate_key("current");
        let original = assertion();
        let encrypted = Encrypter::new()
            .encrypt(&original, key.rsa().public_key())
            .unwrap();
        let idp = IdentityProviderConfig::new("https://idp.example.com").with_decryption_key(key);

        let decrypted = Decrypter::default().decrypt(&encrypted, &idp).unwrap();
        assert_eq!(decrypted.id(), "_enc");
        assert_eq!(decrypted.conditions(), original.conditions());
    }

    #[test]
    fn tries_every_configured_key() {
        let correct = generate_key("current");
        let encrypted = Encrypter::new()
            .encrypt(&assertion(), correct.rsa().public_key())
            .unwrap();
        let idp = IdentityProviderConfig::new("https://idp.example.com")
            .with_decryption_key(generate_key("old-1"))
            .with_decryption_key(generate_key("old-2"))
            .with_decryption_key(correct);

        let decrypted = Decrypter::default().decrypt(&encrypted, &idp).unwrap();
        assert_eq!(decrypted.issuer(), "https://idp.example.com");
    }

    #[test]
    fn fails_when_no_key_matches() {
        let encrypted = Encrypter::new()
            .encrypt(&assertion(), generate_key("idp-side").rsa().public_key())
            .unwrap();
        let idp = IdentityProviderConfig::new("https://idp.example.com")
            .with_decryption_key(generate_key("unrelated"));

        let result = Decrypter::default().decrypt(&encrypted, &idp);
        assert!(matches!(result, Err(SamlError::DecryptionFailed(_))));
    }

    #[test]
    fn fails_without_keys() {
        let encrypted = Encrypter::new()
            .encrypt(&assertion(), generate_key("idp-side").rsa().public_key())
            .unwrap();
        let idp = IdentityProviderConfig::new("https://idp.example.com");

        let result = Decrypter::default().decrypt(&encrypted, &idp);
        assert!(matches!(result, Err(SamlError::DecryptionFailed(msg)) if msg.contains("no decryption keys")));
    }

    #[test]
    fn sha256_oaep_round_trip() {
        let key = generate_key("current");
        let encrypted = Encrypter::new()
            .with_key_transport(KeyTransportAlgorithm::RsaOaepSha256)
            .with_content_encryption(ContentEncryptionAlgorithm::Aes128Gcm)
            .encrypt(&assertion(), key.rsa().public_key())
            .unwrap();
        let idp = IdentityProviderConfig::new("https://idp.example.com").with_decryption_key(key);

        assert!(Decrypter::default().decrypt(&encrypted, &idp).is_ok());
    }

    #[test]
    fn decrypts_encrypted_attributes() {
        let key = generate_key("current");
        let encrypted = Encrypter::new()
            .encrypt_attribute(&Attribute::single("ssn", "123"), key.rsa().public_key())
            .unwrap();
        let statement = AttributeStatement::new()
            .with_attribute(Attribute::single("mail", "a@b.c"))
            .with_encrypted_attribute(encrypted);
        let idp = IdentityProviderConfig::new("https://idp.example.com").with_decryption_key(key);

        let decrypted = Decrypter::default()
            .decrypt_attribute_statement(&statement, &idp)
            .unwrap();
        assert!(decrypted.encrypted_attributes.is_empty());
        assert_eq!(decrypted.attributes.len(), 2);
        assert_eq!(decrypted.attribute("ssn").unwrap().values[0].as_text(), Some("123"));
    }

    #[test]
    fn decrypts_encrypted_name_id() {
        let key = generate_key("current");
        let name_id = NameId::persistent("user-7");
        let subject = Subject::encrypted(
            Encrypter::new()
                .encrypt_name_id(&name_id, key.rsa().public_key())
                .unwrap(),
        );
        let idp = IdentityProviderConfig::new("https://idp.example.com")
            .with_decryption_key(generate_key("old"))
            .with_decryption_key(key);

        let decrypted = Decrypter::default().subject_name_id(&subject, &idp).unwrap();
        assert_eq!(decrypted, Some(name_id));
    }

    #[test]
    fn encrypted_name_id_needs_matching_key() {
        let encrypted = Encrypter::new()
            .encrypt_name_id(&NameId::persistent("user-7"), generate_key("idp-side").rsa().public_key())
            .unwrap();
        let idp = IdentityProviderConfig::new("https://idp.example.com")
            .with_decryption_key(generate_key("unrelated"));

        let result = Decrypter::default().subject_name_id(&Subject::encrypted(encrypted), &idp);
        assert!(matches!(result, Err(SamlError::DecryptionFailed(_))));
    }

    #[test]
    fn encrypted_assertion_is_not_a_name_id() {
        let key = generate_key("current");
        let encrypted = Encrypter::new()
            .encrypt(&assertion(), key.rsa().public_key())
            .unwrap();
        let disguised = EncryptedId {
            encrypted: encrypted.encrypted,
        };
        let idp = IdentityProviderConfig::new("https://idp.example.com").with_decryption_key(key);

        let result = Decrypter::default().decrypt_name_id(&disguised, &idp);
        assert!(matches!(result, Err(SamlError::InvalidAssertion(msg)) if msg.contains("expected NameID")));
    }

    #[test]
    fn plaintext_element_is_returned_unchanged() {
        let plain = Assertion::from_xml(&assertion().to_xml()).unwrap();
        let idp = IdentityProviderConfig::new("https://idp.example.com");
        let decrypter = Decrypter::default();

        let once = decrypter
            .decrypt_element(AssertionElement::Assertion(plain.clone()), &idp)
            .unwrap();
        let twice = decrypter
            .decrypt_element(AssertionElement::Assertion(once.clone()), &idp)
            .unwrap();
        assert_eq!(once, plain);
        assert_eq!(twice, once);
    }

    #[test]
    fn unsupported_element_is_rejected() {
        let idp = IdentityProviderConfig::new("https://idp.example.com");
        let err = Decrypter::default()
            .decrypt_element(
                AssertionElement::Unsupported {
                    name: "samlp:Response".to_string(),
                },
                &idp,
            )
            .unwrap_err();
        assert!(matches!(err, SamlError::UnsupportedAssertionType { .. }));
    }

    #[test]
    fn key_transport_defaults() {
        let mgf1p = EncryptionMethod::new(KeyTransportAlgorithm::RSA_OAEP_MGF1P_URI);
        assert_eq!(key_transport(&mgf1p), Some(KeyTransportAlgorithm::RsaOaepMgf1p));

        let oaep = EncryptionMethod::new(KeyTransportAlgorithm::RSA_OAEP_URI);
        assert_eq!(key_transport(&oaep), Some(KeyTransportAlgorithm::RsaOaepMgf1p));

        let mixed = EncryptionMethod {
            digest_method: Some(digest_algorithms::SHA256.to_string()),
            ..oaep
        };
        assert_eq!(key_transport(&mixed), None);

        let pkcs1 = EncryptionMethod::new("http://www.w3.org/2001/04/xmlenc#rsa-1_5");
        assert_eq!(key_transport(&pkcs1), None);
    }

    #[test]
    fn missing_key_transport_method_is_skipped() {
        let key = generate_key("current");
        let mut encrypted = Encrypter::new()
            .encrypt(&assertion(), key.rsa().public_key())
            .unwrap();
        if let Some(info) = encrypted.encrypted.encrypted_data.key_info.as_mut() {
            info.encrypted_keys = vec![EncryptedKey {
                encryption_method: None,
                ..info.encrypted_keys[0].clone()
            }];
        }
        let idp = IdentityProviderConfig::new("https://idp.example.com").with_decryption_key(key);

        assert!(matches!(
            Decrypter::default().decrypt(&encrypted, &idp),
            Err(SamlError::DecryptionFailed(_))
        ));
    }
}
