//! XML Signature validation.
//!
//! Verifies the enveloped signature of an assertion against an ordered list
//! of candidate keys. Verification never fails hard: a missing, malformed or
//! non-verifying signature is reported through [`VerificationOutcome`] and
//! the caller decides whether that is fatal.

use base64::Engine;

use crate::error::{SamlError, SamlResult};
use crate::keys::VerificationKey;
use crate::types::{Assertion, XMLDSIG_NS};
use crate::xml::XmlElement;

use super::XmlSignature;

/// Result of verifying an assertion's signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    /// Whether a candidate key verified the signature.
    pub valid: bool,
    /// Index of the key that verified it.
    pub matched_key_index: Option<usize>,
    /// Why verification did not succeed.
    pub failure: Option<String>,
}

impl VerificationOutcome {
    fn verified(index: usize) -> Self {
        Self {
            valid: true,
            matched_key_index: Some(index),
            failure: None,
        }
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            matched_key_index: None,
            failure: Some(reason.into()),
        }
    }
}

/// Assertion signature validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureValidator {
    /// Whether to allow SHA-1 signatures and digests.
    allow_sha1: bool,
}

impl SignatureValidator {
    /// Creates a validator that rejects SHA-1.
    #[must_use]
    pub const fn new() -> Self {
        Self { allow_sha1: false }
    }

    /// Allows SHA-1 based signatures (not recommended).
    #[must_use]
    pub const fn allow_sha1(mut self, allow: bool) -> Self {
        self.allow_sha1 = allow;
        self
    }

    /// Verifies the assertion's signature with each key in order.
    ///
    /// The first key that verifies wins. Only assertions that still carry
    /// the element they were parsed from can be verified.
    #[must_use]
    pub fn verify(&self, assertion: &Assertion, keys: &[VerificationKey]) -> VerificationOutcome {
        let Some(source) = assertion.source_element() else {
            return VerificationOutcome::rejected("assertion was not read from signed XML");
        };
        let Some(signature_element) = source.child(XMLDSIG_NS, "Signature") else {
            return VerificationOutcome::rejected("assertion is not signed");
        };
        if keys.is_empty() {
            return VerificationOutcome::rejected("no verification keys configured");
        }

        match self.verify_element(assertion.id(), source, signature_element, keys) {
            Ok(index) => {
                tracing::debug!(
                    assertion_id = %assertion.id(),
                    key_index = index,
                    key = keys[index].name().unwrap_or("unnamed"),
                    "Assertion signature verified"
                );
                VerificationOutcome::verified(index)
            }
            Err(e) => {
                tracing::warn!(
                    assertion_id = %assertion.id(),
                    error = %e,
                    "Assertion signature rejected"
                );
                VerificationOutcome::rejected(e.to_string())
            }
        }
    }

    fn verify_element(
        &self,
        assertion_id: &str,
        source: &XmlElement,
        signature_element: &XmlElement,
        keys: &[VerificationKey],
    ) -> SamlResult<usize> {
        let signature = XmlSignature::from_element(signature_element)?;

        if !self.allow_sha1
            && (signature.algorithm.is_deprecated() || signature.digest_algorithm.is_deprecated())
        {
            return Err(SamlError::InvalidAssertion(
                "SHA-1 signatures are not allowed".to_string(),
            ));
        }

        // The reference must point at the enveloping assertion and nothing else.
        if signature.reference_uri.strip_prefix('#') != Some(assertion_id) {
            return Err(SamlError::InvalidAssertion(format!(
                "signature references '{}' instead of the assertion",
                signature.reference_uri
            )));
        }

        self.verify_digest(source, &signature)?;

        let signed_info = signature_element
            .required_child(XMLDSIG_NS, "SignedInfo")?
            .canonicalize_with_prefixes(&signature.signed_info_prefixes);
        let signature_bytes =
            base64::engine::general_purpose::STANDARD.decode(&signature.signature_value)?;

        for (index, key) in keys.iter().enumerate() {
            if kc_crypto::rsa_verify(
                key.public_key_der(),
                signed_info.as_bytes(),
                &signature_bytes,
                signature.algorithm.rsa(),
            ) {
                return Ok(index);
            }
            tracing::debug!(key_index = index, "Verification key did not match");
        }

        Err(SamlError::InvalidAssertion(
            "no configured key verified the signature".to_string(),
        ))
    }

    /// Verifies the reference digest over the assertion minus its signature.
    fn verify_digest(&self, source: &XmlElement, signature: &XmlSignature) -> SamlResult<()> {
        let expected = base64::engine::general_purpose::STANDARD
            .decode(&signature.digest_value)
            .map_err(|e| SamlError::InvalidAssertion(format!("invalid digest encoding: {e}")))?;

        let canonical = source
            .without_child(XMLDSIG_NS, "Signature")
            .canonicalize_with_prefixes(&signature.reference_prefixes);
        let calculated = kc_crypto::digest(signature.digest_algorithm.hash(), canonical.as_bytes());

        if calculated != expected {
            return Err(SamlError::InvalidAssertion("digest value mismatch".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{AssertionSigner, SignatureConfig};
    use crate::types::{Attribute, AttributeStatement, Conditions};
    use kc_crypto::{KeySize, RsaSigningKey};

    /// Assertions signed by an external tool, pretty-printed, with the
    /// signature value wrapped over several lines.
    const SHA1_SIGNED: &str = include_str!("testdata/sha1_signed.xml");
    const PRETTY_SIGNED: &str = include_str!("testdata/pretty_signed.xml");
    const FIXTURE_KEY_DER: &[u8] = include_bytes!("testdata/idp_public_key.der");

    fn fixture_key() -> VerificationKey {
        VerificationKey::from_rsa_public_key_der(FIXTURE_KEY_DER)
    }

    fn signed_assertion(signing_key: RsaSigningKey, config: SignatureConfig) -> Assertion {
        let assertion = Assertion::with_id("_signed", "https://idp.example.com")
            .with_conditions(Conditions::with_validity(5).with_audience("https://sp.example.com"))
            .with_attribute_statement(
                AttributeStatement::new().with_attribute(Attribute::single("mail", "a@b.c")),
            );
        AssertionSigner::new(signing_key)
            .with_config(config)
            .sign(&assertion)
            .unwrap()
    }

    fn key_for(signing_key: &RsaSigningKey) -> VerificationKey {
        VerificationKey::from_rsa_public_key_der(signing_key.public_key_der())
    }

    #[test]
    fn verifies_with_matching_key() {
        let signing_key = RsaSigningKey::generate(KeySize::Rsa2048).unwrap();
        let key = key_for(&signing_key);
        let assertion = signed_assertion(signing_key, SignatureConfig::default());

        let outcome = SignatureValidator::new().verify(&assertion, &[key]);
        assert!(outcome.valid, "{outcome:?}");
        assert_eq!(outcome.matched_key_index, Some(0));
    }

    #[test]
    fn tries_keys_in_order() {
        let signing_key = RsaSigningKey::generate(KeySize::Rsa2048).unwrap();
        let other_a = key_for(&RsaSigningKey::generate(KeySize::Rsa2048).unwrap());
        let other_b = key_for(&RsaSigningKey::generate(KeySize::Rsa2048).unwrap());
        let key = key_for(&signing_key);
        let assertion = signed_assertion(signing_key, SignatureConfig::default());

        let outcome = SignatureValidator::new().verify(&assertion, &[other_a, other_b, key]);
        assert!(outcome.valid);
        assert_eq!(outcome.matched_key_index, Some(2));
    }

    #[test]
    fn rejects_unknown_key() {
        let signing_key = RsaSigningKey::generate(KeySize::Rsa2048).unwrap();
        let other = key_for(&RsaSigningKey::generate(KeySize::Rsa2048).unwrap());
        let assertion = signed_assertion(signing_key, SignatureConfig::default());

        let outcome = SignatureValidator::new().verify(&assertion, &[other]);
        assert!(!outcome.valid);
        assert!(outcome.failure.unwrap().contains("no configured key"));
    }

    #[test]
    fn rejects_tampered_content() {
        let signing_key = RsaSigningKey::generate(KeySize::Rsa2048).unwrap();
        let key = key_for(&signing_key);
        let assertion = signed_assertion(signing_key, SignatureConfig::default());

        let tampered = assertion.to_xml().replace("a@b.c", "evil@b.c");
        let tampered = Assertion::from_xml(&tampered).unwrap();

        let outcome = SignatureValidator::new().verify(&tampered, &[key]);
        assert!(!outcome.valid);
        assert!(outcome.failure.unwrap().contains("digest"));
    }

    #[test]
    fn unsigned_assertion_is_reported_not_fatal() {
        let assertion = Assertion::from_xml(
            &Assertion::with_id("_plain", "https://idp.example.com").to_xml(),
        )
        .unwrap();
        let key = VerificationKey::from_rsa_public_key_der(vec![0; 8]);

        let outcome = SignatureValidator::new().verify(&assertion, &[key]);
        assert!(!outcome.valid);
        assert_eq!(outcome.failure.as_deref(), Some("assertion is not signed"));
    }

    #[test]
    fn sha1_requires_opt_in() {
        let assertion = Assertion::from_xml(SHA1_SIGNED).unwrap();

        let strict = SignatureValidator::new().verify(&assertion, &[fixture_key()]);
        assert!(!strict.valid);
        assert!(strict.failure.unwrap().contains("SHA-1"));

        let legacy = SignatureValidator::new()
            .allow_sha1(true)
            .verify(&assertion, &[fixture_key()]);
        assert!(legacy.valid, "{legacy:?}");
    }

    #[test]
    fn pretty_printed_signature_verifies() {
        let assertion = Assertion::from_xml(PRETTY_SIGNED).unwrap();

        let outcome = SignatureValidator::new().verify(&assertion, &[fixture_key()]);
        assert!(outcome.valid, "{outcome:?}");
        assert_eq!(assertion.name_id().unwrap().value, "u-42");
    }

    #[test]
    fn injected_whitespace_breaks_the_digest() {
        let padded = PRETTY_SIGNED.replace("<saml:Subject>", "<saml:Subject>\n   ");
        let assertion = Assertion::from_xml(&padded).unwrap();

        let outcome = SignatureValidator::new().verify(&assertion, &[fixture_key()]);
        assert!(!outcome.valid);
        assert!(outcome.failure.unwrap().contains("digest"));
    }

    #[test]
    fn inclusive_prefix_list_is_honoured() {
        // Without the listed `xs` declaration the digest no longer matches.
        let dropped = PRETTY_SIGNED.replace(r#" PrefixList="xs""#, "");
        let assertion = Assertion::from_xml(&dropped).unwrap();

        let outcome = SignatureValidator::new().verify(&assertion, &[fixture_key()]);
        assert!(!outcome.valid);
        assert!(outcome.failure.unwrap().contains("digest"));
    }

    #[test]
    fn unsupported_transform_is_rejected() {
        let inclusive = PRETTY_SIGNED.replace(
            r#"<ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#">"#,
            r#"<ds:Transform Algorithm="http://www.w3.org/TR/2001/REC-xml-c14n-20010315">"#,
        );
        let assertion = Assertion::from_xml(&inclusive).unwrap();

        let outcome = SignatureValidator::new().verify(&assertion, &[fixture_key()]);
        assert!(!outcome.valid);
        assert!(outcome.failure.unwrap().contains("reference must apply"));
    }

    #[test]
    fn reference_must_point_at_assertion() {
        let signing_key = RsaSigningKey::generate(KeySize::Rsa2048).unwrap();
        let key = key_for(&signing_key);
        let assertion = signed_assertion(signing_key, SignatureConfig::default());

        let moved = assertion.to_xml().replace("ID=\"_signed\"", "ID=\"_other\"");
        let moved = Assertion::from_xml(&moved).unwrap();

        let outcome = SignatureValidator::new().verify(&moved, &[key]);
        assert!(!outcome.valid);
        assert!(outcome.failure.unwrap().contains("instead of the assertion"));
    }
}
