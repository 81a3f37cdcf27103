//! XML Signature creation.
//!
//! Produces enveloped signatures over assertions. Identity providers sign;
//! a service provider uses this to build fixtures and to interoperate with
//! its own test identity provider.

use base64::Engine;
use kc_crypto::RsaSigningKey;

use crate::error::SamlResult;
use crate::types::{canonicalization_algorithms, transform_algorithms, Assertion, SAML_NS, XMLDSIG_NS};
use crate::xml::XmlElement;

use super::SignatureConfig;

/// Signs assertions with an RSA key.
#[derive(Debug)]
pub struct AssertionSigner {
    key: RsaSigningKey,
    certificate_der: Option<Vec<u8>>,
    config: SignatureConfig,
}

impl AssertionSigner {
    /// Creates a signer with the default configuration.
    #[must_use]
    pub fn new(key: RsaSigningKey) -> Self {
        Self {
            key,
            certificate_der: None,
            config: SignatureConfig::default(),
        }
    }

    /// Sets the certificate embedded in `ds:KeyInfo`.
    #[must_use]
    pub fn with_certificate(mut self, certificate_der: Vec<u8>) -> Self {
        self.certificate_der = Some(certificate_der);
        self
    }

    /// Sets the signature configuration.
    #[must_use]
    pub const fn with_config(mut self, config: SignatureConfig) -> Self {
        self.config = config;
        self
    }

    /// Signs an assertion and returns the signed assertion.
    ///
    /// The result carries its serialized source, so it verifies and can be
    /// encrypted without invalidating the signature.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn sign(&self, assertion: &Assertion) -> SamlResult<Assertion> {
        let xml = self.sign_to_xml(assertion)?;
        Assertion::from_xml(&xml)
    }

    /// Signs an assertion and returns its serialized form.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn sign_to_xml(&self, assertion: &Assertion) -> SamlResult<String> {
        let engine = base64::engine::general_purpose::STANDARD;
        let mut element = assertion.to_element();

        let digest = kc_crypto::digest(
            self.config.digest_algorithm.hash(),
            element.canonicalize().as_bytes(),
        );
        let signed_info = self.build_signed_info(assertion.id(), &engine.encode(digest));

        let signature_value = self
            .key
            .sign(signed_info.canonicalize().as_bytes(), self.config.algorithm.rsa())?;

        let mut signature = ds("Signature")
            .with_namespace_declaration("ds", XMLDSIG_NS)
            .with_child(signed_info)
            .with_child(ds("SignatureValue").with_text(engine.encode(signature_value)));
        if self.config.include_certificate {
            if let Some(certificate) = &self.certificate_der {
                signature = signature.with_child(ds("KeyInfo").with_child(
                    ds("X509Data").with_child(ds("X509Certificate").with_text(engine.encode(certificate))),
                ));
            }
        }

        // The signature goes right after the Issuer.
        let issuer_position = element
            .children
            .iter()
            .position(|node| {
                matches!(node, crate::xml::XmlNode::Element(child) if child.is(SAML_NS, "Issuer"))
            })
            .map_or(0, |index| index + 1);
        element.insert_child(issuer_position, signature);

        tracing::debug!(
            assertion_id = %assertion.id(),
            algorithm = self.config.algorithm.uri(),
            "Assertion signed"
        );
        Ok(element.to_xml())
    }

    fn build_signed_info(&self, reference_id: &str, digest_value: &str) -> XmlElement {
        let transforms = ds("Transforms")
            .with_child(
                ds("Transform").with_attribute("Algorithm", transform_algorithms::ENVELOPED_SIGNATURE),
            )
            .with_child(
                ds("Transform").with_attribute("Algorithm", canonicalization_algorithms::EXCLUSIVE_C14N),
            );

        ds("SignedInfo")
            .with_child(
                ds("CanonicalizationMethod")
                    .with_attribute("Algorithm", canonicalization_algorithms::EXCLUSIVE_C14N),
            )
            .with_child(ds("SignatureMethod").with_attribute("Algorithm", self.config.algorithm.uri()))
            .with_child(
                ds("Reference")
                    .with_attribute("URI", format!("#{reference_id}"))
                    .with_child(transforms)
                    .with_child(
                        ds("DigestMethod")
                            .with_attribute("Algorithm", self.config.digest_algorithm.uri()),
                    )
                    .with_child(ds("DigestValue").with_text(digest_value)),
            )
    }
}

fn ds(local_name: &str) -> XmlElement {
    XmlElement::new(XMLDSIG_NS, "ds", local_name)
}
