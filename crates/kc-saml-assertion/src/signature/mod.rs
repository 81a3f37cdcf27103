//! XML Signature support for SAML assertions.
//!
//! Assertions are signed with enveloped XML-DSig signatures: the
//! `ds:Signature` element sits inside the assertion and references it by
//! `ID`. The digest covers the canonical assertion with the signature
//! removed; the signature value covers the canonical `ds:SignedInfo`.
//!
//! Only exclusive canonicalization without comments is accepted, both for
//! `SignedInfo` and as the last reference transform, and the reference must
//! apply exactly the enveloped-signature and exclusive canonicalization
//! transforms.
//!
//! # Signing Algorithms
//!
//! - RSA-SHA256 (default)
//! - RSA-SHA384
//! - RSA-SHA512
//!
//! Legacy RSA-SHA1 and SHA-1 digests are accepted only when explicitly allowed.

mod signer;
mod validator;

pub use signer::*;
pub use validator::*;

use kc_crypto::{HashAlgorithm, RsaSignatureAlgorithm};

use crate::error::{SamlError, SamlResult};
use crate::types::{
    canonicalization_algorithms, digest_algorithms, signature_algorithms, transform_algorithms,
    XMLDSIG_NS,
};
use crate::xml::XmlElement;

/// Signature algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureAlgorithm {
    /// RSA with SHA-256 (recommended).
    #[default]
    RsaSha256,
    /// RSA with SHA-384.
    RsaSha384,
    /// RSA with SHA-512.
    RsaSha512,
    /// Legacy RSA with SHA-1 (not recommended).
    RsaSha1,
}

impl SignatureAlgorithm {
    /// Returns the URI for this signature algorithm.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::RsaSha256 => signature_algorithms::RSA_SHA256,
            Self::RsaSha384 => signature_algorithms::RSA_SHA384,
            Self::RsaSha512 => signature_algorithms::RSA_SHA512,
            Self::RsaSha1 => signature_algorithms::RSA_SHA1,
        }
    }

    /// Returns the digest algorithm conventionally paired with this algorithm.
    #[must_use]
    pub const fn default_digest(&self) -> DigestAlgorithm {
        match self {
            Self::RsaSha256 => DigestAlgorithm::Sha256,
            Self::RsaSha384 => DigestAlgorithm::Sha384,
            Self::RsaSha512 => DigestAlgorithm::Sha512,
            Self::RsaSha1 => DigestAlgorithm::Sha1,
        }
    }

    /// Parses a signature algorithm from its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            signature_algorithms::RSA_SHA256 => Some(Self::RsaSha256),
            signature_algorithms::RSA_SHA384 => Some(Self::RsaSha384),
            signature_algorithms::RSA_SHA512 => Some(Self::RsaSha512),
            signature_algorithms::RSA_SHA1 => Some(Self::RsaSha1),
            _ => None,
        }
    }

    /// Returns true if this algorithm uses a deprecated hash (SHA-1).
    #[must_use]
    pub const fn is_deprecated(&self) -> bool {
        matches!(self, Self::RsaSha1)
    }

    pub(crate) const fn rsa(self) -> RsaSignatureAlgorithm {
        match self {
            Self::RsaSha256 => RsaSignatureAlgorithm::Rs256,
            Self::RsaSha384 => RsaSignatureAlgorithm::Rs384,
            Self::RsaSha512 => RsaSignatureAlgorithm::Rs512,
            Self::RsaSha1 => RsaSignatureAlgorithm::Rs1,
        }
    }
}

/// Reference digest algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    /// SHA-256.
    #[default]
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
    /// Legacy SHA-1.
    Sha1,
}

impl DigestAlgorithm {
    /// Returns the URI for this digest algorithm.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::Sha256 => digest_algorithms::SHA256,
            Self::Sha384 => digest_algorithms::SHA384,
            Self::Sha512 => digest_algorithms::SHA512,
            Self::Sha1 => digest_algorithms::SHA1,
        }
    }

    /// Parses a digest algorithm from its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            digest_algorithms::SHA256 => Some(Self::Sha256),
            digest_algorithms::SHA384 => Some(Self::Sha384),
            digest_algorithms::SHA512 => Some(Self::Sha512),
            digest_algorithms::SHA1 => Some(Self::Sha1),
            _ => None,
        }
    }

    /// Returns true for SHA-1.
    #[must_use]
    pub const fn is_deprecated(&self) -> bool {
        matches!(self, Self::Sha1)
    }

    pub(crate) const fn hash(self) -> HashAlgorithm {
        match self {
            Self::Sha256 => HashAlgorithm::Sha256,
            Self::Sha384 => HashAlgorithm::Sha384,
            Self::Sha512 => HashAlgorithm::Sha512,
            Self::Sha1 => HashAlgorithm::Sha1,
        }
    }
}

/// XML Signature structure.
///
/// Represents the `<ds:Signature>` element of a signed assertion.
#[derive(Debug, Clone)]
pub struct XmlSignature {
    /// The signature algorithm used.
    pub algorithm: SignatureAlgorithm,
    /// `InclusiveNamespaces` prefixes of the `SignedInfo` canonicalization.
    pub signed_info_prefixes: Vec<String>,
    /// `InclusiveNamespaces` prefixes of the reference canonicalization.
    pub reference_prefixes: Vec<String>,
    /// The reference URI (the ID of the signed element prefixed with `#`).
    pub reference_uri: String,
    /// The reference digest algorithm.
    pub digest_algorithm: DigestAlgorithm,
    /// The digest value (base64 encoded).
    pub digest_value: String,
    /// The signature value (base64 encoded).
    pub signature_value: String,
    /// Optional X.509 certificate (base64 encoded, DER format).
    pub x509_certificate: Option<String>,
}

impl XmlSignature {
    /// Reads a `ds:Signature` element.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidAssertion`] if the element is incomplete,
    /// references more than one element, or names an unsupported algorithm
    /// or transform.
    pub fn from_element(signature: &XmlElement) -> SamlResult<Self> {
        let signed_info = signature.required_child(XMLDSIG_NS, "SignedInfo")?;

        let signed_info_prefixes = exclusive_prefixes(
            signed_info.required_child(XMLDSIG_NS, "CanonicalizationMethod")?,
            "canonicalization",
        )?;

        let algorithm = algorithm_uri(signed_info, "SignatureMethod")?;
        let algorithm = SignatureAlgorithm::from_uri(algorithm)
            .ok_or_else(|| unsupported("signature", algorithm))?;

        let mut references = signed_info.children_named(XMLDSIG_NS, "Reference");
        let reference = references
            .next()
            .ok_or_else(|| SamlError::MissingElement("Reference in SignedInfo".to_string()))?;
        if references.next().is_some() {
            return Err(SamlError::InvalidAssertion(
                "signature must contain exactly one reference".to_string(),
            ));
        }

        let reference_prefixes = reference_transforms(reference)?;

        let digest_algorithm = algorithm_uri(reference, "DigestMethod")?;
        let digest_algorithm = DigestAlgorithm::from_uri(digest_algorithm)
            .ok_or_else(|| unsupported("digest", digest_algorithm))?;

        Ok(Self {
            algorithm,
            signed_info_prefixes,
            reference_prefixes,
            reference_uri: reference.attribute("URI").unwrap_or_default().to_string(),
            digest_algorithm,
            digest_value: base64_text(reference.required_child(XMLDSIG_NS, "DigestValue")?),
            signature_value: base64_text(signature.required_child(XMLDSIG_NS, "SignatureValue")?),
            x509_certificate: signature
                .child(XMLDSIG_NS, "KeyInfo")
                .and_then(|info| info.child(XMLDSIG_NS, "X509Data"))
                .and_then(|data| data.child(XMLDSIG_NS, "X509Certificate"))
                .map(base64_text),
        })
    }
}

fn algorithm_uri<'a>(parent: &'a XmlElement, local_name: &str) -> SamlResult<&'a str> {
    parent
        .required_child(XMLDSIG_NS, local_name)?
        .attribute("Algorithm")
        .ok_or_else(|| SamlError::MissingElement(format!("Algorithm on {local_name}")))
}

/// Checks the reference applies enveloped-signature then exclusive
/// canonicalization, returning the latter's inclusive prefixes.
fn reference_transforms(reference: &XmlElement) -> SamlResult<Vec<String>> {
    let transforms: Vec<&XmlElement> = reference
        .child(XMLDSIG_NS, "Transforms")
        .map(|transforms| transforms.children_named(XMLDSIG_NS, "Transform").collect())
        .unwrap_or_default();

    match transforms.as_slice() {
        [enveloped, canonicalization]
            if enveloped.attribute("Algorithm") == Some(transform_algorithms::ENVELOPED_SIGNATURE) =>
        {
            exclusive_prefixes(canonicalization, "transform")
        }
        _ => {
            let found: Vec<&str> = transforms
                .iter()
                .map(|transform| transform.attribute("Algorithm").unwrap_or("?"))
                .collect();
            Err(SamlError::InvalidAssertion(format!(
                "reference must apply enveloped-signature and exclusive canonicalization, found [{}]",
                found.join(", ")
            )))
        }
    }
}

/// Requires exclusive canonicalization and returns its `PrefixList`.
fn exclusive_prefixes(method: &XmlElement, kind: &str) -> SamlResult<Vec<String>> {
    let algorithm = method
        .attribute("Algorithm")
        .ok_or_else(|| SamlError::MissingElement(format!("Algorithm on {}", method.local_name)))?;
    if algorithm != canonicalization_algorithms::EXCLUSIVE_C14N {
        return Err(unsupported(kind, algorithm));
    }
    Ok(method
        .child(canonicalization_algorithms::EXCLUSIVE_C14N, "InclusiveNamespaces")
        .and_then(|inclusive| inclusive.attribute("PrefixList"))
        .map(|list| list.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default())
}

fn unsupported(kind: &str, uri: &str) -> SamlError {
    SamlError::InvalidAssertion(format!("unsupported {kind} algorithm: {uri}"))
}

/// Base64 text with the line breaks signers commonly insert removed.
fn base64_text(element: &XmlElement) -> String {
    element.text().chars().filter(|c| !c.is_whitespace()).collect()
}

/// Configuration for signature creation.
#[derive(Debug, Clone)]
pub struct SignatureConfig {
    /// The signature algorithm to use.
    pub algorithm: SignatureAlgorithm,
    /// The reference digest algorithm to use.
    pub digest_algorithm: DigestAlgorithm,
    /// Whether to include the X.509 certificate in the signature.
    pub include_certificate: bool,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self::with_algorithm(SignatureAlgorithm::RsaSha256)
    }
}

impl SignatureConfig {
    /// Creates a new signature configuration with the given algorithm.
    #[must_use]
    pub const fn with_algorithm(algorithm: SignatureAlgorithm) -> Self {
        Self {
            algorithm,
            digest_algorithm: algorithm.default_digest(),
            include_certificate: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_algorithm_uri_roundtrip() {
        for alg in [
            SignatureAlgorithm::RsaSha256,
            SignatureAlgorithm::RsaSha384,
            SignatureAlgorithm::RsaSha512,
            SignatureAlgorithm::RsaSha1,
        ] {
            assert_eq!(SignatureAlgorithm::from_uri(alg.uri()), Some(alg));
        }
        assert_eq!(
            SignatureAlgorithm::from_uri("http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256"),
            None
        );
    }

    #[test]
    fn deprecated_algorithms() {
        assert!(SignatureAlgorithm::RsaSha1.is_deprecated());
        assert!(!SignatureAlgorithm::RsaSha256.is_deprecated());
        assert!(DigestAlgorithm::Sha1.is_deprecated());
        assert_eq!(SignatureAlgorithm::RsaSha1.default_digest(), DigestAlgorithm::Sha1);
    }

    #[test]
    fn signature_config_default() {
        let config = SignatureConfig::default();
        assert_eq!(config.algorithm, SignatureAlgorithm::RsaSha256);
        assert_eq!(config.digest_algorithm, DigestAlgorithm::Sha256);
        assert!(config.include_certificate);
    }

    #[test]
    fn signature_element_is_read() {
        let xml = r##"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
          <ds:SignedInfo>
            <ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>
            <ds:SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"/>
            <ds:Reference URI="#_a1">
              <ds:Transforms>
                <ds:Transform Algorithm="http://www.w3.org/2000/09/xmldsig#enveloped-signature"/>
                <ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#">
                  <ec:InclusiveNamespaces xmlns:ec="http://www.w3.org/2001/10/xml-exc-c14n#" PrefixList="xs #default"/>
                </ds:Transform>
              </ds:Transforms>
              <ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/>
              <ds:DigestValue>ZGln
                ZXN0</ds:DigestValue>
            </ds:Reference>
          </ds:SignedInfo>
          <ds:SignatureValue>c2ln</ds:SignatureValue>
        </ds:Signature>"##;

        let signature = XmlSignature::from_element(&XmlElement::parse(xml).unwrap()).unwrap();
        assert_eq!(signature.reference_uri, "#_a1");
        assert_eq!(signature.digest_value, "ZGlnZXN0");
        assert_eq!(signature.algorithm, SignatureAlgorithm::RsaSha256);
        assert_eq!(signature.reference_prefixes, ["xs", "#default"]);
        assert!(signature.signed_info_prefixes.is_empty());
        assert!(signature.x509_certificate.is_none());
    }

    fn signature_with(canonicalization: &str, transforms: &[&str]) -> String {
        let transforms: String = transforms
            .iter()
            .map(|uri| format!(r#"<ds:Transform Algorithm="{uri}"/>"#))
            .collect();
        format!(
            r##"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:SignedInfo>
            <ds:CanonicalizationMethod Algorithm="{canonicalization}"/>
            <ds:SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"/>
            <ds:Reference URI="#_a1"><ds:Transforms>{transforms}</ds:Transforms>
            <ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/><ds:DigestValue>AA==</ds:DigestValue></ds:Reference>
            </ds:SignedInfo><ds:SignatureValue>AA==</ds:SignatureValue></ds:Signature>"##
        )
    }

    fn read_error(xml: &str) -> String {
        XmlSignature::from_element(&XmlElement::parse(xml).unwrap())
            .unwrap_err()
            .to_string()
    }

    #[test]
    fn only_exclusive_canonicalization_is_accepted() {
        let enveloped = transform_algorithms::ENVELOPED_SIGNATURE;
        let exclusive = canonicalization_algorithms::EXCLUSIVE_C14N;

        let accepted = signature_with(exclusive, &[enveloped, exclusive]);
        assert!(XmlSignature::from_element(&XmlElement::parse(&accepted).unwrap()).is_ok());

        let inclusive = signature_with(canonicalization_algorithms::C14N, &[enveloped, exclusive]);
        assert!(read_error(&inclusive).contains("unsupported canonicalization algorithm"));

        let with_comments = signature_with(
            canonicalization_algorithms::EXCLUSIVE_C14N_WITH_COMMENTS,
            &[enveloped, exclusive],
        );
        assert!(read_error(&with_comments).contains("unsupported canonicalization algorithm"));

        let inclusive_transform =
            signature_with(exclusive, &[enveloped, canonicalization_algorithms::C14N]);
        assert!(read_error(&inclusive_transform).contains("unsupported transform algorithm"));
    }

    #[test]
    fn reference_transforms_must_be_enveloped_then_exclusive() {
        let enveloped = transform_algorithms::ENVELOPED_SIGNATURE;
        let exclusive = canonicalization_algorithms::EXCLUSIVE_C14N;
        let xpath = "http://www.w3.org/TR/1999/REC-xpath-19991116";

        for transforms in [
            &[][..],
            &[enveloped][..],
            &[exclusive, enveloped][..],
            &[enveloped, xpath, exclusive][..],
        ] {
            let xml = signature_with(exclusive, transforms);
            assert!(
                read_error(&xml).contains("reference must apply"),
                "{transforms:?} was accepted"
            );
        }
    }

    #[test]
    fn signature_with_two_references_is_rejected() {
        let xml = r##"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
          <ds:SignedInfo>
            <ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>
            <ds:SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"/>
            <ds:Reference URI="#a"><ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/><ds:DigestValue>AA==</ds:DigestValue></ds:Reference>
            <ds:Reference URI="#b"><ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/><ds:DigestValue>AA==</ds:DigestValue></ds:Reference>
          </ds:SignedInfo>
          <ds:SignatureValue>AA==</ds:SignatureValue>
        </ds:Signature>"##;

        assert!(XmlSignature::from_element(&XmlElement::parse(xml).unwrap()).is_err());
    }
}
