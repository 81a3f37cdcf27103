//! Input elements accepted by the processor.

use super::{Assertion, EncryptedAssertion, SAML_NS};
use crate::error::SamlResult;
use crate::xml::XmlElement;

/// One element of a response's assertion list.
///
/// Anything that is not a SAML `Assertion` or `EncryptedAssertion` is kept
/// as [`AssertionElement::Unsupported`] so the processor can reject it with
/// a precise error.
#[derive(Debug, Clone, PartialEq)]
pub enum AssertionElement {
    /// A plaintext assertion.
    Assertion(Assertion),
    /// An encrypted assertion.
    EncryptedAssertion(EncryptedAssertion),
    /// Any other element.
    Unsupported {
        /// Qualified name of the element.
        name: String,
    },
}

impl AssertionElement {
    /// Parses a serialized element.
    ///
    /// # Errors
    ///
    /// Returns an error if the XML is malformed or a recognized element is
    /// missing required content.
    pub fn from_xml(xml: &str) -> SamlResult<Self> {
        Self::from_element(XmlElement::parse(xml)?)
    }

    /// Classifies and parses an element.
    ///
    /// # Errors
    ///
    /// Returns an error if a recognized element is missing required content.
    pub fn from_element(element: XmlElement) -> SamlResult<Self> {
        if element.is(SAML_NS, "Assertion") {
            Ok(Self::Assertion(Assertion::from_element(element)?))
        } else if element.is(SAML_NS, "EncryptedAssertion") {
            Ok(Self::EncryptedAssertion(EncryptedAssertion::from_element(
                &element,
            )?))
        } else {
            Ok(Self::Unsupported {
                name: element.qualified_name(),
            })
        }
    }

    /// Returns the element kind for logging.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Assertion(_) => "Assertion",
            Self::EncryptedAssertion(_) => "EncryptedAssertion",
            Self::Unsupported { name } => name,
        }
    }

    /// Returns true for encrypted assertions.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        matches!(self, Self::EncryptedAssertion(_))
    }
}

impl From<Assertion> for AssertionElement {
    fn from(assertion: Assertion) -> Self {
        Self::Assertion(assertion)
    }
}

impl From<EncryptedAssertion> for AssertionElement {
    fn from(encrypted: EncryptedAssertion) -> Self {
        Self::EncryptedAssertion(encrypted)
    }
}
