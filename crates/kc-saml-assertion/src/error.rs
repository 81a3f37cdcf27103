//! SAML assertion processing errors.
//!
//! Every failure the pipeline can surface is a [`SamlError`] variant. The
//! validation variants carry the full list of [`Violation`]s found, since
//! validators evaluate every check before reporting.

use thiserror::Error;

use crate::validation::Violation;

/// Result type for SAML assertion operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// Message reported when an input element is neither an assertion nor an
/// encrypted assertion.
pub const UNSUPPORTED_ASSERTION_TYPE_MESSAGE: &str =
    "The assertion must be of type: EncryptedAssertion or Assertion";

/// SAML assertion processing errors.
#[derive(Debug, Error)]
pub enum SamlError {
    /// An input element was neither `Assertion` nor `EncryptedAssertion`.
    #[error("The assertion must be of type: EncryptedAssertion or Assertion")]
    UnsupportedAssertionType {
        /// Local name of the rejected element.
        element: String,
    },

    /// No configured key could decrypt an encrypted element.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// The assertion is structurally unusable or lacks a required signature.
    #[error("invalid assertion: {0}")]
    InvalidAssertion(String),

    /// One or more assertion-level checks failed.
    #[error("assertion validation failed: {}", join_violations(.reasons))]
    AssertionValidation {
        /// Every failed check.
        reasons: Vec<Violation>,
    },

    /// No subject confirmation could be satisfied.
    #[error("subject confirmation validation failed: {}", join_violations(.reasons))]
    SubjectConfirmationValidation {
        /// Failed checks of the closest matching confirmation.
        reasons: Vec<Violation>,
    },

    /// Attribute values could not be converted.
    #[error("attribute '{attribute}' could not be transformed: {reason}")]
    Transformation {
        /// Name of the offending attribute.
        attribute: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// XML parsing error.
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// Missing required element or attribute.
    #[error("missing required element: {0}")]
    MissingElement(String),

    /// Cryptographic operation error.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Invalid keys or settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Replay store failure.
    #[error("storage error: {0}")]
    Storage(String),
}

fn join_violations(reasons: &[Violation]) -> String {
    reasons
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl SamlError {
    /// Returns true for errors that classify the input as an invalid assertion.
    ///
    /// An unsupported element type is reported as an invalid assertion to
    /// callers that only distinguish broad failure classes.
    #[must_use]
    pub const fn is_invalid_assertion(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedAssertionType { .. } | Self::InvalidAssertion(_)
        )
    }

    /// Returns the failed checks carried by validation errors.
    #[must_use]
    pub fn reasons(&self) -> &[Violation] {
        match self {
            Self::AssertionValidation { reasons }
            | Self::SubjectConfirmationValidation { reasons } => reasons,
            _ => &[],
        }
    }

    /// Returns the SAML status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> &'static str {
        match self {
            Self::UnsupportedAssertionType { .. }
            | Self::InvalidAssertion(_)
            | Self::AssertionValidation { .. }
            | Self::SubjectConfirmationValidation { .. }
            | Self::XmlParse(_)
            | Self::MissingElement(_) => "urn:oasis:names:tc:SAML:2.0:status:Requester",
            Self::DecryptionFailed(_)
            | Self::Transformation { .. }
            | Self::Crypto(_)
            | Self::Configuration(_)
            | Self::Storage(_) => "urn:oasis:names:tc:SAML:2.0:status:Responder",
        }
    }
}

impl From<quick_xml::Error> for SamlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for SamlError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<std::str::Utf8Error> for SamlError {
    fn from(err: std::str::Utf8Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::InvalidAssertion(format!("invalid base64 content: {err}"))
    }
}

impl From<kc_crypto::EncryptionError> for SamlError {
    fn from(err: kc_crypto::EncryptionError) -> Self {
        Self::Crypto(err.to_string())
    }
}

impl From<kc_crypto::SignatureError> for SamlError {
    fn from(err: kc_crypto::SignatureError) -> Self {
        Self::Crypto(err.to_string())
    }
}
