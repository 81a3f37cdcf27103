//! SAML 2.0 assertion processing for Keycloak Rust service providers.
//!
//! This crate turns the assertions of an identity provider's response into
//! trusted, typed data:
//!
//! - **Decryption** - Open encrypted assertions and attributes with the
//!   configured private keys, tried in order for key rollover
//! - **Signature verification** - Check enveloped XML-DSig signatures against
//!   the configured verification keys
//! - **Validation** - Temporal bounds, audience, one-time use, issuer and
//!   bearer subject confirmation
//! - **Transformation** - Convert attribute values into typed values
//!
//! # Architecture
//!
//! - [`types`] - Assertion data model
//! - [`xml`] - Namespace-aware element model and canonical serialization
//! - [`decrypter`] / [`encrypter`] - XML Encryption
//! - [`signature`] - XML signature creation and verification
//! - [`validation`] - Assertion and subject confirmation validators
//! - [`replay`] - One-time-use replay store
//! - [`transformer`] - Attribute value transformation
//! - [`processor`] - The pipeline tying everything together
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kc_saml_assertion::{
//!     AssertionElement, InMemoryReplayStore, Processor, ValidationContext,
//! };
//!
//! let processor = Processor::new(Arc::new(InMemoryReplayStore::new()));
//! let elements = vec![AssertionElement::from_xml(&xml)?];
//! let context = ValidationContext::new("https://sp.example.com")
//!     .with_recipient("https://sp.example.com/saml/acs")
//!     .with_in_response_to(request_id);
//!
//! let validated = processor.process(elements, &idp, &context)?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod decrypter;
pub mod encrypter;
pub mod error;
pub mod keys;
pub mod processor;
pub mod replay;
pub mod signature;
pub mod transformer;
pub mod types;
pub mod validation;
pub mod xml;

pub use config::{IdentityProviderConfig, IdentityProviderSettings, ProcessorSettings, SignatureRequirement};
pub use decrypter::Decrypter;
pub use encrypter::Encrypter;
pub use error::{SamlError, SamlResult, UNSUPPORTED_ASSERTION_TYPE_MESSAGE};
pub use keys::{ConfiguredKeyResolver, DecryptionKey, KeyResolver, VerificationKey};
pub use processor::{Processor, ValidatedAssertion};
pub use replay::{InMemoryReplayStore, ReplayStore};
pub use signature::{AssertionSigner, SignatureValidator, VerificationOutcome};
pub use transformer::{
    Base64Transformer, TransformedAttributes, Transformer, TypedValue, TypedValueTransformer,
};
pub use types::*;
pub use validation::{
    AssertionValidator, SubjectConfirmationValidator, ValidationCheck, ValidationContext,
    ValidationResult, Violation,
};
