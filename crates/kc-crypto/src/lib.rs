//! # kc-crypto
//!
//! Cryptographic primitives for SAML assertion processing, built on aws-lc-rs.
//!
//! The SAML layer consumes this crate through three narrow contracts:
//!
//! - [`hash`] - message digests for XML-DSig references
//! - [`signature`] - RSA PKCS#1 v1.5 signing and verification
//! - [`encryption`] - RSA-OAEP key transport and AES-GCM content encryption
//!
//! ## Algorithm Policy
//!
//! SAML 2.0 deployments still rely on SHA-256 and, occasionally, SHA-1.
//! SHA-1 variants are exposed for verification of legacy identity providers
//! only; callers must opt in explicitly.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod algorithm;
pub mod encryption;
pub mod hash;
pub mod random;
pub mod signature;

pub use algorithm::HashAlgorithm;
pub use encryption::{
    ContentEncryptionAlgorithm, EncryptionError, KeyTransportAlgorithm, RsaDecryptionKey,
    RsaEncryptionKey,
};
pub use hash::{digest, sha256, sha384, sha512};
pub use random::{generate_xml_id, random_bytes};
pub use signature::{rsa_verify, RsaSignatureAlgorithm, RsaSigningKey, SignatureError};

/// RSA modulus sizes accepted for key generation.
pub use aws_lc_rs::rsa::KeySize;
