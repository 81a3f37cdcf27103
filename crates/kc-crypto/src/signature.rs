//! RSA signature operations for XML-DSig.
//!
//! Identity providers sign assertions with RSA PKCS#1 v1.5. Verification
//! accepts RSA public keys as DER-encoded PKCS#1 `RSAPublicKey` structures,
//! which is what an X.509 certificate carries in its subject public key.

use aws_lc_rs::{
    rand::SystemRandom,
    rsa::KeySize,
    signature::{self, KeyPair, RsaKeyPair, UnparsedPublicKey},
};
use thiserror::Error;

use crate::algorithm::HashAlgorithm;

/// Error type for signature operations.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// Key generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Verification failed.
    #[error("signature verification failed")]
    Verification,

    /// Invalid key format.
    #[error("invalid key format: {0}")]
    InvalidKey(String),
}

/// RSA PKCS#1 v1.5 signature algorithms used by SAML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RsaSignatureAlgorithm {
    /// RSA with SHA-1 (legacy identity providers only).
    Rs1,
    /// RSA with SHA-256.
    Rs256,
    /// RSA with SHA-384.
    Rs384,
    /// RSA with SHA-512.
    Rs512,
}

impl RsaSignatureAlgorithm {
    /// Returns the digest algorithm this signature algorithm hashes with.
    #[must_use]
    pub const fn hash_algorithm(self) -> HashAlgorithm {
        match self {
            Self::Rs1 => HashAlgorithm::Sha1,
            Self::Rs256 => HashAlgorithm::Sha256,
            Self::Rs384 => HashAlgorithm::Sha384,
            Self::Rs512 => HashAlgorithm::Sha512,
        }
    }

    // SHA-1 is verify-only.
    fn signing_encoding(self) -> Option<&'static dyn signature::RsaEncoding> {
        match self {
            Self::Rs1 => None,
            Self::Rs256 => Some(&signature::RSA_PKCS1_SHA256),
            Self::Rs384 => Some(&signature::RSA_PKCS1_SHA384),
            Self::Rs512 => Some(&signature::RSA_PKCS1_SHA512),
        }
    }

    fn verification_parameters(self) -> &'static signature::RsaParameters {
        match self {
            Self::Rs1 => &signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
            Self::Rs256 => &signature::RSA_PKCS1_2048_8192_SHA256,
            Self::Rs384 => &signature::RSA_PKCS1_2048_8192_SHA384,
            Self::Rs512 => &signature::RSA_PKCS1_2048_8192_SHA512,
        }
    }
}

/// RSA key pair used to sign assertions.
pub struct RsaSigningKey {
    key_pair: RsaKeyPair,
}

impl RsaSigningKey {
    /// Creates a signing key from a PKCS#8 DER-encoded private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not a valid RSA key.
    pub fn from_pkcs8(pkcs8_der: &[u8]) -> Result<Self, SignatureError> {
        let key_pair = RsaKeyPair::from_pkcs8(pkcs8_der)
            .or_else(|_| RsaKeyPair::from_der(pkcs8_der))
            .map_err(|e| SignatureError::InvalidKey(format!("Invalid RSA key: {e}")))?;
        Ok(Self { key_pair })
    }

    /// Generates a fresh RSA signing key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key could not be generated.
    pub fn generate(size: KeySize) -> Result<Self, SignatureError> {
        let key_pair = RsaKeyPair::generate(size)
            .map_err(|e| SignatureError::KeyGeneration(format!("RSA key generation failed: {e}")))?;
        Ok(Self { key_pair })
    }

    /// Returns the DER-encoded PKCS#1 `RSAPublicKey` for this key.
    #[must_use]
    pub fn public_key_der(&self) -> Vec<u8> {
        self.key_pair.public_key().as_ref().to_vec()
    }

    /// Signs data with the given algorithm.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails or the algorithm is SHA-1, which is
    /// accepted for verification only.
    pub fn sign(&self, data: &[u8], algorithm: RsaSignatureAlgorithm) -> Result<Vec<u8>, SignatureError> {
        let encoding = algorithm.signing_encoding().ok_or_else(|| {
            SignatureError::Signing("RSA-SHA1 is accepted for verification only".to_string())
        })?;
        let rng = SystemRandom::new();
        let mut signature = vec![0u8; self.key_pair.public_modulus_len()];

        self.key_pair
            .sign(encoding, &rng, data, &mut signature)
            .map_err(|e| SignatureError::Signing(format!("RSA signing failed: {e}")))?;

        Ok(signature)
    }
}

impl std::fmt::Debug for RsaSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaSigningKey")
            .field("modulus_bits", &(self.key_pair.public_modulus_len() * 8))
            .finish_non_exhaustive()
    }
}

/// Verifies an RSA PKCS#1 v1.5 signature.
///
/// Returns `false` for any signature that does not verify under the key,
/// including malformed keys; verification never distinguishes the cause.
#[must_use]
pub fn rsa_verify(
    public_key_der: &[u8],
    data: &[u8],
    sig: &[u8],
    algorithm: RsaSignatureAlgorithm,
) -> bool {
    UnparsedPublicKey::new(algorithm.verification_parameters(), public_key_der)
        .verify(data, sig)
        .is_ok()
}
