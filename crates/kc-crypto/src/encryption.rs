//! XML-Encryption primitives.
//!
//! SAML encrypts assertions with a hybrid scheme: a random content key
//! encrypts the element with AES-GCM, and the content key itself is
//! transported to the recipient under its RSA public key with RSA-OAEP.
//!
//! AES-GCM cipher values follow the XML-Encryption 1.1 layout:
//! `IV (12 bytes) || ciphertext || tag (16 bytes)`.

use aws_lc_rs::{
    aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_128_GCM, AES_256_GCM, NONCE_LEN},
    rsa::{
        KeySize, OaepAlgorithm, OaepPrivateDecryptingKey, OaepPublicEncryptingKey,
        PrivateDecryptingKey, PublicEncryptingKey, OAEP_SHA1_MGF1SHA1, OAEP_SHA256_MGF1SHA256,
    },
};
use thiserror::Error;

use crate::random::random_bytes;

/// Error type for encryption operations.
#[derive(Debug, Error)]
pub enum EncryptionError {
    /// Invalid key material.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Key generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed.
    #[error("decryption failed")]
    Decryption,
}

/// Key transport algorithms (`EncryptedKey/EncryptionMethod`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyTransportAlgorithm {
    /// RSA-OAEP with SHA-1 digest and MGF1-SHA1 (`xmlenc#rsa-oaep-mgf1p`).
    RsaOaepMgf1p,
    /// RSA-OAEP with SHA-256 digest and MGF1-SHA256 (`xmlenc11#rsa-oaep`).
    RsaOaepSha256,
}

impl KeyTransportAlgorithm {
    /// RSA-OAEP-MGF1P algorithm URI.
    pub const RSA_OAEP_MGF1P_URI: &'static str = "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p";

    /// RSA-OAEP algorithm URI (XML-Encryption 1.1).
    pub const RSA_OAEP_URI: &'static str = "http://www.w3.org/2009/xmlenc11#rsa-oaep";

    /// Returns the URI for this algorithm.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::RsaOaepMgf1p => Self::RSA_OAEP_MGF1P_URI,
            Self::RsaOaepSha256 => Self::RSA_OAEP_URI,
        }
    }

    /// Parses an algorithm from its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            Self::RSA_OAEP_MGF1P_URI => Some(Self::RsaOaepMgf1p),
            Self::RSA_OAEP_URI => Some(Self::RsaOaepSha256),
            _ => None,
        }
    }

    fn oaep(self) -> &'static OaepAlgorithm {
        match self {
            Self::RsaOaepMgf1p => &OAEP_SHA1_MGF1SHA1,
            Self::RsaOaepSha256 => &OAEP_SHA256_MGF1SHA256,
        }
    }
}

/// Content encryption algorithms (`EncryptedData/EncryptionMethod`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentEncryptionAlgorithm {
    /// AES-128 in GCM mode.
    Aes128Gcm,
    /// AES-256 in GCM mode.
    #[default]
    Aes256Gcm,
}

impl ContentEncryptionAlgorithm {
    /// AES-128-GCM algorithm URI.
    pub const AES128_GCM_URI: &'static str = "http://www.w3.org/2009/xmlenc11#aes128-gcm";

    /// AES-256-GCM algorithm URI.
    pub const AES256_GCM_URI: &'static str = "http://www.w3.org/2009/xmlenc11#aes256-gcm";

    /// Returns the URI for this algorithm.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Aes128Gcm => Self::AES128_GCM_URI,
            Self::Aes256Gcm => Self::AES256_GCM_URI,
        }
    }

    /// Parses an algorithm from its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            Self::AES128_GCM_URI => Some(Self::Aes128Gcm),
            Self::AES256_GCM_URI => Some(Self::Aes256Gcm),
            _ => None,
        }
    }

    /// Returns the content key length in bytes.
    #[must_use]
    pub const fn key_len(self) -> usize {
        match self {
            Self::Aes128Gcm => 16,
            Self::Aes256Gcm => 32,
        }
    }

    /// Generates a random content key of the right length.
    #[must_use]
    pub fn generate_key(self) -> Vec<u8> {
        random_bytes(self.key_len())
    }

    fn aead_key(self, key: &[u8]) -> Result<LessSafeKey, EncryptionError> {
        let alg = match self {
            Self::Aes128Gcm => &AES_128_GCM,
            Self::Aes256Gcm => &AES_256_GCM,
        };
        let unbound = UnboundKey::new(alg, key)
            .map_err(|_| EncryptionError::InvalidKey(format!("content key must be {} bytes", self.key_len())))?;
        Ok(LessSafeKey::new(unbound))
    }

    /// Encrypts content, returning `IV || ciphertext || tag`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key has the wrong length.
    pub fn seal(self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let aead_key = self.aead_key(key)?;
        let iv = random_bytes(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(&iv)
            .map_err(|_| EncryptionError::Encryption("invalid nonce".to_string()))?;

        let mut in_out = plaintext.to_vec();
        aead_key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| EncryptionError::Encryption("AES-GCM seal failed".to_string()))?;

        let mut output = iv;
        output.extend_from_slice(&in_out);
        Ok(output)
    }

    /// Decrypts an `IV || ciphertext || tag` cipher value.
    ///
    /// # Errors
    ///
    /// Returns [`EncryptionError::Decryption`] if authentication fails.
    pub fn open(self, key: &[u8], cipher_value: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        if cipher_value.len() < NONCE_LEN {
            return Err(EncryptionError::Decryption);
        }
        let aead_key = self.aead_key(key)?;
        let (iv, ciphertext) = cipher_value.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(iv).map_err(|_| EncryptionError::Decryption)?;

        let mut in_out = ciphertext.to_vec();
        let plaintext = aead_key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| EncryptionError::Decryption)?;
        Ok(plaintext.to_vec())
    }
}

/// RSA private key able to unwrap transported content keys.
pub struct RsaDecryptionKey {
    key: OaepPrivateDecryptingKey,
    public_key: RsaEncryptionKey,
}

impl RsaDecryptionKey {
    /// Creates a decryption key from a PKCS#8 DER-encoded RSA private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not a valid RSA private key.
    pub fn from_pkcs8(pkcs8_der: &[u8]) -> Result<Self, EncryptionError> {
        let private_key = PrivateDecryptingKey::from_pkcs8(pkcs8_der)
            .map_err(|e| EncryptionError::InvalidKey(format!("Invalid RSA private key: {e}")))?;
        Self::from_private_key(private_key)
    }

    /// Generates a fresh RSA key pair, returning the private half.
    ///
    /// # Errors
    ///
    /// Returns an error if the key could not be generated.
    pub fn generate(size: KeySize) -> Result<Self, EncryptionError> {
        let private_key = PrivateDecryptingKey::generate(size)
            .map_err(|e| EncryptionError::KeyGeneration(format!("RSA key generation failed: {e}")))?;
        Self::from_private_key(private_key)
    }

    fn from_private_key(private_key: PrivateDecryptingKey) -> Result<Self, EncryptionError> {
        let public_key = RsaEncryptionKey::from_public_key(private_key.public_key())?;
        let key = OaepPrivateDecryptingKey::new(private_key)
            .map_err(|e| EncryptionError::InvalidKey(format!("RSA key unusable for OAEP: {e}")))?;
        Ok(Self { key, public_key })
    }

    /// Returns the public half of this key.
    #[must_use]
    pub const fn public_key(&self) -> &RsaEncryptionKey {
        &self.public_key
    }

    /// Unwraps a transported content key.
    ///
    /// # Errors
    ///
    /// Returns [`EncryptionError::Decryption`] if the key was not wrapped
    /// for this private key.
    pub fn unwrap_key(
        &self,
        algorithm: KeyTransportAlgorithm,
        wrapped: &[u8],
    ) -> Result<Vec<u8>, EncryptionError> {
        let mut output = vec![0u8; self.key.min_output_size()];
        let key = self
            .key
            .decrypt(algorithm.oaep(), wrapped, &mut output, None)
            .map_err(|_| EncryptionError::Decryption)?;
        Ok(key.to_vec())
    }
}

impl std::fmt::Debug for RsaDecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaDecryptionKey").finish_non_exhaustive()
    }
}

/// RSA public key used to wrap content keys for a recipient.
pub struct RsaEncryptionKey {
    key: OaepPublicEncryptingKey,
}

impl RsaEncryptionKey {
    /// Creates an encryption key from a DER-encoded X.509 `SubjectPublicKeyInfo`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not a valid RSA public key.
    pub fn from_spki_der(der: &[u8]) -> Result<Self, EncryptionError> {
        let public_key = PublicEncryptingKey::from_der(der)
            .map_err(|e| EncryptionError::InvalidKey(format!("Invalid RSA public key: {e}")))?;
        Self::from_public_key(public_key)
    }

    fn from_public_key(public_key: PublicEncryptingKey) -> Result<Self, EncryptionError> {
        let key = OaepPublicEncryptingKey::new(public_key)
            .map_err(|e| EncryptionError::InvalidKey(format!("RSA key unusable for OAEP: {e}")))?;
        Ok(Self { key })
    }

    /// Wraps a content key for the holder of the matching private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the content key is too long for the modulus.
    pub fn wrap_key(
        &self,
        algorithm: KeyTransportAlgorithm,
        content_key: &[u8],
    ) -> Result<Vec<u8>, EncryptionError> {
        let mut output = vec![0u8; self.key.ciphertext_size()];
        let wrapped = self
            .key
            .encrypt(algorithm.oaep(), content_key, &mut output, None)
            .map_err(|e| EncryptionError::Encryption(format!("RSA-OAEP wrap failed: {e}")))?;
        Ok(wrapped.to_vec())
    }
}

impl std::fmt::Debug for RsaEncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaEncryptionKey").finish_non_exhaustive()
    }
}
