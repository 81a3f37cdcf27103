//! XML Encryption structures carried inside SAML assertions.
//!
//! An `EncryptedAssertion`, `EncryptedAttribute` or `EncryptedID` wraps an
//! `xenc:EncryptedData` holding the symmetrically encrypted element and one
//! or more `xenc:EncryptedKey`s transporting the symmetric key, either inside
//! the data's `ds:KeyInfo` or as siblings of it.

use serde::{Deserialize, Serialize};

/// An encryption method with its optional key transport parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionMethod {
    /// Algorithm URI.
    pub algorithm: String,

    /// OAEP digest method URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest_method: Option<String>,

    /// OAEP mask generation function URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mgf: Option<String>,
}

impl EncryptionMethod {
    /// Creates a method with only an algorithm URI.
    #[must_use]
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            digest_method: None,
            mgf: None,
        }
    }
}

/// `xenc:EncryptedKey`: a symmetric key encrypted for one recipient key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedKey {
    /// Element ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Intended recipient entity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,

    /// Key transport algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_method: Option<EncryptionMethod>,

    /// Name of the key the symmetric key was encrypted with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,

    /// Base64 encoded wrapped key.
    pub cipher_value: String,
}

/// `ds:KeyInfo` of encrypted data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    /// Name of the key the data was encrypted with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,

    /// Keys transported inline.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub encrypted_keys: Vec<EncryptedKey>,

    /// `URI`s of `ds:RetrievalMethod` references to sibling keys.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retrieval_uris: Vec<String>,
}

/// `xenc:EncryptedData`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    /// Element ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Type URI, `xmlenc#Element` for encrypted elements.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_uri: Option<String>,

    /// Content encryption algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_method: Option<EncryptionMethod>,

    /// Key information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_info: Option<KeyInfo>,

    /// Base64 encoded ciphertext.
    pub cipher_value: String,
}

/// Encrypted data together with the keys that can unlock it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedElement {
    /// The encrypted payload.
    pub encrypted_data: EncryptedData,

    /// `EncryptedKey`s that are siblings of the data.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub encrypted_keys: Vec<EncryptedKey>,
}

impl EncryptedElement {
    /// Iterates over every transported key: inline keys first, then siblings.
    pub fn candidate_keys(&self) -> impl Iterator<Item = &EncryptedKey> {
        self.encrypted_data
            .key_info
            .iter()
            .flat_map(|info| info.encrypted_keys.iter())
            .chain(self.encrypted_keys.iter())
    }
}

/// `saml:EncryptedAssertion`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedAssertion {
    /// The encrypted assertion.
    pub encrypted: EncryptedElement,
}

/// `saml:EncryptedAttribute`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedAttribute {
    /// The encrypted attribute.
    pub encrypted: EncryptedElement,
}

/// `saml:EncryptedID`, an encrypted `saml:NameID`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedId {
    /// The encrypted name identifier.
    pub encrypted: EncryptedElement,
}
