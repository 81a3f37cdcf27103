//! Identity provider and processor configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};
use crate::keys::{DecryptionKey, VerificationKey};
use crate::validation::ValidationContext;

/// When an assertion must carry a valid signature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureRequirement {
    /// Every assertion must be signed.
    #[default]
    Always,
    /// Only assertions that arrived in plaintext must be signed.
    PlaintextOnly,
    /// Signatures are checked when present but never required.
    Never,
}

impl SignatureRequirement {
    /// Returns true if an assertion must be signed.
    #[must_use]
    pub const fn is_required(self, was_encrypted: bool) -> bool {
        match self {
            Self::Always => true,
            Self::PlaintextOnly => !was_encrypted,
            Self::Never => false,
        }
    }
}

/// Everything the pipeline needs to know about one identity provider.
///
/// Key lists are ordered; the first key that works is used.
#[derive(Debug, Clone)]
pub struct IdentityProviderConfig {
    /// Entity ID of the identity provider.
    pub entity_id: String,
    /// Private keys for encrypted assertions, in trial order.
    pub decryption_keys: Vec<DecryptionKey>,
    /// Public keys for signatures, in trial order.
    pub verification_keys: Vec<VerificationKey>,
    /// Signature policy.
    pub signature_requirement: SignatureRequirement,
    /// Whether attribute values are base64 encoded.
    pub base64_encoded_attributes: bool,
}

impl IdentityProviderConfig {
    /// Creates a configuration without keys that requires signatures.
    #[must_use]
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            decryption_keys: Vec::new(),
            verification_keys: Vec::new(),
            signature_requirement: SignatureRequirement::default(),
            base64_encoded_attributes: false,
        }
    }

    /// Appends a decryption key.
    #[must_use]
    pub fn with_decryption_key(mut self, key: DecryptionKey) -> Self {
        self.decryption_keys.push(key);
        self
    }

    /// Appends a verification key.
    #[must_use]
    pub fn with_verification_key(mut self, key: VerificationKey) -> Self {
        self.verification_keys.push(key);
        self
    }

    /// Sets the signature policy.
    #[must_use]
    pub const fn with_signature_requirement(mut self, requirement: SignatureRequirement) -> Self {
        self.signature_requirement = requirement;
        self
    }

    /// Marks attribute values as base64 encoded.
    #[must_use]
    pub const fn with_base64_encoded_attributes(mut self, encoded: bool) -> Self {
        self.base64_encoded_attributes = encoded;
        self
    }

    /// Builds a configuration from its serialized settings.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Configuration`] if a key or certificate is invalid.
    pub fn from_settings(settings: &IdentityProviderSettings) -> SamlResult<Self> {
        let decryption_keys = settings
            .decryption_keys
            .iter()
            .enumerate()
            .map(|(index, pem)| {
                DecryptionKey::from_pem(pem).map(|key| key.with_name(format!("decryption-{index}")))
            })
            .collect::<SamlResult<Vec<_>>>()?;
        let verification_keys = settings
            .verification_certificates
            .iter()
            .map(|pem| VerificationKey::from_certificate_pem(pem))
            .collect::<SamlResult<Vec<_>>>()?;

        Ok(Self {
            entity_id: settings.entity_id.clone(),
            decryption_keys,
            verification_keys,
            signature_requirement: settings.signature_requirement,
            base64_encoded_attributes: settings.base64_encoded_attributes,
        })
    }
}

/// Serialized identity provider settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProviderSettings {
    /// Entity ID of the identity provider.
    pub entity_id: String,

    /// PEM `PRIVATE KEY` blocks, in trial order.
    #[serde(default)]
    pub decryption_keys: Vec<String>,

    /// PEM `CERTIFICATE` blocks, in trial order.
    #[serde(default)]
    pub verification_certificates: Vec<String>,

    /// Signature policy.
    #[serde(default)]
    pub signature_requirement: SignatureRequirement,

    /// Whether attribute values are base64 encoded.
    #[serde(default)]
    pub base64_encoded_attributes: bool,
}

/// Pipeline-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorSettings {
    /// Allowed clock skew in seconds.
    #[serde(default = "default_clock_skew_secs")]
    pub clock_skew_secs: u32,

    /// How long one-time-use assertions without an expiry are remembered.
    #[serde(default = "default_replay_horizon_secs")]
    pub replay_horizon_secs: u32,

    /// Whether the subject confirmation address must match the client.
    #[serde(default)]
    pub enforce_address: bool,

    /// Whether SHA-1 signatures are accepted.
    #[serde(default)]
    pub allow_sha1: bool,

    /// Expired replay entries are purged after every this many recorded
    /// assertions. Zero disables purging.
    #[serde(default = "default_replay_purge_interval")]
    pub replay_purge_interval: u32,
}

const fn default_clock_skew_secs() -> u32 {
    60
}

const fn default_replay_horizon_secs() -> u32 {
    3600
}

const fn default_replay_purge_interval() -> u32 {
    64
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            clock_skew_secs: default_clock_skew_secs(),
            replay_horizon_secs: default_replay_horizon_secs(),
            enforce_address: false,
            allow_sha1: false,
            replay_purge_interval: default_replay_purge_interval(),
        }
    }
}

impl ProcessorSettings {
    /// Parses settings from TOML; missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Configuration`] if the TOML is invalid.
    pub fn from_toml_str(content: &str) -> SamlResult<Self> {
        toml::from_str(content)
            .map_err(|e| SamlError::Configuration(format!("failed to parse settings: {e}")))
    }

    /// Sets the clock skew.
    #[must_use]
    pub const fn with_clock_skew_secs(mut self, secs: u32) -> Self {
        self.clock_skew_secs = secs;
        self
    }

    /// Sets the default replay horizon.
    #[must_use]
    pub const fn with_replay_horizon_secs(mut self, secs: u32) -> Self {
        self.replay_horizon_secs = secs;
        self
    }

    /// Enables address enforcement.
    #[must_use]
    pub const fn with_enforce_address(mut self, enforce: bool) -> Self {
        self.enforce_address = enforce;
        self
    }

    /// Allows SHA-1 signatures.
    #[must_use]
    pub const fn with_allow_sha1(mut self, allow: bool) -> Self {
        self.allow_sha1 = allow;
        self
    }

    /// Sets how many recorded assertions pass between replay store purges.
    #[must_use]
    pub const fn with_replay_purge_interval(mut self, interval: u32) -> Self {
        self.replay_purge_interval = interval;
        self
    }

    /// Allowed clock skew.
    #[must_use]
    pub fn clock_skew(&self) -> Duration {
        Duration::seconds(i64::from(self.clock_skew_secs))
    }

    /// Default replay horizon.
    #[must_use]
    pub fn replay_horizon(&self) -> Duration {
        Duration::seconds(i64::from(self.replay_horizon_secs))
    }

    /// Creates a validation context for the given audience using these settings.
    #[must_use]
    pub fn validation_context(&self, expected_audience: impl Into<String>) -> ValidationContext {
        ValidationContext::new(expected_audience)
            .with_clock_skew(self.clock_skew())
            .with_enforce_address(self.enforce_address)
    }
}
