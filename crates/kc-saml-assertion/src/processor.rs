//! The assertion processing pipeline.
//!
//! [`Processor::process`] takes the assertion elements of one response and
//! either returns all of them decrypted, verified, validated and transformed,
//! in input order, or fails as a whole. Each step runs over the entire batch
//! before the next one starts:
//!
//! 1. Reject the batch if any element is not an assertion
//! 2. Decrypt encrypted assertions
//! 3. Verify signatures
//! 4. Validate assertion conditions and subject confirmations, and reject
//!    one-time-use assertions that appear twice
//! 5. Decrypt encrypted name IDs and attributes and transform attribute values
//! 6. Record one-time-use assertions in the replay store
//!
//! Nothing is recorded unless every earlier step succeeded for the whole
//! batch, so a rejected batch can be retried.

use std::sync::Arc;

use crate::config::{IdentityProviderConfig, ProcessorSettings};
use crate::decrypter::Decrypter;
use crate::error::{SamlError, SamlResult};
use crate::keys::{ConfiguredKeyResolver, KeyResolver};
use crate::replay::ReplayStore;
use crate::signature::{SignatureValidator, VerificationOutcome};
use crate::transformer::{Base64Transformer, TransformedAttributes, Transformer, TypedValueTransformer};
use crate::types::{Assertion, AssertionElement, NameId};
use crate::validation::{
    AssertionValidator, SubjectConfirmationValidator, ValidationContext,
};

/// An assertion that passed the whole pipeline.
#[derive(Debug, Clone)]
pub struct ValidatedAssertion {
    assertion: Assertion,
    name_id: Option<NameId>,
    attributes: TransformedAttributes,
    signature: VerificationOutcome,
    was_encrypted: bool,
}

impl ValidatedAssertion {
    /// The validated assertion.
    #[must_use]
    pub const fn assertion(&self) -> &Assertion {
        &self.assertion
    }

    /// The subject's name identifier, decrypted if it arrived as an
    /// `EncryptedID`.
    #[must_use]
    pub const fn name_id(&self) -> Option<&NameId> {
        self.name_id.as_ref()
    }

    /// Attributes converted by the transformer, including decrypted ones.
    #[must_use]
    pub const fn attributes(&self) -> &TransformedAttributes {
        &self.attributes
    }

    /// Outcome of the signature check.
    #[must_use]
    pub const fn signature(&self) -> &VerificationOutcome {
        &self.signature
    }

    /// Whether the assertion arrived encrypted.
    #[must_use]
    pub const fn was_encrypted(&self) -> bool {
        self.was_encrypted
    }

    /// Consumes this value, returning the assertion.
    #[must_use]
    pub fn into_assertion(self) -> Assertion {
        self.assertion
    }
}

/// Orchestrates decryption, verification, validation and transformation.
#[derive(Clone)]
pub struct Processor {
    settings: ProcessorSettings,
    key_resolver: Arc<dyn KeyResolver>,
    decrypter: Decrypter,
    signature_validator: SignatureValidator,
    assertion_validator: AssertionValidator,
    subject_validator: SubjectConfirmationValidator,
    transformer: Option<Arc<dyn Transformer>>,
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Processor {
    /// Creates a processor with default settings that records one-time-use
    /// assertions in `replay_store`.
    #[must_use]
    pub fn new(replay_store: Arc<dyn ReplayStore>) -> Self {
        let key_resolver: Arc<dyn KeyResolver> = Arc::new(ConfiguredKeyResolver);
        let settings = ProcessorSettings::default();
        Self {
            decrypter: Decrypter::new(key_resolver.clone()),
            signature_validator: SignatureValidator::new().allow_sha1(settings.allow_sha1),
            assertion_validator: AssertionValidator::new(replay_store)
                .with_replay_horizon(settings.replay_horizon())
                .with_purge_interval(settings.replay_purge_interval),
            subject_validator: SubjectConfirmationValidator::new(),
            key_resolver,
            transformer: None,
            settings,
        }
    }

    /// Applies pipeline settings.
    ///
    /// Clock skew and address enforcement are carried by the
    /// [`ValidationContext`]; see [`ProcessorSettings::validation_context`].
    #[must_use]
    pub fn with_settings(mut self, settings: ProcessorSettings) -> Self {
        self.signature_validator = SignatureValidator::new().allow_sha1(settings.allow_sha1);
        self.assertion_validator = self
            .assertion_validator
            .with_replay_horizon(settings.replay_horizon())
            .with_purge_interval(settings.replay_purge_interval);
        self.settings = settings;
        self
    }

    /// Uses a custom key resolver for decryption and verification keys.
    #[must_use]
    pub fn with_key_resolver(mut self, key_resolver: Arc<dyn KeyResolver>) -> Self {
        self.decrypter = Decrypter::new(key_resolver.clone());
        self.key_resolver = key_resolver;
        self
    }

    /// Uses a fixed attribute transformer for every identity provider.
    ///
    /// Without one, values are converted by their schema type, or base64
    /// decoded for identity providers that encode attributes.
    #[must_use]
    pub fn with_transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// The pipeline settings.
    #[must_use]
    pub const fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    /// Decrypts every element, preserving order.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::UnsupportedAssertionType`] if any element is not
    /// an assertion, before anything is decrypted, or the first decryption
    /// error.
    pub fn decrypt_assertions(
        &self,
        elements: Vec<AssertionElement>,
        idp: &IdentityProviderConfig,
    ) -> SamlResult<Vec<Assertion>> {
        Ok(self
            .decrypt_all(elements, idp)?
            .into_iter()
            .map(|(assertion, _)| assertion)
            .collect())
    }

    /// Runs the whole pipeline over the assertion elements of one response.
    ///
    /// # Errors
    ///
    /// Fails on the first unrecoverable problem and returns nothing else:
    /// - [`SamlError::UnsupportedAssertionType`] if any element is not an assertion
    /// - [`SamlError::DecryptionFailed`] if an encrypted assertion, name ID or
    ///   attribute cannot be opened
    /// - [`SamlError::InvalidAssertion`] if a required signature is missing or invalid
    /// - [`SamlError::AssertionValidation`] if assertion conditions fail
    /// - [`SamlError::SubjectConfirmationValidation`] if no subject confirmation holds
    /// - [`SamlError::Transformation`] if attribute values cannot be converted
    pub fn process(
        &self,
        elements: Vec<AssertionElement>,
        idp: &IdentityProviderConfig,
        context: &ValidationContext,
    ) -> SamlResult<Vec<ValidatedAssertion>> {
        let assertions = self.decrypt_all(elements, idp)?;

        let verification_keys = self.key_resolver.verification_keys(idp);
        let mut verified = Vec::with_capacity(assertions.len());
        for (assertion, was_encrypted) in assertions {
            let outcome = self.check_signature(&assertion, was_encrypted, idp, &verification_keys)?;
            verified.push((assertion, was_encrypted, outcome));
        }

        for (assertion, _, _) in &verified {
            self.assertion_validator.check(assertion, context)?;
            self.subject_validator.validate_subject(assertion, context)?;
        }
        self.assertion_validator
            .check_unique(verified.iter().map(|(assertion, _, _)| assertion))?;

        let transformer = self.transformer_for(idp);
        let mut validated = Vec::with_capacity(verified.len());
        for (assertion, was_encrypted, signature) in verified {
            let name_id = match assertion.subject() {
                Some(subject) => self.decrypter.subject_name_id(subject, idp)?,
                None => None,
            };
            let mut attributes = TransformedAttributes::new();
            for statement in assertion.attribute_statements() {
                let statement = self.decrypter.decrypt_attribute_statement(statement, idp)?;
                attributes.merge(transformer.transform(&statement)?);
            }
            validated.push(ValidatedAssertion {
                assertion,
                name_id,
                attributes,
                signature,
                was_encrypted,
            });
        }

        // Only record once the whole batch is known to be valid.
        self.assertion_validator
            .record_all(validated.iter().map(ValidatedAssertion::assertion), context)?;

        tracing::info!(
            idp = %idp.entity_id,
            count = validated.len(),
            "Assertions accepted"
        );
        Ok(validated)
    }

    fn decrypt_all(
        &self,
        elements: Vec<AssertionElement>,
        idp: &IdentityProviderConfig,
    ) -> SamlResult<Vec<(Assertion, bool)>> {
        if let Some(AssertionElement::Unsupported { name }) = elements
            .iter()
            .find(|element| matches!(element, AssertionElement::Unsupported { .. }))
        {
            tracing::warn!(element = %name, idp = %idp.entity_id, "Unsupported assertion element");
            return Err(SamlError::UnsupportedAssertionType {
                element: name.clone(),
            });
        }

        elements
            .into_iter()
            .map(|element| {
                let was_encrypted = element.is_encrypted();
                self.decrypter
                    .decrypt_element(element, idp)
                    .map(|assertion| (assertion, was_encrypted))
            })
            .collect()
    }

    fn check_signature(
        &self,
        assertion: &Assertion,
        was_encrypted: bool,
        idp: &IdentityProviderConfig,
        keys: &[crate::keys::VerificationKey],
    ) -> SamlResult<VerificationOutcome> {
        let outcome = self.signature_validator.verify(assertion, keys);
        if outcome.valid {
            return Ok(outcome);
        }

        let reason = outcome.failure.clone().unwrap_or_default();
        if idp.signature_requirement.is_required(was_encrypted) {
            tracing::warn!(
                assertion_id = %assertion.id(),
                idp = %idp.entity_id,
                reason = %reason,
                "Required assertion signature missing or invalid"
            );
            return Err(SamlError::InvalidAssertion(format!(
                "signature of assertion {} not valid: {reason}",
                assertion.id()
            )));
        }

        if assertion.is_signed() {
            tracing::warn!(
                assertion_id = %assertion.id(),
                reason = %reason,
                "Ignoring invalid signature on assertion that need not be signed"
            );
        }
        Ok(outcome)
    }

    fn transformer_for(&self, idp: &IdentityProviderConfig) -> Arc<dyn Transformer> {
        match &self.transformer {
            Some(transformer) => transformer.clone(),
            None if idp.base64_encoded_attributes => Arc::new(Base64Transformer),
            None => Arc::new(TypedValueTransformer),
        }
    }
}
