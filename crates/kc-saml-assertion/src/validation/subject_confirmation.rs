//! Bearer subject confirmation validation.

use crate::error::{SamlError, SamlResult};
use crate::types::{Assertion, SubjectConfirmation};

use super::{ValidationCheck, ValidationContext, ValidationResult};

/// Validates the subject confirmations of an assertion.
///
/// Only the bearer method is checked; confirmations using other methods are
/// accepted as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubjectConfirmationValidator;

impl SubjectConfirmationValidator {
    /// Creates a validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Checks one subject confirmation.
    #[must_use]
    pub fn validate(
        &self,
        confirmation: &SubjectConfirmation,
        context: &ValidationContext,
    ) -> ValidationResult {
        let mut result = ValidationResult::new();
        if !confirmation.is_bearer() {
            tracing::debug!(method = %confirmation.method, "Subject confirmation method not checked");
            return result;
        }
        let Some(data) = &confirmation.subject_confirmation_data else {
            return result;
        };

        if let Some(recipient) = &data.recipient {
            match &context.expected_recipient {
                Some(expected) if expected == recipient => {}
                Some(expected) => result.push(
                    ValidationCheck::Recipient,
                    format!("recipient {recipient}, expected {expected}"),
                ),
                None => result.push(
                    ValidationCheck::Recipient,
                    format!("recipient {recipient} but no recipient expected"),
                ),
            }
        }

        if let Some(not_on_or_after) = data.not_on_or_after {
            if !context.before(not_on_or_after) {
                result.push(
                    ValidationCheck::TemporalBounds,
                    format!("confirmation expired at {not_on_or_after}"),
                );
            }
        }
        if let Some(not_before) = data.not_before {
            if !context.reached(not_before) {
                result.push(
                    ValidationCheck::TemporalBounds,
                    format!("confirmation not valid before {not_before}"),
                );
            }
        }

        // Unsolicited responses have nothing to compare against.
        if let (Some(in_response_to), Some(expected)) =
            (&data.in_response_to, &context.expected_in_response_to)
        {
            if in_response_to != expected {
                result.push(
                    ValidationCheck::InResponseTo,
                    format!("in response to {in_response_to}, expected {expected}"),
                );
            }
        }

        if context.enforce_address {
            if let Some(address) = &data.address {
                match &context.client_address {
                    Some(client) if client == address => {}
                    Some(client) => result.push(
                        ValidationCheck::Address,
                        format!("address {address} does not match client {client}"),
                    ),
                    None => result.push(
                        ValidationCheck::Address,
                        format!("address {address} but client address unknown"),
                    ),
                }
            }
        }

        result
    }

    /// Checks that at least one subject confirmation of the assertion holds.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SubjectConfirmationValidation`] with the
    /// violations of the confirmation that came closest to passing.
    pub fn validate_subject(
        &self,
        assertion: &Assertion,
        context: &ValidationContext,
    ) -> SamlResult<()> {
        let confirmations = assertion
            .subject()
            .map(|subject| subject.subject_confirmations.as_slice())
            .unwrap_or_default();
        if confirmations.is_empty() {
            let mut result = ValidationResult::new();
            result.push(
                ValidationCheck::NoSubjectConfirmation,
                "assertion has no subject confirmation",
            );
            return Err(rejected(assertion, result));
        }

        let mut best: Option<ValidationResult> = None;
        for confirmation in confirmations {
            let result = self.validate(confirmation, context);
            if result.is_valid() {
                return Ok(());
            }
            if best
                .as_ref()
                .map_or(true, |b| result.violations().len() < b.violations().len())
            {
                best = Some(result);
            }
        }

        Err(rejected(assertion, best.unwrap_or_default()))
    }
}

fn rejected(assertion: &Assertion, result: ValidationResult) -> SamlError {
    let reasons = result.into_violations();
    tracing::warn!(
        assertion_id = %assertion.id(),
        reasons = ?reasons.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "Subject confirmation rejected"
    );
    SamlError::SubjectConfirmationValidation { reasons }
}
