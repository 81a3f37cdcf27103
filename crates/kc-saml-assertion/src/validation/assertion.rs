//! Assertion-level checks: version, issuer, validity window, audience,
//! session expiry and one-time use.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::error::{SamlError, SamlResult};
use crate::replay::ReplayStore;
use crate::types::{Assertion, SAML_VERSION};

use super::{ValidationCheck, ValidationContext, ValidationResult};

/// Validates the conditions of an assertion.
#[derive(Clone)]
pub struct AssertionValidator {
    replay_store: Arc<dyn ReplayStore>,
    replay_horizon: Duration,
    purge_interval: u32,
    /// Shared between clones so the purge cadence is per store.
    recorded: Arc<AtomicU64>,
}

impl std::fmt::Debug for AssertionValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssertionValidator")
            .field("replay_horizon", &self.replay_horizon)
            .field("purge_interval", &self.purge_interval)
            .finish_non_exhaustive()
    }
}

impl AssertionValidator {
    /// Creates a validator recording one-time-use assertions in `replay_store`.
    #[must_use]
    pub fn new(replay_store: Arc<dyn ReplayStore>) -> Self {
        Self {
            replay_store,
            replay_horizon: Duration::hours(1),
            purge_interval: 64,
            recorded: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Purges expired replay entries after every `interval` recorded
    /// assertions. Zero disables purging.
    #[must_use]
    pub const fn with_purge_interval(mut self, interval: u32) -> Self {
        self.purge_interval = interval;
        self
    }

    /// Sets how long one-time-use assertions without `NotOnOrAfter` are
    /// remembered.
    #[must_use]
    pub const fn with_replay_horizon(mut self, horizon: Duration) -> Self {
        self.replay_horizon = horizon;
        self
    }

    /// Validates the assertion and records it if it is one-time use.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::AssertionValidation`] with every failed check,
    /// or [`SamlError::Storage`] if the replay store fails.
    pub fn validate(&self, assertion: &Assertion, context: &ValidationContext) -> SamlResult<()> {
        self.check(assertion, context)?;
        self.record(assertion, context)
    }

    /// Validates the assertion without recording it.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::AssertionValidation`] with every failed check,
    /// or [`SamlError::Storage`] if the replay store fails.
    pub fn check(&self, assertion: &Assertion, context: &ValidationContext) -> SamlResult<()> {
        let result = self.evaluate(assertion, context)?;
        if result.is_valid() {
            Ok(())
        } else {
            Err(rejected(assertion, result))
        }
    }

    /// Runs every check without recording anything.
    ///
    /// A one-time-use assertion that is already in the replay store fails
    /// here; recording happens in [`record`](Self::record).
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Storage`] if the replay store fails.
    pub fn evaluate(
        &self,
        assertion: &Assertion,
        context: &ValidationContext,
    ) -> SamlResult<ValidationResult> {
        let mut result = ValidationResult::new();

        if assertion.version() != SAML_VERSION {
            result.push(
                ValidationCheck::Version,
                format!("unsupported SAML version {}", assertion.version()),
            );
        }

        if assertion.issuer().trim().is_empty() {
            result.push(ValidationCheck::Issuer, "issuer is empty");
        } else if let Some(expected) = &context.expected_issuer {
            if assertion.issuer() != expected {
                result.push(
                    ValidationCheck::Issuer,
                    format!("issued by {}, expected {expected}", assertion.issuer()),
                );
            }
        }

        if let Some(conditions) = assertion.conditions() {
            if let Some(not_before) = conditions.not_before {
                if !context.reached(not_before) {
                    result.push(
                        ValidationCheck::TemporalBounds,
                        format!("not valid before {not_before}"),
                    );
                }
            }
            if let Some(not_on_or_after) = conditions.not_on_or_after {
                if !context.before(not_on_or_after) {
                    result.push(
                        ValidationCheck::TemporalBounds,
                        format!("expired at {not_on_or_after}"),
                    );
                }
            }

            if !conditions.audience_restrictions.is_empty()
                && !conditions
                    .audience_restrictions
                    .iter()
                    .any(|restriction| restriction.audiences.contains(&context.expected_audience))
            {
                result.push(
                    ValidationCheck::AudienceRestriction,
                    format!("not intended for {}", context.expected_audience),
                );
            }
        }

        for statement in assertion.authn_statements() {
            if let Some(session_end) = statement.session_not_on_or_after {
                if !context.before(session_end) {
                    result.push(
                        ValidationCheck::SessionExpiry,
                        format!("session ended at {session_end}"),
                    );
                }
            }
        }

        if is_one_time_use(assertion) {
            if assertion.id().is_empty() {
                result.push(ValidationCheck::Replay, "one-time-use assertion has no ID");
            } else if self.replay_store.contains(assertion.id(), context.now)? {
                result.push(ValidationCheck::Replay, "assertion was already used");
            }
        }

        Ok(result)
    }

    /// Rejects a batch that carries the same one-time-use assertion twice.
    ///
    /// Each copy would pass [`check`](Self::check) on its own since nothing
    /// is recorded until the whole batch is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::AssertionValidation`] with a replay violation.
    pub fn check_unique<'a>(
        &self,
        assertions: impl IntoIterator<Item = &'a Assertion>,
    ) -> SamlResult<()> {
        let mut seen = HashSet::new();
        for assertion in assertions.into_iter().filter(|a| is_one_time_use(a)) {
            if !seen.insert(assertion.id()) {
                let mut result = ValidationResult::new();
                result.push(
                    ValidationCheck::Replay,
                    "one-time-use assertion appears more than once in the batch",
                );
                return Err(rejected(assertion, result));
            }
        }
        Ok(())
    }

    /// Records every one-time-use assertion of a batch, or none of them.
    ///
    /// If an ID turns out to be recorded already, the IDs recorded by this
    /// call are removed again before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`record`](Self::record).
    pub fn record_all<'a>(
        &self,
        assertions: impl IntoIterator<Item = &'a Assertion>,
        context: &ValidationContext,
    ) -> SamlResult<()> {
        let mut recorded: Vec<&Assertion> = Vec::new();
        for assertion in assertions {
            if let Err(e) = self.record(assertion, context) {
                for earlier in recorded.iter().filter(|a| is_one_time_use(a)) {
                    if let Err(undo) = self.replay_store.remove(earlier.id()) {
                        tracing::warn!(
                            assertion_id = %earlier.id(),
                            error = %undo,
                            "Failed to release replay entry of rejected batch"
                        );
                    }
                }
                return Err(e);
            }
            recorded.push(assertion);
        }
        Ok(())
    }

    /// Records a one-time-use assertion in the replay store.
    ///
    /// The check and the insert are one atomic step, so of two concurrent
    /// calls for the same ID only one succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::AssertionValidation`] if the ID was recorded in
    /// the meantime, or [`SamlError::Storage`] if the replay store fails.
    pub fn record(&self, assertion: &Assertion, context: &ValidationContext) -> SamlResult<()> {
        if !is_one_time_use(assertion) {
            return Ok(());
        }
        let expires_at = self.replay_expiry(assertion, context);
        if self
            .replay_store
            .check_and_insert(assertion.id(), expires_at, context.now)?
        {
            tracing::debug!(
                assertion_id = %assertion.id(),
                %expires_at,
                "One-time-use assertion recorded"
            );
            self.sweep(context.now);
            return Ok(());
        }

        let mut result = ValidationResult::new();
        result.push(ValidationCheck::Replay, "assertion was already used");
        Err(rejected(assertion, result))
    }

    fn sweep(&self, now: DateTime<Utc>) {
        if self.purge_interval == 0 {
            return;
        }
        let recorded = self.recorded.fetch_add(1, Ordering::Relaxed) + 1;
        if recorded % u64::from(self.purge_interval) != 0 {
            return;
        }
        if let Err(e) = self.replay_store.purge_expired(now) {
            tracing::warn!(error = %e, "Replay store purge failed");
        }
    }

    fn replay_expiry(&self, assertion: &Assertion, context: &ValidationContext) -> DateTime<Utc> {
        assertion
            .conditions()
            .and_then(|conditions| conditions.not_on_or_after)
            .map_or(context.now + self.replay_horizon, |not_on_or_after| {
                not_on_or_after + context.clock_skew
            })
    }
}

fn is_one_time_use(assertion: &Assertion) -> bool {
    assertion
        .conditions()
        .is_some_and(|conditions| conditions.one_time_use)
}

fn rejected(assertion: &Assertion, result: ValidationResult) -> SamlError {
    let reasons = result.into_violations();
    tracing::warn!(
        assertion_id = %assertion.id(),
        issuer = %assertion.issuer(),
        reasons = ?reasons.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "Assertion rejected"
    );
    SamlError::AssertionValidation { reasons }
}
