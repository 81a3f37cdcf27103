//! Assertion and subject confirmation validation.
//!
//! Validators evaluate every check and collect the failures as
//! [`Violation`]s instead of stopping at the first one, so a rejected
//! assertion can be logged with everything that was wrong with it.

mod assertion;
mod subject_confirmation;

pub use assertion::AssertionValidator;
pub use subject_confirmation::SubjectConfirmationValidator;

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default allowed clock skew.
pub const DEFAULT_CLOCK_SKEW_SECS: i64 = 60;

/// The check a violation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCheck {
    /// `NotBefore` / `NotOnOrAfter` bounds.
    TemporalBounds,
    /// Audience restrictions.
    AudienceRestriction,
    /// One-time use.
    Replay,
    /// Issuer presence and identity.
    Issuer,
    /// SAML version.
    Version,
    /// `SessionNotOnOrAfter` of authentication statements.
    SessionExpiry,
    /// Subject confirmation recipient.
    Recipient,
    /// Subject confirmation `InResponseTo`.
    InResponseTo,
    /// Subject confirmation address.
    Address,
    /// Missing subject or subject confirmation.
    NoSubjectConfirmation,
}

impl ValidationCheck {
    /// Stable name of the check.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TemporalBounds => "temporal_bounds",
            Self::AudienceRestriction => "audience_restriction",
            Self::Replay => "replay",
            Self::Issuer => "issuer",
            Self::Version => "version",
            Self::SessionExpiry => "session_expiry",
            Self::Recipient => "recipient",
            Self::InResponseTo => "in_response_to",
            Self::Address => "address",
            Self::NoSubjectConfirmation => "no_subject_confirmation",
        }
    }
}

impl fmt::Display for ValidationCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed check with an explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// The failed check.
    pub check: ValidationCheck,
    /// What was wrong.
    pub detail: String,
}

impl Violation {
    /// Creates a violation.
    #[must_use]
    pub fn new(check: ValidationCheck, detail: impl Into<String>) -> Self {
        Self {
            check,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.check, self.detail)
    }
}

/// Violations collected in evaluation order. Empty means valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    violations: Vec<Violation>,
}

impl ValidationResult {
    /// Creates an empty (passing) result.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            violations: Vec::new(),
        }
    }

    /// Records a violation.
    pub fn push(&mut self, check: ValidationCheck, detail: impl Into<String>) {
        self.violations.push(Violation::new(check, detail));
    }

    /// Returns true if no check failed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Returns true if the given check failed.
    #[must_use]
    pub fn has(&self, check: ValidationCheck) -> bool {
        self.violations.iter().any(|v| v.check == check)
    }

    /// The violations in evaluation order.
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Consumes the result, returning its violations.
    #[must_use]
    pub fn into_violations(self) -> Vec<Violation> {
        self.violations
    }
}

/// What the service provider expects of the assertions in one response.
///
/// Built per call; `now` is injectable so validation is deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationContext {
    /// Entity ID of this service provider.
    pub expected_audience: String,
    /// Assertion consumer service URL the response was posted to.
    pub expected_recipient: Option<String>,
    /// ID of the request this response answers; `None` for unsolicited responses.
    pub expected_in_response_to: Option<String>,
    /// Entity ID the issuer must match, if set.
    pub expected_issuer: Option<String>,
    /// Validation time.
    pub now: DateTime<Utc>,
    /// Allowed clock skew.
    pub clock_skew: Duration,
    /// Address of the client presenting the assertion.
    pub client_address: Option<String>,
    /// Whether subject confirmation addresses are enforced.
    pub enforce_address: bool,
}

impl ValidationContext {
    /// Creates a context for the given audience, validating at the current time.
    #[must_use]
    pub fn new(expected_audience: impl Into<String>) -> Self {
        Self {
            expected_audience: expected_audience.into(),
            expected_recipient: None,
            expected_in_response_to: None,
            expected_issuer: None,
            now: Utc::now(),
            clock_skew: Duration::seconds(DEFAULT_CLOCK_SKEW_SECS),
            client_address: None,
            enforce_address: false,
        }
    }

    /// Sets the expected recipient.
    #[must_use]
    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.expected_recipient = Some(recipient.into());
        self
    }

    /// Sets the expected `InResponseTo`.
    #[must_use]
    pub fn with_in_response_to(mut self, request_id: impl Into<String>) -> Self {
        self.expected_in_response_to = Some(request_id.into());
        self
    }

    /// Sets the expected issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.expected_issuer = Some(issuer.into());
        self
    }

    /// Validates at the given time instead of now.
    #[must_use]
    pub const fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Sets the allowed clock skew.
    #[must_use]
    pub const fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Sets the client address.
    #[must_use]
    pub fn with_client_address(mut self, address: impl Into<String>) -> Self {
        self.client_address = Some(address.into());
        self
    }

    /// Enables address enforcement.
    #[must_use]
    pub const fn with_enforce_address(mut self, enforce: bool) -> Self {
        self.enforce_address = enforce;
        self
    }

    /// Returns true if `not_before` has been reached, allowing for skew.
    pub(crate) fn reached(&self, not_before: DateTime<Utc>) -> bool {
        not_before <= self.now + self.clock_skew
    }

    /// Returns true if `not_on_or_after` has not passed, allowing for skew.
    pub(crate) fn before(&self, not_on_or_after: DateTime<Utc>) -> bool {
        self.now - self.clock_skew < not_on_or_after
    }
}
