//! Common test utilities and fixtures.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use kc_crypto::{KeySize, RsaDecryptionKey, RsaSigningKey};
use kc_saml_assertion::{
    AssertionElement, AssertionSigner, Attribute, AttributeStatement, AttributeValue, Conditions,
    DecryptionKey, Encrypter, IdentityProviderConfig, InMemoryReplayStore, NameId, Processor,
    Subject, SubjectConfirmation, SubjectConfirmationData, ValidationContext, VerificationKey,
};

/// Entity ID of the test identity provider.
pub const IDP_ENTITY_ID: &str = "https://idp.example.com";

/// Entity ID of the service provider under test.
pub const SP_ENTITY_ID: &str = "urn:sp:self";

/// Assertion consumer service URL of the service provider.
pub const ACS_URL: &str = "https://sp.example.com/saml/acs";

/// ID of the authentication request the responses answer.
pub const REQUEST_ID: &str = "_request-1";

/// A test identity provider and the service provider's view of it.
pub struct TestEnv {
    signer: AssertionSigner,
    /// Configuration the service provider holds for the identity provider.
    pub idp: IdentityProviderConfig,
    /// Replay store shared by processors built from this environment.
    pub replay_store: Arc<InMemoryReplayStore>,
}

impl TestEnv {
    /// Creates an environment with one decryption and one verification key.
    pub fn new() -> anyhow::Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("kc_saml_assertion=debug")
            .with_test_writer()
            .try_init();

        let signing_key = RsaSigningKey::generate(KeySize::Rsa2048)?;
        let idp = IdentityProviderConfig::new(IDP_ENTITY_ID)
            .with_decryption_key(generate_decryption_key("sp-encryption")?)
            .with_verification_key(
                VerificationKey::from_rsa_public_key_der(signing_key.public_key_der())
                    .with_name("idp-signing"),
            );

        Ok(Self {
            signer: AssertionSigner::new(signing_key),
            idp,
            replay_store: Arc::new(InMemoryReplayStore::new()),
        })
    }

    /// A processor sharing this environment's replay store.
    pub fn processor(&self) -> Processor {
        Processor::new(self.replay_store.clone())
    }

    /// Signs an assertion as the identity provider.
    pub fn sign(&self, assertion: &kc_saml_assertion::Assertion) -> anyhow::Result<AssertionElement> {
        Ok(self.signer.sign(assertion)?.into())
    }

    /// Signs and then encrypts an assertion for the service provider.
    pub fn sign_and_encrypt(
        &self,
        assertion: &kc_saml_assertion::Assertion,
    ) -> anyhow::Result<AssertionElement> {
        let signed = self.signer.sign(assertion)?;
        let encrypted =
            Encrypter::new().encrypt(&signed, self.idp.decryption_keys[0].encryption_key())?;
        Ok(encrypted.into())
    }
}

/// Generates a named decryption key.
pub fn generate_decryption_key(name: &str) -> anyhow::Result<DecryptionKey> {
    Ok(DecryptionKey::new(RsaDecryptionKey::generate(KeySize::Rsa2048)?).with_name(name))
}

/// A bearer assertion answering [`REQUEST_ID`], valid for five minutes from `now`.
pub fn assertion_at(id: &str, now: DateTime<Utc>) -> kc_saml_assertion::Assertion {
    kc_saml_assertion::Assertion::with_id(id, IDP_ENTITY_ID)
        .with_subject(
            Subject::new(NameId::persistent("user-1")).with_confirmation(bearer_confirmation(
                ACS_URL,
                now,
            )),
        )
        .with_conditions(
            Conditions::valid_between(Some(now), Some(now + Duration::minutes(5)))
                .with_audience(SP_ENTITY_ID),
        )
        .with_attribute_statement(
            AttributeStatement::new()
                .with_attribute(Attribute::single("mail", "user@example.com"))
                .with_attribute(Attribute::multi(
                    "groups",
                    vec!["admins".to_string(), "users".to_string()],
                ))
                .with_attribute(
                    Attribute::new("employeeNumber")
                        .with_value(AttributeValue::typed("xs:integer", "1042")),
                ),
        )
}

/// A bearer assertion valid from now.
pub fn assertion(id: &str) -> kc_saml_assertion::Assertion {
    assertion_at(id, Utc::now())
}

/// A bearer confirmation for the given recipient.
pub fn bearer_confirmation(recipient: &str, now: DateTime<Utc>) -> SubjectConfirmation {
    SubjectConfirmation::bearer().with_data(
        SubjectConfirmationData::for_request(REQUEST_ID, recipient)
            .valid_between(None, Some(now + Duration::minutes(5))),
    )
}

/// The validation context of the service provider at `now`.
pub fn context_at(now: DateTime<Utc>) -> ValidationContext {
    ValidationContext::new(SP_ENTITY_ID)
        .with_recipient(ACS_URL)
        .with_in_response_to(REQUEST_ID)
        .with_issuer(IDP_ENTITY_ID)
        .at(now)
}

/// The validation context of the service provider.
pub fn context() -> ValidationContext {
    context_at(Utc::now())
}
