//! Pipeline integration tests.
//!
//! Runs signed and encrypted assertions through the whole processor the
//! way a service provider does for an incoming response.

use chrono::{Duration, Utc};
use kc_saml_assertion::{
    AssertionElement, AudienceRestriction, Conditions, Decrypter, Encrypter,
    IdentityProviderConfig, NameId, SamlError, SignatureRequirement, Subject, TypedValue,
    ValidationCheck, UNSUPPORTED_ASSERTION_TYPE_MESSAGE,
};

use crate::common::{
    assertion, assertion_at, bearer_confirmation, context, context_at, generate_decryption_key,
    TestEnv, ACS_URL, IDP_ENTITY_ID, SP_ENTITY_ID,
};

fn checks(err: &SamlError) -> Vec<ValidationCheck> {
    err.reasons().iter().map(|violation| violation.check).collect()
}

/// Mixed plaintext and encrypted input comes out as plaintext, in order.
#[test]
fn test_mixed_batch_is_decrypted_in_order() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let elements = vec![
        env.sign_and_encrypt(&assertion("_a1"))?,
        env.sign(&assertion("_a2"))?,
        env.sign_and_encrypt(&assertion("_a3"))?,
    ];

    let validated = env.processor().process(elements, &env.idp, &context())?;

    let ids: Vec<_> = validated.iter().map(|v| v.assertion().id()).collect();
    assert_eq!(ids, ["_a1", "_a2", "_a3"]);
    let encrypted: Vec<_> = validated.iter().map(|v| v.was_encrypted()).collect();
    assert_eq!(encrypted, [true, false, true]);
    for item in &validated {
        assert!(item.signature().valid);
        assert_eq!(item.signature().matched_key_index, Some(0));
        assert_eq!(
            item.attributes().first("employeeNumber"),
            Some(&TypedValue::Integer(1042))
        );
    }
    Ok(())
}

/// Decrypting a plaintext assertion is the identity.
#[test]
fn test_decryption_is_idempotent() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let processor = env.processor();

    let once = processor.decrypt_assertions(
        vec![env.sign_and_encrypt(&assertion("_a1"))?, env.sign(&assertion("_a2"))?],
        &env.idp,
    )?;
    let twice = processor.decrypt_assertions(
        once.iter().cloned().map(AssertionElement::from).collect(),
        &env.idp,
    )?;

    assert_eq!(twice, once);
    assert!(once.iter().all(|a| a.is_signed()));
    Ok(())
}

/// A non-assertion anywhere in the batch rejects the whole batch.
#[test]
fn test_unsupported_element_in_any_position() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let response = AssertionElement::from_xml(
        r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_r"/>"#,
    )?;

    for position in 0..3 {
        let mut elements = vec![
            env.sign(&assertion(&format!("_a{position}")))?,
            env.sign_and_encrypt(&assertion(&format!("_b{position}")))?,
        ];
        elements.insert(position, response.clone());

        let err = env
            .processor()
            .process(elements, &env.idp, &context())
            .unwrap_err();
        assert!(matches!(err, SamlError::UnsupportedAssertionType { .. }));
        assert_eq!(err.to_string(), UNSUPPORTED_ASSERTION_TYPE_MESSAGE);
        assert!(err.is_invalid_assertion());
    }
    Ok(())
}

/// An assertion that only becomes valid in an hour is rejected.
#[test]
fn test_not_yet_valid_assertion_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let now = Utc::now();
    let future = assertion("_a1").with_conditions(
        Conditions::valid_between(Some(now + Duration::hours(1)), None).with_audience(SP_ENTITY_ID),
    );

    let err = env
        .processor()
        .process(vec![env.sign(&future)?], &env.idp, &context_at(now))
        .unwrap_err();
    assert!(matches!(err, SamlError::AssertionValidation { .. }));
    assert_eq!(checks(&err), [ValidationCheck::TemporalBounds]);
    Ok(())
}

/// An assertion that expired an hour ago is rejected.
#[test]
fn test_expired_assertion_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let now = Utc::now();
    let expired = assertion("_a1").with_conditions(
        Conditions::valid_between(None, Some(now - Duration::hours(1))).with_audience(SP_ENTITY_ID),
    );

    let err = env
        .processor()
        .process(vec![env.sign(&expired)?], &env.idp, &context_at(now))
        .unwrap_err();
    assert_eq!(checks(&err), [ValidationCheck::TemporalBounds]);
    Ok(())
}

/// The service provider must be in at least one audience restriction.
#[test]
fn test_audience_restriction() -> anyhow::Result<()> {
    let env = TestEnv::new()?;

    let other = assertion("_a1").with_conditions(Conditions::with_validity(5).with_audience("urn:sp:other"));
    let err = env
        .processor()
        .process(vec![env.sign(&other)?], &env.idp, &context())
        .unwrap_err();
    assert_eq!(checks(&err), [ValidationCheck::AudienceRestriction]);

    let mut shared = Conditions::with_validity(5);
    shared.audience_restrictions.push(AudienceRestriction {
        audiences: vec![SP_ENTITY_ID.to_string(), "urn:sp:other".to_string()],
    });
    let shared = assertion("_a2").with_conditions(shared);
    assert!(env
        .processor()
        .process(vec![env.sign(&shared)?], &env.idp, &context())
        .is_ok());
    Ok(())
}

/// A one-time-use assertion is accepted once until its replay entry expires.
#[test]
fn test_one_time_use_replay() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let processor = env.processor();
    let now = Utc::now();
    let one_time = assertion_at("A1", now).with_conditions(
        Conditions::valid_between(Some(now), Some(now + Duration::minutes(5)))
            .with_audience(SP_ENTITY_ID)
            .one_time_use(),
    );

    processor.process(vec![env.sign(&one_time)?], &env.idp, &context_at(now))?;

    let err = processor
        .process(vec![env.sign(&one_time)?], &env.idp, &context_at(now))
        .unwrap_err();
    assert_eq!(checks(&err), [ValidationCheck::Replay]);

    // Once the entry has expired the same ID is accepted again.
    let later = now + Duration::minutes(10);
    let reissued = assertion_at("A1", later).with_conditions(
        Conditions::valid_between(Some(later), Some(later + Duration::minutes(5)))
            .with_audience(SP_ENTITY_ID)
            .one_time_use(),
    );
    processor.process(vec![env.sign(&reissued)?], &env.idp, &context_at(later))?;
    Ok(())
}

/// One matching subject confirmation is enough.
#[test]
fn test_any_subject_confirmation_may_match() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let now = Utc::now();
    let subject = Subject::new(NameId::persistent("user-1"))
        .with_confirmation(bearer_confirmation("https://wrong.example.com/acs", now))
        .with_confirmation(bearer_confirmation(ACS_URL, now));
    let assertion = assertion_at("_a1", now).with_subject(subject);

    assert!(env
        .processor()
        .process(vec![env.sign(&assertion)?], &env.idp, &context_at(now))
        .is_ok());
    Ok(())
}

/// No matching subject confirmation is a subject confirmation failure.
#[test]
fn test_no_subject_confirmation_matches() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let now = Utc::now();
    let subject = Subject::new(NameId::persistent("user-1"))
        .with_confirmation(bearer_confirmation("https://wrong.example.com/acs", now));
    let assertion = assertion_at("_a1", now).with_subject(subject);

    let err = env
        .processor()
        .process(vec![env.sign(&assertion)?], &env.idp, &context_at(now))
        .unwrap_err();
    assert!(matches!(err, SamlError::SubjectConfirmationValidation { .. }));
    assert_eq!(checks(&err), [ValidationCheck::Recipient]);
    Ok(())
}

/// Encryption followed by decryption reproduces the assertion.
#[test]
fn test_encryption_round_trip() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let original = assertion("_a1");

    let decrypted = env
        .processor()
        .decrypt_assertions(vec![env.sign_and_encrypt(&original)?], &env.idp)?;
    let decrypted = &decrypted[0];

    assert_eq!(decrypted.issuer(), original.issuer());
    assert_eq!(decrypted.issue_instant(), original.issue_instant());
    let original_attributes: Vec<_> = original.attribute_statements().collect();
    let decrypted_attributes: Vec<_> = decrypted.attribute_statements().collect();
    assert_eq!(decrypted_attributes, original_attributes);
    Ok(())
}

/// The right decryption key is found even when it is configured last.
#[test]
fn test_correct_key_last_of_three() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let encrypted = env.sign_and_encrypt(&assertion("_a1"))?;

    let rolled_over = IdentityProviderConfig {
        decryption_keys: vec![
            generate_decryption_key("retired-1")?,
            generate_decryption_key("retired-2")?,
            env.idp.decryption_keys[0].clone(),
        ],
        ..env.idp.clone()
    };

    let validated = env.processor().process(vec![encrypted], &rolled_over, &context())?;
    assert_eq!(validated[0].assertion().id(), "_a1");
    Ok(())
}

/// Without a matching key decryption fails.
#[test]
fn test_decryption_without_matching_key() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let encrypted = env.sign_and_encrypt(&assertion("_a1"))?;
    let AssertionElement::EncryptedAssertion(encrypted) = encrypted else {
        anyhow::bail!("expected an encrypted assertion");
    };

    let stranger = IdentityProviderConfig::new(IDP_ENTITY_ID)
        .with_decryption_key(generate_decryption_key("unrelated")?);
    let err = Decrypter::default().decrypt(&encrypted, &stranger).unwrap_err();
    assert!(matches!(err, SamlError::DecryptionFailed(_)));
    Ok(())
}

/// Unsigned plaintext assertions fail unless the policy allows them.
#[test]
fn test_signature_policy_on_plaintext_and_encrypted() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let unsigned: AssertionElement = assertion("_a1").into();

    let err = env
        .processor()
        .process(vec![unsigned.clone()], &env.idp, &context())
        .unwrap_err();
    assert!(matches!(err, SamlError::InvalidAssertion(_)));

    let relaxed = env
        .idp
        .clone()
        .with_signature_requirement(SignatureRequirement::Never);
    let validated = env.processor().process(vec![unsigned], &relaxed, &context())?;
    assert!(!validated[0].signature().valid);
    Ok(())
}

/// A signature altered in transit fails verification.
#[test]
fn test_tampered_assertion_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let AssertionElement::Assertion(signed) = env.sign(&assertion("_a1"))? else {
        anyhow::bail!("expected a plaintext assertion");
    };
    let tampered = AssertionElement::from_xml(
        &signed.to_xml().replace("user@example.com", "admin@example.com"),
    )?;

    let err = env
        .processor()
        .process(vec![tampered], &env.idp, &context())
        .unwrap_err();
    assert!(matches!(err, SamlError::InvalidAssertion(_)));
    Ok(())
}

/// A batch carrying the same one-time-use assertion twice is a replay and
/// leaves the ID free for a later response.
#[test]
fn test_duplicate_one_time_use_in_batch() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let processor = env.processor();
    let now = Utc::now();
    let one_time = assertion_at("_twice", now).with_conditions(
        Conditions::valid_between(Some(now), Some(now + Duration::minutes(5)))
            .with_audience(SP_ENTITY_ID)
            .one_time_use(),
    );
    let element = env.sign(&one_time)?;

    let err = processor
        .process(vec![element.clone(), element.clone()], &env.idp, &context_at(now))
        .unwrap_err();
    assert_eq!(checks(&err), [ValidationCheck::Replay]);
    assert!(env.replay_store.is_empty());

    processor.process(vec![element], &env.idp, &context_at(now))?;
    assert_eq!(env.replay_store.len(), 1);
    Ok(())
}

/// An encrypted NameID is decrypted for the caller while the signed
/// assertion stays untouched.
#[test]
fn test_encrypted_name_id() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let now = Utc::now();
    let encrypted_id = Encrypter::new().encrypt_name_id(
        &NameId::persistent("hidden-user"),
        env.idp.decryption_keys[0].encryption_key(),
    )?;
    let subject =
        Subject::encrypted(encrypted_id).with_confirmation(bearer_confirmation(ACS_URL, now));
    let assertion = assertion_at("_a1", now).with_subject(subject);

    let validated = env
        .processor()
        .process(vec![env.sign_and_encrypt(&assertion)?], &env.idp, &context_at(now))?;

    let validated = &validated[0];
    assert!(validated.signature().valid);
    assert_eq!(
        validated.name_id().map(|name_id| name_id.value.as_str()),
        Some("hidden-user")
    );
    assert!(validated.assertion().name_id().is_none());
    Ok(())
}
