//! Concurrent replay protection tests.

use std::sync::Arc;

use chrono::{Duration, Utc};
use kc_saml_assertion::{Conditions, SamlError};

use crate::common::{assertion_at, context_at, TestEnv, SP_ENTITY_ID};

/// Of many concurrent submissions of the same one-time-use assertion,
/// exactly one is accepted.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_replay_accepts_once() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let now = Utc::now();
    let one_time = assertion_at("_concurrent", now).with_conditions(
        Conditions::valid_between(Some(now), Some(now + Duration::minutes(5)))
            .with_audience(SP_ENTITY_ID)
            .one_time_use(),
    );
    let element = env.sign(&one_time)?;

    let processor = Arc::new(env.processor());
    let idp = Arc::new(env.idp.clone());
    let mut handles = Vec::new();
    for _ in 0..16 {
        let processor = processor.clone();
        let idp = idp.clone();
        let element = element.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            processor.process(vec![element], &idp, &context_at(now))
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => accepted += 1,
            Err(SamlError::AssertionValidation { .. }) => {}
            Err(e) => anyhow::bail!("unexpected error: {e}"),
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(env.replay_store.len(), 1);
    Ok(())
}

/// Independent assertions processed concurrently do not interfere.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_assertions_in_parallel() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let now = Utc::now();
    let processor = Arc::new(env.processor());
    let idp = Arc::new(env.idp.clone());

    let mut handles = Vec::new();
    for index in 0..8 {
        let one_time = assertion_at(&format!("_parallel-{index}"), now).with_conditions(
            Conditions::valid_between(Some(now), Some(now + Duration::minutes(5)))
                .with_audience(SP_ENTITY_ID)
                .one_time_use(),
        );
        let element = env.sign_and_encrypt(&one_time)?;
        let processor = processor.clone();
        let idp = idp.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            processor.process(vec![element], &idp, &context_at(now))
        }));
    }

    for handle in handles {
        handle.await??;
    }
    assert_eq!(env.replay_store.len(), 8);
    Ok(())
}
