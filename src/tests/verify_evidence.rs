use super::common::{ARTIFACT_PATH, PREDICATE_TYPE, Scenario};
use crate::error::{Error, Result};
use crate::evidence::create::{EvidenceCreationConfig, create_evidence};
use crate::evidence::{EvidenceVerifier, MediaType, Status};
use crate::registry::{ArtifactRegistry, EvidenceUpload};
use crate::signing::keys::KeyAlgorithm;
use crate::signing::load_key_from_source;
use crate::sigstore::verify::test_utils::SigstoreFixture;
use crate::sigstore::{BundleVersion, SigstoreVerifier};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

fn create_for(scenario: &Scenario) -> Result<String> {
    let config = EvidenceCreationConfig {
        predicate: Some(scenario.predicate.clone()),
        predicate_type: Some(PREDICATE_TYPE.to_string()),
        key: Some(scenario.key_path.to_string_lossy().to_string()),
        subject_repo_path: Some(ARTIFACT_PATH.to_string()),
        created_by: "release-bot".to_string(),
        ..Default::default()
    };
    let created = create_evidence(&config, Some(&scenario.registry))?;
    Ok(created.evidence_id.unwrap_or_default())
}

fn public_verifier(scenario: &Scenario) -> Result<EvidenceVerifier> {
    let public_key_path = scenario.public_key_path()?;
    let key = load_key_from_source(&public_key_path.to_string_lossy())?;
    EvidenceVerifier::new().with_public_keys(&[key])
}

#[test]
fn test_create_store_verify() -> Result<()> {
    for algorithm in [KeyAlgorithm::Ecdsa, KeyAlgorithm::Rsa, KeyAlgorithm::Ed25519] {
        let scenario = Scenario::new(algorithm)?;
        let id = create_for(&scenario)?;

        let verifier = public_verifier(&scenario)?;
        let stored = scenario.registry.fetch_evidence(&id)?;
        let expected = scenario.registry.file_info(ARTIFACT_PATH)?.sha256;

        let result = verifier.verify(&stored, Some(&expected))?;
        assert!(result.is_success(), "{algorithm}: {:?}", result.failure_reason);
        assert_eq!(result.media_type, MediaType::SimpleDsse);
    }
    Ok(())
}

#[test]
fn test_tampered_stored_evidence_fails() -> Result<()> {
    let scenario = Scenario::new(KeyAlgorithm::Ecdsa)?;
    let id = create_for(&scenario)?;
    let stored = scenario.registry.fetch_evidence(&id)?;

    // Swap the subject digest inside the signed payload.
    let mut document: Value = serde_json::from_slice(&stored)?;
    let payload = STANDARD.decode(document["payload"].as_str().unwrap_or_default())?;
    let tampered = String::from_utf8_lossy(&payload).replace(&scenario.artifact_sha256(), &"0".repeat(64));
    document["payload"] = Value::String(STANDARD.encode(tampered));

    let result = public_verifier(&scenario)?.verify(&serde_json::to_vec(&document)?, None)?;
    assert_eq!(result.status, Status::Failed);
    Ok(())
}

#[test]
fn test_evidence_for_other_artifact_fails() -> Result<()> {
    let scenario = Scenario::new(KeyAlgorithm::Ed25519)?;
    let id = create_for(&scenario)?;
    let stored = scenario.registry.fetch_evidence(&id)?;

    let other = crate::hash::calculate_hash(b"a different artifact");
    let result = public_verifier(&scenario)?.verify(&stored, Some(&other))?;
    assert_eq!(result.status, Status::Failed);
    Ok(())
}

#[test]
fn test_batch_over_registry_listing() -> Result<()> {
    let scenario = Scenario::new(KeyAlgorithm::Ecdsa)?;
    create_for(&scenario)?;

    // A second, unrelated document stored against the same artifact.
    scenario.registry.upload_evidence(&EvidenceUpload {
        subject_uri: ARTIFACT_PATH.to_string(),
        dsse_file_raw: br#"{"unexpected":"document"}"#.to_vec(),
        provider_id: None,
    })?;

    let ids = scenario.registry.list_evidence(ARTIFACT_PATH)?;
    assert_eq!(ids.len(), 2);
    let documents = ids
        .iter()
        .map(|id| scenario.registry.fetch_evidence(id))
        .collect::<Result<Vec<_>>>()?;

    let results = public_verifier(&scenario)?.verify_batch(
        documents.iter().map(Vec::as_slice),
        Some(&scenario.artifact_sha256()),
    );

    let verified = results
        .iter()
        .filter(|r| r.as_ref().is_ok_and(|r| r.is_success()))
        .count();
    let unrecognized = results
        .iter()
        .filter(|r| matches!(r, Err(Error::UnrecognizedEvidenceFormat(_))))
        .count();
    assert_eq!((verified, unrecognized), (1, 1));
    Ok(())
}

#[test]
fn test_mixed_dsse_and_sigstore_evidence() -> Result<()> {
    let scenario = Scenario::new(KeyAlgorithm::Rsa)?;
    let id = create_for(&scenario)?;
    let dsse = scenario.registry.fetch_evidence(&id)?;

    let fixture = SigstoreFixture::new()?;
    let bundle = serde_json::to_vec(
        &fixture.bundle_document(BundleVersion::V0_3, &scenario.artifact_sha256())?,
    )?;

    let verifier = public_verifier(&scenario)?
        .with_sigstore(SigstoreVerifier::new(fixture.trusted_root()?)?);
    let results = verifier.verify_batch(
        [dsse.as_slice(), bundle.as_slice()],
        Some(&scenario.artifact_sha256()),
    );

    let results = results.into_iter().collect::<Result<Vec<_>>>()?;
    assert!(results.iter().all(|r| r.is_success()));
    assert_eq!(results[0].media_type, MediaType::SimpleDsse);
    assert_eq!(results[1].media_type, MediaType::SigstoreBundle);
    assert_eq!(results[1].key_source.as_deref(), Some("sigstore-certificate"));
    Ok(())
}

#[test]
fn test_sigstore_bundle_stored_and_verified() -> Result<()> {
    let scenario = Scenario::new(KeyAlgorithm::Ecdsa)?;
    let fixture = SigstoreFixture::new()?;
    let bundle_path = scenario.dir.path().join("bundle.sigstore.json");
    std::fs::write(
        &bundle_path,
        serde_json::to_vec(
            &fixture.bundle_document(BundleVersion::V0_2, &scenario.artifact_sha256())?,
        )?,
    )?;

    let created = create_evidence(
        &EvidenceCreationConfig {
            sigstore_bundle: Some(bundle_path),
            subject_repo_path: Some(ARTIFACT_PATH.to_string()),
            ..Default::default()
        },
        Some(&scenario.registry),
    )?;
    let stored = scenario
        .registry
        .fetch_evidence(&created.evidence_id.unwrap_or_default())?;

    let verifier =
        EvidenceVerifier::new().with_sigstore(SigstoreVerifier::new(fixture.trusted_root()?)?);
    let result = verifier.verify(&stored, Some(&scenario.artifact_sha256()))?;
    assert!(result.is_success(), "{:?}", result.failure_reason);
    Ok(())
}
