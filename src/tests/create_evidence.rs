use super::common::{ARTIFACT_PATH, MockRegistry, PREDICATE_TYPE, Scenario};
use crate::error::{Error, Result};
use crate::evidence::create::{EvidenceCreationConfig, create_evidence};
use crate::evidence::{MediaType, parse_stored_evidence};
use crate::in_toto::DSSE_PAYLOAD_TYPE;
use crate::in_toto::dsse::Envelope;
use crate::registry::ArtifactRegistry;
use crate::signing::keys::KeyAlgorithm;
use crate::signing::test_utils::ALL_ALGORITHMS;

fn creation_config(scenario: &Scenario) -> EvidenceCreationConfig {
    EvidenceCreationConfig {
        predicate: Some(scenario.predicate.clone()),
        predicate_type: Some(PREDICATE_TYPE.to_string()),
        key: Some(scenario.key_path.to_string_lossy().to_string()),
        subject_repo_path: Some(ARTIFACT_PATH.to_string()),
        provider_id: Some("ci-pipeline".to_string()),
        created_by: "release-bot".to_string(),
        ..Default::default()
    }
}

#[test]
fn test_create_stores_signed_statement() -> Result<()> {
    for algorithm in ALL_ALGORITHMS {
        let scenario = Scenario::new(algorithm)?;
        let created = create_evidence(&creation_config(&scenario), Some(&scenario.registry))?;

        let id = created.evidence_id.expect("evidence should be uploaded");
        let stored = scenario.registry.fetch_evidence(&id)?;
        assert_eq!(stored, created.document);

        let envelope = Envelope::from_json(&stored)?;
        assert_eq!(envelope.payload_type(), DSSE_PAYLOAD_TYPE);
        assert_eq!(envelope.signatures().len(), 1);

        let statement = parse_stored_evidence(&stored)?.statement()?;
        assert_eq!(statement.subject[0].name, ARTIFACT_PATH);
        assert_eq!(
            statement.subject[0].sha256(),
            Some(scenario.artifact_sha256().as_str())
        );
        assert_eq!(statement.predicate_type, PREDICATE_TYPE);
        assert_eq!(statement.created_by, "release-bot");
    }
    Ok(())
}

#[test]
fn test_evidence_file_lands_in_registry() -> Result<()> {
    let scenario = Scenario::new(KeyAlgorithm::Ecdsa)?;
    let created = create_evidence(&creation_config(&scenario), Some(&scenario.registry))?;
    let id = created.evidence_id.unwrap();

    let evd = scenario
        .registry
        .base_path()
        .join(".evidence")
        .join(format!("{id}.evd"));
    assert!(evd.is_file());
    assert_eq!(scenario.registry.list_evidence(ARTIFACT_PATH)?, vec![id]);
    Ok(())
}

#[test]
fn test_upload_through_registry_trait() -> Result<()> {
    let scenario = Scenario::new(KeyAlgorithm::Ed25519)?;
    let registry = MockRegistry::with_artifact(ARTIFACT_PATH, &scenario.artifact_sha256());

    let created = create_evidence(&creation_config(&scenario), Some(&registry))?;
    assert_eq!(created.evidence_id.as_deref(), Some("mock-1"));

    let uploads = registry.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].subject_uri, ARTIFACT_PATH);
    assert_eq!(uploads[0].provider_id.as_deref(), Some("ci-pipeline"));
    assert_eq!(uploads[0].dsse_file_raw, created.document);
    assert_eq!(created.media_type, MediaType::SimpleDsse);
    Ok(())
}

#[test]
fn test_subject_digest_must_match_registry() -> Result<()> {
    let scenario = Scenario::new(KeyAlgorithm::Ecdsa)?;
    let registry = MockRegistry::with_artifact(ARTIFACT_PATH, &scenario.artifact_sha256());

    let mut config = creation_config(&scenario);
    config.subject_sha256 = Some("f".repeat(64));

    assert!(matches!(
        create_evidence(&config, Some(&registry)),
        Err(Error::SubjectResolutionFailed(_))
    ));
    assert!(registry.uploads().is_empty());
    Ok(())
}

#[test]
fn test_invalid_markdown_aborts_before_upload() -> Result<()> {
    let scenario = Scenario::new(KeyAlgorithm::Rsa)?;
    let registry = MockRegistry::with_artifact(ARTIFACT_PATH, &scenario.artifact_sha256());

    let notes = scenario.dir.path().join("notes.txt");
    std::fs::write(&notes, "not markdown")?;
    let mut config = creation_config(&scenario);
    config.markdown = Some(notes);

    assert!(matches!(
        create_evidence(&config, Some(&registry)),
        Err(Error::Validation(_))
    ));
    assert!(registry.uploads().is_empty());
    Ok(())
}
