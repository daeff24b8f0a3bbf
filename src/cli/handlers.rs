use crate::error::{Error, Result};

use super::commands::{Commands, CreateArgs, OutputFormat, RegistryArgs, ShowArgs, VerifyArgs};
use super::{CLI_NAME, CLI_VERSION, progress};
use crate::config::{Config, OutputEncoding, RegistryConfig};
use crate::evidence::create::{EvidenceCreationConfig, create_evidence, encode_document};
use crate::evidence::subject::{SubjectRequest, SubjectResolver};
use crate::evidence::{EvidenceVerifier, VerificationResult, parse_stored_evidence};
use crate::registry::{ArtifactRegistry, create_registry};
use crate::signing::load_key_from_source;
use crate::sigstore::{SigstoreVerifier, TrustRootSource};
use crate::utils::{read_file_bytes, safe_create_file};

use log::debug;
use serde::Serialize;
use serde_json::json;
use std::io::Write;
use std::path::Path;

/// Load the configuration file when one is given, defaults otherwise.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Ok(Config::default()),
    }
}

pub fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Create(args) => handle_create(args, config),
        Commands::Verify(args) => handle_verify(args, config),
        Commands::Show(args) => handle_show(args),
    }
}

fn registry_config(config: &Config, args: &RegistryArgs) -> RegistryConfig {
    let mut registry = config.registry.clone();
    if let Some(registry_type) = args.registry_type {
        registry.registry_type = registry_type;
    }
    if let Some(url) = &args.registry_url {
        registry.url = url.clone();
    }
    if let Some(token) = &args.registry_token {
        registry.token = Some(token.clone());
    }
    registry
}

pub fn handle_create(args: CreateArgs, config: &Config) -> Result<()> {
    let registry = create_registry(&registry_config(config, &args.registry))?;
    let encoding = args.encoding.unwrap_or(config.encoding);

    let creation = EvidenceCreationConfig {
        predicate: args.predicate,
        predicate_type: args.predicate_type,
        key: args.key,
        key_alias: args.key_alias,
        markdown: args.markdown,
        stage: args.stage,
        subject_repo_path: args.subject_repo_path,
        subject_sha256: args.subject_sha256,
        sigstore_bundle: args.sigstore_bundle,
        provider_id: args.provider_id.or_else(|| config.provider_id.clone()),
        created_by: args
            .created_by
            .unwrap_or_else(|| format!("{CLI_NAME}/{CLI_VERSION}")),
        print: args.print,
    };

    let created = create_evidence(&creation, Some(registry.as_ref()))?;
    let encoded = encode_document(&created.document, encoding)?;

    if let Some(output) = &args.output {
        let mut file = safe_create_file(output, false)?;
        file.write_all(&encoded)?;
        println!("Evidence written to {}", output.display());
    }

    if args.print {
        match encoding {
            OutputEncoding::Json => print!("{}", String::from_utf8_lossy(&encoded)),
            OutputEncoding::Cbor => println!("{}", hex::encode(&encoded)),
        }
    }

    if let Some(id) = created.evidence_id {
        println!(
            "Evidence for {} (sha256:{}) stored successfully with ID: {id}",
            created.subject.name, created.subject.sha256
        );
    }

    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerificationReport {
    source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<VerificationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl VerificationReport {
    fn is_success(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.is_success())
    }
}

pub fn handle_verify(args: VerifyArgs, config: &Config) -> Result<()> {
    let registry: Option<Box<dyn ArtifactRegistry>> = match &args.subject_path {
        Some(_) => Some(create_registry(&registry_config(config, &args.registry))?),
        None => None,
    };

    let expected_sha256 = match (&args.subject_path, &args.subject_sha256) {
        (Some(path), _) => Some(
            SubjectResolver::new(registry.as_deref())
                .resolve(&SubjectRequest {
                    repo_path: Some(path.as_str()),
                    ..Default::default()
                })?
                .sha256,
        ),
        (None, sha256) => sha256.clone(),
    };

    let documents = collect_documents(&args, registry.as_deref())?;

    let keys = args
        .public_keys
        .iter()
        .map(|key| load_key_from_source(key))
        .collect::<Result<Vec<_>>>()?;
    let mut verifier = EvidenceVerifier::new().with_public_keys(&keys)?;

    if let Some(source) = &trust_root_source(&args, config)? {
        verifier = verifier.with_sigstore(SigstoreVerifier::from_source(source)?);
    }

    let progress_bar = (config.show_progress
        && args.format == OutputFormat::Text
        && documents.len() > 1)
        .then(|| progress::create_progress_bar(documents.len() as u64));

    let results = verifier.verify_batch(
        documents.iter().map(|(_, data)| {
            if let Some(pb) = &progress_bar {
                pb.inc(1);
            }
            data.as_slice()
        }),
        expected_sha256.as_deref(),
    );
    if let Some(pb) = &progress_bar {
        pb.finish_and_clear();
    }

    let reports: Vec<VerificationReport> = documents
        .into_iter()
        .zip(results)
        .map(|((source, _), result)| match result {
            Ok(result) => VerificationReport {
                source,
                result: Some(result),
                error: None,
            },
            Err(e) => VerificationReport {
                source,
                result: None,
                error: Some(super::format_error(&e)),
            },
        })
        .collect();

    match args.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&reports)
                .map_err(|e| Error::Serialization(e.to_string()))?
        ),
        OutputFormat::Text => {
            for report in &reports {
                print_report(report);
            }
        }
    }

    let failed = reports.iter().filter(|r| !r.is_success()).count();
    if failed > 0 {
        return Err(Error::Validation(format!(
            "{failed} of {} evidence item(s) failed verification",
            reports.len()
        )));
    }

    if args.format == OutputFormat::Text {
        println!("✓ All {} evidence item(s) verified", reports.len());
    }
    Ok(())
}

// Flags override the configuration; an explicit TUF flag drops a configured local file.
fn trust_root_source(args: &VerifyArgs, config: &Config) -> Result<Option<TrustRootSource>> {
    let mut config = config.clone();
    if args.tuf_root.is_some() || args.tuf_url.is_some() {
        config.trusted_root_file = None;
    }
    if let Some(path) = &args.trusted_root {
        config.trusted_root_file = Some(path.clone());
    }
    if let Some(path) = &args.tuf_root {
        config.tuf_root_file = Some(path.clone());
    }
    if let Some(url) = &args.tuf_url {
        config.tuf_url = Some(url.clone());
    }
    config.trust_root_source()
}

// Evidence files when given, otherwise everything stored for the subject.
fn collect_documents(
    args: &VerifyArgs,
    registry: Option<&dyn ArtifactRegistry>,
) -> Result<Vec<(String, Vec<u8>)>> {
    if !args.evidence.is_empty() {
        return args
            .evidence
            .iter()
            .map(|path| Ok((path.display().to_string(), read_file_bytes(path)?)))
            .collect();
    }

    let (Some(subject_path), Some(registry)) = (&args.subject_path, registry) else {
        return Err(Error::Validation(
            "no evidence files or subject path given".to_string(),
        ));
    };

    let ids = registry.list_evidence(subject_path)?;
    if ids.is_empty() {
        return Err(Error::Validation(format!(
            "no evidence stored for {subject_path}"
        )));
    }
    debug!("Found {} evidence item(s) for {subject_path}", ids.len());

    ids.into_iter()
        .map(|id| {
            let data = registry.fetch_evidence(&id)?;
            Ok((id, data))
        })
        .collect()
}

fn print_report(report: &VerificationReport) {
    match (&report.result, &report.error) {
        (Some(result), _) if result.is_success() => {
            let key_source = result.key_source.as_deref().unwrap_or("-");
            println!(
                "✓ {}: verified ({}, key: {key_source})",
                report.source,
                result.media_type.as_str()
            );
        }
        (Some(result), _) => println!(
            "✗ {}: {}",
            report.source,
            result.failure_reason.as_deref().unwrap_or("verification failed")
        ),
        (None, error) => println!(
            "✗ {}: {}",
            report.source,
            error.as_deref().unwrap_or("verification failed")
        ),
    }
}

pub fn handle_show(args: ShowArgs) -> Result<()> {
    let data = read_file_bytes(&args.evidence)?;
    let evidence = parse_stored_evidence(&data)?;
    let envelope = evidence.envelope()?;
    let statement = evidence.statement()?;

    match args.format {
        OutputFormat::Json => {
            let document = json!({
                "mediaType": evidence.media_type(),
                "payloadType": envelope.payload_type(),
                "signatures": envelope.signatures().iter().map(|s| s.keyid()).collect::<Vec<_>>(),
                "statement": statement,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&document)
                    .map_err(|e| Error::Serialization(e.to_string()))?
            );
        }
        OutputFormat::Text => {
            println!("Evidence: {}", args.evidence.display());
            println!("Media type: {}", evidence.media_type().as_str());
            println!("Payload type: {}", envelope.payload_type());
            for signature in envelope.signatures() {
                println!("Signature key id: {}", signature.keyid());
            }
            for subject in &statement.subject {
                println!(
                    "Subject: {} (sha256:{})",
                    subject.identity(),
                    subject.sha256().unwrap_or("-")
                );
            }
            println!("Predicate type: {}", statement.predicate_type);
            if !statement.created_by.is_empty() {
                println!("Created by: {}", statement.created_by);
            }
            if let Some(created_at) = &statement.created_at {
                println!("Created at: {created_at}");
            }
            if let Some(stage) = &statement.stage {
                println!("Stage: {stage}");
            }
            println!(
                "Predicate:\n{}",
                serde_json::to_string_pretty(&statement.predicate)
                    .map_err(|e| Error::Serialization(e.to_string()))?
            );
            if let Some(markdown) = &statement.markdown {
                println!("Markdown:\n{markdown}");
            }
        }
    }

    Ok(())
}
