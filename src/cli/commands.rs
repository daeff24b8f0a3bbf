use crate::config::{OutputEncoding, RegistryType};
use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Registry selection; each flag overrides the configuration file.
#[derive(Debug, Clone, Default, Args)]
pub struct RegistryArgs {
    /// Registry backend (local-fs or http)
    #[arg(long = "registry-type", value_enum)]
    pub registry_type: Option<RegistryType>,

    /// Registry directory (local-fs) or base URL (http)
    #[arg(long = "registry-url")]
    pub registry_url: Option<String>,

    /// Bearer token for the http registry
    #[arg(long = "registry-token")]
    pub registry_token: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create signed evidence for an artifact and store it in the registry
    Create(CreateArgs),
    /// Verify evidence files or the evidence stored for an artifact
    Verify(VerifyArgs),
    /// Decode stored evidence and print its statement
    Show(ShowArgs),
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    /// Predicate JSON file
    #[arg(long = "predicate", required_unless_present = "sigstore_bundle")]
    pub predicate: Option<PathBuf>,

    /// Predicate type URI
    #[arg(long = "predicate-type", required_unless_present = "sigstore_bundle")]
    pub predicate_type: Option<String>,

    /// Private key file or literal (PEM, base64 DER)
    #[arg(long = "key", required_unless_present = "sigstore_bundle")]
    pub key: Option<String>,

    /// Key id recorded with the signature instead of the key fingerprint
    #[arg(long = "key-alias")]
    pub key_alias: Option<String>,

    /// Markdown file attached to the statement
    #[arg(long = "markdown")]
    pub markdown: Option<PathBuf>,

    /// Lifecycle stage recorded in the statement
    #[arg(long = "stage")]
    pub stage: Option<String>,

    /// Path of the subject artifact in the registry
    #[arg(long = "subject-repo-path")]
    pub subject_repo_path: Option<String>,

    /// Expected sha256 of the subject
    #[arg(long = "subject-sha256", conflicts_with = "sigstore_bundle")]
    pub subject_sha256: Option<String>,

    /// Store an existing Sigstore bundle instead of signing a new statement
    #[arg(
        long = "sigstore-bundle",
        conflicts_with_all = ["predicate", "predicate_type", "key", "key_alias", "markdown", "stage"]
    )]
    pub sigstore_bundle: Option<PathBuf>,

    /// Provider id recorded with the uploaded evidence
    #[arg(long = "provider-id")]
    pub provider_id: Option<String>,

    /// Creator recorded in the statement
    #[arg(long = "created-by")]
    pub created_by: Option<String>,

    /// Output encoding for printed or exported evidence (json or cbor)
    #[arg(long = "encoding", value_enum)]
    pub encoding: Option<OutputEncoding>,

    /// Write the evidence document to a file
    #[arg(long = "output")]
    pub output: Option<PathBuf>,

    /// Only print the evidence without uploading it
    #[arg(long = "print")]
    pub print: bool,

    #[command(flatten)]
    pub registry: RegistryArgs,
}

#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Evidence files to verify
    #[arg(
        long = "evidence",
        num_args = 1..,
        required_unless_present = "subject_path"
    )]
    pub evidence: Vec<PathBuf>,

    /// Public key files or literals for DSSE evidence, in signature order
    #[arg(long = "public-key", num_args = 1..)]
    pub public_keys: Vec<String>,

    /// Expected sha256 of the subject
    #[arg(long = "subject-sha256", conflicts_with = "subject_path")]
    pub subject_sha256: Option<String>,

    /// Registry path of the subject; its digest is looked up and, without
    /// --evidence, all evidence stored for it is verified
    #[arg(long = "subject-path")]
    pub subject_path: Option<String>,

    /// Local Sigstore trusted_root.json, used instead of TUF
    #[arg(long = "trusted-root", conflicts_with_all = ["tuf_root", "tuf_url"])]
    pub trusted_root: Option<PathBuf>,

    /// Bootstrap root.json of the Sigstore TUF repository
    #[arg(long = "tuf-root")]
    pub tuf_root: Option<PathBuf>,

    /// TUF repository URL (https)
    #[arg(long = "tuf-url")]
    pub tuf_url: Option<String>,

    /// Result format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    #[command(flatten)]
    pub registry: RegistryArgs,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Evidence file (JSON or CBOR)
    #[arg(long = "evidence")]
    pub evidence: PathBuf,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: Commands,
    }

    fn parse(args: &[&str]) -> Result<Commands, clap::Error> {
        TestCli::try_parse_from(std::iter::once("evidence-cli").chain(args.iter().copied()))
            .map(|cli| cli.command)
    }

    #[test]
    fn test_create_args() {
        let command = parse(&[
            "create",
            "--predicate",
            "p.json",
            "--predicate-type",
            "https://example.test/v1",
            "--key",
            "key.pem",
            "--subject-repo-path",
            "generic-local/app.bin",
            "--encoding",
            "cbor",
            "--registry-type",
            "http",
        ])
        .unwrap();

        let Commands::Create(args) = command else {
            panic!("expected create");
        };
        assert_eq!(args.encoding, Some(OutputEncoding::Cbor));
        assert_eq!(args.registry.registry_type, Some(RegistryType::Http));
        assert!(!args.print);
    }

    #[test]
    fn test_create_requires_predicate_without_bundle() {
        assert!(parse(&["create", "--key", "key.pem"]).is_err());
        assert!(parse(&["create", "--sigstore-bundle", "b.json"]).is_ok());
        assert!(parse(&["create", "--sigstore-bundle", "b.json", "--key", "k"]).is_err());
    }

    #[test]
    fn test_verify_args() {
        let Commands::Verify(args) = parse(&[
            "verify",
            "--evidence",
            "a.evd",
            "b.evd",
            "--public-key",
            "pub.pem",
            "--format",
            "json",
        ])
        .unwrap() else {
            panic!("expected verify");
        };
        assert_eq!(args.evidence.len(), 2);
        assert_eq!(args.public_keys, vec!["pub.pem"]);
        assert_eq!(args.format, OutputFormat::Json);

        assert!(parse(&["verify"]).is_err());
        assert!(parse(&["verify", "--subject-path", "app.bin"]).is_ok());
        assert!(
            parse(&[
                "verify",
                "--evidence",
                "a.evd",
                "--trusted-root",
                "root.json",
                "--tuf-root",
                "tuf-root.json"
            ])
            .is_err()
        );
        assert!(
            parse(&[
                "verify",
                "--evidence",
                "a.evd",
                "--tuf-root",
                "tuf-root.json",
                "--tuf-url",
                "https://tuf.example.test"
            ])
            .is_ok()
        );
    }
}
