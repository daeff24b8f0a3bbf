pub mod commands;
pub mod handlers;
use crate::error::Error;

pub use commands::{Commands, CreateArgs, OutputFormat, RegistryArgs, ShowArgs, VerifyArgs};
pub use handlers::{handle_command, handle_create, handle_show, handle_verify, load_config};

pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CLI_NAME: &str = "evidence-cli";

pub fn format_error(error: &Error) -> String {
    match error {
        Error::Io(err) => format!("IO error: {err}"),
        Error::Json(err) => format!("JSON error: {err}"),
        Error::HexDecode(err) => format!("Hex decode error: {err}"),
        Error::Base64Decode(err) => format!("Base64 decode error: {err}"),
        Error::InvalidPem(msg) => format!("Invalid key material: {msg}"),
        Error::UnknownKeyType(msg) => format!("Unknown key type: {msg}"),
        Error::UnsupportedKeyType(msg) => format!("Unsupported key: {msg}"),
        Error::InvalidPredicateFile(msg) => format!("Invalid predicate: {msg}"),
        Error::SubjectResolutionFailed(msg) => format!("Could not resolve subject: {msg}"),
        Error::SignatureVerificationFailed(msg) => format!("Signature verification failed: {msg}"),
        Error::BundleParseFailed(msg) => format!("Invalid Sigstore bundle: {msg}"),
        Error::NoDsseEnvelope => {
            "Sigstore bundle carries a message signature, not a DSSE envelope".to_string()
        }
        Error::FailedToLoadTrustRoot(msg) => format!("Trusted root error: {msg}"),
        Error::UnrecognizedEvidenceFormat(msg) => format!("Unrecognized evidence: {msg}"),
        Error::Signing(msg) => format!("Signing error: {msg}"),
        Error::Serialization(msg) => format!("Serialization error: {msg}"),
        Error::Validation(msg) => format!("Validation error: {msg}"),
        Error::Registry(msg) => format!("Registry error: {msg}"),
        Error::Config(msg) => format!("Configuration error: {msg}"),
        Error::InitializationError(msg) => format!("Initialization error: {msg}"),
    }
}

pub mod progress {
    use indicatif::{ProgressBar, ProgressStyle};

    pub fn create_progress_bar(len: u64) -> ProgressBar {
        let pb = ProgressBar::new(len);
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
            .map(|style| style.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error() {
        assert_eq!(
            format_error(&Error::NoDsseEnvelope),
            "Sigstore bundle carries a message signature, not a DSSE envelope"
        );
        assert_eq!(
            format_error(&Error::FailedToLoadTrustRoot("missing".to_string())),
            "Trusted root error: missing"
        );
    }

    #[test]
    fn test_progress_bar_length() {
        let pb = progress::create_progress_bar(3);
        assert_eq!(pb.length(), Some(3));
    }
}
