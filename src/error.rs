use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("Invalid PEM or key encoding: {0}")]
    InvalidPem(String),

    #[error("Unknown key type: {0}")]
    UnknownKeyType(String),

    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("Invalid predicate file: {0}")]
    InvalidPredicateFile(String),

    #[error("Failed to resolve subject: {0}")]
    SubjectResolutionFailed(String),

    #[error("Signature verification failed: {0}")]
    SignatureVerificationFailed(String),

    #[error("Failed to parse Sigstore bundle: {0}")]
    BundleParseFailed(String),

    #[error("Sigstore bundle does not contain a DSSE envelope")]
    NoDsseEnvelope,

    #[error("Failed to load trusted root: {0}")]
    FailedToLoadTrustRoot(String),

    #[error("Unrecognized evidence format: {0}")]
    UnrecognizedEvidenceFormat(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization error: {0}")]
    InitializationError(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<openssl::error::ErrorStack> for Error {
    fn from(err: openssl::error::ErrorStack) -> Self {
        Error::Signing(err.to_string())
    }
}
