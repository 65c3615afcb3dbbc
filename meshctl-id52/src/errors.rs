/// Errors when parsing ID52 strings
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseId52Error {
    #[error("ID52 must be 52 characters, got {0}")]
    InvalidLength(usize),
    #[error("ID52 is not valid BASE32_DNSSEC: {0}")]
    InvalidEncoding(String),
    #[error(transparent)]
    InvalidKey(#[from] InvalidKeyBytesError),
}

/// Invalid public key byte format
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid Ed25519 public key bytes")]
pub struct InvalidKeyBytesError;

/// Errors parsing secret key strings (64 hex characters)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseSecretKeyError {
    #[error("secret key must be 64 hex characters, got {0}")]
    InvalidLength(usize),
    #[error("secret key is not valid hex: {0}")]
    InvalidHex(String),
}

/// Errors reading or writing `.private-key` files
#[derive(Debug, thiserror::Error)]
pub enum KeyFileError {
    #[error("no key file found at {0}")]
    NotFound(std::path::PathBuf),
    #[error("key file I/O failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("key file is corrupt: {source}")]
    Parse {
        #[from]
        source: ParseSecretKeyError,
    },
}
