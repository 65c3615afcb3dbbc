use std::path::Path;

use crate::errors::{
    InvalidKeyBytesError, KeyFileError, ParseId52Error, ParseSecretKeyError,
};

const ID52_LEN: usize = 52;
const KEY_FILE_EXTENSION: &str = "private-key";

/// Node's public key, displayed and parsed as ID52
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Validate raw Ed25519 public key bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, InvalidKeyBytesError> {
        ed25519_dalek::VerifyingKey::from_bytes(bytes).map_err(|_| InvalidKeyBytesError)?;
        Ok(Self(*bytes))
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    /// The 52-character identifier of this key
    pub fn id52(&self) -> String {
        data_encoding::BASE32_DNSSEC.encode(&self.0)
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id52())
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", self.id52())
    }
}

impl std::str::FromStr for PublicKey {
    type Err = ParseId52Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ID52_LEN {
            return Err(ParseId52Error::InvalidLength(s.len()));
        }
        let decoded = data_encoding::BASE32_DNSSEC
            .decode(s.as_bytes())
            .map_err(|e| ParseId52Error::InvalidEncoding(e.to_string()))?;
        let bytes: [u8; 32] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| ParseId52Error::InvalidEncoding(format!("decoded to {} bytes", decoded.len())))?;
        Ok(Self::from_bytes(&bytes)?)
    }
}

impl serde::Serialize for PublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for PublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Node's private key
#[derive(Clone)]
pub struct SecretKey(ed25519_dalek::SigningKey);

impl SecretKey {
    /// Generate a fresh key from the OS random number generator
    pub fn generate() -> Self {
        Self(ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng))
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(bytes))
    }

    pub fn to_secret_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key().to_bytes())
    }

    pub fn id52(&self) -> String {
        self.public_key().id52()
    }

    /// Lowercase hex form, as stored in key files
    pub fn to_hex(&self) -> String {
        data_encoding::HEXLOWER.encode(&self.to_secret_bytes())
    }

    /// Write `<dir>/<prefix>.private-key`, creating `dir` if needed
    pub fn save_to_dir(&self, dir: &Path, prefix: &str) -> Result<(), KeyFileError> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(key_path(dir, prefix), self.to_hex())?;
        Ok(())
    }

    /// Read `<dir>/<prefix>.private-key`, returning the ID52 alongside the key
    pub fn load_from_dir(dir: &Path, prefix: &str) -> Result<(String, Self), KeyFileError> {
        let path = key_path(dir, prefix);
        if !path.exists() {
            return Err(KeyFileError::NotFound(path));
        }
        let key: SecretKey = std::fs::read_to_string(&path)?.trim().parse()?;
        Ok((key.id52(), key))
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey({})", self.id52())
    }
}

impl std::str::FromStr for SecretKey {
    type Err = ParseSecretKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(ParseSecretKeyError::InvalidLength(s.len()));
        }
        let decoded = data_encoding::HEXLOWER_PERMISSIVE
            .decode(s.as_bytes())
            .map_err(|e| ParseSecretKeyError::InvalidHex(e.to_string()))?;
        let bytes: [u8; 32] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| ParseSecretKeyError::InvalidLength(s.len()))?;
        Ok(Self::from_bytes(&bytes))
    }
}

fn key_path(dir: &Path, prefix: &str) -> std::path::PathBuf {
    dir.join(format!("{prefix}.{KEY_FILE_EXTENSION}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id52_is_52_lowercase_chars() {
        let id52 = SecretKey::generate().id52();
        assert_eq!(id52.len(), 52);
        assert!(id52.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn parse_id52_back_to_same_key() {
        let key = SecretKey::generate().public_key();
        let parsed: PublicKey = key.id52().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn reject_short_id52() {
        let err = "abc".parse::<PublicKey>().unwrap_err();
        assert_eq!(err, ParseId52Error::InvalidLength(3));
    }

    #[test]
    fn public_key_serializes_as_id52_string() {
        let key = SecretKey::generate().public_key();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key.id52()));
    }

    #[test]
    fn secret_key_hex_parse() {
        let key = SecretKey::generate();
        let parsed: SecretKey = key.to_hex().parse().unwrap();
        assert_eq!(parsed.public_key(), key.public_key());
        assert!(matches!(
            "zz".parse::<SecretKey>(),
            Err(ParseSecretKeyError::InvalidLength(2))
        ));
    }

    #[test]
    fn save_and_load_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let key = SecretKey::generate();
        key.save_to_dir(dir.path(), "node").unwrap();

        let (id52, loaded) = SecretKey::load_from_dir(dir.path(), "node").unwrap();
        assert_eq!(id52, key.id52());
        assert_eq!(loaded.to_secret_bytes(), key.to_secret_bytes());
    }

    #[test]
    fn load_missing_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SecretKey::load_from_dir(dir.path(), "absent").unwrap_err();
        assert!(matches!(err, KeyFileError::NotFound(_)));
    }
}
