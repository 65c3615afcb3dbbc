//! # meshctl-id52
//!
//! Node identity for meshctl. Every node is identified by an ID52: the
//! 52-character BASE32_DNSSEC encoding of its Ed25519 public key.
//!
//! ## ID52 format
//!
//! - Exactly 52 characters long
//! - Only lowercase letters and digits
//! - DNS-compatible and URL-safe without escaping
//!
//! ## Quick Start
//!
//! ```
//! use meshctl_id52::SecretKey;
//!
//! let secret_key = SecretKey::generate();
//! let id52 = secret_key.public_key().to_string();
//! assert_eq!(id52.len(), 52);
//!
//! let parsed: meshctl_id52::PublicKey = id52.parse().unwrap();
//! assert_eq!(parsed, secret_key.public_key());
//! ```
//!
//! ## Key files
//!
//! Secret keys are persisted as lowercase hex in `<prefix>.private-key`
//! files via [`SecretKey::save_to_dir`] and read back with
//! [`SecretKey::load_from_dir`].

mod errors;
mod keys;

pub use errors::{InvalidKeyBytesError, KeyFileError, ParseId52Error, ParseSecretKeyError};
pub use keys::{PublicKey, SecretKey};
