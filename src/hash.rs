//! Content fingerprinting using SHA-256

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// A stable content fingerprint.
///
/// Equal fingerprints are treated as equal content throughout the engine.
/// Absence of a file is modeled as `Option<Fingerprint>::None`, not as a
/// special fingerprint value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Raw digest bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering, as stored in manifests and state files
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a fingerprint from its hex rendering
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not 64 hex characters.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).with_context(|| format!("Invalid fingerprint hex: '{s}'"))?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("Fingerprint must be 32 bytes"))?;
        Ok(Self(digest))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short prefix is enough to tell fingerprints apart in test output
        write!(f, "Fingerprint({}..)", &self.to_hex()[..8])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Content hasher
pub struct ContentHasher;

impl ContentHasher {
    /// Fingerprint a byte slice
    #[must_use]
    pub fn hash_bytes(bytes: &[u8]) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Fingerprint(hasher.finalize().into())
    }

    /// Fingerprint a file by streaming its contents
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn hash_file(path: &Path) -> Result<Fingerprint> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;

        let mut reader = BufReader::new(file);
        let mut hasher = Sha256::new();
        let mut buffer = [0; 8192]; // 8KB buffer for streaming

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .with_context(|| format!("Failed to read file: {}", path.display()))?;

            if bytes_read == 0 {
                break;
            }

            hasher.update(&buffer[..bytes_read]);
        }

        Ok(Fingerprint(hasher.finalize().into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_hash_bytes_deterministic() {
        let a = ContentHasher::hash_bytes(b"same content");
        let b = ContentHasher::hash_bytes(b"same content");
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_bytes_differs() {
        let a = ContentHasher::hash_bytes(b"content 1");
        let b = ContentHasher::hash_bytes(b"content 2");
        assert_ne!(a, b);
    }

    #[test]
    fn test_file_hash_matches_bytes_hash() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("item.md");
        fs::write(&file, "hello world").unwrap();

        let from_file = ContentHasher::hash_file(&file).unwrap();
        let from_bytes = ContentHasher::hash_bytes(b"hello world");
        assert_eq!(from_file, from_bytes);
    }

    #[test]
    fn test_hash_empty_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("empty.md");
        fs::write(&file, "").unwrap();

        let hash = ContentHasher::hash_file(&file).unwrap();
        assert_eq!(hash, ContentHasher::hash_bytes(b""));
    }

    #[test]
    fn test_hash_missing_file() {
        let tmp = TempDir::new().unwrap();
        let result = ContentHasher::hash_file(&tmp.path().join("nope.md"));
        assert!(result.is_err());
    }

    #[test]
    fn test_hex_round_trip() {
        let fp = ContentHasher::hash_bytes(b"round trip");
        let parsed = Fingerprint::from_hex(&fp.to_hex()).unwrap();
        assert_eq!(fp, parsed);
    }

    #[test]
    fn test_hex_rejects_garbage() {
        assert!(Fingerprint::from_hex("not hex").is_err());
        assert!(Fingerprint::from_hex("abcd").is_err());
    }
}
