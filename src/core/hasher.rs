//! AZ-010: BLAKE3 hashing for logical ids and document fingerprints.

use super::error::ComposeResult;
use std::path::Path;

/// Prefix naming the algorithm in every full hash.
pub const HASH_PREFIX: &str = "blake3:";

/// Length of the hex suffix appended to generated logical ids.
pub const SHORT_HASH_LEN: usize = 8;

/// Hash a file's contents, streamed. Returns `"blake3:{hex}"`.
pub fn hash_file(path: &Path) -> ComposeResult<String> {
    let file = std::fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    hasher.update_reader(file)?;
    Ok(format!("{}{}", HASH_PREFIX, hasher.finalize().to_hex()))
}

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("{}{}", HASH_PREFIX, blake3::hash(s.as_bytes()).to_hex())
}

/// First `SHORT_HASH_LEN` hex characters of the BLAKE3 of `s`.
pub fn short_hash(s: &str) -> String {
    let hex = blake3::hash(s.as_bytes()).to_hex();
    hex.as_str()[..SHORT_HASH_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_az010_hash_string() {
        let h1 = hash_string("hello");
        let h2 = hash_string("hello");
        let h3 = hash_string("world");
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert!(h1.starts_with(HASH_PREFIX));
        assert_eq!(h1.len(), HASH_PREFIX.len() + 64);
    }

    #[test]
    fn test_az010_hash_file_matches_string() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, "{\"a\":1}").unwrap();
        assert_eq!(hash_file(&path).unwrap(), hash_string("{\"a\":1}"));
    }

    #[test]
    fn test_az010_hash_file_not_found() {
        assert!(matches!(
            hash_file(Path::new("/nonexistent/file.json")),
            Err(crate::core::error::ComposeError::Io(_))
        ));
    }

    #[test]
    fn test_az010_short_hash() {
        let h = short_hash("stack/rg/rg");
        assert_eq!(h.len(), SHORT_HASH_LEN);
        assert_eq!(h, short_hash("stack/rg/rg"));
        assert_ne!(h, short_hash("stack/rg/rg2"));
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
