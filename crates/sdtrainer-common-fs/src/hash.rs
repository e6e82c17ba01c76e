//! SHA-256 content hashing.
//!
//! Image identity throughout a project is the lowercase hex SHA-256 of the file
//! contents, never the file name.

use sdtrainer_common_core::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Hash an in-memory buffer.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Hash a file by streaming its contents.
pub fn hash_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| Error::fs(format!("failed to open file for hashing: {}", path.display()), path, e))?;

    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| Error::fs(format!("failed to hash file: {}", path.display()), path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            hash_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        assert!(hash_file(dir.path().join("missing")).unwrap_err().is_not_found());
    }

    proptest! {
        #[test]
        fn test_file_hash_matches_buffer_hash(content in proptest::collection::vec(any::<u8>(), 0..20_000)) {
            let dir = tempdir().unwrap();
            let path = dir.path().join("blob");
            std::fs::write(&path, &content).unwrap();
            prop_assert_eq!(hash_file(&path).unwrap(), hash_bytes(&content));
        }
    }
}
