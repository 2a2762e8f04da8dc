//! Streaming file hashing.
//!
//! Reads a file once, feeding every requested digest from the same buffer
//! instead of re-reading the file per algorithm.

use heimdall_model::HashAlgorithm;
use md5::{Digest as _, Md5};
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error;

/// Default cap on bytes read for hashing.
pub const DEFAULT_MAX_SIZE: u64 = 2 * 1024 * 1024 * 1024;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum HashError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} exceeds the {limit}-byte size cap")]
    TooLarge { path: String, limit: u64 },
}

enum Hasher {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Hasher {
    fn new(algo: HashAlgorithm) -> Self {
        match algo {
            HashAlgorithm::Md5 => Hasher::Md5(Md5::new()),
            HashAlgorithm::Sha1 => Hasher::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => Hasher::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        match self {
            Hasher::Md5(h) => h.update(chunk),
            Hasher::Sha1(h) => h.update(chunk),
            Hasher::Sha256(h) => h.update(chunk),
            Hasher::Sha512(h) => h.update(chunk),
        }
    }

    fn finish(self) -> String {
        match self {
            Hasher::Md5(h) => hex::encode(h.finalize()),
            Hasher::Sha1(h) => hex::encode(h.finalize()),
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

/// Computes every requested digest of `path` in a single streaming pass.
///
/// Fails `TooLarge` if the file exceeds `max_size`, `Io` for any other read
/// failure. Hex digests are always lowercase.
pub fn compute_hashes(
    path: &Path,
    algos: &[HashAlgorithm],
    max_size: u64,
) -> Result<BTreeMap<HashAlgorithm, String>, HashError> {
    let path_str = path.to_string_lossy().into_owned();
    let file = File::open(path).map_err(|e| HashError::Io {
        path: path_str.clone(),
        source: e,
    })?;
    let len = file
        .metadata()
        .map_err(|e| HashError::Io {
            path: path_str.clone(),
            source: e,
        })?
        .len();
    if len > max_size {
        return Err(HashError::TooLarge {
            path: path_str,
            limit: max_size,
        });
    }

    let mut hashers: Vec<(HashAlgorithm, Hasher)> =
        algos.iter().map(|a| (*a, Hasher::new(*a))).collect();

    let mut reader = BufReader::with_capacity(CHUNK_SIZE, file);
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf).map_err(|e| HashError::Io {
            path: path_str.clone(),
            source: e,
        })?;
        if n == 0 {
            break;
        }
        for (_, hasher) in hashers.iter_mut() {
            hasher.update(&buf[..n]);
        }
    }

    tracing::debug!(path = %path_str, algos = hashers.len(), "hashed file");

    Ok(hashers
        .into_iter()
        .map(|(algo, hasher)| (algo, hasher.finish()))
        .collect())
}

/// Convenience for the common mandatory-SHA-256 case.
pub fn sha256_only(path: &Path, max_size: u64) -> Result<String, HashError> {
    let map = compute_hashes(path, &[HashAlgorithm::Sha256], max_size)?;
    Ok(map
        .into_iter()
        .next()
        .map(|(_, v)| v)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn computes_known_sha256() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello world").unwrap();
        let digests = compute_hashes(f.path(), &[HashAlgorithm::Sha256], DEFAULT_MAX_SIZE).unwrap();
        assert_eq!(
            digests[&HashAlgorithm::Sha256],
            "b94d27b9934d3e08a52e52d7da7dacefbbe6c12d2ffabcf60c8f8f53dc5a8fb6"
        );
    }

    #[test]
    fn multiple_algorithms_in_one_pass() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"abc").unwrap();
        let digests = compute_hashes(
            f.path(),
            &[HashAlgorithm::Md5, HashAlgorithm::Sha1, HashAlgorithm::Sha256],
            DEFAULT_MAX_SIZE,
        )
        .unwrap();
        assert_eq!(digests.len(), 3);
        assert_eq!(digests[&HashAlgorithm::Md5], "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn rejects_oversized_files() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[0u8; 16]).unwrap();
        let err = compute_hashes(f.path(), &[HashAlgorithm::Sha256], 8).unwrap_err();
        assert!(matches!(err, HashError::TooLarge { .. }));
    }
}
