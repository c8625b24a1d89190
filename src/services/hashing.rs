//! Content digests used to verify downloaded objects.

use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::{fmt, io, path::Path, str::FromStr};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Md5,
    #[default]
    Sha256,
}

impl FromStr for DigestAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            other => Err(format!(
                "unknown digest algorithm `{}` (expected md5 or sha256)",
                other
            )),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => f.write_str("md5"),
            Self::Sha256 => f.write_str("sha256"),
        }
    }
}

/// Incremental hasher producing lowercase hex digests.
pub enum ContentHasher {
    Md5(md5::Context),
    Sha256(Sha256),
}

impl ContentHasher {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md5 => Self::Md5(md5::Context::new()),
            DigestAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        match self {
            Self::Md5(ctx) => ctx.consume(chunk),
            Self::Sha256(hasher) => hasher.update(chunk),
        }
    }

    pub fn finalize(self) -> String {
        match self {
            Self::Md5(ctx) => format!("{:x}", ctx.compute()),
            Self::Sha256(hasher) => format!("{:x}", hasher.finalize()),
        }
    }
}

/// Digest of an in-memory buffer.
pub fn hash_bytes(algorithm: DigestAlgorithm, bytes: &[u8]) -> String {
    let mut hasher = ContentHasher::new(algorithm);
    hasher.update(bytes);
    hasher.finalize()
}

/// Stream a file from disk through the hasher without loading it whole.
pub async fn hash_file(path: &Path, algorithm: DigestAlgorithm) -> io::Result<String> {
    let file = File::open(path).await?;
    let mut stream = ReaderStream::new(file);
    let mut hasher = ContentHasher::new(algorithm);
    while let Some(chunk) = stream.next().await {
        hasher.update(&chunk?);
    }
    Ok(hasher.finalize())
}

/// Registry digests may arrive upper-cased or padded.
pub fn digests_match(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors() {
        assert_eq!(
            hash_bytes(DigestAlgorithm::Md5, b""),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(
            hash_bytes(DigestAlgorithm::Sha256, b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn file_digest_matches_buffer_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        let payload = vec![7u8; 200_000];
        tokio::fs::write(&path, &payload).await.unwrap();

        for algorithm in [DigestAlgorithm::Md5, DigestAlgorithm::Sha256] {
            assert_eq!(
                hash_file(&path, algorithm).await.unwrap(),
                hash_bytes(algorithm, &payload)
            );
        }
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = hash_file(&dir.path().join("nope"), DigestAlgorithm::Sha256)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn comparison_ignores_case_and_padding() {
        assert!(digests_match(" ABCDEF\n", "abcdef"));
        assert!(!digests_match("abcdef", "abcdee"));
    }

    #[test]
    fn parses_algorithm_names() {
        assert_eq!("MD5".parse::<DigestAlgorithm>(), Ok(DigestAlgorithm::Md5));
        assert_eq!(
            "sha-256".parse::<DigestAlgorithm>(),
            Ok(DigestAlgorithm::Sha256)
        );
        assert!("crc32".parse::<DigestAlgorithm>().is_err());
        assert_eq!(DigestAlgorithm::default().to_string(), "sha256");
    }
}
