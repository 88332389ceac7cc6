//! File checksum computation and validation

use crate::env::{vars, EnvStore};
use crate::error::{PakratError, Result};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

/// Digest algorithm used to verify a downloaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumType {
    #[default]
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl ChecksumType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumType::Md5 => "md5",
            ChecksumType::Sha1 => "sha1",
            ChecksumType::Sha256 => "sha256",
            ChecksumType::Sha512 => "sha512",
        }
    }
}

impl std::fmt::Display for ChecksumType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecksumType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "md5" => Ok(ChecksumType::Md5),
            "sha1" => Ok(ChecksumType::Sha1),
            "sha256" => Ok(ChecksumType::Sha256),
            "sha512" => Ok(ChecksumType::Sha512),
            other => Err(format!("Unknown checksum type: {}", other)),
        }
    }
}

/// Compute the hex digest of a file with the given algorithm.
pub fn compute(path: &Path, checksum_type: ChecksumType) -> Result<String> {
    let mut file = std::fs::File::open(path)?;

    let digest = match checksum_type {
        ChecksumType::Md5 => {
            let mut hasher = Md5::new();
            std::io::copy(&mut file, &mut hasher)?;
            format!("{:x}", hasher.finalize())
        }
        ChecksumType::Sha1 => {
            let mut hasher = Sha1::new();
            std::io::copy(&mut file, &mut hasher)?;
            format!("{:x}", hasher.finalize())
        }
        ChecksumType::Sha256 => {
            let mut hasher = Sha256::new();
            std::io::copy(&mut file, &mut hasher)?;
            format!("{:x}", hasher.finalize())
        }
        ChecksumType::Sha512 => {
            let mut hasher = Sha512::new();
            std::io::copy(&mut file, &mut hasher)?;
            format!("{:x}", hasher.finalize())
        }
    };

    Ok(digest)
}

/// Check a file against an expected checksum. Comparison is
/// case-insensitive.
pub fn is_valid(path: &Path, expected: &str, checksum_type: ChecksumType) -> Result<bool> {
    let actual = compute(path, checksum_type)?;
    Ok(actual.eq_ignore_ascii_case(expected.trim()))
}

/// Assert that a file matches the expected checksum, honoring the
/// ignore-checksums and allow-empty-checksums environment overrides.
///
/// A missing or empty checksum on a remote source is itself a validation
/// failure unless explicitly allowed; the secure variant permits it only
/// for HTTPS sources.
pub fn assert_valid(
    path: &Path,
    expected: Option<&str>,
    checksum_type: ChecksumType,
    url: &str,
    env: &EnvStore,
) -> Result<()> {
    if env.is_true(vars::IGNORE_CHECKSUMS) {
        debug!("Checksum validation is disabled, skipping check for '{}'", path.display());
        return Ok(());
    }

    let expected = expected.map(str::trim).filter(|c| !c.is_empty());

    let expected = match expected {
        Some(c) => c,
        None => {
            let secure_source = url.to_lowercase().starts_with("https://");
            if env.is_true(vars::ALLOW_EMPTY_CHECKSUMS)
                || (secure_source && env.is_true(vars::ALLOW_EMPTY_CHECKSUMS_SECURE))
            {
                warn!(
                    "Empty checksums are allowed; accepting '{}' from '{}' without verification",
                    path.display(),
                    url
                );
                return Ok(());
            }

            return Err(PakratError::MissingChecksum {
                url: url.to_string(),
            });
        }
    };

    debug!(
        "Verifying '{}' checksum '{}' for '{}'",
        checksum_type,
        expected,
        path.display()
    );

    let actual = compute(path, checksum_type)?;
    if actual.eq_ignore_ascii_case(expected) {
        return Ok(());
    }

    Err(PakratError::ChecksumMismatch {
        path: path.to_path_buf(),
        url: url.to_string(),
        algorithm: checksum_type.as_str().to_string(),
        expected: expected.to_string(),
        actual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn computes_known_digests_of_abc() {
        let file = file_with(b"abc");
        assert_eq!(
            compute(file.path(), ChecksumType::Md5).unwrap(),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            compute(file.path(), ChecksumType::Sha1).unwrap(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            compute(file.path(), ChecksumType::Sha256).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn comparison_is_case_insensitive() {
        let file = file_with(b"abc");
        assert!(is_valid(
            file.path(),
            "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD",
            ChecksumType::Sha256
        )
        .unwrap());
    }

    #[test]
    fn mismatch_error_names_expected_and_actual() {
        let file = file_with(b"abc");
        let env = EnvStore::empty();
        let err = assert_valid(
            file.path(),
            Some("deadbeef"),
            ChecksumType::Sha256,
            "https://example/pkg.exe",
            &env,
        )
        .unwrap_err();

        match err {
            PakratError::ChecksumMismatch {
                expected, actual, ..
            } => {
                assert_eq!(expected, "deadbeef");
                assert_eq!(
                    actual,
                    "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_checksum_on_remote_source_fails() {
        let file = file_with(b"abc");
        let env = EnvStore::empty();
        let err = assert_valid(
            file.path(),
            None,
            ChecksumType::Sha256,
            "http://example/pkg.exe",
            &env,
        )
        .unwrap_err();
        assert!(matches!(err, PakratError::MissingChecksum { .. }));
    }

    #[test]
    fn empty_checksum_allowed_by_override() {
        let file = file_with(b"abc");
        let mut env = EnvStore::empty();
        env.set(vars::ALLOW_EMPTY_CHECKSUMS, "true");
        assert_valid(
            file.path(),
            None,
            ChecksumType::Sha256,
            "http://example/pkg.exe",
            &env,
        )
        .unwrap();
    }

    #[test]
    fn secure_override_only_applies_to_https() {
        let file = file_with(b"abc");
        let mut env = EnvStore::empty();
        env.set(vars::ALLOW_EMPTY_CHECKSUMS_SECURE, "true");

        assert_valid(
            file.path(),
            None,
            ChecksumType::Sha256,
            "https://example/pkg.exe",
            &env,
        )
        .unwrap();

        let err = assert_valid(
            file.path(),
            None,
            ChecksumType::Sha256,
            "http://example/pkg.exe",
            &env,
        )
        .unwrap_err();
        assert!(matches!(err, PakratError::MissingChecksum { .. }));
    }

    #[test]
    fn ignore_checksums_skips_validation() {
        let file = file_with(b"abc");
        let mut env = EnvStore::empty();
        env.set(vars::IGNORE_CHECKSUMS, "true");
        assert_valid(
            file.path(),
            Some("deadbeef"),
            ChecksumType::Sha256,
            "https://example/pkg.exe",
            &env,
        )
        .unwrap();
    }
}
