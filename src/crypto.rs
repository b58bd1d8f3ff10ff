//! Shared secret handling and RADIUS packet authentication.
//!
//! RADIUS authenticates packets with MD5 digests keyed by the shared secret (RFC 2865 §3,
//! RFC 2866 §3) and, optionally, with an HMAC-MD5 Message-Authenticator attribute
//! (RFC 3579 §3.2).

use std::{fmt, fs, path::Path};

use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use thiserror::Error;

type HmacMd5 = Hmac<Md5>;

/// Secret used when none is given on the command line.
pub const DEFAULT_SECRET: &str = "testing123";

/// Minimum length of a secret read from a file.
pub const MIN_SECRET_LENGTH: usize = 2;

/// Length of authenticators and Message-Authenticator values.
pub const DIGEST_LENGTH: usize = 16;

/// Errors that can occur while loading a secret.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretError {
    /// The secret read from a file is too short.
    #[error("Secret in {file} is too short")]
    TooShort { file: String },

    /// Failed to read the secret file.
    #[error("Error reading {file}: {reason}")]
    FileReadError { file: String, reason: String },
}

/// RADIUS shared secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Vec<u8>);

impl Secret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(secret.into())
    }

    /// Reads the secret from the first line of a file.
    ///
    /// Trailing control characters (including the line terminator) are removed.
    ///
    /// # Errors
    /// Returns `SecretError::FileReadError` if the file cannot be read and
    /// `SecretError::TooShort` if fewer than two characters remain.
    pub fn from_file(path: &Path) -> Result<Self, SecretError> {
        let content = fs::read(path).map_err(|e| SecretError::FileReadError {
            file: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let line = content.split(|b| *b == b'\n').next().unwrap_or_default();
        let end = line
            .iter()
            .rposition(|b| !b.is_ascii_control())
            .map_or(0, |last| last + 1);
        if end < MIN_SECRET_LENGTH {
            return Err(SecretError::TooShort {
                file: path.display().to_string(),
            });
        }
        Ok(Self(line[..end].to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// MD5 of `packet` followed by the secret.
    ///
    /// With the appropriate authenticator already in place this yields the request
    /// authenticator of accounting style requests and the response authenticator of
    /// replies.
    #[must_use]
    pub fn packet_digest(&self, packet: &[u8]) -> [u8; DIGEST_LENGTH] {
        let mut hasher = Md5::new();
        hasher.update(packet);
        hasher.update(&self.0);
        let mut digest = [0u8; DIGEST_LENGTH];
        digest.copy_from_slice(&hasher.finalize());
        digest
    }

    /// Computes HMAC-MD5 over `packet`, which must have its Message-Authenticator zeroed.
    #[must_use]
    pub fn message_authenticator(&self, packet: &[u8]) -> [u8; DIGEST_LENGTH] {
        let mut mac = HmacMd5::new_from_slice(&self.0).expect("HMAC can take key of any size");
        mac.update(packet);
        let mut digest = [0u8; DIGEST_LENGTH];
        digest.copy_from_slice(&mac.finalize().into_bytes());
        digest
    }

    /// Verifies a Message-Authenticator using constant-time comparison.
    #[must_use]
    pub fn verify_message_authenticator(&self, packet: &[u8], expected: &[u8]) -> bool {
        constant_time_compare(&self.message_authenticator(packet), expected)
    }

    /// Verifies a digest produced by [`Secret::packet_digest`].
    #[must_use]
    pub fn verify_packet_digest(&self, packet: &[u8], expected: &[u8]) -> bool {
        constant_time_compare(&self.packet_digest(packet), expected)
    }
}

impl Default for Secret {
    fn default() -> Self {
        Self::new(DEFAULT_SECRET)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Secret(<{} bytes>)", self.0.len())
    }
}

/// Performs constant-time comparison of two byte slices.
///
/// This prevents timing attacks by always comparing all bytes.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
