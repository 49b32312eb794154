use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FingerprintError {
    #[error("fingerprint must be 32 colon-separated hex byte pairs")]
    Malformed,
    #[error("invalid hex in fingerprint: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// SHA-256 digest of an application's signing certificate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sha256Digest([u8; 32]);

impl Sha256Digest {
    /// Hashes a raw signing certificate.
    pub fn from_certificate(certificate: &[u8]) -> Self {
        Self(Sha256::digest(certificate).into())
    }
}

impl FromStr for Sha256Digest {
    type Err = FingerprintError;

    /// Parses the `AB:CD:...` form used in web app manifests.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 * 3 - 1 || s.split(':').any(|pair| pair.len() != 2) {
            return Err(FingerprintError::Malformed);
        }
        let hex_digits: String = s.split(':').collect();
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex_digits, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self.0.iter().map(|b| format!("{b:02X}")).collect();
        f.write_str(&pairs.join(":"))
    }
}

impl fmt::Debug for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha256Digest({self})")
    }
}

impl Serialize for Sha256Digest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// True iff the app is signed with at least one of the required certificates.
///
/// An app with several signing configurations verifies as soon as any one of
/// them is listed. An empty fingerprint set never verifies.
pub fn verifies(
    app_fingerprints: &BTreeSet<Sha256Digest>,
    required: &BTreeSet<Sha256Digest>,
) -> bool {
    !app_fingerprints.is_disjoint(required)
}
