//! Content fingerprints for drift detection
//!
//! A fingerprint is the full SHA-256 of a package list, hex encoded. It is
//! persisted in the environment status and only ever compared for equality.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Digest of package-list content
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of the given text
    pub fn of(text: &str) -> Self {
        use aws_lc_rs::digest;
        let hash = digest::digest(&digest::SHA256, text.as_bytes());
        let hex = hash
            .as_ref()
            .iter()
            .fold(String::with_capacity(64), |mut s, b| {
                use std::fmt::Write;
                let _ = write!(s, "{:02x}", b);
                s
            });
        Self(hex)
    }

    /// The hex-encoded digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
