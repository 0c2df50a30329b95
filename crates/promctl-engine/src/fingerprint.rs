//! Change detection over the rendered document.
//!
//! The fingerprint is computed over the exact bytes destined for the
//! managed server's config location, never over an in-memory structure.

use sha2::{Digest, Sha256};

use promctl_core::Fingerprint;
use promctl_state::AppliedState;

use crate::synth::DesiredConfig;

/// A serialized document together with its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    pub bytes: Vec<u8>,
    pub fingerprint: Fingerprint,
}

impl RenderedConfig {
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap_or_default()
    }
}

/// Serialize a document to YAML and fingerprint the result.
///
/// Struct fields serialize in declaration order and every map in the
/// document is ordered, so equal documents always render to equal bytes.
pub fn render(doc: &DesiredConfig) -> Result<RenderedConfig, serde_yaml::Error> {
    let bytes = serde_yaml::to_string(doc)?.into_bytes();
    let fingerprint = fingerprint(&bytes);
    Ok(RenderedConfig { bytes, fingerprint })
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
    Fingerprint::from_hex(hex::encode(Sha256::digest(bytes)))
}

/// Whether `rendered` differs from what was last applied.
pub fn needs_apply(rendered: &RenderedConfig, applied: &AppliedState) -> bool {
    applied.fingerprint.as_ref() != Some(&rendered.fingerprint)
}
