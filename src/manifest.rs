//! Distribution manifest for a packaged plugin.
//!
//! Hosts download the archive named by `archive.reference` and verify it
//! against `archive.checksum`, the lowercase hex SHA-256 of its bytes.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Manifest schema version written by [`PluginManifest`].
pub const MANIFEST_SCHEMA_VERSION: u32 = 2;

/// Plugin kind: an executable speaking the stdio protocol.
pub const PROCESS_PLUGIN_KIND: &str = "process";

/// Where the plugin archive lives and what it hashes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveReference {
    pub reference: String,
    pub checksum: String,
}

/// Descriptor published alongside a plugin release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    pub schema_version: u32,
    pub kind: String,
    pub name: String,
    pub version: String,
    pub archive: ArchiveReference,
}

impl PluginManifest {
    /// Describe an archive held in memory.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        archive_url: impl Into<String>,
        archive_bytes: &[u8],
    ) -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            kind: PROCESS_PLUGIN_KIND.to_string(),
            name: name.into(),
            version: version.into(),
            archive: ArchiveReference {
                reference: archive_url.into(),
                checksum: sha256_hex(archive_bytes),
            },
        }
    }

    /// Describe the archive at `archive_path`.
    pub fn from_archive_path(
        name: impl Into<String>,
        version: impl Into<String>,
        archive_url: impl Into<String>,
        archive_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let bytes = std::fs::read(archive_path.as_ref())?;
        Ok(Self::new(name, version, archive_url, &bytes))
    }

    /// Pretty-printed JSON form.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
