// Payload Builder
// Assembles the delivery artifact (a gzip-compressed tar archive) entirely
// in memory. Output is deterministic: entries are ordered ascending by name
// and all archive metadata is fixed, so repeated runs against the same
// target produce byte-identical artifacts.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use thiserror::Error;

/// Default ceiling on total uncompressed input size (8 MiB). A bound against
/// accidentally feeding huge inputs into an in-memory build.
pub const DEFAULT_SIZE_CEILING: u64 = 8 * 1024 * 1024;

/// Payload construction errors. All fatal; the pipeline never retries a
/// failed build.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Invalid entry name: {0:?}")]
    InvalidName(String),

    #[error("Duplicate entry after normalization: {0}")]
    DuplicateEntry(String),

    #[error("Total uncompressed size {total} exceeds ceiling {ceiling}")]
    TooLarge { total: u64, ceiling: u64 },

    #[error("Archive encoding failed: {0}")]
    Encode(String),
}

/// In-memory archive builder.
pub struct PayloadBuilder {
    entries: BTreeMap<String, Vec<u8>>,
    ceiling: u64,
}

impl PayloadBuilder {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            ceiling: DEFAULT_SIZE_CEILING,
        }
    }

    pub fn with_ceiling(mut self, ceiling: u64) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// Add one file entry. Names are normalized (leading `/` and `./`
    /// stripped); collisions after normalization are rejected.
    pub fn add_file(&mut self, name: &str, bytes: Vec<u8>) -> Result<(), BuildError> {
        let normalized = normalize_name(name)?;
        if self.entries.contains_key(&normalized) {
            return Err(BuildError::DuplicateEntry(normalized));
        }
        self.entries.insert(normalized, bytes);
        Ok(())
    }

    /// Convenience constructor from a name -> bytes mapping.
    pub fn from_files(
        files: impl IntoIterator<Item = (String, Vec<u8>)>,
    ) -> Result<Self, BuildError> {
        let mut builder = Self::new();
        for (name, bytes) in files {
            builder.add_file(&name, bytes)?;
        }
        Ok(builder)
    }

    /// Produce the compressed archive bytes.
    pub fn build(&self) -> Result<Vec<u8>, BuildError> {
        let total: u64 = self.entries.values().map(|b| b.len() as u64).sum();
        if total > self.ceiling {
            return Err(BuildError::TooLarge {
                total,
                ceiling: self.ceiling,
            });
        }

        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut archive = tar::Builder::new(encoder);

        // BTreeMap iteration gives the fixed ascending entry order.
        for (name, bytes) in &self.entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(bytes.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(0);
            header.set_uid(0);
            header.set_gid(0);
            archive
                .append_data(&mut header, name, bytes.as_slice())
                .map_err(|e| BuildError::Encode(e.to_string()))?;
        }

        let encoder = archive
            .into_inner()
            .map_err(|e| BuildError::Encode(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| BuildError::Encode(e.to_string()))
    }
}

impl Default for PayloadBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_name(name: &str) -> Result<String, BuildError> {
    let mut trimmed = name.trim();
    loop {
        if let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        } else if let Some(rest) = trimmed.strip_prefix('/') {
            trimmed = rest;
        } else {
            break;
        }
    }
    if trimmed.is_empty() {
        return Err(BuildError::InvalidName(name.to_string()));
    }
    if trimmed.split('/').any(|part| part == ".." || part.is_empty()) {
        return Err(BuildError::InvalidName(name.to_string()));
    }
    Ok(trimmed.to_string())
}
