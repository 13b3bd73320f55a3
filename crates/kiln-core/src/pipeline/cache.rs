//! Content-hash cache for the images stage.
//!
//! Image recompression is by far the slowest stage, so the dist directory
//! keeps a small manifest mapping each source (relative path) to the BLAKE3
//! hash of its contents at the time it was last optimized. An image is
//! skipped when its hash is unchanged and its output still exists.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::ImagesConfig;

/// Manifest file name inside the dist directory.
pub const CACHE_FILE_NAME: &str = ".kiln-cache.json";

/// Source-hash manifest persisted between builds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageCache {
    #[serde(skip)]
    path: PathBuf,

    /// Fingerprint of the optimizer settings the entries were built with
    #[serde(default)]
    settings: String,

    /// Relative source path → BLAKE3 hex digest
    entries: BTreeMap<String, String>,
}

impl ImageCache {
    /// Load the manifest from a dist directory.
    ///
    /// A missing or unreadable manifest yields an empty cache; the worst
    /// outcome is that every image is optimized again. Entries recorded
    /// under different optimizer settings are discarded.
    pub fn load(dist_dir: &Path, settings: &str) -> Self {
        let path = dist_dir.join(CACHE_FILE_NAME);
        let mut cache = std::fs::read_to_string(&path)
            .ok()
            .and_then(|content| match serde_json::from_str::<ImageCache>(&content) {
                Ok(cache) => Some(cache),
                Err(e) => {
                    tracing::warn!("Ignoring corrupt image cache {:?}: {}", path, e);
                    None
                }
            })
            .unwrap_or_default();

        if cache.settings != settings {
            if !cache.entries.is_empty() {
                tracing::debug!("Image settings changed, discarding {} cache entries", cache.entries.len());
            }
            cache.entries.clear();
            cache.settings = settings.to_string();
        }
        cache.path = path;
        cache
    }

    /// Whether `relative` was last built from content with this hash.
    pub fn is_fresh(&self, relative: &Path, hash: &str, output: &Path) -> bool {
        output.exists() && self.entries.get(&key(relative)).is_some_and(|h| h == hash)
    }

    /// Record the hash a source was built from.
    pub fn insert(&mut self, relative: &Path, hash: String) {
        self.entries.insert(key(relative), hash);
    }

    /// Forget a source (it failed or was removed).
    pub fn remove(&mut self, relative: &Path) {
        self.entries.remove(&key(relative));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the manifest back to the dist directory.
    pub fn save(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(&self.path, json)
    }
}

fn key(relative: &Path) -> String {
    // forward slashes keep manifests portable between platforms
    relative.to_string_lossy().replace('\\', "/")
}

/// BLAKE3 hex digest of a file's contents.
pub fn content_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Fingerprint of the settings that affect optimized output.
///
/// Scheduling knobs (`parallel_workers`, `cache`) and the source location
/// are left out so changing them keeps the cache.
pub fn settings_fingerprint(config: &ImagesConfig) -> String {
    let settings = serde_json::json!({
        "quality": config.quality,
        "png_compression": config.png_compression,
        "keep_larger_originals": config.keep_larger_originals,
        "svg": config.svg,
    });
    content_hash(settings.to_string().as_bytes())
}
