//! Cache Settings
//!
//! [`CacheSettings`] gathers the knobs of the texture cache. It is plain data with
//! serde support so a host application can keep it in its own configuration file.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use texcache::{CacheSettings, MipCacheSettings};
//!
//! // Defaults: no resolution limit, 1024 images, rayon-chosen thread count.
//! let settings = CacheSettings::default();
//!
//! // Clamp textures to 2K and bake `.tx` files next to the sources.
//! let settings = CacheSettings {
//!     texture_limit: 2048,
//!     mip_cache: Some(MipCacheSettings {
//!         auto_convert: true,
//!         ..Default::default()
//!     }),
//!     ..Default::default()
//! };
//!
//! // Or from JSON.
//! let settings = CacheSettings::from_json_str(r#"{ "texture_limit": 512 }"#)?;
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Default ceiling on the number of live images across all pixel types.
pub const DEFAULT_MAX_IMAGES: usize = 1024;

// ---------------------------------------------------------------------------
// MipCacheSettings
// ---------------------------------------------------------------------------

/// Configuration of the pre-baked mip-map cache (`.tx` files).
///
/// When present in [`CacheSettings::mip_cache`], file images are served from a
/// `.tx` sibling instead of being decoded into device memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MipCacheSettings {
    /// Generate missing `.tx` files through the
    /// [`TextureBaker`](crate::mipcache::TextureBaker).
    pub auto_convert: bool,

    /// Directory holding generated `.tx` files. When unset they are written next to
    /// the source image.
    pub custom_cache_path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// CacheSettings
// ---------------------------------------------------------------------------

/// Top-level texture cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Largest allowed texture dimension in pixels. Images whose largest side
    /// exceeds it are downscaled by powers of two. `0` disables the limit.
    pub texture_limit: u32,

    /// Maximum number of images alive at once, summed over all pixel types.
    /// Requests beyond it are rejected.
    pub max_images: usize,

    /// Size of the loading worker pool. `0` lets rayon pick (one per core).
    pub worker_threads: usize,

    /// Texture streaming through pre-baked mip caches. `None` loads every image
    /// into device memory.
    pub mip_cache: Option<MipCacheSettings>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            texture_limit: 0,
            max_images: DEFAULT_MAX_IMAGES,
            worker_threads: 0,
            mip_cache: None,
        }
    }
}

impl CacheSettings {
    /// Parses settings from a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    #[must_use]
    pub fn with_texture_limit(mut self, limit: u32) -> Self {
        self.texture_limit = limit;
        self
    }

    #[must_use]
    pub fn with_max_images(mut self, max_images: usize) -> Self {
        self.max_images = max_images;
        self
    }

    #[must_use]
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    #[must_use]
    pub fn with_mip_cache(mut self, mip_cache: MipCacheSettings) -> Self {
        self.mip_cache = Some(mip_cache);
        self
    }
}
