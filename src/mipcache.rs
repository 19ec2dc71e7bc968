//! Pre-baked mip-map cache files.
//!
//! With a texture-streaming backend the renderer samples tiled, mip-mapped `.tx`
//! files directly instead of device textures. For every file image the resolver
//! finds the `.tx` counterpart or has a [`TextureBaker`] generate it.

use std::path::{Path, PathBuf};

use crate::color::ColorSpace;
use crate::request::Extension;
use crate::settings::MipCacheSettings;

/// Extension of mip-cache files.
pub const TX_EXTENSION: &str = "tx";

/// Parameters handed to the [`TextureBaker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOptions {
    /// `black`, `periodic` or `clamp`.
    pub wrap: &'static str,
    /// Source color space to convert from. `None` bakes the data untouched.
    pub in_colorspace: Option<String>,
    /// Set whenever `in_colorspace` is.
    pub out_colorspace: Option<String>,
    pub filter: &'static str,
    pub opaque_detect: bool,
    pub highlight_compensation: bool,
    /// Skip the bake when the output is newer than the source.
    pub update_mode: bool,
}

impl TxOptions {
    #[must_use]
    pub fn new(extension: Extension, colorspace: ColorSpace) -> Self {
        let wrap = match extension {
            Extension::Clip => "black",
            Extension::Repeat => "periodic",
            Extension::Extend => "clamp",
        };

        // Bake in linear so mip levels average light, not encoded values.
        let in_colorspace = if colorspace.is_raw() {
            None
        } else if colorspace.is_srgb() || colorspace.is_auto() {
            Some("sRGB".to_string())
        } else {
            Some(colorspace.as_str().to_string())
        };
        let out_colorspace = in_colorspace.as_ref().map(|_| "linear".to_string());

        Self {
            wrap,
            in_colorspace,
            out_colorspace,
            filter: "lanczos3",
            opaque_detect: true,
            highlight_compensation: true,
            update_mode: true,
        }
    }
}

/// Generator of `.tx` files.
pub trait TextureBaker: Send + Sync {
    /// Bakes `src` into `dst`. Returns `false` on failure.
    fn make_tx(&self, src: &Path, dst: &Path, options: &TxOptions) -> bool;
}

/// Where the `.tx` file for `path` lives: next to it, or in `cache_dir`.
#[must_use]
pub fn tx_path(path: &Path, cache_dir: Option<&Path>) -> PathBuf {
    let tx = path.with_extension(TX_EXTENSION);
    match (cache_dir, tx.file_name()) {
        (Some(dir), Some(name)) => dir.join(name),
        _ => tx,
    }
}

fn is_tx(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == TX_EXTENSION)
}

/// Resolves the mip-cache file for `path`, baking it if allowed.
///
/// Returns `None` if the source does not exist, no cache file is available, or
/// baking failed.
pub fn resolve(
    path: &Path,
    settings: &MipCacheSettings,
    baker: Option<&dyn TextureBaker>,
    extension: Extension,
    colorspace: ColorSpace,
) -> Option<PathBuf> {
    if !path.exists() {
        return None;
    }
    if is_tx(path) {
        return Some(path.to_path_buf());
    }

    let tx = tx_path(path, settings.custom_cache_path.as_deref());
    if tx.exists() {
        return Some(tx);
    }

    if !settings.auto_convert {
        return None;
    }
    let Some(baker) = baker else {
        log::debug!("No texture baker installed, can't convert '{}'", path.display());
        return None;
    };

    log::info!("Converting '{}' to '{}'", path.display(), tx.display());
    let options = TxOptions::new(extension, colorspace);
    if baker.make_tx(path, &tx, &options) {
        Some(tx)
    } else {
        log::warn!("Failed to generate mip cache for '{}'", path.display());
        None
    }
}
