//! Host-provided images.
//!
//! Images generated by the host application (baked maps, packed or procedural
//! buffers) are requested with [`ImageRequest::builtin`](crate::request::ImageRequest::builtin)
//! and served through the [`BuiltinImages`] callbacks.

use std::path::Path;

use crate::request::BuiltinHandle;

/// Shape of a builtin image as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuiltinInfo {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub channels: u32,
    /// Float data is fetched with [`BuiltinImages::float_pixels`], everything else with
    /// [`BuiltinImages::byte_pixels`].
    pub is_float: bool,
    /// The host may drop its own copy once the pixels are fetched.
    pub free_cache: bool,
}

/// Callbacks into the host for builtin image data.
///
/// Pixel callbacks fill `pixels` with `width * height * depth * channels` interleaved
/// values in device order (bottom row first, no flip is applied) and return `false`
/// on failure.
pub trait BuiltinImages: Send + Sync {
    fn info(&self, name: &Path, handle: BuiltinHandle) -> Option<BuiltinInfo>;

    fn float_pixels(
        &self,
        name: &Path,
        handle: BuiltinHandle,
        pixels: &mut [f32],
        associate_alpha: bool,
        free_cache: bool,
    ) -> bool;

    fn byte_pixels(
        &self,
        name: &Path,
        handle: BuiltinHandle,
        pixels: &mut [u8],
        associate_alpha: bool,
        free_cache: bool,
    ) -> bool;
}
