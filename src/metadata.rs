//! Image metadata probing.
//!
//! Determines format, dimensions, channel count and color space of a request without
//! reading pixel data. Probing never fails hard: an unreadable source yields
//! metadata with zero channels, which the loader later rejects and replaces with the
//! missing-texture marker.

use crate::builtin::BuiltinImages;
use crate::color::{ColorManager, ColorSpace};
use crate::reader::ImageReader;
use crate::request::ImageKey;
use crate::slot::{ImageDataType, PixelKind};
use crate::volume::{self, VolumeReader};

/// What is known about an image before loading it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageMetaData {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    /// Channel count of the source. Loading requires `1..=4`.
    pub channels: u32,
    pub is_float: bool,
    pub is_half: bool,
    /// Storage type on the device.
    pub data_type: ImageDataType,
    /// Color space after canonicalization by the [`ColorManager`].
    pub colorspace: ColorSpace,
    /// Pixels are converted to scene linear and stored sRGB encoded.
    pub compress_as_srgb: bool,
    /// Builtin images only: the host may drop its own copy after loading.
    pub builtin_free_cache: bool,
}

impl ImageMetaData {
    fn empty(colorspace: ColorSpace) -> Self {
        Self {
            width: 0,
            height: 0,
            depth: 0,
            channels: 0,
            is_float: false,
            is_half: false,
            data_type: ImageDataType::Float4,
            colorspace,
            compress_as_srgb: false,
            builtin_free_cache: false,
        }
    }

    /// Number of pixels at full resolution.
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize * self.depth as usize
    }

    #[must_use]
    pub fn max_dimension(&self) -> u32 {
        self.width.max(self.height).max(self.depth)
    }

    /// Canonicalizes the color space and picks the storage consequences.
    ///
    /// - raw: stored as is
    /// - sRGB: kept sRGB encoded (`compress_as_srgb`)
    /// - anything else: converted to scene linear; 8-bit types are re-encoded as
    ///   sRGB and 16-bit integer types are promoted to half so converted values
    ///   above 1 survive
    pub fn detect_colorspace(&mut self, colors: &dyn ColorManager, file_format: &str) {
        self.colorspace = colors.detect_known_colorspace(
            self.colorspace,
            file_format,
            self.is_float || self.is_half,
        );

        if self.colorspace.is_raw() {
            return;
        }
        if self.colorspace.is_srgb() {
            self.compress_as_srgb = true;
            return;
        }

        self.compress_as_srgb =
            matches!(self.data_type, ImageDataType::Byte | ImageDataType::Byte4);
        self.data_type = match self.data_type {
            ImageDataType::Ushort => ImageDataType::Half,
            ImageDataType::Ushort4 => ImageDataType::Half4,
            other => other,
        };
    }
}

/// Probes requests through the configured sources.
pub struct MetadataProber<'a> {
    pub reader: &'a dyn ImageReader,
    pub builtins: Option<&'a dyn BuiltinImages>,
    pub volumes: Option<&'a dyn VolumeReader>,
    pub colors: &'a dyn ColorManager,
}

impl MetadataProber<'_> {
    /// Probes `key`. Failures are logged at debug level and produce metadata with
    /// zero channels.
    #[must_use]
    pub fn probe(&self, key: &ImageKey) -> ImageMetaData {
        let mut metadata = ImageMetaData::empty(key.colorspace);

        if let Some(handle) = key.builtin {
            let Some(info) = self
                .builtins
                .and_then(|builtins| builtins.info(&key.path, handle))
            else {
                log::debug!("No builtin info for '{}'", key.path.display());
                return metadata;
            };
            metadata.width = info.width;
            metadata.height = info.height;
            metadata.depth = info.depth.max(1);
            metadata.channels = info.channels;
            metadata.is_float = info.is_float;
            metadata.builtin_free_cache = info.free_cache;
            let kind = if info.is_float { PixelKind::Float } else { PixelKind::Byte };
            metadata.data_type = ImageDataType::for_source(kind, info.channels);
            metadata.detect_colorspace(self.colors, "");
            return metadata;
        }

        if key.is_volume_file() {
            let Some(resolution) = self
                .volumes
                .and_then(|volumes| volumes.probe(&key.path, &key.grid_name))
            else {
                log::debug!(
                    "File '{}' does not have grid '{}'",
                    key.path.display(),
                    key.grid_name
                );
                return metadata;
            };
            metadata.width = resolution.x;
            metadata.height = resolution.y;
            metadata.depth = resolution.z;
            metadata.is_float = true;
            metadata.colorspace = ColorSpace::raw();
            metadata.channels = volume::grid_channels(&key.grid_name);
            metadata.data_type = ImageDataType::for_source(PixelKind::Float, metadata.channels);
            return metadata;
        }

        let spec = match self.reader.probe(&key.path) {
            Ok(spec) => spec,
            Err(err) => {
                log::debug!("Probing '{}' failed: {err}", key.path.display());
                return metadata;
            }
        };
        metadata.width = spec.width;
        metadata.height = spec.height;
        metadata.depth = spec.depth;
        metadata.channels = spec.channels;
        metadata.is_float = matches!(spec.kind, PixelKind::Float | PixelKind::Half);
        metadata.is_half = spec.kind == PixelKind::Half;
        metadata.data_type = ImageDataType::for_source(spec.kind, spec.channels);
        metadata.detect_colorspace(self.colors, &spec.format_name);
        metadata
    }
}
