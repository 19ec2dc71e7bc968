//! Image requests and their identity key.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::color::ColorSpace;

/// Texture filtering used when sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Interpolation {
    #[default]
    Linear,
    Closest,
    Cubic,
    Smart,
}

/// Behavior of lookups outside the `[0, 1]` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Extension {
    /// Tile the image.
    #[default]
    Repeat,
    /// Clamp to the edge pixels.
    Extend,
    /// Transparent black outside the image.
    Clip,
}

/// How the alpha channel is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AlphaMode {
    Unassociated,
    Associated,
    /// RGB and alpha carry unrelated data.
    ChannelPacked,
    /// Alpha is forced opaque.
    Ignore,
    #[default]
    Auto,
}

/// Opaque token for host-provided pixel data, passed back to
/// [`BuiltinImages`](crate::builtin::BuiltinImages) callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuiltinHandle(pub u64);

/// Identity of a cached image. Requests with equal keys share one slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageKey {
    pub path: PathBuf,
    pub grid_name: String,
    pub builtin: Option<BuiltinHandle>,
    pub interpolation: Interpolation,
    pub extension: Extension,
    pub alpha_mode: AlphaMode,
    pub colorspace: ColorSpace,
}

impl ImageKey {
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        self.builtin.is_some()
    }

    /// External volume files are read through a [`VolumeReader`](crate::volume::VolumeReader).
    #[must_use]
    pub fn is_volume_file(&self) -> bool {
        !self.is_builtin()
            && self
                .path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("vdb"))
    }
}

/// A request to make an image available on the device.
///
/// ```rust,ignore
/// let request = ImageRequest::file("textures/wood.png")
///     .with_interpolation(Interpolation::Cubic)
///     .with_colorspace(ColorSpace::srgb());
/// let slot = cache.add_image(&request);
/// ```
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub key: ImageKey,
    pub animated: bool,
    pub frame: f32,
    pub is_volume: bool,
    /// Values at or below this magnitude are considered empty when sparsifying volumes.
    pub isovalue: f32,
}

impl ImageRequest {
    fn with_key(path: PathBuf, builtin: Option<BuiltinHandle>) -> Self {
        Self {
            key: ImageKey {
                path,
                grid_name: String::new(),
                builtin,
                interpolation: Interpolation::default(),
                extension: Extension::default(),
                alpha_mode: AlphaMode::default(),
                colorspace: ColorSpace::auto(),
            },
            animated: false,
            frame: 0.0,
            is_volume: false,
            isovalue: 0.0,
        }
    }

    /// An image read from disk.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::with_key(path.as_ref().to_path_buf(), None)
    }

    /// An image whose pixels are provided by the host. `name` is used for logging
    /// and statistics.
    pub fn builtin(name: impl Into<PathBuf>, handle: BuiltinHandle) -> Self {
        Self::with_key(name.into(), Some(handle))
    }

    /// A grid of a volume file.
    pub fn volume(path: impl AsRef<Path>, grid_name: &str, isovalue: f32) -> Self {
        let mut request = Self::with_key(path.as_ref().to_path_buf(), None);
        request.key.grid_name = grid_name.to_string();
        request.is_volume = true;
        request.isovalue = isovalue;
        request
    }

    #[must_use]
    pub fn with_grid_name(mut self, grid_name: &str) -> Self {
        self.key.grid_name = grid_name.to_string();
        self
    }

    #[must_use]
    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.key.interpolation = interpolation;
        self
    }

    #[must_use]
    pub fn with_extension(mut self, extension: Extension) -> Self {
        self.key.extension = extension;
        self
    }

    #[must_use]
    pub fn with_alpha_mode(mut self, alpha_mode: AlphaMode) -> Self {
        self.key.alpha_mode = alpha_mode;
        self
    }

    #[must_use]
    pub fn with_colorspace(mut self, colorspace: ColorSpace) -> Self {
        self.key.colorspace = colorspace;
        self
    }

    #[must_use]
    pub fn with_frame(mut self, frame: f32) -> Self {
        self.animated = true;
        self.frame = frame;
        self
    }

    /// Marks an in-memory or file image as volumetric so it is considered for sparse
    /// storage.
    #[must_use]
    pub fn as_volume(mut self, isovalue: f32) -> Self {
        self.is_volume = true;
        self.isovalue = isovalue;
        self
    }
}
