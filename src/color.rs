//! Color-space tags and the color classifier interface.
//!
//! [`ColorSpace`] is an interned tag, cheap to copy and compare, so it can be part of
//! an image's identity key. The [`ColorManager`] trait is the seam to the host's
//! color-management system; [`BasicColorManager`] handles the tags an offline
//! renderer sees without OCIO-style configuration: automatic, raw/data, sRGB,
//! scene linear, and simple gamma spaces.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::texel::TexelSliceMut;
use crate::utils::interner::{self, Symbol};

const AUTO_NAME: &str = "";
const RAW_NAME: &str = "__builtin_raw";
const SRGB_NAME: &str = "__builtin_srgb";

/// Interned color-space tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorSpace(Symbol);

impl ColorSpace {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(interner::intern(name))
    }

    /// Let the classifier decide from the file format.
    #[must_use]
    pub fn auto() -> Self {
        Self::new(AUTO_NAME)
    }

    /// Data that must never be color converted.
    #[must_use]
    pub fn raw() -> Self {
        Self::new(RAW_NAME)
    }

    #[must_use]
    pub fn srgb() -> Self {
        Self::new(SRGB_NAME)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        interner::resolve(self.0)
    }

    #[must_use]
    pub fn is_auto(self) -> bool {
        self.as_str().is_empty()
    }

    #[must_use]
    pub fn is_raw(self) -> bool {
        self == Self::raw()
    }

    #[must_use]
    pub fn is_srgb(self) -> bool {
        self == Self::srgb()
    }
}

impl Default for ColorSpace {
    fn default() -> Self {
        Self::auto()
    }
}

impl fmt::Debug for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ColorSpace({:?})", self.as_str())
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Color classification and conversion supplied by the host.
pub trait ColorManager: Send + Sync {
    /// Maps a user-specified tag to one the converter can handle. The result is either
    /// [`ColorSpace::raw`], [`ColorSpace::srgb`], or a tag accepted by
    /// [`ColorManager::to_scene_linear`].
    fn detect_known_colorspace(
        &self,
        colorspace: ColorSpace,
        file_format: &str,
        is_float: bool,
    ) -> ColorSpace;

    /// Whether the tag names non-color data.
    fn is_data(&self, colorspace: ColorSpace) -> bool;

    /// Converts interleaved pixels to scene linear in place. With `compress_as_srgb`
    /// the result is stored sRGB-encoded, for 8-bit storage. With `associated_alpha`
    /// four-channel color is premultiplied and must be converted unassociated.
    fn to_scene_linear(
        &self,
        colorspace: ColorSpace,
        pixels: TexelSliceMut<'_>,
        channels: usize,
        compress_as_srgb: bool,
        associated_alpha: bool,
    );
}

/// Color manager without external configuration.
///
/// Known tags, compared case-insensitively:
/// - raw: `Raw`, `Non-Color`, `Data`, `Linear`, `Scene Linear`, `Linear Rec.709`
/// - sRGB: `sRGB`, `sRGB IEC61966-2.1`
/// - gamma spaces registered with [`BasicColorManager::with_gamma_space`]
///   (`Gamma 1.8` and `Gamma 2.2` by default)
///
/// Unknown tags are logged and treated as raw.
pub struct BasicColorManager {
    gamma_spaces: FxHashMap<ColorSpace, f32>,
}

impl Default for BasicColorManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BasicColorManager {
    #[must_use]
    pub fn new() -> Self {
        let mut gamma_spaces = FxHashMap::default();
        gamma_spaces.insert(ColorSpace::new("Gamma 1.8"), 1.8);
        gamma_spaces.insert(ColorSpace::new("Gamma 2.2"), 2.2);
        Self { gamma_spaces }
    }

    /// Registers a pure power-law space under `name`.
    #[must_use]
    pub fn with_gamma_space(mut self, name: &str, gamma: f32) -> Self {
        self.gamma_spaces.insert(ColorSpace::new(name), gamma);
        self
    }

    fn is_linear_name(name: &str) -> bool {
        ["linear", "scene linear", "scene_linear", "linear rec.709"]
            .iter()
            .any(|n| name.eq_ignore_ascii_case(n))
    }

    fn is_data_name(name: &str) -> bool {
        ["raw", "non-color", "data"]
            .iter()
            .any(|n| name.eq_ignore_ascii_case(n))
    }

    fn is_srgb_name(name: &str) -> bool {
        ["srgb", "srgb iec61966-2.1"]
            .iter()
            .any(|n| name.eq_ignore_ascii_case(n))
    }
}

impl ColorManager for BasicColorManager {
    fn detect_known_colorspace(
        &self,
        colorspace: ColorSpace,
        file_format: &str,
        is_float: bool,
    ) -> ColorSpace {
        if colorspace.is_auto() {
            // Float formats carry scene-linear data, 8/16-bit ones are display encoded.
            return if is_float || file_format.eq_ignore_ascii_case("openexr") {
                ColorSpace::raw()
            } else {
                ColorSpace::srgb()
            };
        }
        if colorspace.is_raw() || colorspace.is_srgb() {
            return colorspace;
        }

        let name = colorspace.as_str();
        if Self::is_data_name(name) || Self::is_linear_name(name) {
            ColorSpace::raw()
        } else if Self::is_srgb_name(name) {
            ColorSpace::srgb()
        } else if self.gamma_spaces.contains_key(&colorspace) {
            colorspace
        } else {
            log::warn!("Colorspace '{name}' not found, will use raw instead.");
            ColorSpace::raw()
        }
    }

    fn is_data(&self, colorspace: ColorSpace) -> bool {
        colorspace.is_raw() || Self::is_data_name(colorspace.as_str())
    }

    fn to_scene_linear(
        &self,
        colorspace: ColorSpace,
        mut pixels: TexelSliceMut<'_>,
        channels: usize,
        compress_as_srgb: bool,
        associated_alpha: bool,
    ) {
        let Some(&gamma) = self.gamma_spaces.get(&colorspace) else {
            log::debug!("No conversion registered for colorspace '{colorspace}'");
            return;
        };

        let convert = |v: f32| {
            let linear = v.max(0.0).powf(gamma);
            if compress_as_srgb {
                linear_to_srgb(linear)
            } else {
                linear
            }
        };

        pixels.map_pixels_f32(channels, |pixel| {
            if channels != 4 {
                pixel.iter_mut().for_each(|v| *v = convert(*v));
                return;
            }
            let (color, alpha) = pixel.split_at_mut(3);
            let alpha = alpha[0];
            // Fully transparent and opaque pixels are the same either way.
            if associated_alpha && alpha > 0.0 && (alpha - 1.0).abs() > f32::EPSILON {
                color.iter_mut().for_each(|v| *v = convert(*v / alpha) * alpha);
            } else {
                color.iter_mut().for_each(|v| *v = convert(*v));
            }
        });
    }
}

/// sRGB transfer function (encoding).
#[must_use]
pub fn linear_to_srgb(c: f32) -> f32 {
    if c < 0.003_130_8 {
        if c < 0.0 { 0.0 } else { c * 12.92 }
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// sRGB transfer function (decoding).
#[must_use]
pub fn srgb_to_linear(c: f32) -> f32 {
    if c < 0.040_45 {
        if c < 0.0 { 0.0 } else { c * (1.0 / 12.92) }
    } else {
        ((c + 0.055) * (1.0 / 1.055)).powf(2.4)
    }
}
