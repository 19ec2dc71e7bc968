//! Image file decoding.
//!
//! [`ImageReader`] is the seam to the image decoding library. [`FileImageReader`] is
//! the default implementation on top of the `image` crate. Readers return rows top
//! first; the loader takes care of the renderer's bottom-up convention.

use std::path::Path;

use image::{DynamicImage, ImageDecoder, ImageFormat};

use crate::errors::{CacheError, Result};
use crate::slot::PixelKind;
use crate::texel::{SourcePixels, Texel};

/// Format description of an image file, obtained without decoding pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub channels: u32,
    pub kind: PixelKind,
    /// Lower-case format name, e.g. `png` or `openexr`.
    pub format_name: String,
    /// Four-channel data is CMYK and needs conversion to RGB.
    pub is_cmyk: bool,
}

/// Decoded pixels with the spec they were decoded with.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub spec: ImageSpec,
    pub pixels: SourcePixels,
}

/// Decoder for image files.
pub trait ImageReader: Send + Sync {
    /// Reads the header of `path`.
    fn probe(&self, path: &Path) -> Result<ImageSpec>;

    /// Decodes the whole file. With `associate_alpha`, color channels of images with
    /// an alpha channel are premultiplied.
    fn read(&self, path: &Path, associate_alpha: bool) -> Result<DecodedImage>;
}

/// [`ImageReader`] backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileImageReader;

impl FileImageReader {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn check_path(path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(CacheError::FileNotFound(path.display().to_string()));
        }
        if path.is_dir() {
            return Err(CacheError::IsDirectory(path.display().to_string()));
        }
        Ok(())
    }

    fn open(path: &Path) -> Result<image::ImageReader<std::io::BufReader<std::fs::File>>> {
        Self::check_path(path)?;
        Ok(image::ImageReader::open(path)?.with_guessed_format()?)
    }
}

impl ImageReader for FileImageReader {
    fn probe(&self, path: &Path) -> Result<ImageSpec> {
        let reader = Self::open(path)?;
        let format_name = reader.format().map(format_name).unwrap_or_default();
        let decoder = reader.into_decoder()?;
        let (width, height) = decoder.dimensions();
        let (kind, channels) = color_layout(decoder.color_type())?;

        Ok(ImageSpec {
            width,
            height,
            depth: 1,
            channels,
            kind,
            format_name,
            is_cmyk: false,
        })
    }

    fn read(&self, path: &Path, associate_alpha: bool) -> Result<DecodedImage> {
        let reader = Self::open(path)?;
        let format_name = reader.format().map(format_name).unwrap_or_default();
        let decoded = reader.decode()?;
        let (width, height) = (decoded.width(), decoded.height());

        let (kind, channels, mut pixels) = match decoded {
            DynamicImage::ImageLuma8(b) => (PixelKind::Byte, 1, SourcePixels::U8(b.into_raw())),
            DynamicImage::ImageLumaA8(b) => (PixelKind::Byte, 2, SourcePixels::U8(b.into_raw())),
            DynamicImage::ImageRgb8(b) => (PixelKind::Byte, 3, SourcePixels::U8(b.into_raw())),
            DynamicImage::ImageRgba8(b) => (PixelKind::Byte, 4, SourcePixels::U8(b.into_raw())),
            DynamicImage::ImageLuma16(b) => {
                (PixelKind::Ushort, 1, SourcePixels::U16(b.into_raw()))
            }
            DynamicImage::ImageLumaA16(b) => {
                (PixelKind::Ushort, 2, SourcePixels::U16(b.into_raw()))
            }
            DynamicImage::ImageRgb16(b) => (PixelKind::Ushort, 3, SourcePixels::U16(b.into_raw())),
            DynamicImage::ImageRgba16(b) => {
                (PixelKind::Ushort, 4, SourcePixels::U16(b.into_raw()))
            }
            DynamicImage::ImageRgb32F(b) => (PixelKind::Float, 3, SourcePixels::F32(b.into_raw())),
            DynamicImage::ImageRgba32F(b) => {
                (PixelKind::Float, 4, SourcePixels::F32(b.into_raw()))
            }
            other => (
                PixelKind::Float,
                4,
                SourcePixels::F32(other.to_rgba32f().into_raw()),
            ),
        };

        if associate_alpha {
            premultiply(&mut pixels, channels as usize);
        }

        Ok(DecodedImage {
            spec: ImageSpec {
                width,
                height,
                depth: 1,
                channels,
                kind,
                format_name,
                is_cmyk: false,
            },
            pixels,
        })
    }
}

fn format_name(format: ImageFormat) -> String {
    match format {
        ImageFormat::Png => "png".to_string(),
        ImageFormat::Jpeg => "jpeg".to_string(),
        ImageFormat::OpenExr => "openexr".to_string(),
        ImageFormat::Hdr => "hdr".to_string(),
        ImageFormat::Tiff => "tiff".to_string(),
        other => format!("{other:?}").to_lowercase(),
    }
}

fn color_layout(color: image::ColorType) -> Result<(PixelKind, u32)> {
    use image::ColorType;
    Ok(match color {
        ColorType::L8 => (PixelKind::Byte, 1),
        ColorType::La8 => (PixelKind::Byte, 2),
        ColorType::Rgb8 => (PixelKind::Byte, 3),
        ColorType::Rgba8 => (PixelKind::Byte, 4),
        ColorType::L16 => (PixelKind::Ushort, 1),
        ColorType::La16 => (PixelKind::Ushort, 2),
        ColorType::Rgb16 => (PixelKind::Ushort, 3),
        ColorType::Rgba16 => (PixelKind::Ushort, 4),
        ColorType::Rgb32F => (PixelKind::Float, 3),
        ColorType::Rgba32F => (PixelKind::Float, 4),
        other => {
            return Err(CacheError::UnsupportedLayout(format!("{other:?}")));
        }
    })
}

/// Multiplies color channels by alpha for gray+alpha and RGBA data.
pub fn premultiply(pixels: &mut SourcePixels, channels: usize) {
    fn apply<T: Texel>(data: &mut [T], channels: usize) {
        for px in data.chunks_exact_mut(channels) {
            let (color, alpha) = px.split_at_mut(channels - 1);
            let a = alpha[0].to_f32();
            for c in color {
                *c = T::from_f32(c.to_f32() * a);
            }
        }
    }

    if channels != 2 && channels != 4 {
        return;
    }
    match pixels {
        SourcePixels::U8(v) => apply(v, channels),
        SourcePixels::U16(v) => apply(v, channels),
        SourcePixels::F16(v) => apply(v, channels),
        SourcePixels::F32(v) => apply(v, channels),
    }
}
