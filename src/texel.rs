//! Texel element types and typed pixel buffers.
//!
//! [`Texel`] abstracts over the four storage element types a texture can hold
//! (`u8`, `u16`, `f16`, `f32`). [`TexelBuffer`] is the closed variant over the
//! eight on-device pixel kinds, each with its own strongly-typed storage.

use half::f16;

use crate::slot::{ImageDataType, PixelKind};

/// A single channel value of a stored texture.
pub trait Texel: bytemuck::Pod + Default + PartialEq + Send + Sync + std::fmt::Debug {
    /// Whether values are floating point (and may therefore be non-finite).
    const IS_FLOAT: bool;

    fn from_f32(value: f32) -> Self;
    fn to_f32(self) -> f32;

    #[inline]
    fn is_finite(self) -> bool {
        true
    }

    /// The value representing full intensity (opaque alpha).
    #[inline]
    fn one() -> Self {
        Self::from_f32(1.0)
    }

    #[inline]
    fn zero() -> Self {
        Self::default()
    }

    /// Wraps flat channel data into the buffer variant of this element type.
    /// With `four_channel` the data is grouped into RGBA pixels.
    fn into_buffer(data: Vec<Self>, four_channel: bool) -> TexelBuffer;

    fn as_texel_slice(data: &mut [Self]) -> TexelSliceMut<'_>;

    /// Takes decoded source data, converting only when the element type differs.
    fn from_source(pixels: SourcePixels) -> Vec<Self>;
}

fn pack4<T: Texel>(data: &[T]) -> Vec<[T; 4]> {
    data.chunks_exact(4).map(|c| [c[0], c[1], c[2], c[3]]).collect()
}

impl Texel for u8 {
    const IS_FLOAT: bool = false;

    #[inline]
    fn from_f32(value: f32) -> Self {
        if value <= 0.0 {
            0
        } else if value > 1.0 - 0.5 / 255.0 {
            255
        } else {
            (255.0 * value + 0.5) as u8
        }
    }

    #[inline]
    fn to_f32(self) -> f32 {
        f32::from(self) * (1.0 / 255.0)
    }

    fn into_buffer(data: Vec<Self>, four_channel: bool) -> TexelBuffer {
        if four_channel {
            TexelBuffer::Byte4(pack4(&data))
        } else {
            TexelBuffer::Byte(data)
        }
    }

    fn as_texel_slice(data: &mut [Self]) -> TexelSliceMut<'_> {
        TexelSliceMut::U8(data)
    }

    fn from_source(pixels: SourcePixels) -> Vec<Self> {
        match pixels {
            SourcePixels::U8(v) => v,
            other => other.convert(),
        }
    }
}

impl Texel for u16 {
    const IS_FLOAT: bool = false;

    #[inline]
    fn from_f32(value: f32) -> Self {
        if value <= 0.0 {
            0
        } else if value > 1.0 - 0.5 / 65535.0 {
            65535
        } else {
            (65535.0 * value + 0.5) as u16
        }
    }

    #[inline]
    fn to_f32(self) -> f32 {
        f32::from(self) * (1.0 / 65535.0)
    }

    fn into_buffer(data: Vec<Self>, four_channel: bool) -> TexelBuffer {
        if four_channel {
            TexelBuffer::Ushort4(pack4(&data))
        } else {
            TexelBuffer::Ushort(data)
        }
    }

    fn as_texel_slice(data: &mut [Self]) -> TexelSliceMut<'_> {
        TexelSliceMut::U16(data)
    }

    fn from_source(pixels: SourcePixels) -> Vec<Self> {
        match pixels {
            SourcePixels::U16(v) => v,
            other => other.convert(),
        }
    }
}

impl Texel for f16 {
    const IS_FLOAT: bool = true;

    #[inline]
    fn from_f32(value: f32) -> Self {
        f16::from_f32(value)
    }

    #[inline]
    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }

    #[inline]
    fn is_finite(self) -> bool {
        f16::is_finite(self)
    }

    fn into_buffer(data: Vec<Self>, four_channel: bool) -> TexelBuffer {
        if four_channel {
            TexelBuffer::Half4(pack4(&data))
        } else {
            TexelBuffer::Half(data)
        }
    }

    fn as_texel_slice(data: &mut [Self]) -> TexelSliceMut<'_> {
        TexelSliceMut::F16(data)
    }

    fn from_source(pixels: SourcePixels) -> Vec<Self> {
        match pixels {
            SourcePixels::F16(v) => v,
            other => other.convert(),
        }
    }
}

impl Texel for f32 {
    const IS_FLOAT: bool = true;

    #[inline]
    fn from_f32(value: f32) -> Self {
        value
    }

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn is_finite(self) -> bool {
        f32::is_finite(self)
    }

    fn into_buffer(data: Vec<Self>, four_channel: bool) -> TexelBuffer {
        if four_channel {
            TexelBuffer::Float4(pack4(&data))
        } else {
            TexelBuffer::Float(data)
        }
    }

    fn as_texel_slice(data: &mut [Self]) -> TexelSliceMut<'_> {
        TexelSliceMut::F32(data)
    }

    fn from_source(pixels: SourcePixels) -> Vec<Self> {
        match pixels {
            SourcePixels::F32(v) => v,
            other => other.convert(),
        }
    }
}

/// Converts a buffer of one element type into another, going through `f32` when
/// the types differ.
pub fn convert_texels<S: Texel, D: Texel>(src: &[S]) -> Vec<D> {
    src.iter().map(|&v| D::from_f32(v.to_f32())).collect()
}

/// Flat channel data as produced by a decoder or host callback.
#[derive(Debug, Clone, PartialEq)]
pub enum SourcePixels {
    U8(Vec<u8>),
    U16(Vec<u16>),
    F16(Vec<f16>),
    F32(Vec<f32>),
}

impl SourcePixels {
    /// Number of channel values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::F16(v) => v.len(),
            Self::F32(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn kind(&self) -> PixelKind {
        match self {
            Self::U8(_) => PixelKind::Byte,
            Self::U16(_) => PixelKind::Ushort,
            Self::F16(_) => PixelKind::Half,
            Self::F32(_) => PixelKind::Float,
        }
    }

    /// Copies into another element type through `f32`.
    #[must_use]
    pub fn convert<D: Texel>(&self) -> Vec<D> {
        match self {
            Self::U8(v) => convert_texels(v),
            Self::U16(v) => convert_texels(v),
            Self::F16(v) => convert_texels(v),
            Self::F32(v) => convert_texels(v),
        }
    }

    pub fn as_texel_slice(&mut self) -> TexelSliceMut<'_> {
        match self {
            Self::U8(v) => TexelSliceMut::U8(v),
            Self::U16(v) => TexelSliceMut::U16(v),
            Self::F16(v) => TexelSliceMut::F16(v),
            Self::F32(v) => TexelSliceMut::F32(v),
        }
    }
}

/// Pixel storage of a device texture, one variant per [`ImageDataType`].
///
/// Four-channel variants hold one `[T; 4]` per pixel, single-channel variants one `T`.
#[derive(Debug, Clone, PartialEq)]
pub enum TexelBuffer {
    Float4(Vec<[f32; 4]>),
    Byte4(Vec<[u8; 4]>),
    Half4(Vec<[f16; 4]>),
    Float(Vec<f32>),
    Byte(Vec<u8>),
    Half(Vec<f16>),
    Ushort4(Vec<[u16; 4]>),
    Ushort(Vec<u16>),
}

impl TexelBuffer {
    /// A buffer without pixels, for textures whose data lives elsewhere.
    #[must_use]
    pub fn empty(data_type: ImageDataType) -> Self {
        match data_type {
            ImageDataType::Float4 => Self::Float4(Vec::new()),
            ImageDataType::Byte4 => Self::Byte4(Vec::new()),
            ImageDataType::Half4 => Self::Half4(Vec::new()),
            ImageDataType::Float => Self::Float(Vec::new()),
            ImageDataType::Byte => Self::Byte(Vec::new()),
            ImageDataType::Half => Self::Half(Vec::new()),
            ImageDataType::Ushort4 => Self::Ushort4(Vec::new()),
            ImageDataType::Ushort => Self::Ushort(Vec::new()),
        }
    }

    #[must_use]
    pub fn data_type(&self) -> ImageDataType {
        match self {
            Self::Float4(_) => ImageDataType::Float4,
            Self::Byte4(_) => ImageDataType::Byte4,
            Self::Half4(_) => ImageDataType::Half4,
            Self::Float(_) => ImageDataType::Float,
            Self::Byte(_) => ImageDataType::Byte,
            Self::Half(_) => ImageDataType::Half,
            Self::Ushort4(_) => ImageDataType::Ushort4,
            Self::Ushort(_) => ImageDataType::Ushort,
        }
    }

    /// Number of pixels (not channel values).
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Float4(v) => v.len(),
            Self::Byte4(v) => v.len(),
            Self::Half4(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Byte(v) => v.len(),
            Self::Half(v) => v.len(),
            Self::Ushort4(v) => v.len(),
            Self::Ushort(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bytes, as copied to the device.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Float4(v) => bytemuck::cast_slice(v),
            Self::Byte4(v) => bytemuck::cast_slice(v),
            Self::Half4(v) => bytemuck::cast_slice(v),
            Self::Float(v) => bytemuck::cast_slice(v),
            Self::Byte(v) => bytemuck::cast_slice(v),
            Self::Half(v) => bytemuck::cast_slice(v),
            Self::Ushort4(v) => bytemuck::cast_slice(v),
            Self::Ushort(v) => bytemuck::cast_slice(v),
        }
    }

    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.len() * self.data_type().bytes_per_pixel()
    }

    /// Reads pixel `index` as RGBA floats. Single-channel kinds return the value in
    /// the red channel with zero green/blue and opaque alpha.
    #[must_use]
    pub fn pixel_f32(&self, index: usize) -> [f32; 4] {
        fn four<T: Texel>(p: [T; 4]) -> [f32; 4] {
            p.map(Texel::to_f32)
        }
        fn one<T: Texel>(v: T) -> [f32; 4] {
            [v.to_f32(), 0.0, 0.0, 1.0]
        }
        match self {
            Self::Float4(v) => four(v[index]),
            Self::Byte4(v) => four(v[index]),
            Self::Half4(v) => four(v[index]),
            Self::Ushort4(v) => four(v[index]),
            Self::Float(v) => one(v[index]),
            Self::Byte(v) => one(v[index]),
            Self::Half(v) => one(v[index]),
            Self::Ushort(v) => one(v[index]),
        }
    }
}

/// Mutable view over flat channel data of any element type.
///
/// Handed to the [`ColorManager`](crate::color::ColorManager) so conversions can be
/// written once per element type without generic trait methods.
pub enum TexelSliceMut<'a> {
    U8(&'a mut [u8]),
    U16(&'a mut [u16]),
    F16(&'a mut [f16]),
    F32(&'a mut [f32]),
}

impl TexelSliceMut<'_> {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::U8(s) => s.len(),
            Self::U16(s) => s.len(),
            Self::F16(s) => s.len(),
            Self::F32(s) => s.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies `f` to every pixel of `channels` (`1..=4`) values through `f32`.
    pub fn map_pixels_f32(&mut self, channels: usize, mut f: impl FnMut(&mut [f32])) {
        fn apply<T: Texel>(s: &mut [T], channels: usize, f: &mut impl FnMut(&mut [f32])) {
            let mut scratch = [0.0f32; 4];
            for pixel in s.chunks_exact_mut(channels) {
                let values = &mut scratch[..channels];
                for (dst, src) in values.iter_mut().zip(pixel.iter()) {
                    *dst = src.to_f32();
                }
                f(values);
                for (dst, src) in pixel.iter_mut().zip(values.iter()) {
                    *dst = T::from_f32(*src);
                }
            }
        }
        assert!((1..=4).contains(&channels), "pixels have 1 to 4 channels");
        match self {
            Self::U8(s) => apply(s, channels, &mut f),
            Self::U16(s) => apply(s, channels, &mut f),
            Self::F16(s) => apply(s, channels, &mut f),
            Self::F32(s) => apply(s, channels, &mut f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_conversion_saturates() {
        assert_eq!(u8::from_f32(-1.0), 0);
        assert_eq!(u8::from_f32(2.0), 255);
        assert_eq!(u8::from_f32(0.5), 128);
        assert_eq!(u16::from_f32(1.0), 65535);
    }

    #[test]
    fn half_finiteness() {
        assert!(!f16::INFINITY.is_finite());
        assert!(!<f16 as Texel>::is_finite(f16::NAN));
        assert!(<f16 as Texel>::is_finite(f16::ONE));
        assert!(<u8 as Texel>::is_finite(255));
    }

    #[test]
    fn from_source_moves_matching_kind() {
        let bytes = u8::from_source(SourcePixels::U8(vec![7, 8]));
        assert_eq!(bytes, vec![7, 8]);

        let floats = f32::from_source(SourcePixels::U8(vec![0, 255]));
        assert_eq!(floats, vec![0.0, 1.0]);
    }

    #[test]
    fn into_buffer_groups_rgba_pixels() {
        let buf = u8::into_buffer(vec![1, 2, 3, 4, 5, 6, 7, 8], true);
        assert_eq!(buf, TexelBuffer::Byte4(vec![[1, 2, 3, 4], [5, 6, 7, 8]]));
        assert_eq!(buf.data_type(), ImageDataType::Byte4);
        assert_eq!(buf.byte_size(), 8);

        let single = f32::into_buffer(vec![0.5; 3], false);
        assert_eq!(single.data_type(), ImageDataType::Float);
        assert_eq!(single.as_bytes().len(), 12);
    }
}
