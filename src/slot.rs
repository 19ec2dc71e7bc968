//! Pixel storage types and flat slot addressing.
//!
//! Images are bucketed by [`ImageDataType`]. Outside the registry an image is named
//! by a single [`FlatSlot`] integer whose low bits select the bucket and whose
//! remaining bits index into it.

use std::fmt;

/// On-device pixel storage format.
///
/// The discriminants are part of the flat slot encoding and must stay below
/// `1 << FlatSlot::TYPE_SHIFT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ImageDataType {
    Float4 = 0,
    Byte4 = 1,
    Half4 = 2,
    Float = 3,
    Byte = 4,
    Half = 5,
    Ushort4 = 6,
    Ushort = 7,
}

impl ImageDataType {
    pub const COUNT: usize = 8;

    pub const ALL: [ImageDataType; Self::COUNT] = [
        Self::Float4,
        Self::Byte4,
        Self::Half4,
        Self::Float,
        Self::Byte,
        Self::Half,
        Self::Ushort4,
        Self::Ushort,
    ];

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Float4 => "float4",
            Self::Byte4 => "byte4",
            Self::Half4 => "half4",
            Self::Float => "float",
            Self::Byte => "byte",
            Self::Half => "half",
            Self::Ushort4 => "ushort4",
            Self::Ushort => "ushort",
        }
    }

    #[inline]
    #[must_use]
    pub fn channels(self) -> usize {
        match self {
            Self::Float4 | Self::Byte4 | Self::Half4 | Self::Ushort4 => 4,
            Self::Float | Self::Byte | Self::Half | Self::Ushort => 1,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_rgba(self) -> bool {
        self.channels() == 4
    }

    /// Size in bytes of a single channel value.
    #[must_use]
    pub fn element_size(self) -> usize {
        match self {
            Self::Float4 | Self::Float => 4,
            Self::Half4 | Self::Half | Self::Ushort4 | Self::Ushort => 2,
            Self::Byte4 | Self::Byte => 1,
        }
    }

    #[inline]
    #[must_use]
    pub fn bytes_per_pixel(self) -> usize {
        self.element_size() * self.channels()
    }

    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(self, Self::Float4 | Self::Float)
    }

    #[must_use]
    pub fn is_half(self) -> bool {
        matches!(self, Self::Half4 | Self::Half)
    }

    /// The full-float type with the same channel layout. Other types map to themselves.
    #[must_use]
    pub fn without_half(self) -> Self {
        match self {
            Self::Half4 => Self::Float4,
            Self::Half => Self::Float,
            other => other,
        }
    }

    /// The half type with the same channel layout for 16-bit normalized types.
    /// Other types map to themselves.
    #[must_use]
    pub fn without_16bit_norm(self) -> Self {
        match self {
            Self::Ushort4 => Self::Half4,
            Self::Ushort => Self::Half,
            other => other,
        }
    }

    /// Picks the storage type for a source format and channel count.
    #[must_use]
    pub fn for_source(kind: PixelKind, channels: u32) -> Self {
        let rgba = channels > 1;
        match (kind, rgba) {
            (PixelKind::Half, true) => Self::Half4,
            (PixelKind::Half, false) => Self::Half,
            (PixelKind::Float, true) => Self::Float4,
            (PixelKind::Float, false) => Self::Float,
            (PixelKind::Ushort, true) => Self::Ushort4,
            (PixelKind::Ushort, false) => Self::Ushort,
            (PixelKind::Byte, true) => Self::Byte4,
            (PixelKind::Byte, false) => Self::Byte,
        }
    }
}

impl fmt::Display for ImageDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Element type of a source file or buffer, before channel normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelKind {
    #[default]
    Byte,
    Ushort,
    Half,
    Float,
}

/// Externally visible image handle: `(slot << TYPE_SHIFT) | data_type`.
///
/// Stable for the lifetime of the image it names. After the image is freed the same
/// value may be handed out again by a later `add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlatSlot(i32);

impl FlatSlot {
    /// Number of low bits reserved for the data type.
    pub const TYPE_SHIFT: u32 = 3;
    pub const TYPE_MASK: i32 = (1 << Self::TYPE_SHIFT) - 1;

    /// Largest slot index that still encodes to a valid flat slot.
    pub const MAX_SLOT: usize = (i32::MAX >> Self::TYPE_SHIFT) as usize;

    /// Returned when a request is rejected.
    pub const INVALID: FlatSlot = FlatSlot(-1);

    /// # Panics
    /// When `slot` exceeds [`FlatSlot::MAX_SLOT`].
    #[inline]
    #[must_use]
    pub fn new(slot: usize, data_type: ImageDataType) -> Self {
        assert!(
            slot <= Self::MAX_SLOT,
            "slot index {slot} exceeds flat slot range"
        );
        Self(((slot as i32) << Self::TYPE_SHIFT) | i32::from(data_type as u8))
    }

    #[inline]
    #[must_use]
    pub fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub fn raw(self) -> i32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }

    /// Splits into `(slot, data_type)`.
    ///
    /// # Panics
    /// On [`FlatSlot::INVALID`] or any other negative value.
    #[inline]
    #[must_use]
    pub fn split(self) -> (usize, ImageDataType) {
        assert!(self.is_valid(), "decoding invalid flat slot {}", self.0);
        let data_type = ImageDataType::from_index((self.0 & Self::TYPE_MASK) as usize)
            .expect("type mask covers exactly the data type range");
        ((self.0 >> Self::TYPE_SHIFT) as usize, data_type)
    }
}

impl fmt::Display for FlatSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_bits_cover_all_types() {
        assert_eq!(ImageDataType::COUNT, 1 << FlatSlot::TYPE_SHIFT);
        for (i, ty) in ImageDataType::ALL.iter().enumerate() {
            assert_eq!(ty.index(), i);
            assert_eq!(ImageDataType::from_index(i), Some(*ty));
        }
        assert_eq!(ImageDataType::from_index(8), None);
    }

    #[test]
    fn half_fallback_keeps_layout() {
        assert_eq!(ImageDataType::Half4.without_half(), ImageDataType::Float4);
        assert_eq!(ImageDataType::Half.without_half(), ImageDataType::Float);
        assert_eq!(ImageDataType::Byte4.without_half(), ImageDataType::Byte4);
    }

    #[test]
    #[should_panic(expected = "decoding invalid flat slot")]
    fn split_rejects_sentinel() {
        let _ = FlatSlot::INVALID.split();
    }
}
