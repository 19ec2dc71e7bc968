//! The missing-texture marker.

use glam::UVec3;
use half::f16;

use crate::device::{DeviceContext, DeviceTexture, GridLayout, MemoryDesc};
use crate::registry::Image;
use crate::slot::ImageDataType;
use crate::texel::{Texel, TexelBuffer};

/// Marker color, magenta.
pub const MISSING_COLOR: [f32; 4] = [1.0, 0.0, 1.0, 1.0];

fn marker<T: Texel>(four: bool) -> TexelBuffer {
    let rgba = MISSING_COLOR.map(T::from_f32);
    let data = if four { rgba.to_vec() } else { vec![rgba[0]] };
    T::into_buffer(data, four)
}

/// One marker pixel in `data_type`. Single-channel types store the red component.
#[must_use]
pub fn missing_pixels(data_type: ImageDataType) -> TexelBuffer {
    let four = data_type.is_rgba();
    match data_type {
        ImageDataType::Float4 | ImageDataType::Float => marker::<f32>(four),
        ImageDataType::Byte4 | ImageDataType::Byte => marker::<u8>(four),
        ImageDataType::Half4 | ImageDataType::Half => marker::<f16>(four),
        ImageDataType::Ushort4 | ImageDataType::Ushort => marker::<u16>(four),
    }
}

/// Allocates and uploads a 1x1 marker texture for `image`.
///
/// If even that allocation fails the texture is kept host-side without a handle.
pub fn missing_texture(
    device: &DeviceContext,
    image: &Image,
    data_type: ImageDataType,
) -> DeviceTexture {
    let pixels = missing_pixels(data_type);
    let dims = UVec3::ONE;
    let desc = MemoryDesc::texture(&image.mem_name, data_type, GridLayout::Dense, dims);

    let handle = {
        let guard = device.lock();
        let handle = guard.alloc(&desc);
        if let Some(handle) = handle {
            guard.upload(handle, &desc, pixels.as_bytes());
        }
        handle
    };
    if handle.is_none() {
        log::error!(
            "Could not allocate missing-texture marker for '{}'",
            image.key.path.display()
        );
    }

    DeviceTexture {
        name: image.mem_name.clone(),
        pixels,
        handle,
        dense_dims: dims,
        dims,
        interpolation: image.key.interpolation,
        extension: image.key.extension,
        grid_layout: GridLayout::Dense,
        grid_index: None,
        external_path: None,
    }
}
