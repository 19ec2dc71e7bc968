//! Pixel Loader
//!
//! Turns one registry entry into a [`DeviceTexture`]. The pipeline is generic over
//! the storage element type and runs these stages:
//!
//! 1. resolve the source (host builtin, volume file or image file)
//! 2. reserve device memory, unless the image will be downscaled
//! 3. decode, flip 2D files bottom-up, drop channels beyond four
//! 4. normalize to 1 or 4 channels, force alpha, convert color
//! 5. zero non-finite float pixels
//! 6. downscale by powers of two to the texture limit
//! 7. sparsify volumes
//! 8. allocate, upload
//!
//! Each stage returns `Result<_, LoadError>`. [`Loader::load`] never fails: any error
//! is logged and replaced by the missing-texture marker.

pub mod fallback;
pub mod normalize;
pub mod resize;

use glam::UVec3;
use half::f16;
use thiserror::Error;

use crate::builtin::BuiltinImages;
use crate::color::ColorManager;
use crate::device::{
    DeviceContext, DeviceGridIndex, DeviceHandle, DeviceTexture, GridLayout, MemoryDesc,
};
use crate::errors::CacheError;
use crate::reader::ImageReader;
use crate::registry::Image;
use crate::request::AlphaMode;
use crate::slot::ImageDataType;
use crate::sparse::{self, voxel_count};
use crate::texel::{SourcePixels, Texel, TexelBuffer};
use crate::volume::VolumeReader;

/// Reasons a single image fails to load.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("empty file path")]
    EmptyPath,

    #[error(transparent)]
    Reader(#[from] CacheError),

    #[error("no builtin image callbacks installed")]
    NoBuiltinCallbacks,

    #[error("builtin image callback failed")]
    BuiltinCallbackFailed,

    #[error("no volume reader installed")]
    NoVolumeReader,

    #[error("grid '{0}' could not be read")]
    MissingGrid(String),

    #[error("unsupported channel count {0}")]
    ChannelCount(u32),

    #[error("image is empty")]
    EmptyImage,

    #[error("source delivered {actual} values, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("out of device memory allocating '{0}'")]
    OutOfMemory(String),
}

type LoadResult<T> = Result<T, LoadError>;

/// Device memory held while a load is in flight. Freed on drop unless claimed.
struct Reservation<'a> {
    device: &'a DeviceContext,
    desc: MemoryDesc,
    handle: Option<DeviceHandle>,
}

impl<'a> Reservation<'a> {
    fn alloc(device: &'a DeviceContext, desc: MemoryDesc) -> LoadResult<Self> {
        let handle = device
            .alloc(&desc)
            .ok_or_else(|| LoadError::OutOfMemory(desc.name.clone()))?;
        Ok(Self {
            device,
            desc,
            handle: Some(handle),
        })
    }

    /// Takes the handle if it was reserved for exactly `desc`; otherwise releases it.
    fn claim_if_matches(mut self, desc: &MemoryDesc) -> Option<DeviceHandle> {
        if self.desc == *desc {
            self.handle.take()
        } else {
            None
        }
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.device.free(handle);
        }
    }
}

/// Decoded pixels before normalization.
struct Source<T> {
    data: Vec<T>,
    dims: UVec3,
    channels: usize,
    is_cmyk: bool,
}

/// Everything a load job needs, borrowed from the cache.
pub struct Loader<'a> {
    pub reader: &'a dyn ImageReader,
    pub builtins: Option<&'a dyn BuiltinImages>,
    pub volumes: Option<&'a dyn VolumeReader>,
    pub colors: &'a dyn ColorManager,
    pub device: &'a DeviceContext,
    /// `0` disables downscaling.
    pub texture_limit: u32,
}

impl Loader<'_> {
    /// Loads `image` as `data_type`, falling back to the missing-texture marker.
    pub fn load(&self, image: &Image, data_type: ImageDataType) -> DeviceTexture {
        match self.try_load(image, data_type) {
            Ok(texture) => texture,
            Err(err) => {
                log::warn!(
                    "Failed to load '{}' ({}): {err}",
                    image.key.path.display(),
                    image.mem_name
                );
                fallback::missing_texture(self.device, image, data_type)
            }
        }
    }

    pub fn try_load(&self, image: &Image, data_type: ImageDataType) -> LoadResult<DeviceTexture> {
        match data_type {
            ImageDataType::Float4 | ImageDataType::Float => {
                self.load_typed::<f32>(image, data_type)
            }
            ImageDataType::Byte4 | ImageDataType::Byte => self.load_typed::<u8>(image, data_type),
            ImageDataType::Half4 | ImageDataType::Half => {
                self.load_typed::<f16>(image, data_type)
            }
            ImageDataType::Ushort4 | ImageDataType::Ushort => {
                self.load_typed::<u16>(image, data_type)
            }
        }
    }

    /// Whether sources should deliver premultiplied color.
    fn associate_alpha(&self, image: &Image) -> bool {
        !(self.colors.is_data(image.key.colorspace)
            || matches!(
                image.key.alpha_mode,
                AlphaMode::Ignore | AlphaMode::ChannelPacked
            ))
    }

    fn load_typed<T: Texel>(
        &self,
        image: &Image,
        data_type: ImageDataType,
    ) -> LoadResult<DeviceTexture> {
        let metadata = &image.metadata;
        if image.key.path.as_os_str().is_empty() {
            return Err(LoadError::EmptyPath);
        }
        if !(1..=4).contains(&metadata.channels) {
            return Err(LoadError::ChannelCount(metadata.channels));
        }
        let max_size = metadata.max_dimension();
        if max_size == 0 {
            return Err(LoadError::EmptyImage);
        }

        // Oversized images decode into scratch memory and are reserved on the
        // device only once their final size is known.
        let downscale = self.texture_limit > 0 && max_size > self.texture_limit;
        let reservation = if downscale {
            None
        } else {
            let dims = UVec3::new(metadata.width, metadata.height, metadata.depth);
            let desc = MemoryDesc::texture(&image.mem_name, data_type, GridLayout::Dense, dims);
            Some(Reservation::alloc(self.device, desc)?)
        };

        let Source {
            mut data,
            mut dims,
            mut channels,
            is_cmyk,
        } = self.read_source::<T>(image)?;

        if channels > 4 {
            data = normalize::compact_to_rgba(&data, channels);
            channels = 4;
        }

        let four = data_type.is_rgba();
        if four {
            if is_cmyk && channels == 4 {
                normalize::cmyk_to_rgba(&mut data);
            } else {
                data = normalize::expand_to_rgba(data, channels);
            }
            channels = 4;

            if image.key.alpha_mode == AlphaMode::Ignore {
                normalize::force_opaque(&mut data);
            }
            if !metadata.colorspace.is_raw() && !metadata.colorspace.is_srgb() {
                self.colors.to_scene_linear(
                    metadata.colorspace,
                    T::as_texel_slice(&mut data),
                    channels,
                    metadata.compress_as_srgb,
                    self.associate_alpha(image),
                );
            }
        } else if channels > 1 {
            data = normalize::first_channel(&data, channels);
            channels = 1;
        }

        if T::IS_FLOAT {
            let zeroed = normalize::zero_non_finite(&mut data, channels);
            if zeroed > 0 {
                log::debug!(
                    "Zeroed {zeroed} non-finite pixels in '{}'",
                    image.key.path.display()
                );
            }
        }

        if downscale {
            let factor = resize::scale_factor(dims.max_element(), self.texture_limit);
            log::debug!(
                "Scaling image '{}' by a factor of {factor}",
                image.key.path.display()
            );
            (data, dims) = resize::box_downscale(&data, dims, channels, factor);
        }

        let mut layout = GridLayout::Dense;
        let mut alloc_dims = dims;
        let mut grid_index = None;
        if image.is_volume {
            let sparse_layout = self.device.info().sparse_layout;
            let grid = sparse::compress(&data, dims, channels, image.isovalue, sparse_layout);
            if let Some(grid) = grid {
                grid_index = Some(self.upload_grid_index(&image.mem_name, grid.index)?);
                layout = GridLayout::from_sparse(sparse_layout);
                alloc_dims = grid.alloc_dims;
                data = grid.voxels;
            }
        }

        let pixels = T::into_buffer(data, four);
        let desc = MemoryDesc::texture(&image.mem_name, data_type, layout, alloc_dims);
        let reserved = reservation.and_then(|r| r.claim_if_matches(&desc));
        let handle = {
            let guard = self.device.lock();
            let handle = match reserved.or_else(|| guard.alloc(&desc)) {
                Some(handle) => handle,
                None => {
                    if let Some(index) = grid_index.as_ref().and_then(|index| index.handle) {
                        guard.free(index);
                    }
                    return Err(LoadError::OutOfMemory(desc.name));
                }
            };
            guard.upload(handle, &desc, pixels.as_bytes());
            handle
        };
        let pixels = if self.device.info().host_pixels {
            pixels
        } else {
            TexelBuffer::empty(data_type)
        };

        log::debug!(
            "Loaded '{}' as {} {data_type} texture {}x{}x{}",
            image.key.path.display(),
            layout.name(),
            dims.x,
            dims.y,
            dims.z
        );

        Ok(DeviceTexture {
            name: image.mem_name.clone(),
            pixels,
            handle: Some(handle),
            dense_dims: dims,
            dims: alloc_dims,
            interpolation: image.key.interpolation,
            extension: image.key.extension,
            grid_layout: layout,
            grid_index,
            external_path: None,
        })
    }

    fn upload_grid_index(
        &self,
        texture_name: &str,
        offsets: Vec<i32>,
    ) -> LoadResult<DeviceGridIndex> {
        let desc = MemoryDesc::grid_index(texture_name, offsets.len());
        let guard = self.device.lock();
        let handle = guard
            .alloc(&desc)
            .ok_or_else(|| LoadError::OutOfMemory(desc.name.clone()))?;
        guard.upload(handle, &desc, bytemuck::cast_slice(&offsets));
        Ok(DeviceGridIndex {
            name: desc.name,
            offsets,
            handle: Some(handle),
        })
    }

    fn read_source<T: Texel>(&self, image: &Image) -> LoadResult<Source<T>> {
        let key = &image.key;
        let metadata = &image.metadata;

        let (pixels, dims, channels, is_cmyk, flip) = if let Some(handle) = key.builtin {
            let builtins = self.builtins.ok_or(LoadError::NoBuiltinCallbacks)?;
            let len = metadata.pixel_count() * metadata.channels as usize;
            let associate = self.associate_alpha(image);
            let free_cache = metadata.builtin_free_cache;
            let pixels = if metadata.is_float {
                let mut buf = vec![0.0f32; len];
                if !builtins.float_pixels(&key.path, handle, &mut buf, associate, free_cache) {
                    return Err(LoadError::BuiltinCallbackFailed);
                }
                SourcePixels::F32(buf)
            } else {
                let mut buf = vec![0u8; len];
                if !builtins.byte_pixels(&key.path, handle, &mut buf, associate, free_cache) {
                    return Err(LoadError::BuiltinCallbackFailed);
                }
                SourcePixels::U8(buf)
            };
            let dims = UVec3::new(metadata.width, metadata.height, metadata.depth);
            (pixels, dims, metadata.channels as usize, false, false)
        } else if key.is_volume_file() {
            let volumes = self.volumes.ok_or(LoadError::NoVolumeReader)?;
            let volume = volumes
                .read(&key.path, &key.grid_name, metadata.channels)
                .ok_or_else(|| LoadError::MissingGrid(key.grid_name.clone()))?;
            let channels = metadata.channels as usize;
            (SourcePixels::F32(volume.voxels), volume.resolution, channels, false, false)
        } else {
            let decoded = self.reader.read(&key.path, self.associate_alpha(image))?;
            let spec = decoded.spec;
            let dims = UVec3::new(spec.width, spec.height, spec.depth.max(1));
            let is_cmyk = spec.is_cmyk && spec.channels == 4;
            (decoded.pixels, dims, spec.channels as usize, is_cmyk, dims.z <= 1)
        };

        if channels == 0 {
            return Err(LoadError::ChannelCount(0));
        }
        let expected = voxel_count(dims) * channels;
        if pixels.len() != expected {
            return Err(LoadError::SizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }

        let mut data = T::from_source(pixels);
        if flip {
            normalize::flip_rows(&mut data, dims.x as usize, dims.y as usize, channels);
        }
        Ok(Source {
            data,
            dims,
            channels,
            is_cmyk,
        })
    }
}
