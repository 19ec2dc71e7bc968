//! Device memory.
//!
//! The cache talks to device memory through the [`Device`] trait. Backends:
//! - [`CpuDevice`]: host memory, with an optional byte budget
//! - `WgpuDevice`: GPU memory through `wgpu` (feature `wgpu`)
//!
//! Every backend call goes through a [`DeviceContext`], which holds the single lock
//! serializing allocation, upload and release across loader threads. Decoding and
//! pixel conversion happen outside of it.

pub mod cpu;
#[cfg(feature = "wgpu")]
pub mod wgpu;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use glam::UVec3;
use parking_lot::{Mutex, MutexGuard};

use crate::request::{Extension, Interpolation};
use crate::slot::ImageDataType;
use crate::sparse::SparseLayout;
use crate::texel::TexelBuffer;

pub use cpu::CpuDevice;
#[cfg(feature = "wgpu")]
pub use self::wgpu::WgpuDevice;

/// Capabilities of a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    /// Half-float textures are supported. Without it half images are stored as
    /// float.
    pub supports_half_precision: bool,
    /// 16-bit normalized textures are supported. Without it ushort images are
    /// stored as half.
    pub supports_16bit_norm: bool,
    /// Loaded textures keep their processed pixels in host memory. Devices with
    /// memory of their own drop the copy once it is uploaded.
    pub host_pixels: bool,
    /// Packing used for sparse volume grids.
    pub sparse_layout: SparseLayout,
}

impl DeviceInfo {
    /// Whether textures of `data_type` can be allocated at all.
    #[must_use]
    pub fn supports(&self, data_type: ImageDataType) -> bool {
        match data_type {
            ImageDataType::Half4 | ImageDataType::Half => self.supports_half_precision,
            ImageDataType::Ushort4 | ImageDataType::Ushort => self.supports_16bit_norm,
            _ => true,
        }
    }
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            name: "CPU".to_string(),
            supports_half_precision: true,
            supports_16bit_norm: true,
            host_pixels: true,
            sparse_layout: SparseLayout::Linear,
        }
    }
}

/// Storage regime of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GridLayout {
    /// Plain 2D or 3D array.
    #[default]
    Dense,
    /// Sparse grid, tiles packed linearly.
    Sparse,
    /// Sparse grid, padded tiles.
    SparsePadded,
    /// Served from a mip-cache file, no device pixels.
    External,
}

impl GridLayout {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Dense => "dense",
            Self::Sparse => "sparse",
            Self::SparsePadded => "padded sparse",
            Self::External => "external",
        }
    }

    #[must_use]
    pub fn from_sparse(layout: SparseLayout) -> Self {
        match layout {
            SparseLayout::Linear => Self::Sparse,
            SparseLayout::Padded => Self::SparsePadded,
        }
    }
}

/// What a device allocation holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    Texture {
        data_type: ImageDataType,
        layout: GridLayout,
    },
    /// `i32` tile index of a sparse grid.
    GridIndex,
}

/// Describes a device allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryDesc {
    pub name: String,
    pub kind: MemoryKind,
    pub dims: UVec3,
}

impl MemoryDesc {
    #[must_use]
    pub fn texture(name: &str, data_type: ImageDataType, layout: GridLayout, dims: UVec3) -> Self {
        Self {
            name: name.to_string(),
            kind: MemoryKind::Texture { data_type, layout },
            dims,
        }
    }

    /// Index buffer of a sparse grid, named after its texture.
    #[must_use]
    pub fn grid_index(texture_name: &str, entries: usize) -> Self {
        Self {
            name: format!("{texture_name}_info"),
            kind: MemoryKind::GridIndex,
            dims: UVec3::new(entries as u32, 1, 1),
        }
    }

    #[must_use]
    pub fn element_size(&self) -> usize {
        match self.kind {
            MemoryKind::Texture { data_type, .. } => data_type.bytes_per_pixel(),
            MemoryKind::GridIndex => size_of::<i32>(),
        }
    }

    #[must_use]
    pub fn byte_size(&self) -> usize {
        crate::sparse::voxel_count(self.dims) * self.element_size()
    }
}

/// Opaque backend allocation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(pub u64);

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Device memory backend.
///
/// Implementations may assume calls are serialized by the owning [`DeviceContext`],
/// but must still be `Sync` to be shared with loader threads.
pub trait Device: Send + Sync {
    fn info(&self) -> &DeviceInfo;

    /// Reserves memory for `desc`. `None` means out of memory.
    fn alloc(&self, desc: &MemoryDesc) -> Option<DeviceHandle>;

    /// Copies `data` (exactly `desc.byte_size()` bytes) into the allocation.
    fn upload(&self, handle: DeviceHandle, desc: &MemoryDesc, data: &[u8]);

    fn free(&self, handle: DeviceHandle);
}

/// A device plus the lock guarding its memory operations.
pub struct DeviceContext {
    device: Arc<dyn Device>,
    lock: Mutex<()>,
}

impl DeviceContext {
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self {
            device,
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn info(&self) -> &DeviceInfo {
        self.device.info()
    }

    #[must_use]
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// Takes the memory lock for a multi-step critical section.
    pub fn lock(&self) -> DeviceGuard<'_> {
        DeviceGuard {
            device: self.device.as_ref(),
            _guard: self.lock.lock(),
        }
    }

    pub fn alloc(&self, desc: &MemoryDesc) -> Option<DeviceHandle> {
        self.lock().alloc(desc)
    }

    pub fn free(&self, handle: DeviceHandle) {
        self.lock().free(handle);
    }

    /// Releases a texture's allocations, the grid index together with its parent.
    pub fn release(&self, texture: DeviceTexture) {
        let guard = self.lock();
        if let Some(handle) = texture.grid_index.and_then(|index| index.handle) {
            guard.free(handle);
        }
        if let Some(handle) = texture.handle {
            guard.free(handle);
        }
    }
}

/// Backend access while holding the memory lock.
pub struct DeviceGuard<'a> {
    device: &'a dyn Device,
    _guard: MutexGuard<'a, ()>,
}

impl DeviceGuard<'_> {
    pub fn alloc(&self, desc: &MemoryDesc) -> Option<DeviceHandle> {
        let handle = self.device.alloc(desc);
        if handle.is_none() {
            log::debug!(
                "Device '{}' out of memory allocating '{}' ({} bytes)",
                self.device.info().name,
                desc.name,
                desc.byte_size()
            );
        }
        handle
    }

    pub fn upload(&self, handle: DeviceHandle, desc: &MemoryDesc, data: &[u8]) {
        debug_assert_eq!(data.len(), desc.byte_size(), "upload size mismatch for '{}'", desc.name);
        self.device.upload(handle, desc, data);
    }

    pub fn free(&self, handle: DeviceHandle) {
        self.device.free(handle);
    }
}

/// Auxiliary index table of a sparse texture. Only ever freed with its parent.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceGridIndex {
    pub name: String,
    pub offsets: Vec<i32>,
    pub handle: Option<DeviceHandle>,
}

/// A loaded texture: the device allocation plus, where the device keeps one, a
/// host copy of the pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceTexture {
    pub name: String,
    /// Processed pixels as uploaded, sparse textures holding the packed voxels.
    /// Empty for external textures and for loaded images on devices without
    /// [`DeviceInfo::host_pixels`]. The variant always names the storage type.
    pub pixels: TexelBuffer,
    /// `None` for external textures, or if even the fallback could not be allocated.
    pub handle: Option<DeviceHandle>,
    /// Logical size after downscaling.
    pub dense_dims: UVec3,
    /// Size of the allocation. Differs from `dense_dims` for sparse grids.
    pub dims: UVec3,
    pub interpolation: Interpolation,
    pub extension: Extension,
    pub grid_layout: GridLayout,
    pub grid_index: Option<DeviceGridIndex>,
    /// Mip-cache file backing an external texture.
    pub external_path: Option<PathBuf>,
}

impl DeviceTexture {
    #[must_use]
    pub fn data_type(&self) -> ImageDataType {
        self.pixels.data_type()
    }

    /// Device bytes held by the texture and its index.
    #[must_use]
    pub fn memory_size(&self) -> usize {
        let index = self
            .grid_index
            .as_ref()
            .filter(|index| index.handle.is_some())
            .map_or(0, |index| index.offsets.len() * size_of::<i32>());
        let texels = if self.handle.is_some() {
            crate::sparse::voxel_count(self.dims) * self.data_type().bytes_per_pixel()
        } else {
            0
        };
        texels + index
    }

    #[must_use]
    pub fn is_sparse(&self) -> bool {
        matches!(self.grid_layout, GridLayout::Sparse | GridLayout::SparsePadded)
    }
}
