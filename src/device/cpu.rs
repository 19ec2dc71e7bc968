//! Host-memory device.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::{Device, DeviceHandle, DeviceInfo, MemoryDesc, MemoryKind};

#[derive(Default)]
struct CpuState {
    next_id: u64,
    live: FxHashMap<u64, usize>,
    bytes_in_use: usize,
    uploads: u64,
}

/// [`Device`] keeping textures in host memory.
///
/// Pixel data already lives in the host copy of each texture, so the device only
/// does the bookkeeping: live allocations, bytes in use, and an optional budget
/// beyond which allocations fail.
///
/// ```rust,ignore
/// // 64 MiB budget, padded sparse tiles.
/// let device = CpuDevice::with_budget(64 << 20)
///     .with_sparse_layout(SparseLayout::Padded);
/// ```
pub struct CpuDevice {
    info: DeviceInfo,
    budget: Option<usize>,
    state: Mutex<CpuState>,
}

impl Default for CpuDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuDevice {
    #[must_use]
    pub fn new() -> Self {
        Self {
            info: DeviceInfo::default(),
            budget: None,
            state: Mutex::new(CpuState::default()),
        }
    }

    /// A device that fails allocations beyond `bytes` in total.
    #[must_use]
    pub fn with_budget(bytes: usize) -> Self {
        Self {
            budget: Some(bytes),
            ..Self::new()
        }
    }

    #[must_use]
    pub fn with_info(mut self, info: DeviceInfo) -> Self {
        self.info = info;
        self
    }

    #[must_use]
    pub fn with_half_precision(mut self, supported: bool) -> Self {
        self.info.supports_half_precision = supported;
        self
    }

    #[must_use]
    pub fn with_16bit_norm(mut self, supported: bool) -> Self {
        self.info.supports_16bit_norm = supported;
        self
    }

    /// Drops host pixel copies after upload, like a device with its own memory.
    #[must_use]
    pub fn without_host_pixels(mut self) -> Self {
        self.info.host_pixels = false;
        self
    }

    #[must_use]
    pub fn with_sparse_layout(mut self, layout: crate::sparse::SparseLayout) -> Self {
        self.info.sparse_layout = layout;
        self
    }

    /// Number of allocations not yet freed.
    #[must_use]
    pub fn live_allocations(&self) -> usize {
        self.state.lock().live.len()
    }

    #[must_use]
    pub fn bytes_in_use(&self) -> usize {
        self.state.lock().bytes_in_use
    }

    #[must_use]
    pub fn upload_count(&self) -> u64 {
        self.state.lock().uploads
    }
}

impl Device for CpuDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn alloc(&self, desc: &MemoryDesc) -> Option<DeviceHandle> {
        if let MemoryKind::Texture { data_type, .. } = desc.kind
            && !self.info.supports(data_type)
        {
            log::warn!("No {data_type} textures on '{}'", self.info.name);
            return None;
        }
        let size = desc.byte_size();
        let mut state = self.state.lock();
        if let Some(budget) = self.budget
            && state.bytes_in_use + size > budget
        {
            return None;
        }
        state.next_id += 1;
        let id = state.next_id;
        state.live.insert(id, size);
        state.bytes_in_use += size;
        Some(DeviceHandle(id))
    }

    fn upload(&self, handle: DeviceHandle, desc: &MemoryDesc, data: &[u8]) {
        let mut state = self.state.lock();
        match state.live.get(&handle.0) {
            Some(&size) if size >= data.len() => state.uploads += 1,
            Some(&size) => log::error!(
                "Upload of {} bytes into '{}' exceeds its allocation of {size} bytes",
                data.len(),
                desc.name
            ),
            None => log::error!("Upload into freed allocation {handle} ('{}')", desc.name),
        }
    }

    fn free(&self, handle: DeviceHandle) {
        let mut state = self.state.lock();
        if let Some(size) = state.live.remove(&handle.0) {
            state.bytes_in_use -= size;
        } else {
            log::error!("Double free of device allocation {handle}");
        }
    }
}
