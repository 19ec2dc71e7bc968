//! Texture Cache
//!
//! [`TextureCache`] is the entry point of the crate. The scene registers images with
//! [`TextureCache::add_image`] and refers to them by [`FlatSlot`] from then on. Pixel
//! data is loaded lazily: [`TextureCache::device_update`] runs a maintenance pass
//! that frees unreferenced images and loads pending ones on a worker pool.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use texcache::{CacheSettings, CpuDevice, ImageRequest, Progress, TextureCache};
//!
//! let mut cache = TextureCache::builder()
//!     .with_settings(CacheSettings::default().with_texture_limit(4096))
//!     .with_device(Arc::new(CpuDevice::new()))
//!     .build()?;
//!
//! let slot = cache.add_image(&ImageRequest::file("textures/wood.png"));
//! cache.device_update(&Progress::new());
//! let texture = cache.image_memory(slot).expect("loaded");
//! ```
//!
//! # Threading
//!
//! Loads of different slots run in parallel, each worker owning its slot's entry
//! exclusively. Device allocation, upload and release are serialized by the
//! [`DeviceContext`] lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::builtin::BuiltinImages;
use crate::color::{BasicColorManager, ColorManager};
use crate::device::{CpuDevice, Device, DeviceContext, DeviceInfo, DeviceTexture, GridLayout};
use crate::errors::Result;
use crate::loader::Loader;
use crate::metadata::{ImageMetaData, MetadataProber};
use crate::mipcache::{self, TextureBaker};
use crate::reader::{FileImageReader, ImageReader};
use crate::registry::{self, Image, Registry};
use crate::request::{ImageKey, ImageRequest};
use crate::settings::CacheSettings;
use crate::slot::FlatSlot;
use crate::stats::StatsSink;
use crate::texel::TexelBuffer;
use crate::volume::VolumeReader;

// ============================================================================
// Progress
// ============================================================================

/// Cancellation flag and status line shared with a running pass.
#[derive(Debug, Default)]
pub struct Progress {
    cancelled: AtomicBool,
    status: Mutex<String>,
}

impl Progress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Jobs not yet started leave their slots untouched.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn set_status(&self, status: impl Into<String>) {
        *self.status.lock() = status.into();
    }

    #[must_use]
    pub fn status(&self) -> String {
        self.status.lock().clone()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`TextureCache`]. Every collaborator has a default except the
/// optional ones (builtin images, volume reader, texture baker).
pub struct TextureCacheBuilder {
    settings: CacheSettings,
    device: Option<Arc<dyn Device>>,
    reader: Option<Arc<dyn ImageReader>>,
    colors: Option<Arc<dyn ColorManager>>,
    builtins: Option<Arc<dyn BuiltinImages>>,
    volumes: Option<Arc<dyn VolumeReader>>,
    baker: Option<Arc<dyn TextureBaker>>,
}

impl TextureCacheBuilder {
    fn new() -> Self {
        Self {
            settings: CacheSettings::default(),
            device: None,
            reader: None,
            colors: None,
            builtins: None,
            volumes: None,
            baker: None,
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: CacheSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_device(mut self, device: Arc<dyn Device>) -> Self {
        self.device = Some(device);
        self
    }

    #[must_use]
    pub fn with_image_reader(mut self, reader: Arc<dyn ImageReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    #[must_use]
    pub fn with_color_manager(mut self, colors: Arc<dyn ColorManager>) -> Self {
        self.colors = Some(colors);
        self
    }

    #[must_use]
    pub fn with_builtin_images(mut self, builtins: Arc<dyn BuiltinImages>) -> Self {
        self.builtins = Some(builtins);
        self
    }

    #[must_use]
    pub fn with_volume_reader(mut self, volumes: Arc<dyn VolumeReader>) -> Self {
        self.volumes = Some(volumes);
        self
    }

    #[must_use]
    pub fn with_texture_baker(mut self, baker: Arc<dyn TextureBaker>) -> Self {
        self.baker = Some(baker);
        self
    }

    /// Builds the cache and its worker pool.
    pub fn build(self) -> Result<TextureCache> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.worker_threads)
            .thread_name(|i| format!("texcache-load-{i}"))
            .build()?;

        let device = self.device.unwrap_or_else(|| Arc::new(CpuDevice::new()));
        let device = DeviceContext::new(device);
        let registry = Registry::new(
            self.settings.max_images,
            device.info().supports_half_precision,
        )
        .with_16bit_norm(device.info().supports_16bit_norm);
        log::info!(
            "Texture cache on '{}' with {} workers",
            device.info().name,
            pool.current_num_threads()
        );

        Ok(TextureCache {
            sources: Sources {
                reader: self.reader.unwrap_or_else(|| Arc::new(FileImageReader::new())),
                colors: self
                    .colors
                    .unwrap_or_else(|| Arc::new(BasicColorManager::new())),
                builtins: self.builtins,
                volumes: self.volumes,
                baker: self.baker,
            },
            settings: self.settings,
            registry,
            device,
            pool,
        })
    }
}

// ============================================================================
// TextureCache
// ============================================================================

/// Collaborators shared read-only with load jobs.
struct Sources {
    reader: Arc<dyn ImageReader>,
    colors: Arc<dyn ColorManager>,
    builtins: Option<Arc<dyn BuiltinImages>>,
    volumes: Option<Arc<dyn VolumeReader>>,
    baker: Option<Arc<dyn TextureBaker>>,
}

impl Sources {
    fn prober(&self) -> MetadataProber<'_> {
        MetadataProber {
            reader: self.reader.as_ref(),
            builtins: self.builtins.as_deref(),
            volumes: self.volumes.as_deref(),
            colors: self.colors.as_ref(),
        }
    }
}

/// Per-pass state handed to every load job.
struct LoadJob<'a> {
    loader: Loader<'a>,
    settings: &'a CacheSettings,
    baker: Option<&'a dyn TextureBaker>,
    progress: &'a Progress,
}

impl LoadJob<'_> {
    fn run(&self, flat: FlatSlot, image: &mut Image) {
        if self.progress.is_cancelled() {
            return;
        }
        let (_, data_type) = flat.split();
        image.mem_name = registry::mem_name(flat);
        self.progress
            .set_status(format!("Loading {}", image.key.path.display()));

        if let Some(old) = image.texture.take() {
            self.loader.device.release(old);
        }

        let texture = self
            .mip_cached(image)
            .unwrap_or_else(|| self.loader.load(image, data_type));
        image.texture = Some(texture);
        image.need_load = false;
    }

    /// External texture backed by a mip-cache file, for streaming backends.
    fn mip_cached(&self, image: &Image) -> Option<DeviceTexture> {
        let mip_settings = self.settings.mip_cache.as_ref()?;
        if image.key.is_builtin() || image.is_volume {
            return None;
        }
        let path = mipcache::resolve(
            &image.key.path,
            mip_settings,
            self.baker,
            image.key.extension,
            image.metadata.colorspace,
        )?;
        log::debug!("Using mip cache '{}' for '{}'", path.display(), image.mem_name);

        let data_type = image.metadata.data_type;
        Some(DeviceTexture {
            name: image.mem_name.clone(),
            pixels: TexelBuffer::empty(data_type),
            handle: None,
            dense_dims: glam::UVec3::new(
                image.metadata.width,
                image.metadata.height,
                image.metadata.depth,
            ),
            dims: glam::UVec3::ZERO,
            interpolation: image.key.interpolation,
            extension: image.key.extension,
            grid_layout: GridLayout::External,
            grid_index: None,
            external_path: Some(path),
        })
    }
}

/// Texture-resource cache with lazy, parallel device upload.
pub struct TextureCache {
    settings: CacheSettings,
    registry: Registry,
    device: DeviceContext,
    sources: Sources,
    pool: rayon::ThreadPool,
}

impl TextureCache {
    #[must_use]
    pub fn builder() -> TextureCacheBuilder {
        TextureCacheBuilder::new()
    }

    /// A cache with default settings on a [`CpuDevice`].
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    #[must_use]
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    #[must_use]
    pub fn device_info(&self) -> &DeviceInfo {
        self.device.info()
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    /// Registers a reference to an image and returns its slot.
    ///
    /// Identical requests share one slot. Returns [`FlatSlot::INVALID`] when the
    /// image limit is reached.
    pub fn add_image(&mut self, request: &ImageRequest) -> FlatSlot {
        let metadata = self.sources.prober().probe(&request.key);
        self.registry.add(request, metadata)
    }

    /// Adds a reference to an already registered image.
    pub fn add_image_user(&mut self, flat: FlatSlot) {
        self.registry.add_user(flat);
    }

    /// Drops a reference. Unreferenced images are freed by the next pass.
    pub fn remove_image(&mut self, flat: FlatSlot) {
        self.registry.remove(flat);
    }

    pub fn remove_image_by_key(&mut self, key: &ImageKey) -> bool {
        self.registry.remove_by_key(key)
    }

    /// Forces a reload of the image at the next pass, e.g. after the file changed.
    pub fn tag_reload_image(&mut self, key: &ImageKey) -> bool {
        self.registry.tag_reload(key)
    }

    #[must_use]
    pub fn image_metadata(&self, flat: FlatSlot) -> Option<ImageMetaData> {
        self.registry.metadata(flat)
    }

    /// The loaded texture of `flat`, if any.
    #[must_use]
    pub fn image_memory(&self, flat: FlatSlot) -> Option<&DeviceTexture> {
        self.registry.get(flat)?.texture.as_ref()
    }

    /// Whether [`TextureCache::device_update`] has work to do.
    #[must_use]
    pub fn need_update(&self) -> bool {
        self.registry.is_dirty()
    }

    /// Returns whether animated images need an update for `frame`.
    pub fn set_animation_frame(&mut self, frame: i32) -> bool {
        self.registry.set_animation_frame(frame)
    }

    // ------------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------------

    /// Frees unreferenced images, then loads every pending one in parallel.
    ///
    /// Returns after all loads finished. If `progress` is cancelled, pending loads
    /// are skipped and the cache stays dirty.
    pub fn device_update(&mut self, progress: &Progress) {
        if !self.registry.is_dirty() {
            return;
        }

        let freed = self.registry.take_unused();
        let freed_count = freed.len();
        for (_, image) in freed {
            self.release_image(image);
        }

        let loaded = self.load_where(progress, |image| image.need_load);

        if progress.is_cancelled() {
            log::info!("Image update cancelled");
            return;
        }
        self.registry.mark_clean();
        log::info!("Image update: {loaded} loaded, {freed_count} freed");
    }

    /// Frees or loads a single slot synchronously.
    ///
    /// # Panics
    /// If the slot is empty.
    pub fn device_update_slot(&mut self, flat: FlatSlot, progress: &Progress) {
        let Some(image) = self.registry.get(flat) else {
            panic!("updating empty image slot {flat}");
        };
        let (users, need_load) = (image.users, image.need_load);

        if users == 0 {
            if let Some(image) = self.registry.take(flat) {
                self.release_image(image);
            }
        } else if need_load {
            let job = job_for(&self.settings, &self.device, &self.sources, progress);
            if let Some(image) = self.registry.get_mut(flat) {
                job.run(flat, image);
            }
        }
    }

    /// Loads pending builtin images only. Nothing is freed.
    pub fn device_load_builtin(&mut self, progress: &Progress) {
        if !self.registry.is_dirty() {
            return;
        }
        let loaded = self.load_where(progress, |image| image.need_load && image.key.is_builtin());
        log::debug!("Loaded {loaded} builtin images");
    }

    /// Removes all builtin images.
    pub fn device_free_builtin(&mut self) {
        for (_, image) in self.registry.take_where(|image| image.key.is_builtin()) {
            self.release_image(image);
        }
    }

    /// Removes all images.
    pub fn device_free(&mut self) {
        for (_, image) in self.registry.take_where(|_| true) {
            self.release_image(image);
        }
    }

    /// Reports file name and device size of every loaded texture.
    pub fn collect_statistics(&self, sink: &mut dyn StatsSink) {
        for (_, image) in self.registry.iter() {
            if let Some(texture) = &image.texture {
                let name = image
                    .key
                    .path
                    .file_name()
                    .map_or_else(|| image.key.path.to_string_lossy(), |n| n.to_string_lossy());
                sink.add_entry(&name, texture.memory_size());
            }
        }
    }

    fn release_image(&self, mut image: Image) {
        if let Some(texture) = image.texture.take() {
            self.device.release(texture);
        }
    }

    /// Runs load jobs for every image matching `filter` on the pool and waits for
    /// them. Returns the number of jobs dispatched.
    fn load_where(&mut self, progress: &Progress, filter: impl Fn(&Image) -> bool) -> usize {
        let job = job_for(&self.settings, &self.device, &self.sources, progress);
        let pending: Vec<(FlatSlot, &mut Image)> = self
            .registry
            .iter_mut()
            .filter(|(_, image)| filter(image))
            .collect();
        let count = pending.len();

        self.pool.install(|| {
            pending
                .into_par_iter()
                .for_each(|(flat, image)| job.run(flat, image));
        });
        count
    }
}

fn job_for<'a>(
    settings: &'a CacheSettings,
    device: &'a DeviceContext,
    sources: &'a Sources,
    progress: &'a Progress,
) -> LoadJob<'a> {
    LoadJob {
        loader: Loader {
            reader: sources.reader.as_ref(),
            builtins: sources.builtins.as_deref(),
            volumes: sources.volumes.as_deref(),
            colors: sources.colors.as_ref(),
            device,
            texture_limit: settings.texture_limit,
        },
        settings,
        baker: sources.baker.as_deref(),
        progress,
    }
}

impl Drop for TextureCache {
    fn drop(&mut self) {
        self.device_free();
    }
}
