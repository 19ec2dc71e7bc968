//! Slot Registry
//!
//! The authoritative table of every image the scene references. Images are bucketed
//! by [`ImageDataType`] and addressed by [`FlatSlot`]. The registry owns lifecycle
//! bookkeeping only: it counts references and flags images for loading, while the
//! actual loading and freeing happen in [`TextureCache`](crate::cache::TextureCache)
//! maintenance passes.
//!
//! Releasing the last reference never frees an image immediately. The entry stays in
//! place with `users == 0` until the next pass collects it through
//! [`Registry::take_unused`].

use crate::device::DeviceTexture;
use crate::metadata::ImageMetaData;
use crate::request::{ImageKey, ImageRequest};
use crate::slot::{FlatSlot, ImageDataType};

/// One cache entry.
#[derive(Debug)]
pub struct Image {
    pub key: ImageKey,
    pub metadata: ImageMetaData,
    pub animated: bool,
    pub frame: f32,
    pub is_volume: bool,
    pub isovalue: f32,
    pub users: u32,
    /// Pixels must be (re)loaded at the next maintenance pass.
    pub need_load: bool,
    pub texture: Option<DeviceTexture>,
    /// Device debug name, assigned when loading.
    pub mem_name: String,
}

impl Image {
    fn new(request: &ImageRequest, metadata: ImageMetaData) -> Self {
        Self {
            key: request.key.clone(),
            metadata,
            animated: request.animated,
            frame: request.frame,
            is_volume: request.is_volume,
            isovalue: request.isovalue,
            users: 1,
            need_load: true,
            texture: None,
            mem_name: String::new(),
        }
    }
}

/// Device name of the texture in `flat`, e.g. `__tex_image_byte4_009`.
#[must_use]
pub fn mem_name(flat: FlatSlot) -> String {
    let (_, data_type) = flat.split();
    format!("__tex_image_{}_{:03}", data_type.name(), flat.raw())
}

type Bucket = Vec<Option<Image>>;

/// Images by pixel type, with reference counts and a dirty flag.
#[derive(Debug)]
pub struct Registry {
    buckets: [Bucket; ImageDataType::COUNT],
    live: [usize; ImageDataType::COUNT],
    max_images: usize,
    supports_half: bool,
    supports_16bit_norm: bool,
    animation_frame: i32,
    dirty: bool,
}

impl Registry {
    /// `supports_half` is the device capability; without it half images are stored
    /// as float.
    #[must_use]
    pub fn new(max_images: usize, supports_half: bool) -> Self {
        Self {
            buckets: Default::default(),
            live: [0; ImageDataType::COUNT],
            max_images,
            supports_half,
            supports_16bit_norm: true,
            animation_frame: 0,
            dirty: false,
        }
    }

    /// Without 16-bit normalized support ushort images are stored as half, or as
    /// float when half is unsupported too.
    #[must_use]
    pub fn with_16bit_norm(mut self, supported: bool) -> Self {
        self.supports_16bit_norm = supported;
        self
    }

    /// Whether a maintenance pass has work to do.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Number of live images over all types.
    #[must_use]
    pub fn image_count(&self) -> usize {
        self.live.iter().sum()
    }

    /// Live images of one type.
    #[must_use]
    pub fn image_count_of(&self, data_type: ImageDataType) -> usize {
        self.live[data_type.index()]
    }

    /// Registers a reference to `request`, whose `metadata` was just probed.
    ///
    /// Returns the slot of an identical existing image (one more user) or of a new
    /// image, or [`FlatSlot::INVALID`] when the image ceiling is reached.
    pub fn add(&mut self, request: &ImageRequest, mut metadata: ImageMetaData) -> FlatSlot {
        if !self.supports_16bit_norm {
            metadata.data_type = metadata.data_type.without_16bit_norm();
        }
        if !self.supports_half {
            metadata.data_type = metadata.data_type.without_half();
        }
        let data_type = metadata.data_type;
        let bucket = &mut self.buckets[data_type.index()];

        let existing = bucket.iter_mut().enumerate().find_map(|(slot, entry)| {
            entry
                .as_mut()
                .filter(|image| image.key == request.key)
                .map(|image| (slot, image))
        });
        if let Some((slot, image)) = existing {
            let mut changed = false;
            if image.frame != request.frame {
                image.frame = request.frame;
                changed = true;
            }
            if image.metadata != metadata {
                image.metadata = metadata;
                changed = true;
            }
            if changed {
                image.need_load = true;
                self.dirty = true;
            }
            image.users += 1;
            return FlatSlot::new(slot, data_type);
        }

        if self.image_count() >= self.max_images {
            log::warn!(
                "Reached image limit ({}), skipping '{}'",
                self.max_images,
                request.key.path.display()
            );
            return FlatSlot::INVALID;
        }

        let bucket = &mut self.buckets[data_type.index()];
        let slot = match bucket.iter().position(Option::is_none) {
            Some(slot) => slot,
            None => {
                bucket.push(None);
                bucket.len() - 1
            }
        };
        bucket[slot] = Some(Image::new(request, metadata));
        self.live[data_type.index()] += 1;
        self.dirty = true;

        FlatSlot::new(slot, data_type)
    }

    fn live_image_mut(&mut self, flat: FlatSlot) -> &mut Image {
        let (slot, data_type) = flat.split();
        match self.buckets[data_type.index()]
            .get_mut(slot)
            .and_then(Option::as_mut)
        {
            Some(image) => image,
            None => panic!("no image in slot {flat}"),
        }
    }

    /// Adds a reference to an image that is still referenced.
    ///
    /// # Panics
    /// If the slot is empty or its image has no users.
    pub fn add_user(&mut self, flat: FlatSlot) {
        let image = self.live_image_mut(flat);
        assert!(image.users >= 1, "adding a user to released image {flat}");
        image.users += 1;
    }

    /// Drops a reference. The image is freed by the next maintenance pass once it has
    /// no users left.
    ///
    /// # Panics
    /// If the slot is empty or its image has no users.
    pub fn remove(&mut self, flat: FlatSlot) {
        let image = self.live_image_mut(flat);
        assert!(image.users >= 1, "removing a user from released image {flat}");
        image.users -= 1;
        if image.users == 0 {
            self.dirty = true;
        }
    }

    /// Slot of the image with identity `key`, in any bucket.
    #[must_use]
    pub fn find(&self, key: &ImageKey) -> Option<FlatSlot> {
        self.iter()
            .find(|(_, image)| image.key == *key)
            .map(|(flat, _)| flat)
    }

    /// [`Registry::remove`] by identity. Returns `false` if no such image exists.
    pub fn remove_by_key(&mut self, key: &ImageKey) -> bool {
        match self.find(key) {
            Some(flat) => {
                self.remove(flat);
                true
            }
            None => false,
        }
    }

    /// Flags the image with identity `key` for reloading. Returns `false` if no such
    /// image exists.
    pub fn tag_reload(&mut self, key: &ImageKey) -> bool {
        match self.find(key) {
            Some(flat) => {
                self.live_image_mut(flat).need_load = true;
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn get(&self, flat: FlatSlot) -> Option<&Image> {
        if !flat.is_valid() {
            return None;
        }
        let (slot, data_type) = flat.split();
        self.buckets[data_type.index()].get(slot)?.as_ref()
    }

    pub fn get_mut(&mut self, flat: FlatSlot) -> Option<&mut Image> {
        if !flat.is_valid() {
            return None;
        }
        let (slot, data_type) = flat.split();
        self.buckets[data_type.index()].get_mut(slot)?.as_mut()
    }

    /// Metadata of the image in `flat`. `None` for [`FlatSlot::INVALID`] and empty
    /// slots.
    #[must_use]
    pub fn metadata(&self, flat: FlatSlot) -> Option<ImageMetaData> {
        self.get(flat).map(|image| image.metadata)
    }

    /// Removes the image in `flat` from the table.
    pub fn take(&mut self, flat: FlatSlot) -> Option<Image> {
        if !flat.is_valid() {
            return None;
        }
        let (slot, data_type) = flat.split();
        let image = self.buckets[data_type.index()].get_mut(slot)?.take()?;
        self.live[data_type.index()] -= 1;
        Some(image)
    }

    /// Removes every image without users.
    pub fn take_unused(&mut self) -> Vec<(FlatSlot, Image)> {
        self.take_where(|image| image.users == 0)
    }

    /// Removes every image matching `predicate`.
    pub fn take_where(&mut self, predicate: impl Fn(&Image) -> bool) -> Vec<(FlatSlot, Image)> {
        let mut taken = Vec::new();
        for data_type in ImageDataType::ALL {
            let bucket = &mut self.buckets[data_type.index()];
            for (slot, entry) in bucket.iter_mut().enumerate() {
                if let Some(image) = entry.take_if(|image| predicate(image)) {
                    taken.push((FlatSlot::new(slot, data_type), image));
                    self.live[data_type.index()] -= 1;
                }
            }
        }
        taken
    }

    /// Every live image with its slot.
    pub fn iter(&self) -> impl Iterator<Item = (FlatSlot, &Image)> {
        ImageDataType::ALL.into_iter().flat_map(move |data_type| {
            self.buckets[data_type.index()]
                .iter()
                .enumerate()
                .filter_map(move |(slot, image)| {
                    image.as_ref().map(|image| (FlatSlot::new(slot, data_type), image))
                })
        })
    }

    /// Every live image, mutably. The references are disjoint, so they can be handed
    /// to different worker threads.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (FlatSlot, &mut Image)> {
        self.buckets
            .iter_mut()
            .zip(ImageDataType::ALL)
            .flat_map(|(bucket, data_type)| {
                bucket
                    .iter_mut()
                    .enumerate()
                    .filter_map(move |(slot, image)| {
                        image.as_mut().map(|image| (FlatSlot::new(slot, data_type), image))
                    })
            })
    }

    /// Records the current animation frame. Returns whether the frame changed and
    /// any animated image exists, i.e. whether images need an update.
    pub fn set_animation_frame(&mut self, frame: i32) -> bool {
        if frame == self.animation_frame {
            return false;
        }
        self.animation_frame = frame;
        self.iter().any(|(_, image)| image.animated)
    }

    #[must_use]
    pub fn animation_frame(&self) -> i32 {
        self.animation_frame
    }
}
