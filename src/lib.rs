#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod builtin;
pub mod cache;
pub mod color;
pub mod device;
pub mod errors;
pub mod loader;
pub mod metadata;
pub mod mipcache;
pub mod reader;
pub mod registry;
pub mod request;
pub mod settings;
pub mod slot;
pub mod sparse;
pub mod stats;
pub mod texel;
pub mod utils;
pub mod volume;

pub use builtin::{BuiltinImages, BuiltinInfo};
pub use cache::{Progress, TextureCache, TextureCacheBuilder};
pub use color::{BasicColorManager, ColorManager, ColorSpace};
pub use device::{CpuDevice, Device, DeviceInfo, DeviceTexture, GridLayout};
pub use errors::{CacheError, Result};
pub use metadata::ImageMetaData;
pub use mipcache::{TextureBaker, TxOptions};
pub use reader::{FileImageReader, ImageReader};
pub use request::{AlphaMode, BuiltinHandle, Extension, ImageKey, ImageRequest, Interpolation};
pub use settings::{CacheSettings, MipCacheSettings};
pub use slot::{FlatSlot, ImageDataType, PixelKind};
pub use sparse::SparseLayout;
pub use stats::{RenderStats, StatsSink};
pub use texel::TexelBuffer;
pub use utils::interner;
pub use volume::{VolumeData, VolumeReader};
