//! Pixel Pipeline Tests
//!
//! Tests for loading real files through the cache:
//! - Channel normalization: gray, gray+alpha, RGB, 16-bit
//! - Orientation: file images are stored bottom-up
//! - Alpha: association, Ignore mode
//! - Color: gamma spaces converted to linear, 16-bit promoted to half
//! - Float sanitizing: non-finite pixels zeroed
//! - Downscaling of oversized images
//! - Fallback: missing files and directories load the magenta marker

use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::UVec3;
use image::{GrayAlphaImage, GrayImage, ImageBuffer, Rgb, RgbImage, Rgba, RgbaImage};
use tempfile::TempDir;

use texcache::{
    AlphaMode, CacheSettings, ColorSpace, CpuDevice, FlatSlot, ImageDataType, ImageRequest,
    Progress, TexelBuffer, TextureCache,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn cache(settings: CacheSettings) -> TextureCache {
    init_logger();
    TextureCache::builder()
        .with_settings(settings.with_worker_threads(2))
        .with_device(Arc::new(CpuDevice::new()))
        .build()
        .expect("cache builds")
}

fn save(dir: &TempDir, name: &str, image: impl Into<image::DynamicImage>) -> PathBuf {
    let path = dir.path().join(name);
    image.into().save(&path).expect("fixture written");
    path
}

fn load(cache: &mut TextureCache, request: &ImageRequest) -> FlatSlot {
    let slot = cache.add_image(request);
    cache.device_update(&Progress::new());
    slot
}

fn load_file(cache: &mut TextureCache, path: &Path) -> FlatSlot {
    load(cache, &ImageRequest::file(path))
}

fn pixels(cache: &TextureCache, slot: FlatSlot) -> &TexelBuffer {
    &cache.image_memory(slot).expect("texture loaded").pixels
}

// ============================================================================
// Channel Normalization Tests
// ============================================================================

#[test]
fn gray_png_loads_single_channel_bottom_up() {
    let dir = tempfile::tempdir().unwrap();
    let path = save(&dir, "gray.png", GrayImage::from_raw(1, 2, vec![10, 200]).unwrap());
    let mut cache = cache(CacheSettings::default());

    let slot = load_file(&mut cache, &path);

    assert_eq!(slot.split().1, ImageDataType::Byte);
    let meta = cache.image_metadata(slot).unwrap();
    assert_eq!(meta.channels, 1);
    assert!(meta.colorspace.is_srgb());
    assert!(meta.compress_as_srgb);
    assert_eq!(pixels(&cache, slot), &TexelBuffer::Byte(vec![200, 10]));
}

#[test]
fn rgb_png_gets_opaque_alpha() {
    let dir = tempfile::tempdir().unwrap();
    let path = save(&dir, "rgb.png", RgbImage::from_raw(1, 1, vec![10, 20, 30]).unwrap());
    let mut cache = cache(CacheSettings::default());

    let slot = load_file(&mut cache, &path);

    assert_eq!(slot.split().1, ImageDataType::Byte4);
    assert_eq!(pixels(&cache, slot), &TexelBuffer::Byte4(vec![[10, 20, 30, 255]]));
}

#[test]
fn rgb_rows_are_flipped() {
    let dir = tempfile::tempdir().unwrap();
    let data = vec![1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4];
    let path = save(&dir, "quad.png", RgbImage::from_raw(2, 2, data).unwrap());
    let mut cache = cache(CacheSettings::default());

    let slot = load_file(&mut cache, &path);

    let TexelBuffer::Byte4(px) = pixels(&cache, slot) else {
        panic!("expected byte4 pixels");
    };
    let reds: Vec<u8> = px.iter().map(|p| p[0]).collect();
    assert_eq!(reds, vec![3, 4, 1, 2]);
}

#[test]
fn gray_alpha_data_expands_without_association() {
    let dir = tempfile::tempdir().unwrap();
    let path = save(&dir, "mask.png", GrayAlphaImage::from_raw(1, 1, vec![100, 128]).unwrap());
    let mut cache = cache(CacheSettings::default());

    let request = ImageRequest::file(&path).with_colorspace(ColorSpace::new("Non-Color"));
    let slot = load(&mut cache, &request);

    assert_eq!(slot.split().1, ImageDataType::Byte4);
    assert!(cache.image_metadata(slot).unwrap().colorspace.is_raw());
    assert_eq!(pixels(&cache, slot), &TexelBuffer::Byte4(vec![[100, 100, 100, 128]]));
}

#[test]
fn color_images_are_premultiplied() {
    let dir = tempfile::tempdir().unwrap();
    let path = save(&dir, "hole.png", GrayAlphaImage::from_raw(1, 1, vec![200, 0]).unwrap());
    let mut cache = cache(CacheSettings::default());

    let slot = load_file(&mut cache, &path);

    assert_eq!(pixels(&cache, slot), &TexelBuffer::Byte4(vec![[0, 0, 0, 0]]));
}

#[test]
fn ignored_alpha_is_forced_opaque() {
    let dir = tempfile::tempdir().unwrap();
    let path = save(&dir, "rgba.png", RgbaImage::from_raw(1, 1, vec![10, 20, 30, 0]).unwrap());
    let mut cache = cache(CacheSettings::default());

    let request = ImageRequest::file(&path).with_alpha_mode(AlphaMode::Ignore);
    let slot = load(&mut cache, &request);

    assert_eq!(pixels(&cache, slot), &TexelBuffer::Byte4(vec![[10, 20, 30, 255]]));
}

#[test]
fn sixteen_bit_gray_stays_ushort() {
    let dir = tempfile::tempdir().unwrap();
    let img: ImageBuffer<image::Luma<u16>, Vec<u16>> =
        ImageBuffer::from_raw(2, 1, vec![0, 65535]).unwrap();
    let path = save(&dir, "height.png", img);
    let mut cache = cache(CacheSettings::default());

    let slot = load_file(&mut cache, &path);

    assert_eq!(slot.split().1, ImageDataType::Ushort);
    assert_eq!(pixels(&cache, slot), &TexelBuffer::Ushort(vec![0, 65535]));
}

// ============================================================================
// Color Conversion Tests
// ============================================================================

#[test]
fn gamma_space_sixteen_bit_is_promoted_to_half_linear() {
    let dir = tempfile::tempdir().unwrap();
    let img: ImageBuffer<Rgb<u16>, Vec<u16>> =
        ImageBuffer::from_raw(1, 1, vec![65535, 0, 65535]).unwrap();
    let path = save(&dir, "gamma.png", img);
    let mut cache = cache(CacheSettings::default());

    let request = ImageRequest::file(&path).with_colorspace(ColorSpace::new("Gamma 2.2"));
    let slot = load(&mut cache, &request);

    assert_eq!(slot.split().1, ImageDataType::Half4);
    let texture = cache.image_memory(slot).unwrap();
    assert_eq!(texture.data_type(), ImageDataType::Half4);
    assert_eq!(texture.pixels.pixel_f32(0), [1.0, 0.0, 1.0, 1.0]);
}

#[test]
fn gamma_space_translucent_color_is_converted_before_premultiply() {
    let dir = tempfile::tempdir().unwrap();
    let img: ImageBuffer<Rgba<u16>, Vec<u16>> =
        ImageBuffer::from_raw(1, 1, vec![65535, 65535, 65535, 32768]).unwrap();
    let path = save(&dir, "veil.png", img);
    let mut cache = cache(CacheSettings::default());

    let request = ImageRequest::file(&path).with_colorspace(ColorSpace::new("Gamma 2.2"));
    let slot = load(&mut cache, &request);

    assert_eq!(slot.split().1, ImageDataType::Half4);
    let [r, g, b, a] = pixels(&cache, slot).pixel_f32(0);
    for (channel, value) in [("red", r), ("green", g), ("blue", b)] {
        assert!((value - 0.5).abs() < 2e-3, "{channel} was {value}");
    }
    assert!((a - 0.5).abs() < 2e-3, "alpha was {a}");
}

// ============================================================================
// Float Tests
// ============================================================================

#[test]
fn non_finite_float_pixels_are_zeroed() {
    let dir = tempfile::tempdir().unwrap();
    let data = vec![f32::NAN, 0.5, 0.5, 1.0, 0.5, 0.25, 1.0, 1.0];
    let img: ImageBuffer<Rgba<f32>, Vec<f32>> = ImageBuffer::from_raw(1, 2, data).unwrap();
    let path = save(&dir, "nan.exr", img);
    let mut cache = cache(CacheSettings::default());

    let slot = load_file(&mut cache, &path);

    assert_eq!(slot.split().1, ImageDataType::Float4);
    assert!(cache.image_metadata(slot).unwrap().colorspace.is_raw());
    // Bottom row first.
    assert_eq!(
        pixels(&cache, slot),
        &TexelBuffer::Float4(vec![[0.5, 0.25, 1.0, 1.0], [0.0; 4]])
    );
}

// ============================================================================
// Downscale Tests
// ============================================================================

#[test]
fn oversized_images_are_halved_until_within_limit() {
    let dir = tempfile::tempdir().unwrap();
    let img = RgbImage::from_pixel(16, 8, Rgb([50, 60, 70]));
    let path = save(&dir, "big.png", img);
    let mut cache = cache(CacheSettings::default().with_texture_limit(4));

    let slot = load_file(&mut cache, &path);

    let texture = cache.image_memory(slot).unwrap();
    assert_eq!(texture.dims, UVec3::new(4, 2, 1));
    assert_eq!(texture.pixels.len(), 8);
    assert_eq!(texture.memory_size(), 8 * 4);
    assert_eq!(texture.pixels.pixel_f32(7)[3], 1.0);
    let TexelBuffer::Byte4(px) = &texture.pixels else {
        panic!("expected byte4 pixels");
    };
    assert!(px.iter().all(|p| *p == [50, 60, 70, 255]));

    // Metadata keeps the source size.
    assert_eq!(cache.image_metadata(slot).unwrap().width, 16);
}

#[test]
fn images_within_limit_are_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = save(&dir, "small.png", RgbImage::new(4, 4));
    let mut cache = cache(CacheSettings::default().with_texture_limit(4));

    let slot = load_file(&mut cache, &path);
    assert_eq!(cache.image_memory(slot).unwrap().dims, UVec3::new(4, 4, 1));
}

// ============================================================================
// Fallback Tests
// ============================================================================

fn assert_missing_marker(cache: &TextureCache, slot: FlatSlot) {
    let texture = cache.image_memory(slot).expect("marker loaded");
    assert!(texture.handle.is_some());
    assert_eq!(texture.dims, UVec3::ONE);
    assert_eq!(texture.pixels.pixel_f32(0), [1.0, 0.0, 1.0, 1.0]);
}

#[test]
fn missing_file_loads_magenta_marker() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = cache(CacheSettings::default());

    let slot = load_file(&mut cache, &dir.path().join("nope.png"));

    assert!(slot.is_valid());
    assert_eq!(cache.image_metadata(slot).unwrap().channels, 0);
    assert_missing_marker(&cache, slot);
    assert!(!cache.need_update());
}

#[test]
fn directory_path_loads_magenta_marker() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = cache(CacheSettings::default());

    let slot = load_file(&mut cache, dir.path());
    assert_missing_marker(&cache, slot);
}

#[test]
fn corrupt_file_loads_magenta_marker() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.png");
    std::fs::write(&path, b"not a png at all").unwrap();
    let mut cache = cache(CacheSettings::default());

    let slot = load_file(&mut cache, &path);
    assert_missing_marker(&cache, slot);
}
