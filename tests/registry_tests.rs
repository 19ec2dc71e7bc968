//! Slot Registry Tests
//!
//! Tests for:
//! - FlatSlot: type bits, slot index, device names
//! - Deduplication: identical requests share one slot, different keys do not
//! - Reference lifecycle: deferred free, slot reuse, misuse panics
//! - Reload triggers: changed frame or metadata, tag_reload
//! - Limits: image ceiling, half-precision and 16-bit fallbacks
//! - Animation frame tracking

use std::collections::HashSet;

use texcache::registry::{Registry, mem_name};
use texcache::{
    ColorSpace, FlatSlot, ImageDataType, ImageMetaData, ImageRequest, Interpolation,
};

fn meta(data_type: ImageDataType) -> ImageMetaData {
    ImageMetaData {
        width: 4,
        height: 4,
        depth: 1,
        channels: data_type.channels() as u32,
        is_float: data_type.is_float(),
        is_half: data_type.is_half(),
        data_type,
        colorspace: ColorSpace::raw(),
        compress_as_srgb: false,
        builtin_free_cache: false,
    }
}

fn registry() -> Registry {
    Registry::new(16, true)
}

// ============================================================================
// FlatSlot Tests
// ============================================================================

#[test]
fn flat_slot_packs_type_into_low_bits() {
    let flat = FlatSlot::new(5, ImageDataType::Half);
    assert_eq!(flat.raw(), (5 << FlatSlot::TYPE_SHIFT) | 5);
    assert_eq!(flat.split(), (5, ImageDataType::Half));
}

#[test]
fn flat_slot_encoding_round_trips_every_type() {
    let mut seen = HashSet::new();
    for data_type in ImageDataType::ALL {
        for slot in [0, 1, 2, 999, FlatSlot::MAX_SLOT - 1, FlatSlot::MAX_SLOT] {
            let flat = FlatSlot::new(slot, data_type);
            assert!(flat.is_valid(), "{slot} {data_type}");
            assert_eq!(flat.split(), (slot, data_type));
            assert_eq!(FlatSlot::from_raw(flat.raw()), flat);
            assert!(seen.insert(flat.raw()), "{flat} encoded twice");
        }
    }
    assert_eq!(FlatSlot::MAX_SLOT, (i32::MAX >> 3) as usize);
}

#[test]
#[should_panic(expected = "exceeds flat slot range")]
fn slot_beyond_encoding_range_panics() {
    let _ = FlatSlot::new(FlatSlot::MAX_SLOT + 1, ImageDataType::Byte);
}

#[test]
fn invalid_slot_is_not_valid() {
    assert!(!FlatSlot::INVALID.is_valid());
    assert!(FlatSlot::new(0, ImageDataType::Float4).is_valid());
}

#[test]
fn mem_name_uses_type_and_flat_index() {
    let flat = FlatSlot::new(1, ImageDataType::Byte4);
    assert_eq!(mem_name(flat), "__tex_image_byte4_009");
    assert_eq!(
        mem_name(FlatSlot::new(0, ImageDataType::Float4)),
        "__tex_image_float4_000"
    );
}

// ============================================================================
// Deduplication Tests
// ============================================================================

#[test]
fn identical_requests_share_a_slot() {
    let mut reg = registry();
    let request = ImageRequest::file("wood.png");

    let a = reg.add(&request, meta(ImageDataType::Byte4));
    let b = reg.add(&request, meta(ImageDataType::Byte4));

    assert_eq!(a, b);
    assert_eq!(reg.image_count(), 1);
    assert_eq!(reg.get(a).map(|image| image.users), Some(2));
}

#[test]
fn any_identity_field_separates_requests() {
    let mut reg = registry();
    let base = ImageRequest::file("wood.png");

    let a = reg.add(&base, meta(ImageDataType::Byte4));
    let b = reg.add(
        &base.clone().with_interpolation(Interpolation::Closest),
        meta(ImageDataType::Byte4),
    );
    let c = reg.add(
        &base.clone().with_colorspace(ColorSpace::raw()),
        meta(ImageDataType::Byte4),
    );

    assert_ne!(a, b);
    assert_ne!(a, c);
    assert_ne!(b, c);
    assert_eq!(reg.image_count(), 3);
}

#[test]
fn slots_are_bucketed_by_type() {
    let mut reg = registry();
    let a = reg.add(&ImageRequest::file("a.png"), meta(ImageDataType::Byte4));
    let b = reg.add(&ImageRequest::file("b.exr"), meta(ImageDataType::Float));

    assert_eq!(a.split(), (0, ImageDataType::Byte4));
    assert_eq!(b.split(), (0, ImageDataType::Float));
    assert_eq!(reg.image_count_of(ImageDataType::Byte4), 1);
    assert_eq!(reg.image_count_of(ImageDataType::Float), 1);
    assert_eq!(reg.find(&ImageRequest::file("b.exr").key), Some(b));
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[test]
fn remove_defers_freeing_to_take_unused() {
    let mut reg = registry();
    let flat = reg.add(&ImageRequest::file("a.png"), meta(ImageDataType::Byte4));
    reg.mark_clean();

    reg.remove(flat);
    assert!(reg.is_dirty());
    assert_eq!(reg.get(flat).map(|image| image.users), Some(0));

    let freed = reg.take_unused();
    assert_eq!(freed.len(), 1);
    assert_eq!(freed[0].0, flat);
    assert!(reg.get(flat).is_none());
    assert!(reg.metadata(flat).is_none());
    assert_eq!(reg.image_count(), 0);
}

#[test]
fn readding_before_the_pass_revives_the_image() {
    let mut reg = registry();
    let request = ImageRequest::file("a.png");
    let flat = reg.add(&request, meta(ImageDataType::Byte4));

    reg.remove(flat);
    let again = reg.add(&request, meta(ImageDataType::Byte4));

    assert_eq!(flat, again);
    assert!(reg.take_unused().is_empty());
    assert_eq!(reg.get(flat).map(|image| image.users), Some(1));
}

#[test]
fn freed_slots_are_reused() {
    let mut reg = registry();
    let a = reg.add(&ImageRequest::file("a.png"), meta(ImageDataType::Byte4));
    let b = reg.add(&ImageRequest::file("b.png"), meta(ImageDataType::Byte4));

    reg.remove(a);
    reg.take_unused();

    let c = reg.add(&ImageRequest::file("c.png"), meta(ImageDataType::Byte4));
    assert_eq!(c, a);
    assert_ne!(c, b);
}

#[test]
fn remove_by_key_and_add_user() {
    let mut reg = registry();
    let request = ImageRequest::file("a.png");
    let flat = reg.add(&request, meta(ImageDataType::Byte4));

    reg.add_user(flat);
    assert!(reg.remove_by_key(&request.key));
    assert_eq!(reg.get(flat).map(|image| image.users), Some(1));
    assert!(!reg.remove_by_key(&ImageRequest::file("unknown.png").key));
}

#[test]
#[should_panic(expected = "released image")]
fn removing_a_released_image_panics() {
    let mut reg = registry();
    let flat = reg.add(&ImageRequest::file("a.png"), meta(ImageDataType::Byte4));
    reg.remove(flat);
    reg.remove(flat);
}

#[test]
#[should_panic(expected = "no image in slot")]
fn adding_a_user_to_an_empty_slot_panics() {
    let mut reg = registry();
    reg.add_user(FlatSlot::new(3, ImageDataType::Float4));
}

// ============================================================================
// Reload Trigger Tests
// ============================================================================

fn settle(reg: &mut Registry, flat: FlatSlot) {
    if let Some(image) = reg.get_mut(flat) {
        image.need_load = false;
    }
    reg.mark_clean();
}

#[test]
fn new_frame_rearms_need_load() {
    let mut reg = registry();
    let request = ImageRequest::file("seq.png").with_frame(1.0);
    let flat = reg.add(&request, meta(ImageDataType::Byte4));
    settle(&mut reg, flat);

    reg.add(&request, meta(ImageDataType::Byte4));
    assert!(!reg.is_dirty());
    assert_eq!(reg.get(flat).map(|image| image.need_load), Some(false));

    reg.add(&request.clone().with_frame(2.0), meta(ImageDataType::Byte4));
    assert!(reg.is_dirty());
    let image = reg.get(flat).expect("live");
    assert!(image.need_load);
    assert!((image.frame - 2.0).abs() < f32::EPSILON);
    assert_eq!(image.users, 3);
}

#[test]
fn changed_metadata_rearms_need_load() {
    let mut reg = registry();
    let request = ImageRequest::file("a.png");
    let flat = reg.add(&request, meta(ImageDataType::Byte4));
    settle(&mut reg, flat);

    let mut bigger = meta(ImageDataType::Byte4);
    bigger.width = 64;
    reg.add(&request, bigger);

    assert!(reg.is_dirty());
    assert_eq!(reg.metadata(flat).map(|m| m.width), Some(64));
}

#[test]
fn tag_reload_marks_existing_images_only() {
    let mut reg = registry();
    let request = ImageRequest::file("a.png");
    let flat = reg.add(&request, meta(ImageDataType::Byte4));
    settle(&mut reg, flat);

    assert!(reg.tag_reload(&request.key));
    assert!(reg.is_dirty());
    assert_eq!(reg.get(flat).map(|image| image.need_load), Some(true));
    assert!(!reg.tag_reload(&ImageRequest::file("b.png").key));
}

// ============================================================================
// Limit Tests
// ============================================================================

#[test]
fn requests_beyond_the_ceiling_are_rejected() {
    let mut reg = Registry::new(2, true);
    let a = reg.add(&ImageRequest::file("a.png"), meta(ImageDataType::Byte4));
    reg.add(&ImageRequest::file("b.png"), meta(ImageDataType::Float));

    let rejected = reg.add(&ImageRequest::file("c.png"), meta(ImageDataType::Byte));
    assert_eq!(rejected, FlatSlot::INVALID);
    assert!(reg.metadata(rejected).is_none());
    assert_eq!(reg.image_count(), 2);

    // Existing images are still found at the ceiling.
    assert_eq!(
        reg.add(&ImageRequest::file("a.png"), meta(ImageDataType::Byte4)),
        a
    );
}

#[test]
fn half_types_fall_back_to_float_without_device_support() {
    let mut reg = Registry::new(16, false);
    let four = reg.add(&ImageRequest::file("a.exr"), meta(ImageDataType::Half4));
    let one = reg.add(&ImageRequest::file("b.exr"), meta(ImageDataType::Half));

    assert_eq!(four.split().1, ImageDataType::Float4);
    assert_eq!(one.split().1, ImageDataType::Float);
    assert_eq!(
        reg.metadata(four).map(|m| m.data_type),
        Some(ImageDataType::Float4)
    );

    let mut native = registry();
    let half = native.add(&ImageRequest::file("a.exr"), meta(ImageDataType::Half4));
    assert_eq!(half.split().1, ImageDataType::Half4);
}

#[test]
fn ushort_types_fall_back_without_16bit_norm_support() {
    let mut reg = Registry::new(16, true).with_16bit_norm(false);
    let four = reg.add(&ImageRequest::file("a.png"), meta(ImageDataType::Ushort4));
    let one = reg.add(&ImageRequest::file("b.png"), meta(ImageDataType::Ushort));
    assert_eq!(four.split().1, ImageDataType::Half4);
    assert_eq!(one.split().1, ImageDataType::Half);
    assert_eq!(reg.image_count_of(ImageDataType::Ushort4), 0);

    // Without half either, the chain ends at float.
    let mut minimal = Registry::new(16, false).with_16bit_norm(false);
    let slot = minimal.add(&ImageRequest::file("a.png"), meta(ImageDataType::Ushort4));
    assert_eq!(slot.split().1, ImageDataType::Float4);
}

// ============================================================================
// Animation Tests
// ============================================================================

#[test]
fn animation_frame_reports_updates_only_with_animated_images() {
    let mut reg = registry();
    reg.add(&ImageRequest::file("still.png"), meta(ImageDataType::Byte4));
    assert!(!reg.set_animation_frame(3));
    assert_eq!(reg.animation_frame(), 3);

    reg.add(
        &ImageRequest::file("seq.png").with_frame(1.0),
        meta(ImageDataType::Byte4),
    );
    assert!(reg.set_animation_frame(4));
    assert!(!reg.set_animation_frame(4));
}
