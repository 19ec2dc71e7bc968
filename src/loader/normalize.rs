//! Channel layout normalization.
//!
//! Devices sample single-channel or RGBA textures only. These helpers bring decoded
//! data of any layout into one of the two.

use crate::texel::Texel;

/// Reverses row order of a 2D image so the bottom row comes first.
pub fn flip_rows<T: Texel>(data: &mut [T], width: usize, height: usize, channels: usize) {
    let row = width * channels;
    if row == 0 {
        return;
    }
    for y in 0..height / 2 {
        let (top, bottom) = data.split_at_mut((height - 1 - y) * row);
        top[y * row..(y + 1) * row].swap_with_slice(&mut bottom[..row]);
    }
}

/// Drops every channel after the fourth.
#[must_use]
pub fn compact_to_rgba<T: Texel>(data: &[T], channels: usize) -> Vec<T> {
    data.chunks_exact(channels)
        .flat_map(|px| px[..4].iter().copied())
        .collect()
}

/// Expands 1, 2 or 3 channel data to RGBA.
///
/// - gray: replicated into RGB, opaque alpha
/// - gray + alpha: replicated into RGB, alpha kept
/// - RGB: opaque alpha
#[must_use]
pub fn expand_to_rgba<T: Texel>(data: Vec<T>, channels: usize) -> Vec<T> {
    let one = T::one();
    match channels {
        1 => data.iter().flat_map(|&g| [g, g, g, one]).collect(),
        2 => data
            .chunks_exact(2)
            .flat_map(|px| [px[0], px[0], px[0], px[1]])
            .collect(),
        3 => data
            .chunks_exact(3)
            .flat_map(|px| [px[0], px[1], px[2], one])
            .collect(),
        _ => data,
    }
}

/// Keeps only the first channel.
#[must_use]
pub fn first_channel<T: Texel>(data: &[T], channels: usize) -> Vec<T> {
    data.chunks_exact(channels).map(|px| px[0]).collect()
}

/// Converts CMYK pixels to RGB with opaque alpha, in place.
pub fn cmyk_to_rgba<T: Texel>(data: &mut [T]) {
    for px in data.chunks_exact_mut(4) {
        let [c, m, y, k] = [px[0], px[1], px[2], px[3]].map(Texel::to_f32);
        px[0] = T::from_f32((1.0 - c) * (1.0 - k));
        px[1] = T::from_f32((1.0 - m) * (1.0 - k));
        px[2] = T::from_f32((1.0 - y) * (1.0 - k));
        px[3] = T::one();
    }
}

pub fn force_opaque<T: Texel>(data: &mut [T]) {
    for px in data.chunks_exact_mut(4) {
        px[3] = T::one();
    }
}

/// Zeroes every pixel that has a non-finite channel. Returns the number of pixels
/// touched.
pub fn zero_non_finite<T: Texel>(data: &mut [T], channels: usize) -> usize {
    let mut count = 0;
    for px in data.chunks_exact_mut(channels) {
        if px.iter().any(|v| !v.is_finite()) {
            px.fill(T::zero());
            count += 1;
        }
    }
    count
}
