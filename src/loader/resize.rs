//! Power-of-two downscaling for oversized images.

use glam::UVec3;

use crate::sparse::voxel_count;
use crate::texel::Texel;

/// Largest `2^-n` such that `max_dim * factor <= limit`.
#[must_use]
pub fn scale_factor(max_dim: u32, limit: u32) -> f32 {
    let mut factor = 1.0f32;
    while max_dim as f32 * factor > limit as f32 {
        factor *= 0.5;
    }
    factor
}

/// Box-filters `data` down by `factor` (a power of two at most 1).
///
/// Each output pixel averages the input block it covers. Blocks at the right,
/// bottom and back edges may be partial. Returns the resized pixels and their size.
#[must_use]
pub fn box_downscale<T: Texel>(
    data: &[T],
    dims: UVec3,
    channels: usize,
    factor: f32,
) -> (Vec<T>, UVec3) {
    let step = (1.0 / factor).round().max(1.0) as u32;
    if step == 1 {
        return (data.to_vec(), dims);
    }
    let out_dims = (dims + UVec3::splat(step - 1)) / step;
    let mut out = Vec::with_capacity(voxel_count(out_dims) * channels);
    let mut sum = vec![0.0f32; channels];

    for oz in 0..out_dims.z {
        for oy in 0..out_dims.y {
            for ox in 0..out_dims.x {
                let lo = UVec3::new(ox, oy, oz) * step;
                let hi = (lo + UVec3::splat(step)).min(dims);
                sum.fill(0.0);
                let mut count = 0u32;
                for z in lo.z..hi.z {
                    for y in lo.y..hi.y {
                        let row = (y as usize + dims.y as usize * z as usize) * dims.x as usize;
                        for x in lo.x..hi.x {
                            let start = (row + x as usize) * channels;
                            for (acc, v) in sum.iter_mut().zip(&data[start..start + channels]) {
                                *acc += v.to_f32();
                            }
                            count += 1;
                        }
                    }
                }
                let inv = 1.0 / count as f32;
                out.extend(sum.iter().map(|&s| T::from_f32(s * inv)));
            }
        }
    }
    (out, out_dims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factor_halves_until_within_limit() {
        assert!((scale_factor(100, 200) - 1.0).abs() < f32::EPSILON);
        assert!((scale_factor(4096, 1024) - 0.25).abs() < f32::EPSILON);
        assert!((scale_factor(1500, 1024) - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn averages_blocks() {
        let data = [0.0f32, 1.0, 2.0, 3.0];
        let (out, dims) = box_downscale(&data, UVec3::new(2, 2, 1), 1, 0.5);
        assert_eq!(dims, UVec3::new(1, 1, 1));
        assert!((out[0] - 1.5).abs() < f32::EPSILON);
    }

    #[test]
    fn odd_edges_use_partial_blocks() {
        let data = [2u8, 4, 200];
        let (out, dims) = box_downscale(&data, UVec3::new(3, 1, 1), 1, 0.5);
        assert_eq!(dims, UVec3::new(2, 1, 1));
        assert_eq!(out, vec![3, 200]);
    }
}
