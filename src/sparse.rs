//! Sparse grid compression for volume textures.
//!
//! A dense voxel grid is cut into tiles of [`TILE_SIZE`]³ voxels. Tiles whose voxels
//! all stay at or below the isovalue are dropped, the remaining ones are packed
//! together and addressed through an index table with one `i32` per tile (x
//! fastest). Inactive tiles have index `-1`.
//!
//! Two packings exist, chosen by the device:
//!
//! | Layout | Storage | Index entry | Allocated dims |
//! |---|---|---|---|
//! | [`SparseLayout::Linear`] | tiles back to back, clipped at the volume edge | voxel offset | `(voxels, 1, 1)` |
//! | [`SparseLayout::Padded`] | one [`PADDED_TILE`]³ block per tile, side by side along x | tile ordinal | `(tiles * 10, 10, 10)` |
//!
//! The padded layout carries a one-voxel apron of neighbor data around each tile so
//! hardware trilinear filtering works without crossing tile boundaries.

use glam::UVec3;

use crate::texel::Texel;

/// Voxels per tile along each axis.
pub const TILE_SIZE: u32 = 8;

/// Side of a padded tile: the tile plus one voxel on each side.
pub const PADDED_TILE: u32 = TILE_SIZE + 2;

/// Packing of active tiles, dictated by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SparseLayout {
    #[default]
    Linear,
    Padded,
}

/// Result of a successful compression.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseGrid<T> {
    pub layout: SparseLayout,
    /// Logical size of the volume.
    pub dense_dims: UVec3,
    /// Size of the storage allocation.
    pub alloc_dims: UVec3,
    pub channels: usize,
    pub voxels: Vec<T>,
    pub index: Vec<i32>,
}

/// Number of tiles along each axis.
#[must_use]
pub fn tile_grid(dims: UVec3) -> UVec3 {
    (dims + UVec3::splat(TILE_SIZE - 1)) / TILE_SIZE
}

fn tile_extent(dims: UVec3, tile: UVec3) -> UVec3 {
    (dims - tile * TILE_SIZE).min(UVec3::splat(TILE_SIZE))
}

/// Number of voxels in a volume of size `dims`.
#[must_use]
pub fn voxel_count(dims: UVec3) -> usize {
    dims.x as usize * dims.y as usize * dims.z as usize
}

#[inline]
fn voxel_offset(dims: UVec3, p: UVec3) -> usize {
    let (w, h) = (dims.x as usize, dims.y as usize);
    p.x as usize + w * (p.y as usize + h * p.z as usize)
}

fn tiles(grid: UVec3) -> impl Iterator<Item = UVec3> {
    (0..grid.z).flat_map(move |z| {
        (0..grid.y).flat_map(move |y| (0..grid.x).map(move |x| UVec3::new(x, y, z)))
    })
}

fn tile_voxels(origin: UVec3, extent: UVec3) -> impl Iterator<Item = UVec3> {
    (0..extent.z).flat_map(move |z| {
        (0..extent.y)
            .flat_map(move |y| (0..extent.x).map(move |x| origin + UVec3::new(x, y, z)))
    })
}

fn is_tile_active<T: Texel>(
    dense: &[T],
    dims: UVec3,
    channels: usize,
    tile: UVec3,
    isovalue: f32,
) -> bool {
    tile_voxels(tile * TILE_SIZE, tile_extent(dims, tile)).any(|p| {
        let start = voxel_offset(dims, p) * channels;
        dense[start..start + channels]
            .iter()
            .any(|v| v.to_f32().abs() > isovalue)
    })
}

/// Compresses `dense` (interleaved, x fastest) into a sparse grid.
///
/// Returns `None` when the volume is empty, the sparse storage plus its index would
/// not be smaller than the dense storage, or the packed voxels cannot be addressed
/// by `i32` index entries.
#[must_use]
pub fn compress<T: Texel>(
    dense: &[T],
    dims: UVec3,
    channels: usize,
    isovalue: f32,
    layout: SparseLayout,
) -> Option<SparseGrid<T>> {
    if dims.min_element() == 0 || channels == 0 {
        return None;
    }
    debug_assert_eq!(dense.len(), voxel_count(dims) * channels);

    let grid = tile_grid(dims);
    let active: Vec<bool> = tiles(grid)
        .map(|tile| is_tile_active(dense, dims, channels, tile, isovalue))
        .collect();

    let packed = match layout {
        SparseLayout::Linear => pack_linear(dense, dims, channels, grid, &active),
        SparseLayout::Padded => pack_padded(dense, dims, channels, grid, &active),
    };
    let Some(sparse) = packed else {
        log::warn!("Sparse grid of {dims} exceeds the tile index range, keeping it dense");
        return None;
    };

    let sparse_bytes = sparse.voxels.len() * size_of::<T>() + sparse.index_bytes();
    let dense_bytes = dense.len() * size_of::<T>();
    if sparse_bytes >= dense_bytes {
        return None;
    }
    Some(sparse)
}

fn pack_linear<T: Texel>(
    dense: &[T],
    dims: UVec3,
    channels: usize,
    grid: UVec3,
    active: &[bool],
) -> Option<SparseGrid<T>> {
    let mut voxels = Vec::new();
    let mut index = Vec::with_capacity(active.len());

    for (tile, &is_active) in tiles(grid).zip(active) {
        if !is_active {
            index.push(-1);
            continue;
        }
        index.push(i32::try_from(voxels.len() / channels).ok()?);
        for p in tile_voxels(tile * TILE_SIZE, tile_extent(dims, tile)) {
            let start = voxel_offset(dims, p) * channels;
            voxels.extend_from_slice(&dense[start..start + channels]);
        }
    }

    let count = u32::try_from(voxels.len() / channels).ok()?;
    Some(SparseGrid {
        layout: SparseLayout::Linear,
        dense_dims: dims,
        alloc_dims: UVec3::new(count, 1, 1),
        channels,
        voxels,
        index,
    })
}

fn pack_padded<T: Texel>(
    dense: &[T],
    dims: UVec3,
    channels: usize,
    grid: UVec3,
    active: &[bool],
) -> Option<SparseGrid<T>> {
    let active_count = u32::try_from(active.iter().filter(|&&a| a).count()).ok()?;
    let alloc_dims = UVec3::new(
        active_count.checked_mul(PADDED_TILE)?,
        PADDED_TILE,
        PADDED_TILE,
    );
    let mut voxels = vec![T::zero(); voxel_count(alloc_dims) * channels];
    let mut index = Vec::with_capacity(active.len());
    let max = dims - UVec3::ONE;

    let mut ordinal = 0u32;
    for (tile, &is_active) in tiles(grid).zip(active) {
        if !is_active {
            index.push(-1);
            continue;
        }
        index.push(i32::try_from(ordinal).ok()?);
        let origin = (tile * TILE_SIZE).as_ivec3() - glam::IVec3::ONE;
        let base = UVec3::new(ordinal * PADDED_TILE, 0, 0);
        for local in tile_voxels(UVec3::ZERO, UVec3::splat(PADDED_TILE)) {
            let src = (origin + local.as_ivec3())
                .max(glam::IVec3::ZERO)
                .as_uvec3()
                .min(max);
            let src_start = voxel_offset(dims, src) * channels;
            let dst_start = voxel_offset(alloc_dims, base + local) * channels;
            voxels[dst_start..dst_start + channels]
                .copy_from_slice(&dense[src_start..src_start + channels]);
        }
        ordinal += 1;
    }

    Some(SparseGrid {
        layout: SparseLayout::Padded,
        dense_dims: dims,
        alloc_dims,
        channels,
        voxels,
        index,
    })
}

impl<T: Texel> SparseGrid<T> {
    /// Channels of the voxel at `p` (dense coordinates), or `None` for voxels in
    /// inactive tiles.
    #[must_use]
    pub fn voxel(&self, p: UVec3) -> Option<&[T]> {
        let grid = tile_grid(self.dense_dims);
        let tile = p / TILE_SIZE;
        let entry = self.index[voxel_offset(grid, tile)];
        if entry < 0 {
            return None;
        }
        let local = p - tile * TILE_SIZE;

        let offset = match self.layout {
            SparseLayout::Linear => {
                let ext = tile_extent(self.dense_dims, tile);
                entry as usize + voxel_offset(ext, local)
            }
            SparseLayout::Padded => {
                let q = UVec3::new(entry as u32 * PADDED_TILE, 0, 0) + local + UVec3::ONE;
                voxel_offset(self.alloc_dims, q)
            }
        };
        let start = offset * self.channels;
        Some(&self.voxels[start..start + self.channels])
    }

    /// Index table size in bytes.
    #[must_use]
    pub fn index_bytes(&self) -> usize {
        self.index.len() * size_of::<i32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume_with_blob(dims: UVec3) -> Vec<f32> {
        let mut v = vec![0.0; voxel_count(dims)];
        for z in 2..5 {
            for y in 3..6 {
                for x in 1..4 {
                    v[voxel_offset(dims, UVec3::new(x, y, z))] = (x + y + z) as f32;
                }
            }
        }
        v
    }

    #[test]
    fn linear_keeps_only_active_tiles() {
        let dims = UVec3::new(32, 16, 16);
        let dense = volume_with_blob(dims);
        let grid = compress(&dense, dims, 1, 0.0, SparseLayout::Linear).expect("compresses");

        assert_eq!(grid.index.len(), 4 * 2 * 2);
        assert_eq!(grid.index[0], 0);
        assert!(grid.index[1..].iter().all(|&i| i == -1));
        assert_eq!(grid.alloc_dims, UVec3::new(512, 1, 1));

        for z in 0..8 {
            for y in 0..8 {
                for x in 0..8 {
                    let p = UVec3::new(x, y, z);
                    let i = voxel_offset(dims, p);
                    assert_eq!(grid.voxel(p), Some(&dense[i..=i]));
                }
            }
        }
        assert_eq!(grid.voxel(UVec3::new(20, 10, 10)), None);
    }

    #[test]
    fn padded_tiles_carry_apron() {
        let dims = UVec3::new(32, 16, 16);
        let dense = volume_with_blob(dims);
        let grid = compress(&dense, dims, 1, 0.0, SparseLayout::Padded).expect("compresses");

        assert_eq!(grid.alloc_dims, UVec3::new(PADDED_TILE, PADDED_TILE, PADDED_TILE));
        let p = UVec3::new(3, 5, 4);
        let i = voxel_offset(dims, p);
        assert_eq!(grid.voxel(p), Some(&dense[i..=i]));
        // Apron voxel beyond the tile's +x face comes from the neighbor tile.
        let apron = voxel_offset(grid.alloc_dims, UVec3::new(9, 1, 1));
        assert_eq!(grid.voxels[apron], dense[voxel_offset(dims, UVec3::new(8, 0, 0))]);
    }

    #[test]
    fn voxel_offsets_do_not_wrap_past_u32() {
        let dims = UVec3::new(4096, 4096, 512);
        let last = voxel_offset(dims, dims - UVec3::ONE);
        assert_eq!(last, voxel_count(dims) - 1);
        assert!(last > u32::MAX as usize);
    }

    #[test]
    fn dense_volume_is_not_compressed() {
        let dims = UVec3::new(16, 16, 16);
        let dense = vec![1.0f32; 16 * 16 * 16];
        assert!(compress(&dense, dims, 1, 0.0, SparseLayout::Linear).is_none());
        assert!(compress(&dense, dims, 1, 0.0, SparseLayout::Padded).is_none());
    }

    #[test]
    fn isovalue_is_compared_by_magnitude() {
        let dims = UVec3::new(16, 8, 8);
        let mut dense = vec![0.0f32; 16 * 8 * 8];
        dense[0] = -0.5;
        let grid = compress(&dense, dims, 1, 0.25, SparseLayout::Linear).expect("compresses");
        assert_eq!(grid.index, vec![0, -1]);

        let none_active = compress(&dense, dims, 1, 0.5, SparseLayout::Linear).expect("compresses");
        assert_eq!(none_active.index, vec![-1, -1]);
        assert!(none_active.voxels.is_empty());
    }
}
