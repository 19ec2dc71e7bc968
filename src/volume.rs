//! Volume grid files.
//!
//! `.vdb` requests are resolved through a [`VolumeReader`] supplied by the host. No
//! reader ships with the crate; without one such requests load as the missing marker.

use std::path::Path;

use glam::UVec3;

/// Dense voxel data of one grid.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeData {
    pub resolution: UVec3,
    /// Interleaved `resolution.x * resolution.y * resolution.z * channels` values, x
    /// fastest.
    pub voxels: Vec<f32>,
}

/// Grid names whose voxels hold vectors or colors rather than scalars.
pub const VECTOR_GRIDS: [&str; 2] = ["color", "velocity"];

/// Channel count a grid is stored with.
#[must_use]
pub fn grid_channels(grid_name: &str) -> u32 {
    if VECTOR_GRIDS.contains(&grid_name) { 4 } else { 1 }
}

/// Reader for volumetric grid files.
pub trait VolumeReader: Send + Sync {
    /// Resolution of `grid_name` in the file at `path`, or `None` if the file or grid
    /// does not exist.
    fn probe(&self, path: &Path, grid_name: &str) -> Option<UVec3>;

    /// Reads `grid_name` as `channels`-wide float voxels.
    fn read(&self, path: &Path, grid_name: &str, channels: u32) -> Option<VolumeData>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_grids_are_four_channel() {
        assert_eq!(grid_channels("color"), 4);
        assert_eq!(grid_channels("velocity"), 4);
        assert_eq!(grid_channels("density"), 1);
    }
}
