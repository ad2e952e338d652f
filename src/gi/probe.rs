//! Ambient-cube probe storage.
//!
//! Probes live in two flat 3-D lattices (near and far). Worker threads bake
//! disjoint column groups concurrently while the iterate pass also reads
//! neighbouring probes for its feedback term, so every cube word is an
//! atomic and all accesses are relaxed; cross-pass ordering comes from the
//! task fences, never from the cells themselves.

use std::sync::atomic::{AtomicU32, Ordering};

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::gi::packing::pack_rgb10a2;
use crate::render::uniforms::{
    CUBE_OFFSET, CUBE_OFFSET_FAR, CUBE_SIZE_XY, CUBE_SIZE_Z, CUBE_UNIT, CUBE_UNIT_FAR,
};

/// Probe face order: +Z, -Z, +Y, -Y, +X, -X.
pub const FACE_DIRS: [Vec3; 6] = [
    Vec3::Z,
    Vec3::NEG_Z,
    Vec3::Y,
    Vec3::NEG_Y,
    Vec3::X,
    Vec3::NEG_X,
];

/// A radiance probe at one lattice point, laid out for direct upload.
///
/// Each face stores three packed 10-10-10-2 words: the indirect bounce
/// colour, the direct/occluder-distance term and the sky-only colour. The
/// info word is `[active, material_id, iteration, blurred]`.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct AmbientCube {
    pub bounce: [u32; 6],
    pub direct: [u32; 6],
    pub sky: [u32; 6],
    pub info: [u32; 4],
    pub _pad: [u32; 2],
}

/// Word indices inside one atomic cell.
const WORDS_PER_CUBE: usize = 22;
const BOUNCE_BASE: usize = 0;
const DIRECT_BASE: usize = 6;
const SKY_BASE: usize = 12;
const INFO_BASE: usize = 18;

/// Info-word slots.
pub const INFO_ACTIVE: usize = 0;
pub const INFO_MATERIAL: usize = 1;
pub const INFO_ITERATION: usize = 2;
pub const INFO_BLURRED: usize = 3;

/// Geometry of one probe lattice.
#[derive(Clone, Copy, Debug)]
pub struct GridConfig {
    pub size_xy: usize,
    pub size_z: usize,
    pub unit: f32,
    pub offset: Vec3,
}

impl GridConfig {
    /// The near grid covering the playable area at 0.25 units.
    #[must_use]
    pub fn near() -> Self {
        Self {
            size_xy: CUBE_SIZE_XY,
            size_z: CUBE_SIZE_Z,
            unit: CUBE_UNIT,
            offset: Vec3::from(CUBE_OFFSET),
        }
    }

    /// The far grid at 1-unit cells.
    #[must_use]
    pub fn far() -> Self {
        Self {
            size_xy: CUBE_SIZE_XY,
            size_z: CUBE_SIZE_Z,
            unit: CUBE_UNIT_FAR,
            offset: Vec3::from(CUBE_OFFSET_FAR),
        }
    }

    #[must_use]
    pub fn cube_count(&self) -> usize {
        self.size_xy * self.size_xy * self.size_z
    }

    #[must_use]
    pub fn contains(&self, x: i32, y: i32, z: i32) -> bool {
        x >= 0
            && z >= 0
            && y >= 0
            && (x as usize) < self.size_xy
            && (y as usize) < self.size_z
            && (z as usize) < self.size_xy
    }

    /// Flat index: `y * XY^2 + z * XY + x`.
    #[must_use]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        y * self.size_xy * self.size_xy + z * self.size_xy + x
    }

    /// World position of the probe at `(x, y, z)`.
    #[must_use]
    pub fn probe_position(&self, x: usize, y: usize, z: usize) -> Vec3 {
        Vec3::new(x as f32, y as f32, z as f32) * self.unit + self.offset
    }
}

struct AtomicCube {
    words: [AtomicU32; WORDS_PER_CUBE],
}

impl AtomicCube {
    fn new() -> Self {
        Self {
            words: std::array::from_fn(|_| AtomicU32::new(0)),
        }
    }
}

/// One probe lattice with interior-mutable cells, shared between the main
/// thread and bake workers behind an `Arc`.
pub struct CubeGrid {
    config: GridConfig,
    cells: Vec<AtomicCube>,
}

impl CubeGrid {
    #[must_use]
    pub fn new(config: GridConfig) -> Self {
        let cells = (0..config.cube_count()).map(|_| AtomicCube::new()).collect();
        let grid = Self { config, cells };
        grid.clear();
        grid
    }

    #[must_use]
    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Resets every cube to active with black faces.
    pub fn clear(&self) {
        let black = pack_rgb10a2(glam::Vec4::new(0.0, 0.0, 0.0, 1.0));
        for cell in &self.cells {
            for w in 0..INFO_BASE {
                cell.words[w].store(black, Ordering::Relaxed);
            }
            cell.words[INFO_BASE + INFO_ACTIVE].store(1, Ordering::Relaxed);
            cell.words[INFO_BASE + INFO_MATERIAL].store(0, Ordering::Relaxed);
            cell.words[INFO_BASE + INFO_ITERATION].store(0, Ordering::Relaxed);
            cell.words[INFO_BASE + INFO_BLURRED].store(0, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn bounce(&self, idx: usize, face: usize) -> u32 {
        self.cells[idx].words[BOUNCE_BASE + face].load(Ordering::Relaxed)
    }

    pub fn set_bounce(&self, idx: usize, face: usize, value: u32) {
        self.cells[idx].words[BOUNCE_BASE + face].store(value, Ordering::Relaxed);
    }

    #[must_use]
    pub fn direct(&self, idx: usize, face: usize) -> u32 {
        self.cells[idx].words[DIRECT_BASE + face].load(Ordering::Relaxed)
    }

    pub fn set_direct(&self, idx: usize, face: usize, value: u32) {
        self.cells[idx].words[DIRECT_BASE + face].store(value, Ordering::Relaxed);
    }

    #[must_use]
    pub fn sky(&self, idx: usize, face: usize) -> u32 {
        self.cells[idx].words[SKY_BASE + face].load(Ordering::Relaxed)
    }

    pub fn set_sky(&self, idx: usize, face: usize, value: u32) {
        self.cells[idx].words[SKY_BASE + face].store(value, Ordering::Relaxed);
    }

    #[must_use]
    pub fn info(&self, idx: usize, slot: usize) -> u32 {
        self.cells[idx].words[INFO_BASE + slot].load(Ordering::Relaxed)
    }

    pub fn set_info(&self, idx: usize, slot: usize, value: u32) {
        self.cells[idx].words[INFO_BASE + slot].store(value, Ordering::Relaxed);
    }

    /// Copies one whole cube out of the lattice.
    #[must_use]
    pub fn load(&self, idx: usize) -> AmbientCube {
        let cell = &self.cells[idx];
        let mut cube = AmbientCube::zeroed();
        for f in 0..6 {
            cube.bounce[f] = cell.words[BOUNCE_BASE + f].load(Ordering::Relaxed);
            cube.direct[f] = cell.words[DIRECT_BASE + f].load(Ordering::Relaxed);
            cube.sky[f] = cell.words[SKY_BASE + f].load(Ordering::Relaxed);
        }
        for i in 0..4 {
            cube.info[i] = cell.words[INFO_BASE + i].load(Ordering::Relaxed);
        }
        cube
    }

    pub fn store(&self, idx: usize, cube: &AmbientCube) {
        let cell = &self.cells[idx];
        for f in 0..6 {
            cell.words[BOUNCE_BASE + f].store(cube.bounce[f], Ordering::Relaxed);
            cell.words[DIRECT_BASE + f].store(cube.direct[f], Ordering::Relaxed);
            cell.words[SKY_BASE + f].store(cube.sky[f], Ordering::Relaxed);
        }
        for i in 0..4 {
            cell.words[INFO_BASE + i].store(cube.info[i], Ordering::Relaxed);
        }
    }

    /// Snapshots the whole lattice into an upload-ready array.
    #[must_use]
    pub fn snapshot(&self) -> Vec<AmbientCube> {
        (0..self.cells.len()).map(|i| self.load(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> GridConfig {
        GridConfig {
            size_xy: 8,
            size_z: 4,
            unit: 0.25,
            offset: Vec3::new(-1.0, -0.375, -1.0),
        }
    }

    #[test]
    fn flat_index_matches_layout() {
        let config = small();
        assert_eq!(config.index(0, 0, 0), 0);
        assert_eq!(config.index(1, 0, 0), 1);
        assert_eq!(config.index(0, 0, 1), 8);
        assert_eq!(config.index(0, 1, 0), 64);
        assert_eq!(config.cube_count(), 256);
    }

    #[test]
    fn cube_round_trip_through_grid() {
        let grid = CubeGrid::new(small());
        let mut cube = AmbientCube::zeroed();
        cube.bounce[2] = 0xdead;
        cube.info[INFO_ACTIVE] = 1;
        cube.info[INFO_ITERATION] = 7;
        grid.store(3, &cube);
        assert_eq!(grid.load(3), cube);
    }

    #[test]
    fn ambient_cube_is_pod_and_aligned() {
        assert_eq!(std::mem::size_of::<AmbientCube>(), 96);
        assert_eq!(std::mem::align_of::<AmbientCube>(), 16);
    }
}
