//! Per-cell simulation buffers
//!
//! Owns everything the flood fill writes per voxel: the packed occupancy
//! words, birth/death timestamps, the cost field, spawn order, and the
//! running world-space bounds. Allocation happens once per resolution;
//! every phase reset just rewrites the buffers in place.

use crate::core::error::Error;
use crate::core::types::{IVec3, Result, Vec3};
use crate::math::Aabb;

use super::Indexer;

/// Birth/death stamps are clamped away from zero so that zero can keep
/// meaning "never born" / "still alive".
const MIN_TIMESTAMP: f32 = 0.001;

/// Read-only view of the grid published to the renderer
#[derive(Clone, Copy, Debug)]
pub struct GridSnapshot<'a> {
    /// Packed occupancy, one `u64` word per (y, z) row
    pub occupancy: &'a [u64],
    /// Server-clock timestamp each voxel became active (0 = never born)
    pub birth_times: &'a [f32],
    /// Server-clock timestamp each voxel was removed (0 = alive or never born)
    pub death_times: &'a [f32],
    pub resolution: IVec3,
    pub voxel_size: f32,
    pub active_count: u32,
    /// World bounds of every voxel ever activated, grown by one voxel size
    pub world_bounds: Option<Aabb>,
}

/// The voxel grid and its per-cell buffers
pub struct VoxelGrid {
    indexer: Indexer,
    occupancy: Vec<u64>,
    birth_times: Vec<f32>,
    death_times: Vec<f32>,
    costs: Vec<f32>,
    /// Linear indices in the order voxels were born this generation
    spawn_order: Vec<u32>,
    active_count: u32,
    world_bounds: Option<Aabb>,
    dirty: bool,
}

impl VoxelGrid {
    /// Allocate buffers for a grid with the given half-extent per axis.
    ///
    /// Resolution per axis is `2 * extent - 1`. Fails fast when any axis
    /// resolution would reach 64 (the occupancy packing stores the X axis
    /// as bit indices of a single `u64`) or when the voxel size is not
    /// positive. These are configuration errors, not runtime conditions.
    pub fn new(extent: IVec3, voxel_size: f32) -> Result<Self> {
        if extent.cmplt(IVec3::ONE).any() {
            return Err(Error::Config(format!(
                "grid extent must be at least 1 per axis, got {extent}"
            )));
        }
        let resolution = extent * 2 - IVec3::ONE;
        if resolution.cmpge(IVec3::splat(64)).any() {
            return Err(Error::Config(format!(
                "grid resolution {resolution} exceeds the 64-per-axis packing limit"
            )));
        }
        if voxel_size <= 0.0 {
            return Err(Error::Config(format!(
                "voxel size must be positive, got {voxel_size}"
            )));
        }

        let indexer = Indexer::new(resolution, voxel_size);
        let cells = indexer.cell_count();
        let rows = indexer.row_count();

        Ok(Self {
            indexer,
            occupancy: vec![0; rows],
            birth_times: vec![0.0; cells],
            death_times: vec![0.0; cells],
            costs: vec![f32::INFINITY; cells],
            spawn_order: Vec::new(),
            active_count: 0,
            world_bounds: None,
            dirty: false,
        })
    }

    /// Reset every buffer to its pre-simulation state
    pub fn clear(&mut self) {
        self.occupancy.fill(0);
        self.birth_times.fill(0.0);
        self.death_times.fill(0.0);
        self.costs.fill(f32::INFINITY);
        self.spawn_order.clear();
        self.active_count = 0;
        self.world_bounds = None;
        self.dirty = true;
    }

    /// Coordinate converter for this grid
    pub fn indexer(&self) -> Indexer {
        self.indexer
    }

    /// Number of currently active voxels
    pub fn active_count(&self) -> u32 {
        self.active_count
    }

    /// Flood-fill cost of a cell (`+inf` until visited)
    pub fn cost(&self, index: usize) -> f32 {
        self.costs[index]
    }

    pub fn set_cost(&mut self, index: usize, cost: f32) {
        self.costs[index] = cost;
    }

    /// True if the voxel at the linear index is active
    pub fn is_active(&self, index: usize) -> bool {
        self.is_active_grid(self.indexer.index_to_grid(index))
    }

    /// True if the voxel at the grid coordinate is active
    pub fn is_active_grid(&self, grid_pos: IVec3) -> bool {
        self.indexer.is_bit_set(&self.occupancy, grid_pos)
    }

    /// Activate a voxel.
    ///
    /// A voxel is born at most once per generation: if a birth stamp is
    /// already present the call is ignored. `world_pos` feeds the running
    /// world bounds.
    pub fn set_birth_time(&mut self, index: usize, birth_time: f32, world_pos: Vec3) {
        let Some(slot) = self.birth_times.get_mut(index) else {
            return;
        };
        if *slot > 0.0 {
            return;
        }

        *slot = birth_time.max(MIN_TIMESTAMP);
        self.death_times[index] = 0.0;

        let grid_pos = self.indexer.index_to_grid(index);
        self.indexer.set_bit(&mut self.occupancy, grid_pos, true);

        self.spawn_order.push(index as u32);
        self.active_count += 1;
        self.dirty = true;

        match &mut self.world_bounds {
            Some(bounds) => bounds.expand(world_pos),
            None => self.world_bounds = Some(Aabb::from_point(world_pos)),
        }
    }

    /// Deactivate a voxel.
    ///
    /// Ignored if the voxel already carries a death stamp.
    pub fn set_death_time(&mut self, index: usize, death_time: f32) {
        let Some(slot) = self.death_times.get_mut(index) else {
            return;
        };
        if *slot > 0.0 {
            return;
        }

        *slot = death_time.max(MIN_TIMESTAMP);

        let grid_pos = self.indexer.index_to_grid(index);
        self.indexer.set_bit(&mut self.occupancy, grid_pos, false);

        self.active_count = self.active_count.saturating_sub(1);
        self.dirty = true;
    }

    /// Packed occupancy words
    pub fn occupancy(&self) -> &[u64] {
        &self.occupancy
    }

    /// Occupancy words as raw bytes, for direct GPU upload
    pub fn occupancy_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.occupancy)
    }

    pub fn birth_times(&self) -> &[f32] {
        &self.birth_times
    }

    pub fn death_times(&self) -> &[f32] {
        &self.death_times
    }

    /// Linear indices in birth order for the current generation
    pub fn spawn_order(&self) -> &[u32] {
        &self.spawn_order
    }

    /// World bounds of every voxel ever activated this generation, grown by
    /// one voxel size. `None` until the first voxel is born.
    pub fn world_bounds(&self) -> Option<Aabb> {
        self.world_bounds
            .map(|bounds| bounds.expanded(self.indexer.voxel_size()))
    }

    /// True when voxel data changed since the last `mark_clean`
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Acknowledge the current state, typically after a renderer upload
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Read-only view for the renderer
    pub fn snapshot(&self) -> GridSnapshot<'_> {
        GridSnapshot {
            occupancy: &self.occupancy,
            birth_times: &self.birth_times,
            death_times: &self.death_times,
            resolution: self.indexer.resolution(),
            voxel_size: self.indexer.voxel_size(),
            active_count: self.active_count,
            world_bounds: self.world_bounds(),
        }
    }
}
