//! Flood-fill scheduler and phase state machine
//!
//! `SmokeSim` runs the deterministic growth/decay simulation for one smoke
//! volume. The authority instance drives phase transitions and owns the
//! replicated `ServerState`; follower instances run the exact same
//! algorithms from the replicated seed and timestamps, so no per-voxel
//! data ever needs to be sent.
//!
//! Both flood fills are Dijkstra-style passes over priority queues without
//! decrease-key: cells are re-pushed when their cost improves and stale
//! entries are skipped on pop.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::collision::{CollisionUpdater, PhysicsBody};
use crate::core::types::{IVec3, Mat4, Result, Vec3};
use crate::grid::{GridSnapshot, VoxelGrid};

use super::config::SmokeConfig;
use super::curve::{decay_fraction, growth_fraction};
use super::node::VoxelNode;
use super::rng::RandStream;
use super::state::{Phase, ServerState};

/// Face-neighbor offsets, in relaxation order.
///
/// The order is part of the determinism contract: noise is drawn per
/// relaxed neighbor, so every peer must walk neighbors identically.
const FLOOD_DIRECTIONS: [IVec3; 6] = [
    IVec3::X,
    IVec3::NEG_X,
    IVec3::Y,
    IVec3::NEG_Y,
    IVec3::Z,
    IVec3::NEG_Z,
];

/// Line-of-sight test against scene geometry.
///
/// Queried between the world-space centers of two adjacent cells while the
/// wavefront expands. Implementations must be side-effect-free and safe to
/// call at arbitrary tick cadence. A trace that cannot be evaluated should
/// report `false` (not blocked): growth continuity is preferred over strict
/// obstacle fidelity.
pub trait ObstacleQuery {
    fn is_blocked(&self, world_a: Vec3, world_b: Vec3) -> bool;
}

/// Obstacle query for empty scenes; nothing ever blocks.
pub struct NoObstacles;

impl ObstacleQuery for NoObstacles {
    fn is_blocked(&self, _world_a: Vec3, _world_b: Vec3) -> bool {
        false
    }
}

/// Which side of the replication contract this instance sits on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Owns and mutates `ServerState`, drives automatic phase transitions
    Authority,
    /// Adopts phases from replicated `ServerState`
    Follower,
}

/// Deterministic smoke simulation for a single volume.
///
/// Call `tick` once per simulation step with the synchronized time. The
/// authority additionally calls `start` / `stop` / `reset`; followers feed
/// replicated state through `apply_server_state`.
pub struct SmokeSim {
    config: SmokeConfig,
    grid: VoxelGrid,
    transform: Mat4,
    role: Role,

    server_state: ServerState,
    local_phase: Phase,
    local_generation: u8,

    rng: RandStream,
    /// Seconds into the current phase as of the last update
    sim_time: f32,
    fast_forwarding: bool,

    expansion_heap: BinaryHeap<Reverse<VoxelNode>>,
    dissipation_heap: BinaryHeap<Reverse<VoxelNode>>,

    collision: CollisionUpdater,
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

impl SmokeSim {
    /// Create a simulation from a validated configuration
    pub fn new(config: SmokeConfig, role: Role) -> Result<Self> {
        config.validate()?;

        let mut grid = VoxelGrid::new(config.extent, config.voxel_size)?;
        grid.clear();

        let collision =
            CollisionUpdater::new(config.min_rebuild_interval, config.min_rebuild_voxel_delta);
        let capacity = config.max_voxels as usize;

        Ok(Self {
            config,
            grid,
            transform: Mat4::IDENTITY,
            role,
            server_state: ServerState::default(),
            local_phase: Phase::Idle,
            local_generation: 0,
            rng: RandStream::new(0),
            sim_time: 0.0,
            fast_forwarding: false,
            expansion_heap: BinaryHeap::with_capacity(capacity),
            dissipation_heap: BinaryHeap::with_capacity(capacity),
            collision,
        })
    }

    /// Place the volume in the world (grid-local to world-space)
    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    //~========================================================================
    // Authority controls

    /// Begin a new simulation run. Authority only.
    ///
    /// Resets any previous run (bumping the generation counter) and enters
    /// Expansion with the given seed at the given server time.
    pub fn start(&mut self, now: f32, seed: i32, body: &mut dyn PhysicsBody) {
        if self.role != Role::Authority {
            log::warn!("start ignored: only the authority may drive the simulation");
            return;
        }

        self.reset(body);

        self.server_state.random_seed = seed;
        self.server_state.expansion_start = now;
        self.server_state.sustain_start = 0.0;
        self.server_state.dissipation_start = 0.0;
        self.server_state.phase = Phase::Expansion;

        log::info!(
            "smoke simulation started: seed {seed}, generation {}",
            self.server_state.generation
        );

        self.handle_transition(Phase::Expansion, now, body);
    }

    /// End the run. Authority only.
    ///
    /// A graceful stop moves Expansion/Sustain into Dissipation so the
    /// smoke fades out; an immediate stop jumps straight to Finished and
    /// clears everything.
    pub fn stop(&mut self, now: f32, immediate: bool, body: &mut dyn PhysicsBody) {
        if self.role != Role::Authority {
            log::warn!("stop ignored: only the authority may drive the simulation");
            return;
        }
        if self.server_state.phase == Phase::Finished {
            return;
        }

        if immediate {
            self.server_state.phase = Phase::Finished;
        } else if matches!(self.server_state.phase, Phase::Expansion | Phase::Sustain) {
            self.server_state.phase = Phase::Dissipation;
            self.server_state.dissipation_start = now;
        }

        self.handle_transition(self.server_state.phase, now, body);
    }

    /// Return to Idle and clear all voxel data. Authority only.
    ///
    /// Increments the generation counter, which forces every follower to
    /// resynchronize from scratch.
    pub fn reset(&mut self, body: &mut dyn PhysicsBody) {
        if self.role != Role::Authority {
            log::warn!("reset ignored: only the authority may drive the simulation");
            return;
        }

        self.server_state.phase = Phase::Idle;
        self.server_state.generation = self.server_state.generation.wrapping_add(1);
        self.server_state.expansion_start = 0.0;
        self.server_state.sustain_start = 0.0;
        self.server_state.dissipation_start = 0.0;

        // handle_transition(Idle) would be skipped if the local phase is
        // already Idle; a reset must always clear, so clear directly.
        self.clear_simulation(body);
        self.local_phase = Phase::Idle;
        self.local_generation = self.server_state.generation;

        log::debug!("simulation reset, generation {}", self.server_state.generation);
    }

    //~========================================================================
    // Per-tick update

    /// Advance the simulation to the synchronized time `now`
    pub fn tick(&mut self, now: f32, obstacles: &dyn ObstacleQuery, body: &mut dyn PhysicsBody) {
        match self.server_state.phase {
            Phase::Expansion => self.update_expansion(now, obstacles, body),
            Phase::Sustain => self.update_sustain(now, body),
            Phase::Dissipation => self.update_dissipation(now, body),
            Phase::Idle | Phase::Finished => {}
        }

        self.try_update_collision(body, now, false);
    }

    fn update_expansion(&mut self, now: f32, obstacles: &dyn ObstacleQuery, body: &mut dyn PhysicsBody) {
        let elapsed = now - self.server_state.expansion_start;

        let start_t = self.sim_time;
        let mut end_t = elapsed;
        self.sim_time = elapsed;

        let target: u32;
        if elapsed < self.config.expansion_duration {
            let fraction = growth_fraction(
                elapsed,
                self.config.expansion_duration,
                self.config.expansion_curve.as_ref(),
            );
            target = (self.config.max_voxels as f32 * fraction).floor() as u32;
        } else {
            end_t = self.config.expansion_duration;
            target = self.config.max_voxels;
        }

        let spawn_budget = target.saturating_sub(self.grid.active_count());
        if !self.expansion_heap.is_empty() && spawn_budget > 0 {
            self.process_expansion(spawn_budget, start_t, end_t, obstacles);
        }

        if elapsed >= self.config.expansion_duration + self.config.fade_in_duration
            && self.role == Role::Authority
        {
            self.server_state.phase = Phase::Sustain;
            self.server_state.sustain_start = now;
            self.handle_transition(Phase::Sustain, now, body);
        }
    }

    fn update_sustain(&mut self, now: f32, body: &mut dyn PhysicsBody) {
        let elapsed = now - self.server_state.sustain_start;
        self.sim_time = elapsed;

        if !self.config.infinite_sustain
            && elapsed >= self.config.sustain_duration
            && self.role == Role::Authority
        {
            self.server_state.phase = Phase::Dissipation;
            self.server_state.dissipation_start = now;
            self.handle_transition(Phase::Dissipation, now, body);
        }
    }

    fn update_dissipation(&mut self, now: f32, body: &mut dyn PhysicsBody) {
        let elapsed = now - self.server_state.dissipation_start;

        let start_t = self.sim_time;
        let mut end_t = elapsed;
        self.sim_time = elapsed;

        let spawned_total = self.grid.spawn_order().len() as u32;
        let target_alive: u32;
        if elapsed < self.config.dissipation_duration {
            let fraction = decay_fraction(
                elapsed,
                self.config.dissipation_duration,
                self.config.dissipation_curve.as_ref(),
            );
            target_alive = (spawned_total as f32 * fraction).floor() as u32;
        } else {
            end_t = self.config.dissipation_duration;
            target_alive = 0;
        }

        let remove_budget = (self.dissipation_heap.len() as u32).saturating_sub(target_alive);
        if remove_budget > 0 {
            self.process_dissipation(remove_budget, start_t, end_t);
        }

        if elapsed >= self.config.dissipation_duration + self.config.fade_out_duration {
            self.sim_time = 0.0;

            self.try_update_collision(body, now, true);

            if self.role == Role::Authority {
                self.server_state.phase = Phase::Finished;
                self.handle_transition(Phase::Finished, now, body);
            }
        }
    }

    /// Pop cells off the expansion heap and give birth to voxels.
    ///
    /// Birth times are interpolated across the tick's time window by spawn
    /// order so fade-in stays smooth no matter how many voxels one tick
    /// produces.
    fn process_expansion(
        &mut self,
        spawn_budget: u32,
        start_t: f32,
        end_t: f32,
        obstacles: &dyn ObstacleQuery,
    ) {
        if spawn_budget == 0 {
            return;
        }

        let indexer = self.grid.indexer();
        let radii = self.config.radii.max(Vec3::splat(1.0e-4));
        let inv_radii = radii.recip();
        let voxel_size = self.config.voxel_size;
        let expansion_noise = self.config.expansion_noise;
        let dissipation_noise = self.config.dissipation_noise;
        let max_voxels = self.config.max_voxels;
        let expansion_start = self.server_state.expansion_start;
        let inv_budget = 1.0 / spawn_budget as f32;

        let mut spawned = 0u32;
        while spawned < spawn_budget {
            let Some(Reverse(node)) = self.expansion_heap.pop() else {
                break;
            };
            let index = node.index as usize;

            // Lazy deletion: skip entries superseded by a cheaper push, and
            // cells that were already born.
            if node.cost > self.grid.cost(index) {
                continue;
            }
            if self.grid.is_active(index) {
                continue;
            }

            let grid_pos = indexer.index_to_grid(index);
            let local_pos = indexer.grid_to_local(grid_pos);
            let world_pos = self.transform.transform_point3(local_pos);

            let alpha = spawned as f32 * inv_budget;
            let birth_time = expansion_start + lerp(start_t, end_t, alpha);
            self.grid.set_birth_time(index, birth_time, world_pos);
            spawned += 1;

            // Queue the voxel for dissipation with perturbed cost so decay
            // runs in a different, noisier order than growth.
            let decay_cost = self.grid.cost(index) + self.rng.range(0.0, dissipation_noise);
            self.dissipation_heap.push(Reverse(VoxelNode {
                index: node.index,
                parent: None,
                cost: decay_cost,
            }));

            if self.grid.active_count() >= max_voxels {
                return;
            }

            // The wavefront cannot cross solid geometry: when the line back
            // to the parent is blocked the voxel still exists, but it does
            // not relax its neighbors.
            if let Some(parent) = node.parent {
                let parent_grid = indexer.index_to_grid(parent as usize);
                let parent_world = self
                    .transform
                    .transform_point3(indexer.grid_to_local(parent_grid));
                if self.config.obstacle_checks && obstacles.is_blocked(world_pos, parent_world) {
                    continue;
                }
            }

            let current_dist = (local_pos * inv_radii).length();

            for dir in FLOOD_DIRECTIONS {
                let next_grid = grid_pos + dir;
                if !indexer.in_bounds(next_grid) {
                    continue;
                }
                let next_index = indexer.grid_to_index(next_grid);
                if self.grid.cost(next_index) != f32::INFINITY {
                    continue;
                }

                let next_local = indexer.grid_to_local(next_grid);
                let next_dist = (next_local * inv_radii).length();
                let delta_dist = next_dist - current_dist;

                // Moving outward pays the normalized ellipsoidal distance
                // gained; moving back inward pays a flat per-step cost
                // scaled by the crossed axis radius.
                let delta_cost = if delta_dist >= 0.0 {
                    delta_dist
                } else if dir.x != 0 {
                    voxel_size * radii.x
                } else if dir.y != 0 {
                    voxel_size * radii.y
                } else {
                    voxel_size * radii.z
                };

                let cost = node.cost + delta_cost + self.rng.range(0.0, expansion_noise);
                if cost < self.grid.cost(next_index) {
                    self.grid.set_cost(next_index, cost);
                    self.expansion_heap.push(Reverse(VoxelNode {
                        index: next_index as u32,
                        parent: Some(node.index),
                        cost,
                    }));
                }
            }
        }
    }

    /// Pop cells off the dissipation heap and stamp death times.
    ///
    /// Every voxel is pushed exactly once at birth, so pops need no
    /// staleness check.
    fn process_dissipation(&mut self, remove_budget: u32, start_t: f32, end_t: f32) {
        if remove_budget == 0 {
            return;
        }

        let dissipation_start = self.server_state.dissipation_start;
        let inv_budget = 1.0 / remove_budget as f32;

        let mut removed = 0u32;
        while removed < remove_budget {
            let Some(Reverse(node)) = self.dissipation_heap.pop() else {
                break;
            };

            let alpha = removed as f32 * inv_budget;
            let death_time = dissipation_start + lerp(start_t, end_t, alpha);
            self.grid.set_death_time(node.index as usize, death_time);
            removed += 1;
        }
    }

    //~========================================================================
    // State machine

    fn handle_transition(&mut self, new_phase: Phase, now: f32, body: &mut dyn PhysicsBody) {
        if self.local_phase == new_phase {
            return;
        }

        log::debug!("phase transition {:?} -> {:?}", self.local_phase, new_phase);
        self.sim_time = 0.0;

        match new_phase {
            Phase::Idle => self.clear_simulation(body),
            Phase::Expansion => {
                if self.local_phase != Phase::Idle && self.local_phase != Phase::Finished {
                    self.clear_simulation(body);
                }

                self.rng = RandStream::new(self.server_state.random_seed);

                let indexer = self.grid.indexer();
                let center = indexer.grid_to_index(indexer.center_offset());
                self.grid.set_cost(center, 0.0);
                self.expansion_heap.push(Reverse(VoxelNode {
                    index: center as u32,
                    parent: None,
                    cost: 0.0,
                }));
            }
            Phase::Sustain => self.try_update_collision(body, now, true),
            Phase::Dissipation => {}
            Phase::Finished => self.clear_simulation(body),
        }

        self.local_phase = new_phase;
    }

    fn clear_simulation(&mut self, body: &mut dyn PhysicsBody) {
        self.grid.clear();
        self.expansion_heap.clear();
        self.dissipation_heap.clear();
        self.sim_time = 0.0;
        self.collision.reset(body);
    }

    //~========================================================================
    // Follower reconciliation

    /// Adopt replicated authoritative state. Followers only.
    ///
    /// A generation mismatch means this follower missed a reset (late join
    /// or rejoin) and cannot transition incrementally: it fast-forwards by
    /// force-running every phase up to the authoritative one with elapsed
    /// time, then forces a single collision rebuild. Matching generations
    /// take the ordinary transition path.
    pub fn apply_server_state(
        &mut self,
        state: ServerState,
        now: f32,
        obstacles: &dyn ObstacleQuery,
        body: &mut dyn PhysicsBody,
    ) {
        if self.role == Role::Authority {
            log::debug!("apply_server_state ignored on the authority");
            return;
        }

        self.server_state = state;

        if self.local_generation != state.generation {
            log::info!(
                "generation {} -> {}: fast-forwarding to {:?}",
                self.local_generation,
                state.generation,
                state.phase
            );

            self.fast_forward(now, obstacles, body);
            self.local_generation = state.generation;

            self.try_update_collision(body, now, true);
            return;
        }

        self.handle_transition(state.phase, now, body);
    }

    /// Reconstruct the voxel field for the authoritative phase in one shot.
    ///
    /// Each phase update runs once with "time elapsed so far" instead of a
    /// tick delta, which lands on the same voxel set as a tick-by-tick
    /// replay. Collision rebuilds stay suppressed until the catch-up is
    /// complete.
    fn fast_forward(&mut self, now: f32, obstacles: &dyn ObstacleQuery, body: &mut dyn PhysicsBody) {
        self.fast_forwarding = true;

        let target = self.server_state.phase;

        if matches!(target, Phase::Expansion | Phase::Sustain | Phase::Dissipation) {
            self.handle_transition(Phase::Expansion, now, body);
            self.update_expansion(now, obstacles, body);
        }
        if matches!(target, Phase::Sustain | Phase::Dissipation) {
            self.handle_transition(Phase::Sustain, now, body);
            self.update_sustain(now, body);
        }
        if target == Phase::Dissipation {
            self.handle_transition(Phase::Dissipation, now, body);
            self.update_dissipation(now, body);
        }

        self.handle_transition(target, now, body);

        self.fast_forwarding = false;
    }

    //~========================================================================
    // Collision

    fn try_update_collision(&mut self, body: &mut dyn PhysicsBody, now: f32, force: bool) {
        // Never publish partial geometry mid-catch-up; the caller forces a
        // rebuild once fast-forwarding completes.
        if self.fast_forwarding {
            return;
        }

        let snapshot = self.grid.snapshot();
        self.collision.try_update(
            snapshot.occupancy,
            snapshot.resolution,
            snapshot.voxel_size,
            snapshot.active_count,
            now,
            force,
            body,
        );
    }

    //~========================================================================
    // Data access

    /// Current phase of the replicated state machine
    pub fn phase(&self) -> Phase {
        self.server_state.phase
    }

    /// Replicated state; the authority's host ships this to followers
    pub fn server_state(&self) -> ServerState {
        self.server_state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn config(&self) -> &SmokeConfig {
        &self.config
    }

    /// Seconds into the current phase as of the last update
    pub fn sim_time(&self) -> f32 {
        self.sim_time
    }

    pub fn active_voxel_count(&self) -> u32 {
        self.grid.active_count()
    }

    /// True while the volume has smoke worth rendering
    pub fn should_render(&self) -> bool {
        self.server_state.phase.is_renderable()
    }

    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    /// Read-only grid view for the renderer
    pub fn snapshot(&self) -> GridSnapshot<'_> {
        self.grid.snapshot()
    }

    /// True when voxel data changed since the renderer last acknowledged
    pub fn is_dirty(&self) -> bool {
        self.grid.is_dirty()
    }

    /// Acknowledge the current voxel data (renderer upload complete)
    pub fn mark_clean(&mut self) {
        self.grid.mark_clean();
    }

    /// Deterministic digest of the visible simulation state.
    ///
    /// Identical on every peer that is in sync; cheap enough to compare in
    /// a periodic desync check.
    pub fn simulation_checksum(&self) -> u32 {
        fn mix(hash: &mut u32, bytes: &[u8]) {
            for &b in bytes {
                *hash ^= b as u32;
                *hash = hash.wrapping_mul(0x0100_0193);
            }
        }

        let mut hash = 0x811c_9dc5u32;
        mix(&mut hash, &self.grid.active_count().to_le_bytes());
        mix(&mut hash, &(self.server_state.phase as u32).to_le_bytes());
        mix(&mut hash, self.grid.occupancy_bytes());
        hash
    }
}
