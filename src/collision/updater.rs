//! Throttled collision rebuilds
//!
//! Physics geometry is expensive to replace, so rebuilds are gated on a
//! minimum wall-time interval and a minimum active-voxel delta unless the
//! caller forces one (phase transitions, resets, and fast-forward
//! completion always force).

use crate::core::types::IVec3;

use super::mesher::{mesh_boxes, CollisionBox};

/// Receiver of the meshed collision geometry.
///
/// `set_boxes` replaces all previous geometry atomically; there is no
/// incremental diffing because the whole shape changes together.
pub trait PhysicsBody {
    fn set_boxes(&mut self, boxes: &[CollisionBox]);
}

/// Trivial `PhysicsBody` that keeps the latest box set.
///
/// Useful for tests and hosts that forward geometry elsewhere.
#[derive(Clone, Debug, Default)]
pub struct BoxSet {
    pub boxes: Vec<CollisionBox>,
}

impl PhysicsBody for BoxSet {
    fn set_boxes(&mut self, boxes: &[CollisionBox]) {
        self.boxes.clear();
        self.boxes.extend_from_slice(boxes);
    }
}

/// Decides when to re-mesh and republish collision geometry
#[derive(Clone, Copy, Debug)]
pub struct CollisionUpdater {
    min_interval: f32,
    min_voxel_delta: u32,
    last_rebuild_time: f32,
    last_active_count: u32,
}

impl CollisionUpdater {
    pub fn new(min_interval: f32, min_voxel_delta: u32) -> Self {
        Self {
            min_interval,
            min_voxel_delta,
            last_rebuild_time: 0.0,
            last_active_count: 0,
        }
    }

    /// Rebuild and publish collision geometry if the throttle allows it.
    ///
    /// Returns true when geometry was actually rebuilt.
    pub fn try_update(
        &mut self,
        occupancy: &[u64],
        resolution: IVec3,
        voxel_size: f32,
        active_count: u32,
        now: f32,
        force: bool,
        body: &mut dyn PhysicsBody,
    ) -> bool {
        if !force {
            if self.last_rebuild_time > 0.0 && now - self.last_rebuild_time < self.min_interval {
                return false;
            }
            if active_count.abs_diff(self.last_active_count) < self.min_voxel_delta {
                return false;
            }
        }

        let boxes = mesh_boxes(occupancy, resolution, voxel_size);
        log::trace!(
            "collision rebuild: {} voxels -> {} boxes",
            active_count,
            boxes.len()
        );
        body.set_boxes(&boxes);

        self.last_rebuild_time = now;
        self.last_active_count = active_count;
        true
    }

    /// Drop all published geometry and forget the throttle history
    pub fn reset(&mut self, body: &mut dyn PhysicsBody) {
        body.set_boxes(&[]);
        self.last_rebuild_time = 0.0;
        self.last_active_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Indexer;

    const RES: IVec3 = IVec3::new(3, 3, 3);

    fn words_with_center() -> Vec<u64> {
        let indexer = Indexer::new(RES, 10.0);
        let mut words = vec![0u64; indexer.row_count()];
        indexer.set_bit(&mut words, IVec3::ONE, true);
        words
    }

    #[test]
    fn test_first_update_with_delta_rebuilds() {
        let mut updater = CollisionUpdater::new(0.25, 1);
        let mut body = BoxSet::default();
        let words = words_with_center();

        assert!(updater.try_update(&words, RES, 10.0, 1, 1.0, false, &mut body));
        assert_eq!(body.boxes.len(), 1);
    }

    #[test]
    fn test_interval_throttle() {
        let mut updater = CollisionUpdater::new(0.25, 1);
        let mut body = BoxSet::default();
        let words = words_with_center();

        assert!(updater.try_update(&words, RES, 10.0, 1, 1.0, false, &mut body));
        // Too soon, even though the delta is large enough.
        assert!(!updater.try_update(&words, RES, 10.0, 5, 1.1, false, &mut body));
        // After the interval has passed the rebuild goes through.
        assert!(updater.try_update(&words, RES, 10.0, 5, 1.3, false, &mut body));
    }

    #[test]
    fn test_delta_throttle() {
        let mut updater = CollisionUpdater::new(0.0, 10);
        let mut body = BoxSet::default();
        let words = words_with_center();

        assert!(updater.try_update(&words, RES, 10.0, 10, 1.0, false, &mut body));
        // Only 5 voxels changed; below the delta threshold.
        assert!(!updater.try_update(&words, RES, 10.0, 15, 2.0, false, &mut body));
        assert!(updater.try_update(&words, RES, 10.0, 20, 3.0, false, &mut body));
    }

    #[test]
    fn test_force_bypasses_throttle() {
        let mut updater = CollisionUpdater::new(10.0, 1000);
        let mut body = BoxSet::default();
        let words = words_with_center();

        assert!(updater.try_update(&words, RES, 10.0, 1, 1.0, true, &mut body));
        assert!(updater.try_update(&words, RES, 10.0, 1, 1.01, true, &mut body));
    }

    #[test]
    fn test_reset_publishes_empty() {
        let mut updater = CollisionUpdater::new(0.25, 1);
        let mut body = BoxSet::default();
        let words = words_with_center();

        updater.try_update(&words, RES, 10.0, 1, 1.0, false, &mut body);
        assert!(!body.boxes.is_empty());

        updater.reset(&mut body);
        assert!(body.boxes.is_empty());
    }
}
