//! Greedy binary meshing of the occupancy bitmask
//!
//! Compresses the active voxel set into axis-aligned boxes for physics.
//! Rows are scanned as whole `u64` words, so finding runs and matching
//! rectangles across rows costs a handful of bit operations per box
//! rather than per voxel.

use crate::core::types::{IVec3, Vec3};
use crate::grid::Indexer;

/// One axis-aligned collision box in grid-local space
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CollisionBox {
    pub center: Vec3,
    pub half_extent: Vec3,
}

/// Merge the active voxels of a packed occupancy bitmask into a minimal
/// set of axis-aligned boxes.
///
/// Scans each (y, z) row, grabs the lowest run of set bits, then greedily
/// grows the run across +y and +z while the same bit pattern holds,
/// clearing consumed bits so no voxel is emitted twice. The union of the
/// returned boxes covers exactly the set bits of the input.
pub fn mesh_boxes(occupancy: &[u64], resolution: IVec3, voxel_size: f32) -> Vec<CollisionBox> {
    let indexer = Indexer::new(resolution, voxel_size);
    debug_assert_eq!(occupancy.len(), indexer.row_count());

    // Consumed bits are cleared as boxes are emitted, so work on a copy.
    let mut rows = occupancy.to_vec();
    let mut boxes = Vec::new();

    let voxel_extent = voxel_size * 0.5;

    for z in 0..resolution.z {
        for y in 0..resolution.y {
            let row = indexer.row_index(y, z);

            while rows[row] != 0 {
                let begin_x = rows[row].trailing_zeros();
                let width = (rows[row] >> begin_x).trailing_ones();
                let mask = if width == 64 {
                    u64::MAX
                } else {
                    ((1u64 << width) - 1) << begin_x
                };

                // Grow the run across +y while the next rows carry the
                // exact same span.
                let mut height: i32 = 1;
                for next_y in (y + 1)..resolution.y {
                    if rows[indexer.row_index(next_y, z)] & mask == mask {
                        height += 1;
                    } else {
                        break;
                    }
                }

                // Then grow the resulting rectangle across +z.
                let mut depth: i32 = 1;
                'depth: for next_z in (z + 1)..resolution.z {
                    for h in 0..height {
                        if rows[indexer.row_index(y + h, next_z)] & mask != mask {
                            break 'depth;
                        }
                    }
                    depth += 1;
                }

                for d in 0..depth {
                    for h in 0..height {
                        rows[indexer.row_index(y + h, z + d)] &= !mask;
                    }
                }

                let begin_center = indexer.grid_to_local(IVec3::new(begin_x as i32, y, z));
                let center_shift = Vec3::new(
                    (width as f32 - 1.0) * voxel_extent,
                    (height as f32 - 1.0) * voxel_extent,
                    (depth as f32 - 1.0) * voxel_extent,
                );

                boxes.push(CollisionBox {
                    center: begin_center + center_shift,
                    half_extent: Vec3::new(
                        width as f32 * voxel_extent,
                        height as f32 * voxel_extent,
                        depth as f32 * voxel_extent,
                    ),
                });
            }
        }
    }

    boxes
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOXEL: f32 = 10.0;

    fn empty_words(resolution: IVec3) -> Vec<u64> {
        vec![0u64; (resolution.y * resolution.z) as usize]
    }

    fn set(words: &mut [u64], resolution: IVec3, x: i32, y: i32, z: i32) {
        Indexer::new(resolution, VOXEL).set_bit(words, IVec3::new(x, y, z), true);
    }

    /// Convert emitted boxes back into an occupancy bitmask
    fn rasterize(boxes: &[CollisionBox], resolution: IVec3) -> Vec<u64> {
        let indexer = Indexer::new(resolution, VOXEL);
        let mut words = empty_words(resolution);
        for b in boxes {
            let min = b.center - b.half_extent + Vec3::splat(VOXEL * 0.5);
            let size = b.half_extent * 2.0 / VOXEL;
            let origin = indexer
                .local_to_grid(min)
                .expect("box min must land on a voxel center");
            for dz in 0..size.z.round() as i32 {
                for dy in 0..size.y.round() as i32 {
                    for dx in 0..size.x.round() as i32 {
                        let pos = origin + IVec3::new(dx, dy, dz);
                        assert!(
                            !indexer.is_bit_set(&words, pos),
                            "boxes overlap at {pos}"
                        );
                        indexer.set_bit(&mut words, pos, true);
                    }
                }
            }
        }
        words
    }

    #[test]
    fn test_empty_grid_emits_nothing() {
        let resolution = IVec3::splat(7);
        assert!(mesh_boxes(&empty_words(resolution), resolution, VOXEL).is_empty());
    }

    #[test]
    fn test_single_voxel_single_box() {
        let resolution = IVec3::splat(3);
        let mut words = empty_words(resolution);
        set(&mut words, resolution, 1, 1, 1);

        let boxes = mesh_boxes(&words, resolution, VOXEL);
        assert_eq!(boxes.len(), 1);
        // Center cell sits at the local origin.
        assert_eq!(boxes[0].center, Vec3::ZERO);
        assert_eq!(boxes[0].half_extent, Vec3::splat(VOXEL * 0.5));
    }

    #[test]
    fn test_filled_cube_merges_to_one_box() {
        let resolution = IVec3::splat(7);
        let mut words = empty_words(resolution);
        for z in 1..5 {
            for y in 1..5 {
                for x in 1..5 {
                    set(&mut words, resolution, x, y, z);
                }
            }
        }

        let boxes = mesh_boxes(&words, resolution, VOXEL);
        assert_eq!(boxes.len(), 1, "a filled 4x4x4 block should merge fully");
        assert_eq!(boxes[0].half_extent, Vec3::splat(2.0 * VOXEL));
    }

    #[test]
    fn test_row_run_merges_along_x() {
        let resolution = IVec3::new(9, 3, 3);
        let mut words = empty_words(resolution);
        for x in 2..7 {
            set(&mut words, resolution, x, 0, 0);
        }

        let boxes = mesh_boxes(&words, resolution, VOXEL);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].half_extent.x, 2.5 * VOXEL);
    }

    #[test]
    fn test_l_shape_round_trip() {
        let resolution = IVec3::new(5, 5, 3);
        let mut words = empty_words(resolution);
        for x in 0..4 {
            set(&mut words, resolution, x, 0, 0);
        }
        for y in 0..4 {
            set(&mut words, resolution, 0, y, 0);
        }

        let boxes = mesh_boxes(&words, resolution, VOXEL);
        assert_eq!(rasterize(&boxes, resolution), words);
    }

    #[test]
    fn test_widest_row_is_handled() {
        // Resolution 63 is the widest packable row; the full-width run
        // exercises the shifted-word edge cases.
        let resolution = IVec3::new(63, 3, 3);
        let mut words = empty_words(resolution);
        for x in 0..63 {
            set(&mut words, resolution, x, 1, 1);
        }

        let boxes = mesh_boxes(&words, resolution, VOXEL);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].half_extent.x, 31.5 * VOXEL);
        assert_eq!(rasterize(&boxes, resolution), words);
    }

    #[test]
    fn test_scattered_pattern_round_trip() {
        let resolution = IVec3::new(11, 9, 7);
        let mut words = empty_words(resolution);
        // Deterministic pseudo-random scatter.
        let mut h: u32 = 0x9e37_79b9;
        for z in 0..7 {
            for y in 0..9 {
                for x in 0..11 {
                    h ^= h << 13;
                    h ^= h >> 17;
                    h ^= h << 5;
                    if h & 3 == 0 {
                        set(&mut words, resolution, x, y, z);
                    }
                }
            }
        }

        let boxes = mesh_boxes(&words, resolution, VOXEL);
        assert_eq!(rasterize(&boxes, resolution), words);
    }
}
