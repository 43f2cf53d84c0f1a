//! Voxel grid data model: coordinate math and per-cell buffers

pub mod indexer;
pub mod voxel_grid;

pub use indexer::Indexer;
pub use voxel_grid::{GridSnapshot, VoxelGrid};
