//! Flood-fill smoke simulation: configuration, state machine, and the
//! deterministic growth/decay algorithms

pub mod config;
pub mod curve;
pub mod node;
pub mod rng;
pub mod scheduler;
pub mod state;

pub use config::SmokeConfig;
pub use curve::Curve;
pub use node::VoxelNode;
pub use rng::RandStream;
pub use scheduler::{NoObstacles, ObstacleQuery, Role, SmokeSim};
pub use state::{Phase, ServerState};
