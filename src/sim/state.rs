//! Replicated simulation state
//!
//! This is the entire network surface of the simulation: one small struct,
//! written only by the authority and shipped to followers over whatever
//! reliable ordered channel the host provides. Followers reconstruct the
//! full voxel field from it deterministically.

use serde::{Deserialize, Serialize};

/// Phase of the smoke simulation lifecycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Simulation is inactive
    #[default]
    Idle,

    /// Smoke is spreading via flood fill
    Expansion,

    /// Smoke holds its shape
    Sustain,

    /// Voxels are being removed
    Dissipation,

    /// Simulation has ended
    Finished,
}

impl Phase {
    /// True while there is (or may be) smoke worth rendering
    pub fn is_renderable(self) -> bool {
        matches!(self, Phase::Expansion | Phase::Sustain | Phase::Dissipation)
    }
}

/// Authoritative simulation state replicated to followers.
///
/// `generation` increments exactly once per full reset; a follower whose
/// last-applied generation differs must fast-forward instead of applying an
/// incremental phase transition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerState {
    pub phase: Phase,

    /// Server time at which expansion began
    pub expansion_start: f32,

    /// Server time at which sustain began
    pub sustain_start: f32,

    /// Server time at which dissipation began
    pub dissipation_start: f32,

    /// Seed shared by every peer's random stream
    pub random_seed: i32,

    /// Reset marker; wraps on overflow
    pub generation: u8,
}
