//! Smoke simulation configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::{IVec3, Result, Vec3};

use super::curve::Curve;

/// All tunable parameters of one smoke volume.
///
/// Identical configuration on every peer is part of the determinism
/// contract; only the seed and timestamps travel over the network.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SmokeConfig {
    /// Half-size of the voxel grid in cells per axis; resolution is
    /// `2 * extent - 1`. Memory grows with the cube of this value.
    pub extent: IVec3,

    /// Relative expansion aspect ratio per axis. `(1, 1, 1)` grows a
    /// sphere; `(2, 1, 1)` an ellipsoid stretched along X.
    pub radii: Vec3,

    /// World-space edge length of a single voxel
    pub voxel_size: f32,

    /// Hard cap on simultaneously active voxels
    pub max_voxels: u32,

    /// Seconds of active voxel spawning
    pub expansion_duration: f32,

    /// Seconds the shape is held after expansion (ignored when
    /// `infinite_sustain` is set)
    pub sustain_duration: f32,

    /// Seconds of active voxel removal
    pub dissipation_duration: f32,

    /// Extra seconds tacked onto expansion for visual fade-in
    pub fade_in_duration: f32,

    /// Extra seconds tacked onto dissipation for visual fade-out
    pub fade_out_duration: f32,

    /// Randomness added to flood-fill costs; larger values grow more
    /// jagged, irregular shapes
    pub expansion_noise: f32,

    /// Randomness added to the removal order; larger values make the smoke
    /// break apart less uniformly
    pub dissipation_noise: f32,

    /// Spawn-rate curve over normalized expansion time (linear without)
    pub expansion_curve: Option<Curve>,

    /// Survival curve over normalized dissipation time, decreasing from
    /// 1 to 0 (linear ramp-down without)
    pub dissipation_curve: Option<Curve>,

    /// Hold the sustain phase forever
    pub infinite_sustain: bool,

    /// Consult the obstacle query before letting the wavefront cross
    /// between cells. Disabling lets smoke pass through walls and skips
    /// the trace cost entirely.
    pub obstacle_checks: bool,

    /// Minimum seconds between collision rebuilds
    pub min_rebuild_interval: f32,

    /// Minimum active-voxel change to justify a collision rebuild
    pub min_rebuild_voxel_delta: u32,
}

impl Default for SmokeConfig {
    fn default() -> Self {
        Self {
            extent: IVec3::splat(16),
            radii: Vec3::ONE,
            voxel_size: 50.0,
            max_voxels: 1000,
            expansion_duration: 3.0,
            sustain_duration: 5.0,
            dissipation_duration: 2.0,
            fade_in_duration: 2.0,
            fade_out_duration: 2.0,
            expansion_noise: 100.0,
            dissipation_noise: 100.0,
            expansion_curve: None,
            dissipation_curve: None,
            infinite_sustain: false,
            obstacle_checks: true,
            min_rebuild_interval: 0.25,
            min_rebuild_voxel_delta: 50,
        }
    }
}

impl SmokeConfig {
    /// Grid resolution per axis (`2 * extent - 1`, at least 1)
    pub fn resolution(&self) -> IVec3 {
        (self.extent * 2 - IVec3::ONE).max(IVec3::ONE)
    }

    /// Validate every precondition the simulation relies on.
    ///
    /// Violations are configuration errors and fail fast here rather than
    /// surfacing mid-simulation.
    pub fn validate(&self) -> Result<()> {
        if self.extent.cmplt(IVec3::ONE).any() {
            return Err(Error::Config(format!(
                "extent must be at least 1 per axis, got {}",
                self.extent
            )));
        }
        if self.resolution().cmpge(IVec3::splat(64)).any() {
            return Err(Error::Config(format!(
                "resolution {} exceeds the 64-per-axis packing limit (extent {})",
                self.resolution(),
                self.extent
            )));
        }
        if self.voxel_size <= 0.0 {
            return Err(Error::Config(format!(
                "voxel_size must be positive, got {}",
                self.voxel_size
            )));
        }
        if self.radii.cmple(Vec3::ZERO).any() {
            return Err(Error::Config(format!(
                "radii must be positive per axis, got {}",
                self.radii
            )));
        }
        if self.max_voxels == 0 {
            return Err(Error::Config("max_voxels must be at least 1".into()));
        }
        let non_negative = [
            ("expansion_duration", self.expansion_duration),
            ("sustain_duration", self.sustain_duration),
            ("dissipation_duration", self.dissipation_duration),
            ("fade_in_duration", self.fade_in_duration),
            ("fade_out_duration", self.fade_out_duration),
            ("expansion_noise", self.expansion_noise),
            ("dissipation_noise", self.dissipation_noise),
            ("min_rebuild_interval", self.min_rebuild_interval),
        ];
        for (name, value) in non_negative {
            if value < 0.0 {
                return Err(Error::Config(format!("{name} must not be negative, got {value}")));
            }
        }
        Ok(())
    }

    /// Load and validate a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SmokeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_resolution_derivation() {
        let config = SmokeConfig {
            extent: IVec3::new(2, 16, 32),
            ..Default::default()
        };
        assert_eq!(config.resolution(), IVec3::new(3, 31, 63));
    }

    #[test]
    fn test_rejects_oversized_extent() {
        let config = SmokeConfig {
            extent: IVec3::new(33, 16, 16),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_scalars() {
        let bad_voxel = SmokeConfig { voxel_size: 0.0, ..Default::default() };
        assert!(bad_voxel.validate().is_err());

        let bad_radii = SmokeConfig { radii: Vec3::new(1.0, 0.0, 1.0), ..Default::default() };
        assert!(bad_radii.validate().is_err());

        let bad_max = SmokeConfig { max_voxels: 0, ..Default::default() };
        assert!(bad_max.validate().is_err());

        let bad_duration = SmokeConfig { expansion_duration: -1.0, ..Default::default() };
        assert!(bad_duration.validate().is_err());
    }

    #[test]
    fn test_serde_round_trip_with_curve() {
        let config = SmokeConfig {
            expansion_curve: Some(Curve::new(vec![(0.0, 0.0), (1.0, 1.0)])),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: SmokeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.expansion_curve, config.expansion_curve);
        assert_eq!(back.max_voxels, config.max_voxels);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let back: SmokeConfig = serde_json::from_str(r#"{"max_voxels": 64}"#).unwrap();
        assert_eq!(back.max_voxels, 64);
        assert_eq!(back.voxel_size, 50.0);
    }
}
