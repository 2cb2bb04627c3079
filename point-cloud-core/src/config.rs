//! Run-time player configuration, loadable from JSON.
use std::path::Path;

use constants::playback::DEFAULT_CACHE_CAPACITY;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::reconstruct::{Interlace, InterlaceThresholds, ReconstructionOptions};

/// Every field has a default, so a partial JSON file only overrides what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Reconstructed frames kept by the default cache.
    pub cache_capacity: usize,
    pub interlace: InterlaceThresholds,
    pub reconstruction: ReconstructionOptions,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            interlace: InterlaceThresholds::default(),
            reconstruction: ReconstructionOptions::default(),
        }
    }
}

impl PlayerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn interlace_for(&self, frame_count: usize) -> Interlace {
        Interlace::for_frame_count(frame_count, &self.interlace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distortion::DistortionMode;
    use crate::heatmap::HeatmapBlend;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.json");
        std::fs::write(
            &path,
            r#"{ "reconstruction": { "heatmap": true, "heatmap_blend": "replace" } }"#,
        )
        .unwrap();

        let config = PlayerConfig::load(&path).unwrap();
        assert_eq!(config.cache_capacity, DEFAULT_CACHE_CAPACITY);
        assert!(config.reconstruction.heatmap);
        assert_eq!(config.reconstruction.heatmap_blend, HeatmapBlend::Replace);
        assert_eq!(config.reconstruction.distortion, DistortionMode::Disabled);
        assert!(config.reconstruction.gravity_alignment);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.json");
        let mut config = PlayerConfig::default();
        config.cache_capacity = 32;
        config.interlace.full_density_below = 10;
        config.reconstruction.distortion = DistortionMode::Rectify;
        config.save(&path).unwrap();

        let loaded = PlayerConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.interlace_for(9), Interlace::Full);
        assert_eq!(loaded.interlace_for(10), Interlace::Half);
    }
}
