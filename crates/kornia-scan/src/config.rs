//! Engine configuration.
//!
//! Every field has a default, so a configuration file only needs the keys it
//! overrides:
//!
//! ```toml
//! max_tile_size = 256
//! prefer_cooperative = false
//! execution = { fixed = 4 }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::device::{StridePolicy, MAX_TILE_SIZE, MIN_TILE_SIZE};
use crate::error::{Result, ScanError};

/// Grid size cap for per-tile reductions.
pub const DEFAULT_MAX_TILES: u32 = 65_535;

/// How the host substrate schedules the tiles of a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// Tiles run one after the other on the calling thread.
    Serial,
    /// Tiles run on the global rayon pool.
    #[default]
    Parallel,
    /// Tiles run on a dedicated pool with this many threads.
    Fixed(usize),
}

/// Tunables of the dispatcher and the host substrate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Force one tile size instead of walking the candidates.
    pub tile_size: Option<u32>,
    /// First tile size of the dispatcher walk.
    pub max_tile_size: u32,
    /// Grid size cap for per-tile reductions.
    pub max_tiles: u32,
    /// Use the cooperative single-pass reducer when the substrate supports it.
    pub prefer_cooperative: bool,
    /// Override the substrate's lane striding.
    pub stride_policy: Option<StridePolicy>,
    /// Tile scheduling on the host substrate.
    pub execution: ExecutionStrategy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tile_size: None,
            max_tile_size: MAX_TILE_SIZE,
            max_tiles: DEFAULT_MAX_TILES,
            prefer_cooperative: true,
            stride_policy: None,
            execution: ExecutionStrategy::Parallel,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::debug!("loading engine config from {}", path.as_ref().display());
        Self::from_toml_str(&text)
    }

    /// Force one tile size.
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = Some(tile_size);
        self
    }

    /// Bound the dispatcher walk.
    pub fn with_max_tile_size(mut self, tile_size: u32) -> Self {
        self.max_tile_size = tile_size;
        self
    }

    /// Cap the grid of per-tile reductions.
    pub fn with_max_tiles(mut self, tiles: u32) -> Self {
        self.max_tiles = tiles;
        self
    }

    /// Allow or forbid the cooperative reducer.
    pub fn with_prefer_cooperative(mut self, prefer: bool) -> Self {
        self.prefer_cooperative = prefer;
        self
    }

    /// Override the lane striding.
    pub fn with_stride_policy(mut self, policy: StridePolicy) -> Self {
        self.stride_policy = Some(policy);
        self
    }

    /// Set the host tile scheduling.
    pub fn with_execution(mut self, execution: ExecutionStrategy) -> Self {
        self.execution = execution;
        self
    }

    /// Check the values are consistent.
    pub fn validate(&self) -> Result<()> {
        if let Some(tile_size) = self.tile_size {
            if !is_tile_size(tile_size) {
                return Err(ScanError::Config(format!(
                    "tile_size must be a power of two in {MIN_TILE_SIZE}..={MAX_TILE_SIZE}, got {tile_size}"
                )));
            }
        }
        if !is_tile_size(self.max_tile_size) {
            return Err(ScanError::Config(format!(
                "max_tile_size must be a power of two in {MIN_TILE_SIZE}..={MAX_TILE_SIZE}, got {}",
                self.max_tile_size
            )));
        }
        if self.max_tiles == 0 {
            return Err(ScanError::Config("max_tiles must be non-zero".to_string()));
        }
        if self.execution == ExecutionStrategy::Fixed(0) {
            return Err(ScanError::Config(
                "thread count must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn is_tile_size(tile_size: u32) -> bool {
    tile_size.is_power_of_two() && (MIN_TILE_SIZE..=MAX_TILE_SIZE).contains(&tile_size)
}
