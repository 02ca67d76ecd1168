//! Host runtime: launches grids of tiles on CPU threads.
//!
//! A launch runs a kernel once per tile. Inside a tile the kernel drives its
//! lanes in lock-step phases over per-lane arrays, so a phase boundary acts as
//! the tile barrier. Tiles are independent: they may run in any order, on any
//! thread, and only communicate through atomic buffers.

use std::sync::Barrier;

use rayon::prelude::*;

use crate::config::{EngineConfig, ExecutionStrategy};
use crate::device::{Capabilities, Device};
use crate::dispatch::Dispatcher;
use crate::error::{Result, ScanError};

/// Size of one launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGrid {
    /// Number of tiles.
    pub tile_count: u32,
    /// Lanes per tile.
    pub tile_size: u32,
}

impl LaunchGrid {
    /// Create a grid of `tile_count` tiles of `tile_size` lanes.
    pub fn new(tile_count: u32, tile_size: u32) -> Self {
        Self {
            tile_count,
            tile_size,
        }
    }

    /// Smallest grid covering `count` items with one item per lane, capped at `max_tiles`.
    pub fn covering(count: usize, tile_size: u32, max_tiles: u32) -> Self {
        let tiles = count.div_ceil(tile_size as usize).min(max_tiles as usize) as u32;
        Self::new(tiles, tile_size)
    }

    /// Lanes in the whole grid.
    pub fn total_lanes(&self) -> usize {
        self.tile_count as usize * self.tile_size as usize
    }
}

/// Lane layout of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileShape {
    tile_size: u32,
    lane_group_width: u32,
}

impl TileShape {
    /// Layout of a tile of `tile_size` lanes on a substrate with lane-groups of
    /// `lane_group_width`; a tile narrower than one lane-group is a single group.
    pub fn new(tile_size: u32, lane_group_width: u32) -> Self {
        Self {
            tile_size,
            lane_group_width: lane_group_width.min(tile_size),
        }
    }

    /// Lanes per tile.
    pub fn tile_size(&self) -> usize {
        self.tile_size as usize
    }

    /// Lanes per lane-group.
    pub fn lane_group_width(&self) -> usize {
        self.lane_group_width as usize
    }

    /// Lane-groups per tile.
    pub fn lane_group_count(&self) -> usize {
        self.tile_size() / self.lane_group_width()
    }
}

/// One tile of a running launch, as seen by the kernel.
pub struct Tile<'a> {
    index: u32,
    grid: LaunchGrid,
    shape: TileShape,
    grid_barrier: Option<&'a Barrier>,
}

impl Tile<'_> {
    /// Position of the tile in the grid.
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// The launch this tile belongs to.
    pub fn grid(&self) -> LaunchGrid {
        self.grid
    }

    /// Lane layout.
    pub fn shape(&self) -> TileShape {
        self.shape
    }

    /// Lanes in this tile.
    pub fn size(&self) -> usize {
        self.shape.tile_size()
    }

    /// Grid-wide position of `lane`.
    pub fn global_lane(&self, lane: usize) -> usize {
        self.index() * self.size() + lane
    }

    /// Whether the tile belongs to a cooperative launch.
    pub fn is_cooperative(&self) -> bool {
        self.grid_barrier.is_some()
    }

    /// Wait until every tile of the grid reaches this point.
    ///
    /// Only a cooperative launch has a grid barrier; elsewhere this is a no-op.
    pub fn grid_sync(&self) {
        if let Some(barrier) = self.grid_barrier {
            barrier.wait();
        }
    }
}

/// Host runtime context.
///
/// Holds the device capabilities, the engine configuration, the dispatcher built
/// from both, and the thread pool tiles are scheduled on.
pub struct RuntimeContext {
    device_name: String,
    capabilities: Capabilities,
    config: EngineConfig,
    dispatcher: Dispatcher,
    pool: Option<rayon::ThreadPool>,
}

impl RuntimeContext {
    /// Create a context for `device` with the default configuration.
    pub fn new(device: &Device) -> Result<Self> {
        Self::with_config(device, EngineConfig::default())
    }

    /// Create a context for `device` with an explicit configuration.
    pub fn with_config(device: &Device, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let capabilities = *device.capabilities();
        capabilities.validate()?;

        let pool = match config.execution {
            ExecutionStrategy::Fixed(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| ScanError::Other(format!("failed to build thread pool: {e}")))?,
            ),
            ExecutionStrategy::Serial | ExecutionStrategy::Parallel => None,
        };

        let dispatcher = Dispatcher::new(capabilities, config.clone());
        log::debug!(
            "runtime context on {}: {:?}, execution {:?}",
            device.name(),
            capabilities,
            config.execution
        );

        Ok(Self {
            device_name: device.name().to_string(),
            capabilities,
            config,
            dispatcher,
            pool,
        })
    }

    /// Name of the device this context runs on.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Capabilities of the device.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Kernel selection for this device and configuration.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run `kernel` once per tile of `grid`, in any order.
    pub fn launch<F>(&self, grid: LaunchGrid, kernel: F) -> Result<()>
    where
        F: Fn(&Tile<'_>) + Send + Sync,
    {
        self.check_grid(grid)?;
        let shape = TileShape::new(grid.tile_size, self.capabilities.lane_group_width);
        log::trace!(
            "launch: {} tiles x {} lanes ({:?})",
            grid.tile_count,
            grid.tile_size,
            self.config.execution
        );

        let run = |index: u32| {
            kernel(&Tile {
                index,
                grid,
                shape,
                grid_barrier: None,
            })
        };

        match (&self.config.execution, &self.pool) {
            (ExecutionStrategy::Serial, _) => (0..grid.tile_count).for_each(run),
            (ExecutionStrategy::Fixed(_), Some(pool)) => {
                pool.install(|| (0..grid.tile_count).into_par_iter().for_each(run))
            }
            _ => (0..grid.tile_count).into_par_iter().for_each(run),
        }
        Ok(())
    }

    /// Run `kernel` once per tile of `grid` with every tile live at once.
    ///
    /// Each tile gets its own thread and may call [`Tile::grid_sync`].
    pub fn launch_cooperative<F>(&self, grid: LaunchGrid, kernel: F) -> Result<()>
    where
        F: Fn(&Tile<'_>) + Send + Sync,
    {
        self.check_grid(grid)?;
        if !self.capabilities.cooperative_launch {
            return Err(ScanError::UnsupportedOperation(format!(
                "{} does not support cooperative launches",
                self.device_name
            )));
        }
        if grid.tile_count > self.capabilities.max_concurrent_tiles {
            return Err(ScanError::CooperativeLaunchUnavailable {
                requested: grid.tile_count,
                max: self.capabilities.max_concurrent_tiles,
            });
        }
        if grid.tile_count == 0 {
            return Ok(());
        }

        let shape = TileShape::new(grid.tile_size, self.capabilities.lane_group_width);
        let barrier = Barrier::new(grid.tile_count as usize);
        log::trace!(
            "cooperative launch: {} tiles x {} lanes",
            grid.tile_count,
            grid.tile_size
        );

        std::thread::scope(|scope| {
            for index in 0..grid.tile_count {
                let kernel = &kernel;
                let barrier = &barrier;
                scope.spawn(move || {
                    kernel(&Tile {
                        index,
                        grid,
                        shape,
                        grid_barrier: Some(barrier),
                    })
                });
            }
        });
        Ok(())
    }

    /// Make every write of the previous launches visible to the next one.
    ///
    /// Host launches return only once all their tiles finished; the fence orders
    /// the relaxed cell writes before anything issued afterwards.
    pub fn sync(&self) {
        std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
        log::trace!("sync on {}", self.device_name);
    }

    fn check_grid(&self, grid: LaunchGrid) -> Result<()> {
        if !grid.tile_size.is_power_of_two() || grid.tile_size < 2 {
            return Err(ScanError::InvalidTileSize(grid.tile_size));
        }
        Ok(())
    }
}
