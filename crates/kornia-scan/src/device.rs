//! Execution substrates and their capability descriptors.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

/// Largest tile the engine ever launches.
pub const MAX_TILE_SIZE: u32 = 1024;

/// Smallest tile the dispatcher considers.
pub const MIN_TILE_SIZE: u32 = 32;

/// How a lane walks its share of a tile's input block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StridePolicy {
    /// Consecutive lanes read consecutive items (stride = tile size).
    Throughput,
    /// Each lane reads a contiguous run of items (stride = 1).
    Latency,
}

/// Static facts about an execution substrate.
///
/// Created once per substrate and never mutated while an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Number of lanes in a hardware lane-group (warp, sub-group, wavefront).
    pub lane_group_width: u32,
    /// Whether lanes of a lane-group can exchange registers without scratch memory.
    pub lane_shuffle: bool,
    /// Whether a whole grid can be launched live at once with a grid-wide barrier.
    pub cooperative_launch: bool,
    /// Whether 64-bit atomic add is available.
    pub atomic_add_64: bool,
    /// Maximum lanes per tile.
    pub max_tile_size: u32,
    /// Tile scratch memory in bytes.
    pub max_shared_memory: usize,
    /// Tiles guaranteed live at once during a cooperative launch.
    pub max_concurrent_tiles: u32,
    /// Preferred lane striding.
    pub stride_policy: StridePolicy,
}

impl Capabilities {
    /// Capabilities of the host substrate.
    pub fn host() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1);

        Self {
            lane_group_width: 32,
            lane_shuffle: true,
            cooperative_launch: true,
            atomic_add_64: true,
            max_tile_size: MAX_TILE_SIZE,
            max_shared_memory: 48 * 1024,
            max_concurrent_tiles: threads.max(1),
            stride_policy: StridePolicy::Latency,
        }
    }

    /// Set the lane-group width.
    pub fn with_lane_group_width(mut self, width: u32) -> Self {
        self.lane_group_width = width;
        self
    }

    /// Enable or disable lane-group shuffle.
    pub fn with_lane_shuffle(mut self, enabled: bool) -> Self {
        self.lane_shuffle = enabled;
        self
    }

    /// Enable or disable cooperative whole-grid launches.
    pub fn with_cooperative_launch(mut self, enabled: bool) -> Self {
        self.cooperative_launch = enabled;
        self
    }

    /// Enable or disable 64-bit atomic add.
    pub fn with_atomic_add_64(mut self, enabled: bool) -> Self {
        self.atomic_add_64 = enabled;
        self
    }

    /// Set the maximum number of lanes per tile.
    pub fn with_max_tile_size(mut self, lanes: u32) -> Self {
        self.max_tile_size = lanes;
        self
    }

    /// Set the tile scratch memory budget in bytes.
    pub fn with_max_shared_memory(mut self, bytes: usize) -> Self {
        self.max_shared_memory = bytes;
        self
    }

    /// Set how many tiles a cooperative launch may keep live.
    pub fn with_max_concurrent_tiles(mut self, tiles: u32) -> Self {
        self.max_concurrent_tiles = tiles;
        self
    }

    /// Set the lane striding policy.
    pub fn with_stride_policy(mut self, policy: StridePolicy) -> Self {
        self.stride_policy = policy;
        self
    }

    /// Check the descriptor is well formed.
    pub fn validate(&self) -> Result<()> {
        let width = self.lane_group_width;
        if !width.is_power_of_two() || !(2..=MAX_TILE_SIZE).contains(&width) {
            return Err(ScanError::InvalidCapabilities(format!(
                "lane-group width must be a power of two in 2..={MAX_TILE_SIZE}, got {width}"
            )));
        }
        if self.max_tile_size == 0 {
            return Err(ScanError::InvalidCapabilities(
                "max_tile_size must be non-zero".to_string(),
            ));
        }
        if self.cooperative_launch && self.max_concurrent_tiles == 0 {
            return Err(ScanError::InvalidCapabilities(
                "cooperative launch needs at least one concurrently live tile".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::host()
    }
}

/// Trait representing an execution substrate.
pub trait Runtime: Send + Sync + 'static {
    /// Get the name of the runtime.
    fn name() -> &'static str;

    /// Check if the runtime is available on this system.
    fn is_available() -> bool;

    /// Get the number of available devices.
    fn device_count() -> usize;

    /// Query the capabilities of one device.
    fn capabilities(device_id: usize) -> Result<Capabilities>;
}

/// The host substrate: tiles run on CPU threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostRuntime;

impl Runtime for HostRuntime {
    fn name() -> &'static str {
        "host"
    }

    fn is_available() -> bool {
        true
    }

    fn device_count() -> usize {
        1
    }

    fn capabilities(device_id: usize) -> Result<Capabilities> {
        if device_id >= Self::device_count() {
            return Err(ScanError::Other(format!(
                "host substrate has no device {device_id}"
            )));
        }
        Ok(Capabilities::host())
    }
}

/// Device handle.
///
/// Represents one device of a substrate together with its queried capabilities.
#[derive(Debug, Clone)]
pub struct Device {
    device_id: usize,
    name: String,
    capabilities: Capabilities,
}

impl Device {
    /// Open device `device_id` of runtime `R`.
    ///
    /// # Errors
    ///
    /// Returns an error if the device does not exist or reports malformed capabilities.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use kornia_scan::{Device, HostRuntime};
    ///
    /// let device = Device::new::<HostRuntime>(0).unwrap();
    /// assert!(device.capabilities().lane_shuffle);
    /// ```
    pub fn new<R: Runtime>(device_id: usize) -> Result<Self> {
        let capabilities = R::capabilities(device_id)?;
        Self::with_capabilities(format!("{} device {}", R::name(), device_id), capabilities)
    }

    /// Describe a device by hand, e.g. to model a substrate other than the one running.
    pub fn with_capabilities(name: impl Into<String>, capabilities: Capabilities) -> Result<Self> {
        capabilities.validate()?;
        Ok(Self {
            device_id: 0,
            name: name.into(),
            capabilities,
        })
    }

    /// Get the device ID.
    pub fn device_id(&self) -> usize {
        self.device_id
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capabilities of this device.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }
}
