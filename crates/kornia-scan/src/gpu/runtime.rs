//! CubeCL runtime wrapper.

use std::marker::PhantomData;

use cubecl::prelude::*;
use cubecl::server::Handle;
use cubecl::Feature;

use crate::config::EngineConfig;
use crate::device::{Capabilities, StridePolicy, MAX_TILE_SIZE};
use crate::dispatch::Dispatcher;
use crate::element::Element;
use crate::error::{Result, ScanError};

// Re-export CubeCL's Runtime trait so downstream crates don't need cubecl directly
pub use cubecl::Runtime as CubeclRuntime;

/// GPU runtime context with a CubeCL client.
///
/// Capabilities are queried from the client once, when the context is created.
pub struct GpuContext<R: Runtime> {
    client: ComputeClient<R::Server, R::Channel>,
    capabilities: Capabilities,
    config: EngineConfig,
    dispatcher: Dispatcher,
    _phantom: PhantomData<R>,
}

impl<R: Runtime> GpuContext<R> {
    /// Create a context on `device` with the default configuration.
    pub fn new(device: R::Device) -> Result<Self> {
        Self::with_config(device, EngineConfig::default())
    }

    /// Create a context on `device` with an explicit configuration.
    pub fn with_config(device: R::Device, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let client = R::client(&device);
        let capabilities = query_capabilities::<R>(&client);
        capabilities.validate()?;
        log::debug!("{} capabilities: {:?}", R::name(), capabilities);

        Ok(Self {
            dispatcher: Dispatcher::new(capabilities, config.clone()),
            client,
            capabilities,
            config,
            _phantom: PhantomData,
        })
    }

    /// Get a reference to the compute client.
    pub fn client(&self) -> &ComputeClient<R::Server, R::Channel> {
        &self.client
    }

    /// Get the backend name (e.g. "cuda", "wgpu<wgsl>").
    pub fn backend_name(&self) -> &'static str {
        R::name()
    }

    /// Capabilities of the device.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Kernel selection for this device.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Whether atomic add of `N` is available.
    pub fn supports_atomic_add<N: Element + Numeric>(&self) -> bool {
        let props = self.client.properties();
        let atomic_elem = Atomic::<N>::as_elem_native_unchecked();
        let add = !N::ELEM_TYPE.is_float()
            || props.feature_enabled(Feature::AtomicFloat(cubecl::AtomicFeature::Add));
        props.feature_enabled(Feature::Type(atomic_elem)) && add
    }

    /// Upload `data` to the device.
    pub fn create<N: Element>(&self, data: &[N]) -> GpuBuffer<R> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        GpuBuffer::from_handle(self.client.create(bytes), data.len())
    }

    /// Allocate an uninitialised buffer of `len` elements.
    pub fn empty<N: Element>(&self, len: usize) -> GpuBuffer<R> {
        GpuBuffer::from_handle(self.client.empty(len * std::mem::size_of::<N>()), len)
    }

    /// Read a buffer back to the host.
    pub fn read<N: Element>(&self, buffer: &GpuBuffer<R>) -> Vec<N> {
        let bytes = self.client.read_one(buffer.handle().clone().binding());
        // readback bytes are not guaranteed to be aligned for `N`
        bytes
            .chunks_exact(std::mem::size_of::<N>())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    /// Synchronize all pending GPU operations.
    ///
    /// Reads a tiny buffer to force all enqueued kernels to complete.
    pub fn sync(&self) {
        let handle = self.client.empty(1);
        let _ = self.client.read_one(handle.binding());
        log::trace!("sync on {}", R::name());
    }
}

fn query_capabilities<R: Runtime>(client: &ComputeClient<R::Server, R::Channel>) -> Capabilities {
    let props = client.properties();
    let hw = props.hardware_properties();

    // plane instructions are only usable when the plane size is known exactly
    let lane_shuffle = props.feature_enabled(Feature::Plane) && hw.plane_size_min == hw.plane_size_max;
    let lane_group_width = if lane_shuffle && hw.plane_size_max.is_power_of_two() {
        hw.plane_size_max.clamp(2, MAX_TILE_SIZE)
    } else {
        32
    };

    let atomic_add_64 = props.feature_enabled(Feature::Type(Atomic::<u64>::as_elem_native_unchecked()))
        && props.feature_enabled(Feature::Type(Atomic::<f64>::as_elem_native_unchecked()));

    Capabilities {
        lane_group_width,
        lane_shuffle,
        cooperative_launch: false,
        atomic_add_64,
        max_tile_size: hw.max_units_per_cube.min(MAX_TILE_SIZE),
        max_shared_memory: hw.max_shared_memory_size,
        max_concurrent_tiles: 0,
        stride_policy: StridePolicy::Throughput,
    }
}

/// GPU buffer wrapping a CubeCL handle.
pub struct GpuBuffer<R: Runtime> {
    handle: Handle,
    len: usize,
    _phantom: PhantomData<R>,
}

impl<R: Runtime> GpuBuffer<R> {
    /// Create a new GPU buffer from a handle holding `len` elements.
    pub fn from_handle(handle: Handle, len: usize) -> Self {
        Self {
            handle,
            len,
            _phantom: PhantomData,
        }
    }

    /// Get the total number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get a reference to the underlying handle.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

/// Initialize a CUDA context on the first device.
#[cfg(feature = "cuda")]
pub fn init_cuda_runtime() -> Result<GpuContext<cubecl_cuda::CudaRuntime>> {
    use cubecl_cuda::CudaDevice;

    let device = CudaDevice::new(0);
    GpuContext::new(device)
}

/// Initialize a WGPU context on the best available adapter.
#[cfg(feature = "wgpu")]
pub fn init_wgpu_runtime() -> Result<GpuContext<cubecl_wgpu::WgpuRuntime>> {
    use cubecl_wgpu::WgpuDevice;

    let device = WgpuDevice::BestAvailable;
    GpuContext::new(device)
}

pub(crate) fn missing_atomic<N: Element>(backend: &str) -> ScanError {
    ScanError::UnsupportedOperation(format!(
        "{backend} has no atomic add for {}",
        N::ELEM_TYPE
    ))
}
