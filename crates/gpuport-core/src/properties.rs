//! Per-device capability records and their process-wide cache.

use std::marker::PhantomData;
use std::sync::OnceLock;

use tracing::{debug, error};

use crate::runtime::GpuRuntime;

/// Hardware capability record for one physical device.
///
/// Populated once by the cache's query pass and never mutated afterwards;
/// records live until process exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProperties {
    /// Human-readable device name.
    pub name: String,
    /// Number of multiprocessors (SMs on CUDA, CUs on HIP).
    pub multiprocessor_count: u32,
    /// Maximum number of threads per block.
    pub max_threads_per_block: u32,
    /// Maximum number of resident threads per multiprocessor.
    pub max_threads_per_multiprocessor: u32,
    /// Shared memory available to a block, in bytes.
    pub shared_mem_per_block: usize,
    /// Compute capability major version.
    pub major: u32,
    /// Compute capability minor version.
    pub minor: u32,
    /// Total global memory, in bytes.
    pub total_global_mem: usize,
}

impl DeviceProperties {
    /// Compute capability as a `(major, minor)` pair.
    pub fn compute_capability(&self) -> (u32, u32) {
        (self.major, self.minor)
    }
}

/// Process-wide cache of [`DeviceProperties`], one record per visible device.
///
/// The first caller to need the cache performs the query pass: it asks the
/// backend for the visible device count and then for every device's record.
/// Concurrent first-use is safe: exactly one caller initializes while the
/// rest block until the fully populated records are published, so no reader
/// ever observes a partially written record.
pub struct PropertyCache<R> {
    records: OnceLock<Box<[DeviceProperties]>>,
    _backend: PhantomData<fn() -> R>,
}

impl<R: GpuRuntime> PropertyCache<R> {
    /// An empty cache. `const` so backends can place one in a `static`.
    pub const fn new() -> Self {
        Self {
            records: OnceLock::new(),
            _backend: PhantomData,
        }
    }

    /// Initialize the cache if no caller has done so yet, then return the
    /// records.
    ///
    /// Idempotent and callable from any number of threads concurrently.
    ///
    /// # Panics
    ///
    /// Device enumeration and property queries have no recovery path: on
    /// failure the vendor diagnostic is logged and the process panics.
    pub fn ensure_initialized(&self) -> &[DeviceProperties] {
        self.records.get_or_init(|| {
            let count = match R::device_count() {
                Ok(count) => count,
                Err(e) => {
                    error!("failed to get the number of {} devices: {}", R::NAME, e);
                    panic!("device enumeration failed: {e}");
                }
            };

            let mut records = Vec::with_capacity(count);
            for device in 0..count {
                match R::query_device_properties(device) {
                    Ok(props) => {
                        debug!(
                            "cached properties for {} device #{}: {}",
                            R::NAME,
                            device,
                            props.name
                        );
                        records.push(props);
                    }
                    Err(e) => {
                        error!("failed to initialize {} device #{}: {}", R::NAME, device, e);
                        panic!("property query failed for device {device}: {e}");
                    }
                }
            }
            records.into_boxed_slice()
        })
    }

    /// The record for `device`, initializing the cache on first use.
    ///
    /// # Panics
    ///
    /// Panics if `device` is outside the visible range.
    pub fn device(&self, device: usize) -> &DeviceProperties {
        let records = self.ensure_initialized();
        assert!(
            device < records.len(),
            "invalid device index {device}: {} device(s) visible",
            records.len()
        );
        &records[device]
    }

    /// Number of visible devices, initializing the cache on first use.
    pub fn device_count(&self) -> usize {
        self.ensure_initialized().len()
    }

    /// Whether some caller has already completed initialization.
    pub fn is_initialized(&self) -> bool {
        self.records.get().is_some()
    }
}

impl<R: GpuRuntime> Default for PropertyCache<R> {
    fn default() -> Self {
        Self::new()
    }
}
