//! Host runtime implementation.

use std::alloc::{alloc, dealloc, Layout};
use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::OnceLock;

use parking_lot::Mutex;
use tracing::debug;

use gpuport_core::error::{GpuPortError, Result};
use gpuport_core::properties::{DeviceProperties, PropertyCache};
use gpuport_core::runtime::{
    DevicePtr, Dim3, GpuRuntime, MemcpyKind, SharedMemConfig, StreamStatus,
};

/// Allocation alignment, matching the cache-line granularity GPUs hand out.
const ALLOC_ALIGN: usize = 128;

/// Stream handle used by the host backend.
///
/// Host streams are synchronous: every operation completes before the issuing
/// call returns, so distinct handles only serve to label work. The default
/// stream is `HostStream(0)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HostStream(pub u32);

/// Kernel entry accepted by the host backend's launch facility.
///
/// Receives one pointer per kernel parameter, each addressing the argument
/// value, exactly as a GPU launch would.
pub type HostKernel = unsafe fn(&mut [*mut c_void]);

/// Live allocation registry: base address to layout.
fn allocations() -> &'static Mutex<HashMap<usize, Layout>> {
    static ALLOCATIONS: OnceLock<Mutex<HashMap<usize, Layout>>> = OnceLock::new();
    ALLOCATIONS.get_or_init(|| Mutex::new(HashMap::new()))
}

static SHARED_MEM_CONFIG: Mutex<SharedMemConfig> = Mutex::new(SharedMemConfig::Default);

/// [`GpuRuntime`] adapter backed by host memory.
///
/// Exposes a single synthetic device. The allocation registry is
/// process-wide, so tests can assert exact allocate/release pairing through
/// [`is_tracked`](HostRuntime::is_tracked) and
/// [`allocation_count`](HostRuntime::allocation_count).
pub struct HostRuntime;

impl HostRuntime {
    /// Whether `ptr` is a live allocation made through this backend.
    pub fn is_tracked(ptr: DevicePtr) -> bool {
        allocations().lock().contains_key(&ptr.addr())
    }

    /// Number of live allocations made through this backend.
    pub fn allocation_count() -> usize {
        allocations().lock().len()
    }

    /// Total bytes held by live allocations made through this backend.
    pub fn allocated_bytes() -> usize {
        allocations().lock().values().map(|layout| layout.size()).sum()
    }
}

fn host_properties() -> DeviceProperties {
    DeviceProperties {
        name: "host".to_string(),
        multiprocessor_count: std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1),
        max_threads_per_block: 1024,
        max_threads_per_multiprocessor: 2048,
        shared_mem_per_block: 48 * 1024,
        major: 0,
        minor: 0,
        // Host memory is not budgeted.
        total_global_mem: 0,
    }
}

impl GpuRuntime for HostRuntime {
    type Stream = HostStream;
    type Kernel = HostKernel;

    const NAME: &'static str = "host";

    fn default_stream() -> HostStream {
        HostStream(0)
    }

    fn device_count() -> Result<usize> {
        Ok(1)
    }

    fn current_device() -> Result<usize> {
        Ok(0)
    }

    fn set_device(device: usize) -> Result<()> {
        if device == 0 {
            Ok(())
        } else {
            Err(GpuPortError::InvalidDevice { device, count: 1 })
        }
    }

    fn query_device_properties(device: usize) -> Result<DeviceProperties> {
        if device == 0 {
            Ok(host_properties())
        } else {
            Err(GpuPortError::PropertyQuery {
                device,
                reason: "host backend exposes a single device".to_string(),
            })
        }
    }

    fn malloc(num_bytes: usize) -> Result<DevicePtr> {
        let layout = Layout::from_size_align(num_bytes.max(1), ALLOC_ALIGN).map_err(|_| {
            GpuPortError::AllocationFailed {
                size: num_bytes,
                reason: "invalid layout".to_string(),
            }
        })?;
        // SAFETY: `layout` has a non-zero size.
        let raw = unsafe { alloc(layout) };
        if raw.is_null() {
            return Err(GpuPortError::AllocationFailed {
                size: num_bytes,
                reason: "host allocator returned null".to_string(),
            });
        }
        let ptr = DevicePtr::from_raw(raw.cast());
        allocations().lock().insert(ptr.addr(), layout);
        Ok(ptr)
    }

    unsafe fn free(ptr: DevicePtr) -> Result<()> {
        let layout = allocations().lock().remove(&ptr.addr());
        match layout {
            Some(layout) => {
                // SAFETY: `ptr` was produced by `alloc` with this layout and
                // is removed from the registry, so it is released once.
                unsafe { dealloc(ptr.as_raw().cast(), layout) };
                Ok(())
            }
            None => Err(GpuPortError::DeallocationFailed(format!(
                "pointer {ptr:?} was not allocated by the host backend"
            ))),
        }
    }

    unsafe fn memset_async(
        dst: DevicePtr,
        value: u8,
        num_bytes: usize,
        _stream: HostStream,
    ) -> Result<()> {
        // SAFETY: the caller guarantees `dst` covers `num_bytes` bytes.
        unsafe { std::ptr::write_bytes(dst.as_raw().cast::<u8>(), value, num_bytes) };
        Ok(())
    }

    unsafe fn memcpy_async(
        dst: *mut c_void,
        src: *const c_void,
        num_bytes: usize,
        _kind: MemcpyKind,
        _stream: HostStream,
    ) -> Result<()> {
        // Host and "device" memory coincide, so every copy direction is the
        // same plain copy.
        // SAFETY: the caller guarantees both ranges cover `num_bytes` bytes
        // and do not overlap.
        unsafe { std::ptr::copy_nonoverlapping(src.cast::<u8>(), dst.cast::<u8>(), num_bytes) };
        Ok(())
    }

    fn stream_query(_stream: HostStream) -> Result<StreamStatus> {
        Ok(StreamStatus::Complete)
    }

    fn stream_synchronize(_stream: HostStream) -> Result<()> {
        Ok(())
    }

    fn shared_mem_config() -> Result<SharedMemConfig> {
        Ok(*SHARED_MEM_CONFIG.lock())
    }

    fn set_shared_mem_config(config: SharedMemConfig) -> Result<()> {
        *SHARED_MEM_CONFIG.lock() = config;
        Ok(())
    }

    unsafe fn launch_kernel(
        kernel: HostKernel,
        grid: Dim3,
        block: Dim3,
        _shared_mem_bytes: usize,
        stream: HostStream,
        args: &mut [*mut c_void],
    ) -> Result<()> {
        debug!(
            "executing host kernel on stream {:?} (grid {:?}, block {:?})",
            stream, grid, block
        );
        // The entry runs exactly once on the calling thread; grid and block
        // shapes are accepted for interface parity, not simulated.
        // SAFETY: the caller guarantees `args` matches the kernel signature.
        unsafe { kernel(args) };
        Ok(())
    }

    fn property_cache() -> &'static PropertyCache<Self> {
        static CACHE: PropertyCache<HostRuntime> = PropertyCache::new();
        &CACHE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malloc_and_free_pair_up() {
        let ptr = HostRuntime::malloc(256).unwrap();
        assert!(!ptr.is_null());
        assert!(HostRuntime::is_tracked(ptr));
        // SAFETY: `ptr` came from `malloc` above.
        unsafe { HostRuntime::free(ptr).unwrap() };
        assert!(!HostRuntime::is_tracked(ptr));
    }

    #[test]
    fn freeing_a_foreign_pointer_is_rejected() {
        let bogus = DevicePtr::from_raw(0x1234 as *mut c_void);
        // SAFETY: the registry rejects the pointer before any deallocation.
        let result = unsafe { HostRuntime::free(bogus) };
        assert!(matches!(result, Err(GpuPortError::DeallocationFailed(_))));
    }

    #[test]
    fn copies_and_fills_are_immediate() {
        let ptr = HostRuntime::malloc(16).unwrap();
        let src = [0xabu8; 16];
        let mut dst = [0u8; 16];
        // SAFETY: `ptr` covers 16 bytes; the host buffers are live locals.
        unsafe {
            HostRuntime::memcpy_async(
                ptr.as_raw(),
                src.as_ptr().cast(),
                16,
                MemcpyKind::HostToDevice,
                HostStream(0),
            )
            .unwrap();
            HostRuntime::memcpy_async(
                dst.as_mut_ptr().cast(),
                ptr.as_raw(),
                16,
                MemcpyKind::DeviceToHost,
                HostStream(0),
            )
            .unwrap();
        }
        assert_eq!(dst, src);

        // SAFETY: `ptr` covers 16 bytes.
        unsafe { HostRuntime::memset_async(ptr, 0, 16, HostStream(0)).unwrap() };
        // SAFETY: reading back the filled region.
        let first = unsafe { *ptr.as_raw().cast::<u8>() };
        assert_eq!(first, 0);

        // SAFETY: `ptr` came from `malloc` above.
        unsafe { HostRuntime::free(ptr).unwrap() };
    }

    #[test]
    fn single_synthetic_device() {
        assert_eq!(HostRuntime::device_count().unwrap(), 1);
        assert_eq!(HostRuntime::current_device().unwrap(), 0);
        assert!(HostRuntime::set_device(0).is_ok());
        assert!(matches!(
            HostRuntime::set_device(1),
            Err(GpuPortError::InvalidDevice { device: 1, count: 1 })
        ));

        let props = HostRuntime::query_device_properties(0).unwrap();
        assert_eq!(props.name, "host");
        assert!(props.multiprocessor_count >= 1);
        assert!(HostRuntime::query_device_properties(1).is_err());
    }

    #[test]
    fn streams_are_trivially_complete() {
        assert_eq!(
            HostRuntime::stream_query(HostStream(3)).unwrap(),
            StreamStatus::Complete
        );
        HostRuntime::stream_synchronize(HostStream(3)).unwrap();
    }
}
