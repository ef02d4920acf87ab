//! `GpuRuntime` adapter over the HIP runtime API.

use std::ffi::{c_void, CStr};
use std::mem::MaybeUninit;

use cubecl_hip_sys as sys;

use gpuport_core::error::{GpuPortError, Result};
use gpuport_core::properties::{DeviceProperties, PropertyCache};
use gpuport_core::runtime::{
    DevicePtr, Dim3, GpuRuntime, MemcpyKind, SharedMemConfig, StreamStatus,
};

/// Raw HIP stream handle.
///
/// Wraps `hipStream_t` so it can move between host threads. The default
/// stream is the null handle, owned by the runtime and never freed here; a
/// caller-supplied stream stays owned by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HipStream(sys::hipStream_t);

impl HipStream {
    /// Wrap a caller-owned `hipStream_t`.
    pub fn from_raw(raw: sys::hipStream_t) -> Self {
        Self(raw)
    }

    /// The raw handle.
    pub fn as_raw(self) -> sys::hipStream_t {
        self.0
    }
}

// SAFETY: a HIP stream handle is an opaque token the runtime accepts from
// any host thread.
unsafe impl Send for HipStream {}
unsafe impl Sync for HipStream {}

/// Kernel symbol accepted by `hipLaunchKernel`: the address of a
/// `__global__` function in the linked module.
pub type HipKernel = *const c_void;

/// Whether at least one HIP device is visible.
pub fn is_hip_available() -> bool {
    HipRuntime::device_count().map(|count| count > 0).unwrap_or(false)
}

/// The vendor error string for `status`.
fn error_string(status: sys::hipError_t) -> String {
    // SAFETY: hipGetErrorString returns a static NUL-terminated string for
    // every status value.
    unsafe {
        let ptr = sys::hipGetErrorString(status);
        if ptr.is_null() {
            format!("unknown HIP error {status}")
        } else {
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    }
}

fn check(status: sys::hipError_t) -> std::result::Result<(), String> {
    if status == sys::hipError_t_hipSuccess {
        Ok(())
    } else {
        Err(error_string(status))
    }
}

fn to_hip_memcpy_kind(kind: MemcpyKind) -> sys::hipMemcpyKind {
    match kind {
        MemcpyKind::DeviceToDevice => sys::hipMemcpyKind_hipMemcpyDeviceToDevice,
        MemcpyKind::HostToDevice => sys::hipMemcpyKind_hipMemcpyHostToDevice,
        MemcpyKind::DeviceToHost => sys::hipMemcpyKind_hipMemcpyDeviceToHost,
    }
}

fn to_hip_dim3(dim: Dim3) -> sys::dim3 {
    sys::dim3 {
        x: dim.x,
        y: dim.y,
        z: dim.z,
    }
}

/// [`GpuRuntime`] adapter backed by the HIP runtime.
pub struct HipRuntime;

impl GpuRuntime for HipRuntime {
    type Stream = HipStream;
    type Kernel = HipKernel;

    const NAME: &'static str = "HIP";

    fn default_stream() -> HipStream {
        HipStream(std::ptr::null_mut())
    }

    fn device_count() -> Result<usize> {
        let mut count = 0i32;
        // SAFETY: `count` is a valid out-pointer.
        let status = unsafe { sys::hipGetDeviceCount(&mut count) };
        check(status).map_err(GpuPortError::DeviceEnumeration)?;
        Ok(count as usize)
    }

    fn current_device() -> Result<usize> {
        let mut device = 0i32;
        // SAFETY: `device` is a valid out-pointer.
        let status = unsafe { sys::hipGetDevice(&mut device) };
        check(status).map_err(GpuPortError::BackendError)?;
        Ok(device as usize)
    }

    fn set_device(device: usize) -> Result<()> {
        // SAFETY: trivially safe vendor call.
        let status = unsafe { sys::hipSetDevice(device as i32) };
        check(status).map_err(|reason| GpuPortError::DeviceSwitch { device, reason })
    }

    fn query_device_properties(device: usize) -> Result<DeviceProperties> {
        let mut prop = MaybeUninit::<sys::hipDeviceProp_tR0600>::uninit();
        // SAFETY: `prop` is a valid out-pointer, fully written on success.
        let status = unsafe { sys::hipGetDevicePropertiesR0600(prop.as_mut_ptr(), device as i32) };
        check(status).map_err(|reason| GpuPortError::PropertyQuery { device, reason })?;
        // SAFETY: initialized by the successful call above.
        let prop = unsafe { prop.assume_init() };
        // SAFETY: the vendor guarantees `name` is NUL-terminated.
        let name = unsafe { CStr::from_ptr(prop.name.as_ptr()) }
            .to_string_lossy()
            .into_owned();
        Ok(DeviceProperties {
            name,
            multiprocessor_count: prop.multiProcessorCount as u32,
            max_threads_per_block: prop.maxThreadsPerBlock as u32,
            max_threads_per_multiprocessor: prop.maxThreadsPerMultiProcessor as u32,
            shared_mem_per_block: prop.sharedMemPerBlock as usize,
            major: prop.major as u32,
            minor: prop.minor as u32,
            total_global_mem: prop.totalGlobalMem as usize,
        })
    }

    fn malloc(num_bytes: usize) -> Result<DevicePtr> {
        let mut ptr: *mut c_void = std::ptr::null_mut();
        // SAFETY: `ptr` is a valid out-pointer.
        let status = unsafe { sys::hipMalloc(&mut ptr, num_bytes) };
        check(status).map_err(|reason| GpuPortError::AllocationFailed {
            size: num_bytes,
            reason,
        })?;
        Ok(DevicePtr::from_raw(ptr))
    }

    unsafe fn free(ptr: DevicePtr) -> Result<()> {
        // SAFETY: the caller guarantees `ptr` came from `malloc`.
        let status = unsafe { sys::hipFree(ptr.as_raw()) };
        check(status).map_err(GpuPortError::DeallocationFailed)
    }

    unsafe fn memset_async(
        dst: DevicePtr,
        value: u8,
        num_bytes: usize,
        stream: HipStream,
    ) -> Result<()> {
        // SAFETY: forwarded under the caller's range guarantee.
        let status =
            unsafe { sys::hipMemsetAsync(dst.as_raw(), value as i32, num_bytes, stream.as_raw()) };
        check(status).map_err(GpuPortError::TransferFailed)
    }

    unsafe fn memcpy_async(
        dst: *mut c_void,
        src: *const c_void,
        num_bytes: usize,
        kind: MemcpyKind,
        stream: HipStream,
    ) -> Result<()> {
        // SAFETY: forwarded under the caller's range guarantee.
        let status = unsafe {
            sys::hipMemcpyAsync(dst, src, num_bytes, to_hip_memcpy_kind(kind), stream.as_raw())
        };
        check(status).map_err(GpuPortError::TransferFailed)
    }

    fn stream_query(stream: HipStream) -> Result<StreamStatus> {
        // SAFETY: polling a stream handle has no memory preconditions.
        let status = unsafe { sys::hipStreamQuery(stream.as_raw()) };
        if status == sys::hipError_t_hipSuccess {
            Ok(StreamStatus::Complete)
        } else if status == sys::hipError_t_hipErrorNotReady {
            Ok(StreamStatus::Pending)
        } else {
            Err(GpuPortError::StreamError(error_string(status)))
        }
    }

    fn stream_synchronize(stream: HipStream) -> Result<()> {
        // SAFETY: blocking on a stream handle has no memory preconditions.
        let status = unsafe { sys::hipStreamSynchronize(stream.as_raw()) };
        check(status).map_err(GpuPortError::StreamError)
    }

    fn shared_mem_config() -> Result<SharedMemConfig> {
        let mut config = sys::hipSharedMemConfig_hipSharedMemBankSizeDefault;
        // SAFETY: `config` is a valid out-pointer.
        let status = unsafe { sys::hipDeviceGetSharedMemConfig(&mut config) };
        check(status).map_err(GpuPortError::BackendError)?;
        Ok(if config == sys::hipSharedMemConfig_hipSharedMemBankSizeFourByte {
            SharedMemConfig::FourByte
        } else if config == sys::hipSharedMemConfig_hipSharedMemBankSizeEightByte {
            SharedMemConfig::EightByte
        } else {
            SharedMemConfig::Default
        })
    }

    fn set_shared_mem_config(config: SharedMemConfig) -> Result<()> {
        let config = match config {
            SharedMemConfig::Default => sys::hipSharedMemConfig_hipSharedMemBankSizeDefault,
            SharedMemConfig::FourByte => sys::hipSharedMemConfig_hipSharedMemBankSizeFourByte,
            SharedMemConfig::EightByte => sys::hipSharedMemConfig_hipSharedMemBankSizeEightByte,
        };
        // SAFETY: trivially safe vendor call.
        let status = unsafe { sys::hipDeviceSetSharedMemConfig(config) };
        check(status).map_err(GpuPortError::BackendError)
    }

    unsafe fn launch_kernel(
        kernel: HipKernel,
        grid: Dim3,
        block: Dim3,
        shared_mem_bytes: usize,
        stream: HipStream,
        args: &mut [*mut c_void],
    ) -> Result<()> {
        // SAFETY: the caller guarantees `kernel` is a launchable symbol and
        // `args` matches its signature.
        let status = unsafe {
            sys::hipLaunchKernel(
                kernel,
                to_hip_dim3(grid),
                to_hip_dim3(block),
                args.as_mut_ptr(),
                shared_mem_bytes,
                stream.as_raw(),
            )
        };
        check(status).map_err(GpuPortError::LaunchFailed)
    }

    fn property_cache() -> &'static PropertyCache<Self> {
        static CACHE: PropertyCache<HipRuntime> = PropertyCache::new();
        &CACHE
    }
}
