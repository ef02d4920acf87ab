//! `GpuRuntime` adapter over the CUDA runtime API.

use std::ffi::{c_void, CStr};
use std::mem::MaybeUninit;

use cudarc::runtime::sys;

use gpuport_core::error::{GpuPortError, Result};
use gpuport_core::properties::{DeviceProperties, PropertyCache};
use gpuport_core::runtime::{
    DevicePtr, Dim3, GpuRuntime, MemcpyKind, SharedMemConfig, StreamStatus,
};

/// Raw CUDA stream handle.
///
/// Wraps `cudaStream_t` so it can move between host threads. The default
/// stream is the null handle, owned by the runtime and never freed here; a
/// caller-supplied stream stays owned by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CudaStream(sys::cudaStream_t);

impl CudaStream {
    /// Wrap a caller-owned `cudaStream_t`.
    pub fn from_raw(raw: sys::cudaStream_t) -> Self {
        Self(raw)
    }

    /// The raw handle.
    pub fn as_raw(self) -> sys::cudaStream_t {
        self.0
    }
}

// SAFETY: a CUDA stream handle is an opaque token the runtime accepts from
// any host thread.
unsafe impl Send for CudaStream {}
unsafe impl Sync for CudaStream {}

/// Kernel symbol accepted by `cudaLaunchKernel`: the address of a
/// `__global__` function in the linked module.
pub type CudaKernel = *const c_void;

/// Whether at least one CUDA device is visible.
pub fn is_cuda_available() -> bool {
    CudaRuntime::device_count().map(|count| count > 0).unwrap_or(false)
}

/// The vendor error string for `status`.
fn error_string(status: sys::cudaError_t) -> String {
    // SAFETY: cudaGetErrorString returns a static NUL-terminated string for
    // every status value.
    unsafe {
        let ptr = sys::cudaGetErrorString(status);
        if ptr.is_null() {
            format!("unknown CUDA error {status:?}")
        } else {
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    }
}

fn to_cuda_memcpy_kind(kind: MemcpyKind) -> sys::cudaMemcpyKind {
    match kind {
        MemcpyKind::DeviceToDevice => sys::cudaMemcpyKind::cudaMemcpyDeviceToDevice,
        MemcpyKind::HostToDevice => sys::cudaMemcpyKind::cudaMemcpyHostToDevice,
        MemcpyKind::DeviceToHost => sys::cudaMemcpyKind::cudaMemcpyDeviceToHost,
    }
}

fn to_cuda_dim3(dim: Dim3) -> sys::dim3 {
    sys::dim3 {
        x: dim.x,
        y: dim.y,
        z: dim.z,
    }
}

/// [`GpuRuntime`] adapter backed by the CUDA runtime.
pub struct CudaRuntime;

impl GpuRuntime for CudaRuntime {
    type Stream = CudaStream;
    type Kernel = CudaKernel;

    const NAME: &'static str = "CUDA";

    fn default_stream() -> CudaStream {
        CudaStream(std::ptr::null_mut())
    }

    fn device_count() -> Result<usize> {
        let mut count = 0i32;
        // SAFETY: `count` is a valid out-pointer.
        let status = unsafe { sys::cudaGetDeviceCount(&mut count) };
        if status != sys::cudaError_t::cudaSuccess {
            return Err(GpuPortError::DeviceEnumeration(error_string(status)));
        }
        Ok(count as usize)
    }

    fn current_device() -> Result<usize> {
        let mut device = 0i32;
        // SAFETY: `device` is a valid out-pointer.
        let status = unsafe { sys::cudaGetDevice(&mut device) };
        if status != sys::cudaError_t::cudaSuccess {
            return Err(GpuPortError::BackendError(error_string(status)));
        }
        Ok(device as usize)
    }

    fn set_device(device: usize) -> Result<()> {
        // SAFETY: trivially safe vendor call.
        let status = unsafe { sys::cudaSetDevice(device as i32) };
        if status != sys::cudaError_t::cudaSuccess {
            return Err(GpuPortError::DeviceSwitch {
                device,
                reason: error_string(status),
            });
        }
        Ok(())
    }

    fn query_device_properties(device: usize) -> Result<DeviceProperties> {
        let mut prop = MaybeUninit::<sys::cudaDeviceProp>::uninit();
        // SAFETY: `prop` is a valid out-pointer, fully written on success.
        let status = unsafe { sys::cudaGetDeviceProperties_v2(prop.as_mut_ptr(), device as i32) };
        if status != sys::cudaError_t::cudaSuccess {
            return Err(GpuPortError::PropertyQuery {
                device,
                reason: error_string(status),
            });
        }
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
        let status = unsafe { sys::cudaMalloc(&mut ptr, num_bytes) };
        if status != sys::cudaError_t::cudaSuccess {
            return Err(GpuPortError::AllocationFailed {
                size: num_bytes,
                reason: error_string(status),
            });
        }
        Ok(DevicePtr::from_raw(ptr))
    }

    unsafe fn free(ptr: DevicePtr) -> Result<()> {
        // SAFETY: the caller guarantees `ptr` came from `malloc`.
        let status = unsafe { sys::cudaFree(ptr.as_raw()) };
        if status != sys::cudaError_t::cudaSuccess {
            return Err(GpuPortError::DeallocationFailed(error_string(status)));
        }
        Ok(())
    }

    unsafe fn memset_async(
        dst: DevicePtr,
        value: u8,
        num_bytes: usize,
        stream: CudaStream,
    ) -> Result<()> {
        // SAFETY: forwarded under the caller's range guarantee.
        let status =
            unsafe { sys::cudaMemsetAsync(dst.as_raw(), value as i32, num_bytes, stream.as_raw()) };
        if status != sys::cudaError_t::cudaSuccess {
            return Err(GpuPortError::TransferFailed(error_string(status)));
        }
        Ok(())
    }

    unsafe fn memcpy_async(
        dst: *mut c_void,
        src: *const c_void,
        num_bytes: usize,
        kind: MemcpyKind,
        stream: CudaStream,
    ) -> Result<()> {
        // SAFETY: forwarded under the caller's range guarantee.
        let status = unsafe {
            sys::cudaMemcpyAsync(dst, src, num_bytes, to_cuda_memcpy_kind(kind), stream.as_raw())
        };
        if status != sys::cudaError_t::cudaSuccess {
            return Err(GpuPortError::TransferFailed(error_string(status)));
        }
        Ok(())
    }

    fn stream_query(stream: CudaStream) -> Result<StreamStatus> {
        // SAFETY: polling a stream handle has no memory preconditions.
        let status = unsafe { sys::cudaStreamQuery(stream.as_raw()) };
        match status {
            sys::cudaError_t::cudaSuccess => Ok(StreamStatus::Complete),
            sys::cudaError_t::cudaErrorNotReady => Ok(StreamStatus::Pending),
            other => Err(GpuPortError::StreamError(error_string(other))),
        }
    }

    fn stream_synchronize(stream: CudaStream) -> Result<()> {
        // SAFETY: blocking on a stream handle has no memory preconditions.
        let status = unsafe { sys::cudaStreamSynchronize(stream.as_raw()) };
        if status != sys::cudaError_t::cudaSuccess {
            return Err(GpuPortError::StreamError(error_string(status)));
        }
        Ok(())
    }

    fn shared_mem_config() -> Result<SharedMemConfig> {
        let mut config = sys::cudaSharedMemConfig::cudaSharedMemBankSizeDefault;
        // SAFETY: `config` is a valid out-pointer.
        let status = unsafe { sys::cudaDeviceGetSharedMemConfig(&mut config) };
        if status != sys::cudaError_t::cudaSuccess {
            return Err(GpuPortError::BackendError(error_string(status)));
        }
        Ok(match config {
            sys::cudaSharedMemConfig::cudaSharedMemBankSizeFourByte => SharedMemConfig::FourByte,
            sys::cudaSharedMemConfig::cudaSharedMemBankSizeEightByte => SharedMemConfig::EightByte,
            _ => SharedMemConfig::Default,
        })
    }

    fn set_shared_mem_config(config: SharedMemConfig) -> Result<()> {
        let config = match config {
            SharedMemConfig::Default => sys::cudaSharedMemConfig::cudaSharedMemBankSizeDefault,
            SharedMemConfig::FourByte => sys::cudaSharedMemConfig::cudaSharedMemBankSizeFourByte,
            SharedMemConfig::EightByte => sys::cudaSharedMemConfig::cudaSharedMemBankSizeEightByte,
        };
        // SAFETY: trivially safe vendor call.
        let status = unsafe { sys::cudaDeviceSetSharedMemConfig(config) };
        if status != sys::cudaError_t::cudaSuccess {
            return Err(GpuPortError::BackendError(error_string(status)));
        }
        Ok(())
    }

    unsafe fn launch_kernel(
        kernel: CudaKernel,
        grid: Dim3,
        block: Dim3,
        shared_mem_bytes: usize,
        stream: CudaStream,
        args: &mut [*mut c_void],
    ) -> Result<()> {
        // SAFETY: the caller guarantees `kernel` is a launchable symbol and
        // `args` matches its signature.
        let status = unsafe {
            sys::cudaLaunchKernel(
                kernel,
                to_cuda_dim3(grid),
                to_cuda_dim3(block),
                args.as_mut_ptr(),
                shared_mem_bytes,
                stream.as_raw(),
            )
        };
        if status != sys::cudaError_t::cudaSuccess {
            return Err(GpuPortError::LaunchFailed(error_string(status)));
        }
        Ok(())
    }

    fn property_cache() -> &'static PropertyCache<Self> {
        static CACHE: PropertyCache<CudaRuntime> = PropertyCache::new();
        &CACHE
    }
}
