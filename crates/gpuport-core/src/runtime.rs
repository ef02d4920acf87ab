//! The vendor runtime adapter contract.
//!
//! [`GpuRuntime`] maps one fixed set of vendor-neutral operations onto a
//! concrete GPU runtime. It is implemented once per backend (CUDA, HIP, and
//! the host fallback); which implementation a build uses is decided by Cargo
//! features on the umbrella crate, never by runtime branching. The trait adds
//! no error handling of its own beyond converting vendor status codes into
//! [`GpuPortError`](crate::error::GpuPortError) values that carry the
//! vendor's diagnostic text.

use std::ffi::c_void;
use std::fmt;

use crate::error::Result;
use crate::properties::{DeviceProperties, PropertyCache};

/// An opaque pointer into device memory.
///
/// Device pointers are plain addresses in the device's address space. They
/// travel between adapter calls and kernel argument lists and are never
/// dereferenced on the host.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct DevicePtr(*mut c_void);

impl DevicePtr {
    /// The null device pointer.
    pub const fn null() -> Self {
        Self(std::ptr::null_mut())
    }

    /// Wrap a raw pointer obtained from a vendor allocation call.
    pub fn from_raw(raw: *mut c_void) -> Self {
        Self(raw)
    }

    /// The raw pointer value, for vendor calls and kernel arguments.
    pub fn as_raw(self) -> *mut c_void {
        self.0
    }

    /// The pointer as an integer address.
    pub fn addr(self) -> usize {
        self.0 as usize
    }

    /// Whether this is the null pointer.
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    /// The address `offset` bytes past this one.
    pub fn byte_add(self, offset: usize) -> Self {
        Self(self.0.cast::<u8>().wrapping_add(offset).cast())
    }
}

impl fmt::Debug for DevicePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DevicePtr({:#x})", self.addr())
    }
}

// SAFETY: a device pointer is an opaque address that the host never
// dereferences; moving or sharing the value between threads is harmless.
unsafe impl Send for DevicePtr {}
unsafe impl Sync for DevicePtr {}

/// Direction of an asynchronous memory copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemcpyKind {
    /// Both pointers address device memory.
    DeviceToDevice,
    /// Source is host memory, destination is device memory.
    HostToDevice,
    /// Source is device memory, destination is host memory.
    DeviceToHost,
}

/// Outcome of a non-blocking stream poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// All work enqueued on the stream has finished.
    Complete,
    /// Work is still in flight.
    Pending,
}

/// Shared-memory bank size configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedMemConfig {
    /// The device default bank size.
    Default,
    /// Four-byte banks.
    FourByte,
    /// Eight-byte banks.
    EightByte,
}

/// Grid or block dimensions for a kernel launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dim3 {
    /// Extent along x.
    pub x: u32,
    /// Extent along y.
    pub y: u32,
    /// Extent along z.
    pub z: u32,
}

impl Dim3 {
    /// A dimension with explicit extents on all three axes.
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Total number of elements covered by this dimension.
    pub const fn count(self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }
}

impl Default for Dim3 {
    fn default() -> Self {
        Self::new(1, 1, 1)
    }
}

impl From<u32> for Dim3 {
    fn from(x: u32) -> Self {
        Self::new(x, 1, 1)
    }
}

impl From<(u32, u32)> for Dim3 {
    fn from((x, y): (u32, u32)) -> Self {
        Self::new(x, y, 1)
    }
}

impl From<(u32, u32, u32)> for Dim3 {
    fn from((x, y, z): (u32, u32, u32)) -> Self {
        Self::new(x, y, z)
    }
}

/// Adapter over one vendor's GPU runtime.
///
/// Every operation the portability layer needs is listed here; backends
/// implement the whole set or none of it. Methods that take raw pointers are
/// `unsafe` because the adapter forwards them to the vendor runtime without
/// validation.
pub trait GpuRuntime: Sized + Send + Sync + 'static {
    /// Raw execution stream handle.
    type Stream: Copy + Send + Sync + fmt::Debug;

    /// Kernel identifier accepted by this backend's launch facility.
    type Kernel: Copy;

    /// Short backend name used in diagnostics.
    const NAME: &'static str;

    /// The runtime-owned default stream. Never freed by this layer.
    fn default_stream() -> Self::Stream;

    /// Number of visible devices.
    fn device_count() -> Result<usize>;

    /// Index of the device currently active on the calling thread.
    fn current_device() -> Result<usize>;

    /// Make `device` the active device for subsequent vendor calls on the
    /// calling thread.
    fn set_device(device: usize) -> Result<()>;

    /// Query the capability record of `device` from the vendor runtime.
    ///
    /// Callers normally go through [`property_cache`](Self::property_cache)
    /// instead; this is the uncached query the cache is built from.
    fn query_device_properties(device: usize) -> Result<DeviceProperties>;

    /// Allocate `num_bytes` of device memory on the active device.
    fn malloc(num_bytes: usize) -> Result<DevicePtr>;

    /// Release memory previously returned by [`malloc`](Self::malloc).
    ///
    /// # Safety
    ///
    /// `ptr` must have come from [`malloc`](Self::malloc) on this backend and
    /// must not be used after this call.
    unsafe fn free(ptr: DevicePtr) -> Result<()>;

    /// Enqueue an asynchronous fill of `num_bytes` bytes at `dst` with
    /// `value` on `stream`.
    ///
    /// # Safety
    ///
    /// `dst` must address at least `num_bytes` bytes of device memory that
    /// stay allocated until the stream drains.
    unsafe fn memset_async(
        dst: DevicePtr,
        value: u8,
        num_bytes: usize,
        stream: Self::Stream,
    ) -> Result<()>;

    /// Enqueue an asynchronous copy of `num_bytes` bytes on `stream`.
    ///
    /// # Safety
    ///
    /// `dst` and `src` must address at least `num_bytes` bytes on the sides
    /// named by `kind`, and both ranges must stay valid until the stream
    /// drains.
    unsafe fn memcpy_async(
        dst: *mut c_void,
        src: *const c_void,
        num_bytes: usize,
        kind: MemcpyKind,
        stream: Self::Stream,
    ) -> Result<()>;

    /// Non-blocking completion poll of `stream`.
    fn stream_query(stream: Self::Stream) -> Result<StreamStatus>;

    /// Block the calling thread until all work on `stream` has finished.
    fn stream_synchronize(stream: Self::Stream) -> Result<()>;

    /// The shared-memory bank configuration of the active device.
    fn shared_mem_config() -> Result<SharedMemConfig>;

    /// Set the shared-memory bank configuration of the active device.
    fn set_shared_mem_config(config: SharedMemConfig) -> Result<()>;

    /// Enqueue a kernel launch on `stream`.
    ///
    /// `args` holds one pointer per kernel parameter, each addressing the
    /// argument value, in the order of the kernel's signature.
    ///
    /// # Safety
    ///
    /// `kernel` must be resolvable by this backend's launch facility and
    /// `args` must match the kernel's signature exactly; argument types are
    /// not validated.
    unsafe fn launch_kernel(
        kernel: Self::Kernel,
        grid: Dim3,
        block: Dim3,
        shared_mem_bytes: usize,
        stream: Self::Stream,
        args: &mut [*mut c_void],
    ) -> Result<()>;

    /// The process-wide property cache for this backend.
    ///
    /// Each implementation backs this with its own `static`; records live
    /// until process exit.
    fn property_cache() -> &'static PropertyCache<Self>;
}

/// Set the shared-memory bank configuration of the active device.
///
/// # Panics
///
/// Panics if the vendor call reports a non-success status.
pub fn set_gpu_shared_mem_config<R: GpuRuntime>(config: SharedMemConfig) {
    if let Err(e) = R::set_shared_mem_config(config) {
        panic!("failed to set shared memory configuration: {e}");
    }
}
