//! The stream-interface seam and the concrete stream device.
//!
//! [`StreamInterface`] is the sole boundary between kernel-launch code and a
//! concrete runtime: anything that can hand out a stream, cached device
//! properties, device memory, and the scratch/semaphore block satisfies it,
//! including test doubles. [`GpuStreamDevice`] is the production
//! implementation, bound to one device and one execution stream.

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::properties::DeviceProperties;
use crate::runtime::{DevicePtr, GpuRuntime};

/// Size in bytes of the scratch region returned by
/// [`StreamInterface::scratchpad`].
pub const SCRATCH_BUFFER_SIZE: usize = 1024;

/// Size in bytes of the semaphore slot at the tail of the scratch block.
pub const SEMAPHORE_SIZE: usize = std::mem::size_of::<u32>();

/// Capability contract decoupling execution context from stream ownership.
///
/// Runtime-boundary failures inside these operations are unrecoverable; a
/// broken GPU runtime state cannot be safely continued from, so every
/// implementation panics rather than returning an error.
pub trait StreamInterface<R: GpuRuntime>: Send + Sync {
    /// The bound execution stream.
    fn stream(&self) -> R::Stream;

    /// Cached capability record of the bound device.
    fn device_properties(&self) -> &DeviceProperties;

    /// Allocate at least `num_bytes` of device memory on the bound device.
    ///
    /// # Panics
    ///
    /// Panics if the allocation fails or produces a null pointer.
    fn allocate(&self, num_bytes: usize) -> DevicePtr;

    /// Release a pointer previously returned by
    /// [`allocate`](StreamInterface::allocate).
    ///
    /// # Safety
    ///
    /// `ptr` must have come from `allocate` on this instance's device and
    /// must not be used after this call.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` is null or the vendor free fails.
    unsafe fn deallocate(&self, ptr: DevicePtr);

    /// A fixed-size scratch buffer of [`SCRATCH_BUFFER_SIZE`] bytes.
    ///
    /// Allocated lazily on first call; every later call returns the same
    /// pointer.
    fn scratchpad(&self) -> DevicePtr;

    /// A four-byte counter at the tail of the scratch block, asynchronously
    /// zero-initialized on first call.
    ///
    /// Every kernel that uses the semaphore must reset it to zero before
    /// completing, so the next kernel observes zero on start.
    fn semaphore(&self) -> DevicePtr;
}

/// Lazily allocated scratch/semaphore state.
#[derive(Default)]
struct ScratchBlock {
    scratch: Option<DevicePtr>,
    semaphore: Option<DevicePtr>,
}

/// A [`StreamInterface`] bound to one device and one execution stream.
///
/// The stream is either the runtime's default stream or supplied by the
/// caller; a caller-supplied stream stays owned by the caller, who must keep
/// it valid for the lifetime of this instance. The scratch block is the only
/// resource the device owns, and it is released exactly once on drop.
///
/// Constructing any stream device initializes the process-wide property
/// cache as a side effect.
pub struct GpuStreamDevice<R: GpuRuntime> {
    stream: R::Stream,
    device: usize,
    scratch: Mutex<ScratchBlock>,
}

impl<R: GpuRuntime> GpuStreamDevice<R> {
    /// Bind to the current device and its default stream.
    pub fn new() -> Self {
        let device = Self::query_current_device();
        Self::bind(R::default_stream(), device)
    }

    /// Bind to device `device` and its default stream.
    ///
    /// # Panics
    ///
    /// Panics if `device` is outside the visible device count.
    pub fn on_device(device: usize) -> Self {
        Self::bind(R::default_stream(), device)
    }

    /// Bind to a caller-supplied stream.
    ///
    /// The stream must be able to run on the bound device; when `device` is
    /// `None` it is assumed to belong to the current one. The caller retains
    /// ownership of the stream.
    ///
    /// # Panics
    ///
    /// Panics if `device` is outside the visible device count.
    pub fn with_stream(stream: R::Stream, device: Option<usize>) -> Self {
        let device = device.unwrap_or_else(Self::query_current_device);
        Self::bind(stream, device)
    }

    /// Index of the bound device.
    pub fn device_index(&self) -> usize {
        self.device
    }

    fn query_current_device() -> usize {
        match R::current_device() {
            Ok(device) => device,
            Err(e) => panic!("failed to query the current {} device: {e}", R::NAME),
        }
    }

    fn bind(stream: R::Stream, device: usize) -> Self {
        let count = R::property_cache().device_count();
        assert!(
            device < count,
            "invalid device index {device}: {count} device(s) visible"
        );
        debug!("bound {} stream device to device #{}", R::NAME, device);
        Self {
            stream,
            device,
            scratch: Mutex::new(ScratchBlock::default()),
        }
    }

    /// Pin the calling thread's device context to the bound device.
    fn pin_device(&self) {
        if let Err(e) = R::set_device(self.device) {
            panic!("failed to activate device {}: {e}", self.device);
        }
    }
}

impl<R: GpuRuntime> Default for GpuStreamDevice<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: GpuRuntime> StreamInterface<R> for GpuStreamDevice<R> {
    fn stream(&self) -> R::Stream {
        self.stream
    }

    fn device_properties(&self) -> &DeviceProperties {
        R::property_cache().device(self.device)
    }

    fn allocate(&self, num_bytes: usize) -> DevicePtr {
        self.pin_device();
        let ptr = match R::malloc(num_bytes) {
            Ok(ptr) => ptr,
            Err(e) => panic!("device allocation of {num_bytes} bytes failed: {e}"),
        };
        assert!(
            !ptr.is_null(),
            "device allocation of {num_bytes} bytes returned a null pointer"
        );
        ptr
    }

    unsafe fn deallocate(&self, ptr: DevicePtr) {
        assert!(!ptr.is_null(), "attempted to deallocate a null device pointer");
        self.pin_device();
        // SAFETY: the caller guarantees `ptr` came from `allocate`.
        if let Err(e) = unsafe { R::free(ptr) } {
            panic!("device deallocation failed: {e}");
        }
    }

    fn scratchpad(&self) -> DevicePtr {
        let mut block = self.scratch.lock();
        *block.scratch.get_or_insert_with(|| {
            debug!(
                "allocating {} byte scratch block on device #{}",
                SCRATCH_BUFFER_SIZE + SEMAPHORE_SIZE,
                self.device
            );
            self.allocate(SCRATCH_BUFFER_SIZE + SEMAPHORE_SIZE)
        })
    }

    fn semaphore(&self) -> DevicePtr {
        let mut block = self.scratch.lock();
        if let Some(semaphore) = block.semaphore {
            return semaphore;
        }
        let scratch = *block
            .scratch
            .get_or_insert_with(|| self.allocate(SCRATCH_BUFFER_SIZE + SEMAPHORE_SIZE));
        let semaphore = scratch.byte_add(SCRATCH_BUFFER_SIZE);
        // SAFETY: `semaphore` addresses the tail slot of the scratch block
        // allocated above, which outlives the stream.
        if let Err(e) = unsafe { R::memset_async(semaphore, 0, SEMAPHORE_SIZE, self.stream) } {
            panic!("failed to zero-initialize the semaphore: {e}");
        }
        block.semaphore = Some(semaphore);
        semaphore
    }
}

impl<R: GpuRuntime> Drop for GpuStreamDevice<R> {
    fn drop(&mut self) {
        let block = self.scratch.get_mut();
        if let Some(scratch) = block.scratch.take() {
            // Best-effort cleanup; a caller-supplied stream is never touched.
            if R::set_device(self.device).is_err() {
                warn!(
                    "failed to activate device #{} while releasing its scratch block",
                    self.device
                );
                return;
            }
            // SAFETY: `scratch` came from `allocate` and is released exactly
            // once, here.
            if let Err(e) = unsafe { R::free(scratch) } {
                warn!(
                    "failed to release scratch block on device #{}: {}",
                    self.device, e
                );
            }
        }
    }
}
