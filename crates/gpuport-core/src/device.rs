//! The device facade threaded through every memory and launch operation.

use std::ffi::c_void;

use tracing::error;

use crate::runtime::{DevicePtr, Dim3, GpuRuntime, StreamStatus};
use crate::stream::StreamInterface;

/// Public handle used by calling numeric code.
///
/// The facade borrows a [`StreamInterface`] and never owns it; the borrow
/// keeps the interface alive for at least the facade's lifetime, which is the
/// whole ownership contract. Copies of the facade are cheap and share the
/// underlying interface.
///
/// All transfer and launch operations are asynchronous with respect to the
/// calling thread and ordered only against other work on the same stream;
/// [`synchronize`](GpuDevice::synchronize) is the sole blocking wait.
pub struct GpuDevice<'a, R: GpuRuntime> {
    stream: &'a dyn StreamInterface<R>,
    max_blocks: u32,
}

impl<R: GpuRuntime> Clone for GpuDevice<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R: GpuRuntime> Copy for GpuDevice<'_, R> {}

impl<'a, R: GpuRuntime> GpuDevice<'a, R> {
    /// Wrap `stream` with an unbounded block-count budget.
    pub fn new(stream: &'a dyn StreamInterface<R>) -> Self {
        Self {
            stream,
            max_blocks: u32::MAX,
        }
    }

    /// Wrap `stream` with an explicit maximum block-count budget.
    pub fn with_max_blocks(stream: &'a dyn StreamInterface<R>, max_blocks: u32) -> Self {
        Self { stream, max_blocks }
    }

    /// The bound execution stream.
    pub fn stream(&self) -> R::Stream {
        self.stream.stream()
    }

    /// Allocate at least `num_bytes` of device memory.
    ///
    /// # Panics
    ///
    /// Panics if the allocation fails.
    pub fn allocate(&self, num_bytes: usize) -> DevicePtr {
        self.stream.allocate(num_bytes)
    }

    /// Release a pointer previously returned by
    /// [`allocate`](GpuDevice::allocate).
    ///
    /// # Safety
    ///
    /// `ptr` must have come from `allocate` on the same stream interface and
    /// must not be used after this call.
    pub unsafe fn deallocate(&self, ptr: DevicePtr) {
        // SAFETY: forwarded under the caller's guarantee.
        unsafe { self.stream.deallocate(ptr) }
    }

    /// The stream's fixed-size scratch buffer.
    pub fn scratchpad(&self) -> DevicePtr {
        self.stream.scratchpad()
    }

    /// The stream's semaphore slot, zero on every kernel start.
    pub fn semaphore(&self) -> DevicePtr {
        self.stream.semaphore()
    }

    /// Enqueue an asynchronous device-to-device copy on the bound stream.
    ///
    /// # Safety
    ///
    /// Both ranges must cover `num_bytes` bytes of device memory and stay
    /// allocated until the stream drains.
    ///
    /// # Panics
    ///
    /// Panics if the copy cannot be enqueued.
    pub unsafe fn memcpy(&self, dst: DevicePtr, src: DevicePtr, num_bytes: usize) {
        // SAFETY: forwarded under the caller's guarantee.
        let issued = unsafe {
            R::memcpy_async(
                dst.as_raw(),
                src.as_raw(),
                num_bytes,
                crate::runtime::MemcpyKind::DeviceToDevice,
                self.stream(),
            )
        };
        if let Err(e) = issued {
            panic!("device-to-device copy of {num_bytes} bytes failed: {e}");
        }
    }

    /// Enqueue an asynchronous host-to-device copy on the bound stream.
    ///
    /// # Safety
    ///
    /// `src` must address `num_bytes` bytes of host memory that stay valid
    /// until the stream drains; `dst` must cover `num_bytes` bytes of device
    /// memory.
    ///
    /// # Panics
    ///
    /// Panics if the copy cannot be enqueued.
    pub unsafe fn memcpy_host_to_device(
        &self,
        dst: DevicePtr,
        src: *const c_void,
        num_bytes: usize,
    ) {
        // SAFETY: forwarded under the caller's guarantee.
        let issued = unsafe {
            R::memcpy_async(
                dst.as_raw(),
                src,
                num_bytes,
                crate::runtime::MemcpyKind::HostToDevice,
                self.stream(),
            )
        };
        if let Err(e) = issued {
            panic!("host-to-device copy of {num_bytes} bytes failed: {e}");
        }
    }

    /// Enqueue an asynchronous device-to-host copy on the bound stream.
    ///
    /// # Safety
    ///
    /// `dst` must address `num_bytes` bytes of host memory that stay valid
    /// until the stream drains; `src` must cover `num_bytes` bytes of device
    /// memory.
    ///
    /// # Panics
    ///
    /// Panics if the copy cannot be enqueued.
    pub unsafe fn memcpy_device_to_host(&self, dst: *mut c_void, src: DevicePtr, num_bytes: usize) {
        // SAFETY: forwarded under the caller's guarantee.
        let issued = unsafe {
            R::memcpy_async(
                dst,
                src.as_raw(),
                num_bytes,
                crate::runtime::MemcpyKind::DeviceToHost,
                self.stream(),
            )
        };
        if let Err(e) = issued {
            panic!("device-to-host copy of {num_bytes} bytes failed: {e}");
        }
    }

    /// Enqueue an asynchronous fill of device memory on the bound stream.
    ///
    /// # Safety
    ///
    /// `dst` must cover `num_bytes` bytes of device memory that stay
    /// allocated until the stream drains.
    ///
    /// # Panics
    ///
    /// Panics if the fill cannot be enqueued.
    pub unsafe fn memset(&self, dst: DevicePtr, value: u8, num_bytes: usize) {
        // SAFETY: forwarded under the caller's guarantee.
        if let Err(e) = unsafe { R::memset_async(dst, value, num_bytes, self.stream()) } {
            panic!("fill of {num_bytes} bytes failed: {e}");
        }
    }

    /// Block the calling host thread until the bound stream drains.
    ///
    /// # Panics
    ///
    /// Panics after logging the vendor diagnostic if the stream reports an
    /// error.
    pub fn synchronize(&self) {
        if let Err(e) = R::stream_synchronize(self.stream()) {
            error!("error detected in {} stream: {}", R::NAME, e);
            panic!("stream synchronization failed: {e}");
        }
    }

    /// Non-blocking health poll of the bound stream.
    ///
    /// Returns `true` when the stream is idle or still working through
    /// enqueued operations, `false` when the runtime recorded an error. A
    /// lightweight health check, not a correctness gate.
    pub fn ok(&self) -> bool {
        matches!(
            R::stream_query(self.stream()),
            Ok(StreamStatus::Complete | StreamStatus::Pending)
        )
    }

    /// Number of multiprocessors on the bound device.
    pub fn multiprocessor_count(&self) -> u32 {
        self.stream.device_properties().multiprocessor_count
    }

    /// Maximum threads per block on the bound device.
    pub fn max_threads_per_block(&self) -> u32 {
        self.stream.device_properties().max_threads_per_block
    }

    /// Maximum resident threads per multiprocessor on the bound device.
    pub fn max_threads_per_multiprocessor(&self) -> u32 {
        self.stream.device_properties().max_threads_per_multiprocessor
    }

    /// Shared memory available per block on the bound device, in bytes.
    pub fn shared_mem_per_block(&self) -> usize {
        self.stream.device_properties().shared_mem_per_block
    }

    /// Compute capability major version of the bound device.
    pub fn major_device_version(&self) -> u32 {
        self.stream.device_properties().major
    }

    /// Compute capability minor version of the bound device.
    pub fn minor_device_version(&self) -> u32 {
        self.stream.device_properties().minor
    }

    /// Threads per warp assumed by launch heuristics.
    pub fn num_threads(&self) -> usize {
        32
    }

    /// First-level cache size assumed by blocking heuristics, in bytes.
    pub fn first_level_cache_size(&self) -> usize {
        48 * 1024
    }

    /// Last-level cache size assumed by blocking heuristics, in bytes.
    ///
    /// No distinct last-level model is attempted; this reports the
    /// first-level size.
    pub fn last_level_cache_size(&self) -> usize {
        self.first_level_cache_size()
    }

    /// Maximum block-count budget fixed at construction.
    pub fn max_blocks(&self) -> u32 {
        self.max_blocks
    }

    /// Enqueue `kernel` on the bound stream.
    ///
    /// Prefer [`launch_gpu_kernel!`](crate::launch_gpu_kernel), which builds
    /// the argument array from a plain argument list.
    ///
    /// # Safety
    ///
    /// `kernel` must be resolvable by the active backend and `args` must
    /// match its signature; argument values must stay readable until the
    /// launch call returns.
    ///
    /// # Panics
    ///
    /// Panics if the runtime records a launch error.
    pub unsafe fn launch(
        &self,
        kernel: R::Kernel,
        grid: Dim3,
        block: Dim3,
        shared_mem_bytes: usize,
        args: &mut [*mut c_void],
    ) {
        // SAFETY: forwarded under the caller's guarantee.
        let issued = unsafe {
            R::launch_kernel(kernel, grid, block, shared_mem_bytes, self.stream(), args)
        };
        if let Err(e) = issued {
            panic!("kernel launch failed: {e}");
        }
    }
}

/// Launch a kernel through a [`GpuDevice`].
///
/// Takes the kernel identifier, grid and block dimensions (anything
/// convertible to [`Dim3`](crate::runtime::Dim3)), a shared-memory byte
/// count, the device facade, and the kernel's arguments in signature order.
/// This is the only sanctioned way to start kernel execution through this
/// layer; a non-success launch status is fatal.
///
/// Must be invoked inside an `unsafe` block: the argument list is not
/// validated against the kernel's signature.
///
/// ```ignore
/// unsafe {
///     launch_gpu_kernel!(kernel, grid, 256, 0, device, input_ptr, output_ptr, len);
/// }
/// ```
#[macro_export]
macro_rules! launch_gpu_kernel {
    ($kernel:expr, $grid:expr, $block:expr, $shared_mem:expr, $device:expr $(, $arg:expr)* $(,)?) => {
        $device.launch(
            $kernel,
            ::core::convert::Into::into($grid),
            ::core::convert::Into::into($block),
            $shared_mem,
            &mut [$( &$arg as *const _ as *mut ::core::ffi::c_void ),*],
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::DeviceProperties;
    use crate::stream::GpuStreamDevice;
    use crate::testing::{fake_properties, MockRuntime, MockStream};

    #[test]
    fn delegates_to_the_stream_interface() {
        let stream = GpuStreamDevice::<MockRuntime>::on_device(1);
        let device = GpuDevice::new(&stream);

        assert_eq!(device.stream(), MockStream(0));
        assert_eq!(device.scratchpad(), stream.scratchpad());
        assert_eq!(device.semaphore(), stream.semaphore());

        let ptr = device.allocate(128);
        assert!(MockRuntime::is_live(ptr));
        // SAFETY: `ptr` came from `allocate` above.
        unsafe { device.deallocate(ptr) };
        assert!(!MockRuntime::is_live(ptr));
    }

    #[test]
    fn capability_queries_read_the_cached_record() {
        let stream = GpuStreamDevice::<MockRuntime>::on_device(1);
        let device = GpuDevice::new(&stream);
        let expected = fake_properties(1);

        assert_eq!(device.multiprocessor_count(), expected.multiprocessor_count);
        assert_eq!(device.max_threads_per_block(), expected.max_threads_per_block);
        assert_eq!(
            device.max_threads_per_multiprocessor(),
            expected.max_threads_per_multiprocessor
        );
        assert_eq!(device.shared_mem_per_block(), expected.shared_mem_per_block);
        assert_eq!(device.major_device_version(), expected.major);
        assert_eq!(device.minor_device_version(), expected.minor);
    }

    #[test]
    fn platform_constants_are_fixed() {
        let stream = GpuStreamDevice::<MockRuntime>::new();
        let device = GpuDevice::new(&stream);

        assert_eq!(device.num_threads(), 32);
        assert_eq!(device.first_level_cache_size(), 48 * 1024);
        assert_eq!(
            device.last_level_cache_size(),
            device.first_level_cache_size()
        );
        assert_eq!(device.max_blocks(), u32::MAX);
        assert_eq!(GpuDevice::with_max_blocks(&stream, 120).max_blocks(), 120);
    }

    #[test]
    fn ok_reflects_stream_health() {
        let stream = GpuStreamDevice::<MockRuntime>::new();
        let device = GpuDevice::new(&stream);

        device.synchronize();
        assert!(device.ok());

        MockRuntime::set_fail_stream_query(true);
        assert!(!device.ok());
        MockRuntime::set_fail_stream_query(false);
    }

    #[test]
    fn transfers_move_bytes_through_the_mock_backend() {
        let stream = GpuStreamDevice::<MockRuntime>::new();
        let device = GpuDevice::new(&stream);

        let src = [7u8; 64];
        let mut dst = [0u8; 64];
        let a = device.allocate(64);
        let b = device.allocate(64);

        // SAFETY: `a` and `b` are 64-byte live mock allocations and the host
        // buffers outlive the (synchronous) mock stream.
        unsafe {
            device.memcpy_host_to_device(a, src.as_ptr().cast(), 64);
            device.memcpy(b, a, 64);
            device.memcpy_device_to_host(dst.as_mut_ptr().cast(), b, 64);
        }
        device.synchronize();
        assert_eq!(dst, src);

        // SAFETY: both pointers came from `allocate` above.
        unsafe {
            device.memset(a, 0, 64);
            device.deallocate(a);
            device.deallocate(b);
        }
    }

    #[test]
    fn launch_macro_forwards_dimensions_and_arguments() {
        let stream = GpuStreamDevice::<MockRuntime>::new();
        let device = GpuDevice::new(&stream);

        fn noop() {}
        let kernel: fn() = noop;
        let input = 1u64;
        let output = 2u64;

        // SAFETY: the mock backend only records the launch.
        unsafe {
            launch_gpu_kernel!(kernel, 4u32, (8u32, 8u32), 256, device, input, output);
        }

        let (grid, block, shared_mem, num_args) = MockRuntime::last_launch().unwrap();
        assert_eq!(grid, Dim3::new(4, 1, 1));
        assert_eq!(block, Dim3::new(8, 8, 1));
        assert_eq!(shared_mem, 256);
        assert_eq!(num_args, 2);
    }

    /// A hand-rolled stand-in proving the seam accepts test doubles.
    struct FixedInterface {
        props: DeviceProperties,
    }

    impl StreamInterface<MockRuntime> for FixedInterface {
        fn stream(&self) -> MockStream {
            MockStream(42)
        }

        fn device_properties(&self) -> &DeviceProperties {
            &self.props
        }

        fn allocate(&self, _num_bytes: usize) -> crate::runtime::DevicePtr {
            crate::runtime::DevicePtr::from_raw(0xdead_0000 as *mut _)
        }

        unsafe fn deallocate(&self, _ptr: crate::runtime::DevicePtr) {}

        fn scratchpad(&self) -> crate::runtime::DevicePtr {
            crate::runtime::DevicePtr::from_raw(0xbeef_0000 as *mut _)
        }

        fn semaphore(&self) -> crate::runtime::DevicePtr {
            self.scratchpad().byte_add(crate::stream::SCRATCH_BUFFER_SIZE)
        }
    }

    #[test]
    fn any_conforming_interface_can_be_injected() {
        let double = FixedInterface {
            props: fake_properties(0),
        };
        let device = GpuDevice::new(&double);
        assert_eq!(device.stream(), MockStream(42));
        assert_eq!(device.scratchpad().addr(), 0xbeef_0000);
        assert_eq!(
            device.semaphore().addr(),
            0xbeef_0000 + crate::stream::SCRATCH_BUFFER_SIZE
        );
        assert_eq!(device.multiprocessor_count(), fake_properties(0).multiprocessor_count);
    }
}
