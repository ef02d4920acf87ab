//! In-crate mock backend for unit tests.
//!
//! Mock state is thread-local, so tests running on separate harness threads
//! never observe each other's allocations or call logs. Memory is real host
//! memory and memset/memcpy are serviced immediately, which lets tests read
//! back through the pointers the abstraction hands out.

use std::alloc::{alloc, dealloc, Layout};
use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::c_void;

use crate::error::{GpuPortError, Result};
use crate::properties::{DeviceProperties, PropertyCache};
use crate::runtime::{DevicePtr, Dim3, GpuRuntime, MemcpyKind, SharedMemConfig, StreamStatus};

/// Stream handle used by the mock backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MockStream(pub u32);

/// The capability record the mock backend reports for `device`.
pub fn fake_properties(device: usize) -> DeviceProperties {
    DeviceProperties {
        name: format!("Mock Device {device}"),
        multiprocessor_count: 8 + device as u32,
        max_threads_per_block: 1024,
        max_threads_per_multiprocessor: 2048,
        shared_mem_per_block: 48 * 1024,
        major: 8,
        minor: 6,
        total_global_mem: 16 << 30,
    }
}

#[derive(Default)]
struct MockState {
    allocations: HashMap<usize, Layout>,
    set_device_log: Vec<usize>,
    last_launch: Option<(Dim3, Dim3, usize, usize)>,
    fail_stream_query: bool,
    free_count: usize,
}

thread_local! {
    static STATE: RefCell<MockState> = RefCell::new(MockState::default());
}

/// Mock adapter with two fake devices backed by host memory.
pub struct MockRuntime;

impl MockRuntime {
    fn with_state<T>(f: impl FnOnce(&mut MockState) -> T) -> T {
        STATE.with(|state| f(&mut state.borrow_mut()))
    }

    /// Whether `ptr` is a live mock allocation on this thread.
    pub fn is_live(ptr: DevicePtr) -> bool {
        Self::with_state(|state| state.allocations.contains_key(&ptr.addr()))
    }

    /// The device most recently pinned with `set_device` on this thread.
    pub fn last_set_device() -> Option<usize> {
        Self::with_state(|state| state.set_device_log.last().copied())
    }

    /// Number of `free` calls issued on this thread.
    pub fn free_count() -> usize {
        Self::with_state(|state| state.free_count)
    }

    /// Grid, block, shared-memory, and argument count of the most recent
    /// launch on this thread.
    pub fn last_launch() -> Option<(Dim3, Dim3, usize, usize)> {
        Self::with_state(|state| state.last_launch)
    }

    /// Make subsequent `stream_query` calls on this thread fail.
    pub fn set_fail_stream_query(fail: bool) {
        Self::with_state(|state| state.fail_stream_query = fail);
    }
}

impl GpuRuntime for MockRuntime {
    type Stream = MockStream;
    type Kernel = fn();

    const NAME: &'static str = "mock";

    fn default_stream() -> MockStream {
        MockStream(0)
    }

    fn device_count() -> Result<usize> {
        Ok(2)
    }

    fn current_device() -> Result<usize> {
        Ok(0)
    }

    fn set_device(device: usize) -> Result<()> {
        Self::with_state(|state| state.set_device_log.push(device));
        Ok(())
    }

    fn query_device_properties(device: usize) -> Result<DeviceProperties> {
        Ok(fake_properties(device))
    }

    fn malloc(num_bytes: usize) -> Result<DevicePtr> {
        let layout = Layout::from_size_align(num_bytes.max(1), 8).map_err(|_| {
            GpuPortError::AllocationFailed {
                size: num_bytes,
                reason: "invalid layout".into(),
            }
        })?;
        // SAFETY: `layout` has a non-zero size.
        let raw = unsafe { alloc(layout) };
        if raw.is_null() {
            return Err(GpuPortError::AllocationFailed {
                size: num_bytes,
                reason: "host allocator returned null".into(),
            });
        }
        let ptr = DevicePtr::from_raw(raw.cast());
        Self::with_state(|state| state.allocations.insert(ptr.addr(), layout));
        Ok(ptr)
    }

    unsafe fn free(ptr: DevicePtr) -> Result<()> {
        let layout = Self::with_state(|state| {
            state.free_count += 1;
            state.allocations.remove(&ptr.addr())
        });
        match layout {
            Some(layout) => {
                // SAFETY: `ptr` was produced by `alloc` with this layout and
                // is being released exactly once.
                unsafe { dealloc(ptr.as_raw().cast(), layout) };
                Ok(())
            }
            None => Err(GpuPortError::DeallocationFailed(format!(
                "pointer {ptr:?} is not a live mock allocation"
            ))),
        }
    }

    unsafe fn memset_async(
        dst: DevicePtr,
        value: u8,
        num_bytes: usize,
        _stream: MockStream,
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
        _stream: MockStream,
    ) -> Result<()> {
        // SAFETY: the caller guarantees both ranges cover `num_bytes` bytes.
        unsafe { std::ptr::copy_nonoverlapping(src.cast::<u8>(), dst.cast::<u8>(), num_bytes) };
        Ok(())
    }

    fn stream_query(_stream: MockStream) -> Result<StreamStatus> {
        Self::with_state(|state| {
            if state.fail_stream_query {
                Err(GpuPortError::StreamError("injected failure".into()))
            } else {
                Ok(StreamStatus::Complete)
            }
        })
    }

    fn stream_synchronize(_stream: MockStream) -> Result<()> {
        Ok(())
    }

    fn shared_mem_config() -> Result<SharedMemConfig> {
        Ok(SharedMemConfig::Default)
    }

    fn set_shared_mem_config(_config: SharedMemConfig) -> Result<()> {
        Ok(())
    }

    unsafe fn launch_kernel(
        kernel: fn(),
        grid: Dim3,
        block: Dim3,
        shared_mem_bytes: usize,
        _stream: MockStream,
        args: &mut [*mut c_void],
    ) -> Result<()> {
        Self::with_state(|state| {
            state.last_launch = Some((grid, block, shared_mem_bytes, args.len()));
        });
        kernel();
        Ok(())
    }

    fn property_cache() -> &'static PropertyCache<Self> {
        static CACHE: PropertyCache<MockRuntime> = PropertyCache::new();
        &CACHE
    }
}
