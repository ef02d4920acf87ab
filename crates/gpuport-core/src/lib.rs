//! # GpuPort Core
//!
//! Backend-agnostic device abstractions for the GpuPort runtime portability
//! layer.
//!
//! This crate defines the pieces a numeric-kernel library needs to allocate
//! device memory, move data, and launch kernels without depending on which
//! vendor runtime is linked:
//!
//! - [`GpuRuntime`] - the vendor adapter contract, implemented once per
//!   backend (CUDA, HIP, host)
//! - [`PropertyCache`] - process-wide, lazily-initialized cache of per-device
//!   capability records
//! - [`StreamInterface`] - the seam decoupling execution context from stream
//!   ownership; any conforming implementation can be injected
//! - [`GpuStreamDevice`] - the production interface implementation, bound to
//!   one device and one stream, owning the lazy scratch/semaphore block
//! - [`GpuDevice`] - the facade calling code threads through every memory
//!   and launch operation
//! - [`launch_gpu_kernel!`] - the variadic kernel-launch primitive
//!
//! ## Example
//!
//! ```ignore
//! use gpuport_core::{GpuDevice, GpuStreamDevice};
//! use gpuport_cuda::CudaRuntime;
//!
//! let stream = GpuStreamDevice::<CudaRuntime>::on_device(0);
//! let device = GpuDevice::new(&stream);
//!
//! let buffer = device.allocate(4096);
//! unsafe { device.memset(buffer, 0, 4096) };
//! device.synchronize();
//! unsafe { device.deallocate(buffer) };
//! ```
//!
//! ## Error model
//!
//! Adapters return [`Result`](error::Result); the stream-device and facade
//! layers treat every runtime-boundary failure as unrecoverable and panic
//! after routing the vendor diagnostic through `tracing`. There is no retry
//! logic anywhere in this crate.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod device;
pub mod error;
pub mod properties;
pub mod runtime;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use device::GpuDevice;
pub use error::{GpuPortError, Result};
pub use properties::{DeviceProperties, PropertyCache};
pub use runtime::{
    set_gpu_shared_mem_config, DevicePtr, Dim3, GpuRuntime, MemcpyKind, SharedMemConfig,
    StreamStatus,
};
pub use stream::{GpuStreamDevice, StreamInterface, SCRATCH_BUFFER_SIZE, SEMAPHORE_SIZE};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::device::GpuDevice;
    pub use crate::error::{GpuPortError, Result};
    pub use crate::properties::{DeviceProperties, PropertyCache};
    pub use crate::runtime::{
        set_gpu_shared_mem_config, DevicePtr, Dim3, GpuRuntime, MemcpyKind, SharedMemConfig,
        StreamStatus,
    };
    pub use crate::stream::{
        GpuStreamDevice, StreamInterface, SCRATCH_BUFFER_SIZE, SEMAPHORE_SIZE,
    };
}
