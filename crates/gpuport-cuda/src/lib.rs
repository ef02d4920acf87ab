//! CUDA backend for GpuPort.
//!
//! Implements the [`GpuRuntime`](gpuport_core::GpuRuntime) adapter on top of
//! the CUDA runtime API through `cudarc`'s raw bindings. The bindings are
//! dynamically loaded, so this crate builds on machines without a CUDA
//! toolkit; the library is resolved at first use.
//!
//! # Requirements
//!
//! - NVIDIA GPU and driver at run time
//! - the `cuda` Cargo feature
//!
//! # Example
//!
//! ```ignore
//! use gpuport_core::{GpuDevice, GpuStreamDevice};
//! use gpuport_cuda::CudaRuntime;
//!
//! let stream = GpuStreamDevice::<CudaRuntime>::on_device(0);
//! let device = GpuDevice::new(&stream);
//! let buffer = device.allocate(1 << 20);
//! device.synchronize();
//! unsafe { device.deallocate(buffer) };
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(feature = "cuda")]
mod runtime;

#[cfg(feature = "cuda")]
pub use runtime::{is_cuda_available, CudaKernel, CudaRuntime, CudaStream};
