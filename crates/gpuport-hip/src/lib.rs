//! HIP backend for GpuPort.
//!
//! Implements the [`GpuRuntime`](gpuport_core::GpuRuntime) adapter on top of
//! the HIP runtime API through the ROCm 6 bindings. Structurally the HIP
//! runtime mirrors the CUDA runtime call for call, so this adapter is the
//! CUDA adapter with the vendor symbols swapped, which is exactly the
//! difference this layer exists to hide.
//!
//! # Requirements
//!
//! - AMD GPU with a ROCm 6 installation at build and run time
//! - the `hip` Cargo feature
//!
//! # Example
//!
//! ```ignore
//! use gpuport_core::{GpuDevice, GpuStreamDevice};
//! use gpuport_hip::HipRuntime;
//!
//! let stream = GpuStreamDevice::<HipRuntime>::on_device(0);
//! let device = GpuDevice::new(&stream);
//! let buffer = device.allocate(1 << 20);
//! device.synchronize();
//! unsafe { device.deallocate(buffer) };
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(feature = "hip")]
mod runtime;

#[cfg(feature = "hip")]
pub use runtime::{is_hip_available, HipKernel, HipRuntime, HipStream};
