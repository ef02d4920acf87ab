//! # GpuPort
//!
//! A uniform abstraction over GPU compute runtimes, so numeric-kernel code
//! can allocate device memory, move data, launch kernels, and synchronize
//! without depending on which vendor runtime is linked.
//!
//! ## Quick Start
//!
//! ```ignore
//! use gpuport::prelude::*;
//! use gpuport::{NativeDevice, NativeStreamDevice};
//!
//! // One stream device per execution context; the facade borrows it.
//! let stream = NativeStreamDevice::on_device(0);
//! let device = NativeDevice::new(&stream);
//!
//! let buffer = device.allocate(1 << 20);
//! unsafe { device.memset(buffer, 0, 1 << 20) };
//! device.synchronize();
//! unsafe { device.deallocate(buffer) };
//! ```
//!
//! ## Backends
//!
//! - **Host** - testing and fallback (always available)
//! - **CUDA** - NVIDIA GPUs (requires the `cuda` feature)
//! - **HIP** - AMD GPUs (requires the `hip` feature)
//!
//! Exactly one native backend is active per build; `cuda` and `hip` are
//! mutually exclusive. With neither enabled, the host backend stands in so
//! the whole surface stays exercisable on machines without a GPU.
//!
//! ```toml
//! [dependencies]
//! gpuport = { version = "0.1", features = ["cuda"] }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                 numeric-kernel code                    │
//! │        GpuDevice ── launch_gpu_kernel! ── queries      │
//! └───────────────────────────┬────────────────────────────┘
//!                             │ StreamInterface (injected)
//! ┌───────────────────────────┴────────────────────────────┐
//! │   GpuStreamDevice: device index + stream + scratch     │
//! └───────────────────────────┬────────────────────────────┘
//!                             │ GpuRuntime (one per build)
//! ┌──────────────┬────────────┴─────────────┬──────────────┐
//! │ CudaRuntime  │        HipRuntime        │ HostRuntime  │
//! └──────────────┴──────────────────────────┴──────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(hidden_glob_reexports)]

#[cfg(all(feature = "cuda", feature = "hip"))]
compile_error!(
    "features `cuda` and `hip` select the native backend and are mutually exclusive"
);

// Re-export core types
pub use gpuport_core::*;

// Re-export the launch primitive
pub use gpuport_core::launch_gpu_kernel;

// Re-export the host backend (always available)
pub use gpuport_host::HostRuntime;

// Conditional re-exports for GPU backends
#[cfg(feature = "cuda")]
pub use gpuport_cuda::CudaRuntime;

#[cfg(feature = "hip")]
pub use gpuport_hip::HipRuntime;

/// The native backend selected at build time.
#[cfg(feature = "cuda")]
pub type NativeRuntime = gpuport_cuda::CudaRuntime;

/// The native backend selected at build time.
#[cfg(all(feature = "hip", not(feature = "cuda")))]
pub type NativeRuntime = gpuport_hip::HipRuntime;

/// The native backend selected at build time.
///
/// No GPU feature is enabled in this build, so the host backend stands in.
#[cfg(not(any(feature = "cuda", feature = "hip")))]
pub type NativeRuntime = gpuport_host::HostRuntime;

/// Stream device bound to the native backend.
pub type NativeStreamDevice = GpuStreamDevice<NativeRuntime>;

/// Device facade bound to the native backend.
pub type NativeDevice<'a> = GpuDevice<'a, NativeRuntime>;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{NativeDevice, NativeRuntime, NativeStreamDevice};
    pub use gpuport_core::prelude::*;
    pub use gpuport_host::HostRuntime;
}

/// Identifies a compiled-in backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Host-memory fallback backend.
    Host,
    /// NVIDIA CUDA backend.
    Cuda,
    /// AMD HIP backend.
    Hip,
}

/// Check availability of backends at runtime.
pub mod availability {
    use super::Backend;

    /// Whether a CUDA device is usable in this build and on this machine.
    pub fn cuda() -> bool {
        #[cfg(feature = "cuda")]
        {
            gpuport_cuda::is_cuda_available()
        }
        #[cfg(not(feature = "cuda"))]
        {
            false
        }
    }

    /// Whether a HIP device is usable in this build and on this machine.
    pub fn hip() -> bool {
        #[cfg(feature = "hip")]
        {
            gpuport_hip::is_hip_available()
        }
        #[cfg(not(feature = "hip"))]
        {
            false
        }
    }

    /// Backends usable in this build and on this machine.
    pub fn available_backends() -> Vec<Backend> {
        let mut backends = vec![Backend::Host];
        if cuda() {
            backends.push(Backend::Cuda);
        }
        if hip() {
            backends.push(Backend::Hip);
        }
        backends
    }
}
