//! Host-memory backend for GpuPort.
//!
//! This crate implements the [`GpuRuntime`](gpuport_core::GpuRuntime)
//! adapter on top of plain host memory. It is primarily used for testing and
//! as a fallback when no GPU is available: streams complete trivially, fills
//! and copies are serviced immediately, and kernel launches execute the
//! kernel entry synchronously on the calling thread. It is not a parallel
//! GPU simulator.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

mod runtime;

pub use runtime::{HostKernel, HostRuntime, HostStream};
