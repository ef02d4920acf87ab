//! Error types shared by every GpuPort backend.

use thiserror::Error;

/// Result type for GpuPort operations.
pub type Result<T> = std::result::Result<T, GpuPortError>;

/// Errors reported by vendor runtime adapters.
///
/// Adapters convert raw vendor status codes into these variants, carrying the
/// vendor's human-readable error string. The stream-device and facade layers
/// treat runtime-boundary failures as unrecoverable; these values exist so
/// adapters and test backends stay non-panicking and so diagnostics reach the
/// log before the process dies.
#[derive(Error, Debug)]
pub enum GpuPortError {
    /// The number of visible devices could not be determined.
    #[error("failed to enumerate devices: {0}")]
    DeviceEnumeration(String),

    /// Querying the capability record of a specific device failed.
    #[error("failed to query properties for device {device}: {reason}")]
    PropertyQuery {
        /// Index of the device whose query failed.
        device: usize,
        /// Vendor diagnostic text.
        reason: String,
    },

    /// Device memory allocation failed or produced a null pointer.
    #[error("device allocation of {size} bytes failed: {reason}")]
    AllocationFailed {
        /// Requested allocation size in bytes.
        size: usize,
        /// Vendor diagnostic text.
        reason: String,
    },

    /// Releasing device memory failed.
    #[error("device deallocation failed: {0}")]
    DeallocationFailed(String),

    /// Switching the active device context failed.
    #[error("failed to activate device {device}: {reason}")]
    DeviceSwitch {
        /// Index of the device that could not be activated.
        device: usize,
        /// Vendor diagnostic text.
        reason: String,
    },

    /// An asynchronous copy or fill could not be enqueued.
    #[error("transfer failed: {0}")]
    TransferFailed(String),

    /// A kernel launch was rejected by the runtime.
    #[error("kernel launch failed: {0}")]
    LaunchFailed(String),

    /// A device index outside the visible range was supplied.
    #[error("invalid device index {device}: {count} device(s) visible")]
    InvalidDevice {
        /// The offending index.
        device: usize,
        /// Number of devices actually visible.
        count: usize,
    },

    /// A stream poll or synchronization reported a failure.
    #[error("stream error: {0}")]
    StreamError(String),

    /// The backend does not support the requested operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Any other backend-reported failure.
    #[error("backend error: {0}")]
    BackendError(String),
}
