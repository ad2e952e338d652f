//! Error Types
//!
//! The main error type [`EmberError`] covers all failure modes of the engine:
//! GPU initialization and surface loss, asset loading and decoding, scene
//! reference and capacity violations, and worker-pool failures.
//!
//! All public APIs return [`Result<T>`], an alias for
//! `std::result::Result<T, EmberError>`.

use thiserror::Error;

/// The main error type for the Ember engine.
#[derive(Error, Debug)]
pub enum EmberError {
    // ========================================================================
    // GPU & Rendering Errors
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[error("Failed to request WGPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    /// Swap chain or device error. The renderer reconfigures the surface on
    /// the next tick; a persistent failure shuts the engine down.
    #[error("Device lost: {0}")]
    DeviceLost(String),

    /// Window system error.
    #[error("Window system error: {0}")]
    WindowError(#[from] raw_window_handle::HandleError),

    /// Event loop error (winit).
    #[error("Event loop error: {0}")]
    EventLoopError(#[from] winit::error::EventLoopError),

    // ========================================================================
    // Scene Errors
    // ========================================================================
    /// Out-of-range model / material / texture index. The referent is
    /// skipped and the incident logged once; this is never fatal.
    #[error("Bad reference: {context} (index: {index})")]
    BadReference {
        /// Description of what was being referenced
        context: &'static str,
        /// The invalid index
        index: u32,
    },

    /// A sized GPU buffer (node proxies, indirect draws) would overflow.
    /// Fatal for the operation; the buffer must be rebuilt at a larger
    /// upper bound.
    #[error("Capacity exceeded: {context} ({requested} > {capacity})")]
    Capacity {
        /// Description of the overflowing buffer
        context: &'static str,
        /// Number of entries requested
        requested: usize,
        /// Number of entries the buffer was sized for
        capacity: usize,
    },

    // ========================================================================
    // Asset Loading Errors
    // ========================================================================
    /// A scene file failed to parse. The previous scene is kept and the
    /// engine returns to Running.
    #[error("Failed to parse scene asset: {0}")]
    AssetParse(String),

    /// The requested asset was not found.
    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    /// File I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// glTF parsing or loading error.
    #[error("glTF error: {0}")]
    GltfError(String),

    /// Image encoding error (screen capture).
    #[error("Image encode error: {0}")]
    ImageError(String),

    /// JSON parsing error (glTF extras).
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    // ========================================================================
    // Worker Errors
    // ========================================================================
    /// A worker task panicked. Caught at the worker boundary; the task is
    /// logged and skipped and its completion is not delivered.
    #[error("Worker task panicked: {0}")]
    WorkerPanic(String),
}

impl From<image::ImageError> for EmberError {
    fn from(err: image::ImageError) -> Self {
        EmberError::ImageError(err.to_string())
    }
}

impl From<gltf::Error> for EmberError {
    fn from(err: gltf::Error) -> Self {
        EmberError::GltfError(err.to_string())
    }
}

/// Alias for `Result<T, EmberError>`.
pub type Result<T> = std::result::Result<T, EmberError>;
