//! Error types for host image discovery

/// Error type for host image operations
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// No loaded module matched the requested name
    #[error("Host module not found: {0}")]
    ModuleNotFound(String),

    /// Image base pointer was null or the image had no extent
    #[error("Invalid host image '{name}': base={base:#x}, size={size:#x}")]
    InvalidImage {
        name: String,
        base: usize,
        size: usize,
    },

    /// An RVA pointed outside the mapped image
    #[error("RVA {rva:#x} is outside host image '{name}' (size {size:#x})")]
    OutOfImage { name: String, rva: u64, size: usize },

    /// Module enumeration is not available on this platform
    #[error("Module enumeration is not supported on this platform")]
    Unsupported,
}
