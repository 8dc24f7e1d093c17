//! Error type for hook installation

use shadowhook_engine::HostError;
use shadowhook_sdk::{FunctionIdentity, PlatformKey};

/// A hook request that could not take effect
///
/// Returned before any host memory is modified, or after the modification
/// has been rolled back; a failed request never leaves a partial install.
#[derive(Debug, thiserror::Error)]
pub enum InstallationError {
    #[error("{identity} has no dispatch slot on {platform}")]
    UnknownFunction {
        identity: FunctionIdentity,
        platform: PlatformKey,
    },

    #[error("{identity} is virtual but class '{class}' has no vtable on {platform}")]
    MissingVtable {
        identity: FunctionIdentity,
        class: String,
        platform: PlatformKey,
    },

    #[error("Dispatch slot of {identity} is outside the host image: {source}")]
    OutOfImage {
        identity: FunctionIdentity,
        #[source]
        source: HostError,
    },

    #[error("Pattern for {identity} not found in host image: {pattern}")]
    PatternNotFound {
        identity: FunctionIdentity,
        pattern: String,
    },

    #[error("Invalid pattern for {identity}: {reason}")]
    InvalidPattern {
        identity: FunctionIdentity,
        reason: String,
    },

    #[error("Original entry point of {identity} is null")]
    NullOriginal { identity: FunctionIdentity },

    #[error("Memory protection failed at {address:#x}: {reason}")]
    Protection { address: usize, reason: String },

    #[error("Prologue at {address:#x} is too short to patch ({available} bytes before control leaves)")]
    PrologueTooShort { address: usize, available: usize },

    #[error("Instruction relocation failed: {0}")]
    Relocation(String),

    #[error("Failed to allocate trampoline near {address:#x}")]
    TrampolineAllocation { address: usize },

    #[error("Unsupported: {0}")]
    Unsupported(&'static str),

    #[error("{identity} is already declared with a different signature")]
    SignatureConflict { identity: FunctionIdentity },

    #[error("{identity} is already installed by another hook table")]
    BoundElsewhere { identity: FunctionIdentity },

    #[error("Interceptor not found")]
    UnknownInterceptor,
}
