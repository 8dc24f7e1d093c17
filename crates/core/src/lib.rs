//! shadowhook core
//!
//! Binary-layout verification and function interception for mods running
//! inside a closed-source host application.
//!
//! - [`descriptor`] - per-platform ground truth loaded from JSON
//! - [`layout`] - the verifier checking mod-declared classes against it
//! - [`shadow`] - typed access to host objects through verified layouts
//! - [`hooks`] - the hook table, installer and call dispatcher
//! - [`mods`] - mod loading; a verified mod is the only source of hooks
//!
//! # Re-exports
//!
//! This crate re-exports the SDK and engine crates for convenience:
//! - [`sdk`] - platform keys, layouts and function identities
//! - [`engine`] - host image discovery

// Allow the crate to refer to itself as `shadowhook_core` for proc macro compatibility
extern crate self as shadowhook_core;

pub use shadowhook_engine as engine;
pub use shadowhook_sdk as sdk;

pub mod config;
pub mod descriptor;
pub mod framework;
pub mod hooks;
pub mod layout;
pub mod mods;
pub mod persistence;
pub mod shadow;

#[doc(hidden)]
pub use paste as __paste;

pub use shadowhook_macros::ShadowClass;

// Re-export commonly used items
pub use config::{ConfigError, ConfigResult, FrameworkConfig, ModConfig};
pub use descriptor::{DescriptorCatalog, DescriptorError, PlatformDescriptor};
pub use framework::{Framework, FrameworkError, CORE_MOD_ID};
pub use hooks::{
    Directive, HookEntry, HookTable, HostFunction, InstallationError, InterceptorKey, Invocation,
};
pub use layout::{verify, LayoutManifest, LayoutMismatch, LayoutMismatchError, VerificationReport};
pub use mods::{LoadError, ModHandle, ModId, ModLoader, ModManifest};
pub use persistence::{
    persist_before, FailureReason, LoaderSnapshot, LoaderState, ModRecord, Persistence, TrySaveGame,
};
pub use shadow::{ShadowClass, ShadowField};
