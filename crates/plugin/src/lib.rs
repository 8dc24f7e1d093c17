//! shadowhook loader library
//!
//! This crate provides the C ABI boundary between the host-side bootstrap
//! and the Rust core. It compiles to a cdylib (.so/.dll) that the bootstrap
//! loads into the host process, and to an rlib that mods link against to
//! reach the running [`Framework`](shadowhook_core::Framework).

pub mod ffi;

pub use ffi::exports::{is_running, with_framework};
pub use shadowhook_core as core;
