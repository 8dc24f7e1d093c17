//! shadowhook SDK - Host Layout Type Definitions
//!
//! This crate contains the plain data types shared by every other shadowhook
//! crate. It has no dependencies and compiles quickly, allowing parallel
//! compilation of dependent crates.
//!
//! # Modules
//!
//! - [`platform`] - `PlatformKey` and its operating system / architecture parts
//! - [`layout`] - Declared and ground-truth class/field layouts
//! - [`function`] - Interceptable function identities and their dispatch slots
//! - [`opaque`] - Opaque host object types used behind raw pointers

pub mod function;
pub mod layout;
pub mod opaque;
pub mod platform;

pub use function::{FunctionIdentity, SlotLocation};
pub use layout::{ClassDecl, ClassLayout, FieldLayout};
pub use opaque::{HostObject, HostVTable};
pub use platform::{Arch, Os, ParseError, PlatformKey};
