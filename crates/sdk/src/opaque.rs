//! Opaque host type definitions
//!
//! The host's classes are only known through their verified layouts, so the
//! instances themselves are handled as opaque pointees.

/// Opaque type for any host class instance
///
/// Used as the pointee of `this` pointers received by detours when no
/// shadow class is available for the callee.
#[repr(C)]
pub struct HostObject {
    _opaque: [u8; 0],
}

/// Opaque type for a host virtual table
///
/// A vtable is an array of code pointers; slots are addressed by index.
#[repr(C)]
pub struct HostVTable {
    _opaque: [u8; 0],
}
