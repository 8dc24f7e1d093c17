//! shadowhook Proc Macros
//!
//! This crate provides proc macros for the shadowhook framework:
//!
//! - `#[derive(ShadowClass)]` - Declare a host class layout and generate
//!   field accessors whose offsets are verified against the host binary
//!
//! # ShadowClass Example
//!
//! ```ignore
//! use shadowhook_core::shadow::ShadowClass;
//!
//! #[derive(ShadowClass)]
//! #[shadow(class = "CCObject")]
//! #[repr(C)]
//! pub struct CCObject {
//!     _vtable: *const (),
//!     #[shadow(field = "m_uID")]
//!     pub id: u32,
//!     _pad: [u8; 0x14],
//! }
//!
//! #[derive(ShadowClass)]
//! #[shadow(class = "CCNode")]
//! #[repr(C)]
//! pub struct CCNode {
//!     #[shadow(base)]
//!     pub base: CCObject,
//!
//!     #[shadow(field = "m_fRotationX")]
//!     pub rotation_x: f32,
//!
//!     #[shadow(field = "m_bRunning", readonly)]
//!     pub running: bool,
//! }
//!
//! // Generated:
//! // - impl ShadowClass for CCNode (CLASS_NAME, BASE_NAME, declaration())
//! // - CCNode::ROTATION_X_FIELD: ShadowField<CCNode, f32>
//! // - unsafe fn CCNode::rotation_x(this: *const CCNode) -> f32
//! // - unsafe fn CCNode::set_rotation_x(this: *mut CCNode, value: f32)
//! // - unsafe fn CCNode::running(this: *const CCNode) -> bool
//! ```
//!
//! # Attributes
//!
//! ## Struct Attributes
//!
//! - `#[shadow(class = "ClassName")]` - **Required.** The host class name.
//! - `#[shadow(base = "BaseName")]` - Optional. The host base class name when
//!   the base is not itself shadowed.
//!
//! ## Field Attributes
//!
//! - `#[shadow(field = "m_fieldName")]` - Declare a host field with the given name.
//! - `#[shadow(base)]` - Embedded base class shadow; must sit at offset 0.
//! - `#[shadow(readonly)]` - Don't generate a setter.
//!
//! Fields without attributes are padding and are not declared.

mod parse;
mod shadow_class;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

/// Derive macro for shadow structs
///
/// Emits the class declaration consumed by the layout verifier and typed
/// accessors for every declared field.
///
/// # Generated Code
///
/// For each declared field, the macro generates:
///
/// - A `{NAME}_FIELD` constant of type `ShadowField<Self, T>`
/// - A getter (`unsafe fn name(this: *const Self) -> T`)
/// - A setter (`unsafe fn set_name(this: *mut Self, value: T)`) unless `readonly`
///
/// Offsets and sizes come from `offset_of!` and `size_of` on the struct
/// itself, so the declaration can never drift from the Rust definition.
/// The struct must be `#[repr(C)]`.
#[proc_macro_derive(ShadowClass, attributes(shadow))]
pub fn derive_shadow_class(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    shadow_class::derive_shadow_class(input).into()
}
