//! Attribute parsing for ShadowClass derive macro

use darling::{FromDeriveInput, FromField};
use syn::{Attribute, DeriveInput, Ident, Type, Visibility};

/// Parsed #[shadow(...)] attributes on the struct
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(shadow), supports(struct_named), forward_attrs(repr))]
pub struct ShadowClassArgs {
    /// Struct identifier
    pub ident: Ident,

    /// Forwarded #[repr(...)] attributes
    pub attrs: Vec<Attribute>,

    /// Struct fields
    pub data: darling::ast::Data<(), ShadowFieldArgs>,

    /// Host class name (e.g., "GJGameLevel")
    #[darling(rename = "class")]
    pub class_name: String,

    /// Host base class name
    /// If not specified, taken from the `#[shadow(base)]` field's type
    #[darling(rename = "base")]
    pub base_name: Option<String>,
}

impl ShadowClassArgs {
    /// Check for `#[repr(C)]` among the forwarded attributes
    pub fn is_repr_c(&self) -> bool {
        self.attrs.iter().any(|attr| {
            let mut found = false;
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("C") {
                    found = true;
                }
                Ok(())
            });
            found
        })
    }
}

/// Parsed #[shadow(...)] attributes on a field
#[derive(Debug, FromField)]
#[darling(attributes(shadow))]
pub struct ShadowFieldArgs {
    /// Field identifier
    pub ident: Option<Ident>,

    /// Field type
    pub ty: Type,

    /// Field visibility
    pub vis: Visibility,

    /// Host field name (e.g., "m_levelName")
    /// If not specified, this is padding or the embedded base
    #[darling(rename = "field")]
    pub field_name: Option<String>,

    /// Whether this field embeds the base class shadow
    #[darling(default)]
    pub base: bool,

    /// Whether this field is read-only (no setter generated)
    #[darling(default)]
    pub readonly: bool,
}

impl ShadowFieldArgs {
    /// Check if this is a declared host field (has field_name attribute)
    pub fn is_host_field(&self) -> bool {
        self.field_name.is_some()
    }
}

/// Parse a DeriveInput into ShadowClassArgs
pub fn parse_shadow_class(input: &DeriveInput) -> darling::Result<ShadowClassArgs> {
    ShadowClassArgs::from_derive_input(input)
}
