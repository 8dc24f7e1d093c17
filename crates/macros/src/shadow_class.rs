//! ShadowClass derive macro implementation

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{DeriveInput, Ident};

use crate::parse::{parse_shadow_class, ShadowClassArgs, ShadowFieldArgs};

/// Generate the ShadowClass implementation
pub fn derive_shadow_class(input: DeriveInput) -> TokenStream {
    match parse_shadow_class(&input) {
        Ok(args) => generate_impl(args),
        Err(e) => e.write_errors(),
    }
}

/// Accessor base name: the field ident with a leading underscore stripped
fn clean_name(ident: &Ident) -> String {
    let name = ident.to_string();
    name.strip_prefix('_').unwrap_or(&name).to_string()
}

fn generate_impl(args: ShadowClassArgs) -> TokenStream {
    if !args.is_repr_c() {
        return syn::Error::new_spanned(
            &args.ident,
            "ShadowClass requires #[repr(C)] so field offsets follow declaration order",
        )
        .to_compile_error();
    }

    let struct_name = &args.ident;
    let class_name = &args.class_name;

    let fields = match &args.data {
        darling::ast::Data::Struct(fields) => &fields.fields,
        _ => {
            return syn::Error::new_spanned(
                &args.ident,
                "ShadowClass can only be derived for structs",
            )
            .to_compile_error()
        }
    };

    let base_fields: Vec<_> = fields.iter().filter(|f| f.base).collect();
    if base_fields.len() > 1 {
        return syn::Error::new_spanned(
            &base_fields[1].ty,
            "only one field can be marked #[shadow(base)]",
        )
        .to_compile_error();
    }
    if let Some(f) = fields.iter().find(|f| f.base && f.is_host_field()) {
        return syn::Error::new_spanned(
            &f.ty,
            "#[shadow(base)] and #[shadow(field = ...)] are mutually exclusive",
        )
        .to_compile_error();
    }

    let base_field = base_fields.first().copied();

    // Explicit base name wins over the embedded base's class name
    let base_name = match (&args.base_name, base_field) {
        (Some(name), _) => quote! { ::core::option::Option::Some(#name) },
        (None, Some(f)) => {
            let ty = &f.ty;
            quote! {
                ::core::option::Option::Some(
                    <#ty as ::shadowhook_core::shadow::ShadowClass>::CLASS_NAME
                )
            }
        }
        (None, None) => quote! { ::core::option::Option::None },
    };

    let base_assert = base_field.and_then(|f| f.ident.as_ref()).map(|ident| {
        let msg = format!(
            "{}: #[shadow(base)] field `{}` must be at offset 0",
            struct_name, ident
        );
        quote! {
            const _: () = ::core::assert!(
                ::core::mem::offset_of!(#struct_name, #ident) == 0,
                #msg
            );
        }
    });

    let host_fields: Vec<_> = fields.iter().filter(|f| f.is_host_field()).collect();

    let field_decls = host_fields
        .iter()
        .map(|f| generate_field_decl(struct_name, f));

    let field_constants = host_fields
        .iter()
        .map(|f| generate_field_constant(struct_name, f));

    let accessors = host_fields.iter().map(|f| generate_accessors(f));

    quote! {
        impl ::shadowhook_core::shadow::ShadowClass for #struct_name {
            const CLASS_NAME: &'static str = #class_name;
            const BASE_NAME: ::core::option::Option<&'static str> = #base_name;

            fn declaration() -> ::shadowhook_core::sdk::ClassDecl {
                let decl = ::shadowhook_core::sdk::ClassDecl::new(
                    ::shadowhook_core::sdk::ClassLayout::new(
                        #class_name,
                        ::core::mem::size_of::<#struct_name>(),
                        <Self as ::shadowhook_core::shadow::ShadowClass>::BASE_NAME,
                    ),
                );
                #(let decl = decl.with_field(#field_decls);)*
                decl
            }
        }

        impl #struct_name {
            #(#field_constants)*
            #(#accessors)*
        }

        #base_assert
    }
}

fn generate_field_decl(struct_name: &Ident, field: &ShadowFieldArgs) -> TokenStream {
    let ident = field.ident.as_ref().unwrap();
    let field_name = field.field_name.as_ref().unwrap();
    let class_name = quote! { <Self as ::shadowhook_core::shadow::ShadowClass>::CLASS_NAME };
    let ty = &field.ty;

    quote! {
        ::shadowhook_core::sdk::FieldLayout::new(
            #class_name,
            #field_name,
            ::core::mem::offset_of!(#struct_name, #ident),
            ::core::mem::size_of::<#ty>(),
        )
    }
}

fn generate_field_constant(struct_name: &Ident, field: &ShadowFieldArgs) -> TokenStream {
    let ident = field.ident.as_ref().unwrap();
    let field_name = field.field_name.as_ref().unwrap();
    let ty = &field.ty;

    let const_name = format_ident!("{}_FIELD", clean_name(ident).to_uppercase());
    let doc = format!("Accessor for host field `{}`", field_name);

    quote! {
        #[doc = #doc]
        pub const #const_name: ::shadowhook_core::shadow::ShadowField<Self, #ty> =
            ::shadowhook_core::shadow::ShadowField::new(
                #field_name,
                ::core::mem::offset_of!(#struct_name, #ident),
            );
    }
}

fn generate_accessors(field: &ShadowFieldArgs) -> TokenStream {
    let ident = field.ident.as_ref().unwrap();
    let field_name = field.field_name.as_ref().unwrap();
    let ty = &field.ty;
    let vis = &field.vis;

    let clean = clean_name(ident);
    let getter_name = format_ident!("{}", clean);
    let setter_name = format_ident!("set_{}", clean);
    let const_name = format_ident!("{}_FIELD", clean.to_uppercase());

    let getter_doc = format!("Read host field `{}` from a live instance", field_name);
    let setter_doc = format!("Write host field `{}` of a live instance", field_name);

    let getter = quote! {
        #[doc = #getter_doc]
        ///
        /// # Safety
        /// `this` must point to a live host instance of this class.
        #[inline]
        #vis unsafe fn #getter_name(this: *const Self) -> #ty {
            Self::#const_name.read(this)
        }
    };

    let setter = if field.readonly {
        quote! {}
    } else {
        quote! {
            #[doc = #setter_doc]
            ///
            /// # Safety
            /// `this` must point to a live host instance of this class.
            #[inline]
            #vis unsafe fn #setter_name(this: *mut Self, value: #ty) {
                Self::#const_name.write(this, value)
            }
        }
    };

    quote! {
        #getter
        #setter
    }
}
