//! Typed access to fields of live host objects
//!
//! A shadow struct is a `#[repr(C)]` Rust struct whose fields sit at the
//! same offsets as the host class it mirrors. Its declaration (derived by
//! `#[derive(ShadowClass)]`) is checked against the platform descriptor when
//! the owning mod loads; after that, reads and writes are plain pointer
//! arithmetic with no runtime checks beyond debug assertions.
//!
//! # Example
//!
//! ```ignore
//! use shadowhook_core::ShadowClass;
//!
//! #[derive(ShadowClass)]
//! #[shadow(class = "GJGameLevel")]
//! #[repr(C)]
//! pub struct GameLevel {
//!     _vtable: *const (),
//!     #[shadow(field = "m_levelID")]
//!     pub level_id: i32,
//!     #[shadow(field = "m_attempts")]
//!     pub attempts: i32,
//! }
//!
//! unsafe {
//!     let attempts = GameLevel::attempts(level);
//!     GameLevel::set_attempts(level, attempts + 1);
//! }
//! ```

mod field;

pub use field::ShadowField;

use shadowhook_sdk::{ClassDecl, FieldLayout};

/// A Rust struct mirroring a host class
///
/// Normally derived; see the crate-level `ShadowClass` derive.
pub trait ShadowClass {
    /// Host class name as it appears in platform descriptors
    const CLASS_NAME: &'static str;

    /// Host base class name, if the class has one
    const BASE_NAME: Option<&'static str>;

    /// Declared layout: total size, base and every declared field
    fn declaration() -> ClassDecl;
}

/// Read a field of a live host object
///
/// # Safety
/// - `instance` must point to a live host object whose class layout passed
///   verification for the running platform
/// - `T` must have exactly the field's declared size
#[inline]
pub unsafe fn read<T: Copy, C>(instance: *const C, field: &FieldLayout) -> T {
    debug_assert!(!instance.is_null(), "Null host instance");
    debug_assert_eq!(
        std::mem::size_of::<T>(),
        field.size,
        "Size mismatch reading {}::{}",
        field.class,
        field.field
    );

    let ptr = instance.byte_add(field.offset) as *const T;
    debug_assert!(ptr.is_aligned(), "Misaligned read of {}", field.field);
    ptr.read()
}

/// Write a field of a live host object
///
/// # Safety
/// Same contract as [`read`]; the object must also be writable.
#[inline]
pub unsafe fn write<T: Copy, C>(instance: *mut C, field: &FieldLayout, value: T) {
    debug_assert!(!instance.is_null(), "Null host instance");
    debug_assert_eq!(
        std::mem::size_of::<T>(),
        field.size,
        "Size mismatch writing {}::{}",
        field.class,
        field.field
    );

    let ptr = instance.byte_add(field.offset) as *mut T;
    debug_assert!(ptr.is_aligned(), "Misaligned write of {}", field.field);
    ptr.write(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowhook_macros::ShadowClass;

    #[derive(ShadowClass)]
    #[shadow(class = "CCObject")]
    #[repr(C)]
    struct Object {
        _vtable: usize,
        #[shadow(field = "m_uID")]
        id: u32,
        #[shadow(field = "m_nTag", readonly)]
        tag: i32,
    }

    #[derive(ShadowClass)]
    #[shadow(class = "CCNode")]
    #[repr(C)]
    struct Node {
        #[shadow(base)]
        base: Object,
        #[shadow(field = "m_fRotationX")]
        rotation_x: f32,
        _pad: [u8; 4],
        #[shadow(field = "m_bVisible")]
        visible: bool,
    }

    fn node() -> Node {
        Node {
            base: Object {
                _vtable: 0,
                id: 7,
                tag: -1,
            },
            rotation_x: 1.5,
            _pad: [0; 4],
            visible: true,
        }
    }

    #[test]
    fn test_free_read_write() {
        let mut node = node();
        let ptr = &mut node as *mut Node;
        let layout = FieldLayout::new("CCNode", "m_fRotationX", std::mem::offset_of!(Node, rotation_x), 4);

        unsafe {
            assert_eq!(read::<f32, _>(ptr as *const Node, &layout), 1.5);
            write::<f32, _>(ptr, &layout, 90.0);
        }
        assert_eq!(node.rotation_x, 90.0);
    }

    #[test]
    fn test_derived_declaration() {
        assert_eq!(Object::CLASS_NAME, "CCObject");
        assert_eq!(Object::BASE_NAME, None);
        assert_eq!(Node::BASE_NAME, Some("CCObject"));

        let decl = Node::declaration();
        assert_eq!(decl.name(), "CCNode");
        assert_eq!(decl.layout.size, std::mem::size_of::<Node>());
        assert_eq!(decl.layout.base.as_deref(), Some("CCObject"));

        // Inherited fields belong to the base's declaration
        assert!(decl.field("m_uID").is_none());

        let rotation = decl.field("m_fRotationX").unwrap();
        assert_eq!(rotation.class, "CCNode");
        assert_eq!(rotation.offset, std::mem::offset_of!(Node, rotation_x));
        assert_eq!(rotation.size, 4);

        let visible = decl.field("m_bVisible").unwrap();
        assert_eq!(visible.offset, std::mem::offset_of!(Node, visible));
        assert_eq!(visible.size, 1);

        let base = Object::declaration();
        assert_eq!(base.fields.len(), 2);
        assert_eq!(base.field("m_uID").unwrap().offset, std::mem::size_of::<usize>());
    }

    #[test]
    fn test_generated_accessors() {
        let mut node = node();
        let node_ptr = &mut node as *mut Node;
        let object_ptr = node_ptr as *mut Object;

        unsafe {
            assert_eq!(Object::id(object_ptr), 7);
            assert_eq!(Object::tag(object_ptr), -1);
            Object::set_id(object_ptr, 42);

            assert!(Node::visible(node_ptr));
            Node::set_visible(node_ptr, false);
            Node::set_rotation_x(node_ptr, 45.0);
        }

        assert_eq!(node.base.id, 42);
        assert!(!node.visible);
        assert_eq!(node.rotation_x, 45.0);
    }

    #[test]
    fn test_field_constants() {
        assert_eq!(Node::ROTATION_X_FIELD.name(), "m_fRotationX");
        assert_eq!(
            Node::ROTATION_X_FIELD.offset(),
            std::mem::offset_of!(Node, rotation_x)
        );

        let layout = Object::ID_FIELD.layout();
        assert_eq!(layout.class, "CCObject");
        assert_eq!(layout.size, 4);
    }
}
