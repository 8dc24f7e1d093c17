//! Typed field accessor constants

use std::fmt;
use std::marker::PhantomData;

use shadowhook_sdk::FieldLayout;

use super::ShadowClass;

/// A field of shadow class `C` holding a `T`
///
/// Unlike descriptor lookups, the offset is a compile-time constant taken
/// from the Rust struct itself, so accessors are const-constructible and
/// carry no lazy state.
///
/// # Example
///
/// ```ignore
/// const ATTEMPTS: ShadowField<GameLevel, i32> =
///     ShadowField::new("m_attempts", std::mem::offset_of!(GameLevel, attempts));
///
/// unsafe {
///     let n = ATTEMPTS.read(level);
///     ATTEMPTS.write(level, n + 1);
/// }
/// ```
pub struct ShadowField<C, T> {
    name: &'static str,
    offset: usize,
    _marker: PhantomData<fn() -> (*const C, T)>,
}

impl<C, T> ShadowField<C, T> {
    /// Create a field accessor
    ///
    /// # Arguments
    /// * `name` - Host field name (e.g., "m_attempts")
    /// * `offset` - Byte offset from the start of `C`
    pub const fn new(name: &'static str, offset: usize) -> Self {
        Self {
            name,
            offset,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn offset(&self) -> usize {
        self.offset
    }
}

impl<C: ShadowClass, T> ShadowField<C, T> {
    /// Declared layout of this field
    pub fn layout(&self) -> FieldLayout {
        FieldLayout::new(C::CLASS_NAME, self.name, self.offset, std::mem::size_of::<T>())
    }
}

impl<C, T: Copy> ShadowField<C, T> {
    /// Read the field from a live instance
    ///
    /// # Safety
    /// - `this` must point to a live host instance of `C`
    /// - `C`'s layout must have passed verification for the running platform
    #[inline]
    pub unsafe fn read(&self, this: *const C) -> T {
        debug_assert!(!this.is_null(), "Null host instance");
        let ptr = this.byte_add(self.offset) as *const T;
        debug_assert!(ptr.is_aligned(), "Misaligned read of {}", self.name);
        ptr.read()
    }

    /// Write the field of a live instance
    ///
    /// # Safety
    /// Same contract as [`read`](Self::read); the instance must also be writable.
    #[inline]
    pub unsafe fn write(&self, this: *mut C, value: T) {
        debug_assert!(!this.is_null(), "Null host instance");
        let ptr = this.byte_add(self.offset) as *mut T;
        debug_assert!(ptr.is_aligned(), "Misaligned write of {}", self.name);
        ptr.write(value);
    }
}

impl<C, T> Clone for ShadowField<C, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C, T> Copy for ShadowField<C, T> {}

impl<C, T> fmt::Debug for ShadowField<C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowField")
            .field("name", &self.name)
            .field("offset", &self.offset)
            .finish()
    }
}
