//! Class and field layouts
//!
//! The same types describe both sides of a layout check: what a mod declares
//! for its shadow classes, and the ground truth extracted from the host
//! binary for one platform.

/// Position of one field inside a host class instance
///
/// `offset` is absolute: it is measured from the start of the most-derived
/// object, so fields inherited from a base class keep the base's offsets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldLayout {
    pub class: String,
    pub field: String,
    pub offset: usize,
    pub size: usize,
}

impl FieldLayout {
    pub fn new(
        class: impl Into<String>,
        field: impl Into<String>,
        offset: usize,
        size: usize,
    ) -> Self {
        Self {
            class: class.into(),
            field: field.into(),
            offset,
            size,
        }
    }

    /// One past the last byte of the field
    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Total size and (single) base class of a host class
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassLayout {
    pub name: String,
    pub size: usize,
    pub base: Option<String>,
}

impl ClassLayout {
    pub fn new(name: impl Into<String>, size: usize, base: Option<&str>) -> Self {
        Self {
            name: name.into(),
            size,
            base: base.map(str::to_string),
        }
    }
}

/// A class layout together with its declared fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDecl {
    pub layout: ClassLayout,
    pub fields: Vec<FieldLayout>,
}

impl ClassDecl {
    pub fn new(layout: ClassLayout) -> Self {
        Self {
            layout,
            fields: Vec::new(),
        }
    }

    /// Add a field, builder style
    pub fn with_field(mut self, field: FieldLayout) -> Self {
        self.fields.push(field);
        self
    }

    pub fn name(&self) -> &str {
        &self.layout.name
    }

    /// Look up a declared field by name
    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.field == name)
    }
}
