//! Structural comparison of declared layouts against ground truth

use std::collections::{HashMap, HashSet};
use std::fmt;

use thiserror::Error;

use shadowhook_sdk::{ClassDecl, PlatformKey};

use crate::descriptor::PlatformDescriptor;

/// One way a declared layout can disagree with the ground truth
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutMismatch {
    #[error("class {class}: not described for this platform")]
    UnknownClass { class: String },

    #[error("class {class}: declared more than once")]
    DuplicateClass { class: String },

    #[error("class {class}: size {declared:#x} declared, {expected:#x} expected")]
    ClassSize {
        class: String,
        expected: usize,
        declared: usize,
    },

    #[error("class {class}: base {declared:?} declared, {expected:?} expected")]
    BaseMismatch {
        class: String,
        expected: Option<String>,
        declared: Option<String>,
    },

    #[error("class {class}: size {size:#x} is smaller than base {base} ({base_size:#x})")]
    SizeBelowBase {
        class: String,
        base: String,
        size: usize,
        base_size: usize,
    },

    #[error("field {class}::{field}: not described for this platform")]
    UnknownField { class: String, field: String },

    #[error("field {class}::{field}: offset {declared:#x} declared, {expected:#x} expected")]
    FieldOffset {
        class: String,
        field: String,
        expected: usize,
        declared: usize,
    },

    #[error("field {class}::{field}: size {declared:#x} declared, {expected:#x} expected")]
    FieldSize {
        class: String,
        field: String,
        expected: usize,
        declared: usize,
    },

    #[error("field {class}::{field}: declared more than once")]
    DuplicateField { class: String, field: String },

    #[error("field {owner}::{field}: listed in the declaration of {class}")]
    ForeignField {
        class: String,
        field: String,
        owner: String,
    },
}

impl LayoutMismatch {
    /// The declared class the mismatch was found in
    pub fn class(&self) -> &str {
        match self {
            LayoutMismatch::UnknownClass { class }
            | LayoutMismatch::DuplicateClass { class }
            | LayoutMismatch::ClassSize { class, .. }
            | LayoutMismatch::BaseMismatch { class, .. }
            | LayoutMismatch::SizeBelowBase { class, .. }
            | LayoutMismatch::UnknownField { class, .. }
            | LayoutMismatch::FieldOffset { class, .. }
            | LayoutMismatch::FieldSize { class, .. }
            | LayoutMismatch::DuplicateField { class, .. }
            | LayoutMismatch::ForeignField { class, .. } => class,
        }
    }

    /// The offending field, for field-level mismatches
    pub fn field(&self) -> Option<&str> {
        match self {
            LayoutMismatch::UnknownField { field, .. }
            | LayoutMismatch::FieldOffset { field, .. }
            | LayoutMismatch::FieldSize { field, .. }
            | LayoutMismatch::DuplicateField { field, .. }
            | LayoutMismatch::ForeignField { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Pass/fail verdict for one declared class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassVerdict {
    pub class: String,
    pub mismatches: Vec<LayoutMismatch>,
}

impl ClassVerdict {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Verdicts for every class of one verification run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub platform: PlatformKey,
    pub verdicts: Vec<ClassVerdict>,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.verdicts.iter().all(ClassVerdict::passed)
    }

    /// Every mismatch, in declaration order
    pub fn mismatches(&self) -> impl Iterator<Item = &LayoutMismatch> {
        self.verdicts.iter().flat_map(|v| v.mismatches.iter())
    }

    /// Names of the classes that failed
    pub fn failed_classes(&self) -> impl Iterator<Item = &str> {
        self.verdicts
            .iter()
            .filter(|v| !v.passed())
            .map(|v| v.class.as_str())
    }

    pub fn into_result(self) -> Result<(), LayoutMismatchError> {
        if self.passed() {
            return Ok(());
        }

        Err(LayoutMismatchError {
            platform: self.platform,
            mismatches: self
                .verdicts
                .into_iter()
                .flat_map(|v| v.mismatches)
                .collect(),
        })
    }
}

/// A failed verification: fatal to the load of the declaring mod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutMismatchError {
    pub platform: PlatformKey,
    pub mismatches: Vec<LayoutMismatch>,
}

impl fmt::Display for LayoutMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} layout mismatch(es) on {}",
            self.mismatches.len(),
            self.platform
        )?;
        if let Some(first) = self.mismatches.first() {
            write!(f, "; first: {}", first)?;
        }
        Ok(())
    }
}

impl std::error::Error for LayoutMismatchError {}

/// Check declared classes against a platform descriptor
///
/// Runs to completion: every class gets a verdict, and every mismatch in a
/// class is reported rather than just the first.
pub fn verify(descriptor: &PlatformDescriptor, decls: &[ClassDecl]) -> VerificationReport {
    let declared_sizes: HashMap<&str, usize> = decls
        .iter()
        .map(|d| (d.name(), d.layout.size))
        .collect();

    let mut seen_classes = HashSet::new();
    let verdicts = decls
        .iter()
        .map(|decl| {
            let duplicate = !seen_classes.insert(decl.name());
            let mismatches = if duplicate {
                vec![LayoutMismatch::DuplicateClass {
                    class: decl.name().to_string(),
                }]
            } else {
                verify_class(descriptor, decl, &declared_sizes)
            };

            ClassVerdict {
                class: decl.name().to_string(),
                mismatches,
            }
        })
        .collect::<Vec<_>>();

    let report = VerificationReport {
        platform: descriptor.platform().clone(),
        verdicts,
    };

    tracing::debug!(
        "Verified {} classes on {}: {} mismatches",
        report.verdicts.len(),
        report.platform,
        report.mismatches().count()
    );

    report
}

fn verify_class(
    descriptor: &PlatformDescriptor,
    decl: &ClassDecl,
    declared_sizes: &HashMap<&str, usize>,
) -> Vec<LayoutMismatch> {
    let class = decl.name();
    let mut mismatches = Vec::new();

    let Some(truth) = descriptor.class(class) else {
        mismatches.push(LayoutMismatch::UnknownClass {
            class: class.to_string(),
        });
        return mismatches;
    };

    // A class with no declared fields is still size-checked
    if decl.layout.size != truth.layout.size {
        mismatches.push(LayoutMismatch::ClassSize {
            class: class.to_string(),
            expected: truth.layout.size,
            declared: decl.layout.size,
        });
    }

    if decl.layout.base != truth.layout.base {
        mismatches.push(LayoutMismatch::BaseMismatch {
            class: class.to_string(),
            expected: truth.layout.base.clone(),
            declared: decl.layout.base.clone(),
        });
    }

    if let Some(base) = decl.layout.base.as_deref() {
        let base_size = declared_sizes
            .get(base)
            .copied()
            .or_else(|| descriptor.class(base).map(|b| b.layout.size));

        if let Some(base_size) = base_size {
            if decl.layout.size < base_size {
                mismatches.push(LayoutMismatch::SizeBelowBase {
                    class: class.to_string(),
                    base: base.to_string(),
                    size: decl.layout.size,
                    base_size,
                });
            }
        }
    }

    let mut seen_fields = HashSet::new();
    for field in &decl.fields {
        if field.class != class {
            mismatches.push(LayoutMismatch::ForeignField {
                class: class.to_string(),
                field: field.field.clone(),
                owner: field.class.clone(),
            });
            continue;
        }

        if !seen_fields.insert(field.field.as_str()) {
            mismatches.push(LayoutMismatch::DuplicateField {
                class: class.to_string(),
                field: field.field.clone(),
            });
            continue;
        }

        // Unknown fields cannot be proven safe
        let Some(expected) = descriptor.resolve_field(class, &field.field) else {
            mismatches.push(LayoutMismatch::UnknownField {
                class: class.to_string(),
                field: field.field.clone(),
            });
            continue;
        };

        if field.offset != expected.offset {
            mismatches.push(LayoutMismatch::FieldOffset {
                class: class.to_string(),
                field: field.field.clone(),
                expected: expected.offset,
                declared: field.offset,
            });
        }

        if field.size != expected.size {
            mismatches.push(LayoutMismatch::FieldSize {
                class: class.to_string(),
                field: field.field.clone(),
                expected: expected.size,
                declared: field.size,
            });
        }
    }

    mismatches
}
