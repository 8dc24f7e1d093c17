//! Layout verification
//!
//! Every class a mod declares is checked against the platform descriptor
//! before the mod may load or install a single hook. A mismatch is never
//! downgraded to a warning: one wrong offset is enough to corrupt host
//! memory.

mod manifest;
mod verify;

pub use manifest::{LayoutManifest, ManifestClass, ManifestError, ManifestField};
pub use verify::{verify, ClassVerdict, LayoutMismatch, LayoutMismatchError, VerificationReport};
