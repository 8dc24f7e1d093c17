//! Dispatch slot resolution
//!
//! Maps a function identity to the host location that decides where calls
//! go: a vtable entry, or a direct entry point patched with a detour.

use shadowhook_engine::HostImage;
use shadowhook_sdk::{FunctionIdentity, SlotLocation};

use super::error::InstallationError;
use super::inline::InlineDetour;
use super::vtable::VTableSlot;
use crate::descriptor::{parse_pattern, scan_pattern, PlatformDescriptor};

/// Host location whose contents select the callee of a function
pub(crate) enum DispatchSlot {
    VTable(VTableSlot),
    Inline(InlineDetour),
}

impl DispatchSlot {
    /// Address of the patched location, for diagnostics
    pub fn address(&self) -> usize {
        match self {
            DispatchSlot::VTable(slot) => slot.address(),
            DispatchSlot::Inline(detour) => detour.address(),
        }
    }

    /// Entry point that runs the host's own implementation
    pub fn original(&self) -> *const () {
        match self {
            DispatchSlot::VTable(slot) => slot.original(),
            DispatchSlot::Inline(detour) => detour.original(),
        }
    }

    /// # Safety
    /// `detour` must be a function with the slot's signature.
    pub unsafe fn redirect(&mut self, detour: *const ()) -> Result<(), InstallationError> {
        match self {
            DispatchSlot::VTable(slot) => slot.redirect(detour),
            DispatchSlot::Inline(detour_patch) => detour_patch.redirect(detour),
        }
    }

    pub unsafe fn restore(&mut self) -> Result<(), InstallationError> {
        match self {
            DispatchSlot::VTable(slot) => slot.restore(),
            DispatchSlot::Inline(detour) => detour.restore(),
        }
    }
}

/// Find and capture the dispatch slot of `identity`
///
/// Nothing in the host is modified; the returned slot still holds the
/// original target.
pub(crate) fn resolve_slot(
    descriptor: &PlatformDescriptor,
    image: &HostImage,
    identity: &FunctionIdentity,
) -> Result<DispatchSlot, InstallationError> {
    let platform = descriptor.platform();
    let location = descriptor
        .function(identity)
        .ok_or_else(|| InstallationError::UnknownFunction {
            identity: identity.clone(),
            platform: platform.clone(),
        })?;

    let out_of_image = |source| InstallationError::OutOfImage {
        identity: identity.clone(),
        source,
    };

    match location {
        SlotLocation::VTable { index } => {
            let vtable = descriptor
                .class(&identity.class)
                .and_then(|class| class.vtable)
                .ok_or_else(|| InstallationError::MissingVtable {
                    identity: identity.clone(),
                    class: identity.class.clone(),
                    platform: platform.clone(),
                })?;

            let width = platform.arch.pointer_width();
            if width != std::mem::size_of::<usize>() {
                return Err(InstallationError::Unsupported(
                    "descriptor pointer width differs from the running process",
                ));
            }

            let rva = vtable + (*index as u64) * width as u64;
            let address = image.address_of(rva).map_err(out_of_image)?;
            if !image.contains(address, width) || address % width != 0 {
                return Err(InstallationError::Unsupported(
                    "vtable slot is truncated or misaligned",
                ));
            }

            Ok(DispatchSlot::VTable(unsafe { VTableSlot::new(address as *mut usize) }))
        }

        SlotLocation::Address { rva } => {
            let address = image.address_of(*rva).map_err(out_of_image)?;
            let available = image.base() + image.size() - address;
            Ok(DispatchSlot::Inline(unsafe { InlineDetour::prepare(address, available)? }))
        }

        SlotLocation::Pattern { pattern } => {
            let bytes = parse_pattern(pattern).map_err(|e| InstallationError::InvalidPattern {
                identity: identity.clone(),
                reason: e.to_string(),
            })?;

            let offset = scan_pattern(unsafe { image.bytes() }, &bytes).ok_or_else(|| {
                InstallationError::PatternNotFound {
                    identity: identity.clone(),
                    pattern: pattern.clone(),
                }
            })?;

            tracing::debug!("Pattern for {} matched at +{:#x}", identity, offset);

            let address = image.base() + offset;
            let available = image.size() - offset;
            Ok(DispatchSlot::Inline(unsafe { InlineDetour::prepare(address, available)? }))
        }
    }
}
