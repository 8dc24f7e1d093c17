//! VTable slot rewriting
//!
//! Simple and efficient hooking for virtual functions: the slot holding
//! the function pointer is swapped for the detour and back.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::error::InstallationError;

/// One virtual table entry of the host
pub(crate) struct VTableSlot {
    slot: *mut usize,
    original: usize,
}

impl VTableSlot {
    /// Capture the slot and the function pointer it currently holds
    ///
    /// # Safety
    /// `slot` must point to a readable, pointer-aligned vtable entry that
    /// stays mapped for the life of the process.
    pub unsafe fn new(slot: *mut usize) -> Self {
        let original = (*(slot as *const AtomicUsize)).load(Ordering::Acquire);
        Self { slot, original }
    }

    pub fn address(&self) -> usize {
        self.slot as usize
    }

    pub fn original(&self) -> *const () {
        self.original as *const ()
    }

    /// Point the slot at `detour`
    ///
    /// # Safety
    /// `detour` must be a function with the slot's signature.
    pub unsafe fn redirect(&mut self, detour: *const ()) -> Result<(), InstallationError> {
        tracing::debug!(
            "Redirecting vtable slot {:#x}: {:#x} -> {:#x}",
            self.address(),
            self.original,
            detour as usize
        );
        write_slot(self.slot, detour as usize)
    }

    /// Put the original function pointer back
    pub unsafe fn restore(&mut self) -> Result<(), InstallationError> {
        tracing::debug!(
            "Restoring vtable slot {:#x} to {:#x}",
            self.address(),
            self.original
        );
        write_slot(self.slot, self.original)
    }
}

// SAFETY: The slot lives in host memory for the life of the process; writes
// are atomic and serialized by the owning entry's mutex.
unsafe impl Send for VTableSlot {}

/// Store a pointer into a vtable slot
///
/// Vtables usually live in read-only data. When the page is not already
/// writable it is made writable for the store and its previous protection
/// is restored when the guard drops.
unsafe fn write_slot(slot: *mut usize, value: usize) -> Result<(), InstallationError> {
    let size = std::mem::size_of::<usize>();
    let address = slot as usize;

    let writable = region::query(slot as *const u8)
        .map(|r| r.protection().contains(region::Protection::WRITE))
        .unwrap_or(false);

    let _guard = if writable {
        None
    } else {
        let guard = region::protect_with_handle(slot as *const u8, size, region::Protection::READ_WRITE)
            .map_err(|e| InstallationError::Protection {
                address,
                reason: e.to_string(),
            })?;
        Some(guard)
    };

    // Host threads may be reading the slot concurrently
    (*(slot as *const AtomicUsize)).store(value, Ordering::Release);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn first() -> i32 {
        1
    }

    extern "C" fn second() -> i32 {
        2
    }

    #[test]
    fn test_redirect_and_restore() {
        let mut table: Box<[usize; 2]> = Box::new([first as usize, first as usize]);
        let slot_ptr = &mut table[1] as *mut usize;

        unsafe {
            let mut slot = VTableSlot::new(slot_ptr);
            assert_eq!(slot.original() as usize, first as usize);

            slot.redirect(second as *const ()).unwrap();
            assert_eq!(table[1], second as usize);
            assert_eq!(table[0], first as usize);

            slot.restore().unwrap();
            assert_eq!(table[1], first as usize);
        }
    }

    #[test]
    fn test_redirect_read_only_page() {
        // A page-sized mapping standing in for .rodata
        let page = region::page::size();
        let mut memory = region::alloc(page, region::Protection::READ_WRITE).unwrap();
        let slot_ptr = memory.as_mut_ptr::<usize>();

        unsafe {
            slot_ptr.write(first as usize);
            region::protect(slot_ptr as *const u8, page, region::Protection::READ).unwrap();

            let mut slot = VTableSlot::new(slot_ptr);
            slot.redirect(second as *const ()).unwrap();
            assert_eq!(slot_ptr.read(), second as usize);

            let protection = region::query(slot_ptr as *const u8).unwrap().protection();
            assert!(!protection.contains(region::Protection::WRITE));

            slot.restore().unwrap();
            assert_eq!(slot_ptr.read(), first as usize);
        }
    }
}
