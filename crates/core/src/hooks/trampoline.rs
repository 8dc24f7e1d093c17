//! Executable memory for detour trampolines
//!
//! Relocated prologues keep their rip-relative operands as rel32, so every
//! trampoline must sit within ±2GB of the function it was copied from.
//! Memory is mapped in blocks of several pages near the first target that
//! needs it and carved into fixed-size cells; later targets in reach share
//! the block.

use std::ptr::NonNull;

use parking_lot::Mutex;

/// Trampoline cells are handed out on this alignment
const CELL_ALIGN: usize = 16;

/// Pages mapped per block
const BLOCK_PAGES: usize = 4;

/// Largest distance a rel32 operand can bridge, with slack for the cell
const REACH: usize = 0x7FF0_0000;

/// Step between mapping hints while searching outward from a target
const HINT_STEP: usize = 0x10_0000;

/// Trampolines are never unmapped: a thread may still be returning through
/// one after its hook was removed.
static ARENA: Mutex<NearArena> = Mutex::new(NearArena { blocks: Vec::new() });

struct Block {
    base: usize,
    len: usize,
    next: usize,
}

impl Block {
    fn reaches(&self, target: usize, size: usize) -> bool {
        self.base.abs_diff(target) < REACH && (self.base + self.len).abs_diff(target) < REACH && self.next + size <= self.len
    }
}

struct NearArena {
    blocks: Vec<Block>,
}

impl NearArena {
    fn alloc(&mut self, target: usize, size: usize) -> Option<NonNull<u8>> {
        let size = size.checked_next_multiple_of(CELL_ALIGN)?;
        let block_len = region::page::size() * BLOCK_PAGES;
        if size == 0 || size > block_len {
            return None;
        }

        let index = match self
            .blocks
            .iter()
            .position(|block| block.reaches(target, size))
        {
            Some(index) => index,
            None => {
                let base = map_near(target, block_len)?;
                tracing::debug!(
                    "Mapped trampoline block at {:#x} ({:#x} bytes) for {:#x}",
                    base,
                    block_len,
                    target
                );
                self.blocks.push(Block {
                    base,
                    len: block_len,
                    next: 0,
                });
                self.blocks.len() - 1
            }
        };

        let block = &mut self.blocks[index];
        let cell = block.base + block.next;
        block.next += size;
        NonNull::new(cell as *mut u8)
    }
}

/// Map `len` bytes of RWX memory in reach of `target`
///
/// Hints alternate below and above the target, moving outward, until the
/// kernel honours one close enough. Nothing is returned when the whole
/// reach is taken.
#[cfg(unix)]
fn map_near(target: usize, len: usize) -> Option<usize> {
    use nix::sys::mman::{mmap_anonymous, munmap, MapFlags, ProtFlags};
    use std::num::NonZeroUsize;

    let length = NonZeroUsize::new(len)?;
    let prot = ProtFlags::PROT_READ | ProtFlags::PROT_WRITE | ProtFlags::PROT_EXEC;
    let flags = MapFlags::MAP_PRIVATE | MapFlags::MAP_ANONYMOUS;
    let page_mask = !(region::page::size() - 1);

    let mut distance = HINT_STEP;
    while distance < REACH {
        let below = target.checked_sub(distance);
        let above = target.checked_add(distance).filter(|a| a.checked_add(len).is_some());

        for hint in [below, above].into_iter().flatten() {
            let Some(hint) = NonZeroUsize::new(hint & page_mask) else {
                continue;
            };

            let Ok(ptr) = (unsafe { mmap_anonymous(Some(hint), length, prot, flags) }) else {
                continue;
            };

            let base = ptr.as_ptr() as usize;
            if base.abs_diff(target) < REACH && (base + len).abs_diff(target) < REACH {
                return Some(base);
            }

            // Placed out of reach; give the range back
            unsafe {
                let _ = munmap(ptr, len);
            }
        }

        distance += HINT_STEP;
    }

    tracing::error!("No free memory within reach of {:#x} for a trampoline block", target);
    None
}

#[cfg(not(unix))]
fn map_near(target: usize, _len: usize) -> Option<usize> {
    tracing::error!("Trampoline memory is not supported on this platform (target {:#x})", target);
    None
}

/// Reserve a trampoline cell of at least `size` bytes in reach of `target`
pub(crate) fn alloc_trampoline(target: usize, size: usize) -> Option<NonNull<u8>> {
    ARENA.lock().alloc(target, size)
}
