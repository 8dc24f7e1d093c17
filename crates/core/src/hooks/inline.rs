//! Inline detours for direct entry points
//!
//! The first whole instructions of the target (at least an absolute jump's
//! worth) are relocated into a trampoline with iced-x86, followed by a jump
//! back to the rest of the function. The target itself is then overwritten
//! with an absolute jump to the detour. The trampoline becomes the
//! "original" entry point.

use std::ptr;

use iced_x86::{BlockEncoder, BlockEncoderOptions, Decoder, DecoderOptions, FlowControl, InstructionBlock};

use super::error::InstallationError;
#[cfg(target_arch = "x86_64")]
use super::trampoline::alloc_trampoline;

/// `jmp qword ptr [rip+0]` followed by the 8-byte target
pub(crate) const JMP_ABS_LEN: usize = 14;

/// Bytes inspected when looking for whole instructions to steal
#[cfg(target_arch = "x86_64")]
const PROLOGUE_WINDOW: usize = 32;

/// Trampoline buffer size: relocated prologue plus the jump back
#[cfg(target_arch = "x86_64")]
const TRAMPOLINE_SIZE: usize = 96;

/// Encode an absolute jump that clobbers no registers
pub(crate) fn abs_jump(target: u64) -> [u8; JMP_ABS_LEN] {
    let mut code = [0u8; JMP_ABS_LEN];
    code[..6].copy_from_slice(&[0xFF, 0x25, 0x00, 0x00, 0x00, 0x00]);
    code[6..].copy_from_slice(&target.to_le_bytes());
    code
}

/// A function prologue re-encoded for a new address
#[derive(Debug)]
pub(crate) struct Relocated {
    /// Bytes taken from the source, always whole instructions
    pub stolen: usize,
    /// Relocated instructions plus the jump back to `source + stolen`
    pub code: Vec<u8>,
}

/// Relocate the prologue of 64-bit code at `source` so it can run at `dest`
///
/// Rip-relative operands and relative branches are rewritten by the block
/// encoder to keep their original targets.
pub(crate) fn relocate_prologue(code: &[u8], source: u64, dest: u64) -> Result<Relocated, InstallationError> {
    let too_short = |available| InstallationError::PrologueTooShort {
        address: source as usize,
        available,
    };

    let mut decoder = Decoder::with_ip(64, code, source, DecoderOptions::NONE);
    let mut instructions = Vec::new();
    let mut stolen = 0usize;

    while stolen < JMP_ABS_LEN {
        if !decoder.can_decode() {
            return Err(too_short(stolen));
        }

        let instruction = decoder.decode();
        if instruction.is_invalid() {
            return Err(InstallationError::Relocation(format!(
                "invalid instruction at {:#x}",
                instruction.ip()
            )));
        }

        stolen += instruction.len();
        let leaves = matches!(
            instruction.flow_control(),
            FlowControl::Return
                | FlowControl::UnconditionalBranch
                | FlowControl::IndirectBranch
                | FlowControl::Interrupt
        );
        instructions.push(instruction);

        // Control leaves before the patch ends: the jump would clobber
        // whatever follows the function
        if leaves && stolen < JMP_ABS_LEN {
            return Err(too_short(stolen));
        }
    }

    let block = InstructionBlock::new(&instructions, dest);
    let encoded = BlockEncoder::encode(64, block, BlockEncoderOptions::NONE)
        .map_err(|e| InstallationError::Relocation(e.to_string()))?;

    let mut relocated = encoded.code_buffer;
    relocated.extend_from_slice(&abs_jump(source + stolen as u64));

    Ok(Relocated {
        stolen,
        code: relocated,
    })
}

/// Patch state of one direct entry point
pub(crate) struct InlineDetour {
    target: usize,
    saved: Vec<u8>,
    trampoline: usize,
}

// SAFETY: Both addresses refer to process-lifetime code; patching is
// serialized by the owning entry's mutex.
unsafe impl Send for InlineDetour {}

impl InlineDetour {
    /// Build the trampoline for `target` without touching the target
    ///
    /// # Safety
    /// `target` must be the entry point of a function, with `available`
    /// readable bytes from there to the end of the host image.
    #[cfg(target_arch = "x86_64")]
    pub unsafe fn prepare(target: usize, available: usize) -> Result<Self, InstallationError> {
        let window = std::slice::from_raw_parts(target as *const u8, available.min(PROLOGUE_WINDOW));

        let trampoline = alloc_trampoline(target, TRAMPOLINE_SIZE)
            .ok_or(InstallationError::TrampolineAllocation { address: target })?;

        let relocated = relocate_prologue(window, target as u64, trampoline.as_ptr() as u64)?;
        if relocated.code.len() > TRAMPOLINE_SIZE {
            return Err(InstallationError::Relocation(format!(
                "relocated prologue of {:#x} needs {} bytes",
                target,
                relocated.code.len()
            )));
        }

        ptr::copy_nonoverlapping(relocated.code.as_ptr(), trampoline.as_ptr(), relocated.code.len());

        tracing::debug!(
            "Prepared detour for {:#x}: {} bytes stolen, trampoline at {:#x}",
            target,
            relocated.stolen,
            trampoline.as_ptr() as usize
        );

        Ok(Self {
            target,
            saved: window[..relocated.stolen].to_vec(),
            trampoline: trampoline.as_ptr() as usize,
        })
    }

    #[cfg(not(target_arch = "x86_64"))]
    pub unsafe fn prepare(_target: usize, _available: usize) -> Result<Self, InstallationError> {
        Err(InstallationError::Unsupported(
            "inline detours are only available on x86_64",
        ))
    }

    pub fn address(&self) -> usize {
        self.target
    }

    /// Entry point running the relocated prologue, then the rest of the target
    pub fn original(&self) -> *const () {
        self.trampoline as *const ()
    }

    /// Overwrite the target's prologue with a jump to `detour`
    pub unsafe fn redirect(&mut self, detour: *const ()) -> Result<(), InstallationError> {
        let mut patch = abs_jump(detour as u64).to_vec();
        // Pad the tail of a split instruction with int3
        patch.resize(self.saved.len(), 0xCC);
        write_code(self.target, &patch)
    }

    /// Put the saved prologue bytes back
    pub unsafe fn restore(&mut self) -> Result<(), InstallationError> {
        write_code(self.target, &self.saved)
    }
}

unsafe fn write_code(address: usize, bytes: &[u8]) -> Result<(), InstallationError> {
    let _guard = region::protect_with_handle(
        address as *const u8,
        bytes.len(),
        region::Protection::READ_WRITE_EXECUTE,
    )
    .map_err(|e| InstallationError::Protection {
        address,
        reason: e.to_string(),
    })?;

    ptr::copy_nonoverlapping(bytes.as_ptr(), address as *mut u8, bytes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: u64 = 0x1000_0000;
    const DEST: u64 = 0x1000_8000;

    #[test]
    fn test_abs_jump_encoding() {
        let code = abs_jump(0x1122_3344_5566_7788);
        assert_eq!(&code[..6], &[0xFF, 0x25, 0, 0, 0, 0]);
        assert_eq!(&code[6..], &0x1122_3344_5566_7788u64.to_le_bytes());
    }

    #[test]
    fn test_relocate_keeps_rip_relative_target() {
        // push rbp; mov rbp, rsp; sub rsp, 0x20; mov rax, [rip+0x10]
        let code = [
            0x55, 0x48, 0x89, 0xE5, 0x48, 0x83, 0xEC, 0x20, 0x48, 0x8B, 0x05, 0x10, 0x00, 0x00,
            0x00, 0xC3,
        ];

        let relocated = relocate_prologue(&code, SOURCE, DEST).unwrap();
        assert_eq!(relocated.stolen, 15);
        assert_eq!(relocated.code.len(), 15 + JMP_ABS_LEN);
        assert_eq!(&relocated.code[..8], &code[..8]);

        let mut decoder = Decoder::with_ip(64, &relocated.code, DEST, DecoderOptions::NONE);
        let instructions: Vec<_> = decoder.iter().collect();
        assert_eq!(instructions[3].ip_rel_memory_address(), SOURCE + 15 + 0x10);

        // Jump back lands right after the stolen bytes
        assert_eq!(&relocated.code[15..], &abs_jump(SOURCE + 15));
    }

    #[test]
    fn test_relocate_rejects_early_return() {
        // xor eax, eax; ret
        let code = [0x31, 0xC0, 0xC3, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC];
        assert!(matches!(
            relocate_prologue(&code, SOURCE, DEST),
            Err(InstallationError::PrologueTooShort { available: 3, .. })
        ));
    }

    #[test]
    fn test_relocate_rejects_truncated_window() {
        let code = [0x55, 0x48, 0x89, 0xE5];
        assert!(matches!(
            relocate_prologue(&code, SOURCE, DEST),
            Err(InstallationError::PrologueTooShort { .. })
        ));
    }
}
