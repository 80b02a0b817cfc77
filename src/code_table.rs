// VCDIFF instruction code table (RFC 3284, Sections 5.4 and 5.6).
//
// A code table is 1536 bytes: six parallel 256-entry planes in the order
// inst1, inst2, size1, size2, mode1, mode2.  Each opcode encodes one or
// two half-instructions; a size of zero on an ADD/RUN/COPY half means the
// real size follows as a varint in the instruction stream.
//
// The byte image is load-bearing twice over: it is the lookup structure
// for the executor, and the default table's image is the dictionary for
// decoding an embedded custom code table.

use std::sync::LazyLock;

use crate::error::DecodeError;

/// Instruction codes (RFC 3284, Section 5.4).
pub const VCD_NOOP: u8 = 0;
pub const VCD_ADD: u8 = 1;
pub const VCD_RUN: u8 = 2;
pub const VCD_COPY: u8 = 3;

/// Serialized size of a code table.
pub const CODE_TABLE_SIZE: usize = 1536;

// Plane offsets within the 1536-byte image.
const INST1: usize = 0;
const INST2: usize = 256;
const SIZE1: usize = 512;
const SIZE2: usize = 768;
const MODE1: usize = 1024;
const MODE2: usize = 1280;

/// One half of an opcode's (inst, size, mode) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeHalf {
    pub inst: u8,
    pub size: u8,
    pub mode: u8,
}

impl OpcodeHalf {
    #[inline]
    pub fn is_noop(&self) -> bool {
        self.inst == VCD_NOOP
    }
}

/// A 256-entry code table in its serialized byte-plane form.
#[derive(Clone)]
pub struct CodeTableData {
    bytes: [u8; CODE_TABLE_SIZE],
}

impl CodeTableData {
    /// Wrap a raw 1536-byte image (e.g. a decoded custom table).  The
    /// image is not validated here; call [`CodeTableData::validate`]
    /// before use.
    pub fn from_image(bytes: [u8; CODE_TABLE_SIZE]) -> Self {
        Self { bytes }
    }

    /// The serialized image.
    #[inline]
    pub fn as_image(&self) -> &[u8; CODE_TABLE_SIZE] {
        &self.bytes
    }

    /// First half-instruction of `opcode`.
    #[inline]
    pub fn half1(&self, opcode: u8) -> OpcodeHalf {
        let i = opcode as usize;
        OpcodeHalf {
            inst: self.bytes[INST1 + i],
            size: self.bytes[SIZE1 + i],
            mode: self.bytes[MODE1 + i],
        }
    }

    /// Second half-instruction of `opcode` (NO_OP when absent).
    #[inline]
    pub fn half2(&self, opcode: u8) -> OpcodeHalf {
        let i = opcode as usize;
        OpcodeHalf {
            inst: self.bytes[INST2 + i],
            size: self.bytes[SIZE2 + i],
            mode: self.bytes[MODE2 + i],
        }
    }

    /// Check that every opcode is executable with an address cache whose
    /// highest mode is `max_mode`.
    ///
    /// A table is valid when no opcode is a double NO_OP, every inst code
    /// is in range, COPY modes do not exceed `max_mode`, and non-COPY
    /// halves carry mode zero.
    pub fn validate(&self, max_mode: u8) -> Result<(), DecodeError> {
        for op in 0..=255u8 {
            let h1 = self.half1(op);
            let h2 = self.half2(op);
            if h1.is_noop() && h2.is_noop() {
                return Err(DecodeError::BadOpcode(format!(
                    "opcode {op} encodes two NO_OPs"
                )));
            }
            Self::validate_half(op, h1, "first", max_mode)?;
            Self::validate_half(op, h2, "second", max_mode)?;
        }
        Ok(())
    }

    fn validate_half(
        op: u8,
        half: OpcodeHalf,
        which: &str,
        max_mode: u8,
    ) -> Result<(), DecodeError> {
        let ok = match half.inst {
            VCD_NOOP => half.size == 0 && half.mode == 0,
            VCD_ADD | VCD_RUN => half.mode == 0,
            VCD_COPY => half.mode <= max_mode,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(DecodeError::BadOpcode(format!(
                "opcode {op}, {which} half: inst={} size={} mode={} (max mode {max_mode})",
                half.inst, half.size, half.mode
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Default table (RFC 3284, Section 5.6)
// ---------------------------------------------------------------------------

fn set_half1(bytes: &mut [u8; CODE_TABLE_SIZE], op: usize, inst: u8, size: u8, mode: u8) {
    bytes[INST1 + op] = inst;
    bytes[SIZE1 + op] = size;
    bytes[MODE1 + op] = mode;
}

fn set_half2(bytes: &mut [u8; CODE_TABLE_SIZE], op: usize, inst: u8, size: u8, mode: u8) {
    bytes[INST2 + op] = inst;
    bytes[SIZE2 + op] = size;
    bytes[MODE2 + op] = mode;
}

/// Build the default RFC 3284 code table image.
///
/// Generated from the RFC's table description: sizes and mode counts are
/// the constants below, and the opcode layout follows the RFC exactly
/// (single RUN, single ADDs, single COPYs per mode, then ADD+COPY and
/// COPY+ADD compounds).
pub fn build_default_code_table() -> CodeTableData {
    const ADD_SIZES: u8 = 17;
    const NEAR_MODES: u8 = 4;
    const SAME_MODES: u8 = 3;
    const CPY_SIZES: u8 = 15;
    const MIN_MATCH: u8 = 4;
    const ADDCOPY_ADD_MAX: u8 = 4;
    const ADDCOPY_NEAR_CPY_MAX: u8 = 6;
    const ADDCOPY_SAME_CPY_MAX: u8 = 4;
    const COPYADD_CPY_MAX: u8 = 4;
    const COPYADD_ADD_MAX: u8 = 1;
    const CPY_MODES: u8 = 2 + NEAR_MODES + SAME_MODES; // 9

    // Zero bytes are NO_OP halves, so only non-NO_OP halves are written.
    let mut bytes = [0u8; CODE_TABLE_SIZE];
    let mut op: usize = 0;

    // Opcode 0: RUN, size in stream.
    set_half1(&mut bytes, op, VCD_RUN, 0, 0);
    op += 1;

    // Opcode 1: ADD, size in stream.  Opcodes 2..=18: ADD sizes 1..=17.
    set_half1(&mut bytes, op, VCD_ADD, 0, 0);
    op += 1;
    for size in 1..=ADD_SIZES {
        set_half1(&mut bytes, op, VCD_ADD, size, 0);
        op += 1;
    }

    // Per mode: COPY size-in-stream, then COPY sizes 4..=18.
    for mode in 0..CPY_MODES {
        set_half1(&mut bytes, op, VCD_COPY, 0, mode);
        op += 1;
        for size in MIN_MATCH..MIN_MATCH + CPY_SIZES {
            set_half1(&mut bytes, op, VCD_COPY, size, mode);
            op += 1;
        }
    }

    // ADD+COPY compounds.
    for mode in 0..CPY_MODES {
        let cpy_max = if mode < 2 + NEAR_MODES {
            ADDCOPY_NEAR_CPY_MAX
        } else {
            ADDCOPY_SAME_CPY_MAX
        };
        for add_size in 1..=ADDCOPY_ADD_MAX {
            for cpy_size in MIN_MATCH..=cpy_max {
                set_half1(&mut bytes, op, VCD_ADD, add_size, 0);
                set_half2(&mut bytes, op, VCD_COPY, cpy_size, mode);
                op += 1;
            }
        }
    }

    // COPY+ADD compounds.
    for mode in 0..CPY_MODES {
        for cpy_size in MIN_MATCH..=COPYADD_CPY_MAX {
            for add_size in 1..=COPYADD_ADD_MAX {
                set_half1(&mut bytes, op, VCD_COPY, cpy_size, mode);
                set_half2(&mut bytes, op, VCD_ADD, add_size, 0);
                op += 1;
            }
        }
    }

    debug_assert_eq!(op, 256, "code table must have exactly 256 entries");
    CodeTableData { bytes }
}

/// The default RFC 3284 code table.
pub fn default_code_table() -> &'static CodeTableData {
    static TABLE: LazyLock<CodeTableData> = LazyLock::new(build_default_code_table);
    &TABLE
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
