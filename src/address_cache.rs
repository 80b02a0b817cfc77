// VCDIFF address cache (RFC 3284, Section 5.3).
//
// Implements the NEAR and SAME caches used to compactly encode COPY
// instruction addresses.  Decode-only: this crate never chooses modes.
//
// Mode numbering for caches of size (s_near, s_same):
//   0                      VCD_SELF — absolute
//   1                      VCD_HERE — here - distance
//   2 .. s_near+1          NEAR     — near[mode-2] + distance
//   s_near+2 .. +s_same+1  SAME     — same[(mode-s_near-2)*256 + byte]
//
// The arrays are zeroed at the start of each window body; the instance
// (sizes and last_mode) lives for the whole delta.

use crate::error::DecodeError;
use crate::parse::{HeaderParser, ParseResult};

/// Absolute address.
pub const VCD_SELF: u8 = 0;
/// Address relative to "here" (current position in the address space).
pub const VCD_HERE: u8 = 1;

pub struct AddressCache {
    s_near: usize,
    s_same: usize,
    near: Vec<u64>,
    same: Vec<u64>,
    next_slot: usize,
    last_mode: u8,
}

impl AddressCache {
    /// Default RFC 3284 cache: s_near=4, s_same=3.
    pub fn new() -> Self {
        Self::with_sizes(4, 3)
    }

    /// Create with custom cache sizes (from a VCD_CODETABLE descriptor).
    pub fn with_sizes(s_near: usize, s_same: usize) -> Self {
        Self {
            s_near,
            s_same,
            near: vec![0; s_near],
            same: vec![0; s_same * 256],
            next_slot: 0,
            last_mode: 0,
        }
    }

    /// Zero the cache arrays.  Called at the start of each window body.
    pub fn init(&mut self) {
        self.near.fill(0);
        self.same.fill(0);
        self.next_slot = 0;
    }

    /// Total number of address modes (2 + s_near + s_same).
    #[inline]
    pub fn mode_count(&self) -> usize {
        2 + self.s_near + self.s_same
    }

    /// The highest valid mode number.
    #[inline]
    pub fn max_mode(&self) -> u8 {
        (self.mode_count() - 1) as u8
    }

    #[inline]
    pub fn s_near(&self) -> usize {
        self.s_near
    }

    #[inline]
    pub fn s_same(&self) -> usize {
        self.s_same
    }

    /// The mode byte of the most recently decoded address.
    #[inline]
    pub fn last_mode(&self) -> u8 {
        self.last_mode
    }

    /// The first SAME mode index (2 + s_near).
    #[inline]
    fn same_start(&self) -> usize {
        2 + self.s_near
    }

    /// Record a decoded address in both caches.  Skipped for zero-sized
    /// caches.
    #[inline]
    pub fn update(&mut self, addr: u64) {
        if self.s_near > 0 {
            self.near[self.next_slot] = addr;
            self.next_slot = (self.next_slot + 1) % self.s_near;
        }
        if self.s_same > 0 {
            let idx = addr as usize % (self.s_same * 256);
            self.same[idx] = addr;
        }
    }

    /// Decode one COPY address from the address stream.
    ///
    /// `mode` comes from the code table, which was validated against
    /// `max_mode()` when it was installed.  `here` is the current position
    /// in the address space (source segment size + target bytes written in
    /// this window); every decoded address must satisfy `addr < here`.
    ///
    /// A truncated stream halts with `MoreData` before any cache state is
    /// touched, so the instruction can be retried from its checkpoint.
    pub fn decode_addr(
        &mut self,
        mode: u8,
        here: u64,
        addrs: &mut HeaderParser<'_>,
    ) -> ParseResult<u64> {
        let m = mode as usize;
        debug_assert!(m < self.mode_count());

        let addr = if m < self.same_start() {
            let d = u64::from(addrs.u31("COPY address")?);
            match m {
                0 => d, // VCD_SELF
                1 => {
                    // VCD_HERE: distance back from the write position.
                    if d > here {
                        return Err(DecodeError::BadAddress { addr: d, here }.into());
                    }
                    here - d
                }
                _ => self.near[m - 2] + d,
            }
        } else {
            // SAME mode: a single raw byte indexes into one 256-slot group.
            let byte = addrs.byte()? as usize;
            self.same[(m - self.same_start()) * 256 + byte]
        };

        if addr >= here {
            return Err(DecodeError::BadAddress { addr, here }.into());
        }

        self.update(addr);
        self.last_mode = mode;
        Ok(addr)
    }
}

impl Default for AddressCache {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
