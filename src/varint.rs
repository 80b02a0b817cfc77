// VCDIFF variable-length integer encoding (RFC 3284, Section 2).
//
// Base-128, big-endian: most-significant group first.  Each byte has
// bit 7 set except the final byte.
//
// The decoder treats all sizes and addresses as unsigned 31-bit values;
// anything that would not fit a signed 32-bit integer is malformed.  The
// one exception is the SDCH window checksum, which is parsed as an
// unsigned 63-bit value.

use std::io::{self, Write};

/// Maximum encoded length for a 64-bit value (ceil(64/7) = 10).
const MAX_VARINT_LEN: usize = 10;

/// Maximum encoded length of a 31-bit value (ceil(31/7) = 5).
pub const MAX_U31_LEN: usize = 5;

/// Maximum encoded length of a 63-bit value (ceil(63/7) = 9).
pub const MAX_U63_LEN: usize = 9;

/// Overflow guard for the 31-bit accumulator: if any of these bits are
/// set before a shift, the next `<< 7` would exceed 31 bits.
const U31_OVERFLOW_MASK: u32 = 0xFF00_0000;

/// Overflow guard for the 63-bit accumulator.
const U63_OVERFLOW_MASK: u64 = 0xFF00_0000_0000_0000;

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode an unsigned 31-bit integer from a byte slice.
/// Returns `(value, bytes_consumed)` or an error.
///
/// Fails with `Overflow` when the encoding runs past [`MAX_U31_LEN`] bytes
/// or the accumulated value leaves the 31-bit range.  Fails with
/// `Underflow` when the slice ends before the terminating byte; callers
/// retry with more input, so nothing is consumed in that case.
pub fn read_u31(data: &[u8]) -> Result<(u32, usize), VarIntError> {
    let mut val: u32 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if i >= MAX_U31_LEN || val & U31_OVERFLOW_MASK != 0 {
            return Err(VarIntError::Overflow);
        }
        val = (val << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((val, i + 1));
        }
    }
    Err(VarIntError::Underflow)
}

/// Decode an unsigned 63-bit integer from a byte slice.
/// Returns `(value, bytes_consumed)` or an error.
pub fn read_u63(data: &[u8]) -> Result<(u64, usize), VarIntError> {
    let mut val: u64 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if i >= MAX_U63_LEN || val & U63_OVERFLOW_MASK != 0 {
            return Err(VarIntError::Overflow);
        }
        val = (val << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((val, i + 1));
        }
    }
    Err(VarIntError::Underflow)
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a `u64` as a VCDIFF variable-length integer into `buf`.
/// Returns the number of bytes written (1..=10).
///
/// Fills a 10-byte scratch buffer from the end, MSB set on all bytes,
/// then clears MSB on the final (last) byte.  The encoding is minimal:
/// no leading zero groups, a single byte for zero.
#[inline]
pub fn encode_u64(mut num: u64, buf: &mut [u8; MAX_VARINT_LEN]) -> usize {
    let mut i = MAX_VARINT_LEN;
    loop {
        i -= 1;
        buf[i] = (num as u8 & 0x7F) | 0x80;
        num >>= 7;
        if num == 0 {
            break;
        }
    }
    buf[MAX_VARINT_LEN - 1] &= 0x7F; // clear MSB on last byte
    MAX_VARINT_LEN - i
}

/// Encode a `u32` as a VCDIFF variable-length integer into `buf`.
/// Returns the number of bytes written (1..=5).
#[inline]
pub fn encode_u32(num: u32, buf: &mut [u8; MAX_VARINT_LEN]) -> usize {
    encode_u64(num as u64, buf)
}

/// Encode a `u64` and write to a `Write` sink.
pub fn write_u64<W: Write>(w: &mut W, num: u64) -> io::Result<()> {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = encode_u64(num, &mut buf);
    w.write_all(&buf[MAX_VARINT_LEN - len..])
}

/// Encode a `u32` and write to a `Write` sink.
pub fn write_u32<W: Write>(w: &mut W, num: u32) -> io::Result<()> {
    write_u64(w, num as u64)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Return the encoded byte-length of a `u64` value.
#[inline]
pub fn sizeof_u64(num: u64) -> usize {
    let bits = 64 - num.leading_zeros();
    (bits.max(1).div_ceil(7) as usize).min(10)
}

/// Return the encoded byte-length of a `u32` value.
#[inline]
pub fn sizeof_u32(num: u32) -> usize {
    sizeof_u64(num as u64)
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarIntError {
    /// Not enough input bytes to complete the integer.
    Underflow,
    /// Value would overflow the target integer width, or the encoding
    /// is longer than the width allows.
    Overflow,
}

impl std::fmt::Display for VarIntError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarIntError::Underflow => write!(f, "varint underflow (truncated input)"),
            VarIntError::Overflow => write!(f, "varint overflow"),
        }
    }
}

impl std::error::Error for VarIntError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
