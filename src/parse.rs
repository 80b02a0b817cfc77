// Pull parser over a byte slice, with restartable reads.
//
// Every read returns `Result<T, Halt>`.  `Halt::MoreData` means the input
// ran out mid-structure: the caller keeps its own cursor where it was and
// retries once the next chunk arrives, so nothing is ever consumed by a
// failed attempt.  `Halt::Fail` carries a fatal `DecodeError` and points
// `pos()` at the offending byte.

use crate::error::DecodeError;
use crate::varint::{self, VarIntError};

// ---------------------------------------------------------------------------
// Halt signal
// ---------------------------------------------------------------------------

/// Why a parse attempt stopped before producing a value.
#[derive(Debug)]
pub enum Halt {
    /// The current structure extends past the buffered input.  Not an
    /// error: deliver more bytes and retry from the same position.
    MoreData,
    /// The delta is malformed; the decode cannot continue.
    Fail(DecodeError),
}

impl From<DecodeError> for Halt {
    fn from(e: DecodeError) -> Self {
        Halt::Fail(e)
    }
}

pub type ParseResult<T> = Result<T, Halt>;

// ---------------------------------------------------------------------------
// HeaderParser
// ---------------------------------------------------------------------------

/// Cursor over a borrowed byte slice.
///
/// The parser itself never commits anything: the driver reads `pos()`
/// after a whole structure has parsed and applies the advance to its own
/// cursor (or discards the parser wholesale on `MoreData`).
pub struct HeaderParser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> HeaderParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far.
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Rewind (or fast-forward) to an absolute position.
    #[inline]
    pub fn set_pos(&mut self, pos: usize) {
        debug_assert!(pos <= self.data.len());
        self.pos = pos;
    }

    /// The unread remainder of the input.
    #[inline]
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.pos == self.data.len()
    }

    /// Read one byte.
    pub fn byte(&mut self) -> ParseResult<u8> {
        match self.data.get(self.pos) {
            Some(&b) => {
                self.pos += 1;
                Ok(b)
            }
            None => Err(Halt::MoreData),
        }
    }

    /// Read exactly `n` bytes.
    pub fn take(&mut self, n: usize) -> ParseResult<&'a [u8]> {
        if self.data.len() - self.pos < n {
            return Err(Halt::MoreData);
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Read an unsigned 31-bit varint.  `what` names the field for
    /// diagnostics.
    pub fn u31(&mut self, what: &'static str) -> ParseResult<u32> {
        match varint::read_u31(self.remaining()) {
            Ok((val, len)) => {
                self.pos += len;
                Ok(val)
            }
            Err(VarIntError::Underflow) => Err(Halt::MoreData),
            Err(VarIntError::Overflow) => Err(DecodeError::MalformedVarint(what).into()),
        }
    }

    /// Read an unsigned 63-bit varint (checksum field only).
    pub fn u63(&mut self, what: &'static str) -> ParseResult<u64> {
        match varint::read_u63(self.remaining()) {
            Ok((val, len)) => {
                self.pos += len;
                Ok(val)
            }
            Err(VarIntError::Underflow) => Err(Halt::MoreData),
            Err(VarIntError::Overflow) => Err(DecodeError::MalformedVarint(what).into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
