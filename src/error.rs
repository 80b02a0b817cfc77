// Decoder error type.
//
// Every error is fatal for the current decode: the driver moves to a
// poisoned state and only re-initialization recovers.  "Need more data"
// is not an error; it is the `parse::Halt::MoreData` signal and never
// escapes `decode_chunk`.

use std::io;

/// Reasons a VCDIFF decode can fail.
#[derive(Debug)]
pub enum DecodeError {
    /// The first bytes of the delta do not match `0xD6 0xC3 0xC4`.
    BadMagic { offset: usize, byte: u8 },
    /// Version byte is neither 0x00 (RFC 3284) nor b'S' (SDCH extensions).
    UnsupportedVersion(u8),
    /// The delta requests a feature this decoder rejects by design
    /// (secondary compression, checksums in a non-'S' delta).
    UnsupportedFeature(&'static str),
    /// A variable-length integer overflows its width or is over-long.
    MalformedVarint(&'static str),
    /// A structural problem in the file or window header.
    MalformedHeader(String),
    /// A window or the whole target exceeds a configured limit, or an
    /// instruction would write past the advertised window size.
    SizeLimitExceeded(String),
    /// A decoded COPY address falls outside `[0, here)`.
    BadAddress { addr: u64, here: u64 },
    /// An invalid opcode or code-table entry.
    BadOpcode(String),
    /// At window end a section had leftover or missing bytes.
    SectionLengthMismatch(String),
    /// The Adler-32 of the decoded window does not match the delta.
    ChecksumMismatch { expected: u64, actual: u32 },
    /// Interface calls out of order (decode before start, double start,
    /// finish mid-window, use after a fatal error).
    LifecycleViolation(&'static str),
    /// A VCD_TARGET window was seen with `allow_vcd_target` disabled.
    VcdTargetDisallowed,
    /// The output sink failed.
    Io(io::Error),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadMagic { offset, byte } => {
                write!(
                    f,
                    "not a VCDIFF delta: byte {byte:#04X} at offset {offset} does not match magic"
                )
            }
            Self::UnsupportedVersion(v) => {
                write!(f, "unrecognized VCDIFF version byte {v:#04X}")
            }
            Self::UnsupportedFeature(msg) => write!(f, "unsupported: {msg}"),
            Self::MalformedVarint(what) => write!(f, "malformed varint in {what}"),
            Self::MalformedHeader(msg) => write!(f, "malformed header: {msg}"),
            Self::SizeLimitExceeded(msg) => write!(f, "size limit exceeded: {msg}"),
            Self::BadAddress { addr, here } => {
                write!(f, "COPY address {addr} is outside the address space [0, {here})")
            }
            Self::BadOpcode(msg) => write!(f, "bad opcode: {msg}"),
            Self::SectionLengthMismatch(msg) => {
                write!(f, "section length mismatch: {msg}")
            }
            Self::ChecksumMismatch { expected, actual } => {
                write!(
                    f,
                    "checksum mismatch: delta says {expected:#010X}, decoded window has {actual:#010X}"
                )
            }
            Self::LifecycleViolation(msg) => write!(f, "lifecycle violation: {msg}"),
            Self::VcdTargetDisallowed => {
                write!(f, "VCD_TARGET window rejected: allow_vcd_target is disabled")
            }
            Self::Io(e) => write!(f, "output sink error: {e}"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DecodeError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
