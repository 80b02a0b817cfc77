// VCDIFF delta window: header parsing and instruction execution
// (RFC 3284, Sections 4.2 and 4.3, plus the SDCH 'S' extensions).
//
// A window is parsed in two stages.  The header (win indicator, source
// segment, lengths, optional checksum) parses atomically: either the
// whole header is available or the attempt halts with MoreData and is
// retried from scratch.  The body executes with a checkpoint per
// half-instruction, so an interleaved window can suspend mid-stream and
// resume on the next chunk without re-running any completed instruction.

use crate::address_cache::AddressCache;
use crate::code_table::{CodeTableData, OpcodeHalf, VCD_ADD, VCD_COPY, VCD_NOOP, VCD_RUN};
use crate::error::DecodeError;
use crate::parse::{Halt, HeaderParser, ParseResult};

// ---------------------------------------------------------------------------
// Window indicator flags (Win_Indicator)
// ---------------------------------------------------------------------------

pub const VCD_SOURCE: u8 = 0x01;
pub const VCD_TARGET: u8 = 0x02;
pub const VCD_CHECKSUM: u8 = 0x04;
/// Mask for window indicator bits this decoder does not know.
const VCD_INVWIN: u8 = !(VCD_SOURCE | VCD_TARGET | VCD_CHECKSUM);

// ---------------------------------------------------------------------------
// Source segment
// ---------------------------------------------------------------------------

/// Where a window's source segment lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SegmentOrigin {
    /// A range of the dictionary (VCD_SOURCE).
    Dictionary,
    /// A range of previously decoded target data (VCD_TARGET).
    Target,
}

/// A window's source segment: a borrowed view resolved at COPY time.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SourceSegment {
    pub origin: SegmentOrigin,
    pub pos: usize,
    pub len: usize,
}

// ---------------------------------------------------------------------------
// Parse context and limits
// ---------------------------------------------------------------------------

/// Everything the window-header parser needs from the driver.
pub(crate) struct WindowContext {
    /// Delta file version byte (0x00 or b'S').
    pub version: u8,
    pub allow_vcd_target: bool,
    pub dictionary_len: usize,
    /// Decoded target length at the start of this window.
    pub target_len: usize,
    pub max_window_size: usize,
    /// Room left under `max_target_file_size`.
    pub remaining_file: usize,
    /// Room left under `planned_target_file_size`, when one is set.
    pub remaining_planned: Option<usize>,
}

// ---------------------------------------------------------------------------
// Delta window
// ---------------------------------------------------------------------------

/// One parsed window header plus body-execution progress.
pub(crate) struct DeltaWindow {
    pub seg: Option<SourceSegment>,
    pub target_window_size: usize,
    pub data_len: usize,
    pub inst_len: usize,
    pub addr_len: usize,
    /// Expected Adler-32, parsed as a 63-bit varint ('S' deltas only).
    pub checksum: Option<u64>,
    /// All three sections alias the instruction stream.
    pub interleaved: bool,

    // Body progress, meaningful for interleaved windows that suspend.
    /// Target bytes written in this window so far.
    pub written: usize,
    /// Instruction-stream bytes committed so far.
    pub inst_consumed: usize,
    /// Second half of a compound opcode whose first half already ran.
    pending_second: Option<OpcodeHalf>,
}

impl DeltaWindow {
    /// Parse a window header.  On `MoreData` nothing is committed and the
    /// whole header is re-parsed when more input arrives.
    pub(crate) fn parse(p: &mut HeaderParser<'_>, ctx: &WindowContext) -> ParseResult<DeltaWindow> {
        let win_ind = p.byte()?;
        if win_ind & VCD_INVWIN != 0 {
            return Err(DecodeError::MalformedHeader(format!(
                "unrecognized window indicator bits {win_ind:#04X}"
            ))
            .into());
        }
        if win_ind & VCD_CHECKSUM != 0 && ctx.version != b'S' {
            return Err(
                DecodeError::UnsupportedFeature("window checksum in a non-'S' delta").into(),
            );
        }
        if win_ind & VCD_SOURCE != 0 && win_ind & VCD_TARGET != 0 {
            return Err(DecodeError::MalformedHeader(
                "window sets both VCD_SOURCE and VCD_TARGET".into(),
            )
            .into());
        }

        let seg = if win_ind & (VCD_SOURCE | VCD_TARGET) != 0 {
            let origin = if win_ind & VCD_SOURCE != 0 {
                SegmentOrigin::Dictionary
            } else {
                if !ctx.allow_vcd_target {
                    return Err(DecodeError::VcdTargetDisallowed.into());
                }
                SegmentOrigin::Target
            };
            let len = p.u31("source segment length")? as usize;
            let pos = p.u31("source segment position")? as usize;
            let origin_len = match origin {
                SegmentOrigin::Dictionary => ctx.dictionary_len,
                SegmentOrigin::Target => ctx.target_len,
            };
            if len > origin_len || pos > origin_len - len {
                return Err(DecodeError::MalformedHeader(format!(
                    "source segment [{pos}, {pos}+{len}) outside the {} bytes available",
                    origin_len
                ))
                .into());
            }
            Some(SourceSegment { origin, pos, len })
        } else {
            None
        };

        let enc_len = p.u31("delta encoding length")? as usize;
        let enc_start = p.pos();

        let target_window_size = p.u31("target window size")? as usize;
        if target_window_size > ctx.max_window_size {
            return Err(DecodeError::SizeLimitExceeded(format!(
                "target window of {target_window_size} bytes exceeds the {} byte window limit",
                ctx.max_window_size
            ))
            .into());
        }
        if target_window_size > ctx.remaining_file {
            return Err(DecodeError::SizeLimitExceeded(format!(
                "target window of {target_window_size} bytes would push the file past its limit \
                 ({} bytes remain)",
                ctx.remaining_file
            ))
            .into());
        }
        if let Some(remaining) = ctx.remaining_planned
            && target_window_size > remaining
        {
            return Err(DecodeError::SizeLimitExceeded(format!(
                "target window of {target_window_size} bytes exceeds the {remaining} bytes \
                 remaining of the planned target size"
            ))
            .into());
        }

        let delta_ind = p.byte()?;
        if delta_ind != 0 {
            return Err(DecodeError::UnsupportedFeature(
                "secondary compression (nonzero delta indicator)",
            )
            .into());
        }

        let data_len = p.u31("data section length")? as usize;
        let inst_len = p.u31("instruction section length")? as usize;
        let addr_len = p.u31("address section length")? as usize;

        let checksum = if ctx.version == b'S' && win_ind & VCD_CHECKSUM != 0 {
            Some(p.u63("window checksum")?)
        } else {
            None
        };

        // The delta encoding length is a redundancy check: it spans the
        // header fields after itself plus the three sections.
        let header_tail = (p.pos() - enc_start) as u64;
        let expected = header_tail + data_len as u64 + inst_len as u64 + addr_len as u64;
        if enc_len as u64 != expected {
            return Err(DecodeError::MalformedHeader(format!(
                "delta encoding length {enc_len} does not match its contents ({expected} bytes)"
            ))
            .into());
        }

        let interleaved = ctx.version == b'S' && data_len == 0 && addr_len == 0;

        Ok(DeltaWindow {
            seg,
            target_window_size,
            data_len,
            inst_len,
            addr_len,
            checksum,
            interleaved,
            written: 0,
            inst_consumed: 0,
            pending_second: None,
        })
    }

    /// Total body length (the three sections).
    pub(crate) fn body_len(&self) -> usize {
        self.data_len + self.inst_len + self.addr_len
    }

    pub(crate) fn source_segment_size(&self) -> usize {
        self.seg.map_or(0, |s| s.len)
    }

    /// Verify the window checksum against the decoded window bytes.
    pub(crate) fn verify_checksum(&self, window_bytes: &[u8]) -> Result<(), DecodeError> {
        if let Some(expected) = self.checksum {
            let actual = compute_adler32(window_bytes);
            if u64::from(actual) != expected {
                return Err(DecodeError::ChecksumMismatch { expected, actual });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Body execution
// ---------------------------------------------------------------------------

/// Mutable decode surroundings for one window body.
pub(crate) struct ExecEnv<'e> {
    pub dict: &'e [u8],
    pub target: &'e mut Vec<u8>,
    /// Offset in `target` where this window's output starts.
    pub window_start: usize,
    pub cache: &'e mut AddressCache,
    pub table: &'e CodeTableData,
}

/// Result of one interleaved body attempt.
pub(crate) enum BodyStep {
    /// Window body fully executed; `consumed` bytes of input were used.
    Finished { consumed: usize },
    /// Input ran out at an instruction boundary; `consumed` bytes commit
    /// and the rest is retried with the next chunk.
    Suspended { consumed: usize },
}

/// Execute a complete non-interleaved window body.
///
/// `body` must hold exactly the three sections.  With everything present,
/// any stream running dry is a malformed delta, not a suspension.
pub(crate) fn decode_body_buffered(
    win: &mut DeltaWindow,
    body: &[u8],
    env: &mut ExecEnv<'_>,
) -> Result<(), DecodeError> {
    debug_assert_eq!(body.len(), win.body_len());
    let (data, rest) = body.split_at(win.data_len);
    let (inst, addr) = rest.split_at(win.inst_len);
    let mut streams = Streams::Separate {
        data: HeaderParser::new(data),
        inst: HeaderParser::new(inst),
        addr: HeaderParser::new(addr),
    };

    match run(win, &mut streams, env) {
        Ok(()) => {}
        Err(Halt::MoreData) => {
            return Err(DecodeError::SectionLengthMismatch(
                "a section ran dry before the window filled".into(),
            ));
        }
        Err(Halt::Fail(e)) => return Err(e),
    }

    let Streams::Separate { data, inst, addr } = streams else {
        unreachable!()
    };
    for (stream, name) in [(&data, "data"), (&inst, "instruction"), (&addr, "address")] {
        if !stream.is_exhausted() {
            return Err(DecodeError::SectionLengthMismatch(format!(
                "{name} section has {} leftover bytes",
                stream.remaining().len()
            )));
        }
    }
    Ok(())
}

/// Execute as much of an interleaved window body as `avail` allows.
///
/// `avail` starts at the first uncommitted instruction byte and is capped
/// by the driver at the section's remaining length; `section_complete`
/// says whether `avail` reaches the section's end.
pub(crate) fn decode_body_interleaved(
    win: &mut DeltaWindow,
    avail: &[u8],
    section_complete: bool,
    env: &mut ExecEnv<'_>,
) -> Result<BodyStep, DecodeError> {
    let mut streams = Streams::Interleaved(HeaderParser::new(avail));

    match run(win, &mut streams, env) {
        Ok(()) => {
            let consumed = streams.inst_pos();
            win.inst_consumed += consumed;
            if win.inst_consumed != win.inst_len {
                return Err(DecodeError::SectionLengthMismatch(format!(
                    "instruction stream has {} leftover bytes after the window filled",
                    win.inst_len - win.inst_consumed
                )));
            }
            Ok(BodyStep::Finished { consumed })
        }
        Err(Halt::MoreData) => {
            if section_complete {
                return Err(DecodeError::SectionLengthMismatch(
                    "instruction stream ran dry before the window filled".into(),
                ));
            }
            let consumed = streams.inst_pos();
            win.inst_consumed += consumed;
            Ok(BodyStep::Suspended { consumed })
        }
        Err(Halt::Fail(e)) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Stream plumbing
// ---------------------------------------------------------------------------

/// The three logical byte streams of a window body.  In interleaved form
/// they share one cursor.
enum Streams<'a> {
    Separate {
        data: HeaderParser<'a>,
        inst: HeaderParser<'a>,
        addr: HeaderParser<'a>,
    },
    Interleaved(HeaderParser<'a>),
}

impl<'a> Streams<'a> {
    fn inst(&mut self) -> &mut HeaderParser<'a> {
        match self {
            Streams::Separate { inst, .. } => inst,
            Streams::Interleaved(p) => p,
        }
    }

    fn data(&mut self) -> &mut HeaderParser<'a> {
        match self {
            Streams::Separate { data, .. } => data,
            Streams::Interleaved(p) => p,
        }
    }

    fn addr(&mut self) -> &mut HeaderParser<'a> {
        match self {
            Streams::Separate { addr, .. } => addr,
            Streams::Interleaved(p) => p,
        }
    }

    fn checkpoint(&self) -> (usize, usize, usize) {
        match self {
            Streams::Separate { data, inst, addr } => (data.pos(), inst.pos(), addr.pos()),
            Streams::Interleaved(p) => (p.pos(), 0, 0),
        }
    }

    fn rollback(&mut self, cp: (usize, usize, usize)) {
        match self {
            Streams::Separate { data, inst, addr } => {
                data.set_pos(cp.0);
                inst.set_pos(cp.1);
                addr.set_pos(cp.2);
            }
            Streams::Interleaved(p) => p.set_pos(cp.0),
        }
    }

    fn inst_pos(&self) -> usize {
        match self {
            Streams::Separate { inst, .. } => inst.pos(),
            Streams::Interleaved(p) => p.pos(),
        }
    }
}

// ---------------------------------------------------------------------------
// Instruction loop
// ---------------------------------------------------------------------------

fn run(win: &mut DeltaWindow, streams: &mut Streams<'_>, env: &mut ExecEnv<'_>) -> ParseResult<()> {
    loop {
        if win.written == win.target_window_size && win.pending_second.is_none() {
            return Ok(());
        }

        let cp = streams.checkpoint();
        let restore_pending;
        let half = match win.pending_second.take() {
            Some(h) => {
                restore_pending = Some(h);
                h
            }
            None => {
                restore_pending = None;
                let opcode = streams.inst().byte()?;
                let h1 = env.table.half1(opcode);
                let h2 = env.table.half2(opcode);
                if h1.is_noop() {
                    // Table validation ruled out double NO_OPs.
                    h2
                } else {
                    win.pending_second = (!h2.is_noop()).then_some(h2);
                    h1
                }
            }
        };

        match exec_half(win, streams, env, half) {
            Ok(()) => {}
            Err(Halt::MoreData) => {
                streams.rollback(cp);
                win.pending_second = restore_pending;
                return Err(Halt::MoreData);
            }
            Err(fail) => return Err(fail),
        }
    }
}

fn exec_half(
    win: &mut DeltaWindow,
    streams: &mut Streams<'_>,
    env: &mut ExecEnv<'_>,
    half: OpcodeHalf,
) -> ParseResult<()> {
    let size = if half.size == 0 {
        streams.inst().u31("instruction size")? as usize
    } else {
        half.size as usize
    };

    if size > win.target_window_size - win.written {
        return Err(DecodeError::SizeLimitExceeded(format!(
            "instruction writes {size} bytes with only {} left in the window",
            win.target_window_size - win.written
        ))
        .into());
    }

    match half.inst {
        VCD_ADD => {
            let bytes = streams.data().take(size)?;
            env.target.extend_from_slice(bytes);
        }
        VCD_RUN => {
            let byte = streams.data().byte()?;
            env.target.resize(env.target.len() + size, byte);
        }
        VCD_COPY => {
            let sss = win.source_segment_size();
            let here = (sss + win.written) as u64;
            let addr = env.cache.decode_addr(half.mode, here, streams.addr())? as usize;
            copy_bytes(env, win.seg, addr, size, sss);
        }
        VCD_NOOP => {}
        other => {
            return Err(DecodeError::BadOpcode(format!(
                "instruction code {other} out of range"
            ))
            .into());
        }
    }

    win.written += size;
    Ok(())
}

/// Copy `n` bytes starting at address `addr` of the window's address
/// space: `[0, sss)` is the source segment, `[sss, here)` is this
/// window's already-written output.
///
/// The overlapping self-copy must go byte by byte: each written byte is
/// immediately readable by the next iteration, which is how COPY encodes
/// run-length patterns.
fn copy_bytes(env: &mut ExecEnv<'_>, seg: Option<SourceSegment>, addr: usize, n: usize, sss: usize) {
    if n == 0 {
        return;
    }
    if addr + n <= sss {
        // Entirely inside the source segment.
        let seg = seg.expect("segment present when sss > 0");
        let start = seg.pos + addr;
        match seg.origin {
            SegmentOrigin::Dictionary => env.target.extend_from_slice(&env.dict[start..start + n]),
            SegmentOrigin::Target => env.target.extend_from_within(start..start + n),
        }
    } else if addr >= sss {
        // Entirely within this window's output.
        let start = env.window_start + (addr - sss);
        if start + n <= env.target.len() {
            env.target.extend_from_within(start..start + n);
        } else {
            for i in 0..n {
                let byte = env.target[start + i];
                env.target.push(byte);
            }
        }
    } else {
        // Spans the segment/target boundary.
        let seg = seg.expect("segment present when sss > 0");
        for i in 0..n {
            let idx = addr + i;
            let byte = if idx < sss {
                match seg.origin {
                    SegmentOrigin::Dictionary => env.dict[seg.pos + idx],
                    SegmentOrigin::Target => env.target[seg.pos + idx],
                }
            } else {
                env.target[env.window_start + (idx - sss)]
            };
            env.target.push(byte);
        }
    }
}

// ---------------------------------------------------------------------------
// Adler-32
// ---------------------------------------------------------------------------

pub(crate) fn compute_adler32(data: &[u8]) -> u32 {
    #[cfg(feature = "adler32")]
    {
        let mut hasher = simd_adler32::Adler32::new();
        hasher.write(data);
        hasher.finish()
    }
    #[cfg(not(feature = "adler32"))]
    {
        const MOD_ADLER: u32 = 65521;
        let mut a: u32 = 1;
        let mut b: u32 = 0;
        for &byte in data {
            a = (a + u32::from(byte)) % MOD_ADLER;
            b = (b + a) % MOD_ADLER;
        }
        (b << 16) | a
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
