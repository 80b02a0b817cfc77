// Streaming VCDIFF decoder driver.
//
// Owns the target buffer and the unparsed-tail buffer and walks the
// delta state machine: file header, optional custom code table, then
// windows.  Input arrives through `decode_chunk` in pieces of any size;
// whenever a structure extends past the buffered input the driver stores
// the unconsumed suffix and picks up exactly there on the next call.
//
// A custom code table is itself a VCDIFF delta whose dictionary is the
// default table's 1536-byte image, so the driver recursively runs a
// second decoder instance to materialize it.  The inner decoder finishes
// before the outer one resumes; no ownership cycles arise.

use std::io::Write;

use crate::address_cache::AddressCache;
use crate::code_table::{self, CODE_TABLE_SIZE, CodeTableData};
use crate::error::DecodeError;
use crate::parse::{Halt, HeaderParser, ParseResult};
use crate::window::{self, BodyStep, DeltaWindow, ExecEnv, WindowContext};

// ---------------------------------------------------------------------------
// File header constants
// ---------------------------------------------------------------------------

/// The first three bytes of every VCDIFF delta ('V', 'C', 'D' with the
/// high bit set).
pub const VCDIFF_MAGIC: [u8; 3] = [0xD6, 0xC3, 0xC4];

/// Header indicator: secondary compressor present (always rejected).
pub const VCD_DECOMPRESS: u8 = 0x01;
/// Header indicator: an application-defined code table follows.
pub const VCD_CODETABLE: u8 = 0x02;
/// Mask for header indicator bits this decoder does not know.
const VCD_INVHDR: u8 = !(VCD_DECOMPRESS | VCD_CODETABLE);

/// Default ceiling for the whole target and for one window (64 MiB).
pub const DEFAULT_MAX_TARGET_SIZE: usize = 1 << 26;

/// Hard upper bound for any size in the format (2^31 - 1).
pub const TARGET_SIZE_LIMIT: usize = i32::MAX as usize;

// ---------------------------------------------------------------------------
// Driver state
// ---------------------------------------------------------------------------

enum ActiveTable {
    Default,
    Custom(Box<CodeTableData>),
}

impl ActiveTable {
    fn get(&self) -> &CodeTableData {
        match self {
            ActiveTable::Default => code_table::default_code_table(),
            ActiveTable::Custom(t) => t,
        }
    }
}

enum State {
    /// Waiting for the five fixed header bytes (plus the cache-size
    /// descriptor when VCD_CODETABLE is set).
    FileHeader,
    /// Feeding an embedded custom-code-table delta to the inner decoder.
    CustomTable,
    /// Between windows.
    WindowHeader,
    /// Mid-window: header parsed, body (partially) pending.
    WindowBody(DeltaWindow),
    /// The planned target size was met; remaining input belongs to the
    /// caller.
    PlannedComplete,
    /// A fatal error occurred; only re-initialization recovers.
    Poisoned,
}

/// Push-style streaming VCDIFF decoder.
///
/// ```
/// use vcdec::StreamingDecoder;
///
/// let dictionary = b"Hello, world!";
/// # let delta: &[u8] = &[0xD6, 0xC3, 0xC4, 0x00, 0x00];
/// let mut decoder = StreamingDecoder::new();
/// let mut output = Vec::new();
/// decoder.start(dictionary).unwrap();
/// decoder.decode_chunk(delta, &mut output).unwrap();
/// decoder.finish().unwrap();
/// ```
pub struct StreamingDecoder<'d> {
    /// The dictionary, borrowed for the whole decode.
    dict: &'d [u8],
    started: bool,
    state: State,
    /// Version byte from the file header (0x00 or b'S').
    version: u8,
    cache: AddressCache,
    table: ActiveTable,

    /// Decoded target bytes.  Holds the whole file when
    /// `allow_vcd_target`, otherwise only the current window.
    target: Vec<u8>,
    /// Boundary between target bytes already handed to the sink and
    /// bytes still pending.
    output_pos: usize,
    /// Offset in `target` where the current window starts.
    window_start: usize,
    /// Input left over from the previous chunk.
    unparsed: Vec<u8>,
    /// Sum of advertised sizes of all windows seen, current included.
    total_window_sizes: usize,

    /// Inner decoder for an embedded custom code table.
    custom_decoder: Option<Box<StreamingDecoder<'static>>>,
    /// Decoded custom-table image, accumulated across chunks.
    custom_image: Vec<u8>,

    // Configuration (set before `start`).
    max_target_file_size: usize,
    max_target_window_size: usize,
    planned_target_size: Option<usize>,
    allow_vcd_target: bool,
}

impl Default for StreamingDecoder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'d> StreamingDecoder<'d> {
    pub fn new() -> Self {
        Self {
            dict: &[],
            started: false,
            state: State::FileHeader,
            version: 0,
            cache: AddressCache::new(),
            table: ActiveTable::Default,
            target: Vec::new(),
            output_pos: 0,
            window_start: 0,
            unparsed: Vec::new(),
            total_window_sizes: 0,
            custom_decoder: None,
            custom_image: Vec::new(),
            max_target_file_size: DEFAULT_MAX_TARGET_SIZE,
            max_target_window_size: DEFAULT_MAX_TARGET_SIZE,
            planned_target_size: None,
            allow_vcd_target: true,
        }
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Cap the total decoded target size.  Default 64 MiB.
    pub fn set_maximum_target_file_size(&mut self, limit: usize) -> Result<(), DecodeError> {
        self.config_guard()?;
        self.max_target_file_size = limit;
        Ok(())
    }

    /// Cap the size of a single target window.  Default 64 MiB, hard
    /// maximum 2^31 - 1.
    pub fn set_maximum_target_window_size(&mut self, limit: usize) -> Result<(), DecodeError> {
        self.config_guard()?;
        if limit > TARGET_SIZE_LIMIT {
            return Err(DecodeError::SizeLimitExceeded(format!(
                "window size limit {limit} exceeds the format maximum of {TARGET_SIZE_LIMIT}"
            )));
        }
        self.max_target_window_size = limit;
        Ok(())
    }

    /// Expect exactly this many target bytes; decoding stops there and
    /// the rest of the input is preserved for the caller (see
    /// [`StreamingDecoder::unconsumed_input_size`]).
    pub fn set_planned_target_file_size(&mut self, size: usize) -> Result<(), DecodeError> {
        self.config_guard()?;
        self.planned_target_size = Some(size);
        Ok(())
    }

    /// Allow or reject VCD_TARGET windows.  When rejected, the decoder
    /// keeps only the current window in memory and flushes it to the
    /// sink as soon as it completes.
    pub fn set_allow_vcd_target(&mut self, allow: bool) -> Result<(), DecodeError> {
        self.config_guard()?;
        self.allow_vcd_target = allow;
        Ok(())
    }

    fn config_guard(&self) -> Result<(), DecodeError> {
        if self.started {
            return Err(DecodeError::LifecycleViolation(
                "configuration changed after start",
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Arm the decoder with a dictionary.  The dictionary is borrowed,
    /// not copied, for the lifetime of the decode.
    pub fn start(&mut self, dictionary: &'d [u8]) -> Result<(), DecodeError> {
        if self.started {
            return Err(DecodeError::LifecycleViolation(
                "start called twice without finish",
            ));
        }
        self.dict = dictionary;
        self.started = true;
        Ok(())
    }

    /// Feed the next chunk of delta bytes, writing any newly determined
    /// target bytes to `sink`.
    ///
    /// Returns `Ok` both when everything was consumed and when a partial
    /// structure is buffered awaiting more input.  Any error poisons the
    /// decoder.
    pub fn decode_chunk<W: Write + ?Sized>(
        &mut self,
        chunk: &[u8],
        sink: &mut W,
    ) -> Result<(), DecodeError> {
        if !self.started {
            return Err(DecodeError::LifecycleViolation(
                "decode_chunk called before start",
            ));
        }
        if matches!(self.state, State::Poisoned) {
            return Err(DecodeError::LifecycleViolation(
                "decode_chunk called after a fatal error",
            ));
        }

        // Prepend the unparsed tail so partial structures see contiguous
        // bytes.
        let mut owned = Vec::new();
        let view: &[u8] = if self.unparsed.is_empty() {
            chunk
        } else {
            owned = std::mem::take(&mut self.unparsed);
            owned.extend_from_slice(chunk);
            &owned
        };

        let mut pos = 0;
        match self.advance(view, &mut pos, sink) {
            Ok(()) | Err(Halt::MoreData) => {
                self.unparsed = view[pos..].to_vec();
            }
            Err(Halt::Fail(e)) => {
                self.state = State::Poisoned;
                self.unparsed.clear();
                return Err(e);
            }
        }

        if let Err(e) = self.append_new_output(sink) {
            self.state = State::Poisoned;
            return Err(e);
        }
        Ok(())
    }

    /// Declare the input complete.
    ///
    /// Succeeds when a file header was seen, no window or custom code
    /// table is mid-parse, and either nothing is left unconsumed or the
    /// planned target size was met (leftover bytes then belong to an
    /// enclosing stream).  Resets the decoder for reuse either way.
    pub fn finish(&mut self) -> Result<(), DecodeError> {
        let result = self.finish_checks();
        self.reset();
        result
    }

    fn finish_checks(&self) -> Result<(), DecodeError> {
        if !self.started {
            return Err(DecodeError::LifecycleViolation("finish called before start"));
        }
        match self.state {
            State::Poisoned => Err(DecodeError::LifecycleViolation(
                "finish called after a fatal error",
            )),
            State::FileHeader => Err(DecodeError::LifecycleViolation(
                "finish called before a complete delta file header",
            )),
            State::CustomTable => Err(DecodeError::LifecycleViolation(
                "finish called while a custom code table is incomplete",
            )),
            State::WindowBody(_) => Err(DecodeError::LifecycleViolation(
                "finish called mid-window",
            )),
            State::WindowHeader => {
                if self.unparsed.is_empty() {
                    Ok(())
                } else {
                    Err(DecodeError::LifecycleViolation(
                        "finish called with a partial window header buffered",
                    ))
                }
            }
            State::PlannedComplete => Ok(()),
        }
    }

    /// Bytes from the most recent `decode_chunk` call (plus earlier
    /// tails) that the decoder did not consume.
    pub fn unconsumed_input_size(&self) -> usize {
        self.unparsed.len()
    }

    fn reset(&mut self) {
        self.dict = &[];
        self.started = false;
        self.state = State::FileHeader;
        self.version = 0;
        self.cache = AddressCache::new();
        self.table = ActiveTable::Default;
        self.target.clear();
        self.output_pos = 0;
        self.window_start = 0;
        self.unparsed.clear();
        self.total_window_sizes = 0;
        self.custom_decoder = None;
        self.custom_image.clear();
        self.planned_target_size = None;
    }

    // -----------------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------------

    fn advance<W: Write + ?Sized>(
        &mut self,
        view: &[u8],
        pos: &mut usize,
        sink: &mut W,
    ) -> ParseResult<()> {
        loop {
            match self.state {
                State::FileHeader => self.read_file_header(view, pos)?,
                State::CustomTable => self.read_custom_table(view, pos)?,
                State::WindowHeader => {
                    if *pos == view.len() {
                        return Ok(());
                    }
                    self.read_window_header(view, pos)?;
                }
                State::WindowBody(_) => self.window_body_step(view, pos, sink)?,
                State::PlannedComplete => return Ok(()),
                State::Poisoned => {
                    return Err(DecodeError::LifecycleViolation(
                        "advance on a poisoned decoder",
                    )
                    .into());
                }
            }
        }
    }

    /// Parse the delta file header (RFC 3284, Section 4.1).
    ///
    /// The magic prefix is validated byte-for-byte as soon as bytes are
    /// available, so garbage input fails at its first wrong byte even
    /// when delivered one byte at a time instead of stalling forever.
    fn read_file_header(&mut self, view: &[u8], pos: &mut usize) -> ParseResult<()> {
        let r = &view[*pos..];

        for (i, &expected) in VCDIFF_MAGIC.iter().enumerate() {
            match r.get(i) {
                Some(&b) if b == expected => {}
                Some(&b) => return Err(DecodeError::BadMagic { offset: i, byte: b }.into()),
                None => return Err(Halt::MoreData),
            }
        }
        let version = match r.get(3) {
            Some(&v) => v,
            None => return Err(Halt::MoreData),
        };
        if version != 0x00 && version != b'S' {
            return Err(DecodeError::UnsupportedVersion(version).into());
        }
        let hdr_ind = match r.get(4) {
            Some(&b) => b,
            None => return Err(Halt::MoreData),
        };
        if hdr_ind & VCD_INVHDR != 0 {
            return Err(DecodeError::MalformedHeader(format!(
                "unrecognized header indicator bits {hdr_ind:#04X}"
            ))
            .into());
        }
        if hdr_ind & VCD_DECOMPRESS != 0 {
            return Err(DecodeError::UnsupportedFeature(
                "secondary compression (VCD_DECOMPRESS)",
            )
            .into());
        }

        if hdr_ind & VCD_CODETABLE != 0 {
            // Custom cache sizes, then an embedded delta encoding the
            // table against the default table's image.
            let mut p = HeaderParser::new(&r[5..]);
            let s_near = p.u31("near cache size")? as usize;
            let s_same = p.u31("same cache size")? as usize;
            if s_near > 255 || s_same > 255 || 2 + s_near + s_same > 256 {
                return Err(DecodeError::MalformedHeader(format!(
                    "cache sizes near={s_near} same={s_same} leave no room for address modes"
                ))
                .into());
            }
            *pos += 5 + p.pos();
            self.version = version;
            self.cache = AddressCache::with_sizes(s_near, s_same);

            let mut inner = Box::new(StreamingDecoder::new());
            inner.set_planned_target_file_size(CODE_TABLE_SIZE)?;
            inner.start(code_table::default_code_table().as_image())?;
            self.custom_decoder = Some(inner);
            self.custom_image.clear();
            self.state = State::CustomTable;
        } else {
            *pos += 5;
            self.version = version;
            self.cache = AddressCache::new();
            self.state = State::WindowHeader;
        }
        Ok(())
    }

    /// Drive the inner decoder over an embedded custom code table.
    ///
    /// While the table is incomplete, every byte handed to the inner
    /// decoder counts as consumed here; the inner decoder owns any
    /// partial-structure tail.  Once it reports the full 1536 bytes, the
    /// outer decode resumes at the first byte it left untouched.
    fn read_custom_table(&mut self, view: &[u8], pos: &mut usize) -> ParseResult<()> {
        let inner = self
            .custom_decoder
            .as_mut()
            .expect("inner decoder present in CustomTable state");
        let fed = &view[*pos..];

        inner
            .decode_chunk(fed, &mut self.custom_image)
            .map_err(Halt::Fail)?;
        debug_assert!(self.custom_image.len() <= CODE_TABLE_SIZE);

        if self.custom_image.len() < CODE_TABLE_SIZE {
            *pos = view.len();
            return Err(Halt::MoreData);
        }

        inner.finish().map_err(Halt::Fail)?;
        let unconsumed = inner.unconsumed_input_size();
        debug_assert!(unconsumed <= fed.len());
        *pos += fed.len() - unconsumed;
        self.custom_decoder = None;

        let image: [u8; CODE_TABLE_SIZE] = std::mem::take(&mut self.custom_image)
            .try_into()
            .map_err(|_| {
                DecodeError::MalformedHeader("custom code table image has the wrong size".into())
            })?;
        let table = CodeTableData::from_image(image);
        table.validate(self.cache.max_mode())?;
        self.table = ActiveTable::Custom(Box::new(table));
        self.state = State::WindowHeader;
        Ok(())
    }

    fn read_window_header(&mut self, view: &[u8], pos: &mut usize) -> ParseResult<()> {
        let ctx = WindowContext {
            version: self.version,
            allow_vcd_target: self.allow_vcd_target,
            dictionary_len: self.dict.len(),
            target_len: self.target.len(),
            max_window_size: self.max_target_window_size,
            remaining_file: self
                .max_target_file_size
                .saturating_sub(self.total_window_sizes),
            remaining_planned: self
                .planned_target_size
                .map(|p| p.saturating_sub(self.total_window_sizes)),
        };
        let mut p = HeaderParser::new(&view[*pos..]);
        let win = DeltaWindow::parse(&mut p, &ctx)?;
        *pos += p.pos();

        self.total_window_sizes += win.target_window_size;
        self.window_start = self.target.len();
        self.target.reserve(win.target_window_size);
        self.cache.init();
        self.state = State::WindowBody(win);
        Ok(())
    }

    fn window_body_step<W: Write + ?Sized>(
        &mut self,
        view: &[u8],
        pos: &mut usize,
        sink: &mut W,
    ) -> ParseResult<()> {
        let State::WindowBody(win) = &mut self.state else {
            unreachable!()
        };
        let remaining = &view[*pos..];
        let mut env = ExecEnv {
            dict: self.dict,
            target: &mut self.target,
            window_start: self.window_start,
            cache: &mut self.cache,
            table: self.table.get(),
        };

        if win.interleaved {
            let section_left = win.inst_len - win.inst_consumed;
            let avail = remaining.len().min(section_left);
            let complete = avail == section_left;
            match window::decode_body_interleaved(win, &remaining[..avail], complete, &mut env)? {
                BodyStep::Finished { consumed } => {
                    *pos += consumed;
                    self.complete_window(sink)?;
                }
                BodyStep::Suspended { consumed } => {
                    *pos += consumed;
                    return Err(Halt::MoreData);
                }
            }
        } else {
            let body_len = win.body_len();
            if remaining.len() < body_len {
                return Err(Halt::MoreData);
            }
            window::decode_body_buffered(win, &remaining[..body_len], &mut env)?;
            *pos += body_len;
            self.complete_window(sink)?;
        }
        Ok(())
    }

    /// Close out a finished window: verify its checksum, decide whether
    /// decoding stops at a planned size boundary, and — when VCD_TARGET
    /// windows are disallowed, so no later window can reference old
    /// target data — flush the window to the sink and drop it from
    /// memory.
    fn complete_window<W: Write + ?Sized>(&mut self, sink: &mut W) -> ParseResult<()> {
        let State::WindowBody(win) = std::mem::replace(&mut self.state, State::WindowHeader)
        else {
            unreachable!()
        };
        win.verify_checksum(&self.target[self.window_start..])?;

        if let Some(planned) = self.planned_target_size
            && self.total_window_sizes == planned
        {
            self.state = State::PlannedComplete;
        }

        if !self.allow_vcd_target {
            sink.write_all(&self.target[self.output_pos..])
                .map_err(DecodeError::from)?;
            self.target.clear();
            self.output_pos = 0;
            self.window_start = 0;
        }
        Ok(())
    }

    /// Hand the sink every decoded byte it has not seen yet.
    fn append_new_output<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<(), DecodeError> {
        if self.target.len() > self.output_pos {
            sink.write_all(&self.target[self.output_pos..])?;
            self.output_pos = self.target.len();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// One-shot convenience
// ---------------------------------------------------------------------------

/// Decode a complete in-memory delta against a dictionary.
pub fn decode(dictionary: &[u8], delta: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut decoder = StreamingDecoder::new();
    decoder.start(dictionary)?;
    let mut output = Vec::new();
    decoder.decode_chunk(delta, &mut output)?;
    decoder.finish()?;
    Ok(output)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
