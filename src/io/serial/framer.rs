// src/io/serial/framer.rs
//
// Deframer for the sync/length/trailer protocol spoken by the capture probe.
//
// Wire format:
//   | 0xAA | len lo | len hi | len bytes of body | 0x55 |
//
// The body is `ticks (4B LE) | direction (1B) | payload`. `FrameParser` is the
// plain state machine; `Deframer` adds the lock, the sink and the idle timer.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::runtime::Handle;

use super::idle::IdleFlushTimer;
use crate::capture::FrameSink;
use crate::io::{Frame, FramingFault, IoError, FRAME_HEADER_LEN};

// =============================================================================
// Constants
// =============================================================================

pub const SYNC_BYTE: u8 = 0xAA;
pub const TRAILER_BYTE: u8 = 0x55;

/// Frame buffer size. Holds the sync byte, the length field and the body.
pub const FRAME_BUFFER_CAPACITY: usize = 64 * 1024;

/// Sync byte + 2-byte length
const WIRE_HEADER_LEN: usize = 3;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    SeekSync,
    LengthLow,
    LengthHigh,
    Body,
    Trailer,
}

/// Running counters, reported at shutdown
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeframerStats {
    pub frames: u64,
    pub trailer_mismatches: u64,
    pub buffer_overflows: u64,
    pub short_bodies: u64,
    pub idle_flushes: u64,
    /// Non-sync bytes skipped while hunting for a frame start (replayed bytes count again)
    pub skipped_bytes: u64,
    pub sink_failures: u64,
}

/// Frames completed and faults recovered while processing one chunk
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub frames: Vec<Frame>,
    pub faults: Vec<FramingFault>,
}

// =============================================================================
// FrameParser
// =============================================================================

/// Resynchronizing frame parser.
///
/// On corrupt framing the parser restarts the sync search one byte past the
/// sync byte that opened the failed frame, replaying the buffered bytes, so a
/// real frame hidden inside a bogus one is still recovered.
pub struct FrameParser {
    buffer: Vec<u8>,
    frame_len: usize,
    state: ParseState,
    stats: DeframerStats,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    pub fn new() -> Self {
        FrameParser {
            buffer: Vec::with_capacity(FRAME_BUFFER_CAPACITY),
            frame_len: 0,
            state: ParseState::SeekSync,
            stats: DeframerStats::default(),
        }
    }

    /// Bytes buffered after the sync byte of the current frame
    pub fn frame_cnt(&self) -> usize {
        self.buffer.len().saturating_sub(1)
    }

    /// Declared body length of the current frame (0 until the length is known)
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// True when no partial frame is buffered
    pub fn is_idle(&self) -> bool {
        self.state == ParseState::SeekSync
    }

    pub fn stats(&self) -> &DeframerStats {
        &self.stats
    }

    pub(crate) fn note_sink_failure(&mut self) {
        self.stats.sink_failures += 1;
    }

    /// Feed a raw chunk. Chunk boundaries carry no meaning.
    pub fn push(&mut self, chunk: &[u8]) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();
        self.run(chunk.iter().copied().collect(), &mut outcome);
        outcome
    }

    /// Retire a stalled partial frame: rescan its buffered bytes (past the
    /// stalled sync byte) for frames, then clear the parser unconditionally.
    /// The stalled data itself is never emitted.
    pub fn flush_stalled(&mut self) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();
        if self.is_idle() {
            return outcome;
        }

        self.stats.idle_flushes += 1;
        let replay: VecDeque<u8> = self.buffer.drain(..).skip(1).collect();
        self.reset();
        self.run(replay, &mut outcome);
        self.reset();
        outcome
    }

    /// Drop any partial frame. Returns the number of bytes discarded.
    pub fn reset(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        self.frame_len = 0;
        self.state = ParseState::SeekSync;
        dropped
    }

    fn run(&mut self, mut input: VecDeque<u8>, outcome: &mut ParseOutcome) {
        while let Some(&byte) = input.front() {
            match self.state {
                ParseState::SeekSync => {
                    let skip = input
                        .iter()
                        .position(|&b| b == SYNC_BYTE)
                        .unwrap_or(input.len());
                    self.stats.skipped_bytes += skip as u64;
                    input.drain(..skip);
                    if let Some(sync) = input.pop_front() {
                        self.buffer.push(sync);
                        self.state = ParseState::LengthLow;
                    }
                }
                ParseState::LengthLow => {
                    input.pop_front();
                    self.buffer.push(byte);
                    self.frame_len = byte as usize;
                    self.state = ParseState::LengthHigh;
                }
                ParseState::LengthHigh => {
                    input.pop_front();
                    self.buffer.push(byte);
                    self.frame_len += (byte as usize) * 256;

                    if WIRE_HEADER_LEN + self.frame_len > FRAME_BUFFER_CAPACITY {
                        self.stats.buffer_overflows += 1;
                        let fault = FramingFault::FrameBufferOverflow {
                            declared: self.frame_len,
                        };
                        self.resync(fault, None, &mut input, outcome);
                    } else if self.frame_len < FRAME_HEADER_LEN {
                        self.stats.short_bodies += 1;
                        let fault = FramingFault::BodyTooShort {
                            declared: self.frame_len,
                        };
                        self.resync(fault, None, &mut input, outcome);
                    } else {
                        self.state = ParseState::Body;
                    }
                }
                ParseState::Body => {
                    // Copy as much of the body as this input holds
                    let want = WIRE_HEADER_LEN + self.frame_len - self.buffer.len();
                    let take = want.min(input.len());
                    self.buffer.extend(input.drain(..take));
                    if self.frame_cnt() == self.frame_len + 2 {
                        self.state = ParseState::Trailer;
                    }
                }
                ParseState::Trailer => {
                    input.pop_front();
                    if byte == TRAILER_BYTE {
                        let body = self.buffer[WIRE_HEADER_LEN..].to_vec();
                        self.reset();
                        if let Some(frame) = Frame::from_body(body) {
                            self.stats.frames += 1;
                            outcome.frames.push(frame);
                        }
                    } else {
                        self.stats.trailer_mismatches += 1;
                        let fault = FramingFault::TrailerMismatch { found: byte };
                        self.resync(fault, Some(byte), &mut input, outcome);
                    }
                }
            }
        }
    }

    /// Abandon the current frame and put everything after its sync byte
    /// (plus `pending`, the byte that exposed the fault) back in front of the
    /// remaining input.
    fn resync(
        &mut self,
        fault: FramingFault,
        pending: Option<u8>,
        input: &mut VecDeque<u8>,
        outcome: &mut ParseOutcome,
    ) {
        outcome.faults.push(fault);

        let remaining = input.len();
        input.extend(self.buffer.drain(..).skip(1));
        input.extend(pending);
        input.rotate_right(input.len() - remaining);
        self.reset();
    }
}

// =============================================================================
// Deframer
// =============================================================================

struct DeframerState {
    parser: FrameParser,
    sink: Box<dyn FrameSink>,
    timer: IdleFlushTimer,
    /// Sink failure raised from a timer-driven dispatch, reported by the next feed
    deferred_error: Option<IoError>,
}

impl DeframerState {
    /// Hand completed frames to the sink in order. Returns the number
    /// delivered, or the first sink error (later frames are still attempted).
    fn dispatch(&mut self, outcome: ParseOutcome) -> Result<usize, IoError> {
        for fault in &outcome.faults {
            tlog!("[deframer] Resyncing after {}", fault);
        }

        let mut delivered = 0;
        let mut first_error = None;
        for frame in outcome.frames {
            match self.sink.accept(frame) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    self.parser.note_sink_failure();
                    tlog!("[deframer] Sink rejected frame: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(delivered),
        }
    }
}

/// Thread-safe deframer: owns the parser, the frame sink and the idle timer
/// behind a single lock shared by `feed` and the timer task.
pub struct Deframer {
    shared: Arc<Mutex<DeframerState>>,
}

impl Deframer {
    /// Create a deframer dispatching to `sink`. Idle timers are spawned on `runtime`.
    pub fn new(sink: Box<dyn FrameSink>, idle_timeout: Duration, runtime: Handle) -> Self {
        let state = DeframerState {
            parser: FrameParser::new(),
            sink,
            timer: IdleFlushTimer::new(runtime, idle_timeout),
            deferred_error: None,
        };
        Deframer {
            shared: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(shared: &Mutex<DeframerState>) -> MutexGuard<'_, DeframerState> {
        shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Feed one raw chunk. Framing faults are recovered internally; only sink
    /// failures are returned. Returns the number of frames delivered.
    pub fn feed(&self, chunk: &[u8]) -> Result<usize, IoError> {
        let mut state = Self::lock(&self.shared);
        state.timer.cancel();

        let outcome = state.parser.push(chunk);
        let result = state.dispatch(outcome);

        if !state.parser.is_idle() {
            let weak = Arc::downgrade(&self.shared);
            state
                .timer
                .arm(move |generation| Self::on_idle(weak, generation));
        }

        // A failure from this chunk supersedes one held back from the timer;
        // both have already been logged and counted
        match (result, state.deferred_error.take()) {
            (Err(e), _) | (Ok(_), Some(e)) => Err(e),
            (Ok(delivered), None) => Ok(delivered),
        }
    }

    fn on_idle(shared: Weak<Mutex<DeframerState>>, generation: u64) {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        let mut state = Self::lock(&shared);
        if !state.timer.is_current(generation) {
            return;
        }
        state.timer.fired();

        let stalled = state.parser.frame_cnt() + 1;
        let outcome = state.parser.flush_stalled();
        tlog!(
            "[deframer] Idle for {:?}, retired {} stalled bytes ({} frame(s) recovered)",
            state.timer.duration(),
            stalled,
            outcome.frames.len()
        );

        if let Err(e) = state.dispatch(outcome) {
            state.deferred_error.get_or_insert(e);
        }
    }

    /// True when no partial frame is buffered
    pub fn is_idle(&self) -> bool {
        Self::lock(&self.shared).parser.is_idle()
    }

    pub fn stats(&self) -> DeframerStats {
        Self::lock(&self.shared).parser.stats().clone()
    }

    /// Stream ended: discard any unfinished frame, close the sink.
    pub fn finish(self) -> Result<DeframerStats, IoError> {
        let mut state = Self::lock(&self.shared);
        state.timer.cancel();

        let dropped = state.parser.reset();
        if dropped > 0 {
            tlog!("[deframer] Discarding {} bytes of an unfinished frame", dropped);
        }

        let deferred = state.deferred_error.take();
        let closed = state.sink.close();
        let stats = state.parser.stats().clone();

        match deferred {
            Some(e) => Err(e),
            None => closed.map(|_| stats),
        }
    }
}
