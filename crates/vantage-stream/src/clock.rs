//! Playback timing and frame selection.
//!
//! [`PlaybackClock`] maps a time base onto a fractional frame index and
//! wraps at the end of the sequence. The time base is either the audio
//! sink's clock or a [`TimeSource`]; the clock itself does not care which.
//! [`FrameSelector`] then skips through the decoded cache to the frame the
//! clock asks for.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::codec::DecodedFrame;

/// Frame index used between the end of one loop and the first frame of the next.
pub const BETWEEN_LOOPS: i64 = -1;

// ─────────────────────────────────────────────────────────────────────────────
// Time sources
// ─────────────────────────────────────────────────────────────────────────────

/// Monotonic seconds from an arbitrary origin.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> f64;
}

#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    origin: Instant,
}

impl WallClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for WallClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            bits: AtomicU64::new(start.to_bits()),
        }
    }

    pub fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Clock
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockTick {
    /// Fractional frame index; the integer part is the frame to show.
    pub frame_to_display: f64,
    /// The sequence end was crossed on this tick.
    pub looped: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackClock {
    frame_rate: f64,
    seq_duration: f64,
    start_time: f64,
    time_offset: f64,
}

impl PlaybackClock {
    pub fn new(frame_rate: f32, frame_count: u32) -> Self {
        let frame_rate = f64::from(frame_rate);
        Self {
            frame_rate,
            seq_duration: f64::from(frame_count) / frame_rate,
            start_time: 0.0,
            time_offset: 0.0,
        }
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn seq_duration(&self) -> f64 {
        self.seq_duration
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn time_offset(&self) -> f64 {
        self.time_offset
    }

    /// Restart timing at `now`, `offset` seconds into the sequence.
    pub fn rebase(&mut self, now: f64, offset: f64) {
        self.start_time = now;
        self.time_offset = offset;
    }

    /// Seconds into the sequence for frame `frame`.
    pub fn offset_of(&self, frame: i64) -> f64 {
        frame.max(0) as f64 / self.frame_rate
    }

    /// Work out the frame due at `now`, wrapping once at the sequence end.
    pub fn advance(&mut self, now: f64) -> ClockTick {
        let mut elapsed = now - self.start_time;
        let mut looped = false;
        if self.time_offset + elapsed > self.seq_duration {
            self.start_time += self.seq_duration - self.time_offset;
            self.time_offset = 0.0;
            elapsed = now - self.start_time;
            looped = true;
        }
        ClockTick {
            frame_to_display: (self.time_offset + elapsed) * self.frame_rate,
            looped,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Frame selection
// ─────────────────────────────────────────────────────────────────────────────

/// Holds the frame on screen and skips forward through decoded frames.
///
/// Never interpolates and never waits: when the wanted frame has not been
/// decoded yet the previous frame stays current.
#[derive(Debug, Clone)]
pub struct FrameSelector {
    current: Option<DecodedFrame>,
    current_frame: i64,
}

impl FrameSelector {
    pub fn new() -> Self {
        Self {
            current: None,
            current_frame: BETWEEN_LOOPS,
        }
    }

    pub fn current(&self) -> Option<&DecodedFrame> {
        self.current.as_ref()
    }

    pub fn current_frame(&self) -> i64 {
        self.current_frame
    }

    /// Enter the between-loops state. The last frame stays on screen.
    pub fn mark_loop(&mut self) {
        self.current_frame = BETWEEN_LOOPS;
    }

    /// Pop frames from `next` until one matches `floor(target)`.
    ///
    /// Returns `true` when the current frame changed.
    pub fn select(&mut self, target: f64, mut next: impl FnMut() -> Option<DecodedFrame>) -> bool {
        let wanted = target.floor() as i64;
        let mut changed = false;
        if self.current.is_none() {
            if let Some(frame) = next() {
                self.show(frame);
                changed = true;
            }
        }
        while self.current_frame != wanted {
            match next() {
                Some(frame) => {
                    self.show(frame);
                    changed = true;
                }
                None => break,
            }
        }
        changed
    }

    fn show(&mut self, frame: DecodedFrame) {
        self.current_frame = frame.frame;
        self.current = Some(frame);
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.current_frame = BETWEEN_LOOPS;
    }
}

impl Default for FrameSelector {
    fn default() -> Self {
        Self::new()
    }
}
