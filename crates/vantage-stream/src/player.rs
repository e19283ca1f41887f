//! [`VolumetricPlayer`] – the playback facade over store, decoder and clock.
//!
//! The player is driven from outside at two rates:
//!
//! * [`pump`](VolumetricPlayer::pump) every [`decode_period`](VolumetricPlayer::decode_period):
//!   collects decoded frames, dispatches the next chunks and refills the
//!   pending queue from the network;
//! * [`update`](VolumetricPlayer::update) once per rendered frame: advances
//!   the clock and picks the frame to show. It never awaits.
//!
//! When the container carries an audio track and an [`AudioSink`] is
//! attached, the audio clock drives timing; otherwise the [`TimeSource`] does.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};
use vantage_transport::{EventBus, Topic};
use vantage_types::{Event, EventPayload};

use crate::chunk_store::{ChunkStore, DEFAULT_CACHE_BUDGET};
use crate::clock::{BETWEEN_LOOPS, FrameSelector, PlaybackClock, TimeSource};
use crate::codec::{DecodedFrame, MeshCodec};
use crate::container::SequenceInfo;
use crate::decoder::{DEFAULT_DECODED_CACHE, FrameDecoder};
use crate::error::StreamError;
use crate::fetch::RangeFetcher;

const EVENT_SOURCE: &str = "player";

/// Gain restored by [`VolumetricPlayer::unmute`] when none was recorded.
pub const DEFAULT_UNMUTE_GAIN: f32 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    /// Bytes requested per bulk fetch.
    pub cache_budget: u64,
    /// Decoded frames held ahead of playback.
    pub decoder_cache_size: usize,
    /// Chunks handed to the decoder per [`pump`](VolumetricPlayer::pump).
    pub chunks_per_tick: usize,
    pub keep_chunks_in_cache: bool,
    /// Start playing as soon as [`load`](VolumetricPlayer::load) has buffered.
    pub play_on_load: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            cache_budget: DEFAULT_CACHE_BUDGET,
            decoder_cache_size: DEFAULT_DECODED_CACHE,
            chunks_per_tick: 6,
            keep_chunks_in_cache: false,
            play_on_load: true,
        }
    }
}

/// Platform audio output for the embedded track.
pub trait AudioSink: Send {
    /// The sink's own clock, in seconds.
    fn now(&self) -> f64;

    fn load(&mut self, track: &[u8]) -> Result<(), StreamError>;

    /// Start playing `offset` seconds into the track.
    fn start(&mut self, offset: f64);

    fn stop(&mut self);

    fn set_gain(&mut self, gain: f32);

    fn gain(&self) -> f32;
}

/// Playback flags shared with the loop-end hook.
///
/// The hook runs inside [`VolumetricPlayer::update`]; requests made through
/// the control take effect before `update` returns.
#[derive(Debug, Clone, Default)]
pub struct PlaybackControl {
    playing: Arc<AtomicBool>,
    destroy_requested: Arc<AtomicBool>,
}

impl PlaybackControl {
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }

    /// Stop playback and release the player's resources.
    pub fn destroy(&self) {
        self.destroy_requested.store(true, Ordering::SeqCst);
        self.pause();
    }

    fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::SeqCst);
    }

    fn take_destroy(&self) -> bool {
        self.destroy_requested.swap(false, Ordering::SeqCst)
    }
}

type LoopHook = Box<dyn FnMut(&PlaybackControl) + Send>;

pub struct VolumetricPlayer {
    config: PlayerConfig,
    store: ChunkStore,
    decoder: Option<FrameDecoder>,
    sequence: Option<SequenceInfo>,
    clock: Option<PlaybackClock>,
    selector: FrameSelector,
    time: Arc<dyn TimeSource>,
    audio: Option<Box<dyn AudioSink>>,
    audio_loaded: bool,
    audio_playing: bool,
    saved_gain: Option<f32>,
    /// Frame to resume from after [`pause`](Self::pause).
    frame_offset: i64,
    control: PlaybackControl,
    loop_hook: Option<LoopHook>,
    bus: Option<EventBus>,
}

impl VolumetricPlayer {
    pub fn new(fetcher: Arc<dyn RangeFetcher>, config: PlayerConfig, time: Arc<dyn TimeSource>) -> Self {
        let store = ChunkStore::new(fetcher).with_cache_budget(config.cache_budget);
        Self {
            config,
            store,
            decoder: None,
            sequence: None,
            clock: None,
            selector: FrameSelector::new(),
            time,
            audio: None,
            audio_loaded: false,
            audio_playing: false,
            saved_gain: None,
            frame_offset: 0,
            control: PlaybackControl::default(),
            loop_hook: None,
            bus: None,
        }
    }

    pub fn with_audio(mut self, sink: Box<dyn AudioSink>) -> Self {
        self.audio = Some(sink);
        self
    }

    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Called each time playback crosses the end of the sequence.
    pub fn on_loop_end(mut self, hook: impl FnMut(&PlaybackControl) + Send + 'static) -> Self {
        self.loop_hook = Some(Box::new(hook));
        self
    }

    // ────────────────────────────────────────────────────────────────────────
    // Loading
    // ────────────────────────────────────────────────────────────────────────

    /// Open the container, start the decoder and queue the first chunks.
    pub async fn open(&mut self) -> Result<(), StreamError> {
        if let Err(e) = self.open_inner().await {
            self.report(&e);
            return Err(e);
        }
        Ok(())
    }

    async fn open_inner(&mut self) -> Result<(), StreamError> {
        self.store.open().await?;
        let sequence = *self
            .store
            .sequence_info()
            .ok_or_else(|| StreamError::NotOpen("container has no sequence info".to_string()))?;

        let codec = MeshCodec::new(sequence.texture_format());
        let mut decoder = FrameDecoder::spawn(Box::new(codec), self.config.decoder_cache_size)?;
        decoder.set_keep_chunks_in_cache(self.config.keep_chunks_in_cache);
        let first = self.store.next_bunch().await?;
        decoder.push_chunks(first, sequence.frame_count);

        if let (Some(audio), Some(track)) = (self.audio.as_mut(), self.store.audio_track()) {
            audio.load(track)?;
            self.audio_loaded = true;
        }

        self.clock = Some(PlaybackClock::new(sequence.frame_rate, sequence.frame_count));
        self.sequence = Some(sequence);
        self.decoder = Some(decoder);
        self.selector.clear();
        self.frame_offset = 0;
        info!(
            resource = self.store.resource(),
            frames = sequence.frame_count,
            audio = self.audio_loaded,
            "player opened"
        );
        Ok(())
    }

    /// Pump until the decoded cache is full.
    pub async fn buffer(&mut self, timeout: Duration) -> Result<(), StreamError> {
        let period = self.decode_period();
        let fill = async {
            loop {
                self.pump().await?;
                let full = self
                    .decoder
                    .as_ref()
                    .is_some_and(|d| d.cached_len() >= d.capacity());
                if full {
                    return Ok::<(), StreamError>(());
                }
                tokio::time::sleep(period).await;
            }
        };
        let outcome = tokio::time::timeout(timeout, fill).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                let e = StreamError::BufferTimeout(timeout.as_millis() as u64);
                self.report(&e);
                Err(e)
            }
        }
    }

    /// [`open`](Self::open), [`buffer`](Self::buffer), then play when configured to.
    pub async fn load(&mut self, timeout: Duration) -> Result<(), StreamError> {
        self.open().await?;
        self.buffer(timeout).await?;
        if self.config.play_on_load {
            self.play()?;
        }
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────────────
    // Decoding
    // ────────────────────────────────────────────────────────────────────────

    /// Interval between [`pump`](Self::pump) calls: `1 / (frame_rate × 6)` seconds.
    pub fn decode_period(&self) -> Duration {
        let fps = self.sequence.map_or(30.0, |s| f64::from(s.frame_rate));
        Duration::from_secs_f64(1.0 / (fps * 6.0))
    }

    /// One decode tick. Returns the number of chunks handed to the worker.
    pub async fn pump(&mut self) -> Result<usize, StreamError> {
        let result = self.pump_inner().await;
        if let Err(e) = &result {
            self.report(e);
        }
        result
    }

    async fn pump_inner(&mut self) -> Result<usize, StreamError> {
        let frame_count = self
            .sequence
            .map(|s| s.frame_count)
            .ok_or_else(|| StreamError::NotOpen("pump before open".to_string()))?;
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| StreamError::NotOpen("decoder stopped".to_string()))?;

        decoder.poll_worker()?;
        let mut dispatched = 0;
        while dispatched < self.config.chunks_per_tick && decoder.decode_chunk()? {
            dispatched += 1;
        }
        if decoder.needs_refill(frame_count) && decoder.accepts_more(frame_count) {
            let chunks = self.store.next_bunch().await?;
            decoder.push_chunks(chunks, frame_count);
        }
        Ok(dispatched)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Rendering
    // ────────────────────────────────────────────────────────────────────────

    /// Advance the clock and return the frame to display.
    ///
    /// Returns the held frame when nothing newer is decoded, and `None`
    /// before the first frame or once the player has been destroyed.
    pub fn update(&mut self) -> Option<&DecodedFrame> {
        if !self.control.is_playing() || self.decoder.is_none() {
            return self.selector.current();
        }
        let audio_mode = self.audio_mode();
        let frame_to_display = {
            let clock = self.clock.as_mut()?;
            if audio_mode && !self.audio_playing {
                0.0
            } else {
                let now = match (&self.audio, audio_mode) {
                    (Some(audio), true) => audio.now(),
                    _ => self.time.now(),
                };
                let tick = clock.advance(now);
                if tick.looped {
                    self.selector.mark_loop();
                    self.loop_end();
                    if !self.control.is_playing() {
                        if self.control.take_destroy() {
                            self.destroy();
                        } else {
                            self.frame_offset = 0;
                            self.pause_audio();
                        }
                        return self.selector.current();
                    }
                }
                tick.frame_to_display
            }
        };

        let decoder = self.decoder.as_mut()?;
        if let Err(e) = decoder.poll_worker() {
            warn!(error = %e, "decode failed during update");
            self.report(&e);
        }
        let decoder = self.decoder.as_mut()?;
        self.selector.select(frame_to_display, || decoder.pop_frame());

        if audio_mode {
            if self.selector.current_frame() == BETWEEN_LOOPS {
                self.pause_audio();
            } else if !self.audio_playing {
                self.play_audio();
            }
        }
        self.selector.current()
    }

    fn loop_end(&mut self) {
        debug!("sequence looped");
        if let Some(bus) = &self.bus {
            bus.notify(Topic::Playback, Event::new(EVENT_SOURCE, EventPayload::LoopEnd));
        }
        if let Some(hook) = self.loop_hook.as_mut() {
            hook(&self.control);
        }
    }

    fn audio_mode(&self) -> bool {
        self.audio.is_some() && self.audio_loaded
    }

    fn play_audio(&mut self) {
        let (Some(audio), Some(clock)) = (self.audio.as_mut(), self.clock.as_mut()) else {
            return;
        };
        let offset = clock.offset_of(self.selector.current_frame());
        clock.rebase(audio.now(), offset);
        audio.start(offset);
        self.audio_playing = true;
    }

    fn pause_audio(&mut self) {
        if let Some(audio) = self.audio.as_mut() {
            if self.audio_playing {
                audio.stop();
            }
        }
        self.audio_playing = false;
    }

    // ────────────────────────────────────────────────────────────────────────
    // Transport controls
    // ────────────────────────────────────────────────────────────────────────

    /// Start or resume from the paused frame.
    ///
    /// With an audio track the sound restarts at the paused frame's offset
    /// and its clock takes over timing.
    pub fn play(&mut self) -> Result<(), StreamError> {
        let audio_mode = self.audio_mode();
        let now = self.time.now();
        let clock = self
            .clock
            .as_mut()
            .ok_or_else(|| StreamError::NotOpen("play before open".to_string()))?;
        if self.control.is_playing() {
            return Ok(());
        }
        let offset = clock.offset_of(self.frame_offset);
        match self.audio.as_mut() {
            Some(audio) if audio_mode => {
                clock.rebase(audio.now(), offset);
                audio.start(offset);
                self.audio_playing = true;
            }
            _ => clock.rebase(now, offset),
        }
        self.control.set_playing(true);
        debug!(frame = self.frame_offset, "play");
        Ok(())
    }

    /// Stop advancing and remember the frame on screen.
    pub fn pause(&mut self) {
        self.frame_offset = self.selector.current_frame().max(0);
        self.control.set_playing(false);
        self.pause_audio();
        debug!(frame = self.frame_offset, "pause");
    }

    /// Stop decoding, stop the worker and forget the container.
    pub fn destroy(&mut self) {
        self.control.set_playing(false);
        self.pause_audio();
        if let Some(mut decoder) = self.decoder.take() {
            decoder.clear();
            decoder.shutdown();
        }
        self.store.reinit();
        self.selector.clear();
        self.clock = None;
        self.sequence = None;
        self.audio_loaded = false;
        self.frame_offset = 0;
        info!(resource = self.store.resource(), "player destroyed");
    }

    pub fn mute(&mut self) {
        if let Some(audio) = self.audio.as_mut() {
            self.saved_gain = Some(audio.gain());
            audio.set_gain(0.0);
        }
    }

    /// Restore the gain saved by [`mute`](Self::mute), or 0.5 without one.
    pub fn unmute(&mut self) {
        if let Some(audio) = self.audio.as_mut() {
            let gain = self
                .saved_gain
                .take()
                .filter(|g| *g > 0.0)
                .unwrap_or(DEFAULT_UNMUTE_GAIN);
            audio.set_gain(gain);
        }
    }

    pub fn set_keep_chunks_in_cache(&mut self, keep: bool) {
        self.config.keep_chunks_in_cache = keep;
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.set_keep_chunks_in_cache(keep);
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Accessors
    // ────────────────────────────────────────────────────────────────────────

    pub fn is_open(&self) -> bool {
        self.decoder.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.control.is_playing()
    }

    pub fn control(&self) -> PlaybackControl {
        self.control.clone()
    }

    pub fn sequence_info(&self) -> Option<&SequenceInfo> {
        self.sequence.as_ref()
    }

    pub fn current_frame(&self) -> i64 {
        self.selector.current_frame()
    }

    pub fn decoder(&self) -> Option<&FrameDecoder> {
        self.decoder.as_ref()
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    fn report(&self, error: &StreamError) {
        warn!(error = %error, "playback error");
        if let Some(bus) = &self.bus {
            bus.notify(
                Topic::Playback,
                Event::new(EVENT_SOURCE, EventPayload::PlaybackError(error.to_string())),
            );
        }
    }
}

impl std::fmt::Debug for VolumetricPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumetricPlayer")
            .field("store", &self.store)
            .field("decoder", &self.decoder)
            .field("playing", &self.control.is_playing())
            .field("current_frame", &self.selector.current_frame())
            .field("audio", &self.audio_mode())
            .finish()
    }
}
