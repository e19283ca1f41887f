//! [`FrameDecoder`] – runs a [`ChunkCodec`] on a dedicated worker thread.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────── caller ─────────────────────────┐
//! │  push_chunks ──▶ pending ──▶ decode_chunk ──┐            │
//! │                                             │ Decode     │
//! │  pop_frame ◀── cache (bounded) ◀── poll ◀───┼──────┐     │
//! └─────────────────────────────────────────────┼──────┼─────┘
//!                                               ▼      │ Reply
//!                              ┌──── vantage-decode ───┴──┐
//!                              │  codec.decode(chunk)     │
//!                              └──────────────────────────┘
//! ```
//!
//! Chunks sent to the worker count against the cache capacity until their
//! reply arrives, so the cache never grows past its bound even when the
//! worker runs ahead of consumption.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::codec::{ChunkCodec, DecodedFrame};
use crate::container::RawChunk;
use crate::error::StreamError;

/// Decoded frames held ahead of playback.
pub const DEFAULT_DECODED_CACHE: usize = 20;

/// Upper bound on the pending-chunk refill threshold.
pub const MAX_REFILL_THRESHOLD: usize = 300;

const WORKER_POLL: Duration = Duration::from_millis(100);

enum WorkerRequest {
    Decode { generation: u64, chunk: RawChunk },
    Reset,
}

enum WorkerReply {
    Decoded {
        generation: u64,
        frame: Option<DecodedFrame>,
    },
    Failed {
        generation: u64,
        error: StreamError,
    },
}

pub struct FrameDecoder {
    pending: VecDeque<RawChunk>,
    cache: VecDeque<DecodedFrame>,
    capacity: usize,
    /// Chunks sent to the worker whose reply has not been received.
    in_flight: usize,
    keep_chunks: bool,
    /// Next pending chunk to replay in keep-chunks mode.
    cursor: usize,
    /// Bumped by [`clear`](Self::clear); replies from older generations are dropped.
    generation: u64,
    to_worker: Option<mpsc::Sender<WorkerRequest>>,
    from_worker: mpsc::Receiver<WorkerReply>,
    handle: Option<JoinHandle<()>>,
    should_stop: Arc<AtomicBool>,
}

impl FrameDecoder {
    /// Start the worker thread with `codec` and a decoded cache of `capacity`.
    pub fn spawn(mut codec: Box<dyn ChunkCodec>, capacity: usize) -> Result<Self, StreamError> {
        let (request_tx, request_rx) = mpsc::channel::<WorkerRequest>();
        let (reply_tx, reply_rx) = mpsc::channel::<WorkerReply>();
        let should_stop = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&should_stop);

        let handle = thread::Builder::new()
            .name("vantage-decode".to_string())
            .spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    match request_rx.recv_timeout(WORKER_POLL) {
                        Ok(WorkerRequest::Decode { generation, chunk }) => {
                            let reply = match codec.decode(chunk) {
                                Ok(frame) => WorkerReply::Decoded { generation, frame },
                                Err(error) => WorkerReply::Failed { generation, error },
                            };
                            if reply_tx.send(reply).is_err() {
                                break;
                            }
                        }
                        Ok(WorkerRequest::Reset) => codec.reset(),
                        Err(mpsc::RecvTimeoutError::Timeout) => {}
                        Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("decode worker exiting");
            })
            .map_err(|e| StreamError::Worker(format!("failed to spawn decode worker: {e}")))?;

        Ok(Self {
            pending: VecDeque::new(),
            cache: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            in_flight: 0,
            keep_chunks: false,
            cursor: 0,
            generation: 0,
            to_worker: Some(request_tx),
            from_worker: reply_rx,
            handle: Some(handle),
            should_stop,
        })
    }

    // ────────────────────────────────────────────────────────────────────────
    // Pending chunks
    // ────────────────────────────────────────────────────────────────────────

    /// Whether another raw chunk may be queued. In keep-chunks mode the
    /// replay set is capped at two chunks per frame.
    pub fn accepts_more(&self, frame_count: u32) -> bool {
        !self.keep_chunks || self.pending.len() < frame_count as usize * 2
    }

    /// Queue fetched chunks; returns how many were accepted.
    pub fn push_chunks(&mut self, chunks: Vec<RawChunk>, frame_count: u32) -> usize {
        let mut accepted = 0;
        for chunk in chunks {
            if !self.accepts_more(frame_count) {
                break;
            }
            self.pending.push_back(chunk);
            accepted += 1;
        }
        trace!(accepted, pending = self.pending.len(), "chunks queued");
        accepted
    }

    /// Whether the pending queue has drained far enough to fetch more.
    pub fn needs_refill(&self, frame_count: u32) -> bool {
        let per_sequence = frame_count as usize * 2;
        let pending = self.pending.len();
        pending < per_sequence.min(MAX_REFILL_THRESHOLD) || (self.keep_chunks && pending < per_sequence)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Decoding
    // ────────────────────────────────────────────────────────────────────────

    /// Hand one pending chunk to the worker.
    ///
    /// Returns `false` without doing anything when the cache is full or no
    /// chunk is pending.
    pub fn decode_chunk(&mut self) -> Result<bool, StreamError> {
        if self.is_full() {
            return Ok(false);
        }
        let chunk = if self.keep_chunks {
            if self.pending.is_empty() {
                return Ok(false);
            }
            self.cursor %= self.pending.len();
            let chunk = self.pending[self.cursor].clone();
            self.cursor += 1;
            chunk
        } else {
            match self.pending.pop_front() {
                Some(chunk) => chunk,
                None => return Ok(false),
            }
        };

        let sender = self
            .to_worker
            .as_ref()
            .ok_or_else(|| StreamError::Worker("decoder has been shut down".to_string()))?;
        sender
            .send(WorkerRequest::Decode {
                generation: self.generation,
                chunk,
            })
            .map_err(|_| StreamError::Worker("decode worker stopped".to_string()))?;
        self.in_flight += 1;
        Ok(true)
    }

    /// Collect every reply the worker has posted so far.
    ///
    /// Returns the number of frames added to the cache. A codec failure is
    /// returned after the remaining replies have been drained.
    pub fn poll_worker(&mut self) -> Result<usize, StreamError> {
        let mut added = 0;
        let mut failure = None;
        while let Ok(reply) = self.from_worker.try_recv() {
            match self.accept(reply) {
                Ok(n) => added += n,
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(added),
        }
    }

    /// Block until every in-flight chunk has been answered or `timeout` passes.
    ///
    /// Returns `true` when the worker went idle.
    pub fn wait_idle(&mut self, timeout: Duration) -> Result<bool, StreamError> {
        let deadline = Instant::now() + timeout;
        while self.in_flight > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            match self.from_worker.recv_timeout(remaining) {
                Ok(reply) => {
                    self.accept(reply)?;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => return Ok(false),
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(StreamError::Worker("decode worker stopped".to_string()));
                }
            }
        }
        Ok(true)
    }

    fn accept(&mut self, reply: WorkerReply) -> Result<usize, StreamError> {
        match reply {
            WorkerReply::Decoded { generation, .. } | WorkerReply::Failed { generation, .. }
                if generation != self.generation =>
            {
                trace!(generation, "dropping stale decode reply");
                Ok(0)
            }
            WorkerReply::Decoded { frame, .. } => {
                self.in_flight = self.in_flight.saturating_sub(1);
                match frame {
                    Some(frame) => {
                        self.cache.push_back(frame);
                        Ok(1)
                    }
                    None => Ok(0),
                }
            }
            WorkerReply::Failed { error, .. } => {
                self.in_flight = self.in_flight.saturating_sub(1);
                warn!(error = %error, "chunk failed to decode");
                Err(error)
            }
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Decoded cache
    // ────────────────────────────────────────────────────────────────────────

    pub fn pop_frame(&mut self) -> Option<DecodedFrame> {
        self.cache.pop_front()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Decoded plus in-flight frames have reached capacity.
    pub fn is_full(&self) -> bool {
        self.cache.len() + self.in_flight >= self.capacity
    }

    /// Replay the pending chunk set instead of consuming it.
    pub fn set_keep_chunks_in_cache(&mut self, keep: bool) {
        self.keep_chunks = keep;
        self.cursor = 0;
    }

    pub fn keeps_chunks(&self) -> bool {
        self.keep_chunks
    }

    /// Drop pending chunks, decoded frames and the codec's partial state.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.cache.clear();
        self.in_flight = 0;
        self.cursor = 0;
        self.generation += 1;
        if let Some(sender) = &self.to_worker {
            let _ = sender.send(WorkerRequest::Reset);
        }
        debug!(generation = self.generation, "decoder cleared");
    }

    /// Stop the worker thread and wait for it to exit.
    pub fn shutdown(&mut self) {
        self.should_stop.store(true, Ordering::SeqCst);
        self.to_worker = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("decode worker panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for FrameDecoder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for FrameDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDecoder")
            .field("pending", &self.pending.len())
            .field("cached", &self.cache.len())
            .field("in_flight", &self.in_flight)
            .field("capacity", &self.capacity)
            .field("keep_chunks", &self.keep_chunks)
            .finish()
    }
}
