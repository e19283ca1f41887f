//! `vantage-stream` – volumetric video streaming and playback.
//!
//! A sequence is a single container file fetched with HTTP range requests.
//! Parsing, decoding and timing are kept apart so that each can be driven
//! and tested on its own.
//!
//! # Modules
//!
//! - [`container`] – chunk and index layouts of the container format.
//! - [`fetch`] – the [`RangeFetcher`] seam, its HTTP and in-memory
//!   implementations and the range cache.
//! - [`chunk_store`] – [`ChunkStore`]: opens a container and streams frame
//!   data in budget-sized bulk ranges, looping at the end.
//! - [`codec`] – [`MeshCodec`]: keyframe plus delta mesh decoding.
//! - [`decoder`] – [`FrameDecoder`]: the codec on a worker thread with a
//!   bounded output cache.
//! - [`clock`] – [`PlaybackClock`] and [`FrameSelector`].
//! - [`player`] – [`VolumetricPlayer`]: play, pause, mute and loop handling.

pub mod chunk_store;
pub mod clock;
pub mod codec;
pub mod container;
pub mod decoder;
pub mod error;
pub mod fetch;
pub mod player;

#[cfg(test)]
mod testing;

pub use chunk_store::{ChunkStore, DEFAULT_CACHE_BUDGET};
pub use clock::{ClockTick, FrameSelector, ManualClock, PlaybackClock, TimeSource, WallClock};
pub use codec::{ChunkCodec, DecodedFrame, MeshCodec};
pub use container::{ChunkType, RawChunk, SequenceInfo, TextureEncoding};
pub use decoder::{DEFAULT_DECODED_CACHE, FrameDecoder};
pub use error::StreamError;
pub use fetch::{CachingFetcher, HttpRangeFetcher, MemoryFetcher, RangeCache, RangeFetcher};
pub use player::{AudioSink, PlaybackControl, PlayerConfig, VolumetricPlayer};
