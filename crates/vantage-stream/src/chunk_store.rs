//! [`ChunkStore`] – walks a container through ranged fetches.
//!
//! Opening follows the container's dependency chain: file header, sequence
//! info, bloc index, then the optional track index and its audio chunk.
//! Afterwards [`ChunkStore::next_bunch`] streams frame data in bulk ranges
//! sized to the cache budget, wrapping to the first bloc at the end of the
//! sequence.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::container::{
    BlocInfo, CHUNK_HEADER_LEN, ChunkHeader, ChunkType, FILE_HEADER_LEN, FileHeader, RawChunk,
    SequenceInfo, keyframe_positions, parse_bloc_index, parse_track_index, split_chunks,
};
use crate::error::StreamError;
use crate::fetch::RangeFetcher;

/// Bytes requested per bulk fetch.
pub const DEFAULT_CACHE_BUDGET: u64 = 6_000_000;

/// Container metadata, available once [`ChunkStore::open`] succeeds.
#[derive(Debug, Clone)]
struct Index {
    header: FileHeader,
    sequence: SequenceInfo,
    blocs: Vec<BlocInfo>,
    keyframe_positions: Vec<u64>,
}

pub struct ChunkStore {
    fetcher: Arc<dyn RangeFetcher>,
    cache_budget: u64,
    index: Option<Index>,
    current_bloc: usize,
    first_bloc: usize,
    last_bloc: usize,
    track_positions: Vec<u64>,
    audio_track: Option<Vec<u8>>,
}

impl ChunkStore {
    pub fn new(fetcher: Arc<dyn RangeFetcher>) -> Self {
        Self {
            fetcher,
            cache_budget: DEFAULT_CACHE_BUDGET,
            index: None,
            current_bloc: 0,
            first_bloc: 0,
            last_bloc: 0,
            track_positions: Vec::new(),
            audio_track: None,
        }
    }

    pub fn with_cache_budget(mut self, bytes: u64) -> Self {
        self.cache_budget = bytes;
        self
    }

    pub fn resource(&self) -> &str {
        self.fetcher.resource()
    }

    pub fn is_open(&self) -> bool {
        self.index.is_some()
    }

    pub fn sequence_info(&self) -> Option<&SequenceInfo> {
        self.index.as_ref().map(|i| &i.sequence)
    }

    pub fn blocs(&self) -> &[BlocInfo] {
        self.index.as_ref().map_or(&[][..], |i| i.blocs.as_slice())
    }

    pub fn current_bloc(&self) -> usize {
        self.current_bloc
    }

    /// The embedded audio track, when the container carries one.
    pub fn audio_track(&self) -> Option<&[u8]> {
        self.audio_track.as_deref()
    }

    // ────────────────────────────────────────────────────────────────────────
    // Opening
    // ────────────────────────────────────────────────────────────────────────

    /// Parse the header and every index chunk.
    ///
    /// # Errors
    ///
    /// [`StreamError::InvalidContainer`] when a pointer leads to a chunk of
    /// the wrong type or a block is truncated; fetch errors as raised.
    pub async fn open(&mut self) -> Result<(), StreamError> {
        self.reinit();

        let head = self.fetcher.fetch(0, FILE_HEADER_LEN as u64 - 1).await?;
        let header = FileHeader::parse(&head)?;
        debug!(version = header.version, "container header parsed");

        let sequence_chunk = self.read_chunk(header.sequence_info).await?;
        expect_kind(&sequence_chunk, ChunkType::SequenceInfo)?;
        let sequence = SequenceInfo::parse(&sequence_chunk.data)?;

        let bloc_chunk = self.read_chunk(header.bloc_index).await?;
        expect_kind(&bloc_chunk, ChunkType::BlocIndex)?;
        let blocs = parse_bloc_index(&bloc_chunk.data, sequence.bloc_count)?;
        let keyframe_positions = keyframe_positions(&blocs);

        if sequence.additional_tracks > 0 {
            let track_chunk = self.read_chunk(header.track_index).await?;
            expect_kind(&track_chunk, ChunkType::TrackIndex)?;
            self.track_positions = parse_track_index(&track_chunk.data, sequence.additional_tracks)?;
            for position in self.track_positions.clone() {
                let track = self.read_chunk(position).await?;
                match track.kind() {
                    ChunkType::Audio => self.audio_track = Some(track.data),
                    other => debug!(?other, position, "skipping additional track"),
                }
            }
        }

        self.first_bloc = 0;
        self.last_bloc = blocs.len() - 1;
        info!(
            resource = self.fetcher.resource(),
            frames = sequence.frame_count,
            blocs = sequence.bloc_count,
            frame_rate = sequence.frame_rate,
            audio = self.audio_track.is_some(),
            "container opened"
        );
        self.index = Some(Index {
            header,
            sequence,
            blocs,
            keyframe_positions,
        });
        Ok(())
    }

    async fn read_chunk(&self, position: u64) -> Result<RawChunk, StreamError> {
        let head = self
            .fetcher
            .fetch(position, position + CHUNK_HEADER_LEN as u64 - 1)
            .await?;
        let header = ChunkHeader::parse(&head)?;
        let data = if header.size == 0 {
            Vec::new()
        } else {
            let start = position + CHUNK_HEADER_LEN as u64;
            let data = self
                .fetcher
                .fetch(start, start + u64::from(header.size) - 1)
                .await?;
            if data.len() < header.size as usize {
                return Err(StreamError::container(format!(
                    "chunk at {position} declares {} bytes, got {}",
                    header.size,
                    data.len()
                )));
            }
            data
        };
        Ok(RawChunk { header, data })
    }

    // ────────────────────────────────────────────────────────────────────────
    // Streaming
    // ────────────────────────────────────────────────────────────────────────

    /// Fetch the next bulk range and return the frame-data chunks in it.
    ///
    /// The range starts at the current bloc and extends bloc by bloc until
    /// it spans at least the cache budget or reaches the last bloc; in the
    /// latter case the pointer wraps to the first bloc.
    ///
    /// # Errors
    ///
    /// [`StreamError::InvalidContainer`] when called before [`open`](Self::open).
    pub async fn next_bunch(&mut self) -> Result<Vec<RawChunk>, StreamError> {
        let (pos0, pos1) = self.advance_range()?;
        if pos1 <= pos0 {
            return Ok(Vec::new());
        }
        debug!(first = pos0, last = pos1 - 1, "bulk fetch");
        let bytes = self.fetcher.fetch(pos0, pos1 - 1).await?;
        let span = (pos1 - pos0) as usize;
        if bytes.len() < span {
            return Err(StreamError::container(format!(
                "bulk range {pos0}-{pos1} returned {} bytes",
                bytes.len()
            )));
        }
        let chunks: Vec<RawChunk> = split_chunks(&bytes[..span])?
            .into_iter()
            .filter(|c| c.kind().is_frame_data())
            .collect();
        debug!(chunks = chunks.len(), "frame chunks fetched");
        Ok(chunks)
    }

    /// Move the bloc pointer past the next bulk range and return its bounds.
    fn advance_range(&mut self) -> Result<(u64, u64), StreamError> {
        let index = self
            .index
            .as_ref()
            .ok_or_else(|| StreamError::container("frame data requested before sequence info"))?;
        let positions = &index.keyframe_positions;

        let pos0 = positions[self.current_bloc];
        let mut pos1 = pos0;
        while pos1.saturating_sub(pos0) < self.cache_budget {
            self.current_bloc += 1;
            if self.current_bloc > self.last_bloc {
                break;
            }
            pos1 = positions[self.current_bloc];
        }

        if self.current_bloc > self.last_bloc {
            pos1 = if self.last_bloc == index.blocs.len() - 1 {
                index.header.bloc_index
            } else {
                positions[self.current_bloc]
            };
            self.current_bloc = self.first_bloc;
        }
        Ok((pos0, pos1))
    }

    /// Point the next bulk fetch at the bloc holding `frame`.
    pub fn seek(&mut self, frame: u32) -> Result<(), StreamError> {
        let index = self
            .index
            .as_ref()
            .ok_or_else(|| StreamError::container("seek before sequence info"))?;
        let mut start_frame = 0i64;
        let mut bloc = 0usize;
        while start_frame < i64::from(frame) && bloc < index.blocs.len() {
            start_frame += i64::from(index.blocs[bloc].inter_frames) + 1;
            bloc += 1;
        }
        self.current_bloc = bloc.saturating_sub(1);
        debug!(frame, bloc = self.current_bloc, "seek");
        Ok(())
    }

    /// Forget everything learned from the container.
    pub fn reinit(&mut self) {
        self.index = None;
        self.current_bloc = 0;
        self.first_bloc = 0;
        self.last_bloc = 0;
        self.track_positions.clear();
        self.audio_track = None;
    }
}

fn expect_kind(chunk: &RawChunk, kind: ChunkType) -> Result<(), StreamError> {
    if chunk.kind() != kind {
        warn!(expected = ?kind, found = ?chunk.kind(), "unexpected chunk type");
        return Err(StreamError::container(format!(
            "expected {kind:?} chunk, found {:?}",
            chunk.kind()
        )));
    }
    Ok(())
}

impl std::fmt::Debug for ChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStore")
            .field("resource", &self.fetcher.resource())
            .field("open", &self.is_open())
            .field("current_bloc", &self.current_bloc)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MemoryFetcher;
    use crate::testing::ContainerBuilder;

    fn three_blocs() -> Vec<u8> {
        ContainerBuilder::new(30.0)
            .bloc(&[(10, vec![1; 40]), (12, vec![2; 8]), (11, vec![3; 12]), (12, vec![4; 8])])
            .bloc(&[(10, vec![5; 40]), (12, vec![6; 8])])
            .bloc(&[(10, vec![7; 40]), (14, vec![8; 12]), (12, vec![9; 8])])
            .build()
            .bytes
    }

    fn store(bytes: Vec<u8>) -> (ChunkStore, Arc<MemoryFetcher>) {
        let fetcher = Arc::new(MemoryFetcher::new("clip.4ds", bytes));
        (ChunkStore::new(fetcher.clone()), fetcher)
    }

    #[tokio::test]
    async fn frame_data_before_open_is_invalid() {
        let (mut store, fetcher) = store(three_blocs());
        assert!(matches!(
            store.next_bunch().await,
            Err(StreamError::InvalidContainer(_))
        ));
        assert!(store.seek(3).is_err());
        assert_eq!(fetcher.request_count(), 0);
    }

    #[tokio::test]
    async fn open_reads_sequence_and_bloc_index() {
        let (mut store, _) = store(three_blocs());
        store.open().await.unwrap();
        let info = store.sequence_info().unwrap();
        assert_eq!(info.frame_count, 4);
        assert_eq!(info.bloc_count, 3);
        assert_eq!(store.blocs().len(), 3);
        assert_eq!(store.blocs()[1].keyframe_id, 2);
        assert!(store.audio_track().is_none());
    }

    #[tokio::test]
    async fn audio_track_is_fetched_whole() {
        let bytes = ContainerBuilder::new(25.0)
            .bloc(&[(10, vec![1; 4]), (12, vec![2; 4])])
            .audio(b"RIFF....WAVE".to_vec())
            .build()
            .bytes;
        let (mut store, _) = store(bytes);
        store.open().await.unwrap();
        assert_eq!(store.audio_track(), Some(&b"RIFF....WAVE"[..]));
    }

    #[tokio::test]
    async fn large_budget_fetches_everything_and_wraps() {
        let (mut store, _) = store(three_blocs());
        store.open().await.unwrap();

        let chunks = store.next_bunch().await.unwrap();
        let kinds: Vec<u8> = chunks.iter().map(|c| c.kind().as_u8()).collect();
        assert_eq!(kinds, vec![10, 12, 11, 12, 10, 12, 10, 14, 12]);
        assert_eq!(store.current_bloc(), 0);

        // The source loops.
        assert_eq!(store.next_bunch().await.unwrap(), chunks);
    }

    #[tokio::test]
    async fn small_budget_fetches_bloc_by_bloc() {
        let (store, _) = store(three_blocs());
        let mut store = store.with_cache_budget(1);
        store.open().await.unwrap();

        // First range ends just past bloc 0's bloc chunk.
        assert!(store.next_bunch().await.unwrap().is_empty());
        assert_eq!(store.current_bloc(), 1);
        assert_eq!(store.next_bunch().await.unwrap().len(), 4);
        assert_eq!(store.current_bloc(), 2);
        // Reaching the last bloc runs the range to the bloc index and wraps.
        assert_eq!(store.next_bunch().await.unwrap().len(), 5);
        assert_eq!(store.current_bloc(), 0);
    }

    #[tokio::test]
    async fn seek_points_at_the_containing_bloc() {
        let (mut store, _) = store(three_blocs());
        store.open().await.unwrap();
        store.seek(0).unwrap();
        assert_eq!(store.current_bloc(), 0);
        store.seek(3).unwrap();
        assert_eq!(store.current_bloc(), 1);
        store.seek(100).unwrap();
        assert_eq!(store.current_bloc(), 2);
    }

    #[tokio::test]
    async fn wrong_chunk_at_pointer_is_invalid() {
        let mut bytes = three_blocs();
        // Sequence-info chunk type byte.
        bytes[30] = 3;
        let (mut store, _) = store(bytes);
        assert!(matches!(
            store.open().await,
            Err(StreamError::InvalidContainer(_))
        ));
        assert!(!store.is_open());
    }

    #[tokio::test]
    async fn reinit_forgets_the_container() {
        let (mut store, _) = store(three_blocs());
        store.open().await.unwrap();
        store.reinit();
        assert!(!store.is_open());
        assert!(store.next_bunch().await.is_err());
    }
}
