use thiserror::Error;
use vantage_types::VantageError;

/// Errors raised while fetching, parsing or decoding a volumetric stream.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Range requests must be answered with `206 Partial Content`.
    #[error("bytes {first}-{last} answered with status {status}")]
    UnexpectedStatus { status: u16, first: u64, last: u64 },

    #[error("Invalid container: {0}")]
    InvalidContainer(String),

    #[error("Codec error: {0}")]
    Codec(String),

    /// The decode worker exited or could not be started.
    #[error("Decode worker unavailable: {0}")]
    Worker(String),

    #[error("Audio track rejected: {0}")]
    Audio(String),

    /// Playback or fetching was requested before the container was opened.
    #[error("Stream not open: {0}")]
    NotOpen(String),

    #[error("Buffering did not fill the frame cache within {0} ms")]
    BufferTimeout(u64),
}

impl StreamError {
    pub(crate) fn container(msg: impl Into<String>) -> Self {
        StreamError::InvalidContainer(msg.into())
    }
}

impl From<StreamError> for VantageError {
    fn from(e: StreamError) -> Self {
        match e {
            StreamError::InvalidContainer(msg) => VantageError::InvalidContainer(msg),
            StreamError::Http(_) | StreamError::UnexpectedStatus { .. } => {
                VantageError::Http(e.to_string())
            }
            StreamError::Codec(msg) | StreamError::Audio(msg) => VantageError::Decode(msg),
            StreamError::NotOpen(msg) => VantageError::NotReady(msg),
            StreamError::BufferTimeout(ms) => VantageError::RequestTimeout(ms),
            StreamError::Worker(msg) => VantageError::Channel(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_errors_keep_their_kind() {
        let e: VantageError = StreamError::container("short header").into();
        assert_eq!(e, VantageError::InvalidContainer("short header".to_string()));
    }

    #[test]
    fn status_errors_map_to_http() {
        let e: VantageError = StreamError::UnexpectedStatus {
            status: 200,
            first: 0,
            last: 29,
        }
        .into();
        assert_eq!(
            e,
            VantageError::Http("bytes 0-29 answered with status 200".to_string())
        );
    }
}
