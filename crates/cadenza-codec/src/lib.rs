//! Container decode/encode service for Cadenza.
//!
//! A pure, stateless conversion layer: [`decode`] reads an audio container
//! into channel-separated, segmented sample buffers; [`open_encoder`]
//! produces a streaming [`EncodeWriter`] that accepts interleaved frames.
//! WAV is the carried container format (float and integer PCM in, PCM or
//! float out).
//!
//! Decoded channels are stored as a list of fixed-size segments rather than
//! one flat allocation. Source nodes walk them with a [`SegmentCursor`] —
//! a cheap cursor that exposes the current segment and a "next segment"
//! operation — so playback never assumes contiguous sample memory.

mod decode;
mod encode;

pub use decode::{AudioData, ChannelData, SEGMENT_FRAMES, SegmentCursor, decode};
pub use encode::{EncodeSpec, EncodeWriter, SampleDepth, open_encoder};

/// Error types for decode/encode operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// WAV container read/write error.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The container holds a channel count this system cannot map onto a
    /// layout even after downmixing.
    #[error("unsupported channel count: {0}")]
    UnsupportedChannelCount(u16),

    /// The container holds no audio frames.
    #[error("file contains no audio frames")]
    Empty,
}

/// Convenience result type for codec operations.
pub type Result<T> = std::result::Result<T, Error>;
