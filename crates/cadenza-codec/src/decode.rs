//! WAV decoding into segmented per-channel sample buffers.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use cadenza_pipeline::{AudioFormat, ChannelLayout};
use hound::{SampleFormat, WavReader};

use crate::{Error, Result};

/// Frames per decoded segment.
///
/// Decoded audio is chunked so cursors exercise real segment boundaries;
/// the value matches a typical decode-buffer granularity.
pub const SEGMENT_FRAMES: usize = 16384;

/// One channel of decoded audio, stored as consecutive segments.
pub struct ChannelData {
    segments: Vec<Vec<f32>>,
    total_frames: u64,
}

impl ChannelData {
    fn from_samples(samples: Vec<f32>) -> Self {
        let total_frames = samples.len() as u64;
        let mut segments: Vec<Vec<f32>> = Vec::new();
        for chunk in samples.chunks(SEGMENT_FRAMES) {
            segments.push(chunk.to_vec());
        }
        if segments.is_empty() {
            segments.push(Vec::new());
        }
        Self {
            segments,
            total_frames,
        }
    }

    /// Total frames in this channel.
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Number of segments.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    fn segment(&self, index: usize) -> &[f32] {
        self.segments.get(index).map_or(&[], Vec::as_slice)
    }
}

/// A fully decoded audio file: per-channel segmented samples plus format
/// and tag metadata.
pub struct AudioData {
    channels: Vec<ChannelData>,
    /// Source sample rate in Hz.
    pub sample_rate: u32,
    /// Source channel layout (after any downmix to at most two channels).
    pub layout: ChannelLayout,
    /// Container tag map. Empty for plain WAV.
    pub tags: BTreeMap<String, String>,
}

impl AudioData {
    /// Number of decoded channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn total_frames(&self) -> u64 {
        self.channels.first().map_or(0, ChannelData::total_frames)
    }

    /// The port format this data plays at.
    pub fn format(&self) -> AudioFormat {
        AudioFormat::new(self.sample_rate, self.layout)
    }

    /// Borrows one channel's segment list.
    pub fn channel(&self, index: usize) -> &ChannelData {
        &self.channels[index]
    }

    /// Creates a cursor over `channel`, positioned at `start_frame`.
    ///
    /// Returns the cursor and the offset within its current segment.
    pub fn cursor_at(self: &Arc<Self>, channel: usize, start_frame: u64) -> (SegmentCursor, usize) {
        let data = &self.channels[channel];
        let mut remaining = start_frame.min(data.total_frames) as usize;
        let mut segment = 0;
        while segment + 1 < data.segment_count() && remaining >= data.segment(segment).len() {
            remaining -= data.segment(segment).len();
            segment += 1;
        }
        (
            SegmentCursor {
                data: Arc::clone(self),
                channel,
                segment,
            },
            remaining,
        )
    }
}

/// Cursor over one channel's decoded segments.
///
/// Holds the owning [`AudioData`] alive; positions within the current
/// segment are tracked by the caller (the source node's per-channel
/// context), matching the "flat index plus next-segment" access pattern.
pub struct SegmentCursor {
    data: Arc<AudioData>,
    channel: usize,
    segment: usize,
}

impl SegmentCursor {
    /// Length of the current segment in frames.
    pub fn segment_len(&self) -> usize {
        self.data.channels[self.channel].segment(self.segment).len()
    }

    /// Sample at `offset` within the current segment.
    #[inline]
    pub fn sample(&self, offset: usize) -> f32 {
        self.data.channels[self.channel].segment(self.segment)[offset]
    }

    /// Advances to the next segment. Returns `false` at the end of the
    /// channel, leaving the cursor on the final segment.
    pub fn next_segment(&mut self) -> bool {
        if self.segment + 1 < self.data.channels[self.channel].segment_count() {
            self.segment += 1;
            true
        } else {
            false
        }
    }
}

/// Decodes a WAV file into per-channel segmented sample buffers.
///
/// Integer PCM is normalized to `[-1, 1]` floats. Files with more than two
/// channels keep their first two (the remainder carries no layout here);
/// mono and stereo map directly.
pub fn decode<P: AsRef<Path>>(path: P) -> Result<AudioData> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let source_channels = spec.channels as usize;
    if source_channels == 0 {
        return Err(Error::UnsupportedChannelCount(0));
    }

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let max_val = (1i32 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    let frames = samples.len() / source_channels;
    if frames == 0 {
        return Err(Error::Empty);
    }

    let kept = source_channels.min(2);
    let layout = ChannelLayout::from_channels(kept as u16)
        .ok_or(Error::UnsupportedChannelCount(spec.channels))?;

    let mut per_channel: Vec<Vec<f32>> = vec![Vec::with_capacity(frames); kept];
    for frame in samples.chunks_exact(source_channels) {
        for (ch, out) in per_channel.iter_mut().enumerate() {
            out.push(frame[ch]);
        }
    }

    Ok(AudioData {
        channels: per_channel.into_iter().map(ChannelData::from_samples).collect(),
        sample_rate: spec.sample_rate,
        layout,
        tags: BTreeMap::new(),
    })
}
