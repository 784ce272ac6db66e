//! Source-playback node: streams decoded samples into an audio port.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use cadenza_codec::{AudioData, SegmentCursor};
use cadenza_pipeline::{NodePorts, RunNode};

/// Per-channel playback cursor: the current decode segment plus a flat
/// offset within it. Owned by the source node and reset whenever the
/// source itself changes.
pub(crate) struct PlayChannelContext {
    pub cursor: SegmentCursor,
    pub offset: usize,
}

impl PlayChannelContext {
    pub fn at(data: &Arc<AudioData>, channel: usize, start_frame: u64) -> Self {
        let (cursor, offset) = data.cursor_at(channel, start_frame);
        Self { cursor, offset }
    }
}

/// Playback progress shared between a source node and the control side.
///
/// Lets a topology rebuild recreate the node without losing the cursor,
/// and lets the control layer observe exhaustion — both without locks.
pub struct SourceProgress {
    frames_emitted: AtomicU64,
    exhausted: AtomicBool,
}

impl SourceProgress {
    pub(crate) fn new() -> Self {
        Self {
            frames_emitted: AtomicU64::new(0),
            exhausted: AtomicBool::new(false),
        }
    }

    /// Frames of real audio emitted so far.
    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted.load(Ordering::Relaxed)
    }

    /// Whether the source ran out of data and switched to silence.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Relaxed)
    }
}

/// Fills `scratch` with `frames` interleaved frames advanced from the
/// per-channel contexts. Callers guarantee the frames exist.
pub(crate) fn advance_channels(
    contexts: &mut [PlayChannelContext],
    scratch: &mut [f32],
    frames: usize,
) {
    let channels = contexts.len();
    for (ch, context) in contexts.iter_mut().enumerate() {
        for frame in 0..frames {
            if context.offset >= context.cursor.segment_len() {
                context.cursor.next_segment();
                context.offset = 0;
            }
            scratch[frame * channels + ch] = context.cursor.sample(context.offset);
            context.offset += 1;
        }
    }
}

/// Streams a decoded file into its output port.
///
/// Each invocation fills as much of the port's free space as the source
/// still has, then pads the rest with silence once exhausted — it never
/// under-fills and never blocks. Only the source's own progress counter
/// moves here; the transport position is the monitor node's job.
pub(crate) struct SourcePlayback {
    contexts: Vec<PlayChannelContext>,
    progress: Arc<SourceProgress>,
    total_frames: u64,
    scratch: Vec<f32>,
}

impl SourcePlayback {
    /// Creates a playback behavior resuming at the progress counter's
    /// current position.
    pub fn new(data: &Arc<AudioData>, progress: Arc<SourceProgress>, ring_frames: usize) -> Self {
        let start = progress.frames_emitted();
        let channels = data.channel_count();
        let contexts = (0..channels)
            .map(|ch| PlayChannelContext::at(data, ch, start))
            .collect();
        Self {
            contexts,
            progress,
            total_frames: data.total_frames(),
            scratch: vec![0.0; ring_frames * channels],
        }
    }
}

impl RunNode for SourcePlayback {
    fn run(&mut self, ports: &mut NodePorts<'_>) {
        let free = ports.out_free(0);
        if free == 0 {
            return;
        }
        let channels = self.contexts.len();
        let emitted = self.progress.frames_emitted.load(Ordering::Relaxed);
        let remaining = self.total_frames.saturating_sub(emitted) as usize;
        let real = free.min(remaining);

        if real > 0 {
            advance_channels(&mut self.contexts, &mut self.scratch, real);
            ports.write(0, &self.scratch[..real * channels]);
            self.progress
                .frames_emitted
                .store(emitted + real as u64, Ordering::Relaxed);
        }
        if real < free {
            ports.write_silence(0, free - real);
            if !self.progress.exhausted.swap(true, Ordering::Relaxed) {
                tracing::debug!(frames = self.total_frames, "source exhausted, padding silence");
            }
        }
    }
}
