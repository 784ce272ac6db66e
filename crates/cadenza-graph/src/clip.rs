//! Timeline clip nodes: a per-clip playback node fed by a per-clip
//! event-feed node.
//!
//! The event feed publishes the clip's whole-note-stamped schedule over an
//! event port; the clip node applies those events against its own
//! frame-derived clock and streams decoded samples while a segment is
//! active. One voice per clip; events take effect at block granularity.

use std::sync::Arc;

use cadenza_codec::AudioData;
use cadenza_pipeline::{NodePorts, RunNode, SchedEvent, Tempo};

use crate::source::{PlayChannelContext, advance_channels};

/// Publishes a fixed whole-note schedule on its event output.
///
/// The whole schedule is (re)published after every seek; consumers filter
/// by timestamp. Publishing retries across cycles when the event queue is
/// momentarily full.
pub(crate) struct EventFeed {
    events: Vec<SchedEvent>,
    next: usize,
}

impl EventFeed {
    pub fn new(mut events: Vec<SchedEvent>) -> Self {
        events.sort_by(|a, b| a.when.total_cmp(&b.when));
        Self { events, next: 0 }
    }

    /// The start/end pair for a clip spanning `[start, end)` whole notes.
    pub fn clip_schedule(start: f64, end: f64) -> Vec<SchedEvent> {
        vec![
            SchedEvent {
                when: start,
                on: true,
            },
            SchedEvent {
                when: end,
                on: false,
            },
        ]
    }
}

impl RunNode for EventFeed {
    fn run(&mut self, ports: &mut NodePorts<'_>) {
        while self.next < self.events.len() && ports.emit_event(0, self.events[self.next]) {
            self.next += 1;
        }
    }

    fn seek(&mut self, _pos_whole_notes: f64) {
        self.next = 0;
    }
}

/// Plays a decoded clip during its scheduled segment, silence elsewhere.
pub(crate) struct ClipPlayback {
    data: Arc<AudioData>,
    contexts: Vec<PlayChannelContext>,
    /// Frames emitted since the active segment began.
    emitted: u64,
    total_frames: u64,
    active: bool,
    /// This node's transport clock in whole notes, advanced per emitted
    /// frame at the clip's own sample rate.
    clock: f64,
    whole_notes_per_frame: f64,
    pending: Vec<SchedEvent>,
    incoming: Vec<SchedEvent>,
    scratch: Vec<f32>,
}

impl ClipPlayback {
    pub fn new(data: Arc<AudioData>, tempo: Tempo, start_pos: f64, ring_frames: usize) -> Self {
        let channels = data.channel_count();
        let whole_notes_per_frame = tempo.whole_notes_per_frame(data.sample_rate);
        let contexts = (0..channels)
            .map(|ch| PlayChannelContext::at(&data, ch, 0))
            .collect();
        Self {
            total_frames: data.total_frames(),
            data,
            contexts,
            emitted: 0,
            active: false,
            clock: start_pos,
            whole_notes_per_frame,
            pending: Vec::new(),
            incoming: Vec::new(),
            scratch: vec![0.0; ring_frames * channels],
        }
    }

    fn apply(&mut self, event: SchedEvent) {
        if event.on {
            // A start applied late (seek into the middle of the clip)
            // resumes mid-clip rather than from the beginning.
            let late = (self.clock - event.when).max(0.0);
            let offset = (late / self.whole_notes_per_frame) as u64;
            self.active = offset < self.total_frames;
            self.emitted = offset.min(self.total_frames);
            for (ch, context) in self.contexts.iter_mut().enumerate() {
                *context = PlayChannelContext::at(&self.data, ch, self.emitted);
            }
        } else {
            self.active = false;
        }
    }
}

impl RunNode for ClipPlayback {
    fn run(&mut self, ports: &mut NodePorts<'_>) {
        ports.drain_events(0, &mut self.incoming);
        if !self.incoming.is_empty() {
            self.pending.append(&mut self.incoming);
            self.pending.sort_by(|a, b| a.when.total_cmp(&b.when));
        }

        let channels = self.contexts.len();
        let free = ports.out_free(0);
        let mut produced = 0;
        while produced < free {
            while let Some(&event) = self.pending.first() {
                if event.when <= self.clock + 1e-9 {
                    self.apply(event);
                    self.pending.remove(0);
                } else {
                    break;
                }
            }

            let limit = free - produced;
            let chunk = match self.pending.first() {
                Some(event) => {
                    let to_event = (event.when - self.clock) / self.whole_notes_per_frame;
                    limit.min((to_event.ceil() as usize).max(1))
                }
                None => limit,
            };

            let real = if self.active {
                let remaining = self.total_frames.saturating_sub(self.emitted) as usize;
                chunk.min(remaining)
            } else {
                0
            };
            if real > 0 {
                advance_channels(&mut self.contexts, &mut self.scratch, real);
                ports.write(0, &self.scratch[..real * channels]);
                self.emitted += real as u64;
            }
            if real < chunk {
                ports.write_silence(0, chunk - real);
            }

            self.clock += chunk as f64 * self.whole_notes_per_frame;
            produced += chunk;
        }
    }

    fn seek(&mut self, pos_whole_notes: f64) {
        self.clock = pos_whole_notes;
        self.active = false;
        self.emitted = 0;
        self.pending.clear();
        self.incoming.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_schedule_brackets_the_segment() {
        let events = EventFeed::clip_schedule(1.0, 2.5);
        assert_eq!(events.len(), 2);
        assert!(events[0].on && events[0].when == 1.0);
        assert!(!events[1].on && events[1].when == 2.5);
    }
}
