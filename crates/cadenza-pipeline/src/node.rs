//! Nodes, ports, and the behavior dispatch interface.
//!
//! A node is a named set of ports plus a behavior implementing [`RunNode`].
//! Behaviors never see other nodes or the pipeline itself: each invocation
//! receives a [`NodePorts`] view of its own ports only, with
//! "how much is available / free" introspection and bounded read/write
//! operations. That keeps every behavior non-blocking and allocation-free
//! by construction.

use crate::format::AudioFormat;
use crate::ring::{AudioRing, EventRing, SchedEvent};

/// Unique identifier for a node in the pipeline.
///
/// IDs are assigned sequentially and never reused within a pipeline
/// instance; they remain stable across topology rebuilds that keep the
/// node alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Declarative port description used when creating a node.
#[derive(Clone, Copy, Debug)]
pub enum PortSpec {
    /// Audio input accepting the given format.
    AudioIn(AudioFormat),
    /// Audio output producing the given format.
    AudioOut(AudioFormat),
    /// Input for whole-note-stamped scheduling events.
    EventIn,
    /// Output for whole-note-stamped scheduling events.
    EventOut,
}

/// The single dispatch interface for node behaviors.
///
/// The scheduler calls [`run`](Self::run) once per cycle in dependency
/// order. Implementations must not block, allocate, or take locks on the
/// real-time path; a behavior that cannot make progress writes silence (or
/// nothing) rather than failing.
pub trait RunNode: Send {
    /// Processes one scheduling cycle against this node's ports.
    fn run(&mut self, ports: &mut NodePorts<'_>);

    /// Repositions time-dependent state to a transport position in whole
    /// notes. Called while the pipeline is stopped, before every start.
    fn seek(&mut self, _pos_whole_notes: f64) {}
}

/// Per-behavior view of one node's ports during a scheduling cycle.
///
/// Audio reads/writes are in frames; the slice lengths are
/// `frames * channels` of the port's format. Unconnected ports report zero
/// availability, so behaviors need no connected/unconnected special cases.
pub struct NodePorts<'a> {
    pub(crate) node: &'a NodeSlot,
    pub(crate) audio: &'a mut [Option<AudioConn>],
    pub(crate) events: &'a mut [Option<EventConn>],
    pub(crate) frames_moved: &'a mut u64,
}

impl NodePorts<'_> {
    /// Number of audio input ports.
    pub fn audio_in_count(&self) -> usize {
        self.node.audio_in.len()
    }

    /// Number of audio output ports.
    pub fn audio_out_count(&self) -> usize {
        self.node.audio_out.len()
    }

    /// Format of an audio input port.
    pub fn in_format(&self, port: usize) -> AudioFormat {
        self.node.audio_in[port].format
    }

    /// Format of an audio output port.
    pub fn out_format(&self, port: usize) -> AudioFormat {
        self.node.audio_out[port].format
    }

    /// Frames readable on an audio input port (zero when unconnected).
    pub fn in_fill(&self, port: usize) -> usize {
        self.in_ring(port).map_or(0, AudioRing::fill_count)
    }

    /// Frames writable on an audio output port (zero when unconnected).
    pub fn out_free(&self, port: usize) -> usize {
        self.out_ring(port).map_or(0, AudioRing::free_count)
    }

    /// Reads up to `dst` frames from an input port; returns frames read.
    pub fn read(&mut self, port: usize, dst: &mut [f32]) -> usize {
        match self.node.audio_in[port].conn {
            Some(idx) => match &mut self.audio[idx] {
                Some(conn) => conn.ring.pop_into(dst),
                None => 0,
            },
            None => 0,
        }
    }

    /// Writes interleaved frames to an output port; returns frames written.
    pub fn write(&mut self, port: usize, src: &[f32]) -> usize {
        let frames = match self.node.audio_out[port].conn {
            Some(idx) => match &mut self.audio[idx] {
                Some(conn) => conn.ring.push(src),
                None => 0,
            },
            None => 0,
        };
        *self.frames_moved += frames as u64;
        frames
    }

    /// Writes silence to an output port; returns frames written.
    pub fn write_silence(&mut self, port: usize, frames: usize) -> usize {
        let frames = match self.node.audio_out[port].conn {
            Some(idx) => match &mut self.audio[idx] {
                Some(conn) => conn.ring.push_silence(frames),
                None => 0,
            },
            None => 0,
        };
        *self.frames_moved += frames as u64;
        frames
    }

    /// Drains all pending events from an event input port into `dst`.
    pub fn drain_events(&mut self, port: usize, dst: &mut Vec<SchedEvent>) {
        if let Some(idx) = self.node.event_in[port]
            && let Some(conn) = &mut self.events[idx]
        {
            conn.ring.drain_into(dst);
        }
    }

    /// Emits an event on an event output port.
    ///
    /// Returns `false` when the port is unconnected or the queue is full;
    /// producers retry on a later cycle.
    pub fn emit_event(&mut self, port: usize, event: SchedEvent) -> bool {
        match self.node.event_out[port] {
            Some(idx) => match &mut self.events[idx] {
                Some(conn) => conn.ring.push(event),
                None => false,
            },
            None => false,
        }
    }

    fn in_ring(&self, port: usize) -> Option<&AudioRing> {
        let idx = self.node.audio_in[port].conn?;
        self.audio[idx].as_ref().map(|c| &c.ring)
    }

    fn out_ring(&self, port: usize) -> Option<&AudioRing> {
        let idx = self.node.audio_out[port].conn?;
        self.audio[idx].as_ref().map(|c| &c.ring)
    }
}

/// Stored state of a live node: name, port tables, and (in the executor's
/// parallel vector) its behavior.
pub(crate) struct NodeSlot {
    pub name: String,
    pub audio_in: Vec<AudioPortSlot>,
    pub audio_out: Vec<AudioPortSlot>,
    /// Connection indices for event inputs, `None` when unconnected.
    pub event_in: Vec<Option<usize>>,
    /// Connection indices for event outputs, `None` when unconnected.
    pub event_out: Vec<Option<usize>>,
}

impl NodeSlot {
    pub fn new(name: &str, ports: &[PortSpec]) -> Self {
        let mut slot = Self {
            name: name.to_owned(),
            audio_in: Vec::new(),
            audio_out: Vec::new(),
            event_in: Vec::new(),
            event_out: Vec::new(),
        };
        for spec in ports {
            match *spec {
                PortSpec::AudioIn(format) => slot.audio_in.push(AudioPortSlot {
                    format,
                    conn: None,
                }),
                PortSpec::AudioOut(format) => slot.audio_out.push(AudioPortSlot {
                    format,
                    conn: None,
                }),
                PortSpec::EventIn => slot.event_in.push(None),
                PortSpec::EventOut => slot.event_out.push(None),
            }
        }
        slot
    }
}

/// One audio port: its format and, when connected, the connection index.
pub(crate) struct AudioPortSlot {
    pub format: AudioFormat,
    pub conn: Option<usize>,
}

/// An audio connection: the shared ring plus its endpoints
/// (`(node index, port index)` on each side).
pub(crate) struct AudioConn {
    pub ring: AudioRing,
    pub from: (usize, usize),
    pub to: (usize, usize),
}

/// An event connection between an event output and an event input.
pub(crate) struct EventConn {
    pub ring: EventRing,
    pub from: (usize, usize),
    pub to: (usize, usize),
}
