//! Audio graph orchestration for Cadenza.
//!
//! This crate is the control layer of the system: it assembles a topology
//! of processing nodes from the current set of active sources, inserts
//! format-converting resamplers only where a connection attempt reports a
//! mismatch, and drives the execution engine through the coarse
//! stop → teardown → construct → connect → restart sequence that keeps the
//! control thread and the audio callback from ever racing on graph state.
//!
//! # Topology
//!
//! ```text
//! preview ──────────────┐
//! clip 0 ── [resample] ─┤
//! clip 1 ───────────────┼─► mixer ─► monitor ─► master sink
//!    ▲                  │              │        (device or
//!    └── clip events ───┘              ▼         render capture)
//!                                  transport
//! ```
//!
//! Every active source reaches the master sink through the mixer. The
//! monitor ("spy") node sits last before the sink, copies audio through
//! unchanged, and is the sole writer of the transport position — so the
//! play head tracks frames actually delivered, never frames merely
//! requested upstream. The master sink is a hardware output in playback
//! mode or a streaming encoder capture in render mode; exactly one of the
//! two is chosen per [`AudioGraph`] and never changes.
//!
//! # Threads
//!
//! All [`AudioGraph`] methods run on the control thread. The callback
//! thread shares exactly two kinds of state with it: the lock-free
//! transport words (play head, playing flag, position-changed flag) and
//! the engine notification queue. Everything else is synchronized by the
//! engine's synchronous stop.

mod clip;
mod error;
mod events;
mod graph;
mod monitor;
mod render;
mod source;
mod transport;

pub use error::{Error, Result};
pub use events::GraphEvent;
pub use graph::AudioGraph;
pub use render::RenderProgress;
pub use source::SourceProgress;
pub use transport::SharedTransport;

// Re-exported so the control surface can configure a session without
// depending on the engine and codec crates directly.
pub use cadenza_codec::SampleDepth;
pub use cadenza_pipeline::{ChannelLayout, EngineEvent, PipelineConfig, Tempo};
