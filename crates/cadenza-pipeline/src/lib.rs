//! Execution engine for the Cadenza audio graph.
//!
//! This crate owns the low-level half of the system: nodes, ring-buffer
//! backed ports, connection compatibility checking, dependency-ordered
//! scheduling, the flat musical-time mapping, and the hardware output
//! stream. The orchestration layer (`cadenza-graph`) configures and drives
//! a [`Pipeline`] but never reaches into the callback itself.
//!
//! # Architecture
//!
//! The engine uses a **two-object split**:
//!
//! - [`Pipeline`] — owned by the control thread. Node/port mutation,
//!   connection, start/stop. NOT touched by the audio thread.
//! - `Executor` (internal) — the node set, port rings, and compiled
//!   schedule, shared with the driver via `Arc<Mutex<..>>`. The callback
//!   takes the lock with `try_lock`; the control thread locks only while
//!   the driver is stopped, so the lock is never contended in steady state.
//!
//! Stopping is the sole synchronization point between the two threads:
//! [`Pipeline::stop`] returns only once no callback invocation is in flight
//! and none will start until the next [`Pipeline::start`]. There is no
//! fine-grained locking of the graph.
//!
//! # Execution model
//!
//! Ports are ring buffers sized from the pipeline latency. Each scheduling
//! cycle runs every node once in topological order; a node moves
//! `min(input fill, output free)` frames and never blocks. With a device
//! sink present, the cpal callback runs cycles until the sink's input port
//! can satisfy the hardware request; without one, a free-running driver
//! thread pumps cycles for offline rendering.
//!
//! Node behaviors implement the single [`RunNode`] interface. The engine
//! ships stock behaviors for mixing, resampling, and the device sink;
//! everything else is supplied by the caller.

mod device;
mod error;
mod format;
mod node;
mod pipeline;
mod ring;
mod stock;
mod tempo;

pub use device::{OutputDevice, default_output_device, find_output_device, list_output_devices};
pub use error::{ConnectError, Error, Result};
pub use format::{AudioFormat, ChannelLayout};
pub use node::{NodeId, NodePorts, PortSpec, RunNode};
pub use pipeline::{EngineEvent, Pipeline, PipelineConfig};
pub use ring::{AudioRing, EventRing, SchedEvent};
pub use tempo::Tempo;
