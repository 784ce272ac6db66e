//! Error types for the execution engine.

use crate::node::NodeId;

/// Errors from pipeline construction, mutation, and streaming.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A port connection failed.
    #[error("connection failed: {0}")]
    Connect(#[from] ConnectError),

    /// The referenced node does not exist (or was destroyed).
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    /// No audio output device is available on the system.
    #[error("no audio output device available")]
    NoDevice,

    /// The requested audio device was not found.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Probing a device's output configuration failed.
    #[error("device probe failed: {0}")]
    DeviceProbe(String),

    /// Audio stream setup or runtime error.
    #[error("audio stream error: {0}")]
    Stream(String),

    /// `start` was called while a driver is already running.
    #[error("pipeline is already running")]
    AlreadyRunning,

    /// A device sink already exists; destroy it before creating another.
    #[error("pipeline already has a device sink")]
    SinkExists,
}

/// Typed outcomes of a connection attempt.
///
/// The topology builder matches on the two incompatibility codes to decide
/// whether to insert a resampler; every other variant is fatal to the
/// rebuild that produced it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    /// The ports carry different channel layouts.
    #[error("channel layouts are incompatible")]
    IncompatibleChannelLayout,

    /// The ports carry different sample rates.
    #[error("sample rates are incompatible")]
    IncompatibleSampleRate,

    /// One of the referenced nodes does not exist.
    #[error("node not found")]
    NoSuchNode,

    /// The referenced port index is out of range for its node.
    #[error("port not found")]
    NoSuchPort,

    /// The input port already has a connection.
    #[error("port already connected")]
    PortInUse,

    /// Adding this edge would create a cycle.
    #[error("connection would create a cycle")]
    CycleDetected,
}

/// Convenience result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
