//! Error types for the orchestration layer.

/// Errors from session construction, topology rebuilds, and transport
/// operations.
///
/// Engine and codec failures pass through transparently; the variants here
/// cover the orchestration layer's own failure modes. Programming
/// invariants (mixer port counts, missing required ports) are asserted,
/// not represented — they are defects, not runtime conditions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An execution engine operation failed.
    #[error(transparent)]
    Pipeline(#[from] cadenza_pipeline::Error),

    /// A decode or encode operation failed.
    #[error(transparent)]
    Codec(#[from] cadenza_codec::Error),

    /// The operation only applies to playback-mode sessions.
    #[error("operation requires a playback session")]
    NotPlaybackMode,

    /// The operation only applies to render-mode sessions.
    #[error("operation requires a render session")]
    NotRenderMode,

    /// No master sink exists to wire the topology into.
    #[error("no master sink exists")]
    NoMasterSink,

    /// The referenced clip index is out of range.
    #[error("no clip at index {0}")]
    NoSuchClip(usize),

    /// `start_render` was called twice on one session.
    #[error("render already started")]
    RenderAlreadyStarted,

    /// A render was requested with no scheduled clips.
    #[error("nothing to render: no clips scheduled")]
    NothingToRender,

    /// The encoder reported a write failure; the render session is dead.
    #[error("render failed: encoder write error")]
    RenderFailed,

    /// The render output was already finalized.
    #[error("render already finalized")]
    RenderFinished,
}

/// Convenience result type for graph operations.
pub type Result<T> = std::result::Result<T, Error>;
