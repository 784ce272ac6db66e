//! Observer notifications from the transport and lifecycle manager.

/// Events delivered to graph observers on the control thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphEvent {
    /// The play-head position changed (seek, stop, or coalesced playback
    /// advance via `flush_events`).
    PlayHeadChanged,
    /// The playing state toggled.
    PlayingChanged,
    /// An offline render reached its expected frame total.
    RenderComplete,
}

/// Registered observer callbacks.
///
/// Notification is synchronous on the control thread; observers must not
/// call back into the graph.
pub(crate) struct Observers {
    subs: Vec<Box<dyn FnMut(GraphEvent) + Send>>,
}

impl Observers {
    pub fn new() -> Self {
        Self { subs: Vec::new() }
    }

    pub fn subscribe(&mut self, observer: Box<dyn FnMut(GraphEvent) + Send>) {
        self.subs.push(observer);
    }

    pub fn notify(&mut self, event: GraphEvent) {
        for sub in &mut self.subs {
            sub(event);
        }
    }
}
