//! Cross-thread transport state.
//!
//! The transport position is the single source of truth for "where"
//! playback is. It is written by the monitor node on the callback thread
//! and read (or seeked) by the control thread, so every field here is a
//! lock-free single word with explicit memory ordering: release on write,
//! acquire on read. Advancing uses a compare-exchange loop so a concurrent
//! seek is never partially overwritten.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// An `f64` stored bit-cast in an `AtomicU64`.
pub(crate) struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self, order: Ordering) -> f64 {
        f64::from_bits(self.0.load(order))
    }

    pub fn store(&self, value: f64, order: Ordering) {
        self.0.store(value.to_bits(), order);
    }

    /// Adds `delta` atomically via compare-exchange.
    pub fn fetch_add(&self, delta: f64) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some((f64::from_bits(bits) + delta).to_bits())
            });
    }
}

/// Transport state shared between the control thread and the monitor node.
pub struct SharedTransport {
    /// Playback position in whole notes.
    play_head: AtomicF64,
    playing: AtomicBool,
    /// Coalescing flag: set by the monitor on every advance, cleared by
    /// `flush_events` on the control thread.
    position_changed: AtomicBool,
}

impl SharedTransport {
    pub(crate) fn new() -> Self {
        Self {
            play_head: AtomicF64::new(0.0),
            playing: AtomicBool::new(false),
            position_changed: AtomicBool::new(false),
        }
    }

    /// Current transport position in whole notes.
    pub fn play_head(&self) -> f64 {
        self.play_head.load(Ordering::Acquire)
    }

    /// Whether the transport is playing.
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub(crate) fn set_play_head(&self, pos: f64) {
        self.play_head.store(pos.max(0.0), Ordering::Release);
    }

    pub(crate) fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    /// Advances the play head by a non-negative whole-note delta.
    pub(crate) fn advance(&self, delta: f64) {
        debug_assert!(delta >= 0.0);
        self.play_head.fetch_add(delta);
    }

    pub(crate) fn mark_position_changed(&self) {
        self.position_changed.store(true, Ordering::Release);
    }

    /// Returns and clears the coalescing flag.
    pub(crate) fn take_position_changed(&self) -> bool {
        self.position_changed.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_head_clamps_below_zero() {
        let transport = SharedTransport::new();
        transport.set_play_head(-3.5);
        assert_eq!(transport.play_head(), 0.0);
    }

    #[test]
    fn advance_accumulates() {
        let transport = SharedTransport::new();
        transport.set_play_head(1.0);
        transport.advance(0.25);
        transport.advance(0.25);
        assert!((transport.play_head() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn position_changed_coalesces() {
        let transport = SharedTransport::new();
        transport.mark_position_changed();
        transport.mark_position_changed();
        assert!(transport.take_position_changed());
        assert!(!transport.take_position_changed());
    }
}
