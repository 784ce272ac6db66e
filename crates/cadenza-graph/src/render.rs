//! Render-capture node: the master sink in offline-render mode.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cadenza_codec::EncodeWriter;
use cadenza_pipeline::{NodePorts, RunNode};

/// Render counters shared between the capture node and the control thread.
pub(crate) struct RenderShared {
    frames_expected: AtomicU64,
    frames_rendered: AtomicU64,
    complete: AtomicBool,
    failed: AtomicBool,
}

impl RenderShared {
    pub fn new() -> Self {
        Self {
            frames_expected: AtomicU64::new(0),
            frames_rendered: AtomicU64::new(0),
            complete: AtomicBool::new(false),
            failed: AtomicBool::new(false),
        }
    }

    pub fn set_expected(&self, frames: u64) {
        self.frames_expected.store(frames, Ordering::Release);
    }

    pub fn snapshot(&self) -> RenderProgress {
        RenderProgress {
            frames_rendered: self.frames_rendered.load(Ordering::Acquire),
            frames_expected: self.frames_expected.load(Ordering::Acquire),
            complete: self.complete.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
        }
    }
}

/// Control-thread view of a running render.
#[derive(Clone, Copy, Debug)]
pub struct RenderProgress {
    /// Frames delivered to the encoder so far.
    pub frames_rendered: u64,
    /// Total frames the render will produce.
    pub frames_expected: u64,
    /// The running total reached the expected total.
    pub complete: bool,
    /// An encoder write failed; the render session is dead.
    pub failed: bool,
}

/// Forwards audio received from the monitor node to the streaming encoder
/// and tracks rendered-versus-expected frames.
///
/// Offline rendering has no hardware callback, so the encoder write — file
/// I/O behind a mutex — is permitted here and only here; the capture node
/// never runs on a device stream. Idle until an expected total is set.
pub(crate) struct RenderCapture {
    writer: Arc<Mutex<Option<EncodeWriter>>>,
    shared: Arc<RenderShared>,
    channels: usize,
    scratch: Vec<f32>,
}

impl RenderCapture {
    pub fn new(
        writer: Arc<Mutex<Option<EncodeWriter>>>,
        shared: Arc<RenderShared>,
        channels: usize,
        ring_frames: usize,
    ) -> Self {
        Self {
            writer,
            shared,
            channels,
            scratch: vec![0.0; ring_frames * channels],
        }
    }
}

impl RunNode for RenderCapture {
    fn run(&mut self, ports: &mut NodePorts<'_>) {
        let expected = self.shared.frames_expected.load(Ordering::Acquire);
        if expected == 0
            || self.shared.failed.load(Ordering::Acquire)
            || self.shared.complete.load(Ordering::Acquire)
        {
            return;
        }

        let rendered = self.shared.frames_rendered.load(Ordering::Acquire);
        let remaining = (expected - rendered) as usize;
        let frames = ports
            .in_fill(0)
            .min(remaining)
            .min(self.scratch.len() / self.channels);
        if frames == 0 {
            return;
        }

        ports.read(0, &mut self.scratch[..frames * self.channels]);
        let write_result = match self.writer.lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(writer) => writer.write_frames(&self.scratch, frames),
                None => return,
            },
            Err(_) => {
                self.shared.failed.store(true, Ordering::Release);
                return;
            }
        };
        if let Err(err) = write_result {
            tracing::error!(%err, "encoder write failed, aborting render");
            self.shared.failed.store(true, Ordering::Release);
            return;
        }

        let rendered = rendered + frames as u64;
        self.shared
            .frames_rendered
            .store(rendered, Ordering::Release);
        if rendered >= expected {
            self.shared.complete.store(true, Ordering::Release);
            tracing::info!(frames = rendered, "render reached expected total");
        }
    }
}
