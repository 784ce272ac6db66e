//! The audio graph: topology builder plus transport/lifecycle manager.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cadenza_codec::{AudioData, EncodeSpec, SampleDepth, decode, open_encoder};
use cadenza_pipeline::{
    AudioFormat, ConnectError, EngineEvent, NodeId, OutputDevice, Pipeline, PipelineConfig,
    PortSpec, default_output_device, find_output_device,
};

use crate::clip::{ClipPlayback, EventFeed};
use crate::error::{Error, Result};
use crate::events::{GraphEvent, Observers};
use crate::monitor::Monitor;
use crate::render::{RenderCapture, RenderProgress, RenderShared};
use crate::source::{SourcePlayback, SourceProgress};
use crate::transport::SharedTransport;

/// Which master sink this session drives. Chosen at construction, fixed
/// for the life of the instance.
enum Mode {
    Playback,
    Render,
}

struct PreviewSource {
    data: Arc<AudioData>,
    progress: Arc<SourceProgress>,
    node: Option<NodeId>,
    resampler: Option<NodeId>,
}

struct ClipSlot {
    data: Arc<AudioData>,
    /// Timeline position of the clip start, in whole notes.
    start: f64,
    node: Option<NodeId>,
    event_feed: Option<NodeId>,
    resampler: Option<NodeId>,
}

struct RenderTarget {
    writer: Arc<Mutex<Option<cadenza_codec::EncodeWriter>>>,
    shared: Arc<RenderShared>,
}

/// One playback-or-render session: the root of the audio graph.
///
/// Owns the pipeline, the fixed nodes (monitor, master sink), the dynamic
/// nodes rebuilt on every topology change (mixer, resamplers, source and
/// clip nodes), and the transport. All methods run on the control thread;
/// every topology mutation goes through the coarse
/// stop → teardown → construct → connect → restart sequence, which is the
/// system's sole synchronization against the callback thread.
pub struct AudioGraph {
    pipeline: Pipeline,
    mode: Mode,
    transport: Arc<SharedTransport>,
    start_play_head: f64,
    monitor: NodeId,
    master: Option<NodeId>,
    mixer: Option<NodeId>,
    preview: Option<PreviewSource>,
    clips: Vec<ClipSlot>,
    observers: Observers,
    render: Option<RenderTarget>,
    device_preference: Option<String>,
    render_complete_notified: bool,
}

impl AudioGraph {
    /// Creates a session that plays to a hardware output device.
    ///
    /// `device` selects an output by index/name; `None` uses the platform
    /// default. The nominal format, latency, and tempo in `config` are
    /// fixed for the session.
    pub fn for_playback(config: PipelineConfig, device: Option<&str>) -> Result<Self> {
        let output = match device {
            Some(name) => find_output_device(name)?,
            None => default_output_device()?,
        };
        tracing::info!(device = %output.name, "playback session opening");

        let mut pipeline = Pipeline::new(config);
        let transport = Arc::new(SharedTransport::new());
        let monitor = create_monitor(&mut pipeline, &transport);
        let master = pipeline.create_device_sink(&output)?;

        let mut graph = Self {
            pipeline,
            mode: Mode::Playback,
            transport,
            start_play_head: 0.0,
            monitor,
            master: Some(master),
            mixer: None,
            preview: None,
            clips: Vec::new(),
            observers: Observers::new(),
            render: None,
            device_preference: device.map(str::to_owned),
            render_complete_notified: false,
        };
        graph.rebuild()?;
        Ok(graph)
    }

    /// Creates a session that renders offline to an encoded file.
    ///
    /// The encoder is opened immediately; audio starts flowing once
    /// [`start_render`](Self::start_render) fixes the expected length.
    pub fn for_render<P: AsRef<Path>>(
        config: PipelineConfig,
        path: P,
        depth: SampleDepth,
        tags: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let spec = EncodeSpec {
            sample_rate: config.sample_rate,
            layout: config.layout,
            depth,
        };
        let writer = open_encoder(&path, spec, tags)?;
        tracing::info!(path = %path.as_ref().display(), "render session opening");

        let mut pipeline = Pipeline::new(config);
        let transport = Arc::new(SharedTransport::new());
        let monitor = create_monitor(&mut pipeline, &transport);

        let writer = Arc::new(Mutex::new(Some(writer)));
        let shared = Arc::new(RenderShared::new());
        let nominal = pipeline.nominal_format();
        let ring_frames = pipeline.ring_frames();
        let master = pipeline.create_node(
            "render-capture",
            &[PortSpec::AudioIn(nominal)],
            Box::new(RenderCapture::new(
                Arc::clone(&writer),
                Arc::clone(&shared),
                nominal.channels(),
                ring_frames,
            )),
        );

        let mut graph = Self {
            pipeline,
            mode: Mode::Render,
            transport,
            start_play_head: 0.0,
            monitor,
            master: Some(master),
            mixer: None,
            preview: None,
            clips: Vec::new(),
            observers: Observers::new(),
            render: Some(RenderTarget { writer, shared }),
            device_preference: None,
            render_complete_notified: false,
        };
        graph.rebuild()?;
        Ok(graph)
    }

    // --- Sources ---

    /// Decodes a file and makes it the preview source, replacing any
    /// previous one. Playback-mode only (exclusive with rendering).
    pub fn load_preview<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        if !matches!(self.mode, Mode::Playback) {
            return Err(Error::NotPlaybackMode);
        }
        let data = Arc::new(decode(&path)?);
        tracing::info!(
            path = %path.as_ref().display(),
            frames = data.total_frames(),
            format = %data.format(),
            "preview loaded"
        );
        self.preview = Some(PreviewSource {
            data,
            progress: Arc::new(SourceProgress::new()),
            node: None,
            resampler: None,
        });
        self.rebuild()
    }

    /// Removes the preview source.
    pub fn clear_preview(&mut self) -> Result<()> {
        if self.preview.take().is_some() {
            self.rebuild()?;
        }
        Ok(())
    }

    /// Decodes a file and schedules it as a timeline clip starting at
    /// `at_whole_notes`. Returns the clip's index.
    pub fn add_clip<P: AsRef<Path>>(&mut self, path: P, at_whole_notes: f64) -> Result<usize> {
        let data = Arc::new(decode(&path)?);
        tracing::info!(
            path = %path.as_ref().display(),
            at = at_whole_notes,
            frames = data.total_frames(),
            "clip added"
        );
        self.clips.push(ClipSlot {
            data,
            start: at_whole_notes.max(0.0),
            node: None,
            event_feed: None,
            resampler: None,
        });
        self.rebuild()?;
        Ok(self.clips.len() - 1)
    }

    /// Removes a clip by index.
    pub fn remove_clip(&mut self, index: usize) -> Result<()> {
        if index >= self.clips.len() {
            return Err(Error::NoSuchClip(index));
        }
        self.clips.remove(index);
        self.rebuild()
    }

    /// Number of timeline clips.
    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    /// Preview playback progress: `(frames emitted, total frames)`.
    pub fn preview_progress(&self) -> Option<(u64, u64)> {
        self.preview
            .as_ref()
            .map(|p| (p.progress.frames_emitted(), p.data.total_frames()))
    }

    /// Whether the preview source ran out of data and is padding silence.
    pub fn preview_exhausted(&self) -> Option<bool> {
        self.preview.as_ref().map(|p| p.progress.is_exhausted())
    }

    // --- Transport ---

    /// Starts playback from the current position. No-op if already
    /// playing.
    pub fn play(&mut self) {
        if self.transport.is_playing() {
            return;
        }
        self.start_play_head = self.transport.play_head();
        self.transport.set_playing(true);
        self.observers.notify(GraphEvent::PlayingChanged);
    }

    /// Pauses playback in place. No-op if not playing; the engine keeps
    /// running and the position is kept.
    pub fn pause(&mut self) {
        if !self.transport.is_playing() {
            return;
        }
        self.transport.set_playing(false);
        self.observers.notify(GraphEvent::PlayingChanged);
    }

    /// Stops playback: position and restart position rewind to zero and
    /// the topology is rebuilt so time-dependent nodes resume from zero.
    pub fn stop(&mut self) -> Result<()> {
        self.transport.set_playing(false);
        self.transport.set_play_head(0.0);
        self.start_play_head = 0.0;
        self.rebuild()?;
        self.observers.notify(GraphEvent::PlayHeadChanged);
        self.observers.notify(GraphEvent::PlayingChanged);
        Ok(())
    }

    /// Rewinds to the position recorded at the most recent
    /// [`play`](Self::play) and resumes playing.
    pub fn restart(&mut self) -> Result<()> {
        self.transport.set_play_head(self.start_play_head);
        self.transport.set_playing(true);
        self.rebuild()?;
        self.observers.notify(GraphEvent::PlayHeadChanged);
        self.observers.notify(GraphEvent::PlayingChanged);
        Ok(())
    }

    /// Seeks the play head (clamped to ≥ 0) without stopping the engine.
    pub fn set_play_head(&mut self, pos_whole_notes: f64) {
        self.transport.set_play_head(pos_whole_notes);
        self.observers.notify(GraphEvent::PlayHeadChanged);
    }

    /// Current transport position in whole notes.
    pub fn play_head(&self) -> f64 {
        self.transport.play_head()
    }

    /// Whether the transport is playing.
    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    /// Current pipeline latency target.
    pub fn latency(&self) -> Duration {
        self.pipeline.latency()
    }

    /// Session nominal sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.pipeline.sample_rate()
    }

    /// Registers an observer for transport and render events.
    pub fn subscribe(&mut self, observer: Box<dyn FnMut(GraphEvent) + Send>) {
        self.observers.subscribe(observer);
    }

    /// Delivers at most one coalesced `PlayHeadChanged` notification for
    /// all callback-side position advances since the previous flush.
    pub fn flush_events(&mut self) {
        if self.transport.take_position_changed() {
            self.observers.notify(GraphEvent::PlayHeadChanged);
        }
    }

    /// Drains queued engine notifications (underrun, device loss) for the
    /// control layer to act on.
    pub fn poll_engine_events(&mut self) -> Vec<EngineEvent> {
        self.pipeline.drain_events().collect()
    }

    // --- Recovery ---

    /// Rebuilds the topology with an updated latency target, after a
    /// transient stream error.
    pub fn recover_stream(&mut self, new_latency: Duration) -> Result<()> {
        tracing::warn!(latency_ms = new_latency.as_millis(), "stream recovery");
        self.pipeline.set_latency(new_latency);
        self.rebuild()
    }

    /// Re-fixes the session sample rate, recreates the nominal-format
    /// fixed nodes (master sink and monitor) against it, and rebuilds.
    pub fn change_sample_rate(&mut self, new_rate: u32) -> Result<()> {
        if !matches!(self.mode, Mode::Playback) {
            return Err(Error::NotPlaybackMode);
        }
        tracing::warn!(rate = new_rate, "sample rate change");
        self.pipeline.stop();
        if let Some(master) = self.master.take() {
            self.pipeline.destroy_node(master)?;
        }
        self.pipeline.destroy_node(self.monitor)?;
        self.pipeline.set_sample_rate(new_rate);
        self.monitor = create_monitor(&mut self.pipeline, &self.transport);
        self.master = Some(self.create_master()?);
        self.rebuild()
    }

    /// Recovers from a backend disconnect: re-creates the master sink
    /// (falling back to the platform default device when the configured
    /// one is gone or fails to probe) and rebuilds at the pre-loss
    /// position. No-op when no master sink exists.
    pub fn recover_backend_disconnect(&mut self) -> Result<()> {
        let Some(master) = self.master.take() else {
            return Ok(());
        };
        tracing::warn!("backend disconnect recovery");
        self.pipeline.stop();
        self.pipeline.destroy_node(master)?;
        self.master = Some(self.create_master()?);
        self.rebuild()
    }

    // --- Rendering ---

    /// Fixes the expected render length from the scheduled clips, rewinds
    /// to zero, and starts the offline engine. Render-mode only.
    pub fn start_render(&mut self) -> Result<()> {
        let Some(render) = &self.render else {
            return Err(Error::NotRenderMode);
        };
        if render.shared.snapshot().frames_expected > 0 {
            return Err(Error::RenderAlreadyStarted);
        }
        let expected = self.expected_render_frames();
        if expected == 0 {
            return Err(Error::NothingToRender);
        }
        if let Some(render) = &self.render {
            render.shared.set_expected(expected);
        }
        tracing::info!(frames = expected, "render starting");

        self.transport.set_play_head(0.0);
        self.start_play_head = 0.0;
        self.transport.set_playing(true);
        self.render_complete_notified = false;
        self.rebuild()?;
        self.observers.notify(GraphEvent::PlayHeadChanged);
        self.observers.notify(GraphEvent::PlayingChanged);
        Ok(())
    }

    /// Snapshot of the running render; fires `RenderComplete` once when
    /// the expected total is reached.
    pub fn render_progress(&mut self) -> Result<RenderProgress> {
        let Some(render) = &self.render else {
            return Err(Error::NotRenderMode);
        };
        let progress = render.shared.snapshot();
        if progress.complete && !self.render_complete_notified {
            self.render_complete_notified = true;
            self.observers.notify(GraphEvent::RenderComplete);
        }
        Ok(progress)
    }

    /// Stops the engine and finalizes the output container. Returns the
    /// frames written. Callers poll [`render_progress`](Self::render_progress)
    /// for completion first; finishing early truncates the render.
    pub fn finish_render(&mut self) -> Result<u64> {
        let Some(render) = &self.render else {
            return Err(Error::NotRenderMode);
        };
        let failed = render.shared.snapshot().failed;
        self.pipeline.stop();
        self.transport.set_playing(false);

        let writer = match render.writer.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(writer) = writer else {
            return Err(Error::RenderFinished);
        };
        let frames = writer.frames_written();
        writer.finalize()?;
        if failed {
            return Err(Error::RenderFailed);
        }
        tracing::info!(frames, "render finalized");
        Ok(frames)
    }

    // --- Introspection (used by the control surface and tests) ---

    /// Connected mixer inputs; equals the active source count after every
    /// successful rebuild.
    pub fn mixer_inputs(&self) -> usize {
        self.mixer.map_or(0, |m| self.pipeline.connected_inputs(m))
    }

    /// Number of resampler nodes currently inserted.
    pub fn resampler_count(&self) -> usize {
        let preview = usize::from(
            self.preview
                .as_ref()
                .is_some_and(|p| p.resampler.is_some()),
        );
        preview
            + self
                .clips
                .iter()
                .filter(|c| c.resampler.is_some())
                .count()
    }

    /// Whether a driver is currently attached.
    pub fn is_engine_running(&self) -> bool {
        self.pipeline.is_running()
    }

    // --- Topology builder ---

    /// The stop → teardown → construct → connect → restart sequence.
    ///
    /// Always executed on the control thread; never while a callback is in
    /// flight (the synchronous stop guarantees that). Dynamic nodes are
    /// destroyed and recreated wholesale rather than edited incrementally —
    /// that coarseness is the race-safety mechanism, not an optimization
    /// shortcut.
    fn rebuild(&mut self) -> Result<()> {
        self.pipeline.stop();

        // Tear down the previous dynamic topology.
        if let Some(mixer) = self.mixer.take() {
            self.pipeline.destroy_node(mixer)?;
        }
        if let Some(preview) = self.preview.as_mut() {
            if let Some(node) = preview.node.take() {
                self.pipeline.destroy_node(node)?;
            }
            if let Some(resampler) = preview.resampler.take() {
                self.pipeline.destroy_node(resampler)?;
            }
        }
        for clip in &mut self.clips {
            if let Some(node) = clip.node.take() {
                self.pipeline.destroy_node(node)?;
            }
            if let Some(feed) = clip.event_feed.take() {
                self.pipeline.destroy_node(feed)?;
            }
            if let Some(resampler) = clip.resampler.take() {
                self.pipeline.destroy_node(resampler)?;
            }
        }

        let source_count = usize::from(self.preview.is_some()) + self.clips.len();
        let master = self.master.ok_or(Error::NoMasterSink)?;
        let tempo = self.pipeline.tempo();
        let ring_frames = self.pipeline.ring_frames();

        // Mixer plus the two fixed edges toward the sink. These are always
        // format-compatible: mixer, monitor, and master all carry the
        // nominal format fixed at session creation.
        let mixer = self.pipeline.create_mixer(source_count);
        self.pipeline
            .connect_audio(mixer, 0, self.monitor, 0)
            .map_err(cadenza_pipeline::Error::from)?;
        self.pipeline
            .connect_audio(self.monitor, 0, master, 0)
            .map_err(cadenza_pipeline::Error::from)?;

        // Sources in deterministic order: preview first, then clips in
        // list order.
        let mut next_input = 0;
        if let Some(preview) = self.preview.as_mut() {
            let behavior = Box::new(SourcePlayback::new(
                &preview.data,
                Arc::clone(&preview.progress),
                ring_frames,
            ));
            let node = self.pipeline.create_node(
                "preview",
                &[PortSpec::AudioOut(preview.data.format())],
                behavior,
            );
            preview.node = Some(node);
            preview.resampler =
                connect_or_resample(&mut self.pipeline, node, 0, mixer, next_input)?;
            next_input += 1;
        }
        for clip in &mut self.clips {
            let end = clip.start
                + tempo.frames_to_whole_notes(clip.data.total_frames(), clip.data.sample_rate);
            let node = self.pipeline.create_node(
                "clip",
                &[PortSpec::AudioOut(clip.data.format()), PortSpec::EventIn],
                Box::new(ClipPlayback::new(
                    Arc::clone(&clip.data),
                    tempo,
                    self.transport.play_head(),
                    ring_frames,
                )),
            );
            let feed = self.pipeline.create_node(
                "clip-events",
                &[PortSpec::EventOut],
                Box::new(EventFeed::new(EventFeed::clip_schedule(clip.start, end))),
            );
            clip.node = Some(node);
            clip.event_feed = Some(feed);
            clip.resampler = connect_or_resample(&mut self.pipeline, node, 0, mixer, next_input)?;
            self.pipeline
                .connect_events(feed, 0, node, 0)
                .map_err(cadenza_pipeline::Error::from)?;
            next_input += 1;
        }

        assert_eq!(
            self.pipeline.connected_inputs(mixer),
            source_count,
            "mixer wiring incomplete after rebuild"
        );
        self.mixer = Some(mixer);

        // Restart at the current transport position so time-dependent
        // nodes (event feeds) resume from the right point, not from zero.
        self.pipeline.start(self.transport.play_head())?;
        tracing::debug!(sources = source_count, "topology rebuilt");
        Ok(())
    }

    /// Recreates the master sink for the session mode.
    fn create_master(&mut self) -> Result<NodeId> {
        match self.mode {
            Mode::Playback => {
                let output = self.resolve_device()?;
                tracing::info!(device = %output.name, "master sink recreated");
                Ok(self.pipeline.create_device_sink(&output)?)
            }
            Mode::Render => {
                let render = self.render.as_ref().ok_or(Error::NotRenderMode)?;
                let nominal = self.pipeline.nominal_format();
                let ring_frames = self.pipeline.ring_frames();
                Ok(self.pipeline.create_node(
                    "render-capture",
                    &[PortSpec::AudioIn(nominal)],
                    Box::new(RenderCapture::new(
                        Arc::clone(&render.writer),
                        Arc::clone(&render.shared),
                        nominal.channels(),
                        ring_frames,
                    )),
                ))
            }
        }
    }

    /// The configured device, falling back to the platform default when it
    /// is unavailable or fails to probe.
    fn resolve_device(&self) -> Result<OutputDevice> {
        if let Some(name) = &self.device_preference {
            match find_output_device(name) {
                Ok(device) => return Ok(device),
                Err(err) => {
                    tracing::warn!(device = %name, %err, "configured device unavailable, using default");
                }
            }
        }
        Ok(default_output_device()?)
    }

    /// Frames the render will produce: the furthest clip end, at the
    /// nominal rate.
    fn expected_render_frames(&self) -> u64 {
        let tempo = self.pipeline.tempo();
        let end = self
            .clips
            .iter()
            .map(|clip| {
                clip.start
                    + tempo.frames_to_whole_notes(clip.data.total_frames(), clip.data.sample_rate)
            })
            .fold(0.0f64, f64::max);
        self.pipeline.whole_notes_to_frames(end)
    }
}

impl Drop for AudioGraph {
    fn drop(&mut self) {
        self.pipeline.stop();
    }
}

fn create_monitor(pipeline: &mut Pipeline, transport: &Arc<SharedTransport>) -> NodeId {
    let nominal = pipeline.nominal_format();
    let behavior = Box::new(Monitor::new(
        Arc::clone(transport),
        pipeline.tempo(),
        nominal.sample_rate,
        nominal.channels(),
        pipeline.ring_frames(),
    ));
    pipeline.create_node(
        "monitor",
        &[PortSpec::AudioIn(nominal), PortSpec::AudioOut(nominal)],
        behavior,
    )
}

/// Connects `from` to `to` directly, inserting a resampler on this edge
/// only when the attempt reports a layout or rate mismatch. Returns the
/// inserted resampler's ID for later teardown. Any other connection error
/// is fatal to the rebuild.
fn connect_or_resample(
    pipeline: &mut Pipeline,
    from: NodeId,
    from_port: usize,
    to: NodeId,
    to_port: usize,
) -> Result<Option<NodeId>> {
    match pipeline.connect_audio(from, from_port, to, to_port) {
        Ok(()) => Ok(None),
        Err(
            ConnectError::IncompatibleChannelLayout | ConnectError::IncompatibleSampleRate,
        ) => {
            let from_fmt: AudioFormat = pipeline.audio_out_format(from, from_port)?;
            let to_fmt: AudioFormat = pipeline.audio_in_format(to, to_port)?;
            let resampler = pipeline.create_resampler(from_fmt, to_fmt);
            tracing::debug!(from = %from_fmt, to = %to_fmt, "resampler inserted");
            pipeline
                .connect_audio(from, from_port, resampler, 0)
                .map_err(cadenza_pipeline::Error::from)?;
            pipeline
                .connect_audio(resampler, 0, to, to_port)
                .map_err(cadenza_pipeline::Error::from)?;
            Ok(Some(resampler))
        }
        Err(other) => Err(Error::from(cadenza_pipeline::Error::from(other))),
    }
}
