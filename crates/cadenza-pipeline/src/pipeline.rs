//! The pipeline: node set, connections, schedule, and drivers.
//!
//! [`Pipeline`] is the control-thread handle. All topology mutation happens
//! here while the driver is stopped; [`Pipeline::stop`] is synchronous and
//! is the only synchronization point with the callback thread. The shared
//! `Executor` runs scheduling cycles either from the cpal output callback
//! (when a device sink exists) or from a free-running driver thread
//! (offline rendering).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, TryIter, bounded};

use crate::device::OutputDevice;
use crate::error::{ConnectError, Error, Result};
use crate::format::{AudioFormat, ChannelLayout};
use crate::node::{AudioConn, EventConn, NodeId, NodePorts, NodeSlot, PortSpec, RunNode};
use crate::ring::{AudioRing, EventRing};
use crate::stock::{DeviceSink, Mixer, Resampler};
use crate::tempo::Tempo;

/// Session-wide pipeline parameters, fixed when the pipeline is created.
#[derive(Clone, Copy, Debug)]
pub struct PipelineConfig {
    /// Nominal sample rate in Hz; mixer, monitor, and sink ports carry it.
    pub sample_rate: u32,
    /// Nominal channel layout.
    pub layout: ChannelLayout,
    /// Target buffering between nodes; sizes the port rings.
    pub latency: Duration,
    /// Flat tempo map for whole-note conversion.
    pub tempo: Tempo,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            layout: ChannelLayout::Stereo,
            latency: Duration::from_millis(100),
            tempo: Tempo::default(),
        }
    }
}

/// Asynchronous notifications from the driver and backend threads.
///
/// These are queued for the control thread and never mutate graph state
/// directly.
#[derive(Clone, Debug)]
pub enum EngineEvent {
    /// The hardware requested more frames than the sink could supply.
    Underrun {
        /// Frames that had to be zero-filled.
        missing_frames: usize,
    },
    /// The output device disappeared; the session should run its
    /// backend-disconnect recovery.
    DeviceLost,
    /// A backend-specific stream error.
    StreamError(String),
}

enum Driver {
    Stream(cpal::Stream),
    Offline {
        stop: Arc<AtomicBool>,
        handle: JoinHandle<()>,
    },
}

struct SinkBinding {
    node: usize,
    device: cpal::Device,
}

/// Control-thread handle to the execution engine.
pub struct Pipeline {
    exec: Arc<Mutex<Executor>>,
    config: PipelineConfig,
    driver: Option<Driver>,
    sink: Option<SinkBinding>,
    notif_tx: Sender<EngineEvent>,
    notif_rx: Receiver<EngineEvent>,
}

impl Pipeline {
    /// Creates an empty pipeline with the given session parameters.
    pub fn new(config: PipelineConfig) -> Self {
        let (notif_tx, notif_rx) = bounded(64);
        Self {
            exec: Arc::new(Mutex::new(Executor::new())),
            config,
            driver: None,
            sink: None,
            notif_tx,
            notif_rx,
        }
    }

    // --- Session parameters ---

    /// Nominal sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Nominal channel layout.
    pub fn layout(&self) -> ChannelLayout {
        self.config.layout
    }

    /// Nominal port format (`sample_rate` + `layout`).
    pub fn nominal_format(&self) -> AudioFormat {
        AudioFormat::new(self.config.sample_rate, self.config.layout)
    }

    /// Current latency target.
    pub fn latency(&self) -> Duration {
        self.config.latency
    }

    /// Updates the latency target; affects rings allocated afterwards.
    /// Call while stopped, then rebuild the topology.
    pub fn set_latency(&mut self, latency: Duration) {
        self.config.latency = latency;
    }

    /// Re-fixes the nominal sample rate. Existing node ports keep the
    /// format they were created with; callers recreate the nominal-format
    /// nodes and rebuild.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.config.sample_rate = sample_rate;
    }

    /// The flat tempo map.
    pub fn tempo(&self) -> Tempo {
        self.config.tempo
    }

    /// Converts frames at the nominal rate to whole notes.
    pub fn frames_to_whole_notes(&self, frames: u64) -> f64 {
        self.config
            .tempo
            .frames_to_whole_notes(frames, self.config.sample_rate)
    }

    /// Converts whole notes to frames at the nominal rate.
    pub fn whole_notes_to_frames(&self, whole_notes: f64) -> u64 {
        self.config
            .tempo
            .whole_notes_to_frames(whole_notes, self.config.sample_rate)
    }

    /// Port ring capacity, in frames, for connections made now.
    pub fn ring_frames(&self) -> usize {
        let frames = self.config.latency.as_secs_f64() * f64::from(self.config.sample_rate);
        (frames as usize).max(1024)
    }

    // --- Node management ---

    /// Creates a node from a port list and a behavior.
    pub fn create_node(
        &mut self,
        name: &str,
        ports: &[PortSpec],
        behavior: Box<dyn RunNode>,
    ) -> NodeId {
        let mut exec = self.lock();
        let idx = exec.nodes.len();
        exec.nodes.push(Some(NodeSlot::new(name, ports)));
        exec.behaviors.push(Some(behavior));
        tracing::debug!(node = name, id = idx, "node created");
        NodeId(idx as u32)
    }

    /// Creates a mixer with `inputs` audio inputs and one output, all at
    /// the nominal format.
    pub fn create_mixer(&mut self, inputs: usize) -> NodeId {
        let nominal = self.nominal_format();
        let mut ports: Vec<PortSpec> = (0..inputs).map(|_| PortSpec::AudioIn(nominal)).collect();
        ports.push(PortSpec::AudioOut(nominal));
        let behavior = Box::new(Mixer::new(nominal.channels(), self.ring_frames()));
        self.create_node("mixer", &ports, behavior)
    }

    /// Creates a resampler converting `from` to `to` (rate and/or layout).
    pub fn create_resampler(&mut self, from: AudioFormat, to: AudioFormat) -> NodeId {
        let ports = [PortSpec::AudioIn(from), PortSpec::AudioOut(to)];
        let behavior = Box::new(Resampler::new(from, to, self.ring_frames()));
        self.create_node("resample", &ports, behavior)
    }

    /// Creates the hardware sink node bound to `device`.
    ///
    /// Its single audio input carries the nominal format; the stream
    /// callback drains it directly. Only one device sink may exist at a
    /// time.
    pub fn create_device_sink(&mut self, device: &OutputDevice) -> Result<NodeId> {
        if self.sink.is_some() {
            return Err(Error::SinkExists);
        }
        let nominal = self.nominal_format();
        let id = self.create_node(
            "playback-device",
            &[PortSpec::AudioIn(nominal)],
            Box::new(DeviceSink),
        );
        self.sink = Some(SinkBinding {
            node: id.0 as usize,
            device: device.device.clone(),
        });
        tracing::info!(device = %device.name, "device sink bound");
        Ok(id)
    }

    /// Destroys a node, disconnecting all of its ports.
    pub fn destroy_node(&mut self, id: NodeId) -> Result<()> {
        let idx = id.0 as usize;
        let mut exec = self.lock();
        let Some(name) = exec
            .nodes
            .get(idx)
            .and_then(Option::as_ref)
            .map(|n| n.name.clone())
        else {
            return Err(Error::NodeNotFound(id));
        };
        exec.remove_node(idx);
        drop(exec);
        if self.sink.as_ref().is_some_and(|s| s.node == idx) {
            self.sink = None;
        }
        tracing::debug!(node = %name, id = idx, "node destroyed");
        Ok(())
    }

    // --- Connections ---

    /// Connects an audio output port to an audio input port.
    ///
    /// Port indices count per direction: `from_port` indexes the source
    /// node's audio outputs, `to_port` the destination node's audio inputs.
    /// Formats must match exactly; mismatches report the dimension that
    /// differed so the caller can insert a resampler on this edge.
    pub fn connect_audio(
        &mut self,
        from: NodeId,
        from_port: usize,
        to: NodeId,
        to_port: usize,
    ) -> std::result::Result<(), ConnectError> {
        let capacity = self.ring_frames();
        let mut exec = self.lock();
        exec.connect_audio(
            from.0 as usize,
            from_port,
            to.0 as usize,
            to_port,
            capacity,
        )?;
        tracing::debug!(from = %from, to = %to, "audio connected");
        Ok(())
    }

    /// Connects an event output port to an event input port.
    pub fn connect_events(
        &mut self,
        from: NodeId,
        from_port: usize,
        to: NodeId,
        to_port: usize,
    ) -> std::result::Result<(), ConnectError> {
        let mut exec = self.lock();
        exec.connect_events(from.0 as usize, from_port, to.0 as usize, to_port)?;
        tracing::debug!(from = %from, to = %to, "events connected");
        Ok(())
    }

    // --- Introspection ---

    /// Number of connected audio inputs on a node.
    pub fn connected_inputs(&self, id: NodeId) -> usize {
        let exec = self.lock();
        exec.nodes
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .map_or(0, |n| {
                n.audio_in.iter().filter(|p| p.conn.is_some()).count()
            })
    }

    /// Index of the first unconnected audio input on a node.
    pub fn next_free_audio_input(&self, id: NodeId) -> Option<usize> {
        let exec = self.lock();
        exec.nodes
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .and_then(|n| n.audio_in.iter().position(|p| p.conn.is_none()))
    }

    /// Format of an audio output port.
    pub fn audio_out_format(&self, id: NodeId, port: usize) -> Result<AudioFormat> {
        let exec = self.lock();
        exec.nodes
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .and_then(|n| n.audio_out.get(port))
            .map(|p| p.format)
            .ok_or(Error::NodeNotFound(id))
    }

    /// Format of an audio input port.
    pub fn audio_in_format(&self, id: NodeId, port: usize) -> Result<AudioFormat> {
        let exec = self.lock();
        exec.nodes
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .and_then(|n| n.audio_in.get(port))
            .map(|p| p.format)
            .ok_or(Error::NodeNotFound(id))
    }

    /// Frames buffered on an audio input port.
    pub fn audio_input_fill(&self, id: NodeId, port: usize) -> usize {
        let exec = self.lock();
        exec.input_fill(id.0 as usize, port)
    }

    // --- Lifecycle ---

    /// Whether a driver (stream or offline thread) is running.
    pub fn is_running(&self) -> bool {
        self.driver.is_some()
    }

    /// Starts the pipeline at a transport position in whole notes.
    ///
    /// Seeks every behavior, clears all port rings, primes one scheduling
    /// cycle, then attaches the driver: the cpal output stream when a
    /// device sink exists, a free-running thread otherwise.
    pub fn start(&mut self, at_whole_notes: f64) -> Result<()> {
        if self.driver.is_some() {
            return Err(Error::AlreadyRunning);
        }
        {
            let mut exec = self.lock();
            exec.prepare_start(at_whole_notes);
            exec.run_cycle();
        }
        let sink = self.sink.as_ref().map(|b| (b.device.clone(), b.node));
        match sink {
            Some((device, node)) => self.start_stream(&device, node)?,
            None => self.start_offline()?,
        }
        tracing::info!(position = at_whole_notes, "pipeline started");
        Ok(())
    }

    /// Stops the pipeline.
    ///
    /// Synchronous: on return, no scheduling cycle is executing and none
    /// will start until the next [`start`](Self::start). In-flight audio
    /// simply ends at the last completed callback.
    pub fn stop(&mut self) {
        match self.driver.take() {
            Some(Driver::Stream(stream)) => {
                // Dropping the stream stops the callback and joins any
                // in-flight invocation.
                drop(stream);
                tracing::info!("output stream stopped");
            }
            Some(Driver::Offline { stop, handle }) => {
                stop.store(true, Ordering::Release);
                let _ = handle.join();
                tracing::info!("offline driver stopped");
            }
            None => {}
        }
    }

    /// Runs one scheduling cycle on the calling thread.
    ///
    /// Used for priming and for driving the pipeline deterministically when
    /// no driver is attached. Returns the frames moved during the cycle.
    pub fn pump(&mut self) -> u64 {
        self.lock().run_cycle()
    }

    /// Drains queued engine notifications without blocking.
    pub fn drain_events(&self) -> TryIter<'_, EngineEvent> {
        self.notif_rx.try_iter()
    }

    fn start_stream(&mut self, device: &cpal::Device, sink_node: usize) -> Result<()> {
        let channels = self.config.layout.channels();
        let stream_config = cpal::StreamConfig {
            channels: channels as u16,
            sample_rate: self.config.sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let exec = Arc::clone(&self.exec);
        let data_tx = self.notif_tx.clone();
        let error_tx = self.notif_tx.clone();

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // The lock is uncontended while running; the control
                    // thread only takes it between stop() and start().
                    let Ok(mut exec) = exec.try_lock() else {
                        data.fill(0.0);
                        return;
                    };
                    let requested = data.len() / channels;
                    let delivered = exec.deliver(sink_node, data, channels);
                    if delivered < requested {
                        data[delivered * channels..].fill(0.0);
                        let _ = data_tx.try_send(EngineEvent::Underrun {
                            missing_frames: requested - delivered,
                        });
                    }
                },
                move |err| {
                    let event = match err {
                        cpal::StreamError::DeviceNotAvailable => EngineEvent::DeviceLost,
                        other => EngineEvent::StreamError(other.to_string()),
                    };
                    let _ = error_tx.try_send(event);
                },
                None,
            )
            .map_err(|e| Error::Stream(e.to_string()))?;

        stream.play().map_err(|e| Error::Stream(e.to_string()))?;
        tracing::info!(
            channels,
            sample_rate = self.config.sample_rate,
            "output stream started"
        );
        self.driver = Some(Driver::Stream(stream));
        Ok(())
    }

    fn start_offline(&mut self) -> Result<()> {
        let stop = Arc::new(AtomicBool::new(false));
        let exec = Arc::clone(&self.exec);
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("cadenza-pipeline".into())
            .spawn(move || {
                while !thread_stop.load(Ordering::Acquire) {
                    let moved = match exec.lock() {
                        Ok(mut exec) => exec.run_cycle(),
                        Err(_) => break,
                    };
                    if moved == 0 {
                        thread::sleep(Duration::from_millis(1));
                    }
                }
            })
            .map_err(|e| Error::Stream(e.to_string()))?;
        self.driver = Some(Driver::Offline { stop, handle });
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Executor> {
        // A poisoned lock means a behavior panicked on the driver thread;
        // the node state is still structurally sound for teardown.
        match self.exec.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The shared node set, connections, and compiled schedule.
struct Executor {
    nodes: Vec<Option<NodeSlot>>,
    behaviors: Vec<Option<Box<dyn RunNode>>>,
    audio_conns: Vec<Option<AudioConn>>,
    event_conns: Vec<Option<EventConn>>,
    /// Node indices in dependency order.
    schedule: Vec<usize>,
    schedule_dirty: bool,
    frames_moved: u64,
}

impl Executor {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            behaviors: Vec::new(),
            audio_conns: Vec::new(),
            event_conns: Vec::new(),
            schedule: Vec::new(),
            schedule_dirty: true,
            frames_moved: 0,
        }
    }

    fn connect_audio(
        &mut self,
        from: usize,
        from_port: usize,
        to: usize,
        to_port: usize,
        capacity: usize,
    ) -> std::result::Result<(), ConnectError> {
        let from_fmt = {
            let node = self
                .nodes
                .get(from)
                .and_then(Option::as_ref)
                .ok_or(ConnectError::NoSuchNode)?;
            let port = node
                .audio_out
                .get(from_port)
                .ok_or(ConnectError::NoSuchPort)?;
            if port.conn.is_some() {
                return Err(ConnectError::PortInUse);
            }
            port.format
        };
        let to_fmt = {
            let node = self
                .nodes
                .get(to)
                .and_then(Option::as_ref)
                .ok_or(ConnectError::NoSuchNode)?;
            let port = node.audio_in.get(to_port).ok_or(ConnectError::NoSuchPort)?;
            if port.conn.is_some() {
                return Err(ConnectError::PortInUse);
            }
            port.format
        };

        if from_fmt.layout != to_fmt.layout {
            return Err(ConnectError::IncompatibleChannelLayout);
        }
        if from_fmt.sample_rate != to_fmt.sample_rate {
            return Err(ConnectError::IncompatibleSampleRate);
        }
        if self.can_reach(to, from) {
            return Err(ConnectError::CycleDetected);
        }

        let conn_idx = self.audio_conns.len();
        self.audio_conns.push(Some(AudioConn {
            ring: AudioRing::new(from_fmt, capacity),
            from: (from, from_port),
            to: (to, to_port),
        }));
        if let Some(node) = self.nodes[from].as_mut() {
            node.audio_out[from_port].conn = Some(conn_idx);
        }
        if let Some(node) = self.nodes[to].as_mut() {
            node.audio_in[to_port].conn = Some(conn_idx);
        }
        self.schedule_dirty = true;
        Ok(())
    }

    fn connect_events(
        &mut self,
        from: usize,
        from_port: usize,
        to: usize,
        to_port: usize,
    ) -> std::result::Result<(), ConnectError> {
        {
            let node = self
                .nodes
                .get(from)
                .and_then(Option::as_ref)
                .ok_or(ConnectError::NoSuchNode)?;
            let port = node
                .event_out
                .get(from_port)
                .ok_or(ConnectError::NoSuchPort)?;
            if port.is_some() {
                return Err(ConnectError::PortInUse);
            }
        }
        {
            let node = self
                .nodes
                .get(to)
                .and_then(Option::as_ref)
                .ok_or(ConnectError::NoSuchNode)?;
            let port = node.event_in.get(to_port).ok_or(ConnectError::NoSuchPort)?;
            if port.is_some() {
                return Err(ConnectError::PortInUse);
            }
        }
        if self.can_reach(to, from) {
            return Err(ConnectError::CycleDetected);
        }

        let conn_idx = self.event_conns.len();
        self.event_conns.push(Some(EventConn {
            ring: EventRing::new(EventRing::DEFAULT_CAPACITY),
            from: (from, from_port),
            to: (to, to_port),
        }));
        if let Some(node) = self.nodes[from].as_mut() {
            node.event_out[from_port] = Some(conn_idx);
        }
        if let Some(node) = self.nodes[to].as_mut() {
            node.event_in[to_port] = Some(conn_idx);
        }
        self.schedule_dirty = true;
        Ok(())
    }

    fn remove_node(&mut self, idx: usize) {
        for slot in 0..self.audio_conns.len() {
            let touches = self.audio_conns[slot]
                .as_ref()
                .is_some_and(|c| c.from.0 == idx || c.to.0 == idx);
            if !touches {
                continue;
            }
            if let Some(removed) = self.audio_conns[slot].take() {
                if removed.from.0 != idx
                    && let Some(node) = self.nodes[removed.from.0].as_mut()
                {
                    node.audio_out[removed.from.1].conn = None;
                }
                if removed.to.0 != idx
                    && let Some(node) = self.nodes[removed.to.0].as_mut()
                {
                    node.audio_in[removed.to.1].conn = None;
                }
            }
        }
        for slot in 0..self.event_conns.len() {
            let touches = self.event_conns[slot]
                .as_ref()
                .is_some_and(|c| c.from.0 == idx || c.to.0 == idx);
            if !touches {
                continue;
            }
            if let Some(removed) = self.event_conns[slot].take() {
                if removed.from.0 != idx
                    && let Some(node) = self.nodes[removed.from.0].as_mut()
                {
                    node.event_out[removed.from.1] = None;
                }
                if removed.to.0 != idx
                    && let Some(node) = self.nodes[removed.to.0].as_mut()
                {
                    node.event_in[removed.to.1] = None;
                }
            }
        }
        self.nodes[idx] = None;
        self.behaviors[idx] = None;
        self.schedule_dirty = true;
    }

    /// DFS reachability over audio and event edges.
    fn can_reach(&self, from: usize, to: usize) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if visited[current] {
                continue;
            }
            visited[current] = true;
            for conn in self.audio_conns.iter().flatten() {
                if conn.from.0 == current {
                    stack.push(conn.to.0);
                }
            }
            for conn in self.event_conns.iter().flatten() {
                if conn.from.0 == current {
                    stack.push(conn.to.0);
                }
            }
        }
        false
    }

    /// Kahn's topological sort over the live node set.
    fn recompute_schedule(&mut self) {
        let n = self.nodes.len();
        let mut in_degree = vec![0u32; n];
        for conn in self.audio_conns.iter().flatten() {
            in_degree[conn.to.0] += 1;
        }
        for conn in self.event_conns.iter().flatten() {
            in_degree[conn.to.0] += 1;
        }

        let mut queue: Vec<usize> = (0..n)
            .filter(|&i| self.nodes[i].is_some() && in_degree[i] == 0)
            .collect();
        let mut sorted = Vec::with_capacity(n);
        while let Some(idx) = queue.pop() {
            sorted.push(idx);
            for conn in self.audio_conns.iter().flatten() {
                if conn.from.0 == idx {
                    in_degree[conn.to.0] -= 1;
                    if in_degree[conn.to.0] == 0 {
                        queue.push(conn.to.0);
                    }
                }
            }
            for conn in self.event_conns.iter().flatten() {
                if conn.from.0 == idx {
                    in_degree[conn.to.0] -= 1;
                    if in_degree[conn.to.0] == 0 {
                        queue.push(conn.to.0);
                    }
                }
            }
        }
        // Cycles are rejected at connect time, so every live node sorts.
        debug_assert_eq!(
            sorted.len(),
            self.nodes.iter().filter(|n| n.is_some()).count()
        );
        self.schedule = sorted;
        self.schedule_dirty = false;
    }

    fn prepare_start(&mut self, at_whole_notes: f64) {
        if self.schedule_dirty {
            self.recompute_schedule();
        }
        for conn in self.audio_conns.iter_mut().flatten() {
            conn.ring.clear();
        }
        for conn in self.event_conns.iter_mut().flatten() {
            conn.ring.clear();
        }
        for behavior in self.behaviors.iter_mut().flatten() {
            behavior.seek(at_whole_notes);
        }
    }

    /// Runs every node once in dependency order; returns frames moved.
    fn run_cycle(&mut self) -> u64 {
        if self.schedule_dirty {
            self.recompute_schedule();
        }
        self.frames_moved = 0;
        for i in 0..self.schedule.len() {
            let idx = self.schedule[i];
            let Some(mut behavior) = self.behaviors[idx].take() else {
                continue;
            };
            if let Some(node) = self.nodes[idx].as_ref() {
                let mut ports = NodePorts {
                    node,
                    audio: &mut self.audio_conns,
                    events: &mut self.event_conns,
                    frames_moved: &mut self.frames_moved,
                };
                behavior.run(&mut ports);
            }
            self.behaviors[idx] = Some(behavior);
        }
        self.frames_moved
    }

    fn input_fill(&self, node: usize, port: usize) -> usize {
        self.nodes
            .get(node)
            .and_then(Option::as_ref)
            .and_then(|n| n.audio_in.get(port))
            .and_then(|p| p.conn)
            .and_then(|idx| self.audio_conns[idx].as_ref())
            .map_or(0, |c| c.ring.fill_count())
    }

    /// Fills `out` from the sink's input port, cycling the schedule until
    /// the request is satisfied or no node makes progress.
    fn deliver(&mut self, sink: usize, out: &mut [f32], channels: usize) -> usize {
        let requested = out.len() / channels;
        loop {
            if self.input_fill(sink, 0) >= requested {
                break;
            }
            if self.run_cycle() == 0 {
                break;
            }
        }
        let Some(conn_idx) = self
            .nodes
            .get(sink)
            .and_then(Option::as_ref)
            .and_then(|n| n.audio_in.first())
            .and_then(|p| p.conn)
        else {
            return 0;
        };
        match self.audio_conns[conn_idx].as_mut() {
            Some(conn) => conn.ring.pop_into(out),
            None => 0,
        }
    }
}
