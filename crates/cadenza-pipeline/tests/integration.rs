//! Integration tests for the execution engine: connection checking, stock
//! node behaviors, and deterministic offline cycling via `pump`.

use std::sync::{Arc, Mutex};

use cadenza_pipeline::{
    AudioFormat, ChannelLayout, ConnectError, NodePorts, Pipeline, PipelineConfig, PortSpec,
    RunNode,
};

/// Emits a constant sample value, filling all free output space each cycle.
struct ConstSource {
    scratch: Vec<f32>,
}

impl ConstSource {
    fn new(value: f32, format: AudioFormat, ring_frames: usize) -> Self {
        Self {
            scratch: vec![value; ring_frames * format.channels()],
        }
    }
}

impl RunNode for ConstSource {
    fn run(&mut self, ports: &mut NodePorts<'_>) {
        let channels = ports.out_format(0).channels();
        let free = ports.out_free(0);
        ports.write(0, &self.scratch[..free * channels]);
    }
}

/// Collects everything arriving on its input port.
struct Capture {
    collected: Arc<Mutex<Vec<f32>>>,
    scratch: Vec<f32>,
}

impl Capture {
    fn new(collected: Arc<Mutex<Vec<f32>>>, format: AudioFormat, ring_frames: usize) -> Self {
        Self {
            collected,
            scratch: vec![0.0; ring_frames * format.channels()],
        }
    }
}

impl RunNode for Capture {
    fn run(&mut self, ports: &mut NodePorts<'_>) {
        let channels = ports.in_format(0).channels();
        let fill = ports.in_fill(0);
        if fill == 0 {
            return;
        }
        let got = ports.read(0, &mut self.scratch[..fill * channels]);
        self.collected
            .lock()
            .unwrap()
            .extend_from_slice(&self.scratch[..got * channels]);
    }
}

fn test_pipeline() -> Pipeline {
    Pipeline::new(PipelineConfig::default())
}

#[test]
fn incompatible_rates_report_their_own_code() {
    let mut pipeline = test_pipeline();
    let odd = AudioFormat::new(44100, ChannelLayout::Stereo);

    let src = pipeline.create_node(
        "src",
        &[PortSpec::AudioOut(odd)],
        Box::new(ConstSource::new(0.0, odd, pipeline.ring_frames())),
    );
    let mixer = pipeline.create_mixer(1);

    assert_eq!(
        pipeline.connect_audio(src, 0, mixer, 0),
        Err(ConnectError::IncompatibleSampleRate)
    );
}

#[test]
fn incompatible_layouts_report_their_own_code() {
    let mut pipeline = test_pipeline();
    let mono = AudioFormat::new(48000, ChannelLayout::Mono);

    let src = pipeline.create_node(
        "src",
        &[PortSpec::AudioOut(mono)],
        Box::new(ConstSource::new(0.0, mono, pipeline.ring_frames())),
    );
    let mixer = pipeline.create_mixer(1);

    assert_eq!(
        pipeline.connect_audio(src, 0, mixer, 0),
        Err(ConnectError::IncompatibleChannelLayout)
    );
}

#[test]
fn double_connect_is_rejected() {
    let mut pipeline = test_pipeline();
    let nominal = pipeline.nominal_format();
    let frames = pipeline.ring_frames();

    let a = pipeline.create_node(
        "a",
        &[PortSpec::AudioOut(nominal)],
        Box::new(ConstSource::new(0.1, nominal, frames)),
    );
    let b = pipeline.create_node(
        "b",
        &[PortSpec::AudioOut(nominal)],
        Box::new(ConstSource::new(0.2, nominal, frames)),
    );
    let mixer = pipeline.create_mixer(1);

    assert_eq!(pipeline.connect_audio(a, 0, mixer, 0), Ok(()));
    assert_eq!(
        pipeline.connect_audio(b, 0, mixer, 0),
        Err(ConnectError::PortInUse)
    );
}

#[test]
fn mixer_sums_its_inputs() {
    let mut pipeline = test_pipeline();
    let nominal = pipeline.nominal_format();
    let frames = pipeline.ring_frames();

    let a = pipeline.create_node(
        "a",
        &[PortSpec::AudioOut(nominal)],
        Box::new(ConstSource::new(0.25, nominal, frames)),
    );
    let b = pipeline.create_node(
        "b",
        &[PortSpec::AudioOut(nominal)],
        Box::new(ConstSource::new(0.5, nominal, frames)),
    );
    let mixer = pipeline.create_mixer(2);
    let collected = Arc::new(Mutex::new(Vec::new()));
    let sink = pipeline.create_node(
        "capture",
        &[PortSpec::AudioIn(nominal)],
        Box::new(Capture::new(Arc::clone(&collected), nominal, frames)),
    );

    pipeline.connect_audio(a, 0, mixer, 0).unwrap();
    pipeline.connect_audio(b, 0, mixer, 1).unwrap();
    pipeline.connect_audio(mixer, 0, sink, 0).unwrap();
    assert_eq!(pipeline.connected_inputs(mixer), 2);

    for _ in 0..3 {
        pipeline.pump();
    }

    let samples = collected.lock().unwrap();
    assert!(!samples.is_empty());
    assert!(samples.iter().all(|&s| (s - 0.75).abs() < 1e-6));
}

#[test]
fn resampler_bridges_rate_and_layout() {
    let mut pipeline = test_pipeline();
    let nominal = pipeline.nominal_format();
    let frames = pipeline.ring_frames();
    let source_fmt = AudioFormat::new(24000, ChannelLayout::Mono);

    let src = pipeline.create_node(
        "src",
        &[PortSpec::AudioOut(source_fmt)],
        Box::new(ConstSource::new(0.5, source_fmt, frames)),
    );
    let resampler = pipeline.create_resampler(source_fmt, nominal);
    let collected = Arc::new(Mutex::new(Vec::new()));
    let sink = pipeline.create_node(
        "capture",
        &[PortSpec::AudioIn(nominal)],
        Box::new(Capture::new(Arc::clone(&collected), nominal, frames)),
    );

    pipeline.connect_audio(src, 0, resampler, 0).unwrap();
    pipeline.connect_audio(resampler, 0, sink, 0).unwrap();

    for _ in 0..4 {
        pipeline.pump();
    }

    let samples = collected.lock().unwrap();
    // Constant input resamples to the same constant, duplicated to stereo.
    assert!(samples.len() >= 2);
    assert!(samples.iter().all(|&s| (s - 0.5).abs() < 1e-4));
}

#[test]
fn cycles_are_rejected_at_connect_time() {
    let mut pipeline = test_pipeline();
    let nominal = pipeline.nominal_format();
    let frames = pipeline.ring_frames();

    let a = pipeline.create_node(
        "a",
        &[PortSpec::AudioIn(nominal), PortSpec::AudioOut(nominal)],
        Box::new(ConstSource::new(0.0, nominal, frames)),
    );
    let b = pipeline.create_node(
        "b",
        &[PortSpec::AudioIn(nominal), PortSpec::AudioOut(nominal)],
        Box::new(ConstSource::new(0.0, nominal, frames)),
    );

    assert_eq!(pipeline.connect_audio(a, 0, b, 0), Ok(()));
    assert_eq!(
        pipeline.connect_audio(b, 0, a, 0),
        Err(ConnectError::CycleDetected)
    );
}

#[test]
fn destroying_a_node_frees_its_peer_ports() {
    let mut pipeline = test_pipeline();
    let nominal = pipeline.nominal_format();
    let frames = pipeline.ring_frames();

    let src = pipeline.create_node(
        "src",
        &[PortSpec::AudioOut(nominal)],
        Box::new(ConstSource::new(0.1, nominal, frames)),
    );
    let mixer = pipeline.create_mixer(1);
    pipeline.connect_audio(src, 0, mixer, 0).unwrap();
    assert_eq!(pipeline.connected_inputs(mixer), 1);
    assert_eq!(pipeline.next_free_audio_input(mixer), None);

    pipeline.destroy_node(src).unwrap();
    assert_eq!(pipeline.connected_inputs(mixer), 0);
    assert_eq!(pipeline.next_free_audio_input(mixer), Some(0));
}
