//! End-to-end tests for the orchestration layer, driven through
//! render-mode sessions so no audio hardware is required.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cadenza_graph::{
    AudioGraph, ChannelLayout, Error, GraphEvent, PipelineConfig, SampleDepth,
};

/// Writes a sine-ish test WAV and returns its path.
fn write_fixture(dir: &Path, name: &str, frames: usize, sample_rate: u32, channels: u16) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for i in 0..frames {
        let sample = (i as f32 * 0.01).sin() * 0.5;
        for _ in 0..channels {
            writer.write_sample(sample).unwrap();
        }
    }
    writer.finalize().unwrap();
    path
}

fn render_session(dir: &Path) -> (AudioGraph, PathBuf) {
    let out = dir.join("render-out.wav");
    let graph = AudioGraph::for_render(
        PipelineConfig::default(),
        &out,
        SampleDepth::Float32,
        &BTreeMap::new(),
    )
    .unwrap();
    (graph, out)
}

fn event_log(graph: &mut AudioGraph) -> Arc<Mutex<Vec<GraphEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    graph.subscribe(Box::new(move |event| {
        sink.lock().unwrap().push(event);
    }));
    log
}

fn count(log: &Arc<Mutex<Vec<GraphEvent>>>, event: GraphEvent) -> usize {
    log.lock().unwrap().iter().filter(|&&e| e == event).count()
}

#[test]
fn rebuild_wires_every_source_to_the_mixer() {
    let dir = tempfile::tempdir().unwrap();
    let matching = write_fixture(dir.path(), "matching.wav", 4800, 48000, 2);
    let odd_rate = write_fixture(dir.path(), "odd.wav", 4410, 44100, 1);
    let (mut graph, _out) = render_session(dir.path());

    assert_eq!(graph.mixer_inputs(), 0);

    graph.add_clip(&matching, 0.0).unwrap();
    assert_eq!(graph.mixer_inputs(), 1);
    assert_eq!(graph.resampler_count(), 0);

    graph.add_clip(&odd_rate, 0.5).unwrap();
    assert_eq!(graph.mixer_inputs(), 2);
    // Exactly one resampler: only the mismatched edge gets one.
    assert_eq!(graph.resampler_count(), 1);
}

#[test]
fn resamplers_never_accumulate_across_rebuilds() {
    let dir = tempfile::tempdir().unwrap();
    let odd_rate = write_fixture(dir.path(), "odd.wav", 2205, 22050, 2);
    let matching = write_fixture(dir.path(), "matching.wav", 4800, 48000, 2);
    let (mut graph, _out) = render_session(dir.path());

    graph.add_clip(&odd_rate, 0.0).unwrap();
    for _ in 0..3 {
        // Each mutation reruns the full rebuild; the mismatched edge must
        // end up with exactly one resampler every time.
        let idx = graph.add_clip(&matching, 1.0).unwrap();
        assert_eq!(graph.resampler_count(), 1);
        graph.remove_clip(idx).unwrap();
        assert_eq!(graph.resampler_count(), 1);
    }
    assert_eq!(graph.mixer_inputs(), 1);
}

#[test]
fn render_completes_with_expected_frames_and_transport_delta() {
    let dir = tempfile::tempdir().unwrap();
    let clip_frames = 4800; // 0.1 s at the nominal rate
    let clip = write_fixture(dir.path(), "clip.wav", clip_frames, 48000, 2);
    let (mut graph, out) = render_session(dir.path());
    let log = event_log(&mut graph);

    graph.add_clip(&clip, 0.0).unwrap();
    graph.start_render().unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    let progress = loop {
        let progress = graph.render_progress().unwrap();
        if progress.complete || progress.failed {
            break progress;
        }
        assert!(Instant::now() < deadline, "render did not complete in time");
        std::thread::sleep(Duration::from_millis(5));
    };
    assert!(progress.complete);
    assert!(!progress.failed);
    assert_eq!(progress.frames_rendered, progress.frames_expected);
    assert_eq!(progress.frames_expected, clip_frames as u64);

    // The transport advanced by at least the rendered frames' whole-note
    // equivalent (0.05 whole notes for 4800 frames at 48 kHz, 120 BPM).
    // The monitor may deliver a little beyond the capture point — frames
    // buffered toward the sink still count as delivered — but it is
    // bounded by the port capacity. Exact per-frame accounting is covered
    // by the monitor's own tests.
    let expected_wn = PipelineConfig::default()
        .tempo
        .frames_to_whole_notes(clip_frames as u64, 48000);
    assert!(graph.play_head() >= expected_wn - 1e-9);
    assert!(graph.play_head() < expected_wn * 4.0);

    let frames = graph.finish_render().unwrap();
    assert_eq!(frames, clip_frames as u64);
    assert_eq!(count(&log, GraphEvent::RenderComplete), 1);

    let decoded = cadenza_codec::decode(&out).unwrap();
    assert_eq!(decoded.total_frames(), clip_frames as u64);
    assert_eq!(decoded.layout, ChannelLayout::Stereo);
}

#[test]
fn render_resamples_mismatched_clips_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    // 0.1 s of mono 22.05 kHz audio; the render output is stereo 48 kHz.
    let clip = write_fixture(dir.path(), "clip.wav", 2205, 22050, 1);
    let (mut graph, out) = render_session(dir.path());

    graph.add_clip(&clip, 0.0).unwrap();
    assert_eq!(graph.resampler_count(), 1);
    graph.start_render().unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let progress = graph.render_progress().unwrap();
        if progress.complete {
            break;
        }
        assert!(!progress.failed);
        assert!(Instant::now() < deadline, "render did not complete in time");
        std::thread::sleep(Duration::from_millis(5));
    }
    let frames = graph.finish_render().unwrap();

    let decoded = cadenza_codec::decode(&out).unwrap();
    assert_eq!(decoded.total_frames(), frames);
    // 0.1 s at the nominal rate, within timeline rounding.
    assert!((frames as i64 - 4800).abs() <= 1);
}

#[test]
fn stop_resets_to_zero_and_restart_resumes_from_play_position() {
    let dir = tempfile::tempdir().unwrap();
    let clip = write_fixture(dir.path(), "clip.wav", 4800, 48000, 2);
    let (mut graph, _out) = render_session(dir.path());
    graph.add_clip(&clip, 0.0).unwrap();

    graph.set_play_head(2.0);
    graph.play();
    assert!(graph.is_playing());

    // Seek away; restart must return to the position recorded at play().
    graph.set_play_head(5.0);
    graph.restart().unwrap();
    assert!((graph.play_head() - 2.0).abs() < 1e-12);
    assert!(graph.is_playing());

    graph.stop().unwrap();
    assert_eq!(graph.play_head(), 0.0);
    assert!(!graph.is_playing());
}

#[test]
fn pause_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let (mut graph, _out) = render_session(dir.path());
    let log = event_log(&mut graph);

    graph.play();
    assert_eq!(count(&log, GraphEvent::PlayingChanged), 1);
    graph.pause();
    assert_eq!(count(&log, GraphEvent::PlayingChanged), 2);
    graph.pause();
    assert_eq!(count(&log, GraphEvent::PlayingChanged), 2);
    // play() while already playing is equally a no-op.
    graph.play();
    graph.play();
    assert_eq!(count(&log, GraphEvent::PlayingChanged), 3);
}

#[test]
fn flush_events_coalesces_position_notifications() {
    let dir = tempfile::tempdir().unwrap();
    let clip = write_fixture(dir.path(), "clip.wav", 4800, 48000, 2);
    let (mut graph, _out) = render_session(dir.path());
    graph.add_clip(&clip, 0.0).unwrap();
    let log = event_log(&mut graph);

    graph.start_render().unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    while !graph.render_progress().unwrap().complete {
        assert!(Instant::now() < deadline);
        std::thread::sleep(Duration::from_millis(5));
    }
    // Stop the engine so no further advances race the assertions below.
    graph.finish_render().unwrap();

    // Many scheduling cycles advanced the position; one flush delivers
    // exactly one coalesced notification, the next delivers none.
    let before = count(&log, GraphEvent::PlayHeadChanged);
    graph.flush_events();
    assert_eq!(count(&log, GraphEvent::PlayHeadChanged), before + 1);
    graph.flush_events();
    assert_eq!(count(&log, GraphEvent::PlayHeadChanged), before + 1);
}

#[test]
fn backend_disconnect_recovery_preserves_position_and_wiring() {
    let dir = tempfile::tempdir().unwrap();
    let clip = write_fixture(dir.path(), "clip.wav", 4800, 48000, 2);
    let (mut graph, _out) = render_session(dir.path());
    graph.add_clip(&clip, 0.0).unwrap();

    graph.set_play_head(1.5);
    graph.recover_backend_disconnect().unwrap();

    assert!((graph.play_head() - 1.5).abs() < 1e-12);
    assert_eq!(graph.mixer_inputs(), 1);
    assert!(graph.is_engine_running());
}

#[test]
fn stream_recovery_rebuilds_with_new_latency() {
    let dir = tempfile::tempdir().unwrap();
    let (mut graph, _out) = render_session(dir.path());

    graph.recover_stream(Duration::from_millis(250)).unwrap();
    assert_eq!(graph.latency(), Duration::from_millis(250));
    assert!(graph.is_engine_running());
}

#[test]
fn render_mode_rejects_preview_and_double_start() {
    let dir = tempfile::tempdir().unwrap();
    let clip = write_fixture(dir.path(), "clip.wav", 480, 48000, 2);
    let (mut graph, _out) = render_session(dir.path());

    assert!(matches!(
        graph.load_preview(&clip),
        Err(Error::NotPlaybackMode)
    ));
    assert!(matches!(graph.start_render(), Err(Error::NothingToRender)));

    graph.add_clip(&clip, 0.0).unwrap();
    graph.start_render().unwrap();
    assert!(matches!(
        graph.start_render(),
        Err(Error::RenderAlreadyStarted)
    ));
}

#[test]
fn seek_does_not_stop_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let (mut graph, _out) = render_session(dir.path());
    let log = event_log(&mut graph);

    assert!(graph.is_engine_running());
    graph.set_play_head(3.25);
    assert!(graph.is_engine_running());
    assert!((graph.play_head() - 3.25).abs() < 1e-12);
    assert_eq!(count(&log, GraphEvent::PlayHeadChanged), 1);

    // Negative seeks clamp to zero.
    graph.set_play_head(-1.0);
    assert_eq!(graph.play_head(), 0.0);
}
