//! Monitor ("spy") node: pass-through, sole writer of the transport.

use std::sync::Arc;

use cadenza_pipeline::{NodePorts, RunNode, Tempo};

use crate::transport::SharedTransport;

/// Sits directly before the master sink, copies audio through unchanged,
/// and advances the transport by the frames it actually moved.
///
/// Its input fill reflects true downstream demand, which is why this node
/// — and not any source — owns position advancement: the play head tracks
/// frames *delivered* toward the sink, never frames merely requested
/// upstream.
pub(crate) struct Monitor {
    transport: Arc<SharedTransport>,
    whole_notes_per_frame: f64,
    scratch: Vec<f32>,
}

impl Monitor {
    pub fn new(
        transport: Arc<SharedTransport>,
        tempo: Tempo,
        sample_rate: u32,
        channels: usize,
        ring_frames: usize,
    ) -> Self {
        Self {
            transport,
            whole_notes_per_frame: tempo.whole_notes_per_frame(sample_rate),
            scratch: vec![0.0; ring_frames * channels],
        }
    }
}

impl RunNode for Monitor {
    fn run(&mut self, ports: &mut NodePorts<'_>) {
        let channels = ports.in_format(0).channels();
        // The monitor persists across rebuilds while port rings are sized
        // per rebuild; cap at the scratch capacity and let the remainder
        // move next cycle.
        let frames = ports
            .in_fill(0)
            .min(ports.out_free(0))
            .min(self.scratch.len() / channels);
        if frames == 0 {
            return;
        }
        let samples = frames * channels;
        ports.read(0, &mut self.scratch[..samples]);
        ports.write(0, &self.scratch[..samples]);

        if self.transport.is_playing() {
            self.transport
                .advance(frames as f64 * self.whole_notes_per_frame);
            self.transport.mark_position_changed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_pipeline::{Pipeline, PipelineConfig, PortSpec};

    struct Feed {
        block: Vec<f32>,
    }

    impl RunNode for Feed {
        fn run(&mut self, ports: &mut NodePorts<'_>) {
            let channels = ports.out_format(0).channels();
            let free = ports.out_free(0).min(self.block.len() / channels);
            ports.write(0, &self.block[..free * channels]);
        }
    }

    struct Drain {
        take_frames: usize,
        scratch: Vec<f32>,
    }

    impl RunNode for Drain {
        fn run(&mut self, ports: &mut NodePorts<'_>) {
            let channels = ports.in_format(0).channels();
            let frames = ports.in_fill(0).min(self.take_frames);
            ports.read(0, &mut self.scratch[..frames * channels]);
        }
    }

    /// The transport must advance by the frames delivered downstream, not
    /// by the (larger) amount produced upstream.
    #[test]
    fn advances_by_delivered_frames_only() {
        let config = PipelineConfig::default();
        let mut pipeline = Pipeline::new(config);
        let nominal = pipeline.nominal_format();
        let ring = pipeline.ring_frames();
        let transport = Arc::new(SharedTransport::new());
        transport.set_playing(true);

        let feed = pipeline.create_node(
            "feed",
            &[PortSpec::AudioOut(nominal)],
            Box::new(Feed {
                block: vec![0.0; ring * nominal.channels()],
            }),
        );
        let monitor = pipeline.create_node(
            "monitor",
            &[PortSpec::AudioIn(nominal), PortSpec::AudioOut(nominal)],
            Box::new(Monitor::new(
                Arc::clone(&transport),
                config.tempo,
                config.sample_rate,
                nominal.channels(),
                ring,
            )),
        );
        // A sink that accepts only 100 frames per cycle: downstream demand
        // is the limiting factor after the first cycle fills the rings.
        let sink = pipeline.create_node(
            "drain",
            &[PortSpec::AudioIn(nominal)],
            Box::new(Drain {
                take_frames: 100,
                scratch: vec![0.0; ring * nominal.channels()],
            }),
        );
        pipeline.connect_audio(feed, 0, monitor, 0).unwrap();
        pipeline.connect_audio(monitor, 0, sink, 0).unwrap();

        // First cycle fills the monitor's output ring completely.
        pipeline.pump();
        let after_fill = transport.play_head();
        assert!(after_fill > 0.0);

        // Steady state: the drain frees exactly 100 frames per cycle, so
        // the monitor moves exactly 100 frames per cycle.
        pipeline.pump();
        let before = transport.play_head();
        pipeline.pump();
        let delta = transport.play_head() - before;
        let expected = config.tempo.frames_to_whole_notes(100, config.sample_rate);
        assert!((delta - expected).abs() < 1e-12);
    }

    #[test]
    fn does_not_advance_when_paused() {
        let config = PipelineConfig::default();
        let mut pipeline = Pipeline::new(config);
        let nominal = pipeline.nominal_format();
        let ring = pipeline.ring_frames();
        let transport = Arc::new(SharedTransport::new());

        let feed = pipeline.create_node(
            "feed",
            &[PortSpec::AudioOut(nominal)],
            Box::new(Feed {
                block: vec![0.0; ring * nominal.channels()],
            }),
        );
        let monitor = pipeline.create_node(
            "monitor",
            &[PortSpec::AudioIn(nominal), PortSpec::AudioOut(nominal)],
            Box::new(Monitor::new(
                Arc::clone(&transport),
                config.tempo,
                config.sample_rate,
                nominal.channels(),
                ring,
            )),
        );
        let sink = pipeline.create_node(
            "drain",
            &[PortSpec::AudioIn(nominal)],
            Box::new(Drain {
                take_frames: usize::MAX,
                scratch: vec![0.0; ring * nominal.channels()],
            }),
        );
        pipeline.connect_audio(feed, 0, monitor, 0).unwrap();
        pipeline.connect_audio(monitor, 0, sink, 0).unwrap();

        pipeline.pump();
        pipeline.pump();
        assert_eq!(transport.play_head(), 0.0);
    }
}
