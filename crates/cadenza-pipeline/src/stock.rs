//! Stock node behaviors shipped with the engine: mixer, resampler, and
//! the device sink placeholder.

use crate::format::{AudioFormat, ChannelLayout};
use crate::node::{NodePorts, RunNode};

/// Sums N audio inputs into one output.
///
/// All ports share the pipeline's nominal format. A cycle moves
/// `min(every input's fill, output free)` frames, so the mixer advances in
/// lock-step with its slowest producer; sources guarantee forward progress
/// by silence-filling after exhaustion. A mixer with zero inputs emits
/// silence, keeping the downstream sink fed.
pub(crate) struct Mixer {
    scratch: Vec<f32>,
    acc: Vec<f32>,
}

impl Mixer {
    pub fn new(channels: usize, ring_frames: usize) -> Self {
        Self {
            scratch: vec![0.0; ring_frames * channels],
            acc: vec![0.0; ring_frames * channels],
        }
    }
}

impl RunNode for Mixer {
    fn run(&mut self, ports: &mut NodePorts<'_>) {
        let inputs = ports.audio_in_count();
        let channels = ports.out_format(0).channels();

        let mut frames = ports.out_free(0);
        if inputs == 0 {
            ports.write_silence(0, frames);
            return;
        }
        for port in 0..inputs {
            frames = frames.min(ports.in_fill(port));
        }
        if frames == 0 {
            return;
        }

        let samples = frames * channels;
        self.acc[..samples].fill(0.0);
        for port in 0..inputs {
            let got = ports.read(port, &mut self.scratch[..samples]);
            debug_assert_eq!(got, frames);
            for (dst, src) in self.acc[..samples].iter_mut().zip(&self.scratch[..samples]) {
                *dst += *src;
            }
        }
        ports.write(0, &self.acc[..samples]);
    }
}

/// Converts between differing sample rates and/or channel layouts on a
/// single edge.
///
/// Input frames are normalized to stereo working frames in a small FIFO;
/// output frames are produced by linear interpolation at the rate ratio and
/// mapped onto the output layout (mono output averages the pair). The FIFO
/// keeps one frame of history so interpolation is continuous across cycles.
pub(crate) struct Resampler {
    from: AudioFormat,
    to: AudioFormat,
    /// Source frames consumed per produced frame.
    step: f64,
    /// Fractional read position into `fifo`, in frames.
    pos: f64,
    /// Pending input, stereo interleaved.
    fifo: Vec<f32>,
    in_buf: Vec<f32>,
    out_buf: Vec<f32>,
}

impl Resampler {
    pub fn new(from: AudioFormat, to: AudioFormat, ring_frames: usize) -> Self {
        Self {
            from,
            to,
            step: f64::from(from.sample_rate) / f64::from(to.sample_rate),
            pos: 0.0,
            fifo: Vec::with_capacity((ring_frames + 2) * 2),
            in_buf: vec![0.0; ring_frames * from.channels()],
            out_buf: vec![0.0; ring_frames * to.channels()],
        }
    }

    fn fifo_frames(&self) -> usize {
        self.fifo.len() / 2
    }
}

impl RunNode for Resampler {
    fn run(&mut self, ports: &mut NodePorts<'_>) {
        // Pull whatever input fits the FIFO, normalized to stereo frames.
        let in_ch = self.from.channels();
        let room = self.fifo.capacity() / 2 - self.fifo_frames();
        let pull = ports.in_fill(0).min(room).min(self.in_buf.len() / in_ch);
        if pull > 0 {
            let got = ports.read(0, &mut self.in_buf[..pull * in_ch]);
            for frame in self.in_buf[..got * in_ch].chunks_exact(in_ch) {
                match self.from.layout {
                    ChannelLayout::Mono => {
                        self.fifo.push(frame[0]);
                        self.fifo.push(frame[0]);
                    }
                    ChannelLayout::Stereo => {
                        self.fifo.push(frame[0]);
                        self.fifo.push(frame[1]);
                    }
                }
            }
        }

        // Produce as much output as interpolation history allows.
        let out_ch = self.to.channels();
        let free = ports.out_free(0).min(self.out_buf.len() / out_ch);
        let mut produced = 0;
        while produced < free {
            let idx = self.pos as usize;
            if idx + 1 >= self.fifo_frames() {
                break;
            }
            let frac = (self.pos - idx as f64) as f32;
            let left = self.fifo[idx * 2] + frac * (self.fifo[idx * 2 + 2] - self.fifo[idx * 2]);
            let right =
                self.fifo[idx * 2 + 1] + frac * (self.fifo[idx * 2 + 3] - self.fifo[idx * 2 + 1]);
            match self.to.layout {
                ChannelLayout::Mono => {
                    self.out_buf[produced] = (left + right) * 0.5;
                }
                ChannelLayout::Stereo => {
                    self.out_buf[produced * 2] = left;
                    self.out_buf[produced * 2 + 1] = right;
                }
            }
            produced += 1;
            self.pos += self.step;
        }
        if produced > 0 {
            ports.write(0, &self.out_buf[..produced * out_ch]);
        }

        // Drop fully consumed frames, keeping the interpolation anchor.
        let consumed = (self.pos as usize).min(self.fifo_frames().saturating_sub(1));
        if consumed > 0 {
            self.fifo.drain(..consumed * 2);
            self.pos -= consumed as f64;
        }
    }

    fn seek(&mut self, _pos_whole_notes: f64) {
        self.fifo.clear();
        self.pos = 0.0;
    }
}

/// Placeholder behavior for the hardware sink node.
///
/// The device node's input ring is drained by the stream callback itself,
/// not by a scheduled behavior, so its turn in the cycle is a no-op.
pub(crate) struct DeviceSink;

impl RunNode for DeviceSink {
    fn run(&mut self, _ports: &mut NodePorts<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resampler_halves_frame_count_at_2_to_1() {
        let from = AudioFormat::new(88200, ChannelLayout::Stereo);
        let to = AudioFormat::new(44100, ChannelLayout::Stereo);
        let rs = Resampler::new(from, to, 1024);
        assert!((rs.step - 2.0).abs() < 1e-12);
    }
}
