//! Streaming WAV encoding.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use cadenza_pipeline::ChannelLayout;
use hound::{SampleFormat, WavWriter};

use crate::Result;

/// Output sample depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleDepth {
    /// 16-bit integer PCM.
    Pcm16,
    /// 24-bit integer PCM.
    Pcm24,
    /// 32-bit IEEE float.
    Float32,
}

impl SampleDepth {
    fn bits(self) -> u16 {
        match self {
            SampleDepth::Pcm16 => 16,
            SampleDepth::Pcm24 => 24,
            SampleDepth::Float32 => 32,
        }
    }

    fn format(self) -> SampleFormat {
        match self {
            SampleDepth::Float32 => SampleFormat::Float,
            _ => SampleFormat::Int,
        }
    }
}

/// Target container parameters for a render.
#[derive(Clone, Copy, Debug)]
pub struct EncodeSpec {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Output channel layout.
    pub layout: ChannelLayout,
    /// Output sample depth.
    pub depth: SampleDepth,
}

/// Streaming writer for an output container.
///
/// Accepts interleaved `f32` frames and converts to the target depth on
/// the fly. Call [`finalize`](Self::finalize) to patch up the container
/// header; dropping without finalizing relies on the container library's
/// best-effort cleanup.
pub struct EncodeWriter {
    writer: WavWriter<BufWriter<File>>,
    spec: EncodeSpec,
    frames_written: u64,
}

/// Opens a streaming encoder at `path`.
///
/// `tags` is accepted for parity with tag-capable containers; plain PCM WAV
/// has nowhere to store them, so they are ignored here.
pub fn open_encoder<P: AsRef<Path>>(
    path: P,
    spec: EncodeSpec,
    tags: &BTreeMap<String, String>,
) -> Result<EncodeWriter> {
    let _ = tags;
    let wav_spec = hound::WavSpec {
        channels: spec.layout.channels() as u16,
        sample_rate: spec.sample_rate,
        bits_per_sample: spec.depth.bits(),
        sample_format: spec.depth.format(),
    };
    let writer = WavWriter::create(path, wav_spec)?;
    Ok(EncodeWriter {
        writer,
        spec,
        frames_written: 0,
    })
}

impl EncodeWriter {
    /// Appends `frames` interleaved frames from `samples`.
    pub fn write_frames(&mut self, samples: &[f32], frames: usize) -> Result<()> {
        let count = frames * self.spec.layout.channels();
        debug_assert!(samples.len() >= count);
        match self.spec.depth {
            SampleDepth::Float32 => {
                for &sample in &samples[..count] {
                    self.writer.write_sample(sample)?;
                }
            }
            depth => {
                let max_val = (1i32 << (depth.bits() - 1)) as f32;
                for &sample in &samples[..count] {
                    let quantized = (sample * max_val).clamp(-max_val, max_val - 1.0) as i32;
                    self.writer.write_sample(quantized)?;
                }
            }
        }
        self.frames_written += frames as u64;
        Ok(())
    }

    /// Frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// The spec this writer was opened with.
    pub fn spec(&self) -> EncodeSpec {
        self.spec
    }

    /// Finishes the container and flushes the header.
    pub fn finalize(self) -> Result<()> {
        self.writer.finalize()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode;

    #[test]
    fn written_frames_survive_a_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let spec = EncodeSpec {
            sample_rate: 48000,
            layout: ChannelLayout::Stereo,
            depth: SampleDepth::Float32,
        };

        let mut writer = open_encoder(&path, spec, &BTreeMap::new()).unwrap();
        let block: Vec<f32> = (0..64).map(|i| (i as f32) / 64.0).collect();
        writer.write_frames(&block, 32).unwrap();
        assert_eq!(writer.frames_written(), 32);
        writer.finalize().unwrap();

        let data = decode(&path).unwrap();
        assert_eq!(data.total_frames(), 32);
        assert_eq!(data.channel_count(), 2);
        assert_eq!(data.sample_rate, 48000);
    }

    #[test]
    fn pcm16_quantization_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        let spec = EncodeSpec {
            sample_rate: 44100,
            layout: ChannelLayout::Mono,
            depth: SampleDepth::Pcm16,
        };

        let mut writer = open_encoder(&path, spec, &BTreeMap::new()).unwrap();
        writer.write_frames(&[2.0, -2.0, 0.5], 3).unwrap();
        writer.finalize().unwrap();

        let data = decode(&path).unwrap();
        assert_eq!(data.total_frames(), 3);
    }
}
