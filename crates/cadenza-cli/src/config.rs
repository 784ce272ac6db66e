//! Session configuration loaded from TOML.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use cadenza_graph::{ChannelLayout, PipelineConfig, SampleDepth, Tempo};
use serde::Deserialize;

/// User-facing session settings, loadable via `--config session.toml`.
///
/// ```toml
/// sample_rate = 48000
/// channels = 2
/// latency_ms = 100
/// bpm = 120.0
/// device = "USB Audio"
/// bit_depth = 32
/// ```
///
/// Missing fields take the defaults below.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Nominal sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count (1 or 2).
    pub channels: u16,
    /// Pipeline latency target in milliseconds.
    pub latency_ms: u64,
    /// Tempo for the whole-note mapping.
    pub bpm: f64,
    /// Preferred output device (index or name); platform default if unset.
    pub device: Option<String>,
    /// Render output depth: 16, 24, or 32 (float).
    pub bit_depth: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            latency_ms: 100,
            bpm: 120.0,
            device: None,
            bit_depth: 32,
        }
    }
}

impl SessionConfig {
    /// Loads settings from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.as_ref().display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("parsing {}", path.as_ref().display()))?;
        Ok(config)
    }

    /// Converts into the engine's session parameters.
    pub fn pipeline(&self) -> anyhow::Result<PipelineConfig> {
        let layout = ChannelLayout::from_channels(self.channels)
            .ok_or_else(|| anyhow::anyhow!("unsupported channel count: {}", self.channels))?;
        Ok(PipelineConfig {
            sample_rate: self.sample_rate,
            layout,
            latency: Duration::from_millis(self.latency_ms),
            tempo: Tempo::new(self.bpm),
        })
    }

    /// The render output depth.
    pub fn depth(&self) -> anyhow::Result<SampleDepth> {
        match self.bit_depth {
            16 => Ok(SampleDepth::Pcm16),
            24 => Ok(SampleDepth::Pcm24),
            32 => Ok(SampleDepth::Float32),
            other => anyhow::bail!("unsupported bit depth: {other} (expected 16, 24, or 32)"),
        }
    }
}
