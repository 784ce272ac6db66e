//! Audio port formats: channel layout and sample rate.

use std::fmt;

/// Channel layout carried by an audio port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    /// Single channel.
    Mono,
    /// Two channels, interleaved left/right.
    Stereo,
}

impl ChannelLayout {
    /// Number of channels in this layout.
    #[inline]
    pub fn channels(self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    /// Maps a raw channel count onto a layout.
    ///
    /// Counts above two have no dedicated layout here; callers downmix
    /// first. Returns `None` for zero or unsupported counts.
    pub fn from_channels(count: u16) -> Option<Self> {
        match count {
            1 => Some(ChannelLayout::Mono),
            2 => Some(ChannelLayout::Stereo),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelLayout::Mono => write!(f, "mono"),
            ChannelLayout::Stereo => write!(f, "stereo"),
        }
    }
}

/// The complete format of an audio port: sample rate plus channel layout.
///
/// Two ports connect directly only when their formats are equal; the
/// distinct mismatch codes in
/// [`ConnectError`](crate::ConnectError) tell the caller which dimension
/// differed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel layout.
    pub layout: ChannelLayout,
}

impl AudioFormat {
    /// Creates a format from a rate and layout.
    pub fn new(sample_rate: u32, layout: ChannelLayout) -> Self {
        Self {
            sample_rate,
            layout,
        }
    }

    /// Number of interleaved samples per frame.
    #[inline]
    pub fn channels(self) -> usize {
        self.layout.channels()
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz {}", self.sample_rate, self.layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_counts() {
        assert_eq!(ChannelLayout::Mono.channels(), 1);
        assert_eq!(ChannelLayout::Stereo.channels(), 2);
        assert_eq!(ChannelLayout::from_channels(2), Some(ChannelLayout::Stereo));
        assert_eq!(ChannelLayout::from_channels(6), None);
        assert_eq!(ChannelLayout::from_channels(0), None);
    }
}
