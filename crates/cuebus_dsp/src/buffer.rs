//! Planar Channel Buffers
//!
//! Fixed-capacity, non-interleaved sample storage: channel `c` occupies
//! `data[c * frames .. (c + 1) * frames]`. Buffers are allocated once on the
//! control thread and only cleared/overwritten on the audio thread.

/// Planar multi-channel buffer with fixed channel and frame capacity
#[derive(Debug, Clone)]
pub struct ChannelBuffer {
    data: Vec<f32>,
    channels: usize,
    frames: usize,
}

impl ChannelBuffer {
    /// Allocate a zeroed buffer. Not real-time safe.
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            data: vec![0.0; channels * frames],
            channels,
            frames,
        }
    }

    /// Build a buffer from per-channel sample vectors (test and offline use).
    ///
    /// Shorter channels are zero-padded to the longest one.
    pub fn from_channels(channels: &[Vec<f32>]) -> Self {
        let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
        let mut buffer = Self::new(channels.len(), frames);
        for (ch, samples) in channels.iter().enumerate() {
            buffer.channel_mut(ch)[..samples.len()].copy_from_slice(samples);
        }
        buffer
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frame capacity per channel
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Read access to one channel. Out-of-range channels yield an empty slice.
    #[inline]
    pub fn channel(&self, channel: usize) -> &[f32] {
        if channel >= self.channels {
            return &[];
        }
        let start = channel * self.frames;
        &self.data[start..start + self.frames]
    }

    /// Write access to one channel. Out-of-range channels yield an empty slice.
    #[inline]
    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        if channel >= self.channels {
            return &mut [];
        }
        let start = channel * self.frames;
        &mut self.data[start..start + self.frames]
    }

    /// Zero the whole buffer
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    /// Zero the first `num_frames` frames of every channel
    #[inline]
    pub fn clear_frames(&mut self, num_frames: usize) {
        let n = num_frames.min(self.frames);
        for channel in self.data.chunks_exact_mut(self.frames.max(1)) {
            channel[..n].fill(0.0);
        }
    }

    /// Copy the first `num_frames` frames of `channels` channels into a
    /// planar destination laid out with stride `num_frames`.
    ///
    /// Destination channels beyond this buffer's channel count are zeroed.
    pub fn copy_to_planar(&self, dest: &mut [f32], channels: usize, num_frames: usize) {
        let n = num_frames.min(self.frames);
        for (ch, out) in dest.chunks_mut(num_frames.max(1)).take(channels).enumerate() {
            let len = n.min(out.len());
            if ch < self.channels {
                out[..len].copy_from_slice(&self.channel(ch)[..len]);
                out[len..].fill(0.0);
            } else {
                out.fill(0.0);
            }
        }
    }

    /// Peak absolute value across the first `num_frames` frames of a channel
    pub fn peak(&self, channel: usize, num_frames: usize) -> f32 {
        let samples = self.channel(channel);
        let n = num_frames.min(samples.len());
        samples[..n].iter().fold(0.0_f32, |peak, s| peak.max(s.abs()))
    }
}
