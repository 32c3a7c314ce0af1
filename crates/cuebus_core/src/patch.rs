//! Output Patch
//!
//! The second routing stage: bus channels -> physical device outputs.
//! A thin layer over [`CrosspointMatrix`] that adds the patch-specific
//! defaults and helpers.

use cuebus_dsp::{ChannelBuffer, CrosspointMatrix, MatrixSnapshot, BUS_CHANNELS, DEVICE_CHANNELS};

use crate::error::{EngineError, EngineResult};

/// Serializable patch state; no file format is implied
pub type PatchSnapshot = MatrixSnapshot;

/// Global bus -> device routing matrix
#[derive(Debug)]
pub struct OutputPatch {
    matrix: CrosspointMatrix,
}

impl OutputPatch {
    /// Full-size patch (64 bus channels -> 32 device outputs) with direct routing
    pub fn new() -> Self {
        Self::with_size(BUS_CHANNELS, DEVICE_CHANNELS)
    }

    /// Patch with the given active size, clamped to capacity
    pub fn with_size(bus_channels: usize, device_channels: usize) -> Self {
        let patch = Self {
            matrix: CrosspointMatrix::for_patch(),
        };
        // Clamped, so set_size cannot fail
        let _ = patch.matrix.set_size(
            bus_channels.min(BUS_CHANNELS),
            device_channels.min(DEVICE_CHANNELS),
        );
        patch.matrix.set_direct_routing();
        patch
    }

    pub fn matrix(&self) -> &CrosspointMatrix {
        &self.matrix
    }

    pub fn bus_channels(&self) -> usize {
        self.matrix.num_inputs()
    }

    pub fn device_channels(&self) -> usize {
        self.matrix.num_outputs()
    }

    /// Clear all patch controls and restore 1:1 routing
    pub fn reset_to_default(&self) {
        // Same dimensions, so this only resets controls
        let _ = self
            .matrix
            .set_size(self.bus_channels(), self.device_channels());
        self.matrix.set_direct_routing();
    }

    /// Replace the routing with consecutive stereo pairs:
    /// bus `start_bus + k` -> device `start_device + k`, for every whole
    /// pair that fits on both sides.
    pub fn set_stereo_routing(&self, start_bus: usize, start_device: usize) -> EngineResult<()> {
        if start_bus >= self.bus_channels() || start_device >= self.device_channels() {
            return Err(EngineError::Validation(format!(
                "Stereo routing start ({start_bus}, {start_device}) out of range"
            )));
        }

        self.matrix.clear_all();
        let mut k = 0;
        while start_bus + k + 1 < self.bus_channels() && start_device + k + 1 < self.device_channels()
        {
            self.matrix.set_gain_linear(start_bus + k, start_device + k, 1.0);
            self.matrix
                .set_gain_linear(start_bus + k + 1, start_device + k + 1, 1.0);
            k += 2;
        }
        Ok(())
    }

    /// Set one bus -> device route as a linear gain clamped to `[0, +12 dB]`
    pub fn set_routing(&self, bus: usize, device: usize, level: f32) -> EngineResult<()> {
        self.matrix.try_set_gain_linear(bus, device, level)?;
        Ok(())
    }

    /// Linear gain of one route; zero for out-of-range indices
    pub fn routing(&self, bus: usize, device: usize) -> f32 {
        self.matrix.gain_linear(bus, device)
    }

    pub fn snapshot(&self) -> PatchSnapshot {
        self.matrix.snapshot()
    }

    pub fn restore(&self, snapshot: &PatchSnapshot) -> EngineResult<()> {
        self.matrix.restore(snapshot)?;
        Ok(())
    }

    /// Mix the bus into the device buffer (accumulates)
    #[inline]
    pub fn mix(&self, bus: &ChannelBuffer, device: &mut ChannelBuffer, num_samples: usize) {
        self.matrix.mix(bus, device, num_samples);
    }
}

impl Default for OutputPatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_direct() {
        let patch = OutputPatch::new();
        assert_eq!(patch.bus_channels(), BUS_CHANNELS);
        assert_eq!(patch.device_channels(), DEVICE_CHANNELS);
        for ch in 0..DEVICE_CHANNELS {
            assert_eq!(patch.routing(ch, ch), 1.0);
        }
        assert_eq!(patch.routing(0, 1), 0.0);
        assert_eq!(patch.routing(40, 0), 0.0);
    }

    #[test]
    fn test_with_size_clamps() {
        let patch = OutputPatch::with_size(100, 2);
        assert_eq!(patch.bus_channels(), BUS_CHANNELS);
        assert_eq!(patch.device_channels(), 2);
    }

    #[test]
    fn test_set_routing_clamps_and_validates() {
        let patch = OutputPatch::with_size(8, 2);
        patch.set_routing(3, 1, 0.5).unwrap();
        assert_eq!(patch.routing(3, 1), 0.5);

        patch.set_routing(3, 1, 100.0).unwrap();
        assert!((patch.routing(3, 1) - cuebus_dsp::MAX_GAIN).abs() < 1e-4);

        assert!(patch.set_routing(3, 2, 1.0).is_err());
        assert!(patch.set_routing(8, 0, 1.0).is_err());
    }

    #[test]
    fn test_stereo_routing_offsets() {
        let patch = OutputPatch::with_size(8, 4);
        patch.set_stereo_routing(2, 0).unwrap();

        assert_eq!(patch.routing(0, 0), 0.0);
        assert_eq!(patch.routing(2, 0), 1.0);
        assert_eq!(patch.routing(3, 1), 1.0);
        assert_eq!(patch.routing(4, 2), 1.0);
        assert_eq!(patch.routing(5, 3), 1.0);
        assert_eq!(patch.routing(6, 0), 0.0);

        assert!(patch.set_stereo_routing(0, 4).is_err());
    }

    #[test]
    fn test_reset_to_default() {
        let patch = OutputPatch::with_size(4, 4);
        patch.set_stereo_routing(2, 0).unwrap();
        patch.matrix().mute_output(1, true);
        patch.matrix().set_output_trim(0, -100.0);

        patch.reset_to_default();
        assert_eq!(patch.routing(0, 0), 1.0);
        assert_eq!(patch.routing(2, 0), 0.0);
        assert!(!patch.matrix().is_output_muted(1));
        assert!(patch.matrix().output_trim_db(0).abs() < 1e-5);
    }

    #[test]
    fn test_snapshot_restore() {
        let patch = OutputPatch::with_size(4, 2);
        patch.set_routing(3, 0, 0.5).unwrap();
        let snapshot = patch.snapshot();

        let other = OutputPatch::new();
        other.restore(&snapshot).unwrap();
        assert_eq!(other.bus_channels(), 4);
        assert_eq!(other.device_channels(), 2);
        assert!((other.routing(3, 0) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_mix_direct() {
        let patch = OutputPatch::with_size(4, 2);
        let bus = ChannelBuffer::from_channels(&[vec![0.5; 8], vec![0.25; 8], vec![1.0; 8]]);
        let mut device = ChannelBuffer::new(2, 8);
        patch.mix(&bus, &mut device, 8);
        assert_eq!(device.channel(0)[0], 0.5);
        assert_eq!(device.channel(1)[7], 0.25);
    }
}
