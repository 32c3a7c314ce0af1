//! DSP Error Types

use thiserror::Error;

/// Errors reported by control-plane setters on the routing primitives.
///
/// The audio path never produces these; invalid indices there are ignored.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DspError {
    #[error("Invalid input index: {index} (matrix has {count} inputs)")]
    InvalidInput { index: usize, count: usize },

    #[error("Invalid output index: {index} (matrix has {count} outputs)")]
    InvalidOutput { index: usize, count: usize },

    #[error("Level must be a finite number, got {0}")]
    InvalidLevel(f32),

    #[error("Matrix size {inputs}x{outputs} exceeds capacity {max_inputs}x{max_outputs}")]
    CapacityExceeded {
        inputs: usize,
        outputs: usize,
        max_inputs: usize,
        max_outputs: usize,
    },
}
