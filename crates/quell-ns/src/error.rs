//! Noise suppressor errors.

/// Error returned by [`NoiseSuppressor`](crate::NoiseSuppressor) operations.
///
/// Every check happens before any state is touched, so a failed call leaves
/// the suppressor exactly as it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NsError {
    /// Sample rate other than 8000, 16000 or 32000 Hz.
    UnsupportedSampleRate { sample_rate_hz: u32 },
    /// Suppression mode outside `0..=3`.
    InvalidPolicy { mode: i32 },
    /// Operation requires a prior successful `init`.
    Uninitialized,
    /// 32 kHz processing called without a high-band frame.
    MissingHighBand,
    /// Frame (or high-band frame) of the wrong length.
    FrameLength { expected: usize, actual: usize },
}

impl std::fmt::Display for NsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::UnsupportedSampleRate { sample_rate_hz } => write!(
                f,
                "unsupported sample rate {sample_rate_hz}; expected 8000, 16000 or 32000",
            ),
            Self::InvalidPolicy { mode } => {
                write!(f, "invalid suppression mode {mode}; expected 0..=3")
            }
            Self::Uninitialized => f.write_str("noise suppressor is not initialized"),
            Self::MissingHighBand => {
                f.write_str("a high-band frame is required at 32000 Hz")
            }
            Self::FrameLength { expected, actual } => {
                write!(f, "frame has {actual} samples; expected {expected}")
            }
        }
    }
}

impl std::error::Error for NsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            NsError::UnsupportedSampleRate {
                sample_rate_hz: 48_000
            }
            .to_string(),
            "unsupported sample rate 48000; expected 8000, 16000 or 32000"
        );
        assert_eq!(
            NsError::FrameLength {
                expected: 160,
                actual: 80
            }
            .to_string(),
            "frame has 80 samples; expected 160"
        );
        assert_eq!(
            NsError::InvalidPolicy { mode: 7 }.to_string(),
            "invalid suppression mode 7; expected 0..=3"
        );
    }
}
