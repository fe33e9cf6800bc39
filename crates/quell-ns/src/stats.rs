//! Noise suppressor statistics.

use crate::threshold_learner::PriorModelParams;

/// Snapshot of the suppressor's adaptive state.
///
/// Returned by [`NoiseSuppressor::stats()`](crate::NoiseSuppressor::stats).
#[derive(Debug, Clone, Default)]
pub struct NsStats {
    /// Non-silent frames analyzed since initialization.
    pub analyzed_frames: u32,
    /// Frame-level prior speech probability in `[0.01, 1.0]`.
    pub prior_speech_probability: f32,
    /// Number of times the feature thresholds were re-learned.
    pub threshold_extractions: u32,
    /// Gain applied to the high band by the last processed frame.
    ///
    /// `None` below 32 kHz and before the first processed non-silent frame.
    pub high_band_gain: Option<f32>,
    /// Current feature thresholds and weights.
    pub prior_model: PriorModelParams,
}
