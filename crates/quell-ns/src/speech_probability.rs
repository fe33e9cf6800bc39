//! Speech probability estimation.
//!
//! The three features are mapped through tanh indicators around their
//! learned thresholds and combined with the learned weights into a frame
//! prior. The per-bin posterior combines the prior odds with the smoothed
//! per-bin likelihood ratio.

use crate::config::{MAGN_LEN_MAX, PRIOR_UPDATE, WIDTH_PR_MAP};
use crate::features::FeatureData;
use crate::threshold_learner::PriorModelParams;

/// Wider map for features sitting in their noise-like region.
const WIDTH_PR_MAP_PAUSE: f32 = 2.0 * WIDTH_PR_MAP;

#[inline]
fn indicator(width: f32, x: f32) -> f32 {
    0.5 * ((width * x).tanh() + 1.0)
}

/// Frame prior and per-bin posterior speech probability.
#[derive(Debug)]
pub(crate) struct SpeechProbabilityModel {
    prior_speech_prob: f32,
    speech_probability: [f32; MAGN_LEN_MAX],
}

impl Default for SpeechProbabilityModel {
    fn default() -> Self {
        Self {
            prior_speech_prob: 0.5,
            speech_probability: [0.0; MAGN_LEN_MAX],
        }
    }
}

impl SpeechProbabilityModel {
    /// Update the prior from the frame features and recompute the posterior
    /// for the `log_lrt.len()` live bins.
    pub(crate) fn update(
        &mut self,
        features: &FeatureData,
        prior: &PriorModelParams,
        log_lrt: &[f32],
    ) {
        let lrt = features.lrt();
        let width = if lrt < prior.lrt_threshold() {
            WIDTH_PR_MAP_PAUSE
        } else {
            WIDTH_PR_MAP
        };
        let indicator0 = indicator(width, lrt - prior.lrt_threshold());

        // Noise is usually flatter than speech; the sign flips the test when
        // the learner saw the reverse.
        let flatness = features.spectral_flatness();
        let sign = prior.flatness_sign();
        let threshold = prior.flatness_threshold();
        let pause = (sign == 1.0 && flatness > threshold) || (sign == -1.0 && flatness < threshold);
        let width = if pause { WIDTH_PR_MAP_PAUSE } else { WIDTH_PR_MAP };
        let indicator1 = indicator(sign * width, threshold - flatness);

        let diff = features.spectral_diff();
        let width = if diff < prior.diff_threshold() {
            WIDTH_PR_MAP_PAUSE
        } else {
            WIDTH_PR_MAP
        };
        let indicator2 = indicator(width, diff - prior.diff_threshold());

        let ind_prior = prior.lrt_weight() * indicator0
            + prior.flatness_weight() * indicator1
            + prior.diff_weight() * indicator2;

        self.prior_speech_prob += PRIOR_UPDATE * (ind_prior - self.prior_speech_prob);
        self.prior_speech_prob = self.prior_speech_prob.clamp(0.01, 1.0);

        let gain_prior = (1.0 - self.prior_speech_prob) / (self.prior_speech_prob + 0.0001);
        for (p, &l) in self.speech_probability.iter_mut().zip(log_lrt) {
            *p = 1.0 / (1.0 + gain_prior * (-l).exp());
        }
    }

    pub(crate) fn prior(&self) -> f32 {
        self.prior_speech_prob
    }

    pub(crate) fn probability(&self, len: usize) -> &[f32] {
        &self.speech_probability[..len]
    }
}
