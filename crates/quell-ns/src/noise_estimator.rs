//! Noise spectrum estimation.
//!
//! The quantile trackers provide the long-term noise floor. For the first
//! [`SHORT_STARTUP_BLOCKS`] frames their output is blended with a parametric
//! model: a white noise level plus a pink noise `num / bin^exp` spectrum fit
//! by least squares in the log-log domain. After the speech probability of a
//! frame is known, the estimate is smoothed with probability-dependent time
//! constants, and bins that are most likely noise update a conservative
//! noise-only template.

use crate::config::{
    GAMMA_PAUSE, MAGN_LEN_MAX, NOISE_UPDATE, PROB_RANGE, SHORT_STARTUP_BLOCKS, SPEECH_UPDATE,
    START_BAND,
};
use crate::quantile_noise_estimator::QuantileNoiseEstimator;

/// Least-squares fit of `ln(magn) = a - b ln(bin)` over the upper bins.
///
/// Returns the positive-clamped intercept and the slope clamped to `[0, 1]`.
fn fit_pink_noise(magn: &[f32]) -> (f32, f32) {
    let last = magn.len() - 1;
    let log_i = (last as f32).ln();
    let log_m = magn[last].ln();
    let mut sum_log_i = log_i;
    let mut sum_log_i_square = log_i * log_i;
    let mut sum_log_magn = log_m;
    let mut sum_log_i_log_magn = log_i * log_m;
    for (i, &m) in magn.iter().enumerate().take(last).skip(START_BAND) {
        let log_i = (i as f32).ln();
        let log_m = m.ln();
        sum_log_i += log_i;
        sum_log_i_square += log_i * log_i;
        sum_log_magn += log_m;
        sum_log_i_log_magn += log_i * log_m;
    }

    let num_bins = (magn.len() - START_BAND) as f32;
    let denominator = sum_log_i_square * num_bins - sum_log_i * sum_log_i;
    let numerator =
        (sum_log_i_square * sum_log_magn - sum_log_i * sum_log_i_log_magn) / denominator;
    let exponent = (sum_log_i * sum_log_magn - num_bins * sum_log_i_log_magn) / denominator;
    (numerator.max(0.0), exponent.clamp(0.0, 1.0))
}

/// Parametric white/pink noise model accumulated over the startup frames.
#[derive(Debug, Default)]
struct ParametricNoiseModel {
    white_noise_level: f32,
    pink_noise_numerator: f32,
    pink_noise_exp: f32,
}

impl ParametricNoiseModel {
    /// Add one frame to the model and write the modelled spectrum.
    fn update(
        &mut self,
        block_index: i32,
        magn: &[f32],
        sum_magn: f32,
        overdrive: f32,
        parametric: &mut [f32],
    ) {
        self.white_noise_level += sum_magn / magn.len() as f32 * overdrive;
        let (numerator, exponent) = fit_pink_noise(magn);
        self.pink_noise_numerator += numerator;
        self.pink_noise_exp += exponent;

        let frames = (block_index + 1) as f32;
        if self.pink_noise_exp == 0.0 {
            parametric.fill(self.white_noise_level);
            return;
        }
        let parametric_num = (self.pink_noise_numerator / frames).exp() * frames;
        let parametric_exp = self.pink_noise_exp / frames;
        for (i, p) in parametric.iter_mut().enumerate() {
            let band = i.max(START_BAND) as f32;
            *p = parametric_num / band.powf(parametric_exp);
        }
    }
}

/// Per-bin noise spectrum estimator.
#[derive(Debug)]
pub(crate) struct NoiseEstimator {
    quantile: QuantileNoiseEstimator,
    model: ParametricNoiseModel,
    /// Modelled startup noise spectrum.
    parametric_noise: [f32; MAGN_LEN_MAX],
    /// Estimate of the current frame before the speech-dependent update.
    estimate: [f32; MAGN_LEN_MAX],
    /// Noise spectrum after the speech-dependent update.
    noise: [f32; MAGN_LEN_MAX],
    /// Noise spectrum of the last processed frame.
    noise_prev: [f32; MAGN_LEN_MAX],
    /// Conservative template updated in noise-only bins.
    magn_avg_pause: [f32; MAGN_LEN_MAX],
}

impl Default for NoiseEstimator {
    fn default() -> Self {
        Self {
            quantile: QuantileNoiseEstimator::default(),
            model: ParametricNoiseModel::default(),
            parametric_noise: [0.0; MAGN_LEN_MAX],
            estimate: [0.0; MAGN_LEN_MAX],
            noise: [0.0; MAGN_LEN_MAX],
            noise_prev: [0.0; MAGN_LEN_MAX],
            magn_avg_pause: [0.0; MAGN_LEN_MAX],
        }
    }
}

impl NoiseEstimator {
    /// Update the quantile trackers and, during startup, blend in the
    /// parametric model. The result is available from [`estimate`](Self::estimate).
    pub(crate) fn pre_update(
        &mut self,
        block_index: i32,
        magn: &[f32],
        sum_magn: f32,
        overdrive: f32,
    ) {
        let len = magn.len();
        let estimate = &mut self.estimate[..len];
        self.quantile.estimate(magn, estimate);

        if block_index < SHORT_STARTUP_BLOCKS {
            let parametric = &mut self.parametric_noise[..len];
            self.model
                .update(block_index, magn, sum_magn, overdrive, parametric);

            let quantile_weight = block_index as f32;
            let model_weight =
                (SHORT_STARTUP_BLOCKS - block_index) as f32 / (block_index + 1) as f32;
            for (n, &p) in estimate.iter_mut().zip(parametric.iter()) {
                *n = (*n * quantile_weight + p * model_weight) / SHORT_STARTUP_BLOCKS as f32;
            }
        }
    }

    /// Smooth the estimate with the per-bin speech probability and update the
    /// conservative template.
    pub(crate) fn post_update(&mut self, magn: &[f32], speech_probability: &[f32]) {
        let len = magn.len();
        let mut gamma = NOISE_UPDATE;
        for i in 0..len {
            let prob_speech = speech_probability[i];
            let prob_non_speech = 1.0 - prob_speech;
            let noise_prev = self.noise_prev[i];
            let target = prob_non_speech * magn[i] + prob_speech * noise_prev;

            // Tentative update with the previous bin's time constant.
            let tentative = gamma * noise_prev + (1.0 - gamma) * target;

            let gamma_old = gamma;
            gamma = if prob_speech > PROB_RANGE {
                SPEECH_UPDATE
            } else {
                NOISE_UPDATE
            };

            if prob_speech < PROB_RANGE {
                self.magn_avg_pause[i] += GAMMA_PAUSE * (magn[i] - self.magn_avg_pause[i]);
            }

            self.noise[i] = if gamma == gamma_old {
                tentative
            } else {
                // Downward updates are always allowed.
                (gamma * noise_prev + (1.0 - gamma) * target).min(tentative)
            };
        }
    }

    /// Remember the current noise spectrum for the next decision-directed
    /// estimate.
    pub(crate) fn store_previous(&mut self, len: usize) {
        self.noise_prev[..len].copy_from_slice(&self.noise[..len]);
    }

    pub(crate) fn estimate(&self, len: usize) -> &[f32] {
        &self.estimate[..len]
    }

    pub(crate) fn noise(&self, len: usize) -> &[f32] {
        &self.noise[..len]
    }

    pub(crate) fn noise_prev(&self, len: usize) -> &[f32] {
        &self.noise_prev[..len]
    }

    pub(crate) fn parametric_noise(&self, len: usize) -> &[f32] {
        &self.parametric_noise[..len]
    }

    pub(crate) fn conservative_noise(&self, len: usize) -> &[f32] {
        &self.magn_avg_pause[..len]
    }

    pub(crate) fn quantile(&self, len: usize) -> &[f32] {
        self.quantile.quantile(len)
    }
}
