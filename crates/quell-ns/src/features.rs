//! Speech/noise discriminating features.
//!
//! Three scalar features are tracked per frame:
//!
//! - spectral flatness, the geometric over arithmetic mean of the magnitude
//!   spectrum (noise is flatter than speech),
//! - spectral difference, the part of the spectrum's variance not explained
//!   by the conservative noise template,
//! - the average over bins of a time-smoothed log likelihood ratio (LRT).
//!
//! They are stored in a [`FeatureData`] block whose slot layout is stable.

use crate::config::{
    LONG_STARTUP_BLOCKS, LRT_FEATURE_THR, LRT_TAVG, MAGN_LEN_MAX, SF_FEATURE_THR, SPECT_DIFF_TAVG,
    SPECT_FL_TAVG,
};

const SPECTRAL_FLATNESS: usize = 0;
const LRT: usize = 3;
const SPECTRAL_DIFF: usize = 4;
const DIFF_NORMALIZATION: usize = 5;
const WINDOW_ENERGY: usize = 6;

/// Feature values in their fixed seven-slot layout.
///
/// Slot 0 is spectral flatness, slots 1 and 2 are unused, slot 3 is the LRT
/// feature, slot 4 the spectral difference, slot 5 the normalization energy
/// of the spectral difference and slot 6 the energy accumulated over the
/// current learning window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureData([f32; 7]);

impl Default for FeatureData {
    fn default() -> Self {
        Self([SF_FEATURE_THR, 0.0, 0.0, LRT_FEATURE_THR, SF_FEATURE_THR, 0.0, 0.0])
    }
}

impl FeatureData {
    pub fn spectral_flatness(&self) -> f32 {
        self.0[SPECTRAL_FLATNESS]
    }

    pub fn lrt(&self) -> f32 {
        self.0[LRT]
    }

    pub fn spectral_diff(&self) -> f32 {
        self.0[SPECTRAL_DIFF]
    }

    /// Running mean energy used to normalize the spectral difference.
    pub fn diff_normalization(&self) -> f32 {
        self.0[DIFF_NORMALIZATION]
    }

    /// Energy summed over the frames of the current learning window.
    pub fn window_energy(&self) -> f32 {
        self.0[WINDOW_ENERGY]
    }

    /// The raw slot array.
    pub fn as_array(&self) -> &[f32; 7] {
        &self.0
    }

    /// Close a learning window of `window_len` frames: its mean energy is
    /// averaged into the difference normalization and the sum restarts.
    pub(crate) fn roll_window_energy(&mut self, window_len: i32) {
        let window_mean = self.0[WINDOW_ENERGY] / window_len as f32;
        self.0[DIFF_NORMALIZATION] = 0.5 * (window_mean + self.0[DIFF_NORMALIZATION]);
        self.0[WINDOW_ENERGY] = 0.0;
    }
}

/// Maintains [`FeatureData`] and the per-bin smoothed log LRT.
#[derive(Debug)]
pub(crate) struct FeatureExtractor {
    data: FeatureData,
    log_lrt_time_avg: [f32; MAGN_LEN_MAX],
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self {
            data: FeatureData::default(),
            log_lrt_time_avg: [LRT_FEATURE_THR; MAGN_LEN_MAX],
        }
    }
}

impl FeatureExtractor {
    pub(crate) fn data(&self) -> &FeatureData {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut FeatureData {
        &mut self.data
    }

    pub(crate) fn log_lrt_time_avg(&self, len: usize) -> &[f32] {
        &self.log_lrt_time_avg[..len]
    }

    /// Update the spectral flatness with a new magnitude spectrum.
    ///
    /// The first bin is excluded. A zero magnitude anywhere makes the log
    /// undefined, in which case the feature decays toward zero instead.
    pub(crate) fn update_spectral_flatness(&mut self, magn: &[f32], sum_magn: f32) {
        let flatness = &mut self.data.0[SPECTRAL_FLATNESS];
        let mut log_sum = 0.0f32;
        for &m in &magn[1..] {
            if m <= 0.0 {
                *flatness -= SPECT_FL_TAVG * *flatness;
                return;
            }
            log_sum += m.ln();
        }
        let len = magn.len() as f32;
        let arithmetic = (sum_magn - magn[0]) / len;
        let geometric = (log_sum / len).exp();
        *flatness += SPECT_FL_TAVG * (geometric / arithmetic - *flatness);
    }

    /// Fold the frame energy into the difference normalization while the
    /// long startup lasts.
    pub(crate) fn update_diff_normalization(&mut self, block_index: i32, signal_energy: f32) {
        if block_index < LONG_STARTUP_BLOCKS {
            let norm = &mut self.data.0[DIFF_NORMALIZATION];
            *norm = (*norm * block_index as f32 + signal_energy) / (block_index + 1) as f32;
        }
    }

    /// Update the spectral difference against the conservative noise
    /// template `avg_pause`.
    pub(crate) fn update_spectral_difference(
        &mut self,
        magn: &[f32],
        sum_magn: f32,
        signal_energy: f32,
        avg_pause: &[f32],
    ) {
        let len = magn.len() as f32;
        let mean_pause = avg_pause.iter().sum::<f32>() / len;
        let mean_magn = sum_magn / len;

        let mut cov_magn_pause = 0.0f32;
        let mut var_pause = 0.0f32;
        let mut var_magn = 0.0f32;
        for (&m, &p) in magn.iter().zip(avg_pause) {
            let dm = m - mean_magn;
            let dp = p - mean_pause;
            cov_magn_pause += dm * dp;
            var_pause += dp * dp;
            var_magn += dm * dm;
        }
        cov_magn_pause /= len;
        var_pause /= len;
        var_magn /= len;

        self.data.0[WINDOW_ENERGY] += signal_energy;

        let diff = var_magn - cov_magn_pause * cov_magn_pause / (var_pause + 0.0001);
        let diff = diff / (self.data.0[DIFF_NORMALIZATION] + 0.0001);
        let feature = &mut self.data.0[SPECTRAL_DIFF];
        *feature += SPECT_DIFF_TAVG * (diff - *feature);
    }

    /// Update the per-bin log LRT from the prior and posterior SNR and set
    /// the LRT feature to its mean.
    pub(crate) fn update_lrt(&mut self, prior_snr: &[f32], post_snr: &[f32]) {
        let len = prior_snr.len();
        let mut sum = 0.0f32;
        for ((avg, &prior), &post) in self.log_lrt_time_avg[..len]
            .iter_mut()
            .zip(prior_snr)
            .zip(post_snr)
        {
            let tmp1 = 1.0 + 2.0 * prior;
            let tmp2 = 2.0 * prior / (tmp1 + 0.0001);
            let bessel = (post + 1.0) * tmp2;
            *avg += LRT_TAVG * (bessel - tmp1.ln() - *avg);
            sum += *avg;
        }
        self.data.0[LRT] = sum / len as f32;
    }
}
