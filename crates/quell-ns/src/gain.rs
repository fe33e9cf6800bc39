//! Suppression gains.
//!
//! The per-bin gain is a Wiener filter driven by a decision-directed prior
//! SNR. While the noise estimate is young it is blended with a gain derived
//! from the parametric noise model. After the long startup the synthesized
//! frame may be rescaled as a whole, and at 32 kHz a single gain for the
//! high band is derived from the upper low-band bins.

use crate::config::{
    B_LIM, DD_PR_SNR, LONG_STARTUP_BLOCKS, MAGN_LEN_MAX, PolicyParams, SHORT_STARTUP_BLOCKS,
};

/// Decision-directed prior SNR and posterior SNR per bin.
///
/// The previous frame's clean-speech estimate is `magn_prev * smooth`
/// relative to `noise_prev`; it is mixed with the current posterior SNR of
/// `magn` against `noise`.
pub(crate) fn decision_directed_snr(
    magn: &[f32],
    noise: &[f32],
    magn_prev: &[f32],
    noise_prev: &[f32],
    smooth: &[f32],
    prior_snr: &mut [f32],
    post_snr: &mut [f32],
) {
    for i in 0..magn.len() {
        post_snr[i] = if magn[i] > noise[i] {
            magn[i] / (noise[i] + 0.0001) - 1.0
        } else {
            0.0
        };
        let previous = magn_prev[i] / (noise_prev[i] + 0.0001) * smooth[i];
        prior_snr[i] = DD_PR_SNR * previous + (1.0 - DD_PR_SNR) * post_snr[i];
    }
}

/// Output scale factor applied during synthesis.
///
/// Compares the energy of the filtered frame `time` to the windowed input
/// energy. Frames that kept most of their energy are boosted slightly,
/// frames that lost most of it are attenuated slightly, and the two are
/// mixed by the prior speech probability. Returns `1.0` when the gain map is
/// off or the long startup is not over.
pub(crate) fn overall_scale_factor(
    energy_before: f32,
    time: &[f32],
    prior_speech_prob: f32,
    block_index: i32,
    params: &PolicyParams,
) -> f32 {
    if !params.gain_map || block_index <= LONG_STARTUP_BLOCKS {
        return 1.0;
    }
    let energy_after: f32 = time.iter().map(|x| x * x).sum();
    let mut gain = (energy_after / (energy_before + 1.0)).sqrt();

    let mut boost = 1.0;
    let mut attenuation = 1.0;
    if gain > B_LIM {
        boost = 1.0 + 1.3 * (gain - B_LIM);
        if gain * boost > 1.0 {
            boost = 1.0 / gain;
        }
    }
    if gain < B_LIM {
        if gain <= params.denoise_bound {
            gain = params.denoise_bound;
        }
        attenuation = 1.0 - 0.3 * (B_LIM - gain);
    }
    prior_speech_prob * boost + (1.0 - prior_speech_prob) * attenuation
}

/// Per-bin gain state carried between processed frames.
#[derive(Debug)]
pub(crate) struct GainSynthesizer {
    /// Gain of the last processed frame.
    smooth: [f32; MAGN_LEN_MAX],
    /// Magnitudes summed over the short startup.
    init_magn_est: [f32; MAGN_LEN_MAX],
    /// Magnitude spectrum of the last processed frame.
    magn_prev_process: [f32; MAGN_LEN_MAX],
}

impl Default for GainSynthesizer {
    fn default() -> Self {
        Self {
            smooth: [1.0; MAGN_LEN_MAX],
            init_magn_est: [0.0; MAGN_LEN_MAX],
            magn_prev_process: [0.0; MAGN_LEN_MAX],
        }
    }
}

impl GainSynthesizer {
    pub(crate) fn gains(&self, len: usize) -> &[f32] {
        &self.smooth[..len]
    }

    #[cfg(test)]
    pub(crate) fn magn_prev_process(&self, len: usize) -> &[f32] {
        &self.magn_prev_process[..len]
    }

    /// Compute the gains of a processed frame with magnitudes `magn`.
    ///
    /// `noise` is the current noise spectrum, `noise_prev` the one of the
    /// previous processed frame. During the short startup the gain is mixed
    /// with `1 - overdrive * parametric / magnitude_sum` in proportion to
    /// the elapsed frames.
    pub(crate) fn update(
        &mut self,
        magn: &[f32],
        noise: &[f32],
        noise_prev: &[f32],
        parametric_noise: &[f32],
        block_index: i32,
        params: &PolicyParams,
    ) {
        let len = magn.len();
        let startup = block_index < SHORT_STARTUP_BLOCKS;
        if startup {
            for (est, &m) in self.init_magn_est[..len].iter_mut().zip(magn) {
                *est += m;
            }
        }

        let mut prior_snr = [0.0f32; MAGN_LEN_MAX];
        let mut post_snr = [0.0f32; MAGN_LEN_MAX];
        decision_directed_snr(
            magn,
            noise,
            &self.magn_prev_process[..len],
            noise_prev,
            &self.smooth[..len],
            &mut prior_snr[..len],
            &mut post_snr[..len],
        );

        let bound = params.denoise_bound;
        // Frames that were processed before any analysis count as frame 0.
        let elapsed = block_index.max(0) as f32;
        for i in 0..len {
            let snr = prior_snr[i];
            let mut gain = (snr / (params.overdrive + snr)).clamp(bound, 1.0);
            if startup {
                let init = self.init_magn_est[i];
                let model_gain = ((init - params.overdrive * parametric_noise[i])
                    / (init + 0.0001))
                    .clamp(bound, 1.0);
                gain = (gain * elapsed + model_gain * (SHORT_STARTUP_BLOCKS as f32 - elapsed))
                    / SHORT_STARTUP_BLOCKS as f32;
            }
            self.smooth[i] = gain;
        }
        self.magn_prev_process[..len].copy_from_slice(magn);
    }

    /// Time-domain gain for the high band.
    ///
    /// Averages the speech probability and gain over the `len / 4` bins just
    /// below Nyquist. The probability is scaled by how much of the analyzed
    /// magnitude reached processing, so speech removed between analysis and
    /// processing does not open the high band.
    pub(crate) fn high_band_gain(
        &self,
        speech_probability: &[f32],
        magn_prev_analyze: &[f32],
        bound: f32,
    ) -> f32 {
        let len = speech_probability.len();
        let delta = len / 4;
        let range = len - delta - 1..len - 1;

        let mut avg_prob = speech_probability[range.clone()].iter().sum::<f32>() / delta as f32;
        let sum_analyze: f32 = magn_prev_analyze.iter().sum();
        if sum_analyze > 0.0 {
            let sum_process: f32 = self.magn_prev_process[..len].iter().sum();
            avg_prob *= sum_process / sum_analyze;
        }
        let avg_gain = self.smooth[range].iter().sum::<f32>() / delta as f32;

        let gain_mod = 0.5 * (1.0 + (2.0 * avg_prob - 1.0).tanh());
        let gain = if avg_prob >= 0.5 {
            0.25 * gain_mod + 0.75 * avg_gain
        } else {
            0.5 * gain_mod + 0.5 * avg_gain
        };
        gain.clamp(bound, 1.0)
    }
}
