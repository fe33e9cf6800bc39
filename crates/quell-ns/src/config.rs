//! Noise suppression configuration and tuning constants.

use crate::error::NsError;

/// Largest analysis (transform) length.
pub const ANALYSIS_LEN_MAX: usize = 256;
/// Largest number of frequency bins.
pub const MAGN_LEN_MAX: usize = ANALYSIS_LEN_MAX / 2 + 1;

/// Number of parallel quantile trackers.
pub(crate) const SIMULT: usize = 3;
/// Quantile tracked by the noise estimator.
pub(crate) const QUANTILE: f32 = 0.25;
/// Frames before the quantile trackers export their estimate.
pub(crate) const LONG_STARTUP_BLOCKS: i32 = 200;
/// Frames during which the parametric noise model is blended in.
pub(crate) const SHORT_STARTUP_BLOCKS: i32 = 50;
/// Step size factor of the quantile trackers.
pub(crate) const QUANTILE_STEP_FACTOR: f32 = 40.0;
/// Density bandwidth of the quantile trackers.
pub(crate) const QUANTILE_WIDTH: f32 = 0.01;
/// First bin used by the parametric (pink noise) fit.
pub(crate) const START_BAND: usize = 5;

/// Decision-directed prior SNR smoothing.
pub(crate) const DD_PR_SNR: f32 = 0.98;
/// Time constant of the per-bin log LRT average.
pub(crate) const LRT_TAVG: f32 = 0.5;
/// Time constant of the spectral flatness feature.
pub(crate) const SPECT_FL_TAVG: f32 = 0.3;
/// Time constant of the spectral difference feature.
pub(crate) const SPECT_DIFF_TAVG: f32 = 0.3;
/// Time constant of the prior speech probability.
pub(crate) const PRIOR_UPDATE: f32 = 0.1;
/// Noise update factor for noise-like bins.
pub(crate) const NOISE_UPDATE: f32 = 0.9;
/// Noise update factor for speech-like bins.
pub(crate) const SPEECH_UPDATE: f32 = 0.99;
/// Width of the tanh map in the prior model.
pub(crate) const WIDTH_PR_MAP: f32 = 4.0;
/// Initial LRT feature value and threshold.
pub(crate) const LRT_FEATURE_THR: f32 = 0.5;
/// Initial spectral flatness feature value and threshold.
pub(crate) const SF_FEATURE_THR: f32 = 0.5;
/// Initial spectral difference threshold.
pub(crate) const SD_FEATURE_THR: f32 = 0.5;
/// Speech probability separating noise and speech bins.
pub(crate) const PROB_RANGE: f32 = 0.2;
/// Number of bins in each feature histogram.
pub const HIST_PAR_EST: usize = 1000;
/// Histogram bin width of the LRT feature.
pub(crate) const BIN_SIZE_LRT: f32 = 0.1;
/// Histogram bin width of the spectral flatness feature.
pub(crate) const BIN_SIZE_SPEC_FLAT: f32 = 0.05;
/// Histogram bin width of the spectral difference feature.
pub(crate) const BIN_SIZE_SPEC_DIFF: f32 = 0.1;
/// Update rate of the conservative noise template.
pub(crate) const GAMMA_PAUSE: f32 = 0.05;
/// Energy ratio separating boost and attenuation of the output scale.
pub(crate) const B_LIM: f32 = 0.5;
/// Frames between threshold extractions.
pub(crate) const THRESHOLD_WINDOW: i32 = 500;

/// Supported sample rates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SampleRate {
    /// 8 kHz narrowband.
    Hz8000,
    /// 16 kHz wideband.
    #[default]
    Hz16000,
    /// 32 kHz super-wideband, processed as a 16 kHz low band plus a high band.
    Hz32000,
}

impl SampleRate {
    /// The sample rate in Hz.
    pub const fn hz(self) -> u32 {
        match self {
            Self::Hz8000 => 8_000,
            Self::Hz16000 => 16_000,
            Self::Hz32000 => 32_000,
        }
    }

    /// Frame and transform sizes for this rate.
    pub const fn geometry(self) -> FrameGeometry {
        match self {
            Self::Hz8000 => FrameGeometry::new(80, 128, false),
            Self::Hz16000 => FrameGeometry::new(160, 256, false),
            Self::Hz32000 => FrameGeometry::new(160, 256, true),
        }
    }
}

impl TryFrom<u32> for SampleRate {
    type Error = NsError;

    fn try_from(sample_rate_hz: u32) -> Result<Self, Self::Error> {
        match sample_rate_hz {
            8_000 => Ok(Self::Hz8000),
            16_000 => Ok(Self::Hz16000),
            32_000 => Ok(Self::Hz32000),
            _ => Err(NsError::UnsupportedSampleRate { sample_rate_hz }),
        }
    }
}

/// Block and transform sizes derived from a [`SampleRate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    /// Samples per 10 ms frame.
    pub block_len: usize,
    /// Length of the analysis window and transform.
    pub analysis_len: usize,
    /// Number of frequency bins, `analysis_len / 2 + 1`.
    pub magn_len: usize,
    /// Whether a parallel high-band frame accompanies each frame.
    pub has_high_band: bool,
}

impl FrameGeometry {
    const fn new(block_len: usize, analysis_len: usize, has_high_band: bool) -> Self {
        Self {
            block_len,
            analysis_len,
            magn_len: analysis_len / 2 + 1,
            has_high_band,
        }
    }
}

/// Suppression aggressiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SuppressionPolicy {
    /// Mode 0.
    #[default]
    Mild,
    /// Mode 1.
    Medium,
    /// Mode 2.
    Aggressive,
    /// Mode 3.
    VeryAggressive,
}

impl SuppressionPolicy {
    /// Numeric mode, `0..=3`.
    pub const fn mode(self) -> i32 {
        match self {
            Self::Mild => 0,
            Self::Medium => 1,
            Self::Aggressive => 2,
            Self::VeryAggressive => 3,
        }
    }

    /// Gain parameters for this policy.
    pub const fn params(self) -> PolicyParams {
        match self {
            Self::Mild => PolicyParams {
                overdrive: 1.0,
                denoise_bound: 0.5,
                gain_map: false,
            },
            Self::Medium => PolicyParams {
                overdrive: 1.0,
                denoise_bound: 0.25,
                gain_map: true,
            },
            Self::Aggressive => PolicyParams {
                overdrive: 1.1,
                denoise_bound: 0.125,
                gain_map: true,
            },
            Self::VeryAggressive => PolicyParams {
                overdrive: 1.25,
                denoise_bound: 0.09,
                gain_map: true,
            },
        }
    }
}

impl TryFrom<i32> for SuppressionPolicy {
    type Error = NsError;

    fn try_from(mode: i32) -> Result<Self, Self::Error> {
        match mode {
            0 => Ok(Self::Mild),
            1 => Ok(Self::Medium),
            2 => Ok(Self::Aggressive),
            3 => Ok(Self::VeryAggressive),
            _ => Err(NsError::InvalidPolicy { mode }),
        }
    }
}

/// Parameters a [`SuppressionPolicy`] maps to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyParams {
    /// Noise overestimation factor in the Wiener gain.
    pub overdrive: f32,
    /// Lower bound of every gain.
    pub denoise_bound: f32,
    /// Whether the overall output scale factor is applied.
    pub gain_map: bool,
}

/// How often the feature thresholds are re-learned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ThresholdUpdate {
    /// Keep the initial thresholds.
    Disabled,
    /// Learn once, after the first window.
    Once,
    /// Learn at the end of every window.
    #[default]
    EveryWindow,
}

/// Noise suppressor configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NsConfig {
    pub sample_rate: SampleRate,
    pub policy: SuppressionPolicy,
    pub threshold_update: ThresholdUpdate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_per_rate() {
        let g = SampleRate::Hz8000.geometry();
        assert_eq!((g.block_len, g.analysis_len, g.magn_len), (80, 128, 65));
        assert!(!g.has_high_band);

        let g = SampleRate::Hz16000.geometry();
        assert_eq!((g.block_len, g.analysis_len, g.magn_len), (160, 256, 129));
        assert!(!g.has_high_band);

        let g = SampleRate::Hz32000.geometry();
        assert_eq!((g.block_len, g.analysis_len, g.magn_len), (160, 256, 129));
        assert!(g.has_high_band);
    }

    #[test]
    fn sample_rate_from_hz() {
        for rate in [SampleRate::Hz8000, SampleRate::Hz16000, SampleRate::Hz32000] {
            assert_eq!(SampleRate::try_from(rate.hz()), Ok(rate));
        }
        assert_eq!(
            SampleRate::try_from(44_100),
            Err(NsError::UnsupportedSampleRate {
                sample_rate_hz: 44_100
            })
        );
    }

    #[test]
    fn policy_table() {
        let expected = [(1.0, 0.5, false), (1.0, 0.25, true), (1.1, 0.125, true), (1.25, 0.09, true)];
        for (mode, &(overdrive, bound, gain_map)) in expected.iter().enumerate() {
            let policy = SuppressionPolicy::try_from(mode as i32).unwrap();
            assert_eq!(policy.mode(), mode as i32);
            let params = policy.params();
            assert_eq!(params.overdrive, overdrive);
            assert_eq!(params.denoise_bound, bound);
            assert_eq!(params.gain_map, gain_map);
        }
    }

    #[test]
    fn policy_out_of_range() {
        assert_eq!(
            SuppressionPolicy::try_from(4),
            Err(NsError::InvalidPolicy { mode: 4 })
        );
        assert_eq!(
            SuppressionPolicy::try_from(-1),
            Err(NsError::InvalidPolicy { mode: -1 })
        );
    }

    #[test]
    fn default_config() {
        let config = NsConfig::default();
        assert_eq!(config.sample_rate, SampleRate::Hz16000);
        assert_eq!(config.policy, SuppressionPolicy::Mild);
        assert_eq!(config.threshold_update, ThresholdUpdate::EveryWindow);
    }
}
