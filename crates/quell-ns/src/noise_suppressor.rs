//! The noise suppressor instance.
//!
//! Every 10 ms frame is first passed to [`NoiseSuppressor::analyze`], which
//! updates the noise estimate, the features, the learned thresholds and the
//! speech probability, and then to [`NoiseSuppressor::process`], which
//! filters the frame with the resulting gains.

use quell_fft::Rdft;
use tracing::{debug, trace, warn};

use crate::config::{
    ANALYSIS_LEN_MAX, FrameGeometry, MAGN_LEN_MAX, NsConfig, PolicyParams, SampleRate,
    SuppressionPolicy, ThresholdUpdate,
};
use crate::error::NsError;
use crate::features::{FeatureData, FeatureExtractor};
use crate::frame_window::FrameWindow;
use crate::gain::{GainSynthesizer, decision_directed_snr, overall_scale_factor};
use crate::histograms::Histograms;
use crate::noise_estimator::NoiseEstimator;
use crate::speech_probability::SpeechProbabilityModel;
use crate::stats::NsStats;
use crate::threshold_learner::{LearnerPhase, PriorModelParams, ThresholdLearner};
use crate::transform::{SpectralTransform, apply_gains, magnitude_spectrum};

/// Single-stream statistical noise suppressor.
///
/// Holds every piece of adaptive state in fixed-size buffers sized for the
/// largest supported rate; nothing is allocated after construction. The
/// transform back-end is injected through `T`.
///
/// # Example
///
/// ```
/// use quell_ns::NoiseSuppressor;
///
/// let mut ns = NoiseSuppressor::new();
/// ns.init(16_000)?;
/// ns.set_policy(2)?;
///
/// let mut frame = [0.0f32; 160];
/// // ... fill frame with 16-bit range samples ...
/// ns.analyze(&frame)?;
/// ns.process(&mut frame, None)?;
/// # Ok::<(), quell_ns::NsError>(())
/// ```
#[derive(derive_more::Debug)]
pub struct NoiseSuppressor<T: SpectralTransform = Rdft> {
    transform: T,
    sample_rate: Option<SampleRate>,
    policy: SuppressionPolicy,
    params: PolicyParams,
    /// Index of the last analyzed non-silent frame, `-1` before the first.
    block_index: i32,
    high_band_gain: Option<f32>,
    #[debug(skip)]
    window: FrameWindow,
    #[debug(skip)]
    noise: NoiseEstimator,
    #[debug(skip)]
    features: FeatureExtractor,
    #[debug(skip)]
    learner: ThresholdLearner,
    #[debug(skip)]
    speech: SpeechProbabilityModel,
    #[debug(skip)]
    gain: GainSynthesizer,
    /// Magnitude spectrum of the last analyzed frame.
    #[debug(skip)]
    magn_prev_analyze: [f32; MAGN_LEN_MAX],
}

impl Default for NoiseSuppressor {
    fn default() -> Self {
        Self::new()
    }
}

impl NoiseSuppressor {
    /// Create an uninitialized suppressor using the built-in [`Rdft`].
    pub fn new() -> Self {
        Self::with_transform(Rdft::new())
    }

    /// Create a suppressor and apply `config`.
    pub fn with_config(config: NsConfig) -> Self {
        let mut ns = Self::new();
        ns.configure(config);
        ns
    }
}

impl<T: SpectralTransform> NoiseSuppressor<T> {
    /// Create an uninitialized suppressor with a custom transform back-end.
    pub fn with_transform(transform: T) -> Self {
        let geometry = SampleRate::default().geometry();
        Self {
            transform,
            sample_rate: None,
            policy: SuppressionPolicy::default(),
            params: SuppressionPolicy::default().params(),
            block_index: -1,
            high_band_gain: None,
            window: FrameWindow::new(geometry),
            noise: NoiseEstimator::default(),
            features: FeatureExtractor::default(),
            learner: ThresholdLearner::default(),
            speech: SpeechProbabilityModel::default(),
            gain: GainSynthesizer::default(),
            magn_prev_analyze: [0.0; MAGN_LEN_MAX],
        }
    }

    /// Initialize (or fully reinitialize) for `sample_rate_hz`.
    ///
    /// All adaptive state is cleared, the policy returns to
    /// [`SuppressionPolicy::Mild`] and threshold learning to
    /// [`ThresholdUpdate::EveryWindow`]. An unsupported rate leaves the
    /// suppressor untouched.
    pub fn init(&mut self, sample_rate_hz: u32) -> Result<(), NsError> {
        let sample_rate = SampleRate::try_from(sample_rate_hz).inspect_err(|err| {
            warn!("rejecting noise suppressor init: {err}");
        })?;
        self.reset(sample_rate);
        Ok(())
    }

    /// Initialize for `config.sample_rate` and apply the rest of `config`.
    pub fn configure(&mut self, config: NsConfig) {
        self.reset(config.sample_rate);
        self.apply_policy(config.policy);
        self.learner.set_mode(config.threshold_update);
    }

    fn reset(&mut self, sample_rate: SampleRate) {
        let geometry = sample_rate.geometry();
        self.sample_rate = Some(sample_rate);
        self.policy = SuppressionPolicy::default();
        self.params = self.policy.params();
        self.block_index = -1;
        self.high_band_gain = None;
        self.window = FrameWindow::new(geometry);
        self.noise = NoiseEstimator::default();
        self.features = FeatureExtractor::default();
        self.learner = ThresholdLearner::default();
        self.speech = SpeechProbabilityModel::default();
        self.gain = GainSynthesizer::default();
        self.magn_prev_analyze = [0.0; MAGN_LEN_MAX];
        debug!(
            sample_rate_hz = sample_rate.hz(),
            block_len = geometry.block_len,
            analysis_len = geometry.analysis_len,
            magn_len = geometry.magn_len,
            "noise suppressor initialized"
        );
    }

    /// Select the suppression mode, `0..=3`.
    ///
    /// Takes effect with the next [`process`](Self::process) call.
    pub fn set_policy(&mut self, mode: i32) -> Result<(), NsError> {
        self.geometry()?;
        let policy = SuppressionPolicy::try_from(mode).inspect_err(|err| {
            warn!("rejecting suppression policy: {err}");
        })?;
        self.apply_policy(policy);
        Ok(())
    }

    /// Typed variant of [`set_policy`](Self::set_policy).
    pub fn set_suppression_policy(&mut self, policy: SuppressionPolicy) -> Result<(), NsError> {
        self.geometry()?;
        self.apply_policy(policy);
        Ok(())
    }

    fn apply_policy(&mut self, policy: SuppressionPolicy) {
        self.policy = policy;
        self.params = policy.params();
        debug!(
            mode = policy.mode(),
            overdrive = self.params.overdrive,
            denoise_bound = self.params.denoise_bound,
            gain_map = self.params.gain_map,
            "suppression policy changed"
        );
    }

    /// Select how often the feature thresholds are re-learned.
    ///
    /// The learning window restarts from the next analyzed frame.
    pub fn set_threshold_update(&mut self, mode: ThresholdUpdate) -> Result<(), NsError> {
        self.geometry()?;
        self.learner.set_mode(mode);
        Ok(())
    }

    /// The configured sample rate, `None` before [`init`](Self::init).
    pub fn sample_rate(&self) -> Option<SampleRate> {
        self.sample_rate
    }

    /// Frame geometry of the configured rate.
    pub fn geometry(&self) -> Result<FrameGeometry, NsError> {
        self.sample_rate
            .map(SampleRate::geometry)
            .ok_or(NsError::Uninitialized)
    }

    pub fn policy(&self) -> SuppressionPolicy {
        self.policy
    }

    /// Current threshold update mode. [`ThresholdUpdate::Once`] reads back as
    /// [`ThresholdUpdate::Disabled`] after its extraction.
    pub fn threshold_update(&self) -> ThresholdUpdate {
        self.learner.mode()
    }

    fn magn_len(&self) -> usize {
        self.geometry().map_or(0, |g| g.magn_len)
    }

    fn check_len(samples: &[f32], expected: usize) -> Result<(), NsError> {
        if samples.len() == expected {
            Ok(())
        } else {
            Err(NsError::FrameLength {
                expected,
                actual: samples.len(),
            })
        }
    }

    /// Analyze one low-band frame of `block_len` samples.
    ///
    /// A frame whose windowed buffer has zero energy leaves every statistic
    /// untouched.
    pub fn analyze(&mut self, frame: &[f32]) -> Result<(), NsError> {
        let geometry = self.geometry()?;
        Self::check_len(frame, geometry.block_len)?;
        let (len, magn_len) = (geometry.analysis_len, geometry.magn_len);

        let mut buf = [0.0f32; ANALYSIS_LEN_MAX];
        let energy = self.window.analyze_frame(frame, &mut buf[..len]);
        if energy == 0.0 {
            trace!("skipping silent frame in analysis");
            return Ok(());
        }

        self.block_index = self.block_index.saturating_add(1);
        self.transform.forward(&mut buf[..len]);

        let mut magn = [0.0f32; MAGN_LEN_MAX];
        let magn = &mut magn[..magn_len];
        let (signal_energy, sum_magn) = magnitude_spectrum(&buf[..len], magn);

        self.features.update_spectral_flatness(magn, sum_magn);
        self.noise
            .pre_update(self.block_index, magn, sum_magn, self.params.overdrive);
        self.features
            .update_diff_normalization(self.block_index, signal_energy);

        let mut prior_snr = [0.0f32; MAGN_LEN_MAX];
        let mut post_snr = [0.0f32; MAGN_LEN_MAX];
        decision_directed_snr(
            magn,
            self.noise.estimate(magn_len),
            &self.magn_prev_analyze[..magn_len],
            self.noise.noise_prev(magn_len),
            self.gain.gains(magn_len),
            &mut prior_snr[..magn_len],
            &mut post_snr[..magn_len],
        );

        self.features.update_spectral_difference(
            magn,
            sum_magn,
            signal_energy,
            self.noise.conservative_noise(magn_len),
        );

        // The learner sees the LRT feature of the previous frame.
        if self.learner.update(self.features.data_mut()) == Some(LearnerPhase::Extract) {
            let model = self.learner.prior_model();
            debug!(
                extraction = self.learner.extractions(),
                lrt_threshold = model.lrt_threshold(),
                flatness_threshold = model.flatness_threshold(),
                diff_threshold = model.diff_threshold(),
                lrt_weight = model.lrt_weight(),
                flatness_weight = model.flatness_weight(),
                diff_weight = model.diff_weight(),
                "feature thresholds updated"
            );
        }

        self.features
            .update_lrt(&prior_snr[..magn_len], &post_snr[..magn_len]);
        self.speech.update(
            self.features.data(),
            self.learner.prior_model(),
            self.features.log_lrt_time_avg(magn_len),
        );
        self.noise.post_update(magn, self.speech.probability(magn_len));
        self.magn_prev_analyze[..magn_len].copy_from_slice(magn);
        Ok(())
    }

    /// Suppress noise in one frame, in place.
    ///
    /// At 32 kHz `high_band` must carry the matching upper-band frame, which
    /// is replaced by its delayed, attenuated version. At other rates it is
    /// ignored. Output samples are saturated to the 16-bit range.
    pub fn process(
        &mut self,
        frame: &mut [f32],
        high_band: Option<&mut [f32]>,
    ) -> Result<(), NsError> {
        let geometry = self.geometry()?;
        let high_band = if geometry.has_high_band {
            let high_band = high_band.ok_or(NsError::MissingHighBand)?;
            Self::check_len(high_band, geometry.block_len)?;
            Some(high_band)
        } else {
            None
        };
        Self::check_len(frame, geometry.block_len)?;
        let (len, magn_len) = (geometry.analysis_len, geometry.magn_len);

        let mut buf = [0.0f32; ANALYSIS_LEN_MAX];
        let energy_before =
            self.window
                .process_frame(frame, high_band.as_deref(), &mut buf[..len]);
        if energy_before == 0.0 {
            trace!("flushing synthesis buffer for silent frame");
            self.window.flush(frame);
            if let Some(high_band) = high_band {
                self.window.emit_high_band(1.0, high_band);
            }
            return Ok(());
        }

        self.transform.forward(&mut buf[..len]);
        let mut magn = [0.0f32; MAGN_LEN_MAX];
        let magn = &mut magn[..magn_len];
        magnitude_spectrum(&buf[..len], magn);

        self.gain.update(
            magn,
            self.noise.noise(magn_len),
            self.noise.noise_prev(magn_len),
            self.noise.parametric_noise(magn_len),
            self.block_index,
            &self.params,
        );
        self.noise.store_previous(magn_len);

        apply_gains(&mut buf[..len], self.gain.gains(magn_len));
        self.transform.inverse(&mut buf[..len]);
        let scale = 2.0 / len as f32;
        for x in &mut buf[..len] {
            *x *= scale;
        }

        let factor = overall_scale_factor(
            energy_before,
            &buf[..len],
            self.speech.prior(),
            self.block_index,
            &self.params,
        );
        self.window.synthesize(&buf[..len], factor, frame);

        if let Some(high_band) = high_band {
            let gain = self.gain.high_band_gain(
                self.speech.probability(magn_len),
                &self.magn_prev_analyze[..magn_len],
                self.params.denoise_bound,
            );
            self.high_band_gain = Some(gain);
            self.window.emit_high_band(gain, high_band);
        }
        Ok(())
    }

    /// Noise magnitude spectrum after the last analysis.
    pub fn noise_spectrum(&self) -> &[f32] {
        self.noise.noise(self.magn_len())
    }

    /// Exported quantile noise estimate.
    pub fn quantile_noise(&self) -> &[f32] {
        self.noise.quantile(self.magn_len())
    }

    /// Conservative noise template, updated only in noise-dominated bins.
    pub fn conservative_noise(&self) -> &[f32] {
        self.noise.conservative_noise(self.magn_len())
    }

    /// Per-bin gains applied by the last processed frame.
    pub fn gains(&self) -> &[f32] {
        self.gain.gains(self.magn_len())
    }

    /// Per-bin posterior speech probability of the last analyzed frame.
    pub fn speech_probability(&self) -> &[f32] {
        self.speech.probability(self.magn_len())
    }

    pub fn prior_speech_probability(&self) -> f32 {
        self.speech.prior()
    }

    /// Learned feature thresholds and weights.
    pub fn prior_model(&self) -> &PriorModelParams {
        self.learner.prior_model()
    }

    pub fn features(&self) -> &FeatureData {
        self.features.data()
    }

    /// Feature histograms of the current learning window.
    pub fn histograms(&self) -> &Histograms {
        self.learner.histograms()
    }

    pub fn stats(&self) -> NsStats {
        NsStats {
            analyzed_frames: u32::try_from(self.block_index).map_or(0, |i| i + 1),
            prior_speech_probability: self.speech.prior(),
            threshold_extractions: self.learner.extractions(),
            high_band_gain: self.high_band_gain,
            prior_model: *self.learner.prior_model(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise_frame(state: &mut u32, block_len: usize, amplitude: f32) -> Vec<f32> {
        (0..block_len)
            .map(|_| {
                *state ^= *state << 13;
                *state ^= *state >> 17;
                *state ^= *state << 5;
                (*state as f32 / u32::MAX as f32 - 0.5) * 2.0 * amplitude
            })
            .collect()
    }

    #[test]
    fn uninitialized_rejects_everything() {
        let mut ns = NoiseSuppressor::new();
        let mut frame = [0.0f32; 160];
        assert_eq!(ns.analyze(&frame), Err(NsError::Uninitialized));
        assert_eq!(ns.process(&mut frame, None), Err(NsError::Uninitialized));
        assert_eq!(ns.set_policy(1), Err(NsError::Uninitialized));
        assert_eq!(
            ns.set_threshold_update(ThresholdUpdate::Once),
            Err(NsError::Uninitialized)
        );
        assert!(ns.sample_rate().is_none());
        assert!(ns.noise_spectrum().is_empty());
        assert!(ns.gains().is_empty());
    }

    #[test]
    fn failed_init_keeps_state() {
        let mut ns = NoiseSuppressor::new();
        ns.init(8_000).unwrap();
        ns.set_policy(3).unwrap();
        assert_eq!(
            ns.init(44_100),
            Err(NsError::UnsupportedSampleRate {
                sample_rate_hz: 44_100
            })
        );
        assert_eq!(ns.sample_rate(), Some(SampleRate::Hz8000));
        assert_eq!(ns.policy(), SuppressionPolicy::VeryAggressive);
    }

    #[test]
    fn init_resets_policy() {
        let mut ns = NoiseSuppressor::new();
        ns.init(16_000).unwrap();
        ns.set_policy(2).unwrap();
        ns.init(16_000).unwrap();
        assert_eq!(ns.policy(), SuppressionPolicy::Mild);
    }

    #[test]
    fn wrong_frame_length_is_rejected_before_mutation() {
        let mut ns = NoiseSuppressor::new();
        ns.init(16_000).unwrap();
        let frame = [100.0f32; 80];
        assert_eq!(
            ns.analyze(&frame),
            Err(NsError::FrameLength {
                expected: 160,
                actual: 80
            })
        );
        assert_eq!(ns.stats().analyzed_frames, 0);
    }

    #[test]
    fn analysis_counts_non_silent_frames() {
        let mut ns = NoiseSuppressor::new();
        ns.init(16_000).unwrap();
        let mut rng = 1u32;
        ns.analyze(&[0.0; 160]).unwrap();
        assert_eq!(ns.stats().analyzed_frames, 0);
        for _ in 0..3 {
            ns.analyze(&noise_frame(&mut rng, 160, 1000.0)).unwrap();
        }
        assert_eq!(ns.stats().analyzed_frames, 3);
        assert!(ns.speech_probability().iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn process_outputs_are_finite_and_saturated() {
        let mut ns = NoiseSuppressor::with_config(NsConfig {
            policy: SuppressionPolicy::Aggressive,
            ..NsConfig::default()
        });
        let mut rng = 7u32;
        for _ in 0..50 {
            let mut frame = noise_frame(&mut rng, 160, 40_000.0);
            ns.analyze(&frame).unwrap();
            ns.process(&mut frame, None).unwrap();
            for &x in &frame {
                assert!(x.is_finite());
                assert!((-32768.0..=32767.0).contains(&x), "sample {x}");
            }
        }
    }

    #[test]
    fn high_band_is_ignored_below_32k() {
        let mut ns = NoiseSuppressor::new();
        ns.init(16_000).unwrap();
        let mut frame = [100.0f32; 160];
        let mut high_band = [5.0f32; 7];
        ns.process(&mut frame, Some(&mut high_band)).unwrap();
        assert_eq!(high_band, [5.0; 7]);
        assert_eq!(ns.stats().high_band_gain, None);
    }

    #[test]
    fn high_band_length_is_checked() {
        let mut ns = NoiseSuppressor::new();
        ns.init(32_000).unwrap();
        let mut frame = [100.0f32; 160];
        let mut high_band = [5.0f32; 80];
        assert_eq!(
            ns.process(&mut frame, Some(&mut high_band)),
            Err(NsError::FrameLength {
                expected: 160,
                actual: 80
            })
        );
    }

    #[test]
    fn frame_index_saturates() {
        let mut ns = NoiseSuppressor::new();
        ns.init(16_000).unwrap();
        ns.block_index = i32::MAX - 1;
        let mut rng = 3u32;
        for _ in 0..3 {
            let mut frame = noise_frame(&mut rng, 160, 1000.0);
            ns.analyze(&frame).unwrap();
            ns.process(&mut frame, None).unwrap();
            assert!(frame.iter().all(|x| x.is_finite()));
        }
        assert_eq!(ns.block_index, i32::MAX);
        assert_eq!(ns.stats().analyzed_frames, 1 << 31);
    }

    #[test]
    fn debug_output_is_compact() {
        let ns = NoiseSuppressor::new();
        let text = format!("{ns:?}");
        assert!(text.contains("NoiseSuppressor"));
        assert!(text.contains("block_index: -1"));
        assert!(!text.contains("magn_prev_analyze"));
    }
}
