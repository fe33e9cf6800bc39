//! Adaptive feature thresholds and weights.
//!
//! Feature values are counted into histograms over a window of
//! [`THRESHOLD_WINDOW`] frames. At the end of the window the thresholds of
//! the prior speech model are re-derived from the histogram peaks, and each
//! feature is kept or dropped depending on how pronounced its peak is.

use crate::config::{
    BIN_SIZE_LRT, BIN_SIZE_SPEC_DIFF, BIN_SIZE_SPEC_FLAT, HIST_PAR_EST, LRT_FEATURE_THR,
    SD_FEATURE_THR, SF_FEATURE_THR, THRESHOLD_WINDOW, ThresholdUpdate,
};
use crate::features::FeatureData;
use crate::histograms::Histograms;

/// Upper edge of the LRT bins averaged for the LRT threshold.
const RANGE_AVG_HIST_LRT: f32 = 1.0;
/// Peak scale for the LRT and spectral difference thresholds.
const FACTOR_1_MODEL_PARS: f32 = 1.2;
/// Peak scale for the spectral flatness threshold.
const FACTOR_2_MODEL_PARS: f32 = 0.9;
/// Smallest flatness peak position that keeps the flatness feature.
const THRES_POS_SPEC_FLAT: f32 = 0.6;
/// Second peak weight, relative to the first, required for merging.
const LIMIT_PEAK_WEIGHTS: f32 = 0.5;
/// LRT fluctuation below which the input is taken as stationary noise.
const THRES_FLUCT_LRT: f32 = 0.05;
const MIN_LRT: f32 = 0.2;
const MAX_LRT: f32 = 1.0;
const MIN_SPEC_FLAT: f32 = 0.1;
const MAX_SPEC_FLAT: f32 = 0.95;
const MIN_SPEC_DIFF: f32 = 0.16;
const MAX_SPEC_DIFF: f32 = 1.0;

/// Smallest (merged) peak weight that keeps a feature.
fn threshold_peak_weight(window: i32) -> i32 {
    (0.3 * window as f64) as i32
}

const LRT_THRESHOLD: usize = 0;
const FLATNESS_THRESHOLD: usize = 1;
const FLATNESS_SIGN: usize = 2;
const DIFF_THRESHOLD: usize = 3;
const LRT_WEIGHT: usize = 4;
const FLATNESS_WEIGHT: usize = 5;
const DIFF_WEIGHT: usize = 6;

/// Prior speech model parameters in their fixed seven-slot layout.
///
/// Slots: LRT threshold, flatness threshold, flatness sign, difference
/// threshold, LRT weight, flatness weight, difference weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorModelParams([f32; 7]);

impl Default for PriorModelParams {
    fn default() -> Self {
        Self([LRT_FEATURE_THR, SF_FEATURE_THR, 1.0, SD_FEATURE_THR, 1.0, 0.0, 0.0])
    }
}

impl PriorModelParams {
    pub fn lrt_threshold(&self) -> f32 {
        self.0[LRT_THRESHOLD]
    }

    pub fn flatness_threshold(&self) -> f32 {
        self.0[FLATNESS_THRESHOLD]
    }

    /// `1.0` when noise is flatter than speech, `-1.0` for the reverse.
    pub fn flatness_sign(&self) -> f32 {
        self.0[FLATNESS_SIGN]
    }

    pub fn diff_threshold(&self) -> f32 {
        self.0[DIFF_THRESHOLD]
    }

    pub fn lrt_weight(&self) -> f32 {
        self.0[LRT_WEIGHT]
    }

    pub fn flatness_weight(&self) -> f32 {
        self.0[FLATNESS_WEIGHT]
    }

    pub fn diff_weight(&self) -> f32 {
        self.0[DIFF_WEIGHT]
    }

    /// The raw slot array.
    pub fn as_array(&self) -> &[f32; 7] {
        &self.0
    }
}

/// What the learner did with the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LearnerPhase {
    /// The features were counted into the histograms.
    Accumulate,
    /// The window closed and new thresholds were extracted.
    Extract,
}

/// Position and weight of the dominant histogram peak.
///
/// The two largest bins are located (ties keep the earlier bin). If they are
/// within two bins of each other and the second carries more than half the
/// weight of the first, they are merged.
fn dominant_peak(histogram: &[i32; HIST_PAR_EST], bin_size: f32) -> (f32, i32) {
    let mut peak_weight = 0;
    let mut peak_position = 0.0f32;
    let mut secondary_weight = 0;
    let mut secondary_position = 0.0f32;

    for (i, &count) in histogram.iter().enumerate() {
        let bin_mid = (i as f32 + 0.5) * bin_size;
        if count > peak_weight {
            secondary_weight = peak_weight;
            secondary_position = peak_position;
            peak_weight = count;
            peak_position = bin_mid;
        } else if count > secondary_weight {
            secondary_weight = count;
            secondary_position = bin_mid;
        }
    }

    if (secondary_position - peak_position).abs() < 2.0 * bin_size
        && secondary_weight as f32 > LIMIT_PEAK_WEIGHTS * peak_weight as f32
    {
        peak_weight += secondary_weight;
        peak_position = 0.5 * (peak_position + secondary_position);
    }
    (peak_position, peak_weight)
}

/// LRT threshold from the LRT histogram.
///
/// Returns the threshold and whether the LRT fluctuation is low enough to
/// treat the window as stationary noise.
fn lrt_threshold(histogram: &[i32; HIST_PAR_EST], window: i32) -> (f32, bool) {
    let mut average = 0.0f32;
    let mut average_compl = 0.0f32;
    let mut average_squared = 0.0f32;
    let mut count = 0;
    for (i, &hist) in histogram.iter().enumerate() {
        let bin_mid = (i as f32 + 0.5) * BIN_SIZE_LRT;
        if bin_mid <= RANGE_AVG_HIST_LRT {
            average += hist as f32 * bin_mid;
            count += hist;
        }
        average_squared += hist as f32 * bin_mid * bin_mid;
        average_compl += hist as f32 * bin_mid;
    }
    if count > 0 {
        average /= count as f32;
    }
    average_compl /= window as f32;
    average_squared /= window as f32;

    let fluctuation = average_squared - average * average_compl;
    if fluctuation < THRES_FLUCT_LRT {
        (MAX_LRT, true)
    } else {
        ((FACTOR_1_MODEL_PARS * average).clamp(MIN_LRT, MAX_LRT), false)
    }
}

/// Two-phase threshold learner: count features, then periodically extract.
#[derive(Debug)]
pub(crate) struct ThresholdLearner {
    mode: ThresholdUpdate,
    window: i32,
    countdown: i32,
    histograms: Histograms,
    prior_model: PriorModelParams,
    extractions: u32,
}

impl Default for ThresholdLearner {
    fn default() -> Self {
        Self {
            mode: ThresholdUpdate::default(),
            window: THRESHOLD_WINDOW,
            countdown: THRESHOLD_WINDOW,
            histograms: Histograms::default(),
            prior_model: PriorModelParams::default(),
            extractions: 0,
        }
    }
}

impl ThresholdLearner {
    /// Select the update mode and restart the window countdown.
    pub(crate) fn set_mode(&mut self, mode: ThresholdUpdate) {
        self.mode = mode;
        self.countdown = self.window;
    }

    pub(crate) fn mode(&self) -> ThresholdUpdate {
        self.mode
    }

    pub(crate) fn prior_model(&self) -> &PriorModelParams {
        &self.prior_model
    }

    pub(crate) fn histograms(&self) -> &Histograms {
        &self.histograms
    }

    /// Number of threshold extractions since initialization.
    pub(crate) fn extractions(&self) -> u32 {
        self.extractions
    }

    /// Advance by one analyzed frame.
    ///
    /// Returns `None` while learning is disabled. At the end of a window in
    /// [`ThresholdUpdate::EveryWindow`] mode the window's mean energy is
    /// folded into the spectral difference normalization of `features`.
    pub(crate) fn update(&mut self, features: &mut FeatureData) -> Option<LearnerPhase> {
        if self.mode == ThresholdUpdate::Disabled {
            return None;
        }
        self.countdown -= 1;
        if self.countdown > 0 {
            self.histograms.accumulate(features);
            return Some(LearnerPhase::Accumulate);
        }

        self.extract();
        self.countdown = self.window;
        match self.mode {
            ThresholdUpdate::Once => self.mode = ThresholdUpdate::Disabled,
            ThresholdUpdate::EveryWindow => features.roll_window_energy(self.window),
            ThresholdUpdate::Disabled => {}
        }
        Some(LearnerPhase::Extract)
    }

    fn extract(&mut self) {
        let (lrt, low_lrt_fluctuation) = lrt_threshold(self.histograms.lrt(), self.window);
        let model = &mut self.prior_model.0;
        model[LRT_THRESHOLD] = lrt;

        let min_weight = threshold_peak_weight(self.window);

        let (flat_position, flat_weight) =
            dominant_peak(self.histograms.spectral_flatness(), BIN_SIZE_SPEC_FLAT);
        let use_flatness = flat_weight >= min_weight && flat_position >= THRES_POS_SPEC_FLAT;
        if use_flatness {
            model[FLATNESS_THRESHOLD] =
                (FACTOR_2_MODEL_PARS * flat_position).clamp(MIN_SPEC_FLAT, MAX_SPEC_FLAT);
        }

        let (diff_position, diff_weight) =
            dominant_peak(self.histograms.spectral_diff(), BIN_SIZE_SPEC_DIFF);
        model[DIFF_THRESHOLD] =
            (FACTOR_1_MODEL_PARS * diff_position).clamp(MIN_SPEC_DIFF, MAX_SPEC_DIFF);
        let use_diff = diff_weight >= min_weight && !low_lrt_fluctuation;

        let feature_sum = 1.0 + f32::from(u8::from(use_flatness)) + f32::from(u8::from(use_diff));
        model[LRT_WEIGHT] = 1.0 / feature_sum;
        model[FLATNESS_WEIGHT] = f32::from(u8::from(use_flatness)) / feature_sum;
        model[DIFF_WEIGHT] = f32::from(u8::from(use_diff)) / feature_sum;

        self.histograms.clear();
        self.extractions += 1;
    }
}
