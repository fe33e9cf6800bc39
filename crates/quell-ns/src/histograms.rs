//! Feature histograms collected over a learning window.

use crate::config::{BIN_SIZE_LRT, BIN_SIZE_SPEC_DIFF, BIN_SIZE_SPEC_FLAT, HIST_PAR_EST};
use crate::features::FeatureData;

/// Histogram bin for `value`, if it falls inside `[0, HIST_PAR_EST * bin_size)`.
fn bin_index(value: f32, bin_size: f32) -> Option<usize> {
    if value >= 0.0 && value < HIST_PAR_EST as f32 * bin_size {
        // Rounding can land exactly on the upper edge.
        Some(((value / bin_size) as usize).min(HIST_PAR_EST - 1))
    } else {
        None
    }
}

/// Counts of the LRT, spectral flatness and spectral difference features.
#[derive(Clone)]
pub struct Histograms {
    lrt: [i32; HIST_PAR_EST],
    spectral_flatness: [i32; HIST_PAR_EST],
    spectral_diff: [i32; HIST_PAR_EST],
}

impl Default for Histograms {
    fn default() -> Self {
        Self {
            lrt: [0; HIST_PAR_EST],
            spectral_flatness: [0; HIST_PAR_EST],
            spectral_diff: [0; HIST_PAR_EST],
        }
    }
}

impl std::fmt::Debug for Histograms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Histograms")
            .field("frames", &self.lrt.iter().sum::<i32>())
            .finish_non_exhaustive()
    }
}

impl Histograms {
    /// Count the current feature values. Out-of-range values are dropped.
    pub(crate) fn accumulate(&mut self, features: &FeatureData) {
        if let Some(i) = bin_index(features.lrt(), BIN_SIZE_LRT) {
            self.lrt[i] += 1;
        }
        if let Some(i) = bin_index(features.spectral_flatness(), BIN_SIZE_SPEC_FLAT) {
            self.spectral_flatness[i] += 1;
        }
        if let Some(i) = bin_index(features.spectral_diff(), BIN_SIZE_SPEC_DIFF) {
            self.spectral_diff[i] += 1;
        }
    }

    #[cfg(test)]
    pub(crate) fn from_counts(
        lrt: [i32; HIST_PAR_EST],
        spectral_flatness: [i32; HIST_PAR_EST],
        spectral_diff: [i32; HIST_PAR_EST],
    ) -> Self {
        Self {
            lrt,
            spectral_flatness,
            spectral_diff,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.lrt.fill(0);
        self.spectral_flatness.fill(0);
        self.spectral_diff.fill(0);
    }

    pub fn lrt(&self) -> &[i32; HIST_PAR_EST] {
        &self.lrt
    }

    pub fn spectral_flatness(&self) -> &[i32; HIST_PAR_EST] {
        &self.spectral_flatness
    }

    pub fn spectral_diff(&self) -> &[i32; HIST_PAR_EST] {
        &self.spectral_diff
    }
}
