//! Quantile-based noise spectrum tracking.
//!
//! Each bin's noise floor is the 25th percentile of its log-magnitude
//! history, followed by [`SIMULT`] trackers whose restart counters are
//! staggered by a third of the startup length. Whenever a tracker completes
//! a cycle its estimate becomes the exported quantile, so one settled
//! estimate is always available while the others are still adapting.

use crate::config::{
    LONG_STARTUP_BLOCKS, MAGN_LEN_MAX, QUANTILE, QUANTILE_STEP_FACTOR, QUANTILE_WIDTH, SIMULT,
};

/// Per-bin online quantile trackers.
#[derive(Debug)]
pub(crate) struct QuantileNoiseEstimator {
    /// Log-domain quantile per tracker and bin.
    log_quantile: [[f32; MAGN_LEN_MAX]; SIMULT],
    /// Local density estimate per tracker and bin.
    density: [[f32; MAGN_LEN_MAX]; SIMULT],
    /// Exported noise quantile (linear domain).
    quantile: [f32; MAGN_LEN_MAX],
    /// Per-tracker frame counters.
    counter: [i32; SIMULT],
    /// Frames seen, saturating at the long startup length.
    updates: i32,
}

impl Default for QuantileNoiseEstimator {
    fn default() -> Self {
        let mut counter = [0i32; SIMULT];
        for (s, c) in counter.iter_mut().enumerate() {
            *c = (LONG_STARTUP_BLOCKS as f32 * (s + 1) as f32 / SIMULT as f32).floor() as i32;
        }
        Self {
            log_quantile: [[8.0; MAGN_LEN_MAX]; SIMULT],
            density: [[0.3; MAGN_LEN_MAX]; SIMULT],
            quantile: [0.0; MAGN_LEN_MAX],
            counter,
            updates: 0,
        }
    }
}

impl QuantileNoiseEstimator {
    /// Feed one magnitude spectrum and write the current quantile to `noise`.
    pub(crate) fn estimate(&mut self, magn: &[f32], noise: &mut [f32]) {
        let len = magn.len();
        if self.updates < LONG_STARTUP_BLOCKS {
            self.updates += 1;
        }

        let mut log_magn = [0.0f32; MAGN_LEN_MAX];
        for (l, &m) in log_magn.iter_mut().zip(magn) {
            *l = m.ln();
        }

        for s in 0..SIMULT {
            let counter = self.counter[s] as f32;
            let one_by_counter_plus_1 = 1.0 / (counter + 1.0);
            let log_quantile = &mut self.log_quantile[s][..len];
            let density = &mut self.density[s][..len];

            for ((lq, d), &lm) in log_quantile.iter_mut().zip(density.iter_mut()).zip(&log_magn) {
                let delta = if *d > 1.0 {
                    QUANTILE_STEP_FACTOR / *d
                } else {
                    QUANTILE_STEP_FACTOR
                };
                if lm > *lq {
                    *lq += QUANTILE * delta * one_by_counter_plus_1;
                } else {
                    *lq -= (1.0 - QUANTILE) * delta * one_by_counter_plus_1;
                }

                if (lm - *lq).abs() < QUANTILE_WIDTH {
                    *d = (counter * *d + 1.0 / (2.0 * QUANTILE_WIDTH)) * one_by_counter_plus_1;
                }
            }

            if self.counter[s] >= LONG_STARTUP_BLOCKS {
                self.counter[s] = 0;
                if self.updates >= LONG_STARTUP_BLOCKS {
                    export(&self.log_quantile[s][..len], &mut self.quantile[..len]);
                }
            }
            self.counter[s] += 1;
        }

        // During startup the last tracker is exported every frame so the
        // estimate moves away from zero right away.
        if self.updates < LONG_STARTUP_BLOCKS {
            export(&self.log_quantile[SIMULT - 1][..len], &mut self.quantile[..len]);
        }

        noise.copy_from_slice(&self.quantile[..len]);
    }

    /// Exported quantile over the first `len` bins.
    pub(crate) fn quantile(&self, len: usize) -> &[f32] {
        &self.quantile[..len]
    }
}

fn export(log_quantile: &[f32], quantile: &mut [f32]) {
    for (q, &lq) in quantile.iter_mut().zip(log_quantile) {
        *q = lq.exp();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state() {
        let qne = QuantileNoiseEstimator::default();
        assert_eq!(qne.updates, 0);
        assert_eq!(qne.counter, [66, 133, 200]);
        assert!(qne.quantile(MAGN_LEN_MAX).iter().all(|&q| q == 0.0));
    }

    #[test]
    fn first_frame_exports_last_tracker() {
        let mut qne = QuantileNoiseEstimator::default();
        let magn = [1.0f32; 129];
        let mut noise = [0.0f32; 129];
        qne.estimate(&magn, &mut noise);

        // ln(1) = 0 < 8, so every tracker steps down by 0.75 * 40 / (c + 1).
        // The last tracker starts at counter 200.
        let expected = (8.0f32 - 0.75 * 40.0 / 201.0).exp();
        for &n in &noise {
            assert!((n - expected).abs() / expected < 1e-5, "{n} vs {expected}");
        }
        assert_eq!(qne.updates, 1);
        // The tracker at 200 restarts.
        assert_eq!(qne.counter, [67, 134, 1]);
    }

    #[test]
    fn converges_to_constant_input() {
        let mut qne = QuantileNoiseEstimator::default();
        let magn = [50.0f32; 65];
        let mut noise = [0.0f32; 65];
        for _ in 0..1000 {
            qne.estimate(&magn, &mut noise);
        }
        for &n in &noise {
            assert!((n - 50.0).abs() < 2.0, "noise {n} should approach 50");
        }
    }

    #[test]
    fn tracks_lower_quantile_of_alternating_input() {
        let mut qne = QuantileNoiseEstimator::default();
        let low = [10.0f32; 129];
        let high = [1000.0f32; 129];
        let mut noise = [0.0f32; 129];
        for frame in 0..2000 {
            // One high frame for every three low frames: the 25th percentile is low.
            let magn = if frame % 4 == 0 { &high } else { &low };
            qne.estimate(magn, &mut noise);
        }
        for &n in &noise {
            assert!(n < 100.0, "noise {n} should stay near the low level");
            assert!(n > 1.0);
        }
    }

    #[test]
    fn values_stay_finite() {
        let mut qne = QuantileNoiseEstimator::default();
        let mut noise = [0.0f32; 129];
        for frame in 0..600 {
            let magn: Vec<f32> = (0..129)
                .map(|i| 1.0 + ((frame * 31 + i * 17) % 97) as f32 * 100.0)
                .collect();
            qne.estimate(&magn, &mut noise);
            assert!(noise.iter().all(|n| n.is_finite() && *n > 0.0));
        }
    }
}
