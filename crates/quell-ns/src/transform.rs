//! Real frequency transform used by the suppressor.

use quell_fft::Rdft;

/// Forward/inverse real transform over one analysis block.
///
/// `forward` must produce the packed layout `[R(0), R(n/2), R(1), I(1), ...]`
/// and `inverse` must undo it up to a factor of `n / 2`, the convention of
/// [`Rdft`]. Implementations may keep lazily built tables between calls.
pub trait SpectralTransform: std::fmt::Debug {
    /// Forward transform of `data` in place.
    fn forward(&mut self, data: &mut [f32]);
    /// Inverse transform of a packed spectrum in place, scaled by `n / 2`.
    fn inverse(&mut self, data: &mut [f32]);
}

impl SpectralTransform for Rdft {
    fn forward(&mut self, data: &mut [f32]) {
        Self::forward(self, data);
    }

    fn inverse(&mut self, data: &mut [f32]) {
        Self::inverse(self, data);
    }
}

/// Magnitude spectrum of a packed transform, each bin offset by one.
///
/// Returns `(sum |X|^2 / magn_len, sum magn)`.
pub(crate) fn magnitude_spectrum(packed: &[f32], magn: &mut [f32]) -> (f32, f32) {
    let last = magn.len() - 1;
    let (dc, nyquist) = (packed[0], packed[1]);
    magn[0] = dc.abs() + 1.0;
    magn[last] = nyquist.abs() + 1.0;
    let mut energy = dc * dc + nyquist * nyquist;
    let mut sum = magn[0] + magn[last];
    for (i, m) in magn.iter_mut().enumerate().take(last).skip(1) {
        let (re, im) = (packed[2 * i], packed[2 * i + 1]);
        let power = re * re + im * im;
        energy += power;
        *m = power.sqrt() + 1.0;
        sum += *m;
    }
    (energy / magn.len() as f32, sum)
}

/// Scale every bin of a packed spectrum by its gain.
pub(crate) fn apply_gains(packed: &mut [f32], gains: &[f32]) {
    let last = gains.len() - 1;
    packed[0] *= gains[0];
    packed[1] *= gains[last];
    for (i, &g) in gains.iter().enumerate().take(last).skip(1) {
        packed[2 * i] *= g;
        packed[2 * i + 1] *= g;
    }
}
