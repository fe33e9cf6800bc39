//! Real-input DFT with a packed half-spectrum layout.
//!
//! A length-`n` real block is viewed as `n / 2` complex samples, transformed
//! with an iterative radix-2 FFT and then split into the spectrum of the real
//! sequence. The inverse runs the same steps backwards.

use std::f64::consts::PI;

/// Largest supported transform length.
pub const MAX_LENGTH: usize = 1024;

const TWIDDLE_LEN: usize = MAX_LENGTH / 4;
const SPLIT_LEN: usize = MAX_LENGTH / 4 + 1;

/// In-place real DFT.
///
/// Tables are prepared lazily for the length of the first transform and
/// rebuilt only if a different length is requested later.
#[derive(derive_more::Debug)]
pub struct Rdft {
    len: usize,
    /// `cos(2 pi t / m)` for the `m = n / 2` point complex FFT.
    #[debug(skip)]
    fft_cos: [f32; TWIDDLE_LEN],
    #[debug(skip)]
    fft_sin: [f32; TWIDDLE_LEN],
    /// `cos(2 pi k / n)` used when splitting the complex spectrum.
    #[debug(skip)]
    split_cos: [f32; SPLIT_LEN],
    #[debug(skip)]
    split_sin: [f32; SPLIT_LEN],
}

impl Default for Rdft {
    fn default() -> Self {
        Self::new()
    }
}

impl Rdft {
    /// Create a transform with no tables prepared yet.
    pub const fn new() -> Self {
        Self {
            len: 0,
            fft_cos: [0.0; TWIDDLE_LEN],
            fft_sin: [0.0; TWIDDLE_LEN],
            split_cos: [0.0; SPLIT_LEN],
            split_sin: [0.0; SPLIT_LEN],
        }
    }

    /// Length the tables are currently prepared for, `0` before first use.
    pub fn prepared_len(&self) -> usize {
        self.len
    }

    /// Forward transform of `data` in place.
    ///
    /// On return `data[0]` holds `R(0)`, `data[1]` holds `R(n/2)` and
    /// `data[2k]`, `data[2k + 1]` hold `R(k)`, `I(k)`.
    ///
    /// # Panics
    ///
    /// Panics if `data.len()` is not a power of two in `4..=MAX_LENGTH`.
    pub fn forward(&mut self, data: &mut [f32]) {
        self.prepare(data.len());
        let m = data.len() / 2;

        complex_fft(data, &self.fft_cos, &self.fft_sin, false);

        let (z0r, z0i) = (data[0], data[1]);
        data[0] = z0r + z0i;
        data[1] = z0r - z0i;

        for k in 1..=m / 2 {
            let j = m - k;
            let (zkr, zki) = (data[2 * k], data[2 * k + 1]);
            let (zjr, zji) = (data[2 * j], data[2 * j + 1]);
            let (c, s) = (self.split_cos[k], self.split_sin[k]);

            let er = 0.5 * (zkr + zjr);
            let ei = 0.5 * (zki - zji);
            let or = 0.5 * (zki + zji);
            let oi = -0.5 * (zkr - zjr);
            let tr = c * or + s * oi;
            let ti = c * oi - s * or;

            data[2 * k] = er + tr;
            data[2 * k + 1] = -(ei + ti);
            data[2 * j] = er - tr;
            data[2 * j + 1] = ei - ti;
        }
    }

    /// Inverse transform of a packed spectrum in place.
    ///
    /// The result is scaled by `n / 2`; multiply by `2 / n` to recover the
    /// signal passed to [`forward`](Self::forward).
    ///
    /// # Panics
    ///
    /// Panics if `data.len()` is not a power of two in `4..=MAX_LENGTH`.
    pub fn inverse(&mut self, data: &mut [f32]) {
        self.prepare(data.len());
        let m = data.len() / 2;

        let (r0, rn) = (data[0], data[1]);
        data[0] = 0.5 * (r0 + rn);
        data[1] = 0.5 * (r0 - rn);

        for k in 1..=m / 2 {
            let j = m - k;
            let (xkr, xki) = (data[2 * k], -data[2 * k + 1]);
            let (xjr, xji) = (data[2 * j], -data[2 * j + 1]);
            let (c, s) = (self.split_cos[k], self.split_sin[k]);

            let er = 0.5 * (xkr + xjr);
            let ei = 0.5 * (xki - xji);
            let dr = 0.5 * (xkr - xjr);
            let di = 0.5 * (xki + xji);
            let or = dr * c - di * s;
            let oi = dr * s + di * c;

            data[2 * k] = er - oi;
            data[2 * k + 1] = ei + or;
            data[2 * j] = er + oi;
            data[2 * j + 1] = or - ei;
        }

        complex_fft(data, &self.fft_cos, &self.fft_sin, true);
    }

    fn prepare(&mut self, len: usize) {
        assert!(
            len.is_power_of_two() && (4..=MAX_LENGTH).contains(&len),
            "rdft length {len} must be a power of two in 4..={MAX_LENGTH}"
        );
        if self.len == len {
            return;
        }
        let m = len / 2;
        for t in 0..m / 2 {
            let phase = 2.0 * PI * t as f64 / m as f64;
            self.fft_cos[t] = phase.cos() as f32;
            self.fft_sin[t] = phase.sin() as f32;
        }
        for k in 0..=m / 2 {
            let phase = 2.0 * PI * k as f64 / len as f64;
            self.split_cos[k] = phase.cos() as f32;
            self.split_sin[k] = phase.sin() as f32;
        }
        self.len = len;
    }
}

/// Unscaled radix-2 FFT over `data.len() / 2` interleaved complex samples.
fn complex_fft(data: &mut [f32], cos: &[f32], sin: &[f32], inverse: bool) {
    let m = data.len() / 2;

    let mut j = 0;
    for i in 1..m {
        let mut bit = m >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j ^= bit;
        if i < j {
            data.swap(2 * i, 2 * j);
            data.swap(2 * i + 1, 2 * j + 1);
        }
    }

    let sign = if inverse { 1.0 } else { -1.0 };
    let mut size = 2;
    while size <= m {
        let half = size / 2;
        let step = m / size;
        for start in (0..m).step_by(size) {
            for k in 0..half {
                let wr = cos[k * step];
                let wi = sign * sin[k * step];
                let a = 2 * (start + k);
                let b = 2 * (start + k + half);
                let vr = data[b] * wr - data[b + 1] * wi;
                let vi = data[b] * wi + data[b + 1] * wr;
                let (ur, ui) = (data[a], data[a + 1]);
                data[a] = ur + vr;
                data[a + 1] = ui + vi;
                data[b] = ur - vr;
                data[b + 1] = ui - vi;
            }
        }
        size *= 2;
    }
}
