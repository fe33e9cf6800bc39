//! Sliding analysis buffers, windowing and overlap-add synthesis.
//!
//! Each 10 ms frame is appended to a buffer holding the last `analysis_len`
//! samples. The buffer is multiplied by a flat-top window whose tapers
//! satisfy `w[i]^2 + w[i + block_len]^2 = 1`, so windowing on both the
//! analysis and synthesis side reconstructs the input exactly when no gain
//! is applied.

use crate::config::{ANALYSIS_LEN_MAX, FrameGeometry};

/// Rising taper of the 128-point window (8 kHz).
const BLOCKS_80W128_FIRST_HALF: [f32; 48] = [
    0.00000000, 0.03271908, 0.06540313, 0.09801714, 0.13052619, 0.16289547, 0.19509032, 0.22707626,
    0.25881905, 0.29028468, 0.32143947, 0.35225005, 0.38268343, 0.41270703, 0.44228869, 0.47139674,
    0.50000000, 0.52806785, 0.55557023, 0.58247770, 0.60876143, 0.63439328, 0.65934582, 0.68359230,
    0.70710678, 0.72986407, 0.75183981, 0.77301045, 0.79335334, 0.81284668, 0.83146961, 0.84920218,
    0.86602540, 0.88192126, 0.89687274, 0.91086382, 0.92387953, 0.93590593, 0.94693013, 0.95694034,
    0.96592583, 0.97387698, 0.98078528, 0.98664333, 0.99144486, 0.99518473, 0.99785892, 0.99946459,
];

/// Rising taper of the 256-point window (16 and 32 kHz).
const BLOCKS_160W256_FIRST_HALF: [f32; 96] = [
    0.00000000, 0.01636173, 0.03271908, 0.04906767, 0.06540313, 0.08172107, 0.09801714, 0.11428696,
    0.13052619, 0.14673047, 0.16289547, 0.17901686, 0.19509032, 0.21111155, 0.22707626, 0.24298018,
    0.25881905, 0.27458862, 0.29028468, 0.30590302, 0.32143947, 0.33688985, 0.35225005, 0.36751594,
    0.38268343, 0.39774847, 0.41270703, 0.42755509, 0.44228869, 0.45690388, 0.47139674, 0.48576339,
    0.50000000, 0.51410274, 0.52806785, 0.54189158, 0.55557023, 0.56910015, 0.58247770, 0.59569930,
    0.60876143, 0.62166057, 0.63439328, 0.64695615, 0.65934582, 0.67155895, 0.68359230, 0.69544264,
    0.70710678, 0.71858162, 0.72986407, 0.74095113, 0.75183981, 0.76252720, 0.77301045, 0.78328675,
    0.79335334, 0.80320753, 0.81284668, 0.82226822, 0.83146961, 0.84044840, 0.84920218, 0.85772861,
    0.86602540, 0.87409034, 0.88192126, 0.88951608, 0.89687274, 0.90398929, 0.91086382, 0.91749450,
    0.92387953, 0.93001722, 0.93590593, 0.94154407, 0.94693013, 0.95206268, 0.95694034, 0.96156180,
    0.96592583, 0.97003125, 0.97387698, 0.97746197, 0.98078528, 0.98384601, 0.98664333, 0.98917651,
    0.99144486, 0.99344778, 0.99518473, 0.99665524, 0.99785892, 0.99879546, 0.99946459, 0.99986614,
];

/// Build the full analysis window for `geometry`.
fn build_window(geometry: FrameGeometry) -> [f32; ANALYSIS_LEN_MAX] {
    let taper: &[f32] = if geometry.analysis_len == 128 {
        &BLOCKS_80W128_FIRST_HALF
    } else {
        &BLOCKS_160W256_FIRST_HALF
    };
    let len = geometry.analysis_len;
    let overlap = taper.len();
    let mut window = [0.0f32; ANALYSIS_LEN_MAX];
    for (i, w) in window[..len].iter_mut().enumerate() {
        *w = if i < overlap {
            taper[i]
        } else if i <= geometry.block_len {
            1.0
        } else {
            taper[len - i]
        };
    }
    window
}

/// Saturate a sample to the signed 16-bit range.
#[inline]
pub(crate) fn saturate_i16(x: f32) -> f32 {
    x.clamp(-32768.0, 32767.0)
}

/// Shift `buf` left by `frame.len()` and append `frame`.
fn shift_in(buf: &mut [f32], frame: &[f32]) {
    let keep = buf.len() - frame.len();
    buf.copy_within(frame.len().., 0);
    buf[keep..].copy_from_slice(frame);
}

/// Multiply `buf` by `window` into `out` and return the windowed energy.
fn apply_window(buf: &[f32], window: &[f32], out: &mut [f32]) -> f32 {
    let mut energy = 0.0f32;
    for ((o, &x), &w) in out.iter_mut().zip(buf).zip(window) {
        *o = w * x;
        energy += *o * *o;
    }
    energy
}

/// Sliding input buffers and the overlap-add accumulator of one stream.
#[derive(Debug)]
pub(crate) struct FrameWindow {
    block_len: usize,
    analysis_len: usize,
    window: [f32; ANALYSIS_LEN_MAX],
    analysis_buf: [f32; ANALYSIS_LEN_MAX],
    process_buf: [f32; ANALYSIS_LEN_MAX],
    high_band_buf: [f32; ANALYSIS_LEN_MAX],
    synthesis_buf: [f32; ANALYSIS_LEN_MAX],
}

impl FrameWindow {
    pub(crate) fn new(geometry: FrameGeometry) -> Self {
        Self {
            block_len: geometry.block_len,
            analysis_len: geometry.analysis_len,
            window: build_window(geometry),
            analysis_buf: [0.0; ANALYSIS_LEN_MAX],
            process_buf: [0.0; ANALYSIS_LEN_MAX],
            high_band_buf: [0.0; ANALYSIS_LEN_MAX],
            synthesis_buf: [0.0; ANALYSIS_LEN_MAX],
        }
    }

    /// The analysis window, `analysis_len` coefficients.
    #[cfg(test)]
    pub(crate) fn window(&self) -> &[f32] {
        &self.window[..self.analysis_len]
    }

    /// Append a frame to the analysis buffer and write the windowed buffer
    /// to `out`. Returns the windowed energy.
    pub(crate) fn analyze_frame(&mut self, frame: &[f32], out: &mut [f32]) -> f32 {
        let len = self.analysis_len;
        shift_in(&mut self.analysis_buf[..len], frame);
        apply_window(&self.analysis_buf[..len], &self.window[..len], out)
    }

    /// Append a frame (and its high band) to the processing buffers and
    /// write the windowed low band to `out`. Returns the windowed energy.
    pub(crate) fn process_frame(
        &mut self,
        frame: &[f32],
        high_band: Option<&[f32]>,
        out: &mut [f32],
    ) -> f32 {
        let len = self.analysis_len;
        shift_in(&mut self.process_buf[..len], frame);
        if let Some(high_band) = high_band {
            shift_in(&mut self.high_band_buf[..len], high_band);
        }
        apply_window(&self.process_buf[..len], &self.window[..len], out)
    }

    /// Overlap-add a windowed, `factor`-scaled time signal into the
    /// synthesis buffer and emit the oldest block into `out`.
    pub(crate) fn synthesize(&mut self, time: &[f32], factor: f32, out: &mut [f32]) {
        let len = self.analysis_len;
        for ((acc, &x), &w) in self.synthesis_buf[..len]
            .iter_mut()
            .zip(time)
            .zip(&self.window[..len])
        {
            *acc += factor * w * x;
        }
        self.emit_block(out);
    }

    /// Emit the oldest block of the synthesis buffer without adding anything.
    pub(crate) fn flush(&mut self, out: &mut [f32]) {
        self.emit_block(out);
    }

    /// Write the delayed high band, scaled by `gain`, into `out`.
    pub(crate) fn emit_high_band(&self, gain: f32, out: &mut [f32]) {
        for (o, &x) in out.iter_mut().zip(&self.high_band_buf[..self.block_len]) {
            *o = saturate_i16(gain * x);
        }
    }

    fn emit_block(&mut self, out: &mut [f32]) {
        let (len, block) = (self.analysis_len, self.block_len);
        for (o, &x) in out.iter_mut().zip(&self.synthesis_buf[..block]) {
            *o = saturate_i16(x);
        }
        self.synthesis_buf.copy_within(block..len, 0);
        self.synthesis_buf[len - block..len].fill(0.0);
    }
}
