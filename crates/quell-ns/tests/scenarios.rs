//! End-to-end behavior of the noise suppressor on synthetic signals.

use std::f32::consts::PI;

use quell_ns::{NoiseSuppressor, NsConfig, SampleRate, SuppressionPolicy, ThresholdUpdate};

/// Deterministic uniform noise in `[-amplitude, amplitude]`.
struct Noise(u32);

impl Noise {
    fn frame(&mut self, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|_| {
                let mut x = self.0;
                x ^= x << 13;
                x ^= x >> 17;
                x ^= x << 5;
                self.0 = x;
                (x as f32 / u32::MAX as f32 - 0.5) * 2.0 * amplitude
            })
            .collect()
    }
}

fn initialized(rate: u32) -> NoiseSuppressor {
    let mut ns = NoiseSuppressor::new();
    ns.init(rate).unwrap();
    ns
}

fn tick(ns: &mut NoiseSuppressor, frame: &mut [f32]) {
    ns.analyze(frame).unwrap();
    ns.process(frame, None).unwrap();
}

#[test]
fn init_16k_geometry() {
    let ns = initialized(16_000);
    let g = ns.geometry().unwrap();
    assert_eq!(g.block_len, 160);
    assert_eq!(g.analysis_len, 256);
    assert_eq!(g.magn_len, 129);
    assert_eq!(ns.noise_spectrum().len(), 129);
    assert_eq!(ns.gains().len(), 129);
}

#[test]
fn zero_input_gives_zero_output() {
    let mut ns = initialized(16_000);
    for _ in 0..1000 {
        let mut frame = [0.0f32; 160];
        tick(&mut ns, &mut frame);
        assert!(frame.iter().all(|&x| x == 0.0));
    }
    let stats = ns.stats();
    assert_eq!(stats.analyzed_frames, 0);
    assert_eq!(stats.threshold_extractions, 0);
    assert!(ns.noise_spectrum().iter().all(|&n| n == 0.0));
    assert!(ns.histograms().lrt().iter().all(|&c| c == 0));
}

#[test]
fn silence_does_not_touch_learned_state() {
    let mut ns = initialized(16_000);
    let mut noise = Noise(11);
    for _ in 0..300 {
        let mut frame = noise.frame(160, 1000.0);
        tick(&mut ns, &mut frame);
    }
    // Two silent frames push the last samples out of the analysis buffer.
    for _ in 0..2 {
        tick(&mut ns, &mut [0.0f32; 160]);
    }

    let noise_spectrum = ns.noise_spectrum().to_vec();
    let conservative = ns.conservative_noise().to_vec();
    let histograms = ns.histograms().clone();
    let features = *ns.features();
    let prior_model = *ns.prior_model();
    let analyzed = ns.stats().analyzed_frames;

    let mut outputs = Vec::new();
    for _ in 0..50 {
        let mut frame = [0.0f32; 160];
        tick(&mut ns, &mut frame);
        assert!(frame.iter().all(|x| x.is_finite()));
        outputs.push(frame);
    }
    // The synthesis tail drains within the overlap.
    assert!(outputs[2..].iter().flatten().all(|&x| x == 0.0));

    assert_eq!(ns.noise_spectrum(), &noise_spectrum[..]);
    assert_eq!(ns.conservative_noise(), &conservative[..]);
    assert_eq!(ns.histograms().lrt(), histograms.lrt());
    assert_eq!(ns.histograms().spectral_flatness(), histograms.spectral_flatness());
    assert_eq!(ns.histograms().spectral_diff(), histograms.spectral_diff());
    assert_eq!(ns.features(), &features);
    assert_eq!(ns.prior_model(), &prior_model);
    assert_eq!(ns.stats().analyzed_frames, analyzed);
}

#[test]
fn white_noise_quantile_converges() {
    let mut ns = initialized(16_000);
    let mut noise = Noise(12345);
    // Uniform noise with unit-1000 standard deviation.
    let amplitude = 1000.0 * 3.0f32.sqrt();
    for _ in 0..400 {
        let mut frame = noise.frame(160, amplitude);
        tick(&mut ns, &mut frame);
    }

    // Bin magnitudes are Rayleigh with power sum(w^2) * sigma^2 = 160e6,
    // whose 25 % quantile is sqrt(-P ln 0.75).
    let expected = (-160.0e6f32 * 0.75f32.ln()).sqrt();
    let quantile = ns.quantile_noise();
    let ratios: Vec<f32> = quantile[4..125].iter().map(|q| q / expected).collect();
    let mean = ratios.iter().sum::<f32>() / ratios.len() as f32;
    assert!((0.85..=1.15).contains(&mean), "mean ratio {mean}");
    for (i, &r) in ratios.iter().enumerate() {
        assert!((0.4..=2.5).contains(&r), "bin {} ratio {r}", i + 4);
    }
}

#[test]
fn thresholds_are_learned_every_window() {
    let mut ns = initialized(16_000);
    let mut noise = Noise(3);
    for frame_index in 1..=1000u32 {
        let mut frame = noise.frame(160, 1000.0);
        tick(&mut ns, &mut frame);
        let expected = frame_index / 500;
        assert_eq!(
            ns.stats().threshold_extractions,
            expected,
            "after frame {frame_index}"
        );
    }
}

#[test]
fn thresholds_are_learned_once() {
    let mut ns = NoiseSuppressor::with_config(NsConfig {
        threshold_update: ThresholdUpdate::Once,
        ..NsConfig::default()
    });
    let mut noise = Noise(4);
    for _ in 0..500 {
        let mut frame = noise.frame(160, 1000.0);
        tick(&mut ns, &mut frame);
    }
    assert_eq!(ns.stats().threshold_extractions, 1);
    assert_eq!(ns.threshold_update(), ThresholdUpdate::Disabled);
    let learned = *ns.prior_model();

    for _ in 0..1000 {
        let mut frame = noise.frame(160, 1000.0);
        tick(&mut ns, &mut frame);
    }
    assert_eq!(ns.stats().threshold_extractions, 1);
    assert_eq!(ns.prior_model(), &learned);
    assert!(ns.histograms().lrt().iter().all(|&c| c == 0));
}

#[test]
fn disabled_learning_keeps_initial_model() {
    let mut ns = initialized(16_000);
    ns.set_threshold_update(ThresholdUpdate::Disabled).unwrap();
    let initial = *ns.prior_model();
    let mut noise = Noise(5);
    for _ in 0..600 {
        let mut frame = noise.frame(160, 1000.0);
        tick(&mut ns, &mut frame);
    }
    assert_eq!(ns.prior_model(), &initial);
    assert_eq!(ns.stats().threshold_extractions, 0);
}

#[test]
fn policy_change_applies_to_next_frame() {
    let mut ns = initialized(16_000);
    let mut noise = Noise(5);
    for _ in 0..100 {
        let mut frame = noise.frame(160, 1000.0);
        tick(&mut ns, &mut frame);
    }
    assert!(ns.gains().iter().all(|&g| g >= 0.5));

    let mut frame = noise.frame(160, 1000.0);
    ns.analyze(&frame).unwrap();
    ns.set_policy(3).unwrap();
    ns.process(&mut frame, None).unwrap();

    let bound = SuppressionPolicy::VeryAggressive.params().denoise_bound;
    let gains = ns.gains();
    assert!(gains.iter().all(|&g| (bound..=1.0).contains(&g)));
    let mean = gains.iter().sum::<f32>() / gains.len() as f32;
    assert!(mean < 0.4, "mean gain {mean}");
}

#[test]
fn tone_survives_while_noise_is_suppressed() {
    let mut ns = initialized(16_000);
    ns.set_suppression_policy(SuppressionPolicy::VeryAggressive)
        .unwrap();
    let bound = SuppressionPolicy::VeryAggressive.params().denoise_bound;
    let mut noise = Noise(42);

    // Two seconds of noise.
    let mut t = 0usize;
    for _ in 0..200 {
        let mut frame = noise.frame(160, 500.0);
        tick(&mut ns, &mut frame);
        t += 160;
    }

    // A 1 kHz tone at a tenth of full scale on top of the noise. Bin 16 is
    // 1000 * 256 / 16000.
    for frame_index in 0..=60 {
        let mut frame = noise.frame(160, 500.0);
        for (i, x) in frame.iter_mut().enumerate() {
            let phase = 2.0 * PI * 1000.0 * (t + i) as f32 / 16_000.0;
            *x += 3277.0 * phase.sin();
        }
        t += 160;
        tick(&mut ns, &mut frame);

        if frame_index >= 20 {
            let gains = ns.gains();
            assert!(gains[16] > 0.9, "frame {frame_index}: tone gain {}", gains[16]);
            let far = gains[64..=120].iter().sum::<f32>() / 57.0;
            assert!(far < bound + 0.05, "frame {frame_index}: far gain {far}");
        }
    }
    assert!(ns.stats().analyzed_frames > 200);
}

#[test]
fn stationary_tone_is_absorbed_into_noise_floor() {
    for policy in [
        SuppressionPolicy::Mild,
        SuppressionPolicy::Medium,
        SuppressionPolicy::Aggressive,
        SuppressionPolicy::VeryAggressive,
    ] {
        let mut ns = initialized(16_000);
        ns.set_suppression_policy(policy).unwrap();
        let bound = policy.params().denoise_bound;
        let mut noise = Noise(42);

        let mut t = 0usize;
        for _ in 0..200 {
            let mut frame = noise.frame(160, 500.0);
            tick(&mut ns, &mut frame);
            t += 160;
        }

        // Five seconds of a steady 1 kHz tone. Once the quantile trackers
        // have exported estimates that include it, the tone is noise.
        for frame_index in 0..500 {
            let mut frame = noise.frame(160, 500.0);
            for (i, x) in frame.iter_mut().enumerate() {
                let phase = 2.0 * PI * 1000.0 * (t + i) as f32 / 16_000.0;
                *x += 3277.0 * phase.sin();
            }
            t += 160;
            tick(&mut ns, &mut frame);

            let tone_gain = ns.gains()[16];
            if (20..=60).contains(&frame_index) {
                assert!(tone_gain > 0.9, "{policy:?} frame {frame_index}: {tone_gain}");
            }
            if frame_index >= 200 {
                assert!(
                    (tone_gain - bound).abs() < 1e-4,
                    "{policy:?} frame {frame_index}: {tone_gain}"
                );
            }
        }
    }
}

#[test]
fn high_band_gain_at_32k() {
    let mut ns = initialized(32_000);
    let mut noise = Noise(9);
    let mut high_band = [0.0f32; 160];
    for _ in 0..60 {
        let mut frame = noise.frame(160, 1000.0);
        high_band.fill(1000.0);
        ns.analyze(&frame).unwrap();
        ns.process(&mut frame, Some(&mut high_band)).unwrap();
    }
    let gain = ns.stats().high_band_gain.unwrap();
    assert!((0.5..=1.0).contains(&gain), "high band gain {gain}");
    for &x in &high_band {
        assert!((x - gain * 1000.0).abs() < 1e-2, "sample {x} vs gain {gain}");
    }
}

#[test]
fn silent_32k_frame_passes_high_band_unscaled() {
    let mut ns = initialized(32_000);
    let mut high_band = [0.0f32; 160];
    for _ in 0..3 {
        let mut frame = [0.0f32; 160];
        high_band.fill(40_000.0);
        ns.analyze(&frame).unwrap();
        ns.process(&mut frame, Some(&mut high_band)).unwrap();
    }
    // Delayed, unscaled and saturated.
    assert!(high_band.iter().all(|&x| x == 32767.0));
    assert_eq!(ns.stats().high_band_gain, None);
}

#[test]
fn every_rate_stays_finite() {
    for rate in [SampleRate::Hz8000, SampleRate::Hz16000, SampleRate::Hz32000] {
        for policy in [
            SuppressionPolicy::Mild,
            SuppressionPolicy::Medium,
            SuppressionPolicy::Aggressive,
            SuppressionPolicy::VeryAggressive,
        ] {
            let mut ns = NoiseSuppressor::with_config(NsConfig {
                sample_rate: rate,
                policy,
                ..NsConfig::default()
            });
            let block = rate.geometry().block_len;
            let bound = policy.params().denoise_bound;
            let mut noise = Noise(rate.hz());
            for _ in 0..250 {
                let mut frame = noise.frame(block, 2000.0);
                let mut high_band = noise.frame(block, 500.0);
                ns.analyze(&frame).unwrap();
                ns.process(&mut frame, Some(&mut high_band)).unwrap();
                assert!(frame.iter().all(|x| x.is_finite()));
                assert!(ns.gains().iter().all(|&g| (bound..=1.0).contains(&g)));
                assert!(ns.speech_probability().iter().all(|p| (0.0..=1.0).contains(p)));
                let prior = ns.prior_speech_probability();
                assert!((0.01..=1.0).contains(&prior));
            }
        }
    }
}
