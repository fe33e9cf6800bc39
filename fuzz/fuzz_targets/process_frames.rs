#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use quell_ns::NoiseSuppressor;

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    rate: u8,
    frames: Vec<FuzzFrame>,
    /// Samples cycled through to fill every frame
    samples: Vec<i16>,
}

#[derive(Debug, Arbitrary)]
struct FuzzFrame {
    /// Mode to switch to before processing, if any
    policy: Option<u8>,
    gain: u8,
}

fuzz_target!(|input: FuzzInput| {
    let rate = match input.rate % 3 {
        0 => 8000,
        1 => 16000,
        _ => 32000,
    };
    if input.samples.is_empty() {
        return;
    }

    let mut ns = NoiseSuppressor::new();
    ns.init(rate).unwrap();
    let block = ns.geometry().unwrap().block_len;

    let mut source = input.samples.iter().cycle();
    let mut frame = vec![0.0f32; block];
    let mut high_band = vec![0.0f32; block];

    for f in input.frames.iter().take(2000) {
        if let Some(policy) = f.policy {
            ns.set_policy(i32::from(policy % 4)).unwrap();
        }
        let scale = f32::from(f.gain) / 255.0;
        for (x, h) in frame.iter_mut().zip(high_band.iter_mut()) {
            let s = source.next().copied().unwrap_or_default();
            *x = f32::from(s) * scale;
            *h = f32::from(s);
        }

        ns.analyze(&frame).unwrap();
        ns.process(&mut frame, Some(&mut high_band)).unwrap();

        for &x in frame.iter().chain(&high_band) {
            assert!(x.is_finite());
            assert!((-32768.0..=32767.0).contains(&x));
        }
        assert!(ns.gains().iter().all(|g| (0.0..=1.0).contains(g)));
    }
});
