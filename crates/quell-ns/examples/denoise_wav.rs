//! Denoise a mono 16-bit WAV file.
//!
//! ```sh
//! RUST_LOG=quell_ns=debug cargo run -p quell-ns --features examples --example denoise_wav -- --policy 2 in.wav out.wav
//! ```

use anyhow::{Context, Result, bail};
use clap::Parser;
use hound::{SampleFormat, WavReader, WavWriter};
use tracing::info;
use tracing_subscriber::EnvFilter;

use quell_ns::{NoiseSuppressor, SampleRate};

#[derive(Parser, Debug)]
#[command(about = "Suppress stationary noise in a mono 8 or 16 kHz WAV file")]
struct Args {
    /// Input WAV file (mono, 16-bit integer).
    input: String,

    /// Output WAV file.
    output: String,

    /// Suppression mode, 0 (mild) to 3 (very aggressive).
    #[arg(short, long, default_value_t = 1)]
    policy: i32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let mut reader = WavReader::open(&args.input)
        .with_context(|| format!("failed to open {}", args.input))?;
    let spec = reader.spec();
    if spec.channels != 1 || spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        bail!("expected mono 16-bit integer PCM, got {spec:?}");
    }
    let sample_rate = SampleRate::try_from(spec.sample_rate)?;
    if sample_rate == SampleRate::Hz32000 {
        bail!("32 kHz input needs a band splitter; resample to 16 kHz first");
    }

    let mut ns = NoiseSuppressor::new();
    ns.init(sample_rate.hz())?;
    ns.set_policy(args.policy)?;
    let block = sample_rate.geometry().block_len;

    let samples = reader
        .samples::<i16>()
        .map(|s| s.map(f32::from))
        .collect::<Result<Vec<_>, _>>()?;

    let mut writer = WavWriter::create(&args.output, spec)?;
    let mut frame = vec![0.0f32; block];
    let mut frames = 0usize;
    for chunk in samples.chunks(block) {
        frame.fill(0.0);
        frame[..chunk.len()].copy_from_slice(chunk);

        ns.analyze(&frame)?;
        ns.process(&mut frame, None)?;
        frames += 1;

        for &s in &frame {
            // Already saturated to the 16-bit range.
            writer.write_sample(s as i16)?;
        }
    }
    writer.finalize()?;

    let stats = ns.stats();
    info!(
        frames,
        analyzed = stats.analyzed_frames,
        threshold_extractions = stats.threshold_extractions,
        prior_speech_probability = stats.prior_speech_probability,
        "done"
    );
    println!("Wrote {} ({} frames)", args.output, frames);

    Ok(())
}
