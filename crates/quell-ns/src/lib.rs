#![doc = include_str!("../README.md")]

pub mod config;
mod error;
pub(crate) mod features;
pub(crate) mod frame_window;
pub(crate) mod gain;
pub(crate) mod histograms;
pub(crate) mod noise_estimator;
mod noise_suppressor;
pub(crate) mod quantile_noise_estimator;
pub(crate) mod speech_probability;
pub mod stats;
pub(crate) mod threshold_learner;
pub mod transform;

// Public re-exports.
pub use config::{
    FrameGeometry, NsConfig, PolicyParams, SampleRate, SuppressionPolicy, ThresholdUpdate,
};
pub use error::NsError;
pub use features::FeatureData;
pub use histograms::Histograms;
pub use noise_suppressor::NoiseSuppressor;
pub use quell_fft::Rdft;
pub use stats::NsStats;
pub use threshold_learner::PriorModelParams;
pub use transform::SpectralTransform;
