#![doc = include_str!("../README.md")]

pub mod rdft;

pub use rdft::{MAX_LENGTH, Rdft};
