//! Live audio decoding

pub mod streamer;

pub use streamer::{AudioStreamOptions, AudioStreamer, SampleFormat};
