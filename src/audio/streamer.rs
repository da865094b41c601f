//! Live PCM audio streaming from a remote encoded source.
//!
//! An ffmpeg child process decodes the remote stream to raw PCM on its
//! stdout. One dedicated producer thread does the blocking reads and feeds
//! a bounded channel; `read` is the async consumer end. Stopping kills the
//! child, which ends the producer at its next read.

use crate::utils::error::{Error, Result};
use std::io::Read;
use std::process::{Child, Command, Stdio};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Producer chunk size for one blocking read
const CHUNK_SIZE: usize = 16 * 1024;

/// Bounded chunks between producer and consumer
const RING_CAPACITY: usize = 32;

/// Output sample formats, named after ffmpeg's packed sample formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    U8,
    #[default]
    S16,
    S32,
    Flt,
    Dbl,
}

impl SampleFormat {
    fn ffmpeg_name(self) -> &'static str {
        match self {
            SampleFormat::U8 => "u8",
            SampleFormat::S16 => "s16le",
            SampleFormat::S32 => "s32le",
            SampleFormat::Flt => "f32le",
            SampleFormat::Dbl => "f64le",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AudioStreamOptions {
    pub sample_rate: u32,
    pub channels: u8,
    pub sample_format: SampleFormat,
}

impl Default for AudioStreamOptions {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            sample_format: SampleFormat::S16,
        }
    }
}

pub struct AudioStreamer {
    rx: mpsc::Receiver<Vec<u8>>,
    child: Option<Child>,
    leftover: Vec<u8>,
}

impl AudioStreamer {
    /// Spawn the decoder for `url` and start producing PCM.
    pub fn start(url: &str, options: &AudioStreamOptions) -> Result<Self> {
        let mut child = Command::new("ffmpeg")
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(url)
            .arg("-vn")
            .arg("-f")
            .arg(options.sample_format.ffmpeg_name())
            .arg("-ar")
            .arg(options.sample_rate.to_string())
            .arg("-ac")
            .arg(options.channels.to_string())
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(Error::Io)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::ExtractionFailed("decoder stdout unavailable".into()))?;

        let (tx, rx) = mpsc::channel(RING_CAPACITY);
        std::thread::Builder::new()
            .name("audio-producer".into())
            .spawn(move || produce(stdout, tx))
            .map_err(Error::Io)?;

        Ok(Self {
            rx,
            child: Some(child),
            leftover: Vec::new(),
        })
    }

    /// Fill `buf` with decoded PCM, waiting for data when the ring is
    /// empty. Returns the number of bytes written; 0 means end of stream.
    pub async fn read(&mut self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }

        if self.leftover.is_empty() {
            match self.rx.recv().await {
                Some(chunk) => self.leftover = chunk,
                None => return 0,
            }
        }

        let n = self.leftover.len().min(buf.len());
        buf[..n].copy_from_slice(&self.leftover[..n]);
        self.leftover.drain(..n);
        n
    }

    /// Kill the decoder and wake any pending reader. Reads after this drain
    /// whatever the producer already buffered, then report end of stream.
    pub fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!("Decoder already gone: {}", e);
            }
            if let Err(e) = child.wait() {
                warn!("Could not reap decoder: {}", e);
            }
        }
    }

    #[cfg(test)]
    fn from_channel(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            child: None,
            leftover: Vec::new(),
        }
    }
}

impl Drop for AudioStreamer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn produce(mut stdout: impl Read, tx: mpsc::Sender<Vec<u8>>) {
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        match stdout.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                // blocking_send applies back-pressure when the ring is full
                if tx.blocking_send(buf[..n].to_vec()).is_err() {
                    break; // consumer gone
                }
            }
            Err(e) => {
                debug!("Audio producer read ended: {}", e);
                break;
            }
        }
    }
}
