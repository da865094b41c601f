//! Progress reporting for the download driver.
//!
//! One snapshot per callback. `downloaded`/`total` count bytes across the
//! whole operation (both streams of a merge pair share one counter), so a
//! consumer can render a single bar for a two-stream download. ETA is
//! derived from the current rate rather than stored, which keeps snapshots
//! trivially cloneable.

use std::time::Duration;

/// Where the operation currently is
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DownloadPhase {
    #[default]
    Starting,
    Transferring,
    /// Streams landed, ffmpeg is combining them
    Remuxing,
    Done,
}

/// Snapshot handed to progress callbacks
#[derive(Debug, Clone, Default)]
pub struct DownloadProgress {
    pub phase: DownloadPhase,
    pub downloaded: u64,
    /// 0 when the server never told us
    pub total: u64,
    /// Bytes per second over the transfer so far
    pub rate: f64,
}

impl DownloadProgress {
    pub fn starting(total: u64) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Record bytes received and the measured rate.
    pub fn record(&mut self, downloaded: u64, rate: f64) {
        self.downloaded = downloaded;
        self.rate = rate;
        self.phase = DownloadPhase::Transferring;
    }

    pub fn remuxing(&mut self) {
        self.phase = DownloadPhase::Remuxing;
    }

    pub fn done(&mut self) {
        self.downloaded = self.downloaded.max(self.total);
        self.phase = DownloadPhase::Done;
    }

    /// Time left at the current rate. None while the rate or the total is
    /// unknown.
    pub fn eta(&self) -> Option<Duration> {
        if self.total == 0 || self.rate <= 0.0 {
            return None;
        }
        let remaining = self.total.saturating_sub(self.downloaded);
        Some(Duration::from_secs_f64(remaining as f64 / self.rate))
    }

    /// Completed fraction in [0, 1]; 0 while the total is unknown.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.downloaded as f64 / self.total as f64).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_starts_idle() {
        let p = DownloadProgress::starting(4096);
        assert_eq!(p.phase, DownloadPhase::Starting);
        assert_eq!(p.downloaded, 0);
        assert_eq!(p.total, 4096);
        assert_eq!(p.eta(), None);
        assert_eq!(p.fraction(), 0.0);
    }

    #[test]
    fn record_enters_transfer_phase() {
        let mut p = DownloadProgress::starting(1000);
        p.record(250, 50.0);
        assert_eq!(p.phase, DownloadPhase::Transferring);
        assert_eq!(p.downloaded, 250);
        assert!((p.fraction() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn eta_is_remaining_over_rate() {
        let mut p = DownloadProgress::starting(1000);
        p.record(600, 100.0);
        assert_eq!(p.eta().unwrap().as_secs(), 4);
    }

    #[test]
    fn eta_unknown_without_rate_or_total() {
        let mut p = DownloadProgress::starting(1000);
        p.record(600, 0.0);
        assert_eq!(p.eta(), None);

        let mut open_ended = DownloadProgress::starting(0);
        open_ended.record(600, 100.0);
        assert_eq!(open_ended.eta(), None);
    }

    #[test]
    fn fraction_caps_at_one() {
        let mut p = DownloadProgress::starting(1000);
        p.record(1500, 10.0);
        assert_eq!(p.fraction(), 1.0);
    }

    #[test]
    fn fraction_with_unknown_total_stays_zero() {
        let mut p = DownloadProgress::starting(0);
        p.record(123, 10.0);
        assert_eq!(p.fraction(), 0.0);
    }

    #[test]
    fn done_pins_the_counter_to_total() {
        let mut p = DownloadProgress::starting(1000);
        p.record(990, 50.0);
        p.done();
        assert_eq!(p.phase, DownloadPhase::Done);
        assert_eq!(p.downloaded, 1000);
        assert_eq!(p.fraction(), 1.0);
        assert_eq!(p.eta().unwrap().as_secs(), 0);
    }

    #[test]
    fn eta_shrinks_as_bytes_land() {
        let mut p = DownloadProgress::starting(1000);
        p.record(200, 100.0);
        let early = p.eta().unwrap();
        p.record(800, 100.0);
        let late = p.eta().unwrap();
        assert!(early > late);
    }
}
