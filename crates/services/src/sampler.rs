//! Fixed-cadence frame capture.

use std::future;
use std::time::Duration;

use image::imageops::{self, FilterType};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::debug;

use crate::capture::{FrameEncoder, FrameSource};
use crate::connection::ConnectionManager;
use crate::error::CaptureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerSettings {
    pub period: Duration,
    pub width: u32,
    pub height: u32,
}

impl SamplerSettings {
    pub const DEFAULT_PERIOD: Duration = Duration::from_millis(100);
    pub const DEFAULT_WIDTH: u32 = 640;
    pub const DEFAULT_HEIGHT: u32 = 480;
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            period: Self::DEFAULT_PERIOD,
            width: Self::DEFAULT_WIDTH,
            height: Self::DEFAULT_HEIGHT,
        }
    }
}

/// Where sampled frames go. Returns whether the frame was accepted.
pub trait FrameSink {
    fn send_frame(&mut self, frame: Vec<u8>) -> bool;
}

impl FrameSink for ConnectionManager {
    fn send_frame(&mut self, frame: Vec<u8>) -> bool {
        self.send(frame)
    }
}

impl FrameSink for Vec<Vec<u8>> {
    fn send_frame(&mut self, frame: Vec<u8>) -> bool {
        self.push(frame);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Sent,
    /// The sink did not take the frame.
    Refused,
    /// No capture data or the encoder failed.
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub ticks: u64,
    pub frames_sent: u64,
    pub frames_refused: u64,
    pub ticks_skipped: u64,
}

/// Captures, scales and encodes one frame per period while running.
///
/// The sampler owns at most one interval. `stop` drops it, so once `stop`
/// returns no further tick can complete.
pub struct FrameSampler {
    source: Box<dyn FrameSource>,
    encoder: Box<dyn FrameEncoder>,
    settings: SamplerSettings,
    interval: Option<Interval>,
    stats: SamplerStats,
}

impl FrameSampler {
    #[must_use]
    pub fn new(
        source: Box<dyn FrameSource>,
        encoder: Box<dyn FrameEncoder>,
        settings: SamplerSettings,
    ) -> Self {
        Self {
            source,
            encoder,
            settings,
            interval: None,
            stats: SamplerStats::default(),
        }
    }

    #[must_use]
    pub fn settings(&self) -> SamplerSettings {
        self.settings
    }

    #[must_use]
    pub fn stats(&self) -> SamplerStats {
        self.stats
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Acquire the capture device.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError` if the device is unavailable.
    pub fn open(&mut self) -> Result<(), CaptureError> {
        self.source.open()
    }

    /// Begin ticking. A no-op when already running; returns whether it started.
    pub fn start(&mut self) -> bool {
        if self.interval.is_some() {
            return false;
        }
        let period = self.settings.period;
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.interval = Some(interval);
        debug!(period_ms = period.as_millis() as u64, "sampler started");
        true
    }

    /// Halt ticking. Idempotent; returns whether it was running.
    pub fn stop(&mut self) -> bool {
        let was_running = self.interval.take().is_some();
        if was_running {
            debug!("sampler stopped");
        }
        was_running
    }

    /// Wait for the next tick. Never completes while stopped.
    ///
    /// Cancel safe.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => future::pending().await,
        }
    }

    /// Run one tick: capture, scale, encode and hand off to `sink`.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError` only when the device fails; per-tick problems
    /// are reported as `TickOutcome::Skipped`.
    pub fn sample(&mut self, sink: &mut dyn FrameSink) -> Result<TickOutcome, CaptureError> {
        self.stats.ticks += 1;

        let Some(frame) = self.source.capture()? else {
            debug!("no capture data, tick skipped");
            self.stats.ticks_skipped += 1;
            return Ok(TickOutcome::Skipped);
        };

        let (width, height) = (self.settings.width, self.settings.height);
        let frame = if frame.dimensions() == (width, height) {
            frame
        } else {
            imageops::resize(&frame, width, height, FilterType::Triangle)
        };

        let bytes = match self.encoder.encode(&frame) {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => {
                debug!("encoder produced no data, tick skipped");
                self.stats.ticks_skipped += 1;
                return Ok(TickOutcome::Skipped);
            }
            Err(err) => {
                debug!(error = %err, "encode failed, tick skipped");
                self.stats.ticks_skipped += 1;
                return Ok(TickOutcome::Skipped);
            }
        };

        if sink.send_frame(bytes) {
            self.stats.frames_sent += 1;
            Ok(TickOutcome::Sent)
        } else {
            self.stats.frames_refused += 1;
            Ok(TickOutcome::Refused)
        }
    }
}

impl std::fmt::Debug for FrameSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSampler")
            .field("settings", &self.settings)
            .field("running", &self.is_running())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{BlankFrameSource, JpegFrameEncoder};
    use crate::error::EncodeError;
    use image::RgbImage;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakySource {
        calls: usize,
    }

    impl FrameSource for FlakySource {
        fn open(&mut self) -> Result<(), CaptureError> {
            Ok(())
        }

        // Every other call has no data; the fifth call loses the device.
        fn capture(&mut self) -> Result<Option<RgbImage>, CaptureError> {
            self.calls += 1;
            match self.calls {
                5 => Err(CaptureError::DeviceLost("unplugged".into())),
                n if n % 2 == 0 => Ok(None),
                _ => Ok(Some(RgbImage::new(4, 4))),
            }
        }
    }

    struct CountingEncoder {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl FrameEncoder for CountingEncoder {
        fn encode(&self, frame: &RgbImage) -> Result<Vec<u8>, EncodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(frame.dimensions(), (32, 24));
            if self.fail {
                Err(EncodeError::Empty)
            } else {
                Ok(vec![1, 2, 3])
            }
        }
    }

    fn small() -> SamplerSettings {
        SamplerSettings {
            period: Duration::from_millis(100),
            width: 32,
            height: 24,
        }
    }

    fn blank_sampler() -> FrameSampler {
        FrameSampler::new(
            Box::new(BlankFrameSource::new(64, 48)),
            Box::new(JpegFrameEncoder::default()),
            small(),
        )
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let mut sampler = blank_sampler();
        assert!(sampler.start());
        assert!(!sampler.start());
        assert!(sampler.is_running());
        assert!(sampler.stop());
        assert!(!sampler.stop());
        assert!(!sampler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_follow_the_period() {
        let mut sampler = blank_sampler();
        sampler.start();
        let started = Instant::now();
        for _ in 0..3 {
            sampler.tick().await;
        }
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_sampler_never_ticks() {
        let mut sampler = blank_sampler();
        sampler.start();
        sampler.stop();
        let ticked = tokio::time::timeout(Duration::from_secs(5), sampler.tick()).await;
        assert!(ticked.is_err());
    }

    #[test]
    fn sample_scales_and_encodes() {
        let mut sampler = blank_sampler();
        sampler.open().unwrap();
        let mut sink: Vec<Vec<u8>> = Vec::new();
        assert_eq!(sampler.sample(&mut sink).unwrap(), TickOutcome::Sent);
        assert_eq!(sink.len(), 1);
        assert_eq!(&sink[0][..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&sink[0]).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn empty_ticks_and_encode_failures_are_skipped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut sampler = FrameSampler::new(
            Box::new(FlakySource { calls: 0 }),
            Box::new(CountingEncoder {
                calls: Arc::clone(&calls),
                fail: true,
            }),
            small(),
        );
        let mut sink: Vec<Vec<u8>> = Vec::new();
        for _ in 0..4 {
            assert_eq!(sampler.sample(&mut sink).unwrap(), TickOutcome::Skipped);
        }
        assert!(sink.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(sampler.stats().ticks_skipped, 4);

        // Device loss is the only error that surfaces.
        assert!(matches!(
            sampler.sample(&mut sink),
            Err(CaptureError::DeviceLost(_))
        ));
    }

    #[test]
    fn refused_frames_are_counted() {
        struct Closed;
        impl FrameSink for Closed {
            fn send_frame(&mut self, _frame: Vec<u8>) -> bool {
                false
            }
        }

        let mut sampler = blank_sampler();
        sampler.open().unwrap();
        assert_eq!(sampler.sample(&mut Closed).unwrap(), TickOutcome::Refused);
        assert_eq!(sampler.stats().frames_refused, 1);
        assert_eq!(sampler.stats().frames_sent, 0);
    }
}
