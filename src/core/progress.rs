//! Progress, log and cancellation plumbing shared by the orchestrator, the
//! block engine and the background job.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Fractional completion in `[0, 1]` with an optional log line
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub fraction: f64,
    pub message: Option<String>,
}

impl ProgressEvent {
    pub fn new(fraction: f64) -> Self {
        Self {
            fraction,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Receiver of progress and log notifications.
///
/// Implementations must not block: the worker calls these between tiles and
/// from inside the library copy callback.
pub trait ProgressSink {
    fn on_progress(&self, event: ProgressEvent);
    fn on_log(&self, message: &str);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_progress(&self, _event: ProgressEvent) {}
    fn on_log(&self, _message: &str) {}
}

/// Cancellation flag shared between the caller and the worker
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Forwards fractions to a sink, clamped to `[0, 1]` and never decreasing.
pub struct MonotonicProgress<'a> {
    sink: &'a dyn ProgressSink,
    last: Option<f64>,
}

impl<'a> MonotonicProgress<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self { sink, last: None }
    }

    pub fn report(&mut self, fraction: f64) {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        let fraction = match self.last {
            Some(last) if last > fraction => last,
            _ => fraction,
        };
        self.last = Some(fraction);
        self.sink.on_progress(ProgressEvent::new(fraction));
    }

    /// Emit the terminal 1.0 unless it was already the last event
    pub fn finish(&mut self) {
        if self.last != Some(1.0) {
            self.report(1.0);
        }
    }

    pub fn last(&self) -> Option<f64> {
        self.last
    }
}

/// Remaining time extrapolated linearly from the elapsed time
pub fn estimate_remaining(elapsed: Duration, fraction: f64) -> Option<Duration> {
    if !(fraction > 0.0 && fraction <= 1.0) {
        return None;
    }
    let total = elapsed.as_secs_f64() / fraction;
    Some(Duration::from_secs_f64((total - elapsed.as_secs_f64()).max(0.0)))
}

/// `ETA: HH:MM:SS`, or `ETA: Calculating...` before any progress
pub fn format_eta(elapsed: Duration, fraction: f64) -> String {
    match estimate_remaining(elapsed, fraction) {
        Some(remaining) => {
            let secs = remaining.as_secs();
            format!(
                "ETA: {:02}:{:02}:{:02}",
                secs / 3600,
                (secs % 3600) / 60,
                secs % 60
            )
        }
        None => "ETA: Calculating...".to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let worker_view = token.clone();
        assert!(!worker_view.is_cancelled());
        token.cancel();
        assert!(worker_view.is_cancelled());
    }

    #[test]
    fn monotonic_progress_never_goes_back() {
        let sink = RecordingSink::default();
        let mut progress = MonotonicProgress::new(&sink);
        for f in [0.1, 0.4, 0.3, 1.7, f64::NAN] {
            progress.report(f);
        }
        progress.finish();
        assert_eq!(sink.fractions(), vec![0.1, 0.4, 0.4, 1.0, 1.0]);
    }

    #[test]
    fn finish_emits_one_when_missing() {
        let sink = RecordingSink::default();
        let mut progress = MonotonicProgress::new(&sink);
        progress.report(0.5);
        progress.finish();
        assert_eq!(sink.fractions(), vec![0.5, 1.0]);
    }

    #[test]
    fn eta_formatting() {
        assert_eq!(format_eta(Duration::from_secs(10), 0.0), "ETA: Calculating...");
        assert_eq!(format_eta(Duration::from_secs(30), 0.25), "ETA: 00:01:30");
        assert_eq!(format_eta(Duration::from_secs(3600), 0.5), "ETA: 01:00:00");
        assert_eq!(format_eta(Duration::from_secs(5), 1.0), "ETA: 00:00:00");
    }
}
