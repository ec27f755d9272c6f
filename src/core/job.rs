//! Background conversion worker.
//!
//! A job owns one worker thread running `Converter::convert`. Progress, log
//! lines and the terminal outcome travel back over an unbounded channel, so
//! the worker never waits on the receiving side.
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error};

use crate::core::orchestrator::Converter;
use crate::core::params::ConversionRequest;
use crate::core::progress::{CancelToken, ProgressEvent, ProgressSink};
use crate::error::{Error, Result};
use crate::io::backend::RasterBackend;
use crate::types::ConversionOutcome;

/// Notification from a running job; `Finished` is always the last one
#[derive(Debug)]
pub enum JobEvent {
    Progress(ProgressEvent),
    Log(String),
    Finished(ConversionOutcome),
}

/// Sink that forwards everything onto a job channel.
pub struct ChannelSink {
    tx: Sender<JobEvent>,
}

impl ChannelSink {
    pub fn new(tx: Sender<JobEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&self, event: ProgressEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.tx.send(JobEvent::Progress(event));
    }

    fn on_log(&self, message: &str) {
        let _ = self.tx.send(JobEvent::Log(message.to_string()));
    }
}

pub struct ConversionJob {
    cancel: CancelToken,
    events: Receiver<JobEvent>,
    handle: Option<JoinHandle<()>>,
    finished: bool,
}

impl ConversionJob {
    /// Start `request` on a dedicated worker thread
    pub fn spawn<B>(converter: Converter<B>, request: ConversionRequest) -> Result<Self>
    where
        B: RasterBackend + Send + 'static,
    {
        debug!("Spawning conversion worker for {:?}", request.input);
        let (tx, events) = mpsc::channel();
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();

        let handle = thread::Builder::new()
            .name("rasterconv-worker".to_string())
            .spawn(move || {
                let sink = ChannelSink::new(tx.clone());
                let outcome = converter.convert(&request, &worker_cancel, &sink);
                let _ = tx.send(JobEvent::Finished(outcome));
            })?;

        Ok(Self {
            cancel,
            events,
            handle: Some(handle),
            finished: false,
        })
    }

    /// Ask the worker to stop at its next cancellation point
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Next event if one is queued
    pub fn try_recv(&mut self) -> Option<JobEvent> {
        if self.finished {
            return None;
        }
        match self.events.try_recv() {
            Ok(event) => Some(self.track(event)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.worker_lost()),
        }
    }

    /// Wait up to `timeout` for the next event
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<JobEvent> {
        if self.finished {
            return None;
        }
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(self.track(event)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(self.worker_lost()),
        }
    }

    /// Block until the next event; `None` once `Finished` has been delivered
    pub fn recv(&mut self) -> Option<JobEvent> {
        if self.finished {
            return None;
        }
        match self.events.recv() {
            Ok(event) => Some(self.track(event)),
            Err(_) => Some(self.worker_lost()),
        }
    }

    /// Drain events into `handler` until the job ends, then join the worker
    pub fn finish(mut self, mut handler: impl FnMut(&JobEvent)) -> ConversionOutcome {
        while let Some(event) = self.recv() {
            handler(&event);
            if let JobEvent::Finished(outcome) = event {
                self.join();
                return outcome;
            }
        }
        // recv only returns None after Finished was handed out
        ConversionOutcome::Failure(Error::External("job already finished".to_string()))
    }

    /// Block until the outcome, discarding intermediate events
    pub fn wait(self) -> ConversionOutcome {
        self.finish(|_| {})
    }

    fn track(&mut self, event: JobEvent) -> JobEvent {
        if matches!(event, JobEvent::Finished(_)) {
            self.finished = true;
        }
        event
    }

    fn worker_lost(&mut self) -> JobEvent {
        self.finished = true;
        error!("Conversion worker exited without reporting an outcome");
        JobEvent::Finished(ConversionOutcome::Failure(Error::External(
            "conversion worker terminated unexpectedly".to_string(),
        )))
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Conversion worker panicked");
            }
        }
    }
}

impl Drop for ConversionJob {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.cancel.cancel();
            self.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use super::*;
    use crate::io::memory::{MemoryBackend, MemoryRaster};
    use crate::types::{BandBuffer, DriverCapabilities, PixelType, Tile};

    fn backend() -> MemoryBackend {
        let backend = MemoryBackend::new().with_driver(
            "CREATE",
            DriverCapabilities {
                create: true,
                create_copy: false,
            },
        );
        backend.insert("/in/a", MemoryRaster::new(600, 300, &[PixelType::Byte]));
        backend
    }

    #[test]
    fn channel_sink_forwards_each_line_once() {
        let (tx, rx) = mpsc::channel();
        let sink = ChannelSink::new(tx);
        sink.on_log("Using Create method.");
        drop(sink);

        let events: Vec<JobEvent> = rx.iter().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], JobEvent::Log(line) if line == "Using Create method."));
    }

    #[test]
    fn finished_is_the_last_event() {
        let backend = backend();
        let job = ConversionJob::spawn(
            Converter::new(backend.clone()),
            ConversionRequest::new("/in/a", "/out/a", "CREATE"),
        )
        .unwrap();

        let mut seen = Vec::new();
        let outcome = job.finish(|event| {
            seen.push(match event {
                JobEvent::Progress(p) => format!("p{}", p.fraction),
                JobEvent::Log(_) => "log".to_string(),
                JobEvent::Finished(_) => "done".to_string(),
            })
        });

        assert!(outcome.is_success());
        assert_eq!(seen.last().map(String::as_str), Some("done"));
        assert_eq!(seen.iter().filter(|s| *s == "done").count(), 1);
        assert!(seen.contains(&"p1".to_string()));
        assert!(backend.get(Path::new("/out/a")).is_some());
    }

    #[test]
    fn failures_arrive_as_outcomes() {
        let job = ConversionJob::spawn(
            Converter::new(backend()),
            ConversionRequest::new("/in/missing", "/out/a", "CREATE"),
        )
        .unwrap();
        assert!(matches!(
            job.wait(),
            ConversionOutcome::Failure(Error::Open { .. })
        ));
    }

    #[test]
    fn cancel_from_caller_stops_the_worker() {
        let backend = backend();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let gate = std::sync::Mutex::new(gate_rx);
        // First tile's transform blocks until the caller has cancelled
        let blocking = move |_: &Tile, _: &mut [BandBuffer]| -> Result<()> {
            let _ = gate.lock().unwrap().recv();
            Ok(())
        };
        let converter = Converter::new(backend)
            .with_transform(Arc::new(blocking))
            .with_tile_size(100)
            .unwrap();
        let job = ConversionJob::spawn(
            converter,
            ConversionRequest::new("/in/a", "/out/a", "CREATE"),
        )
        .unwrap();

        job.cancel();
        drop(gate_tx);

        let mut fractions = Vec::new();
        let outcome = job.finish(|event| {
            if let JobEvent::Progress(p) = event {
                fractions.push(p.fraction);
            }
        });
        assert!(matches!(outcome, ConversionOutcome::Cancelled));
        assert!(fractions.iter().all(|&f| f < 1.0));
    }

    #[test]
    fn recv_returns_none_after_finished() {
        let mut job = ConversionJob::spawn(
            Converter::new(backend()),
            ConversionRequest::new("/in/a", "/out/a", "CREATE"),
        )
        .unwrap();
        loop {
            match job.recv() {
                Some(JobEvent::Finished(_)) => break,
                Some(_) => continue,
                None => panic!("job ended without an outcome"),
            }
        }
        assert!(job.recv().is_none());
        assert!(job.try_recv().is_none());
    }
}
