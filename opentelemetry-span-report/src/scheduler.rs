use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use chrono::{DateTime, Local, TimeDelta, Timelike};
use opentelemetry::{otel_debug, otel_error, otel_info, otel_warn};

use crate::error::{ReportResult, SpanReportError};
use crate::report::ReportGenerator;
use crate::sink::ReportSink;
use crate::stats::StatsRegistry;

const ONE_HOUR: Duration = Duration::from_secs(60 * 60);

/// Computes when the next rotation is due.
///
/// Intervals of one hour or more fire at the next top of the hour on the
/// local wall clock. Shorter intervals, meant for accelerated testing, fire
/// exactly `interval` after `now`.
pub(crate) fn next_deadline(now: DateTime<Local>, interval: Duration) -> DateTime<Local> {
    if interval >= ONE_HOUR {
        // Step back over the elapsed part of the hour in absolute time; this
        // stays well defined across ambiguous or skipped local hours.
        let into_hour = TimeDelta::minutes(now.minute().into())
            + TimeDelta::seconds(now.second().into())
            + TimeDelta::nanoseconds(now.nanosecond().into());
        now - into_hour + TimeDelta::hours(1)
    } else {
        now + TimeDelta::from_std(interval).unwrap_or(TimeDelta::hours(1))
    }
}

fn until(deadline: DateTime<Local>) -> Duration {
    (deadline - Local::now()).to_std().unwrap_or(Duration::ZERO)
}

/// Runs one rotation: snapshot, write, then commit.
///
/// The baseline used for day and month boundary detection only advances when
/// a rotation completes, so an uncommitted rotation is fully retried by the
/// next one.
pub(crate) struct Rotator {
    generator: ReportGenerator,
    sink: Arc<dyn ReportSink>,
    last_rotation: Option<DateTime<Local>>,
}

impl Rotator {
    pub(crate) fn new(registry: Arc<StatsRegistry>, sink: Arc<dyn ReportSink>) -> Self {
        Rotator {
            generator: ReportGenerator::new(registry),
            sink,
            last_rotation: None,
        }
    }

    pub(crate) fn last_rotation(&self) -> Option<DateTime<Local>> {
        self.last_rotation
    }

    /// Rotates at `now` and returns the number of lines written.
    pub(crate) fn rotate(&mut self, now: DateTime<Local>) -> ReportResult<usize> {
        let snapshot = self.generator.snapshot(now, self.last_rotation);
        if snapshot.is_empty() {
            otel_debug!(name: "RotationScheduler.NothingToReport");
            self.last_rotation = Some(now);
            return Ok(0);
        }

        let lines = snapshot.lines();
        if let Err(e) = self.sink.write_lines(&lines) {
            otel_warn!(
                name: "RotationScheduler.SinkWriteFailed",
                error = format!("{}", e)
            );
            return Err(e);
        }

        snapshot.commit();
        self.last_rotation = Some(now);
        otel_debug!(name: "RotationScheduler.RotationCommitted", lines = lines.len());
        Ok(lines.len())
    }
}

impl fmt::Debug for Rotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rotator")
            .field("sink", &self.sink)
            .field("last_rotation", &self.last_rotation)
            .finish()
    }
}

#[derive(Debug)]
enum Message {
    Rotate(Sender<ReportResult<()>>),
    Shutdown(Sender<ReportResult<()>>),
}

/// Background thread that rotates the counters of a [`StatsRegistry`] on a
/// fixed cadence.
///
/// The thread waits for the next deadline or for a control message,
/// whichever comes first. On the deadline it rotates and computes the next
/// deadline. On [`RotationScheduler::shutdown`] it abandons the deadline,
/// performs a final rotation and exits. A failed rotation is logged and the
/// schedule carries on; there are no retries.
///
/// Dropping the scheduler shuts it down if that has not happened yet.
pub struct RotationScheduler {
    message_sender: Mutex<Sender<Message>>,
    is_shutdown: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RotationScheduler {
    /// Spawns the rotation thread.
    pub fn start(
        registry: Arc<StatsRegistry>,
        sink: Arc<dyn ReportSink>,
        interval: Duration,
    ) -> Self {
        let (message_sender, message_receiver): (Sender<Message>, Receiver<Message>) =
            mpsc::channel();
        let rotator = Rotator::new(registry, sink);

        let handle = thread::Builder::new()
            .name("OpenTelemetry.SpanReport.RotationScheduler".to_string())
            .spawn(move || run(rotator, message_receiver, interval));

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                otel_error!(
                    name: "RotationScheduler.ThreadStartError",
                    error = format!("{:?}", e)
                );
                None
            }
        };

        RotationScheduler {
            message_sender: Mutex::new(message_sender),
            is_shutdown: AtomicBool::new(false),
            handle: Mutex::new(handle),
        }
    }

    /// Returns `true` once [`RotationScheduler::shutdown`] has been called.
    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::Relaxed)
    }

    /// Rotates immediately on the scheduler thread and waits for the outcome.
    ///
    /// The pending deadline is not moved.
    pub fn force_rotate(&self) -> ReportResult<()> {
        if self.is_shutdown() {
            return Err(SpanReportError::AlreadyShutdown);
        }
        let (response_tx, response_rx) = mpsc::channel();
        self.message_sender
            .lock()?
            .send(Message::Rotate(response_tx))
            .map_err(|e| SpanReportError::InternalFailure(e.to_string()))?;

        response_rx
            .recv()
            .map_err(|_| SpanReportError::RotationFailed)?
    }

    /// Stops the schedule after one final rotation.
    ///
    /// Blocks until the final rotation has completed and the thread has
    /// exited. Calling it again returns [`SpanReportError::AlreadyShutdown`].
    pub fn shutdown(&self) -> ReportResult<()> {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(SpanReportError::AlreadyShutdown);
        }

        let (response_tx, response_rx) = mpsc::channel();
        self.message_sender
            .lock()?
            .send(Message::Shutdown(response_tx))
            .map_err(|e| SpanReportError::InternalFailure(e.to_string()))?;

        let result = response_rx
            .recv()
            .map_err(|_| SpanReportError::RotationFailed)?;

        if let Some(handle) = self.handle.lock()?.take() {
            let _ = handle.join();
        }
        result
    }
}

impl fmt::Debug for RotationScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotationScheduler")
            .field("is_shutdown", &self.is_shutdown())
            .finish()
    }
}

impl Drop for RotationScheduler {
    fn drop(&mut self) {
        if !self.is_shutdown() {
            if let Err(e) = self.shutdown() {
                otel_debug!(
                    name: "RotationScheduler.ShutdownOnDropFailed",
                    error = format!("{}", e)
                );
            }
        }
    }
}

fn run(mut rotator: Rotator, message_receiver: Receiver<Message>, interval: Duration) {
    let mut deadline = next_deadline(Local::now(), interval);
    otel_info!(
        name: "RotationScheduler.ThreadStarted",
        interval_secs = interval.as_secs(),
        first_rotation = deadline.to_rfc3339()
    );

    loop {
        match message_receiver.recv_timeout(until(deadline)) {
            Ok(Message::Rotate(response_sender)) => {
                otel_debug!(name: "RotationScheduler.RotatingDueToRequest");
                let result = rotator.rotate(Local::now()).map(|_| ());
                let _ = response_sender.send(result);
            }
            Ok(Message::Shutdown(response_sender)) => {
                otel_debug!(name: "RotationScheduler.RotatingDueToShutdown");
                let result = rotator.rotate(Local::now()).map(|_| ());
                let _ = response_sender.send(result);
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                let now = Local::now();
                if now < deadline {
                    // Woke up early against the wall clock; wait out the rest.
                    continue;
                }
                otel_debug!(name: "RotationScheduler.RotatingDueToTimer");
                if let Err(e) = rotator.rotate(now) {
                    otel_debug!(
                        name: "RotationScheduler.TimerRotationFailed",
                        error = format!("{}", e)
                    );
                }
                deadline = next_deadline(Local::now(), interval);
            }
            Err(RecvTimeoutError::Disconnected) => {
                otel_debug!(name: "RotationScheduler.ControlChannelClosed");
                let _ = rotator.rotate(Local::now());
                break;
            }
        }
    }

    otel_info!(
        name: "RotationScheduler.ThreadStopped",
        last_rotation = rotator
            .last_rotation()
            .map(|t| t.to_rfc3339())
            .unwrap_or_default()
    );
}
