//! A live, refreshing table of the current counts.
use std::{
    fmt,
    io::{BufRead, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use chrono::{DateTime, Local};
use opentelemetry::{otel_debug, otel_error, otel_warn};

use crate::error::{ReportResult, SpanReportError};
use crate::humanize::humanize;
use crate::key::GroupKey;
use crate::stats::{CounterBlock, StatsRegistry, Window};

const SERVICE_WIDTH: usize = 12;
const ENV_WIDTH: usize = 7;
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Shortens `value` to `width` characters, marking the cut with `…`.
fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() > width {
        let mut shortened: String = value.chars().take(width.saturating_sub(1)).collect();
        shortened.push('…');
        shortened
    } else {
        value.to_string()
    }
}

/// Formats whole seconds as `1h2m3s`, `2m3s` or `3s`.
fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs() + u64::from(uptime.subsec_millis() >= 500);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h{}m{}s", h, m, s)
    } else if m > 0 {
        format!("{}m{}s", m, s)
    } else {
        format!("{}s", s)
    }
}

fn window_cell(block: &CounterBlock, window: Window) -> String {
    let counts = block.window(window);
    format!(
        "{:>5} {:>5} {:>5}",
        humanize(counts.total),
        humanize(counts.http),
        humanize(counts.sql)
    )
}

/// Renders the current counts of every group as a fixed-width table.
///
/// Rows are sorted by service, then environment. Values read from the live
/// counters, so a row may combine values from slightly different instants.
pub fn render_table(registry: &StatsRegistry, now: DateTime<Local>, uptime: Duration) -> String {
    let mut entries: Vec<(GroupKey, Arc<CounterBlock>)> = registry.entries();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = String::new();
    out.push_str(&format!(
        " [Span Report Monitor]  Time: {} | Uptime: {}\n",
        now.format("%H:%M:%S"),
        format_uptime(uptime)
    ));
    out.push_str(" Legend: T=Total, H=HTTP, S=SQL\n\n");
    out.push_str(&format!(
        "{:<12} {:<7} | {:<17} | {:<17} | {:<18}\n",
        "SERVICE", "ENV", "  HOURLY (T/H/S)", "  DAILY (T/H/S)", "  MONTHLY (T/H/S)"
    ));
    out.push_str(&format!(
        "{}+{}+{}+{}\n",
        "-".repeat(SERVICE_WIDTH + ENV_WIDTH + 2),
        "-".repeat(19),
        "-".repeat(19),
        "-".repeat(20)
    ));

    for (key, block) in &entries {
        out.push_str(&format!(
            "{:<12} {:<7} | {} | {} | {}\n",
            truncate(key.service(), SERVICE_WIDTH),
            truncate(key.environment(), ENV_WIDTH),
            window_cell(block, Window::Hourly),
            window_cell(block, Window::Daily),
            window_cell(block, Window::Monthly),
        ));
    }

    out.push_str("\n (Press 'q' to close the monitor)\n");
    out
}

/// Redraws [`render_table`] on a writer at a fixed refresh rate.
///
/// The monitor only reads the registry. Stopping it has no effect on
/// ingestion or on the rotation schedule.
pub struct Monitor {
    message_sender: Mutex<Sender<()>>,
    is_stopped: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Monitor {
    /// Starts redrawing on `out` every `refresh`.
    pub fn start<W>(registry: Arc<StatsRegistry>, out: W, refresh: Duration) -> Self
    where
        W: Write + Send + 'static,
    {
        let (message_sender, message_receiver) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("OpenTelemetry.SpanReport.Monitor".to_string())
            .spawn(move || draw_loop(registry, out, refresh, message_receiver));

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                otel_error!(
                    name: "Monitor.ThreadStartError",
                    error = format!("{:?}", e)
                );
                None
            }
        };

        Monitor {
            message_sender: Mutex::new(message_sender),
            is_stopped: AtomicBool::new(false),
            handle: Mutex::new(handle),
        }
    }

    /// Returns `true` once the monitor has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.is_stopped.load(Ordering::Relaxed)
    }

    /// Stops redrawing and waits for the drawing thread to exit.
    pub fn stop(&self) -> ReportResult<()> {
        if self.is_stopped.swap(true, Ordering::Relaxed) {
            return Ok(());
        }
        // The thread may already be gone after a write error.
        let _ = self.message_sender.lock()?.send(());
        if let Some(handle) = self.handle.lock()?.take() {
            handle
                .join()
                .map_err(|_| SpanReportError::InternalFailure("monitor thread panicked".into()))?;
        }
        Ok(())
    }

    /// Reads `input` line by line until a `q` (or `quit`) line or the end of
    /// input, then stops the monitor.
    pub fn stop_on_quit<R: BufRead>(&self, input: R) -> ReportResult<()> {
        for line in input.lines() {
            let line = line.map_err(|e| SpanReportError::InternalFailure(e.to_string()))?;
            let command = line.trim();
            if command.eq_ignore_ascii_case("q") || command.eq_ignore_ascii_case("quit") {
                otel_debug!(name: "Monitor.QuitRequested");
                break;
            }
        }
        self.stop()
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("is_stopped", &self.is_stopped())
            .finish()
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn draw_loop<W: Write>(
    registry: Arc<StatsRegistry>,
    mut out: W,
    refresh: Duration,
    message_receiver: Receiver<()>,
) {
    let started = Instant::now();
    loop {
        let frame = render_table(&registry, Local::now(), started.elapsed());
        let written = out
            .write_all(CLEAR_SCREEN.as_bytes())
            .and_then(|_| out.write_all(frame.as_bytes()))
            .and_then(|_| out.flush());
        if let Err(e) = written {
            otel_warn!(name: "Monitor.WriteFailed", error = format!("{}", e));
            break;
        }

        match message_receiver.recv_timeout(refresh) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    otel_debug!(name: "Monitor.Stopped");
}

#[cfg(test)]
mod tests {
    use super::{format_uptime, render_table, truncate, Monitor};
    use crate::classify::SpanCategories;
    use crate::key::GroupKey;
    use crate::stats::StatsRegistry;
    use chrono::{Local, TimeZone};
    use std::io::{self, Cursor, Write};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn truncate_marks_cut_with_ellipsis() {
        assert_eq!(truncate("checkout", 12), "checkout");
        assert_eq!(truncate("recommendation", 12), "recommendat…");
        assert_eq!(truncate("production", 7), "produc…");
        assert_eq!(truncate("prod", 7), "prod");
    }

    #[test]
    fn truncate_counts_characters_not_bytes() {
        assert_eq!(truncate("ünïcödé-sérvice", 7), "ünïcöd…");
    }

    #[test]
    fn uptime_is_rounded_to_seconds() {
        assert_eq!(format_uptime(Duration::from_millis(400)), "0s");
        assert_eq!(format_uptime(Duration::from_millis(1_600)), "2s");
        assert_eq!(format_uptime(Duration::from_secs(65)), "1m5s");
        assert_eq!(format_uptime(Duration::from_secs(3_723)), "1h2m3s");
        assert_eq!(format_uptime(Duration::from_secs(7_200)), "2h0m0s");
    }

    #[test]
    fn table_rows_are_sorted_and_humanized() {
        let registry = StatsRegistry::new();
        registry
            .get_or_create(&GroupKey::new("web", "prod"))
            .increment_all(SpanCategories::other().with_http(), 1_250_000);
        registry
            .get_or_create(&GroupKey::new("api", "staging"))
            .increment_all(SpanCategories::other().with_sql(), 42);
        registry
            .get_or_create(&GroupKey::new("api", "dev"))
            .increment_all(SpanCategories::other(), 9_999);

        let now = Local.with_ymd_and_hms(2025, 12, 18, 14, 5, 9).unwrap();
        let table = render_table(&registry, now, Duration::from_secs(65));

        assert!(table.starts_with(" [Span Report Monitor]  Time: 14:05:09 | Uptime: 1m5s\n"));
        assert!(table.contains(" Legend: T=Total, H=HTTP, S=SQL\n"));

        let api_dev = table.find("api          dev     |").unwrap();
        let api_staging = table.find("api          staging |").unwrap();
        let web_prod = table.find("web          prod    |").unwrap();
        assert!(api_dev < api_staging && api_staging < web_prod);

        assert!(table.contains("web          prod    |  1.2M  1.2M     0 |  1.2M  1.2M     0 |  1.2M  1.2M     0\n"));
        assert!(table.contains("api          staging |    42     0    42 |"));
        assert!(table.contains("api          dev     |  9999     0     0 |"));
        assert!(table.trim_end().ends_with("(Press 'q' to close the monitor)"));
    }

    #[test]
    fn empty_registry_renders_header_only() {
        let table = render_table(&StatsRegistry::new(), Local::now(), Duration::ZERO);
        assert!(table.contains("SERVICE      ENV     |   HOURLY (T/H/S)"));
        // Title, legend, blank, header, separator, blank, hint.
        assert_eq!(table.lines().count(), 7);
    }

    #[test]
    fn monitor_draws_until_stopped() {
        let registry = Arc::new(StatsRegistry::new());
        registry
            .get_or_create(&GroupKey::new("svc", "dev"))
            .increment_all(SpanCategories::other(), 3);
        let buffer = SharedBuffer::default();

        let monitor = Monitor::start(
            Arc::clone(&registry),
            buffer.clone(),
            Duration::from_millis(10),
        );
        std::thread::sleep(Duration::from_millis(100));
        monitor.stop().unwrap();
        assert!(monitor.is_stopped());

        let frames = buffer.contents();
        assert!(frames.matches("[Span Report Monitor]").count() >= 2);
        assert!(frames.contains("svc          dev     |     3     0     0"));

        // No further frames once stopped.
        let len = frames.len();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(buffer.contents().len(), len);
        // The registry is untouched by the monitor.
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn quit_line_stops_monitor() {
        let monitor = Monitor::start(
            Arc::new(StatsRegistry::new()),
            io::sink(),
            Duration::from_secs(1),
        );

        monitor
            .stop_on_quit(Cursor::new("hello\n q \nmore\n"))
            .unwrap();

        assert!(monitor.is_stopped());
    }
}
