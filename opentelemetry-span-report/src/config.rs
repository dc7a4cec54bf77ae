use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub(crate) const OTEL_SPAN_REPORT_PATH: &str = "OTEL_SPAN_REPORT_PATH";
pub(crate) const OTEL_SPAN_REPORT_PATH_DEFAULT: &str = "./span_report.txt";
pub(crate) const OTEL_SPAN_REPORT_VERBOSE: &str = "OTEL_SPAN_REPORT_VERBOSE";
pub(crate) const OTEL_SPAN_REPORT_INTERVAL: &str = "OTEL_SPAN_REPORT_INTERVAL";
pub(crate) const OTEL_SPAN_REPORT_INTERVAL_DEFAULT: Duration = Duration::from_secs(60 * 60);

/// Span report exporter configuration.
/// Use [`SpanReportConfigBuilder`] to configure your own instance.
#[derive(Clone, Debug)]
pub struct SpanReportConfig {
    /// Location of the report file. Defaults to `./span_report.txt`.
    pub(crate) path: PathBuf,

    /// Log one diagnostic event per resource group of every ingested batch.
    pub(crate) verbose: bool,

    /// Rotation cadence. Intervals of one hour or more rotate at the top of
    /// every hour; shorter intervals rotate every `report_interval`.
    pub(crate) report_interval: Duration,
}

impl SpanReportConfig {
    /// The report file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether per-batch diagnostics are logged.
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// The rotation cadence.
    pub fn report_interval(&self) -> Duration {
        self.report_interval
    }
}

impl Default for SpanReportConfig {
    fn default() -> Self {
        SpanReportConfigBuilder::default().build()
    }
}

/// A builder for creating [`SpanReportConfig`] instances.
#[derive(Debug)]
pub struct SpanReportConfigBuilder {
    path: PathBuf,
    verbose: bool,
    report_interval: Duration,
}

impl Default for SpanReportConfigBuilder {
    /// Create a new [`SpanReportConfigBuilder`] initialized with the default values.
    /// The values are overridden by environment variables if set.
    /// The supported environment variables are:
    /// * `OTEL_SPAN_REPORT_PATH`
    /// * `OTEL_SPAN_REPORT_VERBOSE`
    /// * `OTEL_SPAN_REPORT_INTERVAL`
    fn default() -> Self {
        SpanReportConfigBuilder {
            path: PathBuf::from(OTEL_SPAN_REPORT_PATH_DEFAULT),
            verbose: false,
            report_interval: OTEL_SPAN_REPORT_INTERVAL_DEFAULT,
        }
        .init_from_env_vars()
    }
}

impl SpanReportConfigBuilder {
    /// Set the report file location.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Enable or disable per-batch diagnostic logging.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set the rotation cadence.
    ///
    /// A zero interval selects the one hour default, matching how a zero
    /// duration string is treated.
    pub fn with_report_interval(mut self, report_interval: Duration) -> Self {
        self.report_interval = if report_interval.is_zero() {
            OTEL_SPAN_REPORT_INTERVAL_DEFAULT
        } else {
            report_interval
        };
        self
    }

    /// Set the rotation cadence from a duration string such as `1h`, `15m`
    /// or `1h30m`. Non-positive or unparsable strings select the one hour
    /// default.
    pub fn with_report_interval_str(mut self, report_interval: &str) -> Self {
        self.report_interval =
            parse_duration(report_interval).unwrap_or(OTEL_SPAN_REPORT_INTERVAL_DEFAULT);
        self
    }

    /// Builds a `SpanReportConfig`.
    pub fn build(self) -> SpanReportConfig {
        SpanReportConfig {
            path: self.path,
            verbose: self.verbose,
            report_interval: self.report_interval,
        }
    }

    fn init_from_env_vars(mut self) -> Self {
        if let Some(path) = env::var(OTEL_SPAN_REPORT_PATH)
            .ok()
            .filter(|path| !path.is_empty())
        {
            self.path = PathBuf::from(path);
        }

        if let Some(verbose) = env::var(OTEL_SPAN_REPORT_VERBOSE)
            .ok()
            .and_then(|verbose| verbose.trim().to_ascii_lowercase().parse::<bool>().ok())
        {
            self.verbose = verbose;
        }

        if let Ok(interval) = env::var(OTEL_SPAN_REPORT_INTERVAL) {
            self = self.with_report_interval_str(&interval);
        }

        self
    }
}

/// Parses a duration string made of one or more decimal numbers, each with a
/// unit suffix: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. For example
/// `300ms`, `1.5h` or `2h45m`.
///
/// Returns `None` for malformed strings and for durations that are not
/// strictly positive.
pub(crate) fn parse_duration(input: &str) -> Option<Duration> {
    let mut rest = input.trim();
    if rest.is_empty() {
        return None;
    }
    if let Some(stripped) = rest.strip_prefix('+') {
        rest = stripped;
    } else if rest.starts_with('-') {
        return None;
    }

    let mut total_nanos: f64 = 0.0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        if number.is_empty() || number == "." {
            return None;
        }
        let value: f64 = number.parse().ok()?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let nanos_per_unit = match unit {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60.0 * 1e9,
            "h" => 3600.0 * 1e9,
            _ => return None,
        };
        total_nanos += value * nanos_per_unit;
        rest = tail;
    }

    if total_nanos < 1.0 || total_nanos > u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(total_nanos as u64))
}
