//! Destinations for rendered report lines.
use std::fmt::Debug;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{ReportResult, SpanReportError};

/// Persists report lines produced by a rotation.
///
/// A sink is only invoked when there is at least one line to write. Returning
/// an error keeps the rotation uncommitted: the counters are left as they
/// were and the lines are produced again, with fresher values, on the next
/// rotation.
pub trait ReportSink: Send + Sync + Debug {
    /// Appends `lines` to the sink.
    fn write_lines(&self, lines: &[String]) -> ReportResult<()>;
}

/// Appends report lines to a text file, creating it when absent.
///
/// The file is opened for every rotation and closed right after, so it can be
/// rotated or removed externally between writes.
#[derive(Clone, Debug)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    /// Creates a sink writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSink { path: path.into() }
    }

    /// The file this sink appends to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sink_error(&self, source: std::io::Error) -> SpanReportError {
        SpanReportError::Sink {
            path: self.path.clone(),
            source,
        }
    }
}

impl ReportSink for FileSink {
    fn write_lines(&self, lines: &[String]) -> ReportResult<()> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| self.sink_error(e))?;
        let mut writer = BufWriter::new(file);
        for line in lines {
            writeln!(writer, "{}", line).map_err(|e| self.sink_error(e))?;
        }
        writer.flush().map_err(|e| self.sink_error(e))
    }
}

/// Keeps report lines in memory.
///
/// Useful for tests and for hosts that forward reports elsewhere. Clones
/// share the same storage.
#[derive(Clone, Debug, Default)]
pub struct InMemoryReportSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl InMemoryReportSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        InMemoryReportSink::default()
    }

    /// Returns every line written so far.
    pub fn get_lines(&self) -> ReportResult<Vec<String>> {
        Ok(self.lines.lock()?.clone())
    }

    /// Discards the stored lines.
    pub fn reset(&self) {
        let _ = self.lines.lock().map(|mut lines| lines.clear());
    }
}

impl ReportSink for InMemoryReportSink {
    fn write_lines(&self, lines: &[String]) -> ReportResult<()> {
        self.lines.lock()?.extend_from_slice(lines);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{FileSink, InMemoryReportSink, ReportSink};
    use crate::error::SpanReportError;

    #[test]
    fn file_sink_appends_and_creates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("span_report.txt");
        let sink = FileSink::new(&path);

        sink.write_lines(&["first".to_string()]).unwrap();
        sink.write_lines(&["second".to_string(), "third".to_string()])
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "first\nsecond\nthird\n");
    }

    #[test]
    fn file_sink_reports_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("missing").join("report.txt"));

        let err = sink.write_lines(&["line".to_string()]).unwrap_err();

        assert!(matches!(err, SpanReportError::Sink { .. }));
    }

    #[test]
    fn in_memory_sink_shares_storage_between_clones() {
        let sink = InMemoryReportSink::new();
        let clone = sink.clone();

        clone.write_lines(&["a".to_string()]).unwrap();
        assert_eq!(sink.get_lines().unwrap(), vec!["a".to_string()]);

        sink.reset();
        assert!(clone.get_lines().unwrap().is_empty());
    }
}
