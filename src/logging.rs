// src/logging.rs
//
// Telemetry sinks for evaluation runs.
// - EventSink: trait driven by the cut-loop evaluator
// - NoopSink:  discards all events
// - FileSink:  writes one JSON line per uncertainty iteration

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::eval::IterationSummary;

/// Abstract sink for per-iteration telemetry.
pub trait EventSink {
    fn log_iteration(&mut self, summary: &IterationSummary);
}

/// Sink that discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn log_iteration(&mut self, _summary: &IterationSummary) {
        // intentionally no-op
    }
}

/// JSONL file sink. Each iteration summary is one JSON object per line.
pub struct FileSink {
    writer: BufWriter<File>,
}

impl FileSink {
    /// Create a new sink writing to `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Flush buffered lines to disk.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl EventSink for FileSink {
    fn log_iteration(&mut self, summary: &IterationSummary) {
        if let Ok(json) = serde_json::to_string(summary) {
            let _ = writeln!(self.writer, "{}", json);
        }
    }
}
