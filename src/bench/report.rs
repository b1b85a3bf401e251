//! Report formatting and fan-out to output sinks.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::metrics::LevelReport;
use crate::config::{Mode, ReportFormat};

// ============================================================================
// Sinks
// ============================================================================

/// Destination for report text
pub trait ReportSink: Send {
    fn name(&self) -> &str;

    fn write_text(&mut self, text: &str) -> io::Result<()>;
}

/// Writes to the process stdout
#[derive(Debug, Default)]
pub struct StdoutSink;

impl ReportSink for StdoutSink {
    fn name(&self) -> &str {
        "stdout"
    }

    fn write_text(&mut self, text: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(text.as_bytes())?;
        out.flush()
    }
}

/// Appends to a log file that survives across runs
#[derive(Debug)]
pub struct FileSink {
    label: String,
    file: File,
}

impl FileSink {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            label: path.display().to_string(),
            file,
        })
    }
}

impl ReportSink for FileSink {
    fn name(&self) -> &str {
        &self.label
    }

    fn write_text(&mut self, text: &str) -> io::Result<()> {
        self.file.write_all(text.as_bytes())?;
        self.file.flush()
    }
}

/// In-memory buffer; clones share the same contents
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    buffer: Arc<Mutex<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        match self.buffer.lock() {
            Ok(buffer) => buffer.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ReportSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn write_text(&mut self, text: &str) -> io::Result<()> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory sink poisoned"))?;
        buffer.push_str(text);
        Ok(())
    }
}

// ============================================================================
// Reporter
// ============================================================================

/// Describes a run before any level starts
#[derive(Debug, Clone, Serialize)]
pub struct RunHeader {
    pub started_at: DateTime<Utc>,
    pub endpoint: String,
    pub mode: Mode,
    pub levels: Vec<usize>,
    pub repetitions: usize,
}

/// Emits every message to all registered sinks
pub struct Reporter {
    sinks: Vec<Box<dyn ReportSink>>,
    format: ReportFormat,
}

impl Reporter {
    pub fn new(format: ReportFormat) -> Self {
        Self {
            sinks: Vec::new(),
            format,
        }
    }

    pub fn with_sink(mut self, sink: impl ReportSink + 'static) -> Self {
        self.add_sink(Box::new(sink));
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn ReportSink>) {
        self.sinks.push(sink);
    }

    pub fn format(&self) -> ReportFormat {
        self.format
    }

    /// Write `text` to each sink; a failing sink does not stop the others
    pub fn emit(&mut self, text: &str) {
        for sink in &mut self.sinks {
            if let Err(e) = sink.write_text(text) {
                tracing::warn!(sink = sink.name(), error = %e, "Report sink write failed");
            }
        }
    }

    pub fn run_header(&mut self, header: &RunHeader) {
        let text = match self.format {
            ReportFormat::Text => format_run_header(header),
            ReportFormat::Json => json_line(&json!({ "run": header })),
        };
        self.emit(&text);
    }

    pub fn level_header(&mut self, concurrency: usize) {
        // JSON output carries the level inside each record
        if self.format == ReportFormat::Text {
            self.emit(&format!("\n-> Concurrency: {} requests\n", concurrency));
        }
    }

    pub fn report_level(&mut self, report: &LevelReport) {
        let text = match self.format {
            ReportFormat::Text => format_level(report),
            ReportFormat::Json => json_line(report),
        };
        self.emit(&text);
    }

    pub fn level_aborted(&mut self, concurrency: usize, error: &dyn std::fmt::Display) {
        let text = match self.format {
            ReportFormat::Text => format!("  Level aborted: {}\n\n", error),
            ReportFormat::Json => json_line(&json!({
                "concurrency": concurrency,
                "aborted": true,
                "error": error.to_string(),
            })),
        };
        self.emit(&text);
    }
}

fn json_line<T: Serialize + ?Sized>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(line) => format!("{}\n", line),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to serialize report line");
            String::new()
        }
    }
}

// ============================================================================
// Text formatting
// ============================================================================

fn format_run_header(header: &RunHeader) -> String {
    let levels: Vec<String> = header.levels.iter().map(|l| l.to_string()).collect();
    format!(
        "=== Benchmark started {} ===\n\
         Endpoint    : {}\n\
         Mode        : {}\n\
         Levels      : {}\n\
         Repetitions : {}\n",
        header.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        header.endpoint,
        header.mode,
        levels.join(", "),
        header.repetitions
    )
}

/// Fixed-precision number, or `n/a` for NaN
fn number(value: f64, precision: usize) -> String {
    if value.is_nan() {
        "n/a".to_string()
    } else {
        format!("{:.*}", precision, value)
    }
}

fn seconds(value: f64) -> String {
    if value.is_nan() {
        "n/a".to_string()
    } else {
        format!("{:.2} s", value)
    }
}

/// Render one finalized level as the text block
pub fn format_level(report: &LevelReport) -> String {
    let latency = if report.avg_latency_secs.is_nan() {
        "n/a".to_string()
    } else {
        format!(
            "{:.2} s (~{:.0} ms)",
            report.avg_latency_secs,
            report.avg_latency_secs * 1000.0
        )
    };

    let mut out = String::new();
    out.push_str(&format!(
        "  Requests/s (req/s)        : {}\n",
        number(report.requests_per_sec, 3)
    ));
    out.push_str(&format!(
        "  Tokens/s (tok/s)          : {}\n",
        number(report.tokens_per_sec, 1)
    ));
    out.push_str(&format!("  Avg latency (full answer) : {}\n", latency));
    if let Some(ttfb) = report.avg_ttfb_secs {
        out.push_str(&format!("  Avg TTFT (first token)    : {}\n", seconds(ttfb)));
    }
    out.push_str(&format!(
        "  Avg wall time per round   : {}\n",
        seconds(report.avg_wall_time_secs)
    ));
    out.push_str(&format!(
        "  Total tokens              : {}\n\n",
        report.total_tokens
    ));
    out
}
