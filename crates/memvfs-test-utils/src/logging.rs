// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Per-test log files
//!
//! Every test gets its own file under `target/test-logs/<date>/`. Successful
//! tests print a single line; failing tests print the log location and size
//! so the full trace can be inspected afterwards.

use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing_subscriber::fmt::MakeWriter;
use uuid::Uuid;

/// Environment variable overriding the trace filter captured into test logs
pub const TRACE_FILTER_ENV: &str = "MEMVFS_TEST_LOG";

/// Filter used when [`TRACE_FILTER_ENV`] is unset
pub const DEFAULT_TRACE_FILTER: &str = "memvfs_core=trace,memvfs_test_utils=debug";

#[derive(Error, Debug)]
pub enum TestLogError {
    #[error("test log I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("failed to write to test log file: {path}")]
    WriteError { path: PathBuf },

    #[error("invalid test name: {name}")]
    InvalidTestName { name: String },
}

type SharedWriter = Arc<Mutex<BufWriter<File>>>;

fn lock(writer: &SharedWriter) -> MutexGuard<'_, BufWriter<File>> {
    writer.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Writer handed to `tracing-subscriber`; every event lands in the test's log file
#[derive(Clone)]
pub struct LogSink {
    writer: SharedWriter,
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut writer = lock(&self.writer);
        writer.write_all(buf)?;
        writer.flush()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        lock(&self.writer).flush()
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LogSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Log file for a single test
pub struct TestLogger {
    log_path: PathBuf,
    writer: SharedWriter,
    test_name: String,
    start_time: DateTime<Utc>,
}

impl TestLogger {
    /// Create the log file for `test_name` and write its header
    ///
    /// ```rust
    /// use memvfs_test_utils::TestLogger;
    ///
    /// let mut logger = TestLogger::new("doc_example").unwrap();
    /// logger.log("mounted fixture").unwrap();
    /// logger.finish_success().unwrap();
    /// ```
    pub fn new(test_name: &str) -> Result<Self, TestLogError> {
        validate_test_name(test_name)?;

        let log_path = create_unique_test_log(test_name)?;
        let file = OpenOptions::new().create(true).write(true).truncate(true).open(&log_path)?;

        let mut logger = Self {
            log_path,
            writer: Arc::new(Mutex::new(BufWriter::new(file))),
            test_name: test_name.to_string(),
            start_time: Utc::now(),
        };
        logger.write_header()?;
        Ok(logger)
    }

    /// Append a timestamped line
    pub fn log(&mut self, message: &str) -> Result<(), TestLogError> {
        let timestamp = Utc::now().format("%H:%M:%S%.3f");
        let mut writer = lock(&self.writer);
        writeln!(writer, "[{}] {}", timestamp, message)
            .and_then(|_| writer.flush())
            .map_err(|_| TestLogError::WriteError {
                path: self.log_path.clone(),
            })
    }

    /// Append `data` as pretty JSON under `label`
    pub fn log_json<T: serde::Serialize>(&mut self, label: &str, data: &T) -> Result<(), TestLogError> {
        let json = serde_json::to_string_pretty(data).map_err(|_| TestLogError::WriteError {
            path: self.log_path.clone(),
        })?;
        self.log(&format!("{}: {}", label, json))
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// A tracing writer feeding this log file
    pub fn sink(&self) -> LogSink {
        LogSink {
            writer: self.writer.clone(),
        }
    }

    pub fn finish_success(mut self) -> Result<PathBuf, TestLogError> {
        let elapsed = self.elapsed_secs();
        self.log(&format!("Test completed successfully in {:.3}s", elapsed))?;
        println!("✅ {} passed", self.test_name);
        Ok(self.log_path)
    }

    pub fn finish_failure(mut self, error_message: &str) -> Result<PathBuf, TestLogError> {
        let elapsed = self.elapsed_secs();
        self.log(&format!("Test failed after {:.3}s: {}", elapsed, error_message))?;

        match fs::metadata(&self.log_path) {
            Ok(metadata) => println!(
                "❌ {} failed - Log: {} ({} bytes)",
                self.test_name,
                self.log_path.display(),
                metadata.len()
            ),
            Err(_) => println!("❌ {} failed - Log: {}", self.test_name, self.log_path.display()),
        }
        Ok(self.log_path)
    }

    fn elapsed_secs(&self) -> f64 {
        Utc::now().signed_duration_since(self.start_time).num_milliseconds() as f64 / 1000.0
    }

    fn write_header(&mut self) -> Result<(), TestLogError> {
        let mut writer = lock(&self.writer);
        writeln!(writer, "=== memvfs Test Log ===")?;
        writeln!(writer, "Test: {}", self.test_name)?;
        writeln!(writer, "Started: {}", self.start_time.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(writer, "Process: {}", std::process::id())?;
        writeln!(writer, "Thread: {}", std::thread::current().name().unwrap_or("unknown"))?;
        writeln!(writer, "=== Log Output ===")?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

/// Fresh log path `target/test-logs/<date>/<name>-<time>-<uuid>.log`,
/// creating the directory when needed
pub fn create_unique_test_log(test_name: &str) -> Result<PathBuf, TestLogError> {
    let now = Utc::now();
    let log_dir = find_workspace_root()?
        .join("target")
        .join("test-logs")
        .join(now.format("%Y-%m-%d").to_string());
    fs::create_dir_all(&log_dir)?;

    let filename = format!(
        "{}-{}-{}.log",
        sanitize_filename(test_name),
        now.format("%H-%M-%S"),
        Uuid::new_v4()
    );
    Ok(log_dir.join(filename))
}

/// Nearest ancestor whose Cargo.toml declares `[workspace]`, else the current directory
fn find_workspace_root() -> io::Result<PathBuf> {
    let current_dir = env::current_dir()?;
    for dir in current_dir.ancestors() {
        let manifest = dir.join("Cargo.toml");
        if fs::read_to_string(&manifest).is_ok_and(|content| content.contains("[workspace]")) {
            return Ok(dir.to_path_buf());
        }
    }
    Ok(current_dir)
}

fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' => c,
            _ => '_',
        })
        .collect()
}

fn validate_test_name(name: &str) -> Result<(), TestLogError> {
    if name.is_empty() || name.len() > 200 {
        return Err(TestLogError::InvalidTestName {
            name: name.chars().take(200).collect(),
        });
    }
    Ok(())
}
