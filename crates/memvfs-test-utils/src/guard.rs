// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! RAII wrapper used by `#[logged_test]`

use std::env;
use std::path::PathBuf;

use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;

use crate::logging::{DEFAULT_TRACE_FILTER, TRACE_FILTER_ENV};
use crate::{TestLogError, TestLogger};

/// Owns a test's [`TestLogger`] and routes `tracing` output into it.
///
/// The subscriber is installed as the thread default for the guard's
/// lifetime. Dropping the guard without [`TestLoggerGuard::finish_success`]
/// (including during a panic) records a failure.
pub struct TestLoggerGuard {
    logger: Option<TestLogger>,
    log_path: PathBuf,
    completed: bool,
    _trace: DefaultGuard,
}

impl TestLoggerGuard {
    pub fn new(test_name: &str) -> Result<Self, TestLogError> {
        let logger = TestLogger::new(test_name)?;
        let log_path = logger.log_path().to_path_buf();

        let filter = env::var(TRACE_FILTER_ENV).unwrap_or_else(|_| DEFAULT_TRACE_FILTER.to_string());
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(filter))
            .with_writer(logger.sink())
            .with_ansi(false)
            .with_target(true)
            .finish();
        let trace = tracing::subscriber::set_default(subscriber);

        Ok(Self {
            logger: Some(logger),
            log_path,
            completed: false,
            _trace: trace,
        })
    }

    /// The logger for ad-hoc test diagnostics
    pub fn logger(&mut self) -> &mut TestLogger {
        self.logger.as_mut().expect("TestLoggerGuard logger already finalized")
    }

    pub fn finish_success(mut self) -> Result<PathBuf, TestLogError> {
        self.completed = true;
        match self.logger.take() {
            Some(logger) => logger.finish_success(),
            None => Ok(self.log_path.clone()),
        }
    }

    pub fn finish_failure<S: AsRef<str>>(mut self, message: S) -> Result<PathBuf, TestLogError> {
        self.completed = true;
        match self.logger.take() {
            Some(logger) => logger.finish_failure(message.as_ref()),
            None => Ok(self.log_path.clone()),
        }
    }

    pub fn log_path(&self) -> &PathBuf {
        &self.log_path
    }
}

impl Drop for TestLoggerGuard {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let Some(logger) = self.logger.take() else {
            return;
        };
        let reason = if std::thread::panicking() {
            "test panicked"
        } else {
            "test exited without calling finish_success()"
        };
        if let Err(err) = logger.finish_failure(reason) {
            eprintln!(
                "failed to finalize TestLogger in Drop for {}: {}",
                self.log_path.display(),
                err
            );
        }
    }
}
