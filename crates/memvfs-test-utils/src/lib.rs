// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! memvfs test utilities
//!
//! Each test writes its full output, including `tracing` events from the
//! filesystem, to a unique file under `target/test-logs/`. Passing tests
//! print one line; failing tests print where the log is.

// lets `#[logged_test]` expand to `::memvfs_test_utils::...` inside this crate too
extern crate self as memvfs_test_utils;

pub mod guard;
pub mod logging;
pub mod macros;

pub use guard::TestLoggerGuard;
pub use logging::{create_unique_test_log, LogSink, TestLogError, TestLogger};
pub use memvfs_test_utils_macros::{logged_test, logged_tokio_test};

#[doc(hidden)]
pub use tracing as __tracing;
