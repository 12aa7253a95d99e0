// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Assertions recorded as `tracing` events
//!
//! Inside a `#[logged_test]` the guard's subscriber captures these events, so
//! the test log shows every checked expression interleaved with the
//! filesystem's own trace, right up to the one that failed.

/// Event target used by the assertion macros
pub const ASSERT_TARGET: &str = "memvfs_test_utils::assert";

/// Assert `condition` and record the outcome
///
/// ```rust
/// use memvfs_test_utils::logged_assert;
///
/// logged_assert!(1 + 1 == 2);
/// logged_assert!("abc".len() == 3, "length of {:?}", "abc");
/// ```
#[macro_export]
macro_rules! logged_assert {
    ($condition:expr $(,)?) => {
        $crate::logged_assert!($condition, "{}", stringify!($condition))
    };
    ($condition:expr, $($message:tt)+) => {{
        let __description = format!($($message)+);
        if $condition {
            $crate::__tracing::debug!(target: $crate::macros::ASSERT_TARGET, check = %__description, "passed");
        } else {
            $crate::__tracing::error!(target: $crate::macros::ASSERT_TARGET, check = %__description, "failed");
            panic!("assertion failed: {}", __description);
        }
    }};
}

/// Assert `left == right`; both values are recorded either way
#[macro_export]
macro_rules! logged_assert_eq {
    ($left:expr, $right:expr $(,)?) => {
        $crate::logged_assert_eq!($left, $right, "{} == {}", stringify!($left), stringify!($right))
    };
    ($left:expr, $right:expr, $($message:tt)+) => {{
        match (&$left, &$right) {
            (left, right) => {
                let __description = format!($($message)+);
                if *left == *right {
                    $crate::__tracing::debug!(
                        target: $crate::macros::ASSERT_TARGET,
                        check = %__description,
                        value = ?left,
                        "passed"
                    );
                } else {
                    $crate::__tracing::error!(
                        target: $crate::macros::ASSERT_TARGET,
                        check = %__description,
                        left = ?left,
                        right = ?right,
                        "failed"
                    );
                    panic!(
                        "assertion `{}` failed\n  left: {:?}\n right: {:?}",
                        __description, left, right
                    );
                }
            }
        }
    }};
}
