// SPDX-License-Identifier: CEPL-1.0
//! Errors raised by the frame-pacing core.
//!
//! Every variant is fatal: once a GPU call fails for any reason other than a
//! stale surface, device state can no longer be trusted. Staleness is not an
//! error and travels as [`TickOutcome::OutOfDate`](crate::TickOutcome).

use ash::vk;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    /// A GPU call returned an unrecoverable result.
    #[error("{op} failed: {result}")]
    Device {
        op: &'static str,
        #[source]
        result: vk::Result,
    },

    /// A bounded wait expired. Points at a hung GPU; never retried.
    #[error("{op} timed out after {timeout_ns} ns")]
    Timeout { op: &'static str, timeout_ns: u64 },

    /// The surface cannot be configured with the fixed format, present mode
    /// or usage.
    #[error("unsupported surface: {0}")]
    UnsupportedSurface(String),

    /// The caller-supplied draw callback failed while recording.
    #[error("draw callback failed")]
    Draw(#[source] anyhow::Error),
}

impl FrameError {
    /// Adapter for `map_err` on raw `VkResult`s.
    pub(crate) fn device(op: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| FrameError::Device { op, result }
    }

    /// Like [`FrameError::device`] but maps `TIMEOUT` onto [`FrameError::Timeout`].
    pub(crate) fn bounded(op: &'static str, timeout_ns: u64) -> impl FnOnce(vk::Result) -> Self {
        move |result| match result {
            vk::Result::TIMEOUT => FrameError::Timeout { op, timeout_ns },
            result => FrameError::Device { op, result },
        }
    }
}

pub type FrameResult<T> = std::result::Result<T, FrameError>;
