//! # Core Error Types
//!
//! Contract violations (bad indices, freed ids) panic at the call site.
//! Only conditions a caller can meaningfully report are errors.

use std::time::Duration;

use thiserror::Error;

use crate::device::SubmissionIndex;

/// Errors raised by a device backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The submission did not complete within the allotted time.
    #[error("submission {submission:?} did not complete within {timeout:?}")]
    Timeout {
        /// The submission that was waited on.
        submission: SubmissionIndex,
        /// How long the wait lasted.
        timeout: Duration,
    },

    /// The submission index was never issued by this device.
    #[error("unknown submission {0:?}")]
    UnknownSubmission(SubmissionIndex),
}

/// Errors raised by the frame generation ring.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A generation's previous work never finished draining.
    #[error("generation {generation} failed to drain: {source}")]
    DrainTimeout {
        /// Ring slot that failed to drain.
        generation: usize,
        /// Underlying device failure.
        #[source]
        source: DeviceError,
    },
}
