//! Recovery manager: backoff retries and offset-tracked stream recovery.
//!
//! Only infrastructure failures are retried here. Validation and execution
//! failures never reach this layer — they are returned to the caller by the
//! command framework.
//!
//! # Modules
//!
//! - [`backoff`] — `BackoffPolicy` (exponential, capped, optional jitter)
//! - [`stream`]  — `StreamRecovery`, `ConnectionSupervisor`, failure
//!   classification, terminal `RecoveryError` with attempt history

pub mod backoff;
pub mod stream;

pub use backoff::BackoffPolicy;
pub use stream::{
    ConnectionSupervisor, RecoveryAttempt, RecoveryError, RecoveryNotification, RecoveryState,
    StreamError, StreamErrorKind, StreamRecovery,
};
