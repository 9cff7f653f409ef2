//! Offset-tracked stream recovery and connection supervision.
//!
//! Each logical stream owns one `RecoveryState`. Recoverable read failures
//! retry with backoff and always resume from `last_byte_offset`, so
//! already-consumed bytes are never re-delivered. Non-recoverable failures
//! propagate immediately. The offset only advances; the single exception is
//! an explicit `reinitialize()`.
//!
//! State for different streams never interacts — run as many recoveries
//! concurrently as there are streams.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;

use super::backoff::BackoffPolicy;

/// Classification of a stream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamErrorKind {
    Busy,
    NotFoundYet,
    AccessDeniedTemporary,
    TooManyHandles,
    ResourceUnavailable,
    SharingViolation,
    Corrupt,
    Closed,
    Other,
}

impl StreamErrorKind {
    /// Whether this failure is safe to retry with backoff.
    pub fn is_recoverable(self) -> bool {
        matches!(
            self,
            StreamErrorKind::Busy
                | StreamErrorKind::NotFoundYet
                | StreamErrorKind::AccessDeniedTemporary
                | StreamErrorKind::TooManyHandles
                | StreamErrorKind::ResourceUnavailable
                | StreamErrorKind::SharingViolation
        )
    }
}

/// A classified stream failure.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct StreamError {
    pub kind: StreamErrorKind,
    pub message: String,
}

impl StreamError {
    pub fn new(kind: StreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let kind = match err.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted => {
                StreamErrorKind::Busy
            }
            ErrorKind::NotFound => StreamErrorKind::NotFoundYet,
            ErrorKind::PermissionDenied => StreamErrorKind::AccessDeniedTemporary,
            ErrorKind::ResourceBusy => StreamErrorKind::SharingViolation,
            ErrorKind::OutOfMemory => StreamErrorKind::ResourceUnavailable,
            ErrorKind::UnexpectedEof | ErrorKind::BrokenPipe | ErrorKind::ConnectionReset => {
                StreamErrorKind::Closed
            }
            ErrorKind::InvalidData => StreamErrorKind::Corrupt,
            _ => StreamErrorKind::Other,
        };
        StreamError::new(kind, err.to_string())
    }
}

/// One retry attempt, for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryAttempt {
    pub attempt: u32,
    pub delay_ms: u64,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Per-stream recovery bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryState {
    pub stream_id: String,
    pub last_byte_offset: u64,
    pub last_successful_read: Option<DateTime<Utc>>,
    pub failure_count: u32,
    pub recovery_attempts: Vec<RecoveryAttempt>,
    pub is_recovering: bool,
}

impl RecoveryState {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            last_byte_offset: 0,
            last_successful_read: None,
            failure_count: 0,
            recovery_attempts: Vec::new(),
            is_recovering: false,
        }
    }
}

/// Terminal infrastructure failures.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("stream {stream_id}: non-recoverable failure: {source}")]
    NonRecoverable {
        stream_id: String,
        #[source]
        source: StreamError,
    },

    #[error("stream {stream_id}: retries exhausted after {attempts} attempt(s): {last_error}")]
    Exhausted {
        stream_id: String,
        attempts: u32,
        last_error: String,
        /// Full ordered attempt history, for diagnostics.
        history: Vec<RecoveryAttempt>,
    },
}

/// Offset-resumed reader for one logical stream.
pub struct StreamRecovery {
    policy: BackoffPolicy,
    state: RecoveryState,
}

impl StreamRecovery {
    pub fn new(stream_id: impl Into<String>, policy: BackoffPolicy) -> Self {
        Self {
            state: RecoveryState::new(stream_id),
            policy,
        }
    }

    pub fn state(&self) -> &RecoveryState {
        &self.state
    }

    /// Explicit stream re-initialization — the only path that rewinds the
    /// offset.
    pub fn reinitialize(&mut self) {
        self.state.last_byte_offset = 0;
        self.state.failure_count = 0;
        self.state.recovery_attempts.clear();
        self.state.is_recovering = false;
    }

    /// Read the next chunk, retrying recoverable failures with backoff.
    ///
    /// `read_at` is called with the resume offset and returns the bytes
    /// starting there. On success the offset advances by the chunk length
    /// and the recovering flag clears. Waits are non-blocking timed sleeps.
    pub async fn read<F, Fut>(&mut self, mut read_at: F) -> Result<Vec<u8>, RecoveryError>
    where
        F: FnMut(u64) -> Fut,
        Fut: Future<Output = Result<Vec<u8>, StreamError>>,
    {
        let mut attempt = 0u32;
        loop {
            match read_at(self.state.last_byte_offset).await {
                Ok(bytes) => {
                    self.state.last_byte_offset += bytes.len() as u64;
                    self.state.last_successful_read = Some(Utc::now());
                    self.state.failure_count = 0;
                    self.state.is_recovering = false;
                    return Ok(bytes);
                }
                Err(err) if !err.kind.is_recoverable() => {
                    tracing::warn!(
                        stream = %self.state.stream_id,
                        error = %err,
                        "non-recoverable stream failure"
                    );
                    return Err(RecoveryError::NonRecoverable {
                        stream_id: self.state.stream_id.clone(),
                        source: err,
                    });
                }
                Err(err) => {
                    attempt += 1;
                    self.state.failure_count += 1;
                    self.state.is_recovering = true;
                    if !self.policy.allows(attempt) {
                        tracing::error!(
                            stream = %self.state.stream_id,
                            attempts = attempt - 1,
                            "stream recovery exhausted"
                        );
                        return Err(RecoveryError::Exhausted {
                            stream_id: self.state.stream_id.clone(),
                            attempts: attempt - 1,
                            last_error: err.to_string(),
                            history: self.state.recovery_attempts.clone(),
                        });
                    }
                    let delay = self.policy.delay(attempt);
                    self.state.recovery_attempts.push(RecoveryAttempt {
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                        error: err.to_string(),
                        at: Utc::now(),
                    });
                    tracing::debug!(
                        stream = %self.state.stream_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying stream read"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Notification from the connection supervisor.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecoveryNotification {
    /// Reconnect succeeded after one or more failures.
    Recovered { stream_id: String, attempts: u32 },
    /// Reconnect retries exhausted; full attempt history attached.
    Exhausted {
        stream_id: String,
        attempts: u32,
        history: Vec<RecoveryAttempt>,
    },
}

/// Applies the backoff policy to a reconnect function and reports outcomes.
pub struct ConnectionSupervisor {
    policy: BackoffPolicy,
    notifications: tokio::sync::mpsc::UnboundedSender<RecoveryNotification>,
}

impl ConnectionSupervisor {
    /// Returns the supervisor and the receiving end of its notifications.
    pub fn new(
        policy: BackoffPolicy,
    ) -> (
        Self,
        tokio::sync::mpsc::UnboundedReceiver<RecoveryNotification>,
    ) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (
            Self {
                policy,
                notifications: tx,
            },
            rx,
        )
    }

    /// Drive `connect` until it succeeds or retries are exhausted.
    ///
    /// On success after failures, a `Recovered` notification is emitted and
    /// the failure count is cleared. On exhaustion, an `Exhausted`
    /// notification carries the full attempt history.
    pub async fn reconnect<T, F, Fut>(
        &self,
        stream_id: &str,
        mut connect: F,
    ) -> Result<T, RecoveryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StreamError>>,
    {
        let mut history: Vec<RecoveryAttempt> = Vec::new();
        let mut attempt = 0u32;
        loop {
            match connect().await {
                Ok(connection) => {
                    if attempt > 0 {
                        self.notifications
                            .send(RecoveryNotification::Recovered {
                                stream_id: stream_id.to_string(),
                                attempts: attempt,
                            })
                            .ok();
                        tracing::info!(stream = stream_id, attempts = attempt, "connection recovered");
                    }
                    return Ok(connection);
                }
                Err(err) if !err.kind.is_recoverable() => {
                    return Err(RecoveryError::NonRecoverable {
                        stream_id: stream_id.to_string(),
                        source: err,
                    });
                }
                Err(err) => {
                    attempt += 1;
                    if !self.policy.allows(attempt) {
                        self.notifications
                            .send(RecoveryNotification::Exhausted {
                                stream_id: stream_id.to_string(),
                                attempts: attempt - 1,
                                history: history.clone(),
                            })
                            .ok();
                        return Err(RecoveryError::Exhausted {
                            stream_id: stream_id.to_string(),
                            attempts: attempt - 1,
                            last_error: err.to_string(),
                            history,
                        });
                    }
                    let delay = self.policy.delay(attempt);
                    history.push(RecoveryAttempt {
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                        error: err.to_string(),
                        at: Utc::now(),
                    });
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
