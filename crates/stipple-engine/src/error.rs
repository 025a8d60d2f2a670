//! Error taxonomy and the last-error slot.
//!
//! Every fallible engine call returns [`Result`]. Errors are also written into an
//! [`ErrorSlot`] so callers that only poll a "last error" string keep working.

use thiserror::Error;

/// Errors reported by the rendering layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// Device, surface, or shader creation failed. Retrying `initialize` is allowed.
    #[error("initialization error: {0}")]
    Initialization(String),

    /// A bracket contract was violated (frame session, mesh build). The call was a no-op.
    #[error("state misuse: {0}")]
    StateMisuse(String),

    /// An argument was rejected (stale handle, out-of-range enum, empty buffer).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Resources were still alive at shutdown.
    #[error("resource leak: {0}")]
    ResourceLeak(String),
}

impl GraphicsError {
    pub(crate) fn init(msg: impl Into<String>) -> Self {
        Self::Initialization(msg.into())
    }

    pub(crate) fn misuse(msg: impl Into<String>) -> Self {
        Self::StateMisuse(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Wraps a backend failure, keeping the whole context chain.
    pub(crate) fn backend(what: &str, err: anyhow::Error) -> Self {
        Self::Initialization(format!("{what}: {err:#}"))
    }

    /// Returns `true` for the kinds that make the current call fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Initialization(_) | Self::ResourceLeak(_))
    }
}

impl From<std::convert::Infallible> for GraphicsError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

pub type Result<T> = std::result::Result<T, GraphicsError>;

/// Single overwrite-on-write slot holding the text of the most recent error.
#[derive(Debug, Default)]
pub struct ErrorSlot {
    last: Option<String>,
}

impl ErrorSlot {
    /// Stores `err` as the last error and logs it.
    pub fn set(&mut self, err: &GraphicsError) {
        if err.is_fatal() {
            log::error!("{err}");
        } else {
            log::warn!("{err}");
        }
        self.last = Some(err.to_string());
    }

    /// Passes `result` through, recording the error on the way.
    pub fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.set(err);
        }
        result
    }

    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }

    pub fn clear(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_overwrites_previous_error() {
        let mut slot = ErrorSlot::default();
        let _ = slot.record::<()>(Err(GraphicsError::misuse("first")));
        let _ = slot.record::<()>(Err(GraphicsError::invalid("second")));
        assert_eq!(slot.last(), Some("invalid parameter: second"));
    }

    #[test]
    fn record_leaves_slot_untouched_on_success() {
        let mut slot = ErrorSlot::default();
        let _ = slot.record::<()>(Err(GraphicsError::misuse("kept")));
        assert_eq!(slot.record(Ok(5)), Ok(5));
        assert_eq!(slot.last(), Some("state misuse: kept"));
    }

    #[test]
    fn backend_error_keeps_context_chain() {
        let err = anyhow::anyhow!("adapter lost").context("failed to create device");
        let wrapped = GraphicsError::backend("surface", err);
        assert_eq!(
            wrapped,
            GraphicsError::Initialization("surface: failed to create device: adapter lost".into())
        );
        assert!(wrapped.is_fatal());
    }
}
