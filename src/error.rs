// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Error types for proxy sessions
//!
//! Every failure of `resolve`, `invoke`, `cache`, `get` and `release` is
//! reported to the caller as a [`ProxyError`]. Nothing is retried and nothing
//! is swallowed.

use crate::protocol::{CodecError, EncodeError, ErrorKind, RemoteHandle, SessionId};
use thiserror::Error;

/// Result alias used throughout the client side
pub type ProxyResult<T> = std::result::Result<T, ProxyError>;

/// Errors raised by a proxy session
#[derive(Error, Debug)]
pub enum ProxyError {
    /// The worker does not provide an operation under this name.
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// The worker evicted the handle, or never issued it.
    #[error("unknown handle: {0}")]
    UnknownHandle(String),

    /// A handle was used in a session other than the one that created it.
    #[error("handle was not issued by session {expected}{}", issuer(.found))]
    SessionMismatch {
        /// Session the request was sent on
        expected: SessionId,
        /// Session embedded in the handle, when the worker named it
        found: Option<SessionId>,
    },

    /// Connection loss or timeout.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// An argument or result could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The operation itself failed on the worker.
    #[error("remote execution of '{function}' failed: {message}")]
    RemoteExecution {
        /// Function reference that was invoked
        function: String,
        /// Message reported by the worker
        message: String,
    },

    /// The worker replied with something that does not answer the request.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The session was already closed.
    #[error("session is closed")]
    Closed,
}

impl ProxyError {
    /// True for timeouts reported by the transport
    pub fn is_timeout(&self) -> bool {
        match self {
            ProxyError::Transport(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    pub(crate) fn unknown_handle(handle: &RemoteHandle) -> Self {
        ProxyError::UnknownHandle(handle.to_string())
    }

    pub(crate) fn session_mismatch(expected: SessionId, handle: &RemoteHandle) -> Self {
        ProxyError::SessionMismatch {
            expected,
            found: Some(handle.session),
        }
    }

    /// Rebuild a client error from a tagged worker error reply.
    ///
    /// `session` is the session the request went out on.
    pub(crate) fn from_remote(
        session: SessionId,
        kind: ErrorKind,
        message: String,
        handle: Option<RemoteHandle>,
        function: Option<&str>,
    ) -> Self {
        match kind {
            ErrorKind::UnknownFunction => ProxyError::UnknownFunction(message),
            ErrorKind::UnknownHandle => match handle {
                Some(handle) => ProxyError::unknown_handle(&handle),
                None => ProxyError::UnknownHandle(message),
            },
            ErrorKind::SessionMismatch => ProxyError::SessionMismatch {
                expected: session,
                found: handle.map(|h| h.session),
            },
            ErrorKind::Serialization => ProxyError::Serialization(message),
            ErrorKind::Protocol => ProxyError::Protocol(message),
            ErrorKind::RemoteExecution => ProxyError::RemoteExecution {
                function: function.unwrap_or("<none>").to_string(),
                message,
            },
        }
    }
}

fn issuer(found: &Option<SessionId>) -> String {
    match found {
        Some(session) => format!(" (issued by {session})"),
        None => String::new(),
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(e: serde_json::Error) -> Self {
        ProxyError::Serialization(e.to_string())
    }
}

impl From<EncodeError> for ProxyError {
    fn from(e: EncodeError) -> Self {
        ProxyError::Serialization(e.to_string())
    }
}

impl From<CodecError> for ProxyError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Io(e) => ProxyError::Transport(e),
            CodecError::Json(e) => ProxyError::Serialization(e.to_string()),
            other @ CodecError::FrameTooLarge(_) => ProxyError::Serialization(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_detection() {
        let err = ProxyError::from(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"));
        assert!(err.is_timeout());

        let err = ProxyError::from(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"));
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_remote_execution_keeps_message() {
        let err = ProxyError::from_remote(
            SessionId::new(1),
            ErrorKind::RemoteExecution,
            "matrix must be 4x4".into(),
            None,
            Some("geometry.transform_points"),
        );
        match err {
            ProxyError::RemoteExecution { function, message } => {
                assert_eq!(function, "geometry.transform_points");
                assert_eq!(message, "matrix must be 4x4");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_session_mismatch_without_handle() {
        let err = ProxyError::from_remote(
            SessionId::new(2),
            ErrorKind::SessionMismatch,
            "foreign handle".into(),
            None,
            None,
        );
        match &err {
            ProxyError::SessionMismatch { expected, found } => {
                assert_eq!(*expected, SessionId::new(2));
                assert_eq!(*found, None);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.to_string(), "handle was not issued by session 0000000000000002");

        let handle = RemoteHandle::new(SessionId::new(3), 7);
        let err = ProxyError::from_remote(
            SessionId::new(2),
            ErrorKind::SessionMismatch,
            "foreign handle".into(),
            Some(handle),
            None,
        );
        assert!(err.to_string().ends_with("(issued by 0000000000000003)"));
    }

    #[test]
    fn test_non_finite_encoding_is_serialization_error() {
        let err = ProxyError::from(EncodeError::NonFinite(f64::NAN));
        assert!(matches!(err, ProxyError::Serialization(_)));
    }
}
