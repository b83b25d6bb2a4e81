// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Request and response messages

use super::encode::{self, EncodeError};
use super::handle::{FunctionRef, RemoteHandle, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One argument of a call: either an inline value or a worker-resident handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Argument {
    Value(Value),
    Handle(RemoteHandle),
}

impl Argument {
    /// Serialize a local value into an inline argument
    ///
    /// Fails on NaN or infinite numbers.
    pub fn value<T: Serialize + ?Sized>(value: &T) -> Result<Self, EncodeError> {
        Ok(Argument::Value(encode::to_value(value)?))
    }

    pub fn as_handle(&self) -> Option<&RemoteHandle> {
        match self {
            Argument::Handle(handle) => Some(handle),
            Argument::Value(_) => None,
        }
    }
}

impl From<RemoteHandle> for Argument {
    fn from(handle: RemoteHandle) -> Self {
        Argument::Handle(handle)
    }
}

impl From<&RemoteHandle> for Argument {
    fn from(handle: &RemoteHandle) -> Self {
        Argument::Handle(*handle)
    }
}

impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        Argument::Value(value)
    }
}

/// A call of a named worker operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub function: FunctionRef,
    #[serde(default)]
    pub args: Vec<Argument>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub kwargs: BTreeMap<String, Argument>,
    /// Keep the result on the worker and reply with a handle
    #[serde(default)]
    pub cache: bool,
}

impl CallRequest {
    /// Every handle referenced by this call, positional and keyword
    pub fn handles(&self) -> impl Iterator<Item = &RemoteHandle> {
        self.args
            .iter()
            .chain(self.kwargs.values())
            .filter_map(Argument::as_handle)
    }
}

/// Messages sent from proxy to worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Open the session and fetch the function catalog
    Hello,
    /// Re-fetch the function catalog
    Catalog,
    Call(CallRequest),
    /// Upload a value and keep it resident
    Cache { value: Value },
    /// Download a resident value
    Get { handle: RemoteHandle },
    /// Evict a resident value
    Release { handle: RemoteHandle },
    Stats,
    Close,
}

impl Request {
    /// Short name used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Hello => "hello",
            Request::Catalog => "catalog",
            Request::Call(_) => "call",
            Request::Cache { .. } => "cache",
            Request::Get { .. } => "get",
            Request::Release { .. } => "release",
            Request::Stats => "stats",
            Request::Close => "close",
        }
    }
}

/// Class of a worker-reported failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownFunction,
    UnknownHandle,
    SessionMismatch,
    Serialization,
    RemoteExecution,
    Protocol,
}

/// Resident-handle accounting for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub resident: usize,
    pub capacity: usize,
    pub evicted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,
}

/// Messages sent from worker to proxy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Welcome {
        session: SessionId,
        functions: Vec<FunctionRef>,
    },
    Catalog {
        functions: Vec<FunctionRef>,
    },
    Value {
        value: Value,
    },
    Handle {
        handle: RemoteHandle,
    },
    Released {
        existed: bool,
    },
    Stats {
        stats: SessionStats,
    },
    Error {
        kind: ErrorKind,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        handle: Option<RemoteHandle>,
    },
    Closed,
}

impl Response {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Response::Error {
            kind,
            message: message.into(),
            handle: None,
        }
    }

    pub fn handle_error(kind: ErrorKind, message: impl Into<String>, handle: RemoteHandle) -> Self {
        Response::Error {
            kind,
            message: message.into(),
            handle: Some(handle),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_request_wire_shape() {
        let session = SessionId::new(1);
        let request = Request::Call(CallRequest {
            function: FunctionRef::parse("geometry.translate_points").unwrap(),
            args: vec![
                Argument::Handle(RemoteHandle::new(session, 3)),
                Argument::value(&[0.0, 0.0, 1.0]).unwrap(),
            ],
            kwargs: BTreeMap::new(),
            cache: true,
        });

        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(
            encoded,
            json!({
                "type": "call",
                "function": "geometry.translate_points",
                "args": [
                    {"handle": {"session": "0000000000000001", "id": 3}},
                    {"value": [0.0, 0.0, 1.0]}
                ],
                "cache": true
            })
        );
    }

    #[test]
    fn test_call_request_defaults() {
        let request: Request =
            serde_json::from_value(json!({"type": "call", "function": "worker.ping"})).unwrap();
        match request {
            Request::Call(call) => {
                assert!(call.args.is_empty());
                assert!(call.kwargs.is_empty());
                assert!(!call.cache);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_handles_iterates_keywords() {
        let session = SessionId::new(9);
        let mut kwargs = BTreeMap::new();
        kwargs.insert("matrix".to_string(), Argument::Handle(RemoteHandle::new(session, 2)));
        let call = CallRequest {
            function: FunctionRef::parse("geometry.transform_points").unwrap(),
            args: vec![Argument::Handle(RemoteHandle::new(session, 1))],
            kwargs,
            cache: false,
        };
        let ids: Vec<u64> = call.handles().map(|h| h.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_error_response_is_tagged() {
        let encoded = serde_json::to_value(Response::error(ErrorKind::UnknownFunction, "nope")).unwrap();
        assert_eq!(
            encoded,
            json!({"status": "error", "kind": "unknown_function", "message": "nope"})
        );
    }
}
