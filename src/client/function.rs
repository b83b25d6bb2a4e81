// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Local stand-ins for remote operations and their results

use crate::error::{ProxyError, ProxyResult};
use crate::protocol::{FunctionRef, RemoteHandle};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A resolved worker operation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteFunction {
    function: FunctionRef,
    keep_resident: bool,
}

impl RemoteFunction {
    pub(crate) fn new(function: FunctionRef, keep_resident: bool) -> Self {
        Self {
            function,
            keep_resident,
        }
    }

    pub fn function(&self) -> &FunctionRef {
        &self.function
    }

    pub fn name(&self) -> &str {
        self.function.as_str()
    }

    /// Whether results stay on the worker by default
    pub fn keeps_resident(&self) -> bool {
        self.keep_resident
    }

    /// Same operation, results kept on the worker
    pub fn resident(mut self) -> Self {
        self.keep_resident = true;
        self
    }

    /// Same operation, results sent back by value
    pub fn by_value(mut self) -> Self {
        self.keep_resident = false;
        self
    }
}

/// Outcome of a call: the value itself or a handle to it on the worker
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult {
    Value(Value),
    Handle(RemoteHandle),
}

impl CallResult {
    pub fn is_handle(&self) -> bool {
        matches!(self, CallResult::Handle(_))
    }

    pub fn as_handle(&self) -> Option<&RemoteHandle> {
        match self {
            CallResult::Handle(handle) => Some(handle),
            CallResult::Value(_) => None,
        }
    }

    pub fn into_handle(self) -> ProxyResult<RemoteHandle> {
        match self {
            CallResult::Handle(handle) => Ok(handle),
            CallResult::Value(_) => Err(ProxyError::Protocol(
                "expected a resident handle, got a value".into(),
            )),
        }
    }

    pub fn into_value(self) -> ProxyResult<Value> {
        match self {
            CallResult::Value(value) => Ok(value),
            CallResult::Handle(handle) => Err(ProxyError::Protocol(format!(
                "expected a value, got resident handle {handle}"
            ))),
        }
    }

    /// Decode an inline value into `T`
    pub fn decode<T: DeserializeOwned>(self) -> ProxyResult<T> {
        Ok(serde_json::from_value(self.into_value()?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SessionId;
    use serde_json::json;

    #[test]
    fn test_residency_toggles() {
        let f = RemoteFunction::new(FunctionRef::parse("worker.ping").unwrap(), false);
        assert!(!f.keeps_resident());
        let f = f.resident();
        assert!(f.keeps_resident());
        assert!(!f.by_value().keeps_resident());
    }

    #[test]
    fn test_call_result_accessors() {
        let value = CallResult::Value(json!([1.0, 2.0]));
        assert!(!value.is_handle());
        assert_eq!(value.clone().decode::<Vec<f64>>().unwrap(), vec![1.0, 2.0]);
        assert!(value.into_handle().is_err());

        let handle = CallResult::Handle(RemoteHandle::new(SessionId::new(3), 1));
        assert!(handle.is_handle());
        assert!(matches!(handle.clone().into_value(), Err(ProxyError::Protocol(_))));
        assert_eq!(handle.into_handle().unwrap().id, 1);
    }

    #[test]
    fn test_decode_mismatch_is_serialization_error() {
        let result = CallResult::Value(json!("text"));
        assert!(matches!(result.decode::<f64>(), Err(ProxyError::Serialization(_))));
    }
}
