// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Typed registry of named worker operations

use crate::protocol::FunctionRef;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Failure raised by an operation while it runs on the worker
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperationError {
    #[error("missing argument {index} ('{name}')")]
    MissingArgument { index: usize, name: String },

    #[error("invalid argument '{name}': {message}")]
    InvalidArgument { name: String, message: String },

    #[error("{0}")]
    Failed(String),

    /// The result holds a value that has no wire encoding
    #[error("result cannot be encoded: {0}")]
    Unencodable(String),
}

impl OperationError {
    pub fn invalid(name: &str, message: impl Into<String>) -> Self {
        OperationError::InvalidArgument {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

/// Arguments of a call after handles have been resolved to values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keyword: BTreeMap<String, Value>,
}

impl CallArgs {
    pub fn new(positional: Vec<Value>, keyword: BTreeMap<String, Value>) -> Self {
        Self { positional, keyword }
    }

    /// Raw argument at `index`, falling back to the keyword `name`
    pub fn raw(&self, index: usize, name: &str) -> Option<&Value> {
        self.positional.get(index).or_else(|| self.keyword.get(name))
    }

    /// Decode the argument at `index` (or keyword `name`) into `T`
    pub fn arg<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<T, OperationError> {
        let raw = self.raw(index, name).ok_or_else(|| OperationError::MissingArgument {
            index,
            name: name.to_string(),
        })?;
        serde_json::from_value(raw.clone()).map_err(|e| OperationError::invalid(name, e.to_string()))
    }

    /// Like [`CallArgs::arg`] but `None` when the argument is absent
    pub fn opt<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<Option<T>, OperationError> {
        match self.raw(index, name) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.arg(index, name).map(Some),
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.keyword.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A worker operation
pub type Operation = Box<dyn Fn(&CallArgs) -> Result<Value, OperationError> + Send + Sync>;

/// Name to operation lookup
#[derive(Default)]
pub struct Registry {
    operations: HashMap<FunctionRef, Operation>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in geometry operations
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        super::operations::register_builtins(&mut registry);
        registry
    }

    /// Register `operation` under `name`, replacing any previous entry
    ///
    /// # Panics
    /// If `name` is not a valid function reference. Names are fixed at build
    /// time, so this is a programming error.
    pub fn register<F>(&mut self, name: &str, operation: F) -> &mut Self
    where
        F: Fn(&CallArgs) -> Result<Value, OperationError> + Send + Sync + 'static,
    {
        let function = FunctionRef::parse(name)
            .unwrap_or_else(|| panic!("invalid function reference: {name:?}"));
        self.operations.insert(function, Box::new(operation));
        self
    }

    pub fn lookup(&self, function: &FunctionRef) -> Option<&Operation> {
        self.operations.get(function)
    }

    pub fn contains(&self, function: &FunctionRef) -> bool {
        self.operations.contains_key(function)
    }

    /// Sorted catalog of registered names
    pub fn functions(&self) -> Vec<FunctionRef> {
        let mut names: Vec<FunctionRef> = self.operations.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("functions", &self.functions())
            .finish()
    }
}
