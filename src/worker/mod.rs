// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Worker: owns resident values and executes named operations
//!
//! Every request is answered with a tagged [`Response`]. Operation failures
//! and panics become `Error` replies instead of crossing the wire.

pub mod operations;
pub mod registry;
pub mod server;
pub mod store;

pub use registry::{CallArgs, Operation, OperationError, Registry};
pub use server::Server;
pub use store::HandleStore;

use crate::config::WorkerConfig;
use crate::protocol::{
    Argument, CallRequest, ErrorKind, RemoteHandle, Request, Response, SessionId, SessionStats,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

/// Dispatcher shared by all sessions of one worker process
pub struct Worker {
    registry: Registry,
    config: WorkerConfig,
    sessions: DashMap<SessionId, HandleStore>,
}

impl Worker {
    pub fn new(registry: Registry, config: WorkerConfig) -> Self {
        Self {
            registry,
            config,
            sessions: DashMap::new(),
        }
    }

    /// Worker serving the built-in geometry operations
    pub fn with_builtins(config: WorkerConfig) -> Self {
        Self::new(Registry::with_builtins(), config)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Start a session with an empty handle store
    pub fn open_session(&self) -> SessionId {
        loop {
            let id = SessionId::random();
            if let Entry::Vacant(slot) = self.sessions.entry(id) {
                slot.insert(HandleStore::new(
                    id,
                    self.config.max_handles_per_session,
                    self.config.handle_ttl(),
                ));
                log::info!("session {id} opened");
                return id;
            }
        }
    }

    /// End a session, dropping every value it kept resident
    pub fn close_session(&self, id: SessionId) -> bool {
        match self.sessions.remove(&id) {
            Some((_, store)) => {
                log::info!("session {id} closed, {} resident handle(s) dropped", store.len());
                true
            }
            None => false,
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_open(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Answer one request on behalf of `session`
    pub fn dispatch(&self, session: SessionId, request: Request) -> Response {
        log::debug!("session {session}: {} request", request.kind());

        match self.sessions.get_mut(&session) {
            Some(mut store) => {
                let purged = store.purge_expired(Instant::now());
                if purged > 0 {
                    log::debug!("session {session}: {purged} idle handle(s) expired");
                }
            }
            None => return Self::not_open(session),
        }

        match request {
            Request::Hello => Response::Welcome {
                session,
                functions: self.registry.functions(),
            },
            Request::Catalog => Response::Catalog {
                functions: self.registry.functions(),
            },
            Request::Call(call) => self.call(session, call),
            Request::Cache { value } => self.respond(session, |store| Response::Handle {
                handle: store.insert(value),
            }),
            Request::Get { handle } => self.respond(session, |store| {
                if let Some(err) = Self::check_ownership(store.session(), &handle) {
                    return err;
                }
                match store.get(&handle) {
                    Some(value) => Response::Value { value: value.clone() },
                    None => Self::unknown_handle(handle),
                }
            }),
            Request::Release { handle } => self.respond(session, |store| {
                if let Some(err) = Self::check_ownership(store.session(), &handle) {
                    return err;
                }
                Response::Released {
                    existed: store.release(&handle),
                }
            }),
            Request::Stats => self.respond(session, |store| Response::Stats {
                stats: store.stats(),
            }),
            Request::Close => Response::Closed,
        }
    }

    /// Resident-handle accounting for an open session
    pub fn stats(&self, session: SessionId) -> Option<SessionStats> {
        self.sessions.get(&session).map(|store| store.stats())
    }

    fn call(&self, session: SessionId, call: CallRequest) -> Response {
        let Some(operation) = self.registry.lookup(&call.function) else {
            return Response::error(ErrorKind::UnknownFunction, call.function.to_string());
        };

        // Resolve handles under the shard lock, run the operation without it
        let args = match self
            .with_store(session, |store| Self::resolve_args(store, &call))
            .and_then(|resolved| resolved)
        {
            Ok(args) => args,
            Err(response) => return response,
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| operation(&args)));
        match outcome {
            Ok(Ok(value)) if call.cache => self.respond(session, |store| Response::Handle {
                handle: store.insert(value),
            }),
            Ok(Ok(value)) => Response::Value { value },
            Ok(Err(e @ OperationError::Unencodable(_))) => {
                log::warn!("session {session}: {} {e}", call.function);
                Response::error(ErrorKind::Serialization, e.to_string())
            }
            Ok(Err(e)) => {
                log::warn!("session {session}: {} failed: {e}", call.function);
                Response::error(ErrorKind::RemoteExecution, e.to_string())
            }
            Err(_) => {
                log::error!("session {session}: {} panicked", call.function);
                Response::error(
                    ErrorKind::RemoteExecution,
                    format!("operation {} panicked", call.function),
                )
            }
        }
    }

    fn resolve_args(store: &mut HandleStore, call: &CallRequest) -> Result<CallArgs, Response> {
        let mut resolve = |arg: &Argument| -> Result<Value, Response> {
            match arg {
                Argument::Value(value) => Ok(value.clone()),
                Argument::Handle(handle) => {
                    if let Some(err) = Self::check_ownership(store.session(), handle) {
                        return Err(err);
                    }
                    store
                        .get(handle)
                        .cloned()
                        .ok_or_else(|| Self::unknown_handle(*handle))
                }
            }
        };

        let positional = call.args.iter().map(&mut resolve).collect::<Result<Vec<_>, _>>()?;
        let mut keyword = BTreeMap::new();
        for (name, arg) in &call.kwargs {
            keyword.insert(name.clone(), resolve(arg)?);
        }
        Ok(CallArgs::new(positional, keyword))
    }

    fn with_store<T>(
        &self,
        session: SessionId,
        f: impl FnOnce(&mut HandleStore) -> T,
    ) -> Result<T, Response> {
        match self.sessions.get_mut(&session) {
            Some(mut store) => Ok(f(&mut store)),
            None => Err(Self::not_open(session)),
        }
    }

    /// Run `f` against the session store, replying with its response
    fn respond(&self, session: SessionId, f: impl FnOnce(&mut HandleStore) -> Response) -> Response {
        self.with_store(session, f).unwrap_or_else(|err| err)
    }

    fn not_open(session: SessionId) -> Response {
        Response::error(ErrorKind::Protocol, format!("session {session} is not open"))
    }

    fn check_ownership(session: SessionId, handle: &RemoteHandle) -> Option<Response> {
        if handle.belongs_to(session) {
            None
        } else {
            Some(Response::handle_error(
                ErrorKind::SessionMismatch,
                format!("handle {handle} was not issued by session {session}"),
                *handle,
            ))
        }
    }

    fn unknown_handle(handle: RemoteHandle) -> Response {
        Response::handle_error(ErrorKind::UnknownHandle, handle.to_string(), handle)
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FunctionRef;
    use serde_json::json;

    fn worker() -> Worker {
        Worker::with_builtins(WorkerConfig::default())
    }

    fn call(function: &str, args: Vec<Argument>, cache: bool) -> Request {
        Request::Call(CallRequest {
            function: FunctionRef::parse(function).unwrap(),
            args,
            kwargs: BTreeMap::new(),
            cache,
        })
    }

    #[test]
    fn test_hello_lists_catalog() {
        let worker = worker();
        let session = worker.open_session();
        match worker.dispatch(session, Request::Hello) {
            Response::Welcome { session: id, functions } => {
                assert_eq!(id, session);
                assert!(functions.iter().any(|f| f.as_str() == "geometry.translate_points"));
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_cache_then_get() {
        let worker = worker();
        let session = worker.open_session();
        let handle = match worker.dispatch(session, Request::Cache { value: json!([1, 2, 3]) }) {
            Response::Handle { handle } => handle,
            other => panic!("unexpected response: {other:?}"),
        };
        assert_eq!(
            worker.dispatch(session, Request::Get { handle }),
            Response::Value { value: json!([1, 2, 3]) }
        );
    }

    #[test]
    fn test_call_with_handle_argument_and_resident_result() {
        let worker = worker();
        let session = worker.open_session();
        let points = match worker.dispatch(session, Request::Cache { value: json!([[0, 0, 0]]) }) {
            Response::Handle { handle } => handle,
            other => panic!("unexpected response: {other:?}"),
        };

        let request = call(
            "geometry.translate_points",
            vec![Argument::from(points), Argument::value(&[0.0, 0.0, 2.0]).unwrap()],
            true,
        );
        let result = match worker.dispatch(session, request) {
            Response::Handle { handle } => handle,
            other => panic!("unexpected response: {other:?}"),
        };
        assert_eq!(
            worker.dispatch(session, Request::Get { handle: result }),
            Response::Value { value: json!([[0.0, 0.0, 2.0]]) }
        );
    }

    #[test]
    fn test_foreign_handle_is_session_mismatch() {
        let worker = worker();
        let a = worker.open_session();
        let b = worker.open_session();
        let handle = match worker.dispatch(a, Request::Cache { value: json!(1) }) {
            Response::Handle { handle } => handle,
            other => panic!("unexpected response: {other:?}"),
        };

        match worker.dispatch(b, Request::Get { handle }) {
            Response::Error { kind, handle: Some(h), .. } => {
                assert_eq!(kind, ErrorKind::SessionMismatch);
                assert_eq!(h, handle);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_function_and_handle() {
        let worker = worker();
        let session = worker.open_session();

        match worker.dispatch(session, call("geometry.subdivide", vec![], false)) {
            Response::Error { kind, .. } => assert_eq!(kind, ErrorKind::UnknownFunction),
            other => panic!("unexpected response: {other:?}"),
        }

        let never_issued = RemoteHandle::new(session, 999);
        match worker.dispatch(session, Request::Get { handle: never_issued }) {
            Response::Error { kind, .. } => assert_eq!(kind, ErrorKind::UnknownHandle),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_operation_failure_and_panic_are_tagged() {
        let mut registry = Registry::with_builtins();
        registry.register("test.explode", |_| panic!("boom"));
        let worker = Worker::new(registry, WorkerConfig::default());
        let session = worker.open_session();

        match worker.dispatch(session, call("geometry.centroid_points", vec![json!([]).into()], false)) {
            Response::Error { kind, message, .. } => {
                assert_eq!(kind, ErrorKind::RemoteExecution);
                assert!(message.contains("no points"));
            }
            other => panic!("unexpected response: {other:?}"),
        }

        match worker.dispatch(session, call("test.explode", vec![], false)) {
            Response::Error { kind, .. } => assert_eq!(kind, ErrorKind::RemoteExecution),
            other => panic!("unexpected response: {other:?}"),
        }
        assert!(worker.is_open(session));
    }

    #[test]
    fn test_close_session_drops_store() {
        let worker = worker();
        let session = worker.open_session();
        worker.dispatch(session, Request::Cache { value: json!(1) });
        assert_eq!(worker.stats(session).map(|s| s.resident), Some(1));

        assert!(worker.close_session(session));
        assert!(!worker.close_session(session));
        assert!(worker.dispatch(session, Request::Stats).is_error());
    }

    #[test]
    fn test_foreign_handle_as_keyword_is_mismatch() {
        let worker = worker();
        let owner = worker.open_session();
        let other = worker.open_session();
        let matrix = match worker.dispatch(owner, Request::Cache { value: json!([[1.0]]) }) {
            Response::Handle { handle } => handle,
            other => panic!("unexpected response: {other:?}"),
        };

        let mut kwargs = BTreeMap::new();
        kwargs.insert("matrix".to_string(), Argument::from(matrix));
        let request = Request::Call(CallRequest {
            function: FunctionRef::parse("geometry.transform_points").unwrap(),
            args: vec![Argument::from(json!([[0, 0, 0]]))],
            kwargs,
            cache: false,
        });

        match worker.dispatch(other, request) {
            Response::Error { kind, handle, .. } => {
                assert_eq!(kind, ErrorKind::SessionMismatch);
                assert_eq!(handle, Some(matrix));
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_idle_handle_expires_between_requests() {
        let config = WorkerConfig {
            handle_ttl_ms: Some(30),
            ..WorkerConfig::default()
        };
        let worker = Worker::with_builtins(config);
        let session = worker.open_session();
        let handle = match worker.dispatch(session, Request::Cache { value: json!([1, 2]) }) {
            Response::Handle { handle } => handle,
            other => panic!("unexpected response: {other:?}"),
        };
        assert!(!worker.dispatch(session, Request::Get { handle }).is_error());

        std::thread::sleep(std::time::Duration::from_millis(120));
        match worker.dispatch(session, Request::Get { handle }) {
            Response::Error { kind, .. } => assert_eq!(kind, ErrorKind::UnknownHandle),
            other => panic!("unexpected response: {other:?}"),
        }
        assert_eq!(worker.stats(session).map(|s| s.evicted), Some(1));
    }

    #[test]
    fn test_unencodable_result_is_serialization_error() {
        let worker = worker();
        let session = worker.open_session();
        let request = call(
            "geometry.translate_points",
            vec![Argument::from(json!([[1e308, 0.0, 0.0]])), json!([1e308, 0.0, 0.0]).into()],
            false,
        );
        match worker.dispatch(session, request) {
            Response::Error { kind, .. } => assert_eq!(kind, ErrorKind::Serialization),
            other => panic!("unexpected response: {other:?}"),
        }
    }
}
