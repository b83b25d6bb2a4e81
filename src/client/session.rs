// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Proxy session: the caller's side of one worker session
//!
//! A [`Session`] owns its transport. Dropping it sends a best-effort `close`
//! and releases the channel, so every exit path frees the connection.

use super::function::{CallResult, RemoteFunction};
use super::transport::{InProcessTransport, TcpTransport, Transport};
use crate::config::ProxyConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::protocol::{
    encode, Argument, CallRequest, FunctionRef, RemoteHandle, Request, Response, SessionId,
    SessionStats,
};
use crate::worker::Worker;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Sequential, blocking proxy for one worker session
pub struct Session<T: Transport = TcpTransport> {
    transport: Option<T>,
    id: SessionId,
    functions: BTreeSet<FunctionRef>,
}

impl Session<TcpTransport> {
    /// Connect to the worker named in `config`
    pub fn connect(config: &ProxyConfig) -> ProxyResult<Self> {
        let transport = TcpTransport::connect(config.address(), config.timeout())?;
        Self::open(transport)
    }
}

impl Session<InProcessTransport> {
    /// Session against a worker in the same process
    pub fn in_process(worker: Arc<Worker>) -> ProxyResult<Self> {
        Self::open(InProcessTransport::new(worker))
    }
}

impl<T: Transport> Session<T> {
    /// Greet the worker and fetch its function catalog
    pub fn open(mut transport: T) -> ProxyResult<Self> {
        match transport.round_trip(&Request::Hello)? {
            Response::Welcome { session, functions } => {
                log::debug!("session {session} opened with {} function(s)", functions.len());
                Ok(Self {
                    transport: Some(transport),
                    id: session,
                    functions: functions.into_iter().collect(),
                })
            }
            Response::Error {
                kind,
                message,
                handle,
            } => {
                let _ = transport.shutdown();
                // No session was assigned yet
                Err(ProxyError::from_remote(SessionId::new(0), kind, message, handle, None))
            }
            other => {
                let _ = transport.shutdown();
                Err(unexpected("hello", &other))
            }
        }
    }

    /// Open a session, run `f`, and close it whether or not `f` succeeds
    pub fn scoped<R>(transport: T, f: impl FnOnce(&mut Self) -> ProxyResult<R>) -> ProxyResult<R> {
        let mut session = Self::open(transport)?;
        match f(&mut session) {
            Ok(result) => {
                session.close()?;
                Ok(result)
            }
            Err(e) => {
                drop(session);
                Err(e)
            }
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Operations the worker advertised
    pub fn functions(&self) -> impl Iterator<Item = &FunctionRef> {
        self.functions.iter()
    }

    /// Re-fetch the worker's function catalog
    pub fn refresh_catalog(&mut self) -> ProxyResult<()> {
        match self.round_trip(&Request::Catalog, None)? {
            Response::Catalog { functions } => {
                self.functions = functions.into_iter().collect();
                Ok(())
            }
            other => Err(unexpected("catalog", &other)),
        }
    }

    /// Bind a local callable to a worker operation
    ///
    /// Checked against the catalog fetched at open; nothing is sent.
    pub fn resolve(&self, name: &str) -> ProxyResult<RemoteFunction> {
        match FunctionRef::parse(name) {
            Some(function) if self.functions.contains(&function) => {
                Ok(RemoteFunction::new(function, false))
            }
            _ => Err(ProxyError::UnknownFunction(name.to_string())),
        }
    }

    /// Like [`Session::resolve`], but results stay on the worker by default
    pub fn resolve_resident(&self, name: &str) -> ProxyResult<RemoteFunction> {
        self.resolve(name).map(RemoteFunction::resident)
    }

    /// Invoke `function` with positional arguments
    pub fn invoke(
        &mut self,
        function: &RemoteFunction,
        args: &[Argument],
        keep_resident: bool,
    ) -> ProxyResult<CallResult> {
        self.invoke_with(function, args.to_vec(), BTreeMap::new(), keep_resident)
    }

    /// Invoke using the callable's default residency
    pub fn run(&mut self, function: &RemoteFunction, args: &[Argument]) -> ProxyResult<CallResult> {
        self.invoke(function, args, function.keeps_resident())
    }

    /// Invoke with positional and keyword arguments
    pub fn invoke_with(
        &mut self,
        function: &RemoteFunction,
        args: Vec<Argument>,
        kwargs: BTreeMap<String, Argument>,
        keep_resident: bool,
    ) -> ProxyResult<CallResult> {
        let call = CallRequest {
            function: function.function().clone(),
            args,
            kwargs,
            cache: keep_resident,
        };
        for handle in call.handles() {
            self.check_handle(handle)?;
        }

        let request = Request::Call(call);
        match self.round_trip(&request, Some(function.function()))? {
            Response::Value { value } => Ok(CallResult::Value(value)),
            Response::Handle { handle } => Ok(CallResult::Handle(handle)),
            other => Err(unexpected("call", &other)),
        }
    }

    /// Invoke by value and decode the result into `R`
    pub fn call<R: DeserializeOwned>(
        &mut self,
        function: &RemoteFunction,
        args: &[Argument],
    ) -> ProxyResult<R> {
        self.invoke(function, args, false)?.decode()
    }

    /// Upload a value and keep it resident on the worker
    pub fn cache<V: Serialize + ?Sized>(&mut self, value: &V) -> ProxyResult<RemoteHandle> {
        let value = encode::to_value(value)?;
        match self.round_trip(&Request::Cache { value }, None)? {
            Response::Handle { handle } => Ok(handle),
            other => Err(unexpected("cache", &other)),
        }
    }

    /// Download the value behind a handle
    pub fn get<V: DeserializeOwned>(&mut self, handle: &RemoteHandle) -> ProxyResult<V> {
        self.check_handle(handle)?;
        match self.round_trip(&Request::Get { handle: *handle }, None)? {
            Response::Value { value } => Ok(serde_json::from_value(value)?),
            other => Err(unexpected("get", &other)),
        }
    }

    /// Evict a handle; `false` if the worker no longer held it
    pub fn release(&mut self, handle: &RemoteHandle) -> ProxyResult<bool> {
        self.check_handle(handle)?;
        match self.round_trip(&Request::Release { handle: *handle }, None)? {
            Response::Released { existed } => Ok(existed),
            other => Err(unexpected("release", &other)),
        }
    }

    pub fn stats(&mut self) -> ProxyResult<SessionStats> {
        match self.round_trip(&Request::Stats, None)? {
            Response::Stats { stats } => Ok(stats),
            other => Err(unexpected("stats", &other)),
        }
    }

    /// End the session; the worker drops every resident value
    pub fn close(mut self) -> ProxyResult<()> {
        let Some(mut transport) = self.transport.take() else {
            return Ok(());
        };
        let reply = transport.round_trip(&Request::Close);
        let shutdown = transport.shutdown();
        log::debug!("session {} closed", self.id);

        match reply? {
            Response::Closed => shutdown,
            other => Err(unexpected("close", &other)),
        }
    }

    fn check_handle(&self, handle: &RemoteHandle) -> ProxyResult<()> {
        if handle.belongs_to(self.id) {
            Ok(())
        } else {
            Err(ProxyError::session_mismatch(self.id, handle))
        }
    }

    fn round_trip(&mut self, request: &Request, function: Option<&FunctionRef>) -> ProxyResult<Response> {
        let transport = self.transport.as_mut().ok_or(ProxyError::Closed)?;
        let response = match transport.round_trip(request) {
            Ok(response) => response,
            Err(err @ ProxyError::Transport(_)) => {
                self.abandon(&err);
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        match response {
            Response::Error {
                kind,
                message,
                handle,
            } => Err(ProxyError::from_remote(
                self.id,
                kind,
                message,
                handle,
                function.map(FunctionRef::as_str),
            )),
            response => Ok(response),
        }
    }

    /// Drop a channel whose request/reply pairing can no longer be trusted
    ///
    /// A late reply may still be in flight, so the channel is never reused.
    /// The session stays closed afterwards and no `close` is sent.
    fn abandon(&mut self, cause: &ProxyError) {
        if let Some(mut transport) = self.transport.take() {
            log::warn!("session {}: dropping connection after {cause}", self.id);
            let _ = transport.shutdown();
        }
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            let _ = transport.round_trip(&Request::Close);
            let _ = transport.shutdown();
        }
    }
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .field("functions", &self.functions.len())
            .finish()
    }
}

fn unexpected(request: &str, response: &Response) -> ProxyError {
    ProxyError::Protocol(format!("unexpected reply to {request}: {response:?}"))
}
