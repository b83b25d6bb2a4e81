// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Channels between a proxy session and a worker

use crate::error::{ProxyError, ProxyResult};
use crate::protocol::codec::{self, CodecError};
use crate::protocol::{Request, Response, SessionId};
use crate::worker::Worker;
use std::io;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

/// A request/reply channel to one worker session
pub trait Transport {
    /// Send `request` and block until the matching reply arrives
    fn round_trip(&mut self, request: &Request) -> ProxyResult<Response>;

    /// Release the underlying channel
    fn shutdown(&mut self) -> ProxyResult<()>;
}

/// Framed JSON over a TCP connection
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn connect(address: impl ToSocketAddrs, timeout: Option<Duration>) -> ProxyResult<Self> {
        let stream = TcpStream::connect(address)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;
        Ok(Self { stream })
    }
}

impl Transport for TcpTransport {
    fn round_trip(&mut self, request: &Request) -> ProxyResult<Response> {
        codec::write_frame(&mut self.stream, request).map_err(normalize_timeout)?;
        match codec::read_frame(&mut self.stream).map_err(normalize_timeout)? {
            Some(response) => Ok(response),
            None => Err(ProxyError::Transport(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "worker closed the connection",
            ))),
        }
    }

    fn shutdown(&mut self) -> ProxyResult<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Socket timeouts surface as `WouldBlock` on some platforms
fn normalize_timeout(e: CodecError) -> ProxyError {
    match e {
        CodecError::Io(err) if err.kind() == io::ErrorKind::WouldBlock => ProxyError::Transport(
            io::Error::new(io::ErrorKind::TimedOut, "worker did not reply in time"),
        ),
        other => other.into(),
    }
}

/// Talks to a [`Worker`] living in the same process
///
/// Messages still go through the wire encoding so the same serialization
/// failures surface as over TCP.
#[derive(Debug)]
pub struct InProcessTransport {
    worker: Arc<Worker>,
    session: Option<SessionId>,
}

impl InProcessTransport {
    pub fn new(worker: Arc<Worker>) -> Self {
        let session = worker.open_session();
        Self {
            worker,
            session: Some(session),
        }
    }

    pub fn worker(&self) -> &Arc<Worker> {
        &self.worker
    }
}

impl Transport for InProcessTransport {
    fn round_trip(&mut self, request: &Request) -> ProxyResult<Response> {
        let session = self.session.ok_or(ProxyError::Closed)?;

        let encoded = serde_json::to_vec(request)?;
        let decoded: Request = serde_json::from_slice(&encoded)?;
        let closing = matches!(decoded, Request::Close);
        let reply = self.worker.dispatch(session, decoded);

        let encoded = serde_json::to_vec(&reply)?;
        let response = serde_json::from_slice(&encoded)?;
        if closing {
            self.shutdown()?;
        }
        Ok(response)
    }

    fn shutdown(&mut self) -> ProxyResult<()> {
        if let Some(session) = self.session.take() {
            self.worker.close_session(session);
        }
        Ok(())
    }
}

impl Drop for InProcessTransport {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
