// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! TCP front end for a [`Worker`]
//!
//! Each accepted connection is one session served on its own thread. The
//! session is closed when the connection ends, whatever the reason.

use super::Worker;
use crate::protocol::codec::{self, CodecError};
use crate::protocol::{ErrorKind, Request, Response, SessionId};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Accept loop bound to a local address
pub struct Server {
    listener: TcpListener,
    worker: Arc<Worker>,
}

impl Server {
    /// Bind to the address in the worker's config
    pub fn bind(worker: Arc<Worker>) -> io::Result<Self> {
        let address = worker.config().address();
        Self::bind_to(address, worker)
    }

    pub fn bind_to(address: impl ToSocketAddrs, worker: Arc<Worker>) -> io::Result<Self> {
        let listener = TcpListener::bind(address)?;
        Ok(Self { listener, worker })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn worker(&self) -> &Arc<Worker> {
        &self.worker
    }

    /// Serve connections until the listener fails
    pub fn run(self) -> io::Result<()> {
        log::info!(
            "worker listening on {} ({} functions)",
            self.local_addr()?,
            self.worker.registry().len()
        );

        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    log::warn!("accept failed: {e}");
                    continue;
                }
            };

            let worker = Arc::clone(&self.worker);
            thread::Builder::new()
                .name("geocloud-session".into())
                .spawn(move || {
                    let peer = stream
                        .peer_addr()
                        .map(|a| a.to_string())
                        .unwrap_or_else(|_| "<unknown>".into());
                    if let Err(e) = serve_connection(&worker, stream) {
                        log::warn!("connection from {peer} ended with error: {e}");
                    }
                })?;
        }

        Ok(())
    }

    /// Run the accept loop on a background thread
    pub fn spawn(self) -> io::Result<(SocketAddr, JoinHandle<io::Result<()>>)> {
        let address = self.local_addr()?;
        let handle = thread::Builder::new()
            .name("geocloud-worker".into())
            .spawn(move || self.run())?;
        Ok((address, handle))
    }
}

/// Closes its session on drop
struct SessionGuard<'a> {
    worker: &'a Worker,
    id: SessionId,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.worker.close_session(self.id);
    }
}

fn serve_connection(worker: &Worker, stream: TcpStream) -> Result<(), CodecError> {
    stream.set_nodelay(true)?;
    let reader = stream.try_clone()?;
    serve_stream(worker, reader, stream)
}

/// Serve one session over any byte stream
pub fn serve_stream<R: Read, W: Write>(
    worker: &Worker,
    mut reader: R,
    mut writer: W,
) -> Result<(), CodecError> {
    let guard = SessionGuard {
        worker,
        id: worker.open_session(),
    };

    loop {
        let payload = match codec::read_payload(&mut reader) {
            Ok(Some(payload)) => payload,
            Ok(None) => return Ok(()),
            Err(CodecError::FrameTooLarge(len)) => {
                // The oversize payload is still on the wire; the stream cannot be resynced
                let reply = Response::error(
                    ErrorKind::Serialization,
                    CodecError::FrameTooLarge(len).to_string(),
                );
                codec::write_frame(&mut writer, &reply)?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let request: Request = match serde_json::from_slice(&payload) {
            Ok(request) => request,
            Err(e) => {
                let reply = Response::error(ErrorKind::Serialization, e.to_string());
                codec::write_frame(&mut writer, &reply)?;
                continue;
            }
        };

        let closing = matches!(request, Request::Close);
        let reply = worker.dispatch(guard.id, request);
        codec::write_frame(&mut writer, &reply)?;

        if closing {
            return Ok(());
        }
    }
}
