// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geocloud remote call proxy
//!
//! Runs geometry toolkit operations on a worker process and keeps large
//! intermediate values there. Callers resolve operations by name, pass
//! arguments inline or as handles to worker-resident values, and get back
//! either a value or a new handle.
//!
//! ```no_run
//! use geocloud::{Argument, Config, Session};
//!
//! # fn main() -> geocloud::ProxyResult<()> {
//! let config = Config::default();
//! let mut session = Session::connect(&config.proxy)?;
//!
//! let translate = session.resolve_resident("geometry.translate_points")?;
//! let mut points = session.cache(&vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]])?;
//! let step = Argument::value(&[0.0, 0.0, 1.0])?;
//! for _ in 0..100 {
//!     points = session.run(&translate, &[Argument::from(points), step.clone()])?.into_handle()?;
//! }
//! let moved: Vec<[f64; 3]> = session.get(&points)?;
//! session.close()?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod worker;

pub use client::{CallResult, InProcessTransport, RemoteFunction, Session, TcpTransport, Transport};
pub use config::{Config, ProxyConfig, WorkerConfig};
pub use error::{ProxyError, ProxyResult};
pub use protocol::{Argument, FunctionRef, RemoteHandle, SessionId};
pub use worker::{Registry, Server, Worker};
