// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Caller side of the proxy

pub mod function;
pub mod session;
pub mod transport;

pub use function::{CallResult, RemoteFunction};
pub use session::Session;
pub use transport::{InProcessTransport, TcpTransport, Transport};
