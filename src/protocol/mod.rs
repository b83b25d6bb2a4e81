// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Wire protocol shared by proxy and worker

pub mod codec;
pub mod encode;
pub mod handle;
pub mod message;

pub use codec::{read_frame, write_frame, CodecError, MAX_FRAME_LEN};
pub use encode::EncodeError;
pub use handle::{FunctionRef, RemoteHandle, SessionId};
pub use message::{Argument, CallRequest, ErrorKind, Request, Response, SessionStats};
