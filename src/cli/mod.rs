// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! CLI subsystem for the geocloud binary

pub mod logging;
pub mod reporter;

pub use reporter::Reporter;
