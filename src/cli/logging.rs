// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Logger setup for the binaries
//!
//! Defaults to `info` for this crate, `debug` with `--verbose`. `RUST_LOG`
//! overrides both:
//!
//! ```sh
//! $> RUST_LOG=geocloud=trace geocloud serve
//! ```

use log::LevelFilter;

/// Filter string applied when `RUST_LOG` is unset
pub fn default_filter(verbose: bool) -> String {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    format!("{}={}", env!("CARGO_CRATE_NAME"), level.as_str().to_lowercase())
}

/// Install the global `env_logger`; later calls are ignored
pub fn init(verbose: bool) {
    let env = env_logger::Env::default().default_filter_or(default_filter(verbose));
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
