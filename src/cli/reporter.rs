// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! CLI output reporter with colored formatting

use crate::client::CallResult;
use crate::protocol::{FunctionRef, SessionStats};
use colored::*;
use serde_json::Value;
use std::time::Duration;

/// CLI reporter for formatted output
pub struct Reporter;

impl Reporter {
    /// Report the worker's function catalog, grouped by module
    pub fn report_catalog(address: &str, functions: &[FunctionRef]) {
        println!("\n{}", "━".repeat(80).bright_black());
        println!("{} {}", "Worker:".bold(), address.cyan());
        println!("{}", "━".repeat(80).bright_black());

        let mut current: Option<&str> = None;
        for function in functions {
            let module = function.module().unwrap_or("<root>");
            if current != Some(module) {
                println!("{}", format!("{module}:").bold());
                current = Some(module);
            }
            println!("  {}", function.as_str().cyan());
        }

        println!("{}", "━".repeat(80).bright_black());
    }

    /// Report the outcome of a single call
    pub fn report_call(function: &str, result: &CallResult, duration: Duration) {
        println!("\n{}", "━".repeat(80).bright_black());
        println!("{} {}", "Called:".bold(), function.cyan());
        println!("{}", "━".repeat(80).bright_black());

        match result {
            CallResult::Value(value) => {
                println!("  {} {}", "Result:".bright_black(), Self::format_value(value));
            }
            CallResult::Handle(handle) => {
                println!(
                    "  {} {}",
                    "Resident handle:".bright_black(),
                    handle.to_string().yellow()
                );
            }
        }
        println!(
            "  {} {}",
            "Time:".bright_black(),
            Self::format_duration(duration).yellow()
        );
        println!("{}", "━".repeat(80).bright_black());
    }

    /// Report a chained-handle loop run
    pub fn report_loop(iterations: usize, value: &Value, stats: &SessionStats, duration: Duration) {
        println!("\n{}", "━".repeat(80).bright_black());
        println!("{} {} iterations", "Loop:".bold(), iterations.to_string().cyan());
        println!("{}", "━".repeat(80).bright_black());
        println!("  {} {}", "Final value:".bright_black(), Self::format_value(value));
        println!(
            "  {} {} / {} (evicted {})",
            "Resident handles:".bright_black(),
            stats.resident.to_string().cyan(),
            stats.capacity,
            stats.evicted
        );
        println!(
            "  {} {} ({} per call)",
            "Time:".bright_black(),
            Self::format_duration(duration).yellow(),
            Self::format_duration(duration / iterations.max(1) as u32)
        );
        println!("{}", "━".repeat(80).bright_black());
    }

    /// Report error
    pub fn report_error(message: &str) {
        eprintln!("\n{} {}", "❌ Error:".red().bold(), message);
    }

    /// Report warning
    pub fn report_warning(message: &str) {
        println!("\n{} {}", "⚠️  Warning:".yellow().bold(), message);
    }

    /// Report info
    pub fn report_info(message: &str) {
        println!("{} {}", "ℹ️".bright_blue(), message);
    }

    /// Print success message
    pub fn success(message: &str) {
        println!("{} {}", "✅".green(), message.green());
    }

    fn format_value(value: &Value) -> String {
        let text = value.to_string();
        if text.chars().count() > 160 {
            let head: String = text.chars().take(160).collect();
            format!("{}… ({} bytes)", head, text.len())
        } else {
            text
        }
    }

    /// Format duration for display
    fn format_duration(duration: Duration) -> String {
        let micros = duration.as_micros();

        if micros < 1_000 {
            format!("{}µs", micros)
        } else if micros < 1_000_000 {
            format!("{:.2}ms", micros as f64 / 1_000.0)
        } else {
            format!("{:.2}s", micros as f64 / 1_000_000.0)
        }
    }
}
