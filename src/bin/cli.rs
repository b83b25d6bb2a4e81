// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geocloud CLI: run a worker or call one

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use geocloud::cli::{logging, Reporter};
use geocloud::{Argument, Config, ProxyError, Server, Session, Worker};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "geocloud")]
#[command(about = "Geocloud - remote call proxy for geometry operations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ./geocloud.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Worker host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Worker port
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a worker serving the built-in operations
    Serve {
        /// Resident handles per session
        #[arg(long)]
        max_handles: Option<usize>,

        /// Evict handles idle for this many milliseconds
        #[arg(long)]
        handle_ttl_ms: Option<u64>,
    },

    /// List the operations a worker provides
    Functions,

    /// Call one operation
    Call {
        /// Function reference, e.g. geometry.translate_points
        function: String,

        /// Positional arguments as JSON values
        args: Vec<String>,

        /// Keep the result on the worker and print its handle
        #[arg(long)]
        resident: bool,
    },

    /// Apply an operation repeatedly, feeding each result handle back in
    Loop {
        /// Function reference taking (value, step)
        #[arg(default_value = "geometry.translate_points")]
        function: String,

        /// Initial value as JSON
        #[arg(long, default_value = "[[0,0,0],[1,0,0],[2,0,0]]")]
        initial: String,

        /// Step argument as JSON
        #[arg(long, default_value = "[0,0,1]")]
        step: String,

        /// Number of iterations
        #[arg(short = 'n', long, default_value = "100")]
        iterations: usize,
    },

    /// Print the effective configuration as TOML
    ShowConfig,

    /// Show version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Serve {
            max_handles,
            handle_ttl_ms,
        } => serve_command(config, *max_handles, *handle_ttl_ms),
        Commands::Functions => functions_command(&config),
        Commands::Call {
            function,
            args,
            resident,
        } => call_command(&config, function, args, *resident),
        Commands::Loop {
            function,
            initial,
            step,
            iterations,
        } => loop_command(&config, function, initial, step, *iterations, cli.verbose),
        Commands::ShowConfig => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Version => {
            println!("Geocloud v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = Config::from_file(path)?;
            config.apply_env(|key| std::env::var(key).ok())?;
            config
        }
        None => Config::load()?,
    };

    if let Some(host) = &cli.host {
        config.proxy.host = host.clone();
        config.worker.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.proxy.port = port;
        config.worker.port = port;
    }
    Ok(config)
}

fn serve_command(mut config: Config, max_handles: Option<usize>, handle_ttl_ms: Option<u64>) -> Result<()> {
    if let Some(max) = max_handles {
        config.worker.max_handles_per_session = max;
    }
    if let Some(ttl) = handle_ttl_ms {
        config.worker.handle_ttl_ms = Some(ttl);
    }

    let worker = Arc::new(Worker::with_builtins(config.worker.clone()));
    let server = Server::bind(worker)
        .with_context(|| format!("Failed to bind {}", config.worker.address()))?;

    Reporter::success(&format!("Worker listening on {}", server.local_addr()?));
    server.run().context("Worker accept loop failed")?;
    Ok(())
}

fn connect(config: &Config) -> Result<Session> {
    Session::connect(&config.proxy)
        .with_context(|| format!("Failed to connect to worker at {}", config.proxy.address()))
}

fn functions_command(config: &Config) -> Result<()> {
    let session = connect(config)?;
    let functions: Vec<_> = session.functions().cloned().collect();
    Reporter::report_catalog(&config.proxy.address(), &functions);
    session.close()?;
    Ok(())
}

fn parse_json(label: &str, text: &str) -> Result<Value> {
    serde_json::from_str(text).with_context(|| format!("Invalid JSON for {label}: {text}"))
}

fn call_command(config: &Config, function: &str, args: &[String], resident: bool) -> Result<()> {
    let mut session = connect(config)?;

    let function = match session.resolve(function) {
        Ok(function) => function,
        Err(ProxyError::UnknownFunction(name)) => {
            Reporter::report_error(&format!("Worker has no function named {name}"));
            Reporter::report_info("Run `geocloud functions` to list what it provides");
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let args = args
        .iter()
        .enumerate()
        .map(|(i, text)| parse_json(&format!("argument {i}"), text).map(Argument::Value))
        .collect::<Result<Vec<_>>>()?;

    let start = Instant::now();
    let result = session.invoke(&function, &args, resident)?;
    Reporter::report_call(function.name(), &result, start.elapsed());

    if resident {
        Reporter::report_warning("Resident values are dropped when this session closes");
    }
    session.close()?;
    Ok(())
}

fn loop_command(
    config: &Config,
    function: &str,
    initial: &str,
    step: &str,
    iterations: usize,
    verbose: bool,
) -> Result<()> {
    if iterations == 0 {
        bail!("--iterations must be at least 1");
    }

    let initial = parse_json("--initial", initial)?;
    let step = Argument::Value(parse_json("--step", step)?);

    let mut session = connect(config)?;
    let function = session.resolve_resident(function)?;

    let progress = if verbose {
        let pb = ProgressBar::new(iterations as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let start = Instant::now();
    let mut current = session.cache(&initial)?;
    for _ in 0..iterations {
        let next = session
            .run(&function, &[Argument::from(current), step.clone()])?
            .into_handle()?;
        // Intermediate results are never downloaded; drop them as we go
        session.release(&current)?;
        current = next;

        if let Some(ref pb) = progress {
            pb.inc(1);
        }
    }
    let value: Value = session.get(&current)?;
    let elapsed = start.elapsed();

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let stats = session.stats()?;
    Reporter::report_loop(iterations, &value, &stats, elapsed);
    session.close()?;
    Ok(())
}
