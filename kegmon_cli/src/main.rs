#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `kegmon` binary: wires config, hardware (or simulation), the inventory
//! service client and the tick loop together.

mod assemble;
mod cli;
mod console;
mod error_fmt;
mod transport;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use kegmon_core::{Command, RunExit};
use kegmon_traits::Transport;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer as _;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE, json_mode};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(err) = run(cli) {
        if json_mode() {
            println!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        tracing::error!(error = %err, "kegmon failed");
        std::process::exit(exit_code_for_error(&err));
    }
}

fn run(cli: Cli) -> eyre::Result<()> {
    let _ = color_eyre::install();
    let cfg = kegmon_config::load_file(&cli.config)?;
    init_tracing(&cli, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    match cli.cmd {
        Commands::Run { stop_on_eof } => run_monitor(&cfg, cli.sim_grams, stop_on_eof),
        Commands::Command { ref name, ref arg } => {
            let cmd = Command::parse(name, arg)?;
            let (mut controller, sim) = assemble::build(&cfg)?;
            controller.boot()?;
            sim.place(cli.sim_grams);
            let code = controller.device().dispatch(&cmd)?;
            println!("{}", console::format_reply(&cmd, code, cli.json));
            Ok(())
        }
        Commands::SelfCheck => self_check(&cfg, cli.sim_grams),
        Commands::Health => health(&cfg),
    }
}

fn init_tracing(cli: &Cli, logging: &kegmon_config::Logging) -> eyre::Result<()> {
    // RUST_LOG wins over --log-level, which wins over the config file.
    let level = logging
        .level
        .as_deref()
        .filter(|_| cli.log_level == "info")
        .unwrap_or(&cli.log_level);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;

    // Replies own stdout; logs go to stderr.
    let console = if cli.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = match logging.file.as_deref() {
        Some(path) => {
            let path = std::path::Path::new(path);
            let dir = path
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file {:?} has no file name", path))?;
            let appender = match logging.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(())
}

fn run_monitor(cfg: &kegmon_config::Config, sim_grams: f64, stop_on_eof: bool) -> eyre::Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::Relaxed);
        })
        .wrap_err("install signal handler")?;
    }

    let (mut controller, sim) = assemble::build(cfg)?;
    let mut console_thread: Option<std::thread::JoinHandle<()>> = None;
    loop {
        let mode = controller.boot()?;
        tracing::info!(state = %mode, "device booted");
        if console_thread.is_none() {
            // The first boot tares an uncalibrated platform; weight goes on afterwards.
            sim.place(sim_grams);
            console_thread = Some(
                console::spawn(
                    controller.device().clone(),
                    json_mode(),
                    stop_on_eof,
                    Arc::clone(&shutdown),
                )
                .wrap_err("spawn console thread")?,
            );
        }
        match controller.run(&shutdown) {
            RunExit::Shutdown => break,
            RunExit::Restart(reason) => {
                tracing::warn!(?reason, "restarting device");
            }
        }
    }
    tracing::info!("shutdown complete");
    Ok(())
}

fn self_check(cfg: &kegmon_config::Config, sim_grams: f64) -> eyre::Result<()> {
    let (mut controller, sim) = assemble::build(cfg)?;
    let mode = controller.boot()?;
    sim.place(sim_grams);
    let device = controller.device();
    let weight = device.sample()?;
    let code = device.state_code()?;
    if json_mode() {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "state": mode.to_string(),
                "code": code,
                "weight_g": weight,
            })
        );
    } else {
        println!("self-check ok: state={mode} code={code} weight={weight:.1} g");
    }
    Ok(())
}

fn health(cfg: &kegmon_config::Config) -> eyre::Result<()> {
    let service = if cfg.service.enabled {
        let mut transport = transport::HttpTransport::from_config(cfg)?;
        let url = transport.base_url().to_string();
        match transport.get(kegmon_core::sync::PING_PATH) {
            Ok(resp) if resp.is_success() => "reachable",
            Ok(resp) => eyre::bail!("service unreachable at {url}: HTTP {}", resp.status),
            Err(e) => eyre::bail!("service unreachable at {url}: {e}"),
        }
    } else {
        "disabled"
    };
    if json_mode() {
        println!(
            "{}",
            serde_json::json!({ "ok": true, "config": "valid", "service": service })
        );
    } else {
        println!("health ok: config valid, service {service}");
    }
    Ok(())
}
