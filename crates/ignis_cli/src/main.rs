//! CLI smoke entry point.
//!
//! # Responsibility
//! - Boot one application instance with the config extension attached.
//! - Run the startup chain to completion and report the outcome.

use ignis_core::{config, default_log_level, init_logging, App, ConfigExt};
use log::{error, info};
use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(err) = init_logging(default_log_level(), None) {
        eprintln!("ignis logging unavailable: {err}");
    }
    println!("ignis_core version={}", ignis_core::core_version());

    let mut app = App::new();
    if let Err(err) = app.use_extension(config::extension(), &[]) {
        eprintln!("ignis config extension failed: {err}");
        return ExitCode::FAILURE;
    }
    if let Err(err) = app.import_environment([
        ("PORT", "port to listen on"),
        ("IGNIS_ENV", "deployment environment name"),
    ]) {
        eprintln!("ignis environment import failed: {err}");
        return ExitCode::FAILURE;
    }

    let snapshot = app.config("env").unwrap_or_default();
    app.wait_sync(move |_| {
        info!("event=cli_config module=cli status=ok env={snapshot}");
        Ok(())
    });

    match futures::executor::block_on(app.listen(None)) {
        Ok(()) => {
            println!("ignis startup=ok");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("event=cli_startup module=cli status=error error={err}");
            println!("ignis startup=failed error={err}");
            ExitCode::FAILURE
        }
    }
}
