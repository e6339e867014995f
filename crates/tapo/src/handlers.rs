use tapo_core::{Credentials, Plug, PlugConfig, SmartPlug};
use tracing::{debug, error, info, warn};

use crate::cli::{DeviceCommand, TargetArgs};
use crate::utils::{
    EXIT_FAILURE, EXIT_PERSISTENT_FAULT, exit_code, get_credentials, parse_params, print_json,
    to_json,
};

fn credentials_or_exit(username: Option<String>, password_stdin: bool) -> Credentials {
    match get_credentials(username, password_stdin) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(EXIT_FAILURE);
        }
    }
}

fn plug_or_exit(config: PlugConfig) -> Plug {
    match Plug::new(config) {
        Ok(plug) => plug,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(EXIT_FAILURE);
        }
    }
}

fn base_config(target: TargetArgs, credentials: Credentials) -> PlugConfig {
    PlugConfig::new(target.host, credentials)
        .with_port(target.port)
        .with_timeout(target.timeout)
        .with_encryption(target.encryption)
}

/// Handle the device command.
pub async fn handle_device(
    target: TargetArgs,
    command: DeviceCommand,
    username: Option<String>,
    password_stdin: bool,
) {
    let credentials = credentials_or_exit(username, password_stdin);
    let mut plug = plug_or_exit(base_config(target, credentials));
    let host = plug.config().host.clone();
    let port = plug.config().port;
    debug!(host = %host, port, encryption = %plug.config().encryption, "sending command");

    let result = match command {
        DeviceCommand::On => plug.switch_on().await.and_then(to_json),
        DeviceCommand::Off => plug.switch_off().await.and_then(to_json),
        DeviceCommand::Info => plug.get_info().await.and_then(to_json),
        DeviceCommand::Energy => plug.get_energy().await.and_then(to_json),
        DeviceCommand::Raw { method, params } => match parse_params(params.as_deref()) {
            Ok(params) => plug.send_raw(&method, params).await,
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(EXIT_FAILURE);
            }
        },
    };

    match result {
        Ok(json) => print_json(&json),
        Err(e) => {
            error!(host = %host, port, error = %e, "command failed");
            eprintln!("Error: {}:{}: {}", host, port, e);
            std::process::exit(exit_code(&e));
        }
    }
}

/// Handle the watch command: one refresh per tick until interrupted or the
/// plug reports a persistent fault.
pub async fn handle_watch(
    target: TargetArgs,
    interval: std::time::Duration,
    power: bool,
    username: Option<String>,
    password_stdin: bool,
) {
    let credentials = credentials_or_exit(username, password_stdin);
    let config = base_config(target, credentials)
        .with_poll_interval(interval)
        .with_power_measurement(power);
    let mut plug = plug_or_exit(config);

    let host = plug.config().host.clone();
    let interval = plug.config().poll_interval;
    info!(
        host = %host,
        interval_secs = interval.as_secs(),
        power = plug.config().power_measurement,
        "watching plug"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!(host = %host, "interrupted, stopping");
                return;
            }
        }

        debug!(host = %host, "starting poll");
        match plug.refresh().await {
            Ok(snapshot) => print_json(&snapshot.readings()),
            Err(e) if e.is_persistent() => {
                error!(host = %host, error = %e, "plug keeps failing, giving up");
                eprintln!("Error: {}: {}", host, e);
                std::process::exit(EXIT_PERSISTENT_FAULT);
            }
            Err(e) => {
                warn!(
                    host = %host,
                    error = %e,
                    failures = plug.session().consecutive_failures(),
                    "poll failed, retrying next tick"
                );
            }
        }
    }
}
