use std::time::Duration;

use clap::{Parser, Subcommand};
use tapo_core::{DEFAULT_PORT, EncryptionType};

pub fn parse_duration(arg: &str) -> Result<Duration, std::num::ParseIntError> {
    let seconds = arg.parse()?;
    Ok(Duration::from_secs(seconds))
}

/// TP-Link Tapo smart plug client (KLAP and securePassthrough)
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Tapo account username (email).
    /// Can also be set via TAPO_USERNAME environment variable.
    #[arg(short, long, global = true, env = "TAPO_USERNAME")]
    pub username: Option<String>,

    /// Read password from stdin.
    /// Useful for scripting: echo "password" | tapo -u user@example.com --password-stdin device 192.168.1.50 info
    #[arg(long, global = true)]
    pub password_stdin: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show version information for CLI and core library
    Version,

    /// Send a command to a specific plug
    Device {
        #[command(flatten)]
        target: TargetArgs,

        #[command(subcommand)]
        command: DeviceCommand,
    },

    /// Poll a plug at a fixed interval and print its readings as JSON lines
    Watch {
        #[command(flatten)]
        target: TargetArgs,

        /// Polling interval in seconds (minimum 15)
        #[arg(long, value_parser = parse_duration, default_value = "60")]
        interval: Duration,

        /// Also read energy statistics when the plug meters power and is on
        #[arg(long)]
        power: bool,
    },
}

/// Connection options shared by every command that talks to a plug.
#[derive(clap::Args)]
pub struct TargetArgs {
    /// Target hostname or IP address
    pub host: String,

    /// Target port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Request timeout in seconds (minimum 5)
    #[arg(long, value_parser = parse_duration, default_value = "10")]
    pub timeout: Duration,

    /// Protocol generation: klap (current firmware) or aes (securePassthrough)
    #[arg(short, long, default_value = "klap")]
    pub encryption: EncryptionType,
}

/// Commands available for single plug operations
#[derive(Subcommand)]
pub enum DeviceCommand {
    /// Turn the outlet on
    On,
    /// Turn the outlet off
    Off,
    /// Get device info
    Info,
    /// Get energy statistics (P110/P115)
    Energy,
    /// Send a raw method through the encrypted session
    Raw {
        /// Method name, e.g. get_device_usage
        method: String,

        /// JSON params object
        params: Option<String>,
    },
}
