//! CLI surface (§6 reference): one binary, `serve`/`client` subcommands.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "macmirror")]
#[command(author = "MacMirror Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Desktop-to-mobile screen mirroring server and client", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to a TOML config file; overridden field-by-field by the
    /// flags below when both are given. A missing path is not an error.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Listener port (server) or default port when dialing (client)
    #[arg(long)]
    pub port: Option<u16>,

    /// User-mode setpoint (§3)
    #[arg(long)]
    pub mode: Option<Mode>,

    /// Disable the audio pipeline at startup
    #[arg(long, action)]
    pub no_audio: bool,

    /// Advertise/operate in background mode (§6 instance name, §4.3 cadence)
    #[arg(long, action)]
    pub background: bool,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,
}

impl Args {
    /// Load the on-disk config, then let explicit CLI flags override it
    /// field by field (§6: flags are the authoritative surface; the
    /// file just seeds defaults so it doesn't have to be repeated).
    pub fn resolve_config(&self) -> Result<crate::config::Config, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => crate::config::Config::load(path)?,
            None => crate::config::Config::default(),
        };
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(mode) = self.mode {
            config.server.mode = mode.as_str().to_string();
        }
        if self.background {
            config.server.background = true;
        }
        if self.no_audio {
            config.audio.enabled = false;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the server (default if no subcommand is given).
    Serve,
    /// Run the client against an explicit endpoint, bypassing discovery.
    Client {
        #[arg(long)]
        host: String,
        #[arg(long, default_value = "8080")]
        port: u16,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum Mode {
    Performance,
    Balanced,
    Fidelity,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Mode::Performance => "performance",
            Mode::Balanced => "balanced",
            Mode::Fidelity => "fidelity",
        }
    }
}

impl From<Mode> for crate::stream_config::UserMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Performance => crate::stream_config::UserMode::Performance,
            Mode::Balanced => crate::stream_config::UserMode::Balanced,
            Mode::Fidelity => crate::stream_config::UserMode::Fidelity,
        }
    }
}

/// Exit codes (§6).
pub mod exit_code {
    pub const NORMAL: i32 = 0;
    pub const LISTENER_FAILURE: i32 = 1;
    pub const INVALID_CONFIGURATION: i32 = 2;
    pub const INTERRUPTED: i32 = 130;
}
