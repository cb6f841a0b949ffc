// Copyright (C) 2025 Joseph Sacchini
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU Affero General Public License as published by the Free
// Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more
// details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

mod commands;
mod settings;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;

use wgconf::service::Interface;

use crate::commands::{PeerArgs, ServerArgs, StatsArgs};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    #[cfg(distribute)]
    {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    #[cfg(not(distribute))]
    {
        fmt()
            .pretty()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[derive(Debug, Parser)]
#[command(name = "wgconf")]
#[command(version = env!("GIT_VERSION"))]
#[command(about = "Generate WireGuard configs and inspect running interfaces")]
struct Args {
    /// Path to the settings file
    #[arg(long, global = true, default_value = settings::DEFAULT_PATH)]
    settings: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Display, and optionally write, WireGuard configs
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Interact with the system's WireGuard service
    #[command(subcommand)]
    Service(ServiceCommand),
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// A basic server config
    Server(ServerArgs),

    /// A peer config for an existing server
    Peer(PeerArgs),
}

#[derive(Debug, Subcommand)]
enum ServiceCommand {
    /// Display the stats for an interface
    Stats(StatsArgs),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();
    debug!(settings = %args.settings.display(), "starting wgconf");

    let settings = settings::load(&args.settings)?;

    match args.command {
        Command::Config(ConfigCommand::Server(server)) => {
            println!("{}", commands::server(server, &settings)?);
        }
        Command::Config(ConfigCommand::Peer(peer)) => {
            println!("{}", commands::peer(peer, &settings)?);
        }
        Command::Service(ServiceCommand::Stats(stats)) => {
            let iface = Interface::new(stats.interface.clone())?;
            for line in commands::stats(&stats, &iface)? {
                println!("{line}");
            }
        }
    }
    Ok(())
}
