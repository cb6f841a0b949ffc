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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use wgconf::service::{Interface, InterfacePeer, Runner, ServiceError};
use wgconf::{
    AllocationError, Config, ConfigError, Occupancy, Peer, PeerOptions, Retries, Server, Topology,
    TopologyError, ValidationError,
};

use crate::settings::Settings;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{} exists, pass --force to overwrite it", .0.display())]
    Exists(PathBuf),
}

#[derive(Debug, Clone, Default, clap::Args)]
pub struct OutputArgs {
    /// Write out the config file
    #[arg(short, long)]
    pub write: bool,

    /// Overwrite config files that already exist
    #[arg(short, long, requires = "write")]
    pub force: bool,

    /// Print the config as a QR code
    #[arg(short, long)]
    pub qrcode: bool,
}

#[derive(Debug, Clone, clap::Args)]
pub struct ServerArgs {
    /// The public domain name for this server
    #[arg(short, long)]
    pub endpoint: String,

    /// The subnet this server should use for the VPN; once per address family
    #[arg(short, long, required = true)]
    pub subnet: Vec<String>,

    /// The IP the server should use within the VPN
    #[arg(short, long)]
    pub address: Vec<String>,

    /// The private key to use for the server
    #[arg(short = 'P', long)]
    pub private_key: Option<String>,

    /// The port the server should bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// The interface name for this VPN
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Route peer traffic out through this interface with NAT
    #[arg(short = 't', long)]
    pub nat_traversal_interface: Option<String>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Clone, clap::Args)]
pub struct PeerArgs {
    /// An identifiable name for this peer
    #[arg(short, long)]
    pub name: String,

    /// The subnet the server uses for the VPN; once per address family
    #[arg(short, long, required = true)]
    pub subnet: Vec<String>,

    /// The IP the peer should use within the VPN
    #[arg(short, long)]
    pub address: Vec<String>,

    /// The private key to use for the peer
    #[arg(short = 'P', long)]
    pub private_key: Option<String>,

    /// The port the server is listening on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// The public domain name of the VPN server
    #[arg(short, long)]
    pub endpoint: String,

    /// The public key of the VPN server
    #[arg(short = 'S', long)]
    pub server_pubkey: String,

    /// An additional IP range that should route through the VPN
    #[arg(short, long)]
    pub routable_ip: Vec<String>,

    /// How often the peer should contact the server, in seconds
    #[arg(short, long)]
    pub keepalive: Option<u16>,

    /// A pre-shared key for this peer
    #[arg(short = 'K', long)]
    pub preshared_key: Option<String>,

    /// The interface name for this VPN
    #[arg(short, long)]
    pub interface: Option<String>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Clone, clap::Args)]
pub struct StatsArgs {
    /// The interface to inspect
    pub interface: String,

    /// Only show this peer (public key)
    #[arg(short, long)]
    pub peer: Option<String>,

    /// Ping each peer to verify connectivity
    #[arg(short, long)]
    pub verify_connected: bool,

    /// Render rx/tx in K/M/G as appropriate
    #[arg(short = 'H', long)]
    pub human_readable: bool,

    /// One JSON object per peer
    #[arg(long, conflicts_with = "verify_connected")]
    pub json: bool,
}

/// Renders, and optionally writes, a standalone server config.
pub fn server(args: ServerArgs, settings: &Settings) -> Result<String, CliError> {
    let options = PeerOptions {
        address: args.address,
        endpoint: Some(args.endpoint.clone()),
        private_key: args.private_key,
        port: settings.port(args.port),
        interface: settings.interface(args.interface),
        ..Default::default()
    };
    let mut server = Server::new(args.endpoint, &args.subnet, options)?;
    if let Some(outbound) = &args.nat_traversal_interface {
        server.add_nat_traversal(outbound);
    }

    let mut topology = Topology::new();
    let id = topology.insert(server);
    render(&topology.config(id)?, &args.output, settings.config_dir(), true)
}

/// Renders, and optionally writes, the config of one peer of a server known
/// only by its public key.
pub fn peer(args: PeerArgs, settings: &Settings) -> Result<String, CliError> {
    let mut server = Server::new(
        args.endpoint.clone(),
        &args.subnet,
        PeerOptions {
            endpoint: Some(args.endpoint),
            public_key: Some(args.server_pubkey),
            port: settings.port(args.port),
            allowed_ips: args.routable_ip,
            ..Default::default()
        },
    )?;

    let options = PeerOptions {
        address: args.address,
        private_key: args.private_key,
        keepalive: args.keepalive,
        preshared_key: args.preshared_key,
        interface: settings.interface(args.interface),
        ..Default::default()
    };
    if !options.address.is_empty() {
        let requested = Peer::new(args.name.clone(), options.clone())?;
        clear_of(&mut server, &requested)?;
    }

    let mut topology = Topology::new();
    let server = topology.insert(server);
    let id = topology.peer(server, args.name, options)?;
    render(&topology.config(id)?, &args.output, settings.config_dir(), false)
}

/// Moves the stand-in server off an address the peer asked for.
fn clear_of(server: &mut Server, peer: &Peer) -> Result<(), CliError> {
    let reserved: Occupancy = std::iter::once(peer).collect();
    if server.ipv4().is_some_and(|ip| reserved.ipv4.contains(&ip)) {
        let ip = server.unique_address_ipv4(&reserved, Retries::Default)?;
        debug!(%ip, "moved stand-in server");
        server.set_ipv4(Some(ip));
    }
    if server.ipv6().is_some_and(|ip| reserved.ipv6.contains(&ip)) {
        let ip = server.unique_address_ipv6(&reserved, Retries::Default)?;
        debug!(%ip, "moved stand-in server");
        server.set_ipv6(Some(ip));
    }
    Ok(())
}

fn render(
    config: &Config<'_>,
    output: &OutputArgs,
    dir: Option<&Path>,
    split: bool,
) -> Result<String, CliError> {
    let text = if output.qrcode {
        config.qrcode()?
    } else {
        config.local_config()?
    };

    if output.write {
        let mut targets = vec![config.full_path(dir)];
        if split {
            targets.push(config.peers_full_path(dir));
        }
        if !output.force {
            if let Some(existing) = targets.into_iter().find(|path| path.exists()) {
                return Err(CliError::Exists(existing));
            }
        }
        let written = config.write(dir)?;
        info!(files = written.len(), "config written");
    }
    Ok(text)
}

/// One line per peer, or just the requested peer.
pub fn stats<R: Runner>(args: &StatsArgs, iface: &Interface<R>) -> Result<Vec<String>, CliError> {
    let mut stats = iface.stats()?;
    let peers: Vec<InterfacePeer> = match &args.peer {
        Some(key) => vec![
            stats
                .remove(key)
                .unwrap_or_else(|| InterfacePeer::new(iface.name(), key.as_str())),
        ],
        None => stats.into_values().collect(),
    };

    peers
        .iter()
        .map(|peer| -> Result<String, CliError> {
            if args.json {
                Ok(serde_json::to_string(peer)?)
            } else if args.verify_connected {
                Ok(connected_line(peer, args.human_readable, iface.runner()))
            } else {
                Ok(peer.to_string())
            }
        })
        .collect()
}

fn connected_line(peer: &InterfacePeer, human: bool, runner: &impl Runner) -> String {
    format!(
        "<InterfacePeer interface={} peer={} tx={} rx={} connected={}>",
        peer.interface,
        peer.public_key,
        size(peer.tx, human),
        size(peer.rx, human),
        peer.is_connected(runner)
    )
}

const UNITS: [(u64, &str); 5] = [
    (1 << 50, "P"),
    (1 << 40, "T"),
    (1 << 30, "G"),
    (1 << 20, "M"),
    (1 << 10, "K"),
];

/// Byte counts, optionally truncated to the largest binary unit.
pub fn size(bytes: u64, human: bool) -> String {
    if human {
        for (factor, suffix) in UNITS {
            if bytes >= factor {
                return format!("{}{suffix}", bytes / factor);
            }
        }
    }
    format!("{bytes}B")
}
