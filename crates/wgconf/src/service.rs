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

//! Thin wrapper over the `wg` and `wg-quick` tools for a live interface.
//!
//! Everything here shells out and needs whatever privileges `wg` needs on
//! the host, usually root.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::net::IpAddr;
use std::path::Path;
use std::process::Command;

use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("an interface name is required")]
    MissingInterface,

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error(
        "{program} exited with {}: {stderr}",
        .status.map_or_else(|| "a signal".to_string(), |code| format!("status {code}"))
    )]
    Failed {
        program: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("could not parse `wg show` output: {0}")]
    Parse(String),
}

/// Runs an external program to completion and returns its stdout.
pub trait Runner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, ServiceError>;
}

impl<R: Runner + ?Sized> Runner for &R {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, ServiceError> {
        (**self).run(program, args)
    }
}

/// Runs programs on this host. Calls block without a timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, ServiceError> {
        debug!(program, ?args, "running");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| ServiceError::Spawn {
                program: program.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ServiceError::Failed {
                program: program.to_string(),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// A peer as currently configured on a live interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfacePeer {
    pub interface: String,
    pub public_key: String,
    pub preshared_key: Option<String>,
    pub endpoint: Option<String>,
    pub allowed_ips: Vec<IpNetwork>,
    pub latest_handshake: Option<DateTime<Utc>>,
    pub rx: u64,
    pub tx: u64,
    pub persistent_keepalive: Option<u16>,
}

impl InterfacePeer {
    /// A peer with no statistics yet.
    pub fn new(interface: impl Into<String>, public_key: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            public_key: public_key.into(),
            preshared_key: None,
            endpoint: None,
            allowed_ips: Vec::new(),
            latest_handshake: None,
            rx: 0,
            tx: 0,
            persistent_keepalive: None,
        }
    }

    /// The host part of the first allowed IP; the address pinged to check liveness.
    pub fn ip_address(&self) -> Option<IpAddr> {
        self.allowed_ips.first().map(IpNetwork::ip)
    }

    /// Sends a single echo request through the tunnel.
    pub fn is_connected(&self, runner: &impl Runner) -> bool {
        match self.ip_address() {
            Some(ip) => ping(runner, ip).is_ok(),
            None => false,
        }
    }
}

impl fmt::Display for InterfacePeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<InterfacePeer iface={} peer={} tx={} rx={}>",
            self.interface, self.public_key, self.tx, self.rx
        )
    }
}

/// A WireGuard interface on this host, driven through `runner`.
#[derive(Debug, Clone)]
pub struct Interface<R = SystemRunner> {
    name: String,
    runner: R,
}

impl Interface<SystemRunner> {
    pub fn new(name: impl Into<String>) -> Result<Self, ServiceError> {
        Self::with_runner(name, SystemRunner)
    }
}

impl<R: Runner> Interface<R> {
    pub fn with_runner(name: impl Into<String>, runner: R) -> Result<Self, ServiceError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ServiceError::MissingInterface);
        }
        Ok(Self { name, runner })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// `wg show <iface> [extra...]`
    pub fn show(&self, extra: &[&str]) -> Result<String, ServiceError> {
        let mut args = vec!["show", self.name.as_str()];
        args.extend_from_slice(extra);
        self.runner.run("wg", &args)
    }

    pub fn start(&self) -> Result<String, ServiceError> {
        self.runner.run("wg-quick", &["up", &self.name])
    }

    pub fn stop(&self) -> Result<String, ServiceError> {
        self.runner.run("wg-quick", &["down", &self.name])
    }

    pub fn restart(&self) -> Result<String, ServiceError> {
        self.stop()?;
        self.start()
    }

    /// Applies `config` without disturbing sessions of unchanged peers.
    pub fn sync(&self, config: &Path) -> Result<String, ServiceError> {
        let config = config.to_string_lossy();
        self.runner.run("wg", &["syncconf", &self.name, &config])
    }

    /// Appends the directives in `config` to the running interface.
    pub fn add(&self, config: &Path) -> Result<String, ServiceError> {
        let config = config.to_string_lossy();
        self.runner.run("wg", &["addconf", &self.name, &config])
    }

    pub fn public_key(&self) -> Result<String, ServiceError> {
        Ok(self.show(&["public-key"])?.trim().to_string())
    }

    pub fn dump(&self) -> Result<String, ServiceError> {
        self.show(&["dump"])
    }

    /// Public keys of the configured peers.
    pub fn peers(&self) -> Result<Vec<String>, ServiceError> {
        Ok(self
            .show(&["peers"])?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    /// Per-peer statistics keyed by public key.
    pub fn stats(&self) -> Result<BTreeMap<String, InterfacePeer>, ServiceError> {
        Ok(parse_dump(&self.name, &self.dump()?))
    }
}

/// `ping -c 1 -W 1 <host>`
pub fn ping(runner: &impl Runner, host: IpAddr) -> Result<(), ServiceError> {
    let host = host.to_string();
    runner.run("ping", &["-c", "1", "-W", "1", &host])?;
    Ok(())
}

/// Parses `wg show <iface> dump`.
///
/// The interface's own line (4 fields) is skipped, as is any peer line that
/// does not parse; the latter with a warning.
pub fn parse_dump(interface: &str, text: &str) -> BTreeMap<String, InterfacePeer> {
    let mut peers = BTreeMap::new();
    for line in text.lines().filter(|line| !line.trim().is_empty()) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() == 4 {
            continue;
        }
        match parse_peer_line(interface, &fields) {
            Ok(peer) => {
                peers.insert(peer.public_key.clone(), peer);
            }
            Err(err) => warn!(%err, line, "skipping unparsable dump line"),
        }
    }
    peers
}

fn parse_peer_line(interface: &str, fields: &[&str]) -> Result<InterfacePeer, ServiceError> {
    let &[public_key, psk, endpoint, allowed_ips, handshake, rx, tx, keepalive] = fields else {
        return Err(ServiceError::Parse(format!(
            "expected 8 fields, got {}",
            fields.len()
        )));
    };

    let present = |value: &str| (value != "(none)").then(|| value.to_string());
    let number = |what: &str, value: &str| {
        value
            .parse::<u64>()
            .map_err(|_| ServiceError::Parse(format!("bad {what}: {value:?}")))
    };

    let allowed_ips = if allowed_ips == "(none)" {
        Vec::new()
    } else {
        allowed_ips
            .split(',')
            .map(|net| {
                net.parse::<IpNetwork>()
                    .map_err(|_| ServiceError::Parse(format!("bad allowed ip: {net:?}")))
            })
            .collect::<Result<_, _>>()?
    };

    let handshake = number("latest handshake", handshake)?;
    let latest_handshake = match handshake {
        0 => None,
        secs => Some(
            i64::try_from(secs)
                .ok()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .ok_or_else(|| ServiceError::Parse(format!("bad latest handshake: {secs}")))?,
        ),
    };

    let persistent_keepalive = match keepalive {
        "off" => None,
        value => Some(
            value
                .parse::<u16>()
                .map_err(|_| ServiceError::Parse(format!("bad keepalive: {value:?}")))?,
        ),
    };

    Ok(InterfacePeer {
        interface: interface.to_string(),
        public_key: public_key.to_string(),
        preshared_key: present(psk),
        endpoint: present(endpoint),
        allowed_ips,
        latest_handshake,
        rx: number("rx", rx)?,
        tx: number("tx", tx)?,
        persistent_keepalive,
    })
}
