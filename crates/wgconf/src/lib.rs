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

//! wgconf: WireGuard topology modelling and `wg-quick` config rendering.
//!
//! The crate models peers and servers, hands out non-conflicting addresses
//! and key pairs when peers are attached to a server, and renders any node of
//! the resulting graph into the WireGuard INI format. A thin wrapper around
//! the `wg` and `wg-quick` tools lives in [`service`].
//!
//! ```no_run
//! use wgconf::{PeerOptions, Server, Topology};
//!
//! let mut topology = Topology::new();
//! let server = Server::new("vpn", &["10.0.0.1/24"], PeerOptions::default())?;
//! let server = topology.insert(server);
//! let laptop = topology.peer(server, "laptop", PeerOptions::default())?;
//!
//! println!("{}", topology.config(laptop)?.local_config()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod keys;
pub mod peer;
pub mod record;
pub mod server;
pub mod service;
pub mod sets;
pub mod topology;

pub use config::{Config, ConfigError, InterfaceFields, Renderable};
pub use error::{AllocationError, IpFamily, MissingDataError, Resource, ValidationError};
pub use keys::{KeyError, PrivateKey, PublicKey, derive_public, generate_key};
pub use peer::{Peer, PeerOptions, Table};
pub use record::{PeerRecord, PeerSummary};
pub use server::{Occupancy, Retries, Server};
pub use sets::{AddressSet, ClassedSet, CoercionError, NetworkSet};
pub use topology::{AttachRetries, Node, PeerId, PeerSelector, Topology, TopologyError};

/// Directory `wg-quick` reads interface configs from.
pub const CONFIG_PATH: &str = "/etc/wireguard";

/// Interface name used when none is given.
pub const INTERFACE: &str = "wg0";

/// Listen port used when none is given.
pub const PORT: u16 = 51820;

/// Keepalive values below this are raised to it.
pub const KEEPALIVE_MINIMUM: u16 = 5;

/// Re-draws allowed when looking for an unused address.
pub const MAX_ADDRESS_RETRIES: u32 = 100;

/// Re-draws allowed when looking for an unused key pair.
pub const MAX_PRIVKEY_RETRIES: u32 = 10;
