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

//! Flat, JSON-friendly snapshots of a node and the reverse mapping.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ValidationError;
use crate::keys::PublicKey;
use crate::peer::{Peer, PeerOptions, Table};
use crate::server::Server;
use crate::sets::NetworkSet;
use crate::topology::{Node, PeerId, Topology, TopologyError};

/// A linked peer reduced to what identifies it, so records never recurse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSummary {
    pub address: Vec<String>,
    pub description: String,
    pub public_key: String,
}

/// Every attribute of a peer or server. Field order is the serialized order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerRecord {
    /// Core subnets; only servers have them.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subnet: Vec<String>,
    pub address: Vec<String>,
    pub allowed_ips: Vec<String>,
    pub comments: Vec<String>,
    pub description: String,
    pub dns: Vec<String>,
    pub endpoint: Option<String>,
    pub interface: Option<String>,
    pub keepalive: Option<u16>,
    pub mtu: Option<u16>,
    pub peers: Vec<PeerSummary>,
    pub port: Option<u16>,
    pub post_down: Vec<String>,
    pub post_up: Vec<String>,
    pub pre_down: Vec<String>,
    pub pre_up: Vec<String>,
    pub preshared_key: Option<String>,
    pub private_key: Option<String>,
    pub public_key: Option<String>,
    pub save_config: Option<bool>,
    pub table: Option<Table>,
}

impl PeerRecord {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    fn options(&self) -> PeerOptions {
        PeerOptions {
            address: self.address.clone(),
            allowed_ips: self.allowed_ips.clone(),
            comments: self.comments.clone(),
            dns: self.dns.clone(),
            endpoint: self.endpoint.clone(),
            interface: self.interface.clone(),
            keepalive: self.keepalive,
            mtu: self.mtu,
            port: self.port,
            pre_up: self.pre_up.clone(),
            post_up: self.post_up.clone(),
            pre_down: self.pre_down.clone(),
            post_down: self.post_down.clone(),
            preshared_key: self.preshared_key.clone(),
            private_key: self.private_key.clone(),
            public_key: self.public_key.clone(),
            save_config: self.save_config,
            table: self.table,
        }
    }
}

fn addresses(peer: &Peer) -> Vec<String> {
    peer.address().iter().map(ToString::to_string).collect()
}

impl Topology {
    pub fn record(&self, id: PeerId) -> Result<PeerRecord, TopologyError> {
        let node = self.node(id)?;
        let peer = node.as_peer();

        let subnet = node
            .as_server()
            .map(|server| server.subnets().iter().map(ToString::to_string).collect())
            .unwrap_or_default();

        let peers = self
            .linked(id)
            .map(|(_, other)| {
                let other = other.as_peer();
                PeerSummary {
                    address: addresses(other),
                    description: other.description.clone(),
                    public_key: other.public_key().to_string(),
                }
            })
            .collect();

        Ok(PeerRecord {
            subnet,
            address: addresses(peer),
            allowed_ips: peer.allowed_ips.to_strings(),
            comments: peer.comments.clone(),
            description: peer.description.clone(),
            dns: peer.dns.to_strings(),
            endpoint: peer.endpoint(),
            interface: Some(peer.interface().to_string()),
            keepalive: peer.keepalive(),
            mtu: peer.mtu(),
            peers,
            port: Some(peer.port()),
            post_down: peer.post_down.clone(),
            post_up: peer.post_up.clone(),
            pre_down: peer.pre_down.clone(),
            pre_up: peer.pre_up.clone(),
            preshared_key: peer.preshared_key.clone(),
            private_key: peer.private_key().ok().map(ToString::to_string),
            public_key: Some(peer.public_key().to_string()),
            save_config: peer.save_config,
            table: peer.table,
        })
    }

    /// Rebuilds a node from `record` and links it to its listed peers.
    ///
    /// A node already holding the record's public key (typically a stand-in
    /// left by an earlier restore) is replaced in place, keeping its id and
    /// links. A listed peer already in the topology is reused; otherwise a
    /// public-key-only peer stands in for it.
    pub fn restore(&mut self, record: &PeerRecord) -> Result<PeerId, TopologyError> {
        let node: Node = if !record.subnet.is_empty() {
            Server::new(
                record.description.clone(),
                record.subnet.as_slice(),
                record.options(),
            )?
            .into()
        } else if record.address.is_empty() {
            record.remote()?.into()
        } else {
            Peer::new(record.description.clone(), record.options())?.into()
        };
        let existing = self.find_by_public_key(&node.as_peer().public_key());

        // resolve every link before touching the topology
        let mut links = Vec::with_capacity(record.peers.len());
        for summary in &record.peers {
            let key: PublicKey = summary
                .public_key
                .parse()
                .map_err(ValidationError::from)?;
            let link = match self.find_by_public_key(&key) {
                Some(known) if Some(known) == existing => {
                    return Err(TopologyError::SelfLink(known));
                }
                Some(known) => Link::Known(known),
                None => Link::StandIn(summary.stand_in(key)?),
            };
            links.push(link);
        }

        let id = match existing {
            Some(id) => {
                self.replace(id, node)?;
                id
            }
            None => self.insert(node),
        };

        let mut order = Vec::with_capacity(links.len());
        for link in links {
            let other = match link {
                Link::Known(other) => other,
                Link::StandIn(peer) => self.insert(peer),
            };
            self.link(id, other)?;
            order.push(other);
        }
        self.reorder_links(id, &order);

        debug!(%id, replaced = existing.is_some(), links = order.len(), "restored peer");
        Ok(id)
    }
}

impl PeerRecord {
    /// An address-less record can only describe a remote endpoint.
    fn remote(&self) -> Result<Peer, ValidationError> {
        let key: PublicKey = self
            .public_key
            .as_deref()
            .ok_or(ValidationError::MissingAddress)?
            .parse()?;
        let mut allowed_ips = NetworkSet::new();
        if !self.allowed_ips.is_empty() {
            allowed_ips.extend(&self.allowed_ips)?;
        }

        let mut peer = Peer::remote(key, allowed_ips);
        peer.description = self.description.clone();
        peer.comments = self.comments.clone();
        if let Some(port) = self.port {
            peer.set_port(port);
        }
        peer.set_endpoint(self.endpoint.clone());
        peer.set_keepalive(self.keepalive);
        peer.set_preshared_key(self.preshared_key.clone());
        Ok(peer)
    }
}

impl PeerSummary {
    fn stand_in(&self, key: PublicKey) -> Result<Peer, ValidationError> {
        if self.address.is_empty() {
            let mut peer = Peer::remote(key, NetworkSet::new());
            peer.description = self.description.clone();
            return Ok(peer);
        }
        Peer::new(
            self.description.clone(),
            PeerOptions {
                address: self.address.clone(),
                public_key: Some(self.public_key.clone()),
                ..Default::default()
            },
        )
    }
}

enum Link {
    Known(PeerId),
    StandIn(Peer),
}
