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

//! The peer graph. Nodes are owned by a [`Topology`] and refer to each other
//! by [`PeerId`]; links are always symmetric unless explicitly broken one way.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{self, Config, ConfigError};
use crate::error::{AllocationError, IpFamily, Resource, ValidationError};
use crate::keys::{PrivateKey, PublicKey};
use crate::peer::{Peer, PeerOptions};
use crate::server::{Occupancy, Retries, Server};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Peer(Peer),
    Server(Server),
}

impl Node {
    pub fn as_peer(&self) -> &Peer {
        match self {
            Self::Peer(peer) => peer,
            Self::Server(server) => server.peer(),
        }
    }

    pub fn as_peer_mut(&mut self) -> &mut Peer {
        match self {
            Self::Peer(peer) => peer,
            Self::Server(server) => &mut **server,
        }
    }

    pub fn as_server(&self) -> Option<&Server> {
        match self {
            Self::Server(server) => Some(server),
            Self::Peer(_) => None,
        }
    }

    pub fn is_server(&self) -> bool {
        matches!(self, Self::Server(_))
    }
}

impl From<Peer> for Node {
    fn from(peer: Peer) -> Self {
        Self::Peer(peer)
    }
}

impl From<Server> for Node {
    fn from(server: Server) -> Self {
        Self::Server(server)
    }
}

/// Retry policy for each resource [`Topology::add_peer`] may have to reassign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttachRetries {
    pub address: Retries,
    pub private_key: Retries,
}

/// Picks one linked peer out of a peer's links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerSelector {
    Description(String),
    Address(IpAddr),
    PublicKey(PublicKey),
    PrivateKey(PrivateKey),
}

impl PeerSelector {
    pub fn matches(&self, peer: &Peer) -> bool {
        match self {
            Self::Description(description) => peer.description == *description,
            Self::Address(ip) => peer.address().contains(ip),
            Self::PublicKey(key) => peer.public_key() == *key,
            Self::PrivateKey(key) => peer.private_key().is_ok_and(|own| own == key),
        }
    }
}

impl fmt::Display for PeerSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Description(description) => write!(f, "description {description:?}"),
            Self::Address(ip) => write!(f, "address {ip}"),
            Self::PublicKey(key) => write!(f, "public key {key}"),
            Self::PrivateKey(_) => f.write_str("private key <redacted>"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),

    #[error("peer {0} is not a server")]
    NotAServer(PeerId),

    #[error("peer {0} cannot be linked to itself")]
    SelfLink(PeerId),

    #[error("no peer linked to {owner} matches {selector}")]
    NotLinked { owner: PeerId, selector: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Owns every peer and server and the links between them.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    nodes: BTreeMap<PeerId, Node>,
    links: BTreeMap<PeerId, Vec<PeerId>>,
    next_id: u64,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: impl Into<Node>) -> PeerId {
        let id = PeerId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node.into());
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn get(&self, id: PeerId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: PeerId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn node(&self, id: PeerId) -> Result<&Node, TopologyError> {
        self.nodes.get(&id).ok_or(TopologyError::UnknownPeer(id))
    }

    pub fn server(&self, id: PeerId) -> Result<&Server, TopologyError> {
        self.node(id)?
            .as_server()
            .ok_or(TopologyError::NotAServer(id))
    }

    /// Swaps the contents of `id` for `node`, keeping its id and links.
    pub fn replace(&mut self, id: PeerId, node: impl Into<Node>) -> Result<Node, TopologyError> {
        let slot = self.nodes.get_mut(&id).ok_or(TopologyError::UnknownPeer(id))?;
        Ok(std::mem::replace(slot, node.into()))
    }

    /// Moves `first` to the front of `id`'s links, in that order.
    pub(crate) fn reorder_links(&mut self, id: PeerId, first: &[PeerId]) {
        if let Some(links) = self.links.get_mut(&id) {
            let rest: Vec<PeerId> = links.drain(..).filter(|other| !first.contains(other)).collect();
            links.extend(first.iter().copied().filter(|other| *other != id));
            links.extend(rest);
        }
    }

    /// First node whose public key is `key`.
    pub fn find_by_public_key(&self, key: &PublicKey) -> Option<PeerId> {
        self.nodes
            .iter()
            .find(|(_, node)| node.as_peer().public_key() == *key)
            .map(|(id, _)| *id)
    }

    /// Links `a` and `b` both ways. Linking twice is a no-op.
    pub fn link(&mut self, a: PeerId, b: PeerId) -> Result<(), TopologyError> {
        if a == b {
            return Err(TopologyError::SelfLink(a));
        }
        self.node(a)?;
        self.node(b)?;

        for (from, to) in [(a, b), (b, a)] {
            let links = self.links.entry(from).or_default();
            if !links.contains(&to) {
                links.push(to);
            }
        }
        Ok(())
    }

    /// Drops `other` from `owner`'s links, and `owner` from `other`'s when
    /// `bidirectional`. Missing links are ignored.
    pub fn remove_peer(&mut self, owner: PeerId, other: PeerId, bidirectional: bool) {
        if let Some(links) = self.links.get_mut(&owner) {
            links.retain(|id| *id != other);
        }
        if bidirectional {
            if let Some(links) = self.links.get_mut(&other) {
                links.retain(|id| *id != owner);
            }
        }
    }

    /// Ids linked to `id`, in link order.
    pub fn peers_of(&self, id: PeerId) -> &[PeerId] {
        self.links.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn linked(&self, id: PeerId) -> impl Iterator<Item = (PeerId, &Node)> + '_ {
        self.peers_of(id)
            .iter()
            .filter_map(|other| self.nodes.get(other).map(|node| (*other, node)))
    }

    pub fn is_linked(&self, a: PeerId, b: PeerId) -> bool {
        self.peers_of(a).contains(&b)
    }

    /// Everything taken on `server`: its own address and key plus every linked peer's.
    pub fn occupancy(&self, server: PeerId) -> Result<Occupancy, TopologyError> {
        self.occupancy_excluding(server, None)
    }

    fn occupancy_excluding(
        &self,
        server: PeerId,
        skip: Option<PeerId>,
    ) -> Result<Occupancy, TopologyError> {
        let mut occupancy = Occupancy::default();
        occupancy.record(self.server(server)?);
        for (id, node) in self.linked(server) {
            if Some(id) != skip {
                occupancy.record(node.as_peer());
            }
        }
        Ok(occupancy)
    }

    pub fn unique_address_ipv4(
        &self,
        server: PeerId,
        retries: Retries,
    ) -> Result<Ipv4Addr, TopologyError> {
        let occupancy = self.occupancy(server)?;
        Ok(self.server(server)?.unique_address_ipv4(&occupancy, retries)?)
    }

    pub fn unique_address_ipv6(
        &self,
        server: PeerId,
        retries: Retries,
    ) -> Result<Ipv6Addr, TopologyError> {
        let occupancy = self.occupancy(server)?;
        Ok(self.server(server)?.unique_address_ipv6(&occupancy, retries)?)
    }

    pub fn unique_privkey(
        &self,
        server: PeerId,
        retries: Retries,
    ) -> Result<PrivateKey, TopologyError> {
        let occupancy = self.occupancy(server)?;
        Ok(self.server(server)?.unique_privkey(&occupancy, retries)?)
    }

    /// Creates a peer of `server` and attaches it.
    ///
    /// DNS, interface, keepalive, MTU, port and preshared key are inherited
    /// from the server unless set in `options`. Addresses are allocated when
    /// none are given. Nothing is left in the topology on failure.
    #[tracing::instrument(skip_all, fields(server = %server))]
    pub fn peer(
        &mut self,
        server: PeerId,
        description: impl Into<String>,
        mut options: PeerOptions,
    ) -> Result<PeerId, TopologyError> {
        let srv = self.server(server)?;

        if let Some(mtu) = options.mtu {
            if srv.mtu() != Some(mtu) {
                return Err(ValidationError::MtuMismatch {
                    server: srv.mtu(),
                    peer: mtu,
                }
                .into());
            }
        }

        if options.dns.is_empty() {
            options.dns = srv.dns.to_strings();
        }
        if options.interface.is_none() {
            options.interface = Some(srv.interface().to_string());
        }
        if options.keepalive.is_none() {
            options.keepalive = srv.keepalive();
        }
        if options.mtu.is_none() {
            options.mtu = srv.mtu();
        }
        if options.port.is_none() {
            options.port = Some(srv.port());
        }
        if options.preshared_key.is_none() {
            options.preshared_key = srv.preshared_key.clone();
        }

        if options.address.is_empty() {
            let occupancy = self.occupancy(server)?;
            options.address = srv
                .unique_address(&occupancy, Retries::Default)
                .map_err(not_unique)?
                .iter()
                .map(ToString::to_string)
                .collect();
        }

        let explicit_key = options.private_key.is_some() || options.public_key.is_some();
        let retries = AttachRetries {
            address: Retries::Disabled,
            private_key: Retries::from(!explicit_key),
        };

        let id = self.insert(Peer::new(description, options)?);
        if let Err(err) = self.add_peer(server, id, retries) {
            self.nodes.remove(&id);
            return Err(err);
        }
        Ok(id)
    }

    /// Attaches an existing node to `server`, reassigning colliding addresses
    /// or keys as `retries` allows. Either every collision is resolved and
    /// the node is linked, or nothing changes.
    #[tracing::instrument(skip_all, fields(server = %server, peer = %peer))]
    pub fn add_peer(
        &mut self,
        server: PeerId,
        peer: PeerId,
        retries: AttachRetries,
    ) -> Result<(), TopologyError> {
        if server == peer {
            return Err(TopologyError::SelfLink(peer));
        }

        let srv = self.server(server)?;
        let candidate = self.node(peer)?.as_peer();
        let occupancy = self.occupancy_excluding(server, Some(peer))?;

        let mut ipv4 = None;
        if let (Some(ip), Some(_)) = (candidate.ipv4(), srv.ipv4_subnet()) {
            if occupancy.ipv4.contains(&ip) {
                if retries.address.is_disabled() {
                    return Err(collision(Resource::Ipv4Address).into());
                }
                ipv4 = Some(
                    srv.unique_address_ipv4(&occupancy, retries.address)
                        .map_err(not_unique)?,
                );
            }
        }

        let mut ipv6 = None;
        if let (Some(ip), Some(_)) = (candidate.ipv6(), srv.ipv6_subnet()) {
            if occupancy.ipv6.contains(&ip) {
                if retries.address.is_disabled() {
                    return Err(collision(Resource::Ipv6Address).into());
                }
                ipv6 = Some(
                    srv.unique_address_ipv6(&occupancy, retries.address)
                        .map_err(not_unique)?,
                );
            }
        }

        let mut key = None;
        if occupancy.public_keys.contains(&candidate.public_key()) {
            if retries.private_key.is_disabled() {
                return Err(collision(Resource::PrivateKey).into());
            }
            key = Some(
                srv.unique_privkey(&occupancy, retries.private_key)
                    .map_err(not_unique)?,
            );
        }

        let node = self
            .nodes
            .get_mut(&peer)
            .ok_or(TopologyError::UnknownPeer(peer))?
            .as_peer_mut();
        if let Some(ip) = ipv4 {
            debug!(%ip, "reassigned colliding IPv4 address");
            node.set_ipv4(Some(ip));
        }
        if let Some(ip) = ipv6 {
            debug!(%ip, "reassigned colliding IPv6 address");
            node.set_ipv6(Some(ip));
        }
        if let Some(key) = key {
            debug!("reassigned colliding key pair");
            node.set_private_key(key);
        }
        let description = node.description.clone();

        self.link(server, peer)?;
        info!(%description, "peer attached");
        Ok(())
    }

    pub fn find_linked(&self, owner: PeerId, selector: &PeerSelector) -> Option<PeerId> {
        self.linked(owner)
            .find(|(_, node)| selector.matches(node.as_peer()))
            .map(|(id, _)| id)
    }

    /// Unlinks the matching peer both ways; errors when nothing matches.
    pub fn remove_linked(
        &mut self,
        owner: PeerId,
        selector: &PeerSelector,
    ) -> Result<PeerId, TopologyError> {
        self.discard_linked(owner, selector)
            .ok_or_else(|| TopologyError::NotLinked {
                owner,
                selector: selector.to_string(),
            })
    }

    pub fn discard_linked(&mut self, owner: PeerId, selector: &PeerSelector) -> Option<PeerId> {
        let other = self.find_linked(owner, selector)?;
        self.remove_peer(owner, other, true);
        Some(other)
    }

    /// Renderer for `id` and everything linked to it.
    pub fn config(&self, id: PeerId) -> Result<Config<'_>, TopologyError> {
        let subject = self.node(id)?;
        let remotes = self
            .linked(id)
            .map(|(_, node)| node as &dyn config::Renderable)
            .collect();
        Ok(Config::new(subject)?.with_peers(remotes))
    }
}

fn collision(resource: Resource) -> ValidationError {
    ValidationError::NotUnique {
        resource,
        cause: None,
    }
}

fn not_unique(cause: AllocationError) -> ValidationError {
    let resource = match &cause {
        AllocationError::Exhausted { resource, .. } => *resource,
        AllocationError::NoSubnet(IpFamily::V4) => Resource::Ipv4Address,
        AllocationError::NoSubnet(IpFamily::V6) => Resource::Ipv6Address,
    };
    ValidationError::NotUnique {
        resource,
        cause: Some(cause),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const PRIVATE: &str = "9ZFnCUpTWG3/rOLWXr1Yx5nHY6TawlthxoVl9WsPWJk=";

    fn setup(subnets: &[&str]) -> (Topology, PeerId) {
        let mut topology = Topology::new();
        let server = Server::new("test-server", subnets, PeerOptions::default()).unwrap();
        let id = topology.insert(server);
        (topology, id)
    }

    fn addressed(address: &str) -> PeerOptions {
        PeerOptions {
            address: vec![address.to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn two_peers_are_linked_both_ways() {
        let (mut topology, server) = setup(&["192.168.0.1/24"]);
        let p1 = topology.peer(server, "p1", PeerOptions::default()).unwrap();
        let p2 = topology.peer(server, "p2", PeerOptions::default()).unwrap();

        assert_eq!(topology.peers_of(server), &[p1, p2]);
        assert!(topology.is_linked(p1, server));
        assert!(!topology.is_linked(server, server));
        assert_ne!(
            topology.node(p1).unwrap().as_peer().public_key(),
            topology.node(p2).unwrap().as_peer().public_key()
        );
    }

    #[test]
    fn addresses_and_keys_are_unique() {
        let (mut topology, server) = setup(&["10.0.0.1/27", "fd00::1/120"]);
        let mut ids = vec![server];
        for n in 0..20 {
            ids.push(topology.peer(server, format!("p{n}"), PeerOptions::default()).unwrap());
        }

        let peers: Vec<&Peer> = ids.iter().map(|id| topology.node(*id).unwrap().as_peer()).collect();
        let v4: HashSet<_> = peers.iter().filter_map(|p| p.ipv4()).collect();
        let v6: HashSet<_> = peers.iter().filter_map(|p| p.ipv6()).collect();
        let keys: HashSet<_> = peers.iter().map(|p| p.public_key()).collect();
        assert_eq!(v4.len(), ids.len());
        assert_eq!(v6.len(), ids.len());
        assert_eq!(keys.len(), ids.len());
    }

    #[test]
    fn peer_inherits_server_options() {
        let mut topology = Topology::new();
        let server = Server::new(
            "s",
            &["10.0.0.1/24"],
            PeerOptions {
                dns: vec!["1.1.1.1".into()],
                interface: Some("wg7".into()),
                keepalive: Some(30),
                mtu: Some(1400),
                port: Some(4500),
                preshared_key: Some("psk".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let server = topology.insert(server);
        let id = topology.peer(server, "p", PeerOptions::default()).unwrap();
        let peer = topology.node(id).unwrap().as_peer();

        assert_eq!(peer.dns.to_string(), "1.1.1.1");
        assert_eq!(peer.interface(), "wg7");
        assert_eq!(peer.keepalive(), Some(30));
        assert_eq!(peer.mtu(), Some(1400));
        assert_eq!(peer.port(), 4500);
        assert_eq!(peer.preshared_key.as_deref(), Some("psk"));
    }

    #[test]
    fn explicit_options_override_inheritance() {
        let (mut topology, server) = setup(&["10.0.0.1/24"]);
        let id = topology
            .peer(
                server,
                "p",
                PeerOptions {
                    keepalive: Some(10),
                    port: Some(1234),
                    ..Default::default()
                },
            )
            .unwrap();
        let peer = topology.node(id).unwrap().as_peer();
        assert_eq!(peer.keepalive(), Some(10));
        assert_eq!(peer.port(), 1234);
    }

    #[test]
    fn mtu_mismatch_rejected() {
        let (mut topology, server) = setup(&["10.0.0.1/24"]);
        let err = topology
            .peer(
                server,
                "p",
                PeerOptions {
                    mtu: Some(1420),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("MTU cannot be different"));
        assert_eq!(topology.len(), 1);
    }

    #[test]
    fn explicit_colliding_address_is_fatal() {
        let (mut topology, server) = setup(&["10.0.0.1/24"]);
        let err = topology.peer(server, "dup", addressed("10.0.0.1")).unwrap_err();
        assert!(err.to_string().contains("is not unique"));
        assert_eq!(topology.len(), 1);
        assert!(topology.peers_of(server).is_empty());
    }

    #[test]
    fn add_peer_reassigns_colliding_address() {
        let (mut topology, server) = setup(&["10.0.0.1/24"]);
        let id = topology.insert(Peer::new("p", addressed("10.0.0.1")).unwrap());
        topology
            .add_peer(server, id, AttachRetries::default())
            .unwrap();

        let peer = topology.node(id).unwrap().as_peer();
        let ip = peer.ipv4().unwrap();
        assert_ne!(ip, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(peer.allowed_ips.to_strings(), vec![format!("{ip}/32")]);
    }

    #[test]
    fn add_peer_reassigns_colliding_key() {
        let mut topology = Topology::new();
        let server = Server::new(
            "s",
            &["10.0.0.1/24"],
            PeerOptions {
                private_key: Some(PRIVATE.into()),
                ..Default::default()
            },
        )
        .unwrap();
        let server = topology.insert(server);
        let id = topology.insert(
            Peer::new(
                "p",
                PeerOptions {
                    private_key: Some(PRIVATE.into()),
                    ..addressed("10.0.0.2")
                },
            )
            .unwrap(),
        );

        topology.add_peer(server, id, AttachRetries::default()).unwrap();
        assert_ne!(
            topology.node(id).unwrap().as_peer().public_key(),
            topology.server(server).unwrap().public_key()
        );
    }

    #[test]
    fn add_peer_is_atomic() {
        let mut topology = Topology::new();
        let server = Server::new(
            "s",
            &["10.0.0.1/24"],
            PeerOptions {
                private_key: Some(PRIVATE.into()),
                ..Default::default()
            },
        )
        .unwrap();
        let server = topology.insert(server);
        let id = topology.insert(
            Peer::new(
                "p",
                PeerOptions {
                    private_key: Some(PRIVATE.into()),
                    ..addressed("10.0.0.1")
                },
            )
            .unwrap(),
        );

        let retries = AttachRetries {
            address: Retries::Default,
            private_key: Retries::Disabled,
        };
        let err = topology.add_peer(server, id, retries).unwrap_err();
        assert!(matches!(
            err,
            TopologyError::Validation(ValidationError::NotUnique {
                resource: Resource::PrivateKey,
                ..
            })
        ));

        let peer = topology.node(id).unwrap().as_peer();
        assert_eq!(peer.ipv4(), Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(topology.peers_of(server).is_empty());
    }

    #[test]
    fn re_adding_a_peer_does_not_collide_with_itself() {
        let (mut topology, server) = setup(&["10.0.0.1/24"]);
        let id = topology.peer(server, "p", PeerOptions::default()).unwrap();
        let before = topology.node(id).unwrap().as_peer().ipv4();

        let retries = AttachRetries {
            address: Retries::Disabled,
            private_key: Retries::Disabled,
        };
        topology.add_peer(server, id, retries).unwrap();
        assert_eq!(topology.node(id).unwrap().as_peer().ipv4(), before);
        assert_eq!(topology.peers_of(server).len(), 1);
    }

    #[test]
    fn add_peer_requires_server() {
        let mut topology = Topology::new();
        let a = topology.insert(Peer::new("a", addressed("10.0.0.1")).unwrap());
        let b = topology.insert(Peer::new("b", addressed("10.0.0.2")).unwrap());
        assert!(matches!(
            topology.add_peer(a, b, AttachRetries::default()),
            Err(TopologyError::NotAServer(_))
        ));
        assert!(matches!(topology.link(a, a), Err(TopologyError::SelfLink(_))));
    }

    #[test]
    fn replace_keeps_id_and_links() {
        let mut topology = Topology::new();
        let a = topology.insert(Peer::new("a", addressed("10.0.0.1")).unwrap());
        let b = topology.insert(Peer::new("b", addressed("10.0.0.2")).unwrap());
        topology.link(a, b).unwrap();

        let old = topology
            .replace(b, Peer::new("c", addressed("10.0.0.3")).unwrap())
            .unwrap();
        assert_eq!(old.as_peer().description, "b");
        assert_eq!(topology.node(b).unwrap().as_peer().description, "c");
        assert!(topology.is_linked(a, b));
        assert_eq!(topology.len(), 2);

        assert!(matches!(
            topology.replace(PeerId(99), Peer::new("d", addressed("10.0.0.4")).unwrap()),
            Err(TopologyError::UnknownPeer(_))
        ));
    }

    #[test]
    fn remove_peer_one_way_and_both_ways() {
        let (mut topology, server) = setup(&["10.0.0.1/24"]);
        let p1 = topology.peer(server, "p1", PeerOptions::default()).unwrap();
        let p2 = topology.peer(server, "p2", PeerOptions::default()).unwrap();

        topology.remove_peer(server, p1, false);
        assert!(!topology.is_linked(server, p1));
        assert!(topology.is_linked(p1, server));

        topology.remove_peer(server, p2, true);
        assert!(!topology.is_linked(server, p2));
        assert!(!topology.is_linked(p2, server));

        // discard semantics
        topology.remove_peer(server, p2, true);
        assert_eq!(topology.len(), 3);
    }

    #[test]
    fn selectors() {
        let (mut topology, server) = setup(&["10.0.0.1/24"]);
        let p1 = topology.peer(server, "p1", addressed("10.0.0.20")).unwrap();
        let p2 = topology
            .peer(
                server,
                "p2",
                PeerOptions {
                    private_key: Some(PRIVATE.into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let p2_public = topology.node(p2).unwrap().as_peer().public_key();

        let by_desc = PeerSelector::Description("p1".into());
        let by_ip = PeerSelector::Address("10.0.0.20".parse().unwrap());
        let by_pub = PeerSelector::PublicKey(p2_public);
        let by_priv = PeerSelector::PrivateKey(PRIVATE.parse().unwrap());

        assert_eq!(topology.find_linked(server, &by_desc), Some(p1));
        assert_eq!(topology.find_linked(server, &by_ip), Some(p1));
        assert_eq!(topology.find_linked(server, &by_pub), Some(p2));
        assert_eq!(topology.find_linked(server, &by_priv), Some(p2));

        assert_eq!(topology.remove_linked(server, &by_desc).unwrap(), p1);
        assert!(matches!(
            topology.remove_linked(server, &by_desc),
            Err(TopologyError::NotLinked { .. })
        ));
        assert_eq!(topology.discard_linked(server, &by_desc), None);
        assert_eq!(topology.discard_linked(server, &by_pub), Some(p2));
        assert!(topology.peers_of(server).is_empty());
    }

    #[test]
    fn topology_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Topology>();
    }
}
