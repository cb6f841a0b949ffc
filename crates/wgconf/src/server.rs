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

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::ops::{Deref, DerefMut};

use ipnetwork::{IpNetwork, Ipv4Network, Ipv6Network};
use rand::Rng;
use tracing::{debug, warn};

use crate::error::{AllocationError, IpFamily, Resource, ValidationError};
use crate::keys::{PrivateKey, PublicKey};
use crate::peer::{Peer, PeerOptions, find_ip_and_subnet, max_prefix};
use crate::{MAX_ADDRESS_RETRIES, MAX_PRIVKEY_RETRIES};

/// How many re-draws an allocation may make after a collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retries {
    /// The first collision is fatal.
    Disabled,
    #[default]
    Default,
    /// `Limit(0)` behaves as [`Retries::Disabled`].
    Limit(u32),
}

impl Retries {
    pub fn bound(self, default: u32) -> u32 {
        match self {
            Self::Disabled => 0,
            Self::Default => default,
            Self::Limit(n) => n,
        }
    }

    pub fn is_disabled(self) -> bool {
        matches!(self, Self::Disabled | Self::Limit(0))
    }
}

impl From<bool> for Retries {
    fn from(enabled: bool) -> Self {
        if enabled { Self::Default } else { Self::Disabled }
    }
}

impl From<u32> for Retries {
    fn from(limit: u32) -> Self {
        Self::Limit(limit)
    }
}

/// Addresses and public keys already taken on a server: its own plus every
/// attached peer's.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Occupancy {
    pub ipv4: HashSet<Ipv4Addr>,
    pub ipv6: HashSet<Ipv6Addr>,
    pub public_keys: HashSet<PublicKey>,
}

impl Occupancy {
    pub fn record(&mut self, peer: &Peer) {
        self.ipv4.extend(peer.ipv4());
        self.ipv6.extend(peer.ipv6());
        self.public_keys.insert(peer.public_key());
    }

    pub fn contains_ip(&self, ip: &IpAddr) -> bool {
        match ip {
            IpAddr::V4(ip) => self.ipv4.contains(ip),
            IpAddr::V6(ip) => self.ipv6.contains(ip),
        }
    }
}

impl<'a> FromIterator<&'a Peer> for Occupancy {
    fn from_iter<I: IntoIterator<Item = &'a Peer>>(iter: I) -> Self {
        let mut occupancy = Self::default();
        for peer in iter {
            occupancy.record(peer);
        }
        occupancy
    }
}

/// A [`Peer`] owning up to one IPv4 and one IPv6 core subnet, from which it
/// allocates addresses for the peers attached to it.
#[derive(Debug, Clone)]
pub struct Server {
    peer: Peer,
    ipv4_subnet: Option<Ipv4Network>,
    ipv6_subnet: Option<Ipv6Network>,
}

impl Server {
    /// Builds a server from 0-2 subnet literals.
    ///
    /// A literal with host bits set (`10.0.0.5/24`) supplies the server's own
    /// address; otherwise the address comes from `options` or is drawn at
    /// random from the subnet(s). Without a subnet the address must be given.
    pub fn new<S: AsRef<str>>(
        description: impl Into<String>,
        subnets: &[S],
        mut options: PeerOptions,
    ) -> Result<Self, ValidationError> {
        if subnets.len() > 2 {
            return Err(ValidationError::TooManySubnets);
        }

        let explicit_address = !options.address.is_empty();
        let mut from_subnets = Vec::new();
        let mut ipv4_subnet = None;
        let mut ipv6_subnet = None;

        for value in subnets {
            let value = value.as_ref();
            let (ip, net) = find_ip_and_subnet(value)?;
            let net = net.ok_or_else(|| ValidationError::InvalidNetwork(value.to_string()))?;

            if let Some(ip) = ip {
                if explicit_address {
                    return Err(ValidationError::AddressWithHostBits);
                }
                from_subnets.push(ip);
            }

            if net.prefix() == max_prefix(&net.ip()) {
                return Err(ValidationError::SingleAddressSubnet(net));
            }

            match net {
                IpNetwork::V4(net) => {
                    if ipv4_subnet.replace(net).is_some() {
                        return Err(ValidationError::DuplicateSubnetFamily(IpFamily::V4));
                    }
                }
                IpNetwork::V6(net) => {
                    if ipv6_subnet.replace(net).is_some() {
                        return Err(ValidationError::DuplicateSubnetFamily(IpFamily::V6));
                    }
                }
            }
        }

        if !explicit_address {
            let own: Vec<IpAddr> = if from_subnets.is_empty() {
                let mut rng = rand::thread_rng();
                ipv4_subnet
                    .map(|net| IpAddr::V4(random_ipv4(net, &mut rng)))
                    .into_iter()
                    .chain(ipv6_subnet.map(|net| IpAddr::V6(random_ipv6(net, &mut rng))))
                    .collect()
            } else {
                from_subnets
            };
            options.address = own.iter().map(ToString::to_string).collect();
        }

        options
            .allowed_ips
            .extend(ipv4_subnet.map(|net| net.to_string()));
        options
            .allowed_ips
            .extend(ipv6_subnet.map(|net| net.to_string()));

        let peer = Peer::new(description, options)?;

        if let (Some(ip), Some(net)) = (peer.ipv4(), ipv4_subnet) {
            if !net.contains(ip) {
                return Err(ValidationError::AddressOutsideSubnet {
                    address: IpAddr::V4(ip),
                    subnet: IpNetwork::V4(net),
                });
            }
        }
        if let (Some(ip), Some(net)) = (peer.ipv6(), ipv6_subnet) {
            if !net.contains(ip) {
                return Err(ValidationError::AddressOutsideSubnet {
                    address: IpAddr::V6(ip),
                    subnet: IpNetwork::V6(net),
                });
            }
        }

        debug!(
            description = %peer.description,
            ?ipv4_subnet,
            ?ipv6_subnet,
            "server created"
        );

        Ok(Self {
            peer,
            ipv4_subnet,
            ipv6_subnet,
        })
    }

    pub fn ipv4_subnet(&self) -> Option<Ipv4Network> {
        self.ipv4_subnet
    }

    pub fn ipv6_subnet(&self) -> Option<Ipv6Network> {
        self.ipv6_subnet
    }

    /// IPv4 first.
    pub fn subnets(&self) -> Vec<IpNetwork> {
        self.ipv4_subnet
            .map(IpNetwork::V4)
            .into_iter()
            .chain(self.ipv6_subnet.map(IpNetwork::V6))
            .collect()
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    pub fn into_peer(self) -> Peer {
        self.peer
    }

    /// One unused address per core subnet, IPv4 first.
    pub fn unique_address(
        &self,
        occupancy: &Occupancy,
        retries: Retries,
    ) -> Result<Vec<IpAddr>, AllocationError> {
        let mut addresses = Vec::with_capacity(2);
        if self.ipv4_subnet.is_some() {
            addresses.push(IpAddr::V4(self.unique_address_ipv4(occupancy, retries)?));
        }
        if self.ipv6_subnet.is_some() {
            addresses.push(IpAddr::V6(self.unique_address_ipv6(occupancy, retries)?));
        }
        Ok(addresses)
    }

    pub fn unique_address_ipv4(
        &self,
        occupancy: &Occupancy,
        retries: Retries,
    ) -> Result<Ipv4Addr, AllocationError> {
        let net = self.ipv4_subnet.ok_or(AllocationError::NoSubnet(IpFamily::V4))?;
        let mut rng = rand::thread_rng();
        draw_unique(
            Resource::Ipv4Address,
            retries.bound(MAX_ADDRESS_RETRIES),
            || random_ipv4(net, &mut rng),
            |ip| occupancy.ipv4.contains(ip),
        )
    }

    pub fn unique_address_ipv6(
        &self,
        occupancy: &Occupancy,
        retries: Retries,
    ) -> Result<Ipv6Addr, AllocationError> {
        let net = self.ipv6_subnet.ok_or(AllocationError::NoSubnet(IpFamily::V6))?;
        let mut rng = rand::thread_rng();
        draw_unique(
            Resource::Ipv6Address,
            retries.bound(MAX_ADDRESS_RETRIES),
            || random_ipv6(net, &mut rng),
            |ip| occupancy.ipv6.contains(ip),
        )
    }

    /// A fresh private key whose public key nobody on this server uses yet.
    pub fn unique_privkey(
        &self,
        occupancy: &Occupancy,
        retries: Retries,
    ) -> Result<PrivateKey, AllocationError> {
        draw_unique(
            Resource::PrivateKey,
            retries.bound(MAX_PRIVKEY_RETRIES),
            PrivateKey::generate,
            |key| occupancy.public_keys.contains(&key.public_key()),
        )
    }
}

impl Deref for Server {
    type Target = Peer;

    fn deref(&self) -> &Peer {
        &self.peer
    }
}

impl DerefMut for Server {
    fn deref_mut(&mut self) -> &mut Peer {
        &mut self.peer
    }
}

/// Draws once, then re-draws while the candidate is taken, at most `bound` times.
fn draw_unique<T>(
    resource: Resource,
    bound: u32,
    mut draw: impl FnMut() -> T,
    taken: impl Fn(&T) -> bool,
) -> Result<T, AllocationError> {
    let mut candidate = draw();
    let mut tries = 0;

    while taken(&candidate) {
        if tries >= bound {
            warn!(%resource, attempts = tries + 1, "no unused value found");
            return Err(AllocationError::Exhausted {
                resource,
                attempts: tries + 1,
            });
        }
        debug!(%resource, tries, "candidate already in use, drawing again");
        candidate = draw();
        tries += 1;
    }

    Ok(candidate)
}

/// Network and broadcast addresses are skipped unless the subnet is a /31.
fn random_ipv4(net: Ipv4Network, rng: &mut impl Rng) -> Ipv4Addr {
    let base = u32::from(net.network());
    let size = 1u64 << (32 - u32::from(net.prefix()));
    let (low, high) = if size > 2 { (1, size - 2) } else { (0, size - 1) };
    let offset = rng.gen_range(low..=high);
    // offset < size, so base + offset stays inside the subnet
    Ipv4Addr::from(base + offset as u32)
}

/// Any address but the subnet's own network address.
fn random_ipv6(net: Ipv6Network, rng: &mut impl Rng) -> Ipv6Addr {
    let base = u128::from(net.network());
    let host_bits = 128 - u32::from(net.prefix());
    let max = if host_bits >= 128 {
        u128::MAX
    } else {
        (1u128 << host_bits) - 1
    };
    Ipv6Addr::from(base + rng.gen_range(1..=max))
}
