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

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::error::{IpFamily, MissingDataError, ValidationError};
use crate::keys::{PrivateKey, PublicKey};
use crate::sets::{AddressSet, NetworkSet};
use crate::{INTERFACE, KEEPALIVE_MINIMUM, PORT};

const MTU_MIN: u16 = 1280;
const MTU_MAX: u16 = 1420;

/// Routing table for `wg-quick`: `auto`, `off`, or a table id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTable", into = "RawTable")]
pub enum Table {
    Auto,
    Off,
    Id(u32),
}

impl Table {
    /// Ids 253-255 are reserved by the kernel (default, main, local).
    pub fn from_id(id: i64) -> Result<Self, ValidationError> {
        if (1..=252).contains(&id) || (256..(1i64 << 31)).contains(&id) {
            // range-checked above
            Ok(Self::Id(id as u32))
        } else {
            Err(ValidationError::TableOutOfRange(id))
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Off => f.write_str("off"),
            Self::Id(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for Table {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "auto" => Ok(Self::Auto),
            "off" => Ok(Self::Off),
            other => match other.parse::<i64>() {
                Ok(id) => Self::from_id(id),
                Err(_) => Err(ValidationError::InvalidTable(s.to_string())),
            },
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawTable {
    Int(i64),
    Text(String),
}

impl TryFrom<RawTable> for Table {
    type Error = ValidationError;

    fn try_from(raw: RawTable) -> Result<Self, Self::Error> {
        match raw {
            RawTable::Int(id) => Self::from_id(id),
            RawTable::Text(text) => match text.as_str() {
                "auto" => Ok(Self::Auto),
                "off" => Ok(Self::Off),
                _ => Err(ValidationError::InvalidTable(text)),
            },
        }
    }
}

impl From<Table> for RawTable {
    fn from(table: Table) -> Self {
        match table {
            Table::Id(id) => RawTable::Int(i64::from(id)),
            other => RawTable::Text(other.to_string()),
        }
    }
}

/// Construction input for a [`Peer`]. Anything left unset takes its default.
#[derive(Debug, Clone, Default)]
pub struct PeerOptions {
    /// Up to one IPv4 and one IPv6 address, optionally with a prefix.
    pub address: Vec<String>,
    pub allowed_ips: Vec<String>,
    pub comments: Vec<String>,
    pub dns: Vec<String>,
    pub endpoint: Option<String>,
    pub interface: Option<String>,
    pub keepalive: Option<u16>,
    pub mtu: Option<u16>,
    pub port: Option<u16>,
    pub pre_up: Vec<String>,
    pub post_up: Vec<String>,
    pub pre_down: Vec<String>,
    pub post_down: Vec<String>,
    pub preshared_key: Option<String>,
    pub private_key: Option<String>,
    pub public_key: Option<String>,
    pub save_config: Option<bool>,
    pub table: Option<Table>,
}

#[derive(Clone, PartialEq, Eq)]
enum KeyMaterial {
    Pair {
        private: PrivateKey,
        public: PublicKey,
    },
    PublicOnly(PublicKey),
}

impl KeyMaterial {
    fn from_private(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self::Pair { private, public }
    }
}

/// An addressable WireGuard endpoint: identity, keys and routing policy.
///
/// Links to other peers are not stored here; see [`crate::Topology`].
#[derive(Clone)]
pub struct Peer {
    /// Human label, rendered as a comment above this peer's `[Peer]` block.
    pub description: String,
    ipv4: Option<Ipv4Addr>,
    ipv6: Option<Ipv6Addr>,
    port: u16,
    interface: String,
    keys: KeyMaterial,
    pub preshared_key: Option<String>,
    keepalive: Option<u16>,
    mtu: Option<u16>,
    pub table: Option<Table>,
    /// Always holds this peer's own host routes.
    pub allowed_ips: NetworkSet,
    pub dns: AddressSet,
    pub pre_up: Vec<String>,
    pub post_up: Vec<String>,
    pub pre_down: Vec<String>,
    pub post_down: Vec<String>,
    pub comments: Vec<String>,
    endpoint: Option<String>,
    pub save_config: Option<bool>,
}

impl Peer {
    /// Builds a peer from 1-2 addresses. Address-less descriptors come from
    /// [`Peer::remote`].
    pub fn new(description: impl Into<String>, options: PeerOptions) -> Result<Self, ValidationError> {
        if options.address.is_empty() {
            return Err(ValidationError::MissingAddress);
        }
        if options.address.len() > 2 {
            return Err(ValidationError::TooManyAddresses);
        }

        let mut ipv4 = None;
        let mut ipv6 = None;
        for value in &options.address {
            match parse_peer_address(value)? {
                IpAddr::V4(ip) => {
                    if ipv4.replace(ip).is_some() {
                        return Err(ValidationError::DuplicateAddressFamily(IpFamily::V4));
                    }
                }
                IpAddr::V6(ip) => {
                    if ipv6.replace(ip).is_some() {
                        return Err(ValidationError::DuplicateAddressFamily(IpFamily::V6));
                    }
                }
            }
        }

        let keys = match (&options.private_key, &options.public_key) {
            (None, None) => KeyMaterial::from_private(PrivateKey::generate()),
            (Some(private), public) => {
                let keys = KeyMaterial::from_private(private.parse()?);
                if let (Some(public), KeyMaterial::Pair { public: derived, .. }) = (public, &keys) {
                    if public.parse::<PublicKey>()? != *derived {
                        return Err(ValidationError::InconsistentKeyPair);
                    }
                }
                keys
            }
            (None, Some(public)) => KeyMaterial::PublicOnly(public.parse()?),
        };

        let mut peer = Self {
            description: description.into(),
            ipv4,
            ipv6,
            port: PORT,
            interface: INTERFACE.to_string(),
            keys,
            preshared_key: None,
            keepalive: None,
            mtu: None,
            table: options.table,
            allowed_ips: NetworkSet::new(),
            dns: AddressSet::new(),
            pre_up: options.pre_up,
            post_up: options.post_up,
            pre_down: options.pre_down,
            post_down: options.post_down,
            comments: options.comments,
            endpoint: None,
            save_config: options.save_config,
        };

        peer.set_preshared_key(options.preshared_key);
        peer.set_endpoint(options.endpoint);
        if let Some(port) = options.port {
            peer.set_port(port);
        }
        if let Some(interface) = options.interface {
            peer.set_interface(interface);
        }
        peer.set_keepalive(options.keepalive);
        peer.set_mtu(options.mtu)?;

        for ip in peer.address() {
            peer.allowed_ips.insert(IpNetwork::from(ip));
        }
        if !options.allowed_ips.is_empty() {
            peer.allowed_ips.extend(&options.allowed_ips)?;
        }
        if !options.dns.is_empty() {
            peer.dns.extend(&options.dns)?;
        }

        Ok(peer)
    }

    /// A descriptor holding only what a `[Peer]` block needs, e.g. for a
    /// remote endpoint whose private key is unknown.
    pub fn remote(public_key: PublicKey, allowed_ips: NetworkSet) -> Self {
        Self {
            description: String::new(),
            ipv4: None,
            ipv6: None,
            port: PORT,
            interface: INTERFACE.to_string(),
            keys: KeyMaterial::PublicOnly(public_key),
            preshared_key: None,
            keepalive: None,
            mtu: None,
            table: None,
            allowed_ips,
            dns: AddressSet::new(),
            pre_up: Vec::new(),
            post_up: Vec::new(),
            pre_down: Vec::new(),
            post_down: Vec::new(),
            comments: Vec::new(),
            endpoint: None,
            save_config: None,
        }
    }

    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.ipv4
    }

    pub fn ipv6(&self) -> Option<Ipv6Addr> {
        self.ipv6
    }

    /// Replaces the IPv4 address along with its host route in `allowed_ips`.
    pub fn set_ipv4(&mut self, ip: Option<Ipv4Addr>) {
        if let Some(old) = self.ipv4.take() {
            self.allowed_ips.remove(&IpNetwork::from(IpAddr::V4(old)));
        }
        if let Some(ip) = ip {
            self.allowed_ips.insert(IpNetwork::from(IpAddr::V4(ip)));
        }
        self.ipv4 = ip;
    }

    pub fn set_ipv6(&mut self, ip: Option<Ipv6Addr>) {
        if let Some(old) = self.ipv6.take() {
            self.allowed_ips.remove(&IpNetwork::from(IpAddr::V6(old)));
        }
        if let Some(ip) = ip {
            self.allowed_ips.insert(IpNetwork::from(IpAddr::V6(ip)));
        }
        self.ipv6 = ip;
    }

    /// IPv4 first, then IPv6.
    pub fn address(&self) -> Vec<IpAddr> {
        self.ipv4
            .map(IpAddr::V4)
            .into_iter()
            .chain(self.ipv6.map(IpAddr::V6))
            .collect()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// An empty name resets to the default interface.
    pub fn set_interface(&mut self, interface: impl Into<String>) {
        let interface = interface.into();
        self.interface = if interface.is_empty() {
            INTERFACE.to_string()
        } else {
            interface
        };
    }

    /// `host:port`; the listen port is appended unless already present.
    pub fn endpoint(&self) -> Option<String> {
        let endpoint = self.endpoint.as_deref()?;
        let suffix = format!(":{}", self.port);
        if endpoint.ends_with(&suffix) {
            Some(endpoint.to_string())
        } else {
            Some(format!("{endpoint}{suffix}"))
        }
    }

    pub fn set_endpoint(&mut self, endpoint: Option<String>) {
        self.endpoint = endpoint.filter(|e| !e.trim().is_empty());
    }

    pub fn keepalive(&self) -> Option<u16> {
        self.keepalive
    }

    /// Values below [`KEEPALIVE_MINIMUM`] are raised to it.
    pub fn set_keepalive(&mut self, keepalive: Option<u16>) {
        self.keepalive = keepalive.map(|k| k.max(KEEPALIVE_MINIMUM));
    }

    pub fn mtu(&self) -> Option<u16> {
        self.mtu
    }

    pub fn set_mtu(&mut self, mtu: Option<u16>) -> Result<(), ValidationError> {
        if let Some(mtu) = mtu {
            if !(MTU_MIN..=MTU_MAX).contains(&mtu) {
                return Err(ValidationError::MtuOutOfRange(mtu));
            }
        }
        self.mtu = mtu;
        Ok(())
    }

    /// Empty keys are treated as unset.
    pub fn set_preshared_key(&mut self, key: Option<String>) {
        self.preshared_key = key.filter(|k| !k.is_empty());
    }

    pub fn public_key(&self) -> PublicKey {
        match &self.keys {
            KeyMaterial::Pair { public, .. } => *public,
            KeyMaterial::PublicOnly(public) => *public,
        }
    }

    pub fn private_key(&self) -> Result<&PrivateKey, MissingDataError> {
        match &self.keys {
            KeyMaterial::Pair { private, .. } => Ok(private),
            KeyMaterial::PublicOnly(_) => Err(MissingDataError::PrivateKey),
        }
    }

    pub fn has_private_key(&self) -> bool {
        matches!(self.keys, KeyMaterial::Pair { .. })
    }

    /// Replaces the whole key pair; the public key is re-derived.
    pub fn set_private_key(&mut self, key: PrivateKey) {
        self.keys = KeyMaterial::from_private(key);
    }

    pub fn set_public_key(&mut self, key: PublicKey) -> Result<(), ValidationError> {
        match &self.keys {
            KeyMaterial::Pair { public, .. } if *public != key => {
                Err(ValidationError::InconsistentKeyPair)
            }
            KeyMaterial::Pair { .. } => Ok(()),
            KeyMaterial::PublicOnly(_) => {
                self.keys = KeyMaterial::PublicOnly(key);
                Ok(())
            }
        }
    }

    pub fn add_comment(&mut self, comment: impl Into<String>) {
        self.comments.push(comment.into());
    }

    /// Forwarding and masquerade rules for routing this interface out of `outbound`.
    pub fn add_nat_traversal(&mut self, outbound: &str) {
        let rules = |op: &str| {
            [
                format!("iptables {op} FORWARD -i %i -o {outbound} -j ACCEPT"),
                format!(
                    "iptables {op} FORWARD -i {outbound} -o %i -m conntrack \
                     --ctstate RELATED,ESTABLISHED -j ACCEPT"
                ),
                format!("iptables -t nat {op} POSTROUTING -o {outbound} -j MASQUERADE"),
            ]
        };
        self.post_up.extend(rules("-A"));
        self.post_down.extend(rules("-D"));
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("description", &self.description)
            .field("interface", &self.interface)
            .field("address", &self.address())
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Splits `value` into its host address and network.
///
/// A bare address yields `(Some(ip), None)`, a network without host bits
/// `(None, Some(net))`, and a host-bits literal such as `10.0.0.5/24` yields
/// both `10.0.0.5` and `10.0.0.0/24`.
pub(crate) fn find_ip_and_subnet(
    value: &str,
) -> Result<(Option<IpAddr>, Option<IpNetwork>), ValidationError> {
    let value = value.trim();
    if !value.contains('/') {
        let ip = value
            .parse::<IpAddr>()
            .map_err(|_| ValidationError::InvalidAddress(value.to_string()))?;
        return Ok((Some(ip), None));
    }

    let net: IpNetwork = value
        .parse()
        .map_err(|_| ValidationError::InvalidNetwork(value.to_string()))?;
    if net.ip() == net.network() {
        return Ok((None, Some(net)));
    }

    let subnet = IpNetwork::new(net.network(), net.prefix())
        .map_err(|_| ValidationError::InvalidNetwork(value.to_string()))?;
    Ok((Some(net.ip()), Some(subnet)))
}

/// Peer addresses may carry a prefix; a host route counts as a bare address.
fn parse_peer_address(value: &str) -> Result<IpAddr, ValidationError> {
    let invalid = || ValidationError::InvalidAddress(value.to_string());
    match find_ip_and_subnet(value).map_err(|_| invalid())? {
        (Some(ip), _) => Ok(ip),
        (None, Some(net)) if net.prefix() == max_prefix(&net.ip()) => Ok(net.ip()),
        _ => Err(invalid()),
    }
}

pub(crate) fn max_prefix(ip: &IpAddr) -> u8 {
    match ip {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const PRIVATE: &str = "9ZFnCUpTWG3/rOLWXr1Yx5nHY6TawlthxoVl9WsPWJk=";
    const PUBLIC: &str = "clrrtKlXuXnbDXN7nM00fMytLHDzaAGChERA1Pmvqns=";
    const OTHER_PUBLIC: &str = "ZJMdTDweEMnyoSxa88HWulr3NUtkqhldHHNG/Oup9iM=";

    fn opts(address: &[&str]) -> PeerOptions {
        PeerOptions {
            address: address.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults() {
        let peer = Peer::new("laptop", opts(&["10.0.0.2"])).unwrap();
        assert_eq!(peer.port(), PORT);
        assert_eq!(peer.interface(), INTERFACE);
        assert!(peer.has_private_key());
        assert_eq!(peer.allowed_ips.to_strings(), vec!["10.0.0.2/32"]);
        assert_eq!(peer.keepalive(), None);
    }

    #[test]
    fn dual_stack_address_order() {
        let peer = Peer::new("dual", opts(&["fd00::2", "10.0.0.2"])).unwrap();
        assert_eq!(
            peer.address(),
            vec![
                "10.0.0.2".parse::<IpAddr>().unwrap(),
                "fd00::2".parse::<IpAddr>().unwrap()
            ]
        );
        assert_eq!(peer.allowed_ips.len(), 2);
    }

    #[test_case(&["10.0.0.1", "10.0.0.2"], "Cannot set a 2nd IPv4 address." ; "two ipv4")]
    #[test_case(&["fd00::1", "fd00::2"], "Cannot set a 2nd IPv6 address." ; "two ipv6")]
    #[test_case(&["10.0.0.1", "fd00::1", "10.0.0.3"], "more than 2 IPs" ; "three addresses")]
    #[test_case(&["garbage"], "does not appear to be an IPv4 or IPv6 address" ; "garbage")]
    #[test_case(&["10.0.0.0/24"], "does not appear to be an IPv4 or IPv6 address" ; "bare network")]
    fn rejects_bad_addresses(address: &[&str], message: &str) {
        let err = Peer::new("bad", opts(address)).unwrap_err();
        assert!(err.to_string().contains(message), "{err}");
    }

    #[test]
    fn rejects_missing_address() {
        assert_eq!(
            Peer::new("nobody", PeerOptions::default()).unwrap_err(),
            ValidationError::MissingAddress
        );
        assert_eq!(
            Peer::new(
                "nobody",
                PeerOptions {
                    public_key: Some(PUBLIC.into()),
                    ..Default::default()
                }
            )
            .unwrap_err(),
            ValidationError::MissingAddress
        );
    }

    #[test]
    fn remote_needs_no_address() {
        let peer = Peer::remote(PUBLIC.parse().unwrap(), NetworkSet::new());
        assert!(peer.address().is_empty());
        assert!(!peer.has_private_key());
    }

    #[test]
    fn address_with_prefix_keeps_host() {
        let peer = Peer::new("p", opts(&["10.0.0.9/24"])).unwrap();
        assert_eq!(peer.ipv4(), Some(Ipv4Addr::new(10, 0, 0, 9)));
    }

    #[test]
    fn consistent_key_pair_accepted() {
        let peer = Peer::new(
            "p",
            PeerOptions {
                private_key: Some(PRIVATE.into()),
                public_key: Some(PUBLIC.into()),
                ..opts(&["10.0.0.2"])
            },
        )
        .unwrap();
        assert_eq!(peer.public_key().to_string(), PUBLIC);
    }

    #[test]
    fn inconsistent_key_pair_rejected() {
        let err = Peer::new(
            "p",
            PeerOptions {
                private_key: Some(PRIVATE.into()),
                public_key: Some(OTHER_PUBLIC.into()),
                ..opts(&["10.0.0.2"])
            },
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::InconsistentKeyPair);
    }

    #[test]
    fn public_only_has_no_private_key() {
        let peer = Peer::new(
            "p",
            PeerOptions {
                public_key: Some(PUBLIC.into()),
                ..opts(&["10.0.0.2"])
            },
        )
        .unwrap();
        assert_eq!(peer.private_key(), Err(MissingDataError::PrivateKey));
        assert_eq!(peer.public_key().to_string(), PUBLIC);
    }

    #[test]
    fn set_public_key_checks_pair() {
        let mut peer = Peer::new(
            "p",
            PeerOptions {
                private_key: Some(PRIVATE.into()),
                ..opts(&["10.0.0.2"])
            },
        )
        .unwrap();
        assert!(peer.set_public_key(PUBLIC.parse().unwrap()).is_ok());
        assert_eq!(
            peer.set_public_key(OTHER_PUBLIC.parse().unwrap()),
            Err(ValidationError::InconsistentKeyPair)
        );
    }

    #[test]
    fn set_private_key_replaces_pair() {
        let mut peer = Peer::new("p", opts(&["10.0.0.2"])).unwrap();
        peer.set_private_key(PRIVATE.parse().unwrap());
        assert_eq!(peer.public_key().to_string(), PUBLIC);
    }

    #[test_case(0, 5 ; "zero")]
    #[test_case(4, 5 ; "just below")]
    #[test_case(5, 5 ; "minimum")]
    #[test_case(25, 25 ; "above")]
    fn keepalive_floor(given: u16, stored: u16) {
        let mut peer = Peer::new("p", opts(&["10.0.0.2"])).unwrap();
        peer.set_keepalive(Some(given));
        assert_eq!(peer.keepalive(), Some(stored));
    }

    #[test_case(1279, false ; "below range")]
    #[test_case(1280, true ; "lower bound")]
    #[test_case(1420, true ; "upper bound")]
    #[test_case(1421, false ; "above range")]
    fn mtu_range(mtu: u16, ok: bool) {
        let mut peer = Peer::new("p", opts(&["10.0.0.2"])).unwrap();
        assert_eq!(peer.set_mtu(Some(mtu)).is_ok(), ok);
    }

    #[test_case("auto", Ok(Table::Auto) ; "auto")]
    #[test_case("off", Ok(Table::Off) ; "off")]
    #[test_case("1", Ok(Table::Id(1)) ; "lowest id")]
    #[test_case("252", Ok(Table::Id(252)) ; "below reserved")]
    #[test_case("256", Ok(Table::Id(256)) ; "above reserved")]
    #[test_case("2147483647", Ok(Table::Id(2147483647)) ; "largest id")]
    #[test_case("0", Err(ValidationError::TableOutOfRange(0)) ; "zero")]
    #[test_case("253", Err(ValidationError::TableOutOfRange(253)) ; "reserved")]
    #[test_case("2147483648", Err(ValidationError::TableOutOfRange(2147483648)) ; "too large")]
    #[test_case("true", Err(ValidationError::InvalidTable("true".into())) ; "boolean")]
    fn table_parse(input: &str, expected: Result<Table, ValidationError>) {
        assert_eq!(input.parse::<Table>(), expected);
    }

    #[test]
    fn table_error_messages() {
        assert!(
            Table::from_id(254)
                .unwrap_err()
                .to_string()
                .contains("must be in the ranges")
        );
        assert!(
            "nope"
                .parse::<Table>()
                .unwrap_err()
                .to_string()
                .contains(r#"must be "auto", "off" or an integer value"#)
        );
    }

    #[test]
    fn table_serde() {
        assert_eq!(serde_json::to_string(&Table::Id(10)).unwrap(), "10");
        assert_eq!(serde_json::to_string(&Table::Off).unwrap(), r#""off""#);
        assert_eq!(serde_json::from_str::<Table>(r#""auto""#).unwrap(), Table::Auto);
        assert!(serde_json::from_str::<Table>("253").is_err());
        assert!(serde_json::from_str::<Table>("true").is_err());
    }

    #[test_case("vpn.example.com", "vpn.example.com:51820" ; "port appended")]
    #[test_case("vpn.example.com:51820", "vpn.example.com:51820" ; "port kept")]
    #[test_case("[fd00::1]:51820", "[fd00::1]:51820" ; "ipv6 with port")]
    fn endpoint_port(given: &str, rendered: &str) {
        let mut peer = Peer::new("p", opts(&["10.0.0.2"])).unwrap();
        peer.set_endpoint(Some(given.to_string()));
        assert_eq!(peer.endpoint().as_deref(), Some(rendered));
    }

    #[test]
    fn nat_traversal_rules() {
        let mut peer = Peer::new("p", opts(&["10.0.0.1"])).unwrap();
        peer.add_nat_traversal("eth1");
        assert_eq!(peer.post_up.len(), 3);
        assert_eq!(peer.post_down.len(), 3);
        for (up, down) in peer.post_up.iter().zip(&peer.post_down) {
            assert!(up.contains("eth1"));
            assert_eq!(up.replace(" -A ", " -D "), *down);
        }
        assert_eq!(
            peer.post_up[2],
            "iptables -t nat -A POSTROUTING -o eth1 -j MASQUERADE"
        );
    }

    #[test]
    fn set_ipv4_moves_host_route() {
        let mut peer = Peer::new("p", opts(&["10.0.0.2"])).unwrap();
        peer.set_ipv4(Some(Ipv4Addr::new(10, 0, 0, 3)));
        assert_eq!(peer.allowed_ips.to_strings(), vec!["10.0.0.3/32"]);
    }

    #[test]
    fn extra_allowed_ips_and_dns() {
        let peer = Peer::new(
            "p",
            PeerOptions {
                allowed_ips: vec!["0.0.0.0/0".into()],
                dns: vec!["1.1.1.1".into()],
                ..opts(&["10.0.0.2"])
            },
        )
        .unwrap();
        assert_eq!(peer.allowed_ips.to_string(), "0.0.0.0/0,10.0.0.2/32");
        assert_eq!(peer.dns.to_string(), "1.1.1.1");
    }

    #[test]
    fn separate_instances_do_not_share_collections() {
        let mut a = Peer::new("a", opts(&["10.0.0.2"])).unwrap();
        let b = Peer::new("b", opts(&["10.0.0.3"])).unwrap();
        a.add_comment("only a");
        a.dns.add("1.1.1.1").unwrap();
        assert!(b.comments.is_empty());
        assert!(b.dns.is_empty());
    }

    #[test_case("10.0.0.5", (Some("10.0.0.5"), None) ; "bare address")]
    #[test_case("10.0.0.0/24", (None, Some("10.0.0.0/24")) ; "network")]
    #[test_case("10.0.0.5/24", (Some("10.0.0.5"), Some("10.0.0.0/24")) ; "host bits")]
    #[test_case("fd00::5/64", (Some("fd00::5"), Some("fd00::/64")) ; "ipv6 host bits")]
    fn splits_ip_and_subnet(input: &str, expected: (Option<&str>, Option<&str>)) {
        let (ip, net) = find_ip_and_subnet(input).unwrap();
        assert_eq!(ip.map(|i| i.to_string()).as_deref(), expected.0);
        assert_eq!(net.map(|n| n.to_string()).as_deref(), expected.1);
    }
}
