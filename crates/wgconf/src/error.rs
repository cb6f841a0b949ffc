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
use std::net::IpAddr;

use ipnetwork::IpNetwork;
use thiserror::Error;

use crate::keys::KeyError;
use crate::sets::CoercionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => f.write_str("IPv4"),
            Self::V6 => f.write_str("IPv6"),
        }
    }
}

/// Something a server hands out that must be unique among its peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Ipv4Address,
    Ipv6Address,
    PrivateKey,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipv4Address => f.write_str("IPv4 address"),
            Self::Ipv6Address => f.write_str("IPv6 address"),
            Self::PrivateKey => f.write_str("private key"),
        }
    }
}

/// A field was given a malformed or out-of-range value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("You cannot specify more than 2 IPs for this interface: 1 IPv4 + 1 IPv6")]
    TooManyAddresses,

    #[error("'{0}' does not appear to be an IPv4 or IPv6 address")]
    InvalidAddress(String),

    #[error("A peer needs at least one IPv4 or IPv6 address")]
    MissingAddress,

    #[error("'{0}' does not appear to be an IPv4 or IPv6 network")]
    InvalidNetwork(String),

    #[error("Cannot set a 2nd {0} address.")]
    DuplicateAddressFamily(IpFamily),

    #[error("Cannot set public key to a value inconsistent with the private key!")]
    InconsistentKeyPair,

    #[error("MTU value must be in the range 1280-1420, got {0}")]
    MtuOutOfRange(u16),

    #[error(
        "MTU cannot be different between different peers (server: {}, peer: {peer})",
        .server.map_or_else(|| "unset".to_string(), |m| m.to_string())
    )]
    MtuMismatch { server: Option<u16>, peer: u16 },

    #[error("Table must be in the ranges 1-252, 256-(2^31-1), got {0}")]
    TableOutOfRange(i64),

    #[error("Table must be \"auto\", \"off\" or an integer value, got {0:?}")]
    InvalidTable(String),

    #[error("You cannot set more than 2 core subnets: 1 IPv4 + 1 IPv6. Use AllowedIPs instead.")]
    TooManySubnets,

    #[error("You cannot set 2 {0} core subnets.")]
    DuplicateSubnetFamily(IpFamily),

    #[error(
        "You cannot use an IPv4 `/32` subnet, nor an IPv6 `/128` subnet as that only gives \
         you 1 IP address to use, and therefore you cannot have any peers! (got {0})"
    )]
    SingleAddressSubnet(IpNetwork),

    #[error("You cannot provide both an address AND a subnet with host bits set!")]
    AddressWithHostBits,

    #[error("address {address} is not within the core subnet {subnet}")]
    AddressOutsideSubnet { address: IpAddr, subnet: IpNetwork },

    #[error("Could not add peer to this server. Its {resource} is not unique.")]
    NotUnique {
        resource: Resource,
        #[source]
        cause: Option<AllocationError>,
    },

    #[error(transparent)]
    Coercion(#[from] CoercionError),

    #[error("invalid key: {0}")]
    Key(#[from] KeyError),
}

/// The bounded search for an unused address or key pair gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("Too many retries to obtain an unused {resource} ({attempts} attempts)")]
    Exhausted { resource: Resource, attempts: u32 },

    #[error("no {0} core subnet to allocate from")]
    NoSubnet(IpFamily),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MissingDataError {
    #[error(
        "Unable to retrieve private key. Public key is set, and the associated private key \
         was not provided."
    )]
    PrivateKey,

    #[error("You must provide a valid peer: a public key is required to render a config")]
    PublicKey,
}
