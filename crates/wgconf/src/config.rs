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

//! Rendering of the WireGuard INI format read by `wg` and `wg-quick`.

use std::fmt::Write;
use std::io;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use ipnetwork::IpNetwork;
use thiserror::Error;
use tracing::info;

use crate::error::MissingDataError;
use crate::keys::{PrivateKey, PublicKey};
use crate::peer::{Peer, Table, max_prefix};
use crate::server::Server;
use crate::topology::Node;
use crate::{CONFIG_PATH, INTERFACE};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    MissingData(#[from] MissingDataError),

    #[error("Preshared keys do not match for {local} and {remote}")]
    PresharedKeyMismatch { local: String, remote: String },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("QR code functionality is not enabled. Rebuild with the `qrcode` feature")]
    QrCodeDisabled,

    #[error("failed to encode QR code: {0}")]
    QrCode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceKey {
    Address,
    Dns,
    Port,
    PrivateKey,
    PreUp,
    PostUp,
    PreDown,
    PostDown,
    SaveConfig,
    Mtu,
    Table,
    Comments,
}

/// Line order of an `[Interface]` section. Comments always come last.
pub const INTERFACE_KEYS: [InterfaceKey; 12] = [
    InterfaceKey::Address,
    InterfaceKey::Dns,
    InterfaceKey::Port,
    InterfaceKey::PrivateKey,
    InterfaceKey::PreUp,
    InterfaceKey::PostUp,
    InterfaceKey::PreDown,
    InterfaceKey::PostDown,
    InterfaceKey::SaveConfig,
    InterfaceKey::Mtu,
    InterfaceKey::Table,
    InterfaceKey::Comments,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerKey {
    Description,
    AllowedIps,
    Endpoint,
    Keepalive,
    PresharedKey,
    PublicKey,
    Comments,
}

/// Line order of a `[Peer]` section. The description comment leads so the
/// block can be identified at a glance.
pub const PEER_KEYS: [PeerKey; 7] = [
    PeerKey::Description,
    PeerKey::AllowedIps,
    PeerKey::Endpoint,
    PeerKey::Keepalive,
    PeerKey::PresharedKey,
    PeerKey::PublicKey,
    PeerKey::Comments,
];

/// Everything an `[Interface]` section is built from.
#[derive(Debug, Clone)]
pub struct InterfaceFields<'a> {
    /// Already in `ip/prefix` form.
    pub address: Vec<String>,
    pub dns: Vec<IpAddr>,
    pub port: u16,
    pub private_key: Option<&'a PrivateKey>,
    pub pre_up: &'a [String],
    pub post_up: &'a [String],
    pub pre_down: &'a [String],
    pub post_down: &'a [String],
    pub save_config: Option<bool>,
    pub mtu: Option<u16>,
    pub table: Option<Table>,
    pub comments: &'a [String],
    /// Peers go to a separate file pulled in with `wg addconf`.
    pub split_peers: bool,
}

/// What the renderer needs from a node.
///
/// `public_key` and `allowed_ips` are enough for a `[Peer]` block; a node
/// that can also be rendered locally returns its [`InterfaceFields`].
pub trait Renderable {
    fn public_key(&self) -> Option<PublicKey>;

    fn allowed_ips(&self) -> Vec<IpNetwork>;

    fn description(&self) -> Option<&str> {
        None
    }

    fn endpoint(&self) -> Option<String> {
        None
    }

    fn keepalive(&self) -> Option<u16> {
        None
    }

    fn preshared_key(&self) -> Option<&str> {
        None
    }

    fn comments(&self) -> &[String] {
        &[]
    }

    fn interface_name(&self) -> &str {
        INTERFACE
    }

    fn interface_fields(&self) -> Option<InterfaceFields<'_>> {
        None
    }
}

impl Renderable for Peer {
    fn public_key(&self) -> Option<PublicKey> {
        Some(Peer::public_key(self))
    }

    fn allowed_ips(&self) -> Vec<IpNetwork> {
        self.allowed_ips.sorted()
    }

    fn description(&self) -> Option<&str> {
        Some(self.description.as_str()).filter(|d| !d.is_empty())
    }

    fn endpoint(&self) -> Option<String> {
        Peer::endpoint(self)
    }

    fn keepalive(&self) -> Option<u16> {
        Peer::keepalive(self)
    }

    fn preshared_key(&self) -> Option<&str> {
        self.preshared_key.as_deref()
    }

    fn comments(&self) -> &[String] {
        &self.comments
    }

    fn interface_name(&self) -> &str {
        self.interface()
    }

    fn interface_fields(&self) -> Option<InterfaceFields<'_>> {
        let address = self
            .address()
            .iter()
            .map(|ip| format!("{ip}/{}", max_prefix(ip)))
            .collect();
        Some(peer_fields(self, address, false))
    }
}

impl Renderable for Server {
    fn public_key(&self) -> Option<PublicKey> {
        Renderable::public_key(self.peer())
    }

    fn allowed_ips(&self) -> Vec<IpNetwork> {
        Renderable::allowed_ips(self.peer())
    }

    fn description(&self) -> Option<&str> {
        Renderable::description(self.peer())
    }

    fn endpoint(&self) -> Option<String> {
        Renderable::endpoint(self.peer())
    }

    fn keepalive(&self) -> Option<u16> {
        Renderable::keepalive(self.peer())
    }

    fn preshared_key(&self) -> Option<&str> {
        Renderable::preshared_key(self.peer())
    }

    fn comments(&self) -> &[String] {
        Renderable::comments(self.peer())
    }

    fn interface_name(&self) -> &str {
        Renderable::interface_name(self.peer())
    }

    /// The server advertises its whole subnet, not a host route.
    fn interface_fields(&self) -> Option<InterfaceFields<'_>> {
        let mut address = Vec::with_capacity(2);
        if let Some(ip) = self.ipv4() {
            let prefix = self.ipv4_subnet().map_or(32, |net| net.prefix());
            address.push(format!("{ip}/{prefix}"));
        }
        if let Some(ip) = self.ipv6() {
            let prefix = self.ipv6_subnet().map_or(128, |net| net.prefix());
            address.push(format!("{ip}/{prefix}"));
        }
        Some(peer_fields(self.peer(), address, true))
    }
}

fn peer_fields(peer: &Peer, address: Vec<String>, split_peers: bool) -> InterfaceFields<'_> {
    InterfaceFields {
        address,
        dns: peer.dns.sorted(),
        port: peer.port(),
        private_key: peer.private_key().ok(),
        pre_up: &peer.pre_up,
        post_up: &peer.post_up,
        pre_down: &peer.pre_down,
        post_down: &peer.post_down,
        save_config: peer.save_config,
        mtu: peer.mtu(),
        table: peer.table,
        comments: &peer.comments,
        split_peers,
    }
}

impl Renderable for Node {
    fn public_key(&self) -> Option<PublicKey> {
        match self {
            Node::Peer(peer) => Renderable::public_key(peer),
            Node::Server(server) => Renderable::public_key(server),
        }
    }

    fn allowed_ips(&self) -> Vec<IpNetwork> {
        Renderable::allowed_ips(self.as_peer())
    }

    fn description(&self) -> Option<&str> {
        Renderable::description(self.as_peer())
    }

    fn endpoint(&self) -> Option<String> {
        Renderable::endpoint(self.as_peer())
    }

    fn keepalive(&self) -> Option<u16> {
        Renderable::keepalive(self.as_peer())
    }

    fn preshared_key(&self) -> Option<&str> {
        Renderable::preshared_key(self.as_peer())
    }

    fn comments(&self) -> &[String] {
        Renderable::comments(self.as_peer())
    }

    fn interface_name(&self) -> &str {
        Renderable::interface_name(self.as_peer())
    }

    fn interface_fields(&self) -> Option<InterfaceFields<'_>> {
        match self {
            Node::Peer(peer) => peer.interface_fields(),
            Node::Server(server) => server.interface_fields(),
        }
    }
}

/// The config of one node as seen from that node, with a `[Peer]` block for
/// every node it links to.
pub struct Config<'a> {
    subject: &'a dyn Renderable,
    remotes: Vec<&'a dyn Renderable>,
}

impl<'a> Config<'a> {
    pub fn new(subject: &'a dyn Renderable) -> Result<Self, ConfigError> {
        subject.public_key().ok_or(MissingDataError::PublicKey)?;
        Ok(Self {
            subject,
            remotes: Vec::new(),
        })
    }

    pub fn with_peers(mut self, remotes: Vec<&'a dyn Renderable>) -> Self {
        self.remotes = remotes;
        self
    }

    /// The `[Interface]` section, newline-terminated.
    pub fn interface(&self) -> Result<String, ConfigError> {
        let mut out = String::from("[Interface]\n");
        let Some(fields) = self.subject.interface_fields() else {
            return Ok(out);
        };
        let private_key = fields.private_key.ok_or(MissingDataError::PrivateKey)?;

        for key in INTERFACE_KEYS {
            match key {
                InterfaceKey::Address => push_joined(&mut out, "Address", &fields.address),
                InterfaceKey::Dns => push_joined(&mut out, "DNS", &fields.dns),
                InterfaceKey::Port => push_line(&mut out, "ListenPort", fields.port),
                InterfaceKey::PrivateKey => push_line(&mut out, "PrivateKey", private_key),
                InterfaceKey::PreUp => push_each(&mut out, "PreUp", fields.pre_up),
                InterfaceKey::PostUp => push_each(&mut out, "PostUp", fields.post_up),
                InterfaceKey::PreDown => push_each(&mut out, "PreDown", fields.pre_down),
                InterfaceKey::PostDown => push_each(&mut out, "PostDown", fields.post_down),
                InterfaceKey::SaveConfig => {
                    if let Some(save) = fields.save_config {
                        push_line(&mut out, "SaveConfig", save);
                    }
                }
                InterfaceKey::Mtu => {
                    if let Some(mtu) = fields.mtu {
                        push_line(&mut out, "MTU", mtu);
                    }
                }
                InterfaceKey::Table => {
                    if let Some(table) = fields.table {
                        push_line(&mut out, "Table", table);
                    }
                }
                InterfaceKey::Comments => push_comments(&mut out, fields.comments),
            }
        }
        Ok(out)
    }

    /// The subject as a `[Peer]` block for someone else's config. Keepalive
    /// is left out since it belongs to the other side.
    pub fn remote_config(&self) -> Result<String, ConfigError> {
        render_peer(self.subject, None, preshared_key(self.subject))
    }

    /// One `[Peer]` block per linked node, separated by blank lines.
    pub fn peers(&self) -> Result<String, ConfigError> {
        let keepalive = self.subject.keepalive();
        let blocks = self
            .remotes
            .iter()
            .map(|remote| {
                let psk = self.reconcile_psk(*remote)?;
                render_peer(*remote, keepalive, psk)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(blocks.join("\n"))
    }

    pub fn local_config(&self) -> Result<String, ConfigError> {
        let mut out = self.interface()?;
        let peers = self.peers()?;
        if !peers.is_empty() {
            out.push('\n');
            out.push_str(&peers);
        }
        Ok(out)
    }

    /// A key set on only one side applies to both; two different keys are an error.
    fn reconcile_psk(&self, remote: &'a dyn Renderable) -> Result<Option<&'a str>, ConfigError> {
        match (preshared_key(self.subject), preshared_key(remote)) {
            (Some(local), Some(theirs)) if local != theirs => {
                Err(ConfigError::PresharedKeyMismatch {
                    local: label(self.subject),
                    remote: label(remote),
                })
            }
            (Some(local), _) => Ok(Some(local)),
            (None, theirs) => Ok(theirs),
        }
    }

    pub fn filename(&self) -> String {
        format!("{}.conf", self.subject.interface_name())
    }

    pub fn peers_filename(&self) -> String {
        format!("{}-peers.conf", self.subject.interface_name())
    }

    pub fn full_path(&self, dir: Option<&Path>) -> PathBuf {
        dir.unwrap_or(Path::new(CONFIG_PATH)).join(self.filename())
    }

    pub fn peers_full_path(&self, dir: Option<&Path>) -> PathBuf {
        dir.unwrap_or(Path::new(CONFIG_PATH))
            .join(self.peers_filename())
    }

    fn is_split(&self) -> bool {
        self.subject
            .interface_fields()
            .is_some_and(|fields| fields.split_peers)
    }

    /// Writes `<interface>.conf`, plus `<interface>-peers.conf` for a server.
    ///
    /// Everything is rendered before the first file is touched, but the two
    /// writes are not atomic as a pair.
    pub fn write(&self, dir: Option<&Path>) -> Result<Vec<PathBuf>, ConfigError> {
        let path = self.full_path(dir);

        if !self.is_split() {
            write_file(&path, &self.local_config()?)?;
            return Ok(vec![path]);
        }

        let peers_path = self.peers_full_path(dir);
        let mut main = self.interface()?;
        push_line(
            &mut main,
            "PostUp",
            format_args!("wg addconf %i {}", peers_path.display()),
        );
        let peers = self.peers()?;

        write_file(&path, &main)?;
        write_file(&peers_path, &peers)?;
        Ok(vec![path, peers_path])
    }

    /// `local_config` as a QR code drawn with text characters.
    #[cfg(feature = "qrcode")]
    pub fn qrcode(&self) -> Result<String, ConfigError> {
        let config = self.local_config()?;
        let code = qrcode::QrCode::new(config.as_bytes())
            .map_err(|err| ConfigError::QrCode(err.to_string()))?;
        Ok(code
            .render::<char>()
            .quiet_zone(false)
            .module_dimensions(2, 1)
            .build())
    }

    #[cfg(not(feature = "qrcode"))]
    pub fn qrcode(&self) -> Result<String, ConfigError> {
        Err(ConfigError::QrCodeDisabled)
    }
}

// ---- rendering helpers ----

fn preshared_key(node: &dyn Renderable) -> Option<&str> {
    node.preshared_key().filter(|k| !k.is_empty())
}

fn label(node: &dyn Renderable) -> String {
    match (node.description(), node.public_key()) {
        (Some(description), _) => description.to_string(),
        (None, Some(key)) => key.to_string(),
        (None, None) => "<unknown>".to_string(),
    }
}

fn render_peer(
    node: &dyn Renderable,
    keepalive: Option<u16>,
    psk: Option<&str>,
) -> Result<String, ConfigError> {
    let public_key = node.public_key().ok_or(MissingDataError::PublicKey)?;
    let mut out = String::from("[Peer]\n");

    for key in PEER_KEYS {
        match key {
            PeerKey::Description => {
                if let Some(description) = node.description() {
                    let _ = writeln!(out, "# {description}");
                }
            }
            PeerKey::AllowedIps => push_joined(&mut out, "AllowedIPs", &node.allowed_ips()),
            PeerKey::Endpoint => {
                if let Some(endpoint) = node.endpoint() {
                    push_line(&mut out, "Endpoint", endpoint);
                }
            }
            PeerKey::Keepalive => {
                if let Some(keepalive) = keepalive {
                    push_line(&mut out, "PersistentKeepalive", keepalive);
                }
            }
            PeerKey::PresharedKey => {
                if let Some(psk) = psk {
                    push_line(&mut out, "PresharedKey", psk);
                }
            }
            PeerKey::PublicKey => push_line(&mut out, "PublicKey", public_key),
            PeerKey::Comments => push_comments(&mut out, node.comments()),
        }
    }
    Ok(out)
}

fn push_line(out: &mut String, key: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "{key} = {value}");
}

fn push_joined<T: ToString>(out: &mut String, key: &str, values: &[T]) {
    if values.is_empty() {
        return;
    }
    let joined = values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    push_line(out, key, joined);
}

fn push_each(out: &mut String, key: &str, values: &[String]) {
    for value in values.iter().filter(|v| !v.is_empty()) {
        push_line(out, key, value);
    }
}

fn push_comments(out: &mut String, comments: &[String]) {
    for comment in comments {
        let _ = writeln!(out, "# {comment}");
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), ConfigError> {
    std::fs::write(path, contents).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), bytes = contents.len(), "wrote config");
    Ok(())
}
