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

//! Optional defaults for the command line, read from a TOML file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_PATH: &str = "/etc/wgconf/wgconf.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Where configs are written; `/etc/wireguard` when unset.
    pub config_dir: Option<PathBuf>,
    pub interface: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Settings {
    /// A flag given on the command line wins over the file.
    pub fn interface(&self, flag: Option<String>) -> Option<String> {
        flag.or_else(|| self.interface.clone())
    }

    pub fn port(&self, flag: Option<u16>) -> Option<u16> {
        flag.or(self.port)
    }

    pub fn config_dir(&self) -> Option<&Path> {
        self.config_dir.as_deref()
    }
}

pub fn load(path: &Path) -> Result<Settings, SettingsError> {
    debug!(path = %path.display(), "loading settings");

    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let settings: Settings = toml::from_str(&contents)?;
            debug!(?settings, "loaded settings");
            Ok(settings)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "settings file not found, using defaults");
            Ok(Settings::default())
        }
        Err(e) => Err(SettingsError::Read(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn loads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wgconf.toml");
        std::fs::write(
            &path,
            "config_dir = \"/tmp/wg\"\ninterface = \"wg3\"\nport = 51000\n",
        )
        .unwrap();

        let settings = load(&path).unwrap();
        assert_eq!(settings.config_dir(), Some(Path::new("/tmp/wg")));
        assert_eq!(settings.interface.as_deref(), Some("wg3"));
        assert_eq!(settings.port, Some(51000));
    }

    #[test_case("port = \"high\"" ; "wrong type")]
    #[test_case("colour = \"blue\"" ; "unknown key")]
    #[test_case("port = " ; "truncated")]
    fn rejects_bad_toml(contents: &str) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wgconf.toml");
        std::fs::write(&path, contents).unwrap();
        assert!(matches!(load(&path), Err(SettingsError::Parse(_))));
    }

    #[test_case(Some("wg9"), Some("wg9") ; "flag wins")]
    #[test_case(None, Some("wg3") ; "file fallback")]
    fn flags_override_file(flag: Option<&str>, expected: Option<&str>) {
        let settings = Settings {
            interface: Some("wg3".into()),
            port: Some(51000),
            ..Default::default()
        };
        assert_eq!(
            settings.interface(flag.map(String::from)).as_deref(),
            expected
        );
        assert_eq!(settings.port(Some(1)), Some(1));
        assert_eq!(settings.port(None), Some(51000));
    }

    #[test]
    fn empty_file_parses() {
        let parsed: Settings = toml::from_str("").unwrap();
        assert_eq!(parsed, Settings::default());
    }
}
