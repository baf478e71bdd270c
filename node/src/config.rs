// Copyright (c) 2024 Botho Foundation

//! Node configuration: a TOML file layered under command line flags.

use anyhow::{Context, Result};
use libp2p::Multiaddr;
use picolo_rendezvous::{DatabaseInfo, RendezvousConfig};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// What the node does once it has joined the DHT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Serve the database handshake and advertise the rendezvous topic
    #[default]
    Announce,
    /// Find an announced database host and shake hands with it
    Connect,
}

/// Complete node configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Name of the database we announce
    pub database_name: String,

    /// Number of nodes backing the database
    pub node_count: u32,

    /// Announce or connect
    pub mode: Mode,

    /// Keep the stream open as a line chat after the handshake
    pub interactive: bool,

    /// libp2p and bootstrap settings
    pub rendezvous: RendezvousConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            database_name: "mydb".to_string(),
            node_count: 1,
            mode: Mode::default(),
            interactive: false,
            rendezvous: RendezvousConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load config from a TOML file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Port we listen on.
    pub fn listen_port(&self) -> u16 {
        self.rendezvous.listen_port
    }

    /// The database this node announces.
    pub fn database_info(&self) -> DatabaseInfo {
        DatabaseInfo::new(self.database_name.clone(), self.node_count)
    }

    /// Apply command line overrides on top of this config.
    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(port) = overrides.port {
            self.rendezvous.listen_port = port;
        }
        if let Some(mode) = overrides.mode {
            self.mode = mode;
        }
        if let Some(name) = overrides.database_name {
            self.database_name = name;
        }
        if let Some(count) = overrides.node_count {
            self.node_count = count;
        }
        if !overrides.bootstrap_peers.is_empty() {
            self.rendezvous.bootstrap_peers = overrides.bootstrap_peers;
        }
        if let Some(min) = overrides.min_bootstrap_successes {
            self.rendezvous.min_bootstrap_successes = min;
        }
        self.interactive |= overrides.interactive;
        self
    }
}

/// Values given on the command line. Unset fields leave the config alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub mode: Option<Mode>,
    pub database_name: Option<String>,
    pub node_count: Option<u32>,
    /// Replaces the configured bootstrap list when non-empty
    pub bootstrap_peers: Vec<Multiaddr>,
    pub min_bootstrap_successes: Option<usize>,
    pub interactive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use picolo_rendezvous::DEFAULT_BOOTSTRAP_PEERS;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_match_cli_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.database_name, "mydb");
        assert_eq!(config.node_count, 1);
        assert_eq!(config.mode, Mode::Announce);
        assert_eq!(config.listen_port(), 3001);
        assert!(!config.interactive);
        assert_eq!(
            config.rendezvous.bootstrap_peers.len(),
            DEFAULT_BOOTSTRAP_PEERS.len()
        );
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("picolo.toml");
        fs::write(
            &path,
            r#"
database_name = "inventory"
mode = "connect"

[rendezvous]
listen_port = 4100
bootstrap_peers = ["/ip4/10.0.0.5/tcp/4001"]
"#,
        )
        .unwrap();

        let config = NodeConfig::load(&path).unwrap();
        assert_eq!(config.database_name, "inventory");
        assert_eq!(config.node_count, 1);
        assert_eq!(config.mode, Mode::Connect);
        assert_eq!(config.listen_port(), 4100);
        assert_eq!(config.rendezvous.bootstrap_peers.len(), 1);
        assert_eq!(config.rendezvous.min_bootstrap_successes, 0);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = NodeConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }

    #[test]
    fn test_load_rejects_unknown_mode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("picolo.toml");
        fs::write(&path, "mode = \"broadcast\"\n").unwrap();

        let err = NodeConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_overrides_win() {
        let bootstrap: Multiaddr = "/ip4/10.0.0.9/tcp/4001".parse().unwrap();
        let config = NodeConfig {
            database_name: "from-file".to_string(),
            node_count: 7,
            ..Default::default()
        }
        .apply(Overrides {
            port: Some(5000),
            mode: Some(Mode::Connect),
            node_count: Some(3),
            bootstrap_peers: vec![bootstrap.clone()],
            min_bootstrap_successes: Some(1),
            interactive: true,
            ..Default::default()
        });

        assert_eq!(config.database_name, "from-file");
        assert_eq!(config.node_count, 3);
        assert_eq!(config.mode, Mode::Connect);
        assert_eq!(config.listen_port(), 5000);
        assert_eq!(config.rendezvous.bootstrap_peers, vec![bootstrap]);
        assert_eq!(config.rendezvous.min_bootstrap_successes, 1);
        assert!(config.interactive);
    }

    #[test]
    fn test_empty_overrides_keep_file_values() {
        let config = NodeConfig {
            database_name: "from-file".to_string(),
            interactive: true,
            ..Default::default()
        };

        assert_eq!(config.clone().apply(Overrides::default()), config);
    }

    #[test]
    fn test_database_info() {
        let config = NodeConfig {
            database_name: "orders".to_string(),
            node_count: 3,
            ..Default::default()
        };
        assert_eq!(config.database_info(), DatabaseInfo::new("orders", 3));
    }
}
