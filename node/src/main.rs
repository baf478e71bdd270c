// Copyright (c) 2024 Botho Foundation

//! `picolo`: announce a database on the libp2p DHT, or find one and connect.

mod config;
mod console;
mod run;
mod shutdown;

use anyhow::Result;
use clap::Parser;
use libp2p::Multiaddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use config::{Mode, NodeConfig, Overrides};

#[derive(Parser)]
#[command(name = "picolo")]
#[command(about = "Announce or discover a database over a libp2p DHT", long_about = None)]
struct Cli {
    /// Port to listen on [default: 3001]
    #[arg(short, long)]
    port: Option<u16>,

    /// Announce a database, or connect to an announced one [default: announce]
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// Database name to announce [default: mydb]
    #[arg(short, long)]
    database: Option<String>,

    /// Number of nodes backing the database [default: 1]
    #[arg(short = 'n', long)]
    nodes: Option<u32>,

    /// Path to a TOML config file
    #[arg(short, long, env = "PICOLO_CONFIG")]
    config: Option<PathBuf>,

    /// Bootstrap peer multiaddr (repeatable, replaces the defaults)
    #[arg(short, long = "bootstrap")]
    bootstrap: Vec<Multiaddr>,

    /// Fail unless at least this many bootstrap dials succeed
    #[arg(long)]
    min_bootstrap: Option<usize>,

    /// Keep the stream open as a line chat after the handshake
    #[arg(short, long)]
    interactive: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn node_config(self) -> Result<NodeConfig> {
        let base = match &self.config {
            Some(path) => NodeConfig::load(path)?,
            None => NodeConfig::default(),
        };

        Ok(base.apply(Overrides {
            port: self.port,
            mode: self.mode,
            database_name: self.database,
            node_count: self.nodes,
            bootstrap_peers: self.bootstrap,
            min_bootstrap_successes: self.min_bootstrap,
            interactive: self.interactive,
        }))
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.node_config()?;
    run::run(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_short_flags() {
        let cli = Cli::try_parse_from([
            "picolo", "-p", "4000", "-m", "connect", "-d", "orders", "-n", "3",
        ])
        .unwrap();
        let config = cli.node_config().unwrap();

        assert_eq!(config.listen_port(), 4000);
        assert_eq!(config.mode, Mode::Connect);
        assert_eq!(config.database_name, "orders");
        assert_eq!(config.node_count, 3);
    }

    #[test]
    fn test_no_flags_gives_defaults() {
        let cli = Cli::try_parse_from(["picolo"]).unwrap();
        assert_eq!(cli.node_config().unwrap(), NodeConfig::default());
    }

    #[test]
    fn test_negative_node_count_rejected() {
        assert!(Cli::try_parse_from(["picolo", "--nodes=-1"]).is_err());
        assert!(Cli::try_parse_from(["picolo", "-n", "-3"]).is_err());
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(Cli::try_parse_from(["picolo", "-m", "broadcast"]).is_err());
    }

    #[test]
    fn test_bootstrap_flag_replaces_defaults() {
        let cli = Cli::try_parse_from([
            "picolo",
            "-b",
            "/ip4/10.0.0.1/tcp/4001",
            "--bootstrap",
            "/ip4/10.0.0.2/tcp/4001",
        ])
        .unwrap();
        let config = cli.node_config().unwrap();
        assert_eq!(config.rendezvous.bootstrap_peers.len(), 2);
    }
}
