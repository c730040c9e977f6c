//! Process-environment argument parsing, kept separate from the core so
//! the server itself never touches `std::env` directly.

use clap::Parser;
use thiserror::Error;

const DEFAULT_PORT: u16 = 6379;

#[derive(Parser, Debug)]
#[command(version, about = "A RESP key-value server with PSYNC-style replication", long_about = None)]
struct Cli {
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// "<host> <port>" of the upstream master, e.g. --replicaof "localhost 6379"
    #[arg(long)]
    replicaof: Option<String>,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid --replicaof value {0:?}: expected \"<host> <port>\"")]
    InvalidReplicaOf(String),
    #[error("invalid --replicaof port {0:?}: {1}")]
    InvalidReplicaOfPort(String, std::num::ParseIntError),
    #[error("failed to bind to 127.0.0.1:{0}: {1}")]
    BindFailed(u16, std::io::Error),
}

/// The upstream master a replica reports to and replicates from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterAddr {
    pub host: String,
    pub port: u16,
}

/// Config resolved from CLI arguments, consumed by the rest of the crate.
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub listen_port: u16,
    pub replicaof: Option<MasterAddr>,
}

impl StartupConfig {
    pub fn from_args() -> Result<Self, StartupError> {
        Self::from_cli(Cli::parse())
    }

    fn from_cli(cli: Cli) -> Result<Self, StartupError> {
        let replicaof = match cli.replicaof {
            Some(raw) => Some(parse_replicaof(&raw)?),
            None => None,
        };
        Ok(StartupConfig {
            listen_port: cli.port,
            replicaof,
        })
    }

    pub fn is_master(&self) -> bool {
        self.replicaof.is_none()
    }
}

fn parse_replicaof(raw: &str) -> Result<MasterAddr, StartupError> {
    let mut parts = raw.split_whitespace();
    let host = parts.next();
    let port = parts.next();
    let trailing = parts.next();
    match (host, port, trailing) {
        (Some(host), Some(port), None) => {
            let port: u16 = port
                .parse()
                .map_err(|e| StartupError::InvalidReplicaOfPort(port.to_string(), e))?;
            Ok(MasterAddr {
                host: host.to_string(),
                port,
            })
        }
        _ => Err(StartupError::InvalidReplicaOf(raw.to_string())),
    }
}
