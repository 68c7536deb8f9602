//! # Configuration Constants
//!
//! Protocol tags, file names, environment variables and the runtime
//! [`Settings`] resolved by the command line tool.

use crate::error::{DlcError, DlcResult};
use bitcoin::Network;
use std::path::PathBuf;
use std::str::FromStr;

/// Domain separation tags for the hashes used by the protocol
pub mod tags {
    /// Tag for outcome digests.
    ///
    /// Outcome digests are `SHA256(SHA256(tag) || SHA256(tag) || label)`, the
    /// BIP-340 tagged hash construction applied to the canonical label.
    pub const OUTCOME: &str = "DLC/oracle/attestation/v0";

    /// BIP-340 challenge tag
    pub const CHALLENGE: &str = "BIP0340/challenge";
}

/// Key derivation layout inside the keystore
pub mod derivation {
    /// Hardened account index for oracle long-term keys (`m/0'/i'`)
    pub const ORACLE_ACCOUNT: u32 = 0;

    /// Hardened account index for event nonces (`m/1'/j'`)
    pub const NONCE_ACCOUNT: u32 = 1;
}

/// File paths and names
pub mod files {
    /// Default data directory under the home directory
    pub const DEFAULT_DATA_DIR: &str = ".dlc";

    /// Oracle and event records
    pub const REPOSITORY: &str = "repository.json";

    /// Master key and derivation counters
    pub const KEYSTORE: &str = "keystore.json";

    /// Advisory lock taken while mutating the repository
    pub const LOCK: &str = "repository.lock";
}

/// Environment variable names
pub mod env {
    /// Data directory override
    pub const DATA_DIR: &str = "DLC_DATADIR";

    /// Network override
    pub const NETWORK: &str = "DLC_NETWORK";
}

/// Defaults
pub mod defaults {
    use bitcoin::Network;

    /// Network used when nothing else is configured
    pub const NETWORK: Network = Network::Bitcoin;
}

/// Runtime settings for the command line tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Directory holding repository and keystore files
    pub data_dir: PathBuf,

    /// Network the keystore derives keys for
    pub network: Network,
}

impl Settings {
    /// Resolve settings from explicit flags, then the environment (`.env`
    /// files included), then defaults.
    pub fn resolve(data_dir: Option<PathBuf>, network: Option<&str>) -> DlcResult<Self> {
        dotenv::dotenv().ok();

        let network = match network.map(str::to_string).or_else(|| std::env::var(env::NETWORK).ok()) {
            Some(name) => parse_network(&name)?,
            None => defaults::NETWORK,
        };

        let data_dir = match data_dir.or_else(|| std::env::var(env::DATA_DIR).ok().map(PathBuf::from)) {
            Some(dir) => dir,
            None => crate::utils::fs::default_data_dir()?.join(network_dir_name(network)),
        };

        Ok(Self { data_dir, network })
    }
}

/// Parse the network names accepted by the tool
pub fn parse_network(name: &str) -> DlcResult<Network> {
    match name.to_lowercase().as_str() {
        "mainnet" => Ok(Network::Bitcoin),
        other => Network::from_str(other)
            .map_err(|_| DlcError::config(format!("Unknown network: {}", name))),
    }
}

fn network_dir_name(network: Network) -> &'static str {
    match network {
        Network::Bitcoin => "mainnet",
        Network::Testnet => "testnet",
        Network::Signet => "signet",
        Network::Regtest => "regtest",
        _ => "other",
    }
}
