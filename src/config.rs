//! Environment-based Configuration for the Wagering Engine
//!
//! All sensitive values (keys, passphrases) MUST come from environment
//! variables, never from hardcoded values.
//!
//! # Environment Variables
//!
//! ## Network
//! - `TRACKSIDE_NETWORK` - "mainnet", "testnet", or "devnet" (default: "devnet")
//! - `TRACKSIDE_RPC_URL` - Solana RPC endpoint URL
//!
//! ## Wagering Rules
//! - `TRACKSIDE_MIN_BET_SOL` - Minimum accepted wager (default: 0.01)
//! - `TRACKSIDE_MAX_BET_SOL` - Maximum accepted wager (default: 20)
//! - `TRACKSIDE_HOUSE_EDGE_PCT` - Share of the losing pool retained (default: 5)
//! - `TRACKSIDE_DEPOSIT_EXPIRY_MINS` - Deposit address lifetime (default: 30)
//! - `TRACKSIDE_POLL_INTERVAL_SECS` - Reconciler poll interval (default: 5)
//!
//! ## Keys & Funds
//! - `TRACKSIDE_KEYSTORE_PASSPHRASE` - Passphrase for deposit secret encryption.
//!   Minimum 12 characters. If unset, secrets are stored UNENCRYPTED and a loud
//!   warning is emitted at startup.
//! - `TRACKSIDE_TREASURY_KEY` - Hex-encoded 64-byte treasury keypair
//! - `TRACKSIDE_FEE_RESERVE_LAMPORTS` - Lamports reserved per outbound transfer (default: 5000)
//! - `TRACKSIDE_COLLECT_SPLIT_PCT` - Optional percentage of swept funds routed
//!   to a secondary wallet
//! - `TRACKSIDE_SPLIT_WALLET` - Secondary operating wallet address
//!
//! ## Process
//! - `TRACKSIDE_DB_PATH` - SQLite database path (default: data/trackside.db)
//! - `TRACKSIDE_API_PORT` - REST API port (default: 3001)
//! - `TRACKSIDE_LOG_LEVEL` - Logging level (default: info)
//! - `TRACKSIDE_LOG_JSON` - Set to "1" for JSON log output

use std::env;
use std::str::FromStr;
use thiserror::Error;

use crate::units::sol_to_lamports;

/// Minimum accepted keystore passphrase length
pub const MIN_PASSPHRASE_LEN: usize = 12;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("keystore passphrase too short: {0} < {MIN_PASSPHRASE_LEN} characters")]
    PassphraseTooShort(usize),
}

/// Network environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Devnet,
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "devnet" | "dev" => Ok(Network::Devnet),
            _ => Err(ConfigError::InvalidValue(
                "TRACKSIDE_NETWORK".to_string(),
                format!("unknown network: {}", s),
            )),
        }
    }
}

impl Network {
    /// Get default Solana RPC for this network
    pub fn default_rpc(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://api.mainnet-beta.solana.com",
            Network::Testnet => "https://api.testnet.solana.com",
            Network::Devnet => "https://api.devnet.solana.com",
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Network environment
    pub network: Network,

    /// Solana RPC endpoint
    pub rpc_url: String,

    /// Minimum accepted wager in lamports
    pub min_bet_lamports: u64,

    /// Maximum accepted wager in lamports
    pub max_bet_lamports: u64,

    /// Fraction of the losing pool retained by the house (0.0..1.0)
    pub house_edge: f64,

    /// Deposit address lifetime in minutes
    pub deposit_expiry_mins: i64,

    /// Reconciler poll interval in seconds
    pub poll_interval_secs: u64,

    /// Keystore passphrase; `None` means unencrypted storage (loud warning)
    pub keystore_passphrase: Option<String>,

    /// Hex-encoded 64-byte treasury keypair
    pub treasury_key_hex: String,

    /// Lamports reserved per outbound transfer to cover the network fee
    pub fee_reserve_lamports: u64,

    /// Optional sweep split: (secondary wallet address, fraction 0.0..1.0)
    pub collect_split: Option<(String, f64)>,

    /// SQLite database path
    pub db_path: String,

    /// REST API port
    pub api_port: u16,

    /// Log level
    pub log_level: String,

    /// JSON log output
    pub log_json: bool,
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let network: Network = env::var("TRACKSIDE_NETWORK")
            .unwrap_or_else(|_| "devnet".to_string())
            .parse()?;

        let rpc_url = env::var("TRACKSIDE_RPC_URL")
            .unwrap_or_else(|_| network.default_rpc().to_string());

        let min_bet_sol = parse_f64("TRACKSIDE_MIN_BET_SOL", 0.01)?;
        let max_bet_sol = parse_f64("TRACKSIDE_MAX_BET_SOL", 20.0)?;
        if min_bet_sol <= 0.0 || max_bet_sol <= min_bet_sol {
            return Err(ConfigError::InvalidValue(
                "TRACKSIDE_MAX_BET_SOL".to_string(),
                format!("invalid wager range: {} .. {}", min_bet_sol, max_bet_sol),
            ));
        }

        let house_edge_pct = parse_f64("TRACKSIDE_HOUSE_EDGE_PCT", 5.0)?;
        if !(0.0..100.0).contains(&house_edge_pct) {
            return Err(ConfigError::InvalidValue(
                "TRACKSIDE_HOUSE_EDGE_PCT".to_string(),
                format!("must be in [0, 100): {}", house_edge_pct),
            ));
        }

        let deposit_expiry_mins = parse_i64("TRACKSIDE_DEPOSIT_EXPIRY_MINS", 30)?;
        if deposit_expiry_mins <= 0 {
            return Err(ConfigError::InvalidValue(
                "TRACKSIDE_DEPOSIT_EXPIRY_MINS".to_string(),
                "must be positive".to_string(),
            ));
        }

        let poll_interval_secs = parse_i64("TRACKSIDE_POLL_INTERVAL_SECS", 5)? as u64;

        // Passphrase is optional, but when present it must meet the minimum
        // length; weak-but-present is worse than loudly absent.
        let keystore_passphrase = match env::var("TRACKSIDE_KEYSTORE_PASSPHRASE") {
            Ok(p) if p.len() < MIN_PASSPHRASE_LEN => {
                return Err(ConfigError::PassphraseTooShort(p.len()))
            }
            Ok(p) => Some(p),
            Err(_) => None,
        };

        let treasury_key_hex = env::var("TRACKSIDE_TREASURY_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("TRACKSIDE_TREASURY_KEY".to_string()))?;
        let decoded = hex::decode(&treasury_key_hex).map_err(|e| {
            ConfigError::InvalidValue("TRACKSIDE_TREASURY_KEY".to_string(), e.to_string())
        })?;
        if decoded.len() != 64 {
            return Err(ConfigError::InvalidValue(
                "TRACKSIDE_TREASURY_KEY".to_string(),
                format!("expected 64 bytes, got {}", decoded.len()),
            ));
        }

        let fee_reserve_lamports = parse_i64("TRACKSIDE_FEE_RESERVE_LAMPORTS", 5000)? as u64;

        let collect_split = match env::var("TRACKSIDE_COLLECT_SPLIT_PCT") {
            Ok(raw) => {
                let pct: f64 = raw.parse().map_err(|_| {
                    ConfigError::InvalidValue(
                        "TRACKSIDE_COLLECT_SPLIT_PCT".to_string(),
                        format!("not a number: {}", raw),
                    )
                })?;
                if !(0.0..=100.0).contains(&pct) {
                    return Err(ConfigError::InvalidValue(
                        "TRACKSIDE_COLLECT_SPLIT_PCT".to_string(),
                        format!("must be in [0, 100]: {}", pct),
                    ));
                }
                let wallet = env::var("TRACKSIDE_SPLIT_WALLET")
                    .map_err(|_| ConfigError::MissingEnvVar("TRACKSIDE_SPLIT_WALLET".to_string()))?;
                Some((wallet, pct / 100.0))
            }
            Err(_) => None,
        };

        let db_path =
            env::var("TRACKSIDE_DB_PATH").unwrap_or_else(|_| "data/trackside.db".to_string());

        let api_port = parse_i64("TRACKSIDE_API_PORT", 3001)? as u16;

        let log_level = env::var("TRACKSIDE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_json = env::var("TRACKSIDE_LOG_JSON").map(|v| v == "1").unwrap_or(false);

        Ok(Self {
            network,
            rpc_url,
            min_bet_lamports: sol_to_lamports(min_bet_sol),
            max_bet_lamports: sol_to_lamports(max_bet_sol),
            house_edge: house_edge_pct / 100.0,
            deposit_expiry_mins,
            poll_interval_secs,
            keystore_passphrase,
            treasury_key_hex,
            fee_reserve_lamports,
            collect_split,
            db_path,
            api_port,
            log_level,
            log_json,
        })
    }

    /// Whether deposit secrets will be encrypted at rest
    pub fn encryption_enabled(&self) -> bool {
        self.keystore_passphrase.is_some()
    }

    /// Log a configuration summary, hiding sensitive values
    pub fn log_summary(&self) {
        tracing::info!(
            network = ?self.network,
            rpc_url = %self.rpc_url,
            min_bet_lamports = self.min_bet_lamports,
            max_bet_lamports = self.max_bet_lamports,
            house_edge = self.house_edge,
            deposit_expiry_mins = self.deposit_expiry_mins,
            poll_interval_secs = self.poll_interval_secs,
            encryption = self.encryption_enabled(),
            "engine configuration loaded"
        );

        if !self.encryption_enabled() {
            tracing::warn!(
                "TRACKSIDE_KEYSTORE_PASSPHRASE is not set - deposit secrets will be \
                 stored UNENCRYPTED; do not run this way with real funds"
            );
        }
    }
}

fn parse_f64(var: &str, default: f64) -> Result<f64, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(var.to_string(), format!("not a number: {}", raw))),
        Err(_) => Ok(default),
    }
}

fn parse_i64(var: &str, default: i64) -> Result<i64, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(var.to_string(), format!("not a number: {}", raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_parsing() {
        assert!(matches!("mainnet".parse::<Network>(), Ok(Network::Mainnet)));
        assert!(matches!("testnet".parse::<Network>(), Ok(Network::Testnet)));
        assert!(matches!("devnet".parse::<Network>(), Ok(Network::Devnet)));
        assert!("invalid".parse::<Network>().is_err());
    }

    #[test]
    fn test_default_rpc_per_network() {
        assert!(Network::Devnet.default_rpc().contains("devnet"));
        assert!(Network::Mainnet.default_rpc().contains("mainnet"));
    }
}
