//! Ledger Gateway
//!
//! Wraps the Solana RPC surface the engine needs: balance queries,
//! per-address transaction history, transaction lookup and outbound
//! transfers. The trait seam exists so the reconciler and dispatcher can be
//! exercised against a mock ledger in tests.

use async_trait::async_trait;
use solana_client::rpc_client::{GetConfirmedSignaturesForAddress2Config, RpcClient};
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::system_instruction;
use solana_sdk::transaction::Transaction;
use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, EncodedTransaction, UiMessage,
    UiTransactionEncoding,
};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Per-call RPC timeout
const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid keypair: {0}")]
    InvalidKeypair(String),
}

/// A ledger transaction normalized to what classification needs: the account
/// list with matching pre/post balances.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTransaction {
    /// Transaction signature
    pub signature: String,
    /// Account addresses in transaction order
    pub account_keys: Vec<String>,
    /// Balances before execution, index-aligned with `account_keys`
    pub pre_balances: Vec<u64>,
    /// Balances after execution, index-aligned with `account_keys`
    pub post_balances: Vec<u64>,
    /// Whether the transaction executed without error
    pub succeeded: bool,
}

/// Ledger operations consumed by the engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Current balance of an address in lamports
    async fn get_balance(&self, address: &str) -> Result<u64, LedgerError>;

    /// Most recent transaction signatures touching an address, newest first
    async fn get_recent_signatures(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<String>, LedgerError>;

    /// Fetch a transaction; `None` when it cannot be normalized (unsupported
    /// encoding), errors are transient RPC failures
    async fn get_transaction(&self, signature: &str)
        -> Result<Option<RawTransaction>, LedgerError>;

    /// Build, sign and confirm a native transfer from the given 64-byte
    /// keypair secret; returns the transaction signature
    async fn submit_transfer(
        &self,
        from_secret: &[u8],
        to: &str,
        lamports: u64,
    ) -> Result<String, LedgerError>;
}

/// Solana RPC implementation of the ledger gateway
pub struct RpcLedgerGateway {
    rpc: RpcClient,
}

impl RpcLedgerGateway {
    /// Create a gateway with confirmed commitment and a per-call timeout
    pub fn new(rpc_url: &str) -> Self {
        let rpc = RpcClient::new_with_timeout_and_commitment(
            rpc_url.to_string(),
            RPC_TIMEOUT,
            CommitmentConfig::confirmed(),
        );
        Self { rpc }
    }

    fn parse_pubkey(address: &str) -> Result<Pubkey, LedgerError> {
        Pubkey::from_str(address).map_err(|e| LedgerError::InvalidAddress(e.to_string()))
    }
}

#[async_trait]
impl LedgerGateway for RpcLedgerGateway {
    async fn get_balance(&self, address: &str) -> Result<u64, LedgerError> {
        let pubkey = Self::parse_pubkey(address)?;
        self.rpc
            .get_balance(&pubkey)
            .map_err(|e| LedgerError::Rpc(e.to_string()))
    }

    async fn get_recent_signatures(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<String>, LedgerError> {
        let pubkey = Self::parse_pubkey(address)?;
        let config = GetConfirmedSignaturesForAddress2Config {
            before: None,
            until: None,
            limit: Some(limit),
            commitment: Some(CommitmentConfig::confirmed()),
        };

        let statuses = self
            .rpc
            .get_signatures_for_address_with_config(&pubkey, config)
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        Ok(statuses.into_iter().map(|s| s.signature).collect())
    }

    async fn get_transaction(
        &self,
        signature: &str,
    ) -> Result<Option<RawTransaction>, LedgerError> {
        let sig = Signature::from_str(signature)
            .map_err(|e| LedgerError::InvalidSignature(e.to_string()))?;

        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Json),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
        };

        let tx = self
            .rpc
            .get_transaction_with_config(&sig, config)
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        Ok(decode_transaction(signature, tx))
    }

    async fn submit_transfer(
        &self,
        from_secret: &[u8],
        to: &str,
        lamports: u64,
    ) -> Result<String, LedgerError> {
        let from =
            Keypair::try_from(from_secret).map_err(|e| LedgerError::InvalidKeypair(e.to_string()))?;
        let to_pubkey = Self::parse_pubkey(to)?;

        let instruction = system_instruction::transfer(&from.pubkey(), &to_pubkey, lamports);

        let recent_blockhash = self
            .rpc
            .get_latest_blockhash()
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        let tx = Transaction::new_signed_with_payer(
            &[instruction],
            Some(&from.pubkey()),
            &[&from],
            recent_blockhash,
        );

        let signature = self
            .rpc
            .send_and_confirm_transaction(&tx)
            .map_err(|e| LedgerError::Rpc(format!("transfer failed: {}", e)))?;

        Ok(signature.to_string())
    }
}

/// Normalize an encoded RPC transaction into the account/balance view
fn decode_transaction(
    signature: &str,
    tx: EncodedConfirmedTransactionWithStatusMeta,
) -> Option<RawTransaction> {
    let meta = tx.transaction.meta?;

    let account_keys = match tx.transaction.transaction {
        EncodedTransaction::Json(ui_tx) => match ui_tx.message {
            UiMessage::Raw(raw) => raw.account_keys,
            _ => return None,
        },
        _ => return None,
    };

    Some(RawTransaction {
        signature: signature.to_string(),
        account_keys,
        pre_balances: meta.pre_balances,
        post_balances: meta.post_balances,
        succeeded: meta.err.is_none(),
    })
}

/// Generate a fresh keypair for a deposit address
pub fn generate_keypair() -> Keypair {
    Keypair::new()
}
