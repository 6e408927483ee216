//! Interfaces of the external collaborators: the wallet provider, its signer,
//! and the read-only RPC endpoint.
//!
//! Collaborators report their own error enums. The component that observes a
//! failure decides which `SessionError` kind it becomes, because the same
//! provider error means different things during connect and during submission.

use std::sync::Arc;

use async_trait::async_trait;
use escrow_core::AbiValue;
use escrow_core::Address;
use escrow_core::AmountWei;
use escrow_core::CallRequest;
use escrow_core::RegistryAddresses;
use escrow_core::SessionError;
use escrow_core::TxHash;
use serde::Serialize;
use tokio::sync::broadcast;

/// A request resolved against concrete registry addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractCall {
    pub to: Address,
    pub function: &'static str,
    pub arguments: Vec<AbiValue>,
    pub value: Option<AmountWei>,
}

impl ContractCall {
    pub fn for_request(request: &CallRequest, registries: &RegistryAddresses) -> Self {
        Self {
            to: registries.address_of(request.registry),
            function: request.spec().function,
            arguments: request.arguments.clone(),
            value: request.value_attached,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReceiptStatus {
    Success,
    Reverted { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub status: ReceiptStatus,
    pub block_number: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountEvent {
    Changed(Address),
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("no wallet provider detected")]
    NotInstalled,

    #[error("user rejected the request: {0}")]
    Rejected(String),

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Normalization for failures observed while connecting.
    pub fn into_connect_error(self) -> SessionError {
        match self {
            Self::NotInstalled => SessionError::ProviderUnavailable,
            Self::Rejected(reason) => SessionError::UserRejected(reason),
            Self::Other(reason) => SessionError::ConnectionError(reason),
        }
    }

    /// Normalization for failures before a transaction hash exists.
    pub fn into_submission_error(self) -> SessionError {
        SessionError::SubmissionRejected(self.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("execution reverted: {0}")]
    Reverted(String),

    #[error("{0}")]
    Network(String),
}

impl TransportError {
    pub fn into_read_error(self) -> SessionError {
        match self {
            Self::Reverted(reason) => SessionError::RegistryReverted(reason),
            Self::Network(reason) => SessionError::NetworkError(reason),
        }
    }
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError>;

    /// `None` when the provider can only query, never sign.
    async fn signer(&self) -> Result<Option<Arc<dyn Signer>>, ProviderError>;

    fn account_events(&self) -> Option<broadcast::Receiver<AccountEvent>>;
}

#[async_trait]
pub trait Signer: Send + Sync {
    fn address(&self) -> Address;

    /// Signs and broadcasts; returns once the hash is known.
    async fn send_transaction(&self, call: ContractCall) -> Result<TxHash, ProviderError>;

    /// `Ok(None)` while the transaction is not yet included.
    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<Receipt>, TransportError>;
}

#[async_trait]
pub trait ReadTransport: Send + Sync {
    async fn call(&self, call: ContractCall) -> Result<AbiValue, TransportError>;
}
