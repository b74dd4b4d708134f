//! Remote key store contract and its Key Vault REST adapter.

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use uuid::Uuid;

pub mod client;
pub mod models;

pub use client::KeyVaultClient;
pub use models::{
    CreateKeyParameters, ImportKeyParameters, KeyBundle, KeyOperationResult, KeyVerifyResult,
    SecretBundle, SetSecretParameters, SignParameters, VerifyParameters, SIGNATURE_ALGORITHM,
};

#[derive(Debug, Error)]
pub enum RemoteStoreError {
    #[error("{resource} not found")]
    NotFound { resource: String },
    #[error("key vault rejected request for {resource} with {status}: {body}")]
    Status {
        resource: String,
        status: StatusCode,
        body: String,
    },
    #[error("failed to reach key vault: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode key vault response for {resource}: {message}")]
    Decode { resource: String, message: String },
}

impl RemoteStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteStoreError::NotFound { .. })
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RemoteStoreError::NotFound { .. } => Some(StatusCode::NOT_FOUND),
            RemoteStoreError::Status { status, .. } => Some(*status),
            RemoteStoreError::Transport(err) => err.status(),
            RemoteStoreError::Decode { .. } => None,
        }
    }
}

/// `Ok(None)` is a successful round trip that carried no payload.
pub type RemoteResult<T> = Result<Option<T>, RemoteStoreError>;

/// key: custody-remote-store
/// The vault primitives the custody service composes. Every call is a single
/// request/response round trip; implementations own timeouts and must not retry.
#[async_trait]
pub trait RemoteKeyStore: Send + Sync {
    async fn create_key(&self, id: Uuid, params: &CreateKeyParameters) -> RemoteResult<KeyBundle>;

    async fn get_key(&self, id: Uuid, version: Option<&str>) -> RemoteResult<KeyBundle>;

    async fn import_key(&self, id: Uuid, params: &ImportKeyParameters) -> RemoteResult<KeyBundle>;

    async fn import_secret(
        &self,
        id: Uuid,
        params: &SetSecretParameters,
    ) -> RemoteResult<SecretBundle>;

    async fn get_secret(&self, id: Uuid, version: Option<&str>) -> RemoteResult<SecretBundle>;

    async fn sign(
        &self,
        id: Uuid,
        version: Option<&str>,
        params: &SignParameters,
    ) -> RemoteResult<KeyOperationResult>;

    async fn verify(
        &self,
        id: Uuid,
        version: Option<&str>,
        params: &VerifyParameters,
    ) -> RemoteResult<KeyVerifyResult>;
}
