use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::models::{
    CreateKeyParameters, ImportKeyParameters, KeyBundle, KeyOperationResult, KeyVerifyResult,
    SecretBundle, SetSecretParameters, SignParameters, VerifyParameters,
};
use super::{RemoteKeyStore, RemoteResult, RemoteStoreError};
use crate::config::KeyVaultClientConfig;

/// key: custody-key-vault-client
/// Key Vault data-plane adapter. One HTTP round trip per call; the timeout comes from
/// the config and failures surface unchanged.
#[derive(Clone)]
pub struct KeyVaultClient {
    client: Client,
    base_url: String,
    access_token: Option<String>,
    api_version: String,
}

impl KeyVaultClient {
    pub fn new(config: KeyVaultClientConfig) -> Result<Self, RemoteStoreError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.vault_url,
            access_token: config.access_token,
            api_version: config.api_version,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self
            .client
            .request(method, self.endpoint(path))
            .query(&[("api-version", self.api_version.as_str())]);
        if let Some(token) = &self.access_token {
            request.bearer_auth(token)
        } else {
            request
        }
    }

    async fn dispatch<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        resource: &str,
    ) -> RemoteResult<T> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            tracing::debug!(%resource, "key vault reported resource missing");
            return Err(RemoteStoreError::NotFound {
                resource: resource.to_string(),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%resource, %status, "key vault rejected request");
            return Err(RemoteStoreError::Status {
                resource: resource.to_string(),
                status,
                body,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| RemoteStoreError::Decode {
                resource: resource.to_string(),
                message: err.to_string(),
            })
    }
}

fn key_path(id: Uuid, version: Option<&str>) -> String {
    match version {
        Some(version) => format!("keys/{}/{}", id.hyphenated(), version),
        None => format!("keys/{}", id.hyphenated()),
    }
}

fn secret_path(id: Uuid, version: Option<&str>) -> String {
    match version {
        Some(version) => format!("secrets/{}/{}", id.hyphenated(), version),
        None => format!("secrets/{}", id.hyphenated()),
    }
}

#[async_trait]
impl RemoteKeyStore for KeyVaultClient {
    async fn create_key(&self, id: Uuid, params: &CreateKeyParameters) -> RemoteResult<KeyBundle> {
        let path = format!("{}/create", key_path(id, None));
        self.dispatch(self.request(Method::POST, &path).json(params), &path)
            .await
    }

    async fn get_key(&self, id: Uuid, version: Option<&str>) -> RemoteResult<KeyBundle> {
        let path = key_path(id, version);
        self.dispatch(self.request(Method::GET, &path), &path).await
    }

    async fn import_key(&self, id: Uuid, params: &ImportKeyParameters) -> RemoteResult<KeyBundle> {
        let path = key_path(id, None);
        self.dispatch(self.request(Method::PUT, &path).json(params), &path)
            .await
    }

    async fn import_secret(
        &self,
        id: Uuid,
        params: &SetSecretParameters,
    ) -> RemoteResult<SecretBundle> {
        let path = secret_path(id, None);
        self.dispatch(self.request(Method::PUT, &path).json(params), &path)
            .await
    }

    async fn get_secret(&self, id: Uuid, version: Option<&str>) -> RemoteResult<SecretBundle> {
        let path = secret_path(id, version);
        self.dispatch(self.request(Method::GET, &path), &path).await
    }

    async fn sign(
        &self,
        id: Uuid,
        version: Option<&str>,
        params: &SignParameters,
    ) -> RemoteResult<KeyOperationResult> {
        let path = format!("{}/sign", key_path(id, version));
        self.dispatch(self.request(Method::POST, &path).json(params), &path)
            .await
    }

    async fn verify(
        &self,
        id: Uuid,
        version: Option<&str>,
        params: &VerifyParameters,
    ) -> RemoteResult<KeyVerifyResult> {
        let path = format!("{}/verify", key_path(id, version));
        self.dispatch(self.request(Method::POST, &path).json(params), &path)
            .await
    }
}
