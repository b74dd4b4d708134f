use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;
use p256::PublicKey;
use sha2::{Digest, Sha256};
use url::Url;
use uuid::Uuid;

use super::models::{AsymmetricKey, KeyDescriptor};
use super::web_key::JsonWebKey;
use crate::error::{CustodyError, CustodyResult};
use crate::signing::{canonical_bytes, SignedEntity};
use crate::vault::{
    CreateKeyParameters, ImportKeyParameters, KeyBundle, RemoteKeyStore, RemoteStoreError,
    SecretBundle, SetSecretParameters, SignParameters, VerifyParameters, SIGNATURE_ALGORITHM,
};

/// key: custody-connector
/// Names the store an operation targets. Only key vault connectors whose service
/// reference was registered on the service are served.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyConnector {
    KeyVault { service_reference: String },
    Local { name: String },
}

impl KeyConnector {
    pub fn key_vault(service_reference: impl Into<String>) -> Self {
        KeyConnector::KeyVault {
            service_reference: service_reference.into(),
        }
    }
}

impl fmt::Display for KeyConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyConnector::KeyVault { service_reference } => {
                write!(f, "key-vault:{service_reference}")
            }
            KeyConnector::Local { name } => write!(f, "local:{name}"),
        }
    }
}

/// How the vault holds a logical key: a native key object, or a secret carrying
/// only the public key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyStorageShape {
    FullKeyRecord(KeyBundle),
    SecretRecord(SecretBundle),
}

#[derive(Default)]
pub struct KeyCustodyServiceBuilder {
    stores: HashMap<String, Arc<dyn RemoteKeyStore>>,
}

impl KeyCustodyServiceBuilder {
    pub fn register(
        mut self,
        service_reference: impl Into<String>,
        store: Arc<dyn RemoteKeyStore>,
    ) -> Self {
        self.stores.insert(service_reference.into(), store);
        self
    }

    pub fn build(self) -> KeyCustodyService {
        KeyCustodyService {
            stores: Arc::new(self.stores),
        }
    }
}

/// key: custody-service
/// Asymmetric key lifecycle over remote key stores. Holds no mutable state; clones
/// share the same immutable registry.
#[derive(Clone)]
pub struct KeyCustodyService {
    stores: Arc<HashMap<String, Arc<dyn RemoteKeyStore>>>,
}

impl KeyCustodyService {
    pub fn builder() -> KeyCustodyServiceBuilder {
        KeyCustodyServiceBuilder::default()
    }

    pub fn supports(&self, connector: &KeyConnector) -> bool {
        self.store(connector).is_ok()
    }

    fn store(&self, connector: &KeyConnector) -> CustodyResult<&dyn RemoteKeyStore> {
        match connector {
            KeyConnector::KeyVault { service_reference } => self
                .stores
                .get(service_reference)
                .map(|store| &**store)
                .ok_or_else(|| CustodyError::UnsupportedConnector(connector.to_string())),
            KeyConnector::Local { .. } => {
                Err(CustodyError::UnsupportedConnector(connector.to_string()))
            }
        }
    }

    /// Creates a P-256 key inside the vault under a fresh id.
    pub async fn create_asymmetric_key(
        &self,
        connector: &KeyConnector,
    ) -> CustodyResult<KeyDescriptor> {
        let store = self.store(connector)?;
        self.create_key(store, &CreateKeyParameters::elliptic_curve(), "create_asymmetric_key")
            .await
    }

    /// Creates a 256-bit HSM-backed symmetric key. The material never leaves the vault.
    pub async fn create_symmetric_key(
        &self,
        connector: &KeyConnector,
    ) -> CustodyResult<KeyDescriptor> {
        let store = self.store(connector)?;
        self.create_key(store, &CreateKeyParameters::symmetric(), "create_symmetric_key")
            .await
    }

    async fn create_key(
        &self,
        store: &dyn RemoteKeyStore,
        params: &CreateKeyParameters,
        operation: &'static str,
    ) -> CustodyResult<KeyDescriptor> {
        let id = Uuid::new_v4();
        let bundle = store
            .create_key(id, params)
            .await
            .map_err(remote_failure(operation, id))?
            .ok_or_else(|| CustodyError::RemoteOperationFailed {
                operation,
                key: id.to_string(),
            })?;

        let version = bundle.kid().map(version_from_identifier).transpose()?;
        let descriptor = KeyDescriptor::new(id, version);
        tracing::info!(
            key_id = %descriptor.id(),
            version = ?descriptor.version(),
            kty = %params.kty,
            operation,
            "created key in vault"
        );
        Ok(descriptor)
    }

    /// Stores `key` in the vault. Keys with private material become native key
    /// objects; public-only keys are stored as secrets holding the SPKI bytes.
    ///
    /// The returned descriptor carries the key's own version. For public-only keys the
    /// vault assigns a fresh secret version, so a caller-chosen version does not
    /// resolve; look such keys up without a version.
    pub async fn import_asymmetric_key(
        &self,
        connector: &KeyConnector,
        key: &AsymmetricKey,
    ) -> CustodyResult<KeyDescriptor> {
        let store = self.store(connector)?;
        let descriptor = key.descriptor();

        if key.is_private() {
            let params = ImportKeyParameters {
                key: JsonWebKey::from_key(key)?,
            };
            store
                .import_key(key.id(), &params)
                .await
                .map_err(remote_failure("import_key", &descriptor))?
                .ok_or_else(|| CustodyError::RemoteOperationFailed {
                    operation: "import_key",
                    key: descriptor.to_string(),
                })?;
            tracing::info!(key_id = %descriptor.id(), "imported key pair as vault key");
        } else {
            PublicKey::from_public_key_der(key.public_key()).map_err(|err| {
                CustodyError::InvalidKeyMaterial(format!("SPKI decode failed: {err}"))
            })?;
            let params = SetSecretParameters {
                value: URL_SAFE_NO_PAD.encode(key.public_key()),
                content_type: None,
            };
            store
                .import_secret(key.id(), &params)
                .await
                .map_err(remote_failure("import_secret", &descriptor))?
                .ok_or_else(|| CustodyError::RemoteOperationFailed {
                    operation: "import_secret",
                    key: descriptor.to_string(),
                })?;
            tracing::info!(key_id = %descriptor.id(), "imported public key as vault secret");
        }

        Ok(descriptor)
    }

    /// Resolves the public half of a key. Private material is never returned.
    pub async fn get_asymmetric_key(
        &self,
        connector: &KeyConnector,
        descriptor: &KeyDescriptor,
        export_private: bool,
    ) -> CustodyResult<AsymmetricKey> {
        if export_private {
            return Err(CustodyError::UnsupportedOperation(
                "private key export is not offered by the key vault",
            ));
        }

        let store = self.store(connector)?;
        match resolve_storage_shape(store, descriptor).await? {
            KeyStorageShape::SecretRecord(secret) => key_from_secret(&secret),
            KeyStorageShape::FullKeyRecord(bundle) => key_from_bundle(descriptor, bundle),
        }
    }

    pub async fn get_symmetric_key(
        &self,
        connector: &KeyConnector,
        descriptor: &KeyDescriptor,
    ) -> CustodyResult<Vec<u8>> {
        tracing::debug!(%connector, key = %descriptor, "symmetric key export refused");
        Err(CustodyError::UnsupportedOperation(
            "symmetric key material cannot be exported from the key vault",
        ))
    }

    /// ES256 signature over `data`, produced by the vault. Returns the raw `r || s` bytes.
    pub async fn sign_data(
        &self,
        connector: &KeyConnector,
        descriptor: &KeyDescriptor,
        data: &[u8],
    ) -> CustodyResult<Vec<u8>> {
        let store = self.store(connector)?;
        let params = SignParameters {
            alg: SIGNATURE_ALGORITHM.to_string(),
            value: URL_SAFE_NO_PAD.encode(Sha256::digest(data)),
        };

        let result = store
            .sign(descriptor.id(), descriptor.version(), &params)
            .await
            .map_err(remote_failure("sign", descriptor))?
            .ok_or_else(|| CustodyError::RemoteOperationFailed {
                operation: "sign",
                key: descriptor.to_string(),
            })?;

        Ok(decode_base64url(&result.value)?)
    }

    /// Checks `signature` locally when the key is stored as a public-only secret,
    /// otherwise asks the vault to verify.
    pub async fn verify_data(
        &self,
        connector: &KeyConnector,
        descriptor: &KeyDescriptor,
        data: &[u8],
        signature: &[u8],
    ) -> CustodyResult<bool> {
        let store = self.store(connector)?;

        if let Some(secret) = probe_secret(store, descriptor).await? {
            let key = key_from_secret(&secret)?;
            tracing::debug!(key = %descriptor, "verifying against public key secret");
            return verify_locally(key.public_key(), data, signature);
        }

        tracing::debug!(key = %descriptor, "no public key secret, verifying in vault");
        let params = VerifyParameters {
            alg: SIGNATURE_ALGORITHM.to_string(),
            digest: URL_SAFE_NO_PAD.encode(Sha256::digest(data)),
            value: URL_SAFE_NO_PAD.encode(signature),
        };
        let result = store
            .verify(descriptor.id(), descriptor.version(), &params)
            .await
            .map_err(remote_failure("verify", descriptor))?
            .ok_or_else(|| CustodyError::RemoteOperationFailed {
                operation: "verify",
                key: descriptor.to_string(),
            })?;
        Ok(result.is_valid)
    }

    /// Signs the canonical form of `entity` and returns it with the signature set.
    pub async fn sign_entity<E: SignedEntity>(
        &self,
        connector: &KeyConnector,
        descriptor: &KeyDescriptor,
        entity: E,
    ) -> CustodyResult<E> {
        let payload = canonical_bytes(&entity)?;
        let signature = self.sign_data(connector, descriptor, &payload).await?;
        Ok(entity.with_signature(signature))
    }

    pub async fn verify_entity<E: SignedEntity>(
        &self,
        connector: &KeyConnector,
        descriptor: &KeyDescriptor,
        entity: &E,
    ) -> CustodyResult<bool> {
        let signature = entity
            .signature()
            .ok_or(CustodyError::NoSignaturePresent)?;
        let payload = canonical_bytes(entity)?;
        self.verify_data(connector, descriptor, &payload, signature)
            .await
    }
}

/// Secret probe followed by the key object lookup. The key object is only fetched
/// once the secret is known to be absent.
pub async fn resolve_storage_shape(
    store: &dyn RemoteKeyStore,
    descriptor: &KeyDescriptor,
) -> CustodyResult<KeyStorageShape> {
    if let Some(secret) = probe_secret(store, descriptor).await? {
        return Ok(KeyStorageShape::SecretRecord(secret));
    }

    tracing::debug!(key = %descriptor, "falling back to vault key object");
    let bundle = store
        .get_key(descriptor.id(), descriptor.version())
        .await
        .map_err(remote_failure("get_key", descriptor))?
        .ok_or_else(|| CustodyError::RemoteOperationFailed {
            operation: "get_key",
            key: descriptor.to_string(),
        })?;
    Ok(KeyStorageShape::FullKeyRecord(bundle))
}

/// `Ok(None)` when the vault holds no public key secret for `descriptor`. Only a
/// not-found answer is absorbed.
async fn probe_secret(
    store: &dyn RemoteKeyStore,
    descriptor: &KeyDescriptor,
) -> CustodyResult<Option<SecretBundle>> {
    match store
        .get_secret(descriptor.id(), descriptor.version())
        .await
    {
        Ok(Some(secret)) => Ok(Some(secret)),
        Ok(None) => {
            tracing::debug!(key = %descriptor, "secret probe returned no payload");
            Ok(None)
        }
        Err(err) if err.is_not_found() => {
            tracing::debug!(key = %descriptor, "no public key secret stored");
            Ok(None)
        }
        Err(source) => {
            tracing::warn!(?source, key = %descriptor, "secret probe failed");
            Err(CustodyError::Remote {
                operation: "get_secret",
                key: descriptor.to_string(),
                source,
            })
        }
    }
}

fn remote_failure(
    operation: &'static str,
    key: impl fmt::Display,
) -> impl FnOnce(RemoteStoreError) -> CustodyError {
    let key = key.to_string();
    move |source| CustodyError::Remote {
        operation,
        key,
        source,
    }
}

fn key_from_secret(secret: &SecretBundle) -> CustodyResult<AsymmetricKey> {
    let (id, version) = identity_from_secret_identifier(&secret.id)?;
    let public_key = decode_base64url(&secret.value)?;
    Ok(AsymmetricKey::public_only(id, version, public_key))
}

fn key_from_bundle(descriptor: &KeyDescriptor, bundle: KeyBundle) -> CustodyResult<AsymmetricKey> {
    let web_key = bundle
        .key
        .ok_or_else(|| CustodyError::RemoteOperationFailed {
            operation: "get_key",
            key: descriptor.to_string(),
        })?;
    let public_key = web_key.to_public_key_der()?;
    let version = match web_key.kid.as_deref() {
        Some(kid) => Some(version_from_identifier(kid)?),
        None => descriptor.version().map(str::to_string),
    };
    Ok(AsymmetricKey::public_only(
        descriptor.id(),
        version,
        public_key,
    ))
}

fn verify_locally(public_key: &[u8], data: &[u8], signature: &[u8]) -> CustodyResult<bool> {
    let verifying_key = VerifyingKey::from_public_key_der(public_key).map_err(|err| {
        CustodyError::InvalidKeyMaterial(format!("SPKI decode failed: {err}"))
    })?;
    let Ok(signature) = Signature::from_slice(signature) else {
        return Ok(false);
    };
    Ok(verifying_key.verify(data, &signature).is_ok())
}

fn decode_base64url(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(value.trim_end_matches('='))
}

fn identifier_segments(identifier: &str) -> CustodyResult<Vec<String>> {
    let url = Url::parse(identifier)
        .map_err(|_| CustodyError::MalformedIdentifier(identifier.to_string()))?;
    let segments: Vec<String> = url
        .path_segments()
        .map(|segments| {
            segments
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Ok(segments)
}

/// Version of a key identifier URL: its last path segment.
pub fn version_from_identifier(identifier: &str) -> CustodyResult<String> {
    identifier_segments(identifier)?
        .pop()
        .ok_or_else(|| CustodyError::MalformedIdentifier(identifier.to_string()))
}

/// Id and version of a secret identifier URL: its last two path segments.
pub fn identity_from_secret_identifier(
    identifier: &str,
) -> CustodyResult<(Uuid, Option<String>)> {
    let segments = identifier_segments(identifier)?;
    let [.., id, version] = segments.as_slice() else {
        return Err(CustodyError::MalformedIdentifier(identifier.to_string()));
    };
    let id = Uuid::parse_str(id)
        .map_err(|_| CustodyError::MalformedIdentifier(identifier.to_string()))?;
    Ok((id, Some(version.clone())))
}
