#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use kms_custody::keys::JsonWebKey;
use kms_custody::vault::{
    CreateKeyParameters, ImportKeyParameters, KeyBundle, KeyOperationResult, KeyVerifyResult,
    RemoteKeyStore, RemoteResult, SecretBundle, SetSecretParameters, SignParameters,
    VerifyParameters, SIGNATURE_ALGORITHM,
};
use kms_custody::{AsymmetricKey, KeyConnector, KeyCustodyService, RemoteStoreError};
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use p256::SecretKey;
use rand_core::OsRng;
use reqwest::StatusCode;
use uuid::Uuid;

pub const VAULT_URL: &str = "https://unit.vault.test";
pub const SERVICE_REFERENCE: &str = "unit-vault";

struct StoredKey {
    version: String,
    secret: Option<SecretKey>,
    kty: String,
}

struct StoredSecret {
    version: String,
    value: String,
}

/// Vault double that keeps keys in memory and signs with real P-256 keys.
#[derive(Default)]
pub struct InMemoryVault {
    keys: Mutex<HashMap<Uuid, StoredKey>>,
    secrets: Mutex<HashMap<Uuid, StoredSecret>>,
    calls: Mutex<Vec<String>>,
    secret_failure: Mutex<Option<StatusCode>>,
    empty_create: AtomicBool,
}

impl InMemoryVault {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_secret_reads(&self, status: StatusCode) {
        *self.secret_failure.lock().unwrap() = Some(status);
    }

    pub fn answer_create_without_payload(&self) {
        self.empty_create.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn has_key(&self, id: Uuid) -> bool {
        self.keys.lock().unwrap().contains_key(&id)
    }

    pub fn has_secret(&self, id: Uuid) -> bool {
        self.secrets.lock().unwrap().contains_key(&id)
    }

    /// Mirrors a key object's public half into a secret, as a second storage shape
    /// of the same logical key.
    pub fn publish_public_secret(&self, id: Uuid) {
        let keys = self.keys.lock().unwrap();
        let stored = keys.get(&id).expect("key exists");
        let secret = stored.secret.as_ref().expect("asymmetric key");
        let key = key_value(id, secret);
        self.secrets.lock().unwrap().insert(
            id,
            StoredSecret {
                version: stored.version.clone(),
                value: URL_SAFE_NO_PAD.encode(key.public_key()),
            },
        );
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    fn signing_key(&self, id: Uuid, version: Option<&str>) -> Result<SigningKey, RemoteStoreError> {
        let keys = self.keys.lock().unwrap();
        let stored = keys
            .get(&id)
            .filter(|stored| version.map_or(true, |version| version == stored.version))
            .ok_or_else(|| not_found("keys", id))?;
        let secret = stored.secret.as_ref().ok_or_else(|| bad_request("not an EC key"))?;
        Ok(SigningKey::from(secret))
    }

    fn bundle(id: Uuid, stored: &StoredKey) -> KeyBundle {
        let kid = format!("{VAULT_URL}/keys/{}/{}", id.hyphenated(), stored.version);
        let mut web_key = match &stored.secret {
            Some(secret) => JsonWebKey::from_key(&key_value(id, secret).to_public_only())
                .expect("public web key"),
            None => JsonWebKey {
                kty: stored.kty.clone(),
                ..JsonWebKey::default()
            },
        };
        web_key.kid = Some(kid);
        KeyBundle { key: Some(web_key) }
    }
}

#[async_trait]
impl RemoteKeyStore for InMemoryVault {
    async fn create_key(&self, id: Uuid, params: &CreateKeyParameters) -> RemoteResult<KeyBundle> {
        self.record("create_key");
        if self.empty_create.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let secret = (params.kty == "EC").then(|| SecretKey::random(&mut OsRng));
        let stored = StoredKey {
            version: new_version(),
            secret,
            kty: params.kty.clone(),
        };
        let bundle = Self::bundle(id, &stored);
        self.keys.lock().unwrap().insert(id, stored);
        Ok(Some(bundle))
    }

    async fn get_key(&self, id: Uuid, version: Option<&str>) -> RemoteResult<KeyBundle> {
        self.record("get_key");
        let keys = self.keys.lock().unwrap();
        let stored = keys
            .get(&id)
            .filter(|stored| version.map_or(true, |version| version == stored.version))
            .ok_or_else(|| not_found("keys", id))?;
        Ok(Some(Self::bundle(id, stored)))
    }

    async fn import_key(&self, id: Uuid, params: &ImportKeyParameters) -> RemoteResult<KeyBundle> {
        self.record("import_key");
        let d = params
            .key
            .d
            .as_deref()
            .ok_or_else(|| bad_request("key objects require a private component"))?;
        let scalar = URL_SAFE_NO_PAD
            .decode(d)
            .map_err(|_| bad_request("d is not base64url"))?;
        let secret = SecretKey::from_slice(&scalar).map_err(|_| bad_request("invalid d"))?;
        let stored = StoredKey {
            version: new_version(),
            secret: Some(secret),
            kty: params.key.kty.clone(),
        };
        let bundle = Self::bundle(id, &stored);
        self.keys.lock().unwrap().insert(id, stored);
        Ok(Some(bundle))
    }

    async fn import_secret(
        &self,
        id: Uuid,
        params: &SetSecretParameters,
    ) -> RemoteResult<SecretBundle> {
        self.record("import_secret");
        let version = new_version();
        self.secrets.lock().unwrap().insert(
            id,
            StoredSecret {
                version: version.clone(),
                value: params.value.clone(),
            },
        );
        Ok(Some(SecretBundle {
            id: format!("{VAULT_URL}/secrets/{}/{version}", id.hyphenated()),
            value: params.value.clone(),
        }))
    }

    async fn get_secret(&self, id: Uuid, version: Option<&str>) -> RemoteResult<SecretBundle> {
        self.record("get_secret");
        if let Some(status) = *self.secret_failure.lock().unwrap() {
            return Err(RemoteStoreError::Status {
                resource: format!("secrets/{id}"),
                status,
                body: "injected failure".into(),
            });
        }
        let secrets = self.secrets.lock().unwrap();
        let stored = secrets
            .get(&id)
            .filter(|stored| version.map_or(true, |version| version == stored.version))
            .ok_or_else(|| not_found("secrets", id))?;
        Ok(Some(SecretBundle {
            id: format!("{VAULT_URL}/secrets/{}/{}", id.hyphenated(), stored.version),
            value: stored.value.clone(),
        }))
    }

    async fn sign(
        &self,
        id: Uuid,
        version: Option<&str>,
        params: &SignParameters,
    ) -> RemoteResult<KeyOperationResult> {
        self.record("sign");
        if params.alg != SIGNATURE_ALGORITHM {
            return Err(bad_request("unsupported algorithm"));
        }
        let signing_key = self.signing_key(id, version)?;
        let digest = URL_SAFE_NO_PAD
            .decode(&params.value)
            .map_err(|_| bad_request("digest is not base64url"))?;
        let signature: Signature = signing_key
            .sign_prehash(&digest)
            .map_err(|_| bad_request("digest rejected"))?;
        Ok(Some(KeyOperationResult {
            kid: None,
            value: URL_SAFE_NO_PAD.encode(signature.to_bytes()),
        }))
    }

    async fn verify(
        &self,
        id: Uuid,
        version: Option<&str>,
        params: &VerifyParameters,
    ) -> RemoteResult<KeyVerifyResult> {
        self.record("verify");
        let verifying_key = VerifyingKey::from(&self.signing_key(id, version)?);
        let digest = URL_SAFE_NO_PAD
            .decode(&params.digest)
            .map_err(|_| bad_request("digest is not base64url"))?;
        let signature = URL_SAFE_NO_PAD
            .decode(&params.value)
            .map_err(|_| bad_request("signature is not base64url"))?;
        let is_valid = Signature::from_slice(&signature)
            .map(|signature| verifying_key.verify_prehash(&digest, &signature).is_ok())
            .unwrap_or(false);
        Ok(Some(KeyVerifyResult { is_valid }))
    }
}

pub fn service_with(vault: Arc<InMemoryVault>) -> (KeyCustodyService, KeyConnector) {
    let service = KeyCustodyService::builder()
        .register(SERVICE_REFERENCE, vault)
        .build();
    (service, KeyConnector::key_vault(SERVICE_REFERENCE))
}

/// Key pair generated on the caller's side.
pub fn local_key_pair(id: Uuid) -> AsymmetricKey {
    key_value(id, &SecretKey::random(&mut OsRng))
}

/// ES256 signature made with the caller's own private key, outside the vault.
pub fn sign_locally(key: &AsymmetricKey, data: &[u8]) -> Vec<u8> {
    let signing_key =
        SigningKey::from_pkcs8_der(key.private_key().expect("private key")).expect("pkcs8");
    let signature: Signature = signing_key.sign(data);
    signature.to_bytes().to_vec()
}

fn key_value(id: Uuid, secret: &SecretKey) -> AsymmetricKey {
    let der = secret.to_pkcs8_der().expect("pkcs8 encode");
    AsymmetricKey::from_pkcs8_der(id, None, der.as_bytes().to_vec()).expect("key pair")
}

fn new_version() -> String {
    Uuid::new_v4().simple().to_string()
}

fn not_found(kind: &str, id: Uuid) -> RemoteStoreError {
    RemoteStoreError::NotFound {
        resource: format!("{kind}/{id}"),
    }
}

fn bad_request(message: &str) -> RemoteStoreError {
    RemoteStoreError::Status {
        resource: "request".into(),
        status: StatusCode::BAD_REQUEST,
        body: message.to_string(),
    }
}
