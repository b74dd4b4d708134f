use std::fmt;

use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey};
use p256::{PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CustodyError, CustodyResult};

/// key: custody-key-descriptor
/// Logical identity of a key, independent of whether the vault holds it as a key
/// object or as a public-only secret.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyDescriptor {
    id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

impl KeyDescriptor {
    pub fn new(id: Uuid, version: Option<String>) -> Self {
        Self {
            id,
            version: version.filter(|value| !value.is_empty()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

impl fmt::Display for KeyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}/{}", self.id.hyphenated(), version),
            None => write!(f, "{}", self.id.hyphenated()),
        }
    }
}

impl From<&AsymmetricKey> for KeyDescriptor {
    fn from(key: &AsymmetricKey) -> Self {
        KeyDescriptor::new(key.id, key.version.clone())
    }
}

/// key: custody-asymmetric-key
/// P-256 key material: SPKI DER public key plus optional PKCS#8 DER private key.
#[derive(Clone, PartialEq, Eq)]
pub struct AsymmetricKey {
    id: Uuid,
    version: Option<String>,
    public_key: Vec<u8>,
    private_key: Option<Vec<u8>>,
}

impl AsymmetricKey {
    /// Public-only key; the bytes are kept exactly as given.
    pub fn public_only(id: Uuid, version: Option<String>, public_key: Vec<u8>) -> Self {
        Self {
            id,
            version: version.filter(|value| !value.is_empty()),
            public_key,
            private_key: None,
        }
    }

    /// Key pair; fails unless `public_key` encodes the point derived from `private_key`.
    pub fn with_private(
        id: Uuid,
        version: Option<String>,
        public_key: Vec<u8>,
        private_key: Vec<u8>,
    ) -> CustodyResult<Self> {
        let secret = SecretKey::from_pkcs8_der(&private_key)
            .map_err(|err| CustodyError::InvalidKeyMaterial(format!("PKCS#8 decode failed: {err}")))?;
        let public = PublicKey::from_public_key_der(&public_key)
            .map_err(|err| CustodyError::InvalidKeyMaterial(format!("SPKI decode failed: {err}")))?;
        if secret.public_key() != public {
            return Err(CustodyError::InvalidKeyMaterial(
                "public key does not match private key".into(),
            ));
        }
        Ok(Self {
            id,
            version: version.filter(|value| !value.is_empty()),
            public_key,
            private_key: Some(private_key),
        })
    }

    /// Key pair whose public half is derived from the PKCS#8 document.
    pub fn from_pkcs8_der(
        id: Uuid,
        version: Option<String>,
        private_key: Vec<u8>,
    ) -> CustodyResult<Self> {
        let secret = SecretKey::from_pkcs8_der(&private_key)
            .map_err(|err| CustodyError::InvalidKeyMaterial(format!("PKCS#8 decode failed: {err}")))?;
        let public_key = secret
            .public_key()
            .to_public_key_der()
            .map_err(|err| CustodyError::InvalidKeyMaterial(format!("SPKI encode failed: {err}")))?
            .as_bytes()
            .to_vec();
        Ok(Self {
            id,
            version: version.filter(|value| !value.is_empty()),
            public_key,
            private_key: Some(private_key),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn private_key(&self) -> Option<&[u8]> {
        self.private_key.as_deref()
    }

    pub fn is_private(&self) -> bool {
        self.private_key.is_some()
    }

    pub fn descriptor(&self) -> KeyDescriptor {
        KeyDescriptor::from(self)
    }

    /// Copy of this key without private material.
    pub fn to_public_only(&self) -> AsymmetricKey {
        AsymmetricKey::public_only(self.id, self.version.clone(), self.public_key.clone())
    }
}

impl fmt::Debug for AsymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsymmetricKey")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("public_key_len", &self.public_key.len())
            .field(
                "private_key",
                &self.private_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}
