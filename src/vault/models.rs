use serde::{Deserialize, Serialize};

use crate::keys::web_key::{JsonWebKey, CURVE_P256, KEY_TYPE_EC};

/// ECDSA over P-256 with SHA-256; the only signing algorithm the custody layer issues.
pub const SIGNATURE_ALGORITHM: &str = "ES256";

pub const KEY_TYPE_SYMMETRIC_HSM: &str = "oct-HSM";
pub const SYMMETRIC_KEY_SIZE: u32 = 256;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateKeyParameters {
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_size: Option<u32>,
}

impl CreateKeyParameters {
    pub fn elliptic_curve() -> Self {
        Self {
            kty: KEY_TYPE_EC.to_string(),
            crv: Some(CURVE_P256.to_string()),
            key_size: None,
        }
    }

    pub fn symmetric() -> Self {
        Self {
            kty: KEY_TYPE_SYMMETRIC_HSM.to_string(),
            crv: None,
            key_size: Some(SYMMETRIC_KEY_SIZE),
        }
    }
}

/// Native key object as returned by create, get and import.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<JsonWebKey>,
}

impl KeyBundle {
    pub fn kid(&self) -> Option<&str> {
        self.key.as_ref().and_then(|key| key.kid.as_deref())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportKeyParameters {
    pub key: JsonWebKey,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetSecretParameters {
    pub value: String,
    #[serde(
        default,
        rename = "contentType",
        skip_serializing_if = "Option::is_none"
    )]
    pub content_type: Option<String>,
}

/// Opaque secret entry. `id` is the full identifier URL ending in `/{name}/{version}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretBundle {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignParameters {
    pub alg: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyOperationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyParameters {
    pub alg: String,
    pub digest: String,
    pub value: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVerifyResult {
    #[serde(rename = "value")]
    pub is_valid: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_parameters_omit_unused_fields() {
        let ec = serde_json::to_value(CreateKeyParameters::elliptic_curve()).unwrap();
        assert_eq!(ec, json!({ "kty": "EC", "crv": "P-256" }));

        let oct = serde_json::to_value(CreateKeyParameters::symmetric()).unwrap();
        assert_eq!(oct, json!({ "kty": "oct-HSM", "key_size": 256 }));
    }

    #[test]
    fn verify_result_reads_value_field() {
        let parsed: KeyVerifyResult = serde_json::from_value(json!({ "value": true })).unwrap();
        assert!(parsed.is_valid);
    }

    #[test]
    fn key_bundle_tolerates_missing_key() {
        let parsed: KeyBundle =
            serde_json::from_value(json!({ "attributes": { "enabled": true } })).unwrap();
        assert!(parsed.key.is_none());
        assert!(parsed.kid().is_none());
    }
}
