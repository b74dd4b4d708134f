use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use p256::elliptic_curve::sec1::{Coordinates, FromEncodedPoint, ToEncodedPoint};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey};
use p256::{EncodedPoint, FieldBytes, PublicKey, SecretKey};
use serde::{Deserialize, Serialize};

use super::models::AsymmetricKey;
use crate::error::{CustodyError, CustodyResult};

pub const KEY_TYPE_EC: &str = "EC";
pub const CURVE_P256: &str = "P-256";

const COORDINATE_LEN: usize = 32;

/// key: custody-web-key
/// JSON Web Key as exchanged with the vault's key-object endpoints. Coordinates are
/// base64url without padding.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
}

impl JsonWebKey {
    /// Builds the import shape for `key`; `d` is set only when the key carries
    /// private material.
    pub fn from_key(key: &AsymmetricKey) -> CustodyResult<Self> {
        let (public, d) = match key.private_key() {
            Some(pkcs8) => {
                let secret = SecretKey::from_pkcs8_der(pkcs8).map_err(|err| {
                    CustodyError::InvalidKeyMaterial(format!("PKCS#8 decode failed: {err}"))
                })?;
                let d = URL_SAFE_NO_PAD.encode(secret.to_bytes());
                (secret.public_key(), Some(d))
            }
            None => {
                let public = PublicKey::from_public_key_der(key.public_key()).map_err(|err| {
                    CustodyError::InvalidKeyMaterial(format!("SPKI decode failed: {err}"))
                })?;
                (public, None)
            }
        };

        let point = public.to_encoded_point(false);
        let (x, y) = match point.coordinates() {
            Coordinates::Uncompressed { x, y } => {
                (URL_SAFE_NO_PAD.encode(x), URL_SAFE_NO_PAD.encode(y))
            }
            _ => {
                return Err(CustodyError::InvalidKeyMaterial(
                    "failed to extract curve coordinates".into(),
                ))
            }
        };

        Ok(Self {
            kid: None,
            kty: KEY_TYPE_EC.to_string(),
            crv: Some(CURVE_P256.to_string()),
            x: Some(x),
            y: Some(y),
            d,
        })
    }

    /// SPKI DER encoding of the public point. Only P-256 is recognised.
    pub fn to_public_key_der(&self) -> CustodyResult<Vec<u8>> {
        match self.crv.as_deref() {
            Some(CURVE_P256) => {}
            Some(other) => return Err(CustodyError::UnsupportedCurve(other.to_string())),
            None => return Err(CustodyError::UnsupportedCurve("unspecified".into())),
        }

        let x = decode_coordinate(self.x.as_deref(), "x")?;
        let y = decode_coordinate(self.y.as_deref(), "y")?;
        let point = EncodedPoint::from_affine_coordinates(
            &FieldBytes::clone_from_slice(&x),
            &FieldBytes::clone_from_slice(&y),
            false,
        );
        let public: PublicKey = Option::from(PublicKey::from_encoded_point(&point))
            .ok_or_else(|| CustodyError::InvalidKeyMaterial("point is not on P-256".into()))?;

        let der = public
            .to_public_key_der()
            .map_err(|err| CustodyError::InvalidKeyMaterial(format!("SPKI encode failed: {err}")))?;
        Ok(der.as_bytes().to_vec())
    }
}

fn decode_coordinate(value: Option<&str>, name: &str) -> CustodyResult<Vec<u8>> {
    let value = value.ok_or_else(|| {
        CustodyError::InvalidKeyMaterial(format!("web key is missing coordinate `{name}`"))
    })?;
    let bytes = URL_SAFE_NO_PAD.decode(value.trim_end_matches('='))?;
    if bytes.len() != COORDINATE_LEN {
        return Err(CustodyError::InvalidKeyMaterial(format!(
            "coordinate `{name}` is {} bytes, expected {COORDINATE_LEN}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

impl fmt::Debug for JsonWebKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonWebKey")
            .field("kid", &self.kid)
            .field("kty", &self.kty)
            .field("crv", &self.crv)
            .field("x", &self.x)
            .field("y", &self.y)
            .field("d", &self.d.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
