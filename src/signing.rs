use serde::Serialize;
use serde_json::Value;

use crate::error::CustodyResult;

/// key: custody-signed-entity
/// A record that carries its own signature. The signature field is left out of the
/// bytes that are signed and verified.
pub trait SignedEntity: Serialize + Sized {
    /// JSON name of the signature field.
    const SIGNATURE_FIELD: &'static str = "signature";

    fn signature(&self) -> Option<&[u8]>;

    fn with_signature(self, signature: Vec<u8>) -> Self;
}

/// Compact JSON of `entity` without its signature field, object keys sorted at every depth.
pub fn canonical_bytes<E: SignedEntity>(entity: &E) -> CustodyResult<Vec<u8>> {
    let mut fields = match serde_json::to_value(entity)? {
        Value::Object(fields) => fields,
        _ => {
            return Err(<serde_json::Error as serde::ser::Error>::custom(
                "signed entity must serialize to a JSON object",
            )
            .into())
        }
    };
    fields.remove(E::SIGNATURE_FIELD);

    let mut out = Vec::new();
    write_canonical(&mut out, &Value::Object(fields))?;
    Ok(out)
}

fn write_canonical(out: &mut Vec<u8>, value: &Value) -> serde_json::Result<()> {
    match value {
        Value::Object(fields) => {
            let mut keys: Vec<&String> = fields.keys().collect();
            keys.sort();
            out.push(b'{');
            for (index, key) in keys.into_iter().enumerate() {
                if index > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)?;
                out.push(b':');
                write_canonical(out, &fields[key.as_str()])?;
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(b',');
                }
                write_canonical(out, item)?;
            }
            out.push(b']');
        }
        scalar => serde_json::to_writer(&mut *out, scalar)?,
    }
    Ok(())
}

/// Serde helpers for an `Option<Vec<u8>>` signature held as unpadded base64url.
///
/// ```ignore
/// #[serde(default, with = "kms_custody::signing::signature_serde")]
/// signature: Option<Vec<u8>>,
/// ```
pub mod signature_serde {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_some(&URL_SAFE_NO_PAD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|value| {
                URL_SAFE_NO_PAD
                    .decode(value.trim_end_matches('='))
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
    }
}
