use thiserror::Error;

use crate::vault::RemoteStoreError;

#[derive(Debug, Error)]
pub enum CustodyError {
    #[error("connector `{0}` is not supported by the key vault provider")]
    UnsupportedConnector(String),
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
    #[error("{operation} for key {key} returned no result")]
    RemoteOperationFailed { operation: &'static str, key: String },
    #[error("{operation} for key {key} failed")]
    Remote {
        operation: &'static str,
        key: String,
        #[source]
        source: RemoteStoreError,
    },
    #[error("no signature exists on the entity")]
    NoSignaturePresent,
    #[error("unhandled curve `{0}` encountered")]
    UnsupportedCurve(String),
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
    #[error("malformed key identifier `{0}`")]
    MalformedIdentifier(String),
    #[error("invalid base64url payload: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("failed to serialize entity: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CustodyError {
    /// The remote store failure behind this error, if any.
    pub fn remote_source(&self) -> Option<&RemoteStoreError> {
        match self {
            CustodyError::Remote { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type CustodyResult<T> = Result<T, CustodyError>;
