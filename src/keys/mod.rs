//! Asymmetric key custody over a remote key vault.

pub mod models;
pub mod service;
pub mod web_key;

pub use models::{AsymmetricKey, KeyDescriptor};
pub use service::{
    identity_from_secret_identifier, resolve_storage_shape, version_from_identifier,
    KeyConnector, KeyCustodyService, KeyCustodyServiceBuilder, KeyStorageShape,
};
pub use web_key::JsonWebKey;
