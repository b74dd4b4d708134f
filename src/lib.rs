pub mod config;
pub mod error;
pub mod keys;
pub mod signing;
pub mod vault;

pub use config::KeyVaultClientConfig;
pub use error::{CustodyError, CustodyResult};
pub use keys::{
    AsymmetricKey, KeyConnector, KeyCustodyService, KeyDescriptor, KeyStorageShape,
};
pub use signing::{canonical_bytes, SignedEntity};
pub use vault::{KeyVaultClient, RemoteKeyStore, RemoteStoreError};
