use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use clap::{ArgGroup, Parser, Subcommand};
use kms_custody::config::{KeyVaultClientConfig, KMS_SERVICE_REFERENCE};
use kms_custody::{
    AsymmetricKey, KeyConnector, KeyCustodyService, KeyDescriptor, KeyVaultClient,
};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use p256::{PublicKey, SecretKey};
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "kms-custody")]
#[command(about = "Create, import, sign and verify with keys held in a remote key vault")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a key inside the vault
    Create {
        /// Create a 256-bit symmetric key instead of a P-256 key pair
        #[arg(long)]
        symmetric: bool,
    },
    /// Import a PKCS#8 key pair or an SPKI public key (DER or PEM)
    #[command(group(ArgGroup::new("material").required(true).args(["pkcs8", "spki"])))]
    Import {
        #[arg(long)]
        pkcs8: Option<PathBuf>,
        #[arg(long)]
        spki: Option<PathBuf>,
        /// Key id; a random one is used when omitted
        #[arg(long)]
        id: Option<Uuid>,
    },
    /// Print the public key as base64url SPKI
    Get {
        id: Uuid,
        #[arg(long)]
        version: Option<String>,
    },
    /// Sign a file and print the base64url signature
    Sign {
        id: Uuid,
        #[arg(long)]
        version: Option<String>,
        file: PathBuf,
    },
    /// Verify a base64url signature over a file
    Verify {
        id: Uuid,
        #[arg(long)]
        version: Option<String>,
        file: PathBuf,
        signature: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();

    let config = KeyVaultClientConfig::from_env().context("failed to load key vault config")?;
    let client = KeyVaultClient::new(config).context("failed to build key vault client")?;
    let reference = KMS_SERVICE_REFERENCE.clone();
    let service = KeyCustodyService::builder()
        .register(reference.clone(), Arc::new(client))
        .build();
    let connector = KeyConnector::key_vault(reference);

    match cli.command {
        Commands::Create { symmetric } => {
            let descriptor = if symmetric {
                service.create_symmetric_key(&connector).await
            } else {
                service.create_asymmetric_key(&connector).await
            }
            .context("key creation failed")?;
            println!("{descriptor}");
        }
        Commands::Import { pkcs8, spki, id } => {
            let id = id.unwrap_or_else(Uuid::new_v4);
            let key = match (pkcs8, spki) {
                (Some(path), _) => AsymmetricKey::from_pkcs8_der(id, None, read_pkcs8(&path)?)?,
                (None, Some(path)) => AsymmetricKey::public_only(id, None, read_spki(&path)?),
                (None, None) => bail!("one of --pkcs8 or --spki is required"),
            };
            let descriptor = service
                .import_asymmetric_key(&connector, &key)
                .await
                .context("key import failed")?;
            println!("{descriptor}");
        }
        Commands::Get { id, version } => {
            let descriptor = KeyDescriptor::new(id, version);
            let key = service
                .get_asymmetric_key(&connector, &descriptor, false)
                .await
                .with_context(|| format!("failed to fetch key {descriptor}"))?;
            println!("{}", URL_SAFE_NO_PAD.encode(key.public_key()));
        }
        Commands::Sign { id, version, file } => {
            let descriptor = KeyDescriptor::new(id, version);
            let data = read_file(&file)?;
            let signature = service
                .sign_data(&connector, &descriptor, &data)
                .await
                .with_context(|| format!("failed to sign with key {descriptor}"))?;
            println!("{}", URL_SAFE_NO_PAD.encode(signature));
        }
        Commands::Verify {
            id,
            version,
            file,
            signature,
        } => {
            let descriptor = KeyDescriptor::new(id, version);
            let data = read_file(&file)?;
            let signature = URL_SAFE_NO_PAD
                .decode(signature.trim().trim_end_matches('='))
                .context("signature is not base64url")?;
            let valid = service
                .verify_data(&connector, &descriptor, &data, &signature)
                .await
                .with_context(|| format!("failed to verify with key {descriptor}"))?;
            println!("{valid}");
            if !valid {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn read_pkcs8(path: &Path) -> Result<Vec<u8>> {
    let raw = read_file(path)?;
    match pem_text(&raw) {
        Some(pem) => {
            let secret = SecretKey::from_pkcs8_pem(pem)
                .map_err(|err| anyhow!("invalid PKCS#8 PEM in {}: {err}", path.display()))?;
            let der = secret
                .to_pkcs8_der()
                .map_err(|err| anyhow!("failed to encode PKCS#8: {err}"))?;
            Ok(der.as_bytes().to_vec())
        }
        None => Ok(raw),
    }
}

fn read_spki(path: &Path) -> Result<Vec<u8>> {
    let raw = read_file(path)?;
    match pem_text(&raw) {
        Some(pem) => {
            let public = PublicKey::from_public_key_pem(pem)
                .map_err(|err| anyhow!("invalid SPKI PEM in {}: {err}", path.display()))?;
            let der = public
                .to_public_key_der()
                .map_err(|err| anyhow!("failed to encode SPKI: {err}"))?;
            Ok(der.as_bytes().to_vec())
        }
        None => Ok(raw),
    }
}

fn pem_text(raw: &[u8]) -> Option<&str> {
    std::str::from_utf8(raw)
        .ok()
        .filter(|text| text.trim_start().starts_with("-----BEGIN"))
}
