//! Resolution of the keypair used to authenticate against the jump pod.
//!
//! The caller's own identity/pubkey pair is preferred. When no usable
//! public key file is present, a passphrase-less Ed25519 keypair is cached
//! in the data directory and reused across sessions.

mod error;

use std::path::{Path, PathBuf};

use snafu::ResultExt;

pub use self::error::Error;
use crate::{consts, options::ConnectionOptions};

/// Keypair authorized inside the jump pod.
#[derive(Clone, Debug)]
pub struct JumpKeypair {
    /// Private key handed to the SSH client via `-i`.
    pub private_key_path: PathBuf,
    /// Public key line written to the pod's `authorized_keys`.
    pub public_key: String,
}

/// Picks the caller's keypair when its pubkey file exists, the cached
/// generated one otherwise.
pub async fn resolve(options: &ConnectionOptions, data_dir: &Path) -> Result<JumpKeypair, Error> {
    if let Some(pubkey_path) = &options.pubkey {
        match tokio::fs::read_to_string(pubkey_path).await {
            Ok(public_key) => {
                return Ok(JumpKeypair {
                    private_key_path: options.identity.clone(),
                    public_key: public_key.trim().to_string(),
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "public key {} does not exist, using the cached jump keypair",
                    pubkey_path.display()
                );
            }
            Err(source) => {
                return Err(Error::ReadPublicKey { file_path: pubkey_path.clone(), source });
            }
        }
    }

    load_or_generate(data_dir).await
}

async fn load_or_generate(data_dir: &Path) -> Result<JumpKeypair, Error> {
    let private_key_path = data_dir.join(consts::JUMP_KEY_FILE_NAME);
    let public_key_path = private_key_path.with_extension("pub");

    if private_key_path.exists() {
        let public_key = derive_public_key(&private_key_path).await?;
        return Ok(JumpKeypair { private_key_path, public_key });
    }

    generate(data_dir, &private_key_path, &public_key_path).await
}

async fn generate(
    data_dir: &Path,
    private_key_path: &Path,
    public_key_path: &Path,
) -> Result<JumpKeypair, Error> {
    use russh::keys::ssh_key::{Algorithm, LineEnding};

    tracing::info!("generating a jump keypair in {}", data_dir.display());

    let private_key = russh::keys::PrivateKey::random(&mut rand::rng(), Algorithm::Ed25519)
        .map_err(|_| error::GenerateKeySnafu.build())?;
    let private_openssh =
        private_key.to_openssh(LineEnding::LF).map_err(|_| error::SerializeKeySnafu.build())?;
    let public_key = private_key
        .public_key()
        .to_openssh()
        .map_err(|_| error::SerializeKeySnafu.build())?;

    tokio::fs::create_dir_all(data_dir)
        .await
        .context(error::WriteKeySnafu { file_path: private_key_path.to_path_buf() })?;
    tokio::fs::write(private_key_path, private_openssh.as_bytes())
        .await
        .context(error::WriteKeySnafu { file_path: private_key_path.to_path_buf() })?;
    restrict_permissions(private_key_path)
        .await
        .context(error::WriteKeySnafu { file_path: private_key_path.to_path_buf() })?;
    tokio::fs::write(public_key_path, format!("{public_key}\n"))
        .await
        .context(error::WriteKeySnafu { file_path: public_key_path.to_path_buf() })?;

    Ok(JumpKeypair { private_key_path: private_key_path.to_path_buf(), public_key })
}

async fn derive_public_key(private_key_path: &Path) -> Result<String, Error> {
    let secret = tokio::fs::read_to_string(private_key_path)
        .await
        .context(error::ReadPrivateKeySnafu { file_path: private_key_path.to_path_buf() })?
        .trim()
        .to_string();
    let private_key = russh::keys::decode_secret_key(&secret, None).map_err(|_| {
        error::ParsePrivateKeySnafu { file_path: private_key_path.to_path_buf() }.build()
    })?;
    private_key.public_key().to_openssh().map_err(|_| error::SerializeKeySnafu.build())
}

async fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    #[cfg(not(unix))]
    {
        let _unused = path;
    }
    Ok(())
}
