use crate::{Error, Result};
use russh_keys::key::KeyPair;
use std::fs::{self, OpenOptions};
use std::path::Path;
use tracing::info;

/// Load the server's private key, creating an ed25519 key on first start.
pub fn load_or_generate_host_key(path: &Path) -> Result<KeyPair> {
    if path.exists() {
        info!("Loading host key: {}", path.display());
        return Ok(russh_keys::load_secret_key(path, None)?);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let key = KeyPair::generate_ed25519().ok_or(Error::KeyGeneration)?;
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let file = options.open(path)?;
    russh_keys::encode_pkcs8_pem(&key, file)?;

    info!("Generated new ed25519 host key: {}", path.display());
    Ok(key)
}
